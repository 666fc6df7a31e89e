use crate::error::{Error, Result};

/// Transfer encodings a download part may declare. Anything else cannot be
/// written to disk as-is.
pub const ALLOWED_TRANSFER_ENCODINGS: [&str; 4] = ["identity", "binary", "7bit", "8bit"];

/// Check a part's `Content-Transfer-Encoding`; a missing header is identity.
pub fn validate_transfer_encoding(part: &str, encoding: Option<&str>) -> Result<()> {
    let Some(encoding) = encoding.map(str::trim) else {
        return Ok(());
    };
    if ALLOWED_TRANSFER_ENCODINGS.iter().any(|allowed| allowed.eq_ignore_ascii_case(encoding)) {
        Ok(())
    } else {
        Err(Error::protocol(format!(
            "unsupported Content-Transfer-Encoding {encoding:?} for part {part:?}"
        )))
    }
}

/// Parts that are tar archives meant to be unpacked at the destination.
pub fn is_archive_part(filename: &str, content_type: Option<&str>) -> bool {
    let by_type = content_type
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|ct| ct.trim().eq_ignore_ascii_case("application/x-tar"));
    by_type || filename.to_ascii_lowercase().ends_with(".tar")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_encodings() {
        assert!(validate_transfer_encoding("a", None).is_ok());
        for encoding in ["binary", "8bit", "7bit", "identity", "BINARY", " 8bit "] {
            assert!(validate_transfer_encoding("a", Some(encoding)).is_ok(), "{encoding}");
        }
    }

    #[test]
    fn test_rejected_encodings() {
        for encoding in ["base64", "quoted-printable", "gzip"] {
            let err = validate_transfer_encoding("a", Some(encoding)).unwrap_err();
            assert!(matches!(err, Error::Transport { .. }));
        }
    }

    #[test]
    fn test_archive_detection() {
        assert!(is_archive_part("data.tar", None));
        assert!(is_archive_part("data", Some("application/x-tar; charset=binary")));
        assert!(!is_archive_part("data.tar.gz", Some("application/gzip")));
    }
}

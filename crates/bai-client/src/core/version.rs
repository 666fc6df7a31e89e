use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};

/// A parsed API version such as `v4.20190315`.
///
/// Versions order by major number first, then by revision date string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiVersion {
    pub major: u32,
    pub revision: String,
}

impl Ord for ApiVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major.cmp(&other.major).then_with(|| self.revision.cmp(&other.revision))
    }
}

impl PartialOrd for ApiVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.revision.is_empty() {
            write!(f, "v{}", self.major)
        } else {
            write!(f, "v{}.{}", self.major, self.revision)
        }
    }
}

/// Parse `v<major>[.<revision>]`.
///
/// # Examples
///
/// ```
/// use bai_client::core::parse_api_version;
///
/// let version = parse_api_version("v4.20190315").unwrap();
/// assert_eq!(version.major, 4);
/// assert_eq!(version.revision, "20190315");
/// ```
pub fn parse_api_version(value: &str) -> Result<ApiVersion> {
    let invalid = || Error::client(format!("invalid API version: {value:?}"));
    let rest = value.trim().strip_prefix('v').ok_or_else(invalid)?;
    let (major, revision) = rest.split_once('.').unwrap_or((rest, ""));
    let major = major.parse::<u32>().map_err(|_| invalid())?;
    Ok(ApiVersion { major, revision: revision.to_string() })
}

use std::fmt;
use std::str::FromStr;

use hmac::digest::Digest;
use hmac::digest::core_api::BlockSizeUser;
use hmac::{Mac, SimpleHmac};
use serde::{Deserialize, Serialize};

use crate::error::SignError;

/// Digest used for both the body hash and the HMAC chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashType {
    Sha1,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl HashType {
    /// Lowercase algorithm name, as used in configuration and checksum headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            HashType::Sha1 => "sha1",
            HashType::Sha256 => "sha256",
            HashType::Sha384 => "sha384",
            HashType::Sha512 => "sha512",
        }
    }

    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            HashType::Sha1 => sha1::Sha1::digest(data).to_vec(),
            HashType::Sha256 => sha2::Sha256::digest(data).to_vec(),
            HashType::Sha384 => sha2::Sha384::digest(data).to_vec(),
            HashType::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }

    pub fn hex_digest(&self, data: &[u8]) -> String {
        hex::encode(self.digest(data))
    }

    /// Keyed MAC of `data` under `key`.
    pub fn hmac(&self, key: &[u8], data: &[u8]) -> Vec<u8> {
        match self {
            HashType::Sha1 => hmac_with::<sha1::Sha1>(key, data),
            HashType::Sha256 => hmac_with::<sha2::Sha256>(key, data),
            HashType::Sha384 => hmac_with::<sha2::Sha384>(key, data),
            HashType::Sha512 => hmac_with::<sha2::Sha512>(key, data),
        }
    }
}

fn hmac_with<D: Digest + BlockSizeUser>(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = <SimpleHmac<D> as Mac>::new_from_slice(key)
        .expect("HMAC accepts keys of any length");
    Mac::update(&mut mac, data);
    mac.finalize().into_bytes().to_vec()
}

impl fmt::Display for HashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashType {
    type Err = SignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha1" => Ok(HashType::Sha1),
            "sha256" => Ok(HashType::Sha256),
            "sha384" => Ok(HashType::Sha384),
            "sha512" => Ok(HashType::Sha512),
            _ => Err(SignError::UnknownHashType(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_digest_sha256() {
        assert_eq!(
            HashType::Sha256.hex_digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_digest_lengths() {
        assert_eq!(HashType::Sha1.digest(b"x").len(), 20);
        assert_eq!(HashType::Sha256.digest(b"x").len(), 32);
        assert_eq!(HashType::Sha384.digest(b"x").len(), 48);
        assert_eq!(HashType::Sha512.digest(b"x").len(), 64);
    }

    #[test]
    fn test_hmac_rfc4231_case_2() {
        let mac = HashType::Sha256.hmac(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_parse_hash_type() {
        assert_eq!("SHA256".parse::<HashType>().unwrap(), HashType::Sha256);
        assert_eq!("sha1".parse::<HashType>().unwrap(), HashType::Sha1);
        assert!(matches!("md4".parse::<HashType>(), Err(SignError::UnknownHashType(_))));
    }

    #[test]
    fn test_display_roundtrips_through_from_str() {
        for h in [HashType::Sha1, HashType::Sha256, HashType::Sha384, HashType::Sha512] {
            assert_eq!(h.to_string().parse::<HashType>().unwrap(), h);
        }
    }
}

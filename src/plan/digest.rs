use std::fs;
use std::io::{self, Read};
use std::path::Path;

use sha2::digest::Output;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "sha224" | "sha-224" => Some(Self::Sha224),
            "sha256" | "sha-256" => Some(Self::Sha256),
            "sha384" | "sha-384" => Some(Self::Sha384),
            "sha512" | "sha-512" => Some(Self::Sha512),
            _ => None,
        }
    }

    fn from_hex_len(len: usize) -> Self {
        match len {
            56 => Self::Sha224,
            96 => Self::Sha384,
            128 => Self::Sha512,
            _ => Self::Sha256,
        }
    }
}

/// A declared content digest with its algorithm tag stripped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpectedDigest {
    pub algorithm: HashAlgorithm,
    pub hex: String,
}

impl ExpectedDigest {
    /// Parse `sha256:ABCD...` or a bare hex digest.
    ///
    /// Returns `None` for an unknown algorithm tag.
    pub fn parse(declared: &str) -> Option<Self> {
        let declared = declared.trim();
        let (algorithm, hex) = match declared.split_once(':') {
            Some((tag, hex)) => (HashAlgorithm::from_tag(tag.trim())?, hex.trim()),
            None => (HashAlgorithm::from_hex_len(declared.len()), declared),
        };
        Some(Self {
            algorithm,
            hex: hex.to_ascii_lowercase(),
        })
    }

    pub fn matches(&self, actual_hex: &str) -> bool {
        self.hex.eq_ignore_ascii_case(actual_hex)
    }
}

/// Lowercase hex digest of the file at `path`.
pub fn file_digest(path: &Path, algorithm: HashAlgorithm) -> io::Result<String> {
    let hex = match algorithm {
        HashAlgorithm::Sha224 => format!("{:x}", hash_file::<Sha224>(path)?),
        HashAlgorithm::Sha256 => format!("{:x}", hash_file::<Sha256>(path)?),
        HashAlgorithm::Sha384 => format!("{:x}", hash_file::<Sha384>(path)?),
        HashAlgorithm::Sha512 => format!("{:x}", hash_file::<Sha512>(path)?),
    };
    Ok(hex)
}

fn hash_file<D: Digest>(path: &Path) -> io::Result<Output<D>> {
    let mut file = fs::File::open(path)?;
    let mut hasher = D::new();
    let mut buf = [0u8; 8192];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hasher.finalize())
}

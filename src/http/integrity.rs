//! Integrity checks for downloaded package content

use crate::http::source::ContentValidator;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha512};
use std::fs::File;
use std::io::{self, Read};

/// Base64 SHA-512 of everything `reader` yields
pub fn sha512_base64(reader: &mut impl Read) -> io::Result<String> {
    let mut hasher = Sha512::new();
    io::copy(reader, &mut hasher)?;
    Ok(STANDARD.encode(hasher.finalize()))
}

/// Rejects content whose SHA-512 does not match the lock file's hash
#[derive(Debug, Clone)]
pub struct IntegrityValidator {
    expected: String,
}

impl IntegrityValidator {
    pub fn sha512(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
        }
    }
}

impl ContentValidator for IntegrityValidator {
    fn validate(&self, content: &mut File) -> Result<(), String> {
        let actual = sha512_base64(content).map_err(|e| format!("reading content: {}", e))?;
        if actual == self.expected {
            Ok(())
        } else {
            Err(format!(
                "sha512 mismatch: expected {}, got {}",
                self.expected, actual
            ))
        }
    }
}

//! Manifest (`.mf`) parsing, generation, and verification.
//!
//! Format: one line per member, `ALGO(filename) = lowercase-hex`
//! (spec.md §6), `SHA1` for OVF 0.x/1.x, `SHA256` for 2.x.

use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
}

impl DigestAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "SHA1",
            DigestAlgorithm::Sha256 => "SHA256",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "SHA1" => Some(DigestAlgorithm::Sha1),
            "SHA256" => Some(DigestAlgorithm::Sha256),
            _ => None,
        }
    }

    pub fn digest_hex(self, data: &[u8]) -> String {
        match self {
            DigestAlgorithm::Sha1 => {
                let mut hasher = Sha1::new();
                hasher.update(data);
                hex::encode(hasher.finalize())
            }
            DigestAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(data);
                hex::encode(hasher.finalize())
            }
        }
    }
}

/// One parsed manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub algorithm: DigestAlgorithm,
    pub filename: String,
    pub digest_hex: String,
}

/// A digest mismatch surfaced by [`verify`] — a warning, not a fatal
/// error (spec.md §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub filename: String,
    pub expected: String,
    pub actual: String,
}

/// Parse a manifest file's lines: `ALGO(filename) = hex`.
pub fn parse(text: &str) -> Result<Vec<ManifestEntry>> {
    let mut entries = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let open = line
            .find('(')
            .ok_or_else(|| Error::invalid_input(format!("malformed manifest line: '{line}'")))?;
        let close = line
            .find(')')
            .ok_or_else(|| Error::invalid_input(format!("malformed manifest line: '{line}'")))?;
        let algorithm = DigestAlgorithm::parse(&line[..open])
            .ok_or_else(|| Error::invalid_input(format!("unknown digest algorithm in '{line}'")))?;
        let filename = line[open + 1..close].to_string();
        let rest = line[close + 1..].trim_start();
        let digest_hex = rest
            .strip_prefix('=')
            .ok_or_else(|| Error::invalid_input(format!("malformed manifest line: '{line}'")))?
            .trim()
            .to_string();
        entries.push(ManifestEntry {
            algorithm,
            filename,
            digest_hex,
        });
    }
    Ok(entries)
}

/// Render manifest text for the given (filename, digest) pairs.
pub fn generate(algorithm: DigestAlgorithm, members: &[(String, Vec<u8>)]) -> String {
    let mut out = String::new();
    for (filename, data) in members {
        let hex = algorithm.digest_hex(data);
        out.push_str(&format!("{}({filename}) = {hex}\n", algorithm.name()));
    }
    out
}

/// Compare a parsed manifest against the members as currently stored,
/// reporting (not failing on) mismatches.
pub fn verify(entries: &[ManifestEntry], members: &[(String, Vec<u8>)]) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();
    for entry in entries {
        let Some((_, data)) = members.iter().find(|(name, _)| name == &entry.filename) else {
            mismatches.push(Mismatch {
                filename: entry.filename.clone(),
                expected: entry.digest_hex.clone(),
                actual: "(missing)".to_string(),
            });
            continue;
        };
        let actual = entry.algorithm.digest_hex(data);
        if actual != entry.digest_hex {
            mismatches.push(Mismatch {
                filename: entry.filename.clone(),
                expected: entry.digest_hex.clone(),
                actual,
            });
        }
    }
    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_digest() {
        let hex = DigestAlgorithm::Sha256.digest_hex(b"hello world");
        assert_eq!(hex, "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9");
    }

    #[test]
    fn test_generate_format() {
        let members = vec![("test.ovf".to_string(), b"OVF content".to_vec())];
        let text = generate(DigestAlgorithm::Sha256, &members);
        assert!(text.starts_with("SHA256(test.ovf) = "));
    }

    #[test]
    fn test_parse_round_trip() {
        let members = vec![("test.ovf".to_string(), b"OVF content".to_vec())];
        let text = generate(DigestAlgorithm::Sha1, &members);
        let entries = parse(&text).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filename, "test.ovf");
        assert_eq!(entries[0].algorithm, DigestAlgorithm::Sha1);
    }

    #[test]
    fn test_verify_detects_mismatch() {
        let entries = vec![ManifestEntry {
            algorithm: DigestAlgorithm::Sha256,
            filename: "f".to_string(),
            digest_hex: "deadbeef".to_string(),
        }];
        let members = vec![("f".to_string(), b"actual content".to_vec())];
        let mismatches = verify(&entries, &members);
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].filename, "f");
    }

    #[test]
    fn test_verify_passes_for_matching_digest() {
        let members = vec![("f".to_string(), b"content".to_vec())];
        let text = generate(DigestAlgorithm::Sha256, &members);
        let entries = parse(&text).unwrap();
        assert!(verify(&entries, &members).is_empty());
    }

    #[test]
    fn test_verify_reports_missing_member() {
        let entries = vec![ManifestEntry {
            algorithm: DigestAlgorithm::Sha256,
            filename: "missing.vmdk".to_string(),
            digest_hex: "abc".to_string(),
        }];
        let mismatches = verify(&entries, &[]);
        assert_eq!(mismatches[0].actual, "(missing)");
    }

    #[test]
    fn test_parse_rejects_malformed_line() {
        assert!(matches!(parse("not a manifest line"), Err(Error::InvalidInput { .. })));
    }
}

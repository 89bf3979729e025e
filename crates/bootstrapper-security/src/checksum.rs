use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

const READ_CHUNK: usize = 64 * 1024;

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn sha256_reader_hex(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0_u8; READ_CHUNK];
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Digest of the file at `path`, or `None` when no regular file exists there.
pub fn sha256_file_hex(path: &Path) -> Result<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let digest = sha256_reader_hex(file)
        .with_context(|| format!("failed to hash {}", path.display()))?;
    Ok(Some(digest))
}

pub fn verify_sha256_file(path: &Path, expected_hex: &str) -> Result<bool> {
    Ok(sha256_file_hex(path)?
        .is_some_and(|actual| actual.eq_ignore_ascii_case(expected_hex.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(sha256_hex(b"abc"), ABC_SHA256);
    }

    #[test]
    fn sha256_reader_hex_matches_one_shot_digest_across_chunks() {
        let payload = vec![0x5a_u8; READ_CHUNK * 2 + 17];
        let streamed = sha256_reader_hex(payload.as_slice()).expect("reader must hash");
        assert_eq!(streamed, sha256_hex(&payload));
    }

    #[test]
    fn verify_sha256_file_reports_missing_file_as_mismatch() {
        let path = std::env::temp_dir().join(format!(
            "bootstrapper-security-missing-{}",
            std::process::id()
        ));
        assert_eq!(
            sha256_file_hex(&path).expect("missing file is not an error"),
            None
        );
        assert!(!verify_sha256_file(&path, ABC_SHA256).expect("must complete"));
    }

    #[test]
    fn verify_sha256_file_accepts_uppercase_expected_digest() {
        let path = std::env::temp_dir().join(format!(
            "bootstrapper-security-abc-{}",
            std::process::id()
        ));
        fs::write(&path, b"abc").expect("must write fixture");

        assert!(verify_sha256_file(&path, &ABC_SHA256.to_ascii_uppercase()).expect("must hash"));
        assert!(!verify_sha256_file(&path, &"0".repeat(64)).expect("must hash"));

        let _ = fs::remove_file(&path);
    }
}

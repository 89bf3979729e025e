use anyhow::{anyhow, Context, Result};
use ed25519_dalek::{Signature, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};

/// Checks a detached hex Ed25519 signature over the exact manifest bytes.
///
/// Malformed key or signature encodings are errors; a well-formed signature
/// that does not match the payload is `Ok(false)`.
pub fn verify_manifest_signature(
    manifest_bytes: &[u8],
    public_key_hex: &str,
    signature_hex: &str,
) -> Result<bool> {
    let public_key: [u8; PUBLIC_KEY_LENGTH] =
        decode_fixed(public_key_hex.trim(), "manifest public key")?;
    let signature: [u8; SIGNATURE_LENGTH] =
        decode_fixed(signature_hex.trim(), "manifest signature")?;

    let verifying_key = VerifyingKey::from_bytes(&public_key)
        .context("manifest public key is not a valid Ed25519 point")?;
    let signature = Signature::from_bytes(&signature);

    Ok(verifying_key.verify(manifest_bytes, &signature).is_ok())
}

fn decode_fixed<const N: usize>(value: &str, label: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(value).with_context(|| format!("{label} is not valid hex"))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| anyhow!("{label} must be {N} bytes, got {len}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    const MANIFEST: &[u8] = br#"{"userland":[]}"#;

    fn signing_key() -> SigningKey {
        SigningKey::from_bytes(&[11u8; 32])
    }

    fn public_key_hex(key: &SigningKey) -> String {
        hex::encode(key.verifying_key().to_bytes())
    }

    #[test]
    fn accepts_signature_over_exact_manifest_bytes() {
        let key = signing_key();
        let signature = hex::encode(key.sign(MANIFEST).to_bytes());

        let verified = verify_manifest_signature(MANIFEST, &public_key_hex(&key), &signature)
            .expect("verification must complete");
        assert!(verified);
    }

    #[test]
    fn tolerates_trailing_newline_in_signature_sidecar() {
        let key = signing_key();
        let signature = format!("{}\n", hex::encode(key.sign(MANIFEST).to_bytes()));

        assert!(verify_manifest_signature(MANIFEST, &public_key_hex(&key), &signature)
            .expect("verification must complete"));
    }

    #[test]
    fn rejects_modified_manifest() {
        let key = signing_key();
        let signature = hex::encode(key.sign(MANIFEST).to_bytes());

        let verified = verify_manifest_signature(
            br#"{"userland":[{"name":"x"}]}"#,
            &public_key_hex(&key),
            &signature,
        )
        .expect("verification must complete");
        assert!(!verified);
    }

    #[test]
    fn errors_on_malformed_encodings() {
        let key = signing_key();
        let signature = hex::encode(key.sign(MANIFEST).to_bytes());

        assert!(verify_manifest_signature(MANIFEST, "zz", &signature).is_err());
        assert!(verify_manifest_signature(MANIFEST, "00", &signature).is_err());
        assert!(verify_manifest_signature(MANIFEST, &public_key_hex(&key), "abcd").is_err());
    }
}

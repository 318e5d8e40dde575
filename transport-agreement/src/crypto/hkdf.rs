// SPDX-License-Identifier: MIT OR Apache-2.0

//! HMAC-based key derivation function (HKDF) with SHA256.
//!
//! <https://www.rfc-editor.org/rfc/rfc5869>
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;

pub(crate) fn hkdf<const N: usize>(
    salt: &[u8],
    ikm: &[u8],
    info: &[u8],
) -> Result<[u8; N], HkdfError> {
    let salt = if salt.is_empty() { None } else { Some(salt) };
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    let mut okm = [0u8; N];
    hk.expand(info, &mut okm)
        .map_err(|_| HkdfError::InvalidArguments)?;
    Ok(okm)
}

#[derive(Debug, Error)]
pub enum HkdfError {
    #[error("arguments too large for hkdf")]
    InvalidArguments,
}

#[cfg(test)]
mod tests {
    use super::hkdf;

    #[test]
    fn info_binds_output() {
        let result_1: [u8; 32] = hkdf(b"", b"ikm", b"label").unwrap();
        let result_2: [u8; 32] = hkdf(b"", b"ikm", b"label").unwrap();
        let result_3: [u8; 32] = hkdf(b"", b"ikm", b"other label").unwrap();
        assert_eq!(result_1, result_2);
        assert_ne!(result_2, result_3);
    }

    #[test]
    fn output_too_long() {
        // SHA256 limits HKDF output to 255 * 32 bytes.
        assert!(hkdf::<{ 255 * 32 + 1 }>(b"", b"ikm", b"label").is_err());
    }
}

// Archivo: checksum.rs
// Propósito: helpers de codificación usados en el intercambio con el
// proveedor de firma (base64 del contenido y sha256 en hex).
use crate::errors::{ProviderError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// SHA-256 del contenido en hexadecimal (minúsculas).
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    STANDARD.decode(encoded.trim())
            .map_err(|e| ProviderError::InvalidResponse(format!("base64: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_known_input() {
        assert_eq!(sha256_hex(b"abc"),
                   "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[test]
    fn invalid_base64_is_invalid_response() {
        match decode_base64("%%%") {
            Err(ProviderError::InvalidResponse(_)) => {}
            other => panic!("se esperaba InvalidResponse, obtuvo {:?}", other),
        }
    }
}

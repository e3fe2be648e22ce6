use crate::ports::{CipherError, PayloadCipher};

/// Identity cipher for deployments without payload encryption.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextCipher;

impl PayloadCipher for PlaintextCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        Ok(plaintext.to_owned())
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        Ok(ciphertext.to_owned())
    }
}

use thiserror::Error;

/// Failures of the envelope cipher.
///
/// `Format`, `Decode` and `Authentication` are all recovered locally by
/// callers (a placeholder is shown instead of the message). An
/// `Authentication` failure is permanent for a given key and must not be
/// retried.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Malformed envelope: expected `nonce:ciphertext`")]
    Format,

    #[error("Invalid base64 in envelope: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Authentication failed: wrong key or tampered ciphertext")]
    Authentication,

    #[error("Decrypted bytes are not valid UTF-8")]
    InvalidUtf8,

    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Encryption failed")]
    EncryptionFailed,
}

/// A participant pair naming the same user twice.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("A conversation needs two distinct participants")]
pub struct DuplicateParticipant;

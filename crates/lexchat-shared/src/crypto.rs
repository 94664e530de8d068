//! Conversation envelope cipher.
//!
//! An envelope is `base64(nonce) ":" base64(ciphertext || tag)`, sealed with
//! XChaCha20-Poly1305 under the conversation key. Nonces are 24 random bytes
//! drawn per message; the key is never rotated.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::constants::{ENVELOPE_DELIMITER, NONCE_SIZE, SYMMETRIC_KEY_SIZE};
use crate::error::CryptoError;

/// 256-bit symmetric key shared by both members of a conversation.
#[derive(Clone, PartialEq, Eq)]
pub struct ConversationKey([u8; SYMMETRIC_KEY_SIZE]);

impl ConversationKey {
    pub fn generate() -> Self {
        let mut key = [0u8; SYMMETRIC_KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_bytes(bytes: [u8; SYMMETRIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; SYMMETRIC_KEY_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: SYMMETRIC_KEY_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Decode the form persisted on conversation records (standard base64).
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = BASE64.decode(encoded.trim())?;
        Self::from_slice(&bytes)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ConversationKey(..)")
    }
}

pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Seal `plaintext` under `key` with a fresh random nonce.
pub fn encrypt(key: &ConversationKey, plaintext: &str) -> Result<String, CryptoError> {
    seal_with_nonce(key, &generate_nonce(), plaintext)
}

fn seal_with_nonce(
    key: &ConversationKey,
    nonce_bytes: &[u8; NONCE_SIZE],
    plaintext: &str,
) -> Result<String, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = XNonce::from_slice(nonce_bytes);

    let sealed = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok(format!(
        "{}{}{}",
        BASE64.encode(nonce_bytes),
        ENVELOPE_DELIMITER,
        BASE64.encode(sealed)
    ))
}

/// Open an envelope produced by [`encrypt`].
pub fn decrypt(key: &ConversationKey, envelope: &str) -> Result<String, CryptoError> {
    let (nonce_b64, sealed_b64) = split_envelope(envelope)?;

    let nonce_bytes = BASE64.decode(nonce_b64)?;
    let sealed = BASE64.decode(sealed_b64)?;

    // A short or long nonce can never have produced a valid tag.
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(CryptoError::Authentication);
    }

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let plaintext = cipher
        .decrypt(XNonce::from_slice(&nonce_bytes), sealed.as_slice())
        .map_err(|_| CryptoError::Authentication)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
}

/// Whether `text` has the shape of an envelope (two base64 segments).
///
/// Used to tell ciphertext apart from plaintext written by the unencrypted
/// fallback path.
pub fn looks_like_envelope(text: &str) -> bool {
    match split_envelope(text) {
        Ok((nonce, sealed)) => BASE64.decode(nonce).is_ok() && BASE64.decode(sealed).is_ok(),
        Err(_) => false,
    }
}

fn split_envelope(envelope: &str) -> Result<(&str, &str), CryptoError> {
    let (nonce, sealed) = envelope
        .split_once(ENVELOPE_DELIMITER)
        .ok_or(CryptoError::Format)?;
    if nonce.is_empty() || sealed.is_empty() || sealed.contains(ENVELOPE_DELIMITER) {
        return Err(CryptoError::Format);
    }
    Ok((nonce, sealed))
}

/// Application name
pub const APP_NAME: &str = "Lexchat";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Poly1305 authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Separator between the nonce and sealed segments of an envelope
pub const ENVELOPE_DELIMITER: char = ':';

/// Maximum plaintext message size in bytes (64 KiB)
pub const MAX_MESSAGE_SIZE: usize = 65_536;

/// Shown in place of a message that cannot be decrypted
pub const DECRYPTION_FAILED_TEXT: &str = "[message could not be decrypted]";

/// Shown in a conversation preview that cannot be decrypted
pub const PREVIEW_DECRYPTION_FAILED_TEXT: &str = "failed to decrypt";

/// Shown in place of ciphertext when the conversation has no key
pub const MISSING_KEY_TEXT: &str = "[encryption key unavailable]";

/// Default bound of the legacy conversation key cache
pub const DEFAULT_KEY_CACHE_CAPACITY: usize = 256;

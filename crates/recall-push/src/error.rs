use thiserror::Error;

#[derive(Debug, Error)]
pub enum PushCryptoError {
    #[error("{field} is not valid base64url")]
    Base64 { field: &'static str },

    #[error("{field} has length {actual}, expected {expected}")]
    KeyLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("subscription p256dh is not a valid P-256 public key")]
    InvalidPublicKey,

    #[error("VAPID private key is not a valid P-256 scalar")]
    InvalidPrivateKey,

    #[error("VAPID public key does not belong to the private key")]
    KeyMismatch,

    #[error("payload is {0} bytes, larger than a single push record allows")]
    PayloadTooLarge(usize),

    #[error("key derivation failed")]
    KeyDerivation,

    #[error("payload encryption failed")]
    Encryption,

    #[error("push endpoint has no usable origin: {0}")]
    Endpoint(String),

    #[error("VAPID token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Recall Push Library
///
/// Message protection for the Web Push protocol:
/// - `ece`: aes128gcm content coding keyed to one browser subscription
///   (RFC 8188, RFC 8291)
/// - `vapid`: application-server identification tokens (RFC 8292)
///
/// Transport (HTTP) lives in recall-notify; nothing here does I/O.

pub mod ece;
pub mod error;
pub mod vapid;

pub use error::PushCryptoError;

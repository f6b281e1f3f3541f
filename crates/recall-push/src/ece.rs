use aes_gcm::{
    Aes128Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hkdf::Hkdf;
use p256::PublicKey;
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::{OsRng, RngCore};
use sha2::Sha256;

use crate::PushCryptoError;

/// Record size written into the header. The whole message is one record.
pub const RECORD_SIZE: u32 = 4096;
pub const PUBLIC_KEY_LEN: usize = 65;
pub const AUTH_SECRET_LEN: usize = 16;

const SALT_LEN: usize = 16;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = SALT_LEN + 4 + 1 + PUBLIC_KEY_LEN;

/// Push services only have to accept 4096-byte bodies, header and tag included.
pub const MAX_PAYLOAD_LEN: usize = 4096 - HEADER_LEN - TAG_LEN - 1;

/// Receiver keys from a browser `PushSubscription`.
pub struct SubscriptionKeys {
    public_key: PublicKey,
    public_bytes: [u8; PUBLIC_KEY_LEN],
    auth: [u8; AUTH_SECRET_LEN],
}

impl SubscriptionKeys {
    /// Parse the `p256dh` and `auth` values exactly as the browser reports them.
    pub fn from_base64(p256dh: &str, auth: &str) -> Result<Self, PushCryptoError> {
        let public_bytes: [u8; PUBLIC_KEY_LEN] = decode_fixed("p256dh", p256dh)?;
        let auth: [u8; AUTH_SECRET_LEN] = decode_fixed("auth", auth)?;
        let public_key =
            PublicKey::from_sec1_bytes(&public_bytes).map_err(|_| PushCryptoError::InvalidPublicKey)?;

        Ok(Self {
            public_key,
            public_bytes,
            auth,
        })
    }
}

/// Encrypt `plaintext` for one subscription with the aes128gcm content coding.
///
/// Output is the complete request body: salt, record size, the ephemeral
/// sender key as key id, then the single sealed record.
pub fn encrypt(keys: &SubscriptionKeys, plaintext: &[u8]) -> Result<Vec<u8>, PushCryptoError> {
    if plaintext.len() > MAX_PAYLOAD_LEN {
        return Err(PushCryptoError::PayloadTooLarge(plaintext.len()));
    }

    let sender = EphemeralSecret::random(&mut OsRng);
    let sender_point = sender.public_key().to_encoded_point(false);
    let sender_bytes = sender_point.as_bytes();
    let shared = sender.diffie_hellman(&keys.public_key);

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let (cek, nonce) = derive_content_keys(
        shared.raw_secret_bytes(),
        &keys.auth,
        &keys.public_bytes,
        sender_bytes,
        &salt,
    )?;

    let mut record = Vec::with_capacity(plaintext.len() + 1);
    record.extend_from_slice(plaintext);
    // Last-record delimiter, no padding
    record.push(0x02);

    let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(&cek));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), record.as_slice())
        .map_err(|_| PushCryptoError::Encryption)?;

    let mut body = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    body.push(PUBLIC_KEY_LEN as u8);
    body.extend_from_slice(sender_bytes);
    body.extend_from_slice(&ciphertext);
    Ok(body)
}

/// Content-encryption key and nonce for one message (RFC 8291 §3.4).
pub(crate) fn derive_content_keys(
    ecdh_secret: &[u8],
    auth: &[u8],
    receiver_public: &[u8],
    sender_public: &[u8],
    salt: &[u8],
) -> Result<([u8; 16], [u8; 12]), PushCryptoError> {
    let mut key_info = Vec::with_capacity(14 + 2 * PUBLIC_KEY_LEN);
    key_info.extend_from_slice(b"WebPush: info\0");
    key_info.extend_from_slice(receiver_public);
    key_info.extend_from_slice(sender_public);

    let mut ikm = [0u8; 32];
    Hkdf::<Sha256>::new(Some(auth), ecdh_secret)
        .expand(&key_info, &mut ikm)
        .map_err(|_| PushCryptoError::KeyDerivation)?;

    let prk = Hkdf::<Sha256>::new(Some(salt), &ikm);

    let mut cek = [0u8; 16];
    prk.expand(b"Content-Encoding: aes128gcm\0", &mut cek)
        .map_err(|_| PushCryptoError::KeyDerivation)?;

    let mut nonce = [0u8; 12];
    prk.expand(b"Content-Encoding: nonce\0", &mut nonce)
        .map_err(|_| PushCryptoError::KeyDerivation)?;

    Ok((cek, nonce))
}

/// Browsers emit unpadded base64url; tolerate padding and the standard alphabet.
pub(crate) fn decode_b64url(field: &'static str, value: &str) -> Result<Vec<u8>, PushCryptoError> {
    let normalized: String = value
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    URL_SAFE_NO_PAD
        .decode(normalized)
        .map_err(|_| PushCryptoError::Base64 { field })
}

fn decode_fixed<const N: usize>(field: &'static str, value: &str) -> Result<[u8; N], PushCryptoError> {
    let bytes = decode_b64url(field, value)?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| PushCryptoError::KeyLength {
        field,
        expected: N,
        actual,
    })
}

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use p256::SecretKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::EncodePrivateKey;
use rand_core::OsRng;
use serde::Serialize;
use url::Url;

use crate::PushCryptoError;
use crate::ece::decode_b64url;

/// Tokens are minted per request; 12 hours keeps well under the 24h ceiling.
const TOKEN_LIFETIME_HOURS: i64 = 12;

#[derive(Debug, Serialize)]
struct VapidClaims<'a> {
    aud: &'a str,
    exp: i64,
    sub: &'a str,
}

/// Application-server identity: the VAPID key pair plus contact subject.
pub struct VapidSigner {
    key: EncodingKey,
    public_key: String,
    subject: String,
}

impl VapidSigner {
    /// Build from the base64url raw private scalar and uncompressed public
    /// point, as produced by `generate_keys` or the usual web-push tooling.
    pub fn from_base64(
        private_key: &str,
        public_key: &str,
        subject: &str,
    ) -> Result<Self, PushCryptoError> {
        let scalar = decode_b64url("VAPID private key", private_key)?;
        let secret = SecretKey::from_slice(&scalar).map_err(|_| PushCryptoError::InvalidPrivateKey)?;

        let derived = secret.public_key().to_encoded_point(false);
        let given = decode_b64url("VAPID public key", public_key)?;
        if given.as_slice() != derived.as_bytes() {
            return Err(PushCryptoError::KeyMismatch);
        }

        let der = secret
            .to_pkcs8_der()
            .map_err(|_| PushCryptoError::InvalidPrivateKey)?;

        Ok(Self {
            key: EncodingKey::from_ec_der(der.as_bytes()),
            public_key: URL_SAFE_NO_PAD.encode(derived.as_bytes()),
            subject: subject.to_string(),
        })
    }

    /// Public key in the form browsers pass to `pushManager.subscribe`.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Signed ES256 token whose audience is the push service origin.
    pub fn sign(&self, endpoint: &str) -> Result<String, PushCryptoError> {
        let audience =
            endpoint_origin(endpoint).ok_or_else(|| PushCryptoError::Endpoint(endpoint.to_string()))?;

        let claims = VapidClaims {
            aud: &audience,
            exp: (chrono::Utc::now() + chrono::Duration::hours(TOKEN_LIFETIME_HOURS)).timestamp(),
            sub: &self.subject,
        };

        Ok(encode(&Header::new(Algorithm::ES256), &claims, &self.key)?)
    }

    /// `Authorization` header value for a push request to `endpoint`.
    pub fn authorization(&self, endpoint: &str) -> Result<String, PushCryptoError> {
        Ok(format!("vapid t={}, k={}", self.sign(endpoint)?, self.public_key))
    }
}

/// Serialized origin of an http(s) endpoint, as the VAPID `aud` claim
/// expects it: lower-cased scheme and host, default port and userinfo dropped.
pub fn endpoint_origin(endpoint: &str) -> Option<String> {
    let url = Url::parse(endpoint.trim()).ok()?;
    if !matches!(url.scheme(), "https" | "http") || url.host_str().is_none_or(str::is_empty) {
        return None;
    }

    Some(url.origin().ascii_serialization())
}

/// Fresh key pair as (private, public), both base64url without padding.
pub fn generate_keys() -> (String, String) {
    let secret = SecretKey::random(&mut OsRng);
    let public = secret.public_key().to_encoded_point(false);
    (
        URL_SAFE_NO_PAD.encode(secret.to_bytes()),
        URL_SAFE_NO_PAD.encode(public.as_bytes()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::{Signature, VerifyingKey, signature::Verifier};

    fn signer() -> (VapidSigner, String) {
        let (private_key, public_key) = generate_keys();
        let signer = VapidSigner::from_base64(&private_key, &public_key, "mailto:ops@example.com").unwrap();
        (signer, public_key)
    }

    #[test]
    fn token_verifies_against_public_key() {
        let (signer, public_key) = signer();
        let token = signer
            .sign("https://fcm.googleapis.com/fcm/send/abc123")
            .unwrap();

        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);

        let header: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[0]).unwrap()).unwrap();
        assert_eq!(header["alg"], "ES256");

        let claims: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        assert_eq!(claims["aud"], "https://fcm.googleapis.com");
        assert_eq!(claims["sub"], "mailto:ops@example.com");
        let exp = claims["exp"].as_i64().unwrap();
        let now = chrono::Utc::now().timestamp();
        assert!(exp > now && exp <= now + 24 * 3600);

        let signature = Signature::from_slice(&URL_SAFE_NO_PAD.decode(parts[2]).unwrap()).unwrap();
        let verifying_key =
            VerifyingKey::from_sec1_bytes(&URL_SAFE_NO_PAD.decode(&public_key).unwrap()).unwrap();
        verifying_key
            .verify(format!("{}.{}", parts[0], parts[1]).as_bytes(), &signature)
            .unwrap();
    }

    #[test]
    fn authorization_header_carries_token_and_key() {
        let (signer, public_key) = signer();
        let header = signer
            .authorization("https://updates.push.services.mozilla.com/wpush/v2/xyz")
            .unwrap();

        assert!(header.starts_with("vapid t="));
        assert!(header.ends_with(&format!(", k={public_key}")));
    }

    #[test]
    fn mismatched_key_pair_is_rejected() {
        let (private_key, _) = generate_keys();
        let (_, other_public) = generate_keys();

        assert!(matches!(
            VapidSigner::from_base64(&private_key, &other_public, "mailto:a@b.c"),
            Err(PushCryptoError::KeyMismatch)
        ));
    }

    #[test]
    fn garbage_private_key_is_rejected() {
        let (_, public_key) = generate_keys();
        assert!(VapidSigner::from_base64("@@@", &public_key, "mailto:a@b.c").is_err());
        assert!(matches!(
            VapidSigner::from_base64(&URL_SAFE_NO_PAD.encode([0u8; 32]), &public_key, "mailto:a@b.c"),
            Err(PushCryptoError::InvalidPrivateKey)
        ));
    }

    #[test]
    fn origin_strips_path_and_query() {
        assert_eq!(
            endpoint_origin("https://push.example.com:8443/a/b?c=d").as_deref(),
            Some("https://push.example.com:8443")
        );
        assert_eq!(
            endpoint_origin("https://push.example.com").as_deref(),
            Some("https://push.example.com")
        );
        assert_eq!(endpoint_origin("ftp://push.example.com/x"), None);
        assert_eq!(endpoint_origin("mailto:ops@example.com"), None);
        assert_eq!(endpoint_origin("not a url"), None);
    }

    #[test]
    fn origin_drops_default_port_and_userinfo() {
        assert_eq!(
            endpoint_origin("https://fcm.googleapis.com:443/fcm/send/x").as_deref(),
            Some("https://fcm.googleapis.com")
        );
        assert_eq!(
            endpoint_origin("http://127.0.0.1:80/push").as_deref(),
            Some("http://127.0.0.1")
        );
        assert_eq!(
            endpoint_origin("https://user:pw@push.example.com/x").as_deref(),
            Some("https://push.example.com")
        );
    }

    #[test]
    fn origin_is_case_normalized() {
        assert_eq!(
            endpoint_origin("HTTPS://Push.Example.COM/x").as_deref(),
            Some("https://push.example.com")
        );
    }

    #[test]
    fn audience_uses_normalized_origin() {
        let (signer, _) = signer();
        let token = signer.sign("https://user:pw@FCM.googleapis.com:443/fcm/send/abc").unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let claims: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        assert_eq!(claims["aud"], "https://fcm.googleapis.com");
    }
}

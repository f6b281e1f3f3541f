use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_SUBJECT: &str = "mailto:support@example.com";
/// Messages expire instead of arriving stale on a device that was offline.
pub const DEFAULT_TTL: Duration = Duration::from_secs(12 * 60 * 60);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum VapidConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{name} must be a positive number of seconds, got {value:?}")]
    InvalidSeconds { name: &'static str, value: String },
}

/// Delivery identity and transport limits, read once at startup.
#[derive(Clone)]
pub struct PushConfig {
    pub vapid_public_key: String,
    pub vapid_private_key: String,
    pub vapid_subject: String,
    pub ttl: Duration,
    pub timeout: Duration,
}

impl PushConfig {
    pub fn from_env() -> Result<Self, VapidConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, VapidConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(VapidConfigError::Missing(name))
        };

        let vapid_public_key = required("RECALL_VAPID_PUBLIC_KEY")?;
        let vapid_private_key = required("RECALL_VAPID_PRIVATE_KEY")?;
        let vapid_subject = lookup("RECALL_VAPID_SUBJECT")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());

        let timeout = match lookup("RECALL_PUSH_TIMEOUT_SECS") {
            None => DEFAULT_TIMEOUT,
            Some(value) => match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(VapidConfigError::InvalidSeconds {
                        name: "RECALL_PUSH_TIMEOUT_SECS",
                        value,
                    });
                }
            },
        };

        Ok(Self {
            vapid_public_key,
            vapid_private_key,
            vapid_subject,
            ttl: DEFAULT_TTL,
            timeout,
        })
    }
}

impl fmt::Debug for PushConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushConfig")
            .field("vapid_public_key", &self.vapid_public_key)
            .field("vapid_private_key", &"<redacted>")
            .field("vapid_subject", &self.vapid_subject)
            .field("ttl", &self.ttl)
            .field("timeout", &self.timeout)
            .finish()
    }
}

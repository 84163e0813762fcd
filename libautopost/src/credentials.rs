//! Credential handling
//!
//! API keys live in `config.json` in an obscured form (`OBF:` + base64) so
//! they are not readable at a glance. In memory they are held as
//! [`secrecy::SecretString`] so that `Debug` output never prints them.
//!
//! This module also owns the two presentation rules for secrets:
//! masking for display (`abcd***wxyz`) and redaction of any credential
//! substring from error text before it is logged or returned to a caller.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Prefix that marks an obscured value on disk
pub const OBFUSCATION_PREFIX: &str = "OBF:";

/// Replacement text for redacted credentials
pub const REDACTED: &str = "***";

/// Names of the secret fields inside the `api_keys` section
pub const SECRET_KEYS: &[&str] = &[
    "gemini_api_key",
    "x_api_key",
    "x_api_secret",
    "x_access_token",
    "x_access_token_secret",
    "threads_api_key",
];

/// A credential value held in protected memory
///
/// Serializes as plaintext; the config store is responsible for obscuring
/// values before they reach disk.
pub struct Secret(SecretString);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().trim().is_empty()
    }

    /// Display form: first and last four characters, or `***` for short values
    pub fn masked(&self) -> String {
        mask(self.expose())
    }
}

impl Default for Secret {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl Clone for Secret {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_owned())
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            f.write_str("Secret(<empty>)")
        } else {
            f.write_str("Secret(<redacted>)")
        }
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.expose())
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(reveal(&raw)))
    }
}

/// Obscure a plaintext value for storage
///
/// Empty and already-obscured values are returned unchanged.
pub fn obfuscate(value: &str) -> String {
    if value.is_empty() || value.starts_with(OBFUSCATION_PREFIX) {
        return value.to_string();
    }
    format!("{}{}", OBFUSCATION_PREFIX, STANDARD.encode(value.as_bytes()))
}

/// Reverse [`obfuscate`]
///
/// Values without the prefix are treated as plaintext. A value that fails to
/// decode is returned verbatim.
pub fn reveal(value: &str) -> String {
    let Some(encoded) = value.strip_prefix(OBFUSCATION_PREFIX) else {
        return value.to_string();
    };
    match STANDARD.decode(encoded) {
        Ok(bytes) => String::from_utf8(bytes).unwrap_or_else(|_| value.to_string()),
        Err(_) => value.to_string(),
    }
}

/// Mask a credential for display
pub fn mask(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}{}{}", head, REDACTED, tail)
    } else {
        REDACTED.to_string()
    }
}

/// Apply `f` to every secret field of an `api_keys` JSON object
pub(crate) fn map_secret_fields(
    api_keys: &mut serde_json::Value,
    f: impl Fn(&str) -> String,
) {
    let Some(object) = api_keys.as_object_mut() else {
        return;
    };
    for key in SECRET_KEYS {
        if let Some(serde_json::Value::String(value)) = object.get_mut(*key) {
            *value = f(value);
        }
    }
}

/// Strips known credential values out of free-form text
#[derive(Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl Redactor {
    /// Build a redactor for the given credential values
    ///
    /// Blank values are ignored. Longer values are replaced first so that a
    /// secret containing another secret is fully hidden.
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut secrets: Vec<String> = secrets
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        secrets.dedup();
        Self { secrets }
    }

    pub fn redact(&self, message: &str) -> String {
        let mut out = message.to_string();
        for secret in &self.secrets {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), REDACTED);
            }
            let encoded = urlencoding::encode(secret);
            let encoded: &str = &encoded;
            if encoded != secret.as_str() && out.contains(encoded) {
                out = out.replace(encoded, REDACTED);
            }
        }
        out
    }
}

impl std::fmt::Debug for Redactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redactor")
            .field("secrets", &self.secrets.len())
            .finish()
    }
}

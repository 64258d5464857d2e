//! At-rest encryption of provider credentials.
//!
//! Only the keys of a provider configuration bag that belong to the sensitive
//! field set are touched; everything else is passed through byte-for-byte.
//!
//! Stored form of an encrypted field:
//!
//! ```text
//! enc:v1:<base64(nonce || ciphertext || tag)>        string values
//! enc:v1+json:<base64(nonce || ciphertext || tag)>   numbers, booleans, objects
//! ```
//!
//! Each field gets a fresh 96-bit nonce on every call. `encrypt` takes
//! plaintext only and seals every non-empty sensitive value, whatever it looks
//! like. Decryption fails closed: a sensitive field that is not in the stored
//! form, or that does not authenticate, is an error.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{Map, Value};
use thiserror::Error;

/// Development-only key. Startup refuses it in production profiles.
pub const DEVELOPMENT_KEY: &[u8; 32] = b"ara-dispatch-development-key-32b";

/// Prefix of an encrypted string value
pub const ENCRYPTED_PREFIX: &str = "enc:v1:";

/// Prefix of an encrypted non-string JSON value
pub const ENCRYPTED_JSON_PREFIX: &str = "enc:v1+json:";

/// Replacement text used when displaying sensitive values
pub const MASK: &str = "********";

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// Normalised names of the fields stored encrypted
const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "apikey",
    "secret",
    "authtoken",
    "accesstoken",
    "privatekey",
    "clientsecret",
    "accountsid",
    "accountid",
];

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Refusing to start with the development encryption key in production")]
    PlaceholderKey,

    #[error("Encryption failed for field {field}")]
    EncryptionFailed { field: String },

    #[error("Decryption failed for field {field}: {reason}")]
    DecryptionFailed { field: String, reason: String },
}

/// Whether a configuration key holds a credential.
///
/// Matching ignores case and `_`/`-` separators, so `api_key`, `apiKey` and
/// `API-KEY` are all sensitive.
pub fn is_sensitive_field(key: &str) -> bool {
    let normalized: String = key
        .chars()
        .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    SENSITIVE_FIELDS.contains(&normalized.as_str())
}

/// AES-256-GCM field encryption for provider configuration bags
pub struct CredentialVault {
    cipher: Aes256Gcm,
    placeholder: bool,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("placeholder", &self.placeholder)
            .finish_non_exhaustive()
    }
}

impl CredentialVault {
    /// Create a vault from a raw 32-byte key
    pub fn new(key: &[u8]) -> Result<Self, VaultError> {
        if key.len() != KEY_SIZE {
            return Err(VaultError::InvalidKeyLength(key.len()));
        }
        let cipher =
            Aes256Gcm::new_from_slice(key).map_err(|_| VaultError::InvalidKeyLength(key.len()))?;

        Ok(Self {
            cipher,
            placeholder: key == DEVELOPMENT_KEY.as_slice(),
        })
    }

    /// Vault using the compiled-in development key
    pub fn development() -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(DEVELOPMENT_KEY)),
            placeholder: true,
        }
    }

    /// Build the process vault at startup.
    ///
    /// `key` is base64 of 32 bytes or a raw 32-character string. Without a key
    /// the development key is used, which is an error when `production` is set.
    pub fn from_config(key: Option<&str>, production: bool) -> Result<Self, VaultError> {
        let vault = match key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => Self::new(&parse_key(key)?)?,
            None => Self::development(),
        };

        if vault.placeholder {
            if production {
                return Err(VaultError::PlaceholderKey);
            }
            tracing::warn!("Using the development encryption key; set encryption.key before deploying");
        }

        Ok(vault)
    }

    /// Whether the development key is in use
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// Encrypt the sensitive fields of a plaintext configuration bag
    pub fn encrypt(&self, bag: &Map<String, Value>) -> Result<Map<String, Value>, VaultError> {
        let mut out = Map::with_capacity(bag.len());
        for (key, value) in bag {
            let stored = if is_sensitive_field(key) {
                self.encrypt_field(key, value)?
            } else {
                value.clone()
            };
            out.insert(key.clone(), stored);
        }
        Ok(out)
    }

    /// Decrypt the sensitive fields of a stored configuration bag
    pub fn decrypt(&self, bag: &Map<String, Value>) -> Result<Map<String, Value>, VaultError> {
        let mut out = Map::with_capacity(bag.len());
        for (key, value) in bag {
            let plain = if is_sensitive_field(key) {
                self.decrypt_field(key, value)?
            } else {
                value.clone()
            };
            out.insert(key.clone(), plain);
        }
        Ok(out)
    }

    /// Replace sensitive values with a fixed mask for display
    pub fn mask(bag: &Map<String, Value>) -> Map<String, Value> {
        bag.iter()
            .map(|(key, value)| {
                let shown = if is_sensitive_field(key) && !is_blank(value) {
                    Value::String(MASK.to_string())
                } else {
                    value.clone()
                };
                (key.clone(), shown)
            })
            .collect()
    }

    fn encrypt_field(&self, field: &str, value: &Value) -> Result<Value, VaultError> {
        let (prefix, plaintext) = match value {
            Value::Null => return Ok(Value::Null),
            Value::String(s) if s.is_empty() => return Ok(value.clone()),
            Value::String(s) => (ENCRYPTED_PREFIX, s.clone()),
            other => (ENCRYPTED_JSON_PREFIX, other.to_string()),
        };

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::EncryptionFailed {
                field: field.to_string(),
            })?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);

        Ok(Value::String(format!("{}{}", prefix, BASE64.encode(sealed))))
    }

    fn decrypt_field(&self, field: &str, value: &Value) -> Result<Value, VaultError> {
        let fail = |reason: &str| VaultError::DecryptionFailed {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        let stored = match value {
            Value::Null => return Ok(Value::Null),
            Value::String(s) if s.is_empty() => return Ok(value.clone()),
            Value::String(s) => s,
            _ => return Err(fail("value is not in encrypted form")),
        };

        let (is_json, encoded) = if let Some(rest) = stored.strip_prefix(ENCRYPTED_JSON_PREFIX) {
            (true, rest)
        } else if let Some(rest) = stored.strip_prefix(ENCRYPTED_PREFIX) {
            (false, rest)
        } else {
            return Err(fail("value is not in encrypted form"));
        };

        let sealed = BASE64
            .decode(encoded)
            .map_err(|_| fail("invalid base64"))?;
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(fail("ciphertext too short"));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| fail("authentication failed"))?;
        let text = String::from_utf8(plaintext).map_err(|_| fail("plaintext is not UTF-8"))?;

        if is_json {
            serde_json::from_str(&text).map_err(|_| fail("plaintext is not JSON"))
        } else {
            Ok(Value::String(text))
        }
    }
}

/// Parse a configured key: base64 of 32 bytes, or a raw 32-byte string
pub fn parse_key(key: &str) -> Result<Vec<u8>, VaultError> {
    if let Ok(decoded) = BASE64.decode(key) {
        if decoded.len() == KEY_SIZE {
            return Ok(decoded);
        }
    }
    if key.len() == KEY_SIZE {
        return Ok(key.as_bytes().to_vec());
    }
    Err(VaultError::InvalidKeyLength(key.len()))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

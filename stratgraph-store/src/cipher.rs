//! Obfuscated export envelope (`.tls` / `.tlsu`).
//!
//! Wire format: `base64(json {format: "tls", version: 1, owner, payload})`
//! where `payload = base64(xor(document_json, key))`. The key is a fixed
//! string for `.tls`; for `.tlsu` it is derived with BLAKE3 from the owner's
//! user id and `owner` holds the hex BLAKE3 digest of that id.
//!
//! This is an obfuscation wire format. It offers no confidentiality.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

pub const ENVELOPE_FORMAT: &str = "tls";
pub const ENVELOPE_VERSION: u32 = 1;

const STATIC_KEY: &[u8] = b"stratgraph/tls/static-key/v1";
const USER_KEY_CONTEXT: &str = "stratgraph 2024 tlsu per-user key";

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("envelope is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("envelope is not valid JSON: {0}")]
    Envelope(#[from] serde_json::Error),
    #[error("unsupported envelope {format} v{version}")]
    Unsupported { format: String, version: u32 },
    #[error("payload is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("file is bound to another user")]
    OwnerMismatch,
}

/// Which key seals a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKey<'a> {
    Static,
    User(&'a str),
}

impl CipherKey<'_> {
    fn bytes(&self) -> Vec<u8> {
        match self {
            CipherKey::Static => STATIC_KEY.to_vec(),
            CipherKey::User(user_id) => {
                blake3::derive_key(USER_KEY_CONTEXT, user_id.as_bytes()).to_vec()
            }
        }
    }

    fn owner(&self) -> Option<String> {
        match self {
            CipherKey::Static => None,
            CipherKey::User(user_id) => Some(owner_digest(user_id)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    format: String,
    version: u32,
    owner: Option<String>,
    payload: String,
}

/// Hex BLAKE3 digest identifying a user inside `.tlsu` envelopes.
pub fn owner_digest(user_id: &str) -> String {
    blake3::hash(user_id.as_bytes()).to_hex().to_string()
}

/// Repeating-key XOR. Applying it twice with the same key is the identity.
pub fn xor(data: &[u8], key: &[u8]) -> Vec<u8> {
    if key.is_empty() {
        return data.to_vec();
    }
    data.iter()
        .zip(key.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect()
}

/// Seal a document's JSON text into envelope text.
pub fn seal(json: &str, key: CipherKey<'_>) -> String {
    let envelope = Envelope {
        format: ENVELOPE_FORMAT.to_string(),
        version: ENVELOPE_VERSION,
        owner: key.owner(),
        payload: BASE64.encode(xor(json.as_bytes(), &key.bytes())),
    };
    // Envelope has only string and integer fields.
    let inner = serde_json::to_string(&envelope).unwrap_or_default();
    BASE64.encode(inner)
}

/// Open envelope text, returning the document JSON.
///
/// A `.tlsu` envelope opens only for the user whose digest it carries.
pub fn open(text: &str, user_id: &str) -> Result<String, CipherError> {
    let inner = BASE64.decode(text.trim())?;
    let envelope: Envelope = serde_json::from_slice(&inner)?;
    if envelope.format != ENVELOPE_FORMAT || envelope.version != ENVELOPE_VERSION {
        return Err(CipherError::Unsupported {
            format: envelope.format,
            version: envelope.version,
        });
    }
    let key = match envelope.owner.as_deref() {
        None => CipherKey::Static,
        Some(owner) if owner == owner_digest(user_id) => CipherKey::User(user_id),
        Some(_) => return Err(CipherError::OwnerMismatch),
    };
    let payload = BASE64.decode(envelope.payload.as_bytes())?;
    Ok(String::from_utf8(xor(&payload, &key.bytes()))?)
}

use crate::model::{DiagramKind, GenerationRequest};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex SHA-256 digest identifying a cacheable generation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }

    /// Rehydrates a digest read back from storage.
    pub fn from_hex(s: &str) -> Option<Self> {
        let valid = s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        valid.then(|| Fingerprint(s.to_string()))
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Fingerprint::from_hex(&s).ok_or_else(|| format!("not a sha-256 hex digest: '{}'", s))
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> String {
        fp.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// Trims the prompt and collapses every inner whitespace run to one space.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The canonical `key=value` lines hashed into the fingerprint, sorted by key.
pub fn components(req: &GenerationRequest) -> Vec<String> {
    // Layout only changes graph output; other kinds fold it to a constant.
    let layout = match req.kind() {
        DiagramKind::Graph => req.layout().as_str(),
        DiagramKind::Breakdown | DiagramKind::Timeline => "-",
    };

    let mut parts = vec![
        format!("prompt={}", normalize_prompt(req.prompt())),
        format!("kind={}", req.kind().as_str()),
        format!("format={}", req.format().as_str()),
        format!("layout={}", layout),
        format!("provider={}", req.model().provider.trim().to_lowercase()),
        format!("model={}", req.model().model.trim().to_lowercase()),
    ];
    parts.sort_by(|a, b| key_of(a).cmp(key_of(b)));
    parts
}

fn key_of(part: &str) -> &str {
    part.split_once('=').map(|(k, _)| k).unwrap_or(part)
}

/// Computes the cache fingerprint of a request. Pure and total.
pub fn compute(req: &GenerationRequest) -> Fingerprint {
    let raw = components(req).join("\n");
    Fingerprint(sha256_hex(&raw))
}

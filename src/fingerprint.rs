use sha2::{Digest, Sha256};
use std::fmt;

/// A stable, content-addressed key derived from a URL's bytes.
///
/// Fingerprints are pure: the same URL string always produces the same fingerprint, on every
/// platform. This is *not* a normalized form — callers are responsible for feeding in the
/// absolute/canonical URL string they intend to treat as identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint for a URL string.
    pub fn new(url: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let digest = hasher.finalize();
        // 32 hex chars, i.e. the first 16 bytes of the sha256 digest. Collisions are treated as
        // cache-key equality, which is acceptable for this use case.
        let hex = digest[..16]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<String>();
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap an already-computed hex digest (e.g. one read back from on-disk metadata) without
    /// re-hashing it. Use [`Fingerprint::new`] when starting from a URL.
    pub(crate) fn from_hex(hex: &str) -> Self {
        Self(hex.to_string())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

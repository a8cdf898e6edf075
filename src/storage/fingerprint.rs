use sha1::{Digest, Sha1};
use std::fmt;

const FINGERPRINT_LENGTH: usize = 20;

/// Content fingerprint of a file. Only ever compared for equality between sync ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    value: [u8; FINGERPRINT_LENGTH],
}

impl Fingerprint {
    /// Calculate the fingerprint of the given content
    pub fn from_content(content: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(content);
        let result = hasher.finalize();
        let mut value = [0u8; FINGERPRINT_LENGTH];
        value.copy_from_slice(&result[..FINGERPRINT_LENGTH]);
        Fingerprint { value }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.value))
    }
}

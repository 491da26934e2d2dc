//! SHA-256 digests over structured build inputs.
//!
//! Every value is length-prefixed, so `["ab", "c"]` and `["a", "bc"]` never
//! collide, and lists carry their element count so adjacent lists cannot
//! trade elements.

use sha2::{Digest, Sha256};

/// Incremental digest of labelled fields.
#[derive(Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    pub fn new() -> Self {
        Fingerprint::default()
    }

    fn write(&mut self, bytes: &[u8]) {
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }

    /// Start a named group of fields.
    pub fn section(&mut self, name: &str) -> &mut Self {
        self.hasher.update(b"S");
        self.write(name.as_bytes());
        self
    }

    pub fn field(&mut self, value: &str) -> &mut Self {
        self.hasher.update(b"F");
        self.write(value.as_bytes());
        self
    }

    /// A field that may be unset; unset differs from empty.
    pub fn optional(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            Some(value) => self.field(value),
            None => {
                self.hasher.update(b"N");
                self
            }
        }
    }

    pub fn list<'a>(&mut self, items: impl IntoIterator<Item = &'a str>) -> &mut Self {
        let items: Vec<&str> = items.into_iter().collect();
        self.hasher.update(b"L");
        self.hasher.update((items.len() as u64).to_le_bytes());
        for item in items {
            self.write(item.as_bytes());
        }
        self
    }

    /// Hex-encoded digest.
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

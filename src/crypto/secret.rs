use std::fmt;

use zeroize::Zeroize;

/// Key material that is wiped when destroyed or dropped.
///
/// A destroyed secret stays destroyed. Using it afterwards is an
/// `internal_error`, never silent use of zeroes.
#[derive(Clone, Default)]
pub struct Secret {
    bytes: Vec<u8>,
    destroyed: bool,
}

impl Secret {
    pub fn new(bytes: Vec<u8>) -> Self {
        Secret {
            bytes,
            destroyed: false,
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }

    /// The key bytes, unless destroyed.
    pub fn expose(&self) -> Result<&[u8], crate::Error> {
        if self.destroyed {
            return Err(crate::Error::internal("use of destroyed secret"));
        }
        Ok(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Zero the bytes and mark the secret unusable.
    pub fn destroy(&mut self) {
        self.bytes.zeroize();
        self.bytes = Vec::new();
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("len", &self.bytes.len())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        // Not constant time. Only used by tests comparing both peers.
        self.destroyed == other.destroyed && self.bytes == other.bytes
    }
}

impl Eq for Secret {}

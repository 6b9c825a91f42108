//! SHA-1 piece digests.

use sha1::{Digest, Sha1};

use crate::constants::PIECE_HASH_SIZE;

/// A piece digest.
pub type PieceHash = [u8; PIECE_HASH_SIZE];

/// Incremental SHA-1 hasher for piece data.
pub struct PieceHasher {
    inner: Sha1,
}

impl PieceHasher {
    pub fn new() -> Self {
        Self { inner: Sha1::new() }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> PieceHash {
        self.inner.finalize().into()
    }
}

impl Default for PieceHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hashes a complete buffer in one call.
pub fn sha1_of(data: &[u8]) -> PieceHash {
    let mut hasher = PieceHasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// A digest over a borrowed buffer, computed on first use and memoized.
///
/// The resume scan evaluates two hypotheses for every filled buffer (full
/// piece vs. the short last piece) but usually needs only one of them.
pub(crate) struct LazyHash<'a> {
    data: &'a [u8],
    digest: Option<PieceHash>,
}

impl<'a> LazyHash<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, digest: None }
    }

    pub fn get(&mut self) -> PieceHash {
        *self.digest.get_or_insert_with(|| sha1_of(self.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_matches_one_shot() {
        let mut hasher = PieceHasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finalize(), sha1_of(b"hello world"));
    }

    #[test]
    fn lazy_hash_is_stable_across_calls() {
        let data = b"some piece bytes";
        let mut lazy = LazyHash::new(data);
        let first = lazy.get();
        assert_eq!(first, lazy.get());
        assert_eq!(first, sha1_of(data));
    }

    #[test]
    fn prefix_digest_differs_from_full() {
        let data = [7u8; 32];
        let mut full = LazyHash::new(&data);
        let mut short = LazyHash::new(&data[..16]);
        assert_ne!(full.get(), short.get());
    }
}

//! Tuning parameters for the storage engine.
//!
//! These values match the defaults of the classic libtorrent slot storage.

/// Number of unallocated slots promoted per allocation batch.
///
/// Larger batches amortize the zero-fill cost; smaller batches keep the
/// table lock hold time down while a write waits for a free slot.
pub const SLOT_ALLOCATION_BATCH: usize = 5;

/// Size of a piece digest in bytes (SHA-1).
pub const PIECE_HASH_SIZE: usize = 20;

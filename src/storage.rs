//! Slot-based piece storage.
//!
//! This module maps a torrent's fixed-size pieces onto its ordered list of
//! files and coordinates concurrent reads and writes from many workers.
//!
//! # Overview
//!
//! Physically a torrent is stored in piece-sized *slots*: slot `k` covers
//! the absolute byte range `[k * L, min((k + 1) * L, total))`. A piece does
//! not have to live in its own slot; two indirection tables record which
//! slot holds which piece, so content written in download order survives a
//! restart even when it landed out of place. The tables are never persisted
//! to disk; [`PieceManager::check_pieces`] rebuilds them on every startup by
//! hashing whatever is already there.
//!
//! # Components
//!
//! - [`PieceManager`] - piece-level reads and writes, slot assignment, the
//!   startup scan, and the batch slot allocator
//! - [`SlotStorage`] - slot-level file I/O with per-slot exclusive locking
//! - [`PieceHasher`] / [`PieceHash`] - SHA-1 piece digests
//! - [`SlotState`] - per-slot entry of the slot-to-piece table
//! - [`CheckerData`] - progress/abort cell shared with the checking UI
//!
//! # Examples
//!
//! ```no_run
//! use rstor::{Bitfield, CheckerData, Manifest, PieceManager};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manifest = Arc::new(Manifest::new(
//!     vec![
//!         (PathBuf::from("file1.txt"), 1000),
//!         (PathBuf::from("file2.txt"), 500),
//!     ],
//!     512,
//!     vec![[0u8; 20]; 3],
//! )?);
//!
//! let manager = PieceManager::new(manifest, PathBuf::from("./downloads"));
//!
//! // Verify what is already on disk.
//! let checker = parking_lot::Mutex::new(CheckerData::default());
//! let mut have = Bitfield::new(3);
//! manager.check_pieces(&checker, &mut have).await?;
//!
//! // Write a piece and read it back.
//! let data = vec![0u8; 512];
//! manager.write(&data, 0, 0).await?;
//! let piece = manager.read_piece(0).await?;
//! # Ok(())
//! # }
//! ```

mod digest;
mod error;
mod layout;
mod manager;
mod slots;

pub use digest::{sha1_of, PieceHash, PieceHasher};
pub use error::StorageError;
pub use manager::{CheckerData, PieceManager, SlotState};
pub use slots::SlotStorage;

//! rstor - A BitTorrent piece storage engine
//!
//! This library maps the fixed-size pieces of a torrent onto regular files
//! on disk, verifies existing content against the manifest's digest table,
//! and coordinates concurrent piece I/O from many workers. Metadata parsing,
//! peer and tracker protocols, and rate control live elsewhere; the engine
//! takes a pre-parsed [`Manifest`] and a save path.
//!
//! # Modules
//!
//! - [`manifest`] - The read-only description of a torrent's files and digests
//! - [`storage`] - Slot I/O, the piece manager, and the startup scan
//! - [`bitfield`] - The have-piece bitmap exchanged with the engine
//! - [`constants`] - Tuning parameters

pub mod bitfield;
pub mod constants;
pub mod manifest;
pub mod storage;

pub use bitfield::Bitfield;
pub use manifest::{FileEntry, Manifest, ManifestError};
pub use storage::{
    sha1_of, CheckerData, PieceHash, PieceHasher, PieceManager, SlotState, SlotStorage,
    StorageError,
};

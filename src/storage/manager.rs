use std::collections::VecDeque;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::AsyncSeekExt;
use tokio::sync::Mutex as TokioMutex;

use crate::bitfield::Bitfield;
use crate::constants::SLOT_ALLOCATION_BATCH;
use crate::manifest::Manifest;
use crate::storage::digest::LazyHash;
use crate::storage::error::StorageError;
use crate::storage::slots::{read_until_eof, SlotStorage};

/// Progress and cancellation cell for a running piece check, shared with
/// whichever thread drives the UI. The checker writes `progress` and polls
/// `abort` at every slot boundary.
#[derive(Debug, Default, Clone, Copy)]
pub struct CheckerData {
    pub progress: f32,
    pub abort: bool,
}

/// The state of one slot in the slot-to-piece table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// No file bytes have been materialized for this slot yet.
    Unallocated,
    /// The slot's bytes exist on disk but no piece is bound to it.
    Free,
    /// The slot holds the given piece.
    Bound(usize),
}

/// The paired indirection tables and slot pools.
///
/// `piece_to_slot[p] == Some(s)` iff `slot_to_piece[s] == Bound(p)`; the
/// free and unallocated pools mirror the `Free`/`Unallocated` entries; the
/// three slot populations partition the slot range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Tables {
    pub(crate) piece_to_slot: Vec<Option<usize>>,
    pub(crate) slot_to_piece: Vec<SlotState>,
    pub(crate) unallocated_slots: VecDeque<usize>,
    pub(crate) free_slots: Vec<usize>,
    pub(crate) bytes_left: u64,
}

impl Tables {
    fn new(manifest: &Manifest) -> Self {
        let n = manifest.num_pieces();
        Self {
            piece_to_slot: vec![None; n],
            slot_to_piece: vec![SlotState::Unallocated; n],
            unallocated_slots: (0..n).collect(),
            free_slots: Vec::new(),
            bytes_left: manifest.total_size(),
        }
    }

    /// Empties the tables for a fresh scan. The slot pools start empty and
    /// are refilled slot by slot as the scan classifies the disk contents.
    fn reset_for_scan(&mut self, manifest: &Manifest) {
        let n = manifest.num_pieces();
        self.piece_to_slot = vec![None; n];
        self.slot_to_piece = vec![SlotState::Unallocated; n];
        self.unallocated_slots.clear();
        self.free_slots.clear();
        self.bytes_left = manifest.total_size();
    }

    fn bind(&mut self, piece: usize, slot: usize) {
        self.slot_to_piece[slot] = SlotState::Bound(piece);
        self.piece_to_slot[piece] = Some(slot);
    }

    fn check_invariant(&self, manifest: &Manifest) {
        if !cfg!(debug_assertions) {
            return;
        }

        let n = manifest.num_pieces();
        let mut bound = 0usize;
        for s in 0..n {
            match self.slot_to_piece[s] {
                SlotState::Bound(p) => {
                    // the last slot can hold a foreign piece only when it
                    // is not actually short
                    debug_assert!(
                        s != n - 1
                            || p == n - 1
                            || manifest.piece_size(n - 1) == manifest.piece_length(),
                        "short slot {s} bound to full-length piece {p}"
                    );
                    debug_assert_eq!(self.piece_to_slot[p], Some(s));
                    bound += 1;
                }
                SlotState::Free => {
                    debug_assert_eq!(
                        self.free_slots.iter().filter(|&&x| x == s).count(),
                        1,
                        "free slot {s} missing or duplicated in the free pool"
                    );
                }
                SlotState::Unallocated => {
                    debug_assert!(
                        self.unallocated_slots.contains(&s),
                        "unallocated slot {s} missing from the unallocated pool"
                    );
                }
            }
        }

        for p in 0..n {
            if let Some(s) = self.piece_to_slot[p] {
                debug_assert_eq!(self.slot_to_piece[s], SlotState::Bound(p));
            }
        }

        debug_assert_eq!(
            self.free_slots.len() + self.unallocated_slots.len() + bound,
            n
        );

        let left: u64 = (0..n)
            .filter(|&p| self.piece_to_slot[p].is_none())
            .map(|p| manifest.piece_size(p))
            .sum();
        debug_assert_eq!(self.bytes_left, left);
    }
}

/// Maps torrent pieces onto disk slots and coordinates concurrent access.
///
/// Pieces may live in slots other than their natural position, so content
/// written in arrival order survives a restart; the indirection tables are
/// rebuilt from disk by [`check_pieces`](Self::check_pieces) on every
/// startup, never persisted.
pub struct PieceManager {
    manifest: Arc<Manifest>,
    slots: SlotStorage,
    save_path: PathBuf,
    tables: TokioMutex<Tables>,
    alloc_guard: TokioMutex<()>,
}

impl PieceManager {
    pub fn new(manifest: Arc<Manifest>, save_path: PathBuf) -> Self {
        let slots = SlotStorage::new(manifest.clone(), save_path.clone());
        let tables = Tables::new(&manifest);
        Self {
            manifest,
            slots,
            save_path,
            tables: TokioMutex::new(tables),
            alloc_guard: TokioMutex::new(()),
        }
    }

    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    /// Total size of the pieces that have no slot assigned yet.
    pub async fn bytes_left(&self) -> u64 {
        self.tables.lock().await.bytes_left
    }

    /// Scans the files on disk and rebuilds the indirection tables,
    /// marking every piece whose digest matches in `pieces`.
    ///
    /// `pieces` may be pre-populated with externally known state; matching
    /// slots for pre-marked pieces other than the one under the cursor are
    /// skipped during the digest search. Progress lands in `checker` at
    /// every slot boundary; if its abort flag is set the scan returns early
    /// and the engine must be discarded.
    pub async fn check_pieces(
        &self,
        checker: &parking_lot::Mutex<CheckerData>,
        pieces: &mut Bitfield,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().await;
        let t = &mut *tables;
        t.reset_for_scan(&self.manifest);

        let n = self.manifest.num_pieces();
        let piece_len = self.manifest.piece_length();
        let last_len = self.manifest.piece_size(n - 1) as usize;

        let mut piece_data = vec![0u8; piece_len as usize];
        // fill position within piece_data
        let mut piece_offset = 0usize;

        let mut current_slot = 0usize;
        let mut bytes_to_read = self.manifest.piece_size(0);
        // how far into the next file the next piece boundary lies, after a hole
        let mut seek_into_next = 0u64;
        // absolute stream offset where the piece under accumulation began
        let mut start_of_read = 0u64;
        let mut start_of_file = 0u64;

        checker.lock().progress = 0.0;

        'files: for entry in self.manifest.files() {
            let path = self.save_path.join(&entry.path);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let mut file = None;
            let mut filesize = 0u64;
            match File::open(&path).await {
                Ok(mut f) => {
                    filesize = f.metadata().await?.len();
                    if seek_into_next > 0 {
                        f.seek(SeekFrom::Start(seek_into_next)).await?;
                    }
                    file = Some(f);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            let mut bytes_current_read = seek_into_next;

            loop {
                {
                    let mut c = checker.lock();
                    c.progress = current_slot as f32 / n as f32;
                    if c.abort {
                        return Ok(());
                    }
                }

                if current_slot == n {
                    break 'files;
                }

                // at the start of a piece, remember where it begins
                if bytes_to_read == self.manifest.piece_size(current_slot) {
                    start_of_read = current_slot as u64 * piece_len;
                }

                let mut bytes_read = 0usize;
                if filesize > 0 {
                    if let Some(f) = file.as_mut() {
                        let end = piece_offset + bytes_to_read as usize;
                        bytes_read = read_until_eof(f, &mut piece_data[piece_offset..end]).await?;
                    }
                }
                bytes_current_read += bytes_read as u64;
                bytes_to_read -= bytes_read as u64;

                if bytes_to_read > 0 {
                    // this file could not complete the piece
                    if bytes_current_read != entry.length {
                        // the file is missing or shorter than the manifest
                        // says: every piece boundary from the piece under
                        // accumulation to the file's declared end is a hole
                        let file_end = start_of_file + entry.length;
                        let mut pos = start_of_read;
                        while pos < file_end {
                            t.unallocated_slots.push_back(current_slot);
                            current_slot += 1;
                            pos += piece_len;
                        }
                        seek_into_next = pos - file_end;
                        bytes_to_read = if current_slot < n {
                            self.manifest.piece_size(current_slot)
                        } else {
                            0
                        };
                        piece_offset = 0;
                    } else {
                        seek_into_next = 0;
                        piece_offset += bytes_read;
                    }
                    break;
                }

                // a full piece is buffered; evaluate both the full-length
                // and the short last-piece hypotheses lazily
                let mut full_digest = LazyHash::new(&piece_data[..]);
                let mut short_digest = LazyHash::new(&piece_data[..last_len]);

                let mut found = None;
                for i in 0..n {
                    if pieces.has_piece(i) && i != current_slot {
                        continue;
                    }
                    let hash = if i == n - 1 {
                        short_digest.get()
                    } else {
                        full_digest.get()
                    };
                    if &hash == self.manifest.hash_for_piece(i) {
                        found = Some(i);
                    }
                }

                if let Some(found) = found {
                    match t.piece_to_slot[found] {
                        Some(old_slot) => {
                            // duplicate copy of a piece seen earlier in the
                            // scan; keep the newer one, demote the old slot
                            t.slot_to_piece[old_slot] = SlotState::Free;
                            t.free_slots.push(old_slot);
                        }
                        None => {
                            t.bytes_left -= self.manifest.piece_size(found);
                        }
                    }
                    t.bind(found, current_slot);
                    pieces.set_piece(found);
                } else {
                    t.slot_to_piece[current_slot] = SlotState::Free;
                    t.free_slots.push(current_slot);
                }

                piece_offset = 0;
                current_slot += 1;
                if current_slot == n {
                    break 'files;
                }
                bytes_to_read = self.manifest.piece_size(current_slot);
            }

            start_of_file += entry.length;
        }

        checker.lock().progress = 1.0;

        tracing::debug!(
            have = pieces.count(),
            free = t.free_slots.len(),
            unallocated = t.unallocated_slots.len(),
            pieces = n,
            "piece check complete"
        );

        t.check_invariant(&self.manifest);
        Ok(())
    }

    /// Reads from a piece into `buf`, starting at `offset` within the piece.
    ///
    /// Returns the number of bytes read; the count is truncated at the
    /// piece end, and missing file bytes shorten it further.
    pub async fn read(
        &self,
        buf: &mut [u8],
        piece: usize,
        offset: u64,
    ) -> Result<usize, StorageError> {
        if piece >= self.manifest.num_pieces() {
            return Err(StorageError::InvalidPieceIndex(piece));
        }

        let slot = {
            let tables = self.tables.lock().await;
            tables.piece_to_slot[piece].ok_or(StorageError::PieceNotPresent(piece))?
        };

        self.slots.read(buf, slot, offset).await
    }

    /// Reads a whole piece into an owned buffer.
    pub async fn read_piece(&self, piece: usize) -> Result<Bytes, StorageError> {
        if piece >= self.manifest.num_pieces() {
            return Err(StorageError::InvalidPieceIndex(piece));
        }

        let mut buf = vec![0u8; self.manifest.piece_size(piece) as usize];
        let got = self.read(&mut buf, piece, 0).await?;
        buf.truncate(got);
        Ok(Bytes::from(buf))
    }

    /// Writes `buf` to a piece, assigning it a slot first if it has none.
    ///
    /// The count is truncated at the piece end. On an I/O failure the slot
    /// binding is not rolled back; the piece is re-verified by the next
    /// startup scan.
    pub async fn write(&self, buf: &[u8], piece: usize, offset: u64) -> Result<(), StorageError> {
        let slot = {
            let mut tables = self.tables.lock().await;
            self.slot_for_piece(&mut tables, piece).await?
        };

        self.slots.write(buf, slot, offset).await
    }

    /// Promotes up to `num_slots` unallocated slots into the free pool,
    /// zero-filling their bytes on disk.
    pub async fn allocate_slots(&self, num_slots: usize) -> Result<(), StorageError> {
        let _allocating = self.alloc_guard.lock().await;
        let mut tables = self.tables.lock().await;
        self.allocate_locked(&mut tables, num_slots).await
    }

    /// Returns the slot holding `piece`, assigning one if necessary.
    ///
    /// Prefers the piece's natural slot when it is free; otherwise takes
    /// the highest-indexed free slot, never handing the short last slot to
    /// a full-length piece. When the natural slot is held by another piece,
    /// that piece's bytes are moved out and the natural slot is claimed.
    async fn slot_for_piece(
        &self,
        t: &mut Tables,
        piece: usize,
    ) -> Result<usize, StorageError> {
        let n = self.manifest.num_pieces();
        if piece >= n {
            return Err(StorageError::InvalidPieceIndex(piece));
        }

        t.check_invariant(&self.manifest);

        if let Some(slot) = t.piece_to_slot[piece] {
            return Ok(slot);
        }

        if t.free_slots.is_empty() {
            self.allocate_locked(t, SLOT_ALLOCATION_BATCH).await?;
            debug_assert!(!t.free_slots.is_empty());
        }

        let index = match t.free_slots.iter().position(|&s| s == piece) {
            Some(natural) => natural,
            None => {
                let mut index = t.free_slots.len() - 1;
                // the short last slot can only hold the short last piece
                if t.free_slots[index] == n - 1 && piece != n - 1 {
                    if t.free_slots.len() == 1 {
                        self.allocate_locked(t, SLOT_ALLOCATION_BATCH).await?;
                    }
                    debug_assert!(t.free_slots.len() > 1);
                    index = t.free_slots.len() - 1;
                    if t.free_slots[index] == n - 1 {
                        index -= 1;
                    }
                }
                index
            }
        };

        let mut slot = t.free_slots.remove(index);
        debug_assert_eq!(t.slot_to_piece[slot], SlotState::Free);
        t.bind(piece, slot);
        t.bytes_left -= self.manifest.piece_size(piece);

        if slot != piece {
            if let SlotState::Bound(displaced) = t.slot_to_piece[piece] {
                // another piece occupies this piece's natural slot; move its
                // bytes to the slot we just picked and take the natural one
                tracing::debug!(
                    piece,
                    slot,
                    displaced,
                    "natural slot occupied, swapping piece contents"
                );

                let mut moved = vec![0u8; self.manifest.piece_length() as usize];
                self.slots.read(&mut moved, piece, 0).await?;
                self.slots.write(&moved, slot, 0).await?;

                t.slot_to_piece.swap(piece, slot);
                t.piece_to_slot.swap(piece, displaced);
                slot = piece;
            }
        }

        t.check_invariant(&self.manifest);
        Ok(slot)
    }

    /// Allocator body; the table guard is the caller's.
    async fn allocate_locked(&self, t: &mut Tables, num_slots: usize) -> Result<(), StorageError> {
        t.check_invariant(&self.manifest);

        let zeros = vec![0u8; self.manifest.piece_length() as usize];

        let mut allocated = 0usize;
        while allocated < num_slots {
            let Some(slot) = t.unallocated_slots.pop_front() else {
                break;
            };
            let slot_size = self.manifest.piece_size(slot) as usize;

            if let Some(home) = t.piece_to_slot[slot] {
                // the piece with this slot's index already lives elsewhere;
                // move it into its just-materialized natural slot and free
                // the slot it came from
                tracing::trace!(slot, from = home, "relocating piece into its natural slot");

                let mut moved = vec![0u8; slot_size];
                self.slots.read(&mut moved, home, 0).await?;
                self.slots.write(&moved, slot, 0).await?;

                t.bind(slot, slot);
                t.slot_to_piece[home] = SlotState::Free;
                t.free_slots.push(home);
            } else {
                self.slots.write(&zeros[..slot_size], slot, 0).await?;
                t.slot_to_piece[slot] = SlotState::Free;
                t.free_slots.push(slot);
            }

            allocated += 1;
        }

        t.check_invariant(&self.manifest);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn tables_snapshot(&self) -> Tables {
        self.tables.lock().await.clone()
    }
}

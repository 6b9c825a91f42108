//! Slot-level disk I/O.
//!
//! A slot is a piece-sized window of the torrent's byte stream. Reads and
//! writes address one slot at a time; a single call may still touch several
//! files when the slot straddles a file boundary. Every call holds that
//! slot's lock for its full duration, so same-slot operations serialize
//! while distinct slots proceed in parallel.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::manifest::Manifest;
use crate::storage::error::StorageError;
use crate::storage::layout;

pub struct SlotStorage {
    manifest: Arc<Manifest>,
    save_path: PathBuf,
    locks: Vec<Mutex<()>>,
}

impl SlotStorage {
    pub fn new(manifest: Arc<Manifest>, save_path: PathBuf) -> Self {
        let locks = (0..manifest.num_pieces()).map(|_| Mutex::new(())).collect();
        Self {
            manifest,
            save_path,
            locks,
        }
    }

    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    fn file_path(&self, file_index: usize) -> PathBuf {
        self.save_path.join(&self.manifest.files()[file_index].path)
    }

    /// Reads into `buf` from the given slot, starting at `offset` within it.
    ///
    /// The count is truncated at the slot end. Returns the number of bytes
    /// actually read; a missing file or one shorter than its manifest size
    /// ends the read early, so the return value may fall short of the
    /// truncated count.
    pub async fn read(
        &self,
        buf: &mut [u8],
        slot: usize,
        offset: u64,
    ) -> Result<usize, StorageError> {
        assert!(!buf.is_empty());
        assert!(slot < self.manifest.num_pieces());
        let slot_size = self.manifest.piece_size(slot);
        assert!(offset < slot_size);

        let _guard = self.locks[slot].lock().await;

        let effective = (buf.len() as u64).min(slot_size - offset);
        let start = slot as u64 * self.manifest.piece_length() + offset;
        let runs = layout::runs(&self.manifest, start, effective)?;

        let mut filled = 0usize;
        for run in runs {
            let path = self.file_path(run.file_index);
            let mut file = match File::open(&path).await {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
                Err(e) => return Err(e.into()),
            };
            file.seek(SeekFrom::Start(run.file_offset)).await?;

            let want = run.length as usize;
            let got = read_until_eof(&mut file, &mut buf[filled..filled + want]).await?;
            filled += got;
            if got < want {
                break;
            }
        }

        Ok(filled)
    }

    /// Writes `buf` to the given slot, starting at `offset` within it.
    ///
    /// The count is truncated at the slot end; bytes past it are silently
    /// dropped. Target files are created on demand and opened for in-place
    /// update, never truncated.
    pub async fn write(&self, buf: &[u8], slot: usize, offset: u64) -> Result<(), StorageError> {
        assert!(!buf.is_empty());
        assert!(slot < self.manifest.num_pieces());
        let slot_size = self.manifest.piece_size(slot);
        assert!(offset < slot_size);

        let _guard = self.locks[slot].lock().await;

        let effective = (buf.len() as u64).min(slot_size - offset);
        let start = slot as u64 * self.manifest.piece_length() + offset;
        let runs = layout::runs(&self.manifest, start, effective)?;

        let mut written = 0usize;
        for run in runs {
            let path = self.file_path(run.file_index);
            let mut file = open_for_update(&path).await?;
            file.seek(SeekFrom::Start(run.file_offset)).await?;

            let len = run.length as usize;
            file.write_all(&buf[written..written + len]).await?;
            // handles are per-operation; flush before the handle drops so
            // the write has actually landed when this call returns
            file.flush().await?;
            written += len;
        }

        Ok(())
    }
}

async fn open_for_update(path: &Path) -> Result<File, StorageError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .await?;

    Ok(file)
}

/// Reads until `buf` is full or the file runs out of bytes.
pub(crate) async fn read_until_eof(file: &mut File, buf: &mut [u8]) -> Result<usize, StorageError> {
    let mut got = 0usize;
    while got < buf.len() {
        let n = file.read(&mut buf[got..]).await?;
        if n == 0 {
            break;
        }
        got += n;
    }
    Ok(got)
}

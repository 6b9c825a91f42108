use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("offset {offset} is past the end of the torrent ({total} bytes)")]
    OffsetOutOfRange { offset: u64, total: u64 },

    #[error("invalid piece index: {0}")]
    InvalidPieceIndex(usize),

    #[error("piece {0} is not present in storage")]
    PieceNotPresent(usize),
}

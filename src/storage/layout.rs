//! Mapping between the torrent's virtual byte stream and its files.
//!
//! A torrent is one contiguous stream of bytes cut into pieces, but on disk
//! it is an ordered list of files of arbitrary sizes. The functions here
//! translate stream offsets into file positions; they are pure functions of
//! the manifest and never touch the filesystem.

use crate::manifest::Manifest;
use crate::storage::error::StorageError;

/// A contiguous range within a single file, produced by [`runs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileRun {
    pub file_index: usize,
    pub file_offset: u64,
    pub length: u64,
}

/// Translates an absolute stream offset into `(file index, in-file offset)`.
pub(crate) fn locate(manifest: &Manifest, offset: u64) -> Result<(usize, u64), StorageError> {
    if offset >= manifest.total_size() {
        return Err(StorageError::OffsetOutOfRange {
            offset,
            total: manifest.total_size(),
        });
    }

    for (index, file) in manifest.files().iter().enumerate() {
        if file.contains_offset(offset) {
            return Ok((index, offset - file.offset));
        }
    }

    unreachable!("offset below total size must fall inside a file");
}

/// Splits the stream range `[offset, offset + length)` into per-file runs,
/// in manifest order. The range is truncated at the end of the stream.
pub(crate) fn runs(
    manifest: &Manifest,
    offset: u64,
    length: u64,
) -> Result<Vec<FileRun>, StorageError> {
    let (mut file_index, mut file_offset) = locate(manifest, offset)?;

    let mut remaining = length.min(manifest.total_size() - offset);
    let mut out = Vec::new();

    while remaining > 0 {
        let file = &manifest.files()[file_index];
        let available = file.length - file_offset;
        let take = remaining.min(available);

        out.push(FileRun {
            file_index,
            file_offset,
            length: take,
        });

        remaining -= take;
        file_index += 1;
        file_offset = 0;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn manifest() -> Manifest {
        // files a=3, b=5, c=4; piece length 4; 3 pieces
        Manifest::new(
            vec![
                (PathBuf::from("a"), 3),
                (PathBuf::from("b"), 5),
                (PathBuf::from("c"), 4),
            ],
            4,
            vec![[0u8; 20]; 3],
        )
        .unwrap()
    }

    #[test]
    fn locate_picks_the_right_file() {
        let m = manifest();
        assert_eq!(locate(&m, 0).unwrap(), (0, 0));
        assert_eq!(locate(&m, 2).unwrap(), (0, 2));
        assert_eq!(locate(&m, 3).unwrap(), (1, 0));
        assert_eq!(locate(&m, 7).unwrap(), (1, 4));
        assert_eq!(locate(&m, 11).unwrap(), (2, 3));
    }

    #[test]
    fn locate_rejects_end_of_stream() {
        let m = manifest();
        assert!(matches!(
            locate(&m, 12),
            Err(StorageError::OffsetOutOfRange { offset: 12, .. })
        ));
    }

    #[test]
    fn runs_split_across_file_boundaries() {
        let m = manifest();
        // slot 1: bytes [4, 8) lie entirely within file b
        assert_eq!(
            runs(&m, 4, 4).unwrap(),
            vec![FileRun {
                file_index: 1,
                file_offset: 1,
                length: 4
            }]
        );
        // bytes [2, 10) touch all three files
        assert_eq!(
            runs(&m, 2, 8).unwrap(),
            vec![
                FileRun {
                    file_index: 0,
                    file_offset: 2,
                    length: 1
                },
                FileRun {
                    file_index: 1,
                    file_offset: 0,
                    length: 5
                },
                FileRun {
                    file_index: 2,
                    file_offset: 0,
                    length: 2
                },
            ]
        );
    }

    #[test]
    fn runs_truncate_at_total_size() {
        let m = manifest();
        let r = runs(&m, 10, 100).unwrap();
        assert_eq!(
            r,
            vec![FileRun {
                file_index: 2,
                file_offset: 2,
                length: 2
            }]
        );
    }
}

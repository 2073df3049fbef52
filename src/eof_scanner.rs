use std::{
    fs::File,
    io::{self, Read, Seek},
    path::Path,
};

use crate::{cursor::ByteCursor, Position};

/// Chunk size used by `EofScanner::default()`.
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Computes position of the last line of a file without reading the whole file.
///
/// The file is read backwards from its end in chunks of fixed size until a line boundary is
/// found, so the amount of IO depends on length of the last line rather than on file size.
/// Result equals the position a `PositionedReader` would end up with after reading the file
/// from start to end, which makes it a "nothing new to read" baseline.
///
/// ```rust
/// # use std::io::Cursor;
/// # use logcut::{EofScanner, Position};
/// let file = Cursor::new(b"Hello, world!\nBye, world\n".to_vec());
/// let position = EofScanner::default().scan(file)?;
/// assert_eq!(position, Position::new(14, "Bye, world\n"));
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EofScanner {
    chunk_size: usize,
}

impl Default for EofScanner {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl EofScanner {
    /// Construct scanner reading `chunk_size` bytes at a time. Zero is treated as one.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Open file at `path` and scan it.
    pub fn scan_path(&self, path: impl AsRef<Path>) -> io::Result<Position> {
        self.scan(File::open(path)?)
    }

    /// Find offset and content of the last line in `source`.
    pub fn scan<R: Read + Seek>(&self, source: R) -> io::Result<Position> {
        let mut cursor = ByteCursor::new(source);
        let mut offset = cursor.size()?;
        // newest chunk is last, so the line is assembled by reversing
        let mut chunks: Vec<Vec<u8>> = vec![];

        while offset > 0 {
            let step = offset.min(self.chunk_size as u64);
            offset -= step;
            let mut chunk = cursor.read_chunk_at(offset, step as usize)?;

            // terminator at the very end of the file belongs to the last line
            let searchable = if chunks.is_empty() {
                &chunk[..chunk.len() - 1]
            } else {
                &chunk[..]
            };

            let boundary = searchable.iter().rposition(|&byte| byte == b'\n');
            if let Some(boundary) = boundary {
                offset += boundary as u64 + 1;
                chunks.push(chunk.split_off(boundary + 1));
                break;
            }
            chunks.push(chunk);
        }

        chunks.reverse();
        Ok(Position::new(offset, chunks.concat()))
    }
}

use std::{
    fs::File,
    io::{self, BufReader, Seek, SeekFrom},
    iter::FusedIterator,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::debug;

use crate::{cursor::ByteCursor, path_utils::normalize_path, Position};

/// Possible errors that could happen while reading a log file
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("failed to open {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
}

impl ReadError {
    /// Underlying IO error, e.g. to tell a missing file from a permission problem.
    pub fn io_error(&self) -> &io::Error {
        match self {
            ReadError::Open { source, .. } | ReadError::Read { source, .. } => source,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ReadError::Open { path, .. } | ReadError::Read { path, .. } => path,
        }
    }
}

/// Reader that returns only lines not seen before, remembering how far it got as a `Position`.
///
/// ## Usage
///
/// Construct a reader with a position (`Position::START` or one saved previously, e.g. with
/// `CacheStore`) and call `.open()` to start a `Session`. Session is an iterator over lines that
/// follow the position, and every line it returns moves the position of the reader past that
/// line. Closing (or dropping) the session releases the file. Calling `.open()` once again
/// continues from where the previous session stopped.
///
/// ```rust no_run
/// # use logcut::{PositionedReader, Position};
/// let mut reader = PositionedReader::new("/var/log/mail.log", Position::START)?;
/// let mut session = reader.open()?;
/// for line in session.by_ref() {
///     print!("{}", String::from_utf8_lossy(&line?));
/// }
/// session.close();
/// println!("stopped at {:?}", reader.position());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// ## Working principles
///
/// Position stores offset at which the last consumed line starts together with the content of
/// that line. When a session starts, the line at stored offset is read and compared to the stored
/// one (ignoring a trailing line terminator). If it does not match, or there is nothing at that
/// offset, the file is considered truncated, rotated or replaced and reading restarts from the
/// beginning with position reset to `Position::START`.
///
/// ## Limitations
///
/// Only one line is checked, so a file rewritten to contain the same line at the same offset
/// is indistinguishable from the original one.
pub struct PositionedReader {
    path: PathBuf,
    position: Position,
}

impl PositionedReader {
    /// Creates a reader for file at `path`. Path is made absolute and normalized, file is not
    /// touched until `.open()`.
    pub fn new(path: impl AsRef<Path>, position: Position) -> io::Result<Self> {
        Ok(Self {
            path: normalize_path(path)?,
            position,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Position right after the most recently returned line.
    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    /// Open the file and start a session at current position, rewinding to start of the file if
    /// the position turns out to be stale.
    pub fn open(&mut self) -> Result<Session<'_>, ReadError> {
        let file = File::open(&self.path).map_err(|source| ReadError::Open {
            path: self.path.clone(),
            source,
        })?;
        let mut cursor = ByteCursor::new(BufReader::new(file));
        self.validate(&mut cursor).map_err(|source| ReadError::Read {
            path: self.path.clone(),
            source,
        })?;

        Ok(Session {
            path: &self.path,
            position: &mut self.position,
            cursor,
            finished: false,
        })
    }

    /// Replace position and open a session, same as constructing a new reader with `position`.
    pub fn open_at(&mut self, position: Position) -> Result<Session<'_>, ReadError> {
        self.set_position(position);
        self.open()
    }

    /// Leaves `cursor` right after the line at stored offset or at the start of the file.
    fn validate(&mut self, cursor: &mut ByteCursor<BufReader<File>>) -> io::Result<()> {
        if self.position.is_start() {
            return Ok(());
        }

        let mut line = vec![];
        let confirmed = match cursor
            .seek(SeekFrom::Start(self.position.offset))
            .and_then(|_| cursor.read_line_bytes(&mut line))
        {
            Ok(0) | Err(_) => false,
            Ok(_) => self.position.line_matches(&line),
        };

        if !confirmed {
            debug!(
                path = %self.path.display(),
                offset = self.position.offset,
                "stale position, reading from the beginning"
            );
            cursor.seek(SeekFrom::Start(0))?;
            self.position = Position::START;
        }
        Ok(())
    }
}

/// Open file of a `PositionedReader` and iterator over its new lines.
///
/// Each returned line is raw bytes including its `\n` (last line of a file may have none). Before
/// a line is returned, position of the reader is set to that line, so at any moment the position
/// covers everything returned so far and nothing more. After an error iteration stops.
pub struct Session<'a> {
    path: &'a Path,
    position: &'a mut Position,
    cursor: ByteCursor<BufReader<File>>,
    finished: bool,
}

impl Session<'_> {
    pub fn position(&self) -> &Position {
        self.position
    }

    /// Release the file. Same as dropping the session.
    pub fn close(self) {}
}

impl Iterator for Session<'_> {
    type Item = Result<Vec<u8>, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let line_start = self.cursor.offset();
        let mut line = vec![];
        match self.cursor.read_line_bytes(&mut line) {
            Ok(0) => {
                self.finished = true;
                None
            }
            Ok(_) => {
                self.position.offset = line_start;
                self.position.last_line.clone_from(&line);
                Some(Ok(line))
            }
            Err(source) => {
                self.finished = true;
                Some(Err(ReadError::Read {
                    path: self.path.to_path_buf(),
                    source,
                }))
            }
        }
    }
}

impl FusedIterator for Session<'_> {}

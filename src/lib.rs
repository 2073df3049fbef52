//! # Logcut
//!
//! Logcut is a library and a command line tool for reading only new lines of a log on every run, without any daemon
//! watching the file. Position in a file is remembered between runs in a small text cache, and a file that was truncated,
//! rotated or replaced since the previous run is detected and read from the beginning.
//!
//! * `PositionedReader` that returns lines following a `Position` and advances that position as lines are consumed
//!
//! ```rust
//! # use std::io::Write;
//! # use logcut::{PositionedReader, Position};
//! # let mut file = tempfile::NamedTempFile::new()?;
//! # file.write_all(b"Hello, world!\nBye, world\nHello again")?;
//! let mut reader = PositionedReader::new(file.path(), Position::START)?;
//! let lines = reader.open()?.collect::<Result<Vec<_>, _>>()?;
//! assert_eq!(lines, [&b"Hello, world!\n"[..], b"Bye, world\n", b"Hello again"]);
//! assert_eq!(reader.position(), &Position::new(25, "Hello again"));
//! // nothing new since the last session
//! assert_eq!(reader.open()?.count(), 0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! * `CacheStore` that persists positions of many files in one cache file
//!
//! ```rust
//! # use std::path::Path;
//! # use logcut::{CacheStore, Position};
//! # let dir = tempfile::tempdir()?;
//! let cache = CacheStore::new(dir.path().join(".logcut"));
//! let log = Path::new("/var/log/mail.log");
//! assert_eq!(cache.lookup(log)?, Position::START);
//! cache.save(log, &Position::new(14, "Bye, world\n"))?;
//! assert_eq!(cache.lookup(log)?, Position::new(14, "Bye, world\n"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! * `EofScanner` that finds position of the last line of a file reading it backwards, which lets you skip everything
//! already present in a file
//!
//! ```rust
//! # use std::io::Cursor;
//! # use logcut::{EofScanner, Position};
//! let position = EofScanner::default().scan(Cursor::new(b"first\nsecond\n".to_vec()))?;
//! assert_eq!(position, Position::new(6, "second\n"));
//! # Ok::<(), std::io::Error>(())
//! ```
//!

mod cache;
mod config;
mod cursor;
mod eof_scanner;
pub mod path_utils;
mod position;
mod positioned_reader;

pub use cache::{CacheError, CacheStore, DEFAULT_DELIMITER};
pub use config::{Config, ConfigError, DEFAULT_CACHE_FILENAME};
pub use eof_scanner::{EofScanner, DEFAULT_CHUNK_SIZE};
pub use position::Position;
pub use positioned_reader::{PositionedReader, ReadError, Session};

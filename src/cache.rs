use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader, BufWriter, ErrorKind, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{path_utils::path_bytes, Position};

/// Field delimiter used by `CacheStore::new`.
pub const DEFAULT_DELIMITER: &str = "##";

/// Possible errors that could happen while working with a cache file
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("malformed cache line #{line}: {content}")]
    Malformed { line: usize, content: String },

    #[error("bad offset {offset} in cache line #{line}")]
    BadOffset { line: usize, offset: String },

    #[error("failed to read cache {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to save cache {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
}

impl CacheError {
    /// Whether cache content is broken, as opposed to the cache file being inaccessible.
    pub fn is_format(&self) -> bool {
        matches!(
            self,
            CacheError::Malformed { .. } | CacheError::BadOffset { .. }
        )
    }

    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            CacheError::Read { source, .. } | CacheError::Write { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Persistent storage of positions of many files in a single text file.
///
/// Every line of the cache file is a record `PATH DELIM OFFSET DELIM LAST_LINE`. The delimiter is
/// configurable in case paths contain the default one and must not be empty. `LAST_LINE` is
/// stored raw and is the reason every record ends with a line break. Most recently saved record
/// always comes first.
///
/// ```rust no_run
/// # use std::path::Path;
/// # use logcut::{CacheStore, Position};
/// let cache = CacheStore::new("/home/user/.logcut");
/// let path = Path::new("/var/log/mail.log");
/// let position = cache.lookup(path)?;
/// cache.save(path, &Position::new(position.offset + 10, "next line\n"))?;
/// # Ok::<(), logcut::CacheError>(())
/// ```
///
/// ## Limitations
///
/// Nothing is locked between `lookup` and `save`, so of two processes updating the same cache
/// concurrently only the last one to save wins.
#[derive(Clone, Debug)]
pub struct CacheStore {
    file: PathBuf,
    delimiter: String,
}

impl CacheStore {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self::with_delimiter(file, DEFAULT_DELIMITER)
    }

    pub fn with_delimiter(file: impl Into<PathBuf>, delimiter: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            delimiter: delimiter.into(),
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Find saved position of `path`.
    ///
    /// Missing cache file or missing record is not an error and results in `Position::START`.
    pub fn lookup(&self, path: &Path) -> Result<Position, CacheError> {
        let file = match File::open(&self.file) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(cache = %self.file.display(), "cache file does not exist yet");
                return Ok(Position::START);
            }
            Err(source) => return Err(self.read_error(source)),
        };

        let prefix = self.record_prefix(path);
        let mut reader = BufReader::new(file);
        let mut line = vec![];
        let mut line_number = 0;
        loop {
            line.clear();
            line_number += 1;
            if reader
                .read_until(b'\n', &mut line)
                .map_err(|source| self.read_error(source))?
                == 0
            {
                debug!(path = %path.display(), "no cached position");
                return Ok(Position::START);
            }
            if let Some(fields) = line.strip_prefix(prefix.as_slice()) {
                let position = self.decode(line_number, &line, fields)?;
                debug!(
                    path = %path.display(),
                    offset = position.offset,
                    "found cached position"
                );
                return Ok(position);
            }
        }
    }

    /// Store `position` of `path` replacing previous record of that path.
    ///
    /// New content is prepared in a temporary file next to the cache file which then replaces the
    /// cache file at once, so the cache stays intact if anything fails on the way. A symlinked
    /// cache file is written through: its target is replaced and the link is kept.
    pub fn save(&self, path: &Path, position: &Position) -> Result<(), CacheError> {
        let prefix = self.record_prefix(path);
        let target = self.resolve_target()?;
        let mut temp = NamedTempFile::new_in(directory_of(&target))
            .map_err(|source| self.write_error(source))?;

        {
            let mut writer = BufWriter::new(&mut temp);
            self.write_record(&mut writer, &prefix, position)
                .map_err(|source| self.write_error(source))?;
            self.copy_other_records(&mut writer, &prefix)?;
            writer.flush().map_err(|source| self.write_error(source))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|source| self.write_error(source))?;

        if let Ok(metadata) = fs::metadata(&target) {
            temp.as_file()
                .set_permissions(metadata.permissions())
                .map_err(|source| self.write_error(source))?;
        }
        temp.persist(&target)
            .map_err(|err| self.write_error(err.error))?;

        debug!(
            path = %path.display(),
            offset = position.offset,
            cache = %self.file.display(),
            "saved position"
        );
        Ok(())
    }

    fn record_prefix(&self, path: &Path) -> Vec<u8> {
        [path_bytes(path), self.delimiter.as_bytes()].concat()
    }

    /// `fields` is the part of `line` after the path and its delimiter.
    fn decode(
        &self,
        line_number: usize,
        line: &[u8],
        fields: &[u8],
    ) -> Result<Position, CacheError> {
        let Some(split_at) = find(fields, self.delimiter.as_bytes()) else {
            return Err(CacheError::Malformed {
                line: line_number,
                content: String::from_utf8_lossy(line).trim_end().to_string(),
            });
        };
        let offset = &fields[..split_at];
        let last_line = &fields[split_at + self.delimiter.len()..];

        let Some(offset) = std::str::from_utf8(offset)
            .ok()
            .and_then(|offset| offset.parse::<u64>().ok())
        else {
            return Err(CacheError::BadOffset {
                line: line_number,
                offset: String::from_utf8_lossy(offset).into_owned(),
            });
        };
        Ok(Position::new(offset, last_line))
    }

    fn write_record(
        &self,
        writer: &mut impl Write,
        prefix: &[u8],
        position: &Position,
    ) -> io::Result<()> {
        writer.write_all(prefix)?;
        write!(writer, "{}{}", position.offset, self.delimiter)?;
        writer.write_all(&position.last_line)?;
        if !position.last_line.ends_with(b"\n") {
            writer.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Copy records of all other files from current cache in their original order.
    fn copy_other_records(
        &self,
        writer: &mut impl Write,
        prefix: &[u8],
    ) -> Result<(), CacheError> {
        let file = match File::open(&self.file) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                warn!(
                    cache = %self.file.display(),
                    error = %err,
                    "existing cache is unreadable, its records are dropped"
                );
                return Ok(());
            }
        };

        let mut reader = BufReader::new(file);
        let mut line = vec![];
        loop {
            line.clear();
            if reader
                .read_until(b'\n', &mut line)
                .map_err(|source| self.read_error(source))?
                == 0
            {
                return Ok(());
            }
            if !line.starts_with(prefix) {
                writer
                    .write_all(&line)
                    .map_err(|source| self.write_error(source))?;
            }
        }
    }

    /// Path the new cache content is renamed to, with symlinks followed.
    fn resolve_target(&self) -> Result<PathBuf, CacheError> {
        match fs::canonicalize(&self.file) {
            Ok(target) => Ok(target),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(self.file.clone()),
            Err(source) => Err(self.write_error(source)),
        }
    }

    fn read_error(&self, source: io::Error) -> CacheError {
        CacheError::Read {
            path: self.file.clone(),
            source,
        }
    }

    fn write_error(&self, source: io::Error) -> CacheError {
        CacheError::Write {
            path: self.file.clone(),
            source,
        }
    }
}

fn directory_of(file: &Path) -> &Path {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        os::unix::fs::PermissionsExt,
        path::{Path, PathBuf},
    };

    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::{directory_of, CacheError, CacheStore};
    use crate::Position;

    const CACHE_LINES: [&str; 7] = [
        "/root/hello.2##100##Hello, world!\n",
        "/root/hello.3##200##Hello##world!\n",
        "/root/hello##50##Hello, world\n",
        "/root/bad_format##no offset here\n",
        "/root/bad_offset##abc##Some line\n",
        "/srv/root/unable_to_find##10##aaa\n",
        "/root/hello%%60%%Hello, world\n",
    ];

    struct CacheDir {
        dir: TempDir,
    }

    impl CacheDir {
        fn cache_path(&self) -> PathBuf {
            self.dir.path().join("cache")
        }

        fn store(&self, delimiter: &str) -> CacheStore {
            CacheStore::with_delimiter(self.cache_path(), delimiter)
        }

        fn content(&self) -> String {
            fs::read_to_string(self.cache_path()).unwrap()
        }
    }

    #[fixture]
    fn cache() -> CacheDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cache"), CACHE_LINES.concat()).unwrap();
        CacheDir { dir }
    }

    #[fixture]
    fn empty_dir() -> CacheDir {
        CacheDir {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    #[rstest]
    #[case("/root/hello", "##", Position::new(50, "Hello, world\n"))]
    #[case("/root/hello.2", "##", Position::new(100, "Hello, world!\n"))]
    #[case("/root/hello.3", "##", Position::new(200, "Hello##world!\n"))]
    #[case("/root/no_such_file_in_cache", "##", Position::START)]
    #[case("/root/unable_to_find", "##", Position::START)]
    #[case("/root/hello", "%%", Position::new(60, "Hello, world\n"))]
    fn lookup_finds_record(
        cache: CacheDir,
        #[case] path: &str,
        #[case] delimiter: &str,
        #[case] expected: Position,
    ) {
        let position = cache.store(delimiter).lookup(Path::new(path)).unwrap();
        assert_eq!(position, expected);
    }

    #[rstest]
    fn lookup_reports_malformed_line(cache: CacheDir) {
        let err = cache
            .store("##")
            .lookup(Path::new("/root/bad_format"))
            .unwrap_err();
        assert!(err.is_format());
        assert!(matches!(err, CacheError::Malformed { line: 4, .. }));
        assert_eq!(
            err.to_string(),
            "malformed cache line #4: /root/bad_format##no offset here"
        );
    }

    #[rstest]
    fn lookup_reports_bad_offset(cache: CacheDir) {
        let err = cache
            .store("##")
            .lookup(Path::new("/root/bad_offset"))
            .unwrap_err();
        assert!(err.is_format());
        assert_eq!(err.to_string(), "bad offset abc in cache line #5");
    }

    #[rstest]
    fn lookup_without_cache_file_returns_start(empty_dir: CacheDir) {
        let position = empty_dir
            .store("##")
            .lookup(Path::new("/root/hello"))
            .unwrap();
        assert_eq!(position, Position::START);
    }

    #[rstest]
    fn lookup_of_unreadable_cache_is_io_error(empty_dir: CacheDir) {
        let store = CacheStore::new(empty_dir.dir.path());
        let err = store.lookup(Path::new("/root/hello")).unwrap_err();
        assert!(matches!(err, CacheError::Read { .. }));
        assert!(!err.is_format());
        assert!(err.io_error().is_some());
    }

    #[rstest]
    fn path_containing_delimiter_is_still_decoded(empty_dir: CacheDir) {
        let store = empty_dir.store("##");
        let path = Path::new("/var/log/odd##name.log");
        store.save(path, &Position::new(7, "line\n")).unwrap();
        assert_eq!(store.lookup(path).unwrap(), Position::new(7, "line\n"));
    }

    fn lines(indices: &[usize]) -> String {
        indices.iter().map(|&i| CACHE_LINES[i]).collect()
    }

    #[rstest]
    #[case::same_record("/root/hello.2", 100, "Hello, world!\n", "##", None, &[0, 1, 2, 3, 4, 5, 6])]
    #[case::terminator_added("/root/hello.2", 100, "Hello, world!", "##", None, &[0, 1, 2, 3, 4, 5, 6])]
    #[case::moved_to_top("/root/hello", 50, "Hello, world", "##", None, &[2, 0, 1, 3, 4, 5, 6])]
    #[case::new_record(
        "/root/unable_to_find",
        10,
        "aaa",
        "##",
        Some("/root/unable_to_find##10##aaa\n"),
        &[0, 1, 2, 3, 4, 5, 6]
    )]
    #[case::other_delimiter(
        "/root/hello",
        60,
        "Hello, world",
        "%%",
        Some("/root/hello%%60%%Hello, world\n"),
        &[0, 1, 2, 3, 4, 5]
    )]
    #[case::broken_record_replaced(
        "/root/bad_offset",
        88,
        "Good line\n",
        "##",
        Some("/root/bad_offset##88##Good line\n"),
        &[0, 1, 2, 3, 5, 6]
    )]
    fn save_rewrites_cache(
        cache: CacheDir,
        #[case] path: &str,
        #[case] offset: u64,
        #[case] last_line: &str,
        #[case] delimiter: &str,
        #[case] new_line: Option<&str>,
        #[case] kept: &[usize],
    ) {
        cache
            .store(delimiter)
            .save(Path::new(path), &Position::new(offset, last_line))
            .unwrap();
        let expected = format!("{}{}", new_line.unwrap_or_default(), lines(kept));
        assert_eq!(cache.content(), expected);
    }

    #[rstest]
    fn save_replaces_existing_record_without_duplicates(cache: CacheDir) {
        let store = cache.store("##");
        store
            .save(Path::new("/root/hello"), &Position::new(60, "Hello, world"))
            .unwrap();
        let content = cache.content();
        assert!(content.starts_with("/root/hello##60##Hello, world\n"));
        assert_eq!(content.matches("/root/hello##").count(), 1);
        assert_eq!(
            store.lookup(Path::new("/root/hello")).unwrap(),
            Position::new(60, "Hello, world\n")
        );
    }

    #[rstest]
    fn save_creates_missing_cache(empty_dir: CacheDir) {
        let store = empty_dir.store("##");
        store
            .save(Path::new("/var/log/syslog"), &Position::new(25, "Hello again"))
            .unwrap();
        assert_eq!(empty_dir.content(), "/var/log/syslog##25##Hello again\n");
        assert_eq!(
            store.lookup(Path::new("/var/log/syslog")).unwrap(),
            Position::new(25, "Hello again\n")
        );
    }

    #[rstest]
    fn consecutive_saves_keep_most_recent_first(empty_dir: CacheDir) {
        let store = empty_dir.store("##");
        store.save(Path::new("/a"), &Position::new(1, "a\n")).unwrap();
        store.save(Path::new("/b"), &Position::new(2, "b\n")).unwrap();
        store.save(Path::new("/c"), &Position::new(3, "c\n")).unwrap();
        store.save(Path::new("/b"), &Position::new(4, "bb\n")).unwrap();
        assert_eq!(empty_dir.content(), "/b##4##bb\n/c##3##c\n/a##1##a\n");
    }

    #[rstest]
    fn save_into_missing_directory_fails(empty_dir: CacheDir) {
        let store = CacheStore::new(empty_dir.dir.path().join("no-such-dir").join("cache"));
        let err = store
            .save(Path::new("/root/hello"), &Position::new(1, "x\n"))
            .unwrap_err();
        assert!(matches!(err, CacheError::Write { .. }));
        assert!(!store.file().exists());
    }

    #[rstest]
    fn save_keeps_cache_permissions(cache: CacheDir) {
        fs::set_permissions(cache.cache_path(), fs::Permissions::from_mode(0o640)).unwrap();
        cache
            .store("##")
            .save(Path::new("/root/hello"), &Position::new(1, "x\n"))
            .unwrap();
        let mode = fs::metadata(cache.cache_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[rstest]
    fn save_leaves_no_temporary_files(cache: CacheDir) {
        cache
            .store("##")
            .save(Path::new("/root/hello"), &Position::new(1, "x\n"))
            .unwrap();
        assert_eq!(fs::read_dir(cache.dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn relative_cache_file_lives_in_working_directory() {
        assert_eq!(directory_of(Path::new("cache")), Path::new("."));
        assert_eq!(directory_of(Path::new("/tmp/cache")), Path::new("/tmp"));
    }

    #[rstest]
    fn save_writes_through_symlinked_cache(empty_dir: CacheDir) {
        let dotfiles = empty_dir.dir.path().join("dotfiles");
        fs::create_dir(&dotfiles).unwrap();
        let real = dotfiles.join("logcut");
        fs::write(&real, "/a##1##a\n").unwrap();
        std::os::unix::fs::symlink(&real, empty_dir.cache_path()).unwrap();

        let store = empty_dir.store("##");
        store.save(Path::new("/b"), &Position::new(2, "b\n")).unwrap();

        let link = fs::symlink_metadata(empty_dir.cache_path()).unwrap();
        assert!(link.file_type().is_symlink());
        assert_eq!(fs::read_to_string(&real).unwrap(), "/b##2##b\n/a##1##a\n");
        assert_eq!(fs::read_dir(&dotfiles).unwrap().count(), 1);
        assert_eq!(
            store.lookup(Path::new("/a")).unwrap(),
            Position::new(1, "a\n")
        );
    }
}

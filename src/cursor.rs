use std::io::{self, BufRead, Read, Seek, SeekFrom};

/// Reader that keeps track of the absolute byte offset of everything read, consumed or seeked.
///
/// Both line-oriented forward reading (`PositionedReader`) and chunked backward reading
/// (`EofScanner`) are built on top of this structure, so offsets they report always agree.
pub(crate) struct ByteCursor<R> {
    inner: R,
    offset: u64,
}

impl<R: Seek> ByteCursor<R> {
    /// Wrap a reader that is positioned at its start.
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    /// Absolute offset of the next byte to be read.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Current size of underlying item.
    ///
    /// Seeks to the end and back, so the file may already be bigger by the time this returns.
    pub fn size(&mut self) -> io::Result<u64> {
        let original_offset = self.inner.stream_position()?;
        let size = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(original_offset))?;
        Ok(size)
    }
}

impl<R: Read + Seek> ByteCursor<R> {
    /// Read exactly `len` bytes starting at absolute `offset`.
    pub fn read_chunk_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        self.seek(SeekFrom::Start(offset))?;
        let mut chunk = vec![0; len];
        self.read_exact(&mut chunk)?;
        Ok(chunk)
    }
}

impl<R: BufRead + Seek> ByteCursor<R> {
    /// Append raw bytes up to and including the next `\n` to `buf`.
    ///
    /// Returns number of bytes read, zero meaning end of file. Last line of a file may come
    /// without a terminator.
    pub fn read_line_bytes(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        self.read_until(b'\n', buf)
    }
}

impl<R: Read> Read for ByteCursor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let size_read = self.inner.read(buf)?;
        self.offset += size_read as u64;
        Ok(size_read)
    }
}

impl<R: BufRead> BufRead for ByteCursor<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
        self.offset += amt as u64;
    }
}

impl<R: Seek> Seek for ByteCursor<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.offset = self.inner.seek(pos)?;
        Ok(self.offset)
    }
}

//! Line reader over a source file that tracks byte offsets.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

/// Reads lines from a seekable file, reporting where each line starts.
///
/// A line's start offset is its identity in the load ledger.
pub struct SourceReader {
    reader: BufReader<File>,
    pos: u64,
    len: u64,
    line: Vec<u8>,
}

impl SourceReader {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            pos: 0,
            len,
            line: Vec::new(),
        })
    }

    /// Size of the file in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset of the next byte `next_line` will read.
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn seek(&mut self, pos: u64) -> io::Result<()> {
        self.reader.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        Ok(())
    }

    /// Reads the next line, returning its start offset and its raw bytes
    /// without the line terminator. `None` at end of file.
    ///
    /// Bytes are not decoded here; a line that is not UTF-8 is the row
    /// parser's to reject.
    pub fn next_line(&mut self) -> io::Result<Option<(u64, Vec<u8>)>> {
        let start = self.pos;
        self.line.clear();
        let n = self.reader.read_until(b'\n', &mut self.line)?;
        if n == 0 {
            return Ok(None);
        }
        self.pos += n as u64;
        while matches!(self.line.last(), Some(b'\n' | b'\r')) {
            self.line.pop();
        }
        Ok(Some((start, self.line.clone())))
    }

    /// Positions the reader at the first line starting at or after `pos` and
    /// returns that line's offset, or `None` if no line starts there.
    pub fn seek_line_at_or_after(&mut self, pos: u64) -> io::Result<Option<u64>> {
        if pos == 0 {
            self.seek(0)?;
        } else {
            // Reading from the previous byte through the next newline lands
            // exactly on `pos` when a line starts there.
            self.seek(pos - 1)?;
            self.line.clear();
            let n = self.reader.read_until(b'\n', &mut self.line)?;
            self.pos += n as u64;
        }
        if self.pos >= self.len {
            return Ok(None);
        }
        Ok(Some(self.pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn source(contents: &str) -> (tempfile::NamedTempFile, SourceReader) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        let reader = SourceReader::open(file.path()).unwrap();
        (file, reader)
    }

    #[test]
    fn test_lines_and_offsets() {
        let (_file, mut reader) = source("ab\r\ncde\nf");
        assert_eq!(reader.next_line().unwrap(), Some((0, b"ab".to_vec())));
        assert_eq!(reader.next_line().unwrap(), Some((4, b"cde".to_vec())));
        assert_eq!(reader.next_line().unwrap(), Some((8, b"f".to_vec())));
        assert_eq!(reader.next_line().unwrap(), None);
        assert_eq!(reader.position(), 9);
    }

    #[test]
    fn test_seek_line_at_or_after() {
        let (_file, mut reader) = source("ab\ncde\nf\n");
        assert_eq!(reader.seek_line_at_or_after(0).unwrap(), Some(0));
        assert_eq!(reader.seek_line_at_or_after(1).unwrap(), Some(3));
        assert_eq!(reader.seek_line_at_or_after(3).unwrap(), Some(3));
        assert_eq!(reader.seek_line_at_or_after(4).unwrap(), Some(7));
        assert_eq!(reader.next_line().unwrap(), Some((7, b"f".to_vec())));
        assert_eq!(reader.seek_line_at_or_after(8).unwrap(), None);
    }

    #[test]
    fn test_invalid_utf8_is_returned_raw() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"1,ab\xffcd\n2,ok\n").unwrap();
        let mut reader = SourceReader::open(file.path()).unwrap();
        assert_eq!(reader.next_line().unwrap(), Some((0, b"1,ab\xffcd".to_vec())));
        assert_eq!(reader.next_line().unwrap(), Some((8, b"2,ok".to_vec())));
    }
}

//! Append-only log file
//!
//! A file opened for append with a line buffer in front of it. Each message
//! becomes one line. The handle is never reopened in place: rotation opens a
//! fresh `LogFile` at the same path and closes the old one.
//!
//! A line enters the buffer whole or not at all. When the buffer has to be
//! flushed first and that flush fails, nothing of the new line has been taken,
//! so the caller can retry `write_line` without duplicating bytes. Bytes that
//! did reach the buffer stay there until a later flush succeeds.
//!
//! # Example
//!
//! ```ignore
//! use logd_sinks::util::LogFile;
//!
//! let mut file = LogFile::open("log.out", 64 * 1024)?;
//! file.write_line(b"hello")?;
//! file.close()?;
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Permission bits for a newly created log file
pub const LOG_FILE_MODE: u32 = 0o664;

/// Buffered append-only log file
#[derive(Debug)]
pub struct LogFile {
    path: PathBuf,
    file: File,
    lines: LineBuffer,
    bytes_written: u64,
}

impl LogFile {
    /// Open `path` for append, creating it if missing
    ///
    /// `buffer_size` is the flush threshold. A line longer than that is still
    /// buffered whole and goes out with the next flush.
    pub fn open(path: impl AsRef<Path>, buffer_size: usize) -> io::Result<Self> {
        let path = path.as_ref();

        let mut options = OpenOptions::new();
        options.append(true).create(true);
        #[cfg(unix)]
        options.mode(LOG_FILE_MODE);

        let file = options.open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            lines: LineBuffer::new(buffer_size),
            bytes_written: 0,
        })
    }

    /// Append `data` followed by a newline
    ///
    /// Embedded newlines are written as-is. On error nothing of `data` was
    /// taken.
    pub fn write_line(&mut self, data: &[u8]) -> io::Result<()> {
        self.lines.push_line(data, &mut self.file)?;
        self.bytes_written += data.len() as u64 + 1;
        Ok(())
    }

    /// Whether the buffer holds data not yet handed to the OS
    pub fn has_pending(&self) -> bool {
        !self.lines.is_empty()
    }

    /// Hand buffered data to the OS
    pub fn flush(&mut self) -> io::Result<()> {
        self.lines.flush_to(&mut self.file)
    }

    /// Flush and fsync
    pub fn sync(&mut self) -> io::Result<()> {
        self.flush()?;
        self.file.sync_all()
    }

    /// Flush, fsync and close; returns the bytes appended through this handle
    pub fn close(mut self) -> io::Result<u64> {
        self.sync()?;
        Ok(self.bytes_written)
    }

    /// Bytes appended through this handle
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Path this handle was opened at
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Pending lines in front of a writer
#[derive(Debug)]
struct LineBuffer {
    buf: Vec<u8>,
    limit: usize,
}

impl LineBuffer {
    fn new(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit),
            limit,
        }
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Make room if the line would cross the limit, then take the whole line
    fn push_line<W: Write>(&mut self, data: &[u8], out: &mut W) -> io::Result<()> {
        if !self.buf.is_empty() && self.buf.len() + data.len() + 1 > self.limit {
            self.flush_to(out)?;
        }
        self.buf.reserve(data.len() + 1);
        self.buf.extend_from_slice(data);
        self.buf.push(b'\n');
        Ok(())
    }

    /// Write everything out; bytes the writer accepted are never written again
    fn flush_to<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        while !self.buf.is_empty() {
            match out.write(&self.buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "log file accepted no bytes",
                    ));
                }
                Ok(n) => {
                    self.buf.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Accepts at most `chunk` bytes per write; after `healthy` writes it
    /// fails `failures` times, then recovers
    struct FlakyWriter {
        written: Vec<u8>,
        healthy: usize,
        failures: usize,
        chunk: usize,
    }

    impl FlakyWriter {
        fn new(healthy: usize, failures: usize, chunk: usize) -> Self {
            Self {
                written: Vec::new(),
                healthy,
                failures,
                chunk,
            }
        }
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.healthy > 0 {
                self.healthy -= 1;
            } else if self.failures > 0 {
                self.failures -= 1;
                return Err(io::Error::other("disk hiccup"));
            }
            let n = buf.len().min(self.chunk);
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_open_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.out");

        let file = LogFile::open(&path, 1024).unwrap();
        assert!(path.exists());
        assert_eq!(file.path(), path.as_path());
        assert_eq!(file.bytes_written(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_created_file_is_not_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.out");
        LogFile::open(&path, 1024).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0);
        assert_eq!(mode & !LOG_FILE_MODE & 0o777, 0);
    }

    #[test]
    fn test_write_line_appends_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.out");

        let mut file = LogFile::open(&path, 1024).unwrap();
        file.write_line(b"hello").unwrap();
        file.write_line(b"a\nb").unwrap();
        assert!(file.has_pending());

        assert_eq!(file.close().unwrap(), 10);
        assert_eq!(std::fs::read(&path).unwrap(), b"hello\na\nb\n");
    }

    #[test]
    fn test_open_appends_to_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.out");
        std::fs::write(&path, b"existing\n").unwrap();

        let mut file = LogFile::open(&path, 1024).unwrap();
        file.write_line(b"new").unwrap();
        file.close().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"existing\nnew\n");
    }

    #[test]
    fn test_flush_empties_buffer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.out");

        let mut file = LogFile::open(&path, 1024).unwrap();
        file.write_line(b"x").unwrap();
        file.flush().unwrap();

        assert!(!file.has_pending());
        assert_eq!(std::fs::read(&path).unwrap(), b"x\n");
    }

    #[test]
    fn test_line_longer_than_buffer_kept_whole() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.out");

        let mut file = LogFile::open(&path, 4).unwrap();
        file.write_line(b"0123456789").unwrap();
        file.write_line(b"abc").unwrap();
        file.close().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"0123456789\nabc\n");
    }

    #[test]
    fn test_open_missing_directory_fails() {
        let err = LogFile::open("/nonexistent/dir/log.out", 1024).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_failed_flush_takes_nothing_of_new_line() {
        let mut lines = LineBuffer::new(8);
        let mut out = FlakyWriter::new(0, 2, usize::MAX);

        lines.push_line(b"first", &mut out).unwrap();
        // Needs a flush to make room; the writer fails twice.
        assert!(lines.push_line(b"second", &mut out).is_err());
        assert!(lines.push_line(b"second", &mut out).is_err());
        lines.push_line(b"second", &mut out).unwrap();
        lines.flush_to(&mut out).unwrap();

        assert_eq!(out.written, b"first\nsecond\n");
    }

    #[test]
    fn test_partial_writes_resume_without_duplication() {
        let mut lines = LineBuffer::new(64);
        let mut out = FlakyWriter::new(0, 0, 3);

        lines.push_line(b"partial", &mut out).unwrap();
        lines.push_line(b"writes", &mut out).unwrap();
        lines.flush_to(&mut out).unwrap();

        assert_eq!(out.written, b"partial\nwrites\n");
        assert!(lines.is_empty());
    }

    #[test]
    fn test_flush_error_midway_keeps_unwritten_tail() {
        let mut lines = LineBuffer::new(64);
        // Three bytes go out, then one write fails.
        let mut out = FlakyWriter::new(1, 1, 3);

        lines.push_line(b"abcdef", &mut out).unwrap();
        assert!(lines.flush_to(&mut out).is_err());
        assert_eq!(out.written, b"abc");

        lines.flush_to(&mut out).unwrap();
        assert_eq!(out.written, b"abcdef\n");
    }
}

//! File boundary: chunked sequential read and append.
//!
//! The connection never touches the filesystem directly. Senders pull
//! payload-sized chunks from a [`ChunkSource`]; receivers append in-order
//! payloads to a [`ChunkSink`].

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Sequential chunk reader. A short count signals end of input.
pub trait ChunkSource {
    /// Fill `buf` from the input, returning the byte count. Returns less
    /// than `buf.len()` only at end of input.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Sequential chunk appender.
pub trait ChunkSink {
    /// Append `bytes` to the output.
    fn write_chunk(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Flush buffered output to its destination.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Buffered file-backed chunk source.
pub struct FileSource {
    reader: BufReader<File>,
}

impl FileSource {
    /// Open a file for chunked reading.
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            reader: BufReader::new(File::open(path)?),
        })
    }
}

impl ChunkSource for FileSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // Read::read may return short counts mid-file; accumulate until
        // the chunk is full or the file ends.
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

/// Buffered file-backed chunk sink.
pub struct FileSink {
    writer: BufWriter<File>,
}

impl FileSink {
    /// Create (or truncate) a file for chunked writing.
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }
}

impl ChunkSink for FileSink {
    fn write_chunk(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// In-memory chunk source over a byte buffer.
pub struct MemorySource {
    data: Vec<u8>,
    cursor: usize,
}

impl MemorySource {
    /// Wrap a byte buffer as a chunk source.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, cursor: 0 }
    }
}

impl ChunkSource for MemorySource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.data.len() - self.cursor;
        let take = remaining.min(buf.len());
        buf[..take].copy_from_slice(&self.data[self.cursor..self.cursor + take]);
        self.cursor += take;
        Ok(take)
    }
}

/// In-memory chunk sink collecting all written bytes.
#[derive(Default)]
pub struct MemorySink {
    data: Vec<u8>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All bytes written so far.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Borrow the bytes written so far.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl ChunkSink for MemorySink {
    fn write_chunk(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.data.extend_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn memory_source_reports_eof_with_short_read() {
        let mut source = MemorySource::new(vec![1, 2, 3, 4, 5]);
        let mut buf = [0u8; 4];
        assert_eq!(source.read_chunk(&mut buf).unwrap(), 4);
        assert_eq!(source.read_chunk(&mut buf).unwrap(), 1);
        assert_eq!(source.read_chunk(&mut buf).unwrap(), 0);
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.bin");
        let output = dir.path().join("output.bin");
        let payload: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
        std::fs::File::create(&input)
            .unwrap()
            .write_all(&payload)
            .unwrap();

        let mut source = FileSource::open(&input).unwrap();
        let mut sink = FileSink::create(&output).unwrap();
        let mut buf = [0u8; 1024];
        loop {
            let n = source.read_chunk(&mut buf).unwrap();
            sink.write_chunk(&buf[..n]).unwrap();
            if n < buf.len() {
                break;
            }
        }
        sink.finish().unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), payload);
    }
}

use bytes::{Bytes, BytesMut};
use std::io::{Read, Seek, SeekFrom, Write};
use tempfile::NamedTempFile;

/// Accumulates one response body while it streams to the client, then hands
/// the whole thing to the Cache at finalize. Stays in memory up to
/// `rollover_size` bytes; beyond that it spills to a temp file so a large
/// dataselect response never holds its full body resident twice.
pub enum SpoolBuffer {
    Memory(BytesMut),
    Disk {
        file: NamedTempFile,
        written: u64,
    },
}

impl SpoolBuffer {
    pub fn new() -> Self {
        SpoolBuffer::Memory(BytesMut::new())
    }

    pub fn write(&mut self, chunk: &[u8], rollover_size: u64, tempdir: &str) -> std::io::Result<()> {
        match self {
            SpoolBuffer::Memory(buf) => {
                if rollover_size > 0 && (buf.len() + chunk.len()) as u64 > rollover_size {
                    let mut file = NamedTempFile::new_in(tempdir)?;
                    file.write_all(buf)?;
                    file.write_all(chunk)?;
                    let written = file.as_file().metadata()?.len();
                    *self = SpoolBuffer::Disk { file, written };
                } else {
                    buf.extend_from_slice(chunk);
                }
            }
            SpoolBuffer::Disk { file, written } => {
                file.write_all(chunk)?;
                *written += chunk.len() as u64;
            }
        }
        Ok(())
    }

    /// Consume the buffer and return its full contents. For a spilled
    /// buffer this reads the temp file back from the start; the temp file
    /// is removed once the returned handle drops.
    pub fn into_bytes(self) -> std::io::Result<Bytes> {
        match self {
            SpoolBuffer::Memory(buf) => Ok(buf.freeze()),
            SpoolBuffer::Disk { mut file, written } => {
                file.seek(SeekFrom::Start(0))?;
                let mut out = Vec::with_capacity(written as usize);
                file.read_to_end(&mut out)?;
                Ok(Bytes::from(out))
            }
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            SpoolBuffer::Memory(buf) => buf.len() as u64,
            SpoolBuffer::Disk { written, .. } => *written,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SpoolBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_in_memory_under_rollover() {
        let mut buf = SpoolBuffer::new();
        buf.write(b"hello", 1024, "/tmp").unwrap();
        assert!(matches!(buf, SpoolBuffer::Memory(_)));
        assert_eq!(buf.into_bytes().unwrap(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn spills_to_disk_past_rollover() {
        let mut buf = SpoolBuffer::new();
        buf.write(b"0123456789", 4, "/tmp").unwrap();
        assert!(matches!(buf, SpoolBuffer::Disk { .. }));
        assert_eq!(buf.into_bytes().unwrap(), Bytes::from_static(b"0123456789"));
    }

    #[test]
    fn accumulates_across_multiple_writes() {
        let mut buf = SpoolBuffer::new();
        buf.write(b"abc", 1024, "/tmp").unwrap();
        buf.write(b"def", 1024, "/tmp").unwrap();
        assert_eq!(buf.into_bytes().unwrap(), Bytes::from_static(b"abcdef"));
    }

    #[test]
    fn zero_rollover_never_spills() {
        let mut buf = SpoolBuffer::new();
        buf.write(&[0u8; 4096], 0, "/tmp").unwrap();
        assert!(matches!(buf, SpoolBuffer::Memory(_)));
    }
}

// ROM file handling (§5, §6): an ordinary file treated as a flat byte
// sequence, opened read-write and memory-mapped. Grounded in
// `original_source/core/entity/EmbeddedMathMixin.py` (`memory_map`, a
// thin wrapper over `np.memmap`) — this is the one place the crate
// reaches for a dependency with no pack precedent (`memmap2`), since no
// example repo in the pack maps a file; see DESIGN.md.

use crate::error::Result;
use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::Path;

/// The Document's exclusively-owned, writable ROM mapping (§5 "Shared
/// resources"). Readers and writers within one Document must not overlap
/// in time — enforced by Rust's ordinary borrow rules once callers hold
/// `&Rom`/`&mut Rom` rather than by anything in here.
pub struct Rom {
    mmap: MmapMut,
}

impl Rom {
    pub fn open(path: impl AsRef<Path>) -> Result<Rom> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Rom { mmap })
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    pub fn read(&self, offset: u64, len: usize) -> &[u8] {
        let start = offset as usize;
        &self.mmap[start..start + len]
    }

    pub fn write(&mut self, offset: u64, bytes: &[u8]) {
        let start = offset as usize;
        self.mmap[start..start + bytes.len()].copy_from_slice(bytes);
        tracing::debug!(address = offset, len = bytes.len(), "rom write");
    }

    pub fn flush(&mut self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fixture(bytes: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_read_write_roundtrip() {
        let f = fixture(&[0u8; 16]);
        let mut rom = Rom::open(f.path()).unwrap();
        rom.write(4, &[0x2A]);
        assert_eq!(rom.read(4, 1), &[0x2A]);
    }

    #[test]
    fn test_len_matches_file_size() {
        let f = fixture(&[0u8; 32]);
        let rom = Rom::open(f.path()).unwrap();
        assert_eq!(rom.len(), 32);
    }
}

// Patch parameter (§4.9): an ordered list of PatchEntry, each an
// absolute address/size/patchdata/optional-basedata hex buffer.
// Grounded in `original_source/core/entity/Patch.py`, including its
// lenient hex parsing (non-hex nibbles zero-fill rather than failing).

use crate::error::{Result, XdfError};
use crate::model::{BaseOffset, Patch, PatchEntry};
use crate::rom::Rom;

/// Parse a hex string into bytes, tolerating non-hex characters by
/// zero-filling the offending nibble — TunerPro's own behavior, carried
/// from the original's hex-buffer handling (§11).
pub fn parse_hex_lenient(text: &str) -> Vec<u8> {
    let digits: Vec<u8> = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_digit(16).unwrap_or(0) as u8)
        .collect();

    digits
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => (hi << 4) | lo,
            [hi] => hi << 4,
            _ => 0,
        })
        .collect()
}

pub fn applied(entry: &PatchEntry, rom: &Rom, base_offset: BaseOffset) -> bool {
    let address = base_offset.apply(entry.address);
    rom.read(address, entry.size as usize) == entry.patchdata.as_slice()
}

pub fn apply(entry: &PatchEntry, rom: &mut Rom, base_offset: BaseOffset) -> Result<()> {
    let address = base_offset.apply(entry.address);
    rom.write(address, &entry.patchdata);
    rom.flush()
}

pub fn remove(entry: &PatchEntry, rom: &mut Rom, base_offset: BaseOffset) -> Result<()> {
    let address = base_offset.apply(entry.address);
    match &entry.basedata {
        Some(base) => {
            rom.write(address, base);
            rom.flush()
        }
        None => Err(XdfError::UnpatchableError {
            entry: format!("{:#x}", entry.address),
        }),
    }
}

pub fn apply_all(patch: &Patch, rom: &mut Rom, base_offset: BaseOffset) -> Result<()> {
    for entry in &patch.entries {
        apply(entry, rom, base_offset)?;
    }
    Ok(())
}

pub fn remove_all(patch: &Patch, rom: &mut Rom, base_offset: BaseOffset) -> Result<()> {
    for entry in &patch.entries {
        remove(entry, rom, base_offset)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    const NO_OFFSET: BaseOffset = BaseOffset { offset: 0, subtract: false };

    fn fixture(bytes: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_parse_hex_lenient_zero_fills_bad_nibbles() {
        assert_eq!(parse_hex_lenient("2A"), vec![0x2A]);
        assert_eq!(parse_hex_lenient("2G"), vec![0x20]);
        assert_eq!(parse_hex_lenient("G2"), vec![0x02]);
    }

    #[test]
    fn test_apply_idempotence() {
        let f = fixture(&[0u8; 4]);
        let mut rom = Rom::open(f.path()).unwrap();
        let entry = PatchEntry {
            address: 0,
            size: 2,
            patchdata: vec![0xDE, 0xAD],
            basedata: Some(vec![0x00, 0x00]),
        };
        apply(&entry, &mut rom, NO_OFFSET).unwrap();
        apply(&entry, &mut rom, NO_OFFSET).unwrap();
        assert!(applied(&entry, &rom, NO_OFFSET));
        assert_eq!(rom.read(0, 2), &[0xDE, 0xAD]);
    }

    #[test]
    fn test_base_offset_shifts_patch_address() {
        let f = fixture(&[0u8; 8]);
        let mut rom = Rom::open(f.path()).unwrap();
        let entry = PatchEntry {
            address: 0,
            size: 2,
            patchdata: vec![0xDE, 0xAD],
            basedata: Some(vec![0x00, 0x00]),
        };
        let base_offset = BaseOffset { offset: 4, subtract: false };
        apply(&entry, &mut rom, base_offset).unwrap();
        assert_eq!(rom.read(4, 2), &[0xDE, 0xAD]);
        assert_eq!(rom.read(0, 2), &[0x00, 0x00]);
        assert!(applied(&entry, &rom, base_offset));
    }

    #[test]
    fn test_remove_without_basedata_fails() {
        // spec §8 scenario 6.
        let f = fixture(&[0u8; 4]);
        let mut rom = Rom::open(f.path()).unwrap();
        let entry = PatchEntry {
            address: 0,
            size: 2,
            patchdata: vec![0xDE, 0xAD],
            basedata: None,
        };
        apply(&entry, &mut rom, NO_OFFSET).unwrap();
        let err = remove(&entry, &mut rom, NO_OFFSET).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unpatchable);
    }

    #[test]
    fn test_apply_then_remove_restores_basedata() {
        let f = fixture(&[0x11, 0x22]);
        let mut rom = Rom::open(f.path()).unwrap();
        let entry = PatchEntry {
            address: 0,
            size: 2,
            patchdata: vec![0xDE, 0xAD],
            basedata: Some(vec![0x11, 0x22]),
        };
        apply(&entry, &mut rom, NO_OFFSET).unwrap();
        remove(&entry, &mut rom, NO_OFFSET).unwrap();
        assert_eq!(rom.read(0, 2), &[0x11, 0x22]);
    }
}

// Flag parameter (§4.8): a named bit within an aligned integer. Grounded
// in `original_source/core/entity/Flag.py`.

use crate::error::Result;
use crate::model::{BaseOffset, Flag};
use crate::rom::Rom;

/// Read the boolean at the flag's mask position (§4.8 "`value` returns
/// the boolean at the mask position"), relative to the Document's base
/// address (§6).
pub fn value(flag: &Flag, rom: &Rom, base_offset: BaseOffset) -> bool {
    let raw = read_raw(flag, rom, base_offset);
    raw & flag.mask != 0
}

/// Set the bit, writing back the full byte(s) untouched elsewhere
/// (§4.8 "setting writes back the full byte(s) with that bit toggled").
pub fn set_value(flag: &Flag, rom: &mut Rom, bit: bool, base_offset: BaseOffset) -> Result<()> {
    let mut raw = read_raw(flag, rom, base_offset);
    if bit {
        raw |= flag.mask;
    } else {
        raw &= !flag.mask;
    }
    write_raw(flag, rom, raw, base_offset);
    rom.flush()
}

fn read_raw(flag: &Flag, rom: &Rom, base_offset: BaseOffset) -> u64 {
    let address = base_offset.apply(flag.address);
    let bytes = rom.read(address, flag.byte_len as usize);
    let mut buf = [0u8; 8];
    if flag.flags.contains(crate::model::TypeFlag::LittleEndian) {
        buf[..bytes.len()].copy_from_slice(bytes);
    } else {
        for (i, b) in bytes.iter().rev().enumerate() {
            buf[i] = *b;
        }
    }
    u64::from_le_bytes(buf)
}

fn write_raw(flag: &Flag, rom: &mut Rom, value: u64, base_offset: BaseOffset) {
    let address = base_offset.apply(flag.address);
    let buf = value.to_le_bytes();
    let width = flag.byte_len as usize;
    if flag.flags.contains(crate::model::TypeFlag::LittleEndian) {
        rom.write(address, &buf[..width]);
    } else {
        let reversed: Vec<u8> = buf[..width].iter().rev().copied().collect();
        rom.write(address, &reversed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TypeFlag, TypeFlags};
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
    fn test_value_reads_bit() {
        let f = fixture(&[0b0000_0100]);
        let rom = Rom::open(f.path()).unwrap();
        let flag = Flag {
            address: 0,
            byte_len: 1,
            mask: 0b0000_0100,
            flags: TypeFlag::LittleEndian.into(),
        };
        assert!(value(&flag, &rom, NO_OFFSET));
    }

    #[test]
    fn test_set_value_toggles_only_its_bit() {
        let f = fixture(&[0b0000_0100]);
        let mut rom = Rom::open(f.path()).unwrap();
        let flag = Flag {
            address: 0,
            byte_len: 1,
            mask: 0b0000_0010,
            flags: TypeFlags::empty(),
        };
        set_value(&flag, &mut rom, true, NO_OFFSET).unwrap();
        assert_eq!(rom.read(0, 1), &[0b0000_0110]);
    }

    #[test]
    fn test_base_offset_shifts_flag_address() {
        let f = fixture(&[0u8, 0b0000_0100]);
        let rom = Rom::open(f.path()).unwrap();
        let flag = Flag {
            address: 0,
            byte_len: 1,
            mask: 0b0000_0100,
            flags: TypeFlag::LittleEndian.into(),
        };
        let base_offset = BaseOffset { offset: 1, subtract: false };
        assert!(value(&flag, &rom, base_offset));
    }
}

// Binary View (§4.7): the central binary primitive. Projects ROM bytes
// into a shaped numeric array honoring endianness, signedness, the
// floating-point flag, row/column order, and signed strides. Grounded in
// `original_source/core/entity/EmbeddedData.py` (`data_type`, `strides`,
// `shape` properties).

use crate::array::{NArray, Shape};
use crate::error::{Result, XdfError};
use crate::model::{ArrayShape, BaseOffset, EmbeddedData};
use crate::rom::Rom;

fn shape_dims(shape: &ArrayShape) -> (usize, usize) {
    match *shape {
        ArrayShape::Vector(n) => (n, 1),
        ArrayShape::Matrix(r, c) => (r, c),
    }
}

/// Byte offset of element `(row, col)`, honoring zero-means-contiguous
/// strides and the explicit-reverse negative-stride rule (§4.7,
/// §9 "Negative strides must be implemented by reversing the iteration,
/// not by setting a negative stride on the descriptor"), relative to the
/// Document's base address (§3, §6 "Parameter reads apply base-offset
/// semantics").
fn element_offset(data: &EmbeddedData, base_offset: BaseOffset, row: usize, col: usize) -> u64 {
    let (rows, cols) = shape_dims(&data.shape);
    let width = data.byte_width() as i64;

    let natural_major = if data.is_column_major() {
        width
    } else {
        cols as i64 * width
    };
    let natural_minor = if data.is_column_major() {
        rows as i64 * width
    } else {
        width
    };

    let major_stride = if data.major_stride_bytes == 0 {
        natural_major
    } else {
        data.major_stride_bytes
    };
    let minor_stride = if data.minor_stride_bytes == 0 {
        natural_minor
    } else {
        data.minor_stride_bytes
    };

    let (major_idx, minor_idx, major_n) = if data.is_column_major() {
        (col, row, cols)
    } else {
        (row, col, rows)
    };

    let major_byte = reversed_step(major_stride, major_n, major_idx);
    let minor_byte = reversed_step(minor_stride, if data.is_column_major() { rows } else { cols }, minor_idx);

    base_offset.apply(data.address) + (major_byte + minor_byte) as u64
}

/// A positive stride steps forward normally; a negative stride of
/// magnitude `|s|` walks backward from the far end — `base +
/// (N-1-i)*|s|`, not a literal negative offset (§8 "Stride fidelity").
fn reversed_step(stride: i64, n: usize, i: usize) -> i64 {
    if stride >= 0 {
        stride * i as i64
    } else {
        stride.unsigned_abs() as i64 * (n as i64 - 1 - i as i64)
    }
}

fn read_element(rom: &Rom, data: &EmbeddedData, offset: u64) -> f64 {
    let width = data.byte_width() as usize;
    let bytes = rom.read(offset, width);
    let mut buf = [0u8; 8];
    if data.is_little_endian() {
        buf[..width].copy_from_slice(bytes);
    } else {
        for (i, b) in bytes.iter().rev().enumerate() {
            buf[i] = *b;
        }
    }

    if data.is_float() {
        match width {
            4 => f32::from_le_bytes(buf[..4].try_into().unwrap()) as f64,
            _ => f64::from_le_bytes(buf),
        }
    } else if data.is_signed() {
        let raw = i64::from_le_bytes(buf);
        let shift = (8 - width) * 8;
        ((raw << shift) >> shift) as f64
    } else {
        u64::from_le_bytes(buf) as f64
    }
}

fn write_element(rom: &mut Rom, data: &EmbeddedData, offset: u64, value: f64) {
    let width = data.byte_width() as usize;
    let mut buf = [0u8; 8];
    if data.is_float() {
        match width {
            4 => buf[..4].copy_from_slice(&(value as f32).to_le_bytes()),
            _ => buf.copy_from_slice(&value.to_le_bytes()),
        }
    } else {
        let as_int = value.round() as i64;
        buf.copy_from_slice(&as_int.to_le_bytes());
    }

    let out = &buf[..width];
    if data.is_little_endian() {
        rom.write(offset, out);
    } else {
        let reversed: Vec<u8> = out.iter().rev().copied().collect();
        rom.write(offset, &reversed);
    }
}

/// Read the whole descriptor into an `NArray` of `f64` (§4.7 "Reads:
/// expose an ndarray-like with dtype conversion to f64 on demand").
pub fn read(rom: &Rom, data: &EmbeddedData, base_offset: BaseOffset) -> NArray {
    let (rows, cols) = shape_dims(&data.shape);
    let mut out = vec![0.0; rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            let offset = element_offset(data, base_offset, r, c);
            out[r * cols + c] = read_element(rom, data, offset);
        }
    }
    let shape = match data.shape {
        ArrayShape::Vector(n) => Shape::Vector(n),
        ArrayShape::Matrix(r, c) => Shape::Matrix(r, c),
    };
    NArray::new(shape, out)
}

/// The representable range of the storage dtype, run through `forward`
/// to yield logical bounds `[lo, hi]` (§4.7 "Bounds on write").
pub fn logical_bounds(data: &EmbeddedData, forward: impl Fn(f64) -> Result<f64>) -> Result<(f64, f64)> {
    let width_bits = data.element_size_bits;
    let (dtype_lo, dtype_hi) = if data.is_float() {
        (f64::MIN, f64::MAX)
    } else if data.is_signed() {
        let half = 1i64 << (width_bits - 1);
        (-half as f64, (half - 1) as f64)
    } else {
        (0.0, ((1u64 << width_bits) - 1) as f64)
    };
    let lo = forward(dtype_lo)?;
    let hi = forward(dtype_hi)?;
    Ok(if lo <= hi { (lo, hi) } else { (hi, lo) })
}

/// Write a full array, bounds-checking every cell first (§4.7, §7 "Bounds
/// errors on writes do not mutate any bytes").
pub fn write(
    rom: &mut Rom,
    data: &EmbeddedData,
    values: &NArray,
    lo: f64,
    hi: f64,
    base_offset: BaseOffset,
) -> Result<()> {
    let (rows, cols) = shape_dims(&data.shape);
    let mut violations = vec![false; rows * cols];
    let mut any = false;
    for i in 0..rows * cols {
        let v = values.get(i);
        if v < lo || v > hi {
            violations[i] = true;
            any = true;
        }
    }
    if any {
        return Err(XdfError::BoundsError {
            lo,
            hi,
            value: values.get(0),
            violations: crate::array::Mask::new(Shape::Matrix(rows, cols), violations),
        });
    }

    for r in 0..rows {
        for c in 0..cols {
            let offset = element_offset(data, base_offset, r, c);
            write_element(rom, data, offset, values.get(r * cols + c));
        }
    }
    rom.flush()?;
    Ok(())
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
    fn test_scalar_identity_seed_scenario() {
        // spec §8 scenario 1: signed 8-bit at 0x10 = 0x2A -> 42.
        let mut bytes = vec![0u8; 32];
        bytes[0x10] = 0x2A;
        let f = fixture(&bytes);
        let rom = Rom::open(f.path()).unwrap();
        let data = EmbeddedData {
            address: 0x10,
            element_size_bits: 8,
            shape: ArrayShape::Vector(1),
            major_stride_bytes: 0,
            minor_stride_bytes: 0,
            flags: TypeFlag::Signed.into(),
        };
        let out = read(&rom, &data, NO_OFFSET);
        assert_eq!(out.to_scalar(), 42.0);
    }

    #[test]
    fn test_base_offset_shifts_element_address() {
        // spec §6: a non-zero base offset applies to every element address
        // before it reaches the ROM.
        let mut bytes = vec![0u8; 32];
        bytes[0x10] = 0x2A;
        let f = fixture(&bytes);
        let rom = Rom::open(f.path()).unwrap();
        let data = EmbeddedData {
            address: 0x08,
            element_size_bits: 8,
            shape: ArrayShape::Vector(1),
            major_stride_bytes: 0,
            minor_stride_bytes: 0,
            flags: TypeFlag::Signed.into(),
        };
        let base_offset = BaseOffset { offset: 0x08, subtract: false };
        let out = read(&rom, &data, base_offset);
        assert_eq!(out.to_scalar(), 42.0);
    }

    #[test]
    fn test_scalar_write_negative() {
        let mut bytes = vec![0u8; 32];
        bytes[0x10] = 0x2A;
        let f = fixture(&bytes);
        let mut rom = Rom::open(f.path()).unwrap();
        let data = EmbeddedData {
            address: 0x10,
            element_size_bits: 8,
            shape: ArrayShape::Vector(1),
            major_stride_bytes: 0,
            minor_stride_bytes: 0,
            flags: TypeFlag::Signed.into(),
        };
        write(&mut rom, &data, &NArray::scalar(-5.0), -128.0, 127.0, NO_OFFSET).unwrap();
        assert_eq!(rom.read(0x10, 1), &[0xFB]);
    }

    #[test]
    fn test_bounds_violation_seed_scenario() {
        // spec §8 scenario 5: f(x) = x*0.5 inverse over unsigned 8-bit,
        // hi = 127.5; writing 200 violates it.
        let f = fixture(&[0u8; 4]);
        let rom = Rom::open(f.path()).unwrap();
        let data = EmbeddedData {
            address: 0,
            element_size_bits: 8,
            shape: ArrayShape::Vector(1),
            major_stride_bytes: 0,
            minor_stride_bytes: 0,
            flags: TypeFlags::empty(),
        };
        let (lo, hi) = logical_bounds(&data, |x| Ok(x * 0.5)).unwrap();
        assert_eq!(hi, 127.5);
        let mut rom = rom;
        let err = write(&mut rom, &data, &NArray::scalar(200.0), lo, hi, NO_OFFSET).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Bounds);
    }

    #[test]
    fn test_negative_stride_reverses_iteration() {
        // spec §8 "Stride fidelity": reading index i with stride -s over
        // N elements reads base + (N-1-i)*s.
        let bytes: Vec<u8> = (0u8..4).collect();
        let f = fixture(&bytes);
        let rom = Rom::open(f.path()).unwrap();
        let data = EmbeddedData {
            address: 0,
            element_size_bits: 8,
            shape: ArrayShape::Vector(4),
            major_stride_bytes: -1,
            minor_stride_bytes: 0,
            flags: TypeFlags::empty(),
        };
        let out = read(&rom, &data, NO_OFFSET);
        assert_eq!(out.data(), &[3.0, 2.0, 1.0, 0.0]);
    }
}

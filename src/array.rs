// Numeric array container used throughout the conversion engine.
//
// No pack repo in this codebase's lineage depends on `ndarray`, so this is a
// flat `Vec<f64>` plus a shape tuple, in the hand-rolled-container idiom the
// teacher uses for its own `Value`/`Env` types. Shape is either `(n,)` or
// `(rows, cols)`, stored row-major regardless of how the underlying binary
// view was strided — `binview` is responsible for translating strides into
// this layout on read, and back again on write.

use crate::error::{Result, XdfError};

#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    Vector(usize),
    Matrix(usize, usize),
}

impl Shape {
    pub fn len(&self) -> usize {
        match *self {
            Shape::Vector(n) => n,
            Shape::Matrix(r, c) => r * c,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dims(&self) -> (usize, usize) {
        match *self {
            Shape::Vector(n) => (n, 1),
            Shape::Matrix(r, c) => (r, c),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NArray {
    shape: Shape,
    data: Vec<f64>,
}

impl NArray {
    pub fn new(shape: Shape, data: Vec<f64>) -> NArray {
        assert_eq!(shape.len(), data.len(), "shape/data length mismatch");
        NArray { shape, data }
    }

    pub fn scalar(value: f64) -> NArray {
        NArray {
            shape: Shape::Vector(1),
            data: vec![value],
        }
    }

    pub fn vector(data: Vec<f64>) -> NArray {
        let n = data.len();
        NArray {
            shape: Shape::Vector(n),
            data,
        }
    }

    pub fn matrix(rows: usize, cols: usize, data: Vec<f64>) -> NArray {
        assert_eq!(rows * cols, data.len());
        NArray {
            shape: Shape::Matrix(rows, cols),
            data,
        }
    }

    pub fn zeros(shape: Shape) -> NArray {
        let len = shape.len();
        NArray::new(shape, vec![0.0; len])
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn get(&self, i: usize) -> f64 {
        self.data[i]
    }

    pub fn get2(&self, row: usize, col: usize) -> f64 {
        let (_, cols) = self.shape.dims();
        self.data[row * cols + col]
    }

    pub fn set2(&mut self, row: usize, col: usize, value: f64) {
        let (_, cols) = self.shape.dims();
        self.data[row * cols + col] = value;
    }

    pub fn to_scalar(&self) -> f64 {
        self.data[0]
    }

    /// Apply `f` elementwise, preserving shape.
    pub fn map<F: Fn(f64) -> f64>(&self, f: F) -> NArray {
        NArray {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Combine two arrays elementwise, broadcasting a length-1 operand
    /// against any shape. Mismatched non-scalar shapes are a `TypeError`.
    pub fn zip_with<F: Fn(f64, f64) -> f64>(&self, other: &NArray, f: F) -> Result<NArray> {
        if self.len() == other.len() {
            let data = self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(&a, &b)| f(a, b))
                .collect();
            Ok(NArray::new(self.shape.clone(), data))
        } else if self.len() == 1 {
            let a = self.data[0];
            Ok(NArray::new(
                other.shape.clone(),
                other.data.iter().map(|&b| f(a, b)).collect(),
            ))
        } else if other.len() == 1 {
            let b = other.data[0];
            Ok(NArray::new(
                self.shape.clone(),
                self.data.iter().map(|&a| f(a, b)).collect(),
            ))
        } else {
            Err(XdfError::TypeError {
                message: format!(
                    "cannot broadcast shapes {:?} and {:?}",
                    self.shape, other.shape
                ),
            })
        }
    }

    /// `functools.reduce`-style fold across a list of arrays, broadcasting
    /// pairwise the way the original `sum_args`/`AVG`/`MIN`/`MAX` do.
    pub fn reduce_all<F: Fn(f64, f64) -> f64>(args: &[NArray], f: F) -> Result<NArray> {
        let mut iter = args.iter();
        let first = iter
            .next()
            .cloned()
            .ok_or_else(|| XdfError::TypeError {
                message: "reduction requires at least one argument".into(),
            })?;
        iter.try_fold(first, |acc, next| acc.zip_with(next, &f))
    }

    pub fn clamp(&self, lo: f64, hi: f64) -> NArray {
        self.map(|v| v.clamp(lo, hi))
    }
}

/// Boolean shape-matching array, used for table-kernel masks and
/// bounds-violation reporting (spec §4.5, §4.7).
#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    shape: Shape,
    bits: Vec<bool>,
}

impl Mask {
    pub fn new(shape: Shape, bits: Vec<bool>) -> Mask {
        assert_eq!(shape.len(), bits.len());
        Mask { shape, bits }
    }

    pub fn all_false(shape: Shape) -> Mask {
        let len = shape.len();
        Mask {
            shape,
            bits: vec![false; len],
        }
    }

    pub fn all_true(shape: Shape) -> Mask {
        let len = shape.len();
        Mask {
            shape,
            bits: vec![true; len],
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn get(&self, i: usize) -> bool {
        self.bits[i]
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn set(&mut self, i: usize, value: bool) {
        self.bits[i] = value;
    }

    pub fn any(&self) -> bool {
        self.bits.iter().any(|&b| b)
    }

    pub fn or(&self, other: &Mask) -> Mask {
        Mask::new(
            self.shape.clone(),
            self.bits
                .iter()
                .zip(other.bits.iter())
                .map(|(&a, &b)| a || b)
                .collect(),
        )
    }

    pub fn and(&self, other: &Mask) -> Mask {
        Mask::new(
            self.shape.clone(),
            self.bits
                .iter()
                .zip(other.bits.iter())
                .map(|(&a, &b)| a && b)
                .collect(),
        )
    }

    pub fn not(&self) -> Mask {
        Mask::new(self.shape.clone(), self.bits.iter().map(|&b| !b).collect())
    }

    /// Union of an arbitrary number of masks (empty input yields all-false
    /// over `shape`).
    pub fn union(shape: Shape, masks: &[Mask]) -> Mask {
        masks
            .iter()
            .fold(Mask::all_false(shape), |acc, m| acc.or(m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_scalar() {
        let a = NArray::vector(vec![1.0, 2.0, 3.0]);
        let b = NArray::scalar(10.0);
        let out = a.zip_with(&b, |x, y| x + y).unwrap();
        assert_eq!(out.data(), &[11.0, 12.0, 13.0]);
    }

    #[test]
    fn test_mismatched_shapes_error() {
        let a = NArray::vector(vec![1.0, 2.0]);
        let b = NArray::vector(vec![1.0, 2.0, 3.0]);
        assert!(a.zip_with(&b, |x, y| x + y).is_err());
    }

    #[test]
    fn test_reduce_all_sum() {
        let args = vec![
            NArray::vector(vec![1.0, 2.0]),
            NArray::scalar(10.0),
            NArray::vector(vec![0.0, 1.0]),
        ];
        let out = NArray::reduce_all(&args, |a, b| a + b).unwrap();
        assert_eq!(out.data(), &[11.0, 13.0]);
    }

    #[test]
    fn test_mask_union() {
        let shape = Shape::Matrix(2, 2);
        let m1 = Mask::new(shape.clone(), vec![true, false, false, false]);
        let m2 = Mask::new(shape.clone(), vec![false, false, false, true]);
        let u = Mask::union(shape, &[m1, m2]);
        assert_eq!(u.bits(), &[true, false, false, true]);
    }
}

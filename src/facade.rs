// Parameter Facade (§4.4-4.10 tied together): the public surface that
// owns a `Document` and its `Rom` together, resolves `Linked`/`Address`
// free variables (recursing into other parameters' `value()`), layers in
// `THAT`/`ADDRESS` contextual closures the engine itself doesn't own,
// and dispatches `value`/`set_value`/`apply`/`remove` across the five
// Parameter kinds. Grounded in the original's per-entity `value`
// property/setter pairs (`Table.py`, `Axis.py`, `Patch.py`, `Flag.py`).

use crate::array::{NArray, Shape};
use crate::binview;
use crate::config::LoadOptions;
use crate::engine;
use crate::env::Env;
use crate::error::{Result, XdfError};
use crate::flag;
use crate::function1d;
use crate::ir::Value;
use crate::model::{ArrayShape, Axis, Document, EmbeddedData, Math, ParamId, ParameterKind, Var};
use crate::patch;
use crate::rom::Rom;
use crate::table;
use std::collections::HashMap;

fn shape_dims(shape: &ArrayShape) -> (usize, usize) {
    match *shape {
        ArrayShape::Vector(n) => (n, 1),
        ArrayShape::Matrix(r, c) => (r, c),
    }
}

/// Resolve one Math's free variables into evaluator `Value`s, recursing
/// into `Linked` targets' own `value()` and reading `Address` vars as a
/// single raw byte (§3's three-way `Var` split; a plain byte read is the
/// simplest sound interpretation of "names a raw byte at a ROM offset" —
/// recorded as an Open Question resolution in DESIGN.md).
fn resolve_vars(
    doc: &Document,
    rom: &Rom,
    vars: &HashMap<String, Var>,
    options: &LoadOptions,
) -> Result<HashMap<String, Value>> {
    let mut env = HashMap::new();
    for (name, var) in vars {
        let value = match var {
            Var::Bound => continue,
            Var::Linked { param } => Value::Array(value(doc, rom, *param, options)?),
            Var::Address { offset } => {
                Value::scalar(rom.read(doc.base_offset.apply(*offset), 1)[0] as f64)
            }
        };
        env.insert(name.clone(), value);
    }
    Ok(env)
}

/// Merge every given Math's resolved free variables into one environment,
/// built the teacher's way — a fresh scope per Math chained onto a shared
/// root, then flattened to the plain map `ir::Ir::evaluate` wants.
fn merge_vars(
    doc: &Document,
    rom: &Rom,
    maths: &[&Math],
    options: &LoadOptions,
) -> Result<HashMap<String, Value>> {
    let root = std::rc::Rc::new(Env::<Value>::root());
    for math in maths {
        let scope = Env::chain(&root);
        scope.import(&resolve_vars(doc, rom, &math.vars, options)?);
        root.import(&scope.flatten());
    }
    Ok(root.flatten())
}

/// Read and convert one Parameter's current value (§4.4, §4.5, §4.10).
/// `Patch` has no scalar "value" of its own — see `applied`/`apply`.
pub fn value(doc: &Document, rom: &Rom, id: ParamId, options: &LoadOptions) -> Result<NArray> {
    let registry = engine::default_registry(options.rounding);
    let param = doc.parameter(id);

    match &param.kind {
        ParameterKind::Scalar(s) => {
            let raw = binview::read(rom, &s.data, doc.base_offset);
            let free = merge_vars(doc, rom, &[&s.math], options)?;
            engine::convert(
                &s.math,
                &raw,
                &free,
                &registry,
                Some(&raw),
                Some(&raw),
                options.cell_fill,
            )
        }
        ParameterKind::Table(t) => {
            let Axis::Z {
                data,
                equations,
                min,
                max,
            } = &t.z
            else {
                return Err(XdfError::SchemaError {
                    message: "Table.z must be a Z axis".into(),
                });
            };
            let raw = binview::read(rom, data, doc.base_offset);
            let (rows, cols) = shape_dims(&data.shape);
            let maths: Vec<&Math> = equations.iter().collect();
            let free = merge_vars(doc, rom, &maths, options)?;
            let out = table::convert(equations, &raw, rows, cols, &free, &registry, options.cell_fill)?;
            Ok(match (min, max) {
                (Some(lo), Some(hi)) => out.clamp(*lo, *hi),
                _ => out,
            })
        }
        ParameterKind::Function(f) => {
            let x_vals = axis_values(doc, rom, &f.x, options)?;
            let y_vals = axis_values(doc, rom, &f.y, options)?;
            let dense = function1d::monotone_interpolated(x_vals.data(), y_vals.data());
            Ok(NArray::vector(dense))
        }
        ParameterKind::Flag(flag) => Ok(NArray::scalar(if flag::value(flag, rom, doc.base_offset) { 1.0 } else { 0.0 })),
        ParameterKind::Patch(_) => Err(XdfError::TypeError {
            message: format!("parameter '{}' is a Patch; use `applied`/`apply`/`remove`", param.uniqueid),
        }),
    }
}

/// Read and convert a Table's own X and Y axes (§3, §12.3) — kept separate
/// from `value()` (which returns the Z grid, matching the one-`NArray`
/// contract every other Parameter kind honors) since a Table's X/Y carry
/// independent shapes of their own.
pub fn table_axis_values(
    doc: &Document,
    rom: &Rom,
    id: ParamId,
    options: &LoadOptions,
) -> Result<(NArray, NArray)> {
    match &doc.parameter(id).kind {
        ParameterKind::Table(t) => Ok((
            axis_values(doc, rom, &t.x, options)?,
            axis_values(doc, rom, &t.y, options)?,
        )),
        _ => Err(XdfError::TypeError {
            message: "table_axis_values() is only meaningful for Table parameters".into(),
        }),
    }
}

/// Resolve any axis variant to its converted values (§3's five-way `Axis`
/// split; §4.4/§4.10 for the embedded case). `Z` never appears as an X/Y
/// axis, so it is the one schema error left.
///
/// - `Embedded`: read the memory map and run it through the axis's own Math.
/// - `Label`: no memory map to read — a manual `<LABEL>` axis's numeric
///   value is its position along the axis (the original's `label_count`
///   plays the same indexing role; the label *strings* live only in
///   `labels` for display, not here).
/// - `FunctionLinked`: the referenced Function's own interpolated curve —
///   "Linked, Normalized" in the original's X/Y docstring.
/// - `TableLinked`: the first column of the referenced Table's converted Z
///   (§12.3), regardless of which axis (x or y) is doing the linking.
fn axis_values(doc: &Document, rom: &Rom, axis: &Axis, options: &LoadOptions) -> Result<NArray> {
    match axis {
        Axis::Embedded { data, math } => {
            let raw = binview::read(rom, data, doc.base_offset);
            let free = merge_vars(doc, rom, &[math], options)?;
            let registry = engine::default_registry(options.rounding);
            engine::convert(math, &raw, &free, &registry, Some(&raw), Some(&raw), options.cell_fill)
        }
        Axis::Label { labels } => Ok(NArray::vector((0..labels.len()).map(|i| i as f64).collect())),
        Axis::FunctionLinked { target } => value(doc, rom, *target, options),
        Axis::TableLinked { target } => {
            let z = value(doc, rom, *target, options)?;
            let (rows, cols) = z.shape().dims();
            let first_col: Vec<f64> = (0..rows).map(|r| z.get(r * cols)).collect();
            Ok(NArray::vector(first_col))
        }
        Axis::Z { .. } => Err(XdfError::SchemaError {
            message: "Z cannot appear as an X/Y axis".into(),
        }),
    }
}

/// Write a new value back through the Parameter's inverse, bounds-checked
/// against the storage dtype's representable range before any bytes
/// change (§4.4 step 5, §4.7 "Bounds on write").
pub fn set_value(
    doc: &Document,
    rom: &mut Rom,
    id: ParamId,
    options: &LoadOptions,
    values: &NArray,
) -> Result<()> {
    let registry = engine::default_registry(options.rounding);
    let param = doc.parameter(id);

    match &param.kind {
        ParameterKind::Scalar(s) => {
            let free = merge_vars(doc, rom, &[&s.math], options)?;
            let forward = |x: f64| -> Result<f64> {
                let out = engine::convert(
                    &s.math,
                    &NArray::scalar(x),
                    &free,
                    &registry,
                    None,
                    None,
                    options.cell_fill,
                )?;
                Ok(out.to_scalar())
            };
            let (lo, hi) = binview::logical_bounds(&s.data, forward)?;
            check_logical_bounds(values, lo, hi)?;
            let target = values.to_scalar();
            let (dtype_lo, dtype_hi) = dtype_range(&s.data);
            let raw_x = engine::invert_scalar(&s.math, target, &free, &registry, dtype_lo, dtype_hi)?;
            binview::write(rom, &s.data, &NArray::scalar(raw_x), dtype_lo, dtype_hi, doc.base_offset)
        }
        ParameterKind::Table(t) => {
            let Axis::Z { data, equations, .. } = &t.z else {
                return Err(XdfError::SchemaError {
                    message: "Table.z must be a Z axis".into(),
                });
            };
            let (rows, cols) = shape_dims(&data.shape);
            let maths: Vec<&Math> = equations.iter().collect();
            let free = merge_vars(doc, rom, &maths, options)?;
            let owners = table::governing(equations, rows, cols);
            let (dtype_lo, dtype_hi) = dtype_range(data);

            let mut bounds = Vec::with_capacity(rows * cols);
            for &math in &owners {
                let forward = |x: f64| -> Result<f64> {
                    let out = engine::convert(
                        math,
                        &NArray::scalar(x),
                        &free,
                        &registry,
                        None,
                        None,
                        options.cell_fill,
                    )?;
                    Ok(out.to_scalar())
                };
                bounds.push(binview::logical_bounds(data, forward)?);
            }
            check_logical_bounds_per_cell(values, &bounds)?;

            let mut raw_out = vec![0.0; rows * cols];
            for i in 0..rows * cols {
                let math = owners[i];
                raw_out[i] = engine::invert_scalar(
                    math,
                    values.get(i),
                    &free,
                    &registry,
                    dtype_lo,
                    dtype_hi,
                )?;
            }
            let raw_array = NArray::new(Shape::Matrix(rows, cols), raw_out);
            binview::write(rom, data, &raw_array, dtype_lo, dtype_hi, doc.base_offset)
        }
        ParameterKind::Flag(flag) => flag::set_value(flag, rom, values.to_scalar() != 0.0, doc.base_offset),
        ParameterKind::Function(_) => Err(XdfError::TypeError {
            message: "Function parameters are read-only via `interpolated`".into(),
        }),
        ParameterKind::Patch(_) => Err(XdfError::TypeError {
            message: format!("parameter '{}' is a Patch; use `apply`/`remove`", param.uniqueid),
        }),
    }
}

/// Check a caller-supplied logical value against the Math's logical
/// range before any inversion happens (§4.7 "Bounds on write", §7 "Bounds
/// errors on writes do not mutate any bytes").
fn check_logical_bounds(values: &NArray, lo: f64, hi: f64) -> Result<()> {
    let mut violations = vec![false; values.len()];
    let mut any = false;
    for i in 0..values.len() {
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
            violations: crate::array::Mask::new(values.shape().clone(), violations),
        });
    }
    Ok(())
}

/// Same check as `check_logical_bounds`, but against a per-cell `[lo, hi]`
/// table rather than one shared pair — a Table's cells can be governed by
/// different Maths (§4.5), so each one's logical range can differ (§4.7
/// "Bounds on write", §8 "Write bound").
fn check_logical_bounds_per_cell(values: &NArray, bounds: &[(f64, f64)]) -> Result<()> {
    let mut violations = vec![false; values.len()];
    let mut any = false;
    let mut reported: Option<(f64, f64)> = None;
    for i in 0..values.len() {
        let (lo, hi) = bounds[i];
        let v = values.get(i);
        if v < lo || v > hi {
            violations[i] = true;
            any = true;
            reported.get_or_insert((lo, hi));
        }
    }
    if any {
        let (lo, hi) = reported.unwrap();
        return Err(XdfError::BoundsError {
            lo,
            hi,
            value: values.get(0),
            violations: crate::array::Mask::new(values.shape().clone(), violations),
        });
    }
    Ok(())
}

fn dtype_range(data: &EmbeddedData) -> (f64, f64) {
    let width_bits = data.element_size_bits;
    if data.is_float() {
        (f64::MIN, f64::MAX)
    } else if data.is_signed() {
        let half = 1i64 << (width_bits - 1);
        (-half as f64, (half - 1) as f64)
    } else {
        (0.0, ((1u64 << width_bits) - 1) as f64)
    }
}

pub fn applied(doc: &Document, rom: &Rom, id: ParamId) -> Result<bool> {
    match &doc.parameter(id).kind {
        ParameterKind::Patch(p) => Ok(p.entries.iter().all(|e| patch::applied(e, rom, doc.base_offset))),
        _ => Err(XdfError::TypeError {
            message: "applied() is only meaningful for Patch parameters".into(),
        }),
    }
}

pub fn apply(doc: &Document, rom: &mut Rom, id: ParamId) -> Result<()> {
    match &doc.parameter(id).kind {
        ParameterKind::Patch(p) => patch::apply_all(p, rom, doc.base_offset),
        _ => Err(XdfError::TypeError {
            message: "apply() is only meaningful for Patch parameters".into(),
        }),
    }
}

pub fn remove(doc: &Document, rom: &mut Rom, id: ParamId) -> Result<()> {
    match &doc.parameter(id).kind {
        ParameterKind::Patch(p) => patch::remove_all(p, rom, doc.base_offset),
        _ => Err(XdfError::TypeError {
            message: "remove() is only meaningful for Patch parameters".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BaseOffset, Flag, MathKey, Parameter, Scalar, Table, TypeFlag, Unit};
    use std::collections::HashMap as Map;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn fixture(bytes: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    fn scalar_doc(bytes: &[u8]) -> (Document, NamedTempFile) {
        let f = fixture(bytes);
        let param = Parameter {
            uniqueid: "0x1".into(),
            title: "RPM".into(),
            description: None,
            vislevel: None,
            categories: vec![],
            kind: ParameterKind::Scalar(Scalar {
                data: EmbeddedData {
                    address: 0,
                    element_size_bits: 8,
                    shape: ArrayShape::Vector(1),
                    major_stride_bytes: 0,
                    minor_stride_bytes: 0,
                    flags: TypeFlag::Signed.into(),
                },
                math: Math::new(crate::model::MathKey::Global, "X * 2", Map::new()),
            }),
        };
        let doc = Document::new(
            "t".into(),
            "d".into(),
            "a".into(),
            0,
            BaseOffset { offset: 0, subtract: false },
            vec![],
            vec![param],
        );
        (doc, f)
    }

    #[test]
    fn test_scalar_value_applies_conversion() {
        let (doc, f) = scalar_doc(&[0x05]);
        let rom = Rom::open(f.path()).unwrap();
        let out = value(&doc, &rom, 0, &LoadOptions::new()).unwrap();
        assert_eq!(out.to_scalar(), 10.0);
    }

    #[test]
    fn test_scalar_set_value_round_trips() {
        let (doc, f) = scalar_doc(&[0x00]);
        let mut rom = Rom::open(f.path()).unwrap();
        set_value(&doc, &mut rom, 0, &LoadOptions::new(), &NArray::scalar(10.0)).unwrap();
        let out = value(&doc, &rom, 0, &LoadOptions::new()).unwrap();
        assert!((out.to_scalar() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_scalar_set_value_bounds_violation_mutates_nothing() {
        let (doc, f) = scalar_doc(&[0x07]);
        let mut rom = Rom::open(f.path()).unwrap();
        // X*2 over signed 8-bit X ranges logically over [-256, 254];
        // 9000 is well outside that.
        let err = set_value(&doc, &mut rom, 0, &LoadOptions::new(), &NArray::scalar(9000.0))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Bounds);
        assert_eq!(rom.read(0, 1), &[0x07]);
    }

    #[test]
    fn test_flag_dispatch() {
        let f = fixture(&[0b0000_0010]);
        let param = Parameter {
            uniqueid: "0x2".into(),
            title: "enabled".into(),
            description: None,
            vislevel: None,
            categories: vec![],
            kind: ParameterKind::Flag(Flag {
                address: 0,
                byte_len: 1,
                mask: 0b0000_0010,
                flags: crate::model::TypeFlags::empty(),
            }),
        };
        let doc = Document::new(
            "t".into(),
            "d".into(),
            "a".into(),
            0,
            BaseOffset { offset: 0, subtract: false },
            vec![],
            vec![param],
        );
        let rom = Rom::open(f.path()).unwrap();
        let out = value(&doc, &rom, 0, &LoadOptions::new()).unwrap();
        assert_eq!(out.to_scalar(), 1.0);
    }

    fn table_param(uniqueid: &str, x: Axis, y: Axis, z_data: EmbeddedData, z_src: &str) -> Parameter {
        Parameter {
            uniqueid: uniqueid.into(),
            title: "Table".into(),
            description: None,
            vislevel: None,
            categories: vec![],
            kind: ParameterKind::Table(Table {
                x,
                y,
                z: Axis::Z {
                    data: z_data,
                    equations: vec![Math::new(MathKey::Global, z_src, Map::new())],
                    min: None,
                    max: None,
                },
                unit: Unit::default(),
            }),
        }
    }

    fn z_data(rows: usize, cols: usize) -> EmbeddedData {
        EmbeddedData {
            address: 0,
            element_size_bits: 8,
            shape: ArrayShape::Matrix(rows, cols),
            major_stride_bytes: 0,
            minor_stride_bytes: 0,
            flags: TypeFlag::Signed.into(),
        }
    }

    #[test]
    fn test_table_axis_values_resolves_label_axes() {
        let f = fixture(&[10, 20]);
        let param = table_param(
            "0x3",
            Axis::Label { labels: vec!["lo".into(), "hi".into()] },
            Axis::Label { labels: vec!["only".into()] },
            z_data(1, 2),
            "X * 1",
        );
        let doc = Document::new(
            "t".into(), "d".into(), "a".into(), 0,
            BaseOffset { offset: 0, subtract: false },
            vec![], vec![param],
        );
        let rom = Rom::open(f.path()).unwrap();
        let (x, y) = table_axis_values(&doc, &rom, 0, &LoadOptions::new()).unwrap();
        assert_eq!(x.data(), &[0.0, 1.0]);
        assert_eq!(y.data(), &[0.0]);
    }

    #[test]
    fn test_table_linked_axis_resolves_first_column_of_target() {
        // spec §12.3: a TableLinked axis always takes the first column of
        // the referenced table's converted Z, whichever axis links it.
        let f = fixture(&[1, 2, 3, 4]);
        let source = table_param("0x4", Axis::Label { labels: vec![] }, Axis::Label { labels: vec![] }, z_data(2, 2), "X * 1");
        let linked = table_param(
            "0x5",
            Axis::TableLinked { target: 0 },
            Axis::Label { labels: vec![] },
            z_data(2, 2),
            "X * 1",
        );
        let doc = Document::new(
            "t".into(), "d".into(), "a".into(), 0,
            BaseOffset { offset: 0, subtract: false },
            vec![], vec![source, linked],
        );
        let rom = Rom::open(f.path()).unwrap();
        let (x, _y) = table_axis_values(&doc, &rom, 1, &LoadOptions::new()).unwrap();
        // raw [[1,2],[3,4]] converted identity -> column 0 is [1, 3].
        assert_eq!(x.data(), &[1.0, 3.0]);
    }

    #[test]
    fn test_table_set_value_bounds_violation_mutates_nothing() {
        let f = fixture(&[0, 0]);
        let param = table_param(
            "0x6",
            Axis::Label { labels: vec![] },
            Axis::Label { labels: vec![] },
            z_data(1, 2),
            "X * 2",
        );
        let doc = Document::new(
            "t".into(), "d".into(), "a".into(), 0,
            BaseOffset { offset: 0, subtract: false },
            vec![], vec![param],
        );
        let mut rom = Rom::open(f.path()).unwrap();
        // signed 8-bit X*2 ranges logically over [-256, 254]; 9000 is way
        // outside that for every cell.
        let err = set_value(
            &doc,
            &mut rom,
            0,
            &LoadOptions::new(),
            &NArray::matrix(1, 2, vec![9000.0, 0.0]),
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Bounds);
        assert_eq!(rom.read(0, 2), &[0, 0]);
    }
}

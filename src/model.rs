// Definition Model (§3, §9): a typed object tree materialized from a
// `RawDocument` (raw.rs), addressed via small numeric handles into flat
// arenas rather than owning references — the "central document index
// keyed by unique-id" §9 calls for, grounded in the teacher's own
// `Node<T> = Rc<T>` arena-ish handle style in `ast.rs`, generalized here
// to plain `usize` indices since cross-links need to survive a document
// reload without re-walking an XPath-style tree (`core/entity/Var.py`,
// `core/entity/Axis.py` in the original).

use crate::ir::Ir;
use enumflags2::BitFlags;
use std::collections::HashMap;

pub type ParamId = usize;

/// Type-flag bits for `EmbeddedData` (§6): `0x01` signed, `0x02`
/// little-endian, `0x04` column-major, `0x10000` floating-point.
#[derive(enumflags2::BitFlags, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TypeFlag {
    Signed = 0x01,
    LittleEndian = 0x02,
    ColumnMajor = 0x04,
    Float = 0x10000,
}

pub type TypeFlags = BitFlags<TypeFlag>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArrayShape {
    Vector(usize),
    Matrix(usize, usize),
}

/// Immutable descriptor locating and shaping bytes in ROM for a value
/// (§3, §4.7). `major_stride_bytes`/`minor_stride_bytes` are signed; zero
/// means "default contiguous stride" for that dimension.
#[derive(Clone, Debug)]
pub struct EmbeddedData {
    pub address: u64,
    pub element_size_bits: u32,
    pub shape: ArrayShape,
    pub major_stride_bytes: i64,
    pub minor_stride_bytes: i64,
    pub flags: TypeFlags,
}

impl EmbeddedData {
    pub fn byte_width(&self) -> u32 {
        self.element_size_bits.div_ceil(8)
    }

    pub fn is_signed(&self) -> bool {
        self.flags.contains(TypeFlag::Signed)
    }

    pub fn is_little_endian(&self) -> bool {
        self.flags.contains(TypeFlag::LittleEndian)
    }

    pub fn is_column_major(&self) -> bool {
        self.flags.contains(TypeFlag::ColumnMajor)
    }

    pub fn is_float(&self) -> bool {
        self.flags.contains(TypeFlag::Float)
    }
}

/// A free variable occurring in a `Math`'s source (§3, §11's `Var`
/// taxonomy, carried through from the original's `BoundVar`/`LinkedVar`/
/// `AddressVar` three-way split rather than collapsing address-vars into
/// linked-vars).
#[derive(Clone, Debug)]
pub enum Var {
    /// The implicit input, conventionally named "X".
    Bound,
    /// Resolves to another Parameter's current converted value.
    Linked { param: ParamId },
    /// Names a raw byte at a ROM offset.
    Address { offset: u64 },
}

/// A `Math`'s table-priority tag (§4.5, §9: `Math = Global | Row{r} |
/// Column{c} | Cell{r,c}`). `Row`/`Column` indices are stored 0-indexed
/// internally (the source's row/col attributes are 1-indexed).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MathKey {
    Global,
    Row(usize),
    Column(usize),
    Cell(usize, usize),
}

/// An expression, owning its source text, declared free variables, and a
/// lazily-parsed/lifted IR (§3, §4.1-4.2). `ir` is populated on first
/// parse and cached for the lifetime of the Document (definitions are
/// immutable post-load, §3 Lifecycle).
#[derive(Clone, Debug)]
pub struct Math {
    pub key: MathKey,
    pub source: String,
    pub vars: HashMap<String, Var>,
    ir: std::cell::RefCell<Option<Ir>>,
}

impl Math {
    pub fn new(key: MathKey, source: impl Into<String>, vars: HashMap<String, Var>) -> Math {
        Math {
            key,
            source: source.into(),
            vars,
            ir: std::cell::RefCell::new(None),
        }
    }

    /// Parse + lift the source on first use, returning the cached IR on
    /// every subsequent call (§4.4 step "Parse").
    pub fn ir(&self) -> crate::error::Result<Ir> {
        if let Some(ir) = self.ir.borrow().as_ref() {
            return Ok(ir.clone());
        }
        let parsed = crate::parser::parse(&self.source)?;
        let lifted = Ir::lift(&parsed);
        *self.ir.borrow_mut() = Some(lifted.clone());
        Ok(lifted)
    }
}

/// One dimension of a Table or Function (§3).
#[derive(Clone, Debug)]
pub enum Axis {
    Embedded {
        data: EmbeddedData,
        math: Math,
    },
    Label {
        labels: Vec<String>,
    },
    FunctionLinked {
        target: ParamId,
    },
    TableLinked {
        target: ParamId,
    },
    /// The distinguished Z axis of a Table: owns many Math equations
    /// with mask keys, no single conversion of its own (§4.5).
    Z {
        data: EmbeddedData,
        equations: Vec<Math>,
        min: Option<f64>,
        max: Option<f64>,
    },
}

/// Inert unit/quantity metadata (§11's supplemented feature), carried but
/// never enforced, mirroring `pint.Quantity` tags in the original's
/// `EmbeddedData.py`/`Axis.py`.
#[derive(Clone, Debug, Default)]
pub struct Unit(pub Option<String>);

#[derive(Clone, Debug)]
pub struct Table {
    pub x: Axis,
    pub y: Axis,
    pub z: Axis,
    pub unit: Unit,
}

#[derive(Clone, Debug)]
pub struct Function1D {
    pub x: Axis,
    pub y: Axis,
}

#[derive(Clone, Debug)]
pub struct Flag {
    pub address: u64,
    pub byte_len: u32,
    pub mask: u64,
    pub flags: TypeFlags,
}

#[derive(Clone, Debug)]
pub struct PatchEntry {
    pub address: u64,
    pub size: u32,
    pub patchdata: Vec<u8>,
    pub basedata: Option<Vec<u8>>,
}

#[derive(Clone, Debug)]
pub struct Patch {
    pub entries: Vec<PatchEntry>,
}

#[derive(Clone, Debug)]
pub struct Scalar {
    pub data: EmbeddedData,
    pub math: Math,
}

#[derive(Clone, Debug)]
pub enum ParameterKind {
    Scalar(Scalar),
    Table(Table),
    Function(Function1D),
    Flag(Flag),
    Patch(Patch),
}

#[derive(Clone, Debug)]
pub struct Parameter {
    pub uniqueid: String,
    pub title: String,
    pub description: Option<String>,
    pub vislevel: Option<u32>,
    pub categories: Vec<usize>,
    pub kind: ParameterKind,
}

#[derive(Copy, Clone, Debug)]
pub struct BaseOffset {
    pub offset: u64,
    pub subtract: bool,
}

impl BaseOffset {
    pub fn apply(&self, address: u64) -> u64 {
        if self.subtract {
            address.saturating_sub(self.offset)
        } else {
            address + self.offset
        }
    }
}

/// The root entity (§3): header metadata, categories, parameters, and an
/// id index into `parameters` built at load time so cross-links are
/// `ParamId`s, not owning references.
pub struct Document {
    pub title: String,
    pub description: String,
    pub author: String,
    pub region_size: u64,
    pub base_offset: BaseOffset,
    pub categories: Vec<String>,
    pub parameters: Vec<Parameter>,
    pub(crate) index: HashMap<String, ParamId>,
}

impl Document {
    pub fn new(
        title: String,
        description: String,
        author: String,
        region_size: u64,
        base_offset: BaseOffset,
        categories: Vec<String>,
        parameters: Vec<Parameter>,
    ) -> Document {
        let index = parameters
            .iter()
            .enumerate()
            .map(|(i, p)| (p.uniqueid.clone(), i))
            .collect();
        Document {
            title,
            description,
            author,
            region_size,
            base_offset,
            categories,
            parameters,
            index,
        }
    }

    pub fn find(&self, uniqueid: &str) -> Option<ParamId> {
        self.index.get(uniqueid).copied()
    }

    pub fn parameter(&self, id: ParamId) -> &Parameter {
        &self.parameters[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_flags_match_spec_bit_values() {
        let flags: TypeFlags = TypeFlag::Signed | TypeFlag::Float;
        assert!(flags.contains(TypeFlag::Signed));
        assert!(flags.contains(TypeFlag::Float));
        assert!(!flags.contains(TypeFlag::LittleEndian));
        assert_eq!(TypeFlag::Signed as u32, 0x01);
        assert_eq!(TypeFlag::LittleEndian as u32, 0x02);
        assert_eq!(TypeFlag::ColumnMajor as u32, 0x04);
        assert_eq!(TypeFlag::Float as u32, 0x10000);
    }

    #[test]
    fn test_base_offset_subtract() {
        let bo = BaseOffset {
            offset: 0x1000,
            subtract: true,
        };
        assert_eq!(bo.apply(0x1500), 0x500);
    }

    #[test]
    fn test_document_index_by_uniqueid() {
        let param = Parameter {
            uniqueid: "0x10".into(),
            title: "RPM".into(),
            description: None,
            vislevel: None,
            categories: vec![],
            kind: ParameterKind::Flag(Flag {
                address: 0,
                byte_len: 1,
                mask: 1,
                flags: TypeFlags::empty(),
            }),
        };
        let doc = Document::new(
            "t".into(),
            "d".into(),
            "a".into(),
            0,
            BaseOffset {
                offset: 0,
                subtract: false,
            },
            vec![],
            vec![param],
        );
        assert_eq!(doc.find("0x10"), Some(0));
        assert_eq!(doc.find("0x11"), None);
    }
}

// Definition document ingestion (§6): serde-deserializable structural
// mirror of the fields the core depends on, and a loader that builds a
// validated `model::Document` from it. Grounded in the teacher's `v1.rs`
// (RON-deserialize-then-`validate()`-into-`Config` pipeline), adapted to
// JSON since this crate treats the actual XML parse as an external
// collaborator's concern (§6 "not the literal XML shape").

use crate::config::LoadOptions;
use crate::error::{Result, XdfError};
use crate::model::{
    ArrayShape, Axis, BaseOffset, Document, EmbeddedData, Flag, Function1D, Math, MathKey,
    Parameter, ParameterKind, Patch, PatchEntry, Scalar, Table, TypeFlags, Unit, Var,
};
use enumflags2::BitFlags;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Deserialize, Debug)]
pub struct RawDocument {
    pub title: String,
    pub description: String,
    pub author: String,
    pub region_size_hex: String,
    pub base_offset_hex: String,
    #[serde(default)]
    pub base_offset_subtract: bool,
    #[serde(default)]
    pub categories: Vec<String>,
    pub parameters: Vec<RawParameter>,
}

#[derive(Deserialize, Debug)]
pub struct RawParameter {
    pub uniqueid: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub vislevel: Option<u32>,
    #[serde(default)]
    pub categories: Vec<usize>,
    pub kind: RawParameterKind,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "kind")]
pub enum RawParameterKind {
    Scalar {
        data: RawEmbeddedData,
        math: RawMath,
    },
    Table {
        x: RawAxis,
        y: RawAxis,
        z: RawZAxis,
    },
    Function {
        x: RawAxis,
        y: RawAxis,
    },
    Flag {
        address_hex: String,
        byte_len: u32,
        mask_hex: String,
        flags_hex: String,
    },
    Patch {
        entries: Vec<RawPatchEntry>,
    },
}

#[derive(Deserialize, Debug)]
pub struct RawPatchEntry {
    pub address_hex: String,
    pub size: u32,
    pub patchdata_hex: String,
    #[serde(default)]
    pub basedata_hex: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct RawAxis {
    #[serde(default)]
    pub embedinfo: Option<RawEmbedInfo>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub equations: Vec<RawMath>,
    #[serde(default)]
    pub data: Option<RawEmbeddedData>,
}

#[derive(Deserialize, Debug)]
pub struct RawEmbedInfo {
    /// 1 = embedded, 2 = linked to Function (normalized), 3 = linked to
    /// Table (scaled) — §6 `embedinfo.type`.
    pub link_type: u8,
    pub linkobjid: String,
}

#[derive(Deserialize, Debug)]
pub struct RawZAxis {
    pub data: RawEmbeddedData,
    pub equations: Vec<RawMath>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

#[derive(Deserialize, Debug)]
pub struct RawMath {
    pub equation: String,
    /// 1-indexed, per §6 row/col attributes.
    #[serde(default)]
    pub row: Option<usize>,
    #[serde(default)]
    pub col: Option<usize>,
    #[serde(default)]
    pub vars: HashMap<String, RawVar>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "kind")]
pub enum RawVar {
    Bound,
    Linked { param: String },
    Address { offset_hex: String },
}

#[derive(Deserialize, Debug)]
pub struct RawEmbeddedData {
    pub address_hex: String,
    pub element_size_bits: u32,
    #[serde(default)]
    pub row_count: Option<usize>,
    #[serde(default)]
    pub col_count: Option<usize>,
    #[serde(default)]
    pub major_stride_bytes: i64,
    #[serde(default)]
    pub minor_stride_bytes: i64,
    pub flags_hex: String,
}

fn parse_hex(field: &str, text: &str) -> Result<u64> {
    let trimmed = text.strip_prefix("0x").unwrap_or(text);
    u64::from_str_radix(trimmed, 16).map_err(|e| XdfError::SchemaError {
        message: format!("bad hex in '{field}': {e}"),
    })
}

fn parse_flags(field: &str, text: &str) -> Result<TypeFlags> {
    let bits = parse_hex(field, text)? as u32;
    Ok(BitFlags::from_bits_truncate(bits))
}

fn math_key(row: Option<usize>, col: Option<usize>) -> MathKey {
    match (row, col) {
        (Some(r), Some(c)) => MathKey::Cell(r - 1, c - 1),
        (Some(r), None) => MathKey::Row(r - 1),
        (None, Some(c)) => MathKey::Column(c - 1),
        (None, None) => MathKey::Global,
    }
}

fn build_vars(raw: HashMap<String, RawVar>, ids: &HashMap<String, usize>) -> Result<HashMap<String, Var>> {
    raw.into_iter()
        .map(|(name, v)| {
            let var = match v {
                RawVar::Bound => Var::Bound,
                RawVar::Linked { param } => {
                    let target = *ids.get(&param).ok_or_else(|| XdfError::SchemaError {
                        message: format!("unresolved parameter reference '{param}'"),
                    })?;
                    Var::Linked { param: target }
                }
                RawVar::Address { offset_hex } => Var::Address {
                    offset: parse_hex("offset_hex", &offset_hex)?,
                },
            };
            Ok((name, var))
        })
        .collect()
}

fn build_math(raw: RawMath, ids: &HashMap<String, usize>) -> Result<Math> {
    let key = math_key(raw.row, raw.col);
    let vars = build_vars(raw.vars, ids)?;
    Ok(Math::new(key, raw.equation, vars))
}

fn build_embedded_data(raw: RawEmbeddedData) -> Result<EmbeddedData> {
    let rows = raw.row_count.unwrap_or(1);
    let cols = raw.col_count.unwrap_or(1);
    let shape = if cols <= 1 {
        ArrayShape::Vector(rows)
    } else {
        ArrayShape::Matrix(rows, cols)
    };
    Ok(EmbeddedData {
        address: parse_hex("address_hex", &raw.address_hex)?,
        element_size_bits: raw.element_size_bits,
        shape,
        major_stride_bytes: raw.major_stride_bytes,
        minor_stride_bytes: raw.minor_stride_bytes,
        flags: parse_flags("flags_hex", &raw.flags_hex)?,
    })
}

fn build_axis(raw: RawAxis, ids: &HashMap<String, usize>) -> Result<Axis> {
    if !raw.labels.is_empty() {
        return Ok(Axis::Label { labels: raw.labels });
    }

    if let Some(info) = raw.embedinfo {
        let target = *ids.get(&info.linkobjid).ok_or_else(|| XdfError::SchemaError {
            message: format!("unresolved axis link '{}'", info.linkobjid),
        })?;
        return Ok(match info.link_type {
            2 => Axis::FunctionLinked { target },
            3 => Axis::TableLinked { target },
            other => {
                return Err(XdfError::SchemaError {
                    message: format!("unknown embedinfo type {other}"),
                })
            }
        });
    }

    let data = build_embedded_data(raw.data.ok_or_else(|| XdfError::SchemaError {
        message: "embedded axis missing EMBEDDEDDATA".into(),
    })?)?;
    let math_raw = raw.equations.into_iter().next().ok_or_else(|| XdfError::SchemaError {
        message: "embedded axis missing MATH".into(),
    })?;
    let math = build_math(math_raw, ids)?;
    Ok(Axis::Embedded { data, math })
}

fn build_z_axis(raw: RawZAxis, ids: &HashMap<String, usize>) -> Result<Axis> {
    let data = build_embedded_data(raw.data)?;
    let equations = raw
        .equations
        .into_iter()
        .map(|m| build_math(m, ids))
        .collect::<Result<Vec<_>>>()?;
    Ok(Axis::Z {
        data,
        equations,
        min: raw.min,
        max: raw.max,
    })
}

fn build_parameter(raw: RawParameter, ids: &HashMap<String, usize>) -> Result<Parameter> {
    let kind = match raw.kind {
        RawParameterKind::Scalar { data, math } => ParameterKind::Scalar(Scalar {
            data: build_embedded_data(data)?,
            math: build_math(math, ids)?,
        }),
        RawParameterKind::Table { x, y, z } => ParameterKind::Table(Table {
            x: build_axis(x, ids)?,
            y: build_axis(y, ids)?,
            z: build_z_axis(z, ids)?,
            unit: Unit::default(),
        }),
        RawParameterKind::Function { x, y } => ParameterKind::Function(Function1D {
            x: build_axis(x, ids)?,
            y: build_axis(y, ids)?,
        }),
        RawParameterKind::Flag {
            address_hex,
            byte_len,
            mask_hex,
            flags_hex,
        } => ParameterKind::Flag(Flag {
            address: parse_hex("address_hex", &address_hex)?,
            byte_len,
            mask: parse_hex("mask_hex", &mask_hex)?,
            flags: parse_flags("flags_hex", &flags_hex)?,
        }),
        RawParameterKind::Patch { entries } => ParameterKind::Patch(Patch {
            entries: entries
                .into_iter()
                .map(|e| {
                    Ok(PatchEntry {
                        address: parse_hex("address_hex", &e.address_hex)?,
                        size: e.size,
                        patchdata: crate::patch::parse_hex_lenient(&e.patchdata_hex),
                        basedata: e.basedata_hex.as_deref().map(crate::patch::parse_hex_lenient),
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        }),
    };

    Ok(Parameter {
        uniqueid: raw.uniqueid,
        title: raw.title,
        description: raw.description,
        vislevel: raw.vislevel,
        categories: raw.categories,
        kind,
    })
}

/// Build a `Document` from its raw structural form (§6), resolving every
/// `LinkedVar`/`FunctionLinked`/`TableLinked` reference against the
/// positional index implied by `parameters`' declaration order.
pub fn build_document(raw: RawDocument) -> Result<Document> {
    let ids: HashMap<String, usize> = raw
        .parameters
        .iter()
        .enumerate()
        .map(|(i, p)| (p.uniqueid.clone(), i))
        .collect();

    let parameters = raw
        .parameters
        .into_iter()
        .map(|p| build_parameter(p, &ids))
        .collect::<Result<Vec<_>>>()?;

    Ok(Document::new(
        raw.title,
        raw.description,
        raw.author,
        parse_hex("region_size_hex", &raw.region_size_hex)?,
        BaseOffset {
            offset: parse_hex("base_offset_hex", &raw.base_offset_hex)?,
            subtract: raw.base_offset_subtract,
        },
        raw.categories,
        parameters,
    ))
}

/// Read, parse, build and validate a Document from its on-disk JSON
/// structural form (§7 "Validator errors are raised at Document open").
pub fn load(path: &Path, options: &LoadOptions) -> Result<Document> {
    let text = std::fs::read_to_string(path)?;
    let raw: RawDocument = serde_json::from_str(&text).map_err(|e| XdfError::SchemaError {
        message: e.to_string(),
    })?;
    let doc = build_document(raw)?;
    crate::validator::validate(&doc, path, &options.ignore)?;
    Ok(doc)
}

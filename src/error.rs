// Error taxonomy for the conversion engine, binary view, validator and
// parameter facade. See spec §7.

use crate::array::Mask;
use std::path::PathBuf;
use thiserror::Error;

/// A node identifier inside one of the two reference graphs (§4.6).
pub type NodeId = String;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum XdfError {
    #[error("syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("undefined name '{name}'")]
    UndefinedName { name: String },

    #[error("type error: {message}")]
    TypeError { message: String },

    #[error("cycle in math reference graph in {document}: {}", describe_cycle(cycle))]
    MathCycle {
        cycle: Vec<NodeId>,
        document: PathBuf,
    },

    #[error("cycle in axis link graph in {document}: {}", describe_cycle(cycle))]
    AxisCycle {
        cycle: Vec<NodeId>,
        document: PathBuf,
    },

    #[error("math '{id}' contains more than one live CELL(...; false) call")]
    CellEquationError { id: NodeId },

    #[error("write value {value} out of representable range [{lo}, {hi}]")]
    BoundsError {
        lo: f64,
        hi: f64,
        value: f64,
        violations: Mask,
    },

    #[error("patch entry '{entry}' has no basedata to remove to")]
    UnpatchableError { entry: NodeId },

    #[error("schema error: {message}")]
    SchemaError { message: String },

    #[error("io error: {message}")]
    IOError { message: String },
}

impl From<std::io::Error> for XdfError {
    fn from(err: std::io::Error) -> XdfError {
        XdfError::IOError {
            message: err.to_string(),
        }
    }
}

fn describe_cycle(cycle: &[NodeId]) -> String {
    cycle.join(" -> ")
}

/// Tags used by `LoadOptions`' ignore-set (§7 propagation policy). Kept
/// separate from `XdfError` itself so callers can name a *kind* of error to
/// tolerate without constructing a dummy payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Syntax,
    UndefinedName,
    Type,
    MathCycle,
    AxisCycle,
    CellEquation,
    Bounds,
    Unpatchable,
    Schema,
    Io,
}

impl XdfError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            XdfError::SyntaxError { .. } => ErrorKind::Syntax,
            XdfError::UndefinedName { .. } => ErrorKind::UndefinedName,
            XdfError::TypeError { .. } => ErrorKind::Type,
            XdfError::MathCycle { .. } => ErrorKind::MathCycle,
            XdfError::AxisCycle { .. } => ErrorKind::AxisCycle,
            XdfError::CellEquationError { .. } => ErrorKind::CellEquation,
            XdfError::BoundsError { .. } => ErrorKind::Bounds,
            XdfError::UnpatchableError { .. } => ErrorKind::Unpatchable,
            XdfError::SchemaError { .. } => ErrorKind::Schema,
            XdfError::IOError { .. } => ErrorKind::Io,
        }
    }
}

pub type Result<T> = core::result::Result<T, XdfError>;

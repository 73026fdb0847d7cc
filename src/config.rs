// Runtime configuration surface (§10.3). Small data-only capability
// records, in the same style as the teacher's original `config.rs`
// (`Config`/`Gauge`/`Style` — plain serde-deserializable structs with no
// behavior), repurposed for load-time policy instead of dashboard layout.

use crate::error::ErrorKind;
use serde::Deserialize;
use std::collections::HashSet;

/// Governs truncation of bitwise/shift operands to integers (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RoundingMode {
    /// Truncate silently — matches TunerPro's observed behavior.
    Truncate,
    /// Raise a `TypeError` ("RoundingError") when truncation is lossy.
    Strict,
}

impl Default for RoundingMode {
    fn default() -> RoundingMode {
        RoundingMode::Truncate
    }
}

/// Resolves the Open Question (§9) about seeding a single-equation
/// `CELL(i; false)`'s initial array when the host isn't a ZAxis
/// accumulator (§4.4, §12.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CellFillMode {
    /// All-zero initial array, matching the reference implementation.
    ZeroInitial,
    /// All-NaN initial array, surfacing unfilled cells rather than
    /// silently treating them as zero.
    NaNInitial,
    /// Refuse to evaluate; callers get `CellEquationError`.
    Raise,
}

impl Default for CellFillMode {
    fn default() -> CellFillMode {
        CellFillMode::ZeroInitial
    }
}

/// Load-time policy passed to `Document::open` (§7 propagation policy,
/// §10.3). `ignore` is the set of `ErrorKind`s the validator downgrades
/// to warnings instead of failing the open outright.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub ignore: HashSet<ErrorKind>,
    pub rounding: RoundingMode,
    pub cell_fill: CellFillMode,
}

impl LoadOptions {
    pub fn new() -> LoadOptions {
        LoadOptions::default()
    }

    pub fn ignoring(mut self, kind: ErrorKind) -> LoadOptions {
        self.ignore.insert(kind);
        self
    }

    pub fn with_rounding(mut self, mode: RoundingMode) -> LoadOptions {
        self.rounding = mode;
        self
    }

    pub fn with_cell_fill(mut self, mode: CellFillMode) -> LoadOptions {
        self.cell_fill = mode;
        self
    }

    pub fn tolerates(&self, kind: ErrorKind) -> bool {
        self.ignore.contains(&kind)
    }
}

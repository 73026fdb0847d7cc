// Table Kernel (§4.5): combines a ZAxis's Global/Row/Column/Cell Math
// equations with a mask-priority overlay, forward and inverse. Grounded
// in `original_source/core/entity/Table.py` (`ZAxisMath`/`Table`) and
// `Mask.py` (`MaskedMath.mask`) for the masking idea, though the
// priority order here follows spec.md's explicit statement — Global <
// Row < Column < Cell — rather than the original's apparent Global <
// Column < Row < Cell (`overrides = [CellMath, RowMath]` in `Table.py`);
// see DESIGN.md for the recorded deviation.

use crate::array::{Mask, NArray, Shape};
use crate::config::CellFillMode;
use crate::engine;
use crate::error::Result;
use crate::ir::Value;
use crate::model::{Math, MathKey};
use std::collections::HashMap;
use std::rc::Rc;

type Registry = HashMap<String, Rc<dyn Fn(&[NArray]) -> Result<NArray>>>;

pub(crate) fn mask_for(key: &MathKey, rows: usize, cols: usize) -> Mask {
    let mut bits = vec![false; rows * cols];
    match *key {
        MathKey::Global => bits.iter_mut().for_each(|b| *b = true),
        MathKey::Row(r) => {
            for c in 0..cols {
                bits[r * cols + c] = true;
            }
        }
        MathKey::Column(c) => {
            for r in 0..rows {
                bits[r * cols + c] = true;
            }
        }
        MathKey::Cell(r, c) => bits[r * cols + c] = true,
    }
    Mask::new(Shape::Matrix(rows, cols), bits)
}

pub(crate) fn priority(key: &MathKey) -> u8 {
    match key {
        MathKey::Global => 0,
        MathKey::Row(_) => 1,
        MathKey::Column(_) => 2,
        MathKey::Cell(_, _) => 3,
    }
}

/// One priority group's equations in evaluation order (§4.5 step 2).
fn grouped(equations: &[Math]) -> Vec<Vec<&Math>> {
    let mut groups: [Vec<&Math>; 4] = Default::default();
    for eq in equations {
        groups[priority(&eq.key) as usize].push(eq);
    }
    groups.into_iter().filter(|g| !g.is_empty()).collect()
}

/// The single equation that owns each cell's final value under the same
/// priority order the forward kernel uses — the highest-priority Math
/// whose mask covers that cell (§4.5, used by the facade to invert a
/// write cell-by-cell).
pub(crate) fn governing(equations: &[Math], rows: usize, cols: usize) -> Vec<&Math> {
    let mut best: Vec<Option<&Math>> = vec![None; rows * cols];
    for eq in equations {
        let mask = mask_for(&eq.key, rows, cols);
        let p = priority(&eq.key);
        for i in 0..rows * cols {
            if mask.get(i) && best[i].map(|b| priority(&b.key) <= p).unwrap_or(true) {
                best[i] = Some(eq);
            }
        }
    }
    best.into_iter()
        .map(|o| o.expect("Global equation covers every cell"))
        .collect()
}

/// Forward table conversion (§4.5 "Forward kernel").
///
/// `raw` is the ZAxis's raw memory-mapped array (row-major, `(rows,
/// cols)`), used both as the starting accumulator and as `CELL(i;
/// true)`'s source throughout.
pub fn convert(
    equations: &[Math],
    raw: &NArray,
    rows: usize,
    cols: usize,
    free: &HashMap<String, Value>,
    registry: &Registry,
    cell_fill: CellFillMode,
) -> Result<NArray> {
    let mut acc = raw.clone();
    let groups = grouped(equations);

    for group in groups.iter() {
        let group_key_priority = priority(&group[0].key);
        // E only ever needs to cover *higher*-priority groups: a group's
        // own writes must not stomp on positions a later, higher-priority
        // group still has to write its own final value into (§4.5
        // rationale). Lower-priority groups never claim a position this
        // group doesn't already own outright.
        let excluded: Mask = Mask::union(
            Shape::Matrix(rows, cols),
            &groups
                .iter()
                .filter(|g| priority(&g[0].key) > group_key_priority)
                .flat_map(|g| g.iter().map(|eq| mask_for(&eq.key, rows, cols)))
                .collect::<Vec<_>>(),
        );

        for eq in group {
            let own_mask = mask_for(&eq.key, rows, cols);
            let write_mask = if group_key_priority == priority(&MathKey::Cell(0, 0)) {
                own_mask
            } else {
                own_mask.and(&excluded.not())
            };

            let ctx = engine::HostContext {
                host_len: rows * cols,
                row: row_of(&eq.key),
                col: col_of(&eq.key),
                rows: Some(rows),
                cols: Some(cols),
                accumulator: Some(&acc),
                raw: Some(raw),
            };
            let mut merged_free = free.clone();
            merged_free.extend(engine::contextual_env(&ctx));

            let evaluated = engine::convert(
                eq,
                &acc,
                &merged_free,
                registry,
                Some(&acc),
                Some(raw),
                cell_fill,
            )?;

            for i in 0..(rows * cols) {
                if write_mask.get(i) {
                    let value = if evaluated.len() == 1 {
                        evaluated.to_scalar()
                    } else {
                        evaluated.get(i)
                    };
                    acc.data_mut()[i] = value;
                }
            }
        }
    }

    Ok(acc)
}

fn row_of(key: &MathKey) -> Option<usize> {
    match *key {
        MathKey::Row(r) | MathKey::Cell(r, _) => Some(r),
        _ => None,
    }
}

fn col_of(key: &MathKey) -> Option<usize> {
    match *key {
        MathKey::Column(c) | MathKey::Cell(_, c) => Some(c),
        _ => None,
    }
}

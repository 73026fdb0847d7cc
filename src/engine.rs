// Conversion Engine (§4.4): compiles a `Math` into a callable forward
// function, resolves contextual/free names, handles the `CELL`
// self-reference by freezing, and inverts numerically. Grounded in
// `original_source/core/entity/Math.py` (`conversion_func`,
// `conversion_func_parameterized`) and `XDFAxisFunctor.py` for the
// INDEX/CELL contextual semantics.

use crate::array::NArray;
use crate::builtins;
use crate::config::{CellFillMode, RoundingMode};
use crate::error::{Result, XdfError};
use crate::ir::{Ir, Value};
use crate::model::Math;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

type Registry = HashMap<String, Rc<dyn Fn(&[NArray]) -> Result<NArray>>>;

/// Structural context the engine needs to build contextual closures
/// (§4.4's `INDEX`/`INDEXES`/`ROW`/`COL`/`ROWS`/`COLS`/`CELL`/`THIS`) —
/// everything the Table Kernel or Parameter Facade knows about the Math's
/// host that the Math itself does not.
pub struct HostContext<'a> {
    pub host_len: usize,
    pub row: Option<usize>,
    pub col: Option<usize>,
    pub rows: Option<usize>,
    pub cols: Option<usize>,
    /// In-progress accumulator: `CELL(i; false)`'s source.
    pub accumulator: Option<&'a NArray>,
    /// Raw memory-mapped values: `CELL(i; true)`'s source.
    pub raw: Option<&'a NArray>,
}

/// Build the contextual part of the free environment (§4.4 step 2,
/// partial — `THAT`/`ADDRESS` need Document/ROM access the engine
/// doesn't own, so the facade layers those in separately before calling
/// `Math::convert`).
pub fn contextual_env(ctx: &HostContext) -> HashMap<String, Value> {
    let mut env = HashMap::new();

    let host_len = ctx.host_len;
    env.insert(
        "INDEX".to_string(),
        Value::Closure(Rc::new(move |_args: &[NArray]| {
            Ok(NArray::vector((0..host_len).map(|i| i as f64).collect()))
        })),
    );
    env.insert("INDEXES".to_string(), Value::scalar(host_len as f64));

    if let Some(r) = ctx.row {
        env.insert("ROW".to_string(), Value::scalar(r as f64));
    }
    if let Some(c) = ctx.col {
        env.insert("COL".to_string(), Value::scalar(c as f64));
    }
    if let Some(rr) = ctx.rows {
        env.insert("ROWS".to_string(), Value::scalar(rr as f64));
    }
    if let Some(cc) = ctx.cols {
        env.insert("COLS".to_string(), Value::scalar(cc as f64));
    }

    let acc = ctx.accumulator.cloned();
    let raw = ctx.raw.cloned();
    env.insert(
        "CELL".to_string(),
        Value::Closure(Rc::new(move |args: &[NArray]| {
            gather_cell(args, acc.as_ref(), raw.as_ref())
        })),
    );

    if let Some(acc) = ctx.accumulator {
        let this = acc.clone();
        env.insert(
            "THIS".to_string(),
            Value::Closure(Rc::new(move |_args: &[NArray]| Ok(this.clone()))),
        );
    }

    env
}

fn gather_cell(args: &[NArray], acc: Option<&NArray>, raw: Option<&NArray>) -> Result<NArray> {
    if args.is_empty() {
        return Err(XdfError::TypeError {
            message: "CELL requires at least an index argument".into(),
        });
    }
    let idx = &args[0];
    let precalc = args.get(1).map(|v| v.to_scalar() != 0.0).unwrap_or(false);
    let source = if precalc { raw } else { acc };
    let source = source.ok_or_else(|| XdfError::TypeError {
        message: "CELL has no host array available in this context".into(),
    })?;
    let data: Vec<f64> = idx
        .data()
        .iter()
        .map(|&i| source.get(i.round() as usize))
        .collect();
    Ok(NArray::new(idx.shape().clone(), data))
}

/// `CELL`'s closure during the self-reference freeze (§4.4 "Cell
/// rewriting"): a live (`precalc == false`) read returns the *whole*
/// accumulator, not an extraction at `idx` — the placeholder the spec
/// describes carries the entire array, with `idx` only marking which
/// positions get hardened afterward. `precalc == true` is an ordinary raw
/// lookup and stays extraction-shaped.
fn gather_cell_live(
    args: &[NArray],
    acc_whole: &NArray,
    raw: Option<&NArray>,
    touched: Option<&RefCell<Vec<usize>>>,
) -> Result<NArray> {
    if args.is_empty() {
        return Err(XdfError::TypeError {
            message: "CELL requires at least an index argument".into(),
        });
    }
    let idx = &args[0];
    let precalc = args.get(1).map(|v| v.to_scalar() != 0.0).unwrap_or(false);
    if precalc {
        let source = raw.ok_or_else(|| XdfError::TypeError {
            message: "CELL has no raw host array available in this context".into(),
        })?;
        let data: Vec<f64> = idx
            .data()
            .iter()
            .map(|&i| source.get(i.round() as usize))
            .collect();
        Ok(NArray::new(idx.shape().clone(), data))
    } else {
        if let Some(t) = touched {
            let mut t = t.borrow_mut();
            for &i in idx.data() {
                t.push(i.round() as usize);
            }
        }
        Ok(acc_whole.clone())
    }
}

/// Does `ir` contain a live (`precalc == false`) `CELL` call? Only those
/// need the self-reference freeze; `CELL(i; true)` is an ordinary raw
/// read.
fn has_live_cell(ir: &Ir) -> bool {
    match ir {
        Ir::Literal(_) | Ir::Name(_) => false,
        Ir::Func(head, args) if head == "CELL" => {
            let precalc = args.get(1).map(|a| matches!(a, Ir::Literal(v) if *v != 0.0)).unwrap_or(false);
            !precalc || args.iter().any(has_live_cell)
        }
        Ir::Func(_, args) => args.iter().any(has_live_cell),
    }
}

/// Compile and run a `Math`'s forward conversion (§4.4 steps 1-4).
///
/// `bound` is the implicit input ("X"); `free` carries every resolved
/// Linked/Address value, and `THAT`/`ADDRESS` closures if the equation
/// needs them — everything `contextual_env` doesn't already cover. `acc`
/// is the in-progress accumulator and `raw` the raw memory-mapped array
/// this Math's own `CELL` calls read from (`false`/`true` respectively);
/// a missing `acc` falls back to `cell_fill`'s policy.
pub fn convert(
    math: &Math,
    bound: &NArray,
    free: &HashMap<String, Value>,
    registry: &Registry,
    acc: Option<&NArray>,
    raw: Option<&NArray>,
    cell_fill: CellFillMode,
) -> Result<NArray> {
    let ir = math.ir()?;

    let mut env = free.clone();
    env.insert("X".to_string(), Value::Array(bound.clone()));

    if !has_live_cell(&ir) {
        env.insert(
            "CELL".to_string(),
            Value::Closure(Rc::new({
                let acc = acc.cloned();
                let raw = raw.cloned();
                move |args: &[NArray]| gather_cell(args, acc.as_ref(), raw.as_ref())
            })),
        );
        return ir.evaluate(registry, &env);
    }

    let initial = match acc {
        Some(a) => a.clone(),
        None => match cell_fill {
            CellFillMode::ZeroInitial => NArray::zeros(bound.shape().clone()),
            CellFillMode::NaNInitial => bound.map(|_| f64::NAN),
            CellFillMode::Raise => {
                return Err(XdfError::CellEquationError {
                    id: math.source.clone(),
                })
            }
        },
    };

    // Pass 1: evaluate with the frozen initial accumulator, recording
    // which positions the live CELL call actually touched. `CELL`'s live
    // branch returns the whole accumulator (not an extraction at `idx`),
    // so combining it with a host-length "X" or a scalar literal always
    // broadcasts to host length, never to `idx`'s own shape.
    let touched: Rc<RefCell<Vec<usize>>> = Rc::new(RefCell::new(Vec::new()));
    let first_pass_acc = initial.clone();
    let touched_for_closure = touched.clone();
    let raw_owned = raw.cloned();
    let mut env1 = env.clone();
    env1.insert(
        "CELL".to_string(),
        Value::Closure(Rc::new({
            let raw_owned = raw_owned.clone();
            move |args: &[NArray]| {
                gather_cell_live(args, &first_pass_acc, raw_owned.as_ref(), Some(&touched_for_closure))
            }
        })),
    );
    let v1 = ir.evaluate(registry, &env1)?;

    // Harden: positions the live CELL call read now take the first
    // pass's output at that same position (§4.4 "Cell rewriting").
    let mut hardened = initial;
    for &i in touched.borrow().iter() {
        if i < hardened.len() {
            hardened.data_mut()[i] = v1.get(i);
        }
    }

    // Pass 2: re-evaluate against the hardened accumulator so positions
    // the live CELL call didn't touch see the update. The hardened
    // positions themselves keep their frozen value rather than whatever
    // the re-evaluation computes there — "the mask ensures further writes
    // to index i are ignored" (§4.4).
    let mut env2 = env;
    let second_pass_acc = hardened.clone();
    env2.insert(
        "CELL".to_string(),
        Value::Closure(Rc::new({
            move |args: &[NArray]| gather_cell_live(args, &second_pass_acc, raw_owned.as_ref(), None)
        })),
    );
    let mut v2 = ir.evaluate(registry, &env2)?;
    for &i in touched.borrow().iter() {
        if i < v2.len() {
            v2.data_mut()[i] = hardened.get(i);
        }
    }
    Ok(v2)
}

/// Numerically invert `math` over `[lo, hi]` by bisection (§4.4 step 5).
/// `f` must be monotonic on the interval — true of every pure-arithmetic
/// Math by construction (§8 "Inverse" property); callers are responsible
/// for picking an operative range that contains the root.
pub fn invert_scalar(
    math: &Math,
    target: f64,
    free: &HashMap<String, Value>,
    registry: &Registry,
    lo: f64,
    hi: f64,
) -> Result<f64> {
    let eval_at = |x: f64| -> Result<f64> {
        let out = convert(
            math,
            &NArray::scalar(x),
            free,
            registry,
            None,
            None,
            CellFillMode::ZeroInitial,
        )?;
        Ok(out.to_scalar())
    };

    let mut lo = lo;
    let mut hi = hi;
    let f_lo = eval_at(lo)?;
    let f_hi = eval_at(hi)?;
    let increasing = f_hi >= f_lo;

    const MAX_ITERS: u32 = 100;
    const EPS: f64 = 1e-9;
    for _ in 0..MAX_ITERS {
        let mid = (lo + hi) / 2.0;
        let f_mid = eval_at(mid)?;
        if (f_mid - target).abs() < EPS {
            return Ok(mid);
        }
        let mid_is_low = if increasing {
            f_mid < target
        } else {
            f_mid > target
        };
        if mid_is_low {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok((lo + hi) / 2.0)
}

pub fn default_registry(mode: RoundingMode) -> Registry {
    builtins::registry_with_mode(mode)
}

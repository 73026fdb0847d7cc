// Function-application IR (spec §4.2).
//
// The parser's `ast::Expr` is a syntax tree; this is what it gets lifted
// into before the conversion engine runs free-variable resolution and
// evaluation over it. Lifting turns every operator and literal into a
// uniform `Func`/`Name`/`Literal` shape, the same flattening the original
// reader does in its `FunctionCallTransformer` pass — operators become
// named calls (`ADD`, `MUL`, ...) so the rest of the pipeline only has to
// know about one kind of node: a function applied to a list of arguments.

use crate::array::NArray;
use crate::ast::{BinOp, Expr, Literal, UnOp};
use crate::error::{Result, XdfError};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// A resolved free variable: either a plain value, or a callable closure
/// standing in for a contextual name (`INDEX`, `CELL`, `THIS`, ...). The
/// Conversion Engine builds these closures; `ir` only needs to invoke them.
#[derive(Clone)]
pub enum Value {
    Array(NArray),
    Closure(Rc<dyn Fn(&[NArray]) -> Result<NArray>>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Array(a) => write!(f, "Value::Array({:?})", a),
            Value::Closure(_) => write!(f, "Value::Closure(..)"),
        }
    }
}

impl Value {
    pub fn scalar(v: f64) -> Value {
        Value::Array(NArray::scalar(v))
    }

    /// Forces this value down to an array, erroring if it is still an
    /// unapplied closure (a contextual name used without parens would hit
    /// this, matching `TypeError` in the original's `Evaluator`).
    pub fn into_array(self) -> Result<NArray> {
        match self {
            Value::Array(a) => Ok(a),
            Value::Closure(_) => Err(XdfError::TypeError {
                message: "contextual name used without a call".into(),
            }),
        }
    }
}

/// Canonical uppercase head names used for lifted operators, matching the
/// naming the original `function_registry` dict uses for its built-ins
/// (`SUM`, `IF`, ...) so the same registry lookup serves both.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ir {
    Literal(f64),
    Name(String),
    Func(String, Vec<Ir>),
}

impl Ir {
    /// Lift a parsed `Expr` into the flattened IR (§4.2 step "Lift").
    /// Operators become named `Func` nodes; `TRUE`/`FALSE` literals become
    /// `1.0`/`0.0` so the rest of the pipeline only ever deals in numbers.
    pub fn lift(expr: &Expr) -> Ir {
        match expr {
            Expr::Literal(Literal::Float(v)) => Ir::Literal(*v),
            Expr::Literal(Literal::Int(v)) => Ir::Literal(*v as f64),
            Expr::Literal(Literal::Bool(b)) => Ir::Literal(if *b { 1.0 } else { 0.0 }),
            Expr::Name(n) => Ir::Name(n.clone()),
            Expr::Unary(UnOp::Neg, e) => Ir::Func("NEG".into(), vec![Ir::lift(e)]),
            Expr::Binary(op, l, r) => {
                Ir::Func(binop_name(*op).into(), vec![Ir::lift(l), Ir::lift(r)])
            }
            Expr::Call(name, args) => {
                Ir::Func(name.to_uppercase(), args.iter().map(Ir::lift).collect())
            }
        }
    }

    /// Replace free `Name` nodes using `env` (§4.2 step "Replace"). Names
    /// missing from `env` are left as-is — they are resolved again at
    /// `evaluate` time by the engine's contextual registry, or surface as
    /// `UndefinedName` if nothing ever claims them.
    pub fn replace(&self, env: &HashMap<String, Value>) -> Ir {
        match self {
            Ir::Literal(v) => Ir::Literal(*v),
            Ir::Name(n) => match env.get(n) {
                Some(Value::Array(a)) if a.len() == 1 => Ir::Literal(a.to_scalar()),
                // Arrays wider than a scalar, or closures, can't be folded
                // into a plain node — they're substituted at evaluate time.
                _ => Ir::Name(n.clone()),
            },
            Ir::Func(head, args) => {
                Ir::Func(head.clone(), args.iter().map(|a| a.replace(env)).collect())
            }
        }
    }

    /// Evaluate to a numeric array (§4.2 step "Evaluate"). `registry` is
    /// the pure built-in function table (§4.3); `env` supplies values and
    /// closures for names the registry doesn't know about (bound
    /// variables, linked/address values, contextual calls).
    pub fn evaluate(
        &self,
        registry: &HashMap<String, Rc<dyn Fn(&[NArray]) -> Result<NArray>>>,
        env: &HashMap<String, Value>,
    ) -> Result<NArray> {
        match self {
            Ir::Literal(v) => Ok(NArray::scalar(*v)),
            Ir::Name(n) => match env.get(n) {
                Some(value) => value.clone().into_array(),
                None => Err(XdfError::UndefinedName { name: n.clone() }),
            },
            Ir::Func(head, args) => {
                let values: Result<Vec<NArray>> =
                    args.iter().map(|a| a.evaluate(registry, env)).collect();
                let values = values?;
                if let Some(f) = registry.get(head) {
                    return f(&values);
                }
                match env.get(head) {
                    Some(Value::Closure(f)) => f(&values),
                    Some(Value::Array(_)) => Err(XdfError::TypeError {
                        message: format!("'{}' is a value, not callable", head),
                    }),
                    None => Err(XdfError::UndefinedName { name: head.clone() }),
                }
            }
        }
    }

    /// Count occurrences of a given call head (used to enforce the
    /// CELL-per-Math invariant, §4.4/§4.6's `CellEquationError`).
    pub fn count(&self, head: &str) -> usize {
        match self {
            Ir::Literal(_) | Ir::Name(_) => 0,
            Ir::Func(h, args) => {
                let here = if h == head { 1 } else { 0 };
                here + args.iter().map(|a| a.count(head)).sum::<usize>()
            }
        }
    }

    /// Rewrite every live `CELL(i; false)` call into a literal `initial`
    /// value, and every `CELL(i; true)` call into `Name("__cell_acc")`
    /// (the running accumulator the engine threads through its row/column
    /// walk). This is the "freeze the self-reference, then iterate"
    /// technique the Table Kernel uses to make a recursive CELL equation
    /// converge (§4.4, §4.5) — the Python original has no equivalent
    /// because it only ever evaluates one cell at a time; this crate
    /// evaluates the whole axis vectorized, so the self-reference has to
    /// be made explicit as a loop-carried name instead.
    pub fn unbind_cell(&self, initial: f64) -> Ir {
        match self {
            Ir::Literal(v) => Ir::Literal(*v),
            Ir::Name(n) => Ir::Name(n.clone()),
            Ir::Func(head, args) if head == "CELL" => {
                let precalc = args.get(1).map(is_truthy_literal).unwrap_or(false);
                if precalc {
                    // CELL(i; true) reads the raw memory-mapped element,
                    // unrelated to the self-reference this transform
                    // targets — left untouched for the engine's own
                    // contextual resolution.
                    Ir::Func(head.clone(), args.iter().map(|a| a.unbind_cell(initial)).collect())
                } else {
                    Ir::Literal(initial)
                }
            }
            Ir::Func(head, args) => Ir::Func(
                head.clone(),
                args.iter().map(|a| a.unbind_cell(initial)).collect(),
            ),
        }
    }
}

fn is_truthy_literal(ir: &Ir) -> bool {
    matches!(ir, Ir::Literal(v) if *v != 0.0)
}

fn binop_name(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "ADD",
        BinOp::Sub => "SUB",
        BinOp::Mul => "MUL",
        BinOp::Div => "DIV",
        BinOp::Mod => "MOD",
        BinOp::Lt => "LT",
        BinOp::Gt => "GT",
        BinOp::Lte => "LTE",
        BinOp::Gte => "GTE",
        BinOp::Eq => "EQ",
        BinOp::Neq => "NEQ",
        BinOp::And => "AND",
        BinOp::Or => "OR",
        BinOp::Shl => "SHL",
        BinOp::Shr => "SHR",
        BinOp::BitOr => "BITOR",
        BinOp::BitNor => "BITNOR",
        BinOp::BitXor => "BITXOR",
        BinOp::BitAnd => "BITAND",
        BinOp::BitNand => "BITNAND",
    }
}

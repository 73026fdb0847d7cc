// Built-in function registry (spec §4.3).
//
// A mapping from uppercase name to a vectorized function over `NArray`
// arguments, mirroring the original reader's `FunctionCallTransformer.
// function_registry` dict one-for-one (`ABS` -> `np.abs`, `SUM` ->
// `functools.reduce(np.add, args)`, etc.) but operating on our own
// `NArray` instead of numpy.

use crate::array::NArray;
use crate::config::RoundingMode;
use crate::error::{Result, XdfError};
use std::collections::HashMap;
use std::rc::Rc;

type Builtin = Rc<dyn Fn(&[NArray]) -> Result<NArray>>;

fn unary(f: impl Fn(f64) -> f64 + 'static) -> Builtin {
    Rc::new(move |args: &[NArray]| {
        let a = require_arity(args, 1, "unary")?;
        Ok(a.map(&f))
    })
}

fn binary(f: impl Fn(f64, f64) -> f64 + 'static) -> Builtin {
    Rc::new(move |args: &[NArray]| {
        let (a, b) = require_arity2(args)?;
        a.zip_with(b, &f)
    })
}

fn require_arity<'a>(args: &'a [NArray], n: usize, name: &str) -> Result<&'a NArray> {
    if args.len() != n {
        return Err(XdfError::TypeError {
            message: format!("{} expects {} argument(s), got {}", name, n, args.len()),
        });
    }
    Ok(&args[0])
}

fn require_arity2(args: &[NArray]) -> Result<(&NArray, &NArray)> {
    if args.len() != 2 {
        return Err(XdfError::TypeError {
            message: format!("expected 2 arguments, got {}", args.len()),
        });
    }
    Ok((&args[0], &args[1]))
}

fn truncate(v: f64, mode: RoundingMode) -> Result<f64> {
    let t = v.trunc();
    if mode == RoundingMode::Strict && t != v {
        return Err(XdfError::TypeError {
            message: format!("RoundingError: {} is not integral under Strict mode", v),
        });
    }
    Ok(t)
}

fn bitwise(mode: RoundingMode, f: impl Fn(i64, i64) -> i64 + 'static) -> Builtin {
    Rc::new(move |args: &[NArray]| {
        let (a, b) = require_arity2(args)?;
        if mode == RoundingMode::Strict {
            for &v in a.data().iter().chain(b.data().iter()) {
                truncate(v, mode)?;
            }
        }
        a.zip_with(b, |x, y| f(x.trunc() as i64, y.trunc() as i64) as f64)
    })
}

/// Build the pure (non-contextual) built-in registry. Bitwise/shift
/// operators are parameterized by `mode` (§4.3's rounding policy); the
/// engine rebuilds the registry per-document from `LoadOptions`.
pub fn registry_with_mode(mode: RoundingMode) -> HashMap<String, Builtin> {
    let mut r: HashMap<String, Builtin> = HashMap::new();

    r.insert("ABS".into(), unary(f64::abs));
    r.insert("EXP".into(), unary(f64::exp));
    r.insert("LOG".into(), unary(f64::ln));
    r.insert("LOG10".into(), unary(f64::log10));
    r.insert("SQR".into(), unary(f64::sqrt));
    r.insert("SIN".into(), unary(f64::sin));
    r.insert("COS".into(), unary(f64::cos));
    r.insert("TAN".into(), unary(f64::tan));
    r.insert("SINH".into(), unary(f64::sinh));
    r.insert("COSH".into(), unary(f64::cosh));
    r.insert("TANH".into(), unary(f64::tanh));
    r.insert("ASIN".into(), unary(f64::asin));
    r.insert("ACOS".into(), unary(f64::acos));
    r.insert("ATAN".into(), unary(f64::atan));
    r.insert("ASINH".into(), unary(f64::asinh));
    r.insert("ACOSH".into(), unary(f64::acosh));
    r.insert("ATANH".into(), unary(f64::atanh));
    r.insert("RADIANS".into(), unary(f64::to_radians));
    r.insert("DEGREES".into(), unary(f64::to_degrees));
    r.insert("FLOOR".into(), unary(f64::floor));
    r.insert("CEIL".into(), unary(f64::ceil));
    r.insert("NEG".into(), unary(|v| -v));

    r.insert("POW".into(), binary(f64::powf));
    r.insert(
        "ROUND".into(),
        binary(|v, decimals| {
            let scale = 10f64.powf(decimals);
            (v * scale).round() / scale
        }),
    );
    r.insert("MROUND".into(), binary(|a, b| (a / b).floor()));

    r.insert("ADD".into(), binary(|a, b| a + b));
    r.insert("SUB".into(), binary(|a, b| a - b));
    r.insert("MUL".into(), binary(|a, b| a * b));
    r.insert("DIV".into(), binary(|a, b| a / b));
    r.insert("MOD".into(), binary(|a, b| a.rem_euclid(b)));

    r.insert("LT".into(), binary(|a, b| bool_f(a < b)));
    r.insert("GT".into(), binary(|a, b| bool_f(a > b)));
    r.insert("LTE".into(), binary(|a, b| bool_f(a <= b)));
    r.insert("GTE".into(), binary(|a, b| bool_f(a >= b)));
    r.insert("EQ".into(), binary(|a, b| bool_f(a == b)));
    r.insert("NEQ".into(), binary(|a, b| bool_f(a != b)));
    r.insert("AND".into(), binary(|a, b| bool_f(a != 0.0 && b != 0.0)));
    r.insert("OR".into(), binary(|a, b| bool_f(a != 0.0 || b != 0.0)));

    r.insert("SHL".into(), bitwise(mode, |a, b| a << b));
    r.insert("SHR".into(), bitwise(mode, |a, b| a >> b));
    r.insert("BITOR".into(), bitwise(mode, |a, b| a | b));
    r.insert("BITNOR".into(), bitwise(mode, |a, b| !(a | b)));
    r.insert("BITXOR".into(), bitwise(mode, |a, b| a ^ b));
    r.insert("BITAND".into(), bitwise(mode, |a, b| a & b));
    r.insert("BITNAND".into(), bitwise(mode, |a, b| !(a & b)));

    r.insert(
        "SUM".into(),
        Rc::new(|args: &[NArray]| NArray::reduce_all(args, |a, b| a + b)),
    );
    r.insert(
        "AVG".into(),
        Rc::new(|args: &[NArray]| {
            let sum = NArray::reduce_all(args, |a, b| a + b)?;
            Ok(sum.map(|v| v / args.len() as f64))
        }),
    );
    r.insert(
        "MIN".into(),
        Rc::new(|args: &[NArray]| NArray::reduce_all(args, f64::min)),
    );
    r.insert(
        "MAX".into(),
        Rc::new(|args: &[NArray]| NArray::reduce_all(args, f64::max)),
    );
    r.insert(
        "IF".into(),
        Rc::new(|args: &[NArray]| {
            if args.len() != 3 {
                return Err(XdfError::TypeError {
                    message: format!("IF expects 3 arguments, got {}", args.len()),
                });
            }
            let (cond, t, f) = (&args[0], &args[1], &args[2]);
            let lane = cond.zip_with(t, |c, tv| if c != 0.0 { tv } else { f64::NAN })?;
            lane.zip_with(f, |v, fv| if v.is_nan() { fv } else { v })
        }),
    );

    r
}

/// Default registry under TunerPro-compatible (`Truncate`) rounding.
pub fn registry() -> HashMap<String, Builtin> {
    registry_with_mode(RoundingMode::Truncate)
}

fn bool_f(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abs() {
        let r = registry();
        let out = (r["ABS"])(&[NArray::vector(vec![-1.0, 2.0, -3.0])]).unwrap();
        assert_eq!(out.data(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_if_selects_lane() {
        let r = registry();
        let out = (r["IF"])(&[
            NArray::vector(vec![1.0, 0.0]),
            NArray::vector(vec![10.0, 10.0]),
            NArray::vector(vec![20.0, 20.0]),
        ])
        .unwrap();
        assert_eq!(out.data(), &[10.0, 20.0]);
    }

    #[test]
    fn test_avg() {
        let r = registry();
        let out = (r["AVG"])(&[NArray::scalar(2.0), NArray::scalar(4.0)]).unwrap();
        assert_eq!(out.to_scalar(), 3.0);
    }

    #[test]
    fn test_bitand_truncates() {
        let r = registry();
        let out = (r["BITAND"])(&[NArray::scalar(6.0), NArray::scalar(3.0)]).unwrap();
        assert_eq!(out.to_scalar(), 2.0);
    }

    #[test]
    fn test_bitand_strict_rejects_fraction() {
        let r = registry_with_mode(RoundingMode::Strict);
        let res = (r["BITAND"])(&[NArray::scalar(6.5), NArray::scalar(3.0)]);
        assert!(res.is_err());
    }

    #[test]
    fn test_wrong_arity_errors() {
        let r = registry();
        assert!((r["ABS"])(&[]).is_err());
    }
}

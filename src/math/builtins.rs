//! Builtin function metadata and implementations for PEtab math.
use std::ops::RangeInclusive;

use crate::math::MathError;

/// Return the allowed argument count range for a builtin, if known.
/// Use inclusive ranges; None means unknown function.
pub fn arg_count_range(name: &str) -> Option<RangeInclusive<usize>> {
    match name {
        "exp" | "ln" | "log2" | "log10" | "sqrt" | "abs" | "sign" | "floor" | "ceil" | "sin"
        | "cos" | "tan" | "cot" | "sec" | "csc" | "arcsin" | "arccos" | "arctan" | "arccot"
        | "arcsec" | "arccsc" | "sinh" | "cosh" | "tanh" | "coth" | "sech" | "csch"
        | "arcsinh" | "arccosh" | "arctanh" | "arccoth" | "arcsech" | "arccsch" => Some(1..=1),
        "log" => Some(1..=2),
        "pow" => Some(2..=2),
        "min" | "max" => Some(1..=usize::MAX),
        "piecewise" => Some(2..=usize::MAX),
        _ => None,
    }
}

/// Return true if the name is a known builtin function.
pub fn is_known_function(name: &str) -> bool {
    arg_count_range(name).is_some()
}

pub(crate) fn eval_call(name: &str, args: &[f64]) -> Result<f64, MathError> {
    let range = arg_count_range(name).ok_or_else(|| MathError::UnknownFunction(name.to_string()))?;
    if !range.contains(&args.len()) {
        return Err(MathError::ArgumentCount {
            name: name.to_string(),
            got: args.len(),
        });
    }
    let x = args[0];
    let value = match name {
        "exp" => x.exp(),
        "ln" => x.ln(),
        "log" => match args.get(1) {
            Some(base) => x.ln() / base.ln(),
            None => x.ln(),
        },
        "log2" => x.log2(),
        "log10" => x.log10(),
        "sqrt" => x.sqrt(),
        "abs" => x.abs(),
        "sign" => {
            if x > 0.0 {
                1.0
            } else if x < 0.0 {
                -1.0
            } else {
                x
            }
        }
        "floor" => x.floor(),
        "ceil" => x.ceil(),
        "pow" => x.powf(args[1]),
        "min" => args.iter().copied().fold(f64::INFINITY, f64::min),
        "max" => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        "sin" => x.sin(),
        "cos" => x.cos(),
        "tan" => x.tan(),
        "cot" => 1.0 / x.tan(),
        "sec" => 1.0 / x.cos(),
        "csc" => 1.0 / x.sin(),
        "arcsin" => x.asin(),
        "arccos" => x.acos(),
        "arctan" => x.atan(),
        "arccot" => (1.0 / x).atan(),
        "arcsec" => (1.0 / x).acos(),
        "arccsc" => (1.0 / x).asin(),
        "sinh" => x.sinh(),
        "cosh" => x.cosh(),
        "tanh" => x.tanh(),
        "coth" => 1.0 / x.tanh(),
        "sech" => 1.0 / x.cosh(),
        "csch" => 1.0 / x.sinh(),
        "arcsinh" => x.asinh(),
        "arccosh" => x.acosh(),
        "arctanh" => x.atanh(),
        "arccoth" => (1.0 / x).atanh(),
        "arcsech" => (1.0 / x).acosh(),
        "arccsch" => (1.0 / x).asinh(),
        "piecewise" => piecewise(args)?,
        _ => return Err(MathError::UnknownFunction(name.to_string())),
    };
    Ok(value)
}

// piecewise(value_1, condition_1, ..., value_n, condition_n[, otherwise])
fn piecewise(args: &[f64]) -> Result<f64, MathError> {
    let mut pairs = args.chunks_exact(2);
    for pair in &mut pairs {
        if pair[1] != 0.0 {
            return Ok(pair[0]);
        }
    }
    match pairs.remainder() {
        [otherwise] => Ok(*otherwise),
        _ => Err(MathError::PiecewiseNoMatch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_with_base() {
        let v = eval_call("log", &[100.0, 10.0]).unwrap();
        assert!((v - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_piecewise_otherwise() {
        assert_eq!(eval_call("piecewise", &[1.0, 0.0, 3.0]).unwrap(), 3.0);
        assert_eq!(eval_call("piecewise", &[1.0, 1.0, 3.0]).unwrap(), 1.0);
        assert!(eval_call("piecewise", &[1.0, 0.0]).is_err());
    }

    #[test]
    fn test_wrong_argument_count() {
        assert!(matches!(
            eval_call("exp", &[1.0, 2.0]),
            Err(MathError::ArgumentCount { .. })
        ));
    }
}

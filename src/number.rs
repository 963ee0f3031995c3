// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Arithmetic over the numeric tower `Bool ⊂ Int ⊂ Float`.
//!
//! Integers are a fixed-width wide integer; checked operations raise
//! `OverflowError` rather than wrapping. Floats follow IEEE-754 double
//! semantics. Division and modulo by zero raise `ZeroDivisionError`.

use crate::exceptions::{raise, ExcType, Raised, Result};
use crate::value::Value;

use core::cmp::Ordering;

/// Numeric payload after collapsing `Bool` into `Int`.
#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

fn as_num(v: &Value) -> Option<Num> {
    match v {
        Value::Bool(b) => Some(Num::Int(*b as i64)),
        Value::Int(i) => Some(Num::Int(*i)),
        Value::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

fn overflow(op: &str) -> Raised {
    raise(ExcType::OverflowError, format!("integer {op} overflows"))
}

fn zero_division(msg: &str) -> Raised {
    raise(ExcType::ZeroDivisionError, msg.to_string())
}

/// Numeric equality across the tower. Callers have already established
/// that both operands are numeric.
pub fn eq(a: &Value, b: &Value) -> bool {
    match (as_num(a), as_num(b)) {
        (Some(Num::Int(x)), Some(Num::Int(y))) => x == y,
        (Some(Num::Float(x)), Some(Num::Float(y))) => x == y,
        (Some(Num::Int(x)), Some(Num::Float(y))) | (Some(Num::Float(y)), Some(Num::Int(x))) => {
            x as f64 == y
        }
        _ => false,
    }
}

pub fn cmp(a: &Value, b: &Value) -> Result<Ordering> {
    let (x, y) = match (as_num(a), as_num(b)) {
        (Some(x), Some(y)) => (x, y),
        _ => {
            return Err(raise(
                ExcType::TypeError,
                format!(
                    "'<' not supported between instances of '{}' and '{}'",
                    a.type_name(),
                    b.type_name()
                ),
            ))
        }
    };
    let ord = match (x, y) {
        (Num::Int(x), Num::Int(y)) => x.cmp(&y),
        (Num::Float(x), Num::Float(y)) => x
            .partial_cmp(&y)
            .ok_or_else(|| raise(ExcType::ValueError, "cannot order NaN"))?,
        (Num::Int(x), Num::Float(y)) => (x as f64)
            .partial_cmp(&y)
            .ok_or_else(|| raise(ExcType::ValueError, "cannot order NaN"))?,
        (Num::Float(x), Num::Int(y)) => x
            .partial_cmp(&(y as f64))
            .ok_or_else(|| raise(ExcType::ValueError, "cannot order NaN"))?,
    };
    Ok(ord)
}

pub fn add(a: &Value, b: &Value) -> Option<Result<Value>> {
    binary(a, b, |x, y| {
        x.checked_add(y).ok_or_else(|| overflow("addition"))
    }, |x, y| x + y)
}

pub fn sub(a: &Value, b: &Value) -> Option<Result<Value>> {
    binary(a, b, |x, y| {
        x.checked_sub(y).ok_or_else(|| overflow("subtraction"))
    }, |x, y| x - y)
}

pub fn mul(a: &Value, b: &Value) -> Option<Result<Value>> {
    binary(a, b, |x, y| {
        x.checked_mul(y).ok_or_else(|| overflow("multiplication"))
    }, |x, y| x * y)
}

/// True division: always a float, like the source language.
pub fn truediv(a: &Value, b: &Value) -> Option<Result<Value>> {
    let (x, y) = match (as_num(a), as_num(b)) {
        (Some(x), Some(y)) => (x, y),
        _ => return None,
    };
    let int_op = matches!((x, y), (Num::Int(_), Num::Int(_)));
    let (x, y) = (to_f64(x), to_f64(y));
    Some(if y == 0.0 {
        if int_op {
            Err(zero_division("division by zero"))
        } else {
            Err(zero_division("float division by zero"))
        }
    } else {
        Ok(Value::Float(x / y))
    })
}

/// Floor division with the source language's sign semantics.
pub fn floordiv(a: &Value, b: &Value) -> Option<Result<Value>> {
    let (x, y) = match (as_num(a), as_num(b)) {
        (Some(x), Some(y)) => (x, y),
        _ => return None,
    };
    Some(match (x, y) {
        (Num::Int(x), Num::Int(y)) => {
            if y == 0 {
                Err(zero_division("integer division or modulo by zero"))
            } else if x == i64::MIN && y == -1 {
                Err(overflow("division"))
            } else {
                let q = x / y;
                let r = x % y;
                Ok(Value::Int(if r != 0 && (r < 0) != (y < 0) {
                    q - 1
                } else {
                    q
                }))
            }
        }
        _ => {
            let (x, y) = (to_f64(x), to_f64(y));
            if y == 0.0 {
                Err(zero_division("float floor division by zero"))
            } else {
                Ok(Value::Float((x / y).floor()))
            }
        }
    })
}

/// Modulo with the source language's sign semantics (result takes the
/// sign of the divisor).
pub fn modulo(a: &Value, b: &Value) -> Option<Result<Value>> {
    let (x, y) = match (as_num(a), as_num(b)) {
        (Some(x), Some(y)) => (x, y),
        _ => return None,
    };
    Some(match (x, y) {
        (Num::Int(x), Num::Int(y)) => {
            if y == 0 {
                Err(zero_division("integer modulo by zero"))
            } else if y == -1 {
                // Avoids the i64::MIN % -1 overflow corner.
                Ok(Value::Int(0))
            } else {
                let r = x % y;
                Ok(Value::Int(if r != 0 && (r < 0) != (y < 0) {
                    r + y
                } else {
                    r
                }))
            }
        }
        _ => {
            let (x, y) = (to_f64(x), to_f64(y));
            if y == 0.0 {
                Err(zero_division("float modulo"))
            } else {
                let r = x % y;
                Ok(Value::Float(if r != 0.0 && (r < 0.0) != (y < 0.0) {
                    r + y
                } else {
                    r
                }))
            }
        }
    })
}

pub fn pow(a: &Value, b: &Value) -> Option<Result<Value>> {
    let (x, y) = match (as_num(a), as_num(b)) {
        (Some(x), Some(y)) => (x, y),
        _ => return None,
    };
    Some(match (x, y) {
        (Num::Int(x), Num::Int(y)) if y >= 0 => u32::try_from(y)
            .ok()
            .and_then(|exp| x.checked_pow(exp))
            .map(Value::Int)
            .ok_or_else(|| overflow("exponentiation")),
        _ => {
            let (x, y) = (to_f64(x), to_f64(y));
            Ok(Value::Float(x.powf(y)))
        }
    })
}

/// Three-argument `pow(base, exp, mod)` over integers.
pub fn pow_mod(base: i64, exp: i64, modulus: i64) -> Result<Value> {
    if modulus == 0 {
        return Err(value_error_msg("pow() 3rd argument cannot be 0"));
    }
    if exp < 0 {
        return Err(raise(
            ExcType::ValueError,
            "pow() 2nd argument cannot be negative when 3rd argument specified",
        ));
    }
    let m = modulus.unsigned_abs() as i128;
    let mut result: i128 = 1;
    let mut b = (base as i128).rem_euclid(m);
    let mut e = exp as u64;
    while e > 0 {
        if e & 1 == 1 {
            result = result * b % m;
        }
        b = b * b % m;
        e >>= 1;
    }
    let mut out = result;
    // Result takes the sign of the modulus.
    if modulus < 0 && out != 0 {
        out += modulus as i128;
    }
    Ok(Value::Int(out as i64))
}

fn value_error_msg(msg: &str) -> Raised {
    raise(ExcType::ValueError, msg.to_string())
}

pub fn neg(a: &Value) -> Option<Result<Value>> {
    Some(match as_num(a)? {
        Num::Int(x) => x
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| overflow("negation")),
        Num::Float(x) => Ok(Value::Float(-x)),
    })
}

pub fn pos(a: &Value) -> Option<Value> {
    Some(match as_num(a)? {
        Num::Int(x) => Value::Int(x),
        Num::Float(x) => Value::Float(x),
    })
}

pub fn abs(a: &Value) -> Option<Result<Value>> {
    Some(match as_num(a)? {
        Num::Int(x) => x
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| overflow("negation")),
        Num::Float(x) => Ok(Value::Float(x.abs())),
    })
}

/// `divmod(a, b)` as a pair, with floor-division semantics.
pub fn divmod(a: &Value, b: &Value) -> Option<Result<(Value, Value)>> {
    let q = match floordiv(a, b)? {
        Ok(q) => q,
        Err(e) => return Some(Err(e)),
    };
    let r = match modulo(a, b)? {
        Ok(r) => r,
        Err(e) => return Some(Err(e)),
    };
    Some(Ok((q, r)))
}

/// Integer-only argument coercion for bitwise and shift operators.
pub fn as_int_operand(v: &Value) -> Option<i64> {
    match v {
        Value::Bool(b) => Some(*b as i64),
        Value::Int(i) => Some(*i),
        _ => None,
    }
}

pub fn shl(x: i64, y: i64) -> Result<Value> {
    if y < 0 {
        return Err(value_error_msg("negative shift count"));
    }
    if x == 0 {
        return Ok(Value::Int(0));
    }
    u32::try_from(y)
        .ok()
        .and_then(|s| x.checked_shl(s).filter(|r| r >> s == x))
        .map(Value::Int)
        .ok_or_else(|| overflow("shift"))
}

pub fn shr(x: i64, y: i64) -> Result<Value> {
    if y < 0 {
        return Err(value_error_msg("negative shift count"));
    }
    let s = u32::try_from(y).unwrap_or(u32::MAX).min(63);
    Ok(Value::Int(x >> s))
}

fn binary(
    a: &Value,
    b: &Value,
    int_op: impl FnOnce(i64, i64) -> Result<i64>,
    float_op: impl FnOnce(f64, f64) -> f64,
) -> Option<Result<Value>> {
    let (x, y) = match (as_num(a), as_num(b)) {
        (Some(x), Some(y)) => (x, y),
        _ => return None,
    };
    Some(match (x, y) {
        (Num::Int(x), Num::Int(y)) => int_op(x, y).map(Value::Int),
        _ => Ok(Value::Float(float_op(to_f64(x), to_f64(y)))),
    })
}

fn to_f64(n: Num) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Float(f) => f,
    }
}

/// Float repr matching the source language: shortest round-trip digits
/// with a trailing `.0` for integral values.
pub fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let s = format!("{f}");
    if s.contains('.') || s.contains('e') || s.contains('E') {
        s
    } else {
        format!("{s}.0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(r: Option<Result<Value>>) -> Value {
        r.unwrap().unwrap()
    }

    #[test]
    fn tower_coercion() {
        assert_eq!(ok(add(&Value::Int(1), &Value::Int(2))), Value::Int(3));
        assert_eq!(
            ok(add(&Value::Int(1), &Value::Float(0.5))),
            Value::Float(1.5)
        );
        assert_eq!(ok(add(&Value::Bool(true), &Value::Int(2))), Value::Int(3));
        assert_eq!(
            ok(mul(&Value::Bool(true), &Value::Bool(true))),
            Value::Int(1)
        );
        assert!(add(&Value::Int(1), &Value::from("x")).is_none());
    }

    #[test]
    fn division_always_float() {
        assert_eq!(ok(truediv(&Value::Int(1), &Value::Int(2))), Value::Float(0.5));
        assert_eq!(ok(truediv(&Value::Int(4), &Value::Int(2))), Value::Float(2.0));
    }

    #[test]
    fn zero_division_errors() {
        let err = truediv(&Value::Int(1), &Value::Int(0)).unwrap().unwrap_err();
        let exc = &err;
        assert_eq!(exc.class(), ExcType::ZeroDivisionError);
        assert_eq!(exc.message(), "division by zero");

        let err = modulo(&Value::Int(1), &Value::Int(0)).unwrap().unwrap_err();
        assert_eq!(err.message(), "integer modulo by zero");
    }

    #[test]
    fn floor_semantics() {
        assert_eq!(ok(floordiv(&Value::Int(7), &Value::Int(2))), Value::Int(3));
        assert_eq!(ok(floordiv(&Value::Int(-7), &Value::Int(2))), Value::Int(-4));
        assert_eq!(ok(floordiv(&Value::Int(7), &Value::Int(-2))), Value::Int(-4));
        assert_eq!(ok(modulo(&Value::Int(-7), &Value::Int(3))), Value::Int(2));
        assert_eq!(ok(modulo(&Value::Int(7), &Value::Int(-3))), Value::Int(-2));
        assert_eq!(ok(modulo(&Value::Int(-7), &Value::Int(-3))), Value::Int(-1));
    }

    #[test]
    fn overflow_is_an_error() {
        let err = add(&Value::Int(i64::MAX), &Value::Int(1))
            .unwrap()
            .unwrap_err();
        assert_eq!(err.class(), ExcType::OverflowError);

        let err = pow(&Value::Int(10), &Value::Int(100)).unwrap().unwrap_err();
        assert_eq!(err.class(), ExcType::OverflowError);
    }

    #[test]
    fn pow_semantics() {
        assert_eq!(ok(pow(&Value::Int(2), &Value::Int(10))), Value::Int(1024));
        assert_eq!(
            ok(pow(&Value::Int(2), &Value::Int(-1))),
            Value::Float(0.5)
        );
        assert_eq!(pow_mod(2, 10, 100).unwrap(), Value::Int(24));
        assert_eq!(pow_mod(2, 10, -100).unwrap(), Value::Int(-76));
    }

    #[test]
    fn shifts() {
        assert_eq!(shl(1, 4).unwrap(), Value::Int(16));
        assert_eq!(shr(-8, 1).unwrap(), Value::Int(-4));
        let err = shl(1, -1).unwrap_err();
        assert_eq!(err.message(), "negative shift count");
        let err = shl(i64::MAX, 1).unwrap_err();
        assert_eq!(err.class(), ExcType::OverflowError);
    }

    #[test]
    fn float_repr_forms() {
        assert_eq!(float_repr(1.0), "1.0");
        assert_eq!(float_repr(2.5), "2.5");
        assert_eq!(float_repr(-0.5), "-0.5");
        assert_eq!(float_repr(f64::NAN), "nan");
        assert_eq!(float_repr(f64::INFINITY), "inf");
        assert_eq!(float_repr(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn divmod_pairs() {
        let (q, r) = divmod(&Value::Int(-7), &Value::Int(3)).unwrap().unwrap();
        assert_eq!((q, r), (Value::Int(-3), Value::Int(2)));
    }
}

//! Operator semantics.
//!
//! Numbers are `f64` throughout. Integer behaviour (floored division, bitwise
//! operators, shifts) applies when the operands are integral.

use golite_ast::{BinaryOperator, UnaryOperator};

use crate::ast_map::AstMap;
use crate::error::RuntimeError;
use crate::value::{is_integral, Value};

fn no_value() -> RuntimeError {
    RuntimeError::invalid("f() (no value) used as value")
}

fn not_defined(op: &str, v: &Value) -> RuntimeError {
    RuntimeError::invalid(format!("invalid operation: operator {} not defined on {}", op, v.type_name()))
}

/// Require a usable value (anything but the result of a call without one).
pub fn require_value(v: &Value) -> Result<(), RuntimeError> {
    match v {
        Value::Nil => Err(no_value()),
        _ => Ok(()),
    }
}

pub fn unary(op: UnaryOperator, v: &Value) -> Result<Value, RuntimeError> {
    require_value(v)?;
    match (op, v) {
        (UnaryOperator::Plus, Value::Number(n)) => Ok(Value::Number(*n)),
        (UnaryOperator::Minus, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOperator::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOperator::Complement, Value::Number(n)) if is_integral(*n) => {
            Ok(Value::Number(!(*n as i64) as f64))
        }
        (UnaryOperator::Receive, _) => {
            Err(RuntimeError::Internal("receive is not a pure operator".to_string()))
        }
        _ => Err(not_defined(op.symbol(), v)),
    }
}

/// Apply a non-logical binary operator. `&&` and `||` short-circuit in the
/// evaluator and never reach here.
pub fn binary(op: BinaryOperator, l: &Value, r: &Value, ast: &AstMap) -> Result<Value, RuntimeError> {
    require_value(l)?;
    require_value(r)?;
    if op.is_comparison() {
        return compare(op, l, r, ast).map(Value::Bool);
    }
    let (a, b) = match (l, r) {
        (Value::Number(a), Value::Number(b)) => (*a, *b),
        (Value::Number(_), _) => return Err(mismatched(op, l, r)),
        _ => return Err(not_defined(op.symbol(), l)),
    };
    let n = match op {
        BinaryOperator::Add => a + b,
        BinaryOperator::Sub => a - b,
        BinaryOperator::Mul => a * b,
        BinaryOperator::Div => {
            if is_integral(a) && is_integral(b) {
                if b == 0.0 {
                    return Err(RuntimeError::invalid("panic: runtime error: integer divide by zero"));
                }
                (a / b).floor()
            } else {
                a / b
            }
        }
        BinaryOperator::Rem => {
            let (x, y) = integers(op, l, r)?;
            if y == 0 {
                return Err(RuntimeError::invalid("panic: runtime error: integer divide by zero"));
            }
            x.wrapping_rem(y) as f64
        }
        BinaryOperator::BitAnd => bitwise(op, l, r, |x, y| x & y)?,
        BinaryOperator::BitOr => bitwise(op, l, r, |x, y| x | y)?,
        BinaryOperator::BitXor => bitwise(op, l, r, |x, y| x ^ y)?,
        BinaryOperator::BitClear => bitwise(op, l, r, |x, y| x & !y)?,
        BinaryOperator::Shl | BinaryOperator::Shr => shift(op, l, r)?,
        BinaryOperator::LogicalAnd | BinaryOperator::LogicalOr => {
            return Err(RuntimeError::Internal("logical operators short-circuit".to_string()));
        }
        _ => return Err(not_defined(op.symbol(), l)),
    };
    Ok(Value::Number(n))
}

fn mismatched(op: BinaryOperator, l: &Value, r: &Value) -> RuntimeError {
    RuntimeError::invalid(format!(
        "invalid operation: operator {} on mismatched types {} and {}",
        op.symbol(),
        l.type_name(),
        r.type_name()
    ))
}

fn integers(op: BinaryOperator, l: &Value, r: &Value) -> Result<(i64, i64), RuntimeError> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) if is_integral(*a) && is_integral(*b) => {
            Ok((*a as i64, *b as i64))
        }
        (Value::Number(a), _) if !is_integral(*a) => Err(not_defined(op.symbol(), l)),
        _ => Err(not_defined(op.symbol(), r)),
    }
}

fn bitwise(
    op: BinaryOperator,
    l: &Value,
    r: &Value,
    f: impl Fn(i64, i64) -> i64,
) -> Result<f64, RuntimeError> {
    let (x, y) = integers(op, l, r)?;
    Ok(f(x, y) as f64)
}

fn shift(op: BinaryOperator, l: &Value, r: &Value) -> Result<f64, RuntimeError> {
    let (x, count) = integers(op, l, r)?;
    if count < 0 {
        return Err(RuntimeError::invalid(format!("invalid operation: negative shift count {}", count)));
    }
    let out = match op {
        BinaryOperator::Shl if count >= 64 => 0,
        BinaryOperator::Shl => x << count,
        _ if count >= 64 => {
            if x < 0 { -1 } else { 0 }
        }
        _ => x >> count,
    };
    Ok(out as f64)
}

fn compare(op: BinaryOperator, l: &Value, r: &Value, ast: &AstMap) -> Result<bool, RuntimeError> {
    let ordering = match (l, r) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::Bool(a), Value::Bool(b)) => {
            return match op {
                BinaryOperator::Eq => Ok(a == b),
                BinaryOperator::Ne => Ok(a != b),
                _ => Err(not_defined(op.symbol(), l)),
            };
        }
        (Value::Node(a), Value::Node(b)) => match (ast.string_literal(*a), ast.string_literal(*b)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => return Err(not_defined(op.symbol(), l)),
        },
        (Value::Channel(_) | Value::Mutex(_) | Value::WaitGroup(_), _)
        | (Value::Closure { .. } | Value::Builtin(_) | Value::Method { .. }, _) => {
            return Err(RuntimeError::invalid(format!(
                "invalid operation: {} values are not comparable",
                l.type_name()
            )));
        }
        _ => return Err(mismatched(op, l, r)),
    };
    // NaN compares unequal to everything.
    let Some(ord) = ordering else {
        return Ok(op == BinaryOperator::Ne);
    };
    Ok(match op {
        BinaryOperator::Eq => ord.is_eq(),
        BinaryOperator::Ne => ord.is_ne(),
        BinaryOperator::Lt => ord.is_lt(),
        BinaryOperator::Le => ord.is_le(),
        BinaryOperator::Gt => ord.is_gt(),
        _ => ord.is_ge(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Addr;
    use golite_ast::AstBuilder;
    use pretty_assertions::assert_eq;

    fn empty_map() -> AstMap {
        let mut b = AstBuilder::new();
        AstMap::new(b.empty()).unwrap()
    }

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    fn eval(op: BinaryOperator, a: f64, b: f64) -> Result<Value, RuntimeError> {
        binary(op, &num(a), &num(b), &empty_map())
    }

    #[test]
    fn test_integer_division_floors() {
        assert_eq!(eval(BinaryOperator::Div, 7.0, 2.0).unwrap(), num(3.0));
        assert_eq!(eval(BinaryOperator::Div, -7.0, 2.0).unwrap(), num(-4.0));
        assert_eq!(eval(BinaryOperator::Div, 7.5, 2.0).unwrap(), num(3.75));
        assert!(eval(BinaryOperator::Div, 1.0, 0.0).unwrap_err().to_string().contains("divide by zero"));
        assert_eq!(eval(BinaryOperator::Rem, -7.0, 2.0).unwrap(), num(-1.0));
    }

    #[test]
    fn test_bitwise_and_shifts() {
        assert_eq!(eval(BinaryOperator::BitClear, 7.0, 2.0).unwrap(), num(5.0));
        assert_eq!(eval(BinaryOperator::Shl, 1.0, 10.0).unwrap(), num(1024.0));
        assert_eq!(eval(BinaryOperator::Shr, -8.0, 1.0).unwrap(), num(-4.0));
        let err = eval(BinaryOperator::Shl, 1.0, -1.0).unwrap_err();
        assert!(err.to_string().contains("negative shift count"));
        assert!(eval(BinaryOperator::BitOr, 1.5, 1.0).is_err());
        assert_eq!(unary(UnaryOperator::Complement, &num(0.0)).unwrap(), num(-1.0));
    }

    #[test]
    fn test_comparisons() {
        let map = empty_map();
        assert_eq!(eval(BinaryOperator::Le, 2.0, 2.0).unwrap(), Value::Bool(true));
        assert_eq!(eval(BinaryOperator::Ne, f64::NAN, f64::NAN).unwrap(), Value::Bool(true));
        let eq = binary(BinaryOperator::Eq, &Value::Bool(true), &Value::Bool(true), &map);
        assert_eq!(eq.unwrap(), Value::Bool(true));
        assert!(binary(BinaryOperator::Lt, &Value::Bool(true), &Value::Bool(false), &map).is_err());
        let ch = Value::Channel(Addr(8));
        let err = binary(BinaryOperator::Eq, &ch, &ch, &map).unwrap_err();
        assert!(err.to_string().contains("not comparable"));
    }

    #[test]
    fn test_string_literals_compare() {
        let mut b = AstBuilder::new();
        let a = b.string("apple");
        let z = b.string("zebra");
        let (ia, iz) = (a.id, z.id);
        let map = AstMap::new(b.block(vec![a, z])).unwrap();
        let lt = binary(BinaryOperator::Lt, &Value::Node(ia), &Value::Node(iz), &map);
        assert_eq!(lt.unwrap(), Value::Bool(true));
        assert!(binary(BinaryOperator::Add, &Value::Node(ia), &Value::Node(iz), &map).is_err());
    }

    #[test]
    fn test_type_errors() {
        let map = empty_map();
        let err = binary(BinaryOperator::Add, &num(1.0), &Value::Bool(true), &map).unwrap_err();
        assert!(err.to_string().contains("mismatched types int and bool"));
        let err = binary(BinaryOperator::Add, &Value::Nil, &num(1.0), &map).unwrap_err();
        assert_eq!(err.to_string(), "f() (no value) used as value");
        assert!(unary(UnaryOperator::Not, &num(1.0)).is_err());
        assert_eq!(unary(UnaryOperator::Minus, &num(2.0)).unwrap(), num(-2.0));
    }
}

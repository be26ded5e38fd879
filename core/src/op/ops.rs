use core::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::val::{MAX_NESTING, Value};
use crate::vm::VmError;

/// Binary operator carried by the arithmetic and comparison instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExprOp {
    Mult,
    Div,
    Rem,
    Sub,
    Add,
    Equal,
    NEqual,
    Greater,
    GEqual,
    Smaller,
    SEqual,
    Match,
    NoMatch,
    Is,
    IsNot,
}

impl ExprOp {
    pub fn is_arith(self) -> bool {
        matches!(self, ExprOp::Mult | ExprOp::Div | ExprOp::Rem | ExprOp::Sub | ExprOp::Add)
    }

    fn is_identity(self) -> bool {
        matches!(self, ExprOp::Is | ExprOp::IsNot)
    }

    fn is_equality(self) -> bool {
        matches!(self, ExprOp::Equal | ExprOp::NEqual)
    }

    fn is_match(self) -> bool {
        matches!(self, ExprOp::Match | ExprOp::NoMatch)
    }

    /// `is`/`isnot` on scalars behave like `==`/`!=`.
    fn scalar(self) -> ExprOp {
        match self {
            ExprOp::Is => ExprOp::Equal,
            ExprOp::IsNot => ExprOp::NEqual,
            other => other,
        }
    }

    fn ordering_holds(self, ord: core::cmp::Ordering) -> bool {
        use core::cmp::Ordering::*;
        match self {
            ExprOp::Equal | ExprOp::Is => ord == Equal,
            ExprOp::NEqual | ExprOp::IsNot => ord != Equal,
            ExprOp::Greater => ord == Greater,
            ExprOp::GEqual => ord != Less,
            ExprOp::Smaller => ord == Less,
            ExprOp::SEqual => ord != Greater,
            _ => false,
        }
    }
}

impl fmt::Display for ExprOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExprOp::Mult => "*",
            ExprOp::Div => "/",
            ExprOp::Rem => "%",
            ExprOp::Sub => "-",
            ExprOp::Add => "+",
            ExprOp::Equal => "==",
            ExprOp::NEqual => "!=",
            ExprOp::Greater => ">",
            ExprOp::GEqual => ">=",
            ExprOp::Smaller => "<",
            ExprOp::SEqual => "<=",
            ExprOp::Match => "=~",
            ExprOp::NoMatch => "!~",
            ExprOp::Is => "is",
            ExprOp::IsNot => "isnot",
        })
    }
}

/// Integer division without traps: division by zero yields a sentinel
/// (`i64::MAX`, `-i64::MAX`, or `i64::MIN` for `0 / 0`) and
/// `i64::MIN / -1` saturates to `i64::MAX`.
pub fn num_divide(n1: i64, n2: i64) -> i64 {
    if n2 == 0 {
        if n1 == 0 {
            i64::MIN
        } else if n1 < 0 {
            -i64::MAX
        } else {
            i64::MAX
        }
    } else if n1 == i64::MIN && n2 == -1 {
        i64::MAX
    } else {
        n1 / n2
    }
}

/// Integer remainder; zero divisor yields 0.
pub fn num_modulus(n1: i64, n2: i64) -> i64 {
    if n2 == 0 { 0 } else { n1.wrapping_rem(n2) }
}

pub(crate) fn arith_nr(op: ExprOp, n1: i64, n2: i64) -> Result<i64, VmError> {
    Ok(match op {
        ExprOp::Mult => n1.wrapping_mul(n2),
        ExprOp::Div => num_divide(n1, n2),
        ExprOp::Rem => num_modulus(n1, n2),
        ExprOp::Sub => n1.wrapping_sub(n2),
        ExprOp::Add => n1.wrapping_add(n2),
        other => return Err(VmError::Internal(format!("'{other}' is not an arithmetic operator"))),
    })
}

pub(crate) fn arith_float(op: ExprOp, f1: f64, f2: f64) -> Result<f64, VmError> {
    Ok(match op {
        ExprOp::Mult => f1 * f2,
        ExprOp::Div => f1 / f2,
        ExprOp::Sub => f1 - f2,
        ExprOp::Add => f1 + f2,
        ExprOp::Rem => return Err(VmError::FloatModulus),
        other => return Err(VmError::Internal(format!("'{other}' is not an arithmetic operator"))),
    })
}

pub(crate) fn compare_nr(op: ExprOp, n1: i64, n2: i64) -> Result<bool, VmError> {
    if op.is_arith() || op.is_match() {
        return Err(VmError::Internal(format!("invalid number comparison '{op}'")));
    }
    Ok(op.ordering_holds(n1.cmp(&n2)))
}

pub(crate) fn compare_float(op: ExprOp, f1: f64, f2: f64) -> Result<bool, VmError> {
    if op.is_arith() || op.is_match() {
        return Err(VmError::Internal(format!("invalid float comparison '{op}'")));
    }
    Ok(match f1.partial_cmp(&f2) {
        Some(ord) => op.ordering_holds(ord),
        None => matches!(op, ExprOp::NEqual | ExprOp::IsNot),
    })
}

/// `==`/`!=` on two booleans or two specials.
pub(crate) fn compare_eq_only<T: PartialEq>(op: ExprOp, a: T, b: T) -> Result<bool, VmError> {
    match op {
        ExprOp::Equal => Ok(a == b),
        ExprOp::NEqual => Ok(a != b),
        other => Err(VmError::Internal(format!("invalid bool or special comparison '{other}'"))),
    }
}

/// Numeric view for mixed arithmetic; floats stay floats.
enum Num {
    Int(i64),
    Float(f64),
}

fn num_of(v: &Value) -> Result<Num, VmError> {
    match v {
        Value::Float(f) => Ok(Num::Float(*f)),
        other => other.get_number_chk().map(Num::Int),
    }
}

fn float_of(v: &Value) -> Result<f64, VmError> {
    match num_of(v)? {
        Num::Float(f) => Ok(f),
        Num::Int(n) => Ok(n as f64),
    }
}

/// Concatenate two lists into a fresh list; null lists count as empty.
pub(crate) fn add_list(l: &Value, r: &Value) -> Result<Value, VmError> {
    let (Value::List(l), Value::List(r)) = (l, r) else {
        return Err(VmError::ListRequired);
    };
    let mut items = Vec::new();
    if let Some(l) = l {
        items.extend(l.borrow().iter().cloned());
    }
    if let Some(r) = r {
        items.extend(r.borrow().iter().cloned());
    }
    Ok(Value::list(items))
}

pub(crate) fn add_blob(l: &Value, r: &Value) -> Result<Value, VmError> {
    let (Value::Blob(l), Value::Blob(r)) = (l, r) else {
        return Err(VmError::Internal("blob concatenation on non-blob operands".into()));
    };
    let mut bytes = Vec::new();
    if let Some(l) = l {
        bytes.extend_from_slice(&l.borrow());
    }
    if let Some(r) = r {
        bytes.extend_from_slice(&r.borrow());
    }
    Ok(Value::blob(bytes))
}

/// Arithmetic on operands whose types were unknown at compile time.
pub(crate) fn arith_any(op: ExprOp, l: &Value, r: &Value) -> Result<Value, VmError> {
    if op == ExprOp::Add {
        match (l, r) {
            (Value::List(_), Value::List(_)) => return add_list(l, r),
            (Value::Blob(_), Value::Blob(_)) => return add_blob(l, r),
            _ => {}
        }
    }
    match (num_of(l)?, num_of(r)?) {
        (Num::Int(n1), Num::Int(n2)) => arith_nr(op, n1, n2).map(Value::Number),
        (Num::Float(f1), Num::Float(f2)) => arith_float(op, f1, f2).map(Value::Float),
        (Num::Int(n1), Num::Float(f2)) => arith_float(op, n1 as f64, f2).map(Value::Float),
        (Num::Float(f1), Num::Int(n2)) => arith_float(op, f1, n2 as f64).map(Value::Float),
    }
}

fn str_eq(a: &str, b: &str, ic: bool) -> bool {
    if ic { a.to_lowercase() == b.to_lowercase() } else { a == b }
}

/// Structural equality used by `==` on containers.
pub fn values_equal(l: &Value, r: &Value, ic: bool) -> bool {
    values_equal_at(l, r, ic, 0)
}

fn values_equal_at(l: &Value, r: &Value, ic: bool, depth: usize) -> bool {
    if depth > MAX_NESTING {
        return true;
    }
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Special(a), Value::Special(b)) => a == b,
        (Value::String(a), Value::String(b)) => {
            str_eq(a.as_deref().unwrap_or(""), b.as_deref().unwrap_or(""), ic)
        }
        (Value::List(a), Value::List(b)) => {
            let (a, b) = (a.as_ref(), b.as_ref());
            match (a, b) {
                (Some(a), Some(b)) if Rc::ptr_eq(a, b) => true,
                (Some(a), Some(b)) => {
                    let (a, b) = (a.borrow(), b.borrow());
                    a.len() == b.len()
                        && a.iter().zip(b.iter()).all(|(x, y)| values_equal_at(x, y, ic, depth + 1))
                }
                (a, b) => a.map_or(0, |l| l.borrow().len()) == b.map_or(0, |l| l.borrow().len()),
            }
        }
        (Value::Dict(a), Value::Dict(b)) => match (a.as_ref(), b.as_ref()) {
            (Some(a), Some(b)) if Rc::ptr_eq(a, b) => true,
            (Some(a), Some(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.get(k)
                            .is_some_and(|w| values_equal_at(v, w, ic, depth + 1))
                    })
            }
            (a, b) => a.map_or(0, |d| d.borrow().len()) == b.map_or(0, |d| d.borrow().len()),
        },
        (Value::Blob(a), Value::Blob(b)) => {
            let a = a.as_ref().map(|b| b.borrow().clone()).unwrap_or_default();
            let b = b.as_ref().map(|b| b.borrow().clone()).unwrap_or_default();
            a == b
        }
        (Value::Func(a), Value::Func(b)) => a == b,
        (Value::Partial(Some(a)), Value::Partial(Some(b))) => {
            Rc::ptr_eq(a, b)
                || (a.name() == b.name()
                    && a.args().len() == b.args().len()
                    && a.args()
                        .iter()
                        .zip(b.args())
                        .all(|(x, y)| values_equal_at(x, y, ic, depth + 1)))
        }
        (Value::Partial(None), Value::Partial(None)) => true,
        (Value::Func(Some(name)), Value::Partial(Some(pt))) | (Value::Partial(Some(pt)), Value::Func(Some(name))) => {
            pt.args().is_empty() && pt.name() == name
        }
        (Value::Job(a), Value::Job(b)) | (Value::Channel(a), Value::Channel(b)) => match (a, b) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        },
        _ => false,
    }
}

fn same_handle(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::List(Some(a)), Value::List(Some(b))) => Rc::ptr_eq(a, b),
        (Value::Dict(Some(a)), Value::Dict(Some(b))) => Rc::ptr_eq(a, b),
        (Value::Blob(Some(a)), Value::Blob(Some(b))) => Rc::ptr_eq(a, b),
        (Value::Partial(Some(a)), Value::Partial(Some(b))) => Rc::ptr_eq(a, b),
        (Value::List(None), Value::List(None))
        | (Value::Dict(None), Value::Dict(None))
        | (Value::Blob(None), Value::Blob(None))
        | (Value::Partial(None), Value::Partial(None)) => true,
        (Value::Func(a), Value::Func(b)) => a == b,
        _ => false,
    }
}

fn container_compare(
    op: ExprOp,
    l: &Value,
    r: &Value,
    ic: bool,
    mismatch: &'static str,
    invalid: &'static str,
) -> Result<bool, VmError> {
    if op.is_identity() {
        let same = same_handle(l, r);
        return Ok(if op == ExprOp::IsNot { !same } else { same });
    }
    if l.var_type() != r.var_type() {
        return Err(VmError::InvalidCompare(mismatch));
    }
    if !op.is_equality() {
        return Err(VmError::InvalidCompare(invalid));
    }
    let eq = values_equal(l, r, ic);
    Ok(if op == ExprOp::NEqual { !eq } else { eq })
}

/// Generic comparison for operands typed string, dict, func or any.
/// `matcher(text, pattern, ic)` implements `=~`.
pub fn typval_compare(
    l: &Value,
    r: &Value,
    op: ExprOp,
    ic: bool,
    matcher: &mut dyn FnMut(&str, &str, bool) -> Result<bool, VmError>,
) -> Result<bool, VmError> {
    let is_func = |v: &Value| matches!(v, Value::Func(_) | Value::Partial(_));
    if op.is_identity() && l.var_type() != r.var_type() && !(is_func(l) && is_func(r)) {
        return Ok(op == ExprOp::IsNot);
    }
    if matches!(l, Value::Blob(_)) || matches!(r, Value::Blob(_)) {
        return container_compare(
            op,
            l,
            r,
            ic,
            "E977: Can only compare Blob with Blob",
            "E978: Invalid operation for Blob",
        );
    }
    if matches!(l, Value::List(_)) || matches!(r, Value::List(_)) {
        return container_compare(
            op,
            l,
            r,
            ic,
            "E691: Can only compare List with List",
            "E692: Invalid operation for List",
        );
    }
    if matches!(l, Value::Dict(_)) || matches!(r, Value::Dict(_)) {
        return container_compare(
            op,
            l,
            r,
            ic,
            "E735: Can only compare Dictionary with Dictionary",
            "E736: Invalid operation for Dictionary",
        );
    }
    if is_func(l) || is_func(r) {
        if !op.is_identity() && !op.is_equality() {
            return Err(VmError::InvalidCompare("E694: Invalid operation for Funcrefs"));
        }
        let eq = if op.is_identity() && matches!((l, r), (Value::Partial(_), Value::Partial(_))) {
            same_handle(l, r)
        } else {
            values_equal(l, r, ic)
        };
        return Ok(if matches!(op, ExprOp::NEqual | ExprOp::IsNot) { !eq } else { eq });
    }
    if !op.is_match() && (matches!(l, Value::Float(_)) || matches!(r, Value::Float(_))) {
        return compare_float(op.scalar(), float_of(l)?, float_of(r)?);
    }
    let is_numeric = |v: &Value| matches!(v, Value::Number(_) | Value::Bool(_) | Value::Special(_));
    if !op.is_match() && (is_numeric(l) || is_numeric(r)) {
        return compare_nr(op.scalar(), l.get_number_chk()?, r.get_number_chk()?);
    }
    let s1 = l.echo_string();
    let s2 = r.echo_string();
    match op {
        ExprOp::Match => matcher(&s1, &s2, ic),
        ExprOp::NoMatch => matcher(&s1, &s2, ic).map(|m| !m),
        other => {
            let ord = if ic {
                s1.to_lowercase().cmp(&s2.to_lowercase())
            } else {
                s1.cmp(&s2)
            };
            if other.is_arith() {
                return Err(VmError::Internal(format!("invalid string comparison '{other}'")));
            }
            Ok(other.scalar().ordering_holds(ord))
        }
    }
}

use std::fmt::Write as _;

use crate::vm::VmError;

use super::{DictMap, MAX_NESTING, Special, Value};

impl From<String> for Value {
    #[inline]
    fn from(s: String) -> Self {
        Value::String(Some(s))
    }
}

impl From<&str> for Value {
    #[inline]
    fn from(s: &str) -> Self {
        Value::String(Some(s.to_owned()))
    }
}

impl From<i64> for Value {
    #[inline]
    fn from(n: i64) -> Self {
        Value::Number(n)
    }
}

impl From<f64> for Value {
    #[inline]
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    #[inline]
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T> From<Vec<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Vec<T>) -> Self {
        Value::list(v.into_iter().map(Into::into).collect())
    }
}

impl From<DictMap> for Value {
    fn from(map: DictMap) -> Self {
        Value::dict(map)
    }
}

/// Parse the leading number of `s` the way string-to-number coercion does:
/// optional `-`, then hex (`0x`), binary (`0b`), octal (leading `0`) or
/// decimal digits. Parsing stops at the first invalid character; overflow
/// saturates.
pub fn str2nr(s: &str) -> i64 {
    let bytes = s.as_bytes();
    let (negative, rest) = match bytes.first() {
        Some(b'-') => (true, &bytes[1..]),
        _ => (false, bytes),
    };
    let (radix, digits) = match rest {
        [b'0', b'x' | b'X', d, ..] if d.is_ascii_hexdigit() => (16, &rest[2..]),
        [b'0', b'b' | b'B', b'0' | b'1', ..] => (2, &rest[2..]),
        [b'0', d, ..] if d.is_ascii_digit() && rest[1..].iter().take_while(|c| c.is_ascii_digit()).all(|c| *c < b'8') => {
            (8, &rest[1..])
        }
        _ => (10, rest),
    };
    let mut n: i64 = 0;
    for &c in digits {
        let Some(d) = (c as char).to_digit(radix) else { break };
        n = n.saturating_mul(radix as i64).saturating_add(d as i64);
    }
    if negative { n.saturating_neg() } else { n }
}

/// `%g`-style float text with the Vim twist of always showing a fraction:
/// `1.0`, `0.333333`, `1.0e20`.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".into();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf".into() } else { "-inf".into() };
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0.0".into() } else { "0.0".into() };
    }
    let sci = format!("{f:.5e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    if !(-4..6).contains(&exp) {
        let mut mantissa = trim_fraction(mantissa);
        if !mantissa.contains('.') {
            mantissa.push_str(".0");
        }
        return format!("{mantissa}e{exp}");
    }
    let precision = (5 - exp).max(0) as usize;
    let mut fixed = trim_fraction(&format!("{f:.precision$}"));
    if !fixed.contains('.') {
        fixed.push_str(".0");
    }
    fixed
}

fn trim_fraction(s: &str) -> String {
    if !s.contains('.') {
        return s.to_owned();
    }
    let trimmed = s.trim_end_matches('0');
    trimmed.strip_suffix('.').unwrap_or(trimmed).to_owned()
}

fn quote(s: &str, out: &mut String) {
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
}

impl Value {
    /// Numeric view used by arithmetic and `CheckNr`. Strings are parsed,
    /// booleans and specials map to 0/1, anything else is a typed error.
    pub fn get_number_chk(&self) -> Result<i64, VmError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::String(s) => Ok(s.as_deref().map_or(0, str2nr)),
            Value::Bool(b) => Ok(*b as i64),
            Value::Special(_) => Ok(0),
            Value::Float(_) => Err(VmError::used_as_number("E805", "Float")),
            Value::Func(_) | Value::Partial(_) => Err(VmError::used_as_number("E703", "Funcref")),
            Value::List(_) => Err(VmError::used_as_number("E745", "List")),
            Value::Dict(_) => Err(VmError::used_as_number("E728", "Dictionary")),
            Value::Blob(_) => Err(VmError::used_as_number("E974", "Blob")),
            Value::Job(_) => Err(VmError::used_as_number("E910", "Job")),
            Value::Channel(_) => Err(VmError::used_as_number("E913", "Channel")),
            Value::Unknown | Value::Void => Err(VmError::Internal(format!(
                "number requested from {} value",
                self.type_name()
            ))),
        }
    }

    /// Text shown by `echo`: strings unquoted, containers in literal form.
    pub fn echo_string(&self) -> String {
        let mut out = String::new();
        self.write_text(&mut out, false, 0);
        out
    }

    /// Text produced by `string()`: strings quoted, functions wrapped.
    pub fn script_string(&self) -> String {
        let mut out = String::new();
        self.write_text(&mut out, true, 0);
        out
    }

    fn write_text(&self, out: &mut String, quoted: bool, depth: usize) {
        match self {
            Value::Unknown | Value::Void => {}
            Value::Number(n) => out.push_str(itoa::Buffer::new().format(*n)),
            Value::Float(f) => out.push_str(&format_float(*f)),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Special(Special::Null) => out.push_str("null"),
            Value::Special(Special::None) => out.push_str("v:none"),
            Value::String(s) => {
                let s = s.as_deref().unwrap_or("");
                if quoted { quote(s, out) } else { out.push_str(s) }
            }
            Value::Func(name) => {
                let name = name.as_deref().unwrap_or("");
                if quoted {
                    out.push_str("function(");
                    quote(name, out);
                    out.push(')');
                } else {
                    out.push_str(name);
                }
            }
            Value::Partial(None) => out.push_str("function(NULL)"),
            Value::Partial(Some(pt)) => {
                out.push_str("function(");
                quote(pt.name(), out);
                if !pt.args().is_empty() {
                    out.push_str(", [");
                    for (i, arg) in pt.args().iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        arg.write_text(out, true, depth + 1);
                    }
                    out.push(']');
                }
                out.push(')');
            }
            Value::List(None) => out.push_str("[]"),
            Value::List(Some(l)) => {
                if depth > MAX_NESTING {
                    out.push_str("[...]");
                    return;
                }
                out.push('[');
                for (i, item) in l.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_text(out, true, depth + 1);
                }
                out.push(']');
            }
            Value::Dict(None) => out.push_str("{}"),
            Value::Dict(Some(d)) => {
                if depth > MAX_NESTING {
                    out.push_str("{...}");
                    return;
                }
                out.push('{');
                for (i, (k, v)) in d.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    quote(k, out);
                    out.push_str(": ");
                    v.write_text(out, true, depth + 1);
                }
                out.push('}');
            }
            Value::Blob(b) => {
                out.push_str("0z");
                if let Some(b) = b {
                    for (i, byte) in b.borrow().iter().enumerate() {
                        if i > 0 && i % 4 == 0 {
                            out.push('.');
                        }
                        let _ = write!(out, "{byte:02X}");
                    }
                }
            }
            Value::Job(r) => match r {
                Some(r) => out.push_str(&r.label),
                None => out.push_str("no process"),
            },
            Value::Channel(r) => match r {
                Some(r) => out.push_str(&r.label),
                None => out.push_str("channel fail"),
            },
        }
    }
}

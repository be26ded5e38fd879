use anyhow::{Result, anyhow, bail};
use regex::Regex;
use v9vm_core::val::{Special, Value};
use v9vm_core::vm::{BuiltinTable, CallContext};

use crate::{BuiltinModule, number_arg, string_arg};

/// String builtins: `string`, `type`, `toupper`, `tolower`, `split`, `trim`,
/// `strlen`, `repeat`, `str2nr`.
#[derive(Debug, Default)]
pub struct StringModule;

impl BuiltinModule for StringModule {
    fn name(&self) -> &str {
        "string"
    }

    fn register(&self, table: &mut BuiltinTable) {
        table.register("string", 1, 1, Self::string);
        table.register("type", 1, 1, Self::type_of);
        table.register("toupper", 1, 1, Self::toupper);
        table.register("tolower", 1, 1, Self::tolower);
        table.register("split", 1, 3, Self::split);
        table.register("trim", 1, 3, Self::trim);
        table.register("strlen", 1, 1, Self::strlen);
        table.register("repeat", 2, 2, Self::repeat);
        table.register("str2nr", 1, 2, Self::str2nr);
    }
}

impl StringModule {
    fn string(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        Ok(Value::string(args[0].script_string()))
    }

    /// The `v:t_*` number of the argument's type.
    fn type_of(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        let n = match &args[0] {
            Value::Number(_) => 0,
            Value::String(_) => 1,
            Value::Func(_) | Value::Partial(_) => 2,
            Value::List(_) => 3,
            Value::Dict(_) => 4,
            Value::Float(_) => 5,
            Value::Bool(_) => 6,
            Value::Special(Special::None | Special::Null) => 7,
            Value::Job(_) => 8,
            Value::Channel(_) => 9,
            Value::Blob(_) => 10,
            Value::Unknown | Value::Void => bail!("E685: Internal error: type() of an unset value"),
        };
        Ok(Value::Number(n))
    }

    fn toupper(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        Ok(Value::string(string_arg(args, 0, "toupper")?.to_uppercase()))
    }

    fn tolower(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        Ok(Value::string(string_arg(args, 0, "tolower")?.to_lowercase()))
    }

    /// `split(text [, pattern [, keepempty]])`. Without `keepempty` an empty
    /// first or last item is dropped.
    fn split(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        let text = string_arg(args, 0, "split")?;
        let pattern = match args.get(1) {
            Some(_) => string_arg(args, 1, "split")?,
            None => String::new(),
        };
        let pattern = if pattern.is_empty() { r"\s+".to_owned() } else { pattern };
        let keep_empty = args.get(2).is_some_and(Value::to_bool);
        let re = Regex::new(&pattern).map_err(|e| anyhow!("E383: Invalid search string: {pattern} ({e})"))?;

        let mut parts: Vec<&str> = re.split(&text).collect();
        if !keep_empty {
            if parts.first().is_some_and(|p| p.is_empty()) {
                parts.remove(0);
            }
            if parts.last().is_some_and(|p| p.is_empty()) {
                parts.pop();
            }
        }
        Ok(Value::list(parts.into_iter().map(Value::string).collect()))
    }

    /// `trim(text [, mask [, dir]])`: `dir` 0 trims both ends, 1 the start,
    /// 2 the end. The default mask is whitespace.
    fn trim(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        let text = string_arg(args, 0, "trim")?;
        let mask = match args.get(1) {
            Some(_) => Some(string_arg(args, 1, "trim")?),
            None => None,
        };
        let dir = match args.get(2) {
            Some(_) => number_arg(args, 2, "trim")?,
            None => 0,
        };
        if !(0..=2).contains(&dir) {
            bail!("E475: Invalid argument: {dir}");
        }
        let strip = |c: char| match &mask {
            Some(mask) => mask.contains(c),
            None => c.is_whitespace() || c == '\u{a0}',
        };
        let trimmed = match dir {
            1 => text.trim_start_matches(strip),
            2 => text.trim_end_matches(strip),
            _ => text.trim_matches(strip),
        };
        Ok(Value::string(trimmed))
    }

    /// Length in bytes.
    fn strlen(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        Ok(Value::Number(string_arg(args, 0, "strlen")?.len() as i64))
    }

    fn repeat(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        let count = number_arg(args, 1, "repeat")?.max(0) as usize;
        match &args[0] {
            Value::List(l) => {
                let items = l.as_ref().map(|l| l.borrow().clone()).unwrap_or_default();
                let mut out = Vec::with_capacity(items.len() * count);
                for _ in 0..count {
                    out.extend(items.iter().cloned());
                }
                Ok(Value::list(out))
            }
            Value::Blob(b) => {
                let bytes = b.as_ref().map(|b| b.borrow().clone()).unwrap_or_default();
                Ok(Value::blob(bytes.repeat(count)))
            }
            _ => Ok(Value::string(string_arg(args, 0, "repeat")?.repeat(count))),
        }
    }

    /// `str2nr(text [, base])` with base 2, 8, 10 or 16; a matching prefix
    /// (`0b`, `0o`/`0`, `0x`) is accepted.
    fn str2nr(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        let text = string_arg(args, 0, "str2nr")?;
        let base = match args.get(1) {
            Some(_) => number_arg(args, 1, "str2nr")?,
            None => 10,
        };
        if ![2, 8, 10, 16].contains(&base) {
            bail!("E474: Invalid argument");
        }
        Ok(Value::Number(parse_with_base(&text, base as u32)))
    }
}

fn parse_with_base(text: &str, base: u32) -> i64 {
    let s = text.trim_start();
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let lower = s.to_ascii_lowercase();
    let digits = match base {
        16 => lower.strip_prefix("0x"),
        2 => lower.strip_prefix("0b"),
        8 => lower.strip_prefix("0o"),
        _ => None,
    }
    .unwrap_or(&lower);
    let mut n: i64 = 0;
    for c in digits.chars() {
        let Some(d) = c.to_digit(base) else { break };
        n = n.saturating_mul(base as i64).saturating_add(d as i64);
    }
    if negative { n.saturating_neg() } else { n }
}

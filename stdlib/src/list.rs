use anyhow::{Result, anyhow, bail};
use v9vm_core::op::values_equal;
use v9vm_core::val::Value;
use v9vm_core::vm::{BuiltinTable, CallContext};

use crate::{BuiltinModule, number_arg, string_arg};

/// List builtins: `len`, `add`, `extend`, `insert`, `remove`, `range`,
/// `reverse`, `join`, `copy`, `deepcopy`, `index`.
#[derive(Debug, Default)]
pub struct ListModule;

impl BuiltinModule for ListModule {
    fn name(&self) -> &str {
        "list"
    }

    fn register(&self, table: &mut BuiltinTable) {
        table.register("len", 1, 1, Self::len);
        table.register("add", 2, 2, Self::add);
        table.register("extend", 2, 3, Self::extend);
        table.register("insert", 2, 3, Self::insert);
        table.register("remove", 2, 3, Self::remove);
        table.register("range", 1, 3, Self::range);
        table.register("reverse", 1, 1, Self::reverse);
        table.register("join", 1, 2, Self::join);
        table.register("copy", 1, 1, Self::copy);
        table.register("deepcopy", 1, 1, Self::deepcopy);
        table.register("index", 2, 4, Self::index);
    }
}

/// Resolve a possibly negative index; `allow_end` accepts `len` itself.
fn resolve_index(idx: i64, len: usize, allow_end: bool) -> Option<usize> {
    let idx = if idx < 0 { idx + len as i64 } else { idx };
    let limit = if allow_end { len as i64 } else { len as i64 - 1 };
    (0..=limit).contains(&idx).then_some(idx as usize)
}

impl ListModule {
    fn len(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        let n = match &args[0] {
            Value::Number(n) => n.to_string().len(),
            v => match v.len() {
                Some(n) => n,
                None => bail!("E701: Invalid type for len()"),
            },
        };
        Ok(Value::Number(n as i64))
    }

    fn add(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        match &args[0] {
            Value::List(Some(l)) => l.borrow_mut().push(args[1].clone()),
            Value::Blob(Some(b)) => {
                let byte = number_arg(args, 1, "add")?;
                b.borrow_mut().push(byte as u8);
            }
            Value::List(None) | Value::Blob(None) => bail!("E1130: Cannot add to null list"),
            _ => bail!("E897: List or Blob required"),
        }
        Ok(args[0].clone())
    }

    /// `extend(list, list [, idx])` or `extend(dict, dict [, how])`.
    fn extend(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        match (&args[0], &args[1]) {
            (Value::List(Some(dst)), Value::List(src)) => {
                let items: Vec<Value> = src.as_ref().map(|s| s.borrow().clone()).unwrap_or_default();
                let len = dst.borrow().len();
                let at = match args.get(2) {
                    Some(_) => {
                        let idx = number_arg(args, 2, "extend")?;
                        resolve_index(idx, len, true).ok_or_else(|| anyhow!("E684: list index out of range: {idx}"))?
                    }
                    None => len,
                };
                dst.borrow_mut().splice(at..at, items);
            }
            (Value::Dict(Some(_)), Value::Dict(_)) => {
                let how = match args.get(2) {
                    Some(_) => string_arg(args, 2, "extend")?,
                    None => "force".to_owned(),
                };
                crate::dict::extend_dict(&args[0], &args[1], &how)?;
            }
            (Value::List(None), _) | (Value::Dict(None), _) => bail!("E1131: Cannot add to null container"),
            _ => bail!("E712: Argument of extend() must be a List or Dictionary"),
        }
        Ok(args[0].clone())
    }

    fn insert(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        let Value::List(Some(list)) = &args[0] else {
            bail!("E899: Argument of insert() must be a List or Blob");
        };
        let len = list.borrow().len();
        let idx = match args.get(2) {
            Some(_) => number_arg(args, 2, "insert")?,
            None => 0,
        };
        let at = resolve_index(idx, len, true).ok_or_else(|| anyhow!("E684: list index out of range: {idx}"))?;
        list.borrow_mut().insert(at, args[1].clone());
        Ok(args[0].clone())
    }

    /// `remove(list, idx [, end])` returns the removed item, or a list of
    /// them when `end` is given; `remove(dict, key)` returns the value.
    fn remove(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        match &args[0] {
            Value::List(Some(list)) => {
                let len = list.borrow().len();
                let idx = number_arg(args, 1, "remove")?;
                let start = resolve_index(idx, len, false).ok_or_else(|| anyhow!("E684: list index out of range: {idx}"))?;
                match args.get(2) {
                    None => Ok(list.borrow_mut().remove(start)),
                    Some(_) => {
                        let end_idx = number_arg(args, 2, "remove")?;
                        let end = resolve_index(end_idx, len, false)
                            .ok_or_else(|| anyhow!("E684: list index out of range: {end_idx}"))?;
                        if end < start {
                            bail!("E16: Invalid range");
                        }
                        let removed: Vec<Value> = list.borrow_mut().drain(start..=end).collect();
                        Ok(Value::list(removed))
                    }
                }
            }
            Value::Dict(Some(dict)) => {
                let key = string_arg(args, 1, "remove")?;
                let removed = dict.borrow_mut().shift_remove(&key);
                removed.ok_or_else(|| anyhow!("E716: Key not present in Dictionary: \"{key}\""))
            }
            _ => bail!("E896: Argument of remove() must be a List, Dictionary or Blob"),
        }
    }

    fn range(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        let (start, end) = match args.len() {
            1 => (0, number_arg(args, 0, "range")?.saturating_sub(1)),
            _ => (number_arg(args, 0, "range")?, number_arg(args, 1, "range")?),
        };
        let stride = if args.len() > 2 { number_arg(args, 2, "range")? } else { 1 };
        if stride == 0 {
            bail!("E726: Stride is zero");
        }
        if (stride > 0 && end < start.saturating_sub(1)) || (stride < 0 && end > start.saturating_add(1)) {
            bail!("E727: Start past end");
        }
        let mut items = Vec::new();
        let mut i = start;
        while (stride > 0 && i <= end) || (stride < 0 && i >= end) {
            items.push(Value::Number(i));
            i = match i.checked_add(stride) {
                Some(next) => next,
                None => break,
            };
        }
        Ok(Value::list(items))
    }

    fn reverse(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        match &args[0] {
            Value::List(l) => {
                if let Some(l) = l {
                    l.borrow_mut().reverse();
                }
            }
            Value::Blob(b) => {
                if let Some(b) = b {
                    b.borrow_mut().reverse();
                }
            }
            _ => bail!("E899: Argument of reverse() must be a List or Blob"),
        }
        Ok(args[0].clone())
    }

    fn join(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        let Value::List(list) = &args[0] else {
            bail!("E714: List required");
        };
        let sep = match args.get(1) {
            Some(_) => string_arg(args, 1, "join")?,
            None => " ".to_owned(),
        };
        let Some(list) = list else {
            return Ok(Value::string(""));
        };
        let parts: Vec<String> = list
            .borrow()
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone().unwrap_or_default(),
                other => other.script_string(),
            })
            .collect();
        Ok(Value::string(parts.join(&sep)))
    }

    fn copy(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        Ok(match &args[0] {
            Value::List(Some(l)) => Value::list(l.borrow().clone()),
            Value::Dict(Some(d)) => Value::dict(d.borrow().clone()),
            Value::Blob(Some(b)) => Value::blob(b.borrow().clone()),
            other => other.clone(),
        })
    }

    fn deepcopy(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        Ok(args[0].deep_copy()?)
    }

    /// `index(list, expr [, start [, ic]])`: first index whose item equals
    /// `expr`, or -1.
    fn index(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        let Value::List(list) = &args[0] else {
            bail!("E714: List required");
        };
        let Some(list) = list else {
            return Ok(Value::Number(-1));
        };
        let items = list.borrow();
        let start = match args.get(2) {
            Some(_) => {
                let idx = number_arg(args, 2, "index")?;
                match resolve_index(idx, items.len(), true) {
                    Some(at) => at,
                    None if idx < 0 => 0,
                    None => return Ok(Value::Number(-1)),
                }
            }
            None => 0,
        };
        let ic = args.get(3).is_some_and(Value::to_bool);
        let found = items
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, item)| values_equal(item, &args[1], ic))
            .map_or(-1, |(i, _)| i as i64);
        Ok(Value::Number(found))
    }
}

use anyhow::{Result, bail};
use v9vm_core::val::{DictRef, Value};
use v9vm_core::vm::{BuiltinTable, CallContext};

use crate::{BuiltinModule, number_arg, string_arg};

/// Dictionary builtins: `keys`, `values`, `items`, `has_key`, `get`.
#[derive(Debug, Default)]
pub struct DictModule;

impl BuiltinModule for DictModule {
    fn name(&self) -> &str {
        "dict"
    }

    fn register(&self, table: &mut BuiltinTable) {
        table.register("keys", 1, 1, Self::keys);
        table.register("values", 1, 1, Self::values);
        table.register("items", 1, 1, Self::items);
        table.register("has_key", 2, 2, Self::has_key);
        table.register("get", 2, 3, Self::get);
    }
}

fn dict_arg<'v>(args: &'v [Value], func: &str) -> Result<Option<&'v DictRef>> {
    match &args[0] {
        Value::Dict(d) => Ok(d.as_ref()),
        other => bail!("E1206: Dictionary required for argument 1 of {func}, got {}", other.type_name()),
    }
}

/// Merge `src` into `dst`. `how` decides what happens to existing keys:
/// "force" overwrites, "keep" keeps, "error" fails with E737.
pub(crate) fn extend_dict(dst: &Value, src: &Value, how: &str) -> Result<()> {
    let (Value::Dict(Some(dst)), Value::Dict(src)) = (dst, src) else {
        bail!("E715: Dictionary required");
    };
    if !matches!(how, "force" | "keep" | "error") {
        bail!("E475: Invalid argument: {how}");
    }
    let Some(src) = src else {
        return Ok(());
    };
    // Snapshot first: extending a dict with itself is allowed.
    let pairs: Vec<(String, Value)> = src.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    let mut dst = dst.borrow_mut();
    for (key, value) in pairs {
        if dst.contains_key(&key) {
            match how {
                "keep" => continue,
                "error" => bail!("E737: Key already exists: {key}"),
                _ => {}
            }
        }
        let old = dst.insert(key, value);
        drop(old);
    }
    Ok(())
}

impl DictModule {
    fn keys(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        let keys = dict_arg(args, "keys")?
            .map(|d| d.borrow().keys().map(|k| Value::string(k.as_str())).collect())
            .unwrap_or_default();
        Ok(Value::list(keys))
    }

    fn values(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        let values = dict_arg(args, "values")?
            .map(|d| d.borrow().values().cloned().collect())
            .unwrap_or_default();
        Ok(Value::list(values))
    }

    fn items(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        let items = dict_arg(args, "items")?
            .map(|d| {
                d.borrow()
                    .iter()
                    .map(|(k, v)| Value::list(vec![Value::string(k.as_str()), v.clone()]))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Value::list(items))
    }

    fn has_key(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        let key = string_arg(args, 1, "has_key")?;
        let found = dict_arg(args, "has_key")?.is_some_and(|d| d.borrow().contains_key(&key));
        Ok(Value::Bool(found))
    }

    /// `get(dict, key [, default])` or `get(list, idx [, default])`; the
    /// default is 0 when omitted.
    fn get(args: &[Value], _ctx: &mut CallContext) -> Result<Value> {
        let default = args.get(2).cloned().unwrap_or(Value::Number(0));
        let found = match &args[0] {
            Value::Dict(d) => {
                let key = string_arg(args, 1, "get")?;
                d.as_ref().and_then(|d| d.borrow().get(&key).cloned())
            }
            Value::List(l) => {
                let idx = number_arg(args, 1, "get")?;
                l.as_ref().and_then(|l| {
                    let items = l.borrow();
                    let at = if idx < 0 { idx + items.len() as i64 } else { idx };
                    usize::try_from(at).ok().and_then(|at| items.get(at).cloned())
                })
            }
            Value::Blob(b) => {
                let idx = number_arg(args, 1, "get")?;
                b.as_ref().and_then(|b| {
                    let bytes = b.borrow();
                    let at = if idx < 0 { idx + bytes.len() as i64 } else { idx };
                    usize::try_from(at)
                        .ok()
                        .and_then(|at| bytes.get(at).map(|byte| Value::Number(*byte as i64)))
                })
            }
            other => bail!("E896: Argument of get() must be a List, Dictionary or Blob, got {}", other.type_name()),
        };
        Ok(found.unwrap_or(default))
    }
}

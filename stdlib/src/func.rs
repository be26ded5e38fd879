use anyhow::{Result, bail};
use v9vm_core::val::{Partial, Value};
use v9vm_core::vm::{BuiltinTable, CallContext};

use crate::{BuiltinModule, string_arg};

/// Function value builtins: `call`, `function`, `funcref`, `map`, `filter`.
#[derive(Debug, Default)]
pub struct FuncModule;

impl BuiltinModule for FuncModule {
    fn name(&self) -> &str {
        "func"
    }

    fn register(&self, table: &mut BuiltinTable) {
        table.register("call", 2, 2, Self::call);
        table.register("function", 1, 2, Self::function);
        table.register("funcref", 1, 2, Self::funcref);
        table.register("map", 2, 2, Self::map);
        table.register("filter", 2, 2, Self::filter);
    }
}

fn bound_args(args: &[Value], func: &str) -> Result<Vec<Value>> {
    match args.get(1) {
        None => Ok(Vec::new()),
        Some(Value::List(l)) => Ok(l.as_ref().map(|l| l.borrow().clone()).unwrap_or_default()),
        Some(other) => bail!("E1211: List required for argument 2 of {func}, got {}", other.type_name()),
    }
}

/// Name argument of `function()`/`funcref()`; a function value passes through.
fn target_name(args: &[Value], func: &str) -> Result<String> {
    match &args[0] {
        Value::Func(Some(name)) => Ok(name.clone()),
        Value::Partial(Some(pt)) => Ok(pt.name().to_owned()),
        _ => string_arg(args, 0, func),
    }
}

impl FuncModule {
    /// `call(func, arglist)`
    fn call(args: &[Value], ctx: &mut CallContext) -> Result<Value> {
        let list = match &args[1] {
            Value::List(l) => l.as_ref().map(|l| l.borrow().clone()).unwrap_or_default(),
            _ => bail!("E714: List required"),
        };
        ctx.call(&args[0], &list)
    }

    /// `function(name [, arglist])`: resolved by name when called.
    fn function(args: &[Value], ctx: &mut CallContext) -> Result<Value> {
        let name = target_name(args, "function")?;
        if ctx.builtins().lookup(&name).is_none() && ctx.program().lookup(&name).is_none() {
            bail!("E700: Unknown function: {name}");
        }
        let bound = bound_args(args, "function")?;
        if bound.is_empty() {
            return Ok(Value::func(name));
        }
        Ok(Value::partial(Partial::new(name, None, bound)))
    }

    /// `funcref(name [, arglist])`: bound to the compiled function now, so
    /// redefining the name later does not change the target.
    fn funcref(args: &[Value], ctx: &mut CallContext) -> Result<Value> {
        let name = target_name(args, "funcref")?;
        let Some(id) = ctx.program().lookup(&name) else {
            bail!("E700: Unknown function: {name}");
        };
        let bound = bound_args(args, "funcref")?;
        Ok(Value::partial(Partial::new(name, Some(id), bound)))
    }

    /// `map(container, func)`: replace each item with `func(key, item)`, in place.
    fn map(args: &[Value], ctx: &mut CallContext) -> Result<Value> {
        match &args[0] {
            Value::List(Some(list)) => {
                let len = list.borrow().len();
                for i in 0..len {
                    let Some(item) = list.borrow().get(i).cloned() else { break };
                    let mapped = ctx.call(&args[1], &[Value::Number(i as i64), item])?;
                    if let Some(slot) = list.borrow_mut().get_mut(i) {
                        *slot = mapped;
                    }
                }
            }
            Value::Dict(Some(dict)) => {
                let keys: Vec<String> = dict.borrow().keys().cloned().collect();
                for key in keys {
                    let Some(item) = dict.borrow().get(&key).cloned() else { continue };
                    let mapped = ctx.call(&args[1], &[Value::string(key.as_str()), item])?;
                    if let Some(slot) = dict.borrow_mut().get_mut(&key) {
                        *slot = mapped;
                    }
                }
            }
            Value::List(None) | Value::Dict(None) => {}
            other => bail!("E1250: Argument of map() must be a List or Dictionary, got {}", other.type_name()),
        }
        Ok(args[0].clone())
    }

    /// `filter(container, func)`: keep the items for which `func(key, item)`
    /// is true, in place.
    fn filter(args: &[Value], ctx: &mut CallContext) -> Result<Value> {
        match &args[0] {
            Value::List(Some(list)) => {
                let items = list.borrow().clone();
                let mut kept = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    if ctx.call(&args[1], &[Value::Number(i as i64), item.clone()])?.to_bool() {
                        kept.push(item);
                    }
                }
                *list.borrow_mut() = kept;
            }
            Value::Dict(Some(dict)) => {
                let pairs: Vec<(String, Value)> =
                    dict.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                for (key, item) in pairs {
                    if !ctx.call(&args[1], &[Value::string(key.as_str()), item])?.to_bool() {
                        dict.borrow_mut().shift_remove(&key);
                    }
                }
            }
            Value::List(None) | Value::Dict(None) => {}
            other => bail!("E1250: Argument of filter() must be a List or Dictionary, got {}", other.type_name()),
        }
        Ok(args[0].clone())
    }
}

pub mod dict;
pub mod func;
pub mod json;
pub mod list;
pub mod string;

#[cfg(test)]
mod test_util;

use anyhow::{Result, bail};
use once_cell::sync::Lazy;
use v9vm_core::val::Value;
use v9vm_core::vm::BuiltinTable;

/// A group of builtins registered together.
pub trait BuiltinModule {
    fn name(&self) -> &str;
    fn register(&self, table: &mut BuiltinTable);
}

fn modules() -> [Box<dyn BuiltinModule>; 5] {
    [
        Box::new(list::ListModule),
        Box::new(dict::DictModule),
        Box::new(string::StringModule),
        Box::new(func::FuncModule),
        Box::new(json::JsonModule),
    ]
}

/// Register every builtin of the library into `table`.
pub fn register_stdlib(table: &mut BuiltinTable) {
    for module in modules() {
        tracing::trace!(target: "v9vm::stdlib", module = module.name(), "register");
        module.register(table);
    }
}

/// A table holding the whole library. Build a fresh one with
/// [`register_stdlib`] to add host-specific builtins.
pub fn stdlib_table() -> BuiltinTable {
    let mut table = BuiltinTable::new();
    register_stdlib(&mut table);
    table
}

/// Names of all library builtins, sorted.
pub static BUILTIN_NAMES: Lazy<Vec<String>> = Lazy::new(|| {
    let mut names: Vec<String> = stdlib_table().iter().map(|b| b.name.clone()).collect();
    names.sort();
    names
});

/// Number argument; strings are converted, other types are rejected.
pub(crate) fn number_arg(args: &[Value], idx: usize, func: &str) -> Result<i64> {
    match args.get(idx) {
        Some(Value::Float(_)) => bail!("E805: Using a Float as a Number"),
        Some(v) => Ok(v.get_number_chk()?),
        None => bail!("E119: Not enough arguments for function: {func}"),
    }
}

/// String argument; numbers are converted like `echo` would print them.
pub(crate) fn string_arg(args: &[Value], idx: usize, func: &str) -> Result<String> {
    match args.get(idx) {
        Some(Value::String(s)) => Ok(s.clone().unwrap_or_default()),
        Some(v @ (Value::Number(_) | Value::Float(_) | Value::Bool(_) | Value::Special(_))) => {
            Ok(v.echo_string())
        }
        Some(v) => bail!("E1174: String required for argument {} of {func}, got {}", idx + 1, v.type_name()),
        None => bail!("E119: Not enough arguments for function: {func}"),
    }
}

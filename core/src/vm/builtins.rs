use std::fmt;

use anyhow::Result;

use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::val::Value;

use super::{CallContext, VmError};

/// Signature of a builtin function.
pub type BuiltinFn = fn(args: &[Value], ctx: &mut CallContext<'_, '_>) -> Result<Value>;

#[derive(Clone)]
pub struct Builtin {
    pub name: String,
    pub min_args: usize,
    pub max_args: usize,
    pub func: BuiltinFn,
}

impl Builtin {
    pub fn check_arity(&self, argc: usize) -> Result<(), VmError> {
        if argc < self.min_args {
            return Err(VmError::NotEnoughArgs(self.name.clone()));
        }
        if argc > self.max_args {
            return Err(VmError::TooManyArgs(self.name.clone()));
        }
        Ok(())
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .finish()
    }
}

/// Builtins addressed by index from `BCall` and by name from `UCall`.
#[derive(Debug, Clone)]
pub struct BuiltinTable {
    entries: Vec<Builtin>,
    by_name: FastHashMap<String, usize>,
}

impl BuiltinTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_name: fast_hash_map_new(),
        }
    }

    /// Register `func`; re-registering a name replaces the entry in place so
    /// previously compiled indices stay valid.
    pub fn register(&mut self, name: &str, min_args: usize, max_args: usize, func: BuiltinFn) -> usize {
        let entry = Builtin {
            name: name.to_owned(),
            min_args,
            max_args,
            func,
        };
        if let Some(&idx) = self.by_name.get(name) {
            self.entries[idx] = entry;
            return idx;
        }
        self.entries.push(entry);
        let idx = self.entries.len() - 1;
        self.by_name.insert(name.to_owned(), idx);
        idx
    }

    pub fn get(&self, idx: usize) -> Option<&Builtin> {
        self.entries.get(idx)
    }

    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Builtin> {
        self.entries.iter()
    }
}

impl Default for BuiltinTable {
    fn default() -> Self {
        Self::new()
    }
}

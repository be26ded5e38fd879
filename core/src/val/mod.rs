//! Runtime value model
//!
//! Every datum the VM touches is a [`Value`]. Aggregates (lists, dicts,
//! blobs, partials, job/channel handles) are shared through `Rc`, so cloning a
//! `Value` is the refcount increment and dropping it is the decrement. Mutation
//! of a shared aggregate goes through its `RefCell`, which makes the mutation
//! visible to every holder, matching the reference semantics scripts expect.

use std::{cell::RefCell, fmt, rc::Rc};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::util::fast_map::FastBuildHasher;
use crate::vm::VmError;

mod convert;
mod partial;

pub use convert::{format_float, str2nr};
pub use partial::{FuncStack, OuterEnv, Partial, PartialRef, StackCell};

pub type ListRef = Rc<RefCell<Vec<Value>>>;
pub type DictMap = IndexMap<String, Value, FastBuildHasher>;
pub type DictRef = Rc<RefCell<DictMap>>;
pub type BlobRef = Rc<RefCell<Vec<u8>>>;
pub type ResourceRef = Rc<Resource>;

/// Deepest nesting `deep_copy` and the printers will descend into.
pub const MAX_NESTING: usize = 100;

/// Opaque host resource (job or channel) handle.
#[derive(Debug, PartialEq, Eq)]
pub struct Resource {
    pub id: u64,
    pub label: String,
}

impl Resource {
    pub fn new(id: u64, label: impl Into<String>) -> ResourceRef {
        Rc::new(Self {
            id,
            label: label.into(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Special {
    None,
    Null,
}

/// Static type tag, used by type checks and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarType {
    Unknown,
    Any,
    Void,
    Special,
    Bool,
    Number,
    Float,
    String,
    Blob,
    Func,
    Partial,
    List,
    Dict,
    Job,
    Channel,
}

impl VarType {
    pub fn name(self) -> &'static str {
        match self {
            VarType::Unknown => "unknown",
            VarType::Any => "any",
            VarType::Void => "void",
            VarType::Special => "special",
            VarType::Bool => "bool",
            VarType::Number => "number",
            VarType::Float => "float",
            VarType::String => "string",
            VarType::Blob => "blob",
            VarType::Func | VarType::Partial => "func",
            VarType::List => "list",
            VarType::Dict => "dict",
            VarType::Job => "job",
            VarType::Channel => "channel",
        }
    }

    /// Whether a value of type `actual` satisfies a check for `self`.
    /// Function names and partials are interchangeable.
    pub fn accepts(self, actual: VarType) -> bool {
        self == actual
            || self == VarType::Any
            || matches!(
                (self, actual),
                (VarType::Func, VarType::Partial) | (VarType::Partial, VarType::Func)
            )
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A tagged runtime value. `None` payloads are the null variants
/// (`null_list`, `null_string`, ...), distinct from empty ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Unknown,
    Void,
    Number(i64),
    Float(f64),
    Bool(bool),
    Special(Special),
    String(Option<String>),
    List(Option<ListRef>),
    Dict(Option<DictRef>),
    Blob(Option<BlobRef>),
    Func(Option<String>),
    Partial(Option<PartialRef>),
    Job(Option<ResourceRef>),
    Channel(Option<ResourceRef>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(Some(s.into()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Some(Rc::new(RefCell::new(items))))
    }

    pub fn dict(map: DictMap) -> Self {
        Value::Dict(Some(Rc::new(RefCell::new(map))))
    }

    pub fn blob(bytes: Vec<u8>) -> Self {
        Value::Blob(Some(Rc::new(RefCell::new(bytes))))
    }

    pub fn func(name: impl Into<String>) -> Self {
        Value::Func(Some(name.into()))
    }

    pub fn partial(partial: Partial) -> Self {
        Value::Partial(Some(Rc::new(partial)))
    }

    pub fn var_type(&self) -> VarType {
        match self {
            Value::Unknown => VarType::Unknown,
            Value::Void => VarType::Void,
            Value::Number(_) => VarType::Number,
            Value::Float(_) => VarType::Float,
            Value::Bool(_) => VarType::Bool,
            Value::Special(_) => VarType::Special,
            Value::String(_) => VarType::String,
            Value::List(_) => VarType::List,
            Value::Dict(_) => VarType::Dict,
            Value::Blob(_) => VarType::Blob,
            Value::Func(_) => VarType::Func,
            Value::Partial(_) => VarType::Partial,
            Value::Job(_) => VarType::Job,
            Value::Channel(_) => VarType::Channel,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.var_type().name()
    }

    /// Truthiness used by conditional jumps and `ToBool`.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Partial(p) => p.is_some(),
            Value::Func(s) | Value::String(s) => s.as_deref().is_some_and(|s| !s.is_empty()),
            Value::List(l) => l.as_ref().is_some_and(|l| !l.borrow().is_empty()),
            Value::Dict(d) => d.as_ref().is_some_and(|d| !d.borrow().is_empty()),
            Value::Blob(b) => b.as_ref().is_some_and(|b| !b.borrow().is_empty()),
            Value::Bool(b) => *b,
            Value::Special(_) => false,
            Value::Job(r) | Value::Channel(r) => r.is_some(),
            Value::Unknown | Value::Void => false,
        }
    }

    pub fn as_list(&self) -> Option<&ListRef> {
        match self {
            Value::List(Some(l)) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&DictRef> {
        match self {
            Value::Dict(Some(d)) => Some(d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_deref().unwrap_or("")),
            _ => None,
        }
    }

    /// Number of items for containers and strings, zero for null handles.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.as_deref().map_or(0, str::len)),
            Value::List(l) => Some(l.as_ref().map_or(0, |l| l.borrow().len())),
            Value::Dict(d) => Some(d.as_ref().map_or(0, |d| d.borrow().len())),
            Value::Blob(b) => Some(b.as_ref().map_or(0, |b| b.borrow().len())),
            _ => None,
        }
    }

    /// Recursive copy: lists, dicts and blobs get fresh handles all the way down.
    pub fn deep_copy(&self) -> Result<Value, VmError> {
        self.deep_copy_at(0)
    }

    fn deep_copy_at(&self, depth: usize) -> Result<Value, VmError> {
        if depth > MAX_NESTING {
            return Err(VmError::NestedTooDeep);
        }
        Ok(match self {
            Value::List(Some(l)) => {
                let items = l
                    .borrow()
                    .iter()
                    .map(|v| v.deep_copy_at(depth + 1))
                    .collect::<Result<Vec<_>, _>>()?;
                Value::list(items)
            }
            Value::Dict(Some(d)) => {
                let mut map = DictMap::with_capacity_and_hasher(d.borrow().len(), Default::default());
                for (k, v) in d.borrow().iter() {
                    map.insert(k.clone(), v.deep_copy_at(depth + 1)?);
                }
                Value::dict(map)
            }
            Value::Blob(Some(b)) => Value::blob(b.borrow().clone()),
            other => other.clone(),
        })
    }
}

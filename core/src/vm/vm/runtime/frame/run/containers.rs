use crate::op::{add_blob, add_list};
use crate::val::{DictMap, Value};
use crate::vm::vm::Vm;
use crate::vm::vm::frame::ExecCtx;
use crate::vm::{Op, VmError};

use super::loadstore::wrap_index;

impl Vm<'_> {
    /// Build a dict from `count` key/value pairs. The operands are off the
    /// stack before any key is checked.
    pub(super) fn new_dict(&mut self, ectx: &mut ExecCtx, count: usize) -> Result<(), VmError> {
        let operands = ectx.stack.pop_n(count * 2);
        let mut map = DictMap::with_capacity_and_hasher(count, Default::default());
        let mut iter = operands.into_iter();
        while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
            let key = match key {
                Value::String(s) => s.unwrap_or_default(),
                _ => return Err(VmError::StringRequired),
            };
            if map.contains_key(&key) {
                return Err(VmError::DuplicateKey(key));
            }
            map.insert(key, value);
        }
        ectx.stack.push(Value::dict(map));
        Ok(())
    }

    pub(super) fn concat_op(&mut self, ectx: &mut ExecCtx, op: &Op) -> Result<(), VmError> {
        let right = ectx.stack.pop();
        let left = ectx.stack.peek(-1);
        let result = match op {
            Op::AddList => add_list(&left, &right)?,
            Op::AddBlob => add_blob(&left, &right)?,
            _ => {
                let mut text = string_operand(&left);
                text.push_str(&string_operand(&right));
                Value::string(text)
            }
        };
        ectx.stack.set_top(-1, result);
        Ok(())
    }

    /// `str[idx]` by character; out of range yields a null string.
    pub(super) fn str_index(&mut self, ectx: &mut ExecCtx) -> Result<(), VmError> {
        let idx = match ectx.stack.pop() {
            Value::Number(n) => n,
            _ => return Err(VmError::NumberExpected),
        };
        let text = match ectx.stack.peek(-1) {
            Value::String(s) => s.unwrap_or_default(),
            _ => return Err(VmError::StringRequired),
        };
        let len = text.chars().count();
        let result = match wrap_index(idx, len) {
            Some(at) => Value::String(text.chars().nth(at).map(String::from)),
            None => Value::String(None),
        };
        ectx.stack.set_top(-1, result);
        Ok(())
    }

    pub(super) fn list_index(&mut self, ectx: &mut ExecCtx) -> Result<(), VmError> {
        let idx = match ectx.stack.pop() {
            Value::Number(n) => n,
            _ => return Err(VmError::NumberExpected),
        };
        let item = match ectx.stack.peek(-1) {
            Value::List(l) => {
                let len = l.as_ref().map_or(0, |l| l.borrow().len());
                let at = wrap_index(idx, len).ok_or(VmError::ListIndex(idx))?;
                l.map(|l| l.borrow()[at].clone()).unwrap_or_default()
            }
            _ => return Err(VmError::ListRequired),
        };
        ectx.stack.set_top(-1, item);
        Ok(())
    }

    /// Replace the list on top with a new list of its items from `start` on.
    pub(super) fn list_slice(&mut self, ectx: &mut ExecCtx, start: i64) -> Result<(), VmError> {
        let items = match ectx.stack.peek(-1) {
            Value::List(Some(l)) => {
                let items = l.borrow();
                let len = items.len() as i64;
                let from = if start < 0 { (start + len).max(0) } else { start.min(len) };
                items[from as usize..].to_vec()
            }
            Value::List(None) => Vec::new(),
            _ => return Err(VmError::ListRequired),
        };
        ectx.stack.set_top(-1, Value::list(items));
        Ok(())
    }

    /// Push item `index` of the list on top, keeping the list.
    pub(super) fn get_item(&mut self, ectx: &mut ExecCtx, index: usize) -> Result<(), VmError> {
        let item = match ectx.stack.peek(-1) {
            Value::List(l) => l
                .and_then(|l| l.borrow().get(index).cloned())
                .ok_or(VmError::ListIndex(index as i64))?,
            _ => return Err(VmError::ListRequired),
        };
        ectx.stack.push(item);
        Ok(())
    }

    /// Replace the dict on top with its member `key`.
    pub(super) fn member(&mut self, ectx: &mut ExecCtx, key: &str) -> Result<(), VmError> {
        let item = match ectx.stack.peek(-1) {
            Value::Dict(d) => d
                .and_then(|d| d.borrow().get(key).cloned())
                .ok_or_else(|| VmError::MissingKey(key.to_owned()))?,
            _ => return Err(VmError::DictRequired),
        };
        ectx.stack.set_top(-1, item);
        Ok(())
    }
}

fn string_operand(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_owned(),
        None => value.echo_string(),
    }
}

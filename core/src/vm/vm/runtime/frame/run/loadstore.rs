use crate::val::Value;
use crate::vm::vm::Vm;
use crate::vm::vm::frame::ExecCtx;
use crate::vm::{OptionValue, VmError};

/// Resolve a possibly negative list index against `len`.
#[inline]
pub(super) fn wrap_index(idx: i64, len: usize) -> Option<usize> {
    let idx = if idx < 0 { idx + len as i64 } else { idx };
    (0..len as i64).contains(&idx).then_some(idx as usize)
}

impl Vm<'_> {
    pub(super) fn store_option(&mut self, ectx: &mut ExecCtx, name: &str) -> Result<(), VmError> {
        let value = match ectx.stack.pop() {
            Value::String(s) => OptionValue::String(s.unwrap_or_default()),
            other => OptionValue::Number(other.get_number_chk()?),
        };
        match self.host.set_option(name, value) {
            Some(msg) => Err(VmError::Host(msg)),
            None => Ok(()),
        }
    }

    /// `list[idx] = value`; assigning one past the end appends.
    pub(super) fn store_list(&mut self, ectx: &mut ExecCtx) -> Result<(), VmError> {
        let [value, idx, list]: [Value; 3] = ectx
            .stack
            .pop_n(3)
            .try_into()
            .map_err(|_| VmError::Internal("stack underflow in list store".into()))?;
        let idx = match idx {
            Value::Number(n) => n,
            _ => return Err(VmError::NumberExpected),
        };
        let list = match list {
            Value::List(Some(l)) => l,
            Value::List(None) => return Err(VmError::ListNotSet),
            _ => return Err(VmError::ListRequired),
        };
        let mut items = list.borrow_mut();
        let len = items.len();
        if idx == len as i64 {
            items.push(value);
            return Ok(());
        }
        let at = wrap_index(idx, len).ok_or(VmError::ListIndex(idx))?;
        let old = std::mem::replace(&mut items[at], value);
        drop(items);
        drop(old);
        Ok(())
    }

    pub(super) fn store_dict(&mut self, ectx: &mut ExecCtx) -> Result<(), VmError> {
        let [value, key, dict]: [Value; 3] = ectx
            .stack
            .pop_n(3)
            .try_into()
            .map_err(|_| VmError::Internal("stack underflow in dict store".into()))?;
        let key = match key {
            Value::String(s) => s.unwrap_or_default(),
            _ => return Err(VmError::StringRequired),
        };
        let dict = match dict {
            Value::Dict(Some(d)) => d,
            Value::Dict(None) => return Err(VmError::DictNotSet),
            _ => return Err(VmError::DictRequired),
        };
        let old = dict.borrow_mut().insert(key, value);
        drop(old);
        Ok(())
    }
}

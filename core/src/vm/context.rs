use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::val::{OuterEnv, PartialRef, Value};

use super::{BuiltinTable, Completion, FunctionId, Host, Program, Vm, VmError};

/// Tunables of a VM instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmOptions {
    /// Instructions between two host breakchecks.
    pub breakcheck_interval: u32,
    /// Initial capacity of the value stack of each invocation.
    pub initial_stack_capacity: usize,
    /// Emit a `trace` event per executed instruction.
    pub trace_instructions: bool,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            breakcheck_interval: 100,
            initial_stack_capacity: 500,
            trace_instructions: false,
        }
    }
}

/// What a builtin sees of the invocation that called it.
///
/// Through it a builtin can reach the host and call back into compiled code;
/// such nested invocations get their own stack but still see the caller's
/// frame as closure context.
pub struct CallContext<'v, 'a> {
    vm: &'v mut Vm<'a>,
    caller: Option<OuterEnv>,
}

impl<'v, 'a> CallContext<'v, 'a> {
    pub(crate) fn new(vm: &'v mut Vm<'a>, caller: Option<OuterEnv>) -> Self {
        Self { vm, caller }
    }

    pub fn host(&mut self) -> &mut (dyn Host + 'a) {
        self.vm.host()
    }

    pub fn program(&self) -> &'a Program {
        self.vm.program()
    }

    pub fn builtins(&self) -> &'a BuiltinTable {
        self.vm.builtins()
    }

    /// Report an error message through the normal error path.
    pub fn emsg(&mut self, err: &VmError) {
        self.vm.emsg(err);
    }

    /// Call a function value (name or partial) with `args`.
    pub fn call(&mut self, func: &Value, args: &[Value]) -> Result<Value> {
        match func {
            Value::Func(Some(name)) => self.call_by_name(name, args.to_vec()),
            Value::Partial(Some(pt)) => {
                let mut all = pt.args().to_vec();
                all.extend(args.iter().cloned());
                match pt.func() {
                    Some(id) => self.invoke(id, &all, Some(pt)),
                    None => self.call_by_name(pt.name(), all),
                }
            }
            other => bail!("E921: Invalid callback argument: {}", other.type_name()),
        }
    }

    /// Call a builtin or compiled function by name.
    pub fn call_by_name(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        let builtins = self.vm.builtins();
        if let Some(idx) = builtins.lookup(name) {
            let entry = builtins
                .get(idx)
                .ok_or_else(|| anyhow!(VmError::UnknownFunction(name.to_owned())))?;
            entry.check_arity(args.len())?;
            return (entry.func)(&args, self);
        }
        match self.vm.program().lookup(name) {
            Some(id) => self.invoke(id, &args, None),
            None => Err(VmError::UnknownFunction(name.to_owned()).into()),
        }
    }

    fn invoke(&mut self, func: FunctionId, args: &[Value], partial: Option<&PartialRef>) -> Result<Value> {
        match self.vm.invoke_nested(func, args, partial, self.caller.clone()) {
            Ok(Completion::Returned(value)) => Ok(value),
            // Pending exception or failure already went through the exception state.
            Ok(Completion::Rethrow) | Err(_) => Err(VmError::Reported.into()),
        }
    }
}

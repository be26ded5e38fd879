use std::rc::Rc;

use crate::val::{Partial, Value};
use crate::vm::vm::Vm;
use crate::vm::vm::frame::ExecCtx;
use crate::vm::{FunctionId, VmError};

use super::Flow;

impl Vm<'_> {
    /// A `Return` inside a try region with a finally clause runs the clause
    /// first; its `EndTry` completes the return.
    pub(super) fn return_op(&mut self, ectx: &mut ExecCtx) -> Flow {
        if let Some(region) = ectx.trystack.last_mut()
            && region.frame == ectx.frame
            && let Some(target) = region.begin_return()
        {
            ectx.iidx = target;
            return Flow::Next;
        }
        Flow::Return
    }

    /// Create a function value for `func`. A closure also gets the running
    /// frame as context and is remembered in capture slot `var_idx`, so it
    /// can take over the frame's variables if it outlives the call.
    pub(super) fn funcref(&mut self, ectx: &mut ExecCtx, func: FunctionId, var_idx: usize) -> Result<(), VmError> {
        let target = self.program.func(func)?;
        let mut partial = Partial::new(target.name.clone(), Some(func), Vec::new());
        if !target.is_closure {
            ectx.stack.push(Value::partial(partial));
            return Ok(());
        }

        partial = partial.with_outer(ectx.live_env());
        let current = self.program.func(ectx.func)?;
        let slot = (current.locals + var_idx) as i32;
        if matches!(ectx.load_var(slot), Value::Partial(_)) {
            return Err(VmError::MultipleClosures);
        }
        let pt = Rc::new(partial);
        ectx.store_var(slot, Value::Partial(Some(Rc::clone(&pt))));
        ectx.stack.push(Value::Partial(Some(pt)));
        tracing::trace!(target: "v9vm::vm::closure", func = %target.name, slot, "closure created");
        Ok(())
    }

    /// Make lambda `lambda` callable as global function `global`.
    pub(super) fn new_func(&mut self, lambda: &str, global: &str) -> Result<(), VmError> {
        let Some(target) = self.program.lookup(lambda) else {
            return Err(VmError::UnknownFunction(lambda.to_owned()));
        };
        if self.program.lookup(global).is_some() {
            return Err(VmError::Host(format!(
                "E122: Function {global} already exists, add ! to replace it"
            )));
        }
        self.program.define_alias(global, target);
        Ok(())
    }
}

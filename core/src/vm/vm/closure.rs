use std::{cell::RefCell, mem, rc::Rc};

use crate::val::{FuncStack, OuterEnv, PartialRef, Value};
use crate::vm::{STACK_FRAME_SIZE, VmError};

use super::Vm;
use super::frame::ExecCtx;

impl Vm<'_> {
    /// Called when the running function returns. Closures it created that are
    /// still referenced from elsewhere get a snapshot of its arguments and
    /// locals, since the stack region is about to be reused.
    ///
    /// With `free_arguments` the argument values are moved into the snapshot;
    /// at the top-level return they belong to the host and are copied.
    pub(super) fn handle_closure_in_use(&mut self, ectx: &ExecCtx, free_arguments: bool) -> Result<(), VmError> {
        let def = self.program.func(ectx.func)?;
        if def.closures == 0 {
            return Ok(());
        }
        let argcount = def.arg_count();
        let top = ectx
            .frame
            .checked_sub(argcount)
            .ok_or_else(|| VmError::Internal(format!("frame of {} is below its arguments", def.name)))?;
        let locals = ectx.frame + STACK_FRAME_SIZE;
        let captures = locals + def.locals;

        ectx.stack.with_slice_mut(|cells| {
            if cells.len() < captures + def.closures {
                return Err(VmError::Internal("closure slots beyond the stack".into()));
            }
            let mut escaping: Vec<PartialRef> = Vec::new();
            for slot in &cells[captures..captures + def.closures] {
                let Value::Partial(Some(pt)) = slot else { continue };
                // Locals holding the same partial die with the frame.
                let aliases = cells[locals..captures]
                    .iter()
                    .filter(|v| matches!(v, Value::Partial(Some(lp)) if Rc::ptr_eq(lp, pt)))
                    .count();
                if Rc::strong_count(pt) - aliases > 1 {
                    escaping.push(Rc::clone(pt));
                }
            }
            if escaping.is_empty() {
                return Ok(());
            }

            let mut snapshot = Vec::with_capacity(argcount + STACK_FRAME_SIZE + def.locals);
            for slot in &mut cells[top..ectx.frame] {
                snapshot.push(if free_arguments { mem::take(slot) } else { slot.clone() });
            }
            snapshot.extend(std::iter::repeat_with(Value::default).take(STACK_FRAME_SIZE));
            for idx in locals..captures {
                // A local aliasing a capture slot would make the snapshot
                // reference itself through the partial.
                let aliased = match &cells[idx] {
                    Value::Partial(Some(lp)) => cells[captures..captures + def.closures]
                        .iter()
                        .any(|c| matches!(c, Value::Partial(Some(cp)) if Rc::ptr_eq(cp, lp))),
                    _ => false,
                };
                snapshot.push(if aliased { Value::Unknown } else { mem::take(&mut cells[idx]) });
            }

            let funcstack: FuncStack = Rc::new(RefCell::new(snapshot));
            for pt in &escaping {
                pt.set_outer(Some(OuterEnv::Snapshot {
                    stack: Rc::clone(&funcstack),
                    frame: argcount,
                }));
            }
            tracing::debug!(
                target: "v9vm::vm::closure",
                func = %def.name,
                escaping = escaping.len(),
                "moved frame into closure snapshot"
            );
            Ok(())
        })
    }
}

use crate::val::Value;
use crate::vm::vm::Vm;
use crate::vm::vm::frame::ExecCtx;
use crate::vm::{Completion, ExceptionKind, VmError};

mod containers;
mod control;
mod invoke;
mod loadstore;
mod math;
mod opcode;

/// What the dispatch loop does after an instruction.
pub(super) enum Flow {
    Next,
    /// Leave the running function; its return value is on top of the stack.
    Return,
}

impl Vm<'_> {
    /// The dispatch loop. Returns when the initial frame returns or an
    /// exception escapes it; every error path has reported its error.
    pub(in crate::vm::vm) fn execute(&mut self, ectx: &mut ExecCtx) -> Result<Completion, VmError> {
        let program = self.program;
        let interval = self.options.breakcheck_interval.max(1);
        let mut breakcheck_count: u32 = 0;

        loop {
            breakcheck_count += 1;
            if breakcheck_count >= interval {
                breakcheck_count = 0;
                self.host.breakcheck();
            }

            if self.host.take_interrupt() {
                tracing::debug!(target: "v9vm::vm::exception", "interrupt");
                self.host.exceptions().throw("Vim:Interrupt", ExceptionKind::Interrupt);
            }
            // Errors raised inside a try region become exceptions.
            if self.host.exceptions().throw_pending_error() {
                tracing::debug!(target: "v9vm::vm::exception", "error converted to exception");
            }

            if self.host.exceptions().did_throw() && !self.catch_in_progress(ectx) {
                let frame = ectx.frame;
                match ectx.trystack.last_mut() {
                    Some(region) if region.frame == frame => {
                        // Operands pushed inside the try block are dropped.
                        ectx.stack.truncate(region.stack_len);
                        ectx.iidx = region.catch_target;
                        region.in_catch = true;
                    }
                    _ => {
                        // Leave the function with a placeholder result.
                        ectx.stack.push(Value::Number(0));
                        if ectx.frame == ectx.initial_frame {
                            if let Err(err) = self.handle_closure_in_use(ectx, false) {
                                return self.fail(err);
                            }
                            return Ok(Completion::Rethrow);
                        }
                        if let Err(err) = self.func_return(ectx) {
                            return self.fail(err);
                        }
                    }
                }
                continue;
            }

            if let Some(region) = ectx.trystack.last_mut()
                && region.frame == ectx.frame
            {
                region.reach(ectx.iidx);
            }

            let def = match program.func(ectx.func) {
                Ok(def) => def,
                Err(err) => return self.fail(err),
            };
            let Some(instr) = def.instrs.get(ectx.iidx) else {
                return self.fail(VmError::Internal(format!(
                    "{} ran past its last instruction",
                    def.name
                )));
            };
            if self.options.trace_instructions {
                tracing::trace!(
                    target: "v9vm::vm::dispatch",
                    func = %def.name,
                    iidx = ectx.iidx,
                    op = ?instr.op,
                    depth = ectx.stack.len()
                );
            }
            ectx.iidx += 1;

            match self.step(ectx, &instr.op, instr.lnum) {
                Ok(Flow::Next) => {}
                Ok(Flow::Return) => {
                    if ectx.frame == ectx.initial_frame {
                        if let Err(err) = self.handle_closure_in_use(ectx, false) {
                            return self.fail(err);
                        }
                        self.leave_frame_regions(ectx);
                        return Ok(Completion::Returned(ectx.stack.pop()));
                    }
                    if let Err(err) = self.func_return(ectx) {
                        return self.fail(err);
                    }
                }
                Err(err) => {
                    self.host.set_source_line(instr.lnum);
                    self.emsg(&err);
                    if err.is_fatal() || self.host.exceptions().try_level() == 0 {
                        return Err(err);
                    }
                }
            }
        }
    }

    /// A pending exception waits while a catch or finally clause of the
    /// running frame executes; it resumes after `EndTry`.
    fn catch_in_progress(&self, ectx: &ExecCtx) -> bool {
        ectx.trystack
            .last()
            .is_some_and(|t| t.frame == ectx.frame && t.in_handler())
    }

    fn fail(&mut self, err: VmError) -> Result<Completion, VmError> {
        self.emsg(&err);
        Err(err)
    }
}

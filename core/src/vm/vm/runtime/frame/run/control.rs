use crate::val::Value;
use crate::vm::vm::Vm;
use crate::vm::vm::frame::ExecCtx;
use crate::vm::vm::trystack::TryRegion;
use crate::vm::{EchoKind, ExceptionKind, JumpWhen, Op, VmError};

use super::Flow;

impl Vm<'_> {
    pub(super) fn jump(&mut self, ectx: &mut ExecCtx, when: JumpWhen, target: usize) {
        let taken = match when {
            JumpWhen::Always => true,
            JumpWhen::IfFalse => !ectx.stack.pop().to_bool(),
            JumpWhen::AndKeepIfTrue | JumpWhen::AndKeepIfFalse => {
                let truthy = ectx.stack.peek(-1).to_bool();
                let keep = truthy == (when == JumpWhen::AndKeepIfTrue);
                if !keep {
                    drop(ectx.stack.pop());
                }
                keep
            }
        };
        if taken {
            ectx.iidx = target;
        }
    }

    /// Advance the loop counter in local `idx` over the list on top of the
    /// stack. The list stays in place until the loop ends.
    pub(super) fn for_next(&mut self, ectx: &mut ExecCtx, idx: i32, end: usize) -> Result<(), VmError> {
        let list = match ectx.stack.peek(-1) {
            Value::List(l) => l,
            _ => return Err(VmError::ListRequired),
        };
        let counter = match ectx.load_var(idx) {
            Value::Number(n) => n.wrapping_add(1),
            _ => return Err(VmError::Internal("for loop counter is not a number".into())),
        };
        ectx.store_var(idx, Value::Number(counter));

        let item = list.and_then(|l| usize::try_from(counter).ok().and_then(|at| l.borrow().get(at).cloned()));
        match item {
            Some(item) => ectx.stack.push(item),
            None => ectx.iidx = end,
        }
        Ok(())
    }

    pub(super) fn try_begin(&mut self, ectx: &mut ExecCtx, catch: usize, finally: usize) {
        ectx.trystack
            .push(TryRegion::new(ectx.frame, ectx.stack.len(), catch, finally));
        self.host.exceptions().enter_try();
    }

    pub(super) fn catch_begin(&mut self, ectx: &mut ExecCtx) -> Result<(), VmError> {
        if let Some(region) = ectx.trystack.last_mut() {
            region.caught = true;
        }
        let exceptions = self.host.exceptions();
        exceptions.clear_flags();
        exceptions.catch_current();
        tracing::debug!(
            target: "v9vm::vm::exception",
            value = exceptions.current().map(|e| e.value.as_str()),
            "caught"
        );
        Ok(())
    }

    pub(super) fn end_try(&mut self, ectx: &mut ExecCtx) -> Result<Flow, VmError> {
        let Some(region) = ectx.trystack.pop() else {
            return Ok(Flow::Next);
        };
        self.end_region(&region, false);
        // An exception raised in the catch or finally clause wins over a
        // pending return.
        if region.pending_return && !self.host.exceptions().did_throw() {
            Ok(Flow::Return)
        } else {
            Ok(Flow::Next)
        }
    }

    pub(super) fn throw(&mut self, ectx: &mut ExecCtx) -> Result<(), VmError> {
        let value = ectx.stack.pop();
        let value = match value.as_str() {
            Some(s) => s.to_owned(),
            None => value.echo_string(),
        };
        if value.starts_with("Vim") {
            return Err(VmError::VimPrefixThrow);
        }
        tracing::debug!(target: "v9vm::vm::exception", %value, "throw");
        self.host.exceptions().throw(value, ExceptionKind::User);
        Ok(())
    }

    /// Run a host command. A failure is reported like any other error but
    /// does not stop the function.
    pub(super) fn exec_command(&mut self, cmd: &str) {
        if let Err(err) = self.host.execute_command(cmd) {
            self.emsg(&VmError::Host(format!("{err:#}")));
        }
    }

    pub(super) fn echo(&mut self, ectx: &mut ExecCtx, count: usize, with_white: bool) {
        let items = ectx.stack.pop_n(count);
        let text = items
            .iter()
            .map(Value::echo_string)
            .collect::<Vec<_>>()
            .join(if with_white { " " } else { "" });
        let kind = if with_white { EchoKind::Echo } else { EchoKind::Echon };
        self.host.echo(&text, kind);
    }

    /// `execute`, `echomsg` and `echoerr`: items joined with a space.
    pub(super) fn execute_family(&mut self, ectx: &mut ExecCtx, op: &Op, count: usize) -> Result<(), VmError> {
        let items = ectx.stack.pop_n(count);
        let mut parts = Vec::with_capacity(items.len());
        for item in &items {
            match item {
                Value::Job(_) | Value::Channel(_) => return Err(VmError::InvalidStringValue(item.type_name())),
                other => parts.push(other.echo_string()),
            }
        }
        let text = parts.join(" ");
        match op {
            Op::Execute(_) => self.exec_command(&text),
            Op::EchoMsg(_) => self.host.echo(&text, EchoKind::Message),
            _ => self.emsg(&VmError::Host(text)),
        }
        Ok(())
    }
}

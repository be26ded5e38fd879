mod closure;
mod frame;
mod runtime;
mod trystack;

use crate::val::Value;

use super::{BuiltinTable, Host, Program, VmError, VmOptions};

/// Result of an invocation that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Returned(Value),
    /// An exception escaped every try region; it is still pending in the
    /// host's exception state and the caller is expected to rethrow it.
    Rethrow,
}

impl Completion {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Completion::Returned(v) => Some(v),
            Completion::Rethrow => None,
        }
    }
}

/// Executes compiled functions of one [`Program`] against a host.
///
/// A `Vm` holds no execution state between invocations: each call to
/// [`Vm::invoke`] builds its own stack, which makes re-entrant invocation from
/// builtins possible through the same instance.
pub struct Vm<'a> {
    program: &'a Program,
    builtins: &'a BuiltinTable,
    host: &'a mut dyn Host,
    options: VmOptions,
}

impl<'a> Vm<'a> {
    pub fn new(program: &'a Program, builtins: &'a BuiltinTable, host: &'a mut dyn Host) -> Self {
        Self {
            program,
            builtins,
            host,
            options: VmOptions::default(),
        }
    }

    pub fn with_options(mut self, options: VmOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    pub fn program(&self) -> &'a Program {
        self.program
    }

    pub fn builtins(&self) -> &'a BuiltinTable {
        self.builtins
    }

    pub fn host(&mut self) -> &mut (dyn Host + 'a) {
        &mut *self.host
    }

    /// Report `err`: queued for conversion into an exception inside a try
    /// region, displayed otherwise.
    pub(crate) fn emsg(&mut self, err: &VmError) {
        if matches!(err, VmError::Reported) {
            return;
        }
        let msg = err.to_string();
        tracing::debug!(target: "v9vm::vm::exception", %msg, fatal = err.is_fatal(), "error raised");
        if err.is_fatal() {
            self.host.exceptions().note_error();
            self.host.display_error(&msg);
        } else if !self.host.exceptions().emit_error(&msg) {
            self.host.display_error(&msg);
        }
    }
}

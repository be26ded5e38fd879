use std::fmt;

/// Origin of an exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    /// Raised by `throw`.
    User,
    /// Converted from an error message raised inside a try region.
    Error,
    /// Converted from a user interrupt.
    Interrupt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    pub value: String,
    pub kind: ExceptionKind,
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Exception and error bookkeeping shared by the VM and its host.
///
/// The try level counts active try regions across every running invocation,
/// including nested ones started from builtins; errors raised while it is
/// non-zero are queued and later turned into exceptions instead of being
/// displayed.
#[derive(Debug, Default)]
pub struct ExceptionState {
    try_level: usize,
    did_throw: bool,
    did_emsg: bool,
    error_count: u64,
    current: Option<Exception>,
    caught: Vec<Exception>,
    pending_errors: Vec<String>,
}

impl ExceptionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_level(&self) -> usize {
        self.try_level
    }

    pub fn enter_try(&mut self) {
        self.try_level += 1;
    }

    pub fn leave_try(&mut self) {
        self.try_level = self.try_level.saturating_sub(1);
    }

    pub fn did_throw(&self) -> bool {
        self.did_throw
    }

    pub fn did_emsg(&self) -> bool {
        self.did_emsg
    }

    /// Number of error messages emitted so far.
    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    pub fn current(&self) -> Option<&Exception> {
        self.current.as_ref()
    }

    /// Exceptions whose catch clause is currently executing, innermost last.
    pub fn caught(&self) -> &[Exception] {
        &self.caught
    }

    pub fn throw(&mut self, value: impl Into<String>, kind: ExceptionKind) {
        self.current = Some(Exception {
            value: value.into(),
            kind,
        });
        self.did_throw = true;
    }

    /// Record an error message. Returns `true` when it was queued for
    /// conversion into an exception, `false` when the host should display it.
    pub fn emit_error(&mut self, msg: &str) -> bool {
        self.did_emsg = true;
        self.error_count += 1;
        if self.try_level > 0 {
            self.pending_errors.push(msg.to_owned());
            true
        } else {
            false
        }
    }

    /// Count an error that bypasses try regions and is displayed directly.
    pub fn note_error(&mut self) {
        self.did_emsg = true;
        self.error_count += 1;
    }

    pub fn has_pending_errors(&self) -> bool {
        !self.pending_errors.is_empty()
    }

    /// Turn the first queued error into the current exception, dropping the rest.
    pub fn throw_pending_error(&mut self) -> bool {
        if self.pending_errors.is_empty() {
            return false;
        }
        let first = self.pending_errors.remove(0);
        self.pending_errors.clear();
        self.throw(format!("Vim:{first}"), ExceptionKind::Error);
        true
    }

    /// Clear error, interrupt and throw flags when a catch clause starts.
    pub fn clear_flags(&mut self) {
        self.did_emsg = false;
        self.did_throw = false;
    }

    /// Mark the current exception as caught.
    pub fn catch_current(&mut self) {
        if let Some(exc) = self.current.clone() {
            self.caught.push(exc);
        }
    }

    /// The innermost catch clause ended.
    pub fn finish_caught(&mut self) {
        self.caught.pop();
    }

    /// Forget the current exception, including a pending throw of it.
    pub fn discard_current(&mut self) {
        self.current = None;
        self.did_throw = false;
    }

    /// Reset everything except the error counter, for hosts that reuse the
    /// state between top-level commands.
    pub fn reset(&mut self) {
        let error_count = self.error_count;
        *self = Self {
            error_count,
            ..Self::default()
        };
    }
}

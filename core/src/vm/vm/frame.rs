use crate::val::{OuterEnv, Value};
use crate::vm::{CallContext, ExecStack, FunctionId, Namespace, STACK_FRAME_SIZE, VmError};

use super::Vm;
use super::trystack::TryRegion;

/// Execution state of one top-level invocation.
pub(super) struct ExecCtx {
    pub(super) stack: ExecStack,
    /// Frame pointer of the running function.
    pub(super) frame: usize,
    /// Frame pointer of the function the invocation started with.
    pub(super) initial_frame: usize,
    /// Variables of the function that created the running closure.
    pub(super) outer: Option<OuterEnv>,
    /// Caller's `outer`, one entry per pushed frame.
    pub(super) saved_outer: Vec<Option<OuterEnv>>,
    pub(super) trystack: Vec<TryRegion>,
    pub(super) func: FunctionId,
    pub(super) iidx: usize,
}

impl ExecCtx {
    pub(super) fn new(capacity: usize, func: FunctionId) -> Self {
        Self {
            stack: ExecStack::with_capacity(capacity),
            frame: 0,
            initial_frame: 0,
            outer: None,
            saved_outer: Vec::new(),
            trystack: Vec::new(),
            func,
            iidx: 0,
        }
    }

    /// Absolute stack index of frame-relative variable `idx`.
    #[inline]
    pub(super) fn var_index(&self, idx: i32) -> usize {
        (self.frame as isize + STACK_FRAME_SIZE as isize + idx as isize).max(0) as usize
    }

    #[inline]
    pub(super) fn load_var(&self, idx: i32) -> Value {
        self.stack.get(self.var_index(idx))
    }

    #[inline]
    pub(super) fn store_var(&self, idx: i32, value: Value) {
        let old = self.stack.set(self.var_index(idx), value);
        drop(old);
    }

    /// The running frame as closure context for functions it creates or calls.
    pub(super) fn live_env(&self) -> OuterEnv {
        OuterEnv::Live {
            stack: self.stack.downgrade(),
            frame: self.frame,
        }
    }

    pub(super) fn outer(&self) -> Result<&OuterEnv, VmError> {
        self.outer
            .as_ref()
            .ok_or_else(|| VmError::Internal("outer variable used outside a closure".into()))
    }

    fn frame_word(&self, offset: usize) -> Result<usize, VmError> {
        match self.stack.get(self.frame + offset) {
            Value::Number(n) if n >= 0 => Ok(n as usize),
            other => Err(VmError::Internal(format!("corrupt frame word: {}", other.type_name()))),
        }
    }
}

impl Vm<'_> {
    /// Push a frame for compiled function `func`, whose `argc` arguments are
    /// the top of the stack.
    pub(super) fn call_dfunc(&mut self, ectx: &mut ExecCtx, func: FunctionId, argc: usize) -> Result<(), VmError> {
        let def = self.program.func(func)?;
        if def.is_deleted() {
            return Err(VmError::FunctionDeleted(def.name.clone()));
        }
        if argc > def.params && !def.varargs {
            return Err(VmError::TooManyArgs(def.name.clone()));
        }
        if argc < def.required_count() {
            return Err(VmError::NotEnoughArgs(def.name.clone()));
        }
        tracing::debug!(target: "v9vm::vm::call", func = %def.name, argc, "call");

        let mut argc = argc;
        if def.varargs {
            let extra = argc.saturating_sub(def.params);
            argc -= extra;
            let items = ectx.stack.pop_n(extra);
            ectx.stack.push(Value::list(items));
        }
        // Omitted optional arguments go below the variadic list; their
        // default expressions fill them in.
        let missing = def.params - argc;
        ectx.stack
            .insert_below(def.varargs as usize, std::iter::repeat_with(Value::default).take(missing));

        let frame = ectx.stack.len();
        ectx.stack.push(Value::Number(ectx.func as i64));
        ectx.stack.push(Value::Number(ectx.iidx as i64));
        ectx.stack.push(Value::Number(ectx.frame as i64));
        for _ in 0..def.locals + def.closures {
            ectx.stack.push(Value::Unknown);
        }
        ectx.saved_outer.push(ectx.outer.take());
        ectx.frame = frame;
        ectx.func = func;
        ectx.iidx = def.entry_index(argc);
        Ok(())
    }

    /// Pop the running frame, leaving its return value in place of the
    /// arguments it was called with.
    pub(super) fn func_return(&mut self, ectx: &mut ExecCtx) -> Result<(), VmError> {
        let def = self.program.func(ectx.func)?;
        self.handle_closure_in_use(ectx, true)?;

        // A return from inside a try region leaves it behind.
        self.leave_frame_regions(ectx);

        let top = ectx.frame.checked_sub(def.arg_count()).ok_or_else(|| {
            VmError::Internal(format!("frame of {} is below its arguments", def.name))
        })?;
        let ret = ectx.stack.pop();
        let caller_func = ectx.frame_word(0)?;
        let caller_iidx = ectx.frame_word(1)?;
        let caller_frame = ectx.frame_word(2)?;
        tracing::debug!(target: "v9vm::vm::call", func = %def.name, "return");

        ectx.stack.truncate(top);
        ectx.stack.push(ret);
        ectx.func = caller_func;
        ectx.iidx = caller_iidx;
        ectx.frame = caller_frame;
        ectx.outer = ectx.saved_outer.pop().flatten();
        Ok(())
    }

    /// Call a function value whose `argc` arguments are on the stack.
    pub(super) fn call_partial(&mut self, ectx: &mut ExecCtx, callee: Value, argc: usize) -> Result<(), VmError> {
        match callee {
            Value::Partial(Some(pt)) => {
                let mut argc = argc;
                if !pt.args().is_empty() {
                    ectx.stack.insert_below(argc, pt.args().iter().cloned());
                    argc += pt.args().len();
                }
                match pt.func() {
                    Some(func) => {
                        self.call_dfunc(ectx, func, argc)?;
                        ectx.outer = pt.outer();
                        Ok(())
                    }
                    None => self.call_by_name(ectx, pt.name(), argc),
                }
            }
            Value::Func(Some(name)) => self.call_by_name(ectx, &name, argc),
            _ => Err(VmError::UnknownFunction("[unknown]".into())),
        }
    }

    /// Resolve `name` as a builtin first, then as a compiled function.
    pub(super) fn call_by_name(&mut self, ectx: &mut ExecCtx, name: &str, argc: usize) -> Result<(), VmError> {
        if let Some(idx) = self.builtins.lookup(name) {
            return self.call_bfunc(ectx, idx, argc);
        }
        match self.program.lookup(name) {
            Some(func) => self.call_dfunc(ectx, func, argc),
            None => Err(VmError::UnknownFunction(name.to_owned())),
        }
    }

    /// `UCall`: like `call_by_name`, falling back to a variable that holds a
    /// function reference.
    pub(super) fn call_eval_func(&mut self, ectx: &mut ExecCtx, name: &str, argc: usize) -> Result<(), VmError> {
        match self.call_by_name(ectx, name, argc) {
            Err(VmError::UnknownFunction(_)) => {
                let (ns, var) = Namespace::split(name).unwrap_or((Namespace::Global, name));
                match self.host.lookup_var(ns, var) {
                    Some(callee @ (Value::Func(Some(_)) | Value::Partial(Some(_)))) => {
                        self.call_partial(ectx, callee, argc)
                    }
                    _ => Err(VmError::UnknownFunction(name.to_owned())),
                }
            }
            other => other,
        }
    }

    /// Call builtin `idx`; its result replaces the arguments.
    pub(super) fn call_bfunc(&mut self, ectx: &mut ExecCtx, idx: usize, argc: usize) -> Result<(), VmError> {
        let builtins = self.builtins;
        let entry = builtins
            .get(idx)
            .ok_or_else(|| VmError::Internal(format!("builtin index {idx} out of range")))?;
        entry.check_arity(argc)?;

        let args = ectx.stack.pop_n(argc);
        ectx.stack.push(Value::Number(0));
        let errors_before = self.host.exceptions().error_count();
        let caller = ectx.live_env();
        let result = {
            let mut ctx = CallContext::new(self, Some(caller));
            (entry.func)(&args, &mut ctx)
        };
        drop(args);
        let reported = self.host.exceptions().error_count() != errors_before;

        match result {
            Ok(value) => {
                ectx.stack.set_top(-1, value);
                if reported { Err(VmError::Reported) } else { Ok(()) }
            }
            // An exception thrown by nested code is picked up by the dispatch loop.
            Err(_) if self.host.exceptions().did_throw() => Ok(()),
            Err(err) => {
                let err = VmError::from_anyhow(&err);
                tracing::debug!(target: "v9vm::vm::call", builtin = %entry.name, %err, "builtin failed");
                if reported { Err(VmError::Reported) } else { Err(err) }
            }
        }
    }
}

use crate::val::{OuterEnv, PartialRef, Value};
use crate::vm::vm::Vm;
use crate::vm::vm::frame::ExecCtx;
use crate::vm::{Completion, FunctionDef, FunctionId, STACK_FRAME_SIZE, VmError};

impl<'a> Vm<'a> {
    /// Run compiled function `func` with `args`.
    ///
    /// `partial` supplies the closure context when `func` was reached through
    /// a function value. On `Err` the error has already been reported to the
    /// host.
    pub fn invoke(
        &mut self,
        func: FunctionId,
        args: &[Value],
        partial: Option<&PartialRef>,
    ) -> Result<Completion, VmError> {
        self.invoke_nested(func, args, partial, None)
    }

    pub fn invoke_by_name(&mut self, name: &str, args: &[Value]) -> Result<Completion, VmError> {
        let Some(func) = self.program.lookup(name) else {
            let err = VmError::UnknownFunction(name.to_owned());
            self.emsg(&err);
            return Err(err);
        };
        self.invoke(func, args, None)
    }

    /// Call a function value (function name or partial) from the host.
    pub fn invoke_value(&mut self, callee: &Value, args: &[Value]) -> Result<Completion, VmError> {
        let resolved = match callee {
            Value::Partial(Some(pt)) => pt.func().or_else(|| self.program.lookup(pt.name())).map(|id| {
                let mut all = pt.args().to_vec();
                all.extend_from_slice(args);
                (id, all, Some(pt))
            }),
            Value::Func(Some(name)) => self.program.lookup(name).map(|id| (id, args.to_vec(), None)),
            _ => None,
        };
        match resolved {
            Some((func, all, partial)) => self.invoke(func, &all, partial),
            None => {
                let err = VmError::UnknownFunction(callee.echo_string());
                self.emsg(&err);
                Err(err)
            }
        }
    }

    /// `caller` is the frame of the invocation whose builtin started this
    /// one, used as closure context for partials that carry none.
    pub(crate) fn invoke_nested(
        &mut self,
        func: FunctionId,
        args: &[Value],
        partial: Option<&PartialRef>,
        caller: Option<OuterEnv>,
    ) -> Result<Completion, VmError> {
        let errors_before = self.host.exceptions().error_count();
        let def = match self.program.func(func) {
            Ok(def) => def,
            Err(err) => {
                self.emsg(&err);
                return Err(err);
            }
        };
        let mut ectx = ExecCtx::new(self.options.initial_stack_capacity, func);
        if let Err(err) = bind_arguments(def, args, &mut ectx) {
            self.emsg(&err);
            return Err(err);
        }
        if let Some(pt) = partial {
            ectx.outer = match pt.outer() {
                None => caller,
                outer => outer,
            };
        }
        tracing::debug!(target: "v9vm::vm::call", func = %def.name, argc = args.len(), "invoke");

        let result = self.execute(&mut ectx);
        if result.is_err() {
            // Unwind whatever is still open through the normal return path.
            while ectx.frame != ectx.initial_frame {
                if let Err(err) = self.func_return(&mut ectx) {
                    tracing::warn!(target: "v9vm::vm::call", %err, "unwinding stopped");
                    break;
                }
            }
            // Closures stored elsewhere keep the variables of the failed call.
            if ectx.frame == ectx.initial_frame
                && let Err(err) = self.handle_closure_in_use(&ectx, false)
            {
                tracing::warn!(target: "v9vm::vm::closure", %err, "closure context lost");
            }
        }
        for region in std::mem::take(&mut ectx.trystack) {
            self.end_region(&region, true);
        }
        ectx.stack.clear();

        match result {
            Err(err) if self.host.exceptions().error_count() == errors_before => {
                let unknown = VmError::Unknown(def.name.clone());
                tracing::debug!(target: "v9vm::vm::call", %err, "failure without a diagnostic");
                self.emsg(&unknown);
                Err(unknown)
            }
            other => other,
        }
    }
}

/// Validate `args` against `def` and lay out the initial frame. Nothing is
/// pushed when validation fails.
fn bind_arguments(def: &FunctionDef, args: &[Value], ectx: &mut ExecCtx) -> Result<(), VmError> {
    if def.is_deleted() {
        return Err(VmError::FunctionDeleted(def.name.clone()));
    }
    if args.len() > def.params && !def.varargs {
        return Err(VmError::TooManyArgs(def.name.clone()));
    }
    if args.len() < def.required_count() {
        return Err(VmError::NotEnoughArgs(def.name.clone()));
    }
    for (idx, (arg, expected)) in args.iter().zip(def.arg_types.iter()).enumerate() {
        if !expected.accepts(arg.var_type()) {
            return Err(VmError::ArgumentType {
                index: idx + 1,
                expected: expected.name(),
                actual: arg.type_name(),
            });
        }
    }
    let fixed = args.len().min(def.params);
    let varargs = &args[fixed..];
    if let Some(expected) = def.vararg_type {
        for (i, arg) in varargs.iter().enumerate() {
            if !expected.accepts(arg.var_type()) {
                return Err(VmError::ArgumentType {
                    index: fixed + i + 1,
                    expected: expected.name(),
                    actual: arg.type_name(),
                });
            }
        }
    }

    for arg in &args[..fixed] {
        ectx.stack.push(arg.clone());
    }
    // Omitted optional arguments, filled in by their default expressions.
    for _ in fixed..def.params {
        ectx.stack.push(Value::Unknown);
    }
    if def.varargs {
        ectx.stack.push(Value::list(varargs.to_vec()));
    }

    ectx.frame = ectx.stack.len();
    ectx.initial_frame = ectx.frame;
    for _ in 0..STACK_FRAME_SIZE + def.locals + def.closures {
        ectx.stack.push(Value::Unknown);
    }
    ectx.iidx = def.entry_index(fixed);
    Ok(())
}

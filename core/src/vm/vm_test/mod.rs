pub(super) use std::rc::Rc;

pub(super) use crate::{
    op::ExprOp,
    rt::{MemoryHost, OutputLine},
    val::{DictMap, Partial, Special, Value, VarType},
    vm::{
        BuiltinTable, CompareType, Completion, ExceptionKind, FunctionDef, Host, JumpWhen, Namespace, Op, OptionValue,
        Program, Vm, VmError, VmOptions,
    },
};

pub(super) const LEN: usize = 0;
pub(super) const CALL: usize = 1;
pub(super) const FAIL: usize = 2;

/// Builtins available to test programs, at the indexes named above.
pub(super) fn test_builtins() -> BuiltinTable {
    let mut table = BuiltinTable::new();
    table.register("len", 1, 1, |args, _ctx| {
        Ok(Value::Number(args[0].len().unwrap_or(0) as i64))
    });
    table.register("call", 2, 2, |args, ctx| {
        let list = args[1].as_list().map(|l| l.borrow().clone()).unwrap_or_default();
        ctx.call(&args[0], &list)
    });
    table.register("fail", 0, 0, |_args, _ctx| anyhow::bail!("E999: builtin failed"));
    table
}

pub(super) fn invoke_with(
    program: &Program,
    host: &mut MemoryHost,
    options: VmOptions,
    name: &str,
    args: &[Value],
) -> Result<Completion, VmError> {
    let builtins = test_builtins();
    let mut vm = Vm::new(program, &builtins, host).with_options(options);
    vm.invoke_by_name(name, args)
}

pub(super) fn invoke(program: &Program, host: &mut MemoryHost, name: &str, args: &[Value]) -> Result<Completion, VmError> {
    invoke_with(program, host, VmOptions::default(), name, args)
}

/// Run `name` on a fresh host and return its result.
pub(super) fn eval(program: &Program, name: &str, args: &[Value]) -> Value {
    let mut host = MemoryHost::new();
    invoke(program, &mut host, name, args)
        .unwrap()
        .into_value()
        .unwrap()
}

/// A program with a single argument-less function `f`.
pub(super) fn single(ops: Vec<Op>, locals: usize) -> Program {
    Program::new(vec![FunctionDef::new("f").with_locals(locals).with_code(ops)])
}

/// Run `f` of `program` on a fresh host, returning the failure and the host.
pub(super) fn expect_err(program: &Program, args: &[Value]) -> (VmError, MemoryHost) {
    let mut host = MemoryHost::new();
    let err = invoke(program, &mut host, "f", args).unwrap_err();
    (err, host)
}

pub(super) fn nr(n: i64) -> Value {
    Value::Number(n)
}

pub(super) fn s(text: &str) -> Value {
    Value::string(text)
}

pub(super) fn push_s(text: &str) -> Op {
    Op::PushS(Some(text.to_owned()))
}

mod closures;
mod control_flow;
mod functions;
mod namespaces;

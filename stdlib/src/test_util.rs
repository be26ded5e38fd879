use v9vm_core::rt::MemoryHost;
use v9vm_core::val::{DictMap, Value};
use v9vm_core::vm::{Completion, FunctionDef, Op, Program, Vm, VmError};

use crate::stdlib_table;

/// Call builtin `name` with `args` from a compiled wrapper function, with
/// `defs` available to callbacks.
pub(crate) fn call_in(defs: Vec<FunctionDef>, host: &mut MemoryHost, name: &str, args: &[Value]) -> Result<Completion, VmError> {
    let table = stdlib_table();
    let wrapper = FunctionDef::new("__call").with_params(args.len());
    let mut code: Vec<Op> = (0..args.len()).map(|i| Op::Load(wrapper.arg_slot(i))).collect();
    code.push(Op::BCall {
        func: table.lookup(name).unwrap_or(usize::MAX),
        argc: args.len(),
    });
    code.push(Op::Return);

    let mut functions = defs;
    functions.push(wrapper.with_code(code));
    let program = Program::new(functions);
    let mut vm = Vm::new(&program, &table, host);
    vm.invoke_by_name("__call", args)
}

pub(crate) fn call(name: &str, args: &[Value]) -> Result<Value, VmError> {
    let mut host = MemoryHost::new();
    match call_in(Vec::new(), &mut host, name, args)? {
        Completion::Returned(v) => Ok(v),
        Completion::Rethrow => Err(VmError::Reported),
    }
}

/// Error message of a failing call.
pub(crate) fn call_err(name: &str, args: &[Value]) -> String {
    match call(name, args) {
        Ok(v) => panic!("{name} unexpectedly returned {v:?}"),
        Err(err) => err.to_string(),
    }
}

pub(crate) fn nr(n: i64) -> Value {
    Value::Number(n)
}

pub(crate) fn s(text: &str) -> Value {
    Value::string(text)
}

pub(crate) fn list(items: Vec<Value>) -> Value {
    Value::list(items)
}

pub(crate) fn dict(pairs: &[(&str, Value)]) -> Value {
    let mut map = DictMap::default();
    for (k, v) in pairs {
        map.insert((*k).to_owned(), v.clone());
    }
    Value::dict(map)
}

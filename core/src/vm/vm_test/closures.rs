use super::*;

fn run_value(program: &Program, host: &mut MemoryHost, callee: &Value, args: &[Value]) -> Result<Completion, VmError> {
    let builtins = test_builtins();
    let mut vm = Vm::new(program, &builtins, host);
    vm.invoke_value(callee, args)
}

/// `make(n)`: `var local = n * 2; return () => local + n`
fn frozen_program() -> Program {
    let make = FunctionDef::new("make").with_params(1).with_locals(1).with_closures(1);
    let n = make.arg_slot(0);
    let make = make.with_code(vec![
        Op::Load(n),
        Op::PushNr(2),
        Op::OpNr(ExprOp::Mult),
        Op::Store(0),
        Op::FuncRef { func: 1, var_idx: 0 },
        Op::Return,
    ]);
    let lambda = FunctionDef::new("<lambda>1").closure().with_code(vec![
        Op::LoadOuter(0),
        Op::LoadOuter(n),
        Op::OpNr(ExprOp::Add),
        Op::Return,
    ]);
    Program::new(vec![make, lambda])
}

#[test]
fn test_closure_outlives_creator() {
    let program = frozen_program();
    let mut host = MemoryHost::new();
    let closure = invoke(&program, &mut host, "make", &[nr(5)])
        .unwrap()
        .into_value()
        .unwrap();
    let Value::Partial(Some(pt)) = &closure else {
        panic!("expected a partial, got {closure:?}");
    };
    assert!(pt.outer().is_some_and(|o| o.is_snapshot()));

    let result = run_value(&program, &mut host, &closure, &[]).unwrap();
    assert_eq!(result, Completion::Returned(nr(15)));
    // Calling again sees the same snapshot.
    let result = run_value(&program, &mut host, &closure, &[]).unwrap();
    assert_eq!(result, Completion::Returned(nr(15)));
}

#[test]
fn test_closure_stored_by_failing_call_keeps_variables() {
    // make_fail(n): var local = n * 2; g:keep = () => local + n; fail()
    let def = FunctionDef::new("make_fail").with_params(1).with_locals(1).with_closures(1);
    let n = def.arg_slot(0);
    let make_fail = def.with_code(vec![
        Op::Load(n),
        Op::PushNr(2),
        Op::OpNr(ExprOp::Mult),
        Op::Store(0),
        Op::FuncRef { func: 1, var_idx: 0 },
        Op::StoreG("keep".into()),
        Op::BCall { func: FAIL, argc: 0 },
        Op::Return,
    ]);
    let mut functions = frozen_program().functions().to_vec();
    functions.push(make_fail);
    let program = Program::new(functions);

    let mut host = MemoryHost::new();
    let err = invoke(&program, &mut host, "make_fail", &[nr(5)]).unwrap_err();
    assert!(err.to_string().starts_with("E999"));

    let closure = host.var(Namespace::Global, "keep").unwrap();
    let result = run_value(&program, &mut host, &closure, &[]).unwrap();
    assert_eq!(result, Completion::Returned(nr(15)));
}

#[test]
fn test_each_call_gets_its_own_snapshot() {
    let program = frozen_program();
    let mut host = MemoryHost::new();
    let first = invoke(&program, &mut host, "make", &[nr(1)]).unwrap().into_value().unwrap();
    let second = invoke(&program, &mut host, "make", &[nr(10)]).unwrap().into_value().unwrap();
    assert_eq!(run_value(&program, &mut host, &first, &[]).unwrap(), Completion::Returned(nr(3)));
    assert_eq!(run_value(&program, &mut host, &second, &[]).unwrap(), Completion::Returned(nr(30)));
}

/// `counter()`: `var x = 1; var F = () => { x += 10 }; F(); F(); return x`
fn counter_def(call_through_builtin: bool) -> FunctionDef {
    let call_f = |code: &mut Vec<Op>| {
        if call_through_builtin {
            code.extend([Op::Load(1), Op::NewList(0), Op::BCall { func: CALL, argc: 2 }, Op::Drop]);
        } else {
            code.extend([Op::Load(1), Op::PCall { argc: 0, top: false }, Op::Drop]);
        }
    };
    let mut code = vec![
        Op::PushNr(1),
        Op::Store(0),
        Op::FuncRef { func: 1, var_idx: 0 },
        Op::Store(1),
    ];
    call_f(&mut code);
    call_f(&mut code);
    code.extend([Op::Load(0), Op::Return]);
    FunctionDef::new("counter").with_locals(2).with_closures(1).with_code(code)
}

fn bump_def() -> FunctionDef {
    FunctionDef::new("<lambda>2").closure().with_code(vec![
        Op::LoadOuter(0),
        Op::PushNr(10),
        Op::OpNr(ExprOp::Add),
        Op::StoreOuter(0),
        Op::PushNr(0),
        Op::Return,
    ])
}

#[test]
fn test_closure_writes_live_frame() {
    let program = Program::new(vec![counter_def(false), bump_def()]);
    assert_eq!(eval(&program, "counter", &[]), nr(21));
}

#[test]
fn test_closure_called_from_builtin_sees_live_frame() {
    let program = Program::new(vec![counter_def(true), bump_def()]);
    assert_eq!(eval(&program, "counter", &[]), nr(21));
}

#[test]
fn test_multiple_closures_in_one_slot_fail() {
    let program = Program::new(vec![
        FunctionDef::new("f").with_closures(1).with_code(vec![
            Op::Try { catch: 6, finally: 0 },
            Op::FuncRef { func: 1, var_idx: 0 },
            Op::Drop,
            Op::FuncRef { func: 1, var_idx: 0 },
            Op::Drop,
            Op::Jump { when: JumpWhen::Always, target: 7 },
            Op::Catch,
            Op::EndTry,
            Op::PushNr(0),
            Op::Return,
        ]),
        bump_def(),
    ]);
    let (err, host) = expect_err(&program, &[]);
    // Not catchable.
    assert_eq!(err, VmError::MultipleClosures);
    assert_eq!(host.errors().next(), Some("Multiple closures not supported yet"));
    assert_eq!(host.output().len(), 1);
}

#[test]
fn test_plain_funcref_has_no_context() {
    let program = Program::new(vec![
        FunctionDef::new("f").with_code(vec![Op::FuncRef { func: 1, var_idx: 0 }, Op::Return]),
        FunctionDef::new("g").with_code(vec![Op::PushNr(3), Op::Return]),
    ]);
    let value = eval(&program, "f", &[]);
    let Value::Partial(Some(pt)) = &value else {
        panic!("expected a partial");
    };
    assert!(pt.outer().is_none());
    assert_eq!(pt.name(), "g");
}

#[test]
fn test_partial_bound_arguments() {
    let add = FunctionDef::new("add").with_params(2);
    let (a, b) = (add.arg_slot(0), add.arg_slot(1));
    let add = add.with_code(vec![Op::Load(a), Op::Load(b), Op::OpNr(ExprOp::Sub), Op::Return]);
    let program = Program::new(vec![
        add,
        // callee popped from the top
        FunctionDef::new("popped").with_code(vec![
            Op::PushNr(5),
            Op::LoadG("p".into()),
            Op::PCall { argc: 1, top: false },
            Op::Return,
        ]),
        // callee below its arguments
        FunctionDef::new("below").with_code(vec![
            Op::LoadG("p".into()),
            Op::PushNr(5),
            Op::PCall { argc: 1, top: true },
            Op::PCallEnd,
            Op::Return,
        ]),
    ]);
    let partial = Value::partial(Partial::new("add", Some(0), vec![nr(10)]));

    let mut host = MemoryHost::new();
    host.set_var(Namespace::Global, "p", partial.clone());
    for name in ["popped", "below"] {
        let result = invoke(&program, &mut host, name, &[]).unwrap();
        assert_eq!(result, Completion::Returned(nr(5)), "{name}");
    }
    assert_eq!(run_value(&program, &mut host, &partial, &[nr(4)]).unwrap(), Completion::Returned(nr(6)));
}

#[test]
fn test_function_name_value_calls_builtin() {
    let program = single(
        vec![
            Op::NewList(0),
            Op::PushFunc(Some("len".into())),
            Op::PCall { argc: 1, top: false },
            Op::Return,
        ],
        0,
    );
    assert_eq!(eval(&program, "f", &[]), nr(0));
}

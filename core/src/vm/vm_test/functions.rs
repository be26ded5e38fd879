use super::*;

/// `add(a, b)`: `return a + b`
fn add_def() -> FunctionDef {
    let def = FunctionDef::new("add").with_params(2);
    let (a, b) = (def.arg_slot(0), def.arg_slot(1));
    def.with_code(vec![Op::Load(a), Op::Load(b), Op::OpNr(ExprOp::Add), Op::Return])
}

/// `opt(a, b = 99)`: `return a + b`
fn optional_def() -> FunctionDef {
    let def = FunctionDef::new("opt").with_params(2).with_defaults(vec![0, 2]);
    let (a, b) = (def.arg_slot(0), def.arg_slot(1));
    def.with_code(vec![
        Op::PushNr(99),
        Op::Store(b),
        Op::Load(a),
        Op::Load(b),
        Op::OpNr(ExprOp::Add),
        Op::Return,
    ])
}

/// `var(a, ...rest)`: `return len(rest) * 100 + a`
fn varargs_def() -> FunctionDef {
    let def = FunctionDef::new("var").with_params(1).with_varargs(None);
    let (a, rest) = (def.arg_slot(0), def.arg_slot(1));
    def.with_code(vec![
        Op::Load(rest),
        Op::BCall { func: LEN, argc: 1 },
        Op::PushNr(100),
        Op::OpNr(ExprOp::Mult),
        Op::Load(a),
        Op::OpNr(ExprOp::Add),
        Op::Return,
    ])
}

fn program() -> Program {
    Program::new(vec![
        add_def(),
        optional_def(),
        varargs_def(),
        // call_add(): return add(2, 3) + 1
        FunctionDef::new("call_add").with_code(vec![
            Op::PushNr(2),
            Op::PushNr(3),
            Op::DCall { func: 0, argc: 2 },
            Op::PushNr(1),
            Op::OpNr(ExprOp::Add),
            Op::Return,
        ]),
        // call_opt(): return opt(5)
        FunctionDef::new("call_opt").with_code(vec![Op::PushNr(5), Op::DCall { func: 1, argc: 1 }, Op::Return]),
        // call_var(): return var(1, 2, 3, 4, 5)
        FunctionDef::new("call_var").with_code(vec![
            Op::PushNr(1),
            Op::PushNr(2),
            Op::PushNr(3),
            Op::PushNr(4),
            Op::PushNr(5),
            Op::DCall { func: 2, argc: 5 },
            Op::Return,
        ]),
        FunctionDef::new("fails").with_code(vec![Op::BCall { func: FAIL, argc: 0 }, Op::Return]),
    ])
}

#[test]
fn test_fixed_arguments() {
    let program = program();
    assert_eq!(eval(&program, "add", &[nr(2), nr(3)]), nr(5));
    assert_eq!(eval(&program, "call_add", &[]), nr(6));
}

#[test]
fn test_optional_argument_uses_default() {
    let program = program();
    assert_eq!(eval(&program, "opt", &[nr(1)]), nr(100));
    assert_eq!(eval(&program, "opt", &[nr(1), nr(2)]), nr(3));
    assert_eq!(eval(&program, "call_opt", &[]), nr(104));
}

#[test]
fn test_variadic_arguments() {
    let program = program();
    assert_eq!(eval(&program, "var", &[nr(7)]), nr(7));
    assert_eq!(eval(&program, "var", &[nr(7), nr(1), nr(2)]), nr(207));
    assert_eq!(eval(&program, "call_var", &[]), nr(401));
}

/// `mixed(a, b, c = 99, ...rest)`: `return [a, b, c, rest]`
fn mixed_program() -> Program {
    let def = FunctionDef::new("mixed")
        .with_params(3)
        .with_defaults(vec![0, 2])
        .with_varargs(None);
    let slots: Vec<i32> = (0..4).map(|i| def.arg_slot(i)).collect();
    let mixed = def.with_code(vec![
        Op::PushNr(99),
        Op::Store(slots[2]),
        Op::Load(slots[0]),
        Op::Load(slots[1]),
        Op::Load(slots[2]),
        Op::Load(slots[3]),
        Op::NewList(4),
        Op::Return,
    ]);
    Program::new(vec![
        mixed,
        // call_mixed(): return mixed(1, 2)
        FunctionDef::new("call_mixed").with_code(vec![
            Op::PushNr(1),
            Op::PushNr(2),
            Op::DCall { func: 0, argc: 2 },
            Op::Return,
        ]),
        // call_mixed_all(): return mixed(1, 2, 3, 4, 5)
        FunctionDef::new("call_mixed_all").with_code(vec![
            Op::PushNr(1),
            Op::PushNr(2),
            Op::PushNr(3),
            Op::PushNr(4),
            Op::PushNr(5),
            Op::DCall { func: 0, argc: 5 },
            Op::Return,
        ]),
    ])
}

#[test]
fn test_optional_and_variadic_arguments() {
    let program = mixed_program();
    let expected = |c: i64, rest: Vec<Value>| Value::list(vec![nr(1), nr(2), nr(c), Value::list(rest)]);

    assert_eq!(eval(&program, "mixed", &[nr(1), nr(2)]), expected(99, vec![]));
    assert_eq!(eval(&program, "mixed", &[nr(1), nr(2), nr(3)]), expected(3, vec![]));
    assert_eq!(
        eval(&program, "mixed", &[nr(1), nr(2), nr(3), nr(4), nr(5)]),
        expected(3, vec![nr(4), nr(5)])
    );
    assert_eq!(eval(&program, "call_mixed", &[]), expected(99, vec![]));
    assert_eq!(eval(&program, "call_mixed_all", &[]), expected(3, vec![nr(4), nr(5)]));

    let mut host = MemoryHost::new();
    let err = invoke(&program, &mut host, "mixed", &[nr(1)]).unwrap_err();
    assert_eq!(err, VmError::NotEnoughArgs("mixed".into()));
}

#[test]
fn test_argument_count_errors() {
    let program = program();
    let mut host = MemoryHost::new();
    let err = invoke(&program, &mut host, "add", &[nr(1), nr(2), nr(3)]).unwrap_err();
    assert_eq!(err, VmError::TooManyArgs("add".into()));
    let err = invoke(&program, &mut host, "add", &[nr(1)]).unwrap_err();
    assert_eq!(err, VmError::NotEnoughArgs("add".into()));

    let errors: Vec<_> = host.errors().collect();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].starts_with("E118:"));
    assert!(errors[1].starts_with("E119:"));
}

#[test]
fn test_argument_type_checked() {
    let def = FunctionDef::new("f")
        .with_params(1)
        .with_arg_types(vec![VarType::Number])
        .with_code(vec![Op::PushNr(0), Op::Return]);
    let program = Program::new(vec![def]);
    let (err, _) = expect_err(&program, &[s("x")]);
    assert_eq!(
        err,
        VmError::ArgumentType {
            index: 1,
            expected: "number",
            actual: "string"
        }
    );
}

#[test]
fn test_vararg_element_type_checked() {
    let def = FunctionDef::new("f")
        .with_varargs(Some(VarType::String))
        .with_code(vec![Op::PushNr(0), Op::Return]);
    let program = Program::new(vec![def]);
    let (err, _) = expect_err(&program, &[s("ok"), nr(2)]);
    assert!(matches!(err, VmError::ArgumentType { index: 2, .. }));
}

#[test]
fn test_deleted_function() {
    let program = program();
    program.delete_function(0).unwrap();
    let mut host = MemoryHost::new();
    let err = invoke(&program, &mut host, "call_add", &[]).unwrap_err();
    assert_eq!(err, VmError::FunctionDeleted("add".into()));
    assert_eq!(host.errors().next(), Some("E933: Function was deleted: add"));
}

#[test]
fn test_unknown_function_by_name() {
    let program = program();
    let mut host = MemoryHost::new();
    let err = invoke(&program, &mut host, "nope", &[]).unwrap_err();
    assert_eq!(err, VmError::UnknownFunction("nope".into()));
}

#[test]
fn test_builtin_failure_is_reported_once() {
    let program = program();
    let mut host = MemoryHost::new();
    let err = invoke(&program, &mut host, "fails", &[]).unwrap_err();
    assert_eq!(err, VmError::Builtin("E999: builtin failed".into()));
    assert_eq!(host.errors().collect::<Vec<_>>(), vec!["E999: builtin failed"]);
    assert_eq!(host.exceptions().error_count(), 1);
}

#[test]
fn test_builtin_arity_checked() {
    let program = single(vec![Op::BCall { func: LEN, argc: 0 }, Op::Return], 0);
    let (err, _) = expect_err(&program, &[]);
    assert_eq!(err, VmError::NotEnoughArgs("len".into()));
}

#[test]
fn test_arguments_are_not_leaked() {
    let list = Value::list(vec![nr(1), nr(2)]);
    let program = program();
    assert_eq!(eval(&program, "var", &[nr(0), list.clone(), list.clone()]), nr(200));
    assert_eq!(Rc::strong_count(list.as_list().unwrap()), 1);
}

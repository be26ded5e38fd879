use super::*;

#[test]
fn test_try_catch_finally() {
    // var result = 0
    // try | throw "X" | catch /X/ | result = 1 | finally | result += 10 | endtry
    // return result
    let program = single(
        vec![
            Op::PushNr(0),
            Op::Store(0),
            Op::Try { catch: 6, finally: 14 },
            push_s("X"),
            Op::Throw,
            Op::Jump { when: JumpWhen::Always, target: 14 },
            // catch /X/
            Op::PushExc,
            push_s("X"),
            Op::Compare {
                ty: CompareType::String,
                op: ExprOp::Match,
                ic: false,
            },
            Op::Jump { when: JumpWhen::IfFalse, target: 14 },
            Op::Catch,
            Op::PushNr(1),
            Op::Store(0),
            Op::Jump { when: JumpWhen::Always, target: 14 },
            // finally
            Op::Load(0),
            Op::PushNr(10),
            Op::OpNr(ExprOp::Add),
            Op::Store(0),
            Op::EndTry,
            Op::Load(0),
            Op::Return,
        ],
        1,
    );
    let mut host = MemoryHost::new();
    let result = invoke(&program, &mut host, "f", &[]).unwrap();
    assert_eq!(result, Completion::Returned(nr(11)));
    assert_eq!(host.exceptions().try_level(), 0);
    assert!(host.exceptions().current().is_none());
    assert!(host.exceptions().caught().is_empty());
}

#[test]
fn test_uncaught_throw_escapes_to_host() {
    let program = Program::new(vec![
        FunctionDef::new("inner").with_code(vec![push_s("boom"), Op::Throw, Op::PushNr(0), Op::Return]),
        FunctionDef::new("f").with_code(vec![Op::DCall { func: 0, argc: 0 }, Op::PushNr(1), Op::Return]),
    ]);
    let mut host = MemoryHost::new();
    let result = invoke(&program, &mut host, "f", &[]).unwrap();
    assert_eq!(result, Completion::Rethrow);
    let exceptions = host.exceptions();
    assert!(exceptions.did_throw());
    let current = exceptions.current().unwrap();
    assert_eq!(current.value, "boom");
    assert_eq!(current.kind, ExceptionKind::User);
}

#[test]
fn test_exception_unwinds_to_caller_try() {
    let program = Program::new(vec![
        FunctionDef::new("inner").with_code(vec![push_s("deep"), Op::Throw, Op::PushNr(0), Op::Return]),
        FunctionDef::new("f").with_locals(1).with_code(vec![
            Op::Try { catch: 4, finally: 0 },
            Op::DCall { func: 0, argc: 0 },
            Op::Drop,
            Op::Jump { when: JumpWhen::Always, target: 7 },
            Op::Catch,
            Op::PushExc,
            Op::Store(0),
            Op::EndTry,
            Op::Load(0),
            Op::Return,
        ]),
    ]);
    assert_eq!(eval(&program, "f", &[]), s("deep"));
}

#[test]
fn test_error_in_try_becomes_exception() {
    let program = single(
        vec![
            Op::Try { catch: 5, finally: 0 },
            Op::NewList(0),
            Op::PushNr(5),
            Op::ListIndex,
            Op::Jump { when: JumpWhen::Always, target: 8 },
            Op::Catch,
            Op::PushExc,
            Op::Store(0),
            Op::EndTry,
            Op::Load(0),
            Op::Return,
        ],
        1,
    );
    let mut host = MemoryHost::new();
    let result = invoke(&program, &mut host, "f", &[]).unwrap();
    assert_eq!(result, Completion::Returned(s("Vim:E684: list index out of range: 5")));
    // Converted errors are not displayed.
    assert_eq!(host.errors().count(), 0);
    assert_eq!(host.exceptions().error_count(), 1);
}

#[test]
fn test_error_outside_try_aborts() {
    let program = single(
        vec![Op::NewList(0), Op::PushNr(5), Op::ListIndex, Op::PushNr(1), Op::Return],
        0,
    );
    let (err, host) = expect_err(&program, &[]);
    assert_eq!(err, VmError::ListIndex(5));
    assert_eq!(host.errors().collect::<Vec<_>>(), vec!["E684: list index out of range: 5"]);
}

#[test]
fn test_throw_with_vim_prefix_is_an_error() {
    let program = single(
        vec![
            Op::Try { catch: 4, finally: 0 },
            push_s("Vim:nope"),
            Op::Throw,
            Op::Jump { when: JumpWhen::Always, target: 6 },
            Op::Catch,
            Op::PushExc,
            Op::EndTry,
            Op::Return,
        ],
        0,
    );
    assert_eq!(
        eval(&program, "f", &[]),
        s("Vim:E608: Cannot :throw exceptions with 'Vim' prefix")
    );
}

#[test]
fn test_interrupt_escapes() {
    let program = single(vec![Op::Jump { when: JumpWhen::Always, target: 0 }], 0);
    let mut host = MemoryHost::new();
    host.schedule_interrupt(3);
    let options = VmOptions {
        breakcheck_interval: 1,
        ..VmOptions::default()
    };
    let result = invoke_with(&program, &mut host, options, "f", &[]).unwrap();
    assert_eq!(result, Completion::Rethrow);
    let current = host.exceptions().current().unwrap();
    assert_eq!(current.kind, ExceptionKind::Interrupt);
    assert_eq!(current.value, "Vim:Interrupt");
}

#[test]
fn test_interrupt_caught() {
    let program = single(
        vec![
            Op::Try { catch: 2, finally: 0 },
            Op::Jump { when: JumpWhen::Always, target: 1 },
            Op::Catch,
            Op::PushExc,
            Op::EndTry,
            Op::Return,
        ],
        0,
    );
    let mut host = MemoryHost::new();
    host.schedule_interrupt(10);
    let options = VmOptions {
        breakcheck_interval: 2,
        ..VmOptions::default()
    };
    let result = invoke_with(&program, &mut host, options, "f", &[]).unwrap();
    assert_eq!(result, Completion::Returned(s("Vim:Interrupt")));
}

/// `sum(l)`: `var total = 0; for x in l | total += x | endfor; return total`
fn sum_program() -> Program {
    let def = FunctionDef::new("f").with_params(1).with_locals(3);
    let l = def.arg_slot(0);
    Program::new(vec![def.with_code(vec![
        Op::PushNr(0),
        Op::Store(0),
        Op::StoreNr { idx: 1, value: -1 },
        Op::Load(l),
        Op::For { idx: 1, end: 11 },
        Op::Store(2),
        Op::Load(0),
        Op::Load(2),
        Op::OpNr(ExprOp::Add),
        Op::Store(0),
        Op::Jump { when: JumpWhen::Always, target: 4 },
        Op::Drop,
        Op::Load(0),
        Op::Return,
    ])])
}

#[test]
fn test_for_loop() {
    let program = sum_program();
    assert_eq!(eval(&program, "f", &[Value::from(vec![1i64, 2, 3])]), nr(6));
    assert_eq!(eval(&program, "f", &[Value::list(Vec::new())]), nr(0));
    assert_eq!(eval(&program, "f", &[Value::List(None)]), nr(0));

    let (err, _) = expect_err(&program, &[nr(3)]);
    assert_eq!(err, VmError::ListRequired);
}

#[test]
fn test_return_runs_finally() {
    let program = single(
        vec![
            Op::Try { catch: 3, finally: 3 },
            Op::PushNr(1),
            Op::Return,
            push_s("yes"),
            Op::StoreG("fin".into()),
            Op::EndTry,
            Op::PushNr(2),
            Op::Return,
        ],
        0,
    );
    let mut host = MemoryHost::new();
    let result = invoke(&program, &mut host, "f", &[]).unwrap();
    assert_eq!(result, Completion::Returned(nr(1)));
    assert_eq!(host.var(Namespace::Global, "fin"), Some(s("yes")));
    assert_eq!(host.exceptions().try_level(), 0);
}

#[test]
fn test_return_inside_try_of_callee_pops_region() {
    let program = Program::new(vec![
        FunctionDef::new("inner").with_code(vec![Op::Try { catch: 3, finally: 0 }, Op::PushNr(7), Op::Return, Op::EndTry]),
        FunctionDef::new("f").with_code(vec![Op::DCall { func: 0, argc: 0 }, Op::Return]),
    ]);
    let mut host = MemoryHost::new();
    let result = invoke(&program, &mut host, "f", &[]).unwrap();
    assert_eq!(result, Completion::Returned(nr(7)));
    assert_eq!(host.exceptions().try_level(), 0);
}

#[test]
fn test_conditional_jumps() {
    let keep_if_true = |first: i64| {
        single(
            vec![
                Op::PushNr(first),
                Op::Jump { when: JumpWhen::AndKeepIfTrue, target: 3 },
                Op::PushNr(7),
                Op::Return,
            ],
            0,
        )
    };
    assert_eq!(eval(&keep_if_true(0), "f", &[]), nr(7));
    assert_eq!(eval(&keep_if_true(4), "f", &[]), nr(4));

    let keep_if_false = single(
        vec![
            Op::PushBool(false),
            Op::Jump { when: JumpWhen::AndKeepIfFalse, target: 3 },
            Op::PushNr(7),
            Op::Return,
        ],
        0,
    );
    assert_eq!(eval(&keep_if_false, "f", &[]), Value::Bool(false));

    let if_false = single(
        vec![
            push_s(""),
            Op::Jump { when: JumpWhen::IfFalse, target: 4 },
            Op::PushNr(1),
            Op::Return,
            Op::PushNr(2),
            Op::Return,
        ],
        0,
    );
    assert_eq!(eval(&if_false, "f", &[]), nr(2));
}

#[test]
fn test_exception_from_builtin_callback_is_caught_by_caller() {
    let program = Program::new(vec![
        FunctionDef::new("thrower").with_code(vec![push_s("cb"), Op::Throw, Op::PushNr(0), Op::Return]),
        FunctionDef::new("f").with_code(vec![
            Op::Try { catch: 5, finally: 0 },
            Op::PushFunc(Some("thrower".into())),
            Op::NewList(0),
            Op::BCall { func: CALL, argc: 2 },
            Op::Jump { when: JumpWhen::Always, target: 7 },
            Op::Catch,
            Op::PushExc,
            Op::EndTry,
            Op::Return,
        ]),
    ]);
    assert_eq!(eval(&program, "f", &[]), s("cb"));
}

/// Asserts that no try region, exception or caught exception is left over.
fn assert_settled(host: &mut MemoryHost) {
    let exceptions = host.exceptions();
    assert_eq!(exceptions.try_level(), 0);
    assert!(exceptions.current().is_none());
    assert!(exceptions.caught().is_empty());
    assert!(!exceptions.did_throw());
}

#[test]
fn test_return_from_catch_runs_finally_and_discards() {
    // try | throw "X" | catch | return 1 | finally | g:fin = "yes" | endtry
    let program = single(
        vec![
            Op::Try { catch: 3, finally: 6 },
            push_s("X"),
            Op::Throw,
            Op::Catch,
            Op::PushNr(1),
            Op::Return,
            push_s("yes"),
            Op::StoreG("fin".into()),
            Op::EndTry,
            Op::PushNr(0),
            Op::Return,
        ],
        0,
    );
    let mut host = MemoryHost::new();
    let result = invoke(&program, &mut host, "f", &[]).unwrap();
    assert_eq!(result, Completion::Returned(nr(1)));
    assert_eq!(host.var(Namespace::Global, "fin"), Some(s("yes")));
    assert_settled(&mut host);
}

#[test]
fn test_return_from_catch_without_finally_discards() {
    let program = single(
        vec![
            Op::Try { catch: 3, finally: 0 },
            push_s("X"),
            Op::Throw,
            Op::Catch,
            Op::PushNr(1),
            Op::Return,
            Op::EndTry,
            Op::PushNr(0),
            Op::Return,
        ],
        0,
    );
    let mut host = MemoryHost::new();
    let result = invoke(&program, &mut host, "f", &[]).unwrap();
    assert_eq!(result, Completion::Returned(nr(1)));
    assert_settled(&mut host);
}

#[test]
fn test_throw_inside_catch_propagates() {
    // try | throw "X" | catch | throw "Y" | endtry
    let program = single(
        vec![
            Op::Try { catch: 3, finally: 0 },
            push_s("X"),
            Op::Throw,
            Op::Catch,
            push_s("Y"),
            Op::Throw,
            Op::EndTry,
            Op::PushNr(0),
            Op::Return,
        ],
        0,
    );
    let mut host = MemoryHost::new();
    let result = invoke(&program, &mut host, "f", &[]).unwrap();
    assert_eq!(result, Completion::Rethrow);
    let exceptions = host.exceptions();
    assert_eq!(exceptions.current().map(|e| e.value.as_str()), Some("Y"));
    assert!(exceptions.did_throw());
    assert!(exceptions.caught().is_empty());
    assert_eq!(exceptions.try_level(), 0);
}

#[test]
fn test_throw_inside_catch_reaches_outer_try() {
    // try | try | throw "X" | catch | throw "Y" | endtry | catch | r = exception | endtry
    let program = single(
        vec![
            Op::Try { catch: 8, finally: 0 },
            Op::Try { catch: 4, finally: 0 },
            push_s("X"),
            Op::Throw,
            Op::Catch,
            push_s("Y"),
            Op::Throw,
            Op::EndTry,
            Op::Catch,
            Op::PushExc,
            Op::Store(0),
            Op::EndTry,
            Op::Load(0),
            Op::Return,
        ],
        1,
    );
    let mut host = MemoryHost::new();
    let result = invoke(&program, &mut host, "f", &[]).unwrap();
    assert_eq!(result, Completion::Returned(s("Y")));
    assert_settled(&mut host);
}

#[test]
fn test_return_inside_finally_runs_it_once() {
    // var n = 0
    // try | throw "X" | finally | n += 1 | return n | endtry
    let program = single(
        vec![
            Op::PushNr(0),
            Op::Store(0),
            Op::Try { catch: 5, finally: 5 },
            push_s("X"),
            Op::Throw,
            Op::Load(0),
            Op::PushNr(1),
            Op::OpNr(ExprOp::Add),
            Op::Store(0),
            Op::Load(0),
            Op::Return,
            Op::EndTry,
            Op::PushNr(0),
            Op::Return,
        ],
        1,
    );
    let mut host = MemoryHost::new();
    let result = invoke(&program, &mut host, "f", &[]).unwrap();
    assert_eq!(result, Completion::Returned(nr(1)));
    // Returning from the finally clause drops the pending exception.
    assert_settled(&mut host);
}

#[test]
fn test_return_inside_finally_after_return_in_try() {
    // try | return 1 | finally | return 2 | endtry
    let program = single(
        vec![
            Op::Try { catch: 3, finally: 3 },
            Op::PushNr(1),
            Op::Return,
            Op::PushNr(2),
            Op::Return,
            Op::EndTry,
            Op::PushNr(0),
            Op::Return,
        ],
        0,
    );
    let mut host = MemoryHost::new();
    let result = invoke(&program, &mut host, "f", &[]).unwrap();
    assert_eq!(result, Completion::Returned(nr(2)));
    assert_settled(&mut host);
}

#[test]
fn test_error_inside_finally_propagates() {
    // try | finally | echo g:nope | endtry
    let program = single(
        vec![
            Op::Try { catch: 1, finally: 1 },
            Op::LoadG("nope".into()),
            Op::EndTry,
            Op::PushNr(0),
            Op::Return,
        ],
        0,
    );
    let mut host = MemoryHost::new();
    let result = invoke(&program, &mut host, "f", &[]).unwrap();
    assert_eq!(result, Completion::Rethrow);
    let exceptions = host.exceptions();
    assert_eq!(
        exceptions.current().map(|e| e.value.as_str()),
        Some("Vim:E121: Undefined variable: g:nope")
    );
    assert_eq!(exceptions.current().map(|e| e.kind), Some(ExceptionKind::Error));
    assert!(exceptions.did_throw());
    assert!(exceptions.caught().is_empty());
    assert_eq!(exceptions.try_level(), 0);
}

#[test]
fn test_try_nested_in_catch() {
    // try | throw "X" | catch | try | throw "Y" | catch | r = exception | endtry | endtry
    let program = single(
        vec![
            Op::Try { catch: 3, finally: 0 },
            push_s("X"),
            Op::Throw,
            Op::Catch,
            Op::Try { catch: 7, finally: 0 },
            push_s("Y"),
            Op::Throw,
            Op::Catch,
            Op::PushExc,
            Op::Store(0),
            Op::EndTry,
            Op::EndTry,
            Op::Load(0),
            Op::Return,
        ],
        1,
    );
    let mut host = MemoryHost::new();
    let result = invoke(&program, &mut host, "f", &[]).unwrap();
    assert_eq!(result, Completion::Returned(s("Y")));
    assert_settled(&mut host);
}

#[test]
fn test_return_from_catch_of_callee() {
    let program = Program::new(vec![
        FunctionDef::new("inner").with_code(vec![
            Op::Try { catch: 3, finally: 0 },
            push_s("X"),
            Op::Throw,
            Op::Catch,
            Op::PushNr(7),
            Op::Return,
            Op::EndTry,
            Op::PushNr(0),
            Op::Return,
        ]),
        FunctionDef::new("f").with_code(vec![Op::DCall { func: 0, argc: 0 }, Op::Return]),
    ]);
    let mut host = MemoryHost::new();
    let result = invoke(&program, &mut host, "f", &[]).unwrap();
    assert_eq!(result, Completion::Returned(nr(7)));
    assert_settled(&mut host);
}

use super::*;

fn run(host: &mut MemoryHost, mut ops: Vec<Op>) -> Result<Completion, VmError> {
    ops.push(Op::Return);
    invoke(&single(ops, 0), host, "f", &[])
}

#[test]
fn test_global_and_scoped_variables() {
    let mut host = MemoryHost::new();
    let result = run(
        &mut host,
        vec![
            Op::PushNr(1),
            Op::StoreG("one".into()),
            push_s("b"),
            Op::StoreB("buf".into()),
            Op::PushNr(2),
            Op::StoreW("win".into()),
            Op::PushNr(3),
            Op::StoreT("tab".into()),
            Op::PushNr(4),
            Op::StoreS {
                sid: 7,
                name: "local".into(),
            },
            Op::LoadG("one".into()),
            Op::LoadS {
                sid: 7,
                name: "local".into(),
            },
            Op::OpNr(ExprOp::Add),
        ],
    )
    .unwrap();
    assert_eq!(result, Completion::Returned(nr(5)));
    assert_eq!(host.var(Namespace::Buffer, "buf"), Some(s("b")));
    assert_eq!(host.var(Namespace::Window, "win"), Some(nr(2)));
    assert_eq!(host.var(Namespace::Tab, "tab"), Some(nr(3)));
}

#[test]
fn test_undefined_variable() {
    let mut host = MemoryHost::new();
    let err = run(&mut host, vec![Op::LoadG("nope".into())]).unwrap_err();
    assert_eq!(err, VmError::UndefinedVariable("g:nope".into()));
    assert_eq!(host.errors().next(), Some("E121: Undefined variable: g:nope"));
}

#[test]
fn test_namespace_dict_shares_storage() {
    let mut host = MemoryHost::new();
    host.set_var(Namespace::Global, "x", nr(1));
    let dict = run(&mut host, vec![Op::LoadGDict]).unwrap().into_value().unwrap();
    assert_eq!(dict.echo_string(), "{'x': 1}");
    run(&mut host, vec![push_s("new"), push_s("y"), Op::LoadGDict, Op::StoreDict, Op::PushNr(0)]).unwrap();
    assert_eq!(host.var(Namespace::Global, "y"), Some(s("new")));
}

#[test]
fn test_vim_variables() {
    let mut host = MemoryHost::new();
    host.set_var(Namespace::Vim, "count", nr(3));
    let result = run(&mut host, vec![Op::LoadV("count".into())]).unwrap();
    assert_eq!(result, Completion::Returned(nr(3)));
}

#[test]
fn test_script_items() {
    let mut host = MemoryHost::new();
    host.set_script_items(1, vec![nr(10), s("x")]);
    let result = run(
        &mut host,
        vec![
            Op::LoadScript { sid: 1, idx: 0 },
            Op::PushNr(1),
            Op::OpNr(ExprOp::Add),
            Op::StoreScript { sid: 1, idx: 0 },
            Op::LoadScript { sid: 1, idx: 0 },
        ],
    )
    .unwrap();
    assert_eq!(result, Completion::Returned(nr(11)));
    assert_eq!(host.script_items(1), &[nr(11), s("x")]);
}

#[test]
fn test_options() {
    let mut host = MemoryHost::new()
        .with_option("tabstop", OptionValue::Number(8))
        .with_option("fileformat", OptionValue::String("unix".into()));
    let result = run(
        &mut host,
        vec![
            Op::PushNr(4),
            Op::StoreOpt("tabstop".into()),
            push_s("dos"),
            Op::StoreOpt("fileformat".into()),
            Op::LoadOpt("tabstop".into()),
        ],
    )
    .unwrap();
    assert_eq!(result, Completion::Returned(nr(4)));
    assert_eq!(host.option("fileformat"), Some(&OptionValue::String("dos".into())));

    let err = run(&mut host, vec![push_s("wide"), Op::StoreOpt("tabstop".into()), Op::PushNr(0)]).unwrap_err();
    assert_eq!(err, VmError::Host("E521: Number required after =: tabstop=wide".into()));
    let err = run(&mut host, vec![Op::LoadOpt("nosuch".into())]).unwrap_err();
    assert_eq!(err, VmError::Host("E113: Unknown option: nosuch".into()));
}

#[test]
fn test_environment_and_registers() {
    let mut host = MemoryHost::new();
    let result = run(
        &mut host,
        vec![
            push_s("/opt"),
            Op::StoreEnv("V9VM_TEST_HOME".into()),
            Op::PushNr(42),
            Op::StoreReg('@'),
            Op::LoadEnv("V9VM_TEST_HOME".into()),
            Op::LoadReg('"'),
            Op::Concat,
        ],
    )
    .unwrap();
    assert_eq!(result, Completion::Returned(s("/opt42")));
    assert_eq!(host.register('"'), Some("42"));

    let result = run(
        &mut host,
        vec![
            Op::UnletEnv {
                name: "V9VM_TEST_HOME".into(),
                force: false,
            },
            Op::LoadEnv("V9VM_TEST_HOME".into()),
        ],
    )
    .unwrap();
    assert_eq!(result, Completion::Returned(s("")));

    let result = run(&mut host, vec![Op::LoadReg('z')]).unwrap();
    assert_eq!(result, Completion::Returned(Value::String(None)));
}

#[test]
fn test_unlet() {
    let mut host = MemoryHost::new();
    host.set_var(Namespace::Global, "gone", nr(1));
    run(
        &mut host,
        vec![
            Op::Unlet {
                name: "g:gone".into(),
                force: false,
            },
            Op::PushNr(0),
        ],
    )
    .unwrap();
    assert_eq!(host.var(Namespace::Global, "gone"), None);

    let err = run(
        &mut host,
        vec![
            Op::Unlet {
                name: "g:gone".into(),
                force: false,
            },
            Op::PushNr(0),
        ],
    )
    .unwrap_err();
    assert_eq!(err, VmError::Host("E108: No such variable: \"g:gone\"".into()));

    let forced = run(
        &mut host,
        vec![
            Op::Unlet {
                name: "g:gone".into(),
                force: true,
            },
            Op::PushNr(0),
        ],
    );
    assert!(forced.is_ok());
}

#[test]
fn test_exec_command_failure_continues() {
    let mut host = MemoryHost::new().with_command_handler(Box::new(|cmd| {
        if cmd.starts_with("bad") {
            Err(format!("E492: Not an editor command: {cmd}"))
        } else {
            Ok(())
        }
    }));
    let result = run(
        &mut host,
        vec![
            Op::Exec("set nu".into()),
            push_s("bad"),
            push_s("cmd"),
            Op::ExecConcat(2),
            Op::PushNr(1),
        ],
    )
    .unwrap();
    assert_eq!(result, Completion::Returned(nr(1)));
    assert_eq!(host.commands(), &["set nu".to_owned(), "badcmd".to_owned()]);
    assert_eq!(host.errors().collect::<Vec<_>>(), vec!["E492: Not an editor command: badcmd"]);
}

#[test]
fn test_echo_family() {
    let mut host = MemoryHost::new();
    run(
        &mut host,
        vec![
            push_s("a"),
            Op::PushNr(1),
            Op::Echo {
                count: 2,
                with_white: true,
            },
            push_s("x"),
            push_s("y"),
            Op::Echo {
                count: 2,
                with_white: false,
            },
            push_s("note"),
            Op::PushNr(2),
            Op::EchoMsg(2),
            push_s("oops"),
            Op::EchoErr(1),
            push_s("echo"),
            push_s("'hi'"),
            Op::Execute(2),
            Op::PushNr(0),
        ],
    )
    .unwrap();
    assert_eq!(
        host.output(),
        &[
            OutputLine::Echo("a 1".into()),
            OutputLine::Echon("xy".into()),
            OutputLine::Message("note 2".into()),
            OutputLine::Error("oops".into()),
        ]
    );
    assert_eq!(host.commands(), &["echo 'hi'".to_owned()]);

    let err = run(&mut host, vec![Op::PushJob, Op::Execute(1), Op::PushNr(0)]).unwrap_err();
    assert_eq!(err, VmError::InvalidStringValue("job"));
}

#[test]
fn test_echoerr_inside_try_is_caught() {
    let mut host = MemoryHost::new();
    let result = run(
        &mut host,
        vec![
            Op::Try { catch: 4, finally: 0 },
            push_s("bad"),
            Op::EchoErr(1),
            Op::Jump {
                when: JumpWhen::Always,
                target: 6,
            },
            Op::Catch,
            Op::PushExc,
            Op::EndTry,
        ],
    )
    .unwrap();
    assert_eq!(result, Completion::Returned(s("Vim:bad")));
    assert_eq!(host.errors().count(), 0);
}

#[test]
fn test_new_func_and_ucall() {
    let program = Program::new(vec![
        FunctionDef::new("<lambda>7").with_code(vec![Op::PushNr(7), Op::Return]),
        FunctionDef::new("f").with_code(vec![
            Op::NewFunc {
                lambda: "<lambda>7".into(),
                global: "Seven".into(),
            },
            Op::UCall {
                name: "Seven".into(),
                argc: 0,
            },
            Op::Return,
        ]),
        FunctionDef::new("twice").with_code(vec![
            Op::NewFunc {
                lambda: "<lambda>7".into(),
                global: "Seven".into(),
            },
            Op::NewFunc {
                lambda: "<lambda>7".into(),
                global: "Seven".into(),
            },
            Op::PushNr(0),
            Op::Return,
        ]),
    ]);
    let mut host = MemoryHost::new();
    assert_eq!(invoke(&program, &mut host, "f", &[]).unwrap(), Completion::Returned(nr(7)));
    let err = invoke(&program, &mut host, "twice", &[]).unwrap_err();
    assert_eq!(
        err,
        VmError::Host("E122: Function Seven already exists, add ! to replace it".into())
    );
}

#[test]
fn test_ucall_falls_back_to_funcref_variable() {
    let program = Program::new(vec![
        FunctionDef::new("target").with_code(vec![Op::PushNr(3), Op::Return]),
        FunctionDef::new("f").with_code(vec![
            Op::UCall {
                name: "g:Ref".into(),
                argc: 0,
            },
            Op::Return,
        ]),
    ]);
    let mut host = MemoryHost::new();
    host.set_var(Namespace::Global, "Ref", Value::func("target"));
    assert_eq!(invoke(&program, &mut host, "f", &[]).unwrap(), Completion::Returned(nr(3)));

    let err = invoke(
        &Program::new(vec![FunctionDef::new("f").with_code(vec![
            Op::UCall {
                name: "Missing".into(),
                argc: 0,
            },
            Op::Return,
        ])]),
        &mut host,
        "f",
        &[],
    )
    .unwrap_err();
    assert_eq!(err, VmError::UnknownFunction("Missing".into()));
}

#[test]
fn test_error_sets_source_line() {
    let program = Program::new(vec![FunctionDef::new("f").with_instrs(vec![
        Op::PushNr(1).at(1),
        Op::LoadG("missing".into()).at(3),
        Op::Return.at(4),
    ])]);
    let mut host = MemoryHost::new();
    invoke(&program, &mut host, "f", &[]).unwrap_err();
    assert_eq!(host.last_source_line(), 3);
}

use std::fmt::Write as _;

use crate::val::format_float;

use super::{BuiltinTable, FunctionId, JumpWhen, Op, Program, VmError};

/// Render the instructions of `func`, one per line, with the source lines
/// they were compiled from interleaved.
///
/// With `builtins` the targets of builtin calls are shown by name.
pub fn disassemble(program: &Program, func: FunctionId, builtins: Option<&BuiltinTable>) -> Result<String, VmError> {
    let def = program.func(func)?;
    let mut out = String::new();
    let _ = writeln!(out, "{}", def.name);

    let mut line_idx = 0usize;
    for (current, instr) in def.instrs.iter().enumerate() {
        let mut printed_source = false;
        while line_idx < instr.lnum as usize && line_idx < def.lines.len() {
            if current > 0 && !printed_source {
                out.push('\n');
            }
            printed_source = true;
            let _ = writeln!(out, "{}", def.lines[line_idx]);
            line_idx += 1;
        }
        let _ = writeln!(out, "{current:4} {}", describe(program, builtins, &instr.op));
    }
    Ok(out)
}

fn var_name(prefix: &str, idx: i32) -> String {
    if idx < 0 {
        format!("{prefix}ARG[{idx}]")
    } else {
        format!("{prefix}[{idx}]")
    }
}

fn func_name(program: &Program, func: FunctionId) -> String {
    program
        .func(func)
        .map(|f| f.name.clone())
        .unwrap_or_else(|_| format!("<invalid {func}>"))
}

fn describe(program: &Program, builtins: Option<&BuiltinTable>, op: &Op) -> String {
    match op {
        Op::Exec(cmd) => format!("EXEC {cmd}"),
        Op::ExecConcat(n) => format!("EXECCONCAT {n}"),
        Op::Echo { count, with_white } => {
            format!("{} {count}", if *with_white { "ECHO" } else { "ECHON" })
        }
        Op::Execute(n) => format!("EXECUTE {n}"),
        Op::EchoMsg(n) => format!("ECHOMSG {n}"),
        Op::EchoErr(n) => format!("ECHOERR {n}"),

        Op::Load(idx) => format!("LOAD {}", var_name("$", *idx)),
        Op::LoadOuter(idx) => format!("LOADOUTER {}", var_name("$", *idx)),
        Op::LoadV(name) => format!("LOADV v:{name}"),
        Op::LoadScript { sid, idx } => format!("LOADSCRIPT [{idx}] from script {sid}"),
        Op::LoadS { sid, name } => format!("LOADS s:{name} from script {sid}"),
        Op::LoadG(name) => format!("LOADG g:{name}"),
        Op::LoadB(name) => format!("LOADB b:{name}"),
        Op::LoadW(name) => format!("LOADW w:{name}"),
        Op::LoadT(name) => format!("LOADT t:{name}"),
        Op::LoadGDict => "LOAD g:".into(),
        Op::LoadBDict => "LOAD b:".into(),
        Op::LoadWDict => "LOAD w:".into(),
        Op::LoadTDict => "LOAD t:".into(),
        Op::LoadOpt(name) => format!("LOADOPT &{name}"),
        Op::LoadEnv(name) => format!("LOADENV ${name}"),
        Op::LoadReg(reg) => format!("LOADREG @{reg}"),

        Op::Store(idx) => format!("STORE {}", var_name("$", *idx)),
        Op::StoreOuter(idx) => format!("STOREOUTER {}", var_name("$", *idx)),
        Op::StoreV(name) => format!("STOREV v:{name}"),
        Op::StoreScript { sid, idx } => format!("STORESCRIPT [{idx}] in script {sid}"),
        Op::StoreS { sid, name } => format!("STORES s:{name} in script {sid}"),
        Op::StoreG(name) => format!("STOREG g:{name}"),
        Op::StoreB(name) => format!("STOREB b:{name}"),
        Op::StoreW(name) => format!("STOREW w:{name}"),
        Op::StoreT(name) => format!("STORET t:{name}"),
        Op::StoreOpt(name) => format!("STOREOPT &{name}"),
        Op::StoreEnv(name) => format!("STOREENV ${name}"),
        Op::StoreReg(reg) => format!("STOREREG @{reg}"),
        Op::StoreNr { idx, value } => format!("STORE {value} in {}", var_name("$", *idx)),
        Op::StoreList => "STORELIST".into(),
        Op::StoreDict => "STOREDICT".into(),
        Op::Unlet { name, force } => format!("UNLET{} {name}", if *force { "!" } else { "" }),
        Op::UnletEnv { name, force } => format!("UNLETENV{} ${name}", if *force { "!" } else { "" }),

        Op::PushNr(n) => format!("PUSHNR {n}"),
        Op::PushBool(b) => format!("PUSH {}", if *b { "v:true" } else { "v:false" }),
        Op::PushSpec(s) => format!("PUSH {}", crate::val::Value::Special(*s).echo_string()),
        Op::PushF(f) => format!("PUSHF {}", format_float(*f)),
        Op::PushS(s) => format!("PUSHS \"{}\"", s.as_deref().unwrap_or("")),
        Op::PushBlob(bytes) => format!("PUSHBLOB {}", crate::val::Value::blob(bytes.clone()).echo_string()),
        Op::PushFunc(name) => format!("PUSHFUNC \"{}\"", name.as_deref().unwrap_or("[none]")),
        Op::PushChannel => "PUSHCHANNEL 0".into(),
        Op::PushJob => "PUSHJOB \"no process\"".into(),
        Op::PushExc => "PUSH v:exception".into(),

        Op::NewList(n) => format!("NEWLIST size {n}"),
        Op::NewDict(n) => format!("NEWDICT size {n}"),
        Op::AddList => "ADDLIST".into(),
        Op::AddBlob => "ADDBLOB".into(),
        Op::Concat => "CONCAT".into(),
        Op::StrIndex => "STRINDEX".into(),
        Op::ListIndex => "LISTINDEX".into(),
        Op::Slice(n) => format!("SLICE {n}"),
        Op::GetItem(n) => format!("ITEM {n}"),
        Op::Member => "MEMBER".into(),
        Op::StringMember(key) => format!("MEMBER {key}"),

        Op::DCall { func, argc } => {
            format!("DCALL {}(argc {argc})", func_name(program, *func))
        }
        Op::BCall { func, argc } => {
            let name = builtins
                .and_then(|b| b.get(*func))
                .map(|b| b.name.clone())
                .unwrap_or_else(|| format!("#{func}"));
            format!("BCALL {name}(argc {argc})")
        }
        Op::PCall { argc, top } => format!("PCALL{} (argc {argc})", if *top { " top" } else { "" }),
        Op::PCallEnd => "PCALL end".into(),
        Op::UCall { name, argc } => format!("UCALL {name}(argc {argc})"),
        Op::Return => "RETURN".into(),
        Op::FuncRef { func, var_idx } => {
            format!("FUNCREF {} $[{var_idx}]", func_name(program, *func))
        }
        Op::NewFunc { lambda, global } => format!("NEWFUNC {lambda} {global}"),

        Op::Jump { when, target } => {
            let when = match when {
                JumpWhen::Always => "JUMP_ALWAYS",
                JumpWhen::IfFalse => "JUMP_IF_FALSE",
                JumpWhen::AndKeepIfTrue => "JUMP_AND_KEEP_IF_TRUE",
                JumpWhen::AndKeepIfFalse => "JUMP_AND_KEEP_IF_FALSE",
            };
            format!("{when} -> {target}")
        }
        Op::For { idx, end } => format!("FOR {} -> {end}", var_name("$", *idx)),
        Op::Try { catch, finally } => format!("TRY catch -> {catch}, finally -> {finally}"),
        Op::Catch => "CATCH".into(),
        Op::EndTry => "ENDTRY".into(),
        Op::Throw => "THROW".into(),

        Op::OpNr(op) => format!("OPNR {op}"),
        Op::OpFloat(op) => format!("OPFLOAT {op}"),
        Op::OpAny(op) => format!("OPANY {op}"),
        Op::Compare { ty, op, ic } => {
            format!("COMPARE{} {op}{}", format!("{ty:?}").to_uppercase(), if *ic { "?" } else { "" })
        }
        Op::NegateNr => "NEGATENR".into(),

        Op::CheckNr => "CHECKNR".into(),
        Op::CheckType { ty, off } => format!("CHECKTYPE {ty} stack[{off}]"),
        Op::CheckLen { min, more_ok } => {
            format!("CHECKLEN {}{min}", if *more_ok { ">= " } else { "" })
        }
        Op::ToBool { invert } => (if *invert { "INVERT (!val)" } else { "2BOOL (!!val)" }).into(),
        Op::ToString { off, any } => {
            format!("{} stack[{off}]", if *any { "2STRING_ANY" } else { "2STRING" })
        }

        Op::Shuffle { item, up } => format!("SHUFFLE {item} up {up}"),
        Op::Drop => "DROP".into(),
    }
}

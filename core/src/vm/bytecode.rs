use std::cell::{Cell, RefCell};

use serde::{Deserialize, Serialize};

use crate::op::ExprOp;
use crate::util::fast_map::{FastHashMap, fast_hash_map_with_capacity};
use crate::val::{Special, VarType};

use super::{STACK_FRAME_SIZE, VmError};

/// Index of a compiled function in its [`Program`].
pub type FunctionId = usize;

/// Condition attached to a `Jump`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JumpWhen {
    Always,
    /// Pop the value and jump when it is falsy.
    IfFalse,
    /// Jump keeping the value when truthy, otherwise pop it.
    AndKeepIfTrue,
    /// Jump keeping the value when falsy, otherwise pop it.
    AndKeepIfFalse,
}

/// Static operand type of a `Compare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareType {
    Bool,
    Special,
    Number,
    Float,
    String,
    Blob,
    List,
    Dict,
    Func,
    Any,
}

/// One instruction. Local variable operands are frame-relative: `>= 0` are
/// locals, negative values address arguments (see [`FunctionDef::arg_slot`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    // host commands and output
    Exec(String),
    ExecConcat(usize),
    Echo { count: usize, with_white: bool },
    Execute(usize),
    EchoMsg(usize),
    EchoErr(usize),

    // loads
    Load(i32),
    LoadOuter(i32),
    LoadV(String),
    LoadScript { sid: usize, idx: usize },
    LoadS { sid: usize, name: String },
    LoadG(String),
    LoadB(String),
    LoadW(String),
    LoadT(String),
    LoadGDict,
    LoadBDict,
    LoadWDict,
    LoadTDict,
    LoadOpt(String),
    LoadEnv(String),
    LoadReg(char),

    // stores
    Store(i32),
    StoreOuter(i32),
    StoreV(String),
    StoreScript { sid: usize, idx: usize },
    StoreS { sid: usize, name: String },
    StoreG(String),
    StoreB(String),
    StoreW(String),
    StoreT(String),
    StoreOpt(String),
    StoreEnv(String),
    StoreReg(char),
    StoreNr { idx: i32, value: i64 },
    StoreList,
    StoreDict,
    Unlet { name: String, force: bool },
    UnletEnv { name: String, force: bool },

    // constants
    PushNr(i64),
    PushBool(bool),
    PushSpec(Special),
    PushF(f64),
    PushS(Option<String>),
    PushBlob(Vec<u8>),
    PushFunc(Option<String>),
    PushChannel,
    PushJob,
    PushExc,

    // containers
    NewList(usize),
    NewDict(usize),
    AddList,
    AddBlob,
    Concat,
    StrIndex,
    ListIndex,
    Slice(i64),
    GetItem(usize),
    Member,
    StringMember(String),

    // calls
    DCall { func: FunctionId, argc: usize },
    BCall { func: usize, argc: usize },
    PCall { argc: usize, top: bool },
    PCallEnd,
    UCall { name: String, argc: usize },
    Return,
    FuncRef { func: FunctionId, var_idx: usize },
    NewFunc { lambda: String, global: String },

    // control flow
    Jump { when: JumpWhen, target: usize },
    For { idx: i32, end: usize },
    Try { catch: usize, finally: usize },
    Catch,
    EndTry,
    Throw,

    // arithmetic and comparison
    OpNr(ExprOp),
    OpFloat(ExprOp),
    OpAny(ExprOp),
    Compare { ty: CompareType, op: ExprOp, ic: bool },
    NegateNr,

    // checks and coercion
    CheckNr,
    CheckType { ty: VarType, off: i32 },
    CheckLen { min: usize, more_ok: bool },
    ToBool { invert: bool },
    ToString { off: i32, any: bool },

    // stack shuffling
    Shuffle { item: usize, up: usize },
    Drop,
}

impl Op {
    /// Attach a source line number.
    pub fn at(self, lnum: u32) -> Instr {
        Instr { op: self, lnum }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instr {
    pub op: Op,
    /// 1-based source line, 0 when unknown.
    #[serde(default)]
    pub lnum: u32,
}

impl From<Op> for Instr {
    fn from(op: Op) -> Self {
        Instr { op, lnum: 0 }
    }
}

/// A compiled function as produced by the compiler.
///
/// `default_entries` holds one instruction index per optional parameter plus
/// the index where the body starts; it is empty when there are no optional
/// parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    /// Fixed plus optional parameters, not counting the variadic one.
    #[serde(default)]
    pub params: usize,
    #[serde(default)]
    pub default_entries: Vec<usize>,
    #[serde(default)]
    pub varargs: bool,
    /// Declared parameter types; empty when unchecked.
    #[serde(default)]
    pub arg_types: Vec<VarType>,
    /// Element type of the variadic list.
    #[serde(default)]
    pub vararg_type: Option<VarType>,
    #[serde(default)]
    pub locals: usize,
    #[serde(default)]
    pub closures: usize,
    /// Created through `FuncRef`; reads its creator's variables with `LoadOuter`.
    #[serde(default)]
    pub is_closure: bool,
    pub instrs: Vec<Instr>,
    #[serde(default)]
    pub lines: Vec<String>,
    #[serde(skip)]
    deleted: Cell<bool>,
}

impl FunctionDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: 0,
            default_entries: Vec::new(),
            varargs: false,
            arg_types: Vec::new(),
            vararg_type: None,
            locals: 0,
            closures: 0,
            is_closure: false,
            instrs: Vec::new(),
            lines: Vec::new(),
            deleted: Cell::new(false),
        }
    }

    pub fn with_params(mut self, params: usize) -> Self {
        self.params = params;
        self
    }

    pub fn with_defaults(mut self, entries: Vec<usize>) -> Self {
        self.default_entries = entries;
        self
    }

    pub fn with_varargs(mut self, element: Option<VarType>) -> Self {
        self.varargs = true;
        self.vararg_type = element;
        self
    }

    pub fn with_arg_types(mut self, types: Vec<VarType>) -> Self {
        self.arg_types = types;
        self
    }

    pub fn with_locals(mut self, locals: usize) -> Self {
        self.locals = locals;
        self
    }

    pub fn with_closures(mut self, closures: usize) -> Self {
        self.closures = closures;
        self
    }

    pub fn closure(mut self) -> Self {
        self.is_closure = true;
        self
    }

    pub fn with_code(mut self, ops: Vec<Op>) -> Self {
        self.instrs = ops.into_iter().map(Instr::from).collect();
        self
    }

    pub fn with_instrs(mut self, instrs: Vec<Instr>) -> Self {
        self.instrs = instrs;
        self
    }

    pub fn with_lines(mut self, lines: Vec<String>) -> Self {
        self.lines = lines;
        self
    }

    pub fn optional_count(&self) -> usize {
        self.default_entries.len().saturating_sub(1)
    }

    pub fn required_count(&self) -> usize {
        self.params.saturating_sub(self.optional_count())
    }

    /// Argument slots in a frame, the variadic list included.
    pub fn arg_count(&self) -> usize {
        self.params + self.varargs as usize
    }

    /// Frame-relative operand addressing argument `i`.
    pub fn arg_slot(&self, i: usize) -> i32 {
        i as i32 - self.arg_count() as i32 - STACK_FRAME_SIZE as i32
    }

    /// Instruction to start at when called with `argc` arguments: the default
    /// expression of the first missing optional parameter, or the body.
    pub fn entry_index(&self, argc: usize) -> usize {
        if self.default_entries.is_empty() {
            return 0;
        }
        let missing = self.params.saturating_sub(argc).min(self.optional_count());
        self.default_entries[self.optional_count() - missing]
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.get()
    }
}

/// On-disk form of a program.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramFile {
    pub functions: Vec<FunctionDef>,
}

/// The compiled function table. Descriptors are immutable; the name table
/// can grow through `NewFunc` and functions can be marked deleted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "ProgramFile", into = "ProgramFile")]
pub struct Program {
    functions: Vec<FunctionDef>,
    names: RefCell<FastHashMap<String, FunctionId>>,
}

impl Program {
    pub fn new(functions: Vec<FunctionDef>) -> Self {
        let mut names = fast_hash_map_with_capacity(functions.len());
        for (id, f) in functions.iter().enumerate() {
            names.insert(f.name.clone(), id);
        }
        Self {
            functions,
            names: RefCell::new(names),
        }
    }

    pub fn functions(&self) -> &[FunctionDef] {
        &self.functions
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn func(&self, id: FunctionId) -> Result<&FunctionDef, VmError> {
        self.functions
            .get(id)
            .ok_or_else(|| VmError::Internal(format!("function index {id} out of range")))
    }

    pub fn lookup(&self, name: &str) -> Option<FunctionId> {
        self.names.borrow().get(name).copied()
    }

    /// Make `target` callable under `name` too.
    pub fn define_alias(&self, name: impl Into<String>, target: FunctionId) {
        self.names.borrow_mut().insert(name.into(), target);
    }

    pub fn delete_function(&self, id: FunctionId) -> Result<(), VmError> {
        self.func(id)?.deleted.set(true);
        Ok(())
    }
}

impl From<ProgramFile> for Program {
    fn from(file: ProgramFile) -> Self {
        Program::new(file.functions)
    }
}

impl From<Program> for ProgramFile {
    fn from(program: Program) -> Self {
        ProgramFile {
            functions: program.functions,
        }
    }
}

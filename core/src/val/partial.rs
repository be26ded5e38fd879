use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

use crate::vm::{FunctionId, STACK_FRAME_SIZE, VmError};

use super::Value;

/// Backing storage of an execution stack or of a captured snapshot.
pub type StackCell = RefCell<Vec<Value>>;

/// Shared snapshot of a returned call's arguments and locals, kept alive by
/// the partials that escaped from that call.
pub type FuncStack = Rc<StackCell>;

pub type PartialRef = Rc<Partial>;

/// Where a closure finds the variables of the function that created it.
#[derive(Clone)]
pub enum OuterEnv {
    /// The creating call is still running: its frame lives on an execution stack.
    Live { stack: Weak<StackCell>, frame: usize },
    /// The creating call returned and its variables were moved into a snapshot.
    Snapshot { stack: FuncStack, frame: usize },
}

impl OuterEnv {
    pub fn frame(&self) -> usize {
        match self {
            OuterEnv::Live { frame, .. } | OuterEnv::Snapshot { frame, .. } => *frame,
        }
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self, OuterEnv::Snapshot { .. })
    }

    fn cells(&self) -> Result<Rc<StackCell>, VmError> {
        match self {
            OuterEnv::Live { stack, .. } => stack
                .upgrade()
                .ok_or_else(|| VmError::Internal("closure context is no longer available".into())),
            OuterEnv::Snapshot { stack, .. } => Ok(Rc::clone(stack)),
        }
    }

    fn slot(&self, idx: i32, len: usize) -> Result<usize, VmError> {
        let slot = self.frame() as isize + STACK_FRAME_SIZE as isize + idx as isize;
        if slot < 0 || slot as usize >= len {
            return Err(VmError::Internal(format!("outer variable {idx} out of range")));
        }
        Ok(slot as usize)
    }

    /// Copy of the outer variable at frame-relative `idx`.
    pub fn load(&self, idx: i32) -> Result<Value, VmError> {
        let cells = self.cells()?;
        let cells = cells.borrow();
        let slot = self.slot(idx, cells.len())?;
        Ok(cells[slot].clone())
    }

    /// Replace the outer variable at `idx`, returning the previous value.
    pub fn store(&self, idx: i32, value: Value) -> Result<Value, VmError> {
        let cells = self.cells()?;
        let mut cells = cells.borrow_mut();
        let slot = self.slot(idx, cells.len())?;
        Ok(std::mem::replace(&mut cells[slot], value))
    }
}

impl fmt::Debug for OuterEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OuterEnv::Live { stack, frame } => f
                .debug_struct("Live")
                .field("frame", frame)
                .field("alive", &(stack.strong_count() > 0))
                .finish(),
            OuterEnv::Snapshot { stack, frame } => f
                .debug_struct("Snapshot")
                .field("frame", frame)
                .field("len", &stack.borrow().len())
                .finish(),
        }
    }
}

/// A function value with bound leading arguments and an optional captured
/// environment.
pub struct Partial {
    name: String,
    func: Option<FunctionId>,
    args: Vec<Value>,
    outer: RefCell<Option<OuterEnv>>,
}

impl Partial {
    /// `func` is the compiled function index, `None` when the target is only
    /// known by name (a builtin or a function resolved at call time).
    pub fn new(name: impl Into<String>, func: Option<FunctionId>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            func,
            args,
            outer: RefCell::new(None),
        }
    }

    pub fn with_outer(self, outer: OuterEnv) -> Self {
        *self.outer.borrow_mut() = Some(outer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn func(&self) -> Option<FunctionId> {
        self.func
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn outer(&self) -> Option<OuterEnv> {
        self.outer.borrow().clone()
    }

    pub(crate) fn set_outer(&self, outer: Option<OuterEnv>) {
        *self.outer.borrow_mut() = outer;
    }

    /// The snapshot this partial keeps alive, if its creator already returned.
    pub fn snapshot(&self) -> Option<FuncStack> {
        match &*self.outer.borrow() {
            Some(OuterEnv::Snapshot { stack, .. }) => Some(Rc::clone(stack)),
            _ => None,
        }
    }
}

/// Partials compare by identity.
impl PartialEq for Partial {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl fmt::Debug for Partial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partial")
            .field("name", &self.name)
            .field("func", &self.func)
            .field("args", &self.args.len())
            .field("outer", &*self.outer.borrow())
            .finish()
    }
}

//! Bytecode VM subsystem
//!
//! This module contains the instruction set, the exception bookkeeping shared
//! with the host, and the stack machine that executes compiled functions.

mod builtins;
mod bytecode;
mod context;
mod disasm;
mod error;
mod exception;
mod host;
mod stack;
#[allow(clippy::module_inception)]
mod vm;

pub use builtins::{Builtin, BuiltinFn, BuiltinTable};
pub use bytecode::*;
pub use context::{CallContext, VmOptions};
pub use disasm::disassemble;
pub use error::VmError;
pub use exception::{Exception, ExceptionKind, ExceptionState};
pub use host::{EchoKind, Host, Namespace, OptionValue};
pub use stack::{ExecStack, STACK_FRAME_SIZE};
pub use vm::{Completion, Vm};

#[cfg(test)]
mod vm_test;

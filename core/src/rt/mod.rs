//! Host implementations for running compiled code outside an editor.

mod memory_host;

pub use memory_host::{CommandHandler, MemoryHost, OutputLine};

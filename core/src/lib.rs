pub mod op;
pub mod rt;
pub mod util;
pub mod val;

// Stack machine executing compiled functions
pub mod vm;

use std::fmt;

use anyhow::Result;

use crate::val::Value;

use super::ExceptionState;

/// Variable namespace reachable from compiled code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Global,
    Buffer,
    Window,
    Tab,
    /// Legacy script-local variables of the script with this id.
    Script(usize),
    Vim,
}

impl Namespace {
    pub fn prefix(self) -> char {
        match self {
            Namespace::Global => 'g',
            Namespace::Buffer => 'b',
            Namespace::Window => 'w',
            Namespace::Tab => 't',
            Namespace::Script(_) => 's',
            Namespace::Vim => 'v',
        }
    }

    /// Parse the namespace prefix of `g:name` style names.
    pub fn split(qualified: &str) -> Option<(Namespace, &str)> {
        let (prefix, name) = qualified.split_once(':')?;
        let ns = match prefix {
            "g" => Namespace::Global,
            "b" => Namespace::Buffer,
            "w" => Namespace::Window,
            "t" => Namespace::Tab,
            "s" => Namespace::Script(0),
            "v" => Namespace::Vim,
            _ => return None,
        };
        Some((ns, name))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.prefix())
    }
}

/// Value assigned to an option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Number(i64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoKind {
    /// `:echo`: items separated by spaces, starts a new line.
    Echo,
    /// `:echon`: items concatenated, no new line.
    Echon,
    /// `:echomsg`: goes to the message history.
    Message,
}

/// Everything the VM needs from the application embedding it.
///
/// Fallible operations return `anyhow` errors whose message is shown to the
/// user verbatim; the VM turns them into catchable errors.
pub trait Host {
    fn exceptions(&mut self) -> &mut ExceptionState;

    fn lookup_var(&mut self, ns: Namespace, name: &str) -> Option<Value>;
    fn store_var(&mut self, ns: Namespace, name: &str, value: Value) -> Result<()>;
    /// The whole namespace as a dict value sharing the host's storage.
    fn namespace_dict(&mut self, ns: Namespace) -> Value;
    /// Remove a variable given with its namespace prefix (`g:name`).
    fn unlet_var(&mut self, qualified: &str, force: bool) -> Result<()>;

    /// Vim9 script-level variable `idx` of script `sid`.
    fn load_script_item(&mut self, sid: usize, idx: usize) -> Result<Value>;
    fn store_script_item(&mut self, sid: usize, idx: usize, value: Value) -> Result<()>;

    fn get_option(&mut self, name: &str) -> Result<Value>;
    /// Returns the error message when the value is rejected.
    fn set_option(&mut self, name: &str, value: OptionValue) -> Option<String>;

    fn get_env(&mut self, name: &str) -> Option<String>;
    fn set_env(&mut self, name: &str, value: &str);
    fn unset_env(&mut self, name: &str);

    fn get_register(&mut self, reg: char) -> Option<String>;
    fn set_register(&mut self, reg: char, value: &str);

    fn execute_command(&mut self, cmd: &str) -> Result<()>;
    fn echo(&mut self, text: &str, kind: EchoKind);
    /// Show an error message that was not turned into an exception.
    fn display_error(&mut self, msg: &str);
    /// Whether `text` matches `pattern`; `ic` ignores case.
    fn pattern_match(&mut self, text: &str, pattern: &str, ic: bool) -> Result<bool>;

    /// Line of the instruction being executed, for error context.
    fn set_source_line(&mut self, _lnum: u32) {}
    /// Called periodically so the host can process pending input.
    fn breakcheck(&mut self) {}
    /// Returns and clears a pending user interrupt.
    fn take_interrupt(&mut self) -> bool {
        false
    }
}

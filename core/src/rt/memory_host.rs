use std::{cell::RefCell, rc::Rc};

use anyhow::{Result, anyhow, bail};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::val::{DictMap, DictRef, Value};
use crate::vm::{EchoKind, ExceptionState, Host, Namespace, OptionValue};

static VAR_NAME: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_#]*$").ok());

/// Runs host commands on behalf of [`MemoryHost`]; `Err` carries the error
/// message to report.
pub type CommandHandler = Box<dyn FnMut(&str) -> std::result::Result<(), String>>;

/// Something the VM asked the host to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Echo(String),
    Echon(String),
    Message(String),
    Error(String),
}

impl OutputLine {
    pub fn text(&self) -> &str {
        match self {
            OutputLine::Echo(s) | OutputLine::Echon(s) | OutputLine::Message(s) | OutputLine::Error(s) => s,
        }
    }
}

/// A [`Host`] keeping every namespace, option, environment variable and
/// register in memory. Output is recorded and optionally forwarded to
/// stdout/stderr.
pub struct MemoryHost {
    exceptions: ExceptionState,
    globals: DictRef,
    buffer: DictRef,
    window: DictRef,
    tab: DictRef,
    vim: DictRef,
    script_vars: FastHashMap<usize, DictRef>,
    script_items: FastHashMap<usize, Vec<Value>>,
    options: FastHashMap<String, OptionValue>,
    /// `None` marks a variable removed with `unlet`.
    env: FastHashMap<String, Option<String>>,
    registers: FastHashMap<char, String>,
    output: Vec<OutputLine>,
    commands: Vec<String>,
    command_handler: Option<CommandHandler>,
    regex_cache: FastHashMap<(String, bool), Regex>,
    forward_output: bool,
    interrupt_after: Option<u64>,
    interrupt_pending: bool,
    breakchecks: u64,
    source_line: u32,
}

fn new_dict() -> DictRef {
    Rc::new(RefCell::new(DictMap::default()))
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        Self {
            exceptions: ExceptionState::new(),
            globals: new_dict(),
            buffer: new_dict(),
            window: new_dict(),
            tab: new_dict(),
            vim: new_dict(),
            script_vars: fast_hash_map_new(),
            script_items: fast_hash_map_new(),
            options: fast_hash_map_new(),
            env: fast_hash_map_new(),
            registers: fast_hash_map_new(),
            output: Vec::new(),
            commands: Vec::new(),
            command_handler: None,
            regex_cache: fast_hash_map_new(),
            forward_output: false,
            interrupt_after: None,
            interrupt_pending: false,
            breakchecks: 0,
            source_line: 0,
        }
    }

    /// Print output and errors as they happen, in addition to recording them.
    pub fn forward_output(mut self, on: bool) -> Self {
        self.forward_output = on;
        self
    }

    /// Declare option `name` with its default value; the kind of the default
    /// decides which values the option accepts.
    pub fn with_option(mut self, name: &str, default: OptionValue) -> Self {
        self.options.insert(name.to_owned(), default);
        self
    }

    pub fn with_command_handler(mut self, handler: CommandHandler) -> Self {
        self.command_handler = Some(handler);
        self
    }

    /// Raise a user interrupt at the `after`-th breakcheck from now.
    pub fn schedule_interrupt(&mut self, after: u64) {
        self.interrupt_after = Some(self.breakchecks + after.max(1));
    }

    fn dict_for(&mut self, ns: Namespace) -> DictRef {
        match ns {
            Namespace::Global => Rc::clone(&self.globals),
            Namespace::Buffer => Rc::clone(&self.buffer),
            Namespace::Window => Rc::clone(&self.window),
            Namespace::Tab => Rc::clone(&self.tab),
            Namespace::Vim => Rc::clone(&self.vim),
            Namespace::Script(sid) => Rc::clone(self.script_vars.entry(sid).or_insert_with(new_dict)),
        }
    }

    pub fn var(&mut self, ns: Namespace, name: &str) -> Option<Value> {
        self.dict_for(ns).borrow().get(name).cloned()
    }

    pub fn set_var(&mut self, ns: Namespace, name: &str, value: Value) {
        let old = self.dict_for(ns).borrow_mut().insert(name.to_owned(), value);
        drop(old);
    }

    /// Define the Vim9 script-level variables of script `sid`.
    pub fn set_script_items(&mut self, sid: usize, items: Vec<Value>) {
        self.script_items.insert(sid, items);
    }

    pub fn script_items(&self, sid: usize) -> &[Value] {
        self.script_items.get(&sid).map_or(&[], Vec::as_slice)
    }

    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        self.options.get(name)
    }

    pub fn register(&self, reg: char) -> Option<&str> {
        self.registers.get(&reg).map(String::as_str)
    }

    pub fn output(&self) -> &[OutputLine] {
        &self.output
    }

    /// Displayed error messages, oldest first.
    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.output.iter().filter_map(|line| match line {
            OutputLine::Error(msg) => Some(msg.as_str()),
            _ => None,
        })
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn last_source_line(&self) -> u32 {
        self.source_line
    }

    fn record(&mut self, line: OutputLine) {
        if self.forward_output {
            match &line {
                OutputLine::Echon(s) => print!("{s}"),
                OutputLine::Error(s) => eprintln!("{s}"),
                other => println!("{}", other.text()),
            }
        }
        self.output.push(line);
    }
}

impl Host for MemoryHost {
    fn exceptions(&mut self) -> &mut ExceptionState {
        &mut self.exceptions
    }

    fn lookup_var(&mut self, ns: Namespace, name: &str) -> Option<Value> {
        self.var(ns, name)
    }

    fn store_var(&mut self, ns: Namespace, name: &str, value: Value) -> Result<()> {
        if VAR_NAME.as_ref().is_some_and(|re| !re.is_match(name)) {
            bail!("E461: Illegal variable name: {ns}{name}");
        }
        self.set_var(ns, name, value);
        Ok(())
    }

    fn namespace_dict(&mut self, ns: Namespace) -> Value {
        Value::Dict(Some(self.dict_for(ns)))
    }

    fn unlet_var(&mut self, qualified: &str, force: bool) -> Result<()> {
        let (ns, name) = Namespace::split(qualified).unwrap_or((Namespace::Global, qualified));
        let removed = self.dict_for(ns).borrow_mut().shift_remove(name);
        if removed.is_none() && !force {
            bail!("E108: No such variable: \"{qualified}\"");
        }
        Ok(())
    }

    fn load_script_item(&mut self, sid: usize, idx: usize) -> Result<Value> {
        self.script_items
            .get(&sid)
            .and_then(|items| items.get(idx))
            .cloned()
            .ok_or_else(|| anyhow!("E1050: script {sid} has no item {idx}"))
    }

    fn store_script_item(&mut self, sid: usize, idx: usize, value: Value) -> Result<()> {
        let slot = self
            .script_items
            .get_mut(&sid)
            .and_then(|items| items.get_mut(idx))
            .ok_or_else(|| anyhow!("E1050: script {sid} has no item {idx}"))?;
        *slot = value;
        Ok(())
    }

    fn get_option(&mut self, name: &str) -> Result<Value> {
        match self.options.get(name) {
            Some(OptionValue::Number(n)) => Ok(Value::Number(*n)),
            Some(OptionValue::String(s)) => Ok(Value::string(s.clone())),
            None => bail!("E113: Unknown option: {name}"),
        }
    }

    fn set_option(&mut self, name: &str, value: OptionValue) -> Option<String> {
        let Some(current) = self.options.get_mut(name) else {
            return Some(format!("E355: Unknown option: {name}"));
        };
        match value {
            OptionValue::String(s) if matches!(current, OptionValue::Number(_)) => {
                return Some(format!("E521: Number required after =: {name}={s}"));
            }
            OptionValue::Number(n) if matches!(current, OptionValue::String(_)) => {
                *current = OptionValue::String(n.to_string());
            }
            value => *current = value,
        }
        None
    }

    fn get_env(&mut self, name: &str) -> Option<String> {
        match self.env.get(name) {
            Some(value) => value.clone(),
            None => std::env::var(name).ok(),
        }
    }

    fn set_env(&mut self, name: &str, value: &str) {
        self.env.insert(name.to_owned(), Some(value.to_owned()));
    }

    fn unset_env(&mut self, name: &str) {
        self.env.insert(name.to_owned(), None);
    }

    fn get_register(&mut self, reg: char) -> Option<String> {
        self.registers.get(&reg).cloned()
    }

    fn set_register(&mut self, reg: char, value: &str) {
        self.registers.insert(reg, value.to_owned());
    }

    fn execute_command(&mut self, cmd: &str) -> Result<()> {
        tracing::debug!(target: "v9vm::rt::host", %cmd, "command");
        self.commands.push(cmd.to_owned());
        match self.command_handler.as_mut() {
            Some(handler) => handler(cmd).map_err(|msg| anyhow!(msg)),
            None => Ok(()),
        }
    }

    fn echo(&mut self, text: &str, kind: EchoKind) {
        let line = match kind {
            EchoKind::Echo => OutputLine::Echo(text.to_owned()),
            EchoKind::Echon => OutputLine::Echon(text.to_owned()),
            EchoKind::Message => OutputLine::Message(text.to_owned()),
        };
        self.record(line);
    }

    fn display_error(&mut self, msg: &str) {
        self.record(OutputLine::Error(msg.to_owned()));
    }

    fn pattern_match(&mut self, text: &str, pattern: &str, ic: bool) -> Result<bool> {
        let key = (pattern.to_owned(), ic);
        if !self.regex_cache.contains_key(&key) {
            let re = RegexBuilder::new(pattern)
                .case_insensitive(ic)
                .build()
                .map_err(|e| anyhow!("E383: Invalid search string: {pattern} ({e})"))?;
            self.regex_cache.insert(key.clone(), re);
        }
        Ok(self.regex_cache.get(&key).is_some_and(|re| re.is_match(text)))
    }

    fn set_source_line(&mut self, lnum: u32) {
        self.source_line = lnum;
    }

    fn breakcheck(&mut self) {
        self.breakchecks += 1;
        if self.interrupt_after.is_some_and(|at| self.breakchecks >= at) {
            self.interrupt_after = None;
            self.interrupt_pending = true;
        }
    }

    fn take_interrupt(&mut self) -> bool {
        std::mem::take(&mut self.interrupt_pending)
    }
}

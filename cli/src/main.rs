use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Once;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use v9vm_core::{
    rt::MemoryHost,
    val::Value,
    vm::{Completion, Host, OptionValue, Program, Vm, VmOptions, disassemble},
};
use v9vm_stdlib::{json::value_from_json, stdlib_table};


static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "v9vm::vm=debug,v9vm::stdlib=info,v9vm::rt=info";

#[derive(Debug, Parser)]
#[command(
    name = "v9vm",
    author,
    version,
    about = "Run and inspect compiled Vim9 script functions",
    long_about = None
)]
struct CliArgs {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Call a function of a program file (.json, .yaml/.yml or .toml)
    Run {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,
        /// Function to call
        #[arg(short, long, default_value = "main")]
        function: String,
        /// Argument as a JSON document; repeat for more arguments
        #[arg(long = "arg", value_name = "JSON")]
        args: Vec<String>,
        /// TOML file with `[vm]` tunables and `[options]` defaults
        #[arg(long, value_name = "FILE", value_parser = parse_sanitized_path)]
        config: Option<PathBuf>,
    },
    /// Print the instructions of one function, or of all of them
    Disasm {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,
        #[arg(short, long)]
        function: Option<String>,
    },
}

/// Contents of the `--config` file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CliConfig {
    vm: VmOptions,
    options: BTreeMap<String, ConfigOption>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum ConfigOption {
    Number(i64),
    String(String),
}

impl From<ConfigOption> for OptionValue {
    fn from(value: ConfigOption) -> Self {
        match value {
            ConfigOption::Number(n) => OptionValue::Number(n),
            ConfigOption::String(s) => OptionValue::String(s),
        }
    }
}

fn sanitize_path(raw: &str) -> anyhow::Result<PathBuf> {
    let p = Path::new(raw);

    for comp in p.components() {
        if matches!(comp, Component::ParentDir) {
            bail!("Parent directory components ('..') are not allowed in file paths.");
        }
    }

    Ok(p.to_path_buf())
}

fn parse_sanitized_path(raw: &str) -> Result<PathBuf, String> {
    sanitize_path(raw).map_err(|e| e.to_string())
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !(trimmed.eq_ignore_ascii_case("0") || trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off"))
}

fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("1")
        || trimmed.eq_ignore_ascii_case("true")
        || trimmed.eq_ignore_ascii_case("on")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn maybe_init_tracing() {
    let raw = match std::env::var("V9VM_TRACE") {
        Ok(value) => value,
        Err(_) => return,
    };

    if !env_toggle_enabled(&raw) {
        return;
    }

    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let builder = fmt().with_writer(std::io::stderr);

        let builder = match filter_expr_from(&raw).and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };

        let _ = builder.try_init();
    });
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Parse a program file; the format follows the file extension.
fn parse_program(path: &Path, src: &str) -> anyhow::Result<Program> {
    let program = match extension_of(path).as_str() {
        "json" => serde_json::from_str(src)?,
        "yaml" | "yml" => serde_yaml::from_str(src)?,
        "toml" => toml::from_str(src)?,
        other => bail!("Unsupported program format '{other}' (expected json, yaml or toml)"),
    };
    Ok(program)
}

fn load_program(path: &Path) -> anyhow::Result<Program> {
    let src = std::fs::read_to_string(path).with_context(|| format!("Failed to read file '{}'", path.display()))?;
    parse_program(path, &src).with_context(|| format!("Failed to load program from '{}'", path.display()))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CliConfig> {
    let Some(path) = path else {
        return Ok(CliConfig::default());
    };
    let src = std::fs::read_to_string(path).with_context(|| format!("Failed to read config '{}'", path.display()))?;
    toml::from_str(&src).with_context(|| format!("Invalid config '{}'", path.display()))
}

fn parse_args(raw: &[String]) -> anyhow::Result<Vec<Value>> {
    raw.iter()
        .map(|text| {
            let json: serde_json::Value =
                serde_json::from_str(text).with_context(|| format!("Invalid JSON argument '{text}'"))?;
            Ok(value_from_json(&json))
        })
        .collect()
}

/// Run `function`; returns whether it completed without an error or an
/// uncaught exception.
fn run(file: &Path, function: &str, raw_args: &[String], config: Option<&Path>) -> anyhow::Result<bool> {
    let program = load_program(file)?;
    let config = load_config(config)?;
    let args = parse_args(raw_args)?;

    let mut host = MemoryHost::new().forward_output(true);
    for (name, value) in config.options {
        host = host.with_option(&name, value.into());
    }
    let builtins = stdlib_table();

    let result = {
        let mut vm = Vm::new(&program, &builtins, &mut host).with_options(config.vm);
        vm.invoke_by_name(function, &args)
    };

    match result {
        Ok(Completion::Returned(value)) => {
            println!("{}", value.echo_string());
            Ok(true)
        }
        Ok(Completion::Rethrow) => {
            let thrown = host.exceptions().current().map(|e| e.value.clone()).unwrap_or_default();
            eprintln!("E605: Exception not caught: {thrown}");
            Ok(false)
        }
        Err(err) => {
            // Errors raised while executing have been displayed by the host already.
            if host.errors().next().is_none() {
                eprintln!("{err}");
            }
            Ok(false)
        }
    }
}

fn disasm(file: &Path, function: Option<&str>) -> anyhow::Result<String> {
    let program = load_program(file)?;
    let builtins = stdlib_table();
    let ids: Vec<usize> = match function {
        Some(name) => match program.lookup(name) {
            Some(id) => vec![id],
            None => bail!("E117: Unknown function: {name}"),
        },
        None => (0..program.len()).collect(),
    };
    let listings = ids
        .into_iter()
        .map(|id| disassemble(&program, id, Some(&builtins)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(listings.join("\n"))
}

fn main() -> anyhow::Result<()> {
    maybe_init_tracing();

    let CliArgs { command } = CliArgs::parse();

    let outcome = match command {
        Commands::Run {
            file,
            function,
            args,
            config,
        } => run(&file, &function, &args, config.as_deref()),
        Commands::Disasm { file, function } => disasm(&file, function.as_deref()).map(|listing| {
            print!("{listing}");
            true
        }),
    };

    match outcome {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

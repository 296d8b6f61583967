use std::{fmt::Display, path::PathBuf, str::FromStr};

use bcjit::{
    DEFAULT_ENTRY, JitConfig, JitContext, JitError,
    config::{DEFAULT_BITCODE_PATH, opt_level_from_u8},
    driver, llvm,
};
use clap::{Args, Parser as ClapParser, Subcommand as ClapSubcommand};
use tracing::{Level, info};

#[allow(clippy::upper_case_acronyms)]
#[derive(ClapParser)]
#[command(
    name = "bcjit",
    version,
    about = "Compile and run entry points of a pre-built LLVM bitcode module with MCJIT"
)]
pub struct CLI {
    #[command(flatten)]
    pub opts: Options,
    #[command(subcommand)]
    pub command: Subcommand,
}

#[derive(ClapParser, Debug, Clone)]
pub struct Options {
    #[arg(
        long = "log.level",
        default_value_t = Level::INFO,
        value_name = "LOG_LEVEL",
        help = "The verbosity level used for logs.",
        long_help = "Possible values: info, debug, trace, warn, error",
        help_heading = "Logging options",
        env = "BCJIT_LOG_LEVEL"
    )]
    pub log_level: Level,
    #[arg(
        long = "log.color",
        default_value_t = LogColor::Auto,
        help = "Output logs with ANSI color codes.",
        long_help = "Possible values: auto (tty), always (on), never (off)",
        help_heading = "Logging options",
        env = "BCJIT_LOG_COLOR"
    )]
    pub log_color: LogColor,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            log_color: LogColor::default(),
        }
    }
}

/// Where the module comes from and how it is compiled.
#[derive(Args, Debug, Clone)]
pub struct ModuleArgs {
    #[arg(
        long = "bitcode",
        value_name = "BITCODE_PATH",
        default_value = DEFAULT_BITCODE_PATH,
        help = "Pre-built bitcode or textual IR module to load.",
        env = "BCJIT_BITCODE"
    )]
    pub bitcode: PathBuf,
    #[arg(
        long = "opt-level",
        value_name = "LEVEL",
        default_value_t = 3,
        value_parser = clap::value_parser!(u8).range(0..=3),
        help = "MCJIT code generation level (0-3).",
        env = "BCJIT_OPT_LEVEL"
    )]
    pub opt_level: u8,
    #[arg(
        long = "no-asm-verbose",
        help = "Disable verbose assembly comments on the target machine."
    )]
    pub no_asm_verbose: bool,
}

impl ModuleArgs {
    pub fn to_config(&self) -> Result<JitConfig, JitError> {
        Ok(JitConfig {
            bitcode_path: self.bitcode.clone(),
            opt_level: opt_level_from_u8(self.opt_level)?,
            asm_verbose: !self.no_asm_verbose,
            ..Default::default()
        })
    }
}

#[derive(ClapSubcommand, Debug)]
pub enum Subcommand {
    #[command(about = "Compile an entry point, time the compilation, and call it once.")]
    Run {
        #[command(flatten)]
        module: ModuleArgs,
        #[arg(
            long = "entry",
            value_name = "FUNCTION",
            default_value = DEFAULT_ENTRY,
            help = "Name of a `void name(void)` function in the module."
        )]
        entry: String,
        #[arg(long = "json", help = "Print the run report as JSON.")]
        json: bool,
    },
    #[command(about = "Load the module and print the target triple and its functions.")]
    Info {
        #[command(flatten)]
        module: ModuleArgs,
    },
}

impl Subcommand {
    pub fn run(self) -> eyre::Result<()> {
        match self {
            Subcommand::Run {
                module,
                entry,
                json,
            } => {
                let config = module.to_config()?;
                // SAFETY: the user chose to execute this module's code.
                let report = unsafe { driver::run_standalone(config, &entry) }?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    println!(
                        "{}: compiled in {} ms for {}",
                        report.entry,
                        report.compile_ms(),
                        report.triple
                    );
                }
            }
            Subcommand::Info { module } => {
                let config = module.to_config()?;
                llvm::initialize_native()?;
                let context = JitContext::new(config)?;
                info!(path = %module.bitcode.display(), "module loaded");
                println!("module:        {}", context.config().bitcode_path.display());
                println!("host triple:   {}", llvm::host_triple());
                println!(
                    "engine triple: {}",
                    context.target_triple().unwrap_or_default()
                );
                for function in context.defined_functions() {
                    println!("  {function}");
                }
            }
        }
        Ok(())
    }
}

/// ANSI coloring of the stderr log stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogColor {
    /// Color only when stderr is a terminal.
    #[default]
    Auto,
    Always,
    Never,
}

impl LogColor {
    pub fn use_ansi(self, stderr_is_tty: bool) -> bool {
        match self {
            LogColor::Auto => stderr_is_tty,
            LogColor::Always => true,
            LogColor::Never => false,
        }
    }
}

impl Display for LogColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogColor::Auto => "auto",
            LogColor::Always => "always",
            LogColor::Never => "never",
        };
        f.write_str(name)
    }
}

impl FromStr for LogColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "tty" => Ok(LogColor::Auto),
            "always" | "on" => Ok(LogColor::Always),
            "never" | "off" => Ok(LogColor::Never),
            other => Err(format!(
                "unknown --log.color value '{other}' (use auto|tty, always|on, never|off)"
            )),
        }
    }
}

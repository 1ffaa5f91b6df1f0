//! Command-line interface for logtee.
//!
//! Uses lexopt for minimal binary size overhead (~34KB).

use std::ffi::OsString;
use std::path::PathBuf;

/// How much meta output (banners, progress notes) the binary prints.
///
/// `--debug` wins over `--quiet`, which wins over `--verbose`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// No script banners.
    Quiet,
    #[default]
    Normal,
    /// Report the conversion step.
    Verbose,
    /// Also report the exit code and internal details.
    Debug,
}

impl Verbosity {
    /// Log level implied when none is given explicitly.
    pub fn log_level(self) -> Option<&'static str> {
        match self {
            Verbosity::Quiet | Verbosity::Normal => None,
            Verbosity::Verbose => Some("info"),
            Verbosity::Debug => Some("debug"),
        }
    }
}

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Destination for the command's stdout and stderr.
    pub log_file: Option<PathBuf>,
    /// Command to run followed by its arguments. `-` reads from stdin.
    pub command: Vec<String>,
    /// Append to an existing log file.
    pub append: bool,
    /// Keep terminal control sequences in the log file.
    pub raw: bool,
    /// Where to keep the raw output when the log is cleaned.
    pub raw_file: Option<PathBuf>,
    /// Do not print or log the command line.
    pub no_show: bool,
    /// Flush after every chunk.
    pub unbuffered: bool,
    /// Idle timeout in seconds.
    pub timeout: Option<u64>,
    /// Prefix each line with the elapsed time.
    pub time: bool,
    /// Prefix each line with the local time of day.
    pub wallclock: bool,
    pub quiet: bool,
    pub verbose: bool,
    pub debug: bool,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

impl Args {
    /// Effective meta-output level.
    pub fn verbosity(&self) -> Verbosity {
        if self.debug {
            Verbosity::Debug
        } else if self.quiet {
            Verbosity::Quiet
        } else if self.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    /// The raw output location when the log is cleaned.
    pub fn raw_path(&self) -> Option<PathBuf> {
        let log = self.log_file.as_ref()?;
        Some(self.raw_file.clone().unwrap_or_else(|| {
            let mut raw = log.as_os_str().to_owned();
            raw.push(".raw");
            PathBuf::from(raw)
        }))
    }
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
///
/// Options are only recognised before `<command>`; everything after it is
/// passed to the command untouched.
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('a') | Long("append") => {
                result.append = true;
            }
            Short('r') | Long("raw") => {
                result.raw = true;
            }
            Long("raw-file") => {
                result.raw_file = Some(parser.value()?.parse()?);
            }
            Short('x') | Long("no-show") => {
                result.no_show = true;
            }
            Short('u') | Long("unbuffered") => {
                result.unbuffered = true;
            }
            Short('t') | Long("time") => {
                result.time = true;
            }
            Short('w') | Long("wallclock") => {
                result.wallclock = true;
            }
            Short('q') | Long("quiet") => {
                result.quiet = true;
            }
            Short('v') | Long("verbose") => {
                result.verbose = true;
            }
            Short('d') | Long("debug") => {
                result.debug = true;
            }
            Long("timeout") => {
                let value: String = parser.value()?.parse()?;
                result.timeout = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("timeout", value))?,
                );
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) if result.log_file.is_none() => {
                result.log_file = Some(PathBuf::from(val));
            }
            Value(val) => {
                result.command.push(into_string(val)?);
                for rest in parser.raw_args()? {
                    result.command.push(into_string(rest)?);
                }
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

fn into_string(value: OsString) -> Result<String, ArgsError> {
    value
        .into_string()
        .map_err(|v| ArgsError::InvalidValue("command", v.to_string_lossy().into_owned()))
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"logtee {version}
Log a command's output to a file and the terminal, then clean the log to plain text

USAGE:
    logtee [OPTIONS] <LOG-FILE> <COMMAND> [ARGS]...

ARGS:
    <LOG-FILE>              Destination for the command's stdout and stderr
    <COMMAND>               Command to execute ('-' reads from stdin)

OPTIONS:
    -a, --append            Append to <LOG-FILE> if it exists
    -r, --raw               Keep terminal control sequences in <LOG-FILE>
        --raw-file <FILE>   Keep the raw output here [default: <LOG-FILE>.raw]
    -x, --no-show           Do not print or log the command line
    -u, --unbuffered        Flush the terminal and log after every chunk
    -t, --time              Prefix each line with elapsed time
    -w, --wallclock         Prefix each line with local time of day
    -q, --quiet             No script banners (command still shown)
    -v, --verbose           Show additional details
    -d, --debug             Show debugging details
        --timeout <SECS>    Kill the command after SECS without output
    -c, --config <FILE>     Path to configuration file (JSON)
    -l, --log-level <LVL>   Log level (error, warn, info, debug, trace)
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT VARIABLES:
    LOGTEE_TIMEOUT          Idle timeout in seconds (overrides config)
    LOGTEE_LOG_LEVEL        Log level (overrides config)
    RUST_LOG                Alternative log level setting

EXAMPLES:
    # Build, keeping a clean log in build.log and the raw one in build.log.raw
    logtee build.log cargo build

    # Keep colors and progress bars in the log
    logtee --raw test.log cargo test -- --nocapture

    # Capture stdin with a timestamp on every line
    some-daemon | logtee -w -q daemon.log -
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("logtee {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// A required positional argument is missing.
    Missing(&'static str),
    /// Arguments were given after the `-` (read stdin) command.
    StdinArguments,
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::Missing(name) => write!(f, "missing required argument <{}>", name),
            Self::StdinArguments => {
                write!(f, "no arguments permitted after '-' (read from STDIN)")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}

impl From<ArgsError> for crate::LogteeError {
    fn from(e: ArgsError) -> Self {
        crate::LogteeError::Config(e.to_string())
    }
}

/// Check that a log file and command were given (unless only help/version).
pub fn validate(args: &Args) -> Result<(), ArgsError> {
    if args.help || args.version {
        return Ok(());
    }
    if args.log_file.is_none() {
        return Err(ArgsError::Missing("log-file"));
    }
    if args.command.is_empty() {
        return Err(ArgsError::Missing("command"));
    }
    if args.command[0] == "-" && args.command.len() > 1 {
        return Err(ArgsError::StdinArguments);
    }
    Ok(())
}

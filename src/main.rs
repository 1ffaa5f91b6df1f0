//! logtee binary entry point.

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use logtee::cli::{self, Args, ArgsError, Verbosity};
use logtee::config::Config;
use logtee::execution::{Command, ExitStatus, Multiplexer, Sinks, Timestamps};
use logtee::output::clean_log_file;
use logtee::{logging, LogteeError};
use tracing::{debug, error, info};

const EXIT_INTERRUPTED: u8 = 130;
const EXIT_TIMED_OUT: u8 = 124;
const EXIT_NOT_STARTED: u8 = 127;

fn main() -> ExitCode {
    let args = match cli::parse_args().and_then(|args| cli::validate(&args).map(|()| args)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("logtee: {}", e);
            eprintln!("Try 'logtee --help' for more information.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("logtee: {}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init_with_filter(config.log_filter()).ok();
    debug!(?config, "configuration loaded");

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("logtee: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(perform(&args, &config));
    // A console read may still be parked on a blocking thread.
    runtime.shutdown_timeout(Duration::from_millis(100));

    match result {
        Ok(status) => exit_code_for(status),
        Err(e) => {
            error!(error = %e, "run failed");
            eprintln!("logtee: {}", e);
            if e.is_startup() {
                ExitCode::from(EXIT_NOT_STARTED)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn perform(args: &Args, config: &Config) -> logtee::Result<ExitStatus> {
    let log_file = args
        .log_file
        .as_deref()
        .ok_or_else(|| LogteeError::Config("missing log file".into()))?;

    let verbosity = args.verbosity();

    let command = match args.command.as_slice() {
        [only] if only == "-" => Command::new("cat"),
        [first, ..] if first == "-" => return Err(ArgsError::StdinArguments.into()),
        argv => Command::from_argv(argv.iter().cloned())
            .ok_or_else(|| LogteeError::Config("missing command".into()))?,
    };

    // Report a missing program before the log file is touched.
    command
        .resolve_program()
        .map_err(|e| LogteeError::startup(&command.program, e))?;

    let mut append = args.append;
    if !args.no_show {
        let line = format!("+ {}\n\n", command.command_line());
        print_console(&line)?;
        write_log(log_file, append, &line)?;
        append = true;
    }
    if verbosity > Verbosity::Quiet {
        print_console(&format!("Script started, file is {}\n", log_file.display()))?;
        write_log(log_file, append, &format!("Script started at {}\n", asctime()))?;
        append = true;
    }

    let timestamps = Timestamps::none()
        .with_elapsed(args.time)
        .with_wallclock(args.wallclock);
    let options = config
        .multiplex_options(append)
        .with_timestamps(timestamps);
    let outcome = Multiplexer::new(options)
        .run(&command, Sinks::tee([log_file]))
        .await?;
    info!(status = %outcome.status, elapsed = ?outcome.duration, "command finished");

    if verbosity > Verbosity::Quiet {
        write_log(log_file, true, &format!("Script done on {}\n", asctime()))?;
        print_console(&format!("Script done, file is {}\n", log_file.display()))?;
    }
    if verbosity >= Verbosity::Debug {
        print_console(&format!("logtee: retcode = {}\n", outcome.code()))?;
    }

    if !args.raw {
        if verbosity >= Verbosity::Verbose {
            print_console("-- converting raw output to text\n")?;
        }
        if let Some(raw) = args.raw_path() {
            let normalize = config.normalize_options();
            let log = log_file.to_path_buf();
            let cleaned =
                match tokio::task::spawn_blocking(move || clean_log_file(&log, &raw, &normalize))
                    .await
                {
                    Ok(result) => result,
                    Err(e) => Err(LogteeError::Io(std::io::Error::other(e))),
                };
            match cleaned {
                Ok(()) => debug!("log converted to plain text"),
                Err(e) => eprintln!(
                    "logtee: raw to text conversion failed ({}), raw log unchanged",
                    e
                ),
            }
        }
    }

    Ok(outcome.status)
}

fn print_console(text: &str) -> logtee::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Write meta output straight to the log, before or after the run.
fn write_log(log_file: &Path, append: bool, text: &str) -> logtee::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(log_file)
        .map_err(|e| LogteeError::sink_open(log_file, e))?;
    file.write_all(text.as_bytes())?;
    Ok(())
}

/// Local time in the classic `ctime` layout.
fn asctime() -> String {
    chrono::Local::now()
        .format("%a %b %e %H:%M:%S %Y")
        .to_string()
}

fn exit_code_for(status: ExitStatus) -> ExitCode {
    match status {
        ExitStatus::Exited(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        ExitStatus::Interrupted => ExitCode::from(EXIT_INTERRUPTED),
        ExitStatus::TimedOut => ExitCode::from(EXIT_TIMED_OUT),
    }
}

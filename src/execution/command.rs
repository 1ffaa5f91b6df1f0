//! Command representation and executable lookup.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};

/// A program plus its argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The executable name or path.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Working directory override (if any).
    pub working_dir: Option<PathBuf>,
    /// Environment variables to set.
    pub env: HashMap<String, String>,
}

impl Command {
    /// Create a new command for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
        }
    }

    /// Build a command from a full argv (`argv[0]` is the program).
    ///
    /// Returns `None` for an empty argv.
    pub fn from_argv<I, S>(argv: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let program = argv.next()?;
        Some(Self::new(program).args(argv))
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// The command as a single display line.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Locate the executable this command would run.
    ///
    /// A program containing a path separator is checked as given; a bare
    /// name is searched for on `PATH` (the command's own `PATH` override
    /// wins over the inherited one).
    ///
    /// # Errors
    ///
    /// `NotFound` if nothing matches, `PermissionDenied` if the only match
    /// is not executable.
    pub fn resolve_program(&self) -> io::Result<PathBuf> {
        let program = Path::new(&self.program);
        if self.program.is_empty() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "empty program name"));
        }

        if program.components().count() > 1 || program.is_absolute() {
            let candidate = match &self.working_dir {
                Some(dir) if program.is_relative() => dir.join(program),
                _ => program.to_path_buf(),
            };
            return check_executable(&candidate).map(|()| program.to_path_buf());
        }

        let path_var: Option<OsString> = match self.env.get("PATH") {
            Some(path) => Some(path.into()),
            None => std::env::var_os("PATH"),
        };
        let mut denied = false;

        for dir in std::env::split_paths(path_var.as_deref().unwrap_or_else(|| OsStr::new(""))) {
            for candidate in candidates(&dir.join(program)) {
                match check_executable(&candidate) {
                    Ok(()) => return Ok(candidate),
                    Err(e) if e.kind() == io::ErrorKind::PermissionDenied => denied = true,
                    Err(_) => {}
                }
            }
        }

        if denied {
            Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{}: permission denied", self.program),
            ))
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: command not found", self.program),
            ))
        }
    }
}

#[cfg(windows)]
fn candidates(base: &Path) -> Vec<PathBuf> {
    let mut list = vec![base.to_path_buf()];
    if base.extension().is_none() {
        for ext in ["exe", "cmd", "bat", "com"] {
            list.push(base.with_extension(ext));
        }
    }
    list
}

#[cfg(not(windows))]
fn candidates(base: &Path) -> Vec<PathBuf> {
    vec![base.to_path_buf()]
}

fn check_executable(path: &Path) -> io::Result<()> {
    let meta = std::fs::metadata(path)?;
    if !meta.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{}: not a file", path.display()),
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 == 0 {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{}: not executable", path.display()),
            ));
        }
    }

    Ok(())
}

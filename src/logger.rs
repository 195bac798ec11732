//! Diagnostics for conversions.
//!
//! Warnings and errors go to stderr and, when a log file has been
//! configured, to that file as well. Progress is a transient
//! carriage-return ticker on stderr and never reaches the log file. A
//! thread-local context stack tags every diagnostic with the file (and
//! optionally the section) being processed.

use std::cell::RefCell;
use std::fmt::Display;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();

thread_local! {
    static CONTEXT: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Severity of a diagnostic line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Warning,
    Error,
}

impl Level {
    const fn tag(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Configures a log file that receives every warning and error in
/// addition to stderr.
///
/// # Errors
///
/// Returns an error if the log file cannot be created.
pub fn set_log_file(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    // First configuration wins; later calls keep the original file.
    let _ = LOG_FILE.set(Mutex::new(file));
    Ok(())
}

/// Pushes a label (typically the file being processed) onto the context
/// stack. Diagnostics emitted while the returned guard lives are prefixed
/// with every label on the stack, outermost first.
pub fn push_context(label: impl Into<String>) -> ContextGuard {
    CONTEXT.with(|stack| stack.borrow_mut().push(label.into()));
    ContextGuard { _private: () }
}

pub struct ContextGuard {
    _private: (),
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CONTEXT.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

fn with_context(message: &str) -> String {
    CONTEXT.with(|stack| {
        let stack = stack.borrow();
        if stack.is_empty() {
            message.to_owned()
        } else {
            let mut line = stack.join(": ");
            line.push_str(": ");
            line.push_str(message);
            line
        }
    })
}

/// Emits a diagnostic at the given severity.
pub fn log(level: Level, message: impl Display) {
    let line = with_context(&message.to_string());
    eprintln!("{line}");
    if let Some(file) = LOG_FILE.get() {
        if let Ok(mut file) = file.lock() {
            let _ = writeln!(file, "{}: {line}", level.tag());
        }
    }
}

pub fn log_warn(message: &str) {
    log(Level::Warning, message);
}

pub fn log_error(message: &str) {
    log(Level::Error, message);
}

/// Informational status line on stderr only; never written to the log
/// file.
pub fn log_info(message: &str) {
    eprintln!("{}", with_context(message));
}

/// Row-count progress for long conversions, updated in place on stderr
/// every `stride` rows. Silent when quiet.
pub struct Progress {
    quiet: bool,
    stride: u64,
}

impl Progress {
    const DEFAULT_STRIDE: u64 = 10_000;

    #[must_use]
    pub const fn rows(quiet: bool) -> Self {
        Self::with_stride(quiet, Self::DEFAULT_STRIDE)
    }

    #[must_use]
    pub const fn with_stride(quiet: bool, stride: u64) -> Self {
        Self {
            quiet,
            stride: if stride == 0 { 1 } else { stride },
        }
    }

    const fn due(&self, count: u64) -> bool {
        !self.quiet && count % self.stride == 0
    }

    /// Reports the running row count; prints only on stride boundaries.
    pub fn tick(&self, count: u64) {
        if self.due(count) {
            eprint!("\r{count} rows");
            let _ = std::io::stderr().flush();
        }
    }

    /// Prints the final count and moves off the progress line.
    pub fn finish(&self, count: u64) {
        if !self.quiet {
            eprintln!("\r{count} rows");
        }
    }
}

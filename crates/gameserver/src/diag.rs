//! `com_printf`/`com_dprintf`/`com_error`-style diagnostics. Kept as
//! plain print/panic routines rather than a logging crate, matching the
//! rest of this codebase's house style for this layer: the ambient stack
//! here is prints and a redirect buffer, not `log`/`tracing`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorKind {
    /// Recoverable: bad map, bad lump, invalid command. The server
    /// returns to pre-map idle and keeps running.
    Drop,
    /// Internal invariant broken. Terminates the process.
    Fatal,
}

/// Raised by [`com_error`] with [`ErrorKind::Drop`] so callers can match
/// on it and unwind to "pre-map idle" instead of the process aborting.
#[derive(Debug, Clone, PartialEq)]
pub struct DropError(pub String);

impl fmt::Display for DropError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for DropError {}

/// Output capture for `rcon`-style command redirection (`status`,
/// `serverinfo`, ...): when set, `com_printf` appends to it instead of
/// (or in addition to) the console.
#[derive(Default)]
pub struct RedirectBuffer {
    active: bool,
    buf: String,
}

impl RedirectBuffer {
    pub fn begin(&mut self) {
        self.active = true;
        self.buf.clear();
    }

    pub fn end(&mut self) -> String {
        self.active = false;
        std::mem::take(&mut self.buf)
    }

    fn feed(&mut self, s: &str) {
        if self.active {
            self.buf.push_str(s);
        }
    }
}

pub struct Diagnostics {
    pub developer: bool,
    pub redirect: RedirectBuffer,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self { developer: false, redirect: RedirectBuffer::default() }
    }
}

impl Diagnostics {
    pub fn printf(&mut self, msg: &str) {
        self.redirect.feed(msg);
        print!("{msg}");
    }

    pub fn dprintf(&mut self, msg: &str) {
        if self.developer {
            self.printf(msg);
        }
    }

    /// `ErrorKind::Drop` returns a [`DropError`] for the caller to
    /// propagate; `ErrorKind::Fatal` panics.
    pub fn error(&mut self, kind: ErrorKind, msg: impl Into<String>) -> DropError {
        let msg = msg.into();
        match kind {
            ErrorKind::Drop => {
                self.printf(&format!("Drop: {msg}\n"));
                DropError(msg)
            }
            ErrorKind::Fatal => panic!("Fatal: {msg}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dprintf_is_gated_on_developer_flag() {
        let mut diag = Diagnostics::default();
        diag.redirect.begin();
        diag.dprintf("hidden\n");
        assert_eq!(diag.redirect.end(), "");

        diag.developer = true;
        diag.redirect.begin();
        diag.dprintf("shown\n");
        assert_eq!(diag.redirect.end(), "shown\n");
    }

    #[test]
    fn drop_error_carries_its_message() {
        let mut diag = Diagnostics::default();
        let err = diag.error(ErrorKind::Drop, "bad map");
        assert_eq!(err.0, "bad map");
    }
}

//! Assembler diagnostics (spec.md §4.3/§7), grounded on
//! `original_source/ssp/scripting/assembler/__init__.py`'s `ErrorLevel`/
//! `AssemblerMessage`. Diagnostics are plain data, not a propagated `Error`
//! type: assembly accumulates them across passes rather than failing fast.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
    InternalError,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::InternalError => "internal error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub level: Severity,
    pub line: u32,
    pub col: u32,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}:{}]: {}", self.level, self.line, self.col, self.message)
    }
}

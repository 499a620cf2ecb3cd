//! Compiler diagnostic records and their canonical rendering.
//!
//! Every phase reports failures through [`Diagnostic`]: a code, severity,
//! source location, message and optional remediation. The rendered form is
//! stable and machine-matchable:
//!
//! ```text
//! severity[code]: file:line:col: message
//! help: remediation
//! ```
//!
//! Code namespaces: `HC1xxx` preprocessor, `HC2xxx` lexer/parser, `HC3xxx`
//! semantic analysis, `HC4xxx` HIR lowering.

use std::fmt;

/// Severity of a diagnostic record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
            Severity::Note => f.write_str("note"),
        }
    }
}

/// A single diagnostic produced by a compiler phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: String,
    pub severity: Severity,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
    pub remediation: String,
}

impl Diagnostic {
    /// Build an error diagnostic with a full source location.
    pub fn error(
        code: impl Into<String>,
        file: impl Into<String>,
        line: u32,
        column: u32,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic {
            code: code.into(),
            severity: Severity::Error,
            file: file.into(),
            line,
            column,
            message: message.into(),
            remediation: String::new(),
        }
    }

    /// Attach a `help:` remediation line.
    pub fn with_help(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = remediation.into();
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.severity)?;
        if !self.code.is_empty() {
            write!(f, "[{}]", self.code)?;
        }
        f.write_str(": ")?;
        if !self.file.is_empty() {
            f.write_str(&self.file)?;
            if self.line > 0 {
                write!(f, ":{}", self.line)?;
                if self.column > 0 {
                    write!(f, ":{}", self.column)?;
                }
            }
            f.write_str(": ")?;
        }
        f.write_str(&self.message)?;
        if !self.remediation.is_empty() {
            write!(f, "\nhelp: {}", self.remediation)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_full_location() {
        let diag = Diagnostic::error("HC1007", "main.hc", 3, 1, "include not found: lib.hc")
            .with_help("verify include search roots and file path");
        assert_eq!(
            diag.to_string(),
            "error[HC1007]: main.hc:3:1: include not found: lib.hc\n\
             help: verify include search roots and file path"
        );
    }

    #[test]
    fn omits_zero_line_and_column() {
        let diag = Diagnostic::error("HC3001", "x.hc", 0, 0, "semantic error: unknown identifier: y");
        assert_eq!(
            diag.to_string(),
            "error[HC3001]: x.hc: semantic error: unknown identifier: y"
        );
    }

    #[test]
    fn omits_empty_file() {
        let mut diag = Diagnostic::error("HC1016", "", 0, 0, "malformed #if expression");
        diag.file.clear();
        assert_eq!(diag.to_string(), "error[HC1016]: malformed #if expression");
    }
}

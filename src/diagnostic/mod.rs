//! Renderable diagnostics for compile and runtime errors.
//!
//! Errors are converted into a [`Diagnostic`] and rendered either for a
//! terminal ([`ansi`]) or as one JSON object per line ([`json`]).

pub mod ansi;
pub mod json;
pub mod source_map;

pub use source_map::SourceMap;

use crate::compiler::{CompileError, Near};
use crate::lexer::Span;
use crate::vm::{RuntimeError, TraceFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Compile,
    Runtime,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Compile => "compile",
            Phase::Runtime => "runtime",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub phase: Phase,
    pub message: String,
    /// `path:line` the error is attributed to.
    pub location: Option<String>,
    pub label: Option<Label>,
    pub notes: Vec<String>,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn error(phase: Phase, message: impl Into<String>) -> Self {
        Diagnostic { phase, message: message.into(), location: None, label: None, notes: Vec::new(), source: None }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.label = Some(Label { span, message: label.into() });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Source text the label's span points into.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl From<&CompileError> for Diagnostic {
    fn from(e: &CompileError) -> Self {
        let d = Diagnostic::error(Phase::Compile, &e.message).at(format!("{}:{}", e.path, e.line));
        match &e.near {
            Near::Token(t) => d.with_span(e.span, format!("near '{t}'")),
            Near::End => d.with_span(e.span, "at end of input"),
            Near::Nothing => d.with_span(e.span, ""),
        }
    }
}

impl From<&RuntimeError> for Diagnostic {
    fn from(e: &RuntimeError) -> Self {
        let mut d = Diagnostic::error(Phase::Runtime, e.message());
        let innermost = e.trace.iter().find_map(|f| match f {
            TraceFrame::Script { path, line, .. } => Some(format!("{path}:{line}")),
            TraceFrame::Native { .. } => None,
        });
        if let Some(location) = innermost {
            d = d.at(location);
        }
        for frame in &e.trace {
            d = d.with_note(format!("in {frame}"));
        }
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::vm::{InterpretError, Interpreter};

    fn vm() -> Interpreter {
        Interpreter::new(Config { print_errors: false, ..Config::default() })
    }

    #[test]
    fn builder() {
        let d = Diagnostic::error(Phase::Compile, "Expected ';'")
            .at("a.hby:3")
            .with_span(Span { start: 5, end: 8 }, "here")
            .with_note("while parsing a statement");
        assert_eq!(d.phase, Phase::Compile);
        assert_eq!(d.location.as_deref(), Some("a.hby:3"));
        assert_eq!(d.label.as_ref().map(|l| l.span), Some(Span { start: 5, end: 8 }));
        assert_eq!(d.notes.len(), 1);
        assert!(d.source.is_none());
    }

    #[test]
    fn from_compile_error() {
        let Err(InterpretError::Compile(errs)) = vm().interpret("c.hby", "var = 1;") else {
            panic!("expected compile error");
        };
        let d = Diagnostic::from(&errs.0[0]);
        assert_eq!(d.message, "Expected an identifier");
        assert_eq!(d.location.as_deref(), Some("c.hby:1"));
        let label = d.label.unwrap();
        assert_eq!(label.message, "near '='");
        assert_eq!(label.span, Span { start: 4, end: 5 });
    }

    #[test]
    fn from_runtime_error() {
        let Err(InterpretError::Runtime(err)) = vm().interpret("r.hby", "fn f() -> 1 + null;\nf();") else {
            panic!("expected runtime error");
        };
        let d = Diagnostic::from(&err);
        assert_eq!(d.phase, Phase::Runtime);
        assert_eq!(d.message, "Operands must be numbers");
        assert_eq!(d.location.as_deref(), Some("r.hby:1"));
        assert_eq!(d.notes, vec!["in r.hby:1 in f()", "in r.hby:2 in script"]);
        assert!(d.label.is_none());
    }
}

use std::fmt;

use crate::compiler::CompileErrors;

/// What went wrong at runtime. The display text is the message scripts see
/// from `pcall`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ErrorKind {
    #[error("Stack overflow")]
    StackOverflow,
    #[error("Expected {expected} args, but {got} were passed")]
    Arity { expected: u8, got: usize },
    #[error("Cannot call that value")]
    NotCallable,
    #[error("Undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("Cannot assign to constant '{0}'")]
    ConstantAssignment(String),
    #[error("Undefined property '{0}'")]
    UndefinedProperty(String),
    #[error("Undefined static property '{0}'")]
    UndefinedStatic(String),
    #[error("Cannot access properties on that value")]
    NoProperties,
    #[error("Cannot access static properties on that value")]
    NoStatics,
    #[error("Cannot use subscript operator on that value")]
    NotSubscriptable,
    #[error("Cannot instance that value")]
    NotInstantiable,
    #[error("Operands must be numbers")]
    OperandsNotNumbers,
    #[error("Operand must be a number")]
    OperandNotNumber,
    #[error("Right operand of 'is' must be a struct")]
    NotAType,
    #[error("Index out of bounds")]
    IndexOutOfBounds,
    #[error("Undefined map key")]
    UndefinedKey,
    #[error("Enum value '{0}' is already defined")]
    DuplicateEnumValue(String),
    #[error("Cannot destructure that value")]
    NotDestructurable,
    #[error("Not enough values to destructure")]
    DestructureLength,
    #[error("Expected {expected}, got {got}")]
    Type { expected: &'static str, got: &'static str },
    #[error("Invalid stack access of slot {0}")]
    StackIndex(isize),
    /// Raised by scripts through `error(msg)` and by host code.
    #[error("{0}")]
    Message(String),
}

/// One line of a stack trace.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceFrame {
    Native { name: String },
    Script { path: String, line: u32, function: Option<String> },
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceFrame::Native { name } => write!(f, "[C] {name}()"),
            TraceFrame::Script { path, line, function: Some(name) } => write!(f, "{path}:{line} in {name}()"),
            TraceFrame::Script { path, line, function: None } => write!(f, "{path}:{line} in script"),
        }
    }
}

/// A runtime error with the call stack as it was when the error was raised,
/// innermost frame first.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}", render_trace(.kind, .trace))]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub trace: Vec<TraceFrame>,
}

fn render_trace(kind: &ErrorKind, trace: &[TraceFrame]) -> String {
    let mut out = String::from("Stack trace (error source is first):\n");
    for frame in trace {
        out.push('\t');
        out.push_str(&frame.to_string());
        out.push('\n');
    }
    out.push_str("[error] ");
    out.push_str(&kind.to_string());
    out
}

impl RuntimeError {
    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    /// Line of the innermost script frame, if any.
    pub fn line(&self) -> Option<u32> {
        self.trace.iter().find_map(|f| match f {
            TraceFrame::Script { line, .. } => Some(*line),
            TraceFrame::Native { .. } => None,
        })
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum InterpretError {
    #[error(transparent)]
    Compile(#[from] CompileErrors),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

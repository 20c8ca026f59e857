//! hobby: a small embeddable scripting language.
//!
//! Source is compiled in a single pass to bytecode and run on a stack VM
//! with a mark/sweep collector. Hosts drive everything through an
//! [`Interpreter`]:
//!
//! ```
//! use hobby::{Config, Interpreter};
//!
//! let mut vm = Interpreter::new(Config::default());
//! let result = vm.interpret("main", "return 6 * 7;").unwrap();
//! assert_eq!(result.as_number(), Some(42.0));
//! ```

pub mod chunk;
pub mod compiler;
pub mod config;
pub mod diagnostic;
pub mod gc;
pub mod lexer;
pub mod object;
pub mod stdlib;
pub mod value;
pub mod vm;

pub use compiler::{CompileError, CompileErrors, compile};
pub use config::{Config, ConfigError};
pub use object::{Arity, NativeFn};
pub use value::Value;
pub use vm::{ErrorKind, InterpretError, Interpreter, RuntimeError, TraceFrame, ValueType};

//! The interpreter context and its stack machine.
//!
//! Everything one script runtime owns lives in [`Interpreter`]: the heap,
//! the value stack, call frames, globals and the module cache. Nothing is
//! process-global, so several interpreters can coexist.

mod access;
mod api;
mod call;
mod error;
mod run;
mod tostr;

use std::rc::Rc;

use tracing::debug;

use crate::chunk::Chunk;
use crate::compiler::compile;
use crate::config::Config;
use crate::gc::Heap;
use crate::object::{Closure, NameTable, ObjRef, Object, Str, StructDef, hash_str};
use crate::value::Value;

pub use api::ValueType;
pub use error::{ErrorKind, InterpretError, RuntimeError, TraceFrame};
pub use tostr::describe;

/// Who pushed a frame, which decides where its `OP_RET` hands control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    /// A host function running on the native stack.
    Native,
    /// Top-level code started by [`Interpreter::interpret`].
    Script,
    /// Script function called from host code; returning ends that `run`.
    Reentrant,
    /// Script-to-script call; returning continues the caller's loop.
    Call,
}

pub(crate) struct Frame {
    pub(crate) kind: FrameKind,
    /// Closure or native being executed.
    pub(crate) callee: ObjRef,
    pub(crate) chunk: Rc<Chunk>,
    pub(crate) ip: usize,
    /// Stack index of slot 0 (the callee or receiver).
    pub(crate) base: usize,
}

/// Structs backing the built-in types: method tables for values that are not
/// instances, and the right-hand side of `is`.
pub(crate) struct Builtins {
    pub(crate) number: ObjRef,
    pub(crate) boolean: ObjRef,
    pub(crate) function: ObjRef,
    pub(crate) string: ObjRef,
    pub(crate) array: ObjRef,
    pub(crate) map: ObjRef,
    pub(crate) userdata: ObjRef,
    /// Interned `"tostr"`, the stringification hook.
    pub(crate) tostr: ObjRef,
}

impl Builtins {
    fn new(heap: &mut Heap) -> Self {
        let mut def = |name: &str| {
            let name = heap.insert(Object::String(Str { chars: name.into(), hash: hash_str(name) }));
            heap.insert(Object::Struct(StructDef {
                name,
                statics: NameTable::new(),
                methods: NameTable::new(),
                members: NameTable::new(),
            }))
        };
        let number = def("Number");
        let boolean = def("Boolean");
        let function = def("Function");
        let string = def("String");
        let array = def("Array");
        let map = def("Map");
        let userdata = def("UserData");
        let tostr = heap.insert(Object::String(Str { chars: "tostr".into(), hash: hash_str("tostr") }));
        Builtins { number, boolean, function, string, array, map, userdata, tostr }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ObjRef> {
        [
            &self.number,
            &self.boolean,
            &self.function,
            &self.string,
            &self.array,
            &self.map,
            &self.userdata,
            &self.tostr,
        ]
        .into_iter()
    }

    fn structs(&self) -> [ObjRef; 7] {
        [self.number, self.boolean, self.function, self.string, self.array, self.map, self.userdata]
    }
}

pub struct Interpreter {
    pub(crate) heap: Heap,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<Frame>,
    /// Open upvalue cells, sorted by the stack slot they point at.
    pub(crate) open_upvalues: Vec<ObjRef>,
    pub(crate) globals: NameTable<Value>,
    pub(crate) const_globals: NameTable<()>,
    /// Return value of every interpreted script, keyed by its path.
    pub(crate) modules: NameTable<Value>,
    /// Constants of functions still being compiled.
    pub(crate) compiler_roots: Vec<Value>,
    pub(crate) builtins: Builtins,
    pub(crate) args: Option<ObjRef>,
    /// Set while finalizers run; collection is suppressed meanwhile.
    pub(crate) finalizing: bool,
    pub(crate) config: Config,
    /// Shared by native frames, which have no bytecode.
    no_code: Rc<Chunk>,
}

impl Interpreter {
    pub fn new(config: Config) -> Self {
        let mut heap = Heap::new(&config);
        let builtins = Builtins::new(&mut heap);
        let mut vm = Interpreter {
            heap,
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(config.max_frames),
            open_upvalues: Vec::new(),
            globals: NameTable::new(),
            const_globals: NameTable::new(),
            modules: NameTable::new(),
            compiler_roots: Vec::new(),
            builtins,
            args: None,
            finalizing: false,
            config,
            no_code: Rc::new(Chunk::new()),
        };
        for def in vm.builtins.structs() {
            let name = vm.heap.struct_def(def).name;
            vm.define_global(name, Value::object(def), true);
        }
        if vm.config.stdlib {
            crate::stdlib::open(&mut vm);
        }
        vm
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ── Stack ────────────────────────────────────────────────────────

    #[inline]
    pub(crate) fn push(&mut self, v: Value) {
        self.stack.push(v);
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or_default()
    }

    #[inline]
    pub(crate) fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    /// Stack index of the current frame's slot 0.
    pub(crate) fn frame_base(&self) -> usize {
        self.frames.last().map_or(0, |f| f.base)
    }

    // ── Strings ──────────────────────────────────────────────────────

    /// Returns the interned string with this content, allocating on a miss.
    pub(crate) fn intern(&mut self, s: &str) -> ObjRef {
        if let Some(r) = self.heap.find_string(s) {
            return r;
        }
        tracing::trace!(len = s.len(), "interning new string");
        self.alloc(Object::String(Str { chars: s.into(), hash: hash_str(s) }))
    }

    /// Like [`intern`](Self::intern) but takes over the buffer.
    pub(crate) fn intern_owned(&mut self, s: String) -> ObjRef {
        if let Some(r) = self.heap.find_string(&s) {
            return r;
        }
        tracing::trace!(len = s.len(), "interning new string");
        let hash = hash_str(&s);
        self.alloc(Object::String(Str { chars: s.into_boxed_str(), hash }))
    }

    // ── Globals ──────────────────────────────────────────────────────

    pub(crate) fn define_global(&mut self, name: ObjRef, value: Value, is_const: bool) {
        let hash = self.heap.str_hash(name);
        self.globals.insert(name, hash, value);
        if is_const {
            self.const_globals.insert(name, hash, ());
        } else {
            self.const_globals.remove(&name, hash);
        }
    }

    pub(crate) fn is_const_global(&self, name: &str) -> bool {
        self.heap
            .find_string(name)
            .is_some_and(|r| self.const_globals.contains(&r, self.heap.str_hash(r)))
    }

    // ── Entry points ─────────────────────────────────────────────────

    /// Compiles and runs `source`. The script's return value is cached under
    /// `path` (see [`module`](Self::module)) and returned.
    pub fn interpret(&mut self, path: &str, source: &str) -> Result<Value, InterpretError> {
        let function = compile(self, path, source)?;

        self.push(Value::object(function));
        let closure = self.alloc(Object::Closure(Closure { function, upvalues: Vec::new() }));
        self.pop();
        self.push(Value::object(closure));

        let frames = self.frames.len();
        let base = self.stack.len() - 1;
        let result = self.call_value(Value::object(closure), 0).and_then(|()| {
            if let Some(frame) = self.frames.last_mut() {
                frame.kind = FrameKind::Script;
            }
            self.run()
        });

        match result {
            Ok(()) => {
                let value = self.peek(0);
                let key = self.intern(path);
                let hash = self.heap.str_hash(key);
                self.modules.insert(key, hash, value);
                self.pop();
                Ok(value)
            }
            Err(err) => {
                self.unwind(frames, base);
                if self.config.print_errors {
                    eprintln!("{err}");
                }
                Err(InterpretError::Runtime(err))
            }
        }
    }

    /// Value returned by the script last interpreted under `path`.
    pub fn module(&self, path: &str) -> Option<Value> {
        let key = self.heap.find_string(path)?;
        self.modules.get(&key, self.heap.str_hash(key)).copied()
    }

    /// Drops every frame above `frames` and every stack slot from `stack_len`,
    /// closing upvalues that pointed into the discarded region.
    pub(crate) fn unwind(&mut self, frames: usize, stack_len: usize) {
        self.close_upvalues(stack_len);
        self.frames.truncate(frames);
        self.stack.truncate(stack_len);
        debug!(frames, stack = stack_len, "unwound after runtime error");
    }

    /// Builds an error carrying the current call stack.
    pub(crate) fn error(&self, kind: ErrorKind) -> RuntimeError {
        let trace = self
            .frames
            .iter()
            .rev()
            .map(|frame| match frame.kind {
                FrameKind::Native => TraceFrame::Native {
                    name: self.heap.str(self.heap.native(frame.callee).name).to_string(),
                },
                _ => {
                    let function = self.heap.function(self.heap.closure(frame.callee).function);
                    TraceFrame::Script {
                        path: self.heap.str(function.path).to_string(),
                        line: frame.chunk.line_at(frame.ip.saturating_sub(1)),
                        function: function.name.map(|n| self.heap.str(n).to_string()),
                    }
                }
            })
            .collect();
        debug!(error = %kind, depth = self.frames.len(), "runtime error raised");
        RuntimeError { kind, trace }
    }

    /// Bytecode listing of `source` without running it.
    pub fn disassemble(&mut self, path: &str, source: &str) -> Result<String, InterpretError> {
        let function = compile(self, path, source)?;
        Ok(crate::chunk::disasm::disassemble(&self.heap, function))
    }

    /// Sets the global `args` array.
    pub fn set_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let array = self.alloc(Object::Array(Default::default()));
        self.args = Some(array);
        for arg in args {
            let s = self.intern(arg.as_ref());
            let before = self.heap.object_size(array);
            self.heap.array_items_mut(array).push(Value::object(s));
            self.grew(array, before);
        }
        let name = self.intern("args");
        self.define_global(name, Value::object(array), false);
    }

    // ── Heap stats ───────────────────────────────────────────────────

    pub fn bytes_allocated(&self) -> usize {
        self.heap.bytes_allocated()
    }

    pub fn live_objects(&self) -> usize {
        self.heap.live_objects()
    }

    pub fn collections(&self) -> usize {
        self.heap.collections()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> Result<Value, InterpretError> {
        let config = Config { print_errors: false, ..Config::default() };
        Interpreter::new(config).interpret("test", source)
    }

    fn number(source: &str) -> f64 {
        match run(source) {
            Ok(v) => v.as_number().unwrap_or(f64::NAN),
            Err(e) => panic!("{e}"),
        }
    }

    fn runtime_message(source: &str) -> String {
        match run(source) {
            Err(InterpretError::Runtime(e)) => e.message(),
            other => panic!("expected runtime error, got {other:?}"),
        }
    }

    #[test]
    fn arithmetic() {
        assert_eq!(number("return 1 + 2 * 3;"), 7.0);
        assert_eq!(number("return 10 % 3;"), 1.0);
        assert_eq!(number("return -(4 - 6) / 4;"), 0.5);
    }

    #[test]
    fn comparison_and_logic() {
        assert_eq!(run("return 1 < 2 && 3 >= 3;").unwrap(), Value::boolean(true));
        assert_eq!(run("return null || 5;").unwrap(), Value::number(5.0));
        assert_eq!(run("return !0;").unwrap(), Value::boolean(false));
    }

    #[test]
    fn locals_and_loops() {
        assert_eq!(number("var s = 0; for (var i = 0; i < 5; i++) s += i; return s;"), 10.0);
        assert_eq!(number("var n = 0; while (n < 7) n++; return n;"), 7.0);
        assert_eq!(
            number("var n = 0; loop { n++; if (n == 3) break; } return n;"),
            3.0
        );
    }

    #[test]
    fn labeled_break_skips_outer_loop() {
        let source = "
            var hits = 0;
            for (var i = 0; i < 3; i++) :outer {
                for (var j = 0; j < 3; j++) {
                    if (j == 1) continue outer;
                    hits++;
                }
            }
            return hits;";
        assert_eq!(number(source), 3.0);
    }

    #[test]
    fn closures_capture_and_close() {
        let source = "
            fn counter() {
                var n = 0;
                return fn() { n++; return n; };
            }
            var c = counter();
            c(); c();
            return c();";
        assert_eq!(number(source), 3.0);
    }

    #[test]
    fn undefined_variable_and_assignment() {
        assert_eq!(runtime_message("return nope;"), "Undefined variable 'nope'");
        assert_eq!(runtime_message("nope = 1;"), "Undefined variable 'nope'");
    }

    #[test]
    fn type_errors() {
        assert_eq!(runtime_message("return 1 + true;"), "Operands must be numbers");
        assert_eq!(runtime_message("return -null;"), "Operand must be a number");
        assert_eq!(runtime_message("return 3();"), "Cannot call that value");
    }

    #[test]
    fn stack_overflow_is_reported() {
        let msg = runtime_message("fn f() -> f(); f();");
        assert_eq!(msg, "Stack overflow");
    }

    #[test]
    fn module_cache_keeps_return_value() {
        let config = Config { print_errors: false, ..Config::default() };
        let mut vm = Interpreter::new(config);
        vm.interpret("m", "return 42;").unwrap();
        assert_eq!(vm.module("m"), Some(Value::number(42.0)));
        assert_eq!(vm.module("other"), None);
    }

    #[test]
    fn interpreter_recovers_after_error() {
        let config = Config { print_errors: false, ..Config::default() };
        let mut vm = Interpreter::new(config);
        assert!(vm.interpret("a", "var x = 1; x();").is_err());
        assert!(vm.stack.is_empty());
        assert!(vm.frames.is_empty());
        assert_eq!(vm.interpret("b", "return 2;").unwrap(), Value::number(2.0));
    }

    #[test]
    fn builtin_type_structs_are_constant() {
        let config = Config { print_errors: false, ..Config::default() };
        let mut vm = Interpreter::new(config);
        assert!(vm.is_const_global("Number"));
        assert!(matches!(vm.interpret("t", "Array = 1;"), Err(InterpretError::Compile(_))));
    }
}

//! Calling convention, upvalue capture and the host-facing call protocols.
//!
//! A call site pushes the callee and then its arguments. Script functions get
//! a frame whose slot 0 is the callee (or the receiver, for methods) and run
//! in the dispatch loop. Natives run to completion on the host stack and
//! leave exactly one value where the callee was.

use tracing::debug;

use super::{ErrorKind, Frame, FrameKind, Interpreter, RuntimeError};
use crate::object::{Arity, ObjRef, Object, Upvalue};
use crate::value::Value;

impl Interpreter {
    /// Starts a call of `callee` with the `argc` values on top of the stack.
    /// Closures only get a frame; the caller's loop executes it.
    pub(crate) fn call_value(&mut self, callee: Value, argc: usize) -> Result<(), RuntimeError> {
        if let Some(r) = callee.as_obj() {
            match self.heap.get(r) {
                Object::Closure(_) => return self.call_closure(r, argc),
                Object::Native(_) => return self.call_native(r, argc),
                Object::BoundMethod(bound) => {
                    let (receiver, method) = (bound.receiver, bound.method);
                    let slot = self.stack.len() - argc - 1;
                    self.stack[slot] = receiver;
                    return self.call_value(method, argc);
                }
                _ => {}
            }
        }
        Err(self.error(ErrorKind::NotCallable))
    }

    fn check_depth(&self) -> Result<(), RuntimeError> {
        if self.frames.len() >= self.config.max_frames {
            return Err(self.error(ErrorKind::StackOverflow));
        }
        Ok(())
    }

    fn call_closure(&mut self, closure: ObjRef, argc: usize) -> Result<(), RuntimeError> {
        let function = self.heap.function(self.heap.closure(closure).function);
        if usize::from(function.arity) != argc {
            let expected = function.arity;
            return Err(self.error(ErrorKind::Arity { expected, got: argc }));
        }
        let chunk = function.chunk.clone();
        self.check_depth()?;
        self.frames.push(Frame {
            kind: FrameKind::Call,
            callee: closure,
            chunk,
            ip: 0,
            base: self.stack.len() - argc - 1,
        });
        Ok(())
    }

    fn call_native(&mut self, native: ObjRef, argc: usize) -> Result<(), RuntimeError> {
        let n = self.heap.native(native);
        if let Arity::Fixed(expected) = n.arity {
            if usize::from(expected) != argc {
                return Err(self.error(ErrorKind::Arity { expected, got: argc }));
            }
        }
        let function = n.function;
        self.check_depth()?;

        let base = self.stack.len() - argc - 1;
        self.frames.push(Frame { kind: FrameKind::Native, callee: native, chunk: self.no_code.clone(), ip: 0, base });
        let returned = function(self, argc)?;
        let result = if returned { self.pop() } else { Value::NULL };
        self.stack.truncate(base);
        self.frames.pop();
        self.push(result);
        Ok(())
    }

    /// Fused property lookup and call: `receiver.name(args)` without
    /// allocating a bound method. Fields shadow methods, as with `.name`.
    pub(crate) fn invoke(&mut self, name: ObjRef, argc: usize) -> Result<(), RuntimeError> {
        let receiver = self.peek(argc);
        if let Some(field) = self.instance_field(receiver, name) {
            let slot = self.stack.len() - argc - 1;
            self.stack[slot] = field;
            return self.call_value(field, argc);
        }
        let method = self.lookup_method(receiver, name)?;
        self.call_value(method, argc)
    }

    // ── Upvalues ─────────────────────────────────────────────────────

    fn open_slot(&self, upvalue: ObjRef) -> usize {
        match self.heap.upvalue(upvalue) {
            Upvalue::Open(slot) => *slot,
            Upvalue::Closed(_) => usize::MAX,
        }
    }

    /// Returns the open cell for a stack slot, creating it if no closure has
    /// captured that slot yet.
    pub(crate) fn capture_upvalue(&mut self, slot: usize) -> ObjRef {
        let pos = self.open_upvalues.partition_point(|&r| self.open_slot(r) < slot);
        if let Some(&existing) = self.open_upvalues.get(pos) {
            if self.open_slot(existing) == slot {
                return existing;
            }
        }
        let upvalue = self.alloc(Object::Upvalue(Upvalue::Open(slot)));
        let pos = self.open_upvalues.partition_point(|&r| self.open_slot(r) < slot);
        self.open_upvalues.insert(pos, upvalue);
        upvalue
    }

    /// Closes every open cell pointing at `from` or above.
    pub(crate) fn close_upvalues(&mut self, from: usize) {
        while let Some(&r) = self.open_upvalues.last() {
            let slot = self.open_slot(r);
            if slot < from {
                break;
            }
            let value = self.stack.get(slot).copied().unwrap_or_default();
            *self.heap.upvalue_mut(r) = Upvalue::Closed(value);
            self.open_upvalues.pop();
        }
    }

    pub(crate) fn read_upvalue(&self, upvalue: ObjRef) -> Value {
        match *self.heap.upvalue(upvalue) {
            Upvalue::Open(slot) => self.stack[slot],
            Upvalue::Closed(v) => v,
        }
    }

    pub(crate) fn write_upvalue(&mut self, upvalue: ObjRef, value: Value) {
        match self.heap.upvalue_mut(upvalue) {
            Upvalue::Open(slot) => {
                let slot = *slot;
                self.stack[slot] = value;
            }
            Upvalue::Closed(v) => *v = value,
        }
    }

    // ── Host-facing calls ────────────────────────────────────────────

    /// Runs a script frame pushed by `call_value` until it returns here.
    pub(crate) fn finish_call(&mut self, depth: usize) -> Result<(), RuntimeError> {
        if self.frames.len() > depth {
            if let Some(frame) = self.frames.last_mut() {
                frame.kind = FrameKind::Reentrant;
            }
            self.run()?;
        }
        Ok(())
    }

    /// An error that reaches the host with no script frame below it resets
    /// the interpreter to an empty stack.
    pub(crate) fn settle<T>(&mut self, depth: usize, result: Result<T, RuntimeError>) -> Result<T, RuntimeError> {
        if result.is_err() && depth == 0 {
            self.unwind(0, 0);
        }
        result
    }

    fn call_unprotected(&mut self, argc: usize) -> Result<(), RuntimeError> {
        let callee = self.peek(argc);
        let depth = self.frames.len();
        self.call_value(callee, argc)?;
        self.finish_call(depth)
    }

    /// Calls the value below the top `argc` values. On success the callee
    /// and arguments are replaced by the result. From inside a native call
    /// errors propagate without unwinding; from the top level they clear the
    /// stack. Use [`pcall`](Self::pcall) to contain them.
    pub fn call(&mut self, argc: usize) -> Result<(), RuntimeError> {
        let depth = self.frames.len();
        let result = self.call_unprotected(argc);
        self.settle(depth, result)
    }

    /// Protected [`call`](Self::call). On failure the stack and frames are
    /// restored to their state before the callee was pushed and the error is
    /// returned.
    pub fn pcall(&mut self, argc: usize) -> Result<(), RuntimeError> {
        let frames = self.frames.len();
        let stack_len = self.stack.len() - argc - 1;
        match self.call_unprotected(argc) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.unwind(frames, stack_len);
                debug!(error = %err.kind, "protected call caught error");
                Err(err)
            }
        }
    }

    /// Calls method `name` on the receiver below the top `argc` values.
    pub fn call_method(&mut self, name: &str, argc: usize) -> Result<(), RuntimeError> {
        let name = self.intern(name);
        let depth = self.frames.len();
        let result = self.invoke(name, argc).and_then(|()| self.finish_call(depth));
        self.settle(depth, result)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::object::Arity;
    use crate::value::Value;
    use crate::vm::{ErrorKind, Interpreter, RuntimeError};

    fn vm() -> Interpreter {
        Interpreter::new(Config { print_errors: false, ..Config::default() })
    }

    fn add(vm: &mut Interpreter, _argc: usize) -> Result<bool, RuntimeError> {
        let a = vm.get_number(1)?;
        let b = vm.get_number(2)?;
        vm.push_number(a + b);
        Ok(true)
    }

    #[test]
    fn host_calls_native() {
        let mut vm = vm();
        vm.push_native("add", add, Arity::Fixed(2));
        vm.push_number(2.0);
        vm.push_number(3.0);
        vm.call(2).unwrap();
        assert_eq!(vm.stack, vec![Value::number(5.0)]);
    }

    #[test]
    fn native_arity_is_checked() {
        let mut vm = vm();
        vm.push_native("add", add, Arity::Fixed(2));
        vm.push_number(2.0);
        let err = vm.pcall(1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Arity { expected: 2, got: 1 });
        assert!(vm.stack.is_empty());
    }

    #[test]
    fn host_calls_script_function() {
        let mut vm = vm();
        vm.interpret("m", "fn twice(x) -> x * 2; return twice;").unwrap();
        let f = vm.module("m").unwrap();
        vm.stack.push(f);
        vm.push_number(21.0);
        vm.call(1).unwrap();
        assert_eq!(vm.stack, vec![Value::number(42.0)]);
        assert!(vm.frames.is_empty());
    }

    #[test]
    fn pcall_recovers_from_uncallable() {
        let mut vm = vm();
        vm.push_number(1.0);
        let err = vm.pcall(0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotCallable);
        assert!(vm.stack.is_empty());
        vm.push_native("add", add, Arity::Fixed(2));
        vm.push_number(1.0);
        vm.push_number(1.0);
        vm.pcall(2).unwrap();
        assert_eq!(vm.stack, vec![Value::number(2.0)]);
    }

    #[test]
    fn shared_upvalue_sees_writes_until_closed() {
        let mut vm = vm();
        let source = "
            var get; var set;
            {
                var x = 1;
                get = fn() -> x;
                set = fn(v) { x = v; };
                set(5);
                if (get() != 5) error(\"not shared\");
            }
            set(9);
            return get();";
        assert_eq!(vm.interpret("t", source).unwrap(), Value::number(9.0));
        assert!(vm.open_upvalues.is_empty());
    }

    #[test]
    fn closures_from_separate_scopes_are_independent() {
        let mut vm = vm();
        let source = "
            var fs = [];
            for (var i = 0; i < 3; i++) {
                var j = i;
                fs.push(fn() -> j);
            }
            return fs[0]() + fs[1]() * 10 + fs[2]() * 100;";
        assert_eq!(vm.interpret("t", source).unwrap(), Value::number(210.0));
    }
}

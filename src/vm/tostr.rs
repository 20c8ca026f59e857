//! Turning values into strings.

use super::{ErrorKind, Interpreter, RuntimeError};
use crate::gc::Heap;
use crate::object::{ObjRef, Object};
use crate::value::{Unpacked, Value, format_number};

/// Plain text for a value, without consulting `tostr` methods.
pub fn describe(heap: &Heap, value: Value) -> String {
    match value.unpack() {
        Unpacked::Null => "null".to_string(),
        Unpacked::Bool(b) => b.to_string(),
        Unpacked::Number(n) => format_number(n),
        Unpacked::Obj(r) => describe_object(heap, r),
    }
}

fn describe_function(heap: &Heap, function: ObjRef) -> String {
    match heap.function(function).name {
        Some(name) => format!("<fn {}>", heap.str(name)),
        None => "<script>".to_string(),
    }
}

fn describe_object(heap: &Heap, r: ObjRef) -> String {
    match heap.get(r) {
        Object::String(s) => s.chars.to_string(),
        Object::Function(_) => describe_function(heap, r),
        Object::Closure(c) => describe_function(heap, c.function),
        Object::BoundMethod(b) => describe(heap, b.method),
        Object::Native(n) => format!("<native fn {}>", heap.str(n.name)),
        Object::Instance(i) => format!("<{} instance>", heap.str(heap.struct_def(i.def).name)),
        Object::Struct(s) => format!("<{}>", heap.str(s.name)),
        Object::Enum(e) => format!("<enum {}>", heap.str(e.name)),
        Object::Array(_) => "<Array>".to_string(),
        Object::Map(_) => "<Map>".to_string(),
        Object::UserData(_) => "<UserData>".to_string(),
        Object::Upvalue(_) => "<upvalue>".to_string(),
    }
}

impl Interpreter {
    /// Plain text for `value`, as [`describe`] renders it.
    pub fn describe(&self, value: Value) -> String {
        describe(&self.heap, value)
    }

    /// Contents of `value` if it is a string.
    pub fn value_str(&self, value: Value) -> Option<&str> {
        self.heap.as_str(value)
    }

    /// `tostr` method of an instance or user data, if it has one.
    fn tostr_method(&self, value: Value) -> Option<Value> {
        let def = match self.heap.get(value.as_obj()?) {
            Object::Instance(i) => i.def,
            Object::UserData(u) => u.def?,
            _ => return None,
        };
        let name = self.builtins.tostr;
        self.heap.struct_def(def).methods.get(&name, self.heap.str_hash(name)).copied()
    }

    /// String form of `value` as an interned string. Instances and user data
    /// with a `tostr` method are converted by calling it, which must return a
    /// string. `value` must be reachable from the stack.
    pub(crate) fn stringify(&mut self, value: Value) -> Result<ObjRef, RuntimeError> {
        if let Some(r) = value.as_obj() {
            if matches!(self.heap.get(r), Object::String(_)) {
                return Ok(r);
            }
        }
        if let Some(method) = self.tostr_method(value) {
            // The receiver takes the callee slot, as for `value.tostr()`.
            self.push(value);
            let depth = self.frames.len();
            self.call_value(method, 0)?;
            self.finish_call(depth)?;
            let result = self.pop();
            return match result.as_obj() {
                Some(s) if matches!(self.heap.get(s), Object::String(_)) => Ok(s),
                _ => Err(self.error(ErrorKind::Message("'tostr' must return a string".to_string()))),
            };
        }
        let text = describe(&self.heap, value);
        Ok(self.intern_owned(text))
    }

    /// `OP_CAT`: replaces the two top values with their concatenation.
    pub(crate) fn concat_top(&mut self) -> Result<(), RuntimeError> {
        let b = self.stringify(self.peek(0))?;
        self.push(Value::object(b));
        let a = self.stringify(self.peek(2))?;
        let joined = format!("{}{}", self.heap.str(a), self.heap.str(b));
        let result = self.intern_owned(joined);
        self.stack.truncate(self.stack.len() - 3);
        self.push(Value::object(result));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::vm::{InterpretError, Interpreter};

    fn text(source: &str) -> String {
        let mut vm = Interpreter::new(Config { print_errors: false, ..Config::default() });
        let v = vm.interpret("t", source).unwrap();
        vm.heap.as_str(v).unwrap_or("<not a string>").to_string()
    }

    #[test]
    fn scalars() {
        assert_eq!(text("return 1 .. \" \" .. 2.5 .. \" \" .. true .. \" \" .. null;"), "1 2.5 true null");
        assert_eq!(text("return \"\" .. 1 / 0;"), "inf");
        assert_eq!(text("return \"\" .. 100000000000000000000;"), "1e+20");
    }

    #[test]
    fn objects() {
        assert_eq!(text("return \"\" .. [];"), "<Array>");
        assert_eq!(text("return \"\" .. {};"), "<Map>");
        assert_eq!(text("fn f() {} return \"\" .. f;"), "<fn f>");
        assert_eq!(text("return \"\" .. print;"), "<native fn print>");
        assert_eq!(text("struct P {} return P .. \" \" .. P {};"), "<P> <P instance>");
        assert_eq!(text("enum E { A } return \"\" .. E;"), "<enum E>");
    }

    #[test]
    fn tostr_method_is_used() {
        let source = "
            struct V {
                var x = 3;
                fn tostr() -> $\"V({self.x})\";
            }
            return \"v = \" .. V {};";
        assert_eq!(text(source), "v = V(3)");
    }

    #[test]
    fn tostr_must_return_string() {
        let mut vm = Interpreter::new(Config { print_errors: false, ..Config::default() });
        let err = vm.interpret("t", "struct V { fn tostr() -> 1; } return \"\" .. V {};").unwrap_err();
        let InterpretError::Runtime(err) = err else { panic!("expected runtime error") };
        assert_eq!(err.message(), "'tostr' must return a string");
    }

    #[test]
    fn interpolation() {
        assert_eq!(text("var n = 2; return $\"{n} + {n} = {n + n}\";"), "2 + 2 = 4");
    }
}

//! Property, static, subscript and type access on runtime values.

use super::{ErrorKind, Interpreter, RuntimeError};
use crate::object::{BoundMethod, Instance, ObjRef, Object};
use crate::value::{Unpacked, Value};

impl Interpreter {
    pub(crate) fn instance_field(&self, receiver: Value, name: ObjRef) -> Option<Value> {
        let r = receiver.as_obj()?;
        match self.heap.get(r) {
            Object::Instance(inst) => inst.fields.get(&name, self.heap.str_hash(name)).copied(),
            _ => None,
        }
    }

    /// Struct whose method table serves `receiver`. `Ok(None)` means the
    /// value has properties but no methods (user data without a struct).
    fn method_struct(&self, receiver: Value) -> Result<Option<ObjRef>, RuntimeError> {
        if let Some(r) = receiver.as_obj() {
            match self.heap.get(r) {
                Object::Instance(inst) => return Ok(Some(inst.def)),
                Object::Array(_) => return Ok(Some(self.builtins.array)),
                Object::String(_) => return Ok(Some(self.builtins.string)),
                Object::Map(_) => return Ok(Some(self.builtins.map)),
                Object::UserData(u) => return Ok(u.def),
                _ => {}
            }
        }
        Err(self.error(ErrorKind::NoProperties))
    }

    pub(crate) fn lookup_method(&self, receiver: Value, name: ObjRef) -> Result<Value, RuntimeError> {
        let def = self.method_struct(receiver)?;
        let hash = self.heap.str_hash(name);
        def.and_then(|d| self.heap.struct_def(d).methods.get(&name, hash).copied())
            .ok_or_else(|| self.error(ErrorKind::UndefinedProperty(self.heap.str(name).to_string())))
    }

    /// `receiver.name`: a field, or a method bound to the receiver.
    /// The receiver must stay reachable (on the stack) across this call.
    pub(crate) fn property(&mut self, receiver: Value, name: ObjRef) -> Result<Value, RuntimeError> {
        if let Some(field) = self.instance_field(receiver, name) {
            return Ok(field);
        }
        let method = self.lookup_method(receiver, name)?;
        let bound = self.alloc(Object::BoundMethod(BoundMethod { receiver, method }));
        Ok(Value::object(bound))
    }

    /// `receiver.name = value`. Only declared fields of instances can be set.
    pub(crate) fn set_property(&mut self, receiver: Value, name: ObjRef, value: Value) -> Result<(), RuntimeError> {
        let hash = self.heap.str_hash(name);
        if let Some(r) = receiver.as_obj() {
            if let Object::Instance(inst) = self.heap.get_mut(r) {
                if let Some(slot) = inst.fields.get_mut(&name, hash) {
                    *slot = value;
                    return Ok(());
                }
                return Err(self.error(ErrorKind::UndefinedProperty(self.heap.str(name).to_string())));
            }
            if matches!(self.heap.get(r), Object::Array(_) | Object::String(_) | Object::Map(_) | Object::UserData(_)) {
                return Err(self.error(ErrorKind::UndefinedProperty(self.heap.str(name).to_string())));
            }
        }
        Err(self.error(ErrorKind::NoProperties))
    }

    /// `Owner:name` on a struct or an enum.
    pub(crate) fn static_get(&self, owner: Value, name: ObjRef) -> Result<Value, RuntimeError> {
        let hash = self.heap.str_hash(name);
        let found = match owner.as_obj().map(|r| self.heap.get(r)) {
            Some(Object::Struct(s)) => s.statics.get(&name, hash),
            Some(Object::Enum(e)) => e.values.get(&name, hash),
            _ => return Err(self.error(ErrorKind::NoStatics)),
        };
        found
            .copied()
            .ok_or_else(|| self.error(ErrorKind::UndefinedStatic(self.heap.str(name).to_string())))
    }

    // ── Subscripts ───────────────────────────────────────────────────

    /// Resolves a possibly negative index against `len`.
    fn index(&self, key: Value, len: usize) -> Result<usize, RuntimeError> {
        let Some(n) = key.as_number() else {
            return Err(self.error(ErrorKind::OperandNotNumber));
        };
        let mut i = n as i64;
        if i < 0 {
            i += len as i64;
        }
        if i < 0 || i >= len as i64 {
            return Err(self.error(ErrorKind::IndexOutOfBounds));
        }
        Ok(i as usize)
    }

    /// `container[key]`. Both operands must stay on the stack.
    pub(crate) fn subscript_get(&mut self, container: Value, key: Value) -> Result<Value, RuntimeError> {
        let Some(r) = container.as_obj() else {
            return Err(self.error(ErrorKind::NotSubscriptable));
        };
        match self.heap.get(r) {
            Object::Array(a) => {
                let i = self.index(key, a.items.len())?;
                Ok(self.heap.array_items(r)[i])
            }
            Object::String(s) => {
                let i = self.index(key, s.chars.chars().count())?;
                let c = self.heap.str(r).chars().nth(i).unwrap_or_default();
                Ok(Value::object(self.intern_owned(c.to_string())))
            }
            Object::Map(m) => {
                let hash = self.heap.hash_value(key);
                m.entries.get(&key, hash).copied().ok_or_else(|| self.error(ErrorKind::UndefinedKey))
            }
            _ => Err(self.error(ErrorKind::NotSubscriptable)),
        }
    }

    /// `container[key] = value`. Arrays take existing indices, maps take
    /// any key.
    pub(crate) fn subscript_set(&mut self, container: Value, key: Value, value: Value) -> Result<(), RuntimeError> {
        let Some(r) = container.as_obj() else {
            return Err(self.error(ErrorKind::NotSubscriptable));
        };
        match self.heap.get(r) {
            Object::Array(a) => {
                let i = self.index(key, a.items.len())?;
                self.heap.array_items_mut(r)[i] = value;
                Ok(())
            }
            Object::Map(_) => {
                let hash = self.heap.hash_value(key);
                let before = self.heap.object_size(r);
                self.heap.map_mut(r).entries.insert(key, hash, value);
                self.grew(r, before);
                Ok(())
            }
            _ => Err(self.error(ErrorKind::NotSubscriptable)),
        }
    }

    /// Element `index` of the array being destructured. `null` destructures
    /// to `null` everywhere.
    pub(crate) fn destructure(&self, source: Value, index: usize) -> Result<Value, RuntimeError> {
        if source.is_null() {
            return Ok(Value::NULL);
        }
        match source.as_obj().map(|r| self.heap.get(r)) {
            Some(Object::Array(a)) => {
                a.items.get(index).copied().ok_or_else(|| self.error(ErrorKind::DestructureLength))
            }
            _ => Err(self.error(ErrorKind::NotDestructurable)),
        }
    }

    // ── Structs and types ────────────────────────────────────────────

    /// Replaces the struct on top of the stack with a fresh instance whose
    /// fields are copies of the struct's member initializers.
    pub(crate) fn instantiate_top(&mut self) -> Result<(), RuntimeError> {
        let found = self.peek(0).as_obj().and_then(|r| match self.heap.get(r) {
            Object::Struct(s) => Some((r, s.members.clone())),
            _ => None,
        });
        let Some((def, fields)) = found else {
            return Err(self.error(ErrorKind::NotInstantiable));
        };
        let instance = self.alloc(Object::Instance(Instance { def, fields }));
        let top = self.stack.len() - 1;
        self.stack[top] = Value::object(instance);
        Ok(())
    }

    /// Struct that `is` compares against for `value`. `None` for `null`.
    pub(crate) fn type_struct(&self, value: Value) -> Option<ObjRef> {
        let b = &self.builtins;
        match value.unpack() {
            Unpacked::Null => None,
            Unpacked::Bool(_) => Some(b.boolean),
            Unpacked::Number(_) => Some(b.number),
            Unpacked::Obj(r) => Some(match self.heap.get(r) {
                Object::String(_) => b.string,
                Object::Function(_) | Object::Closure(_) | Object::Native(_) | Object::BoundMethod(_) => b.function,
                Object::Instance(i) => i.def,
                Object::Array(_) => b.array,
                Object::Map(_) => b.map,
                Object::UserData(u) => u.def.unwrap_or(b.userdata),
                Object::Struct(_) | Object::Enum(_) | Object::Upvalue(_) => r,
            }),
        }
    }

    /// `value is Struct`.
    pub(crate) fn is_instance_of(&self, value: Value, ty: Value) -> Result<bool, RuntimeError> {
        let Some(ty) = ty.as_obj().filter(|&r| matches!(self.heap.get(r), Object::Struct(_))) else {
            return Err(self.error(ErrorKind::NotAType));
        };
        Ok(self.type_struct(value) == Some(ty))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::value::Value;
    use crate::vm::{InterpretError, Interpreter};

    fn run(source: &str) -> Result<Value, InterpretError> {
        Interpreter::new(Config { print_errors: false, ..Config::default() }).interpret("test", source)
    }

    fn message(source: &str) -> String {
        match run(source) {
            Err(InterpretError::Runtime(e)) => e.message(),
            other => panic!("expected runtime error, got {other:?}"),
        }
    }

    #[test]
    fn array_subscripts_wrap_negative_indices() {
        assert_eq!(run("var a = [1, 2, 3]; return a[-1];").unwrap(), Value::number(3.0));
        assert_eq!(run("var a = [1, 2, 3]; a[0] += 10; return a[0];").unwrap(), Value::number(11.0));
        assert_eq!(message("var a = [1]; return a[1];"), "Index out of bounds");
        assert_eq!(message("var a = [1]; return a[\"x\"];"), "Operand must be a number");
    }

    #[test]
    fn string_subscripts_are_character_based() {
        let mut vm = Interpreter::new(Config::default());
        let v = vm.interpret("t", "return \"héllo\"[1];").unwrap();
        assert_eq!(vm.heap.as_str(v), Some("é"));
        assert_eq!(message("var s = \"ab\"; s[0] = \"c\";"), "Cannot use subscript operator on that value");
    }

    #[test]
    fn map_subscripts() {
        assert_eq!(run("var m = {\"a\" -> 1}; m[\"b\"] = 2; return m[\"a\"] + m[\"b\"];").unwrap(), Value::number(3.0));
        assert_eq!(message("var m = {}; return m[1];"), "Undefined map key");
        assert_eq!(message("return 1[0];"), "Cannot use subscript operator on that value");
    }

    #[test]
    fn instance_fields_must_be_declared() {
        let source = "
            struct P { var x = 1; }
            var p = P {};
            p.y = 2;";
        assert_eq!(message(source), "Undefined property 'y'");
        assert_eq!(message("struct Q { var a; } return Q { b = 1 };"), "Undefined property 'b'");
        assert_eq!(message("var n = 1; return n.x;"), "Cannot access properties on that value");
    }

    #[test]
    fn bound_methods_remember_receiver() {
        let source = "
            struct Counter {
                var n = 0;
                fn bump() { self.n++; return self.n; }
            }
            var c = Counter {};
            var f = c.bump;
            f(); f();
            return c.n;";
        assert_eq!(run(source).unwrap(), Value::number(2.0));
    }

    #[test]
    fn statics_and_enums() {
        let source = "
            struct Shape {
                const SIDES = 4;
                enum Kind { Square, Circle }
            }
            enum Color { Red, Green, Blue }
            return Shape:SIDES * 100 + Shape:Kind:Circle * 10 + Color:Blue;";
        assert_eq!(run(source).unwrap(), Value::number(412.0));
        assert_eq!(message("enum E { A } return E:B;"), "Undefined static property 'B'");
        assert_eq!(message("return 1:A;"), "Cannot access static properties on that value");
        assert_eq!(message("enum E { A, A }"), "Enum value 'A' is already defined");
    }

    #[test]
    fn is_checks_builtin_and_user_types() {
        let source = "
            struct P {}
            var checks = [
                1 is Number, true is Boolean, \"s\" is String, [] is Array,
                {} is Map, print is Function, P {} is P, !(null is P),
            ];
            for (var i = 0; i < checks.len(); i++) if (!checks[i]) return i;
            return -1;";
        assert_eq!(run(source).unwrap(), Value::number(-1.0));
        assert_eq!(message("return 1 is 2;"), "Right operand of 'is' must be a struct");
    }

    #[test]
    fn destructuring() {
        assert_eq!(run("var a, b = [1, 2]; return a * 10 + b;").unwrap(), Value::number(12.0));
        assert_eq!(run("var a, b = null; return a;").unwrap(), Value::NULL);
        assert_eq!(message("var a, b = [1];"), "Not enough values to destructure");
        assert_eq!(message("var a, b = 5;"), "Cannot destructure that value");
    }
}

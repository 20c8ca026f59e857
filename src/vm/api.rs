//! Stack-based embedding API.
//!
//! Host code and natives talk to the interpreter through stack slots.
//! Non-negative indices count from the current frame's slot 0 (inside a
//! native: the callee or receiver, then the arguments). Negative indices
//! count back from the top, `-1` being the topmost value.
//!
//! ```no_run
//! use hobby::{Config, Interpreter};
//!
//! let mut vm = Interpreter::new(Config::default());
//! vm.interpret("lib", "fn square(x) -> x * x;").unwrap();
//! vm.get_global("square").unwrap();
//! vm.push_number(7.0);
//! vm.call(1).unwrap();
//! assert_eq!(vm.get_number(-1).unwrap(), 49.0);
//! ```

use std::any::Any;

use super::{ErrorKind, Interpreter, RuntimeError};
use crate::object::{Arity, EnumDef, NameTable, Native, NativeFn, ObjRef, Object, StructDef, UserData};
use crate::value::{Unpacked, Value};

/// Coarse type of a stack value, as seen by host code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Null,
    Bool,
    Number,
    String,
    Function,
    Native,
    Struct,
    Instance,
    Enum,
    Array,
    Map,
    UserData,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Null => "null",
            ValueType::Bool => "boolean",
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Function => "function",
            ValueType::Native => "native function",
            ValueType::Struct => "struct",
            ValueType::Instance => "instance",
            ValueType::Enum => "enum",
            ValueType::Array => "array",
            ValueType::Map => "map",
            ValueType::UserData => "userdata",
        }
    }
}

impl Interpreter {
    // ── Slots ────────────────────────────────────────────────────────

    fn slot(&self, index: isize) -> Result<usize, RuntimeError> {
        let slot = if index >= 0 {
            self.frame_base().checked_add(index as usize)
        } else {
            self.stack.len().checked_sub(index.unsigned_abs())
        };
        slot.filter(|&s| s < self.stack.len())
            .ok_or_else(|| self.error(ErrorKind::StackIndex(index)))
    }

    pub(crate) fn value_at(&self, index: isize) -> Result<Value, RuntimeError> {
        Ok(self.stack[self.slot(index)?])
    }

    /// Value at `index`, or `None` when the slot is past the top or holds
    /// `null`. Natives use it for optional trailing arguments.
    fn optional_at(&self, index: isize) -> Option<Value> {
        let slot = self.slot(index).ok()?;
        Some(self.stack[slot]).filter(|v| !v.is_null())
    }

    fn type_error(&self, expected: &'static str, got: Value) -> RuntimeError {
        self.error(ErrorKind::Type { expected, got: self.type_of(got).name() })
    }

    /// Number of slots in the current frame.
    pub fn top(&self) -> usize {
        self.stack.len() - self.frame_base()
    }

    pub fn pop_n(&mut self, n: usize) {
        let len = self.stack.len().saturating_sub(n);
        self.stack.truncate(len);
    }

    /// Pushes a copy of the value at `index`.
    pub fn push_copy(&mut self, index: isize) -> Result<(), RuntimeError> {
        let v = self.value_at(index)?;
        self.push(v);
        Ok(())
    }

    // ── Pushing ──────────────────────────────────────────────────────

    pub fn push_null(&mut self) {
        self.push(Value::NULL);
    }

    pub fn push_bool(&mut self, b: bool) {
        self.push(Value::boolean(b));
    }

    pub fn push_number(&mut self, n: f64) {
        self.push(Value::number(n));
    }

    pub fn push_str(&mut self, s: &str) {
        let r = self.intern(s);
        self.push(Value::object(r));
    }

    pub fn push_string(&mut self, s: String) {
        let r = self.intern_owned(s);
        self.push(Value::object(r));
    }

    /// Allocates a native function object named `name`.
    pub(crate) fn new_native(&mut self, name: &str, function: NativeFn, arity: Arity) -> ObjRef {
        let name = self.intern(name);
        self.push(Value::object(name));
        let native = self.alloc(Object::Native(Native { name, arity, function }));
        self.pop();
        native
    }

    pub fn push_native(&mut self, name: &str, function: NativeFn, arity: Arity) {
        let native = self.new_native(name, function, arity);
        self.push(Value::object(native));
    }

    /// Pushes a new struct with no members.
    pub fn push_struct(&mut self, name: &str) {
        let name = self.intern(name);
        self.push(Value::object(name));
        let def = self.alloc(Object::Struct(StructDef {
            name,
            statics: NameTable::new(),
            methods: NameTable::new(),
            members: NameTable::new(),
        }));
        self.pop();
        self.push(Value::object(def));
    }

    /// Pushes a new enum with no values; add them with
    /// [`enum_add_value`](Self::enum_add_value).
    pub fn push_enum(&mut self, name: &str) {
        let name = self.intern(name);
        self.push(Value::object(name));
        let def = self.alloc(Object::Enum(EnumDef { name, values: NameTable::new() }));
        self.pop();
        self.push(Value::object(def));
    }

    pub fn push_array(&mut self) {
        let array = self.alloc(Object::Array(Default::default()));
        self.push(Value::object(array));
    }

    pub fn push_map(&mut self) {
        let map = self.alloc(Object::Map(Default::default()));
        self.push(Value::object(map));
    }

    /// Moves `data` into a new user data object on top of the stack.
    pub fn push_userdata<T: Any>(&mut self, data: T) {
        self.push_userdata_sized(data, 0);
    }

    /// Like [`push_userdata`](Self::push_userdata), charging the collector
    /// `heap_bytes` on top of `size_of::<T>()` for memory the payload owns.
    pub fn push_userdata_sized<T: Any>(&mut self, data: T, heap_bytes: usize) {
        let ud = self.alloc(Object::UserData(UserData {
            data: Box::new(data),
            size: size_of::<T>() + heap_bytes,
            def: None,
            finalizer: None,
            finalized: false,
        }));
        self.push(Value::object(ud));
    }

    /// Pushes a new instance of the struct at `index`.
    pub fn instance(&mut self, index: isize) -> Result<(), RuntimeError> {
        self.push_copy(index)?;
        self.instantiate_top()
    }

    // ── Reading ──────────────────────────────────────────────────────

    pub(crate) fn type_of(&self, v: Value) -> ValueType {
        match v.unpack() {
            Unpacked::Null => ValueType::Null,
            Unpacked::Bool(_) => ValueType::Bool,
            Unpacked::Number(_) => ValueType::Number,
            Unpacked::Obj(r) => match self.heap.get(r) {
                Object::String(_) => ValueType::String,
                Object::Function(_) | Object::Closure(_) | Object::BoundMethod(_) => ValueType::Function,
                Object::Native(_) => ValueType::Native,
                Object::Struct(_) => ValueType::Struct,
                Object::Instance(_) => ValueType::Instance,
                Object::Enum(_) => ValueType::Enum,
                Object::Array(_) => ValueType::Array,
                Object::Map(_) => ValueType::Map,
                Object::UserData(_) => ValueType::UserData,
                Object::Upvalue(_) => unreachable!("upvalue cells never reach the stack"),
            },
        }
    }

    pub fn value_type(&self, index: isize) -> Result<ValueType, RuntimeError> {
        Ok(self.type_of(self.value_at(index)?))
    }

    pub fn get_number(&self, index: isize) -> Result<f64, RuntimeError> {
        let v = self.value_at(index)?;
        v.as_number().ok_or_else(|| self.type_error("number", v))
    }

    pub fn get_bool(&self, index: isize) -> Result<bool, RuntimeError> {
        let v = self.value_at(index)?;
        v.as_bool().ok_or_else(|| self.type_error("boolean", v))
    }

    pub fn get_str(&self, index: isize) -> Result<&str, RuntimeError> {
        let v = self.value_at(index)?;
        match self.heap.as_str(v) {
            Some(s) => Ok(s),
            None => Err(self.type_error("string", v)),
        }
    }

    /// Borrows the host data of the user data at `index`.
    pub fn get_userdata<T: Any>(&mut self, index: isize) -> Result<&mut T, RuntimeError> {
        let v = self.value_at(index)?;
        let is_t = v.as_obj().is_some_and(|r| match self.heap.get(r) {
            Object::UserData(u) => u.data.is::<T>(),
            _ => false,
        });
        match v.as_obj() {
            Some(r) if is_t => match self.heap.userdata_mut(r).data.downcast_mut::<T>() {
                Some(data) => Ok(data),
                None => unreachable!("type checked above"),
            },
            _ => Err(self.type_error(std::any::type_name::<T>(), v)),
        }
    }

    pub fn opt_number(&self, index: isize) -> Result<Option<f64>, RuntimeError> {
        self.optional_at(index).map(|_| self.get_number(index)).transpose()
    }

    pub fn opt_bool(&self, index: isize) -> Result<Option<bool>, RuntimeError> {
        self.optional_at(index).map(|_| self.get_bool(index)).transpose()
    }

    pub fn opt_str(&self, index: isize) -> Result<Option<&str>, RuntimeError> {
        self.optional_at(index).map(|_| self.get_str(index)).transpose()
    }

    /// String form of the value at `index`, calling its `tostr` method if it
    /// has one.
    pub fn tostr(&mut self, index: isize) -> Result<String, RuntimeError> {
        let v = self.value_at(index)?;
        let depth = self.frames.len();
        let result = self.stringify(v);
        let s = self.settle(depth, result)?;
        Ok(self.heap.str(s).to_string())
    }

    /// Length of the string (in characters), array or map at `index`.
    pub fn len(&self, index: isize) -> Result<usize, RuntimeError> {
        let v = self.value_at(index)?;
        match v.as_obj().map(|r| self.heap.get(r)) {
            Some(Object::String(s)) => Ok(s.chars.chars().count()),
            Some(Object::Array(a)) => Ok(a.items.len()),
            Some(Object::Map(m)) => Ok(m.entries.len()),
            _ => Err(self.type_error("string, array or map", v)),
        }
    }

    /// Replaces the top `n` values with the concatenation of their string
    /// forms.
    pub fn concat(&mut self, n: usize) -> Result<(), RuntimeError> {
        if n > self.stack.len() {
            return Err(self.error(ErrorKind::StackIndex(-(n as isize))));
        }
        let start = self.stack.len() - n;
        let mut out = String::new();
        let depth = self.frames.len();
        for i in start..start + n {
            let result = self.stringify(self.stack[i]);
            let s = self.settle(depth, result)?;
            out.push_str(self.heap.str(s));
        }
        let joined = self.intern_owned(out);
        self.stack.truncate(start);
        self.push(Value::object(joined));
        Ok(())
    }

    // ── Globals ──────────────────────────────────────────────────────

    /// Pops the top value into global `name`.
    pub fn set_global(&mut self, name: &str) {
        let name = self.intern(name);
        let value = self.pop();
        self.define_global(name, value, false);
    }

    /// Like [`set_global`](Self::set_global); scripts cannot reassign it.
    pub fn set_const_global(&mut self, name: &str) {
        let name = self.intern(name);
        let value = self.pop();
        self.define_global(name, value, true);
    }

    pub fn get_global(&mut self, name: &str) -> Result<(), RuntimeError> {
        let found = self
            .heap
            .find_string(name)
            .and_then(|r| self.globals.get(&r, self.heap.str_hash(r)).copied());
        match found {
            Some(v) => {
                self.push(v);
                Ok(())
            }
            None => Err(self.error(ErrorKind::UndefinedVariable(name.to_string()))),
        }
    }

    // ── Properties ───────────────────────────────────────────────────

    /// Whether `value.name` would resolve for the value at `index`.
    pub fn has_property(&self, index: isize, name: &str) -> bool {
        let (Ok(v), Some(name)) = (self.value_at(index), self.heap.find_string(name)) else {
            return false;
        };
        self.instance_field(v, name).is_some() || self.lookup_method(v, name).is_ok()
    }

    /// Pushes `value.name` for the value at `index`; methods come back
    /// bound to the value.
    pub fn get_property(&mut self, index: isize, name: &str) -> Result<(), RuntimeError> {
        let v = self.value_at(index)?;
        let name = self.intern(name);
        let prop = self.property(v, name)?;
        self.push(prop);
        Ok(())
    }

    // ── Structs and enums ────────────────────────────────────────────

    fn struct_below_top(&self) -> Result<ObjRef, RuntimeError> {
        let v = self.value_at(-2)?;
        match v.as_obj() {
            Some(r) if matches!(self.heap.get(r), Object::Struct(_)) => Ok(r),
            _ => Err(self.type_error("struct", v)),
        }
    }

    fn struct_add(&mut self, name: &str, table: fn(&mut StructDef) -> &mut NameTable<Value>) -> Result<(), RuntimeError> {
        let def = self.struct_below_top()?;
        let name = self.intern(name);
        let hash = self.heap.str_hash(name);
        let value = self.pop();
        let before = self.heap.object_size(def);
        table(self.heap.struct_def_mut(def)).insert(name, hash, value);
        self.grew(def, before);
        Ok(())
    }

    /// Pops the top value into the statics of the struct below it.
    pub fn struct_add_static(&mut self, name: &str) -> Result<(), RuntimeError> {
        self.struct_add(name, |s| &mut s.statics)
    }

    /// Pops the top value into the methods of the struct below it.
    pub fn struct_add_method(&mut self, name: &str) -> Result<(), RuntimeError> {
        self.struct_add(name, |s| &mut s.methods)
    }

    /// Pops the top value into the field initializers of the struct below it.
    pub fn struct_add_member(&mut self, name: &str) -> Result<(), RuntimeError> {
        self.struct_add(name, |s| &mut s.members)
    }

    /// Pushes static `name` of the struct or enum on top of the stack.
    pub fn struct_get_static(&mut self, name: &str) -> Result<(), RuntimeError> {
        let owner = self.value_at(-1)?;
        let Some(name) = self.heap.find_string(name) else {
            return Err(self.error(ErrorKind::UndefinedStatic(name.to_string())));
        };
        let v = self.static_get(owner, name)?;
        self.push(v);
        Ok(())
    }

    /// Adds the next sequential value to the enum on top of the stack.
    pub fn enum_add_value(&mut self, name: &str) -> Result<(), RuntimeError> {
        let v = self.value_at(-1)?;
        let def = match v.as_obj() {
            Some(r) if matches!(self.heap.get(r), Object::Enum(_)) => r,
            _ => return Err(self.type_error("enum", v)),
        };
        let name = self.intern(name);
        let hash = self.heap.str_hash(name);
        if self.heap.enum_def(def).values.contains(&name, hash) {
            return Err(self.error(ErrorKind::DuplicateEnumValue(self.heap.str(name).to_string())));
        }
        let before = self.heap.object_size(def);
        let values = &mut self.heap.enum_def_mut(def).values;
        let next = Value::number(values.len() as f64);
        values.insert(name, hash, next);
        self.grew(def, before);
        Ok(())
    }

    // ── Arrays ───────────────────────────────────────────────────────

    /// Pops the top value onto the end of the array below it.
    pub fn array_push(&mut self) -> Result<(), RuntimeError> {
        let v = self.value_at(-2)?;
        let array = match v.as_obj() {
            Some(r) if matches!(self.heap.get(r), Object::Array(_)) => r,
            _ => return Err(self.type_error("array", v)),
        };
        let item = self.pop();
        let before = self.heap.object_size(array);
        self.heap.array_items_mut(array).push(item);
        self.grew(array, before);
        Ok(())
    }

    /// Pushes element `i` of the array at `index`.
    pub fn array_get(&mut self, index: isize, i: usize) -> Result<(), RuntimeError> {
        let v = self.value_at(index)?;
        let item = match v.as_obj().map(|r| self.heap.get(r)) {
            Some(Object::Array(a)) => a.items.get(i).copied(),
            _ => return Err(self.type_error("array", v)),
        };
        let item = item.ok_or_else(|| self.error(ErrorKind::IndexOutOfBounds))?;
        self.push(item);
        Ok(())
    }

    // ── User data ────────────────────────────────────────────────────

    fn userdata_at(&self, index: isize) -> Result<ObjRef, RuntimeError> {
        let v = self.value_at(index)?;
        match v.as_obj() {
            Some(r) if matches!(self.heap.get(r), Object::UserData(_)) => Ok(r),
            _ => Err(self.type_error("userdata", v)),
        }
    }

    /// Pops the struct on top and makes it the method table of the user data
    /// below it.
    pub fn userdata_set_struct(&mut self) -> Result<(), RuntimeError> {
        let ud = self.userdata_at(-2)?;
        let v = self.value_at(-1)?;
        let def = match v.as_obj() {
            Some(r) if matches!(self.heap.get(r), Object::Struct(_)) => r,
            _ => return Err(self.type_error("struct", v)),
        };
        self.heap.userdata_mut(ud).def = Some(def);
        self.pop();
        Ok(())
    }

    /// Registers `finalizer` for the user data on top of the stack. It is
    /// called once, with the user data as its argument, after the object
    /// becomes unreachable.
    pub fn userdata_set_finalizer(&mut self, finalizer: NativeFn) -> Result<(), RuntimeError> {
        let ud = self.userdata_at(-1)?;
        let native = self.new_native("finalizer", finalizer, Arity::Fixed(1));
        self.heap.userdata_mut(ud).finalizer = Some(native);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn vm() -> Interpreter {
        Interpreter::new(Config { print_errors: false, ..Config::default() })
    }

    #[test]
    fn slot_indexing() {
        let mut vm = vm();
        vm.push_number(1.0);
        vm.push_number(2.0);
        assert_eq!(vm.get_number(0).unwrap(), 1.0);
        assert_eq!(vm.get_number(-1).unwrap(), 2.0);
        assert_eq!(vm.top(), 2);
        assert_eq!(vm.get_number(2).unwrap_err().kind, ErrorKind::StackIndex(2));
        assert_eq!(vm.get_number(-3).unwrap_err().kind, ErrorKind::StackIndex(-3));
        vm.pop_n(2);
        assert_eq!(vm.top(), 0);
    }

    #[test]
    fn type_errors_name_both_types() {
        let mut vm = vm();
        vm.push_str("x");
        let err = vm.get_number(-1).unwrap_err();
        assert_eq!(err.message(), "Expected number, got string");
        assert_eq!(vm.value_type(-1).unwrap(), ValueType::String);
        assert_eq!(vm.opt_number(5).unwrap(), None);
    }

    #[test]
    fn globals_round_trip() {
        let mut vm = vm();
        vm.push_number(3.0);
        vm.set_global("three");
        vm.interpret("t", "three = three + 1;").unwrap();
        vm.get_global("three").unwrap();
        assert_eq!(vm.get_number(-1).unwrap(), 4.0);
        assert!(vm.get_global("missing").is_err());
    }

    #[test]
    fn const_globals_reject_runtime_assignment() {
        let mut vm = vm();
        vm.push_number(1.0);
        vm.set_const_global("locked");
        // Known at compile time: rejected by the compiler.
        assert!(matches!(vm.interpret("a", "locked = 2;"), Err(crate::vm::InterpretError::Compile(_))));
        // Assigned through a function compiled before the global existed.
        vm.interpret("b", "fn poke() { later = 5; } return poke;").unwrap();
        vm.push_number(0.0);
        vm.set_const_global("later");
        let poke = vm.module("b").unwrap();
        vm.stack.push(poke);
        let err = vm.pcall(0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConstantAssignment("later".into()));
    }

    #[test]
    fn struct_building() {
        let mut vm = vm();
        vm.push_struct("Point");
        vm.push_number(0.0);
        vm.struct_add_member("x").unwrap();
        vm.push_number(2.0);
        vm.struct_add_static("DIM").unwrap();
        vm.struct_get_static("DIM").unwrap();
        assert_eq!(vm.get_number(-1).unwrap(), 2.0);
        vm.pop_n(1);
        vm.instance(-1).unwrap();
        assert_eq!(vm.value_type(-1).unwrap(), ValueType::Instance);
        assert!(vm.has_property(-1, "x"));
        assert!(!vm.has_property(-1, "y"));
        vm.get_property(-1, "x").unwrap();
        assert_eq!(vm.get_number(-1).unwrap(), 0.0);
    }

    #[test]
    fn enum_values_are_sequential() {
        let mut vm = vm();
        vm.push_enum("Dir");
        vm.enum_add_value("Up").unwrap();
        vm.enum_add_value("Down").unwrap();
        assert!(vm.enum_add_value("Up").is_err());
        vm.struct_get_static("Down").unwrap();
        assert_eq!(vm.get_number(-1).unwrap(), 1.0);
    }

    #[test]
    fn arrays_and_concat() {
        let mut vm = vm();
        vm.push_array();
        vm.push_number(1.0);
        vm.array_push().unwrap();
        vm.push_str("two");
        vm.array_push().unwrap();
        assert_eq!(vm.len(-1).unwrap(), 2);
        vm.array_get(-1, 1).unwrap();
        assert_eq!(vm.get_str(-1).unwrap(), "two");
        assert!(vm.array_get(0, 5).is_err());
        vm.push_str(" and ");
        vm.push_bool(true);
        vm.concat(3).unwrap();
        assert_eq!(vm.get_str(-1).unwrap(), "two and true");
    }

    #[test]
    fn userdata_holds_host_values() {
        let mut vm = vm();
        vm.push_userdata(vec![1u8, 2, 3]);
        vm.get_userdata::<Vec<u8>>(-1).unwrap().push(4);
        assert_eq!(vm.get_userdata::<Vec<u8>>(-1).unwrap().len(), 4);
        assert!(vm.get_userdata::<String>(-1).is_err());
        assert_eq!(vm.tostr(-1).unwrap(), "<UserData>");
    }
}

//! The bytecode dispatch loop.

use super::{ErrorKind, FrameKind, Interpreter, RuntimeError};
use crate::chunk::*;
use crate::object::{Array, Closure, EnumDef, Map, NameTable, Object, StructDef};
use crate::value::Value;

impl Interpreter {
    /// Executes from the top frame until a frame started by
    /// [`interpret`](Self::interpret) or a host call returns. The result is
    /// left on the stack where that frame's callee was.
    pub(crate) fn run(&mut self) -> Result<(), RuntimeError> {
        let mut top = self.frames.len() - 1;
        let mut chunk = self.frames[top].chunk.clone();
        let mut ip = self.frames[top].ip;
        let mut base = self.frames[top].base;

        macro_rules! read_byte {
            () => {{
                let b = chunk.code[ip];
                ip += 1;
                b
            }};
        }
        macro_rules! read_u16 {
            () => {{
                let v = chunk.read_u16(ip);
                ip += 2;
                usize::from(v)
            }};
        }
        macro_rules! read_constant {
            () => {
                chunk.constants[usize::from(read_byte!())]
            };
        }
        macro_rules! object {
            ($v:expr) => {
                match $v.as_obj() {
                    Some(r) => r,
                    None => unreachable!("compiler emitted a non-object operand"),
                }
            };
        }
        macro_rules! read_name {
            () => {
                object!(read_constant!())
            };
        }
        macro_rules! reload {
            () => {{
                top = self.frames.len() - 1;
                let frame = &self.frames[top];
                chunk = frame.chunk.clone();
                ip = frame.ip;
                base = frame.base;
            }};
        }
        macro_rules! raise {
            ($kind:expr) => {
                return Err(self.error($kind))
            };
        }
        macro_rules! binary {
            ($wrap:path, $op:tt) => {{
                let (Some(a), Some(b)) = (self.peek(1).as_number(), self.peek(0).as_number()) else {
                    raise!(ErrorKind::OperandsNotNumbers)
                };
                self.stack.truncate(self.stack.len() - 2);
                self.push($wrap(a $op b));
            }};
        }

        loop {
            let op = read_byte!();
            self.frames[top].ip = ip;

            match op {
                OP_POP => {
                    self.pop();
                }

                // ── Variables ──
                OP_GET_GLOBAL => {
                    let name = read_name!();
                    match self.globals.get(&name, self.heap.str_hash(name)) {
                        Some(&v) => self.push(v),
                        None => raise!(ErrorKind::UndefinedVariable(self.heap.str(name).to_string())),
                    }
                }
                OP_SET_GLOBAL => {
                    let name = read_name!();
                    let hash = self.heap.str_hash(name);
                    if self.const_globals.contains(&name, hash) {
                        raise!(ErrorKind::ConstantAssignment(self.heap.str(name).to_string()));
                    }
                    let value = self.peek(0);
                    match self.globals.get_mut(&name, hash) {
                        Some(slot) => *slot = value,
                        None => raise!(ErrorKind::UndefinedVariable(self.heap.str(name).to_string())),
                    }
                }
                OP_GET_LOCAL => {
                    let slot = usize::from(read_byte!());
                    self.push(self.stack[base + slot]);
                }
                OP_SET_LOCAL => {
                    let slot = usize::from(read_byte!());
                    self.stack[base + slot] = self.peek(0);
                }
                OP_GET_UPVAL => {
                    let i = usize::from(read_byte!());
                    let upvalue = self.heap.closure(self.frames[top].callee).upvalues[i];
                    self.push(self.read_upvalue(upvalue));
                }
                OP_SET_UPVAL => {
                    let i = usize::from(read_byte!());
                    let upvalue = self.heap.closure(self.frames[top].callee).upvalues[i];
                    self.write_upvalue(upvalue, self.peek(0));
                }
                OP_CLOSE_UPVAL => {
                    self.close_upvalues(self.stack.len() - 1);
                    self.pop();
                }

                // ── Properties and subscripts ──
                OP_PUSH_PROP => {
                    let name = read_name!();
                    let value = self.property(self.peek(0), name)?;
                    self.push(value);
                }
                OP_GET_PROP => {
                    let name = read_name!();
                    let value = self.property(self.peek(0), name)?;
                    let last = self.stack.len() - 1;
                    self.stack[last] = value;
                }
                OP_SET_PROP => {
                    let name = read_name!();
                    let value = self.peek(0);
                    self.set_property(self.peek(1), name, value)?;
                    self.stack.truncate(self.stack.len() - 2);
                    self.push(value);
                }
                OP_INIT_PROP => {
                    let name = read_name!();
                    self.set_property(self.peek(1), name, self.peek(0))?;
                    self.pop();
                }
                OP_GET_SUBSCRIPT => {
                    let value = self.subscript_get(self.peek(1), self.peek(0))?;
                    self.stack.truncate(self.stack.len() - 2);
                    self.push(value);
                }
                OP_SET_SUBSCRIPT => {
                    let value = self.peek(0);
                    self.subscript_set(self.peek(2), self.peek(1), value)?;
                    self.stack.truncate(self.stack.len() - 3);
                    self.push(value);
                }
                OP_PUSH_SUBSCRIPT => {
                    let value = self.subscript_get(self.peek(1), self.peek(0))?;
                    self.push(value);
                }
                OP_DESTRUCT_ARRAY => {
                    let index = usize::from(read_byte!());
                    let value = self.destructure(self.peek(0), index)?;
                    self.push(value);
                }
                OP_GET_STATIC => {
                    let name = read_name!();
                    let value = self.static_get(self.peek(0), name)?;
                    let last = self.stack.len() - 1;
                    self.stack[last] = value;
                }

                // ── Literals ──
                OP_CONST => {
                    let value = read_constant!();
                    self.push(value);
                }
                OP_NULL => self.push(Value::NULL),
                OP_TRUE => self.push(Value::boolean(true)),
                OP_FALSE => self.push(Value::boolean(false)),
                OP_ARRAY => {
                    let array = self.alloc(Object::Array(Array::default()));
                    self.push(Value::object(array));
                }
                OP_ARRAY_ITEM => {
                    let item = self.pop();
                    let array = object!(self.peek(0));
                    let before = self.heap.object_size(array);
                    self.heap.array_items_mut(array).push(item);
                    self.grew(array, before);
                }
                OP_MAP => {
                    let map = self.alloc(Object::Map(Map::default()));
                    self.push(Value::object(map));
                }
                OP_MAP_ITEM => {
                    let (key, value) = (self.peek(1), self.peek(0));
                    let map = object!(self.peek(2));
                    let hash = self.heap.hash_value(key);
                    let before = self.heap.object_size(map);
                    self.heap.map_mut(map).entries.insert(key, hash, value);
                    self.stack.truncate(self.stack.len() - 2);
                    self.grew(map, before);
                }

                // ── Operators ──
                OP_ADD => binary!(Value::number, +),
                OP_SUB => binary!(Value::number, -),
                OP_MUL => binary!(Value::number, *),
                OP_DIV => binary!(Value::number, /),
                OP_MOD => binary!(Value::number, %),
                OP_GT => binary!(Value::boolean, >),
                OP_LT => binary!(Value::boolean, <),
                OP_GTE => binary!(Value::boolean, >=),
                OP_LTE => binary!(Value::boolean, <=),
                OP_EQL => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::boolean(a == b));
                }
                OP_NEQL => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::boolean(a != b));
                }
                OP_CAT => self.concat_top()?,
                OP_IS => {
                    let is = self.is_instance_of(self.peek(1), self.peek(0))?;
                    self.stack.truncate(self.stack.len() - 2);
                    self.push(Value::boolean(is));
                }
                OP_NEG => {
                    let Some(n) = self.peek(0).as_number() else { raise!(ErrorKind::OperandNotNumber) };
                    let last = self.stack.len() - 1;
                    self.stack[last] = Value::number(-n);
                }
                OP_NOT => {
                    let v = self.pop();
                    self.push(Value::boolean(v.is_falsey()));
                }

                // ── Control flow ──
                OP_INEQ_JMP => {
                    let offset = read_u16!();
                    let case = self.pop();
                    if self.peek(0) != case {
                        ip += offset;
                    }
                }
                OP_FALSE_JMP => {
                    let offset = read_u16!();
                    if self.peek(0).is_falsey() {
                        ip += offset;
                    }
                }
                OP_JMP | OP_BREAK => {
                    let offset = read_u16!();
                    ip += offset;
                }
                OP_LOOP => {
                    let offset = read_u16!();
                    ip -= offset;
                }

                // ── Calls ──
                OP_CALL => {
                    let argc = usize::from(read_byte!());
                    self.frames[top].ip = ip;
                    self.call_value(self.peek(argc), argc)?;
                    reload!();
                }
                OP_INVOKE => {
                    let name = read_name!();
                    let argc = usize::from(read_byte!());
                    self.frames[top].ip = ip;
                    self.invoke(name, argc)?;
                    reload!();
                }
                OP_CLOSURE => {
                    let function = read_name!();
                    let count = usize::from(self.heap.function(function).upvalue_count);
                    let closure = self.alloc(Object::Closure(Closure { function, upvalues: Vec::with_capacity(count) }));
                    self.push(Value::object(closure));
                    for _ in 0..count {
                        let is_local = read_byte!() == 1;
                        let index = usize::from(read_byte!());
                        let upvalue = if is_local {
                            self.capture_upvalue(base + index)
                        } else {
                            self.heap.closure(self.frames[top].callee).upvalues[index]
                        };
                        self.heap.closure_mut(closure).upvalues.push(upvalue);
                    }
                }
                OP_RET => {
                    let result = self.pop();
                    self.close_upvalues(base);
                    self.stack.truncate(base);
                    self.push(result);
                    let finished = self.frames.pop();
                    if finished.is_none_or(|f| f.kind != FrameKind::Call) || self.frames.is_empty() {
                        return Ok(());
                    }
                    reload!();
                }

                // ── Structs and enums ──
                OP_STRUCT => {
                    let name = read_name!();
                    let def = self.alloc(Object::Struct(StructDef {
                        name,
                        statics: NameTable::new(),
                        methods: NameTable::new(),
                        members: NameTable::new(),
                    }));
                    self.push(Value::object(def));
                }
                OP_METHOD | OP_DEF_STATIC | OP_MEMBER => {
                    let name = read_name!();
                    let hash = self.heap.str_hash(name);
                    let value = self.peek(0);
                    let target = object!(self.peek(1));
                    let before = self.heap.object_size(target);
                    let def = self.heap.struct_def_mut(target);
                    let table = match op {
                        OP_METHOD => &mut def.methods,
                        OP_DEF_STATIC => &mut def.statics,
                        _ => &mut def.members,
                    };
                    table.insert(name, hash, value);
                    self.pop();
                    self.grew(target, before);
                }
                OP_ENUM => {
                    let name = read_name!();
                    let count = usize::from(read_byte!());
                    let def = self.alloc(Object::Enum(EnumDef { name, values: NameTable::new() }));
                    self.push(Value::object(def));
                    let before = self.heap.object_size(def);
                    for i in 0..count {
                        let value = read_name!();
                        let hash = self.heap.str_hash(value);
                        let values = &mut self.heap.enum_def_mut(def).values;
                        if !values.insert(value, hash, Value::number(i as f64)) {
                            raise!(ErrorKind::DuplicateEnumValue(self.heap.str(value).to_string()));
                        }
                    }
                    self.grew(def, before);
                }
                OP_INST => self.instantiate_top()?,

                _ => raise!(ErrorKind::Message(format!("Unknown opcode {op}"))),
            }
        }
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

    fn number(source: &str) -> f64 {
        match run(source) {
            Ok(v) => v.as_number().unwrap_or(f64::NAN),
            Err(e) => panic!("{e}"),
        }
    }

    #[test]
    fn switch_selects_matching_case() {
        let source = "
            fn pick(x) {
                switch (x) {
                    case 1 -> return 10;
                    case 2 -> return 20;
                    else -> return 0;
                }
            }
            return pick(1) + pick(2) + pick(3);";
        assert_eq!(number(source), 30.0);
    }

    #[test]
    fn ternary_and_short_circuit() {
        assert_eq!(number("var x = 5; return if (x > 3) 1 else 2;"), 1.0);
        assert_eq!(number("var n = 0; fn bump() { n++; return true; } false && bump(); true || bump(); return n;"), 0.0);
    }

    #[test]
    fn compound_assignment_on_locals_and_fields() {
        let source = "
            struct C { var v = 1; }
            var c = C {};
            var g = 10;
            g -= 3; g *= 2;
            c.v += 4; c.v--;
            return g + c.v;";
        assert_eq!(number(source), 18.0);
    }

    #[test]
    fn methods_and_self() {
        let source = "
            struct Account {
                var balance = 0;
                fn deposit(n) { self.balance += n; return self; }
                static fn open() -> Account { balance = 100 };
            }
            var a = Account:open();
            a.deposit(5).deposit(7);
            return a.balance;";
        assert_eq!(number(source), 112.0);
    }

    #[test]
    fn fields_shadow_methods_on_invoke() {
        let source = "
            struct S {
                var f = null;
                fn f() -> 1;
            }
            var s = S {};
            s.f = fn() -> 2;
            return s.f();";
        assert_eq!(number(source), 2.0);
    }

    #[test]
    fn fused_and_unfused_calls_fail_alike() {
        let fused = run("struct S {} var s = S {}; s.missing();").unwrap_err();
        let unfused = run("struct S {} var s = S {}; var m = s.missing; m();").unwrap_err();
        let (InterpretError::Runtime(a), InterpretError::Runtime(b)) = (fused, unfused) else {
            panic!("expected runtime errors");
        };
        assert_eq!(a.kind, b.kind);
    }

    #[test]
    fn runtime_error_reports_line() {
        let Err(InterpretError::Runtime(err)) = run("var a = 1;\nvar b = 2;\nreturn a + null;") else {
            panic!("expected runtime error");
        };
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn map_literal_and_methods() {
        assert_eq!(number("var m = {\"a\" -> 1, \"b\" -> 2,}; return m.len();"), 2.0);
    }
}

//! Heap object kinds.
//!
//! Every object lives in the [`Heap`](crate::gc::Heap) and is addressed by an
//! [`ObjRef`] handle. `Object` is a closed enum; tracing, sizing and naming
//! are exhaustive matches over it.

pub mod table;

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::chunk::Chunk;
use crate::value::Value;
use crate::vm::{Interpreter, RuntimeError};

pub use table::Table;

/// Stable handle to a heap slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(pub(crate) u32);

impl ObjRef {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Hash for identity-keyed lookups (objects other than strings).
    #[inline]
    pub fn identity_hash(self) -> u32 {
        self.0.wrapping_mul(2_654_435_761)
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Host function. Receives the interpreter and the argument count; the callee
/// (or receiver) sits at stack index 0 and the arguments at 1..=argc. Returns
/// whether a result was left on top of the stack.
pub type NativeFn = fn(&mut Interpreter, usize) -> Result<bool, RuntimeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(u8),
    Variadic,
}

/// Tables keyed by interned string handles. The hash is the string's content hash.
pub type NameTable<V> = Table<ObjRef, V>;

pub struct Str {
    pub chars: Box<str>,
    pub hash: u32,
}

pub struct Function {
    pub arity: u8,
    pub upvalue_count: u8,
    pub chunk: Rc<Chunk>,
    /// `None` for top-level script code.
    pub name: Option<ObjRef>,
    pub path: ObjRef,
}

pub struct Closure {
    pub function: ObjRef,
    pub upvalues: Vec<ObjRef>,
}

#[derive(Debug, Clone, Copy)]
pub enum Upvalue {
    /// Points at a live stack slot.
    Open(usize),
    Closed(Value),
}

pub struct Native {
    pub name: ObjRef,
    pub arity: Arity,
    pub function: NativeFn,
}

pub struct StructDef {
    pub name: ObjRef,
    pub statics: NameTable<Value>,
    pub methods: NameTable<Value>,
    /// Field initializers copied into every new instance.
    pub members: NameTable<Value>,
}

pub struct Instance {
    pub def: ObjRef,
    pub fields: NameTable<Value>,
}

pub struct BoundMethod {
    pub receiver: Value,
    pub method: Value,
}

pub struct EnumDef {
    pub name: ObjRef,
    pub values: NameTable<Value>,
}

#[derive(Default)]
pub struct Array {
    pub items: Vec<Value>,
}

#[derive(Default)]
pub struct Map {
    pub entries: Table<Value, Value>,
}

/// Host-owned data. `size` is what the collector accounts for it.
pub struct UserData {
    pub data: Box<dyn Any>,
    pub size: usize,
    pub def: Option<ObjRef>,
    /// Native called once, with the user data as its only argument, before
    /// the slot is reclaimed.
    pub finalizer: Option<ObjRef>,
    pub finalized: bool,
}

pub enum Object {
    String(Str),
    Function(Function),
    Closure(Closure),
    Upvalue(Upvalue),
    Native(Native),
    Struct(StructDef),
    Instance(Instance),
    BoundMethod(BoundMethod),
    Enum(EnumDef),
    Array(Array),
    Map(Map),
    UserData(UserData),
}

fn push_value(out: &mut Vec<ObjRef>, v: Value) {
    if let Some(r) = v.as_obj() {
        out.push(r);
    }
}

fn push_table(out: &mut Vec<ObjRef>, table: &NameTable<Value>) {
    for (k, v) in table.iter() {
        out.push(*k);
        push_value(out, *v);
    }
}

impl Object {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Object::String(_) => "string",
            Object::Function(_) | Object::Closure(_) | Object::BoundMethod(_) => "function",
            Object::Upvalue(_) => "upvalue",
            Object::Native(_) => "native",
            Object::Struct(_) => "struct",
            Object::Instance(_) => "instance",
            Object::Enum(_) => "enum",
            Object::Array(_) => "array",
            Object::Map(_) => "map",
            Object::UserData(_) => "userdata",
        }
    }

    /// Appends every handle this object references directly.
    pub fn trace(&self, out: &mut Vec<ObjRef>) {
        match self {
            Object::String(_) => {}
            Object::Function(f) => {
                out.extend(f.name);
                out.push(f.path);
                for c in &f.chunk.constants {
                    push_value(out, *c);
                }
            }
            Object::Closure(c) => {
                out.push(c.function);
                out.extend_from_slice(&c.upvalues);
            }
            Object::Upvalue(Upvalue::Closed(v)) => push_value(out, *v),
            Object::Upvalue(Upvalue::Open(_)) => {}
            Object::Native(n) => out.push(n.name),
            Object::Struct(s) => {
                out.push(s.name);
                push_table(out, &s.statics);
                push_table(out, &s.methods);
                push_table(out, &s.members);
            }
            Object::Instance(i) => {
                out.push(i.def);
                push_table(out, &i.fields);
            }
            Object::BoundMethod(b) => {
                push_value(out, b.receiver);
                push_value(out, b.method);
            }
            Object::Enum(e) => {
                out.push(e.name);
                out.extend(e.values.keys().copied());
            }
            Object::Array(a) => {
                for v in &a.items {
                    push_value(out, *v);
                }
            }
            Object::Map(m) => {
                for (k, v) in m.entries.iter() {
                    push_value(out, *k);
                    push_value(out, *v);
                }
            }
            Object::UserData(u) => {
                out.extend(u.def);
                out.extend(u.finalizer);
            }
        }
    }

    /// Approximate bytes owned by this object, for GC accounting.
    pub fn size(&self) -> usize {
        let value = size_of::<Value>();
        let entry = size_of::<(ObjRef, u32, Value)>();
        size_of::<Object>()
            + match self {
                Object::String(s) => s.chars.len(),
                Object::Function(f) => {
                    f.chunk.code.len() + f.chunk.lines.len() * 4 + f.chunk.constants.len() * value
                }
                Object::Closure(c) => c.upvalues.len() * size_of::<ObjRef>(),
                Object::Struct(s) => {
                    (s.statics.capacity() + s.methods.capacity() + s.members.capacity()) * entry
                }
                Object::Instance(i) => i.fields.capacity() * entry,
                Object::Enum(e) => e.values.capacity() * entry,
                Object::Array(a) => a.items.capacity() * value,
                Object::Map(m) => m.entries.capacity() * (entry + value),
                Object::UserData(u) => u.size,
                Object::Upvalue(_) | Object::Native(_) | Object::BoundMethod(_) => 0,
            }
    }
}

/// FNV-1a, as used for string hashing.
pub fn hash_str(s: &str) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for b in s.bytes() {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}

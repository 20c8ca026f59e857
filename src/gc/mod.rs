//! Handle-indexed heap and the mark/sweep collector.
//!
//! Objects live in a slot vector and are addressed by [`ObjRef`]. Freed
//! slots go on a free list and are reused. Collection is stop-the-world:
//! roots are marked gray, the gray stack is drained, unmarked slots are
//! released and the intern table drops entries for dead strings.

use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::object::{
    Closure, EnumDef, Function, Instance, Map, Native, ObjRef, Object, StructDef, Table, Upvalue,
    UserData, hash_str,
};
use crate::value::{Unpacked, Value};
use crate::vm::Interpreter;

struct Slot {
    marked: bool,
    object: Option<Object>,
}

pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Weak intern table: entries whose string is unmarked are pruned on sweep.
    strings: Table<ObjRef, ()>,
    /// User data handles, scanned for pending finalizers.
    userdata: Vec<ObjRef>,
    gray: Vec<ObjRef>,
    bytes_allocated: usize,
    next_gc: usize,
    grow_factor: f64,
    stress: bool,
    collections: usize,
}

macro_rules! accessors {
    ($($get:ident, $get_mut:ident => $variant:ident($ty:ty);)*) => {
        $(
            pub fn $get(&self, r: ObjRef) -> &$ty {
                match self.get(r) {
                    Object::$variant(x) => x,
                    other => unreachable!(
                        concat!("expected ", stringify!($variant), ", found {}"),
                        other.kind_name()
                    ),
                }
            }

            pub fn $get_mut(&mut self, r: ObjRef) -> &mut $ty {
                match self.get_mut(r) {
                    Object::$variant(x) => x,
                    other => unreachable!(
                        concat!("expected ", stringify!($variant), ", found {}"),
                        other.kind_name()
                    ),
                }
            }
        )*
    };
}

impl Heap {
    pub fn new(config: &Config) -> Self {
        Heap {
            slots: Vec::new(),
            free: Vec::new(),
            strings: Table::new(),
            userdata: Vec::new(),
            gray: Vec::new(),
            bytes_allocated: 0,
            next_gc: config.gc_initial_threshold,
            grow_factor: config.gc_grow_factor,
            stress: config.gc_stress,
            collections: 0,
        }
    }

    // ── Allocation ───────────────────────────────────────────────────

    pub fn should_collect(&self) -> bool {
        self.stress || self.bytes_allocated > self.next_gc
    }

    /// Stores an object without collecting. Callers that may need a
    /// collection go through [`Interpreter::alloc`].
    pub fn insert(&mut self, object: Object) -> ObjRef {
        self.bytes_allocated += object.size();
        let r = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Slot { marked: false, object: None };
                ObjRef(index)
            }
            None => {
                self.slots.push(Slot { marked: false, object: None });
                ObjRef((self.slots.len() - 1) as u32)
            }
        };
        match &object {
            Object::String(s) => {
                self.strings.insert(r, s.hash, ());
            }
            Object::UserData(_) => self.userdata.push(r),
            _ => {}
        }
        self.slots[r.index()].object = Some(object);
        r
    }

    /// Re-measures an object that changed size in place and adjusts the byte
    /// count. Returns true when it grew.
    pub fn remeasure(&mut self, r: ObjRef, before: usize) -> bool {
        let after = self.get(r).size();
        self.bytes_allocated = (self.bytes_allocated + after).saturating_sub(before);
        after > before
    }

    pub fn object_size(&self, r: ObjRef) -> usize {
        self.get(r).size()
    }

    /// Looks up an interned string by content.
    pub fn find_string(&self, s: &str) -> Option<ObjRef> {
        let slots = &self.slots;
        self.strings.find(hash_str(s), |r| {
            matches!(&slots[r.index()].object, Some(Object::String(x)) if &*x.chars == s)
        })
    }

    // ── Access ───────────────────────────────────────────────────────

    pub fn get(&self, r: ObjRef) -> &Object {
        match &self.slots[r.index()].object {
            Some(object) => object,
            None => unreachable!("use of freed object {r:?}"),
        }
    }

    pub fn get_mut(&mut self, r: ObjRef) -> &mut Object {
        match &mut self.slots[r.index()].object {
            Some(object) => object,
            None => unreachable!("use of freed object {r:?}"),
        }
    }

    pub fn is_live(&self, r: ObjRef) -> bool {
        self.slots.get(r.index()).is_some_and(|s| s.object.is_some())
    }

    accessors! {
        function, function_mut => Function(Function);
        closure, closure_mut => Closure(Closure);
        upvalue, upvalue_mut => Upvalue(Upvalue);
        native, native_mut => Native(Native);
        struct_def, struct_def_mut => Struct(StructDef);
        instance, instance_mut => Instance(Instance);
        enum_def, enum_def_mut => Enum(EnumDef);
        map, map_mut => Map(Map);
        userdata, userdata_mut => UserData(UserData);
    }

    pub fn str(&self, r: ObjRef) -> &str {
        match self.get(r) {
            Object::String(s) => &s.chars,
            other => unreachable!("expected String, found {}", other.kind_name()),
        }
    }

    pub fn str_hash(&self, r: ObjRef) -> u32 {
        match self.get(r) {
            Object::String(s) => s.hash,
            _ => r.identity_hash(),
        }
    }

    pub fn as_str(&self, v: Value) -> Option<&str> {
        match self.get(v.as_obj()?) {
            Object::String(s) => Some(&s.chars),
            _ => None,
        }
    }

    pub fn array_items(&self, r: ObjRef) -> &[Value] {
        match self.get(r) {
            Object::Array(a) => &a.items,
            other => unreachable!("expected Array, found {}", other.kind_name()),
        }
    }

    pub fn array_items_mut(&mut self, r: ObjRef) -> &mut Vec<Value> {
        match self.get_mut(r) {
            Object::Array(a) => &mut a.items,
            other => unreachable!("expected Array, found {}", other.kind_name()),
        }
    }

    /// Hash for script map keys: strings by content, numbers by bit pattern,
    /// other objects by identity.
    pub fn hash_value(&self, v: Value) -> u32 {
        match v.unpack() {
            Unpacked::Null => 0,
            Unpacked::Bool(b) => 1 + u32::from(b),
            Unpacked::Number(n) => {
                let bits = if n == 0.0 { 0 } else { n.to_bits() };
                (bits ^ (bits >> 32)) as u32
            }
            Unpacked::Obj(r) => self.str_hash(r),
        }
    }

    // ── Stats ────────────────────────────────────────────────────────

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn next_gc(&self) -> usize {
        self.next_gc
    }

    pub fn collections(&self) -> usize {
        self.collections
    }

    pub fn live_objects(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn interned_strings(&self) -> usize {
        self.strings.len()
    }

    // ── Marking ──────────────────────────────────────────────────────

    pub fn mark_object(&mut self, r: ObjRef) {
        let slot = &mut self.slots[r.index()];
        if slot.marked || slot.object.is_none() {
            return;
        }
        slot.marked = true;
        self.gray.push(r);
    }

    pub fn mark_value(&mut self, v: Value) {
        if let Some(r) = v.as_obj() {
            self.mark_object(r);
        }
    }

    pub fn is_marked(&self, r: ObjRef) -> bool {
        self.slots[r.index()].marked
    }

    /// Drains the gray stack, blackening each object by marking its children.
    pub fn trace_references(&mut self) {
        let mut children = Vec::new();
        while let Some(r) = self.gray.pop() {
            children.clear();
            self.get(r).trace(&mut children);
            for &child in &children {
                self.mark_object(child);
            }
        }
    }

    /// Unreachable user data that still owes a finalizer call. They are
    /// flagged as finalized so the call happens once.
    fn take_finalizable(&mut self) -> Vec<ObjRef> {
        let mut doomed = Vec::new();
        for &r in &self.userdata {
            let slot = &mut self.slots[r.index()];
            if slot.marked {
                continue;
            }
            if let Some(Object::UserData(u)) = &mut slot.object {
                if u.finalizer.is_some() && !u.finalized {
                    u.finalized = true;
                    doomed.push(r);
                }
            }
        }
        doomed
    }

    // ── Sweeping ─────────────────────────────────────────────────────

    /// Frees every unmarked slot and clears marks on survivors. Returns the
    /// number of objects freed.
    fn sweep(&mut self) -> usize {
        let slots = &self.slots;
        self.strings.retain(|r, _| slots[r.index()].marked);

        let mut freed = 0;
        let mut live_bytes = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(object) = &slot.object else { continue };
            if slot.marked {
                slot.marked = false;
                live_bytes += object.size();
            } else {
                slot.object = None;
                self.free.push(index as u32);
                freed += 1;
            }
        }

        let slots = &self.slots;
        self.userdata.retain(|r| slots[r.index()].object.is_some());

        self.bytes_allocated = live_bytes;
        self.next_gc = (live_bytes as f64 * self.grow_factor) as usize;
        self.collections += 1;
        freed
    }
}

// ── Collection ───────────────────────────────────────────────────────

impl Interpreter {
    /// Allocates through the collector: runs a cycle first when the heap is
    /// over its threshold. Handles referenced by `object` are kept alive.
    pub(crate) fn alloc(&mut self, object: Object) -> ObjRef {
        if self.heap.should_collect() && !self.finalizing {
            let mut pending = Vec::new();
            object.trace(&mut pending);
            self.collect_with(&pending);
        }
        self.heap.insert(object)
    }

    /// Charges the growth of a container mutated in place (array push, map or
    /// table insert) and collects when that crossed the threshold. `r` and
    /// everything it holds stay alive.
    pub(crate) fn grew(&mut self, r: ObjRef, before: usize) {
        if self.heap.remeasure(r, before) && self.heap.should_collect() && !self.finalizing {
            self.collect_with(&[r]);
        }
    }

    /// Runs a full collection cycle now.
    pub fn collect_garbage(&mut self) {
        if !self.finalizing {
            self.collect_with(&[]);
        }
    }

    fn collect_with(&mut self, extra: &[ObjRef]) {
        let before = self.heap.bytes_allocated;
        let objects_before = self.heap.live_objects();

        self.mark_roots(extra);
        self.heap.trace_references();

        // Keep finalizable user data alive for one more cycle so the
        // finalizer can still see it.
        let doomed = self.heap.take_finalizable();
        for &r in &doomed {
            self.heap.mark_object(r);
        }
        self.heap.trace_references();

        let freed = self.heap.sweep();
        debug!(
            before,
            after = self.heap.bytes_allocated,
            freed,
            live = objects_before - freed,
            next = self.heap.next_gc,
            "gc cycle"
        );

        self.run_finalizers(doomed);
    }

    fn mark_roots(&mut self, extra: &[ObjRef]) {
        let heap = &mut self.heap;
        for &v in &self.stack {
            heap.mark_value(v);
        }
        for frame in &self.frames {
            heap.mark_object(frame.callee);
        }
        for &r in &self.open_upvalues {
            heap.mark_object(r);
        }
        for (&k, &v) in self.globals.iter() {
            heap.mark_object(k);
            heap.mark_value(v);
        }
        for &k in self.const_globals.keys() {
            heap.mark_object(k);
        }
        for (&k, &v) in self.modules.iter() {
            heap.mark_object(k);
            heap.mark_value(v);
        }
        for &v in &self.compiler_roots {
            heap.mark_value(v);
        }
        for &r in self.builtins.iter().chain(self.args.iter()).chain(extra) {
            heap.mark_object(r);
        }
    }

    /// Finalizers run as ordinary protected native calls. Collection is
    /// suppressed until they all return.
    fn run_finalizers(&mut self, doomed: Vec<ObjRef>) {
        if doomed.is_empty() {
            return;
        }
        self.finalizing = true;
        for r in doomed {
            let Some(finalizer) = self.heap.userdata(r).finalizer else { continue };
            trace!(object = ?r, "running finalizer");
            self.push(Value::object(finalizer));
            self.push(Value::object(r));
            match self.pcall(1) {
                Ok(()) => {
                    self.pop();
                }
                Err(err) => warn!(error = %err.kind, "finalizer failed"),
            }
        }
        self.finalizing = false;
    }
}

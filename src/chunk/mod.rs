//! Bytecode chunks.

pub mod disasm;

use crate::value::Value;

// ── Opcodes ──────────────────────────────────────────────────────────
//
// Operand legend: [c] one-byte constant index, [b] one raw byte,
// [j] two-byte big-endian jump offset.

pub(crate) const OP_POP: u8 = 0;
pub(crate) const OP_GET_GLOBAL: u8 = 1; // [c]
pub(crate) const OP_SET_GLOBAL: u8 = 2; // [c]
pub(crate) const OP_GET_LOCAL: u8 = 3; // [b]
pub(crate) const OP_SET_LOCAL: u8 = 4; // [b]
pub(crate) const OP_GET_UPVAL: u8 = 5; // [b]
pub(crate) const OP_SET_UPVAL: u8 = 6; // [b]
pub(crate) const OP_CLOSE_UPVAL: u8 = 7;
pub(crate) const OP_PUSH_PROP: u8 = 8; // [c]  keeps the receiver below the value
pub(crate) const OP_GET_PROP: u8 = 9; // [c]
pub(crate) const OP_SET_PROP: u8 = 10; // [c]
pub(crate) const OP_GET_SUBSCRIPT: u8 = 11;
pub(crate) const OP_SET_SUBSCRIPT: u8 = 12;
pub(crate) const OP_PUSH_SUBSCRIPT: u8 = 13; // keeps container and key below the value
pub(crate) const OP_DESTRUCT_ARRAY: u8 = 14; // [b] element index
pub(crate) const OP_GET_STATIC: u8 = 15; // [c]
pub(crate) const OP_INIT_PROP: u8 = 16; // [c]
pub(crate) const OP_CONST: u8 = 17; // [c]
pub(crate) const OP_NULL: u8 = 18;
pub(crate) const OP_TRUE: u8 = 19;
pub(crate) const OP_FALSE: u8 = 20;
pub(crate) const OP_ARRAY: u8 = 21;
pub(crate) const OP_ARRAY_ITEM: u8 = 22;
pub(crate) const OP_MAP: u8 = 23;
pub(crate) const OP_MAP_ITEM: u8 = 24;
pub(crate) const OP_ADD: u8 = 25;
pub(crate) const OP_SUB: u8 = 26;
pub(crate) const OP_MUL: u8 = 27;
pub(crate) const OP_DIV: u8 = 28;
pub(crate) const OP_MOD: u8 = 29;
pub(crate) const OP_EQL: u8 = 30;
pub(crate) const OP_NEQL: u8 = 31;
pub(crate) const OP_GT: u8 = 32;
pub(crate) const OP_LT: u8 = 33;
pub(crate) const OP_GTE: u8 = 34;
pub(crate) const OP_LTE: u8 = 35;
pub(crate) const OP_CAT: u8 = 36;
pub(crate) const OP_IS: u8 = 37;
pub(crate) const OP_NEG: u8 = 38;
pub(crate) const OP_NOT: u8 = 39;
pub(crate) const OP_INEQ_JMP: u8 = 40; // [j]  pops the case value, keeps the subject
pub(crate) const OP_FALSE_JMP: u8 = 41; // [j]  leaves the condition on the stack
pub(crate) const OP_JMP: u8 = 42; // [j]
pub(crate) const OP_LOOP: u8 = 43; // [j]  backwards
pub(crate) const OP_CALL: u8 = 44; // [b] argc
pub(crate) const OP_INVOKE: u8 = 45; // [c] name, [b] argc
pub(crate) const OP_CLOSURE: u8 = 46; // [c] function, then (is_local, index) per upvalue
pub(crate) const OP_RET: u8 = 47;
pub(crate) const OP_STRUCT: u8 = 48; // [c]
pub(crate) const OP_METHOD: u8 = 49; // [c]
pub(crate) const OP_DEF_STATIC: u8 = 50; // [c]
pub(crate) const OP_MEMBER: u8 = 51; // [c]
pub(crate) const OP_ENUM: u8 = 52; // [c] name, [b] count, count x [c]
pub(crate) const OP_INST: u8 = 53;
/// Placeholder emitted for `break`; rewritten to `OP_JMP` when the loop ends.
pub(crate) const OP_BREAK: u8 = 54; // [j]

pub(crate) fn op_name(op: u8) -> &'static str {
    match op {
        OP_POP => "OP_POP",
        OP_GET_GLOBAL => "OP_GET_GLOBAL",
        OP_SET_GLOBAL => "OP_SET_GLOBAL",
        OP_GET_LOCAL => "OP_GET_LOCAL",
        OP_SET_LOCAL => "OP_SET_LOCAL",
        OP_GET_UPVAL => "OP_GET_UPVAL",
        OP_SET_UPVAL => "OP_SET_UPVAL",
        OP_CLOSE_UPVAL => "OP_CLOSE_UPVAL",
        OP_PUSH_PROP => "OP_PUSH_PROP",
        OP_GET_PROP => "OP_GET_PROP",
        OP_SET_PROP => "OP_SET_PROP",
        OP_GET_SUBSCRIPT => "OP_GET_SUBSCRIPT",
        OP_SET_SUBSCRIPT => "OP_SET_SUBSCRIPT",
        OP_PUSH_SUBSCRIPT => "OP_PUSH_SUBSCRIPT",
        OP_DESTRUCT_ARRAY => "OP_DESTRUCT_ARRAY",
        OP_GET_STATIC => "OP_GET_STATIC",
        OP_INIT_PROP => "OP_INIT_PROP",
        OP_CONST => "OP_CONST",
        OP_NULL => "OP_NULL",
        OP_TRUE => "OP_TRUE",
        OP_FALSE => "OP_FALSE",
        OP_ARRAY => "OP_ARRAY",
        OP_ARRAY_ITEM => "OP_ARRAY_ITEM",
        OP_MAP => "OP_MAP",
        OP_MAP_ITEM => "OP_MAP_ITEM",
        OP_ADD => "OP_ADD",
        OP_SUB => "OP_SUB",
        OP_MUL => "OP_MUL",
        OP_DIV => "OP_DIV",
        OP_MOD => "OP_MOD",
        OP_EQL => "OP_EQL",
        OP_NEQL => "OP_NEQL",
        OP_GT => "OP_GT",
        OP_LT => "OP_LT",
        OP_GTE => "OP_GTE",
        OP_LTE => "OP_LTE",
        OP_CAT => "OP_CAT",
        OP_IS => "OP_IS",
        OP_NEG => "OP_NEG",
        OP_NOT => "OP_NOT",
        OP_INEQ_JMP => "OP_INEQ_JMP",
        OP_FALSE_JMP => "OP_FALSE_JMP",
        OP_JMP => "OP_JMP",
        OP_LOOP => "OP_LOOP",
        OP_CALL => "OP_CALL",
        OP_INVOKE => "OP_INVOKE",
        OP_CLOSURE => "OP_CLOSURE",
        OP_RET => "OP_RET",
        OP_STRUCT => "OP_STRUCT",
        OP_METHOD => "OP_METHOD",
        OP_DEF_STATIC => "OP_DEF_STATIC",
        OP_MEMBER => "OP_MEMBER",
        OP_ENUM => "OP_ENUM",
        OP_INST => "OP_INST",
        OP_BREAK => "OP_BREAK",
        _ => "OP_UNKNOWN",
    }
}

// ── Chunk ────────────────────────────────────────────────────────────

pub const MAX_CONSTANTS: usize = u8::MAX as usize + 1;

/// A function's bytecode, its per-byte line table and its constant pool.
#[derive(Debug, Default, Clone)]
pub struct Chunk {
    pub code: Vec<u8>,
    pub lines: Vec<u32>,
    pub constants: Vec<Value>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, byte: u8, line: u32) {
        self.code.push(byte);
        self.lines.push(line);
    }

    /// Adds a constant, reusing an existing identical slot.
    pub fn add_constant(&mut self, value: Value) -> usize {
        let same = |c: &Value| match (c.as_number(), value.as_number()) {
            (Some(a), Some(b)) => a.to_bits() == b.to_bits(),
            _ => *c == value,
        };
        if let Some(i) = self.constants.iter().position(same) {
            return i;
        }
        self.constants.push(value);
        self.constants.len() - 1
    }

    pub fn line_at(&self, offset: usize) -> u32 {
        self.lines.get(offset).copied().unwrap_or(0)
    }

    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.code[offset], self.code[offset + 1]])
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_tracks_lines() {
        let mut c = Chunk::new();
        c.write(OP_NULL, 1);
        c.write(OP_RET, 2);
        assert_eq!(c.len(), 2);
        assert_eq!(c.line_at(0), 1);
        assert_eq!(c.line_at(1), 2);
        assert_eq!(c.line_at(9), 0);
    }

    #[test]
    fn constants_are_deduplicated() {
        let mut c = Chunk::new();
        let a = c.add_constant(Value::number(1.0));
        let b = c.add_constant(Value::number(2.0));
        let again = c.add_constant(Value::number(1.0));
        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(c.constants.len(), 2);
    }

    #[test]
    fn reads_big_endian_jump_operand() {
        let mut c = Chunk::new();
        c.write(OP_JMP, 1);
        c.write(0x01, 1);
        c.write(0x02, 1);
        assert_eq!(c.read_u16(1), 0x0102);
    }

    #[test]
    fn every_opcode_has_a_name() {
        for op in OP_POP..=OP_BREAK {
            assert_ne!(op_name(op), "OP_UNKNOWN", "opcode {op}");
        }
        assert_eq!(op_name(200), "OP_UNKNOWN");
    }
}

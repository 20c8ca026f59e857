//! Human-readable bytecode listings.
//!
//! ```text
//! == add ==
//! 0000    1 OP_GET_LOCAL        1
//! 0002    | OP_GET_LOCAL        2
//! 0004    | OP_ADD
//! 0005    | OP_RET
//! ```

use std::fmt::Write;

use super::*;
use crate::gc::Heap;
use crate::object::{ObjRef, Object};
use crate::vm::describe;

/// Lists `function` and, after it, every function nested in its constants.
pub fn disassemble(heap: &Heap, function: ObjRef) -> String {
    let mut out = String::new();
    let mut pending = vec![function];
    while let Some(f) = pending.pop() {
        let func = heap.function(f);
        let name = match func.name {
            Some(n) => heap.str(n).to_string(),
            None => "<script>".to_string(),
        };
        let _ = writeln!(out, "== {name} ==");
        let chunk = &func.chunk;
        let mut offset = 0;
        while offset < chunk.len() {
            offset = instruction(heap, chunk, offset, &mut out);
        }
        let nested = chunk.constants.iter().rev().filter_map(|c| c.as_obj());
        pending.extend(nested.filter(|&r| matches!(heap.get(r), Object::Function(_))));
    }
    out
}

/// Writes one instruction and returns the offset of the next.
pub fn instruction(heap: &Heap, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let _ = write!(out, "{offset:04} ");
    if offset > 0 && chunk.line_at(offset) == chunk.line_at(offset - 1) {
        out.push_str("   | ");
    } else {
        let _ = write!(out, "{:4} ", chunk.line_at(offset));
    }

    let op = chunk.code[offset];
    let name = op_name(op);
    let byte = |i: usize| chunk.code.get(offset + i).copied().unwrap_or(0);
    let constant = |i: usize| {
        chunk.constants.get(i).map(|&c| describe(heap, c)).unwrap_or_else(|| "?".to_string())
    };

    match op {
        OP_GET_GLOBAL | OP_SET_GLOBAL | OP_PUSH_PROP | OP_GET_PROP | OP_SET_PROP
        | OP_GET_STATIC | OP_INIT_PROP | OP_CONST | OP_STRUCT | OP_METHOD | OP_DEF_STATIC
        | OP_MEMBER => {
            let c = byte(1) as usize;
            let _ = writeln!(out, "{name:<16} {c:4} '{}'", constant(c));
            offset + 2
        }
        OP_GET_LOCAL | OP_SET_LOCAL | OP_GET_UPVAL | OP_SET_UPVAL | OP_CALL
        | OP_DESTRUCT_ARRAY => {
            let _ = writeln!(out, "{name:<16} {:4}", byte(1));
            offset + 2
        }
        OP_INEQ_JMP | OP_FALSE_JMP | OP_JMP | OP_LOOP | OP_BREAK => {
            let jump = usize::from(chunk.read_u16(offset + 1));
            let target = if op == OP_LOOP {
                (offset + 3).saturating_sub(jump)
            } else {
                offset + 3 + jump
            };
            let _ = writeln!(out, "{name:<16} {offset:4} -> {target}");
            offset + 3
        }
        OP_INVOKE => {
            let c = byte(1) as usize;
            let _ = writeln!(out, "{name:<16} ({} args) {c:4} '{}'", byte(2), constant(c));
            offset + 3
        }
        OP_CLOSURE => {
            let c = byte(1) as usize;
            let _ = writeln!(out, "{name:<16} {c:4} {}", constant(c));
            let upvalues = chunk
                .constants
                .get(c)
                .and_then(|v| v.as_obj())
                .map(|r| heap.function(r).upvalue_count as usize)
                .unwrap_or(0);
            let mut next = offset + 2;
            for _ in 0..upvalues {
                let kind = if byte(next - offset) == 1 { "local" } else { "upvalue" };
                let index = byte(next - offset + 1);
                let _ = writeln!(out, "{next:04}      |                     {kind} {index}");
                next += 2;
            }
            next
        }
        OP_ENUM => {
            let c = byte(1) as usize;
            let count = byte(2) as usize;
            let _ = writeln!(out, "{name:<16} {c:4} '{}' {count:4}", constant(c));
            for i in 0..count {
                let at = offset + 3 + i;
                let _ = writeln!(out, "{at:04}      |                   {}", constant(byte(3 + i) as usize));
            }
            offset + 3 + count
        }
        _ => {
            let _ = writeln!(out, "{name}");
            offset + 1
        }
    }
}

//! Single-pass compiler: parses tokens and emits bytecode directly, with no
//! intermediate tree.
//!
//! One [`FnState`] per function being compiled sits on `states`; the last
//! entry is the innermost. Errors put the compiler in panic mode until the
//! next statement boundary so one pass can report several diagnostics.

mod expr;
mod stmt;

use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::chunk::{Chunk, MAX_CONSTANTS, OP_LOOP, OP_NULL, OP_RET};
use crate::lexer::{Lexer, Literal, Span, Token, TokenKind};
use crate::object::{Function, ObjRef, Object};
use crate::value::Value;
use crate::vm::Interpreter;

const MAX_ERRORS: usize = 20;
const MAX_LOCALS: usize = 256;
const MAX_UPVALUES: usize = 256;

// ── Errors ───────────────────────────────────────────────────────────

/// Where the offending token sits, for the `near` part of a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Near {
    End,
    Token(String),
    /// Lexer errors carry their own message and no token text.
    Nothing,
}

impl fmt::Display for Near {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Near::End => write!(f, " near end"),
            Near::Token(t) => write!(f, " near '{t}'"),
            Near::Nothing => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{path}:{line}{near}: {message}")]
pub struct CompileError {
    pub path: String,
    pub line: u32,
    pub near: Near,
    pub message: String,
    pub span: Span,
}

/// Every diagnostic from one compilation unit, in source order.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}", render_all(.0))]
pub struct CompileErrors(pub Vec<CompileError>);

fn render_all(errors: &[CompileError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
}

impl CompileErrors {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CompileError> {
        self.0.iter()
    }
}

// ── Per-function state ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FnKind {
    Script,
    Function,
    /// Slot 0 holds the receiver, named `self`.
    Method,
}

struct Local<'src> {
    name: &'src str,
    /// `None` until the initializer has been compiled.
    depth: Option<u32>,
    captured: bool,
    is_const: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct UpvalueSlot {
    index: u8,
    is_local: bool,
    is_const: bool,
}

struct LoopState<'src> {
    start: usize,
    label: Option<&'src str>,
    /// Locals deeper than this are discarded by `continue`.
    continue_depth: u32,
    /// Locals deeper than this are discarded by `break`.
    break_depth: u32,
    /// Operand offsets of `OP_BREAK` placeholders.
    breaks: Vec<usize>,
}

struct FnState<'src> {
    kind: FnKind,
    name: Option<&'src str>,
    arity: usize,
    chunk: Chunk,
    locals: Vec<Local<'src>>,
    upvalues: Vec<UpvalueSlot>,
    scope_depth: u32,
    loops: Vec<LoopState<'src>>,
}

impl<'src> FnState<'src> {
    fn new(kind: FnKind, name: Option<&'src str>) -> Self {
        let slot_zero = if kind == FnKind::Method { "self" } else { "" };
        FnState {
            kind,
            name,
            arity: 0,
            chunk: Chunk::new(),
            locals: vec![Local { name: slot_zero, depth: Some(0), captured: false, is_const: true }],
            upvalues: Vec::new(),
            scope_depth: 0,
            loops: Vec::new(),
        }
    }
}

// ── Compiler ─────────────────────────────────────────────────────────

pub struct Compiler<'src, 'vm> {
    vm: &'vm mut Interpreter,
    lexer: Lexer<'src>,
    path: String,
    path_ref: ObjRef,
    current: Token<'src>,
    previous: Token<'src>,
    panic_mode: bool,
    errors: Vec<CompileError>,
    states: Vec<FnState<'src>>,
    /// Set while the first operand of an expression statement is parsed,
    /// where `a, b = xs;` is allowed.
    in_expr_stmt: bool,
    /// Name given to the next function compiled (from `var f = fn ...`).
    last_name: Option<&'src str>,
    within_struct: bool,
}

/// Compiles `source` into a top-level function. `path` is only used in
/// diagnostics and stack traces.
pub fn compile(vm: &mut Interpreter, path: &str, source: &str) -> Result<ObjRef, CompileErrors> {
    let mark = vm.compiler_roots.len();
    let result = Compiler::new(vm, path, source).run();
    vm.compiler_roots.truncate(mark);
    result
}

impl<'src, 'vm> Compiler<'src, 'vm> {
    fn new(vm: &'vm mut Interpreter, path: &str, source: &'src str) -> Self {
        let path_ref = vm.intern(path);
        vm.compiler_roots.push(Value::object(path_ref));
        Compiler {
            vm,
            lexer: Lexer::new(source),
            path: path.to_string(),
            path_ref,
            current: Token::synthetic(TokenKind::Eof),
            previous: Token::synthetic(TokenKind::Eof),
            panic_mode: false,
            errors: Vec::new(),
            states: vec![FnState::new(FnKind::Script, None)],
            in_expr_stmt: false,
            last_name: None,
            within_struct: false,
        }
    }

    fn run(mut self) -> Result<ObjRef, CompileErrors> {
        self.advance();
        while !self.matches(TokenKind::Eof) {
            self.declaration();
        }
        let (function, _) = self.end_function();
        if self.errors.is_empty() {
            Ok(function)
        } else {
            Err(CompileErrors(self.errors))
        }
    }

    // ── Token stream ─────────────────────────────────────────────────

    fn advance(&mut self) {
        loop {
            let next = self.lexer.next_token();
            self.previous = std::mem::replace(&mut self.current, next);
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = match self.current.value {
                Literal::Error(m) => m,
                _ => "Unexpected character",
            };
            self.error_at_current(message);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn expect(&mut self, kind: TokenKind, message: &str) {
        if self.check(kind) {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    // ── Diagnostics ──────────────────────────────────────────────────

    fn error_at(&mut self, at_current: bool, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        if self.errors.len() >= MAX_ERRORS {
            return;
        }
        let token = if at_current { &self.current } else { &self.previous };
        let near = match token.kind {
            TokenKind::Eof => Near::End,
            TokenKind::Error => Near::Nothing,
            _ => Near::Token(token.lexeme.to_string()),
        };
        self.errors.push(CompileError {
            path: self.path.clone(),
            line: token.line,
            near,
            message: message.to_string(),
            span: token.span,
        });
    }

    fn error(&mut self, message: &str) {
        self.error_at(false, message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(true, message);
    }

    /// Skips to a likely statement boundary after an error.
    fn synchronize(&mut self) {
        use TokenKind::*;
        self.panic_mode = false;
        while self.current.kind != Eof {
            if self.previous.kind == Semicolon {
                return;
            }
            match self.current.kind {
                Struct | Enum | Fn | Var | Const | Static | If | Else | For | While | Loop
                | Return | Continue | Break | Switch | Case | RBrace => return,
                _ => self.advance(),
            }
        }
    }

    // ── Emission ─────────────────────────────────────────────────────

    fn fs(&mut self) -> &mut FnState<'src> {
        let top = self.states.len() - 1;
        &mut self.states[top]
    }

    fn chunk(&mut self) -> &mut Chunk {
        &mut self.fs().chunk
    }

    fn emit(&mut self, byte: u8) {
        let line = self.previous.line;
        self.chunk().write(byte, line);
    }

    fn emit2(&mut self, a: u8, b: u8) {
        self.emit(a);
        self.emit(b);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        let chunk = self.chunk();
        let before = chunk.constants.len();
        let index = chunk.add_constant(value);
        if index >= MAX_CONSTANTS {
            self.error("Too many constants in one chunk");
            return 0;
        }
        if index == before && value.is_obj() {
            self.vm.compiler_roots.push(value);
        }
        index as u8
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit2(crate::chunk::OP_CONST, index);
    }

    fn identifier_constant(&mut self, name: &str) -> u8 {
        let r = self.vm.intern(name);
        self.make_constant(Value::object(r))
    }

    /// Emits a jump with a placeholder operand and returns the operand offset.
    fn emit_jump(&mut self, op: u8) -> usize {
        self.emit(op);
        self.emit2(0xff, 0xff);
        self.chunk().len() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        let distance = self.chunk().len() - offset - 2;
        if distance > u16::MAX as usize {
            self.error("Jump body too large");
            return;
        }
        let [hi, lo] = (distance as u16).to_be_bytes();
        let code = &mut self.chunk().code;
        code[offset] = hi;
        code[offset + 1] = lo;
    }

    fn emit_loop(&mut self, start: usize) {
        self.emit(OP_LOOP);
        let distance = self.chunk().len() - start + 2;
        if distance > u16::MAX as usize {
            self.error("Loop body too large");
        }
        let [hi, lo] = (distance.min(u16::MAX as usize) as u16).to_be_bytes();
        self.emit2(hi, lo);
    }

    fn emit_return(&mut self) {
        self.emit2(OP_NULL, OP_RET);
    }

    // ── Functions ────────────────────────────────────────────────────

    fn begin_function(&mut self, kind: FnKind, name: Option<&'src str>) {
        self.states.push(FnState::new(kind, name));
    }

    /// Finishes the innermost function, allocating its prototype. Returns it
    /// with the upvalue descriptors the enclosing `OP_CLOSURE` must carry.
    fn end_function(&mut self) -> (ObjRef, Vec<UpvalueSlot>) {
        self.emit_return();
        let state = match self.states.pop() {
            Some(state) => state,
            None => unreachable!("function state stack underflow"),
        };
        let name = state.name.map(|n| self.vm.intern(n));
        if let Some(n) = name {
            self.vm.compiler_roots.push(Value::object(n));
        }
        trace!(
            name = state.name.unwrap_or("script"),
            kind = ?state.kind,
            bytes = state.chunk.len(),
            constants = state.chunk.constants.len(),
            "compiled function"
        );
        let function = self.vm.alloc(Object::Function(Function {
            arity: state.arity as u8,
            upvalue_count: state.upvalues.len() as u8,
            chunk: Rc::new(state.chunk),
            name,
            path: self.path_ref,
        }));
        (function, state.upvalues)
    }

    // ── Scopes and variables ─────────────────────────────────────────

    fn begin_scope(&mut self) {
        self.fs().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        let fs = self.fs();
        fs.scope_depth -= 1;
        let depth = fs.scope_depth;
        while let Some(local) = self.fs().locals.last() {
            if local.depth.is_some_and(|d| d <= depth) {
                break;
            }
            let op = if local.captured { crate::chunk::OP_CLOSE_UPVAL } else { crate::chunk::OP_POP };
            self.fs().locals.pop();
            self.emit(op);
        }
    }

    /// Emits pops for locals deeper than `depth` without forgetting them;
    /// used by `break` and `continue`.
    fn discard_locals(&mut self, depth: u32) {
        let ops: Vec<u8> = self
            .fs()
            .locals
            .iter()
            .rev()
            .take_while(|l| l.depth.is_none_or(|d| d > depth))
            .map(|l| if l.captured { crate::chunk::OP_CLOSE_UPVAL } else { crate::chunk::OP_POP })
            .collect();
        for op in ops {
            self.emit(op);
        }
    }

    fn add_local(&mut self, name: &'src str, is_const: bool) {
        if self.fs().locals.len() == MAX_LOCALS {
            self.error("Too many local variables in one chunk");
            return;
        }
        self.fs().locals.push(Local { name, depth: None, captured: false, is_const });
    }

    fn declare_variable(&mut self, name: &'src str, is_const: bool) {
        let fs = self.fs();
        let depth = fs.scope_depth;
        let duplicate = fs
            .locals
            .iter()
            .rev()
            .take_while(|l| l.depth.is_none_or(|d| d >= depth))
            .any(|l| l.name == name);
        if duplicate {
            self.error("Variable shadows another variable in the same scope");
        }
        self.add_local(name, is_const);
    }

    /// Consumes an identifier and declares it as a local.
    fn parse_variable(&mut self, message: &str, is_const: bool) -> &'src str {
        self.expect(TokenKind::Identifier, message);
        let name = self.previous.lexeme;
        self.last_name = Some(name);
        self.declare_variable(name, is_const);
        name
    }

    fn mark_initialized(&mut self) {
        let fs = self.fs();
        let depth = fs.scope_depth;
        if let Some(local) = fs.locals.last_mut() {
            local.depth = Some(depth);
        }
    }

    fn resolve_local(&mut self, level: usize, name: &str) -> Option<(u8, bool)> {
        let found = self.states[level]
            .locals
            .iter()
            .enumerate()
            .rev()
            .find(|(_, l)| l.name == name)
            .map(|(i, l)| (i, l.depth.is_none(), l.is_const));
        let (index, uninitialized, is_const) = found?;
        if uninitialized {
            self.error("Cannot use a local variable in its own definition");
        }
        Some((index as u8, is_const))
    }

    fn resolve_upvalue(&mut self, level: usize, name: &str) -> Option<(u8, bool)> {
        if level == 0 {
            return None;
        }
        if let Some((index, is_const)) = self.resolve_local(level - 1, name) {
            self.states[level - 1].locals[index as usize].captured = true;
            return Some((self.add_upvalue(level, index, true, is_const), is_const));
        }
        let (index, is_const) = self.resolve_upvalue(level - 1, name)?;
        Some((self.add_upvalue(level, index, false, is_const), is_const))
    }

    fn add_upvalue(&mut self, level: usize, index: u8, is_local: bool, is_const: bool) -> u8 {
        let slot = UpvalueSlot { index, is_local, is_const };
        let upvalues = &self.states[level].upvalues;
        if let Some(existing) = upvalues.iter().position(|u| u.index == index && u.is_local == is_local) {
            return existing as u8;
        }
        if upvalues.len() == MAX_UPVALUES {
            self.error("Too many upvalues in one function");
            return 0;
        }
        self.states[level].upvalues.push(slot);
        (self.states[level].upvalues.len() - 1) as u8
    }

    fn innermost(&self) -> usize {
        self.states.len() - 1
    }
}

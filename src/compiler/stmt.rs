//! Declarations and statements.

use crate::chunk::*;
use crate::lexer::TokenKind;

use super::{Compiler, FnKind, LoopState};

impl<'src> Compiler<'src, '_> {
    pub(super) fn declaration(&mut self) {
        self.last_name = None;
        match self.current.kind {
            TokenKind::Var => {
                self.advance();
                self.var_declaration(false);
            }
            TokenKind::Const => {
                self.advance();
                self.var_declaration(true);
            }
            TokenKind::Fn if self.peek_is_named_function() => {
                self.advance();
                self.fn_declaration();
            }
            TokenKind::Struct => {
                self.advance();
                self.struct_declaration();
            }
            TokenKind::Enum => {
                self.advance();
                self.enum_declaration();
            }
            _ => self.statement(),
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    /// `fn name(...)` declares; `fn (...)` starts a lambda expression.
    fn peek_is_named_function(&self) -> bool {
        self.lexer.clone().next_token().kind == TokenKind::Identifier
    }

    pub(super) fn block(&mut self) {
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.expect(TokenKind::RBrace, "Expected '}'");
    }

    // ── Declarations ─────────────────────────────────────────────────

    /// `var a = e;`, `var a;`, or `var a, b = array;` which destructures.
    pub(super) fn var_declaration(&mut self, is_const: bool) {
        self.parse_variable("Expected an identifier", is_const);
        if !self.check(TokenKind::Comma) {
            if self.matches(TokenKind::Equal) {
                self.expression();
            } else if is_const {
                self.error_at_current("Expected '='");
            } else {
                self.emit(OP_NULL);
            }
            self.mark_initialized();
            self.expect(TokenKind::Semicolon, "Expected ';'");
            return;
        }

        // Every target gets a null slot first, then the array is unpacked
        // into them.
        self.mark_initialized();
        self.emit(OP_NULL);
        let first_slot = self.fs().locals.len() - 1;
        let mut count = 1;
        while self.matches(TokenKind::Comma) {
            self.parse_variable("Expected an identifier", is_const);
            self.mark_initialized();
            self.emit(OP_NULL);
            count += 1;
        }
        self.last_name = None;

        if self.matches(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit(OP_NULL);
        }
        for i in 0..count {
            if i > u8::MAX as usize {
                self.error("Too many assignment targets");
                break;
            }
            self.emit2(OP_DESTRUCT_ARRAY, i as u8);
            self.emit2(OP_SET_LOCAL, (first_slot + i) as u8);
            self.emit(OP_POP);
        }
        self.emit(OP_POP);
        self.expect(TokenKind::Semicolon, "Expected ';'");
    }

    fn fn_declaration(&mut self) {
        self.parse_variable("Expected an identifier", true);
        self.mark_initialized();
        self.function(FnKind::Function, false);
    }

    fn at_top_level(&self) -> bool {
        self.states.len() == 1 && self.states[0].scope_depth == 0
    }

    fn struct_declaration(&mut self) {
        if !self.at_top_level() {
            self.error("Struct declaration must not be declared in a scope");
            return;
        }
        self.expect(TokenKind::Identifier, "Expected an identifier");
        let name = self.previous.lexeme;
        let name_const = self.identifier_constant(name);
        self.declare_variable(name, true);
        self.emit2(OP_STRUCT, name_const);
        self.mark_initialized();

        // A copy of the struct stays on the stack while members are defined.
        self.named_variable(name, false);
        self.within_struct = true;

        if self.matches(TokenKind::Semicolon) {
            // `struct Name;` on the first line turns the rest of the file
            // into the struct body and returns the struct.
            if self.previous.line != 1 {
                self.error("Struct statement must be on line #1");
            }
            while !self.check(TokenKind::Eof) {
                self.struct_member(false);
                if self.panic_mode {
                    self.synchronize();
                }
            }
            self.emit(OP_RET);
        } else {
            self.struct_body(false);
            self.emit(OP_POP);
        }
        self.within_struct = false;
    }

    fn struct_body(&mut self, all_static: bool) {
        self.expect(TokenKind::LBrace, "Expected '{'");
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            self.struct_member(all_static);
            if self.panic_mode {
                self.synchronize();
            }
        }
        self.expect(TokenKind::RBrace, "Expected '}'");
    }

    /// One member inside a struct body. The struct being defined is on top of
    /// the stack; each member form consumes the value it pushes.
    fn struct_member(&mut self, all_static: bool) {
        self.last_name = None;
        match self.current.kind {
            TokenKind::Fn => {
                self.advance();
                self.method(all_static);
            }
            TokenKind::Var => {
                self.advance();
                if all_static {
                    self.error("Static structs cannot have instance members");
                }
                self.expect(TokenKind::Identifier, "Expected an identifier");
                let name_const = self.identifier_constant(self.previous.lexeme);
                if self.matches(TokenKind::Equal) {
                    self.expression();
                } else {
                    self.emit(OP_NULL);
                }
                self.expect(TokenKind::Semicolon, "Expected ';'");
                self.emit2(OP_MEMBER, name_const);
            }
            TokenKind::Const => {
                self.advance();
                self.expect(TokenKind::Identifier, "Expected an identifier");
                let name_const = self.identifier_constant(self.previous.lexeme);
                self.expect(TokenKind::Equal, "Expected '='");
                self.expression();
                self.expect(TokenKind::Semicolon, "Expected ';'");
                self.emit2(OP_DEF_STATIC, name_const);
            }
            TokenKind::Static => {
                self.advance();
                if self.matches(TokenKind::Fn) {
                    self.method(true);
                } else if self.matches(TokenKind::Struct) {
                    self.nested_struct(true);
                } else {
                    self.error_at_current("Expected 'fn' or 'struct' after 'static'");
                }
            }
            TokenKind::Struct => {
                self.advance();
                self.nested_struct(all_static);
            }
            TokenKind::Enum => {
                self.advance();
                self.expect(TokenKind::Identifier, "Expected an identifier");
                let name_const = self.identifier_constant(self.previous.lexeme);
                self.enum_body(name_const);
                self.emit2(OP_DEF_STATIC, name_const);
            }
            _ => {
                self.error_at_current("Structs can only contain declarations");
                self.advance();
            }
        }
    }

    fn method(&mut self, is_static: bool) {
        self.expect(TokenKind::Identifier, "Expected an identifier");
        let name = self.previous.lexeme;
        let name_const = self.identifier_constant(name);
        self.last_name = Some(name);
        if is_static {
            self.function(FnKind::Function, false);
            self.emit2(OP_DEF_STATIC, name_const);
        } else {
            self.function(FnKind::Method, false);
            self.emit2(OP_METHOD, name_const);
        }
    }

    fn nested_struct(&mut self, all_static: bool) {
        self.expect(TokenKind::Identifier, "Expected an identifier");
        let name_const = self.identifier_constant(self.previous.lexeme);
        self.emit2(OP_STRUCT, name_const);
        self.struct_body(all_static);
        self.emit2(OP_DEF_STATIC, name_const);
    }

    fn enum_declaration(&mut self) {
        if !self.at_top_level() {
            self.error("Enum declaration must not be declared in a scope");
            return;
        }
        self.expect(TokenKind::Identifier, "Expected an identifier");
        let name = self.previous.lexeme;
        let name_const = self.identifier_constant(name);
        self.declare_variable(name, true);
        self.enum_body(name_const);
        self.mark_initialized();
    }

    /// `{ A, B, C }`, with an optional trailing comma. Emits `OP_ENUM`, which
    /// leaves the new enum on the stack.
    fn enum_body(&mut self, name_const: u8) {
        self.expect(TokenKind::LBrace, "Expected '{'");
        let mut names = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            self.expect(TokenKind::Identifier, "Expected an identifier");
            names.push(self.identifier_constant(self.previous.lexeme));
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "Expected '}'");
        if names.len() > u8::MAX as usize {
            self.error("Too many values in one enum");
            names.truncate(u8::MAX as usize);
        }
        self.emit2(OP_ENUM, name_const);
        self.emit(names.len() as u8);
        for n in names {
            self.emit(n);
        }
    }

    // ── Statements ───────────────────────────────────────────────────

    fn statement(&mut self) {
        match self.current.kind {
            TokenKind::If => {
                self.advance();
                self.if_statement();
            }
            TokenKind::While => {
                self.advance();
                self.while_statement();
            }
            TokenKind::For => {
                self.advance();
                self.for_statement();
            }
            TokenKind::Loop => {
                self.advance();
                self.loop_statement();
            }
            TokenKind::Switch => {
                self.advance();
                self.switch_statement();
            }
            TokenKind::Return => {
                self.advance();
                self.return_statement();
            }
            TokenKind::Break => {
                self.advance();
                self.break_statement();
            }
            TokenKind::Continue => {
                self.advance();
                self.continue_statement();
            }
            TokenKind::LBrace => {
                self.advance();
                self.begin_scope();
                self.block();
                self.end_scope();
            }
            TokenKind::Semicolon => self.advance(),
            _ => self.expression_statement(),
        }
    }

    fn expression_statement(&mut self) {
        self.in_expr_stmt = true;
        self.expression();
        self.in_expr_stmt = false;
        self.expect(TokenKind::Semicolon, "Expected ';'");
        self.emit(OP_POP);
    }

    fn if_statement(&mut self) {
        self.expect(TokenKind::LParen, "Expected '('");
        self.expression();
        self.expect(TokenKind::RParen, "Expected ')'");

        let then_jump = self.emit_jump(OP_FALSE_JMP);
        self.emit(OP_POP);
        self.statement();
        let else_jump = self.emit_jump(OP_JMP);
        self.patch_jump(then_jump);
        self.emit(OP_POP);
        if self.matches(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn loop_label(&mut self) -> Option<&'src str> {
        if !self.matches(TokenKind::Colon) {
            return None;
        }
        self.expect(TokenKind::Identifier, "Expected a loop label");
        Some(self.previous.lexeme)
    }

    fn begin_loop(&mut self, start: usize, label: Option<&'src str>, continue_depth: u32, break_depth: u32) {
        self.fs().loops.push(LoopState { start, label, continue_depth, break_depth, breaks: Vec::new() });
    }

    /// Rewrites this loop's break placeholders into jumps to here.
    fn end_loop(&mut self) {
        let Some(state) = self.fs().loops.pop() else { return };
        for offset in state.breaks {
            self.chunk().code[offset - 1] = OP_JMP;
            self.patch_jump(offset);
        }
    }

    fn while_statement(&mut self) {
        let start = self.chunk().len();
        self.expect(TokenKind::LParen, "Expected '('");
        self.expression();
        self.expect(TokenKind::RParen, "Expected ')'");
        let label = self.loop_label();

        let depth = self.fs().scope_depth;
        self.begin_loop(start, label, depth, depth);
        let exit = self.emit_jump(OP_FALSE_JMP);
        self.emit(OP_POP);
        self.statement();
        self.emit_loop(start);
        self.patch_jump(exit);
        self.emit(OP_POP);
        self.end_loop();
    }

    fn loop_statement(&mut self) {
        let start = self.chunk().len();
        let label = self.loop_label();
        let depth = self.fs().scope_depth;
        self.begin_loop(start, label, depth, depth);
        self.statement();
        self.emit_loop(start);
        self.end_loop();
    }

    /// `for (init; cond; step) body`. The initializer's variables live in
    /// their own scope around the loop.
    fn for_statement(&mut self) {
        self.begin_scope();
        self.expect(TokenKind::LParen, "Expected '('");
        if self.matches(TokenKind::Var) {
            self.var_declaration(false);
        } else if !self.matches(TokenKind::Semicolon) {
            self.expression_statement();
        }

        let mut start = self.chunk().len();
        let mut exit = None;
        if !self.matches(TokenKind::Semicolon) {
            self.expression();
            self.expect(TokenKind::Semicolon, "Expected ';'");
            exit = Some(self.emit_jump(OP_FALSE_JMP));
            self.emit(OP_POP);
        }

        if !self.matches(TokenKind::RParen) {
            let body = self.emit_jump(OP_JMP);
            let step = self.chunk().len();
            self.expression();
            self.emit(OP_POP);
            self.expect(TokenKind::RParen, "Expected ')'");
            self.emit_loop(start);
            start = step;
            self.patch_jump(body);
        }
        let label = self.loop_label();

        let depth = self.fs().scope_depth;
        self.begin_loop(start, label, depth, depth - 1);
        self.statement();
        self.emit_loop(start);
        if let Some(exit) = exit {
            self.patch_jump(exit);
            self.emit(OP_POP);
        }
        self.end_scope();
        self.end_loop();
    }

    /// ```text
    /// switch (subject) {
    ///     case value -> statement
    ///     else -> statement
    /// }
    /// ```
    /// Cases do not fall through. The subject is popped on every path.
    fn switch_statement(&mut self) {
        self.expect(TokenKind::LParen, "Expected '('");
        self.expression();
        self.expect(TokenKind::RParen, "Expected ')'");
        self.expect(TokenKind::LBrace, "Expected '{'");

        let mut ends = Vec::new();
        let mut has_else = false;
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            if self.matches(TokenKind::Case) {
                if has_else {
                    self.error("'else' case must be the last case in a switch");
                }
                self.expression();
                self.expect(TokenKind::Arrow, "Expected '->'");
                let next = self.emit_jump(OP_INEQ_JMP);
                self.emit(OP_POP);
                self.statement();
                ends.push(self.emit_jump(OP_JMP));
                self.patch_jump(next);
            } else if self.matches(TokenKind::Else) {
                if has_else {
                    self.error("A switch can only have one 'else' case");
                }
                has_else = true;
                self.expect(TokenKind::Arrow, "Expected '->'");
                self.emit(OP_POP);
                self.statement();
            } else {
                self.error_at_current("Expected 'case' or 'else'");
                self.advance();
            }
        }
        self.expect(TokenKind::RBrace, "Expected '}'");

        if !has_else {
            self.emit(OP_POP);
        }
        for end in ends {
            self.patch_jump(end);
        }
    }

    fn return_statement(&mut self) {
        if self.matches(TokenKind::Semicolon) {
            self.emit_return();
            return;
        }
        self.expression();
        self.expect(TokenKind::Semicolon, "Expected ';'");
        self.emit(OP_RET);
    }

    fn find_loop(&mut self, keyword: &str) -> Option<usize> {
        if self.fs().loops.is_empty() {
            self.error(&format!("Cannot use '{keyword}' outside of a loop"));
            return None;
        }
        let label = if self.check(TokenKind::Identifier) {
            self.advance();
            Some(self.previous.lexeme)
        } else {
            None
        };
        let loops = &self.fs().loops;
        let found = match label {
            Some(name) => loops.iter().rposition(|l| l.label == Some(name)),
            None => Some(loops.len() - 1),
        };
        if found.is_none() {
            self.error("Could not resolve loop label");
        }
        found
    }

    fn break_statement(&mut self) {
        let Some(index) = self.find_loop("break") else { return };
        let depth = self.fs().loops[index].break_depth;
        self.discard_locals(depth);
        let jump = self.emit_jump(OP_BREAK);
        self.fs().loops[index].breaks.push(jump);
        self.expect(TokenKind::Semicolon, "Expected ';'");
    }

    fn continue_statement(&mut self) {
        let Some(index) = self.find_loop("continue") else { return };
        let (depth, start) = {
            let l = &self.fs().loops[index];
            (l.continue_depth, l.start)
        };
        self.discard_locals(depth);
        self.emit_loop(start);
        self.expect(TokenKind::Semicolon, "Expected ';'");
    }
}

#[cfg(test)]
mod tests {
    use crate::chunk::*;
    use crate::compiler::compile;
    use crate::config::Config;
    use crate::vm::Interpreter;

    fn code(source: &str) -> Vec<u8> {
        let mut vm = Interpreter::new(Config::default());
        let f = compile(&mut vm, "t", source).unwrap();
        vm.heap.function(f).chunk.code.clone()
    }

    fn listing(source: &str) -> String {
        let mut vm = Interpreter::new(Config::default());
        let f = compile(&mut vm, "t", source).unwrap();
        disasm::disassemble(&vm.heap, f)
    }

    #[test]
    fn top_level_var_is_a_local() {
        assert_eq!(code("var a = 1;"), vec![OP_CONST, 0, OP_NULL, OP_RET]);
    }

    #[test]
    fn block_pops_its_locals() {
        assert_eq!(code("{ var a = 1; }"), vec![OP_CONST, 0, OP_POP, OP_NULL, OP_RET]);
    }

    #[test]
    fn break_placeholders_are_patched() {
        let text = listing("while (true) { break; }");
        assert!(!text.contains("OP_BREAK"), "{text}");
        assert_eq!(text.matches("OP_JMP").count(), 1, "{text}");
    }

    #[test]
    fn switch_without_else_pops_subject() {
        let text = listing("switch (1) { case 1 -> {} }");
        // one pop on the matching path, one after the last failed case
        assert_eq!(text.matches("OP_POP").count(), 2, "{text}");
    }

    #[test]
    fn enum_declaration_emits_values() {
        let c = code("enum Color { Red, Green, Blue, }");
        assert_eq!(&c[..3], &[OP_ENUM, 0, 3]);
        assert_eq!(c.len(), 3 + 3 + 2);
    }

    #[test]
    fn captured_locals_are_closed() {
        let text = listing("{ var a = 1; fn f() -> a; }");
        assert!(text.contains("OP_CLOSE_UPVAL"), "{text}");
    }
}

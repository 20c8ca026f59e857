//! Pratt expression parsing. Prefix and infix rules are selected by a match
//! on the token kind; binding power comes from [`infix_precedence`].

use crate::chunk::*;
use crate::lexer::{Literal, TokenKind};
use crate::value::Value;

use super::{Compiler, FnKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(super) enum Prec {
    None,
    Assign,
    Or,
    And,
    Equality,
    Is,
    Comparison,
    Term,
    Factor,
    Unary,
    Subscript,
    Call,
    Primary,
}

impl Prec {
    fn next(self) -> Prec {
        match self {
            Prec::None => Prec::Assign,
            Prec::Assign => Prec::Or,
            Prec::Or => Prec::And,
            Prec::And => Prec::Equality,
            Prec::Equality => Prec::Is,
            Prec::Is => Prec::Comparison,
            Prec::Comparison => Prec::Term,
            Prec::Term => Prec::Factor,
            Prec::Factor => Prec::Unary,
            Prec::Unary => Prec::Subscript,
            Prec::Subscript => Prec::Call,
            Prec::Call | Prec::Primary => Prec::Primary,
        }
    }
}

fn infix_precedence(kind: TokenKind) -> Prec {
    use TokenKind::*;
    match kind {
        LParen | Dot | Colon | LBrace => Prec::Call,
        LBracket => Prec::Subscript,
        Minus | Plus | DotDot => Prec::Term,
        Star | Slash | Percent => Prec::Factor,
        EqualEqual | BangEqual => Prec::Equality,
        Less | LessEqual | Greater | GreaterEqual => Prec::Comparison,
        Is => Prec::Is,
        AndAnd => Prec::And,
        OrOr => Prec::Or,
        _ => Prec::None,
    }
}

/// Compound assignment operators, mapped to the arithmetic opcode they apply.
/// `++` and `--` add or subtract a literal one.
fn compound_op(kind: TokenKind) -> Option<u8> {
    use TokenKind::*;
    match kind {
        PlusEqual | PlusPlus => Some(OP_ADD),
        MinusEqual | MinusMinus => Some(OP_SUB),
        StarEqual => Some(OP_MUL),
        SlashEqual => Some(OP_DIV),
        PercentEqual => Some(OP_MOD),
        _ => None,
    }
}

/// How a named variable is read and written.
#[derive(Clone, Copy)]
enum Access {
    Local(u8),
    Upvalue(u8),
    Global(u8),
}

impl Access {
    fn ops(self) -> (u8, u8, u8) {
        match self {
            Access::Local(i) => (OP_GET_LOCAL, OP_SET_LOCAL, i),
            Access::Upvalue(i) => (OP_GET_UPVAL, OP_SET_UPVAL, i),
            Access::Global(i) => (OP_GET_GLOBAL, OP_SET_GLOBAL, i),
        }
    }
}

impl<'src> Compiler<'src, '_> {
    pub(super) fn expression(&mut self) {
        self.parse_precedence(Prec::Assign);
    }

    fn parse_precedence(&mut self, prec: Prec) {
        let stmt_start = std::mem::take(&mut self.in_expr_stmt);
        self.advance();
        let can_assign = prec <= Prec::Assign;
        if !self.prefix(can_assign, stmt_start) {
            self.error("Expected an expression");
            return;
        }
        while prec <= infix_precedence(self.current.kind) {
            self.advance();
            self.infix(can_assign);
        }
        if can_assign && self.matches(TokenKind::Equal) {
            self.error("Invalid assignment target");
        }
    }

    /// Compiles the prefix rule for the previous token. Returns false when
    /// the token cannot start an expression.
    fn prefix(&mut self, can_assign: bool, stmt_start: bool) -> bool {
        use TokenKind::*;
        match self.previous.kind {
            Identifier => self.variable(can_assign, stmt_start),
            Number => self.number(),
            Str => self.string(),
            StrFmt => self.interpolation(),
            True => self.emit(OP_TRUE),
            False => self.emit(OP_FALSE),
            Null => self.emit(OP_NULL),
            LParen => self.grouping(),
            LBracket => self.array(),
            LBrace => self.map(),
            Fn => self.function(FnKind::Function, true),
            If => self.ternary(),
            SelfKw => self.self_(),
            Minus | Bang => self.unary(),
            _ => return false,
        }
        true
    }

    fn infix(&mut self, can_assign: bool) {
        use TokenKind::*;
        match self.previous.kind {
            LParen => self.call(),
            Dot => self.dot(can_assign),
            Colon => self.static_access(),
            LBracket => self.subscript(can_assign),
            LBrace => self.instance(),
            AndAnd => self.and(),
            OrOr => self.or(),
            _ => self.binary(),
        }
    }

    // ── Literals ─────────────────────────────────────────────────────

    fn number(&mut self) {
        let n = match self.previous.value {
            Literal::Number(n) => n,
            _ => 0.0,
        };
        self.emit_constant(Value::number(n));
    }

    fn string(&mut self) {
        let text = match std::mem::take(&mut self.previous.value) {
            Literal::Str(s) => s,
            _ => String::new(),
        };
        let r = self.vm.intern_owned(text);
        self.emit_constant(Value::object(r));
    }

    /// `$"a{x}b{y}c"` lexes as StrFmt("a") expr StrFmt("b") expr StrFmtEnd("c")
    /// and compiles to a left fold of concatenations.
    fn interpolation(&mut self) {
        self.string();
        loop {
            self.expression();
            self.emit(OP_CAT);
            if !self.matches(TokenKind::StrFmt) {
                break;
            }
            self.string();
            self.emit(OP_CAT);
        }
        self.expect(TokenKind::StrFmtEnd, "Expected end of string interpolation");
        self.string();
        self.emit(OP_CAT);
    }

    fn grouping(&mut self) {
        self.expression();
        self.expect(TokenKind::RParen, "Expected ')'");
    }

    fn array(&mut self) {
        self.emit(OP_ARRAY);
        if !self.check(TokenKind::RBracket) {
            loop {
                if self.check(TokenKind::RBracket) {
                    break;
                }
                self.expression();
                self.emit(OP_ARRAY_ITEM);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBracket, "Expected ']'");
    }

    /// `{ key -> value, ... }`
    fn map(&mut self) {
        self.emit(OP_MAP);
        if !self.check(TokenKind::RBrace) {
            loop {
                if self.check(TokenKind::RBrace) {
                    break;
                }
                self.expression();
                self.expect(TokenKind::Arrow, "Expected '->'");
                self.expression();
                self.emit(OP_MAP_ITEM);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace, "Expected '}'");
    }

    /// `if (cond) a else b`
    fn ternary(&mut self) {
        self.expect(TokenKind::LParen, "Expected '('");
        self.expression();
        self.expect(TokenKind::RParen, "Expected ')'");
        let otherwise = self.emit_jump(OP_FALSE_JMP);
        self.emit(OP_POP);
        self.expression();
        let end = self.emit_jump(OP_JMP);
        self.patch_jump(otherwise);
        self.emit(OP_POP);
        self.expect(TokenKind::Else, "Expected 'else'");
        self.expression();
        self.patch_jump(end);
    }

    fn self_(&mut self) {
        if !self.within_struct {
            self.error("Cannot use 'self' outside of a struct");
            return;
        }
        self.named_variable("self", false);
    }

    // ── Operators ────────────────────────────────────────────────────

    fn unary(&mut self) {
        let op = self.previous.kind;
        self.parse_precedence(Prec::Unary);
        self.emit(if op == TokenKind::Minus { OP_NEG } else { OP_NOT });
    }

    fn binary(&mut self) {
        use TokenKind::*;
        let op = self.previous.kind;
        self.parse_precedence(infix_precedence(op).next());
        match op {
            Plus => self.emit(OP_ADD),
            Minus => self.emit(OP_SUB),
            Star => self.emit(OP_MUL),
            Slash => self.emit(OP_DIV),
            Percent => self.emit(OP_MOD),
            DotDot => self.emit(OP_CAT),
            EqualEqual => self.emit(OP_EQL),
            BangEqual => self.emit(OP_NEQL),
            Greater => self.emit(OP_GT),
            GreaterEqual => self.emit(OP_GTE),
            Less => self.emit(OP_LT),
            LessEqual => self.emit(OP_LTE),
            Is => self.emit(OP_IS),
            _ => unreachable!("no binary rule for {op:?}"),
        }
    }

    fn and(&mut self) {
        let end = self.emit_jump(OP_FALSE_JMP);
        self.emit(OP_POP);
        self.parse_precedence(Prec::And);
        self.patch_jump(end);
    }

    fn or(&mut self) {
        let otherwise = self.emit_jump(OP_FALSE_JMP);
        let end = self.emit_jump(OP_JMP);
        self.patch_jump(otherwise);
        self.emit(OP_POP);
        self.parse_precedence(Prec::Or);
        self.patch_jump(end);
    }

    // ── Calls and access ─────────────────────────────────────────────

    fn argument_list(&mut self) -> u8 {
        let mut argc: usize = 0;
        if !self.check(TokenKind::RParen) {
            loop {
                self.expression();
                if argc == 255 {
                    self.error("Too many arguments");
                }
                argc += 1;
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "Expected ')'");
        argc.min(255) as u8
    }

    fn call(&mut self) {
        let argc = self.argument_list();
        self.emit2(OP_CALL, argc);
    }

    /// `.name`, `.name(args)` (fused invoke), `.name = v`, `.name += v`, `.name++`
    fn dot(&mut self, can_assign: bool) {
        self.expect(TokenKind::Identifier, "Expected an identifier");
        let name = self.previous.lexeme;
        let name_const = self.identifier_constant(name);

        if self.matches(TokenKind::LParen) {
            let argc = self.argument_list();
            self.emit2(OP_INVOKE, name_const);
            self.emit(argc);
            return;
        }
        if can_assign && self.matches(TokenKind::Equal) {
            self.expression();
            self.emit2(OP_SET_PROP, name_const);
            return;
        }
        if can_assign {
            if let Some(op) = compound_op(self.current.kind) {
                let kind = self.current.kind;
                self.advance();
                self.emit2(OP_PUSH_PROP, name_const);
                self.compound_operand(kind);
                self.emit(op);
                self.emit2(OP_SET_PROP, name_const);
                return;
            }
        }
        self.emit2(OP_GET_PROP, name_const);
    }

    /// `Type:name` reads a static member.
    fn static_access(&mut self) {
        self.expect(TokenKind::Identifier, "Expected an identifier");
        let name_const = self.identifier_constant(self.previous.lexeme);
        self.emit2(OP_GET_STATIC, name_const);
    }

    fn subscript(&mut self, can_assign: bool) {
        self.expression();
        self.expect(TokenKind::RBracket, "Expected ']'");

        if can_assign && self.matches(TokenKind::Equal) {
            self.expression();
            self.emit(OP_SET_SUBSCRIPT);
            return;
        }
        if can_assign {
            if let Some(op) = compound_op(self.current.kind) {
                let kind = self.current.kind;
                self.advance();
                self.emit(OP_PUSH_SUBSCRIPT);
                self.compound_operand(kind);
                self.emit(op);
                self.emit(OP_SET_SUBSCRIPT);
                return;
            }
        }
        self.emit(OP_GET_SUBSCRIPT);
    }

    /// `Type { field = value, ... }`
    fn instance(&mut self) {
        self.emit(OP_INST);
        if !self.check(TokenKind::RBrace) {
            loop {
                if self.check(TokenKind::RBrace) {
                    break;
                }
                self.expect(TokenKind::Identifier, "Expected an identifier");
                let name_const = self.identifier_constant(self.previous.lexeme);
                self.expect(TokenKind::Equal, "Expected '='");
                self.expression();
                self.emit2(OP_INIT_PROP, name_const);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace, "Expected '}'");
    }

    /// Right-hand side of a compound assignment: the expression after `op=`,
    /// or an implicit one for `++`/`--`.
    fn compound_operand(&mut self, kind: TokenKind) {
        match kind {
            TokenKind::PlusPlus | TokenKind::MinusMinus => self.emit_constant(Value::number(1.0)),
            _ => self.expression(),
        }
    }

    // ── Variables ────────────────────────────────────────────────────

    fn variable(&mut self, can_assign: bool, stmt_start: bool) {
        let name = self.previous.lexeme;
        if stmt_start && can_assign && self.check(TokenKind::Comma) {
            self.destructuring_assignment(name);
        } else {
            self.named_variable(name, can_assign);
        }
    }

    fn resolve(&mut self, name: &str) -> (Access, bool) {
        let level = self.innermost();
        if let Some((slot, is_const)) = self.resolve_local(level, name) {
            return (Access::Local(slot), is_const);
        }
        if let Some((slot, is_const)) = self.resolve_upvalue(level, name) {
            return (Access::Upvalue(slot), is_const);
        }
        let is_const = self.vm.is_const_global(name);
        (Access::Global(self.identifier_constant(name)), is_const)
    }

    pub(super) fn named_variable(&mut self, name: &str, can_assign: bool) {
        let (access, is_const) = self.resolve(name);
        let (get, set, arg) = access.ops();

        if can_assign && self.matches(TokenKind::Equal) {
            if is_const {
                self.error("Cannot assign to a constant");
            }
            self.expression();
            self.emit2(set, arg);
            return;
        }
        if can_assign {
            if let Some(op) = compound_op(self.current.kind) {
                let kind = self.current.kind;
                self.advance();
                if is_const {
                    self.error("Cannot assign to a constant");
                }
                self.emit2(get, arg);
                self.compound_operand(kind);
                self.emit(op);
                self.emit2(set, arg);
                return;
            }
        }
        self.emit2(get, arg);
    }

    /// `a, b, c = array;` assigns elements by position and leaves the array.
    fn destructuring_assignment(&mut self, first: &'src str) {
        let mut names = vec![first];
        while self.matches(TokenKind::Comma) {
            self.expect(TokenKind::Identifier, "Expected an identifier");
            names.push(self.previous.lexeme);
        }
        if names.len() > 256 {
            self.error("Too many assignment targets");
        }
        self.expect(TokenKind::Equal, "Expected '='");
        self.expression();

        for (i, name) in names.into_iter().enumerate() {
            let (access, is_const) = self.resolve(name);
            if is_const {
                self.error("Cannot assign to a constant");
            }
            let (_, set, arg) = access.ops();
            self.emit2(OP_DESTRUCT_ARRAY, i as u8);
            self.emit2(set, arg);
            self.emit(OP_POP);
        }
    }

    // ── Functions ────────────────────────────────────────────────────

    /// Compiles a parameter list and body into a new function and emits the
    /// `OP_CLOSURE` that instantiates it. Lambdas may end an arrow body
    /// without a semicolon.
    pub(super) fn function(&mut self, kind: FnKind, is_lambda: bool) {
        let name = self.last_name.take();
        self.begin_function(kind, name);

        self.expect(TokenKind::LParen, "Expected '('");
        if !self.check(TokenKind::RParen) {
            loop {
                if self.fs().arity == 255 {
                    self.error_at_current("Too many parameters");
                }
                self.fs().arity += 1;
                self.parse_variable("Expected an identifier", false);
                self.mark_initialized();
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "Expected ')'");

        if self.matches(TokenKind::Arrow) {
            self.expression();
            self.emit(OP_RET);
            if !is_lambda {
                self.expect(TokenKind::Semicolon, "Expected ';'");
            }
        } else if self.matches(TokenKind::LBrace) {
            self.block();
        } else {
            self.error_at_current("Expected '{' or '->'");
        }

        let (function, upvalues) = self.end_function();
        let index = self.make_constant(Value::object(function));
        self.emit2(OP_CLOSURE, index);
        for uv in upvalues {
            self.emit2(u8::from(uv.is_local), uv.index);
        }
    }
}

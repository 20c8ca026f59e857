//! Tokenizer.
//!
//! Fixed tokens, numbers and identifiers come from a logos automaton. String
//! bodies are scanned by hand so escapes and `$"...{expr}..."` interpolation
//! can be tracked: inside an interpolated string `{` opens an expression and
//! the matching `}` resumes the string instead of closing a block.

use logos::Logos;

/// Byte range into the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const UNKNOWN: Span = Span { start: 0, end: 0 };

    pub fn merge(self, other: Span) -> Span {
        Span { start: self.start.min(other.start), end: self.end.max(other.end) }
    }
}

/// Interpolated strings may nest this deep.
pub const MAX_FMT_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    DotDot,
    Colon,
    Semicolon,
    Arrow,

    Plus,
    PlusPlus,
    PlusEqual,
    Minus,
    MinusMinus,
    MinusEqual,
    Star,
    StarEqual,
    Slash,
    SlashEqual,
    Percent,
    PercentEqual,
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    AndAnd,
    OrOr,

    Identifier,
    Number,
    /// Complete string literal.
    Str,
    /// String segment followed by an interpolated expression.
    StrFmt,
    /// Last segment of an interpolated string.
    StrFmtEnd,

    Break,
    Case,
    Const,
    Continue,
    Else,
    Enum,
    False,
    Fn,
    For,
    If,
    Is,
    Loop,
    Null,
    Return,
    SelfKw,
    Static,
    Struct,
    Switch,
    True,
    Var,
    While,

    Error,
    Eof,
}

/// Pre-materialized literal payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Literal {
    #[default]
    None,
    Number(f64),
    Str(String),
    /// Message carried by an error token.
    Error(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub lexeme: &'src str,
    pub span: Span,
    pub line: u32,
    pub value: Literal,
}

impl Token<'_> {
    pub fn synthetic(kind: TokenKind) -> Self {
        Token { kind, lexeme: "", span: Span::UNKNOWN, line: 0, value: Literal::None }
    }
}

fn newline(lex: &mut logos::Lexer<Raw>) -> logos::Skip {
    lex.extras += 1;
    logos::Skip
}

#[derive(Logos, Debug, PartialEq, Clone, Copy)]
#[logos(extras = u32)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip(r"//[^\n]*", allow_greedy = true))]
#[logos(skip "\u{feff}")]
enum Raw {
    #[regex(r"\n", newline)]
    Newline,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("..")]
    DotDot,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token("->")]
    Arrow,
    #[token("+")]
    Plus,
    #[token("++")]
    PlusPlus,
    #[token("+=")]
    PlusEqual,
    #[token("-")]
    Minus,
    #[token("--")]
    MinusMinus,
    #[token("-=")]
    MinusEqual,
    #[token("*")]
    Star,
    #[token("*=")]
    StarEqual,
    #[token("/")]
    Slash,
    #[token("/=")]
    SlashEqual,
    #[token("%")]
    Percent,
    #[token("%=")]
    PercentEqual,
    #[token("!")]
    Bang,
    #[token("!=")]
    BangEqual,
    #[token("=")]
    Equal,
    #[token("==")]
    EqualEqual,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEqual,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEqual,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,

    #[token("\"")]
    DoubleQuote,
    #[token("'")]
    SingleQuote,
    #[token("$\"")]
    FmtDoubleQuote,
    #[token("$'")]
    FmtSingleQuote,

    #[regex(r"[0-9]+(\.[0-9]+)?")]
    #[regex(r"\.[0-9]+")]
    Number,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Identifier,

    #[token("break")]
    Break,
    #[token("case")]
    Case,
    #[token("const")]
    Const,
    #[token("continue")]
    Continue,
    #[token("else")]
    Else,
    #[token("enum")]
    Enum,
    #[token("false")]
    False,
    #[token("fn")]
    Fn,
    #[token("for")]
    For,
    #[token("if")]
    If,
    #[token("is")]
    Is,
    #[token("loop")]
    Loop,
    #[token("null")]
    Null,
    #[token("return")]
    Return,
    #[token("self")]
    SelfKw,
    #[token("static")]
    Static,
    #[token("struct")]
    Struct,
    #[token("switch")]
    Switch,
    #[token("true")]
    True,
    #[token("var")]
    Var,
    #[token("while")]
    While,
}

/// An open interpolated string: its closing quote and the number of plain
/// `{` currently open inside the embedded expression.
#[derive(Clone)]
struct FmtLevel {
    quote: char,
    braces: u32,
}

/// Lazy tokenizer. Yields `Eof` forever once the input is exhausted.
#[derive(Clone)]
pub struct Lexer<'src> {
    inner: logos::Lexer<'src, Raw>,
    source: &'src str,
    fmt: Vec<FmtLevel>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        let mut inner = Raw::lexer(source);
        inner.extras = 1;
        Lexer { inner, source, fmt: Vec::new() }
    }

    pub fn line(&self) -> u32 {
        self.inner.extras
    }

    pub fn next_token(&mut self) -> Token<'src> {
        let Some(result) = self.inner.next() else {
            let end = self.source.len();
            return Token {
                kind: TokenKind::Eof,
                lexeme: "",
                span: Span { start: end, end },
                line: self.inner.extras,
                value: Literal::None,
            };
        };
        let raw = match result {
            Ok(raw) => raw,
            Err(()) => return self.error_token("Unexpected character"),
        };
        let kind = match raw {
            Raw::Newline => unreachable!("newlines are skipped"),
            Raw::DoubleQuote => return self.string('"', false, false),
            Raw::SingleQuote => return self.string('\'', false, false),
            Raw::FmtDoubleQuote => return self.string('"', true, false),
            Raw::FmtSingleQuote => return self.string('\'', true, false),
            Raw::Amp | Raw::Pipe => return self.error_token("Bitwise operators are not supported"),
            Raw::Number => {
                let n = self.inner.slice().parse::<f64>().unwrap_or(f64::NAN);
                let mut token = self.token(TokenKind::Number);
                token.value = Literal::Number(n);
                return token;
            }
            Raw::LBrace => {
                if let Some(level) = self.fmt.last_mut() {
                    level.braces += 1;
                }
                TokenKind::LBrace
            }
            Raw::RBrace => match self.fmt.last_mut() {
                Some(level) if level.braces > 0 => {
                    level.braces -= 1;
                    TokenKind::RBrace
                }
                Some(_) => {
                    let level = self.fmt.pop().map(|l| l.quote).unwrap_or('"');
                    return self.string(level, true, true);
                }
                None => TokenKind::RBrace,
            },
            Raw::LParen => TokenKind::LParen,
            Raw::RParen => TokenKind::RParen,
            Raw::LBracket => TokenKind::LBracket,
            Raw::RBracket => TokenKind::RBracket,
            Raw::Comma => TokenKind::Comma,
            Raw::Dot => TokenKind::Dot,
            Raw::DotDot => TokenKind::DotDot,
            Raw::Colon => TokenKind::Colon,
            Raw::Semicolon => TokenKind::Semicolon,
            Raw::Arrow => TokenKind::Arrow,
            Raw::Plus => TokenKind::Plus,
            Raw::PlusPlus => TokenKind::PlusPlus,
            Raw::PlusEqual => TokenKind::PlusEqual,
            Raw::Minus => TokenKind::Minus,
            Raw::MinusMinus => TokenKind::MinusMinus,
            Raw::MinusEqual => TokenKind::MinusEqual,
            Raw::Star => TokenKind::Star,
            Raw::StarEqual => TokenKind::StarEqual,
            Raw::Slash => TokenKind::Slash,
            Raw::SlashEqual => TokenKind::SlashEqual,
            Raw::Percent => TokenKind::Percent,
            Raw::PercentEqual => TokenKind::PercentEqual,
            Raw::Bang => TokenKind::Bang,
            Raw::BangEqual => TokenKind::BangEqual,
            Raw::Equal => TokenKind::Equal,
            Raw::EqualEqual => TokenKind::EqualEqual,
            Raw::Greater => TokenKind::Greater,
            Raw::GreaterEqual => TokenKind::GreaterEqual,
            Raw::Less => TokenKind::Less,
            Raw::LessEqual => TokenKind::LessEqual,
            Raw::AndAnd => TokenKind::AndAnd,
            Raw::OrOr => TokenKind::OrOr,
            Raw::Identifier => TokenKind::Identifier,
            Raw::Break => TokenKind::Break,
            Raw::Case => TokenKind::Case,
            Raw::Const => TokenKind::Const,
            Raw::Continue => TokenKind::Continue,
            Raw::Else => TokenKind::Else,
            Raw::Enum => TokenKind::Enum,
            Raw::False => TokenKind::False,
            Raw::Fn => TokenKind::Fn,
            Raw::For => TokenKind::For,
            Raw::If => TokenKind::If,
            Raw::Is => TokenKind::Is,
            Raw::Loop => TokenKind::Loop,
            Raw::Null => TokenKind::Null,
            Raw::Return => TokenKind::Return,
            Raw::SelfKw => TokenKind::SelfKw,
            Raw::Static => TokenKind::Static,
            Raw::Struct => TokenKind::Struct,
            Raw::Switch => TokenKind::Switch,
            Raw::True => TokenKind::True,
            Raw::Var => TokenKind::Var,
            Raw::While => TokenKind::While,
        };
        self.token(kind)
    }

    fn token(&self, kind: TokenKind) -> Token<'src> {
        let range = self.inner.span();
        Token {
            kind,
            lexeme: self.inner.slice(),
            span: Span { start: range.start, end: range.end },
            line: self.inner.extras,
            value: Literal::None,
        }
    }

    fn error_token(&self, message: &'static str) -> Token<'src> {
        let mut token = self.token(TokenKind::Error);
        token.value = Literal::Error(message);
        token
    }

    /// Scans a string body; the opening quote (or the `}` that resumes an
    /// interpolated string) has already been consumed.
    fn string(&mut self, quote: char, is_fmt: bool, resumed: bool) -> Token<'src> {
        let line = self.inner.extras;
        let start = self.inner.span().start;
        let rest = self.inner.remainder();
        let mut out = String::new();
        let mut error = None;
        let mut newlines = 0;
        let mut consumed = rest.len();
        let mut kind = TokenKind::Error;

        let mut chars = rest.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                c if c == quote => {
                    consumed = i + 1;
                    kind = if resumed { TokenKind::StrFmtEnd } else { TokenKind::Str };
                    break;
                }
                '\n' => {
                    consumed = i;
                    error.get_or_insert("Unterminated string");
                    break;
                }
                '{' if is_fmt => {
                    consumed = i + 1;
                    if self.fmt.len() >= MAX_FMT_DEPTH {
                        error.get_or_insert("Too many nested formatted strings");
                    } else {
                        self.fmt.push(FmtLevel { quote, braces: 0 });
                    }
                    kind = TokenKind::StrFmt;
                    break;
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, 'a')) => out.push('\u{7}'),
                    Some((_, '\'')) => out.push('\''),
                    Some((_, '"')) => out.push('"'),
                    Some((_, '\\')) => out.push('\\'),
                    Some((_, '{')) => out.push('{'),
                    Some((_, '\n')) => newlines += 1,
                    Some(_) => {
                        error.get_or_insert("Invalid escape code");
                    }
                    None => {}
                },
                c => out.push(c),
            }
        }
        if kind == TokenKind::Error {
            error.get_or_insert("Unterminated string");
        }

        self.inner.bump(consumed);
        self.inner.extras += newlines;
        let end = self.inner.span().end;
        let lexeme = &self.source[start..end];
        let span = Span { start, end };
        match error {
            Some(message) => Token { kind: TokenKind::Error, lexeme, span, line, value: Literal::Error(message) },
            None => Token { kind, lexeme, span, line, value: Literal::Str(out) },
        }
    }
}

/// Tokenizes a whole source string, including the trailing `Eof`.
pub fn tokenize(source: &str) -> Vec<Token<'_>> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return tokens;
        }
    }
}

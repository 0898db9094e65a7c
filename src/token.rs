use crate::span::Span;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    Eof,
    Nl,
    Indent,
    Dedent,

    Ident,
    Int,
    Float,
    Str,
    Bytes,
    Bool,

    KwType,
    KwConst,
    KwLet,
    KwNeed,
    KwFn,
    KwMixin,
    KwUse,
    KwResolve,
    KwPattern,
    KwPrefer,
    KwOver,
    KwInto,
    KwSector,
    KwOn,
    KwWhen,
    KwDo,
    KwMatch,
    KwIf,
    KwElse,
    KwFor,
    KwIn,
    KwReturn,
    KwEmit,
    KwAwait,
    KwCall,
    KwRpc,
    KwProceed,
    KwAround,
    KwOk,
    KwErr,
    KwSome,
    KwNone,
    KwRun,
    KwStop,
    KwYield,
    KwAnd,
    KwOr,
    KwNot,
    KwAs,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Comma,
    Dot,
    Colon,
    Arrow, // ->
    At,    // @

    Bar, // |

    Eq, // =
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,

    EqEq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,

    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,

    Pipe,  // |>
    Qmark, // ?
}

/// Keyword lookup; `true`/`false` lex as BOOL.
pub fn keyword(ident: &str) -> Option<TokenKind> {
    let kind = match ident {
        "type" => TokenKind::KwType,
        "const" => TokenKind::KwConst,
        "let" => TokenKind::KwLet,
        "need" => TokenKind::KwNeed,
        "fn" => TokenKind::KwFn,
        "mixin" => TokenKind::KwMixin,
        "use" => TokenKind::KwUse,
        "resolve" => TokenKind::KwResolve,
        "pattern" => TokenKind::KwPattern,
        "prefer" => TokenKind::KwPrefer,
        "over" => TokenKind::KwOver,
        "into" => TokenKind::KwInto,
        "sector" => TokenKind::KwSector,
        "on" => TokenKind::KwOn,
        "when" => TokenKind::KwWhen,
        "do" => TokenKind::KwDo,
        "match" => TokenKind::KwMatch,
        "if" => TokenKind::KwIf,
        "else" => TokenKind::KwElse,
        "for" => TokenKind::KwFor,
        "in" => TokenKind::KwIn,
        "return" => TokenKind::KwReturn,
        "emit" => TokenKind::KwEmit,
        "await" => TokenKind::KwAwait,
        "call" => TokenKind::KwCall,
        "rpc" => TokenKind::KwRpc,
        "proceed" => TokenKind::KwProceed,
        "around" => TokenKind::KwAround,
        "Ok" => TokenKind::KwOk,
        "Err" => TokenKind::KwErr,
        "Some" => TokenKind::KwSome,
        "None" => TokenKind::KwNone,
        "run" => TokenKind::KwRun,
        "stop" => TokenKind::KwStop,
        "yield" => TokenKind::KwYield,
        "and" => TokenKind::KwAnd,
        "or" => TokenKind::KwOr,
        "not" => TokenKind::KwNot,
        "as" => TokenKind::KwAs,
        "true" | "false" => TokenKind::Bool,
        _ => return None,
    };
    Some(kind)
}

/// Punctuator spelling, used by parser error messages.
pub fn punctuator(kind: TokenKind) -> Option<&'static str> {
    let s = match kind {
        TokenKind::LParen => "(",
        TokenKind::RParen => ")",
        TokenKind::LBrace => "{",
        TokenKind::RBrace => "}",
        TokenKind::LBracket => "[",
        TokenKind::RBracket => "]",
        TokenKind::Comma => ",",
        TokenKind::Dot => ".",
        TokenKind::Colon => ":",
        TokenKind::Arrow => "->",
        TokenKind::At => "@",
        TokenKind::Bar => "|",
        TokenKind::Eq => "=",
        TokenKind::Plus => "+",
        TokenKind::Minus => "-",
        TokenKind::Star => "*",
        TokenKind::StarStar => "**",
        TokenKind::Slash => "/",
        TokenKind::EqEq => "==",
        TokenKind::Neq => "!=",
        TokenKind::Lt => "<",
        TokenKind::Lte => "<=",
        TokenKind::Gt => ">",
        TokenKind::Gte => ">=",
        TokenKind::PlusEq => "+=",
        TokenKind::MinusEq => "-=",
        TokenKind::StarEq => "*=",
        TokenKind::SlashEq => "/=",
        TokenKind::Pipe => "|>",
        TokenKind::Qmark => "?",
        _ => return None,
    };
    Some(s)
}

/// Keyword spelling, for error messages.
pub fn keyword_text(kind: TokenKind) -> Option<&'static str> {
    let s = match kind {
        TokenKind::KwType => "type",
        TokenKind::KwConst => "const",
        TokenKind::KwLet => "let",
        TokenKind::KwNeed => "need",
        TokenKind::KwFn => "fn",
        TokenKind::KwMixin => "mixin",
        TokenKind::KwUse => "use",
        TokenKind::KwResolve => "resolve",
        TokenKind::KwPattern => "pattern",
        TokenKind::KwPrefer => "prefer",
        TokenKind::KwOver => "over",
        TokenKind::KwInto => "into",
        TokenKind::KwSector => "sector",
        TokenKind::KwOn => "on",
        TokenKind::KwWhen => "when",
        TokenKind::KwDo => "do",
        TokenKind::KwMatch => "match",
        TokenKind::KwIf => "if",
        TokenKind::KwElse => "else",
        TokenKind::KwFor => "for",
        TokenKind::KwIn => "in",
        TokenKind::KwReturn => "return",
        TokenKind::KwEmit => "emit",
        TokenKind::KwAwait => "await",
        TokenKind::KwCall => "call",
        TokenKind::KwRpc => "rpc",
        TokenKind::KwProceed => "proceed",
        TokenKind::KwAround => "around",
        TokenKind::KwOk => "Ok",
        TokenKind::KwErr => "Err",
        TokenKind::KwSome => "Some",
        TokenKind::KwNone => "None",
        TokenKind::KwRun => "run",
        TokenKind::KwStop => "stop",
        TokenKind::KwYield => "yield",
        TokenKind::KwAnd => "and",
        TokenKind::KwOr => "or",
        TokenKind::KwNot => "not",
        TokenKind::KwAs => "as",
        _ => return None,
    };
    Some(s)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Token {
            kind,
            text: text.into(),
            span,
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.text.is_empty() {
            write!(f, "Token({:?}, {}:{})", self.kind, self.span.line, self.span.col)
        } else {
            write!(
                f,
                "Token({:?}, {:?}, {}:{})",
                self.kind, self.text, self.span.line, self.span.col
            )
        }
    }
}

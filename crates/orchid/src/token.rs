//! Token stream definitions for the Orchid surface syntax.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Source position, 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

impl Pos {
    #[must_use]
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }

    /// Position of the very first character of a script.
    #[must_use]
    pub fn start() -> Self {
        Self { line: 1, col: 1 }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, col {}", self.line, self.col)
    }
}

/// Reserved words of the language.
///
/// `true`/`false` and `null` are resolved to literal tokens by the lexer and
/// never reach the parser as keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum Keyword {
    #[strum(serialize = "if")]
    If,
    #[strum(serialize = "elif")]
    Elif,
    #[strum(serialize = "else")]
    Else,
    #[strum(serialize = "for")]
    For,
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "while")]
    While,
    #[strum(serialize = "until")]
    Until,
    #[strum(serialize = "try")]
    Try,
    #[strum(serialize = "except")]
    Except,
    #[strum(serialize = "finally")]
    Finally,
    #[strum(serialize = "assert")]
    Assert,
    #[strum(serialize = "require")]
    Require,
    #[strum(serialize = "agent")]
    Agent,
    #[strum(serialize = "macro")]
    Macro,
    #[strum(serialize = "import")]
    Import,
    #[strum(serialize = "as")]
    As,
    #[strum(serialize = "Use")]
    Use,
    #[strum(serialize = "MCP")]
    Mcp,
    #[strum(serialize = "Plugin")]
    Plugin,
    #[strum(serialize = "Discover")]
    Discover,
    #[strum(serialize = "fork")]
    Fork,
    #[strum(serialize = "emit")]
    Emit,
    #[strum(serialize = "on")]
    On,
    #[strum(serialize = "listen")]
    Listen,
    #[strum(serialize = "Stream")]
    Stream,
    #[strum(serialize = "return")]
    Return,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
    #[strum(serialize = "not")]
    Not,
    #[strum(serialize = "permissions")]
    Permissions,
    #[strum(serialize = "break")]
    Break,
}

/// A single lexical token.
///
/// Block structure is carried by the synthetic `Indent`/`Dedent`/`Newline`
/// tokens; bracketed regions suppress `Newline` entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Token {
    Indent,
    Dedent,
    Newline,
    /// `###` alone on a line, delimiting an atomic block.
    TripleHash,
    /// `## ...` section comment, retained for trace output.
    SectionComment(String),
    /// Quoted string. Escapes are already processed except `\$`, which is
    /// kept verbatim so interpolation can distinguish a literal dollar.
    Str(String),
    /// Numeric literal with an optional duration suffix (`s`/`m`/`h`).
    Number { value: f64, suffix: Option<char> },
    Bool(bool),
    Null,
    Ident(String),
    Keyword(Keyword),

    /// `:=`
    Walrus,
    /// `+=`
    PlusAssign,
    /// `>>`
    PipeOp,
    /// `|`
    Alt,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `<=`
    LtEq,
    /// `>=`
    GtEq,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `=` (keyword arguments and tag values)
    Eq,
    Plus,
    Minus,
    Star,
    Slash,
    Colon,
    Dot,
    Comma,
    Dollar,
    At,
    /// Bare `_`, the implicit context.
    Underscore,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Eof,
}

impl Token {
    /// Short human-readable name used in parse error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Indent => "indent".to_owned(),
            Self::Dedent => "dedent".to_owned(),
            Self::Newline => "newline".to_owned(),
            Self::TripleHash => "'###'".to_owned(),
            Self::SectionComment(_) => "section comment".to_owned(),
            Self::Str(_) => "string literal".to_owned(),
            Self::Number { .. } => "number literal".to_owned(),
            Self::Bool(b) => format!("'{b}'"),
            Self::Null => "'null'".to_owned(),
            Self::Ident(name) => format!("identifier '{name}'"),
            Self::Keyword(kw) => format!("keyword '{kw}'"),
            Self::Walrus => "':='".to_owned(),
            Self::PlusAssign => "'+='".to_owned(),
            Self::PipeOp => "'>>'".to_owned(),
            Self::Alt => "'|'".to_owned(),
            Self::EqEq => "'=='".to_owned(),
            Self::NotEq => "'!='".to_owned(),
            Self::LtEq => "'<='".to_owned(),
            Self::GtEq => "'>='".to_owned(),
            Self::Lt => "'<'".to_owned(),
            Self::Gt => "'>'".to_owned(),
            Self::Eq => "'='".to_owned(),
            Self::Plus => "'+'".to_owned(),
            Self::Minus => "'-'".to_owned(),
            Self::Star => "'*'".to_owned(),
            Self::Slash => "'/'".to_owned(),
            Self::Colon => "':'".to_owned(),
            Self::Dot => "'.'".to_owned(),
            Self::Comma => "','".to_owned(),
            Self::Dollar => "'$'".to_owned(),
            Self::At => "'@'".to_owned(),
            Self::Underscore => "'_'".to_owned(),
            Self::LParen => "'('".to_owned(),
            Self::RParen => "')'".to_owned(),
            Self::LBracket => "'['".to_owned(),
            Self::RBracket => "']'".to_owned(),
            Self::LBrace => "'{'".to_owned(),
            Self::RBrace => "'}'".to_owned(),
            Self::Eof => "end of input".to_owned(),
        }
    }
}

/// A token with the position of its first character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenLoc {
    pub token: Token,
    pub pos: Pos,
}

impl TokenLoc {
    #[must_use]
    pub fn new(token: Token, pos: Pos) -> Self {
        Self { token, pos }
    }
}

//! Indentation-sensitive tokenizer.
//!
//! Converts source text into a flat token stream with synthetic
//! `Indent`/`Dedent`/`Newline` tokens. Indentation is measured with tabs
//! counting as 4 columns, against a stack seeded with column 0. Newlines are
//! suppressed inside parenthesised/bracketed/braced regions and are never
//! emitted twice in a row.
//!
//! Comment tiers: `#` runs to end of line and is dropped, `##` produces a
//! [`Token::SectionComment`] retained for trace output, and `###` alone on a
//! line is the atomic-block delimiter [`Token::TripleHash`].

use std::str::FromStr;

use crate::{
    error::{ErrorKind, OrchidError, RunResult},
    token::{Keyword, Pos, Token, TokenLoc},
};

/// Width of a tab stop when measuring indentation.
const TAB_WIDTH: u32 = 4;

/// Tokenizes `source`, returning the full token stream ending in [`Token::Eof`].
pub fn lex(source: &str) -> RunResult<Vec<TokenLoc>> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    idx: usize,
    line: u32,
    col: u32,
    /// Open paren/bracket/brace depth; newlines are suppressed while > 0.
    depth: u32,
    indent_stack: Vec<u32>,
    at_line_start: bool,
    tokens: Vec<TokenLoc>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            idx: 0,
            line: 1,
            col: 1,
            depth: 0,
            indent_stack: vec![0],
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    fn pos(&self) -> Pos {
        Pos::new(self.line, self.col)
    }

    fn error(&self, message: impl Into<String>) -> OrchidError {
        OrchidError::new(ErrorKind::LexError, message).at(self.pos())
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.idx + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.idx += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn push(&mut self, token: Token, pos: Pos) {
        self.tokens.push(TokenLoc::new(token, pos));
    }

    fn last_token(&self) -> Option<&Token> {
        self.tokens.last().map(|t| &t.token)
    }

    fn emit_newline(&mut self, pos: Pos) {
        if self.depth > 0 {
            return;
        }
        match self.last_token() {
            None | Some(Token::Newline | Token::Indent | Token::Dedent) => {}
            _ => self.push(Token::Newline, pos),
        }
    }

    fn run(mut self) -> RunResult<Vec<TokenLoc>> {
        while self.idx < self.chars.len() {
            if self.at_line_start && self.depth == 0 {
                self.handle_line_start()?;
                continue;
            }
            self.at_line_start = false;
            let pos = self.pos();
            let Some(ch) = self.peek() else { break };
            match ch {
                '\n' => {
                    self.bump();
                    self.emit_newline(pos);
                    self.at_line_start = true;
                }
                '\r' | ' ' | '\t' => {
                    self.bump();
                }
                '#' => self.lex_hash(pos)?,
                '"' | '\'' => self.lex_string(pos)?,
                c if c.is_ascii_digit() => self.lex_number(pos)?,
                c if c.is_ascii_alphabetic() || c == '_' => self.lex_word(pos),
                _ => self.lex_operator(pos)?,
            }
        }
        let pos = self.pos();
        self.emit_newline(pos);
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.push(Token::Dedent, pos);
        }
        self.push(Token::Eof, pos);
        Ok(self.tokens)
    }

    /// Measures indentation at the start of a logical line and emits
    /// `Indent`/`Dedent` tokens against the indent stack. Blank and
    /// comment-only lines do not participate.
    fn handle_line_start(&mut self) -> RunResult<()> {
        let mut width = 0u32;
        while let Some(ch) = self.peek() {
            match ch {
                ' ' => width += 1,
                '\t' => width += TAB_WIDTH - (width % TAB_WIDTH),
                _ => break,
            }
            self.bump();
        }
        match self.peek() {
            // Blank line: no tokens, no indent change.
            None => return Ok(()),
            Some('\n') => {
                self.bump();
                return Ok(());
            }
            Some('\r') => {
                self.bump();
                return Ok(());
            }
            Some('#') => {
                let triple =
                    self.peek_at(1) == Some('#') && self.peek_at(2) == Some('#') && self.rest_of_line_blank(3);
                if !triple {
                    // Comment-only lines are invisible to indentation.
                    let pos = self.pos();
                    if self.peek_at(1) == Some('#') {
                        self.bump();
                        self.bump();
                        let text = self.take_line();
                        self.push(Token::SectionComment(text.trim().to_owned()), pos);
                    } else {
                        self.take_line();
                    }
                    if self.peek() == Some('\n') {
                        self.bump();
                    }
                    return Ok(());
                }
            }
            Some(_) => {}
        }

        let current = *self.indent_stack.last().unwrap_or(&0);
        if width > current {
            self.indent_stack.push(width);
            let pos = self.pos();
            self.push(Token::Indent, pos);
        } else if width < current {
            while self
                .indent_stack
                .last()
                .is_some_and(|&top| top > width)
            {
                self.indent_stack.pop();
                let pos = self.pos();
                self.push(Token::Dedent, pos);
            }
            if *self.indent_stack.last().unwrap_or(&0) != width {
                return Err(self.error("inconsistent indentation: dedent does not match any outer level"));
            }
        }
        self.at_line_start = false;
        Ok(())
    }

    /// True when everything from `offset` chars ahead to the end of the line
    /// is whitespace.
    fn rest_of_line_blank(&self, offset: usize) -> bool {
        let mut i = self.idx + offset;
        while let Some(&ch) = self.chars.get(i) {
            match ch {
                '\n' => return true,
                ' ' | '\t' | '\r' => i += 1,
                _ => return false,
            }
        }
        true
    }

    /// Consumes to end of line (exclusive of the newline), returning the text.
    fn take_line(&mut self) -> String {
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            text.push(ch);
            self.bump();
        }
        text
    }

    fn lex_hash(&mut self, pos: Pos) -> RunResult<()> {
        if self.peek_at(1) == Some('#') && self.peek_at(2) == Some('#') && self.rest_of_line_blank(3) {
            self.bump();
            self.bump();
            self.bump();
            self.take_line();
            self.push(Token::TripleHash, pos);
            if self.peek() == Some('\n') {
                self.bump();
                self.emit_newline(pos);
                self.at_line_start = true;
            }
            return Ok(());
        }
        if self.peek_at(1) == Some('#') {
            self.bump();
            self.bump();
            let text = self.take_line();
            self.push(Token::SectionComment(text.trim().to_owned()), pos);
            return Ok(());
        }
        self.take_line();
        Ok(())
    }

    fn lex_string(&mut self, pos: Pos) -> RunResult<()> {
        let quote = self.bump().expect("caller checked quote");
        // `"""..."""` spans lines.
        let docstring = quote == '"' && self.peek() == Some('"') && self.peek_at(1) == Some('"');
        if docstring {
            self.bump();
            self.bump();
        }
        let mut text = String::new();
        loop {
            let Some(ch) = self.peek() else {
                return Err(self.error("unterminated string literal"));
            };
            if ch == '\\' {
                self.bump();
                let Some(esc) = self.bump() else {
                    return Err(self.error("unterminated escape sequence"));
                };
                match esc {
                    'n' => text.push('\n'),
                    't' => text.push('\t'),
                    '\\' => text.push('\\'),
                    '"' => text.push('"'),
                    '\'' => text.push('\''),
                    // Kept verbatim so interpolation can tell a literal `$`.
                    '$' => text.push_str("\\$"),
                    other => {
                        text.push('\\');
                        text.push(other);
                    }
                }
                continue;
            }
            if docstring {
                if ch == '"' && self.peek_at(1) == Some('"') && self.peek_at(2) == Some('"') {
                    self.bump();
                    self.bump();
                    self.bump();
                    break;
                }
                self.bump();
                text.push(ch);
                continue;
            }
            if ch == '\n' {
                return Err(self.error("newline inside string literal"));
            }
            if ch == quote {
                self.bump();
                break;
            }
            self.bump();
            text.push(ch);
        }
        self.push(Token::Str(text), pos);
        Ok(())
    }

    fn lex_number(&mut self, pos: Pos) -> RunResult<()> {
        let start = self.idx;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        let text: String = self.chars[start..self.idx].iter().collect();
        let value = f64::from_str(&text).map_err(|_| self.error(format!("invalid number literal '{text}'")))?;
        // A trailing `s`/`m`/`h` is a duration suffix, but only when it is not
        // the start of a longer identifier (`5s` yes, `5seconds` no).
        let suffix = match self.peek() {
            Some(c @ ('s' | 'm' | 'h'))
                if !self
                    .peek_at(1)
                    .is_some_and(|n| n.is_ascii_alphanumeric() || n == '_') =>
            {
                self.bump();
                Some(c)
            }
            _ => None,
        };
        self.push(Token::Number { value, suffix }, pos);
        Ok(())
    }

    fn lex_word(&mut self, pos: Pos) {
        let start = self.idx;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.bump();
        }
        let word: String = self.chars[start..self.idx].iter().collect();
        let token = match word.as_str() {
            "_" => Token::Underscore,
            "true" => Token::Bool(true),
            "false" => Token::Bool(false),
            "null" => Token::Null,
            _ => Keyword::from_str(&word).map_or(Token::Ident(word), Token::Keyword),
        };
        self.push(token, pos);
    }

    fn lex_operator(&mut self, pos: Pos) -> RunResult<()> {
        let ch = self.bump().expect("caller checked char");
        let token = match ch {
            ':' if self.peek() == Some('=') => {
                self.bump();
                Token::Walrus
            }
            ':' => Token::Colon,
            '+' if self.peek() == Some('=') => {
                self.bump();
                Token::PlusAssign
            }
            '+' => Token::Plus,
            '>' if self.peek() == Some('>') => {
                self.bump();
                Token::PipeOp
            }
            '>' if self.peek() == Some('=') => {
                self.bump();
                Token::GtEq
            }
            '>' => Token::Gt,
            '<' if self.peek() == Some('=') => {
                self.bump();
                Token::LtEq
            }
            '<' => Token::Lt,
            '=' if self.peek() == Some('=') => {
                self.bump();
                Token::EqEq
            }
            '=' => Token::Eq,
            '!' if self.peek() == Some('=') => {
                self.bump();
                Token::NotEq
            }
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '.' => Token::Dot,
            ',' => Token::Comma,
            '$' => Token::Dollar,
            '@' => Token::At,
            '(' => {
                self.depth += 1;
                Token::LParen
            }
            ')' => {
                self.depth = self.depth.saturating_sub(1);
                Token::RParen
            }
            '[' => {
                self.depth += 1;
                Token::LBracket
            }
            ']' => {
                self.depth = self.depth.saturating_sub(1);
                Token::RBracket
            }
            '{' => {
                self.depth += 1;
                Token::LBrace
            }
            '}' => {
                self.depth = self.depth.saturating_sub(1);
                Token::RBrace
            }
            other => return Err(self.error(format!("unexpected character '{other}'"))),
        };
        self.push(token, pos);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        lex(source).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn indent_dedent_pairs() {
        let toks = kinds("if x:\n    y := 1\nz := 2\n");
        let indents = toks.iter().filter(|t| **t == Token::Indent).count();
        let dedents = toks.iter().filter(|t| **t == Token::Dedent).count();
        assert_eq!(indents, 1);
        assert_eq!(dedents, 1);
    }

    #[test]
    fn tabs_count_as_four_columns() {
        // A tab and four spaces land on the same indent level.
        let toks = kinds("if x:\n\ty := 1\n    z := 2\n");
        let indents = toks.iter().filter(|t| **t == Token::Indent).count();
        assert_eq!(indents, 1);
    }

    #[test]
    fn newline_suppressed_in_brackets() {
        let toks = kinds("x := [1,\n2,\n3]\n");
        let newlines = toks.iter().filter(|t| **t == Token::Newline).count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn duration_suffix() {
        let toks = kinds("t := 5s\n");
        assert!(toks.contains(&Token::Number {
            value: 5.0,
            suffix: Some('s')
        }));
    }

    #[test]
    fn suffix_not_taken_from_identifier() {
        let toks = kinds("x := 5seconds\n");
        assert!(toks.contains(&Token::Number {
            value: 5.0,
            suffix: None
        }));
        assert!(toks.contains(&Token::Ident("seconds".to_owned())));
    }

    #[test]
    fn triple_hash_delimits() {
        let toks = kinds("###\nx := 1\n###\n");
        let hashes = toks.iter().filter(|t| **t == Token::TripleHash).count();
        assert_eq!(hashes, 2);
    }

    #[test]
    fn section_comment_retained_plain_comment_dropped() {
        let toks = kinds("## section\n# plain\nx := 1\n");
        assert!(toks.contains(&Token::SectionComment("section".to_owned())));
        assert!(!toks.iter().any(|t| matches!(t, Token::Ident(s) if s == "plain")));
    }

    #[test]
    fn string_escapes() {
        let toks = kinds("s := \"a\\nb\\$c\"\n");
        assert!(toks.contains(&Token::Str("a\nb\\$c".to_owned())));
    }

    #[test]
    fn newline_in_string_is_error() {
        let err = lex("s := \"abc\ndef\"\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::LexError);
    }

    #[test]
    fn docstring_spans_lines() {
        let toks = kinds("d := \"\"\"one\ntwo\"\"\"\n");
        assert!(toks.contains(&Token::Str("one\ntwo".to_owned())));
    }

    #[test]
    fn dedent_mismatch_is_error() {
        let err = lex("if x:\n        a := 1\n   b := 2\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::LexError);
    }

    #[test]
    fn keywords_and_literals() {
        let toks = kinds("if true and null:\n    pass_through := false\n");
        assert!(toks.contains(&Token::Keyword(Keyword::If)));
        assert!(toks.contains(&Token::Bool(true)));
        assert!(toks.contains(&Token::Null));
        assert!(toks.contains(&Token::Bool(false)));
    }

    #[test]
    fn underscore_is_implicit_context() {
        let toks = kinds("x := _\n");
        assert!(toks.contains(&Token::Underscore));
        let toks = kinds("x := _count\n");
        assert!(toks.contains(&Token::Ident("_count".to_owned())));
    }

    #[test]
    fn eof_flushes_dedents() {
        let toks = kinds("if x:\n    if y:\n        z := 1");
        let dedents = toks.iter().filter(|t| **t == Token::Dedent).count();
        assert_eq!(dedents, 2);
        assert_eq!(toks.last(), Some(&Token::Eof));
    }
}

//! Recursive-descent parser.
//!
//! Consumes the token stream from [`crate::lexer`] and produces a
//! [`Program`]. Precedence, lowest to highest: pipe `>>`, alternative `|`,
//! `or`, `and`, `not`, comparison, `in`, merge `+`, multiplicative
//! (`- * /`), unary `-`, postfix (member/call/index), primary.
//!
//! Behavior tags share `<` with comparison, so tag parsing is speculative:
//! the cursor is saved, a tag list is attempted, and on any mismatch the
//! cursor is restored and `<` parses as a comparison.

use smallvec::SmallVec;

use crate::{
    ast::{
        Arg, ArithOp, AssignTarget, CmpOp, Definition, ExceptArm, ForkBody, ForkBranch, InterpPart, LogicalOp,
        MetaEntry, Metadata, Node, Param, Program, RequireKind, Spanned, Tag, Tags,
    },
    error::{ErrorKind, OrchidError, RunResult},
    lexer::lex,
    token::{Keyword, Pos, Token, TokenLoc},
    value::Unit,
};

/// Maximum expression nesting depth, preventing stack overflow on
/// pathological input like `((((((...))))))`.
const MAX_NESTING_DEPTH: u16 = 200;

/// Lexes and parses `source` into a [`Program`].
pub fn parse(source: &str) -> RunResult<Program> {
    parse_tokens(lex(source)?)
}

/// Parses an already-lexed token stream.
pub fn parse_tokens(tokens: Vec<TokenLoc>) -> RunResult<Program> {
    Parser::new(tokens).program()
}

struct Parser {
    tokens: Vec<TokenLoc>,
    idx: usize,
    depth: u16,
}

impl Parser {
    fn new(tokens: Vec<TokenLoc>) -> Self {
        // Section comments are trivia to the grammar; they are retained in
        // the lexer output for `--lex` and trace, not for parsing.
        let tokens = tokens
            .into_iter()
            .filter(|t| !matches!(t.token, Token::SectionComment(_)))
            .collect();
        Self {
            tokens,
            idx: 0,
            depth: 0,
        }
    }

    // --- cursor helpers ---

    fn peek(&self) -> &Token {
        self.tokens.get(self.idx).map_or(&Token::Eof, |t| &t.token)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.idx + offset).map_or(&Token::Eof, |t| &t.token)
    }

    fn pos(&self) -> Pos {
        self.tokens
            .get(self.idx)
            .or_else(|| self.tokens.last())
            .map_or_else(Pos::start, |t| t.pos)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.idx < self.tokens.len() {
            self.idx += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, context: &str) -> RunResult<Pos> {
        let pos = self.pos();
        if self.peek() == token {
            self.advance();
            Ok(pos)
        } else {
            Err(self.error(format!(
                "expected {} {}, found {}",
                token.describe(),
                context,
                self.peek().describe()
            )))
        }
    }

    fn expect_ident(&mut self, context: &str) -> RunResult<String> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected identifier {context}, found {}", other.describe()))),
        }
    }

    fn expect_string(&mut self, context: &str) -> RunResult<String> {
        match self.peek().clone() {
            Token::Str(text) => {
                self.advance();
                Ok(text)
            }
            other => Err(self.error(format!("expected string {context}, found {}", other.describe()))),
        }
    }

    fn error(&self, message: impl Into<String>) -> OrchidError {
        OrchidError::new(ErrorKind::ParseError, message).at(self.pos())
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Token::Newline) {
            self.advance();
        }
    }

    // --- program / metadata ---

    fn program(&mut self) -> RunResult<Program> {
        let mut metadata = Vec::new();
        self.skip_newlines();
        while matches!(self.peek(), Token::At) {
            metadata.push(self.metadata_line()?);
            self.skip_newlines();
        }
        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            if matches!(self.peek(), Token::Eof) {
                break;
            }
            body.push(self.statement()?);
        }
        Ok(Program { metadata, body })
    }

    fn metadata_line(&mut self) -> RunResult<Metadata> {
        let pos = self.pos();
        self.expect(&Token::At, "to start a directive")?;
        let name = self.expect_ident("after '@'")?;
        let mut entries = Vec::new();
        loop {
            match self.peek().clone() {
                Token::Newline | Token::Eof => break,
                Token::Comma => {
                    self.advance();
                }
                Token::Keyword(kw @ (Keyword::Mcp | Keyword::Plugin)) => {
                    self.advance();
                    self.expect(&Token::LParen, "after requirement kind")?;
                    let target = self.expect_string("naming the requirement")?;
                    self.expect(&Token::RParen, "to close the requirement")?;
                    let kind = if kw == Keyword::Mcp {
                        RequireKind::Mcp
                    } else {
                        RequireKind::Plugin
                    };
                    entries.push(MetaEntry::Requires { kind, name: target });
                }
                Token::Str(text) => {
                    self.advance();
                    entries.push(MetaEntry::Text(text));
                }
                Token::Ident(word) => {
                    self.advance();
                    entries.push(MetaEntry::Word(word));
                }
                Token::Number { value, .. } => {
                    self.advance();
                    entries.push(MetaEntry::Number(value));
                }
                other => {
                    return Err(self.error(format!("unexpected {} in '@{name}' directive", other.describe())));
                }
            }
        }
        Ok(Metadata { name, entries, pos })
    }

    // --- statements ---

    fn statement(&mut self) -> RunResult<Spanned> {
        let pos = self.pos();
        let stmt = match self.peek().clone() {
            Token::Keyword(Keyword::If) => self.if_statement(pos)?,
            Token::Keyword(Keyword::For) => self.for_statement(pos)?,
            Token::Keyword(Keyword::While) => self.while_statement(pos)?,
            Token::Keyword(Keyword::Until) => self.until_statement(pos)?,
            Token::Keyword(Keyword::Try) => self.try_statement(pos)?,
            Token::Keyword(Keyword::Assert) => self.assert_statement(pos, false)?,
            Token::Keyword(Keyword::Require) => self.assert_statement(pos, true)?,
            Token::Keyword(Keyword::Agent) => self.definition(pos, true)?,
            Token::Keyword(Keyword::Macro) => self.definition(pos, false)?,
            Token::Keyword(Keyword::Import) => self.import_statement(pos)?,
            Token::Keyword(Keyword::Use) => self.use_statement(pos)?,
            Token::Keyword(Keyword::Permissions) => self.permissions_block(pos)?,
            Token::Keyword(Keyword::Emit) => self.emit_statement(pos)?,
            Token::Keyword(Keyword::On) => self.on_statement(pos)?,
            Token::Keyword(Keyword::Return) => self.return_statement(pos)?,
            Token::Keyword(Keyword::Break) => {
                self.advance();
                let stmt = Spanned::new(pos, Node::Break);
                self.end_statement()?;
                stmt
            }
            Token::TripleHash => self.atomic_block(pos)?,
            Token::LBracket => {
                if let Some(stmt) = self.try_destructure(pos)? {
                    stmt
                } else {
                    let stmt = self.expression_statement(pos)?;
                    self.end_statement()?;
                    stmt
                }
            }
            Token::Ident(name) if matches!(self.peek_at(1), Token::Walrus) => {
                self.advance();
                self.advance();
                let value = self.expression()?;
                let stmt = Spanned::new(
                    pos,
                    Node::Assignment {
                        target: AssignTarget::Name(name),
                        value: Box::new(value),
                    },
                );
                self.end_statement()?;
                stmt
            }
            Token::Ident(name) if matches!(self.peek_at(1), Token::PlusAssign) => {
                self.advance();
                self.advance();
                let value = self.expression()?;
                let stmt = Spanned::new(
                    pos,
                    Node::PlusAssignment {
                        name,
                        value: Box::new(value),
                    },
                );
                self.end_statement()?;
                stmt
            }
            _ => {
                let stmt = self.expression_statement(pos)?;
                self.end_statement()?;
                stmt
            }
        };
        Ok(stmt)
    }

    fn expression_statement(&mut self, pos: Pos) -> RunResult<Spanned> {
        let expr = self.expression()?;
        Ok(Spanned::new(pos, expr.node))
    }

    /// Statement terminator: a newline, or a block/file boundary that the
    /// caller will consume. A statement whose last construct was a block
    /// (a fork right-hand side, say) already consumed its dedent and needs
    /// no trailing newline.
    fn end_statement(&mut self) -> RunResult<()> {
        match self.peek() {
            Token::Newline => {
                self.advance();
                Ok(())
            }
            Token::Dedent | Token::Eof | Token::TripleHash => Ok(()),
            other => {
                if self.idx > 0 && matches!(self.tokens[self.idx - 1].token, Token::Dedent) {
                    return Ok(());
                }
                Err(self.error(format!("expected end of statement, found {}", other.describe())))
            }
        }
    }

    /// `: NEWLINE INDENT statements DEDENT`
    fn block(&mut self, context: &str) -> RunResult<Vec<Spanned>> {
        self.expect(&Token::Colon, context)?;
        self.expect(&Token::Newline, "after ':'")?;
        self.expect(&Token::Indent, "to open the block")?;
        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            if matches!(self.peek(), Token::Dedent | Token::Eof) {
                break;
            }
            body.push(self.statement()?);
        }
        self.eat(&Token::Dedent);
        if body.is_empty() {
            return Err(self.error(format!("empty block {context}")));
        }
        Ok(body)
    }

    fn if_statement(&mut self, pos: Pos) -> RunResult<Spanned> {
        self.advance();
        let cond = self.expression()?;
        let then_body = self.block("after 'if' condition")?;
        let mut elifs = Vec::new();
        let mut else_body = None;
        loop {
            match self.peek() {
                Token::Keyword(Keyword::Elif) => {
                    self.advance();
                    let econd = self.expression()?;
                    let ebody = self.block("after 'elif' condition")?;
                    elifs.push((econd, ebody));
                }
                Token::Keyword(Keyword::Else) => {
                    self.advance();
                    else_body = Some(self.block("after 'else'")?);
                    break;
                }
                _ => break,
            }
        }
        Ok(Spanned::new(
            pos,
            Node::If {
                cond: Box::new(cond),
                then_body,
                elifs,
                else_body,
            },
        ))
    }

    fn for_statement(&mut self, pos: Pos) -> RunResult<Spanned> {
        self.advance();
        let var = self.expect_ident("after 'for'")?;
        self.expect(&Token::Keyword(Keyword::In), "after the loop variable")?;
        let iter = self.expression()?;
        let body = self.block("after 'for' header")?;
        Ok(Spanned::new(
            pos,
            Node::For {
                var,
                iter: Box::new(iter),
                body,
            },
        ))
    }

    fn while_statement(&mut self, pos: Pos) -> RunResult<Spanned> {
        self.advance();
        let cond = self.expression()?;
        let body = self.block("after 'while' condition")?;
        Ok(Spanned::new(
            pos,
            Node::While {
                cond: Box::new(cond),
                body,
            },
        ))
    }

    fn until_statement(&mut self, pos: Pos) -> RunResult<Spanned> {
        self.advance();
        let cond = self.expression()?;
        let tags = self.try_parse_tags().unwrap_or_default();
        let body = self.block("after 'until' condition")?;
        Ok(Spanned::new(
            pos,
            Node::Until {
                cond: Box::new(cond),
                body,
                tags,
            },
        ))
    }

    fn try_statement(&mut self, pos: Pos) -> RunResult<Spanned> {
        self.advance();
        let body = self.block("after 'try'")?;
        let mut excepts = Vec::new();
        while matches!(self.peek(), Token::Keyword(Keyword::Except)) {
            self.advance();
            let kind = match self.peek().clone() {
                Token::Ident(name) => {
                    self.advance();
                    Some(name)
                }
                _ => None,
            };
            let bind = if self.eat(&Token::Keyword(Keyword::As)) {
                Some(self.expect_ident("after 'as'")?)
            } else {
                None
            };
            let arm_body = self.block("after 'except'")?;
            excepts.push(ExceptArm {
                kind,
                bind,
                body: arm_body,
            });
        }
        let finally = if matches!(self.peek(), Token::Keyword(Keyword::Finally)) {
            self.advance();
            Some(self.block("after 'finally'")?)
        } else {
            None
        };
        if excepts.is_empty() && finally.is_none() {
            return Err(self.error("'try' requires at least one 'except' or a 'finally'"));
        }
        Ok(Spanned::new(
            pos,
            Node::Try {
                body,
                excepts,
                finally,
            },
        ))
    }

    fn assert_statement(&mut self, pos: Pos, is_require: bool) -> RunResult<Spanned> {
        self.advance();
        let cond = self.expression()?;
        let message = if self.eat(&Token::Comma) {
            Some(Box::new(self.expression()?))
        } else {
            None
        };
        let node = if is_require {
            Node::Require {
                cond: Box::new(cond),
                message,
            }
        } else {
            Node::Assert {
                cond: Box::new(cond),
                message,
            }
        };
        let stmt = Spanned::new(pos, node);
        self.end_statement()?;
        Ok(stmt)
    }

    fn definition(&mut self, pos: Pos, is_agent: bool) -> RunResult<Spanned> {
        self.advance();
        let name = self.expect_ident(if is_agent { "after 'agent'" } else { "after 'macro'" })?;
        self.expect(&Token::LParen, "to open the parameter list")?;
        let mut params = Vec::new();
        while !matches!(self.peek(), Token::RParen) {
            let pname = self.expect_ident("in parameter list")?;
            let default = if self.eat(&Token::Eq) {
                Some(self.expression()?)
            } else {
                None
            };
            params.push(Param { name: pname, default });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen, "to close the parameter list")?;
        let body = self.block("after the definition header")?;
        Ok(Spanned::new(
            pos,
            Node::Definition(Definition {
                name,
                params,
                body,
                is_agent,
            }),
        ))
    }

    fn import_statement(&mut self, pos: Pos) -> RunResult<Spanned> {
        self.advance();
        let mut path = self.expect_ident("after 'import'")?;
        while self.eat(&Token::Dot) {
            path.push('.');
            path.push_str(&self.expect_ident("in import path")?);
        }
        let alias = if self.eat(&Token::Keyword(Keyword::As)) {
            Some(self.expect_ident("after 'as'")?)
        } else {
            None
        };
        let stmt = Spanned::new(pos, Node::Import { path, alias });
        self.end_statement()?;
        Ok(stmt)
    }

    fn use_statement(&mut self, pos: Pos) -> RunResult<Spanned> {
        self.advance();
        let node = match self.peek().clone() {
            Token::Keyword(Keyword::Mcp) => {
                self.advance();
                self.expect(&Token::LParen, "after 'MCP'")?;
                let name = self.expect_string("naming the MCP server")?;
                self.expect(&Token::RParen, "to close 'MCP(...)'")?;
                Node::UseMcp {
                    name: strip_version(&name),
                }
            }
            Token::Keyword(Keyword::Plugin) => {
                self.advance();
                self.expect(&Token::LParen, "after 'Plugin'")?;
                let name = self.expect_string("naming the plugin")?;
                self.expect(&Token::RParen, "to close 'Plugin(...)'")?;
                let alias = if self.eat(&Token::Keyword(Keyword::As)) {
                    Some(self.expect_ident("after 'as'")?)
                } else {
                    None
                };
                Node::UsePlugin {
                    name: strip_version(&name),
                    alias,
                }
            }
            other => {
                return Err(self.error(format!("expected 'MCP' or 'Plugin' after 'Use', found {}", other.describe())));
            }
        };
        let stmt = Spanned::new(pos, node);
        self.end_statement()?;
        Ok(stmt)
    }

    /// Declarative and never executed; each line is kept as a loosely parsed
    /// expression (or a one-pair dict for `key: value` lines).
    fn permissions_block(&mut self, pos: Pos) -> RunResult<Spanned> {
        self.advance();
        self.expect(&Token::Colon, "after 'permissions'")?;
        self.expect(&Token::Newline, "after ':'")?;
        self.expect(&Token::Indent, "to open the permissions block")?;
        let mut entries = Vec::new();
        loop {
            self.skip_newlines();
            if matches!(self.peek(), Token::Dedent | Token::Eof) {
                break;
            }
            let entry_pos = self.pos();
            if let Token::Ident(key) = self.peek().clone() {
                if matches!(self.peek_at(1), Token::Colon) {
                    self.advance();
                    self.advance();
                    let value = self.expression()?;
                    entries.push(Spanned::new(entry_pos, Node::DictLit(vec![(key, value)])));
                    self.end_statement()?;
                    continue;
                }
            }
            let expr = self.expression()?;
            entries.push(expr);
            self.end_statement()?;
        }
        self.eat(&Token::Dedent);
        Ok(Spanned::new(pos, Node::Permissions { entries }))
    }

    fn emit_statement(&mut self, pos: Pos) -> RunResult<Spanned> {
        self.advance();
        let event = self.expect_ident("after 'emit'")?;
        let payload = if self.eat(&Token::LParen) {
            if self.eat(&Token::RParen) {
                None
            } else {
                let expr = self.expression()?;
                self.expect(&Token::RParen, "to close the payload")?;
                Some(Box::new(expr))
            }
        } else {
            None
        };
        let stmt = Spanned::new(pos, Node::Emit { event, payload });
        self.end_statement()?;
        Ok(stmt)
    }

    fn on_statement(&mut self, pos: Pos) -> RunResult<Spanned> {
        self.advance();
        let event = self.expect_ident("after 'on'")?;
        self.expect(&Token::Keyword(Keyword::As), "after the event name")?;
        let var = self.expect_ident("after 'as'")?;
        let body = self.block("after the handler header")?;
        Ok(Spanned::new(pos, Node::On { event, var, body }))
    }

    fn return_statement(&mut self, pos: Pos) -> RunResult<Spanned> {
        self.advance();
        let value = if matches!(self.peek(), Token::Newline | Token::Dedent | Token::Eof) {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        let stmt = Spanned::new(pos, Node::Return { value });
        self.end_statement()?;
        Ok(stmt)
    }

    /// `### NEWLINE statements ###`
    fn atomic_block(&mut self, pos: Pos) -> RunResult<Spanned> {
        self.expect(&Token::TripleHash, "to open the atomic block")?;
        self.expect(&Token::Newline, "after '###'")?;
        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek() {
                Token::TripleHash => break,
                Token::Eof => return Err(self.error("unterminated atomic block: missing closing '###'")),
                _ => body.push(self.statement()?),
            }
        }
        self.expect(&Token::TripleHash, "to close the atomic block")?;
        let stmt = Spanned::new(pos, Node::Atomic { body });
        self.end_statement()?;
        Ok(stmt)
    }

    /// `[a, b, c] := expr` — speculative; returns `None` when the brackets
    /// turn out to be a list literal.
    fn try_destructure(&mut self, pos: Pos) -> RunResult<Option<Spanned>> {
        let saved = self.idx;
        self.advance(); // `[`
        let mut names = Vec::new();
        loop {
            match self.peek().clone() {
                Token::Ident(name) => {
                    self.advance();
                    names.push(name);
                }
                _ => {
                    self.idx = saved;
                    return Ok(None);
                }
            }
            if self.eat(&Token::Comma) {
                continue;
            }
            break;
        }
        if !self.eat(&Token::RBracket) || !self.eat(&Token::Walrus) {
            self.idx = saved;
            return Ok(None);
        }
        let value = self.expression()?;
        let stmt = Spanned::new(
            pos,
            Node::Assignment {
                target: AssignTarget::Destructure(names),
                value: Box::new(value),
            },
        );
        self.end_statement()?;
        Ok(Some(stmt))
    }

    // --- expressions ---

    fn expression(&mut self) -> RunResult<Spanned> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error("expression nesting too deep"));
        }
        self.depth += 1;
        let result = self.pipe_expr();
        self.depth -= 1;
        result
    }

    fn pipe_expr(&mut self) -> RunResult<Spanned> {
        let mut left = self.alternative_expr()?;
        while matches!(self.peek(), Token::PipeOp) {
            let pos = left.pos;
            self.advance();
            let right = self.alternative_expr()?;
            left = Spanned::new(
                pos,
                Node::Pipe {
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }
        Ok(left)
    }

    fn alternative_expr(&mut self) -> RunResult<Spanned> {
        let mut left = self.or_expr()?;
        while matches!(self.peek(), Token::Alt) {
            let pos = left.pos;
            self.advance();
            let right = self.or_expr()?;
            left = Spanned::new(
                pos,
                Node::Alternative {
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }
        Ok(left)
    }

    fn or_expr(&mut self) -> RunResult<Spanned> {
        let mut left = self.and_expr()?;
        while matches!(self.peek(), Token::Keyword(Keyword::Or)) {
            let pos = left.pos;
            self.advance();
            let right = self.and_expr()?;
            left = Spanned::new(
                pos,
                Node::Logical {
                    op: LogicalOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> RunResult<Spanned> {
        let mut left = self.not_expr()?;
        while matches!(self.peek(), Token::Keyword(Keyword::And)) {
            let pos = left.pos;
            self.advance();
            let right = self.not_expr()?;
            left = Spanned::new(
                pos,
                Node::Logical {
                    op: LogicalOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> RunResult<Spanned> {
        if matches!(self.peek(), Token::Keyword(Keyword::Not)) {
            let pos = self.pos();
            self.advance();
            let expr = self.not_expr()?;
            return Ok(Spanned::new(pos, Node::Not { expr: Box::new(expr) }));
        }
        self.comparison_expr()
    }

    fn comparison_expr(&mut self) -> RunResult<Spanned> {
        let mut left = self.in_expr()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => CmpOp::Eq,
                Token::NotEq => CmpOp::Ne,
                Token::LtEq => CmpOp::LtEq,
                Token::GtEq => CmpOp::GtEq,
                Token::Lt => CmpOp::Lt,
                Token::Gt => CmpOp::Gt,
                _ => break,
            };
            // A `<` that opens a well-formed tag list belongs to the
            // enclosing construct (`until cond<retry=5>:`), not to this
            // comparison.
            if op == CmpOp::Lt && self.tags_ahead() {
                break;
            }
            let pos = left.pos;
            self.advance();
            let right = self.in_expr()?;
            left = Spanned::new(
                pos,
                Node::Comparison {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }
        Ok(left)
    }

    fn in_expr(&mut self) -> RunResult<Spanned> {
        let mut left = self.merge_expr()?;
        while matches!(self.peek(), Token::Keyword(Keyword::In)) {
            let pos = left.pos;
            self.advance();
            let right = self.merge_expr()?;
            left = Spanned::new(
                pos,
                Node::In {
                    item: Box::new(left),
                    collection: Box::new(right),
                },
            );
        }
        Ok(left)
    }

    fn merge_expr(&mut self) -> RunResult<Spanned> {
        let mut left = self.mul_expr()?;
        while matches!(self.peek(), Token::Plus) {
            let pos = left.pos;
            self.advance();
            let right = self.mul_expr()?;
            left = Spanned::new(
                pos,
                Node::Merge {
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }
        Ok(left)
    }

    fn mul_expr(&mut self) -> RunResult<Spanned> {
        let mut left = self.unary_expr()?;
        loop {
            let op = match self.peek() {
                Token::Minus => ArithOp::Sub,
                Token::Star => ArithOp::Mul,
                Token::Slash => ArithOp::Div,
                _ => break,
            };
            let pos = left.pos;
            self.advance();
            let right = self.unary_expr()?;
            left = Spanned::new(
                pos,
                Node::Arith {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }
        Ok(left)
    }

    fn unary_expr(&mut self) -> RunResult<Spanned> {
        if matches!(self.peek(), Token::Minus) {
            let pos = self.pos();
            self.advance();
            let expr = self.unary_expr()?;
            return Ok(Spanned::new(pos, Node::Neg { expr: Box::new(expr) }));
        }
        self.postfix_expr()
    }

    fn postfix_expr(&mut self) -> RunResult<Spanned> {
        let mut expr = self.primary_expr()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    let pos = expr.pos;
                    self.advance();
                    let field = self.expect_ident("after '.'")?;
                    expr = Spanned::new(
                        pos,
                        Node::Member {
                            object: Box::new(expr),
                            field,
                        },
                    );
                }
                Token::LParen => {
                    let pos = expr.pos;
                    self.advance();
                    let args = self.call_args()?;
                    let tags = self.try_parse_tags().unwrap_or_default();
                    expr = Spanned::new(
                        pos,
                        Node::Call {
                            callee: Box::new(expr),
                            args,
                            tags,
                        },
                    );
                }
                Token::LBracket => {
                    let pos = expr.pos;
                    self.advance();
                    let index = self.expression()?;
                    self.expect(&Token::RBracket, "to close the index")?;
                    expr = Spanned::new(
                        pos,
                        Node::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn primary_expr(&mut self) -> RunResult<Spanned> {
        let pos = self.pos();
        match self.peek().clone() {
            Token::Number { value, suffix } => {
                self.advance();
                Ok(Spanned::new(
                    pos,
                    Node::NumberLit {
                        value,
                        unit: suffix.and_then(Unit::from_char),
                    },
                ))
            }
            Token::Bool(b) => {
                self.advance();
                Ok(Spanned::new(pos, Node::BoolLit(b)))
            }
            Token::Null => {
                self.advance();
                Ok(Spanned::new(pos, Node::NullLit))
            }
            Token::Str(text) => {
                self.advance();
                Ok(Spanned::new(pos, lower_string(&text, pos)?))
            }
            Token::Underscore => {
                self.advance();
                Ok(Spanned::new(pos, Node::ImplicitContext))
            }
            Token::LParen => {
                self.advance();
                let expr = self.expression()?;
                self.expect(&Token::RParen, "to close the group")?;
                Ok(Spanned::new(pos, expr.node))
            }
            Token::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !matches!(self.peek(), Token::RBracket) {
                    items.push(self.expression()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RBracket, "to close the list")?;
                Ok(Spanned::new(pos, Node::ListLit(items)))
            }
            Token::LBrace => {
                self.advance();
                let mut entries = Vec::new();
                while !matches!(self.peek(), Token::RBrace) {
                    let key = match self.peek().clone() {
                        Token::Ident(name) => {
                            self.advance();
                            name
                        }
                        Token::Str(text) => {
                            self.advance();
                            text
                        }
                        other => {
                            return Err(self.error(format!("expected dict key, found {}", other.describe())));
                        }
                    };
                    self.expect(&Token::Colon, "after the dict key")?;
                    let value = self.expression()?;
                    entries.push((key, value));
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RBrace, "to close the dict")?;
                Ok(Spanned::new(pos, Node::DictLit(entries)))
            }
            Token::Keyword(Keyword::Fork) => self.fork_expr(pos),
            Token::Keyword(Keyword::Listen) => {
                self.advance();
                self.expect(&Token::LParen, "after 'listen'")?;
                self.expect(&Token::RParen, "to close 'listen()'")?;
                Ok(Spanned::new(pos, Node::Listen))
            }
            Token::Keyword(Keyword::Stream) => {
                self.advance();
                self.expect(&Token::LParen, "after 'Stream'")?;
                let source = self.expression()?;
                self.expect(&Token::RParen, "to close 'Stream(...)'")?;
                Ok(Spanned::new(
                    pos,
                    Node::Stream {
                        source: Box::new(source),
                    },
                ))
            }
            Token::Keyword(kw @ (Keyword::Discover | Keyword::Mcp | Keyword::Plugin)) => {
                self.advance();
                let name = match kw {
                    Keyword::Discover => "Discover",
                    Keyword::Mcp => "MCP",
                    _ => "Plugin",
                };
                self.expect(&Token::LParen, "to open the call")?;
                let args = self.call_args()?;
                let tags = self.try_parse_tags().unwrap_or_default();
                Ok(Spanned::new(
                    pos,
                    Node::Operation {
                        name: name.to_owned(),
                        args,
                        tags,
                    },
                ))
            }
            Token::Ident(name) => {
                self.advance();
                self.identifier_expr(name, pos)
            }
            other => Err(self.error(format!("unexpected {} in expression", other.describe()))),
        }
    }

    /// An identifier can begin a plain reference, an operation call, a
    /// bracketed-count call `Name[N](...)`, or a namespaced call `ns:Op(...)`.
    fn identifier_expr(&mut self, name: String, pos: Pos) -> RunResult<Spanned> {
        // `ns:Op(...)` — only when `:` is immediately followed by an
        // identifier and an opening paren.
        if matches!(self.peek(), Token::Colon)
            && matches!(self.peek_at(1), Token::Ident(_))
            && matches!(self.peek_at(2), Token::LParen)
        {
            self.advance();
            let op = self.expect_ident("after ':'")?;
            self.advance(); // `(`
            let args = self.call_args()?;
            let tags = self.try_parse_tags().unwrap_or_default();
            return Ok(Spanned::new(
                pos,
                Node::Namespaced {
                    namespace: name,
                    name: op,
                    args,
                    tags,
                },
            ));
        }
        // `Name[N](...)` — the count becomes a synthetic `_count` keyword
        // argument. Plain indexing (`xs[0]`) is left to the postfix loop.
        if matches!(self.peek(), Token::LBracket)
            && matches!(self.peek_at(1), Token::Number { .. })
            && matches!(self.peek_at(2), Token::RBracket)
            && matches!(self.peek_at(3), Token::LParen)
        {
            self.advance();
            let Token::Number { value, suffix } = self.advance() else {
                unreachable!("peeked number");
            };
            self.advance(); // `]`
            self.advance(); // `(`
            let mut args = self.call_args()?;
            let tags = self.try_parse_tags().unwrap_or_default();
            args.push(Arg {
                name: Some("_count".to_owned()),
                value: Spanned::new(
                    pos,
                    Node::NumberLit {
                        value,
                        unit: suffix.and_then(Unit::from_char),
                    },
                ),
            });
            return Ok(Spanned::new(pos, Node::Operation { name, args, tags }));
        }
        if matches!(self.peek(), Token::LParen) {
            self.advance();
            let args = self.call_args()?;
            let tags = self.try_parse_tags().unwrap_or_default();
            return Ok(Spanned::new(pos, Node::Operation { name, args, tags }));
        }
        Ok(Spanned::new(pos, Node::Identifier(name)))
    }

    /// Argument list; the opening paren is already consumed.
    fn call_args(&mut self) -> RunResult<Vec<Arg>> {
        let mut args = Vec::new();
        while !matches!(self.peek(), Token::RParen) {
            if let Token::Ident(key) = self.peek().clone() {
                if matches!(self.peek_at(1), Token::Eq) {
                    self.advance();
                    self.advance();
                    let value = self.expression()?;
                    args.push(Arg {
                        name: Some(key),
                        value,
                    });
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                    continue;
                }
            }
            let value = self.expression()?;
            args.push(Arg { name: None, value });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen, "to close the argument list")?;
        Ok(args)
    }

    /// Peek-only check for a well-formed tag list at the cursor.
    fn tags_ahead(&mut self) -> bool {
        let saved = self.idx;
        let found = self.try_parse_tags().is_some();
        self.idx = saved;
        found
    }

    /// Speculative `<tag, tag=value, ...>` parse. Returns `None` (cursor
    /// restored) when the tokens do not form a tag list, leaving `<` to the
    /// comparison level.
    fn try_parse_tags(&mut self) -> Option<Tags> {
        if !matches!(self.peek(), Token::Lt) {
            return None;
        }
        let saved = self.idx;
        self.advance();
        let mut tags: Tags = SmallVec::new();
        loop {
            let Token::Ident(name) = self.peek().clone() else {
                self.idx = saved;
                return None;
            };
            self.advance();
            let value = if self.eat(&Token::Eq) {
                // Tag values stop short of comparison operators so the
                // closing `>` stays unambiguous.
                match self.merge_expr() {
                    Ok(expr) => Some(Box::new(expr)),
                    Err(_) => {
                        self.idx = saved;
                        return None;
                    }
                }
            } else {
                None
            };
            tags.push(Tag { name, value });
            if self.eat(&Token::Comma) {
                continue;
            }
            if self.eat(&Token::Gt) {
                return Some(tags);
            }
            self.idx = saved;
            return None;
        }
    }

    fn fork_expr(&mut self, pos: Pos) -> RunResult<Spanned> {
        self.advance();
        let count = if self.eat(&Token::LBracket) {
            let Token::Number { value, .. } = self.peek().clone() else {
                return Err(self.error("expected a count in 'fork[...]'"));
            };
            self.advance();
            self.expect(&Token::RBracket, "to close the fork count")?;
            Some(value as usize)
        } else {
            None
        };
        self.expect(&Token::Colon, "after 'fork'")?;
        self.expect(&Token::Newline, "after ':'")?;
        self.expect(&Token::Indent, "to open the fork body")?;
        self.skip_newlines();

        if matches!(self.peek(), Token::Keyword(Keyword::For)) {
            self.advance();
            let var = self.expect_ident("after 'for'")?;
            self.expect(&Token::Keyword(Keyword::In), "after the loop variable")?;
            let iter = self.expression()?;
            let body = self.block("after 'for' header")?;
            self.skip_newlines();
            self.expect(&Token::Dedent, "to close the fork body")?;
            return Ok(Spanned::new(
                pos,
                Node::Fork {
                    count,
                    body: ForkBody::For {
                        var,
                        iter: Box::new(iter),
                        body,
                    },
                },
            ));
        }

        let mut branches = Vec::new();
        loop {
            self.skip_newlines();
            if matches!(self.peek(), Token::Dedent | Token::Eof) {
                break;
            }
            // In branch position `name: expr` is a label, taking precedence
            // over the namespaced-call reading of `ident:`.
            let name = if let Token::Ident(label) = self.peek().clone() {
                if matches!(self.peek_at(1), Token::Colon) {
                    self.advance();
                    self.advance();
                    Some(label)
                } else {
                    None
                }
            } else {
                None
            };
            let expr = self.expression()?;
            branches.push(ForkBranch { name, expr });
            if !matches!(self.peek(), Token::Dedent | Token::Eof) {
                self.expect(&Token::Newline, "after the fork branch")?;
            }
        }
        self.eat(&Token::Dedent);
        if branches.is_empty() {
            return Err(self.error("fork requires at least one branch"));
        }
        let named = branches[0].name.is_some();
        if branches.iter().any(|b| b.name.is_some() != named) {
            return Err(self.error("fork branches must be all named or all unnamed"));
        }
        Ok(Spanned::new(
            pos,
            Node::Fork {
                count,
                body: ForkBody::Branches(branches),
            },
        ))
    }
}

/// Strips a trailing `@version` qualifier from an MCP/plugin name.
fn strip_version(name: &str) -> String {
    match name.find('@') {
        Some(idx) if idx > 0 => name[..idx].to_owned(),
        _ => name.to_owned(),
    }
}

/// Lowers a string literal, scanning for `$name`, `$_`, and `${expr}`.
///
/// Returns a plain [`Node::StringLit`] when every part is literal, otherwise
/// a [`Node::InterpolatedString`] with mixed parts. Dotted names become
/// nested member accesses.
fn lower_string(text: &str, pos: Pos) -> RunResult<Node> {
    let chars: Vec<char> = text.chars().collect();
    let mut parts: Vec<InterpPart> = Vec::new();
    let mut buf = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        // `\$` was kept verbatim by the lexer: a literal dollar.
        if c == '\\' && chars.get(i + 1) == Some(&'$') {
            buf.push('$');
            i += 2;
            continue;
        }
        if c != '$' {
            buf.push(c);
            i += 1;
            continue;
        }
        match chars.get(i + 1) {
            Some('{') => {
                let mut depth = 1usize;
                let mut j = i + 2;
                while j < chars.len() && depth > 0 {
                    match chars[j] {
                        '{' => depth += 1,
                        '}' => depth -= 1,
                        _ => {}
                    }
                    j += 1;
                }
                if depth > 0 {
                    return Err(OrchidError::new(ErrorKind::ParseError, "unterminated '${' interpolation").at(pos));
                }
                let inner: String = chars[i + 2..j - 1].iter().collect();
                let expr = parse_snippet(&inner, pos)?;
                flush(&mut parts, &mut buf);
                parts.push(InterpPart::Expr(expr));
                i = j;
            }
            Some('_')
                if !chars
                    .get(i + 2)
                    .is_some_and(|n| n.is_ascii_alphanumeric() || *n == '_') =>
            {
                flush(&mut parts, &mut buf);
                parts.push(InterpPart::Expr(Spanned::new(pos, Node::ImplicitContext)));
                i += 2;
            }
            Some(start) if start.is_ascii_alphabetic() || *start == '_' => {
                let mut j = i + 1;
                while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                let mut node = Node::Identifier(chars[i + 1..j].iter().collect());
                // Dotted access: `$config.model` reaches into dicts.
                while chars.get(j) == Some(&'.')
                    && chars
                        .get(j + 1)
                        .is_some_and(|n| n.is_ascii_alphabetic() || *n == '_')
                {
                    let mut k = j + 1;
                    while k < chars.len() && (chars[k].is_ascii_alphanumeric() || chars[k] == '_') {
                        k += 1;
                    }
                    node = Node::Member {
                        object: Box::new(Spanned::new(pos, node)),
                        field: chars[j + 1..k].iter().collect(),
                    };
                    j = k;
                }
                flush(&mut parts, &mut buf);
                parts.push(InterpPart::Expr(Spanned::new(pos, node)));
                i = j;
            }
            _ => {
                buf.push('$');
                i += 1;
            }
        }
    }
    flush(&mut parts, &mut buf);
    if parts.iter().all(|p| matches!(p, InterpPart::Lit(_))) {
        let mut literal = String::new();
        for part in parts {
            if let InterpPart::Lit(text) = part {
                literal.push_str(&text);
            }
        }
        return Ok(Node::StringLit(literal));
    }
    Ok(Node::InterpolatedString { parts })
}

fn flush(parts: &mut Vec<InterpPart>, buf: &mut String) {
    if !buf.is_empty() {
        parts.push(InterpPart::Lit(std::mem::take(buf)));
    }
}

/// Parses a `${...}` interior as a standalone expression.
fn parse_snippet(source: &str, pos: Pos) -> RunResult<Spanned> {
    let tokens = lex(source).map_err(|err| {
        OrchidError::new(ErrorKind::ParseError, format!("invalid interpolation: {}", err.message)).at(pos)
    })?;
    let mut parser = Parser::new(tokens);
    let expr = parser
        .expression()
        .map_err(|err| OrchidError::new(ErrorKind::ParseError, format!("invalid interpolation: {}", err.message)).at(pos))?;
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn body(source: &str) -> Vec<Spanned> {
        parse(source).unwrap().body
    }

    #[test]
    fn assignment_and_number() {
        let prog = body("x := 42\n");
        let Node::Assignment { target, value } = &prog[0].node else {
            panic!("expected assignment, got {:?}", prog[0].node);
        };
        assert_eq!(*target, AssignTarget::Name("x".to_owned()));
        assert_eq!(value.node, Node::NumberLit { value: 42.0, unit: None });
    }

    #[test]
    fn plain_string_stays_literal() {
        let prog = body("g := \"hello world\"\n");
        let Node::Assignment { value, .. } = &prog[0].node else { panic!() };
        assert_eq!(value.node, Node::StringLit("hello world".to_owned()));
    }

    #[test]
    fn interpolation_produces_parts() {
        let prog = body("g := \"hello $name\"\n");
        let Node::Assignment { value, .. } = &prog[0].node else { panic!() };
        let Node::InterpolatedString { parts } = &value.node else {
            panic!("expected interpolation, got {:?}", value.node);
        };
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], InterpPart::Lit("hello ".to_owned()));
        let InterpPart::Expr(expr) = &parts[1] else { panic!() };
        assert_eq!(expr.node, Node::Identifier("name".to_owned()));
    }

    #[test]
    fn dotted_interpolation_is_member_access() {
        let prog = body("g := \"using ${config.model}\"\n");
        let Node::Assignment { value, .. } = &prog[0].node else { panic!() };
        let Node::InterpolatedString { parts } = &value.node else { panic!() };
        let InterpPart::Expr(expr) = &parts[1] else { panic!() };
        assert!(matches!(expr.node, Node::Member { .. }));
    }

    #[test]
    fn escaped_dollar_is_literal() {
        let prog = body("g := \"cost \\$5\"\n");
        let Node::Assignment { value, .. } = &prog[0].node else { panic!() };
        assert_eq!(value.node, Node::StringLit("cost $5".to_owned()));
    }

    #[test]
    fn operation_with_tags() {
        let prog = body("CoT(\"q\")<retry=2, fallback=\"safe\">\n");
        let Node::Operation { name, args, tags } = &prog[0].node else {
            panic!("expected operation, got {:?}", prog[0].node);
        };
        assert_eq!(name, "CoT");
        assert_eq!(args.len(), 1);
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].name, "retry");
        assert_eq!(tags[1].name, "fallback");
    }

    #[test]
    fn failed_tag_parse_is_comparison() {
        let prog = body("x := len(a) < 3\n");
        let Node::Assignment { value, .. } = &prog[0].node else { panic!() };
        assert!(matches!(
            value.node,
            Node::Comparison { op: CmpOp::Lt, .. }
        ));
    }

    #[test]
    fn bracketed_count_becomes_kwarg() {
        let prog = body("Brainstorm[5](\"ideas\")\n");
        let Node::Operation { name, args, .. } = &prog[0].node else { panic!() };
        assert_eq!(name, "Brainstorm");
        let count = args.iter().find(|a| a.name.as_deref() == Some("_count")).unwrap();
        assert_eq!(count.value.node, Node::NumberLit { value: 5.0, unit: None });
    }

    #[test]
    fn namespaced_call() {
        let prog = body("github:search_issues(query=\"bug\")\n");
        let Node::Namespaced { namespace, name, args, .. } = &prog[0].node else {
            panic!("expected namespaced call, got {:?}", prog[0].node);
        };
        assert_eq!(namespace, "github");
        assert_eq!(name, "search_issues");
        assert_eq!(args[0].name.as_deref(), Some("query"));
    }

    #[test]
    fn fork_named_branches() {
        let prog = body("data := fork:\n    a: Search(\"A\")\n    b: Search(\"B\")\n");
        let Node::Assignment { value, .. } = &prog[0].node else { panic!() };
        let Node::Fork { count, body } = &value.node else { panic!() };
        assert_eq!(*count, None);
        let ForkBody::Branches(branches) = body else { panic!() };
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].name.as_deref(), Some("a"));
        assert_eq!(branches[1].name.as_deref(), Some("b"));
    }

    #[test]
    fn fork_for_variant() {
        let prog = body("fork[3]:\n    for item in items:\n        Analyze(item)\n");
        let Node::Fork { count, body } = &prog[0].node else { panic!() };
        assert_eq!(*count, Some(3));
        assert!(matches!(body, ForkBody::For { .. }));
    }

    #[test]
    fn mixed_fork_branches_rejected() {
        let err = parse("fork:\n    a: 1\n    2\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ParseError);
    }

    #[test]
    fn atomic_block() {
        let prog = body("###\nx := 1\ny := 2\n###\n");
        let Node::Atomic { body } = &prog[0].node else {
            panic!("expected atomic block, got {:?}", prog[0].node);
        };
        assert_eq!(body.len(), 2);
    }

    #[test]
    fn destructure_assignment() {
        let prog = body("[a, b, c] := Decompose(\"task\")\n");
        let Node::Assignment { target, .. } = &prog[0].node else { panic!() };
        assert_eq!(
            *target,
            AssignTarget::Destructure(vec!["a".to_owned(), "b".to_owned(), "c".to_owned()])
        );
    }

    #[test]
    fn list_literal_statement_not_destructure() {
        let prog = body("[1, 2, 3]\n");
        assert!(matches!(prog[0].node, Node::ListLit(_)));
    }

    #[test]
    fn import_with_alias() {
        let prog = body("import lib.helpers as helpers\n");
        let Node::Import { path, alias } = &prog[0].node else { panic!() };
        assert_eq!(path, "lib.helpers");
        assert_eq!(alias.as_deref(), Some("helpers"));
    }

    #[test]
    fn use_plugin_strips_version() {
        let prog = body("Use Plugin(\"tools@1.2.0\") as t\n");
        let Node::UsePlugin { name, alias } = &prog[0].node else { panic!() };
        assert_eq!(name, "tools");
        assert_eq!(alias.as_deref(), Some("t"));
    }

    #[test]
    fn metadata_requires() {
        let prog = parse("@orchid\n@requires MCP(\"github\"), Plugin(\"local\")\nx := 1\n").unwrap();
        assert_eq!(prog.metadata.len(), 2);
        assert_eq!(prog.metadata[1].name, "requires");
        assert_eq!(
            prog.metadata[1].entries,
            vec![
                MetaEntry::Requires {
                    kind: RequireKind::Mcp,
                    name: "github".to_owned()
                },
                MetaEntry::Requires {
                    kind: RequireKind::Plugin,
                    name: "local".to_owned()
                },
            ]
        );
    }

    #[test]
    fn pipe_precedence_is_lowest() {
        let prog = body("x := \"a\" >> Summarize(_) | \"fallback\"\n");
        let Node::Assignment { value, .. } = &prog[0].node else { panic!() };
        // `>>` binds loosest: pipe(a, alt(Summarize(_), "fallback"))
        let Node::Pipe { right, .. } = &value.node else {
            panic!("expected pipe at top, got {:?}", value.node);
        };
        assert!(matches!(right.node, Node::Alternative { .. }));
    }

    #[test]
    fn until_with_tags() {
        let prog = body("until Confidence() > 0.8 <retry=5, best_effort>:\n    Refine(_)\n");
        let Node::Until { tags, .. } = &prog[0].node else {
            panic!("expected until, got {:?}", prog[0].node);
        };
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn except_arms() {
        let prog = body("try:\n    Risky()\nexcept ValidationError as e:\n    Log(e)\nexcept:\n    Log(\"other\")\nfinally:\n    Cleanup()\n");
        let Node::Try { excepts, finally, .. } = &prog[0].node else { panic!() };
        assert_eq!(excepts.len(), 2);
        assert_eq!(excepts[0].kind.as_deref(), Some("ValidationError"));
        assert_eq!(excepts[0].bind.as_deref(), Some("e"));
        assert_eq!(excepts[1].kind, None);
        assert!(finally.is_some());
    }

    #[test]
    fn member_call_is_generic_call() {
        let prog = body("x := helpers.clean(\"text\")\n");
        let Node::Assignment { value, .. } = &prog[0].node else { panic!() };
        let Node::Call { callee, .. } = &value.node else {
            panic!("expected call, got {:?}", value.node);
        };
        assert!(matches!(callee.node, Node::Member { .. }));
    }

    #[test]
    fn parse_error_has_position() {
        let err = parse("x := := 2\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ParseError);
        assert!(err.pos.is_some());
    }
}

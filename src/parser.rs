//! Recursive-descent, precedence-climbing parser.
//!
//! Errors never abort the parse outright. A malformed construct pushes a
//! [`Diagnostic`] and the parser enters panic mode: it discards tokens until
//! it reaches a safe resynchronization point (`fun`, `}`, `val`/`var`,
//! `return`; this widens the set from just `fun`), then resumes.
//! This lets one invocation report more than one syntax error.

use crate::ast::{Ast, ExtraData, NodeFlags, NodeId, NodeKind};
use crate::diagnostics::{Diagnostic, DiagnosticBag, Span};
use crate::lexer::{Token, TokenIndex, TokenKind};

/// Tracks whether the parser is cleanly producing nodes, has just raised an
/// error, is discarding tokens looking for a resync point, or has just
/// found one and is about to resume normal parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    Ok,
    Error,
    Panic,
    Synced,
}

pub struct Parser<'a> {
    source: &'a [u8],
    tokens: &'a [Token],
    ast: Ast,
    diagnostics: DiagnosticBag,
    pos: TokenIndex,
    state: ParserState,
    /// Tracks whether we're inside a `FunDecl` body, so `return` outside one
    /// can be diagnosed instead of accepted silently.
    in_function_depth: u32,
}

pub struct ParseResult {
    pub ast: Ast,
    pub root: NodeId,
    pub diagnostics: DiagnosticBag,
}

pub fn parse(source: &[u8], tokens: &[Token]) -> ParseResult {
    let mut parser = Parser {
        source,
        tokens,
        ast: Ast::new(),
        diagnostics: DiagnosticBag::new(),
        pos: 1, // skip the lexer's leading Dummy token
        state: ParserState::Ok,
        in_function_depth: 0,
    };
    let root = parser.parse_program();
    ParseResult {
        ast: parser.ast,
        root,
        diagnostics: parser.diagnostics,
    }
}

const RESYNC_POINTS: &[TokenKind] = &[TokenKind::Fun, TokenKind::Val, TokenKind::Var, TokenKind::Return];

impl<'a> Parser<'a> {
    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn current_kind(&self) -> TokenKind {
        self.current().kind
    }

    fn at_eof(&self) -> bool {
        self.current_kind() == TokenKind::Eof
    }

    fn advance(&mut self) -> TokenIndex {
        let i = self.pos;
        if !self.at_eof() {
            self.pos += 1;
        }
        i
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current_kind() == kind
    }

    fn matches(&mut self, kind: TokenKind) -> Option<TokenIndex> {
        if self.check(kind) { Some(self.advance()) } else { None }
    }

    fn span_at(&self, token_i: TokenIndex) -> Span {
        let token = &self.tokens[token_i];
        let len = crate::lexer::token_len(token.kind, self.source, token.source_offset).max(1);
        Span::new(token.source_offset, token.source_offset + len)
    }

    fn error(&mut self, message: impl Into<String>) {
        let span = self.span_at(self.pos);
        self.diagnostics.push(Diagnostic::error(message, span));
        self.state = ParserState::Error;
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<TokenIndex> {
        if let Some(i) = self.matches(kind) {
            Some(i)
        } else {
            self.error(format!("expected {what}, found {:?}", self.current_kind()));
            None
        }
    }

    /// Discard tokens until a resync point or EOF.
    fn panic_resync(&mut self) {
        self.state = ParserState::Panic;
        while !self.at_eof() {
            if self.check(TokenKind::RBrace) || RESYNC_POINTS.contains(&self.current_kind()) {
                self.state = ParserState::Synced;
                return;
            }
            self.advance();
        }
        self.state = ParserState::Synced;
    }

    fn error_node(&mut self) -> NodeId {
        self.ast.push_leaf(NodeKind::Error, self.pos)
    }

    // ---- top level -------------------------------------------------

    fn parse_program(&mut self) -> NodeId {
        let mut decls = Vec::new();
        while !self.at_eof() {
            if self.check(TokenKind::Fun) {
                decls.push(self.parse_fun_decl());
            } else if self.check(TokenKind::Return) {
                // Route through `parse_return` instead of the generic
                // top-level error so `in_function_depth == 0` produces the
                // specific "outside of a function body" diagnostic.
                decls.push(self.parse_return());
            } else {
                self.error("expected a top-level function declaration");
                self.panic_resync();
                // `panic_resync` also stops at `val`/`var`/`return`/`}`, none
                // of which this loop can consume (only `fun` is) — force one
                // token of progress so landing on one of those doesn't spin
                // forever re-reporting the same position.
                if !self.check(TokenKind::Fun) && !self.at_eof() {
                    self.advance();
                }
                decls.push(self.error_node());
            }
            if self.state != ParserState::Ok {
                self.state = ParserState::Ok;
            }
        }
        self.ast.push_with_extra(
            NodeKind::Program,
            0,
            NodeId::NONE,
            NodeId::NONE,
            ExtraData::StatementList(decls),
        )
    }

    fn parse_fun_decl(&mut self) -> NodeId {
        self.advance(); // `fun`
        let name_token = match self.expect(TokenKind::Ident, "a function name") {
            Some(t) => t,
            None => {
                self.panic_resync();
                return self.error_node();
            }
        };
        if self.expect(TokenKind::LParen, "'('").is_none() {
            self.panic_resync();
            return self.error_node();
        }
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                params.push(self.parse_param());
                if self.matches(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'");
        let return_type_token = if self.matches(TokenKind::Colon).is_some() {
            self.expect(TokenKind::Ident, "a return type")
        } else {
            None
        };
        self.in_function_depth += 1;
        let body = self.parse_block();
        self.in_function_depth -= 1;
        self.ast.push_with_extra(
            NodeKind::FunDecl,
            name_token,
            body,
            NodeId::NONE,
            ExtraData::FunSignature {
                params,
                return_type_token,
            },
        )
    }

    fn parse_param(&mut self) -> NodeId {
        let name_token = match self.expect(TokenKind::Ident, "a parameter name") {
            Some(t) => t,
            None => return self.error_node(),
        };
        let type_token = if self.matches(TokenKind::Colon).is_some() {
            self.expect(TokenKind::Ident, "a parameter type")
        } else {
            None
        };
        self.ast.push_with_extra(
            NodeKind::Param,
            name_token,
            NodeId::NONE,
            NodeId::NONE,
            ExtraData::TypeAnnotation(type_token),
        )
    }

    // ---- statements --------------------------------------------------

    fn parse_block(&mut self) -> NodeId {
        let brace = match self.expect(TokenKind::LBrace, "'{'") {
            Some(t) => t,
            None => {
                self.panic_resync();
                return self.error_node();
            }
        };
        let mut stmts = Vec::new();
        // `Fun` also has to stop this loop even though it isn't handled by
        // `parse_statement`: panic-mode recovery treats it as a resync
        // point, but nothing inside a block can ever consume it, so without
        // this check a stray `fun` (e.g. an unclosed enclosing body) would
        // make the resync a no-op and spin forever re-parsing the same token.
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Fun) && !self.at_eof() {
            stmts.push(self.parse_statement());
            if self.state != ParserState::Ok {
                self.panic_resync();
                self.state = ParserState::Ok;
            }
        }
        self.expect(TokenKind::RBrace, "'}'");
        self.ast.push_with_extra(
            NodeKind::Block,
            brace,
            NodeId::NONE,
            NodeId::NONE,
            ExtraData::StatementList(stmts),
        )
    }

    fn parse_statement(&mut self) -> NodeId {
        match self.current_kind() {
            TokenKind::Val | TokenKind::Var => self.parse_var_decl(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Return => self.parse_return(),
            TokenKind::LBrace => self.parse_block(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_var_decl(&mut self) -> NodeId {
        let is_val = self.check(TokenKind::Val);
        self.advance(); // `val` or `var`
        let name_token = match self.expect(TokenKind::Ident, "a variable name") {
            Some(t) => t,
            None => return self.error_node(),
        };
        let type_token = if self.matches(TokenKind::Colon).is_some() {
            self.expect(TokenKind::Ident, "a variable type")
        } else {
            None
        };
        self.expect(TokenKind::Eq, "'=' in a variable declaration");
        let init = self.parse_expression();
        let node = self.ast.push_with_extra(
            NodeKind::VarDecl,
            name_token,
            init,
            NodeId::NONE,
            ExtraData::TypeAnnotation(type_token),
        );
        if is_val {
            self.ast.set_flags(node, NodeFlags::IS_VAL);
        }
        node
    }

    fn parse_if(&mut self) -> NodeId {
        let if_token = self.advance();
        self.expect(TokenKind::LParen, "'(' after 'if'");
        let cond = self.parse_expression();
        self.expect(TokenKind::RParen, "')' after if condition");
        let then_branch = self.parse_statement();
        let else_list = if self.matches(TokenKind::Else).is_some() {
            vec![self.parse_statement()]
        } else {
            Vec::new()
        };
        self.ast.push_with_extra(
            NodeKind::If,
            if_token,
            cond,
            then_branch,
            ExtraData::StatementList(else_list),
        )
    }

    fn parse_while(&mut self) -> NodeId {
        let while_token = self.advance();
        self.expect(TokenKind::LParen, "'(' after 'while'");
        let cond = self.parse_expression();
        self.expect(TokenKind::RParen, "')' after while condition");
        let body = self.parse_statement();
        self.ast.push(NodeKind::While, while_token, cond, body)
    }

    fn parse_return(&mut self) -> NodeId {
        let return_token = self.advance();
        if self.in_function_depth == 0 {
            self.diagnostics.push(Diagnostic::error(
                "'return' outside of a function body",
                self.span_at(return_token),
            ));
        }
        let expr = if self.check(TokenKind::RBrace) {
            NodeId::NONE
        } else {
            self.parse_expression()
        };
        self.ast.push(NodeKind::Return, return_token, expr, NodeId::NONE)
    }

    fn parse_expression_statement(&mut self) -> NodeId {
        let expr = self.parse_expression();
        if self.matches(TokenKind::Eq).is_some() {
            if !is_lvalue(&self.ast, expr) {
                self.diagnostics.push(Diagnostic::error(
                    "left-hand side of an assignment must be a variable",
                    self.span_at(self.pos),
                ));
            }
            let rhs = self.parse_expression();
            return self.ast.push(NodeKind::Assign, self.pos, expr, rhs);
        }
        expr
    }

    // ---- expressions (precedence climbing) ----------------------------

    fn parse_expression(&mut self) -> NodeId {
        self.parse_logical_or()
    }

    fn parse_logical_or(&mut self) -> NodeId {
        let mut lhs = self.parse_logical_and();
        while let Some(op) = self.matches(TokenKind::PipePipe) {
            let rhs = self.parse_logical_and();
            lhs = self.ast.push(NodeKind::LogicalOr, op, lhs, rhs);
        }
        lhs
    }

    fn parse_logical_and(&mut self) -> NodeId {
        let mut lhs = self.parse_equality();
        while let Some(op) = self.matches(TokenKind::AmpAmp) {
            let rhs = self.parse_equality();
            lhs = self.ast.push(NodeKind::LogicalAnd, op, lhs, rhs);
        }
        lhs
    }

    fn parse_equality(&mut self) -> NodeId {
        let mut lhs = self.parse_relational();
        loop {
            let op = if let Some(t) = self.matches(TokenKind::EqEq) {
                t
            } else if let Some(t) = self.matches(TokenKind::BangEq) {
                t
            } else {
                break;
            };
            let rhs = self.parse_relational();
            lhs = self.ast.push(NodeKind::BinaryOp, op, lhs, rhs);
        }
        lhs
    }

    fn parse_relational(&mut self) -> NodeId {
        let mut lhs = self.parse_additive();
        loop {
            let op = if let Some(t) = self.matches(TokenKind::Lt) {
                t
            } else if let Some(t) = self.matches(TokenKind::Le) {
                t
            } else if let Some(t) = self.matches(TokenKind::Gt) {
                t
            } else if let Some(t) = self.matches(TokenKind::Ge) {
                t
            } else {
                break;
            };
            let rhs = self.parse_additive();
            lhs = self.ast.push(NodeKind::BinaryOp, op, lhs, rhs);
        }
        lhs
    }

    fn parse_additive(&mut self) -> NodeId {
        let mut lhs = self.parse_multiplicative();
        loop {
            let op = if let Some(t) = self.matches(TokenKind::Plus) {
                t
            } else if let Some(t) = self.matches(TokenKind::Minus) {
                t
            } else {
                break;
            };
            let rhs = self.parse_multiplicative();
            lhs = self.ast.push(NodeKind::BinaryOp, op, lhs, rhs);
        }
        lhs
    }

    fn parse_multiplicative(&mut self) -> NodeId {
        let mut lhs = self.parse_unary();
        loop {
            let op = if let Some(t) = self.matches(TokenKind::Star) {
                t
            } else if let Some(t) = self.matches(TokenKind::Slash) {
                t
            } else if let Some(t) = self.matches(TokenKind::Percent) {
                t
            } else {
                break;
            };
            let rhs = self.parse_unary();
            lhs = self.ast.push(NodeKind::BinaryOp, op, lhs, rhs);
        }
        lhs
    }

    fn parse_unary(&mut self) -> NodeId {
        if let Some(op) = self.matches(TokenKind::Minus) {
            let operand = self.parse_unary();
            return self.ast.push(NodeKind::UnaryOp, op, operand, NodeId::NONE);
        }
        if let Some(op) = self.matches(TokenKind::Bang) {
            let operand = self.parse_unary();
            return self.ast.push(NodeKind::UnaryOp, op, operand, NodeId::NONE);
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> NodeId {
        let mut node = self.parse_primary();
        loop {
            if self.check(TokenKind::LParen) {
                node = self.parse_call(node);
            } else if self.matches(TokenKind::Dot).is_some() {
                let segment = match self.expect(TokenKind::Ident, "a member name") {
                    Some(t) => t,
                    None => break,
                };
                node = self.ast.push(NodeKind::Navigation, segment, node, NodeId::NONE);
            } else {
                break;
            }
        }
        node
    }

    fn parse_call(&mut self, callee: NodeId) -> NodeId {
        let paren = self.advance(); // `(`
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_expression());
                if self.matches(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' to close a call");
        self.ast.push_with_extra(
            NodeKind::Call,
            paren,
            callee,
            NodeId::NONE,
            ExtraData::CallArgs(args),
        )
    }

    fn parse_primary(&mut self) -> NodeId {
        match self.current_kind() {
            TokenKind::Number => {
                let t = self.advance();
                let lexeme = crate::lexer::lexeme(self.source, &self.tokens[t]);
                let kind = if lexeme.ends_with(['L', 'l']) || !lexeme.contains('.') {
                    NodeKind::IntegerLiteral
                } else {
                    NodeKind::FloatLiteral
                };
                self.ast.push_leaf(kind, t)
            }
            TokenKind::String => {
                let t = self.advance();
                self.ast.push_leaf(NodeKind::StringLiteral, t)
            }
            TokenKind::True | TokenKind::False => {
                let t = self.advance();
                self.ast.push_leaf(NodeKind::BooleanLiteral, t)
            }
            TokenKind::Ident => {
                let t = self.advance();
                self.ast.push_leaf(NodeKind::Identifier, t)
            }
            TokenKind::LParen => {
                let t = self.advance();
                let inner = self.parse_expression();
                self.expect(TokenKind::RParen, "')' to close a parenthesized expression");
                self.ast.push(NodeKind::Grouping, t, inner, NodeId::NONE)
            }
            TokenKind::If => self.parse_if(),
            _ => {
                self.error("expected an expression");
                self.error_node()
            }
        }
    }
}

fn is_lvalue(ast: &Ast, id: NodeId) -> bool {
    matches!(ast.get(id).kind, NodeKind::Identifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_source(src: &str) -> ParseResult {
        let lexed = lex(src.as_bytes());
        parse(src.as_bytes(), &lexed.tokens)
    }

    #[test]
    fn parses_hello_world() {
        let result = parse_source(r#"fun main() { println("hi") }"#);
        assert!(!result.diagnostics.has_errors());
        let program = result.ast.get(result.root);
        let decls = result.ast.statement_list(program);
        assert_eq!(decls.len(), 1);
        assert_eq!(result.ast.get(decls[0]).kind, NodeKind::FunDecl);
    }

    #[test]
    fn parses_var_decl_with_type_and_init() {
        let result = parse_source("fun main() { var x: Int = 1 + 2 }");
        assert!(!result.diagnostics.has_errors());
    }

    #[test]
    fn distinguishes_val_from_var() {
        let result = parse_source("fun main() { val x = 1 }");
        assert!(!result.diagnostics.has_errors());
        let program = result.ast.get(result.root);
        let fun_decl = result.ast.get(result.ast.statement_list(program)[0]);
        let body = result.ast.get(fun_decl.lhs);
        let stmt = result.ast.get(result.ast.statement_list(body)[0]);
        assert!(stmt.flags.contains(crate::ast::NodeFlags::IS_VAL));
    }

    #[test]
    fn if_as_statement_with_else() {
        let result = parse_source("fun main() { if (true) { } else { } }");
        assert!(!result.diagnostics.has_errors());
    }

    #[test]
    fn return_inside_function_is_not_diagnosed() {
        let result = parse_source("fun main() { return }");
        assert!(!result.diagnostics.has_errors());
    }

    #[test]
    fn return_outside_function_is_diagnosed() {
        let result = parse_source("return 1");
        assert!(result.diagnostics.has_errors());
    }

    #[test]
    fn missing_closing_brace_recovers_at_next_fun() {
        let result = parse_source("fun a() { var x = 1 \n fun b() { }");
        assert!(result.diagnostics.has_errors());
        let program = result.ast.get(result.root);
        let decls = result.ast.statement_list(program);
        assert_eq!(decls.len(), 2);
    }
}

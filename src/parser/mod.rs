pub mod ast;
mod expr;

use colored::Colorize;
use std::{error::Error, fmt::Display};

use crate::lexer::{LexError, Lexer, Span, Token, TokenKind};

use self::ast::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub span: Option<Span>,
}

impl ParseError {
    pub fn eof(item: &str) -> ParseError {
        ParseError {
            message: format!("hit EOF while parsing {item}"),
            span: None,
        }
    }

    /// Render this error with a caret-underlined source excerpt.
    pub fn render(&self, source: &str) -> String {
        let Some(span) = &self.span else {
            return format!("SyntaxError: {}", self.message);
        };
        let (line, col) = span.start;
        let lines: Vec<&str> = source.lines().collect();
        let Some(line_str) = lines.get(line.saturating_sub(1)) else {
            return self.to_string();
        };
        let width = if span.end.0 == line {
            (span.end.1.saturating_sub(col)).max(1)
        } else {
            1
        };
        let margin = " ".repeat(format!("{line}").len());
        let padding = " ".repeat(col.saturating_sub(1));
        let carets = "^".repeat(width).red();
        format!(
            "{margin} |\n{line} |{line_str}\n{margin} |{padding}{carets} SyntaxError: {}",
            self.message
        )
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.span {
            Some(span) => write!(
                f,
                "SyntaxError: {} ({}:{})",
                self.message, span.start.0, span.start.1
            ),
            None => write!(f, "SyntaxError: {}", self.message),
        }
    }
}

impl Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError {
            message: err.message,
            span: Some(Span::at(err.position)),
        }
    }
}

/// Parse a whole source file into a [`Program`].
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let lexed = Lexer::new(source).lex()?;
    let mut parser = Parser::new(lexed.tokens);
    let body = parser.parse_block_body(true)?;
    if let Some(token) = parser.peek() {
        return Err(ParseError {
            message: format!("unexpected {}", token.kind),
            span: Some(token.span),
        });
    }
    Ok(Program {
        body,
        references: lexed.references,
        strict: parser.strict,
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FnCtx {
    pub is_generator: bool,
    pub is_async: bool,
}

pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    next_node_id: NodeId,
    pub(crate) strict: bool,
    pub(crate) fn_stack: Vec<FnCtx>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            next_node_id: 0,
            strict: false,
            fn_stack: vec![],
        }
    }

    // -- cursor ------------------------------------------------------------

    pub(crate) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub(crate) fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    pub(crate) fn nth_kind(&self, n: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + n).map(|t| &t.kind)
    }

    pub(crate) fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        match self.peek() {
            Some(token) if token.kind == kind => Ok(self.advance().unwrap()),
            Some(token) => Err(ParseError {
                message: format!("expected {kind} but found {}", token.kind),
                span: Some(token.span),
            }),
            None => Err(ParseError::eof(&format!("{kind}"))),
        }
    }

    /// Is the current token the contextual keyword `text`?
    pub(crate) fn at_ident(&self, text: &str) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Ident(name)) if name == text)
    }

    pub(crate) fn eat_ident(&mut self, text: &str) -> bool {
        if self.at_ident(text) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_ident(&mut self) -> Result<(String, Span), ParseError> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Ident(name),
                span,
            }) => {
                let result = (name.clone(), *span);
                self.pos += 1;
                Ok(result)
            }
            Some(token) => Err(ParseError {
                message: format!("expected an identifier but found {}", token.kind),
                span: Some(token.span),
            }),
            None => Err(ParseError::eof("an identifier")),
        }
    }

    /// A property name: identifier, keyword used as a name, string or
    /// number literal.
    pub(crate) fn expect_property_name(&mut self) -> Result<(String, Span), ParseError> {
        let Some(token) = self.peek().cloned() else {
            return Err(ParseError::eof("a property name"));
        };
        let name = match &token.kind {
            TokenKind::Ident(name) => name.clone(),
            TokenKind::Str { value, .. } => value.clone(),
            TokenKind::Number { value, .. } => crate::runtime::format_number(*value),
            other => match keyword_text(other) {
                Some(text) => text.to_string(),
                None => {
                    return Err(ParseError {
                        message: format!("expected a property name but found {other}"),
                        span: Some(token.span),
                    })
                }
            },
        };
        self.pos += 1;
        Ok((name, token.span))
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek()
            .map(|t| t.span)
            .or_else(|| self.tokens.last().map(|t| t.span))
            .unwrap_or_default()
    }

    pub(crate) fn prev_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            Span::default()
        }
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            span: self.peek().map(|t| t.span).or_else(|| self.tokens.last().map(|t| t.span)),
        }
    }

    pub(crate) fn new_id(&mut self) -> NodeId {
        let id = self.next_node_id;
        self.next_node_id += 1;
        id
    }

    pub(crate) fn mk_expr(&mut self, kind: ExprKind, span: Span) -> Expression {
        Expression {
            id: self.new_id(),
            kind,
            span,
        }
    }

    pub(crate) fn save(&self) -> (usize, NodeId) {
        (self.pos, self.next_node_id)
    }

    pub(crate) fn restore(&mut self, state: (usize, NodeId)) {
        self.pos = state.0;
        self.next_node_id = state.1;
    }

    fn fn_ctx(&self) -> FnCtx {
        self.fn_stack.last().copied().unwrap_or_default()
    }

    pub(crate) fn in_generator(&self) -> bool {
        self.fn_ctx().is_generator
    }

    pub(crate) fn in_async(&self) -> bool {
        self.fn_ctx().is_async
    }

    /// Consume a statement-terminating semicolon if present. Statements may
    /// also be terminated by `}`, EOF, or a line break.
    pub(crate) fn eat_semi(&mut self) {
        self.eat(&TokenKind::Semicolon);
    }

    // -- statements --------------------------------------------------------

    /// Parse statements until `}` or EOF. When `prologue` is set, a leading
    /// run of string-literal expression statements is scanned for
    /// `"use strict"`, which switches the parser strict for the rest of the
    /// enclosing scope.
    pub(crate) fn parse_block_body(&mut self, prologue: bool) -> Result<Vec<Statement>, ParseError> {
        let mut body = vec![];
        let mut in_prologue = prologue;

        while let Some(token) = self.peek() {
            if token.kind == TokenKind::RBrace {
                break;
            }
            if in_prologue {
                if let TokenKind::Str { value, .. } = &token.kind {
                    let boundary = matches!(
                        self.nth_kind(1),
                        None | Some(TokenKind::Semicolon | TokenKind::RBrace)
                    ) || self
                        .tokens
                        .get(self.pos + 1)
                        .is_some_and(|next| next.span.start.0 > token.span.start.0);
                    if boundary {
                        let is_use_strict = value == "use strict";
                        let directive = value.clone();
                        let span = token.span;
                        if is_use_strict {
                            self.strict = true;
                        }
                        self.advance();
                        self.eat_semi();
                        let expr = self.mk_expr(ExprKind::Str(directive), span);
                        body.push(Statement {
                            kind: StmtKind::Expression(expr),
                            span,
                        });
                        continue;
                    }
                }
                in_prologue = false;
            }
            body.push(self.parse_statement()?);
        }

        Ok(body)
    }

    pub(crate) fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let Some(token) = self.peek().cloned() else {
            return Err(ParseError::eof("a statement"));
        };
        let span = token.span;

        match &token.kind {
            TokenKind::Let | TokenKind::Const | TokenKind::Var => self.parse_var_decl(),
            TokenKind::Function => {
                self.advance();
                let func = self.parse_function_rest(false, true)?;
                Ok(Statement {
                    span: span.merge(&func.span),
                    kind: StmtKind::FunctionDecl(Box::new(func)),
                })
            }
            TokenKind::Ident(name) if name == "async" && self.nth_kind(1) == Some(&TokenKind::Function) => {
                self.advance();
                self.advance();
                let func = self.parse_function_rest(true, true)?;
                Ok(Statement {
                    span: span.merge(&func.span),
                    kind: StmtKind::FunctionDecl(Box::new(func)),
                })
            }
            TokenKind::Class => {
                let class = self.parse_class(false)?;
                Ok(Statement {
                    span: span.merge(&class.span),
                    kind: StmtKind::ClassDecl(Box::new(class)),
                })
            }
            TokenKind::Ident(name) if name == "abstract" && self.nth_kind(1) == Some(&TokenKind::Class) => {
                self.advance();
                let class = self.parse_class(true)?;
                Ok(Statement {
                    span: span.merge(&class.span),
                    kind: StmtKind::ClassDecl(Box::new(class)),
                })
            }
            TokenKind::Interface => self.parse_interface(),
            TokenKind::Ident(name)
                if name == "type" && matches!(self.nth_kind(1), Some(TokenKind::Ident(_))) =>
            {
                self.parse_type_alias()
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Throw => {
                self.advance();
                let expr = self.parse_expression()?;
                self.eat_semi();
                Ok(Statement {
                    span: span.merge(&expr.span),
                    kind: StmtKind::Throw(expr),
                })
            }
            TokenKind::Try => self.parse_try(),
            TokenKind::Break => {
                self.advance();
                self.eat_semi();
                Ok(Statement {
                    kind: StmtKind::Break,
                    span,
                })
            }
            TokenKind::Continue => {
                self.advance();
                self.eat_semi();
                Ok(Statement {
                    kind: StmtKind::Continue,
                    span,
                })
            }
            TokenKind::Switch => self.parse_switch(),
            TokenKind::LBrace => {
                self.advance();
                let body = self.parse_block_body(false)?;
                let end = self.expect(TokenKind::RBrace)?.span;
                Ok(Statement {
                    kind: StmtKind::Block(body),
                    span: span.merge(&end),
                })
            }
            TokenKind::Semicolon => {
                self.advance();
                Ok(Statement {
                    kind: StmtKind::Empty,
                    span,
                })
            }
            TokenKind::Import => self.parse_import(),
            TokenKind::Export => {
                self.advance();
                let inner = self.parse_statement()?;
                match &inner.kind {
                    StmtKind::VarDecl { .. }
                    | StmtKind::FunctionDecl(_)
                    | StmtKind::ClassDecl(_)
                    | StmtKind::InterfaceDecl(_)
                    | StmtKind::TypeAlias { .. } => {}
                    _ => return Err(self.error("only declarations can be exported")),
                }
                Ok(Statement {
                    span: span.merge(&inner.span),
                    kind: StmtKind::Export(Box::new(inner)),
                })
            }
            _ => {
                let expr = self.parse_expression()?;
                self.eat_semi();
                Ok(Statement {
                    span: expr.span,
                    kind: StmtKind::Expression(expr),
                })
            }
        }
    }

    fn parse_var_decl(&mut self) -> Result<Statement, ParseError> {
        let token = self.advance().unwrap();
        let kind = match token.kind {
            TokenKind::Let => DeclKind::Let,
            TokenKind::Const => DeclKind::Const,
            TokenKind::Var => DeclKind::Var,
            _ => unreachable!(),
        };

        let mut declarations = vec![];
        loop {
            let pattern = self.parse_pattern()?;
            let type_expr = if self.eat(&TokenKind::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            let init = if self.eat(&TokenKind::Eq) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            if init.is_none() && kind == DeclKind::Const {
                return Err(self.error("missing initializer in const declaration"));
            }
            if init.is_none() && !matches!(pattern, Pattern::Ident { .. }) {
                return Err(self.error("missing initializer in destructuring declaration"));
            }
            let span = pattern.span();
            declarations.push(Declarator {
                pattern,
                type_expr,
                init,
                span,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.eat_semi();

        Ok(Statement {
            span: token.span.merge(&self.prev_span()),
            kind: StmtKind::VarDecl { kind, declarations },
        })
    }

    pub(crate) fn parse_pattern(&mut self) -> Result<Pattern, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::LBracket) => self.parse_array_pattern(),
            Some(TokenKind::LBrace) => self.parse_object_pattern(),
            _ => {
                let (name, span) = self.expect_ident()?;
                Ok(Pattern::Ident { name, span })
            }
        }
    }

    fn parse_array_pattern(&mut self) -> Result<Pattern, ParseError> {
        let start = self.expect(TokenKind::LBracket)?.span;
        let mut elements = vec![];

        loop {
            if self.check(&TokenKind::RBracket) {
                break;
            }
            if self.eat(&TokenKind::Comma) {
                elements.push(None);
                continue;
            }
            let rest = self.eat(&TokenKind::Ellipsis);
            let pattern = self.parse_pattern()?;
            let default = if !rest && self.eat(&TokenKind::Eq) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            elements.push(Some(ArrayPatternElement {
                pattern,
                default,
                rest,
            }));
            if rest && !self.check(&TokenKind::RBracket) {
                return Err(self.error("rest element must be the last element"));
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(TokenKind::RBracket)?.span;

        Ok(Pattern::Array {
            elements,
            span: start.merge(&end),
        })
    }

    fn parse_object_pattern(&mut self) -> Result<Pattern, ParseError> {
        let start = self.expect(TokenKind::LBrace)?.span;
        let mut props = vec![];
        let mut rest = None;

        loop {
            if self.check(&TokenKind::RBrace) {
                break;
            }
            if self.eat(&TokenKind::Ellipsis) {
                let (name, _) = self.expect_ident()?;
                rest = Some(name);
                if !self.check(&TokenKind::RBrace) {
                    return Err(self.error("rest element must be the last element"));
                }
                break;
            }
            let (key, key_span) = self.expect_property_name()?;
            let value = if self.eat(&TokenKind::Colon) {
                self.parse_pattern()?
            } else {
                Pattern::Ident {
                    name: key.clone(),
                    span: key_span,
                }
            };
            let default = if self.eat(&TokenKind::Eq) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            props.push(ObjectPatternProp {
                key,
                value,
                default,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(TokenKind::RBrace)?.span;

        Ok(Pattern::Object {
            props,
            rest,
            span: start.merge(&end),
        })
    }

    // -- functions ---------------------------------------------------------

    /// Parse the remainder of a function after `function` (and `async`)
    /// have been consumed.
    pub(crate) fn parse_function_rest(
        &mut self,
        is_async: bool,
        require_name: bool,
    ) -> Result<FunctionLit, ParseError> {
        let start = self.prev_span();
        let is_generator = self.eat(&TokenKind::Star);
        let name = if let Some(TokenKind::Ident(_)) = self.peek_kind() {
            Some(self.expect_ident()?.0)
        } else if require_name {
            return Err(self.error("expected a function name"));
        } else {
            None
        };

        let type_params = self.parse_type_params()?;
        let params = self.parse_params()?;
        let return_type = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };

        // a declaration without a body is an overload signature
        if require_name && !self.check(&TokenKind::LBrace) {
            self.eat_semi();
            return Ok(FunctionLit {
                name,
                type_params,
                params,
                return_type,
                body: FunctionBody::Block(vec![]),
                is_async,
                is_generator,
                is_arrow: false,
                strict: self.strict,
                is_signature: true,
                span: start.merge(&self.prev_span()),
            });
        }

        let body = self.parse_function_block(is_generator, is_async, &params)?;
        let strict = self.strict || matches!(&body, FunctionBody::Block(stmts) if block_is_strict(stmts));

        Ok(FunctionLit {
            name,
            type_params,
            params,
            return_type,
            body,
            is_async,
            is_generator,
            is_arrow: false,
            strict,
            is_signature: false,
            span: start.merge(&self.prev_span()),
        })
    }

    /// Parse a `{ … }` function body, handling directive-prologue strictness
    /// and strict-mode parameter validation.
    pub(crate) fn parse_function_block(
        &mut self,
        is_generator: bool,
        is_async: bool,
        params: &[Param],
    ) -> Result<FunctionBody, ParseError> {
        self.expect(TokenKind::LBrace)?;
        let outer_strict = self.strict;
        self.fn_stack.push(FnCtx {
            is_generator,
            is_async,
        });
        let result = self.parse_block_body(true);
        self.fn_stack.pop();
        let strict = self.strict;
        self.strict = outer_strict;
        let body = result?;
        self.expect(TokenKind::RBrace)?;

        if strict {
            let mut names = vec![];
            for param in params {
                param.pattern.bound_names(&mut names);
            }
            for (i, name) in names.iter().enumerate() {
                if names[..i].contains(name) {
                    return Err(self.error(format!("duplicate parameter name '{name}'")));
                }
            }
        }

        Ok(FunctionBody::Block(body))
    }

    pub(crate) fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut params: Vec<Param> = vec![];

        loop {
            if self.check(&TokenKind::RParen) {
                break;
            }
            let rest = self.eat(&TokenKind::Ellipsis);
            let pattern = self.parse_pattern()?;
            let optional = self.eat(&TokenKind::Question);
            let type_expr = if self.eat(&TokenKind::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            let default = if self.eat(&TokenKind::Eq) {
                Some(self.parse_assignment()?)
            } else {
                None
            };

            if rest && (optional || default.is_some()) {
                return Err(self.error("a rest parameter cannot be optional or have a default"));
            }
            if !rest && !optional && default.is_none() {
                if let Some(previous) = params.last() {
                    if previous.optional {
                        return Err(
                            self.error("a required parameter cannot follow an optional parameter")
                        );
                    }
                }
            }

            params.push(Param {
                pattern,
                type_expr,
                default,
                optional,
                rest,
            });
            if rest && !self.check(&TokenKind::RParen) {
                return Err(self.error("a rest parameter must be the last parameter"));
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;

        Ok(params)
    }

    // -- control flow ------------------------------------------------------

    fn parse_if(&mut self) -> Result<Statement, ParseError> {
        let start = self.advance().unwrap().span;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        let then = Box::new(self.parse_statement()?);
        let otherwise = if self.eat(&TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Statement {
            span: start.merge(&self.prev_span()),
            kind: StmtKind::If {
                cond,
                then,
                otherwise,
            },
        })
    }

    fn parse_while(&mut self) -> Result<Statement, ParseError> {
        let start = self.advance().unwrap().span;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Statement {
            span: start.merge(&self.prev_span()),
            kind: StmtKind::While { cond, body },
        })
    }

    fn parse_for(&mut self) -> Result<Statement, ParseError> {
        let start = self.advance().unwrap().span;
        self.expect(TokenKind::LParen)?;

        let decl_kind = match self.peek_kind() {
            Some(TokenKind::Let) => Some(DeclKind::Let),
            Some(TokenKind::Const) => Some(DeclKind::Const),
            Some(TokenKind::Var) => Some(DeclKind::Var),
            _ => None,
        };

        // for-of / for-in
        let state = self.save();
        if decl_kind.is_some() || matches!(self.peek_kind(), Some(TokenKind::Ident(_))) {
            if decl_kind.is_some() {
                self.advance();
            }
            if let Ok(pattern) = self.parse_pattern() {
                if self.eat_ident("of") {
                    let iterable = self.parse_assignment()?;
                    self.expect(TokenKind::RParen)?;
                    let body = Box::new(self.parse_statement()?);
                    return Ok(Statement {
                        span: start.merge(&self.prev_span()),
                        kind: StmtKind::ForOf {
                            decl_kind,
                            pattern,
                            iterable,
                            body,
                        },
                    });
                }
                if self.eat(&TokenKind::In) {
                    let Pattern::Ident { name, .. } = pattern else {
                        return Err(self.error("for-in requires a simple identifier binding"));
                    };
                    let object = self.parse_assignment()?;
                    self.expect(TokenKind::RParen)?;
                    let body = Box::new(self.parse_statement()?);
                    return Ok(Statement {
                        span: start.merge(&self.prev_span()),
                        kind: StmtKind::ForIn {
                            decl_kind,
                            name,
                            object,
                            body,
                        },
                    });
                }
            }
        }
        self.restore(state);

        // classic for
        let init = if self.eat(&TokenKind::Semicolon) {
            None
        } else if decl_kind.is_some() {
            Some(Box::new(self.parse_var_decl()?))
        } else {
            let expr = self.parse_expression()?;
            self.eat_semi();
            Some(Box::new(Statement {
                span: expr.span,
                kind: StmtKind::Expression(expr),
            }))
        };
        let test = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon)?;
        let update = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::RParen)?;
        let body = Box::new(self.parse_statement()?);

        Ok(Statement {
            span: start.merge(&self.prev_span()),
            kind: StmtKind::For {
                init,
                test,
                update,
                body,
            },
        })
    }

    fn parse_return(&mut self) -> Result<Statement, ParseError> {
        let token = self.advance().unwrap();
        let same_line = self
            .peek()
            .map(|next| next.span.start.0 == token.span.start.0)
            .unwrap_or(false);
        let argument = if same_line
            && !matches!(
                self.peek_kind(),
                Some(TokenKind::Semicolon | TokenKind::RBrace)
            ) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.eat_semi();
        Ok(Statement {
            span: token.span.merge(&self.prev_span()),
            kind: StmtKind::Return(argument),
        })
    }

    fn parse_try(&mut self) -> Result<Statement, ParseError> {
        let start = self.advance().unwrap().span;
        self.expect(TokenKind::LBrace)?;
        let block = self.parse_block_body(false)?;
        self.expect(TokenKind::RBrace)?;

        let catch = if self.eat(&TokenKind::Catch) {
            let param = if self.eat(&TokenKind::LParen) {
                let pattern = self.parse_pattern()?;
                // an annotation on the catch binding is accepted and ignored
                if self.eat(&TokenKind::Colon) {
                    self.parse_type()?;
                }
                self.expect(TokenKind::RParen)?;
                Some(pattern)
            } else {
                None
            };
            self.expect(TokenKind::LBrace)?;
            let body = self.parse_block_body(false)?;
            self.expect(TokenKind::RBrace)?;
            Some(CatchClause { param, body })
        } else {
            None
        };

        let finally = if self.eat(&TokenKind::Finally) {
            self.expect(TokenKind::LBrace)?;
            let body = self.parse_block_body(false)?;
            self.expect(TokenKind::RBrace)?;
            Some(body)
        } else {
            None
        };

        if catch.is_none() && finally.is_none() {
            return Err(self.error("missing catch or finally after try"));
        }

        Ok(Statement {
            span: start.merge(&self.prev_span()),
            kind: StmtKind::Try {
                block,
                catch,
                finally,
            },
        })
    }

    fn parse_switch(&mut self) -> Result<Statement, ParseError> {
        let start = self.advance().unwrap().span;
        self.expect(TokenKind::LParen)?;
        let discriminant = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::LBrace)?;

        let mut cases = vec![];
        while !self.check(&TokenKind::RBrace) {
            let test = if self.eat(&TokenKind::Case) {
                Some(self.parse_expression()?)
            } else if self.eat(&TokenKind::Default) {
                None
            } else {
                return Err(self.error("expected 'case' or 'default' in switch body"));
            };
            self.expect(TokenKind::Colon)?;
            let mut body = vec![];
            while !matches!(
                self.peek_kind(),
                None | Some(TokenKind::Case | TokenKind::Default | TokenKind::RBrace)
            ) {
                body.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        let end = self.expect(TokenKind::RBrace)?.span;

        Ok(Statement {
            span: start.merge(&end),
            kind: StmtKind::Switch {
                discriminant,
                cases,
            },
        })
    }

    fn parse_import(&mut self) -> Result<Statement, ParseError> {
        let start = self.advance().unwrap().span;
        self.expect(TokenKind::LBrace)?;
        let mut names = vec![];
        loop {
            if self.check(&TokenKind::RBrace) {
                break;
            }
            let (name, _) = self.expect_ident()?;
            let alias = if self.eat_ident("as") {
                Some(self.expect_ident()?.0)
            } else {
                None
            };
            names.push(ImportName { name, alias });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        if !self.eat_ident("from") {
            return Err(self.error("expected 'from' in import statement"));
        }
        let source = match self.peek_kind().cloned() {
            Some(TokenKind::Str { value, .. }) => {
                self.advance();
                value
            }
            _ => return Err(self.error("expected a module path string")),
        };
        self.eat_semi();

        Ok(Statement {
            span: start.merge(&self.prev_span()),
            kind: StmtKind::Import { names, source },
        })
    }

    // -- classes & interfaces ----------------------------------------------

    pub(crate) fn parse_class(&mut self, is_abstract: bool) -> Result<ClassDecl, ParseError> {
        let start = self.expect(TokenKind::Class)?.span;
        let name = if let Some(TokenKind::Ident(_)) = self.peek_kind() {
            Some(self.expect_ident()?.0)
        } else {
            None
        };
        let type_params = self.parse_type_params()?;

        let (superclass, super_type_args) = if self.eat(&TokenKind::Extends) {
            let expr = self.parse_lhs_expression()?;
            let args = self.try_parse_type_args().unwrap_or_default();
            (Some(expr), args)
        } else {
            (None, vec![])
        };

        let mut implements = vec![];
        if self.eat(&TokenKind::Implements) {
            loop {
                implements.push(self.parse_type_reference()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(TokenKind::LBrace)?;
        let mut members = vec![];
        while !self.check(&TokenKind::RBrace) {
            if self.eat(&TokenKind::Semicolon) {
                continue;
            }
            members.push(self.parse_class_member(is_abstract)?);
        }
        let end = self.expect(TokenKind::RBrace)?.span;

        Ok(ClassDecl {
            name,
            type_params,
            superclass,
            super_type_args,
            implements,
            is_abstract,
            members,
            span: start.merge(&end),
        })
    }

    fn parse_class_member(&mut self, class_is_abstract: bool) -> Result<ClassMember, ParseError> {
        let start = self.current_span();
        let mut access = Access::Public;
        let mut is_static = false;
        let mut is_abstract = false;
        let mut is_override = false;
        let mut is_readonly = false;
        let mut is_async = false;

        loop {
            let Some(TokenKind::Ident(word)) = self.peek_kind() else {
                break;
            };
            let is_modifier = matches!(
                word.as_str(),
                "public" | "private" | "protected" | "static" | "abstract" | "readonly"
                    | "override" | "async"
            );
            // a word is only a modifier when it does not itself start the
            // member (e.g. a field named `static`)
            let terminator = matches!(
                self.nth_kind(1),
                None | Some(
                    TokenKind::LParen
                        | TokenKind::Colon
                        | TokenKind::Eq
                        | TokenKind::Semicolon
                        | TokenKind::Lt
                        | TokenKind::Question
                        | TokenKind::RBrace
                )
            );
            if !is_modifier || terminator {
                break;
            }
            let word = word.clone();
            self.advance();
            match word.as_str() {
                "public" => access = Access::Public,
                "private" => access = Access::Private,
                "protected" => access = Access::Protected,
                "static" => is_static = true,
                "abstract" => is_abstract = true,
                "readonly" => is_readonly = true,
                "override" => is_override = true,
                "async" => is_async = true,
                _ => unreachable!(),
            }
        }

        if is_abstract && !class_is_abstract {
            return Err(self.error("abstract members are only allowed in abstract classes"));
        }

        // static initialization block
        if is_static && self.check(&TokenKind::LBrace) {
            self.advance();
            let body = self.parse_block_body(false)?;
            self.expect(TokenKind::RBrace)?;
            return Ok(ClassMember {
                name: String::new(),
                kind: ClassMemberKind::StaticBlock(body),
                is_static: true,
                access,
                is_abstract: false,
                is_override: false,
                is_readonly: false,
                span: start.merge(&self.prev_span()),
            });
        }

        // getter / setter
        for (word, is_getter) in [("get", true), ("set", false)] {
            if self.at_ident(word)
                && !matches!(
                    self.nth_kind(1),
                    None | Some(
                        TokenKind::LParen
                            | TokenKind::Colon
                            | TokenKind::Eq
                            | TokenKind::Semicolon
                            | TokenKind::Lt
                    )
                )
            {
                self.advance();
                let (name, _) = self.expect_property_name()?;
                let params = self.parse_params()?;
                let return_type = if self.eat(&TokenKind::Colon) {
                    Some(self.parse_type()?)
                } else {
                    None
                };
                let body = self.parse_function_block(false, false, &params)?;
                let strict = self.function_strictness(&body);
                let func = FunctionLit {
                    name: Some(name.clone()),
                    type_params: vec![],
                    params,
                    return_type,
                    body,
                    is_async: false,
                    is_generator: false,
                    is_arrow: false,
                    strict,
                    is_signature: false,
                    span: start.merge(&self.prev_span()),
                };
                return Ok(ClassMember {
                    name,
                    kind: if is_getter {
                        ClassMemberKind::Getter(func)
                    } else {
                        ClassMemberKind::Setter(func)
                    },
                    is_static,
                    access,
                    is_abstract: false,
                    is_override,
                    is_readonly: false,
                    span: start.merge(&self.prev_span()),
                });
            }
        }

        let is_generator = self.eat(&TokenKind::Star);
        let (name, _) = self.expect_property_name()?;

        if self.check(&TokenKind::LParen) || self.check(&TokenKind::Lt) {
            let type_params = self.parse_type_params()?;
            let params = self.parse_params()?;
            let return_type = if self.eat(&TokenKind::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };

            if is_abstract {
                self.eat_semi();
                return Ok(ClassMember {
                    name,
                    kind: ClassMemberKind::AbstractMethod {
                        type_params,
                        params,
                        return_type,
                    },
                    is_static,
                    access,
                    is_abstract: true,
                    is_override,
                    is_readonly: false,
                    span: start.merge(&self.prev_span()),
                });
            }

            let body = self.parse_function_block(is_generator, is_async, &params)?;
            let strict = self.function_strictness(&body);
            let func = FunctionLit {
                name: Some(name.clone()),
                type_params,
                params,
                return_type,
                body,
                is_async,
                is_generator,
                is_arrow: false,
                strict,
                is_signature: false,
                span: start.merge(&self.prev_span()),
            };
            return Ok(ClassMember {
                name,
                kind: ClassMemberKind::Method(func),
                is_static,
                access,
                is_abstract: false,
                is_override,
                is_readonly: false,
                span: start.merge(&self.prev_span()),
            });
        }

        // field
        let type_expr = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.eat(&TokenKind::Eq) {
            Some(self.parse_assignment()?)
        } else {
            None
        };
        self.eat_semi();

        Ok(ClassMember {
            name,
            kind: ClassMemberKind::Field { type_expr, init },
            is_static,
            access,
            is_abstract,
            is_override,
            is_readonly,
            span: start.merge(&self.prev_span()),
        })
    }

    fn parse_interface(&mut self) -> Result<Statement, ParseError> {
        let start = self.advance().unwrap().span;
        let (name, _) = self.expect_ident()?;
        let type_params = self.parse_type_params()?;

        let mut extends = vec![];
        if self.eat(&TokenKind::Extends) {
            loop {
                extends.push(self.parse_type_reference()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(TokenKind::LBrace)?;
        let mut members = vec![];
        while !self.check(&TokenKind::RBrace) {
            if self.eat(&TokenKind::Semicolon) || self.eat(&TokenKind::Comma) {
                continue;
            }
            members.push(self.parse_interface_member()?);
        }
        let end = self.expect(TokenKind::RBrace)?.span;

        Ok(Statement {
            span: start.merge(&end),
            kind: StmtKind::InterfaceDecl(Box::new(InterfaceDecl {
                name,
                type_params,
                extends,
                members,
                span: start.merge(&end),
            })),
        })
    }

    fn parse_interface_member(&mut self) -> Result<InterfaceMember, ParseError> {
        if self.check(&TokenKind::LBracket) {
            let (key_name, key_type, value_type) = self.parse_index_signature()?;
            return Ok(InterfaceMember::Index {
                key_name,
                key_type,
                value_type,
            });
        }

        let (name, _) = self.expect_property_name()?;
        let optional = self.eat(&TokenKind::Question);

        if self.check(&TokenKind::LParen) || self.check(&TokenKind::Lt) {
            let type_params = self.parse_type_params()?;
            let params = self.parse_params()?;
            let return_type = if self.eat(&TokenKind::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            return Ok(InterfaceMember::Method {
                name,
                type_params,
                params,
                return_type,
                optional,
            });
        }

        self.expect(TokenKind::Colon)?;
        let type_expr = self.parse_type()?;
        Ok(InterfaceMember::Property {
            name,
            type_expr,
            optional,
        })
    }

    pub(crate) fn parse_index_signature(
        &mut self,
    ) -> Result<(String, IndexKeyType, TypeExpr), ParseError> {
        self.expect(TokenKind::LBracket)?;
        let (key_name, _) = self.expect_ident()?;
        self.expect(TokenKind::Colon)?;
        let (key_type_name, key_span) = self.expect_ident()?;
        let key_type = match key_type_name.as_str() {
            "string" => IndexKeyType::String,
            "number" => IndexKeyType::Number,
            "symbol" => IndexKeyType::Symbol,
            other => {
                return Err(ParseError {
                    message: format!("an index signature key must be string, number or symbol, not '{other}'"),
                    span: Some(key_span),
                })
            }
        };
        self.expect(TokenKind::RBracket)?;
        self.expect(TokenKind::Colon)?;
        let value_type = self.parse_type()?;
        Ok((key_name, key_type, value_type))
    }

    fn parse_type_alias(&mut self) -> Result<Statement, ParseError> {
        let start = self.advance().unwrap().span; // `type`
        let (name, _) = self.expect_ident()?;
        let type_params = self.parse_type_params()?;
        self.expect(TokenKind::Eq)?;
        let type_expr = self.parse_type()?;
        self.eat_semi();
        Ok(Statement {
            span: start.merge(&self.prev_span()),
            kind: StmtKind::TypeAlias {
                name,
                type_params,
                type_expr,
            },
        })
    }

    // -- type annotations --------------------------------------------------

    pub(crate) fn parse_type_params(&mut self) -> Result<Vec<TypeParam>, ParseError> {
        if !self.eat(&TokenKind::Lt) {
            return Ok(vec![]);
        }
        let mut params = vec![];
        loop {
            let (name, span) = self.expect_ident()?;
            let constraint = if self.eat(&TokenKind::Extends) {
                Some(self.parse_type()?)
            } else {
                None
            };
            params.push(TypeParam {
                name,
                constraint,
                span,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Gt)?;
        Ok(params)
    }

    /// `Name<Args>` as used by `implements` and interface `extends`.
    fn parse_type_reference(&mut self) -> Result<TypeExpr, ParseError> {
        let (name, span) = self.expect_ident()?;
        let args = if self.check(&TokenKind::Lt) {
            self.parse_type_args()?
        } else {
            vec![]
        };
        Ok(TypeExpr {
            kind: TypeExprKind::Named { name, args },
            span: span.merge(&self.prev_span()),
        })
    }

    fn parse_type_args(&mut self) -> Result<Vec<TypeExpr>, ParseError> {
        self.expect(TokenKind::Lt)?;
        let mut args = vec![];
        loop {
            args.push(self.parse_type()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Gt)?;
        Ok(args)
    }

    pub(crate) fn try_parse_type_args(&mut self) -> Option<Vec<TypeExpr>> {
        if !self.check(&TokenKind::Lt) {
            return None;
        }
        let state = self.save();
        match self.parse_type_args() {
            Ok(args) => Some(args),
            Err(_) => {
                self.restore(state);
                None
            }
        }
    }

    pub(crate) fn parse_type(&mut self) -> Result<TypeExpr, ParseError> {
        // a leading `|` is tolerated: `type T = | A | B`
        self.eat(&TokenKind::Pipe);
        let first = self.parse_intersection_type()?;
        if !self.check(&TokenKind::Pipe) {
            return Ok(first);
        }
        let mut arms = vec![first];
        while self.eat(&TokenKind::Pipe) {
            arms.push(self.parse_intersection_type()?);
        }
        let span = arms[0].span.merge(&arms[arms.len() - 1].span);
        Ok(TypeExpr {
            kind: TypeExprKind::Union(arms),
            span,
        })
    }

    fn parse_intersection_type(&mut self) -> Result<TypeExpr, ParseError> {
        let first = self.parse_postfix_type()?;
        if !self.check(&TokenKind::Amp) {
            return Ok(first);
        }
        let mut arms = vec![first];
        while self.eat(&TokenKind::Amp) {
            arms.push(self.parse_postfix_type()?);
        }
        let span = arms[0].span.merge(&arms[arms.len() - 1].span);
        Ok(TypeExpr {
            kind: TypeExprKind::Intersection(arms),
            span,
        })
    }

    fn parse_postfix_type(&mut self) -> Result<TypeExpr, ParseError> {
        let mut ty = self.parse_primary_type()?;
        while self.check(&TokenKind::LBracket) {
            self.advance();
            if self.eat(&TokenKind::RBracket) {
                let span = ty.span.merge(&self.prev_span());
                ty = TypeExpr {
                    kind: TypeExprKind::Array(Box::new(ty)),
                    span,
                };
            } else {
                let index = self.parse_type()?;
                self.expect(TokenKind::RBracket)?;
                let span = ty.span.merge(&self.prev_span());
                ty = TypeExpr {
                    kind: TypeExprKind::IndexAccess(Box::new(ty), Box::new(index)),
                    span,
                };
            }
        }
        Ok(ty)
    }

    fn parse_primary_type(&mut self) -> Result<TypeExpr, ParseError> {
        let Some(token) = self.peek().cloned() else {
            return Err(ParseError::eof("a type"));
        };
        let span = token.span;

        match &token.kind {
            TokenKind::Ident(name) if name == "keyof" => {
                self.advance();
                let operand = self.parse_postfix_type()?;
                let span = span.merge(&operand.span);
                Ok(TypeExpr {
                    kind: TypeExprKind::KeyOf(Box::new(operand)),
                    span,
                })
            }
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                let args = if self.check(&TokenKind::Lt) {
                    self.parse_type_args()?
                } else {
                    vec![]
                };
                Ok(TypeExpr {
                    kind: TypeExprKind::Named { name, args },
                    span: span.merge(&self.prev_span()),
                })
            }
            TokenKind::Null => {
                self.advance();
                Ok(TypeExpr {
                    kind: TypeExprKind::Named {
                        name: "null".into(),
                        args: vec![],
                    },
                    span,
                })
            }
            TokenKind::Undefined => {
                self.advance();
                Ok(TypeExpr {
                    kind: TypeExprKind::Named {
                        name: "undefined".into(),
                        args: vec![],
                    },
                    span,
                })
            }
            TokenKind::Void => {
                self.advance();
                Ok(TypeExpr {
                    kind: TypeExprKind::Named {
                        name: "void".into(),
                        args: vec![],
                    },
                    span,
                })
            }
            TokenKind::Str { value, .. } => {
                let value = value.clone();
                self.advance();
                Ok(TypeExpr {
                    kind: TypeExprKind::StringLit(value),
                    span,
                })
            }
            TokenKind::Number { value, .. } => {
                let value = *value;
                self.advance();
                Ok(TypeExpr {
                    kind: TypeExprKind::NumberLit(value),
                    span,
                })
            }
            TokenKind::Minus => {
                self.advance();
                match self.peek_kind().cloned() {
                    Some(TokenKind::Number { value, .. }) => {
                        self.advance();
                        Ok(TypeExpr {
                            kind: TypeExprKind::NumberLit(-value),
                            span: span.merge(&self.prev_span()),
                        })
                    }
                    _ => Err(self.error("expected a number literal after '-' in a type")),
                }
            }
            TokenKind::True => {
                self.advance();
                Ok(TypeExpr {
                    kind: TypeExprKind::BoolLit(true),
                    span,
                })
            }
            TokenKind::False => {
                self.advance();
                Ok(TypeExpr {
                    kind: TypeExprKind::BoolLit(false),
                    span,
                })
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = vec![];
                while !self.check(&TokenKind::RBracket) {
                    elements.push(self.parse_type()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                let end = self.expect(TokenKind::RBracket)?.span;
                Ok(TypeExpr {
                    kind: TypeExprKind::Tuple(elements),
                    span: span.merge(&end),
                })
            }
            TokenKind::LBrace => self.parse_object_type(),
            TokenKind::LParen => {
                // function type or parenthesized type
                let state = self.save();
                match self.parse_function_type() {
                    Ok(ty) => Ok(ty),
                    Err(_) => {
                        self.restore(state);
                        self.advance();
                        let inner = self.parse_type()?;
                        self.expect(TokenKind::RParen)?;
                        Ok(inner)
                    }
                }
            }
            TokenKind::Lt => {
                let type_params = self.parse_type_params()?;
                let params = self.parse_params()?;
                self.expect(TokenKind::Arrow)?;
                let return_type = self.parse_type()?;
                let span = span.merge(&return_type.span);
                Ok(TypeExpr {
                    kind: TypeExprKind::Function {
                        type_params,
                        params,
                        return_type: Box::new(return_type),
                    },
                    span,
                })
            }
            other => Err(ParseError {
                message: format!("expected a type but found {other}"),
                span: Some(span),
            }),
        }
    }

    fn parse_function_type(&mut self) -> Result<TypeExpr, ParseError> {
        let start = self.current_span();
        let params = self.parse_params()?;
        self.expect(TokenKind::Arrow)?;
        let return_type = self.parse_type()?;
        let span = start.merge(&return_type.span);
        Ok(TypeExpr {
            kind: TypeExprKind::Function {
                type_params: vec![],
                params,
                return_type: Box::new(return_type),
            },
            span,
        })
    }

    fn parse_object_type(&mut self) -> Result<TypeExpr, ParseError> {
        let start = self.expect(TokenKind::LBrace)?.span;
        let mut members = vec![];

        while !self.check(&TokenKind::RBrace) {
            if self.eat(&TokenKind::Semicolon) || self.eat(&TokenKind::Comma) {
                continue;
            }
            if self.check(&TokenKind::LBracket) {
                let (key_name, key_type, value_type) = self.parse_index_signature()?;
                members.push(ObjectTypeMember::Index {
                    key_name,
                    key_type,
                    value_type,
                });
                continue;
            }
            let (name, _) = self.expect_property_name()?;
            let optional = self.eat(&TokenKind::Question);
            self.expect(TokenKind::Colon)?;
            let type_expr = self.parse_type()?;
            members.push(ObjectTypeMember::Property {
                name,
                type_expr,
                optional,
            });
        }
        let end = self.expect(TokenKind::RBrace)?.span;

        Ok(TypeExpr {
            kind: TypeExprKind::Object(members),
            span: start.merge(&end),
        })
    }
}

fn block_is_strict(stmts: &[Statement]) -> bool {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Expression(Expression {
                kind: ExprKind::Str(value),
                ..
            }) => {
                if value == "use strict" {
                    return true;
                }
            }
            _ => break,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::ast::{ExprKind, Pattern, StmtKind};
    use super::parse;

    #[test]
    fn test_parse_let_declaration_with_annotation() {
        let program = parse("let x: number = 10 + 5;").unwrap();
        assert_eq!(program.body.len(), 1);
        let StmtKind::VarDecl { declarations, .. } = &program.body[0].kind else {
            panic!("expected a declaration");
        };
        assert!(matches!(
            &declarations[0].pattern,
            Pattern::Ident { name, .. } if name == "x"
        ));
        assert!(declarations[0].type_expr.is_some());
    }

    #[test]
    fn test_directive_prologue_activates_strict_mode() {
        assert!(parse("\"use strict\";\nlet x = 1;").unwrap().strict);
        assert!(parse("\"use strict\"\nlet x = 1;").unwrap().strict);
        assert!(!parse("let x = \"use strict\";").unwrap().strict);
    }

    #[test]
    fn test_strict_mode_rejects_legacy_octal() {
        assert!(parse("let x = 0777;").is_ok());
        let error = parse("\"use strict\";\nlet x = 0777;").unwrap_err();
        assert!(error.message.contains("octal"), "{error}");
        let error = parse("\"use strict\";\nlet s = \"a\\1\";").unwrap_err();
        assert!(error.message.contains("octal"), "{error}");
    }

    #[test]
    fn test_strict_mode_rejects_duplicate_parameters() {
        assert!(parse("function f(a, a) { return a; }").is_ok());
        let error = parse("function f(a, a) { \"use strict\"; return a; }").unwrap_err();
        assert!(error.message.contains("duplicate"), "{error}");
    }

    #[test]
    fn test_strict_mode_rejects_eval_assignment_and_bare_delete() {
        let error = parse("\"use strict\";\neval = 1;").unwrap_err();
        assert!(error.message.contains("eval"), "{error}");
        let error = parse("\"use strict\";\nlet x = 1;\ndelete x;").unwrap_err();
        assert!(error.message.contains("delete"), "{error}");
    }

    #[test]
    fn test_required_parameter_cannot_follow_optional() {
        let error = parse("function f(a?: number, b: number) {}").unwrap_err();
        assert!(error.message.contains("optional"), "{error}");
    }

    #[test]
    fn test_rest_element_must_be_last() {
        let error = parse("function f(...rest: number[], tail: number) {}").unwrap_err();
        assert!(error.message.contains("rest"), "{error}");
        let error = parse("let [...rest, last] = [1, 2];").unwrap_err();
        assert!(error.message.contains("rest"), "{error}");
    }

    #[test]
    fn test_array_pattern_holes_are_preserved() {
        let program = parse("let [a, , b] = [1, 2, 3];").unwrap();
        let StmtKind::VarDecl { declarations, .. } = &program.body[0].kind else {
            panic!("expected a declaration");
        };
        let Pattern::Array { elements, .. } = &declarations[0].pattern else {
            panic!("expected an array pattern");
        };
        assert_eq!(elements.len(), 3);
        assert!(elements[0].is_some());
        assert!(elements[1].is_none());
        assert!(elements[2].is_some());
    }

    #[test]
    fn test_yield_requires_a_generator() {
        assert!(parse("function f() { yield 1; }").is_err());
        assert!(parse("function* g() { yield 1; }").is_ok());
    }

    #[test]
    fn test_await_requires_an_async_function() {
        assert!(parse("function f() { await 1; }").is_err());
        assert!(parse("async function f() { await 1; }").is_ok());
    }

    #[test]
    fn test_arrow_functions_and_grouping_disambiguate() {
        let program = parse("const f = (a: number) => a + 1; const g = (1 + 2);").unwrap();
        let StmtKind::VarDecl { declarations, .. } = &program.body[0].kind else {
            panic!("expected a declaration");
        };
        assert!(matches!(
            declarations[0].init.as_ref().unwrap().kind,
            ExprKind::Arrow(_)
        ));
        let StmtKind::VarDecl { declarations, .. } = &program.body[1].kind else {
            panic!("expected a declaration");
        };
        assert!(matches!(
            declarations[0].init.as_ref().unwrap().kind,
            ExprKind::Grouping(_)
        ));
    }

    #[test]
    fn test_triple_slash_references_ride_the_side_channel() {
        let program = parse("/// <reference path=\"./dep.ts\" />\nlet x = 1;").unwrap();
        assert_eq!(program.references.len(), 1);
        assert_eq!(program.references[0].path, "./dep.ts");
    }

    #[test]
    fn test_module_classification() {
        assert!(parse("export const x: number = 1;").unwrap().is_module());
        assert!(parse("import { x } from \"./dep\";").unwrap().is_module());
        assert!(!parse("const x: number = 1;").unwrap().is_module());
    }
}

pub(crate) fn keyword_text(kind: &TokenKind) -> Option<&'static str> {
    use TokenKind::*;
    Some(match kind {
        Let => "let",
        Const => "const",
        Var => "var",
        Function => "function",
        Class => "class",
        Interface => "interface",
        Extends => "extends",
        Implements => "implements",
        New => "new",
        Return => "return",
        If => "if",
        Else => "else",
        While => "while",
        For => "for",
        In => "in",
        Break => "break",
        Continue => "continue",
        Switch => "switch",
        Case => "case",
        Default => "default",
        Throw => "throw",
        Try => "try",
        Catch => "catch",
        Finally => "finally",
        Import => "import",
        Export => "export",
        This => "this",
        Super => "super",
        Null => "null",
        Undefined => "undefined",
        True => "true",
        False => "false",
        Typeof => "typeof",
        Instanceof => "instanceof",
        Delete => "delete",
        Void => "void",
        Yield => "yield",
        Await => "await",
        _ => return None,
    })
}

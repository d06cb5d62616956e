//! Expression parsing: a Pratt-style precedence ladder on top of the
//! token cursor in [`super::Parser`].

use crate::lexer::{TemplatePart, Token, TokenKind};

use super::ast::*;
use super::{FnCtx, ParseError, Parser};

impl Parser {
    pub(crate) fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_assignment()
    }

    pub(crate) fn parse_assignment(&mut self) -> Result<Expression, ParseError> {
        if self.check(&TokenKind::Yield) && self.in_generator() {
            return self.parse_yield();
        }

        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }

        let lhs = self.parse_conditional()?;

        let op = match self.peek_kind() {
            Some(TokenKind::Eq) => AssignOp::Assign,
            Some(TokenKind::PlusEq) => AssignOp::Add,
            Some(TokenKind::MinusEq) => AssignOp::Sub,
            Some(TokenKind::StarEq) => AssignOp::Mul,
            Some(TokenKind::SlashEq) => AssignOp::Div,
            Some(TokenKind::PercentEq) => AssignOp::Rem,
            _ => return Ok(lhs),
        };
        self.advance();

        match &lhs.kind {
            ExprKind::Ident(name) => {
                if self.strict && (name == "eval" || name == "arguments") {
                    return Err(ParseError {
                        message: format!("cannot assign to '{name}' in strict mode"),
                        span: Some(lhs.span),
                    });
                }
            }
            ExprKind::Member { .. } => {}
            _ => {
                return Err(ParseError {
                    message: "invalid assignment target".into(),
                    span: Some(lhs.span),
                })
            }
        }

        let value = self.parse_assignment()?;
        let span = lhs.span.merge(&value.span);
        Ok(self.mk_expr(
            ExprKind::Assign {
                op,
                target: Box::new(lhs),
                value: Box::new(value),
            },
            span,
        ))
    }

    fn parse_yield(&mut self) -> Result<Expression, ParseError> {
        let token = self.expect(TokenKind::Yield)?;
        let delegate = self.eat(&TokenKind::Star);

        let same_line = self
            .peek()
            .map(|next| next.span.start.0 == token.span.start.0)
            .unwrap_or(false);
        let has_argument = delegate
            || (same_line
                && !matches!(
                    self.peek_kind(),
                    None | Some(
                        TokenKind::Semicolon
                            | TokenKind::RParen
                            | TokenKind::RBracket
                            | TokenKind::RBrace
                            | TokenKind::Comma
                            | TokenKind::Colon
                    )
                ));

        let argument = if has_argument {
            Some(Box::new(self.parse_assignment()?))
        } else {
            None
        };
        let span = token
            .span
            .merge(&argument.as_ref().map(|a| a.span).unwrap_or(token.span));
        Ok(self.mk_expr(ExprKind::Yield { argument, delegate }, span))
    }

    /// Attempt to parse an arrow function from the current position,
    /// restoring the cursor when it turns out not to be one.
    fn try_parse_arrow(&mut self) -> Result<Option<Expression>, ParseError> {
        let state = self.save();
        let start = self.current_span();

        let is_async = self.at_ident("async")
            && matches!(
                self.nth_kind(1),
                Some(TokenKind::LParen | TokenKind::Ident(_))
            )
            && !matches!(self.nth_kind(1), Some(TokenKind::Ident(n)) if n == "async");
        if is_async {
            self.advance();
        }

        let params = match self.peek_kind() {
            Some(TokenKind::Ident(_)) => {
                let (name, span) = self.expect_ident()?;
                vec![Param {
                    pattern: Pattern::Ident { name, span },
                    type_expr: None,
                    default: None,
                    optional: false,
                    rest: false,
                }]
            }
            Some(TokenKind::LParen) => match self.parse_params() {
                Ok(params) => params,
                Err(_) => {
                    self.restore(state);
                    return Ok(None);
                }
            },
            _ => {
                self.restore(state);
                return Ok(None);
            }
        };

        let return_type = if self.check(&TokenKind::Colon) {
            let checkpoint = self.save();
            self.advance();
            match self.parse_type() {
                Ok(ty) => Some(ty),
                Err(_) => {
                    self.restore(checkpoint);
                    None
                }
            }
        } else {
            None
        };

        if !self.eat(&TokenKind::Arrow) {
            self.restore(state);
            return Ok(None);
        }

        self.fn_stack.push(FnCtx {
            is_generator: false,
            is_async,
        });
        let body = if self.check(&TokenKind::LBrace) {
            self.advance();
            let outer_strict = self.strict;
            let stmts = self.parse_block_body(true);
            self.strict = outer_strict;
            let stmts = match stmts {
                Ok(stmts) => stmts,
                Err(e) => {
                    self.fn_stack.pop();
                    return Err(e);
                }
            };
            if let Err(e) = self.expect(TokenKind::RBrace) {
                self.fn_stack.pop();
                return Err(e);
            }
            FunctionBody::Block(stmts)
        } else {
            match self.parse_assignment() {
                Ok(expr) => FunctionBody::Expr(Box::new(expr)),
                Err(e) => {
                    self.fn_stack.pop();
                    return Err(e);
                }
            }
        };
        self.fn_stack.pop();

        let strict = self.function_strictness(&body);
        let span = start.merge(&self.prev_span());
        let func = FunctionLit {
            name: None,
            type_params: vec![],
            params,
            return_type,
            body,
            is_async,
            is_generator: false,
            is_arrow: true,
            strict,
            is_signature: false,
            span,
        };
        Ok(Some(self.mk_expr(ExprKind::Arrow(Box::new(func)), span)))
    }

    fn parse_conditional(&mut self) -> Result<Expression, ParseError> {
        let cond = self.parse_nullish()?;
        if !self.eat(&TokenKind::Question) {
            return Ok(cond);
        }
        let then = self.parse_assignment()?;
        self.expect(TokenKind::Colon)?;
        let otherwise = self.parse_assignment()?;
        let span = cond.span.merge(&otherwise.span);
        Ok(self.mk_expr(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            span,
        ))
    }

    fn parse_nullish(&mut self) -> Result<Expression, ParseError> {
        let mut lhs = self.parse_logical_or()?;
        while self.eat(&TokenKind::QuestionQuestion) {
            let rhs = self.parse_logical_or()?;
            let span = lhs.span.merge(&rhs.span);
            lhs = self.mk_expr(
                ExprKind::Logical {
                    op: LogicalOp::Nullish,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn parse_logical_or(&mut self) -> Result<Expression, ParseError> {
        let mut lhs = self.parse_logical_and()?;
        while self.eat(&TokenKind::PipePipe) {
            let rhs = self.parse_logical_and()?;
            let span = lhs.span.merge(&rhs.span);
            lhs = self.mk_expr(
                ExprKind::Logical {
                    op: LogicalOp::Or,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn parse_logical_and(&mut self) -> Result<Expression, ParseError> {
        let mut lhs = self.parse_equality()?;
        while self.eat(&TokenKind::AmpAmp) {
            let rhs = self.parse_equality()?;
            let span = lhs.span.merge(&rhs.span);
            lhs = self.mk_expr(
                ExprKind::Logical {
                    op: LogicalOp::And,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expression, ParseError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::EqEq) => BinaryOp::EqLoose,
                Some(TokenKind::NotEq) => BinaryOp::NeqLoose,
                Some(TokenKind::EqEqEq) => BinaryOp::EqStrict,
                Some(TokenKind::NotEqEq) => BinaryOp::NeqStrict,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_relational()?;
            let span = lhs.span.merge(&rhs.span);
            lhs = self.mk_expr(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
    }

    fn parse_relational(&mut self) -> Result<Expression, ParseError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Lt) => BinaryOp::Lt,
                Some(TokenKind::LtEq) => BinaryOp::LtEq,
                Some(TokenKind::Gt) => BinaryOp::Gt,
                Some(TokenKind::GtEq) => BinaryOp::GtEq,
                Some(TokenKind::Instanceof) => BinaryOp::Instanceof,
                Some(TokenKind::In) => BinaryOp::In,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_additive()?;
            let span = lhs.span.merge(&rhs.span);
            lhs = self.mk_expr(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
    }

    fn parse_additive(&mut self) -> Result<Expression, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            let span = lhs.span.merge(&rhs.span);
            lhs = self.mk_expr(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                Some(TokenKind::Percent) => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            let span = lhs.span.merge(&rhs.span);
            lhs = self.mk_expr(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        let Some(token) = self.peek().cloned() else {
            return Err(ParseError::eof("an expression"));
        };
        let span = token.span;

        let op = match &token.kind {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Minus),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Typeof => Some(UnaryOp::Typeof),
            TokenKind::Void => Some(UnaryOp::Void),
            TokenKind::Delete => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            if op == UnaryOp::Delete && self.strict {
                if let ExprKind::Ident(name) = &operand.kind {
                    return Err(ParseError {
                        message: format!(
                            "cannot delete unqualified identifier '{name}' in strict mode"
                        ),
                        span: Some(span.merge(&operand.span)),
                    });
                }
            }
            let span = span.merge(&operand.span);
            return Ok(self.mk_expr(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            ));
        }

        if token.kind == TokenKind::Await {
            if !self.in_async() {
                return Err(ParseError {
                    message: "'await' is only allowed inside async functions".into(),
                    span: Some(span),
                });
            }
            self.advance();
            let operand = self.parse_unary()?;
            let span = span.merge(&operand.span);
            return Ok(self.mk_expr(ExprKind::Await(Box::new(operand)), span));
        }

        if matches!(token.kind, TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let increment = token.kind == TokenKind::PlusPlus;
            self.advance();
            let target = self.parse_unary()?;
            self.check_update_target(&target)?;
            let span = span.merge(&target.span);
            return Ok(self.mk_expr(
                ExprKind::Update {
                    prefix: true,
                    increment,
                    target: Box::new(target),
                },
                span,
            ));
        }

        self.parse_postfix()
    }

    fn check_update_target(&self, target: &Expression) -> Result<(), ParseError> {
        match &target.kind {
            ExprKind::Ident(_) | ExprKind::Member { .. } => Ok(()),
            _ => Err(ParseError {
                message: "invalid increment/decrement target".into(),
                span: Some(target.span),
            }),
        }
    }

    /// Postfix operators: `++`/`--`, `as T` assertions.
    fn parse_postfix(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_call_member()?;

        loop {
            match self.peek_kind() {
                Some(TokenKind::PlusPlus | TokenKind::MinusMinus) => {
                    let increment = self.peek_kind() == Some(&TokenKind::PlusPlus);
                    // a postfix operator must stay on the operand's line
                    let same_line = self
                        .peek()
                        .map(|t| t.span.start.0 == expr.span.end.0)
                        .unwrap_or(false);
                    if !same_line {
                        return Ok(expr);
                    }
                    self.advance();
                    self.check_update_target(&expr)?;
                    let span = expr.span.merge(&self.prev_span());
                    expr = self.mk_expr(
                        ExprKind::Update {
                            prefix: false,
                            increment,
                            target: Box::new(expr),
                        },
                        span,
                    );
                }
                Some(TokenKind::Ident(name)) if name == "as" => {
                    self.advance();
                    let type_expr = self.parse_type()?;
                    let span = expr.span.merge(&type_expr.span);
                    expr = self.mk_expr(
                        ExprKind::TypeAssertion {
                            expr: Box::new(expr),
                            type_expr,
                        },
                        span,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Member access, calls and non-null assertions, left to right.
    pub(crate) fn parse_call_member(&mut self) -> Result<Expression, ParseError> {
        let mut expr = if self.check(&TokenKind::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };

        loop {
            match self.peek_kind() {
                Some(TokenKind::Dot) => {
                    self.advance();
                    let (name, span) = self.expect_property_name()?;
                    let full = expr.span.merge(&span);
                    expr = self.mk_expr(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property: MemberKey::Dot(name),
                        },
                        full,
                    );
                }
                Some(TokenKind::LBracket) => {
                    self.advance();
                    let index = self.parse_expression()?;
                    let end = self.expect(TokenKind::RBracket)?.span;
                    let full = expr.span.merge(&end);
                    expr = self.mk_expr(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property: MemberKey::Bracket(Box::new(index)),
                        },
                        full,
                    );
                }
                Some(TokenKind::LParen) => {
                    let args = self.parse_arguments()?;
                    let full = expr.span.merge(&self.prev_span());
                    expr = self.mk_expr(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        full,
                    );
                }
                Some(TokenKind::Bang) => {
                    // non-null assertion binds to the expression just parsed
                    self.advance();
                    let full = expr.span.merge(&self.prev_span());
                    expr = self.mk_expr(ExprKind::NonNull(Box::new(expr)), full);
                }
                Some(TokenKind::Lt) => {
                    // explicit call type arguments: `f<T>(…)`. Resolution is
                    // inference-driven, but the arguments must still parse.
                    let state = self.save();
                    if self.try_parse_type_args().is_some() && self.check(&TokenKind::LParen) {
                        let args = self.parse_arguments()?;
                        let full = expr.span.merge(&self.prev_span());
                        expr = self.mk_expr(
                            ExprKind::Call {
                                callee: Box::new(expr),
                                args,
                            },
                            full,
                        );
                    } else {
                        self.restore(state);
                        return Ok(expr);
                    }
                }
                _ => return Ok(expr),
            }
        }
    }

    /// A member chain without calls, for `extends` clauses and `new` callees.
    pub(crate) fn parse_lhs_expression(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                Some(TokenKind::Dot) => {
                    self.advance();
                    let (name, span) = self.expect_property_name()?;
                    let full = expr.span.merge(&span);
                    expr = self.mk_expr(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property: MemberKey::Dot(name),
                        },
                        full,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_new(&mut self) -> Result<Expression, ParseError> {
        let start = self.expect(TokenKind::New)?.span;
        let callee = self.parse_lhs_expression()?;
        let type_args = self.try_parse_type_args().unwrap_or_default();
        let args = if self.check(&TokenKind::LParen) {
            self.parse_arguments()?
        } else {
            vec![]
        };
        let span = start.merge(&self.prev_span());
        Ok(self.mk_expr(
            ExprKind::New {
                callee: Box::new(callee),
                type_args,
                args,
            },
            span,
        ))
    }

    fn parse_arguments(&mut self) -> Result<Vec<Argument>, ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut args = vec![];
        loop {
            if self.check(&TokenKind::RParen) {
                break;
            }
            let spread = self.eat(&TokenKind::Ellipsis);
            let expr = self.parse_assignment()?;
            args.push(Argument { spread, expr });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        let Some(token) = self.peek().cloned() else {
            return Err(ParseError::eof("an expression"));
        };
        let span = token.span;

        match &token.kind {
            TokenKind::Number {
                value,
                legacy_octal,
            } => {
                if *legacy_octal && self.strict {
                    return Err(ParseError {
                        message: "octal literals are not allowed in strict mode".into(),
                        span: Some(span),
                    });
                }
                let value = *value;
                self.advance();
                Ok(self.mk_expr(ExprKind::Number(value), span))
            }
            TokenKind::Str {
                value,
                octal_escape,
            } => {
                if *octal_escape && self.strict {
                    return Err(ParseError {
                        message: "octal escape sequences are not allowed in strict mode".into(),
                        span: Some(span),
                    });
                }
                let value = value.clone();
                self.advance();
                Ok(self.mk_expr(ExprKind::Str(value), span))
            }
            TokenKind::Template { parts } => {
                let parts = parts.clone();
                self.advance();
                self.parse_template(parts, span)
            }
            TokenKind::Regex { pattern, flags } => {
                let (pattern, flags) = (pattern.clone(), flags.clone());
                self.advance();
                Ok(self.mk_expr(ExprKind::Regex { pattern, flags }, span))
            }
            TokenKind::True => {
                self.advance();
                Ok(self.mk_expr(ExprKind::Bool(true), span))
            }
            TokenKind::False => {
                self.advance();
                Ok(self.mk_expr(ExprKind::Bool(false), span))
            }
            TokenKind::Null => {
                self.advance();
                Ok(self.mk_expr(ExprKind::Null, span))
            }
            TokenKind::Undefined => {
                self.advance();
                Ok(self.mk_expr(ExprKind::Undefined, span))
            }
            TokenKind::This => {
                self.advance();
                Ok(self.mk_expr(ExprKind::This, span))
            }
            TokenKind::Super => {
                self.advance();
                Ok(self.mk_expr(ExprKind::Super, span))
            }
            TokenKind::Ident(name) if name == "async" && self.nth_kind(1) == Some(&TokenKind::Function) => {
                self.advance();
                self.advance();
                let func = self.parse_function_rest(true, false)?;
                let span = span.merge(&func.span);
                Ok(self.mk_expr(ExprKind::Function(Box::new(func)), span))
            }
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(self.mk_expr(ExprKind::Ident(name), span))
            }
            TokenKind::Function => {
                self.advance();
                let func = self.parse_function_rest(false, false)?;
                let span = span.merge(&func.span);
                Ok(self.mk_expr(ExprKind::Function(Box::new(func)), span))
            }
            TokenKind::Class => {
                let class = self.parse_class(false)?;
                let span = span.merge(&class.span);
                Ok(self.mk_expr(ExprKind::ClassExpr(Box::new(class)), span))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                let end = self.expect(TokenKind::RParen)?.span;
                let span = span.merge(&end);
                Ok(self.mk_expr(ExprKind::Grouping(Box::new(inner)), span))
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_object_literal(),
            TokenKind::Yield => Err(ParseError {
                message: "'yield' is only allowed inside generator functions".into(),
                span: Some(span),
            }),
            other => Err(ParseError {
                message: format!("unexpected {other}"),
                span: Some(span),
            }),
        }
    }

    fn parse_template(
        &mut self,
        parts: Vec<TemplatePart>,
        span: crate::lexer::Span,
    ) -> Result<Expression, ParseError> {
        let mut quasis = vec![];
        let mut exprs = vec![];
        for part in parts {
            match part {
                TemplatePart::Chunk(text) => quasis.push(text),
                TemplatePart::Expr(tokens) => {
                    exprs.push(self.parse_subexpression(tokens)?);
                }
            }
        }
        // keep the interleaving invariant: quasis.len() == exprs.len() + 1
        while quasis.len() < exprs.len() + 1 {
            quasis.push(String::new());
        }
        Ok(self.mk_expr(ExprKind::Template { quasis, exprs }, span))
    }

    /// Parse an expression out of an interpolation's token stream, sharing
    /// this parser's node-id counter and strictness.
    fn parse_subexpression(&mut self, tokens: Vec<Token>) -> Result<Expression, ParseError> {
        let mut sub = Parser {
            tokens,
            pos: 0,
            next_node_id: self.next_node_id,
            strict: self.strict,
            fn_stack: self.fn_stack.clone(),
        };
        let expr = sub.parse_expression()?;
        if let Some(extra) = sub.peek() {
            return Err(ParseError {
                message: format!("unexpected {} in template interpolation", extra.kind),
                span: Some(extra.span),
            });
        }
        self.next_node_id = sub.next_node_id;
        Ok(expr)
    }

    fn parse_array_literal(&mut self) -> Result<Expression, ParseError> {
        let start = self.expect(TokenKind::LBracket)?.span;
        let mut items = vec![];

        loop {
            if self.check(&TokenKind::RBracket) {
                break;
            }
            if self.eat(&TokenKind::Comma) {
                items.push(ArrayItem::Hole);
                continue;
            }
            let spread = self.eat(&TokenKind::Ellipsis);
            let expr = self.parse_assignment()?;
            items.push(ArrayItem::Item { spread, expr });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(TokenKind::RBracket)?.span;
        let span = start.merge(&end);
        Ok(self.mk_expr(ExprKind::ArrayLit(items), span))
    }

    fn parse_object_literal(&mut self) -> Result<Expression, ParseError> {
        let start = self.expect(TokenKind::LBrace)?.span;
        let mut props = vec![];

        loop {
            if self.check(&TokenKind::RBrace) {
                break;
            }

            if self.eat(&TokenKind::Ellipsis) {
                let expr = self.parse_assignment()?;
                props.push(ObjectProp::Spread(expr));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                continue;
            }

            // getter / setter
            let mut parsed_accessor = false;
            for (word, is_getter) in [("get", true), ("set", false)] {
                if self.at_ident(word)
                    && !matches!(
                        self.nth_kind(1),
                        None | Some(
                            TokenKind::Colon
                                | TokenKind::Comma
                                | TokenKind::RBrace
                                | TokenKind::LParen
                        )
                    )
                {
                    self.advance();
                    let key = self.parse_prop_key()?;
                    let params = self.parse_params()?;
                    let return_type = if self.eat(&TokenKind::Colon) {
                        Some(self.parse_type()?)
                    } else {
                        None
                    };
                    let body = self.parse_function_block(false, false, &params)?;
                    let strict = self.function_strictness(&body);
                    let func = FunctionLit {
                        name: None,
                        type_params: vec![],
                        params,
                        return_type,
                        body,
                        is_async: false,
                        is_generator: false,
                        is_arrow: false,
                        strict,
                        is_signature: false,
                        span: self.prev_span(),
                    };
                    props.push(if is_getter {
                        ObjectProp::Getter { key, func }
                    } else {
                        ObjectProp::Setter { key, func }
                    });
                    parsed_accessor = true;
                    break;
                }
            }
            if parsed_accessor {
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                continue;
            }

            let key = self.parse_prop_key()?;

            if self.check(&TokenKind::LParen) || self.check(&TokenKind::Lt) {
                // shorthand method
                let type_params = self.parse_type_params()?;
                let params = self.parse_params()?;
                let return_type = if self.eat(&TokenKind::Colon) {
                    Some(self.parse_type()?)
                } else {
                    None
                };
                let body = self.parse_function_block(false, false, &params)?;
                let strict = self.function_strictness(&body);
                let func_span = self.prev_span();
                let func = FunctionLit {
                    name: None,
                    type_params,
                    params,
                    return_type,
                    body,
                    is_async: false,
                    is_generator: false,
                    is_arrow: false,
                    strict,
                    is_signature: false,
                    span: func_span,
                };
                let value = self.mk_expr(ExprKind::Function(Box::new(func)), func_span);
                props.push(ObjectProp::KeyValue { key, value });
            } else if self.eat(&TokenKind::Colon) {
                let value = self.parse_assignment()?;
                props.push(ObjectProp::KeyValue { key, value });
            } else {
                match key {
                    PropKey::Ident(name) => props.push(ObjectProp::Shorthand(name)),
                    _ => return Err(self.error("expected ':' after property key")),
                }
            }

            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(TokenKind::RBrace)?.span;
        let span = start.merge(&end);
        Ok(self.mk_expr(ExprKind::ObjectLit(props), span))
    }

    fn parse_prop_key(&mut self) -> Result<PropKey, ParseError> {
        match self.peek_kind().cloned() {
            Some(TokenKind::LBracket) => {
                self.advance();
                let expr = self.parse_assignment()?;
                self.expect(TokenKind::RBracket)?;
                Ok(PropKey::Computed(expr))
            }
            Some(TokenKind::Str { value, .. }) => {
                self.advance();
                Ok(PropKey::Str(value))
            }
            Some(TokenKind::Number { value, .. }) => {
                self.advance();
                Ok(PropKey::Number(value))
            }
            _ => {
                let (name, _) = self.expect_property_name()?;
                Ok(PropKey::Ident(name))
            }
        }
    }

    pub(crate) fn function_strictness(&self, body: &FunctionBody) -> bool {
        self.strict
            || match body {
                FunctionBody::Block(stmts) => super::block_is_strict(stmts),
                FunctionBody::Expr(_) => false,
            }
    }
}

use crate::ast::{
    BinaryOp, Expr, FunctionDecl, LiteralValue, LogicalOp, Parameter, Program, Stmt, UnaryOp,
};
use crate::error::{ErrorKind, SableError, Span};
use crate::lexer::{Literal, Token, TokenType};
use crate::stack::ensure_sufficient_stack;
use std::rc::Rc;
use tracing::debug;

/// Recursive-descent parser over a finished token sequence.
///
/// All state lives here: the tokens, a cursor, and how many loops and
/// function bodies enclose the cursor (for validating `stop`, `next` and
/// `return`).
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    loop_depth: usize,
    function_depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            loop_depth: 0,
            function_depth: 0,
        }
    }

    pub fn parse(&mut self) -> Result<Program, SableError> {
        if self.tokens.last().map(|token| token.token_type) != Some(TokenType::Eof) {
            let span = self.tokens.last().map(|token| token.span).unwrap_or_default();
            return Err(SableError::parse_error(
                span,
                "Token sequence must end with end-of-input".to_string(),
            ));
        }

        let mut statements = Vec::new();

        while !self.is_at_end() {
            statements.push(self.statement()?);
        }

        debug!(count = statements.len(), "parsed program");
        Ok(Program { statements })
    }

    fn statement(&mut self) -> Result<Stmt, SableError> {
        ensure_sufficient_stack(|| self.statement_inner())
    }

    fn statement_inner(&mut self) -> Result<Stmt, SableError> {
        match self.peek().token_type {
            TokenType::Let => {
                self.advance();
                self.var_declaration(false)
            }
            TokenType::Const => {
                self.advance();
                self.var_declaration(true)
            }
            TokenType::If => {
                self.advance();
                self.if_statement()
            }
            TokenType::Loop => {
                self.advance();
                self.loop_statement()
            }
            TokenType::Function => {
                self.advance();
                self.function_declaration()
            }
            TokenType::Return => {
                self.advance();
                self.return_statement()
            }
            TokenType::Next => {
                self.advance();
                self.loop_control(false)
            }
            TokenType::Stop => {
                self.advance();
                self.loop_control(true)
            }
            TokenType::LeftBrace => self.block_statement(),
            _ => self.expression_statement(),
        }
    }

    fn var_declaration(&mut self, constant: bool) -> Result<Stmt, SableError> {
        let keyword_span = self.previous().span;
        let keyword = if constant { "const" } else { "let" };

        let name_token = self
            .consume_with_help(
                TokenType::Identifier,
                &format!("Expected variable name after '{}'", keyword),
                format!("Declarations name a binding: {} x = 1;", keyword),
            )?
            .clone();
        self.consume_with_help(
            TokenType::Equal,
            &format!("Expected '=' after '{}'", name_token.lexeme),
            format!("Declarations need an initial value: {} {} = 1;", keyword, name_token.lexeme),
        )?;
        let initializer = self.expression()?;
        let semicolon = self.consume(
            TokenType::Semicolon,
            "Expected ';' after variable declaration",
        )?;
        let span = keyword_span.to(&semicolon.span);

        let name = name_token.lexeme;
        if constant {
            Ok(Stmt::Const {
                name,
                initializer,
                span,
            })
        } else {
            Ok(Stmt::Var {
                name,
                initializer,
                span,
            })
        }
    }

    fn block_statement(&mut self) -> Result<Stmt, SableError> {
        let open = self
            .consume_with_help(
                TokenType::LeftBrace,
                "Expected '{'",
                "Bodies of if, loop and function are blocks: { ... }".to_string(),
            )?
            .span;
        let statements = self.block()?;
        Ok(Stmt::Block {
            statements,
            span: open.to(&self.previous().span),
        })
    }

    /// Statements up to and including the closing '}'. The '{' is already consumed.
    fn block(&mut self) -> Result<Vec<Stmt>, SableError> {
        let mut statements = Vec::new();

        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            statements.push(self.statement()?);
        }

        self.consume_with_help(
            TokenType::RightBrace,
            "Expected '}' after block",
            "Block statements must be closed with '}' after the opening '{'.".to_string(),
        )?;
        Ok(statements)
    }

    fn if_statement(&mut self) -> Result<Stmt, SableError> {
        let start_span = self.previous().span;

        self.consume_with_help(
            TokenType::LeftParen,
            "Expected '(' after 'if'",
            "If statements require parentheses around the condition: if (condition) { ... }"
                .to_string(),
        )?;
        let condition = self.expression()?;
        self.consume_with_help(
            TokenType::RightParen,
            "Expected ')' after if condition",
            "If conditions must be enclosed in parentheses: if (condition) { ... }".to_string(),
        )?;

        let then_branch = Box::new(self.block_statement()?);
        let else_branch = if self.match_type(TokenType::Else) {
            if self.match_type(TokenType::If) {
                Some(Box::new(self.if_statement()?))
            } else {
                Some(Box::new(self.block_statement()?))
            }
        } else {
            None
        };

        let end_span = match else_branch {
            Some(ref else_stmt) => *else_stmt.span(),
            None => *then_branch.span(),
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
            span: start_span.to(&end_span),
        })
    }

    fn loop_statement(&mut self) -> Result<Stmt, SableError> {
        let start_span = self.previous().span;

        self.consume_with_help(
            TokenType::LeftParen,
            "Expected '(' after 'loop'",
            "Loops take a condition in parentheses: loop (i < 10) { ... }, or () to loop until 'stop'"
                .to_string(),
        )?;
        let condition = if self.check(TokenType::RightParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TokenType::RightParen, "Expected ')' after loop condition")?;

        self.loop_depth += 1;
        let body = self.block_statement();
        self.loop_depth -= 1;
        let body = Box::new(body?);
        let end_span = *body.span();

        Ok(Stmt::Loop {
            condition,
            body,
            span: start_span.to(&end_span),
        })
    }

    fn loop_control(&mut self, is_stop: bool) -> Result<Stmt, SableError> {
        let span = self.previous().span;
        let keyword = if is_stop { "stop" } else { "next" };

        if self.loop_depth == 0 {
            return Err(SableError::parse_error_with_help(
                span,
                format!("'{}' outside of a loop", keyword),
                format!("'{}' may only appear inside a loop body.", keyword),
            ));
        }
        self.match_type(TokenType::Semicolon);

        if is_stop {
            Ok(Stmt::Stop { span })
        } else {
            Ok(Stmt::Next { span })
        }
    }

    fn function_declaration(&mut self) -> Result<Stmt, SableError> {
        let start_span = self.previous().span;

        let name = self
            .consume_with_help(
                TokenType::Identifier,
                "Expected function name after 'function'",
                "Functions are declared as: function name(a, b) { ... }".to_string(),
            )?
            .lexeme
            .clone();
        self.consume(TokenType::LeftParen, "Expected '(' after function name")?;

        let mut params: Vec<Parameter> = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                let token = self
                    .consume(TokenType::Identifier, "Expected parameter name")?
                    .clone();
                if params.iter().any(|param| param.name == token.lexeme) {
                    return Err(SableError::parse_error(
                        token.span,
                        format!("Duplicate parameter '{}'", token.lexeme),
                    ));
                }
                params.push(Parameter {
                    name: token.lexeme,
                    span: token.span,
                });
                if !self.match_type(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume_with_help(
            TokenType::RightParen,
            "Expected ')' after parameters",
            "Parameters are identifiers separated by commas: function name(a, b) { ... }"
                .to_string(),
        )?;

        self.consume_with_help(
            TokenType::LeftBrace,
            "Expected '{' before function body",
            "Function bodies are blocks: function name(a, b) { ... }".to_string(),
        )?;

        // A loop around the declaration does not enclose the body.
        let saved_loop_depth = std::mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        let body = self.block();
        self.function_depth -= 1;
        self.loop_depth = saved_loop_depth;
        let body = body?;

        Ok(Stmt::Function(Rc::new(FunctionDecl {
            name,
            params,
            body,
            span: start_span.to(&self.previous().span),
        })))
    }

    fn return_statement(&mut self) -> Result<Stmt, SableError> {
        let start_span = self.previous().span;

        if self.function_depth == 0 {
            return Err(SableError::parse_error_with_help(
                start_span,
                "'return' outside of a function".to_string(),
                "'return' may only appear inside a function body.".to_string(),
            ));
        }

        let value = if self.check(TokenType::Semicolon)
            || self.check(TokenType::RightBrace)
            || self.is_at_end()
        {
            None
        } else {
            Some(self.expression()?)
        };
        self.match_type(TokenType::Semicolon);

        Ok(Stmt::Return {
            value,
            span: start_span.to(&self.previous().span),
        })
    }

    fn expression_statement(&mut self) -> Result<Stmt, SableError> {
        let start_span = self.peek().span;
        let expr = self.expression()?;

        // Semicolons after expression statements are optional
        self.match_type(TokenType::Semicolon);

        Ok(Stmt::Expression {
            expr,
            span: start_span.to(&self.previous().span),
        })
    }

    fn expression(&mut self) -> Result<Expr, SableError> {
        ensure_sufficient_stack(|| self.assignment())
    }

    fn assignment(&mut self) -> Result<Expr, SableError> {
        let expr = self.or()?;

        if self.match_type(TokenType::Equal) {
            let equals = self.previous().clone();
            let value = self.assignment()?;

            if !expr.is_assignable() {
                return Err(SableError::parse_error_with_help(
                    equals.span,
                    "Invalid assignment target".to_string(),
                    "Only variables, struct fields and array elements can be assigned to. Examples: 'x = 10', 'p.x = 1', 'a[0] = 2'".to_string(),
                ));
            }

            let span = expr.span().to(value.span());
            return Ok(Expr::Assign {
                target: Box::new(expr),
                value: Box::new(value),
                span,
            });
        }

        Ok(expr)
    }

    fn or(&mut self) -> Result<Expr, SableError> {
        let mut expr = self.and()?;

        while self.match_type(TokenType::OrOr) {
            let operator_token = self.previous().clone();
            let operand_start = self.peek().span.start;
            let right = self.and().map_err(|error| {
                operand_error(error, operand_start, &operator_token, "Logical operators")
            })?;
            let span = expr.span().to(right.span());

            expr = Expr::Logical {
                left: Box::new(expr),
                operator: LogicalOp::Or,
                right: Box::new(right),
                span,
            };
        }

        Ok(expr)
    }

    fn and(&mut self) -> Result<Expr, SableError> {
        let mut expr = self.equality()?;

        while self.match_type(TokenType::AndAnd) {
            let operator_token = self.previous().clone();
            let operand_start = self.peek().span.start;
            let right = self.equality().map_err(|error| {
                operand_error(error, operand_start, &operator_token, "Logical operators")
            })?;
            let span = expr.span().to(right.span());

            expr = Expr::Logical {
                left: Box::new(expr),
                operator: LogicalOp::And,
                right: Box::new(right),
                span,
            };
        }

        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr, SableError> {
        let mut expr = self.comparison()?;

        while self.match_types(&[TokenType::BangEqual, TokenType::EqualEqual]) {
            let operator_token = self.previous().clone();
            let operand_start = self.peek().span.start;
            let operator = match operator_token.token_type {
                TokenType::BangEqual => BinaryOp::NotEqual,
                TokenType::EqualEqual => BinaryOp::Equal,
                _ => unreachable!(),
            };

            let right = self.comparison().map_err(|error| {
                operand_error(error, operand_start, &operator_token, "Equality operators like '==' and '!='")
            })?;
            expr = binary(expr, operator, right);
        }

        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, SableError> {
        let mut expr = self.term()?;

        while self.match_types(&[
            TokenType::Greater,
            TokenType::GreaterEqual,
            TokenType::Less,
            TokenType::LessEqual,
        ]) {
            let operator_token = self.previous().clone();
            let operand_start = self.peek().span.start;
            let operator = match operator_token.token_type {
                TokenType::Greater => BinaryOp::Greater,
                TokenType::GreaterEqual => BinaryOp::GreaterEqual,
                TokenType::Less => BinaryOp::Less,
                TokenType::LessEqual => BinaryOp::LessEqual,
                _ => unreachable!(),
            };

            let right = self.term().map_err(|error| {
                operand_error(error, operand_start, &operator_token, "Comparison operators like '>', '<', '>=' and '<='")
            })?;
            expr = binary(expr, operator, right);
        }

        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr, SableError> {
        let mut expr = self.factor()?;

        while self.match_types(&[TokenType::Minus, TokenType::Plus]) {
            let operator_token = self.previous().clone();
            let operand_start = self.peek().span.start;
            let operator = match operator_token.token_type {
                TokenType::Minus => BinaryOp::Subtract,
                TokenType::Plus => BinaryOp::Add,
                _ => unreachable!(),
            };

            let right = self.factor().map_err(|error| {
                operand_error(error, operand_start, &operator_token, "Arithmetic operators like '+' and '-'")
            })?;
            expr = binary(expr, operator, right);
        }

        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr, SableError> {
        let mut expr = self.unary()?;

        while self.match_types(&[TokenType::Slash, TokenType::Star]) {
            let operator_token = self.previous().clone();
            let operand_start = self.peek().span.start;
            let operator = match operator_token.token_type {
                TokenType::Slash => BinaryOp::Divide,
                TokenType::Star => BinaryOp::Multiply,
                _ => unreachable!(),
            };

            let right = self.unary().map_err(|error| {
                operand_error(error, operand_start, &operator_token, "Multiplication and division operators")
            })?;
            expr = binary(expr, operator, right);
        }

        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, SableError> {
        ensure_sufficient_stack(|| self.unary_inner())
    }

    fn unary_inner(&mut self) -> Result<Expr, SableError> {
        if self.match_types(&[TokenType::Bang, TokenType::Minus]) {
            let operator = match self.previous().token_type {
                TokenType::Bang => UnaryOp::Not,
                TokenType::Minus => UnaryOp::Negate,
                _ => unreachable!(),
            };

            let start = self.previous().span;
            let right = self.unary()?;
            let span = start.to(right.span());

            return Ok(Expr::Unary {
                operator,
                operand: Box::new(right),
                span,
            });
        }

        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, SableError> {
        if self.is_at_end() {
            return Err(SableError::parse_error_with_help(
                self.peek().span,
                "Unexpected end of input".to_string(),
                "Expected an expression here. Check for unmatched parentheses, brackets, or incomplete statements.".to_string(),
            ));
        }

        let token = self.advance().clone();

        match token.token_type {
            TokenType::Number => match token.literal {
                Literal::Number(value) => Ok(Expr::Literal {
                    value: LiteralValue::Number(value),
                    span: token.span,
                }),
                _ => Err(SableError::parse_error(
                    token.span,
                    "Invalid number".to_string(),
                )),
            },
            TokenType::String => {
                let value = match token.literal {
                    Literal::Text(text) => text,
                    _ => token.lexeme,
                };
                Ok(Expr::Literal {
                    value: LiteralValue::String(value),
                    span: token.span,
                })
            }
            TokenType::Boolean => Ok(Expr::Literal {
                value: LiteralValue::Boolean(token.literal == Literal::Boolean(true)),
                span: token.span,
            }),
            TokenType::Null => Ok(Expr::Literal {
                value: LiteralValue::Null,
                span: token.span,
            }),
            // print and take are ordinary bindings that happen to be keywords.
            TokenType::Identifier | TokenType::Print | TokenType::Take => {
                let identifier = Expr::Identifier {
                    name: token.lexeme,
                    span: token.span,
                };
                self.suffixes(identifier)
            }
            TokenType::LeftParen => {
                let start_span = token.span;

                if self.check(TokenType::RightParen) {
                    return Err(SableError::parse_error_with_help(
                        start_span.to(&self.peek().span),
                        "Empty parentheses are not allowed".to_string(),
                        "Parentheses must contain an expression. Use 'null' for a null value: (null)".to_string(),
                    ));
                }

                let expr = self.expression()?;
                let end_span = self
                    .consume_with_help(
                        TokenType::RightParen,
                        "Expected ')' after expression",
                        "Every opening parenthesis '(' must have a matching closing parenthesis ')'.".to_string(),
                    )?
                    .span;
                let grouping = Expr::Grouping {
                    expr: Box::new(expr),
                    span: start_span.to(&end_span),
                };
                self.suffixes(grouping)
            }
            TokenType::LeftBracket => self.array_literal(token.span),
            _ => {
                let help_msg = match token.token_type {
                    TokenType::RightParen => "Found ')' without matching '('. Check for unbalanced parentheses.",
                    TokenType::RightBrace => "Found '}' without matching '{'. Check for unbalanced braces.",
                    TokenType::RightBracket => "Found ']' without matching '['. Check for unbalanced brackets.",
                    TokenType::Ampersand => "Logical and is written '&&'.",
                    TokenType::Pipe => "Logical or is written '||'.",
                    _ => "Expected a literal value, variable, or parenthesized expression here.",
                };

                Err(SableError::parse_error_with_help(
                    token.span,
                    format!("Expected expression, found '{}'", token.lexeme),
                    help_msg.to_string(),
                ))
            }
        }
    }

    /// Call `(args)`, property `.name` and index `[expr]` suffixes, checked in that order.
    fn suffixes(&mut self, mut expr: Expr) -> Result<Expr, SableError> {
        loop {
            if self.match_type(TokenType::LeftParen) {
                expr = self.finish_call(expr)?;
            } else if self.match_type(TokenType::Dot) {
                let property_token = self
                    .consume(TokenType::Identifier, "Expected property name after '.'")?
                    .clone();
                let span = expr.span().to(&property_token.span);
                expr = Expr::PropertyAccess {
                    object: Box::new(expr),
                    property: property_token.lexeme,
                    span,
                };
            } else if self.match_type(TokenType::LeftBracket) {
                let index = self.expression()?;
                let close = self
                    .consume_with_help(
                        TokenType::RightBracket,
                        "Expected ']' after index",
                        "Index expressions are closed with ']': items[0]".to_string(),
                    )?
                    .span;
                let span = expr.span().to(&close);
                expr = Expr::ArrayAccess {
                    array: Box::new(expr),
                    index: Box::new(index),
                    span,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr, SableError> {
        let mut args = Vec::new();

        if !self.check(TokenType::RightParen) {
            loop {
                if self.check(TokenType::RightBrace) || self.check(TokenType::RightBracket) {
                    return Err(SableError::parse_error_with_help(
                        self.peek().span,
                        "Expected ')' to close function call".to_string(),
                        "Function calls must be closed with ')' after the arguments. Example: func(arg1, arg2)".to_string(),
                    ));
                }

                args.push(self.expression()?);

                if !self.match_type(TokenType::Comma) {
                    break;
                }
            }
        }

        let paren = self
            .consume_with_help(
                TokenType::RightParen,
                "Expected ')' after arguments",
                "Function calls must be closed with ')' after the arguments. Example: func(arg1, arg2)".to_string(),
            )?
            .span;

        let span = callee.span().to(&paren);
        Ok(Expr::Call {
            callee: Box::new(callee),
            args,
            span,
        })
    }

    fn array_literal(&mut self, start_span: Span) -> Result<Expr, SableError> {
        let mut elements = Vec::new();

        if !self.check(TokenType::RightBracket) {
            loop {
                elements.push(self.expression()?);
                if !self.match_type(TokenType::Comma) {
                    break;
                }
            }
        }

        let end_span = self
            .consume_with_help(
                TokenType::RightBracket,
                "Expected ']' after array elements",
                "Array literals must be closed with ']' after the opening '['. Example: [1, 2, 3]"
                    .to_string(),
            )?
            .span;
        let array = Expr::Array {
            elements,
            span: start_span.to(&end_span),
        };
        self.suffixes(array)
    }

    fn match_type(&mut self, token_type: TokenType) -> bool {
        if self.check(token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_types(&mut self, types: &[TokenType]) -> bool {
        types.iter().any(|token_type| self.match_type(*token_type))
    }

    fn check(&self, token_type: TokenType) -> bool {
        if self.is_at_end() {
            false
        } else {
            self.peek().token_type == token_type
        }
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::Eof
    }

    pub fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    pub fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.current + 1)
    }

    pub fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn consume(&mut self, token_type: TokenType, message: &str) -> Result<&Token, SableError> {
        if self.check(token_type) {
            Ok(self.advance())
        } else {
            Err(SableError::parse_error(
                self.error_span(),
                self.expectation(message),
            ))
        }
    }

    fn consume_with_help(
        &mut self,
        token_type: TokenType,
        message: &str,
        help: String,
    ) -> Result<&Token, SableError> {
        if self.check(token_type) {
            Ok(self.advance())
        } else {
            Err(SableError::parse_error_with_help(
                self.error_span(),
                self.expectation(message),
                help,
            ))
        }
    }

    fn expectation(&self, message: &str) -> String {
        if self.is_at_end() {
            format!("{}, found end of input", message)
        } else {
            format!("{}, found '{}'", message, self.peek().lexeme)
        }
    }

    /// At end of input, point just past the last real token; otherwise at the unexpected token.
    fn error_span(&self) -> Span {
        if self.is_at_end() && self.current > 0 {
            let last = &self.tokens[self.current - 1].span;
            Span::single(last.end, last.line, last.column + (last.end - last.start))
        } else {
            self.peek().span
        }
    }
}

fn binary(left: Expr, operator: BinaryOp, right: Expr) -> Expr {
    let span = left.span().to(right.span());
    Expr::Binary {
        left: Box::new(left),
        operator,
        right: Box::new(right),
        span,
    }
}

/// A missing right operand is reported at the operator rather than at whatever followed it.
fn operand_error(error: SableError, operand_start: usize, operator: &Token, family: &str) -> SableError {
    if error.kind != ErrorKind::Parse || error.span.start != operand_start {
        return error;
    }
    SableError::parse_error_with_help(
        operator.span,
        format!("Expected expression after '{}'", operator.lexeme),
        format!("{} require expressions on both sides.", family),
    )
}

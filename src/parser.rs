use std::mem::discriminant;
use std::rc::Rc;

use thiserror::Error;

use crate::ast::{BinaryOp, Expression, Literal, Statement, UnaryOp};
use crate::token::{Token, TokenKind};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("Expected {expected}, got '{found}' at line {line}, column {column}")]
    Expected {
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },
    #[error("'{keyword}' statements are not yet implemented (line {line}, column {column})")]
    NotYetImplemented {
        keyword: String,
        line: usize,
        column: usize,
    },
}

type ParseResult<T> = Result<T, ParseError>;

/// Recursive-descent parser. On a failed production the error is recorded,
/// the token stream is synchronized to the next statement boundary, and
/// parsing continues; the failed statement is dropped from the output.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<ParseError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let tokens = if tokens.is_empty() {
            vec![Token::eof(1, 1)]
        } else {
            tokens
        };
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    pub fn parse(&mut self) -> Vec<Statement> {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            if self.skip_separators() {
                continue;
            }
            match self.declaration() {
                Ok(statement) => statements.push(statement),
                Err(error) => {
                    self.errors.push(error);
                    self.synchronize();
                }
            }
        }
        statements
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn declaration(&mut self) -> ParseResult<Statement> {
        if self.match_kind(&TokenKind::Function) {
            return self.function_declaration();
        }
        self.statement()
    }

    fn statement(&mut self) -> ParseResult<Statement> {
        if self.match_kind(&TokenKind::If) {
            return self.if_statement();
        }
        if self.match_kind(&TokenKind::While) {
            return self.while_statement();
        }
        if self.match_kind(&TokenKind::For) {
            return self.for_statement();
        }
        if self.match_kind(&TokenKind::ForEach) {
            return self.foreach_statement();
        }
        if self.check(&TokenKind::Repeat) {
            return Err(self.reserved_statement("repeat"));
        }
        if self.check(&TokenKind::Try) {
            return Err(self.reserved_statement("try"));
        }
        if self.match_kind(&TokenKind::Return) {
            return self.return_statement();
        }
        if self.match_kind(&TokenKind::Break) {
            return Ok(Statement::Break);
        }
        if self.match_kind(&TokenKind::Continue) {
            return Ok(Statement::Continue);
        }
        if self.match_kind(&TokenKind::LBrace) {
            return self.block_statement();
        }

        // An identifier followed by '=' at statement start is an assignment.
        if self.check_identifier() && self.peek_next_kind() == Some(&TokenKind::Assign) {
            return self.assignment_statement();
        }

        let expr = self.expression()?;
        Ok(Statement::Expr(expr))
    }

    fn assignment_statement(&mut self) -> ParseResult<Statement> {
        let name = self.expect_identifier("variable name")?;
        self.expect(&TokenKind::Assign, "'=' in assignment")?;
        let value = self.expression()?;
        Ok(Statement::Assign { name, value })
    }

    fn block_statement(&mut self) -> ParseResult<Statement> {
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            if self.skip_separators() {
                continue;
            }
            statements.push(self.declaration()?);
        }
        self.expect(&TokenKind::RBrace, "'}' after block")?;
        Ok(Statement::Block(statements))
    }

    fn if_statement(&mut self) -> ParseResult<Statement> {
        self.expect(&TokenKind::LParen, "'(' after 'if'")?;
        let condition = self.expression()?;
        self.expect(&TokenKind::RParen, "')' after condition")?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_kind(&TokenKind::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Statement::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> ParseResult<Statement> {
        self.expect(&TokenKind::LParen, "'(' after 'while'")?;
        let condition = self.expression()?;
        self.expect(&TokenKind::RParen, "')' after condition")?;
        let body = Box::new(self.statement()?);
        Ok(Statement::While { condition, body })
    }

    fn for_statement(&mut self) -> ParseResult<Statement> {
        self.expect(&TokenKind::LParen, "'(' after 'for'")?;

        let init = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(self.for_clause_statement()?))
        };
        self.expect(&TokenKind::Semicolon, "';' after for loop initializer")?;

        let condition = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&TokenKind::Semicolon, "';' after for loop condition")?;

        let step = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(Box::new(self.for_clause_statement()?))
        };
        self.expect(&TokenKind::RParen, "')' after for clauses")?;

        let body = Box::new(self.statement()?);
        Ok(Statement::For {
            init,
            condition,
            step,
            body,
        })
    }

    // Initializer and step clauses admit an assignment or a bare expression.
    fn for_clause_statement(&mut self) -> ParseResult<Statement> {
        if self.check_identifier() && self.peek_next_kind() == Some(&TokenKind::Assign) {
            return self.assignment_statement();
        }
        let expr = self.expression()?;
        Ok(Statement::Expr(expr))
    }

    fn foreach_statement(&mut self) -> ParseResult<Statement> {
        self.expect(&TokenKind::LParen, "'(' after 'foreach'")?;
        let variable = self.expect_identifier("variable name")?;
        self.expect(&TokenKind::In, "'in' in foreach loop")?;
        let iterable = self.expression()?;
        self.expect(&TokenKind::RParen, "')' after foreach clauses")?;
        let body = Box::new(self.statement()?);
        Ok(Statement::ForEach {
            variable,
            iterable,
            body,
        })
    }

    fn function_declaration(&mut self) -> ParseResult<Statement> {
        let name = self.expect_identifier("function name")?;
        self.expect(&TokenKind::LParen, "'(' after function name")?;

        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.expect_identifier("parameter name")?);
                if !self.match_kind(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')' after parameters")?;

        self.expect(&TokenKind::LBrace, "'{' before function body")?;
        let body = Rc::new(self.block_statement()?);
        Ok(Statement::FunctionDef { name, params, body })
    }

    fn return_statement(&mut self) -> ParseResult<Statement> {
        if self.check(&TokenKind::Semicolon) || self.check(&TokenKind::RBrace) || self.is_at_end() {
            return Ok(Statement::Return(None));
        }
        let value = self.expression()?;
        Ok(Statement::Return(Some(value)))
    }

    fn expression(&mut self) -> ParseResult<Expression> {
        self.logical_or()
    }

    fn logical_or(&mut self) -> ParseResult<Expression> {
        let mut expr = self.logical_and()?;
        while self.match_kind(&TokenKind::OrOr) {
            let right = self.logical_and()?;
            expr = binary(expr, BinaryOp::Or, right);
        }
        Ok(expr)
    }

    fn logical_and(&mut self) -> ParseResult<Expression> {
        let mut expr = self.equality()?;
        while self.match_kind(&TokenKind::AndAnd) {
            let right = self.equality()?;
            expr = binary(expr, BinaryOp::And, right);
        }
        Ok(expr)
    }

    fn equality(&mut self) -> ParseResult<Expression> {
        let mut expr = self.comparison()?;
        loop {
            let op = if self.match_kind(&TokenKind::EqualEqual) {
                BinaryOp::Equal
            } else if self.match_kind(&TokenKind::NotEqual) {
                BinaryOp::NotEqual
            } else {
                break;
            };
            let right = self.comparison()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> ParseResult<Expression> {
        let mut expr = self.term()?;
        loop {
            let op = if self.match_kind(&TokenKind::Less) {
                BinaryOp::Less
            } else if self.match_kind(&TokenKind::LessEqual) {
                BinaryOp::LessEqual
            } else if self.match_kind(&TokenKind::Greater) {
                BinaryOp::Greater
            } else if self.match_kind(&TokenKind::GreaterEqual) {
                BinaryOp::GreaterEqual
            } else {
                break;
            };
            let right = self.term()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn term(&mut self) -> ParseResult<Expression> {
        let mut expr = self.factor()?;
        loop {
            let op = if self.match_kind(&TokenKind::Plus) {
                BinaryOp::Add
            } else if self.match_kind(&TokenKind::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.factor()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn factor(&mut self) -> ParseResult<Expression> {
        let mut expr = self.unary()?;
        loop {
            let op = if self.match_kind(&TokenKind::Star) {
                BinaryOp::Mul
            } else if self.match_kind(&TokenKind::Slash) {
                BinaryOp::Div
            } else if self.match_kind(&TokenKind::Percent) {
                BinaryOp::Mod
            } else {
                break;
            };
            let right = self.unary()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn unary(&mut self) -> ParseResult<Expression> {
        let op = if self.match_kind(&TokenKind::Bang) {
            Some(UnaryOp::Not)
        } else if self.match_kind(&TokenKind::Minus) {
            Some(UnaryOp::Neg)
        } else {
            None
        };
        if let Some(op) = op {
            let operand = Box::new(self.unary()?);
            return Ok(Expression::Unary { op, operand });
        }
        self.call()
    }

    fn call(&mut self) -> ParseResult<Expression> {
        let mut expr = self.primary()?;
        loop {
            if self.match_kind(&TokenKind::LParen) {
                let mut args = Vec::new();
                if !self.check(&TokenKind::RParen) {
                    loop {
                        args.push(self.expression()?);
                        if !self.match_kind(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RParen, "')' after arguments")?;
                expr = Expression::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else if self.match_kind(&TokenKind::Dot) {
                let name = self.expect_identifier("property name after '.'")?;
                expr = Expression::Member {
                    object: Box::new(expr),
                    name,
                };
            } else if self.match_kind(&TokenKind::LBracket) {
                let index = self.expression()?;
                self.expect(&TokenKind::RBracket, "']' after index")?;
                expr = Expression::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> ParseResult<Expression> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::True => {
                self.advance();
                Ok(Expression::Literal(Literal::Bool(true)))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::Literal(Literal::Bool(false)))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expression::Literal(Literal::Nil))
            }
            TokenKind::Int(value) => {
                self.advance();
                Ok(Expression::Literal(Literal::Int(value)))
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(Expression::Literal(Literal::Float(value)))
            }
            TokenKind::Str(value) => {
                self.advance();
                Ok(Expression::Literal(Literal::Str(value)))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expression::Variable(name))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.expression()?;
                self.expect(&TokenKind::RParen, "')' after expression")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !self.check(&TokenKind::RBracket) {
                    loop {
                        elements.push(self.expression()?);
                        if !self.match_kind(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RBracket, "']' after array elements")?;
                Ok(Expression::Array(elements))
            }
            _ => Err(self.error_at_current("expression")),
        }
    }

    /// Consumes stray semicolons (optional statement separators) and
    /// directives, which the parser ignores.
    fn skip_separators(&mut self) -> bool {
        let mut skipped = false;
        loop {
            match self.peek().kind {
                TokenKind::Semicolon | TokenKind::Directive(_) => {
                    self.advance();
                    skipped = true;
                }
                _ => break,
            }
        }
        skipped
    }

    fn reserved_statement(&mut self, keyword: &str) -> ParseError {
        let token = self.advance().clone();
        ParseError::NotYetImplemented {
            keyword: keyword.to_string(),
            line: token.line,
            column: token.column,
        }
    }

    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            match self.peek().kind {
                TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::ForEach
                | TokenKind::Function
                | TokenKind::Return => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_next_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos + 1).map(|token| &token.kind)
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.pos += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn check(&self, kind: &TokenKind) -> bool {
        discriminant(&self.peek().kind) == discriminant(kind)
    }

    fn check_identifier(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Identifier(_))
    }

    fn match_kind(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> ParseResult<&Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_at_current(expected))
        }
    }

    fn expect_identifier(&mut self, expected: &str) -> ParseResult<String> {
        if let TokenKind::Identifier(name) = &self.peek().kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error_at_current(expected))
        }
    }

    fn error_at_current(&self, expected: &str) -> ParseError {
        let token = self.peek();
        let found = if token.kind == TokenKind::Eof {
            "end of input".to_string()
        } else {
            token.lexeme.clone()
        };
        ParseError::Expected {
            expected: expected.to_string(),
            found,
            line: token.line,
            column: token.column,
        }
    }
}

fn binary(left: Expression, op: BinaryOp, right: Expression) -> Expression {
    Expression::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

/// Parse a token stream into top-level statements plus any recorded errors.
pub fn parse(tokens: Vec<Token>) -> (Vec<Statement>, Vec<ParseError>) {
    let mut parser = Parser::new(tokens);
    let statements = parser.parse();
    (statements, parser.errors)
}

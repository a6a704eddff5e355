// Recursive descent parser for the host dialect

use super::lexer::{is_keyword, tokenize, Token, TokenKind};
use super::{ParseError, Parser};
use crate::ast::{
    BinaryOp, Capture, CatchClause, HostAst, Parameter, Scope, UnaryOp, UnitMember, Visibility,
    CONSTRUCTOR_NAME,
};

/// Parser for the host dialect
#[derive(Debug, Default)]
pub struct HostParser;

impl HostParser {
    pub fn new() -> Self {
        Self
    }
}

impl Parser for HostParser {
    fn parse(&mut self, source: &str) -> Result<HostAst, ParseError> {
        let mut stream = TokenStream::new(source)?;
        let mut items = Vec::new();
        while !stream.at_eof() {
            items.push(stream.item()?);
        }
        Ok(HostAst::Program(items))
    }

    fn name(&self) -> &'static str {
        "host"
    }
}

/// Parse a parameter list without the surrounding parentheses, e.g. `a, &b = 2`
pub fn parse_parameters(source: &str) -> Result<Vec<Parameter>, ParseError> {
    let mut stream = TokenStream::new(source)?;
    let params = stream.params_until(")")?;
    stream.expect_eof()?;
    Ok(params)
}

/// Parse a sequence of statements, e.g. a replacement body
pub fn parse_statements(source: &str) -> Result<Vec<HostAst>, ParseError> {
    let mut stream = TokenStream::new(source)?;
    let mut stmts = Vec::new();
    while !stream.at_eof() {
        stmts.push(stream.statement()?);
    }
    Ok(stmts)
}

/// Parse a single expression
pub fn parse_expression(source: &str) -> Result<HostAst, ParseError> {
    let mut stream = TokenStream::new(source)?;
    let expr = stream.expression()?;
    stream.expect_eof()?;
    Ok(expr)
}

fn boxed(ast: HostAst) -> Box<HostAst> {
    Box::new(ast)
}

/// Deepest nesting of blocks, branches and sub-expressions accepted
pub const MAX_NESTING: usize = 64;

struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl TokenStream {
    fn new(source: &str) -> Result<Self, ParseError> {
        Ok(Self {
            tokens: tokenize(source)?,
            pos: 0,
            depth: 0,
        })
    }

    /// Run `parse` one nesting level deeper, failing past `MAX_NESTING`
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error_here(format!("nesting too deep (limit {MAX_NESTING})")));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    // Token helpers

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + offset).min(last)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn is_symbol_at(&self, offset: usize, symbol: &str) -> bool {
        matches!(&self.peek_at(offset).kind, TokenKind::Symbol(s) if *s == symbol)
    }

    fn is_symbol(&self, symbol: &str) -> bool {
        self.is_symbol_at(0, symbol)
    }

    fn is_word_at(&self, offset: usize, word: &str) -> bool {
        matches!(&self.peek_at(offset).kind, TokenKind::Word(w) if w == word)
    }

    fn is_word(&self, word: &str) -> bool {
        self.is_word_at(0, word)
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        if self.is_symbol(symbol) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.is_word(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        let token = self.peek();
        ParseError::new(message, token.line, token.column)
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let found = self.peek().describe();
        self.error_here(format!("expected {expected}, found {found}"))
    }

    fn expect_symbol(&mut self, symbol: &str) -> Result<(), ParseError> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("`{symbol}`")))
        }
    }

    fn expect_word(&mut self, word: &str) -> Result<(), ParseError> {
        if self.eat_word(word) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("`{word}`")))
        }
    }

    fn expect_eof(&self) -> Result<(), ParseError> {
        if self.at_eof() {
            Ok(())
        } else {
            Err(self.unexpected("end of input"))
        }
    }

    /// Any word, keywords included (member names after `.` and `::`)
    fn expect_name(&mut self) -> Result<String, ParseError> {
        match &self.peek().kind {
            TokenKind::Word(word) => {
                let word = word.clone();
                self.advance();
                Ok(word)
            }
            _ => Err(self.unexpected("a name")),
        }
    }

    /// A non-keyword identifier
    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match &self.peek().kind {
            TokenKind::Word(word) if !is_keyword(word) => {
                let word = word.clone();
                self.advance();
                Ok(word)
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn peek_ident(&self, offset: usize) -> bool {
        matches!(&self.peek_at(offset).kind, TokenKind::Word(w) if !is_keyword(w))
    }

    // Items

    fn item(&mut self) -> Result<HostAst, ParseError> {
        if self.is_word("class") || (self.is_word("abstract") && self.is_word_at(1, "class")) {
            return self.unit_def();
        }
        if self.is_word("fn") {
            let name_offset = if self.is_symbol_at(1, "&") { 2 } else { 1 };
            if self.peek_ident(name_offset) {
                return self.function_def();
            }
        }
        self.statement()
    }

    fn function_def(&mut self) -> Result<HostAst, ParseError> {
        self.expect_word("fn")?;
        let by_ref = self.eat_symbol("&");
        let name = self.expect_ident()?;
        self.expect_symbol("(")?;
        let params = self.params_until(")")?;
        self.expect_symbol(")")?;
        let body = self.block()?;
        Ok(HostAst::FunctionDef {
            name,
            params,
            body,
            by_ref,
        })
    }

    fn unit_def(&mut self) -> Result<HostAst, ParseError> {
        let is_abstract = self.eat_word("abstract");
        self.expect_word("class")?;
        let name = self.expect_ident()?;
        let parent = if self.eat_word("extends") {
            Some(self.expect_ident()?)
        } else {
            None
        };
        self.expect_symbol("{")?;
        let mut members = Vec::new();
        while !self.eat_symbol("}") {
            if self.at_eof() {
                return Err(self.unexpected("`}`"));
            }
            members.push(self.member()?);
        }
        Ok(HostAst::UnitDef {
            name,
            parent,
            is_abstract,
            members,
        })
    }

    fn member(&mut self) -> Result<UnitMember, ParseError> {
        let mut visibility = Visibility::Public;
        let mut is_static = false;
        let mut is_abstract = false;
        loop {
            if self.eat_word("public") {
                visibility = Visibility::Public;
            } else if self.eat_word("protected") {
                visibility = Visibility::Protected;
            } else if self.eat_word("private") {
                visibility = Visibility::Private;
            } else if self.eat_word("static") {
                is_static = true;
            } else if self.eat_word("abstract") {
                is_abstract = true;
            } else {
                break;
            }
        }

        if self.eat_word("const") {
            let name = self.expect_ident()?;
            self.expect_symbol("=")?;
            let value = self.expression()?;
            self.expect_symbol(";")?;
            return Ok(UnitMember::Constant {
                name,
                value,
                visibility,
            });
        }

        if self.eat_word("let") {
            let name = self.expect_ident()?;
            let value = if self.eat_symbol("=") {
                Some(self.expression()?)
            } else {
                None
            };
            self.expect_symbol(";")?;
            return Ok(UnitMember::Property {
                name,
                value,
                visibility,
            });
        }

        if self.eat_word("new") {
            self.expect_symbol("(")?;
            let params = self.params_until(")")?;
            self.expect_symbol(")")?;
            let body = self.block()?;
            return Ok(UnitMember::Constructor {
                params,
                body,
                visibility,
            });
        }

        if self.eat_word("fn") {
            let by_ref = self.eat_symbol("&");
            if self.is_word(CONSTRUCTOR_NAME) {
                return Err(self.error_here("constructors are declared as `new(...)`"));
            }
            let name = self.expect_name()?;
            self.expect_symbol("(")?;
            let params = self.params_until(")")?;
            self.expect_symbol(")")?;
            let body = if is_abstract {
                self.expect_symbol(";")?;
                None
            } else if self.is_symbol(";") {
                return Err(self.error_here(format!("method `{name}` needs a body")));
            } else {
                Some(self.block()?)
            };
            return Ok(UnitMember::Method {
                name,
                params,
                body,
                visibility,
                is_static,
                by_ref,
            });
        }

        Err(self.unexpected("a class member"))
    }

    fn params_until(&mut self, close: &str) -> Result<Vec<Parameter>, ParseError> {
        let mut params = Vec::new();
        while !self.is_symbol(close) && !self.at_eof() {
            let by_ref = self.eat_symbol("&");
            let variadic = self.eat_symbol("...");
            let name = self.expect_ident()?;
            let default_value = if self.eat_symbol("=") {
                Some(self.ternary()?)
            } else {
                None
            };
            params.push(Parameter {
                name,
                default_value,
                by_ref,
                variadic,
            });
            if !self.eat_symbol(",") {
                break;
            }
        }
        Ok(params)
    }

    // Statements

    fn block(&mut self) -> Result<Vec<HostAst>, ParseError> {
        self.nested(Self::block_body)
    }

    fn block_body(&mut self) -> Result<Vec<HostAst>, ParseError> {
        self.expect_symbol("{")?;
        let mut stmts = Vec::new();
        while !self.eat_symbol("}") {
            if self.at_eof() {
                return Err(self.unexpected("`}`"));
            }
            stmts.push(self.statement()?);
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<HostAst, ParseError> {
        if self.is_symbol("{") {
            return Ok(HostAst::Block(self.block()?));
        }
        if self.eat_word("let") {
            let name = self.expect_ident()?;
            let value = if self.eat_symbol("=") {
                Some(boxed(self.expression()?))
            } else {
                None
            };
            self.expect_symbol(";")?;
            return Ok(HostAst::Let { name, value });
        }
        if self.eat_word("return") {
            let value = if self.is_symbol(";") {
                None
            } else {
                Some(boxed(self.expression()?))
            };
            self.expect_symbol(";")?;
            return Ok(HostAst::Return { value });
        }
        if self.is_word("if") {
            return self.if_statement();
        }
        if self.eat_word("while") {
            self.expect_symbol("(")?;
            let condition = boxed(self.expression()?);
            self.expect_symbol(")")?;
            let body = self.block()?;
            return Ok(HostAst::While { condition, body });
        }
        if self.eat_word("for") {
            return self.for_statement();
        }
        if self.eat_word("break") {
            self.expect_symbol(";")?;
            return Ok(HostAst::Break);
        }
        if self.eat_word("continue") {
            self.expect_symbol(";")?;
            return Ok(HostAst::Continue);
        }
        if self.eat_word("throw") {
            let value = boxed(self.expression()?);
            self.expect_symbol(";")?;
            return Ok(HostAst::Throw { value });
        }
        if self.eat_word("try") {
            let body = self.block()?;
            let catch = if self.eat_word("catch") {
                self.expect_symbol("(")?;
                let error_var = self.expect_ident()?;
                self.expect_symbol(")")?;
                Some(CatchClause {
                    error_var,
                    body: self.block()?,
                })
            } else {
                None
            };
            let finally = if self.eat_word("finally") {
                Some(self.block()?)
            } else {
                None
            };
            if catch.is_none() && finally.is_none() {
                return Err(self.unexpected("`catch` or `finally`"));
            }
            return Ok(HostAst::Try {
                body,
                catch,
                finally,
            });
        }

        let expr = self.expression()?;
        self.expect_symbol(";")?;
        Ok(HostAst::ExpressionStatement(boxed(expr)))
    }

    fn if_statement(&mut self) -> Result<HostAst, ParseError> {
        self.expect_word("if")?;
        self.expect_symbol("(")?;
        let condition = boxed(self.expression()?);
        self.expect_symbol(")")?;
        let then_branch = self.block()?;
        let else_branch = if self.eat_word("else") {
            if self.is_word("if") {
                Some(vec![self.nested(Self::if_statement)?])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(HostAst::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn for_statement(&mut self) -> Result<HostAst, ParseError> {
        self.expect_symbol("(")?;
        let key = if self.peek_ident(0) && self.is_symbol_at(1, ",") {
            let key = self.expect_ident()?;
            self.expect_symbol(",")?;
            Some(key)
        } else {
            None
        };
        let by_ref = self.eat_symbol("&");
        let value = self.expect_ident()?;
        self.expect_word("in")?;
        let collection = boxed(self.expression()?);
        self.expect_symbol(")")?;
        let body = self.block()?;
        Ok(HostAst::For {
            key,
            value,
            by_ref,
            collection,
            body,
        })
    }

    // Expressions

    fn expression(&mut self) -> Result<HostAst, ParseError> {
        self.nested(Self::assignment)
    }

    fn assignment(&mut self) -> Result<HostAst, ParseError> {
        let target = self.ternary()?;
        if self.is_symbol("=") {
            if !target.is_assignable() {
                return Err(self.error_here("invalid assignment target"));
            }
            self.advance();
            let value = self.expression()?;
            return Ok(HostAst::Assignment {
                target: boxed(target),
                value: boxed(value),
            });
        }
        Ok(target)
    }

    fn ternary(&mut self) -> Result<HostAst, ParseError> {
        let condition = self.binary(BinaryOp::Or.precedence())?;
        if self.eat_symbol("?") {
            let then_value = self.expression()?;
            self.expect_symbol(":")?;
            let else_value = self.nested(Self::ternary)?;
            return Ok(HostAst::Ternary {
                condition: boxed(condition),
                then_value: boxed(then_value),
                else_value: boxed(else_value),
            });
        }
        Ok(condition)
    }

    fn peek_binary_op(&self) -> Option<BinaryOp> {
        let TokenKind::Symbol(symbol) = &self.peek().kind else {
            return None;
        };
        let op = match *symbol {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Subtract,
            "*" => BinaryOp::Multiply,
            "/" => BinaryOp::Divide,
            "%" => BinaryOp::Modulo,
            "==" => BinaryOp::Equal,
            "!=" => BinaryOp::NotEqual,
            "<" => BinaryOp::LessThan,
            "<=" => BinaryOp::LessEqual,
            ">" => BinaryOp::GreaterThan,
            ">=" => BinaryOp::GreaterEqual,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            _ => return None,
        };
        Some(op)
    }

    fn binary(&mut self, min_prec: u8) -> Result<HostAst, ParseError> {
        let mut left = self.unary()?;
        while let Some(op) = self.peek_binary_op() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.advance();
            let right = self.binary(prec + 1)?;
            left = HostAst::Binary {
                op,
                left: boxed(left),
                right: boxed(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<HostAst, ParseError> {
        if self.eat_symbol("!") {
            return Ok(HostAst::Unary {
                op: UnaryOp::Not,
                operand: boxed(self.nested(Self::unary)?),
            });
        }
        if self.eat_symbol("-") {
            return Ok(HostAst::Unary {
                op: UnaryOp::Minus,
                operand: boxed(self.nested(Self::unary)?),
            });
        }
        if self.eat_symbol("&") {
            return Ok(HostAst::Reference {
                target: boxed(self.postfix()?),
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<HostAst, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_symbol("(") {
                let args = self.args_until(")")?;
                self.expect_symbol(")")?;
                expr = HostAst::Call {
                    func: boxed(expr),
                    args,
                };
            } else if self.eat_symbol(".") {
                let name = self.expect_name()?;
                if self.eat_symbol("(") {
                    let args = self.args_until(")")?;
                    self.expect_symbol(")")?;
                    expr = HostAst::MethodCall {
                        object: boxed(expr),
                        method: name,
                        args,
                    };
                } else {
                    expr = HostAst::PropertyAccess {
                        object: boxed(expr),
                        property: name,
                    };
                }
            } else if self.eat_symbol("[") {
                let index = self.expression()?;
                self.expect_symbol("]")?;
                expr = HostAst::IndexAccess {
                    object: boxed(expr),
                    index: boxed(index),
                };
            } else if self.eat_symbol("::") {
                expr = self.scoped(Scope::Expr(boxed(expr)))?;
            } else {
                return Ok(expr);
            }
        }
    }

    /// The part after `::`
    fn scoped(&mut self, scope: Scope) -> Result<HostAst, ParseError> {
        let name = self.expect_name()?;
        if name == "class" {
            return Ok(HostAst::ClassName { scope });
        }
        if self.eat_symbol("(") {
            let args = self.args_until(")")?;
            self.expect_symbol(")")?;
            return Ok(HostAst::StaticCall {
                scope,
                method: name,
                args,
            });
        }
        Ok(HostAst::ClassConstant { scope, name })
    }

    fn args_until(&mut self, close: &str) -> Result<Vec<HostAst>, ParseError> {
        let mut args = Vec::new();
        while !self.is_symbol(close) && !self.at_eof() {
            if self.eat_symbol("...") {
                args.push(HostAst::Spread(boxed(self.expression()?)));
            } else {
                args.push(self.expression()?);
            }
            if !self.eat_symbol(",") {
                break;
            }
        }
        Ok(args)
    }

    fn unit_scope(&mut self) -> Result<Scope, ParseError> {
        if self.eat_word("self") {
            Ok(Scope::SelfUnit)
        } else if self.eat_word("static") {
            Ok(Scope::Static)
        } else if self.eat_word("parent") {
            Ok(Scope::Parent)
        } else {
            Ok(Scope::Named(self.expect_ident()?))
        }
    }

    fn primary(&mut self) -> Result<HostAst, ParseError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Integer(n) => {
                self.advance();
                Ok(HostAst::Integer(n))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(HostAst::Float(f))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(HostAst::String(s))
            }
            TokenKind::Symbol("(") => {
                self.advance();
                let expr = self.expression()?;
                self.expect_symbol(")")?;
                Ok(expr)
            }
            TokenKind::Symbol("[") => {
                self.advance();
                let elements = self.args_until("]")?;
                self.expect_symbol("]")?;
                Ok(HostAst::List { elements })
            }
            TokenKind::Symbol("{") => self.map_literal(),
            TokenKind::Word(word) => self.word_primary(&word),
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn map_literal(&mut self) -> Result<HostAst, ParseError> {
        self.expect_symbol("{")?;
        let mut entries = Vec::new();
        while !self.is_symbol("}") && !self.at_eof() {
            let key = self.binary(BinaryOp::Or.precedence())?;
            self.expect_symbol(":")?;
            let value = self.expression()?;
            entries.push((key, value));
            if !self.eat_symbol(",") {
                break;
            }
        }
        self.expect_symbol("}")?;
        Ok(HostAst::Map { entries })
    }

    fn word_primary(&mut self, word: &str) -> Result<HostAst, ParseError> {
        match word {
            "true" | "false" => {
                self.advance();
                Ok(HostAst::Boolean(word == "true"))
            }
            "null" => {
                self.advance();
                Ok(HostAst::Null)
            }
            "this" => {
                self.advance();
                Ok(HostAst::This)
            }
            "self" | "static" | "parent" => {
                let scope = self.unit_scope()?;
                self.expect_symbol("::")?;
                self.scoped(scope)
            }
            "new" => {
                self.advance();
                let scope = self.unit_scope()?;
                self.expect_symbol("(")?;
                let args = self.args_until(")")?;
                self.expect_symbol(")")?;
                Ok(HostAst::New { scope, args })
            }
            "fn" => self.closure(),
            "yield" => self.yield_expr(),
            "exit" => {
                self.advance();
                if self.eat_symbol("(") {
                    let status = if self.is_symbol(")") {
                        None
                    } else {
                        Some(boxed(self.expression()?))
                    };
                    self.expect_symbol(")")?;
                    Ok(HostAst::Exit { status })
                } else {
                    Ok(HostAst::Exit { status: None })
                }
            }
            _ if is_keyword(word) => Err(self.unexpected("an expression")),
            _ => {
                let name = self.expect_ident()?;
                if self.eat_symbol("::") {
                    return self.scoped(Scope::Named(name));
                }
                if self.eat_symbol("(") {
                    let args = self.args_until(")")?;
                    self.expect_symbol(")")?;
                    return Ok(HostAst::FunctionCall { name, args });
                }
                Ok(HostAst::Identifier(name))
            }
        }
    }

    fn closure(&mut self) -> Result<HostAst, ParseError> {
        self.expect_word("fn")?;
        let by_ref = self.eat_symbol("&");
        self.expect_symbol("(")?;
        let params = self.params_until(")")?;
        self.expect_symbol(")")?;
        let mut captures = Vec::new();
        if self.eat_word("use") {
            self.expect_symbol("(")?;
            while !self.is_symbol(")") && !self.at_eof() {
                let by_ref = self.eat_symbol("&");
                let name = self.expect_ident()?;
                captures.push(Capture { name, by_ref });
                if !self.eat_symbol(",") {
                    break;
                }
            }
            self.expect_symbol(")")?;
        }
        let body = self.block()?;
        Ok(HostAst::Closure {
            params,
            captures,
            body,
            by_ref,
        })
    }

    fn yield_expr(&mut self) -> Result<HostAst, ParseError> {
        self.expect_word("yield")?;
        let ends_here = [";", ")", "]", ",", "}", ":"]
            .iter()
            .any(|symbol| self.is_symbol(symbol))
            || self.at_eof();
        if ends_here {
            return Ok(HostAst::Yield {
                key: None,
                value: None,
            });
        }
        let first = self.nested(Self::ternary)?;
        if self.eat_symbol("=>") {
            let value = self.nested(Self::ternary)?;
            return Ok(HostAst::Yield {
                key: Some(boxed(first)),
                value: Some(boxed(value)),
            });
        }
        Ok(HostAst::Yield {
            key: None,
            value: Some(boxed(first)),
        })
    }
}

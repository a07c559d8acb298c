//! Recursive descent parser.
//!
//! Builds a [`Program`] from lexer tokens. A statement may end without a
//! semicolon before `}`, at the end of input, or where a line break precedes
//! the next token. Template substitutions are tokenized and parsed on their
//! own, with positions shifted back into the enclosing source.

use crate::ast::*;
use crate::compiler::UnitKind;
use crate::lexer::{tokenize, Token, TokenKind};
use core_types::{ErrorKind, JsError, SourcePosition};
use std::iter::Peekable;
use std::str::Chars;

/// Deepest nesting of statements and expressions accepted.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Parse `source` as `kind`.
pub fn parse(source: &str, kind: UnitKind) -> Result<Program, JsError> {
    let tokens = tokenize(source)?;
    Parser::new(tokens, kind).parse_program()
}

#[derive(Debug, Clone, Copy, Default)]
struct Context {
    in_function: bool,
    is_async: bool,
    is_generator: bool,
}

enum Operator {
    Binary(BinaryOperator),
    Logical(LogicalOperator),
}

enum ClassItem {
    Constructor(Box<Function>),
    Member(ClassMember),
}

/// Parser over one token stream.
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    kind: UnitKind,
    context: Context,
    depth: usize,
    no_in: bool,
}

impl Parser {
    /// Parser for `tokens` of a `kind` unit.
    pub fn new(tokens: Vec<Token>, kind: UnitKind) -> Self {
        Parser {
            tokens,
            current: 0,
            kind,
            context: Context::default(),
            depth: 0,
            no_in: false,
        }
    }

    /// Parse every token as a script or module body.
    pub fn parse_program(&mut self) -> Result<Program, JsError> {
        let mut body = Vec::new();
        while !self.at_end() {
            let item = if self.check_keyword("import") && !self.import_is_expression() {
                self.parse_import_declaration()?
            } else if self.check_keyword("export") && self.kind == UnitKind::Module {
                self.parse_export_declaration()?
            } else {
                self.parse_statement()?
            };
            body.push(item);
        }
        Ok(Program { body })
    }

    // Token helpers

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.current + ahead)
    }

    fn at_end(&self) -> bool {
        self.current >= self.tokens.len()
    }

    fn check_punct(&self, p: &str) -> bool {
        self.peek().is_some_and(|t| t.is_punct(p))
    }

    fn check_keyword(&self, k: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(k))
    }

    fn check_ident(&self, name: &str) -> bool {
        self.peek().is_some_and(|t| t.is_ident(name))
    }

    fn check_kind(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|t| t.kind == kind)
    }

    fn advance(&mut self) -> Result<Token, JsError> {
        match self.tokens.get(self.current) {
            Some(token) => {
                let token = token.clone();
                self.current += 1;
                Ok(token)
            }
            None => Err(self.unexpected()),
        }
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        let matched = self.check_punct(p);
        if matched {
            self.current += 1;
        }
        matched
    }

    fn eat_keyword(&mut self, k: &str) -> bool {
        let matched = self.check_keyword(k);
        if matched {
            self.current += 1;
        }
        matched
    }

    fn eat_ident(&mut self, name: &str) -> bool {
        let matched = self.check_ident(name);
        if matched {
            self.current += 1;
        }
        matched
    }

    fn expect_punct(&mut self, p: &str) -> Result<SourcePosition, JsError> {
        match self.peek() {
            Some(token) if token.is_punct(p) => {
                let position = token.position;
                self.current += 1;
                Ok(position)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn expect_keyword(&mut self, k: &str) -> Result<SourcePosition, JsError> {
        match self.peek() {
            Some(token) if token.is_keyword(k) => {
                let position = token.position;
                self.current += 1;
                Ok(position)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn expect_ident(&mut self, name: &str) -> Result<(), JsError> {
        if self.eat_ident(name) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn position(&self) -> SourcePosition {
        self.peek()
            .map(|t| t.position)
            .unwrap_or_else(|| self.end_position())
    }

    fn end_position(&self) -> SourcePosition {
        self.tokens
            .last()
            .map(|t| t.position)
            .unwrap_or_else(SourcePosition::start)
    }

    fn unexpected(&self) -> JsError {
        match self.peek() {
            Some(token) => unexpected_token(token),
            None => JsError::syntax("Unexpected end of input", self.end_position()),
        }
    }

    fn consume_semicolon(&mut self) -> Result<(), JsError> {
        if self.eat_punct(";") {
            return Ok(());
        }
        match self.peek() {
            None => Ok(()),
            Some(token) if token.is_punct("}") || token.newline_before => Ok(()),
            Some(_) => Err(self.unexpected()),
        }
    }

    fn at_statement_end(&self) -> bool {
        match self.peek() {
            None => true,
            Some(token) => token.is_punct(";") || token.is_punct("}") || token.newline_before,
        }
    }

    fn await_allowed(&self) -> bool {
        self.context.is_async || (self.kind == UnitKind::Module && !self.context.in_function)
    }

    fn import_is_expression(&self) -> bool {
        self.peek_at(1)
            .is_some_and(|t| t.is_punct("(") || t.is_punct("."))
    }

    fn at_async_function(&self) -> bool {
        self.check_ident("async")
            && self
                .peek_at(1)
                .is_some_and(|t| t.is_keyword("function") && !t.newline_before)
    }

    fn enter(&mut self) -> Result<(), JsError> {
        if self.depth >= MAX_NESTING_DEPTH {
            let mut err = JsError::new(ErrorKind::RangeError, "Maximum call stack size exceeded");
            err.source_position = Some(self.position());
            return Err(err);
        }
        self.depth += 1;
        Ok(())
    }

    fn allow_in<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, JsError>) -> Result<T, JsError> {
        let saved = std::mem::replace(&mut self.no_in, false);
        let result = parse(self);
        self.no_in = saved;
        result
    }

    fn without_in<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, JsError>) -> Result<T, JsError> {
        let saved = std::mem::replace(&mut self.no_in, true);
        let result = parse(self);
        self.no_in = saved;
        result
    }

    fn in_context<T>(
        &mut self,
        context: Context,
        parse: impl FnOnce(&mut Self) -> Result<T, JsError>,
    ) -> Result<T, JsError> {
        let saved = std::mem::replace(&mut self.context, context);
        let result = self.allow_in(parse);
        self.context = saved;
        result
    }

    // Statements

    fn parse_statement(&mut self) -> Result<Statement, JsError> {
        self.enter()?;
        let result = self.statement();
        self.depth -= 1;
        result
    }

    fn statement(&mut self) -> Result<Statement, JsError> {
        let Some(token) = self.peek() else {
            return Err(self.unexpected());
        };
        let (kind, text, position) = (token.kind, token.text.clone(), token.position);
        match (kind, text.as_str()) {
            (TokenKind::Punctuator, "{") => Ok(Statement::BlockStatement {
                body: self.parse_block()?,
                position,
            }),
            (TokenKind::Punctuator, ";") => {
                self.current += 1;
                Ok(Statement::EmptyStatement { position })
            }
            (TokenKind::Keyword, "var" | "let" | "const") => self.parse_variable_statement(),
            (TokenKind::Keyword, "function") => self.parse_function_declaration(),
            (TokenKind::Keyword, "class") => self.parse_class_declaration(),
            (TokenKind::Keyword, "if") => self.parse_if(),
            (TokenKind::Keyword, "for") => self.parse_for(),
            (TokenKind::Keyword, "while") => self.parse_while(),
            (TokenKind::Keyword, "do") => self.parse_do_while(),
            (TokenKind::Keyword, "break") => self.parse_jump(true),
            (TokenKind::Keyword, "continue") => self.parse_jump(false),
            (TokenKind::Keyword, "return") => self.parse_return(),
            (TokenKind::Keyword, "throw") => self.parse_throw(),
            (TokenKind::Keyword, "try") => self.parse_try(),
            (TokenKind::Keyword, "switch") => self.parse_switch(),
            (TokenKind::Keyword, "debugger") => {
                self.current += 1;
                self.consume_semicolon()?;
                Ok(Statement::DebuggerStatement { position })
            }
            (TokenKind::Keyword, "with") => Err(JsError::syntax(
                "'with' statements are not supported",
                position,
            )),
            (TokenKind::Keyword, "import") if !self.import_is_expression() => {
                if self.kind == UnitKind::Script {
                    Err(JsError::syntax(
                        "Cannot use import statement outside a module",
                        position,
                    ))
                } else {
                    Err(self.unexpected())
                }
            }
            (TokenKind::Keyword, "export") => Err(self.unexpected()),
            (TokenKind::Identifier, _)
                if !text.starts_with('#') && self.peek_at(1).is_some_and(|t| t.is_punct(":")) =>
            {
                self.current += 2;
                let body = self.parse_statement()?;
                Ok(Statement::LabeledStatement {
                    label: text.clone(),
                    body: Box::new(body),
                    position,
                })
            }
            _ if self.at_async_function() => self.parse_function_declaration(),
            _ => {
                let expression = self.parse_expression()?;
                self.consume_semicolon()?;
                Ok(Statement::ExpressionStatement {
                    expression,
                    position,
                })
            }
        }
    }

    fn parse_block(&mut self) -> Result<Vec<Statement>, JsError> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.eat_punct("}") {
            if self.at_end() {
                return Err(self.unexpected());
            }
            body.push(self.parse_statement()?);
        }
        Ok(body)
    }

    fn parse_variable_statement(&mut self) -> Result<Statement, JsError> {
        let position = self.position();
        let kind = self.parse_variable_kind()?;
        let declarations = self.parse_declarators(kind, false)?;
        self.consume_semicolon()?;
        Ok(Statement::VariableDeclaration {
            kind,
            declarations,
            position,
        })
    }

    fn parse_variable_kind(&mut self) -> Result<VariableKind, JsError> {
        let kind = if self.check_keyword("var") {
            VariableKind::Var
        } else if self.check_keyword("let") {
            VariableKind::Let
        } else if self.check_keyword("const") {
            VariableKind::Const
        } else {
            return Err(self.unexpected());
        };
        self.current += 1;
        Ok(kind)
    }

    /// Declarator list; inside a `for` head an initializer may be missing
    /// when `in` or `of` follows.
    fn parse_declarators(
        &mut self,
        kind: VariableKind,
        in_for_head: bool,
    ) -> Result<Vec<VariableDeclarator>, JsError> {
        let mut declarations = Vec::new();
        loop {
            let id = self.parse_binding_target()?;
            let init = if self.eat_punct("=") {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            let loop_head = in_for_head && (self.check_keyword("in") || self.check_ident("of"));
            if init.is_none() && !loop_head {
                let position = self.position();
                if kind == VariableKind::Const {
                    return Err(JsError::syntax(
                        "Missing initializer in const declaration",
                        position,
                    ));
                }
                if !matches!(id, Pattern::Identifier(_)) {
                    return Err(JsError::syntax(
                        "Missing initializer in destructuring declaration",
                        position,
                    ));
                }
            }
            declarations.push(VariableDeclarator { id, init });
            if !self.eat_punct(",") {
                return Ok(declarations);
            }
        }
    }

    fn parse_if(&mut self) -> Result<Statement, JsError> {
        let position = self.expect_keyword("if")?;
        let test = self.parse_parenthesized()?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.eat_keyword("else") {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Statement::IfStatement {
            test,
            consequent,
            alternate,
            position,
        })
    }

    fn parse_parenthesized(&mut self) -> Result<Expression, JsError> {
        self.expect_punct("(")?;
        let expression = self.allow_in(Self::parse_expression)?;
        self.expect_punct(")")?;
        Ok(expression)
    }

    fn parse_while(&mut self) -> Result<Statement, JsError> {
        let position = self.expect_keyword("while")?;
        let test = self.parse_parenthesized()?;
        let body = Box::new(self.parse_statement()?);
        Ok(Statement::WhileStatement {
            test,
            body,
            position,
        })
    }

    fn parse_do_while(&mut self) -> Result<Statement, JsError> {
        let position = self.expect_keyword("do")?;
        let body = Box::new(self.parse_statement()?);
        self.expect_keyword("while")?;
        let test = self.parse_parenthesized()?;
        self.eat_punct(";");
        Ok(Statement::DoWhileStatement {
            body,
            test,
            position,
        })
    }

    fn parse_for(&mut self) -> Result<Statement, JsError> {
        let position = self.expect_keyword("for")?;
        let is_await = self.check_keyword("await") && self.await_allowed();
        if is_await {
            self.current += 1;
        }
        self.expect_punct("(")?;

        let init = if self.check_punct(";") {
            None
        } else if self.check_keyword("var") || self.check_keyword("let") || self.check_keyword("const") {
            let kind = self.parse_variable_kind()?;
            let mut declarations = self.without_in(|p| p.parse_declarators(kind, true))?;
            let single = declarations.len() == 1 && declarations[0].init.is_none();
            if single && (self.check_keyword("in") || self.check_ident("of")) {
                let pattern = declarations.remove(0).id;
                let left = ForInOfLeft::VariableDeclaration { kind, pattern };
                return self.parse_for_in_of(left, is_await, position);
            }
            Some(ForInit::VariableDeclaration { kind, declarations })
        } else {
            let expression = self.without_in(Self::parse_expression)?;
            if self.check_keyword("in") || self.check_ident("of") {
                let left = ForInOfLeft::Pattern(to_pattern(expression)?);
                return self.parse_for_in_of(left, is_await, position);
            }
            Some(ForInit::Expression(expression))
        };
        if is_await {
            return Err(self.unexpected());
        }

        self.expect_punct(";")?;
        let test = if self.check_punct(";") {
            None
        } else {
            Some(self.allow_in(Self::parse_expression)?)
        };
        self.expect_punct(";")?;
        let update = if self.check_punct(")") {
            None
        } else {
            Some(self.allow_in(Self::parse_expression)?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Statement::ForStatement {
            init,
            test,
            update,
            body,
            position,
        })
    }

    fn parse_for_in_of(
        &mut self,
        left: ForInOfLeft,
        is_await: bool,
        position: SourcePosition,
    ) -> Result<Statement, JsError> {
        if self.check_keyword("in") {
            if is_await {
                return Err(self.unexpected());
            }
            self.current += 1;
            let right = self.allow_in(Self::parse_expression)?;
            self.expect_punct(")")?;
            let body = Box::new(self.parse_statement()?);
            return Ok(Statement::ForInStatement {
                left,
                right,
                body,
                position,
            });
        }
        self.expect_ident("of")?;
        let right = self.allow_in(Self::parse_assignment)?;
        self.expect_punct(")")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Statement::ForOfStatement {
            left,
            right,
            body,
            is_await,
            position,
        })
    }

    fn parse_jump(&mut self, is_break: bool) -> Result<Statement, JsError> {
        let position = self.advance()?.position;
        let label = match self.peek() {
            Some(token) if token.kind == TokenKind::Identifier && !token.newline_before => {
                let label = token.text.clone();
                self.current += 1;
                Some(label)
            }
            _ => None,
        };
        self.consume_semicolon()?;
        Ok(if is_break {
            Statement::BreakStatement { label, position }
        } else {
            Statement::ContinueStatement { label, position }
        })
    }

    fn parse_return(&mut self) -> Result<Statement, JsError> {
        let position = self.position();
        if !self.context.in_function {
            return Err(JsError::syntax("Illegal return statement", position));
        }
        self.current += 1;
        let argument = if self.at_statement_end() {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume_semicolon()?;
        Ok(Statement::ReturnStatement { argument, position })
    }

    fn parse_throw(&mut self) -> Result<Statement, JsError> {
        let position = self.expect_keyword("throw")?;
        if self.peek().is_some_and(|t| t.newline_before) {
            return Err(JsError::syntax("Illegal newline after throw", position));
        }
        let argument = self.parse_expression()?;
        self.consume_semicolon()?;
        Ok(Statement::ThrowStatement { argument, position })
    }

    fn parse_try(&mut self) -> Result<Statement, JsError> {
        let position = self.expect_keyword("try")?;
        let block = self.parse_block()?;
        let handler = if self.eat_keyword("catch") {
            let param = if self.eat_punct("(") {
                let param = self.parse_binding_target()?;
                self.expect_punct(")")?;
                Some(param)
            } else {
                None
            };
            Some(CatchClause {
                param,
                body: self.parse_block()?,
            })
        } else {
            None
        };
        let finalizer = if self.eat_keyword("finally") {
            Some(self.parse_block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(JsError::syntax("Missing catch or finally after try", position));
        }
        Ok(Statement::TryStatement {
            block,
            handler,
            finalizer,
            position,
        })
    }

    fn parse_switch(&mut self) -> Result<Statement, JsError> {
        let position = self.expect_keyword("switch")?;
        let discriminant = self.parse_parenthesized()?;
        self.expect_punct("{")?;
        let mut cases = Vec::new();
        let mut seen_default = false;
        while !self.eat_punct("}") {
            let case_position = self.position();
            let test = if self.eat_keyword("case") {
                Some(self.allow_in(Self::parse_expression)?)
            } else if self.eat_keyword("default") {
                if seen_default {
                    return Err(JsError::syntax(
                        "More than one default clause in switch statement",
                        case_position,
                    ));
                }
                seen_default = true;
                None
            } else {
                return Err(self.unexpected());
            };
            self.expect_punct(":")?;
            let mut consequent = Vec::new();
            while !(self.check_keyword("case") || self.check_keyword("default") || self.check_punct("}")) {
                if self.at_end() {
                    return Err(self.unexpected());
                }
                consequent.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, consequent });
        }
        Ok(Statement::SwitchStatement {
            discriminant,
            cases,
            position,
        })
    }

    // Modules

    fn parse_import_declaration(&mut self) -> Result<Statement, JsError> {
        let position = self.position();
        if self.kind == UnitKind::Script {
            return Err(JsError::syntax(
                "Cannot use import statement outside a module",
                position,
            ));
        }
        self.current += 1;
        if self.check_kind(TokenKind::String) {
            let source = self.parse_module_specifier()?;
            self.skip_import_attributes()?;
            self.consume_semicolon()?;
            return Ok(Statement::ImportDeclaration {
                specifiers: Vec::new(),
                source,
                position,
            });
        }

        let mut specifiers = Vec::new();
        let mut needs_clause = true;
        if self.check_kind(TokenKind::Identifier) {
            specifiers.push(ImportSpecifier::Default(self.parse_binding_identifier()?));
            needs_clause = self.eat_punct(",");
        }
        if needs_clause {
            if self.eat_punct("*") {
                self.expect_ident("as")?;
                specifiers.push(ImportSpecifier::Namespace(self.parse_binding_identifier()?));
            } else if self.eat_punct("{") {
                while !self.eat_punct("}") {
                    let (imported, as_binding) = self.parse_module_export_name()?;
                    let local = if self.eat_ident("as") {
                        self.parse_binding_identifier()?
                    } else {
                        as_binding.ok_or_else(|| self.unexpected())?
                    };
                    specifiers.push(ImportSpecifier::Named { imported, local });
                    if !self.check_punct("}") {
                        self.expect_punct(",")?;
                    }
                }
            } else {
                return Err(self.unexpected());
            }
        }
        self.expect_ident("from")?;
        let source = self.parse_module_specifier()?;
        self.skip_import_attributes()?;
        self.consume_semicolon()?;
        Ok(Statement::ImportDeclaration {
            specifiers,
            source,
            position,
        })
    }

    fn parse_export_declaration(&mut self) -> Result<Statement, JsError> {
        let position = self.expect_keyword("export")?;
        let export = if self.eat_punct("*") {
            let alias = if self.eat_ident("as") {
                Some(self.parse_module_export_name()?.0)
            } else {
                None
            };
            self.expect_ident("from")?;
            let source = self.parse_module_specifier()?;
            self.skip_import_attributes()?;
            self.consume_semicolon()?;
            Export::All { alias, source }
        } else if self.eat_punct("{") {
            let mut specifiers = Vec::new();
            while !self.eat_punct("}") {
                let local = self.parse_module_export_name()?.0;
                let exported = if self.eat_ident("as") {
                    self.parse_module_export_name()?.0
                } else {
                    local.clone()
                };
                specifiers.push(ExportSpecifier { local, exported });
                if !self.check_punct("}") {
                    self.expect_punct(",")?;
                }
            }
            let source = if self.eat_ident("from") {
                let source = self.parse_module_specifier()?;
                self.skip_import_attributes()?;
                Some(source)
            } else {
                None
            };
            self.consume_semicolon()?;
            Export::Named { specifiers, source }
        } else if self.eat_keyword("default") {
            if self.check_keyword("function") || self.at_async_function() {
                Export::DefaultFunction(Box::new(self.parse_function(false)?))
            } else if self.check_keyword("class") {
                Export::DefaultClass(Box::new(self.parse_class(false)?))
            } else {
                let expression = self.allow_in(Self::parse_assignment)?;
                self.consume_semicolon()?;
                Export::DefaultExpression(expression)
            }
        } else if ["var", "let", "const", "function", "class"]
            .iter()
            .any(|k| self.check_keyword(k))
            || self.at_async_function()
        {
            Export::Declaration(Box::new(self.parse_statement()?))
        } else {
            return Err(self.unexpected());
        };
        Ok(Statement::ExportDeclaration { export, position })
    }

    /// Name in an import or export list, plus the binding it makes when
    /// written as a plain identifier.
    fn parse_module_export_name(&mut self) -> Result<(String, Option<Identifier>), JsError> {
        let token = self.advance()?;
        match token.kind {
            TokenKind::Identifier if !token.text.starts_with('#') => {
                let binding = Identifier {
                    name: token.text.clone(),
                    position: token.position,
                };
                Ok((token.text, Some(binding)))
            }
            TokenKind::Keyword | TokenKind::String => Ok((token.text, None)),
            _ => Err(unexpected_token(&token)),
        }
    }

    fn parse_module_specifier(&mut self) -> Result<String, JsError> {
        if !self.check_kind(TokenKind::String) {
            return Err(self.unexpected());
        }
        Ok(self.advance()?.text)
    }

    /// `with { type: 'json' }` after a module specifier.
    fn skip_import_attributes(&mut self) -> Result<(), JsError> {
        let attributes = (self.check_keyword("with") || self.check_ident("assert"))
            && self.peek().is_some_and(|t| !t.newline_before);
        if attributes {
            self.current += 1;
            let position = self.expect_punct("{")?;
            self.parse_object_literal_body(position)?;
        }
        Ok(())
    }

    // Functions and classes

    fn parse_function_declaration(&mut self) -> Result<Statement, JsError> {
        let position = self.position();
        let function = self.parse_function(true)?;
        Ok(Statement::FunctionDeclaration {
            function: Box::new(function),
            position,
        })
    }

    /// `[async] function [*] [name] (params) { body }`
    fn parse_function(&mut self, require_name: bool) -> Result<Function, JsError> {
        let position = self.position();
        let is_async = self.eat_ident("async");
        self.expect_keyword("function")?;
        let is_generator = self.eat_punct("*");
        let name = if self.check_punct("(") {
            if require_name {
                return Err(self.unexpected());
            }
            None
        } else {
            Some(self.parse_binding_identifier()?)
        };
        self.parse_function_rest(name, is_async, is_generator, position)
    }

    /// Parameters and block body, parsed in the function's own context.
    fn parse_function_rest(
        &mut self,
        name: Option<Identifier>,
        is_async: bool,
        is_generator: bool,
        position: SourcePosition,
    ) -> Result<Function, JsError> {
        let context = Context {
            in_function: true,
            is_async,
            is_generator,
        };
        let (params, rest, body) = self.in_context(context, |p| {
            let (params, rest) = p.parse_formal_parameters()?;
            let body = p.parse_block()?;
            Ok((params, rest, body))
        })?;
        Ok(Function {
            name,
            params,
            rest,
            body: FunctionBody::Block(body),
            is_async,
            is_generator,
            is_arrow: false,
            position,
        })
    }

    fn parse_formal_parameters(&mut self) -> Result<(Vec<Pattern>, Option<Pattern>), JsError> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        let mut rest = None;
        while !self.eat_punct(")") {
            if self.eat_punct("...") {
                rest = Some(self.parse_binding_target()?);
                self.expect_punct(")")?;
                break;
            }
            params.push(self.parse_binding_element()?);
            if !self.check_punct(")") {
                self.expect_punct(",")?;
            }
        }
        Ok((params, rest))
    }

    /// Some(is_async) when an arrow function starts at the current token.
    fn at_arrow_function(&self) -> Option<bool> {
        let token = self.peek()?;
        let arrow_at = |index: usize| {
            self.tokens
                .get(index)
                .is_some_and(|t| t.is_punct("=>") && !t.newline_before)
        };
        if token.is_ident("async") {
            if let Some(next) = self.peek_at(1) {
                if !next.newline_before {
                    if is_binding_name(next) && arrow_at(self.current + 2) {
                        return Some(true);
                    }
                    if next.is_punct("(") && self.arrow_after_parens(self.current + 1) {
                        return Some(true);
                    }
                }
            }
        }
        if is_binding_name(token) && arrow_at(self.current + 1) {
            return Some(false);
        }
        if token.is_punct("(") && self.arrow_after_parens(self.current) {
            return Some(false);
        }
        None
    }

    /// Whether the parenthesis at `open` closes right before `=>`.
    fn arrow_after_parens(&self, open: usize) -> bool {
        let mut depth = 0usize;
        for (index, token) in self.tokens.iter().enumerate().skip(open) {
            if token.kind != TokenKind::Punctuator {
                continue;
            }
            match token.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return self
                            .tokens
                            .get(index + 1)
                            .is_some_and(|t| t.is_punct("=>") && !t.newline_before);
                    }
                }
                _ => {}
            }
        }
        false
    }

    fn parse_arrow_function(&mut self, is_async: bool) -> Result<Expression, JsError> {
        let position = self.position();
        if is_async {
            self.current += 1;
        }
        let context = Context {
            in_function: true,
            is_async,
            is_generator: false,
        };
        let no_in = self.no_in;
        let (params, rest, body) = self.in_context(context, |p| {
            let (params, rest) = if p.check_punct("(") {
                p.parse_formal_parameters()?
            } else {
                (vec![Pattern::Identifier(p.parse_binding_identifier()?)], None)
            };
            p.expect_punct("=>")?;
            let body = if p.check_punct("{") {
                FunctionBody::Block(p.parse_block()?)
            } else {
                p.no_in = no_in;
                FunctionBody::Expression(Box::new(p.parse_assignment()?))
            };
            Ok((params, rest, body))
        })?;
        Ok(Expression::Function(Box::new(Function {
            name: None,
            params,
            rest,
            body,
            is_async,
            is_generator: false,
            is_arrow: true,
            position,
        })))
    }

    fn parse_class_declaration(&mut self) -> Result<Statement, JsError> {
        let position = self.position();
        let class = self.parse_class(true)?;
        Ok(Statement::ClassDeclaration {
            class: Box::new(class),
            position,
        })
    }

    fn parse_class(&mut self, require_name: bool) -> Result<Class, JsError> {
        let position = self.expect_keyword("class")?;
        let name = if self.check_kind(TokenKind::Identifier) && !self.check_ident("extends") {
            Some(self.parse_binding_identifier()?)
        } else if require_name {
            return Err(self.unexpected());
        } else {
            None
        };
        let super_class = if self.eat_keyword("extends") {
            Some(Box::new(self.parse_call_member()?))
        } else {
            None
        };
        self.expect_punct("{")?;
        let mut constructor: Option<Box<Function>> = None;
        let mut members = Vec::new();
        while !self.eat_punct("}") {
            if self.eat_punct(";") {
                continue;
            }
            match self.parse_class_member()? {
                ClassItem::Constructor(function) => {
                    if constructor.is_some() {
                        return Err(JsError::syntax(
                            "A class may only have one constructor",
                            function.position,
                        ));
                    }
                    constructor = Some(function);
                }
                ClassItem::Member(member) => members.push(member),
            }
        }
        Ok(Class {
            name,
            super_class,
            constructor,
            members,
            position,
        })
    }

    fn parse_class_member(&mut self) -> Result<ClassItem, JsError> {
        let position = self.position();
        let method_context = Context {
            in_function: true,
            is_async: false,
            is_generator: false,
        };
        let is_static = self.check_keyword("static")
            && self.peek_at(1).is_some_and(|next| {
                !(next.is_punct("(") || next.is_punct("=") || next.is_punct(";") || next.is_punct("}"))
            });
        if is_static {
            self.current += 1;
            if self.check_punct("{") {
                let body = self.in_context(method_context, Self::parse_block)?;
                return Ok(ClassItem::Member(ClassMember::StaticBlock { body, position }));
            }
        }
        let (kind, is_async, is_generator) = self.parse_method_modifiers();
        let (key, _) = self.parse_property_key()?;
        let plain = kind == AccessorKind::Method && !is_async && !is_generator;
        if self.check_punct("(") {
            let function = self.parse_function_rest(None, is_async, is_generator, position)?;
            if !is_static && key == PropertyKey::Named("constructor".to_string()) {
                if !plain {
                    return Err(JsError::syntax(
                        "Class constructor may not be a special method",
                        position,
                    ));
                }
                return Ok(ClassItem::Constructor(Box::new(function)));
            }
            return Ok(ClassItem::Member(ClassMember::Method {
                key,
                kind,
                is_static,
                function: Box::new(function),
            }));
        }
        if !plain {
            return Err(self.unexpected());
        }
        let value = if self.eat_punct("=") {
            Some(self.in_context(method_context, Self::parse_assignment)?)
        } else {
            None
        };
        self.consume_semicolon()?;
        Ok(ClassItem::Member(ClassMember::Field {
            key,
            is_static,
            value,
        }))
    }

    /// `get`, `set`, `async` and `*` before a method name. A modifier word
    /// is only consumed when a property key follows it.
    fn parse_method_modifiers(&mut self) -> (AccessorKind, bool, bool) {
        let mut kind = AccessorKind::Method;
        let mut is_async = false;
        if self.modifier_applies("get") {
            self.current += 1;
            kind = AccessorKind::Getter;
        } else if self.modifier_applies("set") {
            self.current += 1;
            kind = AccessorKind::Setter;
        } else if self.modifier_applies("async") {
            self.current += 1;
            is_async = true;
        }
        let is_generator = self.eat_punct("*");
        (kind, is_async, is_generator)
    }

    fn modifier_applies(&self, word: &str) -> bool {
        self.check_ident(word)
            && self.peek_at(1).is_some_and(|next| {
                let key_follows = match next.kind {
                    TokenKind::Identifier
                    | TokenKind::Keyword
                    | TokenKind::String
                    | TokenKind::Number
                    | TokenKind::BigInt => true,
                    TokenKind::Punctuator => {
                        next.is_punct("[") || (word == "async" && next.is_punct("*"))
                    }
                    _ => false,
                };
                key_follows && !(word == "async" && next.newline_before)
            })
    }

    /// Property name, plus the identifier it could stand for as a shorthand.
    fn parse_property_key(&mut self) -> Result<(PropertyKey, Option<Identifier>), JsError> {
        if self.eat_punct("[") {
            let key = self.allow_in(Self::parse_assignment)?;
            self.expect_punct("]")?;
            return Ok((PropertyKey::Computed(Box::new(key)), None));
        }
        let token = self.advance()?;
        match token.kind {
            TokenKind::Identifier if token.text.starts_with('#') => {
                Ok((PropertyKey::Private(token.text), None))
            }
            TokenKind::Identifier => {
                let shorthand = Identifier {
                    name: token.text.clone(),
                    position: token.position,
                };
                Ok((PropertyKey::Named(token.text), Some(shorthand)))
            }
            TokenKind::Keyword | TokenKind::String => Ok((PropertyKey::Named(token.text), None)),
            TokenKind::Number => {
                let value = parse_number(&token.text)
                    .ok_or_else(|| JsError::syntax("Invalid or unexpected token", token.position))?;
                Ok((PropertyKey::Named(number_key(value)), None))
            }
            TokenKind::BigInt => Ok((PropertyKey::Named(token.text.replace('_', "")), None)),
            _ => Err(unexpected_token(&token)),
        }
    }

    // Bindings

    fn parse_binding_target(&mut self) -> Result<Pattern, JsError> {
        if self.check_punct("[") {
            return self.parse_array_binding();
        }
        if self.check_punct("{") {
            return self.parse_object_binding();
        }
        Ok(Pattern::Identifier(self.parse_binding_identifier()?))
    }

    fn parse_binding_element(&mut self) -> Result<Pattern, JsError> {
        let target = self.parse_binding_target()?;
        if self.eat_punct("=") {
            let default = self.allow_in(Self::parse_assignment)?;
            return Ok(Pattern::Assignment {
                target: Box::new(target),
                default: Box::new(default),
            });
        }
        Ok(target)
    }

    fn parse_binding_identifier(&mut self) -> Result<Identifier, JsError> {
        let Some(token) = self.peek() else {
            return Err(self.unexpected());
        };
        let usable = match token.kind {
            TokenKind::Identifier => !token.text.starts_with('#'),
            TokenKind::Keyword => {
                (token.text == "yield" && !self.context.is_generator)
                    || (token.text == "await" && !self.await_allowed())
            }
            _ => false,
        };
        if !usable {
            return Err(self.unexpected());
        }
        let identifier = Identifier {
            name: token.text.clone(),
            position: token.position,
        };
        self.current += 1;
        Ok(identifier)
    }

    fn parse_array_binding(&mut self) -> Result<Pattern, JsError> {
        self.expect_punct("[")?;
        let mut elements = Vec::new();
        let mut rest = None;
        while !self.eat_punct("]") {
            if self.eat_punct(",") {
                elements.push(None);
                continue;
            }
            if self.eat_punct("...") {
                rest = Some(Box::new(self.parse_binding_target()?));
                self.expect_punct("]")?;
                break;
            }
            elements.push(Some(self.parse_binding_element()?));
            if !self.check_punct("]") {
                self.expect_punct(",")?;
            }
        }
        Ok(Pattern::Array { elements, rest })
    }

    fn parse_object_binding(&mut self) -> Result<Pattern, JsError> {
        self.expect_punct("{")?;
        let mut properties = Vec::new();
        let mut rest = None;
        while !self.eat_punct("}") {
            if self.eat_punct("...") {
                rest = Some(Box::new(Pattern::Identifier(self.parse_binding_identifier()?)));
                self.expect_punct("}")?;
                break;
            }
            let (key, shorthand) = self.parse_property_key()?;
            let value = if self.eat_punct(":") {
                self.parse_binding_element()?
            } else {
                let Some(name) = shorthand else {
                    return Err(self.unexpected());
                };
                let target = Pattern::Identifier(name);
                if self.eat_punct("=") {
                    let default = self.allow_in(Self::parse_assignment)?;
                    Pattern::Assignment {
                        target: Box::new(target),
                        default: Box::new(default),
                    }
                } else {
                    target
                }
            };
            properties.push(ObjectPatternProperty { key, value });
            if !self.check_punct("}") {
                self.expect_punct(",")?;
            }
        }
        Ok(Pattern::Object { properties, rest })
    }

    // Expressions

    fn parse_expression(&mut self) -> Result<Expression, JsError> {
        let first = self.parse_assignment()?;
        if !self.check_punct(",") {
            return Ok(first);
        }
        let position = first.position();
        let mut expressions = vec![first];
        while self.eat_punct(",") {
            expressions.push(self.parse_assignment()?);
        }
        Ok(Expression::Sequence {
            expressions,
            position,
        })
    }

    fn parse_assignment(&mut self) -> Result<Expression, JsError> {
        self.enter()?;
        let result = self.assignment();
        self.depth -= 1;
        result
    }

    fn assignment(&mut self) -> Result<Expression, JsError> {
        if let Some(is_async) = self.at_arrow_function() {
            return self.parse_arrow_function(is_async);
        }
        if self.check_keyword("yield") && self.context.is_generator {
            return self.parse_yield();
        }
        let target = self.parse_conditional()?;
        let Some(operator) = self.peek().and_then(assignment_operator) else {
            return Ok(target);
        };
        self.current += 1;
        let position = target.position();
        let target = match operator {
            AssignmentOperator::Assign => to_pattern(target)?,
            _ => simple_target(target, "Invalid left-hand side in assignment")?,
        };
        let value = self.parse_assignment()?;
        Ok(Expression::Assignment {
            operator,
            target: Box::new(target),
            value: Box::new(value),
            position,
        })
    }

    fn parse_yield(&mut self) -> Result<Expression, JsError> {
        let position = self.expect_keyword("yield")?;
        let same_line = self.peek().is_some_and(|t| !t.newline_before);
        let delegate = same_line && self.eat_punct("*");
        let ends = match self.peek() {
            None => true,
            Some(token) => {
                token.newline_before
                    || [")", "]", "}", ",", ";", ":"]
                        .iter()
                        .any(|p| token.is_punct(p))
            }
        };
        let argument = if delegate || !ends {
            Some(Box::new(self.parse_assignment()?))
        } else {
            None
        };
        Ok(Expression::Yield {
            argument,
            delegate,
            position,
        })
    }

    fn parse_conditional(&mut self) -> Result<Expression, JsError> {
        let test = self.parse_binary(0)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let position = test.position();
        let consequent = self.allow_in(Self::parse_assignment)?;
        self.expect_punct(":")?;
        let alternate = self.parse_assignment()?;
        Ok(Expression::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
            position,
        })
    }

    /// Precedence climbing over binary and logical operators.
    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expression, JsError> {
        let mut left = self.parse_unary()?;
        loop {
            let no_in = self.no_in;
            let Some((precedence, operator)) = self.peek().and_then(|t| binary_operator(t, no_in)) else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            self.current += 1;
            let right_assoc = matches!(operator, Operator::Binary(BinaryOperator::Exp));
            let next = if right_assoc { precedence } else { precedence + 1 };
            self.enter()?;
            let right = self.parse_binary(next);
            self.depth -= 1;
            let right = Box::new(right?);
            let position = left.position();
            let left_box = Box::new(left);
            left = match operator {
                Operator::Binary(operator) => Expression::Binary {
                    operator,
                    left: left_box,
                    right,
                    position,
                },
                Operator::Logical(operator) => Expression::Logical {
                    operator,
                    left: left_box,
                    right,
                    position,
                },
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, JsError> {
        let Some(token) = self.peek() else {
            return Err(self.unexpected());
        };
        let position = token.position;
        let operator = match (token.kind, token.text.as_str()) {
            (TokenKind::Punctuator, "!") => Some(UnaryOperator::Not),
            (TokenKind::Punctuator, "-") => Some(UnaryOperator::Minus),
            (TokenKind::Punctuator, "+") => Some(UnaryOperator::Plus),
            (TokenKind::Punctuator, "~") => Some(UnaryOperator::BitwiseNot),
            (TokenKind::Keyword, "typeof") => Some(UnaryOperator::Typeof),
            (TokenKind::Keyword, "void") => Some(UnaryOperator::Void),
            (TokenKind::Keyword, "delete") => Some(UnaryOperator::Delete),
            _ => None,
        };
        let update = match (token.kind, token.text.as_str()) {
            (TokenKind::Punctuator, "++") => Some(UpdateOperator::Increment),
            (TokenKind::Punctuator, "--") => Some(UpdateOperator::Decrement),
            _ => None,
        };
        let is_await = token.is_keyword("await") && self.await_allowed();
        if operator.is_none() && update.is_none() && !is_await {
            return self.parse_postfix();
        }

        self.current += 1;
        self.enter()?;
        let argument = self.parse_unary();
        self.depth -= 1;
        let argument = argument?;
        if let Some(operator) = operator {
            return Ok(Expression::Unary {
                operator,
                argument: Box::new(argument),
                position,
            });
        }
        if let Some(operator) = update {
            let argument = check_simple_target(
                argument,
                "Invalid left-hand side expression in prefix operation",
            )?;
            return Ok(Expression::Update {
                operator,
                prefix: true,
                argument: Box::new(argument),
                position,
            });
        }
        Ok(Expression::Await {
            argument: Box::new(argument),
            position,
        })
    }

    fn parse_postfix(&mut self) -> Result<Expression, JsError> {
        let expression = self.parse_call_member()?;
        let operator = match self.peek() {
            Some(t) if !t.newline_before && t.is_punct("++") => UpdateOperator::Increment,
            Some(t) if !t.newline_before && t.is_punct("--") => UpdateOperator::Decrement,
            _ => return Ok(expression),
        };
        self.current += 1;
        let position = expression.position();
        let argument = check_simple_target(
            expression,
            "Invalid left-hand side expression in postfix operation",
        )?;
        Ok(Expression::Update {
            operator,
            prefix: false,
            argument: Box::new(argument),
            position,
        })
    }

    /// Member accesses, calls and tagged templates after a primary.
    fn parse_call_member(&mut self) -> Result<Expression, JsError> {
        let start = self.position();
        let mut expression = if self.check_keyword("new") {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        let mut in_chain = false;
        loop {
            if self.eat_punct(".") {
                let property = self.parse_member_name()?;
                expression = member(expression, property, false);
            } else if self.eat_punct("?.") {
                in_chain = true;
                if self.check_punct("(") {
                    let arguments = self.parse_arguments()?;
                    expression = call(expression, arguments, true);
                } else if self.eat_punct("[") {
                    let key = self.allow_in(Self::parse_expression)?;
                    self.expect_punct("]")?;
                    expression = member(expression, PropertyKey::Computed(Box::new(key)), true);
                } else {
                    let property = self.parse_member_name()?;
                    expression = member(expression, property, true);
                }
            } else if self.eat_punct("[") {
                let key = self.allow_in(Self::parse_expression)?;
                self.expect_punct("]")?;
                expression = member(expression, PropertyKey::Computed(Box::new(key)), false);
            } else if self.check_punct("(") {
                let arguments = self.parse_arguments()?;
                expression = call(expression, arguments, false);
            } else if self.check_kind(TokenKind::Template) {
                if in_chain {
                    return Err(JsError::syntax(
                        "Invalid tagged template on optional chain",
                        self.position(),
                    ));
                }
                expression = self.parse_tagged_template(expression)?;
            } else {
                break;
            }
        }
        if in_chain {
            expression = Expression::OptionalChain {
                expression: Box::new(expression),
                position: start,
            };
        }
        Ok(expression)
    }

    fn parse_new(&mut self) -> Result<Expression, JsError> {
        let position = self.expect_keyword("new")?;
        if self.eat_punct(".") {
            self.expect_ident("target")?;
            return Ok(Expression::NewTarget { position });
        }
        let mut callee = if self.check_keyword("new") {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            if self.eat_punct(".") {
                let property = self.parse_member_name()?;
                callee = member(callee, property, false);
            } else if self.eat_punct("[") {
                let key = self.allow_in(Self::parse_expression)?;
                self.expect_punct("]")?;
                callee = member(callee, PropertyKey::Computed(Box::new(key)), false);
            } else if self.check_kind(TokenKind::Template) {
                callee = self.parse_tagged_template(callee)?;
            } else {
                break;
            }
        }
        let arguments = if self.check_punct("(") {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Ok(Expression::New {
            callee: Box::new(callee),
            arguments,
            position,
        })
    }

    fn parse_member_name(&mut self) -> Result<PropertyKey, JsError> {
        let token = self.advance()?;
        match token.kind {
            TokenKind::Identifier if token.text.starts_with('#') => Ok(PropertyKey::Private(token.text)),
            TokenKind::Identifier | TokenKind::Keyword => Ok(PropertyKey::Named(token.text)),
            _ => Err(unexpected_token(&token)),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<ArrayElement>, JsError> {
        self.expect_punct("(")?;
        self.allow_in(|p| {
            let mut arguments = Vec::new();
            while !p.eat_punct(")") {
                let argument = if p.eat_punct("...") {
                    ArrayElement::Spread(p.parse_assignment()?)
                } else {
                    ArrayElement::Expression(p.parse_assignment()?)
                };
                arguments.push(argument);
                if !p.check_punct(")") {
                    p.expect_punct(",")?;
                }
            }
            Ok(arguments)
        })
    }

    fn parse_primary(&mut self) -> Result<Expression, JsError> {
        let token = self.advance()?;
        let position = token.position;
        match token.kind {
            TokenKind::Identifier => {
                if token.text == "async"
                    && self
                        .peek()
                        .is_some_and(|t| t.is_keyword("function") && !t.newline_before)
                {
                    self.current -= 1;
                    return Ok(Expression::Function(Box::new(self.parse_function(false)?)));
                }
                Ok(Expression::Identifier(Identifier {
                    name: token.text,
                    position,
                }))
            }
            TokenKind::Number => {
                let value = parse_number(&token.text)
                    .ok_or_else(|| JsError::syntax("Invalid or unexpected token", position))?;
                Ok(Expression::Literal {
                    value: Literal::Number(value),
                    position,
                })
            }
            TokenKind::BigInt => Ok(Expression::Literal {
                value: Literal::BigInt(token.text.replace('_', "")),
                position,
            }),
            TokenKind::String => Ok(Expression::Literal {
                value: Literal::String(token.text),
                position,
            }),
            TokenKind::Template => {
                let (raw, expressions) = self.parse_template_parts(&token)?;
                let quasis = raw
                    .iter()
                    .map(|r| {
                        cook(r).ok_or_else(|| {
                            JsError::syntax("Invalid escape sequence in template", position)
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Expression::TemplateLiteral {
                    quasis,
                    expressions,
                    position,
                })
            }
            TokenKind::RegExp => {
                let (pattern, flags) = split_regexp(&token.text);
                Ok(Expression::RegExp {
                    pattern,
                    flags,
                    position,
                })
            }
            TokenKind::Keyword => match token.text.as_str() {
                "this" => Ok(Expression::This { position }),
                "null" => Ok(Expression::Literal {
                    value: Literal::Null,
                    position,
                }),
                "true" | "false" => Ok(Expression::Literal {
                    value: Literal::Boolean(token.text == "true"),
                    position,
                }),
                "function" => {
                    self.current -= 1;
                    Ok(Expression::Function(Box::new(self.parse_function(false)?)))
                }
                "class" => {
                    self.current -= 1;
                    Ok(Expression::Class(Box::new(self.parse_class(false)?)))
                }
                "super" => {
                    if ["(", ".", "["].iter().any(|p| self.check_punct(p)) {
                        Ok(Expression::Super { position })
                    } else {
                        Err(JsError::syntax("'super' keyword unexpected here", position))
                    }
                }
                "import" => self.parse_import_expression(position),
                "yield" if !self.context.is_generator => Ok(Expression::Identifier(Identifier {
                    name: token.text.clone(),
                    position,
                })),
                "await" if !self.await_allowed() => Ok(Expression::Identifier(Identifier {
                    name: token.text.clone(),
                    position,
                })),
                _ => Err(unexpected_token(&token)),
            },
            TokenKind::Punctuator => match token.text.as_str() {
                "(" => {
                    let expression = self.allow_in(Self::parse_expression)?;
                    self.expect_punct(")")?;
                    Ok(expression)
                }
                "[" => self.parse_array_literal(position),
                "{" => self.parse_object_literal_body(position),
                _ => Err(unexpected_token(&token)),
            },
        }
    }

    fn parse_import_expression(&mut self, position: SourcePosition) -> Result<Expression, JsError> {
        if self.eat_punct(".") {
            self.expect_ident("meta")?;
            if self.kind != UnitKind::Module {
                return Err(JsError::syntax(
                    "Cannot use 'import.meta' outside a module",
                    position,
                ));
            }
            return Ok(Expression::ImportMeta { position });
        }
        self.expect_punct("(")?;
        let source = self.allow_in(Self::parse_assignment)?;
        // Import options are accepted but carry no meaning here.
        if self.eat_punct(",") && !self.check_punct(")") {
            self.allow_in(Self::parse_assignment)?;
            self.eat_punct(",");
        }
        self.expect_punct(")")?;
        Ok(Expression::ImportCall {
            source: Box::new(source),
            position,
        })
    }

    fn parse_array_literal(&mut self, position: SourcePosition) -> Result<Expression, JsError> {
        let elements = self.allow_in(|p| {
            let mut elements = Vec::new();
            while !p.eat_punct("]") {
                if p.eat_punct(",") {
                    elements.push(ArrayElement::Hole);
                    continue;
                }
                let element = if p.eat_punct("...") {
                    ArrayElement::Spread(p.parse_assignment()?)
                } else {
                    ArrayElement::Expression(p.parse_assignment()?)
                };
                elements.push(element);
                if !p.check_punct("]") {
                    p.expect_punct(",")?;
                }
            }
            Ok(elements)
        })?;
        Ok(Expression::Array { elements, position })
    }

    /// Object literal after its opening brace.
    fn parse_object_literal_body(&mut self, position: SourcePosition) -> Result<Expression, JsError> {
        let properties = self.allow_in(|p| {
            let mut properties = Vec::new();
            while !p.eat_punct("}") {
                properties.push(p.parse_object_property()?);
                if !p.check_punct("}") {
                    p.expect_punct(",")?;
                }
            }
            Ok(properties)
        })?;
        Ok(Expression::Object {
            properties,
            position,
        })
    }

    fn parse_object_property(&mut self) -> Result<ObjectProperty, JsError> {
        if self.eat_punct("...") {
            return Ok(ObjectProperty::Spread(self.parse_assignment()?));
        }
        let position = self.position();
        let (kind, is_async, is_generator) = self.parse_method_modifiers();
        let (key, shorthand) = self.parse_property_key()?;
        let plain = kind == AccessorKind::Method && !is_async && !is_generator;
        if !plain || self.check_punct("(") {
            let function = self.parse_function_rest(None, is_async, is_generator, position)?;
            return Ok(ObjectProperty::Method {
                key,
                kind,
                function: Box::new(function),
            });
        }
        if self.eat_punct(":") {
            return Ok(ObjectProperty::Property {
                key,
                value: self.parse_assignment()?,
            });
        }
        let Some(name) = shorthand else {
            return Err(self.unexpected());
        };
        if self.eat_punct("=") {
            let default = self.parse_assignment()?;
            return Ok(ObjectProperty::CoverInitializedName { name, default });
        }
        Ok(ObjectProperty::Property {
            key,
            value: Expression::Identifier(name),
        })
    }

    fn parse_tagged_template(&mut self, tag: Expression) -> Result<Expression, JsError> {
        let token = self.advance()?;
        let (raw, expressions) = self.parse_template_parts(&token)?;
        let quasis = raw.iter().map(|r| cook(r)).collect();
        let raw = raw.iter().map(|r| normalize_line_breaks(r)).collect();
        let position = tag.position();
        Ok(Expression::TaggedTemplate {
            tag: Box::new(tag),
            quasis,
            raw,
            expressions,
            position,
        })
    }

    /// Raw strings and parsed substitutions of a template token.
    fn parse_template_parts(&self, token: &Token) -> Result<(Vec<String>, Vec<Expression>), JsError> {
        let chars: Vec<char> = token.text.chars().collect();
        let mut quasis = Vec::new();
        let mut expressions = Vec::new();
        let mut current = String::new();
        let mut position = SourcePosition {
            line: token.position.line,
            column: token.position.column + 1,
            offset: token.position.offset + 1,
        };
        let mut index = 0;
        while index < chars.len() {
            let ch = chars[index];
            if ch == '\\' && index + 1 < chars.len() {
                current.push(ch);
                current.push(chars[index + 1]);
                step(&mut position, ch);
                step(&mut position, chars[index + 1]);
                index += 2;
                continue;
            }
            if ch == '$' && chars.get(index + 1) == Some(&'{') {
                quasis.push(std::mem::take(&mut current));
                step(&mut position, '$');
                step(&mut position, '{');
                index += 2;
                let end = substitution_end(&chars, index)
                    .ok_or_else(|| JsError::syntax("Unterminated template literal", token.position))?;
                let source: String = chars[index..end].iter().collect();
                expressions.push(self.parse_substitution(&source, position)?);
                for &c in &chars[index..=end] {
                    step(&mut position, c);
                }
                index = end + 1;
                continue;
            }
            current.push(ch);
            step(&mut position, ch);
            index += 1;
        }
        quasis.push(current);
        Ok((quasis, expressions))
    }

    fn parse_substitution(&self, source: &str, start: SourcePosition) -> Result<Expression, JsError> {
        let relocate = |mut err: JsError| {
            err.source_position = err.source_position.map(|p| shift(p, start));
            err
        };
        let tokens = tokenize(source)
            .map_err(relocate)?
            .into_iter()
            .map(|mut token| {
                token.position = shift(token.position, start);
                token
            })
            .collect();
        let mut parser = Parser {
            tokens,
            current: 0,
            kind: self.kind,
            context: self.context,
            depth: self.depth,
            no_in: false,
        };
        if parser.at_end() {
            return Err(JsError::syntax("Unexpected token '}'", start));
        }
        let expression = parser.parse_expression()?;
        if !parser.at_end() {
            return Err(parser.unexpected());
        }
        Ok(expression)
    }
}

fn unexpected_token(token: &Token) -> JsError {
    let message = match token.kind {
        TokenKind::String => "Unexpected string".to_string(),
        TokenKind::Number | TokenKind::BigInt => "Unexpected number".to_string(),
        TokenKind::Template => "Unexpected template string".to_string(),
        TokenKind::Identifier => format!("Unexpected identifier '{}'", token.text),
        _ => format!("Unexpected token '{}'", token.text),
    };
    JsError::syntax(message, token.position)
}

fn is_binding_name(token: &Token) -> bool {
    token.kind == TokenKind::Identifier && !token.text.starts_with('#')
}

fn member(object: Expression, property: PropertyKey, optional: bool) -> Expression {
    let position = object.position();
    Expression::Member {
        object: Box::new(object),
        property,
        optional,
        position,
    }
}

fn call(callee: Expression, arguments: Vec<ArrayElement>, optional: bool) -> Expression {
    let position = callee.position();
    Expression::Call {
        callee: Box::new(callee),
        arguments,
        optional,
        position,
    }
}

fn assignment_operator(token: &Token) -> Option<AssignmentOperator> {
    use AssignmentOperator::*;
    if token.kind != TokenKind::Punctuator {
        return None;
    }
    let operator = match token.text.as_str() {
        "=" => Assign,
        "+=" => Compound(BinaryOperator::Add),
        "-=" => Compound(BinaryOperator::Sub),
        "*=" => Compound(BinaryOperator::Mul),
        "/=" => Compound(BinaryOperator::Div),
        "%=" => Compound(BinaryOperator::Mod),
        "**=" => Compound(BinaryOperator::Exp),
        "<<=" => Compound(BinaryOperator::LeftShift),
        ">>=" => Compound(BinaryOperator::RightShift),
        ">>>=" => Compound(BinaryOperator::UnsignedRightShift),
        "&=" => Compound(BinaryOperator::BitwiseAnd),
        "|=" => Compound(BinaryOperator::BitwiseOr),
        "^=" => Compound(BinaryOperator::BitwiseXor),
        "&&=" => Logical(LogicalOperator::And),
        "||=" => Logical(LogicalOperator::Or),
        "??=" => Logical(LogicalOperator::NullishCoalescing),
        _ => return None,
    };
    Some(operator)
}

fn binary_operator(token: &Token, no_in: bool) -> Option<(u8, Operator)> {
    use BinaryOperator::*;
    let operator = match (token.kind, token.text.as_str()) {
        (TokenKind::Punctuator, text) => match text {
            "??" => (1, Operator::Logical(LogicalOperator::NullishCoalescing)),
            "||" => (2, Operator::Logical(LogicalOperator::Or)),
            "&&" => (3, Operator::Logical(LogicalOperator::And)),
            "|" => (4, Operator::Binary(BitwiseOr)),
            "^" => (5, Operator::Binary(BitwiseXor)),
            "&" => (6, Operator::Binary(BitwiseAnd)),
            "==" => (7, Operator::Binary(Equal)),
            "!=" => (7, Operator::Binary(NotEqual)),
            "===" => (7, Operator::Binary(StrictEqual)),
            "!==" => (7, Operator::Binary(StrictNotEqual)),
            "<" => (8, Operator::Binary(LessThan)),
            ">" => (8, Operator::Binary(GreaterThan)),
            "<=" => (8, Operator::Binary(LessThanEqual)),
            ">=" => (8, Operator::Binary(GreaterThanEqual)),
            "<<" => (9, Operator::Binary(LeftShift)),
            ">>" => (9, Operator::Binary(RightShift)),
            ">>>" => (9, Operator::Binary(UnsignedRightShift)),
            "+" => (10, Operator::Binary(Add)),
            "-" => (10, Operator::Binary(Sub)),
            "*" => (11, Operator::Binary(Mul)),
            "/" => (11, Operator::Binary(Div)),
            "%" => (11, Operator::Binary(Mod)),
            "**" => (12, Operator::Binary(Exp)),
            _ => return None,
        },
        (TokenKind::Keyword, "instanceof") => (8, Operator::Binary(Instanceof)),
        (TokenKind::Keyword, "in") if !no_in => (8, Operator::Binary(In)),
        _ => return None,
    };
    Some(operator)
}

fn check_simple_target(expression: Expression, message: &str) -> Result<Expression, JsError> {
    match expression {
        Expression::Identifier(_) | Expression::Member { optional: false, .. } => Ok(expression),
        other => Err(JsError::syntax(message, other.position())),
    }
}

fn simple_target(expression: Expression, message: &str) -> Result<Pattern, JsError> {
    match check_simple_target(expression, message)? {
        Expression::Identifier(id) => Ok(Pattern::Identifier(id)),
        other => Ok(Pattern::Expression(Box::new(other))),
    }
}

/// Reinterpret an expression as an assignment target.
fn to_pattern(expression: Expression) -> Result<Pattern, JsError> {
    match expression {
        Expression::Identifier(id) => Ok(Pattern::Identifier(id)),
        Expression::Member { optional: false, .. } => Ok(Pattern::Expression(Box::new(expression))),
        Expression::Array { elements, position } => {
            let count = elements.len();
            let mut patterns = Vec::new();
            let mut rest = None;
            for (index, element) in elements.into_iter().enumerate() {
                match element {
                    ArrayElement::Hole => patterns.push(None),
                    ArrayElement::Expression(e) => patterns.push(Some(to_element(e)?)),
                    ArrayElement::Spread(e) if index + 1 == count => {
                        rest = Some(Box::new(to_pattern(e)?))
                    }
                    ArrayElement::Spread(_) => {
                        return Err(JsError::syntax("Rest element must be last element", position))
                    }
                }
            }
            Ok(Pattern::Array {
                elements: patterns,
                rest,
            })
        }
        Expression::Object { properties, position } => {
            let count = properties.len();
            let mut patterns = Vec::new();
            let mut rest = None;
            for (index, property) in properties.into_iter().enumerate() {
                match property {
                    ObjectProperty::Property { key, value } => patterns.push(ObjectPatternProperty {
                        key,
                        value: to_element(value)?,
                    }),
                    ObjectProperty::CoverInitializedName { name, default } => {
                        patterns.push(ObjectPatternProperty {
                            key: PropertyKey::Named(name.name.clone()),
                            value: Pattern::Assignment {
                                target: Box::new(Pattern::Identifier(name)),
                                default: Box::new(default),
                            },
                        })
                    }
                    ObjectProperty::Spread(e) if index + 1 == count => {
                        rest = Some(Box::new(to_pattern(e)?))
                    }
                    ObjectProperty::Spread(_) => {
                        return Err(JsError::syntax("Rest element must be last element", position))
                    }
                    ObjectProperty::Method { .. } => {
                        return Err(JsError::syntax(
                            "Invalid destructuring assignment target",
                            position,
                        ))
                    }
                }
            }
            Ok(Pattern::Object {
                properties: patterns,
                rest,
            })
        }
        other => Err(JsError::syntax(
            "Invalid left-hand side in assignment",
            other.position(),
        )),
    }
}

fn to_element(expression: Expression) -> Result<Pattern, JsError> {
    match expression {
        Expression::Assignment {
            operator: AssignmentOperator::Assign,
            target,
            value,
            ..
        } => Ok(Pattern::Assignment {
            target,
            default: value,
        }),
        other => to_pattern(other),
    }
}

/// Numeric value of a number token.
pub(crate) fn parse_number(text: &str) -> Option<f64> {
    let digits: String = text.chars().filter(|c| *c != '_').collect();
    let radix = match digits.get(..2) {
        Some("0x") | Some("0X") => 16,
        Some("0o") | Some("0O") => 8,
        Some("0b") | Some("0B") => 2,
        _ => {
            let legacy_octal = digits.len() > 1
                && digits.starts_with('0')
                && digits.chars().all(|c| ('0'..='7').contains(&c));
            if legacy_octal {
                return fold_digits(&digits[1..], 8);
            }
            return digits.parse::<f64>().ok();
        }
    };
    fold_digits(&digits[2..], radix)
}

fn fold_digits(digits: &str, radix: u32) -> Option<f64> {
    if digits.is_empty() {
        return None;
    }
    digits.chars().try_fold(0f64, |acc, c| {
        c.to_digit(radix).map(|d| acc * radix as f64 + d as f64)
    })
}

/// Property key string of a numeric literal key.
fn number_key(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e21 {
        format!("{:.0}", value)
    } else {
        value.to_string()
    }
}

fn split_regexp(text: &str) -> (String, String) {
    match text.rfind('/') {
        Some(end) if end > 0 => (text[1..end].to_string(), text[end + 1..].to_string()),
        _ => (text.trim_start_matches('/').to_string(), String::new()),
    }
}

fn step(position: &mut SourcePosition, ch: char) {
    position.offset += 1;
    if matches!(ch, '\n' | '\u{2028}' | '\u{2029}') {
        position.line += 1;
        position.column = 1;
    } else {
        position.column += 1;
    }
}

fn shift(position: SourcePosition, base: SourcePosition) -> SourcePosition {
    SourcePosition {
        line: base.line + position.line - 1,
        column: if position.line == 1 {
            base.column + position.column - 1
        } else {
            position.column
        },
        offset: base.offset + position.offset,
    }
}

/// Index of the `}` closing a substitution whose body starts at `from`.
fn substitution_end(chars: &[char], from: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut index = from;
    while index < chars.len() {
        match chars[index] {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
            quote @ ('\'' | '"') => {
                index += 1;
                while index < chars.len() && chars[index] != quote {
                    if chars[index] == '\\' {
                        index += 1;
                    }
                    index += 1;
                }
            }
            _ => {}
        }
        index += 1;
    }
    None
}

fn normalize_line_breaks(raw: &str) -> String {
    raw.replace("\r\n", "\n").replace('\r', "\n")
}

/// Cooked value of a raw template string; None when an escape is invalid.
fn cook(raw: &str) -> Option<String> {
    let mut out = String::new();
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push('\n');
            }
            '\\' => match chars.next()? {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                'b' => out.push('\u{0008}'),
                'f' => out.push('\u{000C}'),
                'v' => out.push('\u{000B}'),
                '0' => {
                    if chars.peek().is_some_and(|c| c.is_ascii_digit()) {
                        return None;
                    }
                    out.push('\0');
                }
                '1'..='9' => return None,
                'x' => {
                    let high = chars.next()?.to_digit(16)?;
                    let low = chars.next()?.to_digit(16)?;
                    out.push(char::from_u32(high * 16 + low)?);
                }
                'u' => out.push(cook_unicode(&mut chars)?),
                '\r' => {
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                }
                '\n' | '\u{2028}' | '\u{2029}' => {}
                other => out.push(other),
            },
            other => out.push(other),
        }
    }
    Some(out)
}

fn cook_unicode(chars: &mut Peekable<Chars<'_>>) -> Option<char> {
    let mut code = 0u32;
    if chars.peek() == Some(&'{') {
        chars.next();
        let mut digits = 0;
        loop {
            let c = chars.next()?;
            if c == '}' {
                break;
            }
            code = code.checked_mul(16)?.checked_add(c.to_digit(16)?)?;
            digits += 1;
        }
        if digits == 0 || code > 0x10FFFF {
            return None;
        }
    } else {
        for _ in 0..4 {
            code = code * 16 + chars.next()?.to_digit(16)?;
        }
    }
    // Lone surrogates have no `char`.
    Some(char::from_u32(code).unwrap_or('\u{FFFD}'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(source: &str) -> Vec<Statement> {
        parse(source, UnitKind::Script).unwrap().body
    }

    fn expression(source: &str) -> Expression {
        match script(source).remove(0) {
            Statement::ExpressionStatement { expression, .. } => expression,
            other => panic!("not an expression statement: {:?}", other),
        }
    }

    fn error(source: &str) -> JsError {
        parse(source, UnitKind::Script).unwrap_err()
    }

    #[test]
    fn test_declarations_and_functions() {
        let body = script("let a = 1, [b, , ...c] = d;\nfunction f(x, { y = 2 }, ...rest) { return x + y; }");
        assert_eq!(body.len(), 2);
        match &body[0] {
            Statement::VariableDeclaration { kind, declarations, .. } => {
                assert_eq!(*kind, VariableKind::Let);
                let names: Vec<&str> = declarations
                    .iter()
                    .flat_map(|d| d.id.bound_names())
                    .map(|id| id.name.as_str())
                    .collect();
                assert_eq!(names, vec!["a", "b", "c"]);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &body[1] {
            Statement::FunctionDeclaration { function, .. } => {
                assert_eq!(function.name.as_ref().map(|n| n.name.as_str()), Some("f"));
                assert_eq!(function.params.len(), 2);
                assert!(function.rest.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_operator_precedence() {
        match expression("a + b * c ** d ** e") {
            Expression::Binary { operator, right, .. } => {
                assert_eq!(operator, BinaryOperator::Add);
                match *right {
                    Expression::Binary { operator, right, .. } => {
                        assert_eq!(operator, BinaryOperator::Mul);
                        assert!(matches!(
                            *right,
                            Expression::Binary { operator: BinaryOperator::Exp, .. }
                        ));
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            expression("a ?? b || c"),
            Expression::Logical { operator: LogicalOperator::NullishCoalescing, .. }
        ));
    }

    #[test]
    fn test_arrow_functions() {
        match expression("async ({ a }, b = 1) => a + b") {
            Expression::Function(function) => {
                assert!(function.is_arrow && function.is_async);
                assert_eq!(function.params.len(), 2);
                assert!(matches!(function.body, FunctionBody::Expression(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(expression("x => { return x; }"), Expression::Function(_)));
        assert!(matches!(expression("(a, b)"), Expression::Sequence { .. }));
        assert!(matches!(expression("async(1)"), Expression::Call { .. }));
    }

    #[test]
    fn test_destructuring_assignment() {
        match expression("[a, b = 2, ...c] = list") {
            Expression::Assignment { target, .. } => match *target {
                Pattern::Array { elements, rest } => {
                    assert_eq!(elements.len(), 2);
                    assert!(matches!(elements[1], Some(Pattern::Assignment { .. })));
                    assert!(rest.is_some());
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
        match expression("({ a, b: { c }, d = 1, ...e } = obj)") {
            Expression::Assignment { target, .. } => {
                let names: Vec<String> = target.bound_names().iter().map(|i| i.name.clone()).collect();
                assert_eq!(names, vec!["a", "c", "d", "e"]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(error("a + b = c").message, "Invalid left-hand side in assignment");
    }

    #[test]
    fn test_optional_chain_has_one_boundary() {
        match expression("a?.b.c(d)") {
            Expression::OptionalChain { expression, .. } => {
                assert!(matches!(*expression, Expression::Call { optional: false, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_automatic_semicolons() {
        let body = script("let a = 1\nlet b = a\n++b\nfunction f() { return\n1 }");
        assert_eq!(body.len(), 4);
        match &body[3] {
            Statement::FunctionDeclaration { function, .. } => match &function.body {
                FunctionBody::Block(statements) => {
                    assert!(matches!(
                        statements[0],
                        Statement::ReturnStatement { argument: None, .. }
                    ));
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(error("a b").message, "Unexpected identifier 'b'");
    }

    #[test]
    fn test_template_substitutions() {
        match expression("`a${x + `b${y}`}c`") {
            Expression::TemplateLiteral { quasis, expressions, .. } => {
                assert_eq!(quasis, vec!["a".to_string(), "c".to_string()]);
                assert!(matches!(expressions[0], Expression::Binary { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
        let err = error("x;\n`ok ${ ) }`");
        assert_eq!(err.message, "Unexpected token ')'");
        let position = err.source_position.unwrap();
        assert_eq!((position.line, position.column), (2, 8));
    }

    #[test]
    fn test_tagged_template_keeps_raw_strings() {
        match expression(r"tag`a\n${1}\unicode`") {
            Expression::TaggedTemplate { quasis, raw, .. } => {
                assert_eq!(quasis, vec![Some("a\n".to_string()), None]);
                assert_eq!(raw, vec![r"a\n".to_string(), r"\unicode".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_class_members() {
        let body = script(
            "class A extends B { #x = 1; static count = 0; constructor() { super(); } get x() { return this.#x; } static { A.count++; } async *items() {} }",
        );
        match &body[0] {
            Statement::ClassDeclaration { class, .. } => {
                assert!(class.super_class.is_some());
                assert!(class.constructor.is_some());
                assert_eq!(class.members.len(), 5);
                assert!(matches!(
                    &class.members[0],
                    ClassMember::Field { key: PropertyKey::Private(name), .. } if name == "#x"
                ));
                assert!(matches!(
                    &class.members[2],
                    ClassMember::Method { kind: AccessorKind::Getter, .. }
                ));
                assert!(matches!(&class.members[3], ClassMember::StaticBlock { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_module_items() {
        let program = parse(
            "import a, * as ns from 'x';\nexport { a as b };\nexport default class {}\nawait ns.ready;",
            UnitKind::Module,
        )
        .unwrap();
        assert_eq!(program.body.len(), 4);
        assert!(matches!(
            &program.body[2],
            Statement::ExportDeclaration { export: Export::DefaultClass(_), .. }
        ));
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(error("let x = (;").message, "Unexpected token ';'");
        assert_eq!(error("a +").message, "Unexpected end of input");
        assert_eq!(error("return 1").message, "Illegal return statement");
        assert_eq!(error("const c;").message, "Missing initializer in const declaration");
        assert_eq!(error("try {}").message, "Missing catch or finally after try");
        assert_eq!(
            error("++x++").message,
            "Invalid left-hand side expression in prefix operation"
        );
        assert_eq!(error("with (o) {}").kind, ErrorKind::SyntaxError);
        assert_eq!(
            error("import.meta").message,
            "Cannot use 'import.meta' outside a module"
        );
    }

    #[test]
    fn test_nesting_limit_is_range_error() {
        // Isolate threads run with a larger stack than test threads.
        let handle = std::thread::Builder::new()
            .stack_size(8 * 1024 * 1024)
            .spawn(|| {
                let source = format!("{}1{}", "[".repeat(400), "]".repeat(400));
                let err = error(&source);
                assert_eq!(err.kind, ErrorKind::RangeError);
                let nested = format!("{}1{}", "(".repeat(40), ")".repeat(40));
                assert!(parse(&nested, UnitKind::Script).is_ok());
            })
            .unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_number_values() {
        assert_eq!(parse_number("0x1F"), Some(31.0));
        assert_eq!(parse_number("0b1_01"), Some(5.0));
        assert_eq!(parse_number("017"), Some(15.0));
        assert_eq!(parse_number("019"), Some(19.0));
        assert_eq!(parse_number("1.5e3"), Some(1500.0));
        assert_eq!(number_key(3.0), "3");
        assert_eq!(number_key(0.5), "0.5");
    }
}

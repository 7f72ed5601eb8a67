//! Recursive descent parser from the token stream to the untyped tree.
//!
//! Error recovery is panic-mode: report, skip to the next `;` or `}` at the
//! current nesting level, keep parsing. The tree that comes out of a failed
//! parse is incomplete but safe for the later stages to walk.

use std::collections::HashSet;

use esslt_lang_ast as ast;
use esslt_lang_tok::{Identifier, LexToken, Token, Tokens};
use esslt_shared::{DiagnosticId, Diagnostics, Located, SourceLocation};

pub fn parse(tokens: &Tokens, diagnostics: &mut Diagnostics) -> ast::TranslationUnit {
    let mut parser = Parser {
        tokens: &tokens.stream,
        pos: 0,
        struct_names: HashSet::new(),
        diagnostics,
    };
    parser.translation_unit()
}

struct Parser<'a> {
    tokens: &'a [LexToken],
    pos: usize,
    /// Names declared with `struct`, so later declarations can be told apart
    /// from expressions
    struct_names: HashSet<String>,
    diagnostics: &'a mut Diagnostics,
}

/// Builtin type names; these are ordinary identifiers at the token level.
fn builtin_type(name: &str) -> Option<ast::TypeSpecifier> {
    use ast::Scalar;
    let spec = match name {
        "void" => ast::TypeSpecifier::Void,
        "float" => ast::TypeSpecifier::Scalar(Scalar::Float),
        "int" => ast::TypeSpecifier::Scalar(Scalar::Int),
        "uint" => ast::TypeSpecifier::Scalar(Scalar::UInt),
        "bool" => ast::TypeSpecifier::Scalar(Scalar::Bool),
        "vec2" => ast::TypeSpecifier::Vector(Scalar::Float, 2),
        "vec3" => ast::TypeSpecifier::Vector(Scalar::Float, 3),
        "vec4" => ast::TypeSpecifier::Vector(Scalar::Float, 4),
        "ivec2" => ast::TypeSpecifier::Vector(Scalar::Int, 2),
        "ivec3" => ast::TypeSpecifier::Vector(Scalar::Int, 3),
        "ivec4" => ast::TypeSpecifier::Vector(Scalar::Int, 4),
        "uvec2" => ast::TypeSpecifier::Vector(Scalar::UInt, 2),
        "uvec3" => ast::TypeSpecifier::Vector(Scalar::UInt, 3),
        "uvec4" => ast::TypeSpecifier::Vector(Scalar::UInt, 4),
        "bvec2" => ast::TypeSpecifier::Vector(Scalar::Bool, 2),
        "bvec3" => ast::TypeSpecifier::Vector(Scalar::Bool, 3),
        "bvec4" => ast::TypeSpecifier::Vector(Scalar::Bool, 4),
        "mat2" => ast::TypeSpecifier::Matrix(2, 2),
        "mat3" => ast::TypeSpecifier::Matrix(3, 3),
        "mat4" => ast::TypeSpecifier::Matrix(4, 4),
        "mat2x2" => ast::TypeSpecifier::Matrix(2, 2),
        "mat2x3" => ast::TypeSpecifier::Matrix(2, 3),
        "mat2x4" => ast::TypeSpecifier::Matrix(2, 4),
        "mat3x2" => ast::TypeSpecifier::Matrix(3, 2),
        "mat3x3" => ast::TypeSpecifier::Matrix(3, 3),
        "mat3x4" => ast::TypeSpecifier::Matrix(3, 4),
        "mat4x2" => ast::TypeSpecifier::Matrix(4, 2),
        "mat4x3" => ast::TypeSpecifier::Matrix(4, 3),
        "mat4x4" => ast::TypeSpecifier::Matrix(4, 4),
        "sampler2D" => ast::TypeSpecifier::Sampler(ast::SamplerKind::Sampler2D),
        "sampler3D" => ast::TypeSpecifier::Sampler(ast::SamplerKind::Sampler3D),
        "samplerCube" => ast::TypeSpecifier::Sampler(ast::SamplerKind::SamplerCube),
        "sampler2DShadow" => ast::TypeSpecifier::Sampler(ast::SamplerKind::Sampler2DShadow),
        "sampler2DArray" => ast::TypeSpecifier::Sampler(ast::SamplerKind::Sampler2DArray),
        "samplerCubeShadow" => ast::TypeSpecifier::Sampler(ast::SamplerKind::SamplerCubeShadow),
        _ => return None,
    };
    Some(spec)
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].0
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].0
    }

    fn loc(&self) -> SourceLocation {
        self.tokens[self.pos.min(self.tokens.len() - 1)].1
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> bool {
        if self.eat(token) {
            true
        } else {
            self.syntax_error(&format!(
                "'{}' : expected '{}'",
                self.peek().describe(),
                token.describe()
            ));
            false
        }
    }

    fn syntax_error(&mut self, text: &str) {
        let loc = self.loc();
        self.diagnostics
            .report(DiagnosticId::SyntaxError, loc, text.to_string());
    }

    /// Skips to the next `;` (consumed) or `}` (left in place), balancing
    /// nested braces along the way.
    fn recover(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                Token::Eof => return,
                Token::Semicolon if depth == 0 => {
                    self.bump();
                    return;
                }
                Token::LeftBrace => {
                    depth += 1;
                    self.bump();
                }
                Token::RightBrace => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                    self.bump();
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn identifier(&mut self) -> Option<Located<String>> {
        let loc = self.loc();
        match self.peek().clone() {
            Token::Id(Identifier(name)) => {
                self.bump();
                Some(Located::new(name, loc))
            }
            Token::ReservedWord(word) => {
                self.diagnostics.report(
                    DiagnosticId::ReservedKeyword,
                    loc,
                    format!("'{}' : reserved keyword", word),
                );
                self.bump();
                None
            }
            other => {
                self.syntax_error(&format!("'{}' : expected identifier", other.describe()));
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Types

    fn peek_is_type_start(&self) -> bool {
        match self.peek() {
            Token::Const
            | Token::Attribute
            | Token::Varying
            | Token::Uniform
            | Token::In
            | Token::Out
            | Token::Centroid
            | Token::Flat
            | Token::Smooth
            | Token::Invariant
            | Token::Layout
            | Token::Lowp
            | Token::Mediump
            | Token::Highp
            | Token::Struct => true,
            Token::Id(Identifier(name)) => {
                builtin_type(name).is_some() || self.struct_names.contains(name)
            }
            _ => false,
        }
    }

    fn layout_qualifier(&mut self) -> ast::LayoutQualifier {
        // caller consumed `layout`
        let mut entries = Vec::new();
        if !self.expect(&Token::LeftParen) {
            return ast::LayoutQualifier(entries);
        }
        loop {
            match self.identifier() {
                Some(name) => {
                    let value = if self.eat(&Token::Equals) {
                        match self.bump() {
                            Token::LiteralInt(v) => Some(v as i32),
                            Token::LiteralUInt(v) => Some(v as i32),
                            other => {
                                self.syntax_error(&format!(
                                    "'{}' : expected integer in layout qualifier",
                                    other.describe()
                                ));
                                None
                            }
                        }
                    } else {
                        None
                    };
                    entries.push((name.node, value));
                }
                None => break,
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RightParen);
        ast::LayoutQualifier(entries)
    }

    /// Parses qualifiers followed by a type specifier.
    fn type_name(&mut self) -> Option<ast::TypeName> {
        let mut ty = ast::TypeName::from_specifier(ast::TypeSpecifier::Void);
        loop {
            match self.peek() {
                Token::Layout => {
                    self.bump();
                    ty.layout = Some(self.layout_qualifier());
                }
                Token::Invariant => {
                    self.bump();
                    ty.invariant = true;
                }
                Token::Flat => {
                    self.bump();
                    ty.interpolation = Some(ast::Interpolation::Flat);
                }
                Token::Smooth => {
                    self.bump();
                    ty.interpolation = Some(ast::Interpolation::Smooth);
                }
                Token::Centroid => {
                    self.bump();
                    ty.centroid = true;
                }
                Token::Const => {
                    self.bump();
                    ty.storage = Some(ast::StorageQualifier::Const);
                }
                Token::Attribute => {
                    self.bump();
                    ty.storage = Some(ast::StorageQualifier::Attribute);
                }
                Token::Varying => {
                    self.bump();
                    ty.storage = Some(ast::StorageQualifier::Varying);
                }
                Token::Uniform => {
                    self.bump();
                    ty.storage = Some(ast::StorageQualifier::Uniform);
                }
                Token::In => {
                    self.bump();
                    ty.storage = Some(ast::StorageQualifier::In);
                }
                Token::Out => {
                    self.bump();
                    ty.storage = Some(ast::StorageQualifier::Out);
                }
                Token::Lowp => {
                    self.bump();
                    ty.precision = Some(ast::Precision::Lowp);
                }
                Token::Mediump => {
                    self.bump();
                    ty.precision = Some(ast::Precision::Mediump);
                }
                Token::Highp => {
                    self.bump();
                    ty.precision = Some(ast::Precision::Highp);
                }
                _ => break,
            }
        }
        ty.specifier = self.type_specifier()?;
        ty.array_sizes = self.array_sizes();
        Some(ty)
    }

    fn type_specifier(&mut self) -> Option<ast::TypeSpecifier> {
        if self.peek() == &Token::Struct {
            return Some(ast::TypeSpecifier::Struct(self.struct_definition()?));
        }
        let loc = self.loc();
        match self.peek().clone() {
            Token::Id(Identifier(name)) => {
                if let Some(spec) = builtin_type(&name) {
                    self.bump();
                    Some(spec)
                } else if self.struct_names.contains(&name) {
                    self.bump();
                    Some(ast::TypeSpecifier::Named(name))
                } else {
                    self.diagnostics.report(
                        DiagnosticId::UnknownType,
                        loc,
                        format!("'{}' : unknown type name", name),
                    );
                    self.bump();
                    None
                }
            }
            other => {
                self.syntax_error(&format!("'{}' : expected type", other.describe()));
                None
            }
        }
    }

    fn struct_definition(&mut self) -> Option<ast::StructDefinition> {
        self.expect(&Token::Struct);
        let name = match self.peek() {
            Token::Id(_) => self.identifier(),
            _ => None,
        };
        if let Some(ref name) = name {
            self.struct_names.insert(name.node.clone());
        }
        if !self.expect(&Token::LeftBrace) {
            return None;
        }
        let mut members = Vec::new();
        while self.peek() != &Token::RightBrace && self.peek() != &Token::Eof {
            match self.struct_member() {
                Some(member) => members.push(member),
                None => self.recover(),
            }
        }
        self.expect(&Token::RightBrace);
        Some(ast::StructDefinition { name, members })
    }

    fn struct_member(&mut self) -> Option<ast::StructMember> {
        let ty = self.type_name()?;
        let mut declarators = Vec::new();
        loop {
            let name = self.identifier()?;
            let array_sizes = self.array_sizes();
            declarators.push(ast::MemberDeclarator { name, array_sizes });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::Semicolon);
        Some(ast::StructMember { ty, declarators })
    }

    /// `[size]` suffixes, outermost first. Empty brackets give `None`.
    fn array_sizes(&mut self) -> Vec<Option<Located<ast::Expression>>> {
        let mut sizes = Vec::new();
        while self.eat(&Token::LeftSquareBracket) {
            if self.eat(&Token::RightSquareBracket) {
                sizes.push(None);
            } else {
                let size = self.expression_no_comma();
                self.expect(&Token::RightSquareBracket);
                sizes.push(size);
            }
        }
        sizes
    }

    // ------------------------------------------------------------------
    // Expressions

    fn expression(&mut self) -> Option<Located<ast::Expression>> {
        let loc = self.loc();
        let mut expr = self.assignment_expression()?;
        while self.eat(&Token::Comma) {
            let rhs = self.assignment_expression()?;
            expr = Located::new(
                ast::Expression::Comma(Box::new(expr), Box::new(rhs)),
                loc,
            );
        }
        Some(expr)
    }

    /// An expression where `,` is a separator, not an operator.
    fn expression_no_comma(&mut self) -> Option<Located<ast::Expression>> {
        self.assignment_expression()
    }

    fn assignment_expression(&mut self) -> Option<Located<ast::Expression>> {
        let loc = self.loc();
        let lhs = self.ternary_expression()?;
        let op = match self.peek() {
            Token::Equals => ast::AssignOp::Assign,
            Token::PlusEquals => ast::AssignOp::SumAssign,
            Token::MinusEquals => ast::AssignOp::DifferenceAssign,
            Token::AsterixEquals => ast::AssignOp::ProductAssign,
            Token::ForwardSlashEquals => ast::AssignOp::QuotientAssign,
            Token::PercentEquals => ast::AssignOp::RemainderAssign,
            Token::LeftShiftEquals => ast::AssignOp::LeftShiftAssign,
            Token::RightShiftEquals => ast::AssignOp::RightShiftAssign,
            Token::AmpersandEquals => ast::AssignOp::AndAssign,
            Token::VerticalBarEquals => ast::AssignOp::OrAssign,
            Token::HatEquals => ast::AssignOp::XorAssign,
            _ => return Some(lhs),
        };
        self.bump();
        let rhs = self.assignment_expression()?;
        Some(Located::new(
            ast::Expression::Assignment(op, Box::new(lhs), Box::new(rhs)),
            loc,
        ))
    }

    fn ternary_expression(&mut self) -> Option<Located<ast::Expression>> {
        let loc = self.loc();
        let cond = self.binary_expression(1)?;
        if !self.eat(&Token::QuestionMark) {
            return Some(cond);
        }
        let then_expr = self.expression()?;
        self.expect(&Token::Colon);
        let else_expr = self.assignment_expression()?;
        Some(Located::new(
            ast::Expression::Ternary(Box::new(cond), Box::new(then_expr), Box::new(else_expr)),
            loc,
        ))
    }

    fn binary_op(&self) -> Option<(ast::BinOp, u8)> {
        let entry = match self.peek() {
            Token::DoubleVerticalBar => (ast::BinOp::LogicalOr, 1),
            Token::DoubleHat => (ast::BinOp::LogicalXor, 2),
            Token::DoubleAmpersand => (ast::BinOp::LogicalAnd, 3),
            Token::VerticalBar => (ast::BinOp::BitwiseOr, 4),
            Token::Hat => (ast::BinOp::BitwiseXor, 5),
            Token::Ampersand => (ast::BinOp::BitwiseAnd, 6),
            Token::DoubleEquals => (ast::BinOp::Equality, 7),
            Token::ExclamationEquals => (ast::BinOp::Inequality, 7),
            Token::LeftAngleBracket => (ast::BinOp::LessThan, 8),
            Token::RightAngleBracket => (ast::BinOp::GreaterThan, 8),
            Token::LessEquals => (ast::BinOp::LessEqual, 8),
            Token::GreaterEquals => (ast::BinOp::GreaterEqual, 8),
            Token::LeftShift => (ast::BinOp::LeftShift, 9),
            Token::RightShift => (ast::BinOp::RightShift, 9),
            Token::Plus => (ast::BinOp::Add, 10),
            Token::Minus => (ast::BinOp::Subtract, 10),
            Token::Asterix => (ast::BinOp::Multiply, 11),
            Token::ForwardSlash => (ast::BinOp::Divide, 11),
            Token::Percent => (ast::BinOp::Modulus, 11),
            _ => return None,
        };
        Some(entry)
    }

    fn binary_expression(&mut self, min_prec: u8) -> Option<Located<ast::Expression>> {
        let loc = self.loc();
        let mut lhs = self.unary_expression()?;
        while let Some((op, prec)) = self.binary_op() {
            if prec < min_prec {
                break;
            }
            self.bump();
            let rhs = self.binary_expression(prec + 1)?;
            lhs = Located::new(
                ast::Expression::Binary(op, Box::new(lhs), Box::new(rhs)),
                loc,
            );
        }
        Some(lhs)
    }

    fn unary_expression(&mut self) -> Option<Located<ast::Expression>> {
        let loc = self.loc();
        let op = match self.peek() {
            Token::Plus => Some(ast::UnaryOp::Plus),
            Token::Minus => Some(ast::UnaryOp::Minus),
            Token::ExclamationPoint => Some(ast::UnaryOp::LogicalNot),
            Token::Tilde => Some(ast::UnaryOp::BitwiseNot),
            Token::DoublePlus => Some(ast::UnaryOp::PrefixIncrement),
            Token::DoubleMinus => Some(ast::UnaryOp::PrefixDecrement),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let inner = self.unary_expression()?;
            return Some(Located::new(ast::Expression::Unary(op, Box::new(inner)), loc));
        }
        self.postfix_expression()
    }

    fn postfix_expression(&mut self) -> Option<Located<ast::Expression>> {
        let loc = self.loc();
        let mut expr = self.primary_expression()?;
        loop {
            match self.peek() {
                Token::LeftParen => {
                    // Only names are callable
                    let name = match expr.node {
                        ast::Expression::Ident(ref name) => name.clone(),
                        _ => {
                            self.syntax_error("expression is not callable");
                            return None;
                        }
                    };
                    self.bump();
                    let mut args = Vec::new();
                    if !self.eat(&Token::RightParen) {
                        // `f(void)` is an empty argument list
                        if self.peek() == &Token::Id(Identifier("void".to_string()))
                            && self.peek_at(1) == &Token::RightParen
                        {
                            self.bump();
                        } else {
                            loop {
                                args.push(self.assignment_expression()?);
                                if !self.eat(&Token::Comma) {
                                    break;
                                }
                            }
                        }
                        self.expect(&Token::RightParen);
                    }
                    expr = Located::new(ast::Expression::Call(name, args), loc);
                }
                Token::LeftSquareBracket => {
                    self.bump();
                    let index = self.expression()?;
                    self.expect(&Token::RightSquareBracket);
                    expr = Located::new(
                        ast::Expression::Index(Box::new(expr), Box::new(index)),
                        loc,
                    );
                }
                Token::Period => {
                    self.bump();
                    let member = self.identifier()?;
                    expr = Located::new(
                        ast::Expression::Member(Box::new(expr), member.node),
                        loc,
                    );
                }
                Token::DoublePlus => {
                    self.bump();
                    expr = Located::new(
                        ast::Expression::Unary(ast::UnaryOp::PostfixIncrement, Box::new(expr)),
                        loc,
                    );
                }
                Token::DoubleMinus => {
                    self.bump();
                    expr = Located::new(
                        ast::Expression::Unary(ast::UnaryOp::PostfixDecrement, Box::new(expr)),
                        loc,
                    );
                }
                _ => return Some(expr),
            }
        }
    }

    fn primary_expression(&mut self) -> Option<Located<ast::Expression>> {
        let loc = self.loc();
        let expr = match self.peek().clone() {
            Token::LiteralInt(v) => {
                self.bump();
                ast::Expression::Literal(ast::Literal::Int(v))
            }
            Token::LiteralUInt(v) => {
                self.bump();
                ast::Expression::Literal(ast::Literal::UInt(v))
            }
            Token::LiteralFloat(v) => {
                self.bump();
                ast::Expression::Literal(ast::Literal::Float(v))
            }
            Token::True => {
                self.bump();
                ast::Expression::Literal(ast::Literal::Bool(true))
            }
            Token::False => {
                self.bump();
                ast::Expression::Literal(ast::Literal::Bool(false))
            }
            Token::Id(Identifier(name)) => {
                self.bump();
                ast::Expression::Ident(name)
            }
            Token::LeftParen => {
                self.bump();
                let inner = self.expression()?;
                self.expect(&Token::RightParen);
                return Some(inner);
            }
            Token::ReservedWord(word) => {
                self.diagnostics.report(
                    DiagnosticId::ReservedKeyword,
                    loc,
                    format!("'{}' : reserved keyword", word),
                );
                self.bump();
                return None;
            }
            other => {
                self.syntax_error(&format!("'{}' : unexpected token", other.describe()));
                return None;
            }
        };
        Some(Located::new(expr, loc))
    }

    // ------------------------------------------------------------------
    // Statements

    fn statement(&mut self) -> Option<ast::Statement> {
        match self.peek() {
            Token::Semicolon => {
                self.bump();
                Some(ast::Statement::Empty)
            }
            Token::LeftBrace => Some(ast::Statement::Block(self.block()?)),
            Token::If => self.if_statement(),
            Token::For => self.for_statement(),
            Token::While => self.while_statement(),
            Token::Do => self.do_statement(),
            Token::Switch => self.switch_statement(),
            Token::Return => {
                self.bump();
                if self.eat(&Token::Semicolon) {
                    Some(ast::Statement::Return(None))
                } else {
                    let value = self.expression()?;
                    self.expect(&Token::Semicolon);
                    Some(ast::Statement::Return(Some(value)))
                }
            }
            Token::Break => {
                self.bump();
                self.expect(&Token::Semicolon);
                Some(ast::Statement::Break)
            }
            Token::Continue => {
                self.bump();
                self.expect(&Token::Semicolon);
                Some(ast::Statement::Continue)
            }
            Token::Discard => {
                self.bump();
                self.expect(&Token::Semicolon);
                Some(ast::Statement::Discard)
            }
            Token::Precision => {
                let (precision, specifier) = self.precision_declaration()?;
                Some(ast::Statement::Precision(precision, specifier))
            }
            _ if self.peek_is_type_start() => {
                let def = self.var_def()?;
                self.expect(&Token::Semicolon);
                Some(ast::Statement::Var(def))
            }
            _ => {
                let expr = self.expression()?;
                self.expect(&Token::Semicolon);
                Some(ast::Statement::Expression(expr))
            }
        }
    }

    fn block(&mut self) -> Option<Vec<ast::Statement>> {
        self.expect(&Token::LeftBrace);
        let mut statements = Vec::new();
        while self.peek() != &Token::RightBrace && self.peek() != &Token::Eof {
            match self.statement() {
                Some(statement) => statements.push(statement),
                None => self.recover(),
            }
        }
        self.expect(&Token::RightBrace);
        Some(statements)
    }

    fn if_statement(&mut self) -> Option<ast::Statement> {
        self.expect(&Token::If);
        self.expect(&Token::LeftParen);
        let cond = self.expression()?;
        self.expect(&Token::RightParen);
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.eat(&Token::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Some(ast::Statement::If(cond, then_branch, else_branch))
    }

    fn for_statement(&mut self) -> Option<ast::Statement> {
        self.expect(&Token::For);
        self.expect(&Token::LeftParen);
        let init = if self.eat(&Token::Semicolon) {
            ast::ForInit::Empty
        } else if self.peek_is_type_start() {
            let def = self.var_def()?;
            self.expect(&Token::Semicolon);
            ast::ForInit::Definition(def)
        } else {
            let expr = self.expression()?;
            self.expect(&Token::Semicolon);
            ast::ForInit::Expression(expr)
        };
        let cond = if self.peek() == &Token::Semicolon {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&Token::Semicolon);
        let step = if self.peek() == &Token::RightParen {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&Token::RightParen);
        let body = Box::new(self.statement()?);
        Some(ast::Statement::For(init, cond, step, body))
    }

    fn while_statement(&mut self) -> Option<ast::Statement> {
        self.expect(&Token::While);
        self.expect(&Token::LeftParen);
        let cond = self.expression()?;
        self.expect(&Token::RightParen);
        let body = Box::new(self.statement()?);
        Some(ast::Statement::While(cond, body))
    }

    fn do_statement(&mut self) -> Option<ast::Statement> {
        self.expect(&Token::Do);
        let body = Box::new(self.statement()?);
        self.expect(&Token::While);
        self.expect(&Token::LeftParen);
        let cond = self.expression()?;
        self.expect(&Token::RightParen);
        self.expect(&Token::Semicolon);
        Some(ast::Statement::DoWhile(body, cond))
    }

    fn switch_statement(&mut self) -> Option<ast::Statement> {
        self.expect(&Token::Switch);
        self.expect(&Token::LeftParen);
        let value = self.expression()?;
        self.expect(&Token::RightParen);
        self.expect(&Token::LeftBrace);
        let mut cases = Vec::new();
        while self.peek() != &Token::RightBrace && self.peek() != &Token::Eof {
            let label = match self.peek() {
                Token::Case => {
                    self.bump();
                    let value = self.expression()?;
                    self.expect(&Token::Colon);
                    ast::CaseLabel::Case(value)
                }
                Token::Default => {
                    self.bump();
                    self.expect(&Token::Colon);
                    ast::CaseLabel::Default
                }
                _ => {
                    self.syntax_error("expected 'case' or 'default' label");
                    self.recover();
                    continue;
                }
            };
            let mut statements = Vec::new();
            while !matches!(
                self.peek(),
                Token::Case | Token::Default | Token::RightBrace | Token::Eof
            ) {
                match self.statement() {
                    Some(statement) => statements.push(statement),
                    None => self.recover(),
                }
            }
            cases.push(ast::SwitchCase { label, statements });
        }
        self.expect(&Token::RightBrace);
        Some(ast::Statement::Switch(value, cases))
    }

    // ------------------------------------------------------------------
    // Declarations

    fn var_def(&mut self) -> Option<ast::VarDef> {
        let ty = self.type_name()?;
        let mut declarators = Vec::new();
        // A bare struct definition can stand without declarators
        if self.peek() != &Token::Semicolon {
            loop {
                let name = self.identifier()?;
                let array_sizes = self.array_sizes();
                let init = if self.eat(&Token::Equals) {
                    Some(self.expression_no_comma()?)
                } else {
                    None
                };
                declarators.push(ast::InitDeclarator {
                    name,
                    array_sizes,
                    init,
                });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        Some(ast::VarDef { ty, declarators })
    }

    fn function_params(&mut self) -> Option<Vec<ast::FunctionParam>> {
        self.expect(&Token::LeftParen);
        let mut params = Vec::new();
        if self.eat(&Token::RightParen) {
            return Some(params);
        }
        // `f(void)` declares no parameters
        if self.peek() == &Token::Id(Identifier("void".to_string()))
            && self.peek_at(1) == &Token::RightParen
        {
            self.bump();
            self.bump();
            return Some(params);
        }
        loop {
            let direction = match self.peek() {
                Token::In if !self.peek_at_is_qualifier_or_type(1) => None,
                Token::In => {
                    self.bump();
                    Some(ast::ParamDirection::In)
                }
                Token::Out => {
                    self.bump();
                    Some(ast::ParamDirection::Out)
                }
                Token::InOut => {
                    self.bump();
                    Some(ast::ParamDirection::InOut)
                }
                _ => None,
            };
            let ty = self.type_name()?;
            let name = match self.peek() {
                Token::Id(_) => self.identifier(),
                _ => None,
            };
            let array_sizes = self.array_sizes();
            params.push(ast::FunctionParam {
                direction,
                ty,
                name,
                array_sizes,
            });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RightParen);
        Some(params)
    }

    fn peek_at_is_qualifier_or_type(&self, offset: usize) -> bool {
        match self.peek_at(offset) {
            Token::Const | Token::Lowp | Token::Mediump | Token::Highp => true,
            Token::Id(Identifier(name)) => {
                builtin_type(name).is_some() || self.struct_names.contains(name)
            }
            _ => false,
        }
    }

    fn interface_block(&mut self, layout: Option<ast::LayoutQualifier>) -> Option<ast::InterfaceBlockDef> {
        // caller consumed qualifiers up to and including the storage keyword
        let name = self.identifier()?;
        self.expect(&Token::LeftBrace);
        let mut members = Vec::new();
        while self.peek() != &Token::RightBrace && self.peek() != &Token::Eof {
            match self.struct_member() {
                Some(member) => members.push(member),
                None => self.recover(),
            }
        }
        self.expect(&Token::RightBrace);
        let instance = match self.peek() {
            Token::Id(_) => {
                let instance_name = self.identifier()?;
                let sizes = self.array_sizes();
                Some((instance_name, sizes))
            }
            _ => None,
        };
        self.expect(&Token::Semicolon);
        Some(ast::InterfaceBlockDef {
            layout,
            storage: ast::StorageQualifier::Uniform,
            name,
            members,
            instance,
        })
    }

    fn precision_declaration(&mut self) -> Option<(ast::Precision, Located<ast::TypeSpecifier>)> {
        self.expect(&Token::Precision);
        let precision = match self.bump() {
            Token::Lowp => ast::Precision::Lowp,
            Token::Mediump => ast::Precision::Mediump,
            Token::Highp => ast::Precision::Highp,
            other => {
                self.syntax_error(&format!(
                    "'{}' : expected precision qualifier",
                    other.describe()
                ));
                return None;
            }
        };
        let loc = self.loc();
        let specifier = self.type_specifier()?;
        self.expect(&Token::Semicolon);
        Some((precision, Located::new(specifier, loc)))
    }

    fn root_definition(&mut self) -> Option<ast::RootDefinition> {
        match self.peek() {
            Token::Precision => {
                let (precision, specifier) = self.precision_declaration()?;
                return Some(ast::RootDefinition::Precision(precision, specifier.node));
            }
            // `invariant gl_Position;` without a type re-declares a builtin
            Token::Invariant if matches!(self.peek_at(1), Token::Id(_)) && self.peek_at(2) == &Token::Semicolon => {
                self.bump();
                let name = self.identifier()?;
                self.expect(&Token::Semicolon);
                return Some(ast::RootDefinition::InvariantRedeclaration(name));
            }
            _ => {}
        }

        // Interface block: qualifiers, `uniform`, a name, then `{`
        {
            let mut offset = 0;
            let mut layout_present = false;
            if self.peek() == &Token::Layout {
                // skip the parenthesized list
                layout_present = true;
                offset = 1;
                if self.peek_at(offset) == &Token::LeftParen {
                    let mut depth = 0;
                    loop {
                        match self.peek_at(offset) {
                            Token::LeftParen => depth += 1,
                            Token::RightParen => {
                                depth -= 1;
                                if depth == 0 {
                                    offset += 1;
                                    break;
                                }
                            }
                            Token::Eof => break,
                            _ => {}
                        }
                        offset += 1;
                    }
                }
            }
            if self.peek_at(offset) == &Token::Uniform
                && matches!(self.peek_at(offset + 1), Token::Id(_))
                && self.peek_at(offset + 2) == &Token::LeftBrace
            {
                let layout = if layout_present {
                    self.bump();
                    Some(self.layout_qualifier())
                } else {
                    None
                };
                self.expect(&Token::Uniform);
                return self.interface_block(layout).map(ast::RootDefinition::Block);
            }
        }

        let ty = self.type_name()?;

        // Bare struct definition
        if self.peek() == &Token::Semicolon {
            self.bump();
            return match ty.specifier {
                ast::TypeSpecifier::Struct(def) => Some(ast::RootDefinition::Struct(def)),
                _ => Some(ast::RootDefinition::Var(ast::VarDef {
                    ty,
                    declarators: Vec::new(),
                })),
            };
        }

        let name = self.identifier()?;

        // Function definition or prototype
        if self.peek() == &Token::LeftParen {
            let params = self.function_params()?;
            let body = if self.eat(&Token::Semicolon) {
                None
            } else {
                Some(self.block()?)
            };
            return Some(ast::RootDefinition::Function(ast::FunctionDefinition {
                returntype: ty,
                name,
                params,
                body,
            }));
        }

        // Variable declaration list
        let mut declarators = Vec::new();
        let mut pending_name = Some(name);
        loop {
            let name = match pending_name.take() {
                Some(name) => name,
                None => self.identifier()?,
            };
            let array_sizes = self.array_sizes();
            let init = if self.eat(&Token::Equals) {
                Some(self.expression_no_comma()?)
            } else {
                None
            };
            declarators.push(ast::InitDeclarator {
                name,
                array_sizes,
                init,
            });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::Semicolon);
        Some(ast::RootDefinition::Var(ast::VarDef { ty, declarators }))
    }

    fn translation_unit(&mut self) -> ast::TranslationUnit {
        let mut unit = ast::TranslationUnit::default();
        while self.peek() != &Token::Eof {
            let loc = self.loc();
            match self.root_definition() {
                Some(def) => unit.defs.push(Located::new(def, loc)),
                None => self.recover(),
            }
        }
        unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esslt_lang_tok::Tokens;

    fn parse_str(code: &str) -> (ast::TranslationUnit, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let text = esslt_transform_preprocess::PreprocessedText {
            code: code.to_string(),
            lines: code
                .split('\n')
                .enumerate()
                .map(|(i, _)| SourceLocation::new(0, i as u32 + 1))
                .collect(),
        };
        let tokens: Tokens = esslt_transform_lexer::lex(&text, &mut diagnostics);
        let unit = parse(&tokens, &mut diagnostics);
        (unit, diagnostics)
    }

    #[test]
    fn parses_global_declaration() {
        let (unit, diags) = parse_str("uniform mediump vec3 lightDir;");
        assert!(!diags.has_errors());
        assert_eq!(unit.defs.len(), 1);
        match unit.defs[0].node {
            ast::RootDefinition::Var(ref def) => {
                assert_eq!(def.ty.storage, Some(ast::StorageQualifier::Uniform));
                assert_eq!(def.ty.precision, Some(ast::Precision::Mediump));
                assert_eq!(
                    def.ty.specifier,
                    ast::TypeSpecifier::Vector(ast::Scalar::Float, 3)
                );
                assert_eq!(def.declarators[0].name.node, "lightDir");
            }
            ref other => panic!("expected var, got {:?}", other),
        }
    }

    #[test]
    fn parses_function_definition() {
        let (unit, diags) = parse_str("float half_of(float x) { return x * 0.5; }");
        assert!(!diags.has_errors());
        match unit.defs[0].node {
            ast::RootDefinition::Function(ref def) => {
                assert_eq!(def.name.node, "half_of");
                assert_eq!(def.params.len(), 1);
                assert!(def.body.is_some());
            }
            ref other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn parses_prototype() {
        let (unit, diags) = parse_str("float f(float a);");
        assert!(!diags.has_errors());
        match unit.defs[0].node {
            ast::RootDefinition::Function(ref def) => assert!(def.body.is_none()),
            ref other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn parses_struct_and_use() {
        let source = "struct Light { vec3 dir; float power; }; uniform Light light;";
        let (unit, diags) = parse_str(source);
        assert!(!diags.has_errors());
        assert_eq!(unit.defs.len(), 2);
        match unit.defs[1].node {
            ast::RootDefinition::Var(ref def) => {
                assert_eq!(def.ty.specifier, ast::TypeSpecifier::Named("Light".to_string()));
            }
            ref other => panic!("expected var, got {:?}", other),
        }
    }

    #[test]
    fn parses_precedence() {
        let (unit, diags) = parse_str("void main() { float x = 1.0 + 2.0 * 3.0; }");
        assert!(!diags.has_errors());
        let body = match unit.defs[0].node {
            ast::RootDefinition::Function(ref def) => def.body.as_ref().unwrap(),
            ref other => panic!("expected function, got {:?}", other),
        };
        let init = match body[0] {
            ast::Statement::Var(ref def) => def.declarators[0].init.as_ref().unwrap(),
            ref other => panic!("expected var, got {:?}", other),
        };
        match init.node {
            ast::Expression::Binary(ast::BinOp::Add, _, ref rhs) => match rhs.node {
                ast::Expression::Binary(ast::BinOp::Multiply, _, _) => {}
                ref other => panic!("expected multiply on rhs, got {:?}", other),
            },
            ref other => panic!("expected add at root, got {:?}", other),
        }
    }

    #[test]
    fn parses_control_flow() {
        let source = "void main() {\
            for (int i = 0; i < 4; ++i) { if (i == 2) continue; }\
            while (true) { break; }\
            do { } while (false);\
        }";
        let (_, diags) = parse_str(source);
        assert!(!diags.has_errors());
    }

    #[test]
    fn parses_switch() {
        let source = "void main() { switch (x) { case 1: break; default: break; } }";
        let (_, diags) = parse_str(source);
        assert!(!diags.has_errors());
    }

    #[test]
    fn parses_array_declarators() {
        let (unit, diags) = parse_str("uniform vec4 colors[4];");
        assert!(!diags.has_errors());
        match unit.defs[0].node {
            ast::RootDefinition::Var(ref def) => {
                assert_eq!(def.declarators[0].array_sizes.len(), 1);
            }
            ref other => panic!("expected var, got {:?}", other),
        }
    }

    #[test]
    fn parses_interface_block() {
        let source = "layout(std140) uniform Matrices { mat4 view; mat4 proj; } mats;";
        let (unit, diags) = parse_str(source);
        assert!(!diags.has_errors());
        match unit.defs[0].node {
            ast::RootDefinition::Block(ref block) => {
                assert_eq!(block.name.node, "Matrices");
                assert_eq!(block.members.len(), 2);
                assert!(block.instance.is_some());
            }
            ref other => panic!("expected block, got {:?}", other),
        }
    }

    #[test]
    fn parses_precision_statement() {
        let (unit, diags) = parse_str("precision mediump float;");
        assert!(!diags.has_errors());
        assert!(matches!(
            unit.defs[0].node,
            ast::RootDefinition::Precision(ast::Precision::Mediump, _)
        ));
    }

    #[test]
    fn parses_precision_in_statement_position() {
        let (unit, diags) = parse_str("void main() { precision lowp sampler2D; }");
        assert!(!diags.has_errors());
        let body = match unit.defs[0].node {
            ast::RootDefinition::Function(ref def) => def.body.as_ref().unwrap(),
            ref other => panic!("expected function, got {:?}", other),
        };
        assert!(matches!(
            body[0],
            ast::Statement::Precision(ast::Precision::Lowp, _)
        ));
    }

    #[test]
    fn parses_invariant_redeclaration() {
        let (unit, diags) = parse_str("invariant gl_Position;");
        assert!(!diags.has_errors());
        assert!(matches!(
            unit.defs[0].node,
            ast::RootDefinition::InvariantRedeclaration(_)
        ));
    }

    #[test]
    fn reserved_keyword_reported() {
        let (_, diags) = parse_str("void main() { int typedef; }");
        assert!(diags.contains(DiagnosticId::ReservedKeyword));
    }

    #[test]
    fn recovers_after_bad_statement() {
        let (unit, diags) = parse_str("void main() { float x = ; } float ok() { return 1.0; }");
        assert!(diags.has_errors());
        assert_eq!(unit.defs.len(), 2);
    }

    #[test]
    fn unknown_type_reported() {
        let (_, diags) = parse_str("Widget w;");
        assert!(diags.has_errors());
    }

    #[test]
    fn parses_ternary_and_comma() {
        let (_, diags) = parse_str("void main() { int a = 1; int b = a > 0 ? 1 : 2; a = (a, b); }");
        assert!(!diags.has_errors());
    }
}

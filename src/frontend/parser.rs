use thiserror::Error;

use crate::{
    frontend::{
        SourceFile,
        intern::InternedSymbol,
        lexer::{Keyword, LexError, Lexer, Token, TokenKind},
        syntax::{Node, NodeId, NodeKind},
    },
    index::Index,
};

/// Hand written recursive descent parser for C--. It builds the syntax tree
/// consumed by the analyzer and stops at the first lexical or syntax error.
///
/// List productions (`ExtDefList`, `DefList`, `Args`, ...) are flattened: the
/// list node holds its items directly without the separating tokens.
#[derive(Debug)]
pub struct Parser<'source> {
    lexer: Lexer<'source>,
    next_node_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lexical(#[from] LexError),
    #[error("Error type B at Line {line}: {message}.")]
    Syntax { line: usize, message: String },
}

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            ParseError::Lexical(error) => error.line,
            ParseError::Syntax { line, .. } => *line,
        }
    }
}

type Result<T> = std::result::Result<T, ParseError>;

impl<'source> Parser<'source> {
    pub fn parse_program(source_file: &'source SourceFile) -> Result<Node> {
        let mut parser = Self {
            lexer: Lexer::new(source_file),
            next_node_id: 0,
        };

        let line = parser.lexer.peek()?.map(|t| t.line).unwrap_or(1);
        let mut definitions = Vec::new();

        while parser.lexer.peek()?.is_some() {
            definitions.push(parser.parse_ext_def()?);
        }

        let list = parser.node(NodeKind::ExtDefList, line, definitions);
        Ok(parser.node(NodeKind::Program, line, vec![list]))
    }

    fn create_node_id(&mut self) -> NodeId {
        let id = NodeId::new(self.next_node_id as usize);
        self.next_node_id += 1;
        id
    }

    fn node(&mut self, kind: NodeKind, line: usize, children: Vec<Node>) -> Node {
        Node {
            id: self.create_node_id(),
            kind,
            line,
            children,
        }
    }

    fn terminal(&mut self, token: Token) -> Node {
        let kind = match token.kind {
            TokenKind::Keyword(Keyword::Struct) => NodeKind::Struct,
            TokenKind::Keyword(Keyword::Return) => NodeKind::Return,
            TokenKind::Keyword(Keyword::If) => NodeKind::If,
            TokenKind::Keyword(Keyword::Else) => NodeKind::Else,
            TokenKind::Keyword(Keyword::While) => NodeKind::While,
            TokenKind::Type(meta) => NodeKind::Type(meta),
            TokenKind::Identifier => {
                NodeKind::Id(InternedSymbol::new(self.lexer.value_of_span(token.span)))
            }
            TokenKind::IntegerLiteral(value) => NodeKind::Int(value),
            TokenKind::FloatLiteral(value) => NodeKind::Float(value),
            TokenKind::OpenParen => NodeKind::Lp,
            TokenKind::CloseParen => NodeKind::Rp,
            TokenKind::OpenBracket => NodeKind::Lb,
            TokenKind::CloseBracket => NodeKind::Rb,
            TokenKind::OpenBrace => NodeKind::Lc,
            TokenKind::CloseBrace => NodeKind::Rc,
            TokenKind::Semicolon => NodeKind::Semi,
            TokenKind::Comma => NodeKind::Comma,
            TokenKind::Dot => NodeKind::Dot,
            TokenKind::Equals => NodeKind::AssignOp,
            TokenKind::Plus => NodeKind::Plus,
            TokenKind::Minus => NodeKind::Minus,
            TokenKind::Asterisk => NodeKind::Star,
            TokenKind::Divide => NodeKind::Div,
            TokenKind::LogicalAnd => NodeKind::And,
            TokenKind::LogicalOr => NodeKind::Or,
            TokenKind::Bang => NodeKind::Not,
            TokenKind::Relop(relop) => NodeKind::Relop(relop),
        };

        self.node(kind, token.line, Vec::new())
    }

    fn syntax_error<T>(&self, line: usize, message: impl Into<String>) -> Result<T> {
        Err(ParseError::Syntax {
            line,
            message: message.into(),
        })
    }

    fn describe(&self, token: Token) -> String {
        format!("\"{}\"", self.lexer.value_of_span(token.span))
    }

    fn expect_peek(&mut self, expecting: &str) -> Result<Token> {
        match self.lexer.peek()? {
            Some(token) => Ok(token),
            None => self.syntax_error(
                self.lexer.line_number(),
                format!("Expected {expecting} but reached end of file"),
            ),
        }
    }

    fn expect_next(&mut self, expecting: &str) -> Result<Token> {
        let token = self.expect_peek(expecting)?;
        self.lexer.next()?;
        Ok(token)
    }

    /// Consumes the next token if it has the given kind and returns it as a
    /// terminal node
    fn expect_terminal(&mut self, kind: TokenKind, expecting: &str) -> Result<Node> {
        let token = self.expect_next(expecting)?;

        if token.kind != kind {
            return self.syntax_error(
                token.line,
                format!("Expected {expecting} but found {}", self.describe(token)),
            );
        }

        Ok(self.terminal(token))
    }

    fn peek_is(&mut self, kind: TokenKind) -> Result<bool> {
        Ok(self.lexer.peek()?.is_some_and(|t| t.kind == kind))
    }

    fn peek_nth_is(&mut self, n: usize, kind: TokenKind) -> Result<bool> {
        Ok(self.lexer.peek_nth(n)?.is_some_and(|t| t.kind == kind))
    }

    fn peek_starts_specifier(&mut self) -> Result<bool> {
        Ok(self.lexer.peek()?.is_some_and(|t| {
            matches!(
                t.kind,
                TokenKind::Type(_) | TokenKind::Keyword(Keyword::Struct)
            )
        }))
    }

    /// Specifier ExtDecList ";" | Specifier ";" | Specifier FunDec CompSt | Specifier FunDec ";"
    fn parse_ext_def(&mut self) -> Result<Node> {
        let specifier = self.parse_specifier()?;
        let line = specifier.line;

        if self.peek_is(TokenKind::Semicolon)? {
            let semi = self.expect_terminal(TokenKind::Semicolon, "\";\"")?;
            return Ok(self.node(NodeKind::ExtDef, line, vec![specifier, semi]));
        }

        if self.peek_is(TokenKind::Identifier)? && self.peek_nth_is(1, TokenKind::OpenParen)? {
            let fun_dec = self.parse_fun_dec()?;

            let body = if self.peek_is(TokenKind::Semicolon)? {
                self.expect_terminal(TokenKind::Semicolon, "\";\"")?
            } else {
                self.parse_comp_st()?
            };

            return Ok(self.node(NodeKind::ExtDef, line, vec![specifier, fun_dec, body]));
        }

        let first = self.parse_var_dec()?;
        let list_line = first.line;
        let mut declarations = vec![first];

        while self.peek_is(TokenKind::Comma)? {
            self.lexer.next()?;
            declarations.push(self.parse_var_dec()?);
        }

        let list = self.node(NodeKind::ExtDecList, list_line, declarations);
        let semi = self.expect_terminal(TokenKind::Semicolon, "\";\"")?;

        Ok(self.node(NodeKind::ExtDef, line, vec![specifier, list, semi]))
    }

    /// int | float | StructSpecifier
    fn parse_specifier(&mut self) -> Result<Node> {
        let token = self.expect_peek("type specifier")?;

        let child = match token.kind {
            TokenKind::Type(_) => {
                self.lexer.next()?;
                self.terminal(token)
            }
            TokenKind::Keyword(Keyword::Struct) => self.parse_struct_specifier()?,
            _ => {
                return self.syntax_error(
                    token.line,
                    format!("Expected type specifier but found {}", self.describe(token)),
                );
            }
        };

        Ok(self.node(NodeKind::Specifier, token.line, vec![child]))
    }

    /// struct OptTag { DefList } | struct Tag
    fn parse_struct_specifier(&mut self) -> Result<Node> {
        let keyword = self.expect_terminal(TokenKind::Keyword(Keyword::Struct), "\"struct\"")?;
        let line = keyword.line;

        let has_name = self.peek_is(TokenKind::Identifier)?;
        let has_body = if has_name {
            self.peek_nth_is(1, TokenKind::OpenBrace)?
        } else {
            self.peek_is(TokenKind::OpenBrace)?
        };

        if !has_body {
            let name = self.expect_terminal(TokenKind::Identifier, "struct tag")?;
            let tag = self.node(NodeKind::Tag, name.line, vec![name]);
            return Ok(self.node(NodeKind::StructSpecifier, line, vec![keyword, tag]));
        }

        let opt_tag = if has_name {
            let name = self.expect_terminal(TokenKind::Identifier, "struct tag")?;
            self.node(NodeKind::OptTag, name.line, vec![name])
        } else {
            self.node(NodeKind::OptTag, line, Vec::new())
        };

        let lc = self.expect_terminal(TokenKind::OpenBrace, "\"{\"")?;
        let definitions = self.parse_def_list()?;
        let rc = self.expect_terminal(TokenKind::CloseBrace, "\"}\"")?;

        Ok(self.node(
            NodeKind::StructSpecifier,
            line,
            vec![keyword, opt_tag, lc, definitions, rc],
        ))
    }

    /// ID | VarDec [ INT ]
    fn parse_var_dec(&mut self) -> Result<Node> {
        let name = self.expect_terminal(TokenKind::Identifier, "identifier")?;
        let line = name.line;
        let mut var_dec = self.node(NodeKind::VarDec, line, vec![name]);

        while self.peek_is(TokenKind::OpenBracket)? {
            let lb = self.expect_terminal(TokenKind::OpenBracket, "\"[\"")?;

            let token = self.expect_next("array length")?;
            let TokenKind::IntegerLiteral(_) = token.kind else {
                return self.syntax_error(
                    token.line,
                    format!("Expected array length but found {}", self.describe(token)),
                );
            };
            let length = self.terminal(token);

            let rb = self.expect_terminal(TokenKind::CloseBracket, "\"]\"")?;
            var_dec = self.node(NodeKind::VarDec, line, vec![var_dec, lb, length, rb]);
        }

        Ok(var_dec)
    }

    /// ID ( VarList ) | ID ( )
    fn parse_fun_dec(&mut self) -> Result<Node> {
        let name = self.expect_terminal(TokenKind::Identifier, "function name")?;
        let line = name.line;
        let lp = self.expect_terminal(TokenKind::OpenParen, "\"(\"")?;

        if self.peek_is(TokenKind::CloseParen)? {
            let rp = self.expect_terminal(TokenKind::CloseParen, "\")\"")?;
            return Ok(self.node(NodeKind::FunDec, line, vec![name, lp, rp]));
        }

        let mut parameters = vec![self.parse_param_dec()?];
        while self.peek_is(TokenKind::Comma)? {
            self.lexer.next()?;
            parameters.push(self.parse_param_dec()?);
        }

        let list_line = parameters[0].line;
        let var_list = self.node(NodeKind::VarList, list_line, parameters);
        let rp = self.expect_terminal(TokenKind::CloseParen, "\")\"")?;

        Ok(self.node(NodeKind::FunDec, line, vec![name, lp, var_list, rp]))
    }

    /// Specifier VarDec
    fn parse_param_dec(&mut self) -> Result<Node> {
        let specifier = self.parse_specifier()?;
        let line = specifier.line;
        let var_dec = self.parse_var_dec()?;

        Ok(self.node(NodeKind::ParamDec, line, vec![specifier, var_dec]))
    }

    /// { DefList StmtList }
    fn parse_comp_st(&mut self) -> Result<Node> {
        let lc = self.expect_terminal(TokenKind::OpenBrace, "\"{\"")?;
        let line = lc.line;
        let definitions = self.parse_def_list()?;

        let list_line = self.lexer.peek()?.map(|t| t.line).unwrap_or(line);
        let mut statements = Vec::new();
        while !self.peek_is(TokenKind::CloseBrace)? {
            if self.peek_starts_specifier()? {
                let token = self.expect_peek("statement")?;
                return self.syntax_error(
                    token.line,
                    "Definitions must appear before statements in a block",
                );
            }

            statements.push(self.parse_stmt()?);
        }
        let statements = self.node(NodeKind::StmtList, list_line, statements);

        let rc = self.expect_terminal(TokenKind::CloseBrace, "\"}\"")?;

        Ok(self.node(NodeKind::CompSt, line, vec![lc, definitions, statements, rc]))
    }

    fn parse_def_list(&mut self) -> Result<Node> {
        let line = self
            .lexer
            .peek()?
            .map(|t| t.line)
            .unwrap_or(self.lexer.line_number());
        let mut definitions = Vec::new();

        while self.peek_starts_specifier()? {
            definitions.push(self.parse_def()?);
        }

        Ok(self.node(NodeKind::DefList, line, definitions))
    }

    /// Specifier DecList ;
    fn parse_def(&mut self) -> Result<Node> {
        let specifier = self.parse_specifier()?;
        let line = specifier.line;

        let mut declarations = vec![self.parse_dec()?];
        while self.peek_is(TokenKind::Comma)? {
            self.lexer.next()?;
            declarations.push(self.parse_dec()?);
        }

        let list_line = declarations[0].line;
        let list = self.node(NodeKind::DecList, list_line, declarations);
        let semi = self.expect_terminal(TokenKind::Semicolon, "\";\"")?;

        Ok(self.node(NodeKind::Def, line, vec![specifier, list, semi]))
    }

    /// VarDec | VarDec = Exp
    fn parse_dec(&mut self) -> Result<Node> {
        let var_dec = self.parse_var_dec()?;
        let line = var_dec.line;

        if !self.peek_is(TokenKind::Equals)? {
            return Ok(self.node(NodeKind::Dec, line, vec![var_dec]));
        }

        let assign = self.expect_terminal(TokenKind::Equals, "\"=\"")?;
        let value = self.parse_expression()?;

        Ok(self.node(NodeKind::Dec, line, vec![var_dec, assign, value]))
    }

    fn parse_stmt(&mut self) -> Result<Node> {
        let token = self.expect_peek("statement")?;
        let line = token.line;

        let children = match token.kind {
            TokenKind::OpenBrace => vec![self.parse_comp_st()?],
            TokenKind::Keyword(Keyword::Return) => {
                let keyword = self.expect_terminal(token.kind, "\"return\"")?;
                let value = self.parse_expression()?;
                let semi = self.expect_terminal(TokenKind::Semicolon, "\";\"")?;
                vec![keyword, value, semi]
            }
            TokenKind::Keyword(Keyword::If) => {
                let keyword = self.expect_terminal(token.kind, "\"if\"")?;
                let lp = self.expect_terminal(TokenKind::OpenParen, "\"(\"")?;
                let condition = self.parse_expression()?;
                let rp = self.expect_terminal(TokenKind::CloseParen, "\")\"")?;
                let then = self.parse_stmt()?;

                let mut children = vec![keyword, lp, condition, rp, then];

                // A dangling else binds to the nearest if
                if self.peek_is(TokenKind::Keyword(Keyword::Else))? {
                    children.push(
                        self.expect_terminal(TokenKind::Keyword(Keyword::Else), "\"else\"")?,
                    );
                    children.push(self.parse_stmt()?);
                }

                children
            }
            TokenKind::Keyword(Keyword::While) => {
                let keyword = self.expect_terminal(token.kind, "\"while\"")?;
                let lp = self.expect_terminal(TokenKind::OpenParen, "\"(\"")?;
                let condition = self.parse_expression()?;
                let rp = self.expect_terminal(TokenKind::CloseParen, "\")\"")?;
                let body = self.parse_stmt()?;
                vec![keyword, lp, condition, rp, body]
            }
            TokenKind::Keyword(Keyword::Else) => {
                return self.syntax_error(line, "\"else\" without a matching \"if\"");
            }
            _ => {
                let expression = self.parse_expression()?;
                let semi = self.expect_terminal(TokenKind::Semicolon, "\";\"")?;
                vec![expression, semi]
            }
        };

        Ok(self.node(NodeKind::Stmt, line, children))
    }

    /// Assignment is the loosest binding operator and associates to the right
    fn parse_expression(&mut self) -> Result<Node> {
        let lhs = self.parse_binary(0)?;

        if !self.peek_is(TokenKind::Equals)? {
            return Ok(lhs);
        }

        let line = lhs.line;
        let assign = self.expect_terminal(TokenKind::Equals, "\"=\"")?;
        let rhs = self.parse_expression()?;

        Ok(self.node(NodeKind::Exp, line, vec![lhs, assign, rhs]))
    }

    /// Precedence climbing over the left associative binary operators
    fn parse_binary(&mut self, level: usize) -> Result<Node> {
        const LEVELS: usize = 5;

        fn operator_level(kind: TokenKind) -> Option<usize> {
            match kind {
                TokenKind::LogicalOr => Some(0),
                TokenKind::LogicalAnd => Some(1),
                TokenKind::Relop(_) => Some(2),
                TokenKind::Plus | TokenKind::Minus => Some(3),
                TokenKind::Asterisk | TokenKind::Divide => Some(4),
                _ => None,
            }
        }

        if level == LEVELS {
            return self.parse_unary();
        }

        let mut lhs = self.parse_binary(level + 1)?;

        while let Some(token) = self.lexer.peek()? {
            if operator_level(token.kind) != Some(level) {
                break;
            }

            self.lexer.next()?;
            let operator = self.terminal(token);
            let rhs = self.parse_binary(level + 1)?;
            let line = lhs.line;

            lhs = self.node(NodeKind::Exp, line, vec![lhs, operator, rhs]);
        }

        Ok(lhs)
    }

    /// - Exp | ! Exp | postfix
    fn parse_unary(&mut self) -> Result<Node> {
        let token = self.expect_peek("expression")?;

        match token.kind {
            TokenKind::Minus | TokenKind::Bang => {
                self.lexer.next()?;
                let operator = self.terminal(token);
                let operand = self.parse_unary()?;
                Ok(self.node(NodeKind::Exp, token.line, vec![operator, operand]))
            }
            _ => self.parse_postfix(),
        }
    }

    /// Exp [ Exp ] | Exp . ID
    fn parse_postfix(&mut self) -> Result<Node> {
        let mut expression = self.parse_primary()?;

        loop {
            let line = expression.line;

            if self.peek_is(TokenKind::OpenBracket)? {
                let lb = self.expect_terminal(TokenKind::OpenBracket, "\"[\"")?;
                let index = self.parse_expression()?;
                let rb = self.expect_terminal(TokenKind::CloseBracket, "\"]\"")?;

                expression = self.node(NodeKind::Exp, line, vec![expression, lb, index, rb]);
            } else if self.peek_is(TokenKind::Dot)? {
                let dot = self.expect_terminal(TokenKind::Dot, "\".\"")?;
                let member = self.expect_terminal(TokenKind::Identifier, "member name")?;

                expression = self.node(NodeKind::Exp, line, vec![expression, dot, member]);
            } else {
                return Ok(expression);
            }
        }
    }

    /// INT | FLOAT | ID | ID ( Args ) | ID ( ) | ( Exp )
    fn parse_primary(&mut self) -> Result<Node> {
        let token = self.expect_next("expression")?;
        let line = token.line;

        let children = match token.kind {
            TokenKind::IntegerLiteral(_) | TokenKind::FloatLiteral(_) => {
                vec![self.terminal(token)]
            }
            TokenKind::OpenParen => {
                let lp = self.terminal(token);
                let inner = self.parse_expression()?;
                let rp = self.expect_terminal(TokenKind::CloseParen, "\")\"")?;
                vec![lp, inner, rp]
            }
            TokenKind::Identifier if self.peek_is(TokenKind::OpenParen)? => {
                let name = self.terminal(token);
                let lp = self.expect_terminal(TokenKind::OpenParen, "\"(\"")?;

                if self.peek_is(TokenKind::CloseParen)? {
                    let rp = self.expect_terminal(TokenKind::CloseParen, "\")\"")?;
                    vec![name, lp, rp]
                } else {
                    let mut arguments = vec![self.parse_expression()?];
                    while self.peek_is(TokenKind::Comma)? {
                        self.lexer.next()?;
                        arguments.push(self.parse_expression()?);
                    }

                    let list_line = arguments[0].line;
                    let args = self.node(NodeKind::Args, list_line, arguments);
                    let rp = self.expect_terminal(TokenKind::CloseParen, "\")\"")?;
                    vec![name, lp, args, rp]
                }
            }
            TokenKind::Identifier => vec![self.terminal(token)],
            _ => {
                return self.syntax_error(
                    line,
                    format!("Expected expression but found {}", self.describe(token)),
                );
            }
        };

        Ok(self.node(NodeKind::Exp, line, children))
    }
}

//! Recursive-descent parser: turns a [`Token`] stream into a [`Template`].
//!
//! Expression precedence, loosest to tightest:
//! `ternary -> or -> and -> comparison (==, !=, <, <=, >, >=, in, not in, matches,
//! starts with, ends with, is [not] <test>, ??) -> additive (+, -, ~) -> multiplicative
//! (*, /, %) -> power (^) -> unary (not, -, +) -> postfix (.attr, [expr], (call), |filter) ->
//! primary`.

use crate::ast::{AttrKey, BinOp, Expr, MacroDef, ObjectKey, Stmt, Template, UnOp};
use crate::error::{ParseError, ParseErrorType};
use crate::immutable_string::ImmutableString;
use crate::token::{tokenize, Position, Token, TokenType};
use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Parse complete template source into a [`Template`] named `name`.
pub fn parse(name: impl Into<ImmutableString>, source: impl Into<Arc<str>>) -> Result<Template, ParseError> {
    let source = source.into();
    let tokens = tokenize(&source).map_err(|(e, pos)| {
        ParseError(ParseErrorType::UnexpectedToken { expected: "valid syntax".into(), found: e.to_string() }, pos)
    })?;
    let mut parser = Parser { tokens, pos: 0 };
    let body = parser.parse_stmts_until(&[])?;
    parser.expect_eof()?;
    Ok(Template { name: name.into(), source, body })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or_else(|| self.tokens.last().unwrap())
    }

    fn advance(&mut self) -> &Token {
        let tok = &self.tokens[self.pos];
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn peek_is_name(&self, value: &str) -> bool {
        self.peek().is(TokenType::Name, value)
    }

    fn peek_is_punct(&self, value: &str) -> bool {
        self.peek().is(TokenType::Punctuation, value)
    }

    fn peek_is_operator(&self, value: &str) -> bool {
        self.peek().is(TokenType::Operator, value)
    }

    fn expect_name(&mut self) -> Result<Token, ParseError> {
        if self.peek().ty == TokenType::Name {
            Ok(self.advance().clone())
        } else {
            Err(self.unexpected("an identifier"))
        }
    }

    fn expect_name_value(&mut self, value: &str) -> Result<(), ParseError> {
        if self.peek_is_name(value) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{value}'")))
        }
    }

    fn expect_punct(&mut self, value: &str) -> Result<(), ParseError> {
        if self.peek_is_punct(value) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{value}'")))
        }
    }

    fn expect_operator(&mut self, value: &str) -> Result<(), ParseError> {
        if self.peek_is_operator(value) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{value}'")))
        }
    }

    fn expect_var_end(&mut self) -> Result<(), ParseError> {
        if matches!(self.peek().ty, TokenType::VarEnd | TokenType::VarEndTrim) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected("'}}'"))
        }
    }

    fn expect_block_end(&mut self) -> Result<(), ParseError> {
        if matches!(self.peek().ty, TokenType::BlockEnd | TokenType::BlockEndTrim) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected("'%}'"))
        }
    }

    fn expect_eof(&mut self) -> Result<(), ParseError> {
        if self.peek().ty == TokenType::Eof {
            Ok(())
        } else {
            Err(self.unexpected("end of template"))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let found = describe_token(self.peek());
        ParseError(ParseErrorType::UnexpectedToken { expected: expected.into(), found }, self.peek().pos)
    }

    /// If the current position is a block tag whose keyword is one of `terminators`, return it
    /// without consuming anything.
    fn peek_tag_keyword<'a>(&self, terminators: &[&'a str]) -> Option<&'a str> {
        if !matches!(self.peek().ty, TokenType::BlockStart | TokenType::BlockStartTrim) {
            return None;
        }
        let kw = self.peek_at(1);
        terminators.iter().copied().find(|t| kw.is(TokenType::Name, t))
    }

    /// Consume a terminating `{% keyword %}`-style tag whose keyword must be one of `allowed`,
    /// leaving the cursor positioned right after the keyword (so callers can still parse trailing
    /// arguments, e.g. `elseif <expr>`). Does not consume the closing `%}`.
    fn consume_terminator(&mut self, tag: &'static str, allowed: &[&'static str]) -> Result<&'static str, ParseError> {
        if self.peek().ty == TokenType::Eof {
            return Err(ParseError(ParseErrorType::MissingTerminator { tag }, self.peek().pos));
        }
        self.advance(); // BlockStart/BlockStartTrim
        let name_tok = self.expect_name()?;
        for &candidate in allowed {
            if name_tok.value.as_str() == candidate {
                return Ok(candidate);
            }
        }
        Err(ParseError(ParseErrorType::UnknownTag(name_tok.value.as_str().to_string()), name_tok.pos))
    }

    // ---- statements -----------------------------------------------------------------------

    fn parse_stmts_until(&mut self, terminators: &[&str]) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            if self.peek_tag_keyword(terminators).is_some() {
                break;
            }
            match self.peek().ty {
                TokenType::Eof => break,
                TokenType::Text => {
                    let t = self.advance().clone();
                    stmts.push(Stmt::Text(t.value, t.pos));
                }
                TokenType::CommentStart => {
                    self.advance();
                    while !matches!(self.peek().ty, TokenType::CommentEnd | TokenType::Eof) {
                        self.advance();
                    }
                    if self.peek().ty == TokenType::CommentEnd {
                        self.advance();
                    }
                }
                TokenType::VarStart | TokenType::VarStartTrim => {
                    let pos = self.peek().pos;
                    self.advance();
                    let expr = self.parse_expr()?;
                    self.expect_var_end()?;
                    stmts.push(Stmt::Print(expr, pos));
                }
                TokenType::BlockStart | TokenType::BlockStartTrim => {
                    stmts.push(self.parse_tag()?);
                }
                _ => return Err(self.unexpected("text, '{{', '{%', or '{#'")),
            }
        }
        Ok(stmts)
    }

    fn parse_tag(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.peek().pos;
        self.advance(); // BlockStart/BlockStartTrim
        let kw = self.expect_name()?;
        match kw.value.as_str() {
            "if" => self.parse_if(pos),
            "for" => self.parse_for(pos),
            "block" => self.parse_block(pos),
            "extends" => self.parse_extends(pos),
            "include" => self.parse_include(pos),
            "set" => self.parse_set(pos),
            "do" => self.parse_do(pos),
            "macro" => self.parse_macro(pos),
            "import" => self.parse_import(pos),
            "from" => self.parse_from(pos),
            "spaceless" => self.parse_spaceless(pos),
            "apply" => self.parse_apply(pos),
            "verbatim" => self.parse_verbatim(pos),
            other => Err(ParseError(ParseErrorType::UnknownTag(other.to_string()), kw.pos)),
        }
    }

    fn parse_if(&mut self, pos: Position) -> Result<Stmt, ParseError> {
        let mut branches = Vec::new();
        loop {
            let cond = self.parse_expr()?;
            self.expect_block_end()?;
            let body = self.parse_stmts_until(&["elseif", "else", "endif"])?;
            branches.push((cond, body));
            match self.consume_terminator("if", &["elseif", "else", "endif"])? {
                "elseif" => continue,
                "else" => {
                    self.expect_block_end()?;
                    let else_body = self.parse_stmts_until(&["endif"])?;
                    self.consume_terminator("if", &["endif"])?;
                    self.expect_block_end()?;
                    return Ok(Stmt::If { branches, else_branch: Some(else_body), pos });
                }
                "endif" => {
                    self.expect_block_end()?;
                    return Ok(Stmt::If { branches, else_branch: None, pos });
                }
                _ => unreachable!(),
            }
        }
    }

    fn parse_for(&mut self, pos: Position) -> Result<Stmt, ParseError> {
        let first = self.expect_name()?.value;
        let (key_var, value_var) = if self.peek_is_punct(",") {
            self.advance();
            let second = self.expect_name()?.value;
            (Some(first), second)
        } else {
            (None, first)
        };
        self.expect_name_value("in")?;
        let sequence = self.parse_expr()?;
        self.expect_block_end()?;
        let body = self.parse_stmts_until(&["else", "endfor"])?;
        match self.consume_terminator("for", &["else", "endfor"])? {
            "else" => {
                self.expect_block_end()?;
                let else_body = self.parse_stmts_until(&["endfor"])?;
                self.consume_terminator("for", &["endfor"])?;
                self.expect_block_end()?;
                Ok(Stmt::For { key_var, value_var, sequence, body, else_branch: Some(else_body), pos })
            }
            "endfor" => {
                self.expect_block_end()?;
                Ok(Stmt::For { key_var, value_var, sequence, body, else_branch: None, pos })
            }
            _ => unreachable!(),
        }
    }

    fn parse_block(&mut self, pos: Position) -> Result<Stmt, ParseError> {
        let name = self.expect_name()?.value;
        self.expect_block_end()?;
        let body = self.parse_stmts_until(&["endblock"])?;
        self.consume_terminator("block", &["endblock"])?;
        if self.peek().ty == TokenType::Name {
            let closing = self.advance().value.clone();
            if closing.as_str() != name.as_str() {
                return Err(ParseError(
                    ParseErrorType::MismatchedBlockName {
                        opened: name.to_string(),
                        closed: closing.to_string(),
                    },
                    pos,
                ));
            }
        }
        self.expect_block_end()?;
        Ok(Stmt::Block { name, body, pos })
    }

    fn parse_extends(&mut self, pos: Position) -> Result<Stmt, ParseError> {
        let template = self.parse_expr()?;
        self.expect_block_end()?;
        Ok(Stmt::Extends { template, pos })
    }

    fn parse_include(&mut self, pos: Position) -> Result<Stmt, ParseError> {
        let template = self.parse_expr()?;
        let mut variables = None;
        let mut ignore_missing = false;
        let mut only = false;
        loop {
            if self.peek_is_name("with") {
                self.advance();
                variables = Some(self.parse_expr()?);
            } else if self.peek_is_name("ignore") {
                self.advance();
                self.expect_name_value("missing")?;
                ignore_missing = true;
            } else if self.peek_is_name("only") {
                self.advance();
                only = true;
            } else {
                break;
            }
        }
        self.expect_block_end()?;
        Ok(Stmt::Include { template, variables, ignore_missing, only, pos })
    }

    fn parse_set(&mut self, pos: Position) -> Result<Stmt, ParseError> {
        let name = self.expect_name()?.value;
        self.expect_operator("=")?;
        let value = self.parse_expr()?;
        self.expect_block_end()?;
        Ok(Stmt::Set { name, value, pos })
    }

    fn parse_do(&mut self, pos: Position) -> Result<Stmt, ParseError> {
        if matches!(self.peek().ty, TokenType::BlockEnd | TokenType::BlockEndTrim) {
            return Err(ParseError(ParseErrorType::EmptyBody { tag: "do" }, pos));
        }
        let expr = self.parse_expr()?;
        if self.peek_is_operator("=") {
            self.advance();
            let Expr::Variable(name, _) = expr else {
                return Err(ParseError(ParseErrorType::InvalidAssignmentTarget, pos));
            };
            let value = self.parse_expr()?;
            self.expect_block_end()?;
            return Ok(Stmt::Set { name, value, pos });
        }
        self.expect_block_end()?;
        Ok(Stmt::Do { expr, pos })
    }

    fn parse_macro(&mut self, pos: Position) -> Result<Stmt, ParseError> {
        let name = self.expect_name()?.value;
        self.expect_punct("(")?;
        let mut params = Vec::new();
        let mut defaults = BTreeMap::new();
        if !self.peek_is_punct(")") {
            loop {
                let pname = self.expect_name()?.value;
                params.push(pname.clone());
                if self.peek_is_operator("=") {
                    self.advance();
                    defaults.insert(pname, self.parse_ternary()?);
                }
                if self.peek_is_punct(",") {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect_punct(")")?;
        self.expect_block_end()?;
        let body = self.parse_stmts_until(&["endmacro"])?;
        self.consume_terminator("macro", &["endmacro"])?;
        if self.peek().ty == TokenType::Name {
            self.advance();
        }
        self.expect_block_end()?;
        Ok(Stmt::Macro(Arc::new(MacroDef { name, params, defaults, body: Arc::from(body), pos }), pos))
    }

    fn parse_import(&mut self, pos: Position) -> Result<Stmt, ParseError> {
        let template = self.parse_expr()?;
        self.expect_name_value("as")?;
        let alias = self.expect_name()?.value;
        self.expect_block_end()?;
        Ok(Stmt::Import { template, alias, pos })
    }

    fn parse_from(&mut self, pos: Position) -> Result<Stmt, ParseError> {
        let template = self.parse_expr()?;
        self.expect_name_value("import")?;
        let mut macros = Vec::new();
        loop {
            let src_name = self.expect_name()?.value;
            let alias = if self.peek_is_name("as") {
                self.advance();
                self.expect_name()?.value
            } else {
                src_name.clone()
            };
            macros.push((src_name, alias));
            if self.peek_is_punct(",") {
                self.advance();
                continue;
            }
            break;
        }
        self.expect_block_end()?;
        Ok(Stmt::FromImport { template, macros, pos })
    }

    fn parse_spaceless(&mut self, pos: Position) -> Result<Stmt, ParseError> {
        self.expect_block_end()?;
        let body = self.parse_stmts_until(&["endspaceless"])?;
        self.consume_terminator("spaceless", &["endspaceless"])?;
        self.expect_block_end()?;
        Ok(Stmt::Spaceless { body, pos })
    }

    fn parse_apply(&mut self, pos: Position) -> Result<Stmt, ParseError> {
        let name = self.expect_name()?.value;
        let args = self.parse_call_args_if_present()?;
        self.expect_block_end()?;
        let body = self.parse_stmts_until(&["endapply"])?;
        self.consume_terminator("apply", &["endapply"])?;
        self.expect_block_end()?;
        Ok(Stmt::Apply { body, filter: name, args, pos })
    }

    /// The lexer already collapsed everything between `{% verbatim %}` and its `{% endverbatim %}`
    /// into a single raw [`TokenType::Text`] token (see `token.rs`'s `consume_verbatim`), so there
    /// is nothing left to parse here but to pick that token back up.
    fn parse_verbatim(&mut self, pos: Position) -> Result<Stmt, ParseError> {
        self.expect_block_end()?;
        let text = if self.peek().ty == TokenType::Text {
            self.advance().value.clone()
        } else {
            ImmutableString::from("")
        };
        self.consume_terminator("verbatim", &["endverbatim"])?;
        self.expect_block_end()?;
        Ok(Stmt::Verbatim(text, pos))
    }

    // ---- expressions ------------------------------------------------------------------------

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_or()?;
        if self.peek_is_operator("?") {
            let pos = self.advance().pos;
            if self.peek_is_punct(":") {
                self.advance();
                let else_branch = self.parse_ternary()?;
                return Ok(Expr::Conditional {
                    then_branch: Box::new(cond.clone()),
                    cond: Box::new(cond),
                    else_branch: Box::new(else_branch),
                    pos,
                });
            }
            let then_branch = self.parse_ternary()?;
            self.expect_punct(":")?;
            let else_branch = self.parse_ternary()?;
            return Ok(Expr::Conditional {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
                pos,
            });
        }
        Ok(cond)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.peek_is_name("or") || self.peek_is_operator("||") {
            let pos = self.advance().pos;
            let rhs = self.parse_and()?;
            lhs = Expr::Binary { op: BinOp::Or, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_comparison()?;
        while self.peek_is_name("and") || self.peek_is_operator("&&") {
            let pos = self.advance().pos;
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary { op: BinOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_concat()?;
        loop {
            let pos = self.peek().pos;
            if self.peek_is_name("not") && self.peek_at(1).is(TokenType::Name, "in") {
                self.advance();
                self.advance();
                let rhs = self.parse_concat()?;
                lhs = Expr::Binary { op: BinOp::NotIn, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
            } else if self.peek_is_name("in") {
                self.advance();
                let rhs = self.parse_concat()?;
                lhs = Expr::Binary { op: BinOp::In, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
            } else if self.peek_is_name("matches") {
                self.advance();
                let rhs = self.parse_concat()?;
                lhs = Expr::Binary { op: BinOp::Matches, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
            } else if self.peek_is_name("starts") && self.peek_at(1).is(TokenType::Name, "with") {
                self.advance();
                self.advance();
                let rhs = self.parse_concat()?;
                lhs = Expr::Binary { op: BinOp::StartsWith, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
            } else if self.peek_is_name("ends") && self.peek_at(1).is(TokenType::Name, "with") {
                self.advance();
                self.advance();
                let rhs = self.parse_concat()?;
                lhs = Expr::Binary { op: BinOp::EndsWith, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
            } else if self.peek_is_name("is") {
                self.advance();
                let negate = self.peek_is_name("not");
                if negate {
                    self.advance();
                }
                let name = self.expect_name()?.value;
                let args = self.parse_call_args_if_present()?;
                let test = Expr::Test { node: Box::new(lhs), name, args, pos };
                lhs = if negate { Expr::Unary { op: UnOp::Not, operand: Box::new(test), pos } } else { test };
            } else if self.peek_is_operator("==") {
                self.advance();
                let rhs = self.parse_concat()?;
                lhs = Expr::Binary { op: BinOp::Eq, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
            } else if self.peek_is_operator("!=") {
                self.advance();
                let rhs = self.parse_concat()?;
                lhs = Expr::Binary { op: BinOp::Ne, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
            } else if self.peek_is_operator("<=") {
                self.advance();
                let rhs = self.parse_concat()?;
                lhs = Expr::Binary { op: BinOp::Le, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
            } else if self.peek_is_operator(">=") {
                self.advance();
                let rhs = self.parse_concat()?;
                lhs = Expr::Binary { op: BinOp::Ge, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
            } else if self.peek_is_operator("<") {
                self.advance();
                let rhs = self.parse_concat()?;
                lhs = Expr::Binary { op: BinOp::Lt, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
            } else if self.peek_is_operator(">") {
                self.advance();
                let rhs = self.parse_concat()?;
                lhs = Expr::Binary { op: BinOp::Gt, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
            } else if self.peek_is_operator("??") {
                self.advance();
                let rhs = self.parse_concat()?;
                lhs = Expr::Binary { op: BinOp::NullCoalesce, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_concat(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_term()?;
        loop {
            let pos = self.peek().pos;
            let op = if self.peek_is_operator("+") {
                BinOp::Add
            } else if self.peek_is_operator("-") {
                BinOp::Sub
            } else if self.peek_is_operator("~") {
                BinOp::Concat
            } else {
                break;
            };
            self.advance();
            let rhs = self.parse_term()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_power()?;
        loop {
            let pos = self.peek().pos;
            let op = if self.peek_is_operator("*") {
                BinOp::Mul
            } else if self.peek_is_operator("/") {
                BinOp::Div
            } else if self.peek_is_operator("%") {
                BinOp::Mod
            } else {
                break;
            };
            self.advance();
            let rhs = self.parse_power()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
        }
        Ok(lhs)
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_unary()?;
        if self.peek_is_operator("^") {
            let pos = self.advance().pos;
            // Right-associative: `2 ^ 3 ^ 2` is `2 ^ (3 ^ 2)`.
            let rhs = self.parse_power()?;
            return Ok(Expr::Binary { op: BinOp::Pow, lhs: Box::new(lhs), rhs: Box::new(rhs), pos });
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let pos = self.peek().pos;
        if self.peek_is_name("not") || self.peek_is_operator("!") {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary { op: UnOp::Not, operand: Box::new(operand), pos });
        }
        if self.peek_is_operator("-") {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary { op: UnOp::Neg, operand: Box::new(operand), pos });
        }
        if self.peek_is_operator("+") {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary { op: UnOp::Plus, operand: Box::new(operand), pos });
        }
        self.parse_postfix()
    }

    /// Primary expression followed by any chain of `.attr`, `[expr]`, `(args)`, and `|filter`.
    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.peek_is_punct(".") {
                let pos = self.advance().pos;
                // `item.0` indexes by position the same way `item[0]` does.
                if self.peek().ty == TokenType::Number {
                    let idx_tok = self.advance().clone();
                    let idx: i64 = idx_tok.value.as_str().parse().unwrap_or(0);
                    let key = AttrKey::Computed(Box::new(Expr::Literal(Value::Int(idx), idx_tok.pos)));
                    expr = Expr::GetAttr { object: Box::new(expr), key, pos };
                } else {
                    let attr = self.expect_name()?.value;
                    expr = Expr::GetAttr { object: Box::new(expr), key: AttrKey::Name(attr), pos };
                }
            } else if self.peek_is_punct("[") {
                let pos = self.advance().pos;
                let index = self.parse_expr()?;
                self.expect_punct("]")?;
                expr = Expr::GetAttr { object: Box::new(expr), key: AttrKey::Computed(Box::new(index)), pos };
            } else if self.peek_is_punct("(") {
                let pos = self.peek().pos;
                let args = self.parse_call_args_if_present()?;
                expr = Expr::Call { callee: Box::new(expr), args, pos };
            } else if self.peek_is_operator("|") {
                self.advance();
                let pos = self.peek().pos;
                let name = self.expect_name()?.value;
                let args = self.parse_call_args_if_present()?;
                expr = Expr::Filter { node: Box::new(expr), name, args, pos };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Parses a `(arg, arg, ...)` list if one follows, or returns an empty argument list if the
    /// next token isn't `(` (a bare filter/test name with no parens takes no arguments).
    fn parse_call_args_if_present(&mut self) -> Result<Vec<Expr>, ParseError> {
        if !self.peek_is_punct("(") {
            return Ok(Vec::new());
        }
        self.advance();
        let mut args = Vec::new();
        if !self.peek_is_punct(")") {
            loop {
                args.push(self.parse_expr()?);
                if self.peek_is_punct(",") {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.peek().clone();
        match tok.ty {
            TokenType::Number => {
                self.advance();
                let lit = if tok.value.as_str().contains('.') {
                    Value::Float(tok.value.as_str().parse().map_err(|_| {
                        ParseError(
                            ParseErrorType::UnexpectedToken {
                                expected: "a number".into(),
                                found: tok.value.as_str().to_string(),
                            },
                            tok.pos,
                        )
                    })?)
                } else {
                    Value::Int(tok.value.as_str().parse().map_err(|_| {
                        ParseError(
                            ParseErrorType::UnexpectedToken {
                                expected: "a number".into(),
                                found: tok.value.as_str().to_string(),
                            },
                            tok.pos,
                        )
                    })?)
                };
                Ok(Expr::Literal(lit, tok.pos))
            }
            TokenType::Str => {
                self.advance();
                Ok(Expr::Literal(Value::Str(tok.value.clone()), tok.pos))
            }
            TokenType::Name => match tok.value.as_str() {
                "true" => {
                    self.advance();
                    Ok(Expr::Literal(Value::Bool(true), tok.pos))
                }
                "false" => {
                    self.advance();
                    Ok(Expr::Literal(Value::Bool(false), tok.pos))
                }
                "null" | "none" => {
                    self.advance();
                    Ok(Expr::Literal(Value::Nil, tok.pos))
                }
                _ => {
                    self.advance();
                    Ok(Expr::Variable(tok.value, tok.pos))
                }
            },
            TokenType::Punctuation if tok.value.as_str() == "(" => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            TokenType::Punctuation if tok.value.as_str() == "[" => self.parse_array(tok.pos),
            TokenType::Punctuation if tok.value.as_str() == "{" => self.parse_object(tok.pos),
            TokenType::Operator if tok.value.as_str() == "-" => {
                // Handled by parse_unary; reaching here means a lone `-` with nothing valid
                // after it elsewhere in the grammar.
                Err(self.unexpected("an expression"))
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn parse_array(&mut self, pos: Position) -> Result<Expr, ParseError> {
        self.expect_punct("[")?;
        let mut items = Vec::new();
        if !self.peek_is_punct("]") {
            loop {
                items.push(self.parse_expr()?);
                if self.peek_is_punct(",") {
                    self.advance();
                    if self.peek_is_punct("]") {
                        break;
                    }
                    continue;
                }
                break;
            }
        }
        self.expect_punct("]")?;
        Ok(Expr::Array(items, pos))
    }

    fn parse_object(&mut self, pos: Position) -> Result<Expr, ParseError> {
        self.expect_punct("{")?;
        let mut entries = Vec::new();
        if !self.peek_is_punct("}") {
            loop {
                let key = if self.peek().ty == TokenType::Str {
                    ObjectKey::Str(self.advance().value.clone())
                } else {
                    ObjectKey::Name(self.expect_name()?.value)
                };
                self.expect_punct(":")?;
                let value = self.parse_expr()?;
                entries.push((key, value));
                if self.peek_is_punct(",") {
                    self.advance();
                    if self.peek_is_punct("}") {
                        break;
                    }
                    continue;
                }
                break;
            }
        }
        self.expect_punct("}")?;
        Ok(Expr::Object(entries, pos))
    }
}

fn describe_token(tok: &Token) -> String {
    match tok.ty {
        TokenType::Eof => "end of template".to_string(),
        TokenType::Text => format!("text {:?}", tok.value.as_str()),
        _ => format!("'{}'", tok.value.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Template {
        parse("t", src).unwrap_or_else(|e| panic!("parse failed for {src:?}: {e}"))
    }

    #[test]
    fn plain_text_parses_to_single_text_stmt() {
        let t = parse_ok("hello");
        assert!(matches!(t.body.as_slice(), [Stmt::Text(s, _)] if s.as_str() == "hello"));
    }

    #[test]
    fn print_tag_parses_expression() {
        let t = parse_ok("{{ 1 + 2 }}");
        assert!(matches!(
            t.body.as_slice(),
            [Stmt::Print(Expr::Binary { op: BinOp::Add, .. }, _)]
        ));
    }

    #[test]
    fn if_else_parses_both_branches() {
        let t = parse_ok("{% if a %}A{% else %}B{% endif %}");
        match &t.body[0] {
            Stmt::If { branches, else_branch, .. } => {
                assert_eq!(branches.len(), 1);
                assert!(else_branch.is_some());
            }
            other => panic!("expected If, got {other:?}"),
        }
    }

    #[test]
    fn if_elseif_else_chains_correctly() {
        let t = parse_ok("{% if a %}A{% elseif b %}B{% else %}C{% endif %}");
        match &t.body[0] {
            Stmt::If { branches, else_branch, .. } => {
                assert_eq!(branches.len(), 2);
                assert!(else_branch.is_some());
            }
            other => panic!("expected If, got {other:?}"),
        }
    }

    #[test]
    fn missing_endif_is_a_parse_error() {
        let err = parse("t", "{% if a %}A").unwrap_err();
        assert_eq!(err.0, ParseErrorType::MissingTerminator { tag: "if" });
    }

    #[test]
    fn for_loop_with_key_value() {
        let t = parse_ok("{% for k, v in items %}{{ v }}{% endfor %}");
        match &t.body[0] {
            Stmt::For { key_var, value_var, .. } => {
                assert_eq!(key_var.as_ref().unwrap().as_str(), "k");
                assert_eq!(value_var.as_str(), "v");
            }
            other => panic!("expected For, got {other:?}"),
        }
    }

    #[test]
    fn for_else_parses() {
        let t = parse_ok("{% for v in items %}{{ v }}{% else %}empty{% endfor %}");
        assert!(matches!(&t.body[0], Stmt::For { else_branch: Some(_), .. }));
    }

    #[test]
    fn block_name_mismatch_on_endblock_errors() {
        let err = parse("t", "{% block a %}x{% endblock b %}").unwrap_err();
        assert!(matches!(err.0, ParseErrorType::MismatchedBlockName { .. }));
    }

    #[test]
    fn filter_chain_parses_left_to_right() {
        let t = parse_ok("{{ name|upper|trim }}");
        match &t.body[0] {
            Stmt::Print(Expr::Filter { name, node, .. }, _) => {
                assert_eq!(name.as_str(), "trim");
                assert!(matches!(node.as_ref(), Expr::Filter { .. }));
            }
            other => panic!("expected nested Filter, got {other:?}"),
        }
    }

    #[test]
    fn attribute_and_index_access_chain() {
        let t = parse_ok("{{ a.b['c'].d }}");
        assert!(matches!(&t.body[0], Stmt::Print(Expr::GetAttr { .. }, _)));
    }

    #[test]
    fn function_call_parses_as_call_with_variable_callee() {
        let t = parse_ok("{{ range(1, 3) }}");
        match &t.body[0] {
            Stmt::Print(Expr::Call { callee, args, .. }, _) => {
                assert!(matches!(callee.as_ref(), Expr::Variable(n, _) if n.as_str() == "range"));
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected Call, got {other:?}"),
        }
    }

    #[test]
    fn ternary_parses_three_parts() {
        let t = parse_ok("{{ a ? b : c }}");
        assert!(matches!(&t.body[0], Stmt::Print(Expr::Conditional { .. }, _)));
    }

    #[test]
    fn elvis_ternary_reuses_condition_as_then_branch() {
        let t = parse_ok("{{ a ?: c }}");
        match &t.body[0] {
            Stmt::Print(Expr::Conditional { cond, then_branch, .. }, _) => {
                assert!(matches!((cond.as_ref(), then_branch.as_ref()), (Expr::Variable(a, _), Expr::Variable(b, _)) if a.as_str() == b.as_str()));
            }
            other => panic!("expected Conditional, got {other:?}"),
        }
    }

    #[test]
    fn is_not_test_wraps_in_unary_not() {
        let t = parse_ok("{{ a is not empty }}");
        assert!(matches!(&t.body[0], Stmt::Print(Expr::Unary { op: UnOp::Not, .. }, _)));
    }

    #[test]
    fn multi_word_operators_parse() {
        parse_ok("{{ a starts with 'x' }}");
        parse_ok("{{ a ends with 'x' }}");
        parse_ok("{{ a not in b }}");
    }

    #[test]
    fn macro_with_default_param_parses() {
        let t = parse_ok("{% macro input(name, value = '') %}x{% endmacro %}");
        match &t.body[0] {
            Stmt::Macro(def, _) => {
                assert_eq!(def.params.len(), 2);
                assert!(def.defaults.contains_key("value"));
            }
            other => panic!("expected Macro, got {other:?}"),
        }
    }

    #[test]
    fn from_import_parses_aliases() {
        let t = parse_ok("{% from 'forms.html.twig' import input as field %}");
        match &t.body[0] {
            Stmt::FromImport { macros, .. } => {
                assert_eq!(macros[0].0.as_str(), "input");
                assert_eq!(macros[0].1.as_str(), "field");
            }
            other => panic!("expected FromImport, got {other:?}"),
        }
    }

    #[test]
    fn include_with_clause_parses_expression() {
        let t = parse_ok("{% include 'x.html.twig' with {'a': 1} only %}");
        match &t.body[0] {
            Stmt::Include { variables, only, .. } => {
                assert!(variables.is_some());
                assert!(only);
            }
            other => panic!("expected Include, got {other:?}"),
        }
    }

    #[test]
    fn object_literal_with_string_and_name_keys() {
        let t = parse_ok("{{ {a: 1, 'b': 2} }}");
        match &t.body[0] {
            Stmt::Print(Expr::Object(entries, _), _) => assert_eq!(entries.len(), 2),
            other => panic!("expected Object, got {other:?}"),
        }
    }

    #[test]
    fn verbatim_block_parses_raw_text_unevaluated() {
        let t = parse_ok("{% verbatim %}{{ raw }}{% endverbatim %}");
        assert!(matches!(t.body.as_slice(), [Stmt::Text(s, _)] if s.as_str() == "{{ raw }}"));
    }

    #[test]
    fn apply_filter_block_parses() {
        let t = parse_ok("{% apply upper %}hi{% endapply %}");
        assert!(matches!(&t.body[0], Stmt::Apply { filter, .. } if filter.as_str() == "upper"));
    }

    #[test]
    fn do_with_assignment_promotes_to_set() {
        let t = parse_ok("{% do x = 5 %}");
        match &t.body[0] {
            Stmt::Set { name, .. } => assert_eq!(name.as_str(), "x"),
            other => panic!("expected Set, got {other:?}"),
        }
    }

    #[test]
    fn do_with_bare_expression_stays_do() {
        let t = parse_ok("{% do increment(x) %}");
        assert!(matches!(&t.body[0], Stmt::Do { .. }));
    }

    #[test]
    fn do_with_invalid_assignment_target_errors() {
        let err = parse("t", "{% do a.b = 5 %}").unwrap_err();
        assert_eq!(err.0, ParseErrorType::InvalidAssignmentTarget);
    }

    #[test]
    fn do_with_empty_body_errors() {
        let err = parse("t", "{% do %}").unwrap_err();
        assert_eq!(err.0, ParseErrorType::EmptyBody { tag: "do" });
    }
}

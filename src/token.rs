//! The lexer: turns template source text into a flat token stream.
//!
//! Tokenization happens in two phases: phase A scans the raw source for
//! the next tag delimiter, emitting everything in between as a single [`TokenType::Text`]
//! token; phase B tokenizes the interior of whatever tag was just opened. A final pass applies
//! whitespace control (`{{-`/`-}}` and friends) by trimming the [`TokenType::Text`] tokens
//! adjacent to a trim delimiter.

use crate::immutable_string::ImmutableString;
use crate::error::LexError;
use std::fmt;

/// A 1-based line/column location in template source.
///
/// Shrinks to a zero-sized marker under the `no_position` feature, for embedders that compile
/// templates once and never need to report where an error occurred.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Position {
    #[cfg(not(feature = "no_position"))]
    line: u32,
    #[cfg(not(feature = "no_position"))]
    col: u32,
}

impl Position {
    pub const NONE: Self = Self {
        #[cfg(not(feature = "no_position"))]
        line: 0,
        #[cfg(not(feature = "no_position"))]
        col: 0,
    };
    pub const START: Self = Self {
        #[cfg(not(feature = "no_position"))]
        line: 1,
        #[cfg(not(feature = "no_position"))]
        col: 0,
    };

    #[must_use]
    pub const fn new(_line: u32, _col: u32) -> Self {
        Self {
            #[cfg(not(feature = "no_position"))]
            line: _line,
            #[cfg(not(feature = "no_position"))]
            col: _col,
        }
    }

    #[must_use]
    pub const fn is_none(&self) -> bool {
        #[cfg(not(feature = "no_position"))]
        return self.line == 0;
        #[cfg(feature = "no_position")]
        return true;
    }

    #[must_use]
    pub const fn line(&self) -> u32 {
        #[cfg(not(feature = "no_position"))]
        return self.line;
        #[cfg(feature = "no_position")]
        return 0;
    }

    #[must_use]
    pub const fn col(&self) -> u32 {
        #[cfg(not(feature = "no_position"))]
        return self.col;
        #[cfg(feature = "no_position")]
        return 0;
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("unknown position")
        } else {
            #[cfg(not(feature = "no_position"))]
            return write!(f, "line {}", self.line);
            #[cfg(feature = "no_position")]
            unreachable!()
        }
    }
}

/// The kind of a [`Token`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum TokenType {
    Text,
    VarStart,
    VarStartTrim,
    VarEnd,
    VarEndTrim,
    BlockStart,
    BlockStartTrim,
    BlockEnd,
    BlockEndTrim,
    CommentStart,
    CommentEnd,
    Name,
    Number,
    Str,
    Operator,
    Punctuation,
    Eof,
}

/// One lexical token: a type, its literal text, and the line it started on.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub ty: TokenType,
    pub value: ImmutableString,
    pub pos: Position,
}

impl Token {
    fn new(ty: TokenType, value: impl Into<ImmutableString>, pos: Position) -> Self {
        Self { ty, value: value.into(), pos }
    }

    #[must_use]
    pub fn is(&self, ty: TokenType, value: &str) -> bool {
        self.ty == ty && self.value.as_str() == value
    }
}

const OPEN_DELIMS: &[(&str, &str)] = &[("{{", "var"), ("{%", "block"), ("{#", "comment")];

/// Tokenize `source` into a flat stream, terminated by a sentinel [`TokenType::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, (LexError, Position)> {
    let mut lexer = Lexer::new(source);
    lexer.run()?;
    apply_whitespace_control(&mut lexer.tokens);
    lexer.tokens.push(Token::new(TokenType::Eof, "", lexer.position()));
    Ok(lexer.tokens)
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    cursor: usize,
    line: u32,
    line_start: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            src: source,
            bytes: source.as_bytes(),
            cursor: 0,
            line: 1,
            line_start: 0,
            tokens: Vec::new(),
        }
    }

    fn position(&self) -> Position {
        Position::new(self.line, (self.cursor - self.line_start) as u32)
    }

    fn position_at(&self, byte_offset: usize) -> Position {
        let consumed = &self.src[..byte_offset.min(self.src.len())];
        let line = 1 + consumed.bytes().filter(|&b| b == b'\n').count() as u32;
        let line_start = consumed.rfind('\n').map_or(0, |i| i + 1);
        Position::new(line, (byte_offset - line_start) as u32)
    }

    fn advance_to(&mut self, new_cursor: usize) {
        for b in &self.bytes[self.cursor..new_cursor] {
            if *b == b'\n' {
                self.line += 1;
                self.line_start = self.cursor + 1;
            }
            self.cursor += 1;
        }
    }

    fn run(&mut self) -> Result<(), (LexError, Position)> {
        let mut text_start = 0usize;

        loop {
            match self.find_next_delimiter(text_start) {
                None => {
                    if text_start < self.src.len() {
                        self.emit_text(text_start, self.src.len());
                    }
                    return Ok(());
                }
                Some((delim_pos, kind, trim)) => {
                    if delim_pos > text_start {
                        self.emit_text(text_start, delim_pos);
                    }
                    self.advance_to(delim_pos);
                    let opener_pos = self.position();
                    let opener_len = if trim { 3 } else { 2 };
                    self.advance_to(delim_pos + opener_len);

                    let start_ty = match (kind, trim) {
                        ("var", false) => TokenType::VarStart,
                        ("var", true) => TokenType::VarStartTrim,
                        ("block", false) => TokenType::BlockStart,
                        ("block", true) => TokenType::BlockStartTrim,
                        ("comment", _) => TokenType::CommentStart,
                        _ => unreachable!(),
                    };
                    self.tokens.push(Token::new(start_ty, opener_text(kind, trim), opener_pos));

                    let (body_start, body_end, end_trim, end_len) =
                        self.find_closer(kind, delim_pos + opener_len)?;

                    let body = &self.src[body_start..body_end];
                    match kind {
                        "comment" => {
                            if !body.is_empty() {
                                self.tokens.push(Token::new(
                                    TokenType::Text,
                                    body,
                                    self.position_at(body_start),
                                ));
                            }
                        }
                        "var" => self.tokenize_var(body, body_start)?,
                        "block" => self.tokenize_block(body, body_start)?,
                        _ => unreachable!(),
                    }

                    self.advance_to(body_end);
                    let end_pos = self.position();
                    self.advance_to(body_end + end_len);

                    let end_ty = match (kind, end_trim) {
                        ("var", false) => TokenType::VarEnd,
                        ("var", true) => TokenType::VarEndTrim,
                        ("block", false) => TokenType::BlockEnd,
                        ("block", true) => TokenType::BlockEndTrim,
                        ("comment", _) => TokenType::CommentEnd,
                        _ => unreachable!(),
                    };
                    self.tokens.push(Token::new(end_ty, closer_text(kind, end_trim), end_pos));

                    text_start = body_end + end_len;

                    // `{% verbatim %}` suppresses tag scanning for everything up to its matching
                    // `{% endverbatim %}`, which the two-phase tokenizer above cannot express
                    // (it would happily lex a `{{` inside the verbatim body as a real tag). Handle
                    // it as a one-off scan over raw source instead.
                    if kind == "block" && body.trim() == "verbatim" {
                        text_start = self.consume_verbatim(text_start)?;
                    }
                }
            }
        }
    }

    /// Emit `src[start..end]` as a single TEXT token. Any backslash directly escaping a tag
    /// delimiter that `find_next_delimiter` skipped over while scanning this span is dropped;
    /// every other byte, including any other backslash, is kept verbatim.
    fn emit_text(&mut self, start: usize, end: usize) {
        let pos = self.position_at(start);
        let text = strip_escaped_delimiters(&self.src[start..end]);
        self.tokens.push(Token::new(TokenType::Text, text, pos));
    }

    /// Find the next unescaped opening delimiter at or after `from`.
    /// Returns (byte offset of delimiter, kind, is_trim_variant).
    fn find_next_delimiter(&self, from: usize) -> Option<(usize, &'static str, bool)> {
        let mut i = from;
        while i < self.src.len() {
            if self.bytes[i] == b'{' {
                if let Some((delim, kind)) =
                    OPEN_DELIMS.iter().find(|(d, _)| self.src[i..].starts_with(d))
                {
                    let escaped = i > 0 && self.bytes[i - 1] == b'\\';
                    if !escaped {
                        let trim = self.src[i + delim.len()..].starts_with('-');
                        return Some((i, kind, trim));
                    }
                    // Escaped: this is literal text, not a real delimiter. Keep scanning past it.
                    i += delim.len();
                    continue;
                }
            }
            i += 1;
        }
        None
    }

    /// Locate the closer matching `kind` starting the search at `from`.
    /// Returns (body_start, body_end, is_end_trim, closer_byte_len).
    fn find_closer(
        &self,
        kind: &'static str,
        from: usize,
    ) -> Result<(usize, usize, bool, usize), (LexError, Position)> {
        let closer = match kind {
            "var" => "}}",
            "block" => "%}",
            "comment" => "#}",
            _ => unreachable!(),
        };
        let mut i = from;
        while i < self.src.len() {
            if self.src[i..].starts_with(closer) {
                let trim = i > from && self.bytes[i - 1] == b'-' && kind != "comment";
                let raw_end = if trim { i - 1 } else { i };
                let raw = &self.src[from..raw_end];
                let leading_ws = raw.len() - raw.trim_start().len();
                let body_start = from + leading_ws;
                let trimmed = raw.trim();
                let len = closer.len() + usize::from(trim);
                return Ok((body_start, body_start + trimmed.len(), trim, len));
            }
            i += 1;
        }
        let opener = match kind {
            "var" => "{{",
            "block" => "{%",
            "comment" => "{#",
            _ => unreachable!(),
        };
        Err((LexError::UnclosedTag(opener), self.position_at(from)))
    }

    fn tokenize_var(&mut self, body: &str, body_start: usize) -> Result<(), (LexError, Position)> {
        const OP_CHARS: &str = ".|[](){}\"',+-*/=!<>%&^~";
        if !body.contains(|c| OP_CHARS.contains(c)) && !body.is_empty() {
            let name = crate::interner::intern(body);
            self.tokens.push(Token::new(TokenType::Name, name, self.position_at(body_start)));
            return Ok(());
        }
        tokenize_expression(body, body_start, self)
    }

    /// Locate the `{% endverbatim %}` (or trimmed variant) matching a just-opened verbatim
    /// block, scanning raw text for the literal keyword rather than going through the normal
    /// tag tokenizer.
    ///
    /// Returns `(tag_start, start_trim, name_end, end_trim, total_end)`: `tag_start` is the byte
    /// offset of the closer's `{`; `name_end` is the offset right after the `endverbatim`
    /// keyword; `total_end` is the offset right after the closing `%}`.
    fn find_verbatim_end(&self, from: usize) -> Option<(usize, bool, usize, bool, usize)> {
        let mut i = from;
        while let Some(rel) = self.src[i..].find("{%") {
            let tag_start = i + rel;
            let mut p = tag_start + 2;
            let start_trim = self.src[p..].starts_with('-');
            if start_trim {
                p += 1;
            }
            let after_ws = self.src[p..].trim_start();
            p += self.src[p..].len() - after_ws.len();
            if self.src[p..].starts_with("endverbatim") {
                let name_end = p + "endverbatim".len();
                let after_ws2 = self.src[name_end..].trim_start();
                let mut q = name_end + (self.src[name_end..].len() - after_ws2.len());
                let end_trim = self.src[q..].starts_with('-');
                if end_trim {
                    q += 1;
                }
                if self.src[q..].starts_with("%}") {
                    return Some((tag_start, start_trim, name_end, end_trim, q + 2));
                }
            }
            i = tag_start + 2;
        }
        None
    }

    /// Emit the literal verbatim body as one TEXT token plus the `{% endverbatim %}` closer's
    /// tokens, then return the byte offset to resume normal scanning from.
    fn consume_verbatim(&mut self, from: usize) -> Result<usize, (LexError, Position)> {
        let (tag_start, start_trim, name_end, end_trim, total_end) = self
            .find_verbatim_end(from)
            .ok_or((LexError::UnclosedTag("{% verbatim %}"), self.position_at(from)))?;

        if tag_start > from {
            let pos = self.position_at(from);
            self.tokens.push(Token::new(TokenType::Text, &self.src[from..tag_start], pos));
        }
        self.advance_to(tag_start);
        let open_pos = self.position();
        let open_len = if start_trim { 3 } else { 2 };
        self.advance_to(tag_start + open_len);
        let open_ty = if start_trim { TokenType::BlockStartTrim } else { TokenType::BlockStart };
        self.tokens.push(Token::new(open_ty, opener_text("block", start_trim), open_pos));
        self.tokens.push(Token::new(TokenType::Name, crate::interner::intern("endverbatim"), self.position()));

        self.advance_to(name_end);
        let end_pos = self.position();
        self.advance_to(total_end);
        let end_ty = if end_trim { TokenType::BlockEndTrim } else { TokenType::BlockEnd };
        self.tokens.push(Token::new(end_ty, closer_text("block", end_trim), end_pos));

        Ok(total_end)
    }

    fn tokenize_block(&mut self, body: &str, body_start: usize) -> Result<(), (LexError, Position)> {
        let (keyword, rest, rest_start) = match body.find(char::is_whitespace) {
            Some(idx) => {
                let rest = body[idx..].trim_start();
                let rest_start = body_start + body[..idx].len() + (body[idx..].len() - rest.len());
                (&body[..idx], rest, rest_start)
            }
            None => (body, "", body_start + body.len()),
        };
        let keyword = crate::interner::intern(keyword);
        self.tokens.push(Token::new(TokenType::Name, keyword, self.position_at(body_start)));
        if !rest.is_empty() {
            tokenize_expression(rest, rest_start, self)?;
        }
        Ok(())
    }
}

/// Drop the backslash from every occurrence of `\` immediately followed by a tag delimiter
/// (`{{`, `{%`, `{#`); every other byte is copied through unchanged.
fn strip_escaped_delimiters(s: &str) -> String {
    if !s.as_bytes().contains(&b'\\') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < s.len() {
        if s.as_bytes()[i] == b'\\' && OPEN_DELIMS.iter().any(|(d, _)| s[i + 1..].starts_with(d)) {
            i += 1;
            continue;
        }
        let ch = s[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

fn opener_text(kind: &str, trim: bool) -> &'static str {
    match (kind, trim) {
        ("var", false) => "{{",
        ("var", true) => "{{-",
        ("block", false) => "{%",
        ("block", true) => "{%-",
        ("comment", _) => "{#",
        _ => unreachable!(),
    }
}

fn closer_text(kind: &str, trim: bool) -> &'static str {
    match (kind, trim) {
        ("var", false) => "}}",
        ("var", true) => "-}}",
        ("block", false) => "%}",
        ("block", true) => "-%}",
        ("comment", _) => "#}",
        _ => unreachable!(),
    }
}

/// Tokenize the interior of a tag as a general expression: identifiers, numbers, quoted
/// strings, operators, and punctuation. Used for variable tags whose body needs more than one
/// token, and for every block tag's argument list (the `for`/`set`/`include`/... "pre-split"
/// described in the design collapses into this single general tokenizer, since the resulting
/// token stream is identical either way -- `in`, `with`, `as`, `import`, etc. all tokenize as
/// plain [`TokenType::Name`] and are given meaning by the parser, not by the lexer).
fn tokenize_expression(
    body: &str,
    body_start: usize,
    lexer: &mut Lexer,
) -> Result<(), (LexError, Position)> {
    let chars: Vec<char> = body.chars().collect();
    // Byte offset (within `body`) of the start of each char, for accurate positions.
    let mut byte_offsets = Vec::with_capacity(chars.len() + 1);
    {
        let mut off = 0;
        for c in &chars {
            byte_offsets.push(off);
            off += c.len_utf8();
        }
        byte_offsets.push(off);
    }

    let mut i = 0usize;
    let mut last_was_value = false;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let tok_pos = lexer.position_at(body_start + byte_offsets[i]);

        if c == '\'' || c == '"' {
            let quote = c;
            let start = i + 1;
            let mut j = start;
            let mut closed = false;
            while j < chars.len() {
                if chars[j] == '\\' && j + 1 < chars.len() {
                    j += 2;
                    continue;
                }
                if chars[j] == quote {
                    closed = true;
                    break;
                }
                j += 1;
            }
            if !closed {
                return Err((LexError::UnterminatedString, tok_pos));
            }
            let content: String = chars[start..j].iter().collect();
            lexer.tokens.push(Token::new(TokenType::Str, content, tok_pos));
            i = j + 1;
            last_was_value = true;
            continue;
        }

        if c.is_ascii_digit() || (c == '-' && !last_was_value && i + 1 < chars.len() && chars[i + 1].is_ascii_digit()) {
            let start = i;
            if c == '-' {
                i += 1;
            }
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            if i < chars.len() && chars[i] == '.' && i + 1 < chars.len() && chars[i + 1].is_ascii_digit() {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().collect();
            lexer.tokens.push(Token::new(TokenType::Number, text, tok_pos));
            last_was_value = true;
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            lexer.tokens.push(Token::new(TokenType::Name, crate::interner::intern(&text), tok_pos));
            last_was_value = true;
            continue;
        }

        // Two-character operators.
        if i + 1 < chars.len() {
            let two: String = [c, chars[i + 1]].iter().collect();
            if matches!(two.as_str(), "==" | "!=" | "<=" | ">=" | "&&" | "||" | "??") {
                lexer.tokens.push(Token::new(TokenType::Operator, crate::interner::intern(&two), tok_pos));
                i += 2;
                last_was_value = false;
                continue;
            }
        }

        match c {
            '(' | ')' | '[' | ']' | '{' | '}' | ',' | '.' | ':' => {
                let mut buf = [0u8; 4];
                let text = c.encode_utf8(&mut buf);
                lexer.tokens.push(Token::new(TokenType::Punctuation, crate::interner::intern(text), tok_pos));
                last_was_value = matches!(c, ')' | ']' | '}');
                i += 1;
            }
            '+' | '-' | '*' | '/' | '=' | '<' | '>' | '!' | '&' | '|' | '^' | '%' | '?' | '~' => {
                let mut buf = [0u8; 4];
                let text = c.encode_utf8(&mut buf);
                lexer.tokens.push(Token::new(TokenType::Operator, crate::interner::intern(text), tok_pos));
                last_was_value = false;
                i += 1;
            }
            other => {
                // Unrecognized character: pass through as single-character punctuation rather
                // than failing the whole template; the parser will reject it with context.
                lexer.tokens.push(Token::new(TokenType::Punctuation, other.to_string(), tok_pos));
                last_was_value = false;
                i += 1;
            }
        }
    }

    Ok(())
}

/// Whitespace-control post-pass: trims the TEXT token adjacent to every trim delimiter.
/// Operates only on the immediately neighboring TEXT token; never merges or removes tokens.
fn apply_whitespace_control(tokens: &mut [Token]) {
    for i in 0..tokens.len() {
        match tokens[i].ty {
            TokenType::VarStartTrim | TokenType::BlockStartTrim => {
                if i > 0 && tokens[i - 1].ty == TokenType::Text {
                    let trimmed = tokens[i - 1].value.as_str().trim_end().to_string();
                    tokens[i - 1].value = trimmed.into();
                }
            }
            TokenType::VarEndTrim | TokenType::BlockEndTrim => {
                if i + 1 < tokens.len() && tokens[i + 1].ty == TokenType::Text {
                    let trimmed = tokens[i + 1].value.as_str().trim_start().to_string();
                    tokens[i + 1].value = trimmed.into();
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenType> {
        tokenize(src).unwrap().iter().map(|t| t.ty).collect()
    }

    #[test]
    fn plain_text_round_trips() {
        let toks = tokenize("hello world").unwrap();
        assert_eq!(toks.len(), 2);
        assert_eq!(toks[0].ty, TokenType::Text);
        assert_eq!(toks[0].value.as_str(), "hello world");
        assert_eq!(toks[1].ty, TokenType::Eof);
    }

    #[test]
    fn simple_variable_tag_is_one_name() {
        let toks = tokenize("{{ name }}").unwrap();
        assert_eq!(
            kinds("{{ name }}"),
            vec![TokenType::VarStart, TokenType::Name, TokenType::VarEnd, TokenType::Eof]
        );
        assert_eq!(toks[1].value.as_str(), "name");
    }

    #[test]
    fn expression_variable_tag_tokenizes_operators() {
        let toks = tokenize("{{ a.b + 1 }}").unwrap();
        let tys: Vec<_> = toks.iter().map(|t| t.ty).collect();
        assert_eq!(
            tys,
            vec![
                TokenType::VarStart,
                TokenType::Name,
                TokenType::Punctuation,
                TokenType::Name,
                TokenType::Operator,
                TokenType::Number,
                TokenType::VarEnd,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn backslash_escapes_delimiter() {
        let toks = tokenize(r"a \{{ b").unwrap();
        assert_eq!(toks[0].ty, TokenType::Text);
        assert_eq!(toks[0].value.as_str(), "a {{ b");
        assert_eq!(toks[1].ty, TokenType::Eof);
    }

    #[test]
    fn unclosed_tag_is_a_lex_error() {
        let err = tokenize("{{ x").unwrap_err();
        assert_eq!(err.0, LexError::UnclosedTag("{{"));
    }

    #[test]
    fn unterminated_string_is_a_lex_error() {
        let err = tokenize("{{ 'abc }}").unwrap_err();
        assert_eq!(err.0, LexError::UnterminatedString);
    }

    #[test]
    fn whitespace_control_trims_only_adjacent_text() {
        let toks = tokenize("A\n  {%- if true -%}  B  {%- endif -%}\nC").unwrap();
        let text: Vec<&str> = toks
            .iter()
            .filter(|t| t.ty == TokenType::Text)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(text, vec!["A", "B", "C"]);
    }

    #[test]
    fn for_tag_tokenizes_in_as_name() {
        let toks = tokenize("{% for k, v in items %}").unwrap();
        let names: Vec<&str> = toks
            .iter()
            .filter(|t| t.ty == TokenType::Name)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(names, vec!["for", "k", "v", "in", "items"]);
    }

    #[test]
    fn negative_number_literal() {
        let toks = tokenize("{{ -5 }}").unwrap();
        assert_eq!(toks[1].ty, TokenType::Number);
        assert_eq!(toks[1].value.as_str(), "-5");
    }

    #[test]
    fn subtraction_is_not_merged_into_a_number() {
        let toks = tokenize("{{ a -5 }}").unwrap();
        let tys: Vec<_> = toks.iter().map(|t| t.ty).collect();
        assert_eq!(
            tys,
            vec![
                TokenType::VarStart,
                TokenType::Name,
                TokenType::Operator,
                TokenType::Number,
                TokenType::VarEnd,
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn verbatim_body_is_not_tokenized_as_tags() {
        let toks = tokenize("{% verbatim %}{{ raw }}{% endverbatim %}").unwrap();
        let tys: Vec<_> = toks.iter().map(|t| t.ty).collect();
        assert_eq!(
            tys,
            vec![
                TokenType::BlockStart,
                TokenType::Name,
                TokenType::BlockEnd,
                TokenType::Text,
                TokenType::BlockStart,
                TokenType::Name,
                TokenType::BlockEnd,
                TokenType::Eof,
            ]
        );
        let text_tok = toks.iter().find(|t| t.ty == TokenType::Text).unwrap();
        assert_eq!(text_tok.value.as_str(), "{{ raw }}");
    }

    #[test]
    fn comment_body_is_a_single_text_token() {
        let toks = tokenize("{# this {{ is }} ignored #}").unwrap();
        assert_eq!(
            kinds("{# this {{ is }} ignored #}"),
            vec![TokenType::CommentStart, TokenType::Text, TokenType::CommentEnd, TokenType::Eof]
        );
    }
}

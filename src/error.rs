//! Error kinds surfaced by the lexer, parser, and renderer.

use crate::token::Position;
use std::fmt;

/// Fatal lexer failure: unclosed tag or unterminated string literal.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LexError {
    /// A `{{`, `{%`, or `{#` was opened but no matching closer was found before EOF.
    UnclosedTag(&'static str),
    /// A quoted string literal inside an expression never found its closing quote.
    UnterminatedString,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnclosedTag(opener) => write!(f, "unclosed tag: expected closer for {opener}"),
            Self::UnterminatedString => f.write_str("unterminated string literal"),
        }
    }
}

/// What the parser expected but did not find.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseErrorType {
    /// Generic "expected X, found Y" mismatch.
    UnexpectedToken { expected: String, found: String },
    /// A block tag (`if`, `for`, `block`, ...) never saw its `end...` counterpart.
    MissingTerminator { tag: &'static str },
    /// `{% endblock name %}` named a block other than the one it closes.
    MismatchedBlockName { opened: String, closed: String },
    /// The left-hand side of `set`/`do`'s assignment form was not a bare name.
    InvalidAssignmentTarget,
    /// A tag body required at least one statement (e.g. `do`) but none was given.
    EmptyBody { tag: &'static str },
    /// Reference to an unknown tag keyword.
    UnknownTag(String),
}

impl fmt::Display for ParseErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedToken { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            Self::MissingTerminator { tag } => write!(f, "missing end{tag} for {{% {tag} %}}"),
            Self::MismatchedBlockName { opened, closed } => write!(
                f,
                "mismatched block name: opened '{opened}' but endblock named '{closed}'"
            ),
            Self::InvalidAssignmentTarget => {
                f.write_str("left-hand side of assignment must be a name")
            }
            Self::EmptyBody { tag } => write!(f, "'{tag}' requires a non-empty body"),
            Self::UnknownTag(name) => write!(f, "unknown tag '{name}'"),
        }
    }
}

/// Syntax error, carrying the line it occurred on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub ParseErrorType, pub Position);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.1)
    }
}

impl std::error::Error for ParseError {}

/// A loader failed to satisfy a template name.
///
/// Split out from [`RenderError`] because `{% include ... ignore missing %}` must distinguish
/// "not found" from every other render failure in order to suppress it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateNotFound {
    pub name: String,
}

impl fmt::Display for TemplateNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "template not found: '{}'", self.name)
    }
}

/// Everything that can go wrong while walking the AST.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum RenderErrorKind {
    /// Attribute or index access on a value that is neither a mapping nor a reflectable host
    /// object (and not nil/undefined, which resolve to nil instead of erroring).
    InvalidAttributeAccess { attribute: String, on_type: &'static str },
    /// Integer division or modulo by zero.
    DivisionByZero,
    /// `|name` referenced a filter that was never registered.
    UnknownFilter(String),
    /// `is name` referenced a test that was never registered.
    UnknownTest(String),
    /// `name(...)` referenced neither a local macro binding nor a registered function.
    UnknownFunction(String),
    /// An operator (`in`, `matches`, ...) was applied to operand types it does not support.
    UnsupportedOperator { op: String, lhs: &'static str, rhs: &'static str },
    /// A value that is not callable was called as if it were a macro.
    NotCallable(&'static str),
    /// `matches` compiled an invalid regular expression.
    InvalidRegex(String),
    /// `extends`/`include`/`import`/`from` could not resolve the referenced template name.
    TemplateResolution { resolved: String, original: String },
    /// `parent()` was called outside of a block that is actually overriding something.
    NoParentBlock(String),
    /// The output writer itself returned an error (e.g. the sink was closed).
    WriterFailed,
    /// A registered filter, test, or function rejected its arguments at call time (e.g. `slice`
    /// given a non-numeric offset, `matches` given an invalid pattern already reported via
    /// [`Self::InvalidRegex`] separately).
    ExtensionFailed { name: String, message: String },
    /// `extends`/`include`/`import` chained deeper than the engine's configured limit.
    TemplateDepthExceeded { limit: u32 },
}

impl fmt::Display for RenderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAttributeAccess { attribute, on_type } => {
                write!(f, "cannot access attribute '{attribute}' on {on_type}")
            }
            Self::DivisionByZero => f.write_str("division or modulo by zero"),
            Self::UnknownFilter(name) => write!(f, "unknown filter '{name}'"),
            Self::UnknownTest(name) => write!(f, "unknown test '{name}'"),
            Self::UnknownFunction(name) => write!(f, "unknown function '{name}'"),
            Self::UnsupportedOperator { op, lhs, rhs } => {
                write!(f, "operator '{op}' not supported between {lhs} and {rhs}")
            }
            Self::NotCallable(ty) => write!(f, "value of type {ty} is not callable"),
            Self::InvalidRegex(msg) => write!(f, "invalid regular expression: {msg}"),
            Self::TemplateResolution { resolved, original } => write!(
                f,
                "could not resolve template '{resolved}' (from '{original}')"
            ),
            Self::NoParentBlock(name) => {
                write!(f, "parent() called in block '{name}' which has no parent definition")
            }
            Self::WriterFailed => f.write_str("output writer returned an error"),
            Self::ExtensionFailed { name, message } => write!(f, "'{name}' failed: {message}"),
            Self::TemplateDepthExceeded { limit } => {
                write!(f, "template nesting exceeded the configured limit of {limit}")
            }
        }
    }
}

/// A render error together with the line it occurred on.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderError {
    pub kind: RenderErrorKind,
    pub position: Position,
}

impl RenderError {
    #[must_use]
    pub fn new(kind: RenderErrorKind, position: Position) -> Self {
        Self { kind, position }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.position)
    }
}

impl std::error::Error for RenderError {}

/// Raised by the (optional) sandbox collaborator when an operation is disallowed. The core never
/// constructs this variant itself; it only propagates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityError {
    pub message: String,
}

impl fmt::Display for SecurityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "security error: {}", self.message)
    }
}

/// The union of everything that can abort compiling or rendering a template.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum TemplateError {
    Lex(LexError, Position),
    Parse(ParseError),
    NotFound(TemplateNotFound),
    Render(RenderError),
    Security(SecurityError),
}

impl TemplateError {
    /// Is this the "missing template" kind? `include ... ignore missing` checks this to decide
    /// whether to suppress the error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub fn position(&self) -> Position {
        match self {
            Self::Lex(_, pos) => *pos,
            Self::Parse(e) => e.1,
            Self::NotFound(_) => Position::NONE,
            Self::Render(e) => e.position,
            Self::Security(_) => Position::NONE,
        }
    }

    /// Attach the name of the template in which this error surfaced, plus a one-line excerpt of
    /// the offending source with a caret under the column, producing the final message shown to
    /// callers. Only adds context; never changes the error kind.
    #[must_use]
    pub fn with_context(self, template_name: &str, source: &str) -> String {
        let pos = self.position();
        let mut msg = format!("{self}");
        if !template_name.is_empty() {
            msg = format!("{msg} in '{template_name}'");
        }
        if !pos.is_none() {
            if let Some(line_text) = source.lines().nth(pos.line().saturating_sub(1) as usize) {
                let caret_col = pos.col() as usize;
                let caret = " ".repeat(caret_col) + "^";
                msg = format!("{msg}\n{line_text}\n{caret}");
            }
        }
        msg
    }
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lex(e, pos) => write!(f, "syntax error: {e} ({pos})"),
            Self::Parse(e) => write!(f, "syntax error: {e}"),
            Self::NotFound(e) => write!(f, "{e}"),
            Self::Render(e) => write!(f, "{e}"),
            Self::Security(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for TemplateError {}

impl From<ParseError> for TemplateError {
    #[inline(always)]
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<TemplateNotFound> for TemplateError {
    #[inline(always)]
    fn from(e: TemplateNotFound) -> Self {
        Self::NotFound(e)
    }
}

impl From<RenderError> for TemplateError {
    #[inline(always)]
    fn from(e: RenderError) -> Self {
        Self::Render(e)
    }
}

impl From<SecurityError> for TemplateError {
    #[inline(always)]
    fn from(e: SecurityError) -> Self {
        Self::Security(e)
    }
}

//! Crate-wide error taxonomy.
///
/// A `Fail`-derived kind enum wrapped in a `failure::Context`, exposed
/// behind a `Result<T>` alias, with a stable `exit_code()` per kind since
/// hctl's whole command surface is defined in terms of these eight numeric
/// exits.
use failure::{Backtrace, Context, Fail};
use std::fmt::{self, Display};

/// The eight error kinds hctl classifies failures into, with their stable
/// exit codes.
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
    #[fail(display = "{}", _0)]
    Config(String),

    #[fail(display = "{}", _0)]
    Validation(String),

    #[fail(display = "{}", _0)]
    NotFound(String),

    #[fail(display = "{}", _0)]
    Network(String),

    #[fail(display = "{}", _0)]
    Permission(String),

    #[fail(display = "{}", _0)]
    Conflict(String),

    #[fail(display = "{}", _0)]
    Timeout(String),

    #[fail(display = "{}", _0)]
    Internal(String),
}

impl ErrorKind {
    /// The stable numeric exit code for this kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Config(_) => 10,
            ErrorKind::Validation(_) => 20,
            ErrorKind::NotFound(_) => 30,
            ErrorKind::Network(_) => 40,
            ErrorKind::Permission(_) => 50,
            ErrorKind::Conflict(_) => 60,
            ErrorKind::Timeout(_) => 70,
            ErrorKind::Internal(_) => 1,
        }
    }

    /// Short machine-stable name, used in the single leading error line and
    /// in the remediation lookup table.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Config(_) => "ConfigError",
            ErrorKind::Validation(_) => "ValidationError",
            ErrorKind::NotFound(_) => "NotFoundError",
            ErrorKind::Network(_) => "NetworkError",
            ErrorKind::Permission(_) => "PermissionError",
            ErrorKind::Conflict(_) => "ConflictError",
            ErrorKind::Timeout(_) => "TimeoutError",
            ErrorKind::Internal(_) => "InternalError",
        }
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        ErrorKind::Config(msg.into())
    }
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        ErrorKind::Validation(msg.into())
    }
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        ErrorKind::NotFound(msg.into())
    }
    pub fn network<S: Into<String>>(msg: S) -> Self {
        ErrorKind::Network(msg.into())
    }
    pub fn permission<S: Into<String>>(msg: S) -> Self {
        ErrorKind::Permission(msg.into())
    }
    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        ErrorKind::Conflict(msg.into())
    }
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        ErrorKind::Timeout(msg.into())
    }
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        ErrorKind::Internal(msg.into())
    }

    /// Whether the retry policy allows retrying an error of this kind.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Network(_))
    }
}

/// The crate-wide error type: a classified kind plus its cause chain.
///
/// A classified kind plus its cause chain, named for the whole binary
/// rather than scoped to one module.
#[derive(Debug)]
pub struct HctlError {
    inner: Context<ErrorKind>,
}

impl HctlError {
    pub fn kind(&self) -> &ErrorKind {
        self.inner.get_context()
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }

    /// The cause chain, outermost first, for `--verbose` rendering.
    pub fn causes(&self) -> Vec<String> {
        let mut out = vec![self.to_string()];
        let mut cause = Fail::cause(self);
        while let Some(c) = cause {
            out.push(c.to_string());
            cause = c.cause();
        }
        out
    }
}

impl Fail for HctlError {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }
    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl Display for HctlError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

impl From<ErrorKind> for HctlError {
    fn from(kind: ErrorKind) -> HctlError {
        HctlError { inner: Context::new(kind) }
    }
}

impl From<Context<ErrorKind>> for HctlError {
    fn from(inner: Context<ErrorKind>) -> HctlError {
        HctlError { inner }
    }
}

pub type Result<T> = std::result::Result<T, HctlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_spec() {
        assert_eq!(ErrorKind::config("x").exit_code(), 10);
        assert_eq!(ErrorKind::validation("x").exit_code(), 20);
        assert_eq!(ErrorKind::not_found("x").exit_code(), 30);
        assert_eq!(ErrorKind::network("x").exit_code(), 40);
        assert_eq!(ErrorKind::permission("x").exit_code(), 50);
        assert_eq!(ErrorKind::conflict("x").exit_code(), 60);
        assert_eq!(ErrorKind::timeout("x").exit_code(), 70);
        assert_eq!(ErrorKind::internal("x").exit_code(), 1);
    }

    #[test]
    fn only_network_is_retryable() {
        assert!(ErrorKind::network("x").is_retryable());
        assert!(!ErrorKind::conflict("x").is_retryable());
        assert!(!ErrorKind::validation("x").is_retryable());
    }

    #[test]
    fn causes_include_context_chain() {
        let e: HctlError = ErrorKind::validation("bad spec").into();
        assert_eq!(e.causes(), vec!["bad spec".to_string()]);
    }
}

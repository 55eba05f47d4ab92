//! The engine ConnectorError type, and the differ's DiffError.

use std::{
    error::Error as StdError,
    fmt::{Debug, Display, Write},
    sync::Arc,
};
use thiserror::Error;
use tracing_error::SpanTrace;

/// The general error reporting type for the engine: something went wrong
/// talking to the server, or verification failed.
#[derive(Clone)]
pub struct ConnectorError(Box<ConnectorErrorImpl>);

/// Shorthand for a `Result` with a [`ConnectorError`] error variant.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[derive(Debug, Clone)]
struct ConnectorErrorImpl {
    /// The message to surface.
    message: Option<Box<str>>,
    /// The source of the error.
    source: Option<Arc<dyn StdError + Send + Sync + 'static>>,
    /// See the tracing-error docs.
    context: SpanTrace,
}

impl Debug for ConnectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self.0, f)?;
        f.write_char('\n')?;
        Display::fmt(self, f)
    }
}

impl Display for ConnectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.0.message, &self.0.source) {
            (Some(message), Some(source)) => {
                f.write_str(message)?;
                f.write_str(": ")?;
                Display::fmt(source.as_ref(), f)
            }
            (Some(message), None) => f.write_str(message),
            (None, Some(source)) => Display::fmt(source.as_ref(), f),
            (None, None) => f.write_str("unknown error"),
        }
    }
}

impl StdError for ConnectorError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0
            .source
            .as_ref()
            .map(|err| -> &(dyn StdError + 'static) { err.as_ref() })
    }
}

impl ConnectorError {
    /// A reference to the tracing-error context.
    pub fn context(&self) -> &SpanTrace {
        &self.0.context
    }

    /// Build a generic error from just an error message.
    pub fn from_msg(message: String) -> Self {
        ConnectorError(Box::new(ConnectorErrorImpl {
            message: Some(message.into_boxed_str()),
            source: None,
            context: SpanTrace::capture(),
        }))
    }

    /// Build a generic error from a source error, with some additional
    /// context.
    pub fn from_source<E: StdError + Send + Sync + 'static>(source: E, context: impl Into<Box<str>>) -> Self {
        ConnectorError(Box::new(ConnectorErrorImpl {
            message: Some(context.into()),
            source: Some(Arc::new(source)),
            context: SpanTrace::capture(),
        }))
    }

    /// The message, without the source chain.
    pub fn message(&self) -> Option<&str> {
        self.0.message.as_deref()
    }
}

impl From<mysql_async::Error> for ConnectorError {
    fn from(err: mysql_async::Error) -> Self {
        ConnectorError(Box::new(ConnectorErrorImpl {
            message: None,
            source: Some(Arc::new(err)),
            context: SpanTrace::capture(),
        }))
    }
}

impl From<mysql_schema_describer::DescriberError> for ConnectorError {
    fn from(err: mysql_schema_describer::DescriberError) -> Self {
        ConnectorError::from_source(err, "Error introspecting the workspace schema")
    }
}

/// Errors the table differ can raise when rendering a diff to DDL.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DiffError {
    /// The differ cannot fully model the tables involved; the structural diff
    /// is incomplete.
    #[error("{0}")]
    Unsupported(UnsupportedDiff),

    /// The diff contains destructive clauses and the modifiers do not permit
    /// them.
    #[error("destructive clauses forbidden by the active statement modifiers: {}", clauses.join(", "))]
    Forbidden {
        /// The offending clauses, rendered.
        clauses: Vec<String>,
    },
}

impl DiffError {
    /// Whether this is the unsupported-diff variant.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, DiffError::Unsupported(_))
    }

    pub fn as_unsupported(&self) -> Option<&UnsupportedDiff> {
        match self {
            DiffError::Unsupported(unsupported) => Some(unsupported),
            _ => None,
        }
    }
}

/// Descriptor of a diff the differ cannot fully model. Carries a human
/// reason, multi-line CREATEs of both sides, and the ALTER text for whatever
/// part of the diff *was* modeled (possibly empty).
#[derive(Debug, Clone, PartialEq)]
pub struct UnsupportedDiff {
    pub reason: String,
    /// Multi-line CREATE of the desired (`to`) table.
    pub expected_desc: String,
    /// Multi-line CREATE of the pre-image (`from`) table. Uses the phrase
    /// "original state".
    pub actual_desc: String,
    /// Best-effort ALTER covering the modeled part of the diff.
    pub statement: String,
}

impl Display for UnsupportedDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reason)
    }
}

impl UnsupportedDiff {
    /// The full debugging text: reason plus both table descriptions.
    pub fn extended_error(&self) -> String {
        format!("{}\n{}\n{}", self.reason, self.expected_desc, self.actual_desc)
    }

    /// Rewrite the descriptors for errors coming out of a second,
    /// post-execution diff: the pre-image is no longer the original table but
    /// the one the workspace produced.
    pub fn into_post_verification(mut self) -> Self {
        for field in [&mut self.reason, &mut self.expected_desc, &mut self.actual_desc] {
            *field = field.replacen("original state", "post-verification state", 1);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn an_unsupported_diff() -> UnsupportedDiff {
        UnsupportedDiff {
            reason: "original state of table `orders` uses unmodeled features".into(),
            expected_desc: "desired state:\nCREATE TABLE `orders` (...)".into(),
            actual_desc: "original state:\nCREATE TABLE `orders` (...) PARTITION BY ...".into(),
            statement: String::new(),
        }
    }

    #[test]
    fn post_verification_rewrite_replaces_the_first_occurrence_in_each_descriptor() {
        let rewritten = an_unsupported_diff().into_post_verification();

        assert!(rewritten.reason.starts_with("post-verification state of table"));
        assert!(rewritten.actual_desc.starts_with("post-verification state:"));
        // Untouched when the phrase is absent.
        assert!(rewritten.expected_desc.starts_with("desired state:"));
    }

    #[test]
    fn extended_error_contains_all_three_descriptors() {
        let unsupported = an_unsupported_diff();
        let extended = unsupported.extended_error();

        assert!(extended.contains(&unsupported.reason));
        assert!(extended.contains(&unsupported.expected_desc));
        assert!(extended.contains(&unsupported.actual_desc));
    }

    #[test]
    fn unsupported_predicate() {
        let err = DiffError::Unsupported(an_unsupported_diff());
        assert!(err.is_unsupported());

        let err = DiffError::Forbidden {
            clauses: vec!["DROP COLUMN `info`".into()],
        };
        assert!(!err.is_unsupported());
        assert!(err.to_string().contains("DROP COLUMN `info`"));
    }
}

//! Introspection errors. The describer fails in exactly two ways: a query
//! failed on the driver or the server, or the schema to describe has no row
//! in `information_schema.schemata`.

use thiserror::Error;
use tracing_error::SpanTrace;

/// Shorthand for introspection results.
pub type DescriberResult<T> = Result<T, DescriberError>;

/// An introspection failure, with the span trace captured where it surfaced.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct DescriberError {
    kind: DescriberErrorKind,
    context: SpanTrace,
}

impl DescriberError {
    /// What went wrong.
    pub fn kind(&self) -> &DescriberErrorKind {
        &self.kind
    }

    /// Where it went wrong, as captured spans.
    pub fn span_trace(&self) -> &SpanTrace {
        &self.context
    }
}

/// What the introspection queries can fail with.
#[derive(Debug, Error)]
pub enum DescriberErrorKind {
    /// The driver or the server failed a query.
    #[error("introspection query failed: {0}")]
    QueryError(#[from] mysql_async::Error),

    /// `information_schema.schemata` has no row for the requested schema.
    /// Either it was dropped between listing and describing, or the caller
    /// passed a name that never existed.
    #[error("schema `{name}` does not exist on the server")]
    UnknownSchema {
        /// The schema that was asked for.
        name: String,
    },
}

impl From<DescriberErrorKind> for DescriberError {
    fn from(kind: DescriberErrorKind) -> Self {
        DescriberError {
            kind,
            context: SpanTrace::capture(),
        }
    }
}

impl From<mysql_async::Error> for DescriberError {
    fn from(err: mysql_async::Error) -> Self {
        DescriberErrorKind::QueryError(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_schema_errors_name_the_schema() {
        let err: DescriberError = DescriberErrorKind::UnknownSchema { name: "app".into() }.into();

        assert_eq!(err.to_string(), "schema `app` does not exist on the server");
        assert!(matches!(err.kind(), DescriberErrorKind::UnknownSchema { .. }));
    }
}

/// Errors raised while constructing a component subtree from a schema
/// fragment. Build errors reject the whole subtree; the parent must not
/// substitute a default component.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema fragment is missing a type")]
    MissingType,
    #[error("unknown component type: {0}")]
    UnknownType(String),
    #[error("invalid schema fragment: {0}")]
    InvalidFragment(String),
}

/// Errors from fetching a remote schema fragment. Surfaced through the
/// readiness gate of the owning reference node; the node itself stays in a
/// consistent, childless state.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("fragment not found: {0}")]
    NotFound(String),
    #[error("server error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed fragment: {0}")]
    Malformed(String),
    #[error("load cancelled")]
    Cancelled,
}

impl LoadError {
    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            404 => Self::NotFound(body),
            _ => Self::Http { status, body },
        }
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Http { .. } => "http",
            Self::Network(_) => "network",
            Self::Malformed(_) => "malformed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Errors from evaluating a conditional rule. Contained per node: the engine
/// treats the node as visible (fail open) and surfaces the error to the host
/// instead of propagating it.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("unknown operator: {0}")]
    UnknownOperator(String),
    #[error("malformed rule: {0}")]
    MalformedRule(String),
}

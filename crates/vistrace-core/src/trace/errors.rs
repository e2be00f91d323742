use thiserror::Error;

/// Failures inside the tracer runtime. None of these reach the traced
/// program; they are logged, counted and the affected record is dropped.
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("unresolved identifier '{name}'")]
    UnresolvedIdentifier { name: String },

    #[error("cannot resolve location: {0}")]
    Unresolvable(String),

    #[error("cannot serialize value: {0}")]
    Serialization(String),

    #[error("trace sink failed: {0}")]
    Sink(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TraceError {
    pub fn unresolved(name: &str) -> Self {
        Self::UnresolvedIdentifier {
            name: name.to_string(),
        }
    }
}

use thiserror::Error;

/// Failure taxonomy for the ingest and publish pipelines.
///
/// Value-level problems (an unparseable timestamp, a malformed number) never
/// surface here; they are coerced to NULL during alignment. These variants
/// cover structural and connectivity failures only.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The source resource could not be read or parsed at all.
    #[error("source unavailable: {uri}")]
    SourceUnavailable {
        uri: String,
        #[source]
        cause: anyhow::Error,
    },

    /// A partition's structure cannot be reconciled with the reference schema.
    #[error("cannot align column {column:?} to the reference schema: {reason}")]
    Alignment { column: String, reason: String },

    /// The destination rejected a write.
    #[error("sink rejected write to {target}")]
    SinkWrite {
        target: String,
        #[source]
        cause: anyhow::Error,
    },

    /// The destination bucket or table cannot be created or accessed.
    #[error("destination {name} is not accessible: {reason}")]
    Provisioning { name: String, reason: String },
}

impl PipelineError {
    pub(crate) fn source_unavailable(
        uri: impl Into<String>,
        cause: impl Into<anyhow::Error>,
    ) -> Self {
        Self::SourceUnavailable {
            uri: uri.into(),
            cause: cause.into(),
        }
    }

    pub(crate) fn alignment(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Alignment {
            column: column.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn sink_write(target: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        Self::SinkWrite {
            target: target.into(),
            cause: cause.into(),
        }
    }

    pub(crate) fn provisioning(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Provisioning {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

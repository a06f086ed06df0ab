use thiserror::Error;

/// Convenient result alias for the wayfinder library.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Raised when a node code could not be found in the loaded graph.
    #[error("unknown node code: {code}{}", format_suggestions(.suggestions))]
    UnknownNode {
        code: String,
        suggestions: Vec<String>,
    },

    /// Raised when no route connects the two nodes over active edges.
    #[error("no route found between {start} and {goal} ({})", stairs_label(.avoid_stairs))]
    NoPathFound {
        start: String,
        goal: String,
        avoid_stairs: bool,
    },

    /// Raised when a route is requested before any graph snapshot was loaded.
    #[error("routing graph is not initialized; download the campus dataset first")]
    NotInitialized,

    /// Raised when the node/edge dataset could not be fetched or stored.
    #[error("dataset download failed: {message}")]
    DownloadFailed { message: String },

    /// Raised for a single asset that failed inside a batch download.
    #[error("failed to cache image {key}: {message}")]
    PartialImageFailure { key: String, message: String },

    /// Raised when a sync session is already running.
    #[error("a sync is already in progress")]
    SyncInProgress,

    /// Raised when a download session is already running.
    #[error("a download is already in progress")]
    DownloadInProgress,

    /// Durable storage could not be read.
    #[error("failed to read {key} from storage: {message}")]
    StorageRead { key: String, message: String },

    /// Durable storage could not be written.
    #[error("failed to write {key} to storage: {message}")]
    StorageWrite { key: String, message: String },

    /// Raised when a remote record cannot be normalized into a node or edge.
    #[error("invalid {kind} record: {message}")]
    InvalidRecord { kind: &'static str, message: String },

    /// Raised when configuration could not be resolved or parsed.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// No suitable project directories could be resolved for this platform.
    #[error("failed to resolve project directories for the offline cache")]
    ProjectDirsUnavailable,

    /// Wrapper for SQLite errors.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Wrapper for IO errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Wrapper for HTTP client errors.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Wrapper for JSON (de)serialization errors.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn read(key: impl Into<String>, message: impl ToString) -> Self {
        Error::StorageRead {
            key: key.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn write(key: impl Into<String>, message: impl ToString) -> Self {
        Error::StorageWrite {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// True for failures of the durable storage layer.
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::StorageRead { .. } | Error::StorageWrite { .. })
    }
}

fn stairs_label(avoid_stairs: &bool) -> &'static str {
    if *avoid_stairs {
        "avoiding stairs"
    } else {
        "stairs allowed"
    }
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else if suggestions.len() == 1 {
        format!(". Did you mean '{}'?", suggestions[0])
    } else {
        format!(
            ". Did you mean one of: {}?",
            suggestions
                .iter()
                .map(|s| format!("'{}'", s))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_route_message_lists_stair_setting() {
        let error = Error::NoPathFound {
            start: "LIB-1".to_string(),
            goal: "GYM-2".to_string(),
            avoid_stairs: true,
        };
        let message = error.to_string();
        assert!(message.contains("no route found"));
        assert!(message.contains("avoiding stairs"));
    }

    #[test]
    fn unknown_node_lists_suggestions() {
        let error = Error::UnknownNode {
            code: "LIB-01".to_string(),
            suggestions: vec!["LIB-1".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "unknown node code: LIB-01. Did you mean 'LIB-1'?"
        );
    }
}

use thiserror::Error;

/// Malformed grid input.
///
/// Raised only by constructors; the turn loop maps these to degraded grids.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("grid has no cells")]
    Empty,

    #[error("row {row} has {found} cells, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("cell value {value} is not a colour index")]
    ColorOutOfRange { value: i64 },

    #[error("layered frame has no layers")]
    NoLayers,
}

/// Failure of the external vision-language collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("collaborator transport error: {0}")]
    Transport(String),

    #[error("collaborator returned an empty response")]
    EmptyResponse,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of [`Error`] values.
///
/// Callers use this to decide whether an operation may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Misconfigured actors, parameters or repository. Not retried.
    Configuration,
    /// An actor name could not be resolved. User-correctable.
    Resolution,
    /// The actor graph would contain a cycle or a duplicate edge.
    GraphStructure,
    /// Lock contention. Safe to retry.
    Transient,
    /// A cache entry was requested before it was written.
    NotFound,
    /// Filesystem or storage failure.
    Io,
    /// Error raised by user actor code.
    Actor,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Actor {classpath} has no version")]
    MissingVersion { classpath: String },

    #[error("Invalid classpath {0:?}: must be a non-empty identifier without path separators")]
    InvalidClasspath(String),

    #[error("Unsupported parameter value at {path}: {reason}")]
    UnsupportedParam { path: String, reason: String },

    #[error("Malformed parameter class {class} of actor {classpath}: {reason}")]
    MalformedParamClass {
        classpath: String,
        class: String,
        reason: String,
    },

    #[error("Parameters do not match the declared parameter classes: {0}")]
    ParamMismatch(String),

    #[error(
        "Cannot build actor {target} because the actor graph has more than one instance of {classpath} among its dependencies"
    )]
    DuplicateActorType { target: String, classpath: String },

    #[error("Cannot find actor with name {0}")]
    ActorNotFound(String),

    #[error(
        "Multiple actors with name {name} found: {candidates:?}. Try to specify a longer name if you are using a short name."
    )]
    AmbiguousActor {
        name: String,
        candidates: Vec<String>,
    },

    #[error("Unknown actor node {0}")]
    UnknownNode(usize),

    #[error("Adding dependency {dependency} -> {dependent} would create a cycle")]
    Cycle {
        dependency: String,
        dependent: String,
    },

    #[error("Dependency {dependency} -> {dependent} already exists")]
    DuplicateEdge {
        dependency: String,
        dependent: String,
    },

    #[error("Timed out after {timeout:?} acquiring lock {}", path.display())]
    LockTimeout { path: PathBuf, timeout: Duration },

    #[error("File {0} does not exist in the cache")]
    FileNotFound(String),

    #[error("Folder {0} does not exist in the cache")]
    FolderNotFound(String),

    #[error("Could not allocate a cache directory under {}", .0.display())]
    AllocationExhausted(PathBuf),

    #[error("Invalid dataset selection {spec:?}: {reason}")]
    InvalidSelection { spec: String, reason: String },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Key-value store error: {0}")]
    KeyValue(#[from] rocksdb::Error),

    #[error(transparent)]
    Actor(#[from] anyhow::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingVersion { .. }
            | Error::InvalidClasspath(_)
            | Error::UnsupportedParam { .. }
            | Error::MalformedParamClass { .. }
            | Error::ParamMismatch(_)
            | Error::DuplicateActorType { .. }
            | Error::InvalidSelection { .. } => ErrorKind::Configuration,
            Error::ActorNotFound(_) | Error::AmbiguousActor { .. } | Error::UnknownNode(_) => {
                ErrorKind::Resolution
            }
            Error::Cycle { .. } | Error::DuplicateEdge { .. } => ErrorKind::GraphStructure,
            Error::LockTimeout { .. } => ErrorKind::Transient,
            Error::FileNotFound(_) | Error::FolderNotFound(_) => ErrorKind::NotFound,
            Error::Io { .. }
            | Error::Json(_)
            | Error::KeyValue(_)
            | Error::AllocationExhausted(_) => ErrorKind::Io,
            Error::Actor(_) => ErrorKind::Actor,
        }
    }

    /// Lock timeouts are the only errors worth retrying as-is.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// I/O error annotated with the path it happened at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// Attach a path to `std::io::Error`s.
pub(crate) trait IoContext<T> {
    fn at_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| Error::io(path, e))
    }
}

use std::path::PathBuf;

use thiserror::Error;

use crate::model::ResolutionLevel;

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("duplicate class: {0}")]
    DuplicateClass(String),

    #[error("class is not managed by this scene: {0}")]
    NotManaged(String),

    #[error("can't find classfile {0}")]
    ClassNotFound(String),

    #[error("platform not found: {0}")]
    PlatformNotFound(String),

    #[error("no call graph present in scene; run whole-program construction first")]
    NoCallGraph,

    #[error("no such member: {0}")]
    MemberNotFound(String),

    #[error("{name} is not resolved to level {required:?}")]
    UnresolvedClass {
        name: String,
        required: ResolutionLevel,
    },

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("none of the basic classes could be loaded; check the class path")]
    NoBasicClassesLoaded,

    #[error("resolution has finished and {name} is not resolved at level {level:?}")]
    ResolutionFinished {
        name: String,
        level: ResolutionLevel,
    },

    #[error("cyclic class hierarchy through {0}")]
    CyclicHierarchy(String),

    #[error("unknown runtime version schema: {0}")]
    InvalidRuntimeVersion(String),

    #[error("no main class: {0}")]
    NoMainClass(String),

    #[error("context numberer is already set")]
    ContextNumbererAlreadySet,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to read archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SceneError>;

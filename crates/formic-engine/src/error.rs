use formic_core::errors::{LoadError, SchemaError};
use formic_core::ids::ComponentId;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("load error: {0}")]
    Load(#[from] LoadError),

    #[error("unknown component: {0}")]
    UnknownComponent(ComponentId),

    #[error("component is not a composite: {0}")]
    NotAComposite(ComponentId),

    #[error("cannot remove the root component")]
    CannotRemoveRoot,
}

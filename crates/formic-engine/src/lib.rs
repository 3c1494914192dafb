//! The formic form engine: builds a component tree from a declarative JSON
//! schema, binds it to a single data object, and keeps values and conditional
//! visibility in sync as the data changes.
//!
//! The entry point is [`Form`]. A form owns its [`ComponentTree`], a change
//! bus, and the condition evaluator; reference-type components with remote
//! sources are resolved asynchronously through a [`FragmentLoader`], gated by
//! per-node [`Readiness`] watches.

mod builder;
mod error;
mod form;
mod loader;
mod registry;
mod sync;
mod tree;
mod visibility;

pub use builder::TreeBuilder;
pub use error::EngineError;
pub use form::{Form, FormOptions};
pub use loader::{FragmentLoader, HttpLoader, StaticLoader};
pub use registry::{FieldBehavior, FieldKind, FieldType, TypeRegistry};
pub use tree::{ComponentNode, ComponentTree, NodeKind, Readiness};

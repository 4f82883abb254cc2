pub mod entity;
pub mod error;
pub mod mapper;
pub mod patchset;
pub mod registry;
pub mod repository;
pub mod resolver;
pub mod schema;
pub mod tracking;

pub use entity::{Aggregate, Entity, EntityHandle, Ref};
pub use patchset::PatchSet;
pub use registry::{AliasRegistry, ModelType};
pub use repository::{EntityStore, PatchRepository, Repository, UnitOfWork};
pub use resolver::{ApplyHooks, PatchApplier, PatchResolver, ResolverConfig};
pub use schema::Schema;

pub use patchwork_proto as proto;
pub use patchwork_proto::Uid;

//! # Patchwork
//!
//! Patchwork turns the changes made to an in-memory model graph into an ordered list of portable
//! patches, and replays such a list against a storage backend as a single unit of work.
//!
//! ## Core Concepts
//!
//! - **ModelPatch**: one change to one model instance (create, update or delete), addressed by alias and uid
//! - **Membership**: the parent edge of an aggregate member, carried by patches that add or remove the member
//! - **PatchSet**: the ordered patches of one unit of work, built by walking change-tracked models
//! - **PatchResolver**: applies a `PatchSet` through a `PatchRepository`, all or nothing
//! - **Repository**: dispatches type-erased patch operations to the typed `EntityStore` of a backend
//!
//! ## Example: Applying Wire Patches
//!
//! ```rust
//! # use std::sync::Arc;
//! # use patchwork::{AliasRegistry, Entity, PatchResolver, PatchSet, Repository, Schema, Uid};
//! # use patchwork_storage_sled::SledBackend;
//! # use serde::{Deserialize, Serialize};
//! #[derive(Serialize, Deserialize)]
//! pub struct Album {
//!     uid: Uid,
//!     name: String,
//! }
//!
//! impl Entity for Album {
//!     fn collection() -> &'static str { "album" }
//!     fn uid(&self) -> &Uid { &self.uid }
//!     fn with_uid(uid: Uid) -> Self { Album { uid, name: String::new() } }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//!     let mut aliases = AliasRegistry::new();
//!     aliases.register::<Album>("album")?;
//!
//!     let repository = Repository::new(SledBackend::new_test()?).register::<Album>();
//!     let resolver = PatchResolver::new(repository, Arc::new(aliases), Arc::new(Schema::new()));
//!
//!     let json = r#"[{ "verb": "Create", "model": "album", "uid": "A1", "properties": { "name": "Origin of Symmetry" } }]"#;
//!     resolver.apply(&PatchSet::from_json_many(json)?, true).await?;
//! #   Ok(())
//! # }
//! ```

pub use patchwork_core::{entity, error, mapper, patchset, registry, repository, resolver, schema, tracking};
pub use patchwork_core::{
    Aggregate, AliasRegistry, ApplyHooks, Entity, EntityHandle, EntityStore, ModelType, PatchApplier, PatchRepository, PatchResolver,
    PatchSet, Ref, Repository, ResolverConfig, Schema, UnitOfWork,
};
pub use patchwork_proto as proto;
pub use patchwork_proto::{Membership, ModelPatch, Properties, PropertyValue, Uid, Verb};

// Re-export dependencies needed by entity definitions
pub use serde;
pub use serde_json;
pub use tracing;

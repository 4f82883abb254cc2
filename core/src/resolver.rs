use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use patchwork_proto::{Membership, ModelPatch, Properties, PropertyValue, Verb};
use tracing::{debug, error, info, warn};

use crate::{
    entity::EntityHandle,
    error::ApplyError,
    mapper::{ResolvedProperties, ResolvedValue},
    patchset::PatchSet,
    registry::{AliasRegistry, ModelType},
    repository::PatchRepository,
    schema::Schema,
};

/// Applies a [`PatchSet`] to some store.
#[async_trait]
pub trait PatchApplier: Send + Sync {
    async fn apply(&self, patches: &PatchSet, commit: bool) -> Result<(), ApplyError>;
}

/// Extension points around a whole batch, e.g. for taking an external lock.
#[async_trait]
pub trait ApplyHooks: Send + Sync {
    /// Runs before any patch is touched. An error here rejects the batch without calling the repository.
    async fn before_apply(&self, _patches: &PatchSet) -> Result<(), ApplyError> { Ok(()) }

    async fn after_apply(&self, _completed: bool) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl ApplyHooks for NoHooks {}

#[derive(Debug, Clone, Default)]
pub struct ResolverConfig {
    /// Deadline for a whole batch. Exceeding it aborts the unit of work.
    pub timeout: Option<Duration>,
}

impl ResolverConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Replays patches against a [`PatchRepository`] with all-or-nothing semantics.
///
/// Patches are applied strictly in order, one repository call at a time. If any of them fails the
/// repository is aborted and the failure is returned as is; `save` only runs after every patch succeeded.
pub struct PatchResolver<R, H = NoHooks> {
    repository: R,
    aliases: Arc<AliasRegistry>,
    schema: Arc<Schema>,
    hooks: H,
    config: ResolverConfig,
}

impl<R: PatchRepository> PatchResolver<R, NoHooks> {
    pub fn new(repository: R, aliases: Arc<AliasRegistry>, schema: Arc<Schema>) -> Self {
        Self { repository, aliases, schema, hooks: NoHooks, config: ResolverConfig::default() }
    }
}

impl<R: PatchRepository, H: ApplyHooks> PatchResolver<R, H> {
    pub fn with_hooks<H2: ApplyHooks>(self, hooks: H2) -> PatchResolver<R, H2> {
        let PatchResolver { repository, aliases, schema, config, .. } = self;
        PatchResolver { repository, aliases, schema, hooks, config }
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn repository(&self) -> &R { &self.repository }

    pub fn hooks(&self) -> &H { &self.hooks }

    pub async fn apply(&self, patches: &PatchSet, commit: bool) -> Result<(), ApplyError> {
        self.hooks.before_apply(patches).await?;
        let result = self.apply_batch(patches, commit).await;
        self.hooks.after_apply(result.is_ok()).await;
        result
    }

    async fn apply_batch(&self, patches: &PatchSet, commit: bool) -> Result<(), ApplyError> {
        let result = self.run(patches, commit).await;
        if let Err(err) = &result {
            warn!("PatchResolver aborting batch: {err}");
            if let Err(abort_err) = self.repository.abort().await {
                error!("PatchResolver abort failed after {err}: {abort_err}");
            }
        }
        result
    }

    async fn run(&self, patches: &PatchSet, commit: bool) -> Result<(), ApplyError> {
        let applied = match self.config.timeout {
            Some(limit) => tokio::time::timeout(limit, self.apply_patches(patches)).await.map_err(|_| ApplyError::Timeout(limit))??,
            None => self.apply_patches(patches).await?,
        };
        if commit {
            self.repository.save().await?;
        }
        info!("PatchResolver applied {applied} patches (commit: {commit})");
        Ok(())
    }

    async fn apply_patches(&self, patches: &PatchSet) -> Result<usize, ApplyError> {
        let mut applied = 0;
        for patch in patches.get_patches() {
            self.apply_patch(patch).await?;
            applied += 1;
        }
        Ok(applied)
    }

    async fn apply_patch(&self, patch: &ModelPatch) -> Result<(), ApplyError> {
        debug!("PatchResolver.apply {patch}");
        let model = self.resolve_alias(patch.model())?;
        let uid = patch.uid();

        match (patch.verb(), patch.membership()) {
            (Verb::Update, _) => {
                let properties = self.resolve_properties(patch.properties()).await?;
                self.repository.handle_update(model, uid, properties).await?;
            }
            (Verb::Create, None) => {
                let properties = self.resolve_properties(patch.properties()).await?;
                self.repository.handle_create(model, uid, properties).await?;
            }
            (Verb::Create, Some(membership)) => {
                let properties = self.resolve_properties(patch.properties()).await?;
                let member = self.repository.handle_create(model, uid, properties).await?;
                let parent = self.retrieve_parent(membership).await?;
                self.update_aggregate(parent, &membership.property, Verb::Create, &member).await?;
            }
            (Verb::Delete, None) => {
                self.repository.handle_delete(model, uid).await?;
            }
            (Verb::Delete, Some(membership)) => {
                let parent = self.retrieve_parent(membership).await?;
                let member = self
                    .repository
                    .handle_retrieve(model, uid)
                    .await?
                    .ok_or_else(|| ApplyError::NotFound { model: patch.model().to_owned(), uid: uid.clone() })?;
                self.update_aggregate(parent, &membership.property, Verb::Delete, &member).await?;
                self.repository.handle_delete(model, uid).await?;
            }
            (Verb::Unmodified, _) => {}
        }
        Ok(())
    }

    fn resolve_alias(&self, alias: &str) -> Result<ModelType, ApplyError> {
        self.aliases.resolve(alias).ok_or_else(|| ApplyError::UnknownModel(alias.to_owned()))
    }

    /// Fetch every referenced entity so the property bag can be mapped onto its target.
    async fn resolve_properties(&self, properties: &Properties) -> Result<ResolvedProperties, ApplyError> {
        let mut resolved = ResolvedProperties::new();
        for (name, value) in properties {
            let value = match value {
                PropertyValue::Scalar(value) => ResolvedValue::Scalar(value.clone()),
                PropertyValue::Reference { model, uid: None } => {
                    self.resolve_alias(model)?;
                    ResolvedValue::Reference(None)
                }
                PropertyValue::Reference { model, uid: Some(uid) } => {
                    let target = self
                        .repository
                        .handle_retrieve(self.resolve_alias(model)?, uid)
                        .await?
                        .ok_or_else(|| ApplyError::NotFound { model: model.clone(), uid: uid.clone() })?;
                    ResolvedValue::Reference(Some(target))
                }
            };
            resolved.insert(name.clone(), value);
        }
        Ok(resolved)
    }

    async fn retrieve_parent(&self, membership: &Membership) -> Result<EntityHandle, ApplyError> {
        let model = self.resolve_alias(&membership.model)?;
        self.repository
            .handle_retrieve(model, &membership.uid)
            .await?
            .ok_or_else(|| ApplyError::NotFound { model: membership.model.clone(), uid: membership.uid.clone() })
    }

    async fn update_aggregate(&self, mut parent: EntityHandle, property: &str, verb: Verb, member: &EntityHandle) -> Result<(), ApplyError> {
        let Some(accessor) = self.schema.accessor(parent.model_type(), property) else {
            warn!("{}.{} is not an aggregate collection; membership of {:#} left unchanged", parent.model_type(), property, member.uid());
            return Ok(());
        };

        let parent_type = parent.model_type();
        let changed = {
            let collection = accessor
                .collection(&mut parent)
                .ok_or_else(|| ApplyError::SchemaMismatch { model: parent_type, property: property.to_owned() })?;
            match verb {
                Verb::Create => collection.add_member(member)?,
                Verb::Delete => collection.remove_member(member)?,
                Verb::Update | Verb::Unmodified => false,
            }
        };

        if changed {
            self.repository.handle_replace(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<R: PatchRepository, H: ApplyHooks> PatchApplier for PatchResolver<R, H> {
    async fn apply(&self, patches: &PatchSet, commit: bool) -> Result<(), ApplyError> { PatchResolver::apply(self, patches, commit).await }
}

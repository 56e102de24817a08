//! Relation-only variant of [`EntityManager`]

use serde_json::Value;

use super::entity_manager::EntityManager;
use super::result::{Notes, ReconcileResult};
use crate::context::RequestContext;
use crate::error::Result;
use crate::record::Record;
use crate::schema::Schema;
use crate::storage::Storage;

/// Reconciles or removes the relation data of an already stored parent
///
/// The parent row itself is never written. Own fields in the payload are
/// only used to fill relation columns.
pub struct RelativeDataManager<'a, S: Storage + ?Sized> {
    inner: EntityManager<'a, S>,
}

impl<'a, S: Storage + ?Sized> RelativeDataManager<'a, S> {
    pub fn new(
        storage: &'a S,
        schema: &'a Schema,
        entity: &str,
        data: Record,
        id: Option<Value>,
        context: RequestContext,
    ) -> Result<Self> {
        Ok(Self {
            inner: EntityManager::new(storage, schema, entity, data, id, context)?,
        })
    }

    pub fn id(&self) -> Option<&Value> {
        self.inner.id()
    }

    pub fn data(&self) -> &Record {
        self.inner.data()
    }

    pub fn notes(&self) -> &Notes {
        self.inner.notes()
    }

    /// Reconcile the submitted relation rows against the stored ones
    pub async fn save(&mut self) -> Result<ReconcileResult> {
        let id = self.inner.require_id("save relations of")?;
        self.inner.prepare_save()?;

        self.inner.begin().await?;
        let outcome = match self.inner.reconcile_relations(&id).await {
            Ok(Some(failure)) => Ok(failure),
            Ok(None) => Ok(self.inner.relation_pass_result(&id)),
            Err(e) => Err(e),
        };
        self.inner.finish("relation save", outcome).await
    }

    /// Delete the stored rows of every declared relation
    pub async fn delete(&mut self) -> Result<ReconcileResult> {
        let id = self.inner.require_id("delete relations of")?;
        let relations = self.inner.declared_relations()?;

        self.inner.begin().await?;
        let outcome = match self.inner.delete_relations(&relations, &id).await {
            Ok(Some(failure)) => Ok(failure),
            Ok(None) => Ok(self.inner.relation_pass_result(&id)),
            Err(e) => Err(e),
        };
        self.inner.finish("relation delete", outcome).await
    }
}

//! Transactional save/delete of a parent row and its relation data

use serde_json::Value;
use std::collections::HashSet;

use super::diff::{ChildMode, StaleRows, index_rows, match_child};
use super::result::{Notes, ReconcileResult};
use crate::context::RequestContext;
use crate::error::{EntityError, Result};
use crate::record::{Record, field_is_empty, is_empty_value, key_text};
use crate::relation::{ColumnSource, RelatedData, apply_columns, partition};
use crate::schema::{EntityDef, Relation, Schema};
use crate::storage::{ListQuery, Operation, OperationResult, Storage};

/// Saves or deletes one parent row together with its relation data
///
/// Built per operation: it holds the pending payload and the partitioned
/// relation rows until `save()` or `delete()` returns. Every write runs in
/// one storage transaction, so either everything is stored or nothing is.
pub struct EntityManager<'a, S: Storage + ?Sized> {
    storage: &'a S,
    schema: &'a Schema,
    entity: &'a EntityDef,
    data: Record,
    related: RelatedData,
    id: Option<Value>,
    context: RequestContext,
    notes: Notes,
}

impl<'a, S: Storage + ?Sized> EntityManager<'a, S> {
    /// Create a manager for `entity`; an empty `id` means "create"
    pub fn new(
        storage: &'a S,
        schema: &'a Schema,
        entity: &str,
        data: Record,
        id: Option<Value>,
        context: RequestContext,
    ) -> Result<Self> {
        let entity = schema.require(entity)?;
        Ok(Self {
            storage,
            schema,
            entity,
            data,
            related: RelatedData::new(),
            id: id.filter(|id| !is_empty_value(id)),
            context,
            notes: Notes::new(),
        })
    }

    pub fn id(&self) -> Option<&Value> {
        self.id.as_ref()
    }

    /// Own fields of the working payload
    pub fn data(&self) -> &Record {
        &self.data
    }

    /// Notes collected by the last save or delete
    pub fn notes(&self) -> &Notes {
        &self.notes
    }

    pub fn entity(&self) -> &EntityDef {
        self.entity
    }

    /// Create or update the parent row, then reconcile every relation that
    /// was submitted with rows
    pub async fn save(&mut self) -> Result<ReconcileResult> {
        if self.id.is_none() && !field_is_empty(&self.data, &self.entity.primary_key) {
            return Err(EntityError::InvalidArgument(format!(
                "'{}' was passed to a create of '{}'; pass it as the id to update",
                self.entity.primary_key, self.entity.name
            )));
        }
        if self.id.is_none() {
            // Empty key placeholder from the form
            self.data.remove(&self.entity.primary_key);
        }
        self.prepare_save()?;

        self.begin().await?;
        let outcome = self.save_in_transaction().await;
        self.finish("save", outcome).await
    }

    async fn save_in_transaction(&mut self) -> Result<OperationResult> {
        let entity = self.entity;
        let parent = match self.id.clone() {
            None => self.storage.add(entity, &self.data).await,
            Some(id) => self.storage.update(entity, &id, &self.data).await,
        };
        if parent.is_error() {
            log::warn!(
                "Failed to {} {}: {}",
                parent.operation.operation_type(),
                entity.name,
                parent.error_message()
            );
            return Ok(parent);
        }

        let parent_id = match &self.id {
            Some(id) => id.clone(),
            None => {
                let id = parent.data.clone().unwrap_or(Value::Null);
                self.data.insert(entity.primary_key.clone(), id.clone());
                id
            }
        };

        match self.reconcile_relations(&parent_id).await? {
            Some(failure) => Ok(failure),
            None => Ok(parent),
        }
    }

    /// Delete the declared relation data, then the parent row
    ///
    /// Relations the interface does not declare are left untouched.
    pub async fn delete(&mut self) -> Result<ReconcileResult> {
        let id = self.require_id("delete")?;
        let relations = self.declared_relations()?;

        self.notes = Notes::new();
        self.begin().await?;
        let outcome = self.delete_in_transaction(&relations, &id).await;
        self.finish("delete", outcome).await
    }

    async fn delete_in_transaction(
        &mut self,
        relations: &[&'a Relation],
        id: &Value,
    ) -> Result<OperationResult> {
        if let Some(failure) = self.delete_relations(relations, id).await? {
            return Ok(failure);
        }

        let result = self.storage.delete(self.entity, id).await;
        if result.is_error() {
            log::warn!("Failed to delete {} {}: {}", self.entity.name, id, result.error_message());
        }
        Ok(result)
    }

    pub(super) fn require_id(&self, action: &str) -> Result<Value> {
        self.id.clone().ok_or_else(|| {
            EntityError::InvalidArgument(format!(
                "missing required id to {} '{}'",
                action, self.entity.name
            ))
        })
    }

    /// Split relation rows off the payload and check they can be reconciled
    pub(super) fn prepare_save(&mut self) -> Result<()> {
        self.notes = Notes::new();
        self.related = partition(self.entity.relation_names(), &mut self.data)?;

        // An empty list counts as not submitted
        let checked = self
            .related
            .relation_names()
            .filter(|name| self.related.get(name).is_some_and(|rows| !rows.is_empty()))
            .filter_map(|name| self.entity.relation(name))
            .try_for_each(|relation| self.check_relation(relation));
        if checked.is_err() {
            self.restore_payload();
        }
        checked
    }

    /// Relations declared by the request's interface, all reconcilable
    pub(super) fn declared_relations(&self) -> Result<Vec<&'a Relation>> {
        let entity = self.entity;
        let mut declared = Vec::new();
        for relation in &entity.relations {
            if !self.context.declares(&relation.name) {
                log::debug!("Relation {} is not declared, leaving its rows", relation.name);
                continue;
            }
            self.check_relation(relation)?;
            declared.push(relation);
        }
        Ok(declared)
    }

    fn check_relation(&self, relation: &Relation) -> Result<()> {
        if !relation.is_reconcilable() {
            return Err(EntityError::UnsupportedRelation {
                entity: self.entity.name.clone(),
                relation: relation.name.clone(),
            });
        }
        self.schema.target_of(relation)?;
        Ok(())
    }

    /// Reconcile every relation submitted with at least one row
    ///
    /// Returns the failed write, if any.
    pub(super) async fn reconcile_relations(
        &mut self,
        parent_id: &Value,
    ) -> Result<Option<OperationResult>> {
        let entity = self.entity;
        let related = self.related.clone();
        let pending: Vec<(&Relation, &[Record])> = entity
            .relations
            .iter()
            .filter_map(|relation| {
                let rows = related.get(&relation.name)?;
                (!rows.is_empty()).then_some((relation, rows))
            })
            .collect();
        if pending.is_empty() {
            return Ok(None);
        }

        let relations: Vec<&Relation> = pending.iter().map(|(relation, _)| *relation).collect();
        let parent = self.parent_values(&relations, parent_id).await?;

        for (relation, rows) in pending {
            if let Some(failure) = self.reconcile_relation(relation, rows, &parent).await? {
                return Ok(Some(failure));
            }
        }
        Ok(None)
    }

    async fn reconcile_relation(
        &mut self,
        relation: &Relation,
        rows: &[Record],
        parent: &Record,
    ) -> Result<Option<OperationResult>> {
        let schema = self.schema;
        let child = schema.target_of(relation)?;
        let value_field = relation.value_field_or(&self.context.value_field).to_string();

        let stale = self.fetch_stale(relation, child, parent).await?;
        log::debug!(
            "Reconciling {}: {} submitted, {} stored",
            relation.name,
            rows.len(),
            stale.len()
        );

        let mut processed: HashSet<String> = HashSet::new();
        for submitted in rows {
            let mut row = submitted.clone();
            for field in apply_columns(relation.columns(), parent, &mut row) {
                log::warn!(
                    "Relation {}: parent field '{}' has no value, column left empty",
                    relation.name,
                    field
                );
            }

            let matched = match_child(&row, &stale, &child.primary_key, &value_field);
            match matched.mode {
                ChildMode::Create => {
                    row.remove(&child.primary_key);
                    let result = self.storage.add(child, &row).await;
                    if result.is_error() {
                        return Ok(Some(self.fail(relation, result)));
                    }
                    if let Some(key) = result.data.as_ref().and_then(key_text) {
                        processed.insert(key);
                    }
                }
                ChildMode::Update => {
                    let id = row.get(&child.primary_key).cloned().unwrap_or(Value::Null);
                    let result = self.storage.update(child, &id, &row).await;
                    if result.is_error() {
                        return Ok(Some(self.fail(relation, result)));
                    }
                }
                ChildMode::Unchanged | ChildMode::Skip => {}
            }
            if let Some(key) = matched.key {
                processed.insert(key);
            }
        }

        for (key, row) in &stale {
            if processed.contains(key) {
                continue;
            }
            let id = row.get(&child.primary_key).cloned().unwrap_or(Value::Null);
            log::debug!("Row {}: not resubmitted, deleting from {}", key, child.name);
            let result = self.storage.delete(child, &id).await;
            if result.is_error() {
                return Ok(Some(self.fail(relation, result)));
            }
        }

        Ok(None)
    }

    /// Delete every stored row of the given relations
    pub(super) async fn delete_relations(
        &mut self,
        relations: &[&'a Relation],
        id: &Value,
    ) -> Result<Option<OperationResult>> {
        if relations.is_empty() {
            return Ok(None);
        }
        let schema = self.schema;
        let parent = self.parent_values(relations, id).await?;

        for relation in relations {
            let child = schema.target_of(relation)?;
            let stale = self.fetch_stale(relation, child, &parent).await?;
            log::debug!("Deleting {} rows of {}", stale.len(), relation.name);

            for row in stale.values() {
                let child_id = row.get(&child.primary_key).cloned().unwrap_or(Value::Null);
                let result = self.storage.delete(child, &child_id).await;
                if result.is_error() {
                    return Ok(Some(self.fail(relation, result)));
                }
            }
        }
        Ok(None)
    }

    /// Parent values used to fill relation columns
    ///
    /// Fields missing from the working payload are read from the stored row.
    async fn parent_values(&self, relations: &[&Relation], id: &Value) -> Result<Record> {
        let mut parent = self.data.clone();
        parent.insert(self.entity.primary_key.clone(), id.clone());

        let missing = relations
            .iter()
            .flat_map(|relation| relation.columns().values())
            .any(|source| matches!(source, ColumnSource::ParentField(f) if !parent.contains_key(f)));
        if !missing {
            return Ok(parent);
        }

        let query = ListQuery::new().filter(self.entity.primary_key.clone(), id.clone());
        let stored = self.storage.get_list(self.entity, &query).await?;
        if let Some(row) = stored.into_iter().next() {
            for (field, value) in row {
                parent.entry(field).or_insert(value);
            }
        }
        Ok(parent)
    }

    /// Stored child rows scoped to the parent by the relation's columns
    async fn fetch_stale(
        &self,
        relation: &Relation,
        child: &EntityDef,
        parent: &Record,
    ) -> Result<StaleRows> {
        let mut query = ListQuery::new();
        for (column, source) in relation.columns() {
            let value = match source {
                ColumnSource::ParentField(field) => parent.get(field).cloned().unwrap_or(Value::Null),
                ColumnSource::Constant(value) => value.clone(),
            };
            query = query.filter(column.clone(), value);
        }

        let rows = self.storage.get_list(child, &query).await?;
        Ok(index_rows(rows, &child.primary_key))
    }

    fn fail(&mut self, relation: &Relation, result: OperationResult) -> OperationResult {
        let operation_type = result.operation.operation_type();
        log::warn!(
            "Failed to {} {} row: {}",
            operation_type,
            relation.name,
            result.error_message()
        );
        self.notes.add(
            Notes::key(operation_type, &relation.name),
            format!(
                "Could not {} a {} row: {}",
                operation_type,
                relation.name,
                result.error_message()
            ),
        );
        result
    }

    pub(super) async fn begin(&mut self) -> Result<()> {
        if let Err(e) = self.storage.start_transaction().await {
            self.restore_payload();
            return Err(e.into());
        }
        Ok(())
    }

    /// Commit on success, roll back otherwise
    pub(super) async fn finish(
        &mut self,
        action: &str,
        outcome: Result<OperationResult>,
    ) -> Result<ReconcileResult> {
        match outcome {
            Ok(result) if result.is_success() => {
                if let Err(e) = self.storage.commit_transaction().await {
                    log::warn!("Failed to commit {} of {}: {:#}", action, self.entity.name, e);
                    self.restore_payload();
                    return Err(e.into());
                }
                if self.id.is_none() {
                    self.id = result.data.clone().filter(|id| !id.is_null());
                }
                self.related.clear();
                log::info!(
                    "Completed {} of {} {}",
                    action,
                    self.entity.name,
                    self.id.as_ref().map(Value::to_string).unwrap_or_default()
                );
                Ok(ReconcileResult {
                    result,
                    notes: self.notes.clone(),
                })
            }
            Ok(result) => {
                log::warn!("Rolling back {} of {}", action, self.entity.name);
                self.restore_payload();
                self.storage.rollback_transaction().await?;
                Ok(ReconcileResult {
                    result,
                    notes: self.notes.clone(),
                })
            }
            Err(e) => {
                log::warn!("Rolling back {} of {}: {}", action, self.entity.name, e);
                self.restore_payload();
                if let Err(rollback) = self.storage.rollback_transaction().await {
                    log::error!("Rollback failed: {:#}", rollback);
                }
                Err(e)
            }
        }
    }

    /// Undo payload changes of a rolled back save so it can be retried
    fn restore_payload(&mut self) {
        if self.id.is_none() {
            self.data.remove(&self.entity.primary_key);
        }
        self.related.merge_into(&mut self.data);
        self.related.clear();
    }

    /// Result reported for a pass that only touched relation data
    pub(super) fn relation_pass_result(&self, id: &Value) -> OperationResult {
        OperationResult::success(
            Operation::update(&self.entity.name, id.clone(), Record::new()),
            None,
        )
    }
}

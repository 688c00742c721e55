//! Workflow registry: owns the canonical Workflow records
//!
//! The registry is a data structure, not a gatekeeper. It enforces record
//! invariants (unique ids, immutable destination and payload, no deletion)
//! while permission checks live with the caller.

#![deny(unsafe_code)]

use keeper_types::{
    ActorId, Destination, KeeperError, KeeperResult, ResourceUnits, TaskRef, Workflow, WorkflowId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Registry of workflows, keyed by id
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowRegistry {
    workflows: BTreeMap<WorkflowId, Workflow>,
    /// Next system-assigned id
    next_id: WorkflowId,
}

impl WorkflowRegistry {
    /// Create a new empty registry; system-assigned ids start at 1
    pub fn new() -> Self {
        Self {
            workflows: BTreeMap::new(),
            next_id: WorkflowId::new(1),
        }
    }

    /// Register a workflow under the next free system-assigned id.
    pub fn register(
        &mut self,
        owner: ActorId,
        destination: Destination,
        payload: Vec<u8>,
        now: u64,
    ) -> WorkflowId {
        let mut id = self.next_id;
        while self.workflows.contains_key(&id) {
            id = id.next();
        }
        self.next_id = id.next();
        self.insert(Workflow::new(id, owner, destination, payload, now));
        id
    }

    /// Register a workflow under a caller-chosen id.
    ///
    /// Fails with `DuplicateWorkflow` if the id is taken; the existing
    /// record is left untouched.
    pub fn register_with_id(
        &mut self,
        id: WorkflowId,
        owner: ActorId,
        destination: Destination,
        payload: Vec<u8>,
        now: u64,
    ) -> KeeperResult<WorkflowId> {
        self.ensure_vacant(id)?;
        self.insert(Workflow::new(id, owner, destination, payload, now));
        Ok(id)
    }

    /// Fail with `DuplicateWorkflow` if `id` is already registered
    pub fn ensure_vacant(&self, id: WorkflowId) -> KeeperResult<()> {
        if self.workflows.contains_key(&id) {
            return Err(KeeperError::DuplicateWorkflow(id));
        }
        Ok(())
    }

    fn insert(&mut self, workflow: Workflow) {
        tracing::info!(workflow_id = %workflow.id, owner = %workflow.owner, "Workflow registered");
        self.workflows.insert(workflow.id, workflow);
    }

    /// Activate a workflow: set its ceiling, reset its clock, mark it active.
    ///
    /// Reactivating an active workflow is legal and simply resets both.
    pub fn activate(
        &mut self,
        id: WorkflowId,
        max_resource_limit: ResourceUnits,
        now: u64,
    ) -> KeeperResult<&Workflow> {
        let workflow = self.get_mut(id)?;
        workflow.max_resource_limit = max_resource_limit;
        workflow.last_run_at = now;
        workflow.active = true;

        tracing::info!(
            workflow_id = %id,
            max_resource_limit = max_resource_limit.0,
            "Workflow activated"
        );
        Ok(workflow)
    }

    /// Cancel a workflow. Idempotent.
    ///
    /// Returns the task reference that was detached, if any.
    pub fn cancel(&mut self, id: WorkflowId) -> KeeperResult<Option<TaskRef>> {
        let workflow = self.get_mut(id)?;
        workflow.active = false;
        let detached = workflow.task_ref.take();

        tracing::info!(workflow_id = %id, "Workflow cancelled");
        Ok(detached)
    }

    /// Stamp a run: advance the clock and count it
    pub fn record_run(&mut self, id: WorkflowId, now: u64) -> KeeperResult<()> {
        let workflow = self.get_mut(id)?;
        workflow.last_run_at = now;
        workflow.run_count = workflow.run_count.saturating_add(1);
        Ok(())
    }

    /// Attach the external task index reference
    pub fn attach_task(&mut self, id: WorkflowId, task_ref: TaskRef) -> KeeperResult<()> {
        self.get_mut(id)?.task_ref = Some(task_ref);
        Ok(())
    }

    /// Get a workflow by id
    pub fn get(&self, id: WorkflowId) -> KeeperResult<&Workflow> {
        self.workflows
            .get(&id)
            .ok_or(KeeperError::WorkflowNotFound(id))
    }

    fn get_mut(&mut self, id: WorkflowId) -> KeeperResult<&mut Workflow> {
        self.workflows
            .get_mut(&id)
            .ok_or(KeeperError::WorkflowNotFound(id))
    }

    pub fn is_active(&self, id: WorkflowId) -> bool {
        self.workflows.get(&id).is_some_and(|w| w.active)
    }

    pub fn owner_of(&self, id: WorkflowId) -> Option<&ActorId> {
        self.workflows.get(&id).map(|w| &w.owner)
    }

    pub fn contains(&self, id: WorkflowId) -> bool {
        self.workflows.contains_key(&id)
    }

    /// All workflows, in id order
    pub fn list(&self) -> Vec<&Workflow> {
        self.workflows.values().collect()
    }

    pub fn count(&self) -> usize {
        self.workflows.len()
    }
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(registry: &mut WorkflowRegistry) -> WorkflowId {
        registry.register(ActorId::new("alice"), Destination::new("D"), b"P".to_vec(), 0)
    }

    #[test]
    fn test_register_assigns_monotonic_ids() {
        let mut registry = WorkflowRegistry::new();
        let a = register(&mut registry);
        let b = register(&mut registry);

        assert_eq!(a, WorkflowId::new(1));
        assert_eq!(b, WorkflowId::new(2));
        assert_eq!(registry.count(), 2);
        assert!(!registry.is_active(a));
    }

    #[test]
    fn test_register_skips_caller_chosen_ids() {
        let mut registry = WorkflowRegistry::new();
        registry
            .register_with_id(
                WorkflowId::new(1),
                ActorId::new("bob"),
                Destination::new("E"),
                vec![],
                0,
            )
            .unwrap();

        let id = register(&mut registry);
        assert_eq!(id, WorkflowId::new(2));
    }

    #[test]
    fn test_duplicate_id_rejected_without_mutation() {
        let mut registry = WorkflowRegistry::new();
        let id = register(&mut registry);
        registry.activate(id, ResourceUnits::new(100), 10).unwrap();
        let before = registry.get(id).unwrap().clone();

        let result = registry.register_with_id(
            id,
            ActorId::new("mallory"),
            Destination::new("evil"),
            b"x".to_vec(),
            20,
        );

        assert_eq!(result, Err(KeeperError::DuplicateWorkflow(id)));
        assert_eq!(registry.get(id).unwrap(), &before);
    }

    #[test]
    fn test_activate_sets_ceiling_and_clock() {
        let mut registry = WorkflowRegistry::new();
        let id = register(&mut registry);

        registry.activate(id, ResourceUnits::new(100_000), 42).unwrap();
        let wf = registry.get(id).unwrap();
        assert!(wf.active);
        assert_eq!(wf.max_resource_limit, ResourceUnits::new(100_000));
        assert_eq!(wf.last_run_at, 42);

        // Reactivation resets both
        registry.activate(id, ResourceUnits::new(5), 99).unwrap();
        let wf = registry.get(id).unwrap();
        assert_eq!(wf.max_resource_limit, ResourceUnits::new(5));
        assert_eq!(wf.last_run_at, 99);
    }

    #[test]
    fn test_cancel_is_idempotent_and_detaches_task() {
        let mut registry = WorkflowRegistry::new();
        let id = register(&mut registry);
        registry.attach_task(id, TaskRef::new("t-1")).unwrap();
        registry.activate(id, ResourceUnits::new(1), 0).unwrap();

        assert_eq!(registry.cancel(id).unwrap(), Some(TaskRef::new("t-1")));
        assert_eq!(registry.cancel(id).unwrap(), None);
        assert!(!registry.is_active(id));
        // Never deleted
        assert!(registry.contains(id));
    }

    #[test]
    fn test_record_run() {
        let mut registry = WorkflowRegistry::new();
        let id = register(&mut registry);
        registry.record_run(id, 86_400).unwrap();

        let wf = registry.get(id).unwrap();
        assert_eq!(wf.last_run_at, 86_400);
        assert_eq!(wf.run_count, 1);
    }

    #[test]
    fn test_unknown_workflow() {
        let mut registry = WorkflowRegistry::new();
        let missing = WorkflowId::new(9);
        assert_eq!(
            registry.activate(missing, ResourceUnits::new(1), 0).err(),
            Some(KeeperError::WorkflowNotFound(missing))
        );
        assert!(registry.owner_of(missing).is_none());
        assert!(!registry.is_active(missing));
    }
}

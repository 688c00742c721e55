//! Access control: stateless permission checks
//!
//! Checks read the settings and workflow records and either pass or
//! return the specific error; they never mutate anything.

use crate::settings::{KeeperSettings, RunPolicy};
use keeper_types::{ActorId, KeeperError, KeeperResult, Workflow};

pub struct AccessControl;

impl AccessControl {
    /// Only the global owner may proceed; nobody may without one
    pub fn only_owner(
        settings: &KeeperSettings,
        actor: &ActorId,
        action: &'static str,
    ) -> KeeperResult<()> {
        if !settings.has_owner() || settings.owner != *actor {
            tracing::warn!(actor = %actor, action, "Owner check failed");
            return Err(KeeperError::permission_denied(actor, action));
        }
        Ok(())
    }

    /// Only the workflow's registering owner may proceed
    pub fn only_workflow_owner(
        workflow: &Workflow,
        actor: &ActorId,
        action: &'static str,
    ) -> KeeperResult<()> {
        if !workflow.is_owned_by(actor) {
            tracing::warn!(
                actor = %actor,
                workflow_id = %workflow.id,
                action,
                "Workflow owner check failed"
            );
            return Err(KeeperError::permission_denied(actor, action));
        }
        Ok(())
    }

    /// The workflow must be active
    pub fn only_active_workflow(workflow: &Workflow) -> KeeperResult<()> {
        if !workflow.active {
            return Err(KeeperError::WorkflowInactive(workflow.id));
        }
        Ok(())
    }

    /// Whether `actor` may trigger `workflow` under `policy`
    pub fn may_run(policy: RunPolicy, workflow: &Workflow, actor: &ActorId) -> KeeperResult<()> {
        match policy {
            RunPolicy::AnyCaller => Ok(()),
            RunPolicy::OwnerOnly => Self::only_workflow_owner(workflow, actor, "run workflow"),
        }
    }
}

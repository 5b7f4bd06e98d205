use std::sync::Arc;

use tracing::warn;

use super::domain::{ActionKind, ActionLog, NewActionLog, UniversityContext};
use super::store::{HousingStore, StoreError};

/// Append-only record of catalog and reservation actions, scoped per university.
pub struct AuditTrail<S> {
    store: Arc<S>,
}

impl<S> Clone for AuditTrail<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> AuditTrail<S>
where
    S: HousingStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Records an entry after the action has committed; a failed write is logged only.
    pub fn record(&self, entry: NewActionLog) {
        let action = entry.action;
        if let Err(err) = self.store.append_action(entry) {
            warn!(?action, %err, "action log write failed");
        }
    }

    /// Newest first.
    pub fn entries(
        &self,
        ctx: &UniversityContext,
        action: Option<ActionKind>,
    ) -> Result<Vec<ActionLog>, StoreError> {
        let mut entries: Vec<ActionLog> = self
            .store
            .action_logs(ctx.university_id)?
            .into_iter()
            .filter(|entry| action.map_or(true, |kind| entry.action == kind))
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.0.cmp(&a.id.0)));
        Ok(entries)
    }
}

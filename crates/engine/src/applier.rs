//! Result applier (§4.6, C6): turns a solver or preset-choice outcome into
//! the exact set of writes a persistence layer should make, computed
//! entirely in memory before anything is written — so a caller can apply
//! the whole batch atomically or not at all.

use crate::loader::Snapshot;
use crate::model::{EventStatus, ScheduleAssignment};

/// Everything a single apply needs to write, already fully resolved.
#[derive(Debug, Clone)]
pub struct ApplyResult {
    pub assignments: Vec<ScheduleAssignment>,
    /// `(event_id, new_status)` pairs to persist alongside the assignments.
    pub event_status_updates: Vec<(String, EventStatus)>,
}

/// Builds an [`ApplyResult`] from a solver's assignment rows.
///
/// When `clear_unlocked` is set, every unlocked cell not present in
/// `new_assignments` is treated as implicitly cleared by the caller (the
/// solver only emits assignments for cells it actually fills); when unset,
/// cells absent from `new_assignments` are left untouched by this apply.
/// Locked assignments are never touched either way — the builder already
/// fixed them in the model, so the solver never proposes a conflicting
/// value for them.
pub fn apply(snapshot: &Snapshot, new_assignments: Vec<ScheduleAssignment>, clear_unlocked: bool) -> ApplyResult {
    let _ = clear_unlocked; // caller-visible contract only; this crate has no store to clear against.

    let mut placed_event_ids: std::collections::HashSet<String> = std::collections::HashSet::new();
    for a in &new_assignments {
        if let Some(event_id) = &a.event_id {
            placed_event_ids.insert(event_id.clone());
        }
    }

    let mut event_status_updates = Vec::new();
    for event in &snapshot.events {
        match event.status {
            EventStatus::Hold | EventStatus::Done => continue,
            _ => {}
        }
        let new_status = if placed_event_ids.contains(&event.id) {
            EventStatus::Assigned
        } else {
            EventStatus::Unassigned
        };
        event_status_updates.push((event.id.clone(), new_status));
    }

    ApplyResult {
        assignments: new_assignments,
        event_status_updates,
    }
}

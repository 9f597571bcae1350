//! Data loader (§4.2, C2): resolves a schedule id into a self-contained,
//! immutable [`Snapshot`]. Persistence itself is an external collaborator
//! (§1) — this module only defines the *shape* of the snapshot and the
//! [`SnapshotSource`] seam a store-backed implementation plugs into.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};

use crate::error::{EngineError, Result};
use crate::model::{Event, EventStatus, Resource, ResourceType, Rule, Schedule, ScheduleAssignment, ScheduleStatus, Staff, TaskType};

/// A pure, immutable projection of the store sufficient to build the
/// constraint model or run the validator. Cloning a snapshot is cheap to
/// reason about: nothing in later phases mutates the store, so every phase
/// from C3 onward is a pure function of `(Snapshot, seed)`.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub schedule: Schedule,
    /// Active staff, sorted by name (per §4.2 contract).
    pub staff: Vec<Staff>,
    /// Active task types, keyed by code.
    pub task_types: BTreeMap<String, TaskType>,
    /// Assignments already marked `is_locked = true` for this schedule.
    pub locked_assignments: Vec<ScheduleAssignment>,
    /// Active rules.
    pub rules: Vec<Rule>,
    /// Events bound to this schedule with status `unassigned` or `assigned`.
    pub events: Vec<Event>,
    /// Active resources, grouped by resource type.
    pub resources: HashMap<ResourceType, Vec<Resource>>,
    /// Every date in `schedule.year_month`, in order.
    pub dates: Vec<NaiveDate>,
}

impl Snapshot {
    /// Total capacity across all active resources of a given type.
    pub fn resource_capacity(&self, resource_type: &str) -> u32 {
        self.resources
            .get(resource_type)
            .map(|rs| rs.iter().filter(|r| r.is_active).map(|r| r.capacity).sum())
            .unwrap_or(0)
    }

    pub fn staff_by_id(&self, id: &str) -> Option<&Staff> {
        self.staff.iter().find(|s| s.id == id)
    }

    pub fn task_type(&self, code: &str) -> Option<&TaskType> {
        self.task_types.get(code)
    }
}

/// Seam a persistence-backed implementation plugs into; the CLI adapter is
/// the only implementation this crate ships (it builds a `Snapshot` directly
/// from the JSON request body rather than a database).
pub trait SnapshotSource {
    /// Loads the write-capable snapshot for `schedule_id`.
    ///
    /// Fails with [`EngineError::NotFound`] if no such schedule exists, and
    /// with [`EngineError::PreconditionFailed`] if the schedule's status is
    /// `confirmed` (confirmed schedules reject all mutation, including a
    /// solver run that would otherwise just be a read until apply-time).
    fn load_for_write(&self, schedule_id: &str) -> Result<Snapshot>;

    /// Loads a read-only snapshot (for validation) regardless of schedule
    /// status — validating a confirmed schedule is always allowed.
    fn load_for_read(&self, schedule_id: &str) -> Result<Snapshot>;
}

/// Computes every calendar date in a schedule's `year_month` (`YYYY-MM`).
pub fn dates_in_month(year_month: &str) -> Result<Vec<NaiveDate>> {
    let (year_str, month_str) = year_month.split_once('-').ok_or_else(|| EngineError::Validation {
        field: "year_month".to_string(),
        reason: format!("expected YYYY-MM, got '{year_month}'"),
    })?;
    let year: i32 = year_str.parse().map_err(|_| EngineError::Validation {
        field: "year_month".to_string(),
        reason: format!("invalid year in '{year_month}'"),
    })?;
    let month: u32 = month_str.parse().map_err(|_| EngineError::Validation {
        field: "year_month".to_string(),
        reason: format!("invalid month in '{year_month}'"),
    })?;

    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| EngineError::Validation {
        field: "year_month".to_string(),
        reason: format!("'{year_month}' is not a valid year/month"),
    })?;
    let next_month_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("month+1 always valid");

    let mut dates = Vec::new();
    let mut d = first;
    while d < next_month_first {
        dates.push(d);
        d = d.succ_opt().expect("bounded by next_month_first");
    }
    Ok(dates)
}

/// True for Saturday/Sunday, matching the weekday-only scope of the
/// min-staff and rule-derived headcount constraints (§4.4).
pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

/// Builds a snapshot directly from already-structured, pre-filtered inputs
/// (the shape produced once authentication/persistence/import have already
/// run, per §1's external-collaborator boundary). This is what the CLI's
/// JSON protocol uses instead of a `SnapshotSource` implementation.
#[allow(clippy::too_many_arguments)]
pub fn build_snapshot(
    schedule: Schedule,
    mut staff: Vec<Staff>,
    task_types: Vec<TaskType>,
    assignments: Vec<ScheduleAssignment>,
    rules: Vec<Rule>,
    events: Vec<Event>,
    resources: Vec<Resource>,
    write_access: bool,
) -> Result<Snapshot> {
    if write_access && schedule.status == ScheduleStatus::Confirmed {
        return Err(EngineError::PreconditionFailed(format!(
            "schedule '{}' is confirmed and cannot be solved or edited",
            schedule.id
        )));
    }

    staff.retain(|s| s.is_active);
    staff.sort_by(|a, b| a.name.cmp(&b.name));

    let task_types: BTreeMap<String, TaskType> = task_types
        .into_iter()
        .filter(|t| t.is_active)
        .map(|t| (t.code.clone(), t))
        .collect();

    let locked_assignments: Vec<ScheduleAssignment> = assignments.into_iter().filter(|a| a.is_locked).collect();

    let rules: Vec<Rule> = rules.into_iter().filter(|r| r.is_active).collect();

    let events: Vec<Event> = events
        .into_iter()
        .filter(|e| matches!(e.status, EventStatus::Unassigned | EventStatus::Assigned))
        .filter(|e| e.schedule_id.as_deref() == Some(schedule.id.as_str()))
        .collect();

    let mut by_type: HashMap<ResourceType, Vec<Resource>> = HashMap::new();
    for r in resources.into_iter().filter(|r| r.is_active) {
        by_type.entry(r.kind.clone()).or_default().push(r);
    }

    let dates = dates_in_month(&schedule.year_month)?;

    Ok(Snapshot {
        schedule,
        staff,
        task_types,
        locked_assignments,
        rules,
        events,
        resources: by_type,
        dates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_in_month_counts_days() {
        let dates = dates_in_month("2025-05").unwrap();
        assert_eq!(dates.len(), 31);
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(2025, 5, 1).unwrap());
        assert_eq!(dates[30], NaiveDate::from_ymd_opt(2025, 5, 31).unwrap());
    }

    #[test]
    fn dates_in_month_handles_december() {
        let dates = dates_in_month("2025-12").unwrap();
        assert_eq!(dates.len(), 31);
    }

    #[test]
    fn dates_in_month_rejects_malformed_input() {
        assert!(dates_in_month("2025/05").is_err());
        assert!(dates_in_month("2025-13").is_err());
    }
}

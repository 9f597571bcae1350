//! Independent validator (§4.7, C7): re-checks a committed assignment
//! set from scratch, without trusting that it came out of this crate's own
//! solver. A hand-edited or imported schedule goes through the exact same
//! checks a solver-produced one does.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::loader::{is_weekend, Snapshot};
use crate::model::{Block, EventStatus, Hardness, LocationType, Priority, ScheduleAssignment};
use crate::rules;

/// One broken hard or soft constraint, with enough context to guide a fix.
/// `violation_type` (`hard`/`soft`) and `severity` (1..1000) are independent:
/// a rule-derived violation's `violation_type` mirrors the rule's own
/// hardness, while `severity` is either the rule's weight (soft) or a fixed
/// 1000 (hard) — see [`rules::severity_for`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    #[serde(rename = "type")]
    pub violation_type: Hardness,
    pub severity: u32,
    /// Short machine-readable slug identifying which check produced this
    /// violation (e.g. `duplicate_assignment`, `rule_headcount_shortfall`).
    pub category: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_time_block: Option<Block>,
    pub affected_staff: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl Violation {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        violation_type: Hardness,
        severity: u32,
        category: &str,
        description: String,
        affected_date: Option<NaiveDate>,
        affected_time_block: Option<Block>,
        affected_staff: Vec<String>,
        suggestion: Option<String>,
        rule_id: Option<String>,
        event_id: Option<String>,
    ) -> Self {
        Violation {
            violation_type,
            severity,
            category: category.to_string(),
            description,
            affected_date,
            affected_time_block,
            affected_staff,
            suggestion,
            rule_id,
            event_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub violations: Vec<Violation>,
}

/// Runs every check (§4.7) against `assignments` and returns the full,
/// undeduplicated list of violations found. `is_valid` is `true` only when
/// no [`Hardness::Hard`] violation was found — soft violations are
/// advisory and never block a schedule from being confirmed.
pub fn validate(snapshot: &Snapshot, assignments: &[ScheduleAssignment]) -> ValidationReport {
    let mut violations = Vec::new();
    violations.extend(check_duplicate_assignment(assignments));
    violations.extend(check_skill_shortfall(snapshot, assignments));
    violations.extend(check_min_staff_shortfall(snapshot, assignments));
    violations.extend(check_transport(snapshot, assignments));
    violations.extend(check_consecutive_overwork(assignments));
    violations.extend(check_rules(snapshot, assignments));
    violations.extend(check_required_events(snapshot, assignments));
    violations.extend(check_event_assignment_skills(snapshot, assignments));
    violations.extend(check_resource_capacity(snapshot, assignments));

    let is_valid = !violations.iter().any(|v| v.violation_type == Hardness::Hard);
    ValidationReport { is_valid, violations }
}

fn check_duplicate_assignment(assignments: &[ScheduleAssignment]) -> Vec<Violation> {
    let mut seen: HashSet<(String, NaiveDate, Block)> = HashSet::new();
    let mut duplicated: HashSet<(String, NaiveDate, Block)> = HashSet::new();
    for a in assignments {
        let key = (a.staff_id.clone(), a.date, a.block);
        if !seen.insert(key.clone()) {
            duplicated.insert(key);
        }
    }
    duplicated
        .into_iter()
        .map(|(staff_id, date, block)| {
            Violation::new(
                Hardness::Hard,
                1000,
                "duplicate_assignment",
                format!("{staff_id} has more than one assignment on {date} {block:?}"),
                Some(date),
                Some(block),
                vec![staff_id],
                Some("keep exactly one assignment per staff member per block".to_string()),
                None,
                None,
            )
        })
        .collect()
}

fn check_skill_shortfall(snapshot: &Snapshot, assignments: &[ScheduleAssignment]) -> Vec<Violation> {
    let mut out = Vec::new();
    for a in assignments {
        let Some(code) = a.task_code() else { continue };
        let Some(task_type) = snapshot.task_type(code) else { continue };
        let Some(staff) = snapshot.staff_by_id(&a.staff_id) else { continue };
        if !staff.has_skills(&task_type.required_skills) {
            out.push(Violation::new(
                Hardness::Hard,
                900,
                "skill_shortfall",
                format!("{} lacks a required skill for '{}' on {} {:?}", a.staff_id, code, a.date, a.block),
                Some(a.date),
                Some(a.block),
                vec![a.staff_id.clone()],
                Some("assign a staff member who holds every required skill".to_string()),
                None,
                None,
            ));
        }
    }
    out
}

/// Per `(date, block, task_code)` headcount, scoped to the task's own
/// `default_blocks` on weekdays — the same scope the model builder's
/// min-staff soft constraint uses (§4.4 #8).
fn check_min_staff_shortfall(snapshot: &Snapshot, assignments: &[ScheduleAssignment]) -> Vec<Violation> {
    let mut out = Vec::new();
    for (code, task_type) in &snapshot.task_types {
        if task_type.min_staff == 0 {
            continue;
        }
        for date in &snapshot.dates {
            if is_weekend(*date) {
                continue;
            }
            for block in &task_type.default_blocks {
                let count = assignments
                    .iter()
                    .filter(|a| a.date == *date && a.block == *block && a.task_code() == Some(code.as_str()))
                    .count() as u32;
                if count < task_type.min_staff {
                    out.push(Violation::new(
                        Hardness::Soft,
                        700,
                        "min_staff_shortfall",
                        format!("'{code}' on {date} {block:?}: {count} staff assigned, below the minimum of {}", task_type.min_staff),
                        Some(*date),
                        Some(*block),
                        Vec::new(),
                        Some("assign additional staff to this task in this block".to_string()),
                        None,
                        None,
                    ));
                }
            }
        }
    }
    out
}

/// Car shortfall is hard (severity 800); bicycle shortfall is soft (severity
/// 500) — a task requiring both is checked independently for each (§4.7 #4).
fn check_transport(snapshot: &Snapshot, assignments: &[ScheduleAssignment]) -> Vec<Violation> {
    let mut out = Vec::new();
    for a in assignments {
        let Some(code) = a.task_code() else { continue };
        let Some(task_type) = snapshot.task_type(code) else { continue };
        if task_type.location_type != LocationType::Visit {
            continue;
        }
        let Some(staff) = snapshot.staff_by_id(&a.staff_id) else { continue };

        if task_type.required_resources.contains("car") && !staff.can_drive {
            out.push(Violation::new(
                Hardness::Hard,
                800,
                "transport_unavailable_car",
                format!("{} is assigned '{}' on {} {:?} but cannot drive", a.staff_id, code, a.date, a.block),
                Some(a.date),
                Some(a.block),
                vec![a.staff_id.clone()],
                Some("assign a staff member who can drive".to_string()),
                None,
                None,
            ));
        }
        if task_type.required_resources.contains("bicycle") && !staff.can_bicycle {
            out.push(Violation::new(
                Hardness::Soft,
                500,
                "transport_unavailable_bicycle",
                format!("{} is assigned '{}' on {} {:?} but cannot bicycle", a.staff_id, code, a.date, a.block),
                Some(a.date),
                Some(a.block),
                vec![a.staff_id.clone()],
                Some("assign a staff member who can bicycle".to_string()),
                None,
                None,
            ));
        }
    }
    out
}

/// Any staff working >= 6 non-lunch blocks in a single day. Only `off`
/// assignments are excluded from the count — a task, or any other status
/// color such as `visit`/`pre_work`/`post_work`/`custom`, still counts as
/// worked (§4.7 #5), matching the model builder's own overwork formula.
fn check_consecutive_overwork(assignments: &[ScheduleAssignment]) -> Vec<Violation> {
    let mut by_staff_date: HashMap<(String, NaiveDate), u32> = HashMap::new();
    for a in assignments.iter().filter(|a| a.block != Block::Lunch && !a.is_off()) {
        *by_staff_date.entry((a.staff_id.clone(), a.date)).or_default() += 1;
    }

    let mut out = Vec::new();
    for ((staff_id, date), count) in by_staff_date {
        if count >= 6 {
            out.push(Violation::new(
                Hardness::Soft,
                400,
                "consecutive_overwork",
                format!("{staff_id} works {count} non-lunch blocks on {date}"),
                Some(date),
                None,
                vec![staff_id],
                Some("spread this staff member's tasks across more days".to_string()),
                None,
                None,
            ));
        }
    }
    out
}

fn check_rules(snapshot: &Snapshot, assignments: &[ScheduleAssignment]) -> Vec<Violation> {
    snapshot.rules.iter().flat_map(|rule| rules::evaluate(rule, snapshot, assignments)).collect()
}

fn check_required_events(snapshot: &Snapshot, assignments: &[ScheduleAssignment]) -> Vec<Violation> {
    let placed: HashSet<&str> = assignments.iter().filter_map(|a| a.event_id.as_deref()).collect();
    snapshot
        .events
        .iter()
        .filter(|e| e.priority == Priority::Required && e.status != EventStatus::Done && !placed.contains(e.id.as_str()))
        .map(|e| {
            Violation::new(
                Hardness::Hard,
                950,
                "required_event_unassigned",
                format!("required event '{}' has no assignment", e.id),
                e.deadline,
                None,
                Vec::new(),
                Some("place this event before confirming the schedule".to_string()),
                None,
                Some(e.id.clone()),
            )
        })
        .collect()
}

/// Deduplicated per unique `(event, staff)` pair — a multi-block event shares
/// one violation across all its blocks (§4.7 #8).
fn check_event_assignment_skills(snapshot: &Snapshot, assignments: &[ScheduleAssignment]) -> Vec<Violation> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut out = Vec::new();
    for a in assignments {
        let Some(event_id) = &a.event_id else { continue };
        let Some(event) = snapshot.events.iter().find(|e| &e.id == event_id) else { continue };
        let Some(staff) = snapshot.staff_by_id(&a.staff_id) else { continue };
        if staff.has_skills(&event.required_skills) {
            continue;
        }
        if !seen.insert((event_id.clone(), a.staff_id.clone())) {
            continue;
        }
        out.push(Violation::new(
            Hardness::Hard,
            900,
            "event_skill_shortfall",
            format!("{} is assigned to event '{}' but lacks a required skill", a.staff_id, event_id),
            Some(a.date),
            Some(a.block),
            vec![a.staff_id.clone()],
            Some("reassign this event to a staff member who holds every required skill".to_string()),
            None,
            Some(event_id.clone()),
        ));
    }
    out
}

/// Groups *event*-derived bookings by `(resource, date, block)` — a task
/// type's own `required_resources` only ever names `car`/`bicycle`, already
/// covered per-staff by the transport check, and is never pooled against a
/// shared capacity (§4.7 #9, §3 `ResourceBooking`).
fn check_resource_capacity(snapshot: &Snapshot, assignments: &[ScheduleAssignment]) -> Vec<Violation> {
    let mut by_resource_slot: HashMap<(String, NaiveDate, Block), u32> = HashMap::new();
    for a in assignments {
        let Some(event_id) = &a.event_id else { continue };
        let Some(event) = snapshot.events.iter().find(|e| &e.id == event_id) else { continue };
        for resource in &event.required_resources {
            *by_resource_slot.entry((resource.clone(), a.date, a.block)).or_default() += 1;
        }
    }

    let mut out = Vec::new();
    for ((resource, date, block), count) in by_resource_slot {
        let capacity = snapshot.resource_capacity(&resource);
        if count > capacity {
            out.push(Violation::new(
                Hardness::Hard,
                850,
                "resource_capacity_exceeded",
                format!("resource '{resource}' needed {count} times on {date} {block:?} but only {capacity} are available"),
                Some(date),
                Some(block),
                Vec::new(),
                Some("reduce concurrent use of this resource or add more units of it".to_string()),
                None,
                None,
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::build_snapshot;
    use crate::model::*;
    use std::collections::BTreeSet;

    fn schedule() -> Schedule {
        Schedule {
            id: "sch-1".to_string(),
            year_month: "2025-05".to_string(),
            status: ScheduleStatus::Draft,
        }
    }

    fn staff(id: &str, can_drive: bool) -> Staff {
        Staff {
            id: id.to_string(),
            name: id.to_string(),
            employment_type: EmploymentType::FullTime,
            job_category: "nurse".to_string(),
            can_drive,
            can_bicycle: false,
            is_active: true,
            skills: BTreeSet::new(),
        }
    }

    fn assignment(staff_id: &str, date: NaiveDate, block: Block, task: &str) -> ScheduleAssignment {
        ScheduleAssignment {
            schedule_id: "sch-1".to_string(),
            staff_id: staff_id.to_string(),
            date,
            block,
            value: AssignmentValue::Task(task.to_string()),
            is_locked: false,
            source: AssignmentSource::Solver,
            event_id: None,
        }
    }

    #[test]
    fn flags_duplicate_assignment() {
        let snapshot = build_snapshot(schedule(), vec![staff("st-1", true)], Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new(), false).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 5, 7).unwrap();
        let assignments = vec![assignment("st-1", date, Block::Am, "reception"), assignment("st-1", date, Block::Am, "triage")];
        let report = validate(&snapshot, &assignments);
        assert!(!report.is_valid);
        assert!(report.violations.iter().any(|v| v.category == "duplicate_assignment" && v.severity == 1000));
    }

    #[test]
    fn flags_hard_transport_shortfall_for_car() {
        let task = TaskType {
            code: "home_visit".to_string(),
            display_name: "Home visit".to_string(),
            default_blocks: vec![Block::Am],
            required_skills: BTreeSet::new(),
            preferred_skills: BTreeSet::new(),
            required_resources: ["car".to_string()].into_iter().collect(),
            min_staff: 0,
            max_staff: None,
            location_type: LocationType::Visit,
            is_active: true,
        };
        let snapshot = build_snapshot(schedule(), vec![staff("st-1", false)], vec![task], Vec::new(), Vec::new(), Vec::new(), Vec::new(), false).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 5, 7).unwrap();
        let assignments = vec![assignment("st-1", date, Block::Am, "home_visit")];
        let report = validate(&snapshot, &assignments);
        assert!(!report.is_valid);
        let v = report.violations.iter().find(|v| v.category == "transport_unavailable_car").unwrap();
        assert_eq!(v.violation_type, Hardness::Hard);
        assert_eq!(v.severity, 800);
    }

    #[test]
    fn flags_soft_transport_shortfall_for_bicycle() {
        let mut task = TaskType {
            code: "outreach".to_string(),
            display_name: "Outreach".to_string(),
            default_blocks: vec![Block::Am],
            required_skills: BTreeSet::new(),
            preferred_skills: BTreeSet::new(),
            required_resources: ["bicycle".to_string()].into_iter().collect(),
            min_staff: 0,
            max_staff: None,
            location_type: LocationType::Visit,
            is_active: true,
        };
        task.required_resources.insert("bicycle".to_string());
        let mut st = staff("st-1", true);
        st.can_bicycle = false;
        let snapshot = build_snapshot(schedule(), vec![st], vec![task], Vec::new(), Vec::new(), Vec::new(), Vec::new(), false).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 5, 7).unwrap();
        let assignments = vec![assignment("st-1", date, Block::Am, "outreach")];
        let report = validate(&snapshot, &assignments);
        let v = report.violations.iter().find(|v| v.category == "transport_unavailable_bicycle").unwrap();
        assert_eq!(v.violation_type, Hardness::Soft);
        assert_eq!(v.severity, 500);
        assert!(report.is_valid, "a soft-only violation set must still be valid");
    }

    #[test]
    fn flags_a_full_six_block_day_as_overwork() {
        let snapshot = build_snapshot(schedule(), vec![staff("st-1", true)], Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new(), false).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 5, 7).unwrap();
        let assignments = vec![
            assignment("st-1", date, Block::Am, "t"),
            assignment("st-1", date, Block::Pm, "t"),
            assignment("st-1", date, Block::B15, "t"),
            assignment("st-1", date, Block::B16, "t"),
            assignment("st-1", date, Block::B17, "t"),
            assignment("st-1", date, Block::B18Plus, "t"),
        ];
        let report = validate(&snapshot, &assignments);
        assert!(report.violations.iter().any(|v| v.category == "consecutive_overwork" && v.severity == 400));
    }

    #[test]
    fn clean_schedule_has_no_violations() {
        let snapshot = build_snapshot(schedule(), vec![staff("st-1", true)], Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new(), false).unwrap();
        let report = validate(&snapshot, &[]);
        assert!(report.is_valid);
        assert!(report.violations.is_empty());
    }
}

//! Solver driver (§4.4/§4.5, C5): orchestrates the builder and backend for
//! a single preset or for all three presets, and extracts a backend solution
//! back into [`ScheduleAssignment`] rows.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::backend::{BacktrackingBackend, CpBackend, SolveOutcome};
use crate::builder::{self, BuiltModel, CellValueKind, Preset};
use crate::config::Config;
use crate::loader::Snapshot;
use crate::model::{AssignmentSource, AssignmentValue, Block, ScheduleAssignment, BLOCK_ORDER};
use crate::slots::{allowed_slots, span};

/// Closed set of solver outcomes (§4.5). Every value here is an ordinary
/// successful [`crate::error::Result`], never an `Err` — running out of
/// time or finding no staff is a fact about the instance, not a failure of
/// the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolverStatus {
    Optimal,
    Feasible,
    Infeasible,
    ModelInvalid,
    Unknown,
    NoStaff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveStats {
    pub status: SolverStatus,
    pub objective_value: Option<i64>,
    pub wall_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveResult {
    pub stats: SolveStats,
    pub assignments: Vec<ScheduleAssignment>,
}

fn model_is_invalid(snapshot: &Snapshot) -> bool {
    snapshot.dates.is_empty() || snapshot.schedule.year_month.is_empty()
}

/// Solves one preset. Returns `NoStaff` immediately, without building a
/// model, when the snapshot has no active staff — there is nothing a
/// constraint solver can usefully say about an empty roster.
pub fn solve(snapshot: &Snapshot, config: &Config, preset: Preset) -> SolveResult {
    let started = Instant::now();

    if model_is_invalid(snapshot) {
        return SolveResult {
            stats: SolveStats {
                status: SolverStatus::ModelInvalid,
                objective_value: None,
                wall_time_ms: elapsed_ms(started),
            },
            assignments: Vec::new(),
        };
    }

    if snapshot.staff.is_empty() {
        return SolveResult {
            stats: SolveStats {
                status: SolverStatus::NoStaff,
                objective_value: None,
                wall_time_ms: elapsed_ms(started),
            },
            assignments: Vec::new(),
        };
    }

    let weights = preset.scale(config.weights);
    let mut backend = BacktrackingBackend::new();
    let model = builder::build(snapshot, &weights, &mut backend);

    let seed = preset.seed(config.preset_seeds);
    let time_limit = builder::time_limit(config.single_solve_time_seconds);
    let outcome = backend.solve_with_seed(seed, time_limit);

    let (status, values, objective) = match outcome {
        SolveOutcome::Optimal { values, objective } => (SolverStatus::Optimal, Some(values), Some(objective)),
        SolveOutcome::Feasible { values, objective } => (SolverStatus::Feasible, Some(values), Some(objective)),
        SolveOutcome::Infeasible => (SolverStatus::Infeasible, None, None),
        SolveOutcome::Unknown => (SolverStatus::Unknown, None, None),
    };

    let assignments = values.map(|v| extract(snapshot, &model, &v)).unwrap_or_default();

    SolveResult {
        stats: SolveStats {
            status,
            objective_value: objective,
            wall_time_ms: elapsed_ms(started),
        },
        assignments,
    }
}

/// Runs all three presets (§4.4), each against a fresh model instance so
/// that one preset's search cannot influence another's determinism.
pub fn multi_solve(snapshot: &Snapshot, config: &Config) -> Vec<(Preset, SolveResult)> {
    [Preset::A, Preset::B, Preset::C]
        .into_iter()
        .map(|preset| {
            let mut preset_config = config.clone();
            preset_config.single_solve_time_seconds = config.multi_solve_time_seconds_per_preset;
            (preset, solve(snapshot, &preset_config, preset))
        })
        .collect()
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Walks every `(staff, day, block)` cell in the solution and every placed
/// event, emitting one [`ScheduleAssignment`] per cell not already covered
/// by a locked assignment (the model fixes locked cells to their existing
/// value, so re-emitting them would be redundant, not wrong, but the
/// applier expects only the solver's own contribution here).
fn extract(snapshot: &Snapshot, model: &BuiltModel, values: &[i64]) -> Vec<ScheduleAssignment> {
    let locked: std::collections::HashSet<(String, chrono::NaiveDate, Block)> = snapshot
        .locked_assignments
        .iter()
        .map(|a| (a.staff_id.clone(), a.date, a.block))
        .collect();

    // Map every (staff, day, block) covered by a placed event to that
    // event's id and type_code, so an EventBusy cell renders as the event's
    // own task (§4.5: "each carrying event_id and the event's type_code"),
    // falling back to a generic status color only when the event has none.
    let mut event_cover: std::collections::HashMap<(usize, usize, usize), (String, Option<String>)> = std::collections::HashMap::new();
    for (evi, event) in snapshot.events.iter().enumerate() {
        for (di, bstart) in allowed_slots(event, &model.dates) {
            let Some(block_span) = span(bstart, event.duration_hours) else { continue };
            for si in 0..model.staff_ids.len() {
                if let Some(&var) = model.e.get(&(evi, si, di, bstart)) {
                    if values[var.0] == 1 {
                        for &bi in &block_span {
                            event_cover.insert((si, di, bi), (event.id.clone(), event.type_code.clone()));
                        }
                    }
                }
            }
        }
    }

    let mut out = Vec::new();
    for (si, staff_id) in model.staff_ids.iter().enumerate() {
        for (di, date) in model.dates.iter().enumerate() {
            for (bi, block) in BLOCK_ORDER.iter().enumerate() {
                if locked.contains(&(staff_id.clone(), *date, *block)) {
                    continue;
                }
                let Some(idx) = model.cell_value_index(values, staff_id, di, bi) else { continue };
                let Some(kind) = model.cell_kind(idx) else { continue };

                let (value, event_id) = match kind {
                    CellValueKind::EventBusy => {
                        let cover = event_cover.get(&(si, di, bi)).cloned();
                        match cover {
                            Some((id, Some(type_code))) => (AssignmentValue::Task(type_code), Some(id)),
                            Some((id, None)) => (AssignmentValue::StatusColor(crate::model::StatusColor::Visit), Some(id)),
                            None => continue,
                        }
                    }
                    _ => match model.rendered_value(idx) {
                        Some(v) => (v, None),
                        None => continue,
                    },
                };

                out.push(ScheduleAssignment {
                    schedule_id: snapshot.schedule.id.clone(),
                    staff_id: staff_id.clone(),
                    date: *date,
                    block: *block,
                    value,
                    is_locked: false,
                    source: AssignmentSource::Solver,
                    event_id,
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::build_snapshot;
    use crate::model::*;
    use chrono::NaiveDate;
    use std::collections::{BTreeMap, BTreeSet};

    fn minimal_snapshot() -> Snapshot {
        let schedule = Schedule {
            id: "sch-1".to_string(),
            year_month: "2025-05".to_string(),
            status: ScheduleStatus::Draft,
        };
        let staff = vec![Staff {
            id: "st-1".to_string(),
            name: "Ann".to_string(),
            employment_type: EmploymentType::FullTime,
            job_category: "nurse".to_string(),
            can_drive: true,
            can_bicycle: true,
            is_active: true,
            skills: BTreeSet::new(),
        }];
        build_snapshot(schedule, staff, Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new(), true).unwrap()
    }

    #[test]
    fn no_staff_short_circuits() {
        let mut snapshot = minimal_snapshot();
        snapshot.staff.clear();
        let config = Config::default();
        let result = solve(&snapshot, &config, Preset::A);
        assert_eq!(result.stats.status, SolverStatus::NoStaff);
        assert!(result.assignments.is_empty());
    }

    #[test]
    fn empty_model_with_no_rules_solves_to_an_all_off_schedule() {
        let snapshot = minimal_snapshot();
        let config = Config::default();
        let result = solve(&snapshot, &config, Preset::A);
        assert!(matches!(result.stats.status, SolverStatus::Optimal | SolverStatus::Feasible));
        assert!(!result.assignments.is_empty());
    }

    /// §8.1 scenario 4: two events competing for the same single-capacity
    /// resource must not both be placed.
    #[test]
    fn resource_contention_places_at_most_one_event() {
        let schedule = Schedule {
            id: "sch-1".to_string(),
            year_month: "2025-05".to_string(),
            status: ScheduleStatus::Draft,
        };
        let staff = vec![
            Staff {
                id: "st-1".to_string(),
                name: "Ann".to_string(),
                employment_type: EmploymentType::FullTime,
                job_category: "nurse".to_string(),
                can_drive: true,
                can_bicycle: true,
                is_active: true,
                skills: BTreeSet::new(),
            },
            Staff {
                id: "st-2".to_string(),
                name: "Bob".to_string(),
                employment_type: EmploymentType::FullTime,
                job_category: "nurse".to_string(),
                can_drive: true,
                can_bicycle: true,
                is_active: true,
                skills: BTreeSet::new(),
            },
        ];
        let resources = vec![Resource {
            id: "res-car-1".to_string(),
            kind: "car".to_string(),
            name: "Car 1".to_string(),
            capacity: 1,
            is_active: true,
        }];
        let date = NaiveDate::from_ymd_opt(2025, 5, 7).unwrap();
        let make_event = |id: &str| Event {
            id: id.to_string(),
            type_code: Some("visit_home".to_string()),
            location_type: LocationType::Visit,
            duration_hours: 3,
            time_constraint: TimeConstraint::Fixed { date, start: 9 },
            required_skills: BTreeSet::new(),
            required_resources: ["car".to_string()].into_iter().collect(),
            priority: Priority::High,
            status: EventStatus::Unassigned,
            deadline: None,
            notes: None,
            attributes: BTreeMap::new(),
            schedule_id: Some("sch-1".to_string()),
        };
        let events = vec![make_event("ev-1"), make_event("ev-2")];
        let snapshot = build_snapshot(schedule, staff, Vec::new(), Vec::new(), Vec::new(), events, resources, true).unwrap();
        assert_eq!(snapshot.events.len(), 2, "both events must survive the snapshot filter for this test to exercise anything");
        let config = Config::default();
        let result = solve(&snapshot, &config, Preset::A);
        assert!(matches!(result.stats.status, SolverStatus::Optimal | SolverStatus::Feasible));
        let placed: std::collections::HashSet<&str> = result.assignments.iter().filter_map(|a| a.event_id.as_deref()).collect();
        assert!(!placed.is_empty(), "minimizing the unplaced-event penalty should place at least one of the two events");
        assert!(placed.len() <= 1, "only one of the two car-requiring events should be placed, got {placed:?}");
    }

    /// §8.1 scenario 5: a hard `headcount` rule forces a floor on every
    /// weekday/default-block combination of its target task, or the run must
    /// come back `INFEASIBLE`.
    #[test]
    fn hard_headcount_rule_forces_a_staffing_floor() {
        let schedule = Schedule {
            id: "sch-1".to_string(),
            year_month: "2025-05".to_string(),
            status: ScheduleStatus::Draft,
        };
        let staff: Vec<Staff> = (1..=4)
            .map(|n| Staff {
                id: format!("st-{n}"),
                name: format!("Staff{n}"),
                employment_type: EmploymentType::FullTime,
                job_category: "nurse".to_string(),
                can_drive: false,
                can_bicycle: false,
                is_active: true,
                skills: BTreeSet::new(),
            })
            .collect();
        let task_types = vec![TaskType {
            code: "daycare".to_string(),
            display_name: "Daycare".to_string(),
            default_blocks: vec![Block::Am, Block::Pm],
            required_skills: BTreeSet::new(),
            preferred_skills: BTreeSet::new(),
            required_resources: BTreeSet::new(),
            min_staff: 0,
            max_staff: None,
            location_type: LocationType::InClinic,
            is_active: true,
        }];
        let rule = Rule {
            id: "r-1".to_string(),
            label: "daycare floor".to_string(),
            template_type: TemplateType::Headcount,
            hard_or_soft: Hardness::Hard,
            weight: 1000,
            body: serde_json::json!({"taskTypeCode": "daycare", "minStaff": 3}),
            tags: Vec::new(),
            is_active: true,
        };
        let snapshot = build_snapshot(schedule, staff, task_types, Vec::new(), vec![rule], Vec::new(), Vec::new(), true).unwrap();
        let config = Config::default();
        let result = solve(&snapshot, &config, Preset::A);
        assert!(matches!(result.stats.status, SolverStatus::Optimal | SolverStatus::Feasible));
        for date in &snapshot.dates {
            if crate::loader::is_weekend(*date) {
                continue;
            }
            for block in [Block::Am, Block::Pm] {
                let count = result
                    .assignments
                    .iter()
                    .filter(|a| a.date == *date && a.block == block && a.task_code() == Some("daycare"))
                    .count();
                assert!(count >= 3, "{date} {block:?}: only {count} daycare assignments, rule requires >= 3");
            }
        }
    }

    #[test]
    fn multi_solve_runs_all_three_presets() {
        let snapshot = minimal_snapshot();
        let config = Config::default();
        let results = multi_solve(&snapshot, &config);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, Preset::A);
        assert_eq!(results[1].0, Preset::B);
        assert_eq!(results[2].0, Preset::C);
    }
}

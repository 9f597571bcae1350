//! Declarative rule evaluator (§4.7, C8). A [`crate::model::Rule`] carries
//! an opaque `body: serde_json::Value`; this module is the only place that
//! knows how to parse that body per `template_type` and turn it into
//! [`crate::validator::Violation`] records against a committed set of
//! assignments.
//!
//! `skill_req` and `resource_req` rules parse into no type at all and never
//! produce a violation — the skill and resource-capacity concerns they would
//! express are already hard constraints baked directly into the model
//! (§4.4 #2/#3/#9) and the validator (checks 2 and 9), so a rule row of
//! either type is accepted for forward compatibility and otherwise inert.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

use crate::loader::Snapshot;
use crate::model::{Block, Hardness, Rule, ScheduleAssignment, TemplateType, BLOCK_ORDER};
use crate::validator::Violation;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeadcountBody {
    #[serde(default)]
    task_type_code: Option<String>,
    #[serde(default)]
    event_code: Option<String>,
    #[serde(default)]
    min_staff: Option<u32>,
    #[serde(default)]
    max_staff: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvailabilityBody {
    staff_name: String,
    blocked_weekdays: BTreeSet<u8>,
    #[serde(default)]
    blocked_blocks: Option<BTreeSet<Block>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreferenceBody {
    preferred_staff_name: String,
    task_type_code: String,
    #[serde(default)]
    weekday: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecurringBody {
    weekdays: BTreeSet<u8>,
    task_type_code: String,
    min_staff: u32,
    #[serde(default)]
    time_blocks: Option<BTreeSet<Block>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpecificDateBody {
    date: NaiveDate,
    #[serde(default)]
    task_type_code: Option<String>,
    #[serde(default)]
    min_staff: Option<u32>,
    #[serde(default)]
    required_staff_names: Option<Vec<String>>,
    #[serde(default)]
    time_block: Option<Block>,
}

/// `(hard|soft, severity)` for a rule-derived violation: severity is always
/// 1000 for a hard rule, or the rule's own 1..1000 weight for a soft one
/// (§4.7's headcount dispatch rule, applied uniformly across templates).
pub(crate) fn severity_for(rule: &Rule) -> (Hardness, u32) {
    match rule.hard_or_soft {
        Hardness::Hard => (Hardness::Hard, 1000),
        Hardness::Soft => (Hardness::Soft, rule.weight.clamp(1, 1000)),
    }
}

/// Evaluates one active rule against a committed assignment set, returning
/// every violation it finds. A body missing a required key, or otherwise not
/// matching its `template_type`'s shape, produces no violations — §6 pins
/// this failure mode to silent, not a reported error, the same way an
/// unknown `template_type` is ignored silently.
pub fn evaluate(rule: &Rule, snapshot: &Snapshot, assignments: &[ScheduleAssignment]) -> Vec<Violation> {
    match rule.template_type {
        TemplateType::Headcount => serde_json::from_value::<HeadcountBody>(rule.body.clone())
            .map(|body| evaluate_headcount(rule, &body, snapshot, assignments))
            .unwrap_or_default(),
        TemplateType::Availability => serde_json::from_value::<AvailabilityBody>(rule.body.clone())
            .map(|body| evaluate_availability(rule, &body, snapshot, assignments))
            .unwrap_or_default(),
        TemplateType::Preference => serde_json::from_value::<PreferenceBody>(rule.body.clone())
            .map(|body| evaluate_preference(rule, &body, snapshot, assignments))
            .unwrap_or_default(),
        TemplateType::Recurring => serde_json::from_value::<RecurringBody>(rule.body.clone())
            .map(|body| evaluate_recurring(rule, &body, snapshot, assignments))
            .unwrap_or_default(),
        TemplateType::SpecificDate => serde_json::from_value::<SpecificDateBody>(rule.body.clone())
            .map(|body| evaluate_specific_date(rule, &body, snapshot, assignments))
            .unwrap_or_default(),
        TemplateType::SkillReq | TemplateType::ResourceReq => Vec::new(),
    }
}

/// Parses a `headcount` rule's body and, if it targets a known task type
/// with a minimum, returns `(task_type_code, min_staff)` for the model
/// builder's hard rule-derived headcount constraint (§4.4 #10). Rules
/// targeting an `event_code`, lacking a `min_staff`, or failing to parse
/// are not representable as a model constraint and are skipped here — they
/// still get evaluated post-hoc by [`evaluate`] for the validator.
pub(crate) fn parse_headcount_min(rule: &Rule) -> Option<(String, u32)> {
    let body: HeadcountBody = serde_json::from_value(rule.body.clone()).ok()?;
    let code = body.task_type_code?;
    let min = body.min_staff?;
    Some((code, min))
}

fn matches_headcount_target(a: &ScheduleAssignment, body: &HeadcountBody) -> bool {
    if let Some(code) = &body.task_type_code {
        return a.task_code() == Some(code.as_str());
    }
    if let Some(ev) = &body.event_code {
        return a.event_id.as_deref() == Some(ev.as_str());
    }
    false
}

/// Groups matching assignments by `(date, block)` across every date in the
/// month (not just those with at least one match, since an absence is the
/// shortfall that matters most) and compares the count against the rule's
/// bounds.
fn evaluate_headcount(rule: &Rule, body: &HeadcountBody, snapshot: &Snapshot, assignments: &[ScheduleAssignment]) -> Vec<Violation> {
    let (kind, severity) = severity_for(rule);
    let mut out = Vec::new();
    for date in &snapshot.dates {
        for block in BLOCK_ORDER {
            let count = assignments
                .iter()
                .filter(|a| a.date == *date && a.block == block && matches_headcount_target(a, body))
                .count() as u32;

            if let Some(min) = body.min_staff {
                if count < min {
                    out.push(Violation::new(
                        kind,
                        severity,
                        "rule_headcount_shortfall",
                        format!("{date} {block:?}: {count} staff assigned, rule requires at least {min}"),
                        Some(*date),
                        Some(block),
                        Vec::new(),
                        Some("assign more staff to this slot".to_string()),
                        Some(rule.id.clone()),
                        None,
                    ));
                }
            }
            if let Some(max) = body.max_staff {
                if count > max {
                    out.push(Violation::new(
                        kind,
                        severity,
                        "rule_headcount_excess",
                        format!("{date} {block:?}: {count} staff assigned, rule allows at most {max}"),
                        Some(*date),
                        Some(block),
                        Vec::new(),
                        Some("move one or more staff off this slot".to_string()),
                        Some(rule.id.clone()),
                        None,
                    ));
                }
            }
        }
    }
    out
}

/// Matches by staff *name* (not id), per §4.7's availability body contract.
/// Only `off` assignments are excluded — a task or any other status color
/// still counts as the staff member being put to work on a day they marked
/// unavailable.
fn evaluate_availability(rule: &Rule, body: &AvailabilityBody, snapshot: &Snapshot, assignments: &[ScheduleAssignment]) -> Vec<Violation> {
    let (kind, severity) = severity_for(rule);
    assignments
        .iter()
        .filter(|a| !a.is_off())
        .filter(|a| snapshot.staff_by_id(&a.staff_id).map(|s| s.name == body.staff_name).unwrap_or(false))
        .filter(|a| body.blocked_weekdays.contains(&(a.date.weekday().num_days_from_monday() as u8)))
        .filter(|a| body.blocked_blocks.as_ref().map(|set| set.contains(&a.block)).unwrap_or(true))
        .map(|a| {
            Violation::new(
                kind,
                severity,
                "rule_availability_violated",
                format!(
                    "{} is marked unavailable on {} {:?} but is assigned '{}'",
                    a.staff_id,
                    a.date,
                    a.block,
                    a.task_code().unwrap_or("")
                ),
                Some(a.date),
                Some(a.block),
                vec![a.staff_id.clone()],
                Some("reassign this cell to a different staff member".to_string()),
                Some(rule.id.clone()),
                None,
            )
        })
        .collect()
}

/// Groups matching-task assignments by `(date, block)`; if the preferred
/// staff member (matched by name) is not among the assigned set, emits one
/// `soft` violation at the rule's own weight — independent of the rule's
/// own `hard_or_soft` field (§4.7 explicitly pins this one to `soft`).
fn evaluate_preference(rule: &Rule, body: &PreferenceBody, snapshot: &Snapshot, assignments: &[ScheduleAssignment]) -> Vec<Violation> {
    let mut by_slot: BTreeMap<(NaiveDate, Block), Vec<String>> = BTreeMap::new();
    for a in assignments.iter().filter(|a| a.task_code() == Some(body.task_type_code.as_str())) {
        if let Some(wd) = body.weekday {
            if a.date.weekday().num_days_from_monday() as u8 != wd {
                continue;
            }
        }
        by_slot.entry((a.date, a.block)).or_default().push(a.staff_id.clone());
    }

    let mut out = Vec::new();
    for ((date, block), staff_ids) in by_slot {
        let present = staff_ids
            .iter()
            .any(|id| snapshot.staff_by_id(id).map(|s| s.name == body.preferred_staff_name).unwrap_or(false));
        if !present {
            out.push(Violation::new(
                Hardness::Soft,
                rule.weight.clamp(1, 1000),
                "rule_preference_unmet",
                format!(
                    "'{}' on {date} {block:?}: preferred staff '{}' is not assigned",
                    body.task_type_code, body.preferred_staff_name
                ),
                Some(date),
                Some(block),
                staff_ids,
                Some(format!("assign {} to this slot if available", body.preferred_staff_name)),
                Some(rule.id.clone()),
                None,
            ));
        }
    }
    out
}

fn evaluate_recurring(rule: &Rule, body: &RecurringBody, snapshot: &Snapshot, assignments: &[ScheduleAssignment]) -> Vec<Violation> {
    let (kind, severity) = severity_for(rule);
    let mut out = Vec::new();
    for date in &snapshot.dates {
        let wd = date.weekday().num_days_from_monday() as u8;
        if !body.weekdays.contains(&wd) {
            continue;
        }
        for block in BLOCK_ORDER {
            if let Some(allowed) = &body.time_blocks {
                if !allowed.contains(&block) {
                    continue;
                }
            }
            let count = assignments
                .iter()
                .filter(|a| a.date == *date && a.block == block && a.task_code() == Some(body.task_type_code.as_str()))
                .count() as u32;
            if count < body.min_staff {
                out.push(Violation::new(
                    kind,
                    severity,
                    "rule_recurring_shortfall",
                    format!(
                        "'{}' on {date} {block:?} (recurring weekday {wd}): {count} staff assigned, rule requires at least {}",
                        body.task_type_code, body.min_staff
                    ),
                    Some(*date),
                    Some(block),
                    Vec::new(),
                    Some("assign more staff to this recurring task".to_string()),
                    Some(rule.id.clone()),
                    None,
                ));
            }
        }
    }
    out
}

fn evaluate_specific_date(rule: &Rule, body: &SpecificDateBody, snapshot: &Snapshot, assignments: &[ScheduleAssignment]) -> Vec<Violation> {
    let (kind, severity) = severity_for(rule);
    let matched: Vec<&ScheduleAssignment> = assignments
        .iter()
        .filter(|a| a.date == body.date)
        .filter(|a| body.task_type_code.as_deref().map(|c| a.task_code() == Some(c)).unwrap_or(true))
        .filter(|a| body.time_block.map(|b| a.block == b).unwrap_or(true))
        .collect();

    let mut out = Vec::new();
    if let Some(min) = body.min_staff {
        if (matched.len() as u32) < min {
            out.push(Violation::new(
                kind,
                severity,
                "rule_specific_date_shortfall",
                format!("{}: {} staff assigned, rule requires at least {min}", body.date, matched.len()),
                Some(body.date),
                body.time_block,
                Vec::new(),
                Some("assign more staff on this date".to_string()),
                Some(rule.id.clone()),
                None,
            ));
        }
    }

    if let Some(names) = &body.required_staff_names {
        let assigned_names: HashSet<&str> = matched
            .iter()
            .filter_map(|a| snapshot.staff_by_id(&a.staff_id))
            .map(|s| s.name.as_str())
            .collect();
        for name in names {
            if !assigned_names.contains(name.as_str()) {
                out.push(Violation::new(
                    kind,
                    severity,
                    "rule_specific_date_missing",
                    format!("{name} is required on {} by a specific-date rule but is not assigned", body.date),
                    Some(body.date),
                    body.time_block,
                    vec![name.clone()],
                    Some("assign the named staff member to this date".to_string()),
                    Some(rule.id.clone()),
                    None,
                ));
            }
        }
    }
    out
}

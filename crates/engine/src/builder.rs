//! Constraint model builder (§4.4, C4): turns a [`Snapshot`] into a
//! [`BuiltModel`] — a populated [`CpBackend`] plus the bookkeeping needed to
//! read a solution back into [`crate::model::ScheduleAssignment`] values.
//!
//! Modeling choice: the one-hot booleans `y[s,d,b,t]` are the real decision
//! variables; the per-cell integer `x[s,d,b]` is tied to them by a linking
//! constraint (`sum(t_index * y) - x == 0`) rather than being primitive
//! itself, since the backend has no native "reify equality" primitive and
//! this keeps every constraint a plain linear (in)equality or an
//! `only_enforce_if`.

use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDate;

use crate::backend::{CpBackend, LinearExpr, VarId};
use crate::config::WeightConfig;
use crate::loader::{is_weekend, Snapshot};
use crate::model::{AssignmentValue, Block, EmploymentType, Hardness, LocationType, Priority, StatusColor, TemplateType, BLOCK_ORDER, PART_TIME_FORBIDDEN_BLOCKS};
use crate::rules::parse_headcount_min;
use crate::slots::{allowed_slots, span};

/// The three named presets (§4.4): each reruns the same model with a
/// different seed and, for B and C, a scaled soft-weight table, in order to
/// offer the scheduler several distinct reasonable drafts to choose among.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    A,
    B,
    C,
}

impl Preset {
    pub fn seed(self, seeds: [u64; 3]) -> u64 {
        match self {
            Preset::A => seeds[0],
            Preset::B => seeds[1],
            Preset::C => seeds[2],
        }
    }

    /// B triples the weights most directly adjacent to hard constraints
    /// (min-staff shortfall), favoring coverage over variety; C relaxes
    /// workload/low-and-medium event penalties to 0.3x, favoring variety
    /// over strict balance. A is the unscaled baseline (§9 decision).
    pub fn scale(self, base: WeightConfig) -> WeightConfig {
        match self {
            Preset::A => base,
            Preset::B => WeightConfig {
                min_staff_shortfall_per_head: base.min_staff_shortfall_per_head * 3,
                ..base
            },
            Preset::C => WeightConfig {
                overwork_per_excess_block: scale_i64(base.overwork_per_excess_block, 0.3),
                event_penalty_medium: scale_i64(base.event_penalty_medium, 0.3),
                event_penalty_low: scale_i64(base.event_penalty_low, 0.3),
                ..base
            },
        }
    }
}

fn scale_i64(v: i64, factor: f64) -> i64 {
    ((v as f64) * factor).round() as i64
}

/// A value a cell `x[s,d,b]` (and hence each `y[s,d,b,_]` one-hot slice) can
/// take. `EventBusy` is a single shared marker for "occupied by some event",
/// used regardless of which event — event identity lives in the `e`
/// variables, not in the cell value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValueKind {
    Off,
    PreWork,
    PostWork,
    VisitColor,
    Custom,
    EventBusy,
    Task(String),
}

impl CellValueKind {
    fn to_assignment_value(&self) -> Option<AssignmentValue> {
        match self {
            CellValueKind::Off => Some(AssignmentValue::StatusColor(StatusColor::Off)),
            CellValueKind::PreWork => Some(AssignmentValue::StatusColor(StatusColor::PreWork)),
            CellValueKind::PostWork => Some(AssignmentValue::StatusColor(StatusColor::PostWork)),
            CellValueKind::VisitColor => Some(AssignmentValue::StatusColor(StatusColor::Visit)),
            CellValueKind::Custom => Some(AssignmentValue::StatusColor(StatusColor::Custom)),
            CellValueKind::Task(code) => Some(AssignmentValue::Task(code.clone())),
            // EventBusy has no direct assignment-value rendering; the
            // applier derives the cell's visible value from the event that
            // claimed it (§4.6).
            CellValueKind::EventBusy => None,
        }
    }
}

/// The populated model, ready for [`CpBackend::solve_with_seed`].
pub struct BuiltModel {
    pub cell_values: Vec<CellValueKind>,
    pub staff_ids: Vec<String>,
    pub event_ids: Vec<String>,
    pub dates: Vec<NaiveDate>,
    /// `(staff_idx, day_idx, block_idx) -> x var`.
    pub x: HashMap<(usize, usize, usize), VarId>,
    /// `(staff_idx, day_idx, block_idx, cell_value_idx) -> y var`.
    pub y: HashMap<(usize, usize, usize, usize), VarId>,
    /// `(event_idx, staff_idx, day_idx, start_block_idx) -> e var`.
    pub e: HashMap<(usize, usize, usize, usize), VarId>,
}

impl BuiltModel {
    fn staff_idx(&self, id: &str) -> Option<usize> {
        self.staff_ids.iter().position(|s| s == id)
    }

    fn task_value_idx(&self, code: &str) -> Option<usize> {
        self.cell_values.iter().position(|v| matches!(v, CellValueKind::Task(c) if c == code))
    }
}

/// Builds the model for one preset run. Weights are taken from `weights`
/// already scaled by [`Preset::scale`] — the builder itself is
/// preset-agnostic beyond reading whichever table it is handed.
pub fn build(snapshot: &Snapshot, weights: &WeightConfig, backend: &mut dyn CpBackend) -> BuiltModel {
    let staff_ids: Vec<String> = snapshot.staff.iter().map(|s| s.id.clone()).collect();
    let event_ids: Vec<String> = snapshot.events.iter().map(|e| e.id.clone()).collect();
    let dates = snapshot.dates.clone();

    let mut cell_values = vec![
        CellValueKind::Off,
        CellValueKind::PreWork,
        CellValueKind::PostWork,
        CellValueKind::VisitColor,
        CellValueKind::Custom,
        CellValueKind::EventBusy,
    ];
    let mut task_codes: Vec<&String> = snapshot.task_types.keys().collect();
    task_codes.sort();
    for code in task_codes {
        cell_values.push(CellValueKind::Task(code.clone()));
    }

    let mut x = HashMap::new();
    let mut y = HashMap::new();
    let mut objective = LinearExpr::new();

    // --- x, y, exactly-one, linking -----------------------------------
    for (si, staff) in snapshot.staff.iter().enumerate() {
        for (di, _date) in dates.iter().enumerate() {
            for (bi, _block) in BLOCK_ORDER.iter().enumerate() {
                let xvar = backend.new_int_var(0, (cell_values.len() - 1) as i64);
                x.insert((si, di, bi), xvar);

                let mut onehot = LinearExpr::new();
                let mut link = LinearExpr::new().term(xvar, -1);
                for (ti, _) in cell_values.iter().enumerate() {
                    let yvar = backend.new_bool_var();
                    y.insert((si, di, bi, ti), yvar);
                    onehot = onehot.term(yvar, 1);
                    link = link.term(yvar, ti as i64);
                }
                backend.add_linear_eq(onehot, 1);
                backend.add_linear_eq(link, 0);

                // Hard constraint: part-time staff may never take a task, nor
                // be occupied by an event, during the late-afternoon blocks
                // (§4.4 #4, §8 invariant). Forbidding only the `Task` bits
                // would leave an event free to occupy the cell via
                // `EventBusy` — forbid that value too so no event placement
                // can ever cover this (staff, block) for a part-time staff.
                if staff.employment_type == EmploymentType::PartTime && PART_TIME_FORBIDDEN_BLOCKS.contains(&Block::from_index(bi).unwrap()) {
                    for (ti, cv) in cell_values.iter().enumerate() {
                        if matches!(cv, CellValueKind::Task(_) | CellValueKind::EventBusy) {
                            let yvar = y[&(si, di, bi, ti)];
                            backend.add_linear_eq(LinearExpr::new().term(yvar, 1), 0);
                        }
                    }
                }
            }
        }
    }

    // --- locked assignments (hard) -------------------------------------
    for locked in &snapshot.locked_assignments {
        let Some(si) = staff_ids.iter().position(|s| *s == locked.staff_id) else { continue };
        let Some(di) = dates.iter().position(|d| *d == locked.date) else { continue };
        let bi = locked.block.index();
        let value_idx = match &locked.value {
            AssignmentValue::Task(code) => cell_values.iter().position(|v| matches!(v, CellValueKind::Task(c) if c == code)),
            AssignmentValue::StatusColor(StatusColor::Off) => Some(0),
            AssignmentValue::StatusColor(StatusColor::PreWork) => Some(1),
            AssignmentValue::StatusColor(StatusColor::PostWork) => Some(2),
            AssignmentValue::StatusColor(StatusColor::Visit) => Some(3),
            AssignmentValue::StatusColor(StatusColor::Custom) => Some(4),
        };
        if let (Some(value_idx), Some(&xvar)) = (value_idx, x.get(&(si, di, bi))) {
            backend.add_linear_eq(LinearExpr::new().term(xvar, 1), value_idx as i64);
        }
    }

    // --- skill prerequisites (hard, §4.4 #2) ----------------------------
    for (code, task_type) in &snapshot.task_types {
        if task_type.required_skills.is_empty() {
            continue;
        }
        let Some(ti) = cell_values.iter().position(|v| matches!(v, CellValueKind::Task(c) if c == code)) else { continue };
        for (si, staff) in snapshot.staff.iter().enumerate() {
            if staff.has_skills(&task_type.required_skills) {
                continue;
            }
            for di in 0..dates.len() {
                for bi in 0..BLOCK_ORDER.len() {
                    let yvar = y[&(si, di, bi, ti)];
                    backend.add_linear_eq(LinearExpr::new().term(yvar, 1), 0);
                }
            }
        }
    }

    // --- transport hard constraints (§4.4 #3) ---------------------------
    for (code, task_type) in &snapshot.task_types {
        if task_type.location_type != LocationType::Visit {
            continue;
        }
        let Some(ti) = cell_values.iter().position(|v| matches!(v, CellValueKind::Task(c) if c == code)) else { continue };
        let needs_car = task_type.required_resources.contains("car");
        let needs_bicycle = task_type.required_resources.contains("bicycle");
        if !needs_car && !needs_bicycle {
            continue;
        }
        for (si, staff) in snapshot.staff.iter().enumerate() {
            let eligible = (!needs_car || staff.can_drive) && (!needs_bicycle || staff.can_bicycle);
            if eligible {
                continue;
            }
            for di in 0..dates.len() {
                for bi in 0..BLOCK_ORDER.len() {
                    let yvar = y[&(si, di, bi, ti)];
                    backend.add_linear_eq(LinearExpr::new().term(yvar, 1), 0);
                }
            }
        }
    }

    // Resource capacity (hard, §4.4 #9) is scoped to *events*, not task
    // types — a task type's `required_resources` only ever names `car`/
    // `bicycle`, already enforced per-staff above; it is never pooled
    // across a shared capacity. The event-scoped constraint is built below,
    // once the `e` variables exist.

    // --- headcount: min staff (soft, §4.4 objective table) and max staff
    //     (hard, §4.4 #8 is the rule-derived variant below; this is the
    //     task type's own max_staff) ------------------------------------
    // Min-staff shortfall is scoped to the task's own `default_blocks`, not
    // every block in the day — the objective table names `default_blocks`
    // explicitly, distinct from the all-blocks scope of other per-cell
    // constraints. max_staff, having no such scoping in the spec, is
    // enforced over every block the task type's cell value can appear in.
    for (code, task_type) in &snapshot.task_types {
        let Some(ti) = cell_values.iter().position(|v| matches!(v, CellValueKind::Task(c) if c == code)) else { continue };
        for (di, date) in dates.iter().enumerate() {
            if is_weekend(*date) {
                continue;
            }
            if task_type.min_staff > 0 {
                for block in &task_type.default_blocks {
                    let bi = block.index();
                    let mut expr = LinearExpr::new();
                    for si in 0..snapshot.staff.len() {
                        expr = expr.term(y[&(si, di, bi, ti)], 1);
                    }
                    let shortfall = backend.new_int_var(0, task_type.min_staff as i64);
                    let ge_expr = expr.term(shortfall, 1);
                    backend.add_linear_ge(ge_expr, task_type.min_staff as i64);
                    objective = objective.term(shortfall, weights.min_staff_shortfall_per_head);
                }
            }
            if let Some(max_staff) = task_type.max_staff {
                for bi in 0..BLOCK_ORDER.len() {
                    let mut expr = LinearExpr::new();
                    for si in 0..snapshot.staff.len() {
                        expr = expr.term(y[&(si, di, bi, ti)], 1);
                    }
                    backend.add_linear_le(expr, max_staff as i64);
                }
            }
        }
    }

    // --- rule-derived hard headcount (§4.4 #10) -------------------------
    // For each active hard `headcount` rule targeting a known task type,
    // every weekday and every block in that task's `default_blocks` must
    // meet the rule's minimum — this is in addition to (not instead of) the
    // task's own soft min_staff shortfall term above.
    for rule in &snapshot.rules {
        if rule.template_type != TemplateType::Headcount || rule.hard_or_soft != Hardness::Hard {
            continue;
        }
        let Some((code, min_staff)) = parse_headcount_min(rule) else { continue };
        let Some(ti) = cell_values.iter().position(|v| matches!(v, CellValueKind::Task(c) if c == &code)) else { continue };
        let Some(task_type) = snapshot.task_types.get(&code) else { continue };
        for (di, date) in dates.iter().enumerate() {
            if is_weekend(*date) {
                continue;
            }
            for block in &task_type.default_blocks {
                let bi = block.index();
                let mut expr = LinearExpr::new();
                for si in 0..snapshot.staff.len() {
                    expr = expr.term(y[&(si, di, bi, ti)], 1);
                }
                backend.add_linear_ge(expr, min_staff as i64);
            }
        }
    }

    // --- daily overwork (soft, §4.4 objective table) --------------------
    // `max(0, worked_blocks_excl_lunch - 5)` per (staff, day), where a block
    // counts as worked when its cell value is anything other than `off`
    // (task, event, or another status color).
    const DAILY_OVERWORK_THRESHOLD: i64 = 5;
    let off_idx = cell_values
        .iter()
        .position(|v| matches!(v, CellValueKind::Off))
        .expect("Off is always present in cell_values");
    let nonlunch_blocks = BLOCK_ORDER.iter().filter(|b| **b != Block::Lunch).count() as i64;
    for (si, _staff) in snapshot.staff.iter().enumerate() {
        for (di, _) in dates.iter().enumerate() {
            // worked = nonlunch_blocks - sum(y_off); overwork >= worked - 5
            // <=> -sum(y_off) - overwork <= 5 - nonlunch_blocks
            let mut le_expr = LinearExpr::new();
            for (bi, block) in BLOCK_ORDER.iter().enumerate() {
                if *block == Block::Lunch {
                    continue;
                }
                le_expr = le_expr.term(y[&(si, di, bi, off_idx)], -1);
            }
            let overwork = backend.new_int_var(0, nonlunch_blocks);
            le_expr = le_expr.term(overwork, -1);
            backend.add_linear_le(le_expr, DAILY_OVERWORK_THRESHOLD - nonlunch_blocks);
            objective = objective.term(overwork, weights.overwork_per_excess_block);
        }
    }

    // --- events ----------------------------------------------------------
    let mut e = HashMap::new();
    let event_busy_idx = cell_values
        .iter()
        .position(|v| matches!(v, CellValueKind::EventBusy))
        .expect("EventBusy is always present in cell_values");
    for (evi, event) in snapshot.events.iter().enumerate() {
        let candidates = allowed_slots(event, &dates);
        let mut placement_vars: Vec<VarId> = Vec::new();

        for (di, bstart) in candidates {
            let Some(block_span) = span(bstart, event.duration_hours) else { continue };
            for (si, staff) in snapshot.staff.iter().enumerate() {
                if !staff.has_skills(&event.required_skills) {
                    continue;
                }
                let evar = backend.new_bool_var();
                e.insert((evi, si, di, bstart), evar);
                placement_vars.push(evar);

                for &bi in &block_span {
                    let xvar = x[&(si, di, bi)];
                    let forces_busy = backend.add_linear_eq(LinearExpr::new().term(xvar, 1), event_busy_idx as i64);
                    backend.only_enforce_if(forces_busy, evar);
                }
            }
        }

        let mut placement_sum = LinearExpr::new();
        for v in &placement_vars {
            placement_sum = placement_sum.term(*v, 1);
        }

        if event.priority == Priority::Required {
            backend.add_linear_eq(placement_sum, 1);
        } else {
            backend.add_linear_le(placement_sum.clone(), 1);
            let unplaced = backend.new_bool_var();
            let eq_expr = placement_sum.term(unplaced, 1);
            backend.add_linear_eq(eq_expr, 1);
            let weight = match event.priority {
                Priority::High => weights.event_penalty_high,
                Priority::Medium => weights.event_penalty_medium,
                Priority::Low => weights.event_penalty_low,
                Priority::Required => 0,
            };
            objective = objective.term(unplaced, weight);
        }
    }

    // --- no staff double-booked by two overlapping events ----------------
    for (si, _staff) in snapshot.staff.iter().enumerate() {
        for (di, _) in dates.iter().enumerate() {
            for bi in 0..BLOCK_ORDER.len() {
                let mut overlap = LinearExpr::new();
                let mut any = false;
                for (evi, event) in snapshot.events.iter().enumerate() {
                    for (cdi, bstart) in allowed_slots(event, &dates) {
                        if cdi != di {
                            continue;
                        }
                        let Some(block_span) = span(bstart, event.duration_hours) else { continue };
                        if !block_span.contains(&bi) {
                            continue;
                        }
                        if let Some(&evar) = e.get(&(evi, si, di, bstart)) {
                            overlap = overlap.term(evar, 1);
                            any = true;
                        }
                    }
                }
                if any {
                    backend.add_linear_le(overlap, 1);
                }
            }
        }
    }

    // --- resource capacity (hard, §4.4 #9) -------------------------------
    // For each resource type required by any event, and each (day, block)
    // touched by an event span requiring it, the sum of that event's
    // placement variables covering that slot must not exceed the summed
    // capacity of active resources of that type.
    let mut resource_cover: HashMap<(String, usize, usize), Vec<VarId>> = HashMap::new();
    for (evi, event) in snapshot.events.iter().enumerate() {
        if event.required_resources.is_empty() {
            continue;
        }
        for (di, bstart) in allowed_slots(event, &dates) {
            let Some(block_span) = span(bstart, event.duration_hours) else { continue };
            for si in 0..snapshot.staff.len() {
                let Some(&evar) = e.get(&(evi, si, di, bstart)) else { continue };
                for resource in &event.required_resources {
                    for &bi in &block_span {
                        resource_cover.entry((resource.clone(), di, bi)).or_default().push(evar);
                    }
                }
            }
        }
    }
    let mut capacity_cache: HashMap<String, i64> = HashMap::new();
    for ((resource, _di, _bi), vars) in &resource_cover {
        let capacity = *capacity_cache.entry(resource.clone()).or_insert_with(|| snapshot.resource_capacity(resource) as i64);
        let mut expr = LinearExpr::new();
        for &v in vars {
            expr = expr.term(v, 1);
        }
        backend.add_linear_le(expr, capacity);
    }

    backend.minimize(objective);

    BuiltModel {
        cell_values,
        staff_ids,
        event_ids,
        dates,
        x,
        y,
        e,
    }
}

/// Default time budget handed to the backend for a single preset's solve.
pub fn time_limit(seconds: f64) -> Duration {
    Duration::from_secs_f64(seconds.max(0.1))
}

impl BuiltModel {
    /// Index in [`Self::cell_values`] a resolved `x` value points to, for a
    /// given `(staff_id, day_index, block_index)`.
    pub fn cell_value_index(&self, values: &[i64], staff_id: &str, day_index: usize, block_index: usize) -> Option<usize> {
        let si = self.staff_idx(staff_id)?;
        let xvar = self.x.get(&(si, day_index, block_index))?;
        Some(values[xvar.0] as usize)
    }

    pub fn cell_kind(&self, idx: usize) -> Option<&CellValueKind> {
        self.cell_values.get(idx)
    }

    pub fn rendered_value(&self, idx: usize) -> Option<AssignmentValue> {
        self.cell_values.get(idx).and_then(|v| v.to_assignment_value())
    }

    pub fn event_placement(&self, values: &[i64], event_id: &str) -> Option<(String, NaiveDate, usize)> {
        let evi = self.event_ids.iter().position(|e| e == event_id)?;
        for ((ev, si, di, bstart), var) in &self.e {
            if *ev == evi && values[var.0] == 1 {
                return Some((self.staff_ids[*si].clone(), self.dates[*di], *bstart));
            }
        }
        None
    }

    pub fn task_value_index_public(&self, code: &str) -> Option<usize> {
        self.task_value_idx(code)
    }
}

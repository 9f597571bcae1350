//! Constraint-solving backend facade (§4.5, C5). `CpBackend` is the seam a
//! constraint-programming solver plugs into; [`BacktrackingBackend`] is the
//! one implementation this crate ships — a seeded, time-boxed backtracking
//! search with a local-search improvement phase, rather than a binding to an
//! external CP-SAT library (see DESIGN.md for why).

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Handle to a declared decision variable. Opaque outside this module; the
/// builder never inspects the index directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub usize);

/// Handle to a previously added constraint, used by [`CpBackend::only_enforce_if`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintRef(usize);

#[derive(Debug, Clone)]
pub struct LinearExpr {
    pub terms: Vec<(VarId, i64)>,
}

impl LinearExpr {
    pub fn new() -> Self {
        LinearExpr { terms: Vec::new() }
    }

    pub fn term(mut self, var: VarId, coeff: i64) -> Self {
        self.terms.push((var, coeff));
        self
    }

    fn eval(&self, values: &[i64]) -> i64 {
        self.terms.iter().map(|(v, c)| values[v.0] * c).sum()
    }
}

impl Default for LinearExpr {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
enum ConstraintKind {
    Le,
    Ge,
    Eq,
}

#[derive(Debug, Clone)]
struct Constraint {
    expr: LinearExpr,
    bound: i64,
    kind: ConstraintKind,
    enforcement: Option<VarId>,
}

impl Constraint {
    /// `true` if the constraint holds (or is inactive because its
    /// enforcement literal is 0) under `values`.
    fn holds(&self, values: &[i64]) -> bool {
        if let Some(lit) = self.enforcement {
            if values[lit.0] == 0 {
                return true;
            }
        }
        let lhs = self.expr.eval(values);
        match self.kind {
            ConstraintKind::Le => lhs <= self.bound,
            ConstraintKind::Ge => lhs >= self.bound,
            ConstraintKind::Eq => lhs == self.bound,
        }
    }
}

#[derive(Debug, Clone)]
struct VarInfo {
    lb: i64,
    ub: i64,
}

impl VarInfo {
    fn domain(&self) -> Vec<i64> {
        (self.lb..=self.ub).collect()
    }
}

/// Terminal outcome of a [`CpBackend::solve_with_seed`] call.
#[derive(Debug, Clone)]
pub enum SolveOutcome {
    /// A feasible assignment was found and local search converged (no
    /// improving move found in a full sweep) before the deadline.
    Optimal { values: Vec<i64>, objective: i64 },
    /// A feasible assignment was found but the deadline or node budget was
    /// reached before local search could confirm no further improvement.
    Feasible { values: Vec<i64>, objective: i64 },
    /// Exhaustive search (within the node budget) found no assignment
    /// satisfying every hard constraint.
    Infeasible,
    /// The deadline or node budget was reached before feasibility could be
    /// determined either way.
    Unknown,
}

/// Facade a constraint-programming backend implements: declare variables,
/// add linear/boolean constraints, optionally reify a constraint behind an
/// enforcement literal, set an objective, then solve.
pub trait CpBackend {
    fn new_bool_var(&mut self) -> VarId;
    fn new_int_var(&mut self, lb: i64, ub: i64) -> VarId;
    fn add_linear_le(&mut self, expr: LinearExpr, bound: i64) -> ConstraintRef;
    fn add_linear_ge(&mut self, expr: LinearExpr, bound: i64) -> ConstraintRef;
    fn add_linear_eq(&mut self, expr: LinearExpr, bound: i64) -> ConstraintRef;
    fn add_bool_eq(&mut self, a: VarId, b: VarId) -> ConstraintRef;
    /// Restricts a previously added constraint to apply only when `literal`
    /// is 1; when `literal` is 0 the constraint is vacuously satisfied.
    fn only_enforce_if(&mut self, constraint: ConstraintRef, literal: VarId);
    fn minimize(&mut self, expr: LinearExpr);
    fn solve_with_seed(&mut self, seed: u64, time_limit: Duration) -> SolveOutcome;
}

/// Node budget for the feasibility search phase, independent of the wall
/// clock — keeps a pathological model from burning the whole time budget on
/// one degenerate branch while still leaving headroom for local search.
const MAX_SEARCH_NODES: u64 = 2_000_000;

/// Bounded backtracking search with a post-feasibility local-search
/// improvement pass, in place of a licensed CP-SAT binding (§4.5).
pub struct BacktrackingBackend {
    vars: Vec<VarInfo>,
    constraints: Vec<Constraint>,
    objective: Option<LinearExpr>,
}

impl BacktrackingBackend {
    pub fn new() -> Self {
        BacktrackingBackend {
            vars: Vec::new(),
            constraints: Vec::new(),
            objective: None,
        }
    }

    fn push_constraint(&mut self, expr: LinearExpr, bound: i64, kind: ConstraintKind) -> ConstraintRef {
        self.constraints.push(Constraint {
            expr,
            bound,
            kind,
            enforcement: None,
        });
        ConstraintRef(self.constraints.len() - 1)
    }

    /// Constraints whose scope is fully contained in `assigned_up_to`
    /// variables, i.e. checkable with only a prefix of the assignment.
    fn constraints_checkable_with(&self, assigned_up_to: usize) -> Vec<&Constraint> {
        self.constraints
            .iter()
            .filter(|c| {
                let scope_max = c.expr.terms.iter().map(|(v, _)| v.0).chain(c.enforcement.map(|v| v.0)).max();
                matches!(scope_max, Some(m) if m < assigned_up_to)
            })
            .collect()
    }

    fn backtrack(&self, rng: &mut StdRng, deadline: Instant, nodes: &mut u64) -> Option<Vec<i64>> {
        let n = self.vars.len();
        let mut values = vec![0i64; n];
        let mut domains: Vec<Vec<i64>> = self.vars.iter().map(|v| v.domain()).collect();
        for d in domains.iter_mut() {
            d.shuffle(rng);
        }

        fn go(
            idx: usize,
            n: usize,
            values: &mut Vec<i64>,
            domains: &[Vec<i64>],
            backend: &BacktrackingBackend,
            deadline: Instant,
            nodes: &mut u64,
        ) -> Option<bool> {
            if idx == n {
                return Some(true);
            }
            for val in &domains[idx] {
                *nodes += 1;
                if *nodes > MAX_SEARCH_NODES || Instant::now() > deadline {
                    return None;
                }
                values[idx] = *val;
                let ok = backend.constraints_checkable_with(idx + 1).iter().all(|c| c.holds(values));
                if !ok {
                    continue;
                }
                match go(idx + 1, n, values, domains, backend, deadline, nodes) {
                    Some(true) => return Some(true),
                    None => return None,
                    Some(false) => continue,
                }
            }
            Some(false)
        }

        match go(0, n, &mut values, &domains, self, deadline, nodes) {
            Some(true) => Some(values),
            _ => None,
        }
    }

    fn objective_value(&self, values: &[i64]) -> i64 {
        self.objective.as_ref().map(|o| o.eval(values)).unwrap_or(0)
    }

    fn all_hold(&self, values: &[i64]) -> bool {
        self.constraints.iter().all(|c| c.holds(values))
    }

    /// Random-restart hill climbing: repeatedly reassigns one variable to a
    /// different value in its domain, keeping the change only if it stays
    /// feasible and does not worsen the objective.
    fn local_search(&self, mut values: Vec<i64>, rng: &mut StdRng, deadline: Instant) -> (Vec<i64>, bool) {
        if self.vars.is_empty() {
            return (values, true);
        }
        let mut best_obj = self.objective_value(&values);
        let mut idle_sweeps = 0u32;
        const CONVERGENCE_SWEEPS: u32 = 2;

        'outer: while idle_sweeps < CONVERGENCE_SWEEPS {
            let mut improved_this_sweep = false;
            let mut order: Vec<usize> = (0..self.vars.len()).collect();
            order.shuffle(rng);
            for idx in order {
                if Instant::now() > deadline {
                    return (values, false);
                }
                let domain = self.vars[idx].domain();
                if domain.len() <= 1 {
                    continue;
                }
                let original = values[idx];
                for candidate in &domain {
                    if *candidate == original {
                        continue;
                    }
                    values[idx] = *candidate;
                    if self.all_hold(&values) {
                        let candidate_obj = self.objective_value(&values);
                        if candidate_obj < best_obj {
                            best_obj = candidate_obj;
                            improved_this_sweep = true;
                            continue 'outer;
                        }
                    }
                    values[idx] = original;
                }
            }
            idle_sweeps = if improved_this_sweep { 0 } else { idle_sweeps + 1 };
        }
        (values, true)
    }
}

impl Default for BacktrackingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpBackend for BacktrackingBackend {
    fn new_bool_var(&mut self) -> VarId {
        self.vars.push(VarInfo { lb: 0, ub: 1 });
        VarId(self.vars.len() - 1)
    }

    fn new_int_var(&mut self, lb: i64, ub: i64) -> VarId {
        self.vars.push(VarInfo { lb, ub });
        VarId(self.vars.len() - 1)
    }

    fn add_linear_le(&mut self, expr: LinearExpr, bound: i64) -> ConstraintRef {
        self.push_constraint(expr, bound, ConstraintKind::Le)
    }

    fn add_linear_ge(&mut self, expr: LinearExpr, bound: i64) -> ConstraintRef {
        self.push_constraint(expr, bound, ConstraintKind::Ge)
    }

    fn add_linear_eq(&mut self, expr: LinearExpr, bound: i64) -> ConstraintRef {
        self.push_constraint(expr, bound, ConstraintKind::Eq)
    }

    fn add_bool_eq(&mut self, a: VarId, b: VarId) -> ConstraintRef {
        let expr = LinearExpr::new().term(a, 1).term(b, -1);
        self.push_constraint(expr, 0, ConstraintKind::Eq)
    }

    fn only_enforce_if(&mut self, constraint: ConstraintRef, literal: VarId) {
        self.constraints[constraint.0].enforcement = Some(literal);
    }

    fn minimize(&mut self, expr: LinearExpr) {
        self.objective = Some(expr);
    }

    fn solve_with_seed(&mut self, seed: u64, time_limit: Duration) -> SolveOutcome {
        let deadline = Instant::now() + time_limit;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut nodes = 0u64;

        let Some(values) = self.backtrack(&mut rng, deadline, &mut nodes) else {
            return if Instant::now() > deadline || nodes > MAX_SEARCH_NODES {
                SolveOutcome::Unknown
            } else {
                SolveOutcome::Infeasible
            };
        };

        let (values, converged) = self.local_search(values, &mut rng, deadline);
        let objective = self.objective_value(&values);
        if converged {
            SolveOutcome::Optimal { values, objective }
        } else {
            SolveOutcome::Feasible { values, objective }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_over_three_bools_is_satisfiable() {
        let mut backend = BacktrackingBackend::new();
        let a = backend.new_bool_var();
        let b = backend.new_bool_var();
        let c = backend.new_bool_var();
        let expr = LinearExpr::new().term(a, 1).term(b, 1).term(c, 1);
        backend.add_linear_eq(expr, 1);

        match backend.solve_with_seed(1, Duration::from_secs(1)) {
            SolveOutcome::Optimal { values, .. } | SolveOutcome::Feasible { values, .. } => {
                assert_eq!(values.iter().sum::<i64>(), 1);
            }
            other => panic!("expected a feasible solution, got {other:?}"),
        }
    }

    #[test]
    fn contradictory_bool_constraints_are_infeasible() {
        let mut backend = BacktrackingBackend::new();
        let a = backend.new_bool_var();
        backend.add_linear_eq(LinearExpr::new().term(a, 1), 1);
        backend.add_linear_eq(LinearExpr::new().term(a, 1), 0);

        match backend.solve_with_seed(7, Duration::from_secs(1)) {
            SolveOutcome::Infeasible => {}
            other => panic!("expected infeasible, got {other:?}"),
        }
    }

    #[test]
    fn enforcement_literal_disables_constraint_when_zero() {
        let mut backend = BacktrackingBackend::new();
        let lit = backend.new_bool_var();
        let x = backend.new_int_var(0, 5);
        let c = backend.add_linear_ge(LinearExpr::new().term(x, 1), 10);
        backend.only_enforce_if(c, lit);
        backend.add_linear_eq(LinearExpr::new().term(lit, 1), 0);

        match backend.solve_with_seed(3, Duration::from_secs(1)) {
            SolveOutcome::Optimal { .. } | SolveOutcome::Feasible { .. } => {}
            other => panic!("expected feasible once the constraint is disabled, got {other:?}"),
        }
    }

    #[test]
    fn minimizes_objective_via_local_search() {
        let mut backend = BacktrackingBackend::new();
        let x = backend.new_int_var(0, 9);
        let y = backend.new_int_var(0, 9);
        backend.add_linear_ge(LinearExpr::new().term(x, 1).term(y, 1), 5);
        backend.minimize(LinearExpr::new().term(x, 1).term(y, 1));

        match backend.solve_with_seed(42, Duration::from_millis(500)) {
            SolveOutcome::Optimal { objective, .. } => assert_eq!(objective, 5),
            SolveOutcome::Feasible { objective, .. } => assert!(objective >= 5),
            other => panic!("expected a solution, got {other:?}"),
        }
    }
}

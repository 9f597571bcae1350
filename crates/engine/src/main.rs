use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

use clinic_scheduler::builder::Preset;
use clinic_scheduler::loader::{build_snapshot, dates_in_month};
use clinic_scheduler::model::{Event, Resource, Rule, Schedule, ScheduleAssignment, Staff, TaskType};
use clinic_scheduler::{applier, config::Config, solver, validator};

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotPayload {
    schedule: Schedule,
    #[serde(default)]
    staff: Vec<Staff>,
    #[serde(default)]
    task_types: Vec<TaskType>,
    #[serde(default)]
    assignments: Vec<ScheduleAssignment>,
    #[serde(default)]
    rules: Vec<Rule>,
    #[serde(default)]
    events: Vec<Event>,
    #[serde(default)]
    resources: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
enum Request {
    Solve {
        #[serde(flatten)]
        payload: SnapshotPayload,
        #[serde(default)]
        preset: Option<PresetArg>,
    },
    MultiSolve {
        #[serde(flatten)]
        payload: SnapshotPayload,
    },
    ApplyPreset {
        #[serde(flatten)]
        payload: SnapshotPayload,
        #[serde(default)]
        clear_unlocked: bool,
    },
    Validate {
        #[serde(flatten)]
        payload: SnapshotPayload,
    },
    ExpandEvent {
        schedule: Schedule,
        event: Event,
    },
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum PresetArg {
    A,
    B,
    C,
}

impl From<PresetArg> for Preset {
    fn from(p: PresetArg) -> Self {
        match p {
            PresetArg::A => Preset::A,
            PresetArg::B => Preset::B,
            PresetArg::C => Preset::C,
        }
    }
}

#[derive(Debug, Serialize)]
struct OkResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ErrResponse {
    ok: bool,
    error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExpandedSlot {
    date: chrono::NaiveDate,
    block: clinic_scheduler::model::Block,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MultiSolveEntry {
    preset: &'static str,
    result: solver::SolveResult,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_ok<T: Serialize>(data: T) {
    let resp = OkResponse { ok: true, data };
    let json = serde_json::to_string(&resp).unwrap_or_else(|e| format!("{{\"ok\":false,\"error\":\"serialization error: {}\"}}", e));
    println!("{}", json);
    let _ = io::stdout().flush();
}

fn write_err(msg: impl std::fmt::Display) -> ! {
    let resp = ErrResponse { ok: false, error: msg.to_string() };
    let json = serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false,\"error\":\"double serialization error\"}".to_string());
    println!("{}", json);
    let _ = io::stdout().flush();
    std::process::exit(1);
}

fn load(payload: SnapshotPayload, write_access: bool) -> clinic_scheduler::Result<(clinic_scheduler::loader::Snapshot, Vec<ScheduleAssignment>)> {
    let assignments = payload.assignments.clone();
    let snapshot = build_snapshot(
        payload.schedule,
        payload.staff,
        payload.task_types,
        payload.assignments,
        payload.rules,
        payload.events,
        payload.resources,
        write_access,
    )?;
    Ok((snapshot, assignments))
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Resolves the optional `--config <path>` CLI argument to a path this
/// process can actually read, ahead of handing it to [`Config::load`].
///
/// This is the one seam in the binary where `anyhow` earns its place in the
/// dependency stack rather than `EngineError`: a malformed argv or an
/// unreadable config file is a CLI-boundary concern (bad deployment, typo'd
/// flag), not a fact about a scheduling request, so it gets `anyhow`'s
/// `Context` plumbing instead of a new `EngineError` variant.
fn resolve_config_path() -> anyhow::Result<Option<std::path::PathBuf>> {
    use anyhow::Context;

    let mut args = std::env::args().skip(1);
    let Some(flag) = args.next() else { return Ok(None) };
    if flag != "--config" {
        anyhow::bail!("unrecognized argument '{flag}' (expected --config <path>)");
    }
    let path = args.next().context("--config requires a path argument")?;
    let path = std::path::PathBuf::from(path);
    if !path.exists() {
        anyhow::bail!("config file '{}' does not exist", path.display());
    }
    Ok(Some(path))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let config_path = match resolve_config_path() {
        Ok(p) => p,
        Err(e) => write_err(format!("{e:#}")),
    };

    let mut input = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut input) {
        write_err(format!("failed to read stdin: {e}"));
    }

    let request: Request = match serde_json::from_str(&input) {
        Ok(r) => r,
        Err(e) => write_err(format!("invalid JSON input: {e}")),
    };

    let config = match Config::load(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => write_err(e),
    };

    match request {
        Request::Solve { payload, preset } => {
            let (snapshot, _assignments) = match load(payload, true) {
                Ok(v) => v,
                Err(e) => write_err(e),
            };
            let preset: Preset = preset.unwrap_or(PresetArg::A).into();
            tracing::info!(schedule_id = %snapshot.schedule.id, ?preset, "solving");
            let result = solver::solve(&snapshot, &config, preset);
            write_ok(result);
        }
        Request::MultiSolve { payload } => {
            let (snapshot, _assignments) = match load(payload, true) {
                Ok(v) => v,
                Err(e) => write_err(e),
            };
            tracing::info!(schedule_id = %snapshot.schedule.id, "multi-solving");
            let results = solver::multi_solve(&snapshot, &config);
            let entries: Vec<MultiSolveEntry> = results
                .into_iter()
                .map(|(preset, result)| MultiSolveEntry {
                    preset: match preset {
                        Preset::A => "A",
                        Preset::B => "B",
                        Preset::C => "C",
                    },
                    result,
                })
                .collect();
            write_ok(entries);
        }
        Request::ApplyPreset { payload, clear_unlocked } => {
            let (snapshot, chosen_assignments) = match load(payload, true) {
                Ok(v) => v,
                Err(e) => write_err(e),
            };
            let result = applier::apply(&snapshot, chosen_assignments, clear_unlocked);
            write_ok(result);
        }
        Request::Validate { payload } => {
            let (snapshot, assignments) = match load(payload, false) {
                Ok(v) => v,
                Err(e) => write_err(e),
            };
            let report = validator::validate(&snapshot, &assignments);
            write_ok(report);
        }
        Request::ExpandEvent { schedule, event } => {
            let dates = match dates_in_month(&schedule.year_month) {
                Ok(d) => d,
                Err(e) => write_err(e),
            };
            let slots: Vec<ExpandedSlot> = clinic_scheduler::slots::allowed_slots(&event, &dates)
                .into_iter()
                .filter_map(|(di, bi)| {
                    let date = dates.get(di).copied()?;
                    let block = clinic_scheduler::model::Block::from_index(bi)?;
                    Some(ExpandedSlot { date, block })
                })
                .collect();
            write_ok(slots);
        }
    }
}

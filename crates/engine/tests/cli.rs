/// Integration tests for the clinic-scheduler binary.
///
/// These tests spawn the compiled binary via assert_cmd and verify the
/// JSON stdin/stdout protocol for the key scenarios.
///
/// Run with: cargo test --manifest-path crates/engine/Cargo.toml
use assert_cmd::Command;
use predicates::str::contains;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn cmd() -> Command {
    Command::cargo_bin("clinic-scheduler").unwrap()
}

fn staff_json(id: &str, full_time: bool, can_drive: bool, skills: &[&str]) -> String {
    let skills_json = skills.iter().map(|s| format!("\"{s}\"")).collect::<Vec<_>>().join(",");
    format!(
        r#"{{
            "id": "{id}",
            "name": "{id}",
            "employmentType": "{}",
            "jobCategory": "nurse",
            "canDrive": {can_drive},
            "canBicycle": false,
            "isActive": true,
            "skills": [{skills_json}]
        }}"#,
        if full_time { "full_time" } else { "part_time" }
    )
}

// ---------------------------------------------------------------------------
// Test 1: validate reports no violations for a single clean cell
// ---------------------------------------------------------------------------

#[test]
fn validate_clean_schedule_has_no_violations() {
    let input = format!(
        r#"{{
            "command": "validate",
            "schedule": {{"id": "sch-1", "yearMonth": "2025-05", "status": "draft"}},
            "staff": [{}],
            "taskTypes": [],
            "assignments": [],
            "rules": [],
            "events": [],
            "resources": []
        }}"#,
        staff_json("st-1", true, true, &[])
    );

    cmd()
        .write_stdin(input)
        .assert()
        .success()
        .stdout(contains(r#""ok":true"#))
        .stdout(contains(r#""isValid":true"#));
}

// ---------------------------------------------------------------------------
// Test 2: validate flags a skill shortfall
// ---------------------------------------------------------------------------

#[test]
fn validate_flags_skill_shortfall() {
    let input = format!(
        r#"{{
            "command": "validate",
            "schedule": {{"id": "sch-1", "yearMonth": "2025-05", "status": "draft"}},
            "staff": [{}],
            "taskTypes": [{{
                "code": "triage",
                "displayName": "Triage",
                "defaultBlocks": ["am"],
                "requiredSkills": ["rn"],
                "preferredSkills": [],
                "requiredResources": [],
                "minStaff": 0,
                "maxStaff": null,
                "locationType": "in_clinic",
                "isActive": true
            }}],
            "assignments": [{{
                "scheduleId": "sch-1",
                "staffId": "st-1",
                "date": "2025-05-07",
                "block": "am",
                "value": {{"task": "triage"}},
                "isLocked": false,
                "source": "manual"
            }}],
            "rules": [],
            "events": [],
            "resources": []
        }}"#,
        staff_json("st-1", true, true, &[])
    );

    cmd()
        .write_stdin(input)
        .assert()
        .success()
        .stdout(contains(r#""ok":true"#))
        .stdout(contains(r#""isValid":false"#))
        .stdout(contains("skill_shortfall"));
}

// ---------------------------------------------------------------------------
// Test 3: solve returns NO_STAFF when the roster is empty
// ---------------------------------------------------------------------------

#[test]
fn solve_with_no_staff_reports_no_staff_status() {
    let input = r#"{
        "command": "solve",
        "schedule": {"id": "sch-1", "yearMonth": "2025-05", "status": "draft"},
        "staff": [],
        "taskTypes": [],
        "assignments": [],
        "rules": [],
        "events": [],
        "resources": []
    }"#;

    cmd()
        .write_stdin(input)
        .assert()
        .success()
        .stdout(contains(r#""ok":true"#))
        .stdout(contains(r#""status":"NO_STAFF""#));
}

// ---------------------------------------------------------------------------
// Test 4: solve against a confirmed schedule is rejected
// ---------------------------------------------------------------------------

#[test]
fn solve_against_confirmed_schedule_is_rejected() {
    let input = format!(
        r#"{{
            "command": "solve",
            "schedule": {{"id": "sch-1", "yearMonth": "2025-05", "status": "confirmed"}},
            "staff": [{}],
            "taskTypes": [],
            "assignments": [],
            "rules": [],
            "events": [],
            "resources": []
        }}"#,
        staff_json("st-1", true, true, &[])
    );

    cmd().write_stdin(input).assert().failure().stdout(contains(r#""ok":false"#)).stdout(contains("confirmed"));
}

// ---------------------------------------------------------------------------
// Test 5: multiSolve runs all three presets
// ---------------------------------------------------------------------------

#[test]
fn multi_solve_returns_three_presets() {
    let input = format!(
        r#"{{
            "command": "multiSolve",
            "schedule": {{"id": "sch-1", "yearMonth": "2025-05", "status": "draft"}},
            "staff": [{}],
            "taskTypes": [],
            "assignments": [],
            "rules": [],
            "events": [],
            "resources": []
        }}"#,
        staff_json("st-1", true, true, &[])
    );

    cmd()
        .write_stdin(input)
        .assert()
        .success()
        .stdout(contains(r#""preset":"A""#))
        .stdout(contains(r#""preset":"B""#))
        .stdout(contains(r#""preset":"C""#));
}

// ---------------------------------------------------------------------------
// Test 6: expandEvent enumerates a fixed-date candidate
// ---------------------------------------------------------------------------

#[test]
fn expand_event_resolves_a_fixed_slot() {
    let input = r#"{
        "command": "expandEvent",
        "schedule": {"id": "sch-1", "yearMonth": "2025-05", "status": "draft"},
        "event": {
            "id": "ev-1",
            "locationType": "in_clinic",
            "durationHours": 1,
            "timeConstraintType": "fixed",
            "date": "2025-05-07",
            "start": 9,
            "requiredSkills": [],
            "requiredResources": [],
            "priority": "medium",
            "status": "unassigned",
            "attributes": {}
        }
    }"#;

    cmd()
        .write_stdin(input)
        .assert()
        .success()
        .stdout(contains(r#""ok":true"#))
        .stdout(contains(r#""date":"2025-05-07""#))
        .stdout(contains(r#""block":"am""#));
}

// ---------------------------------------------------------------------------
// Test 7: malformed JSON produces a structured error, not a panic
// ---------------------------------------------------------------------------

#[test]
fn malformed_input_reports_structured_error() {
    cmd()
        .write_stdin("not json")
        .assert()
        .failure()
        .stdout(contains(r#""ok":false"#))
        .stdout(contains("invalid JSON input"));
}

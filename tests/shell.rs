mod common;

use common::{table, FakeDatabase, ScriptedBackend};
use serde_json::json;
use sqlpilot_lib::ai::QueryGenerator;
use sqlpilot_lib::commands::AppState;
use sqlpilot_lib::db::DatabaseGateway;
use sqlpilot_lib::guard::SqlGuard;
use sqlpilot_lib::pipeline::{Pipeline, PipelineState};
use sqlpilot_lib::shell::Shell;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;

fn app(db: &FakeDatabase, backend: Arc<ScriptedBackend>) -> AppState {
    let gateway = Arc::new(DatabaseGateway::new("localhost:5432/hr", Arc::new(db.clone())));
    AppState::new(Pipeline::new(
        QueryGenerator::new(backend),
        SqlGuard::new(),
        gateway,
    ))
}

async fn run_script(state: &AppState, script: &str) -> (String, PipelineState) {
    let mut shell = Shell::new(state, Some("HR".into()));
    let mut lines = script.as_bytes().lines();
    let mut out = Vec::new();
    shell.run(&mut lines, &mut out).await.unwrap();
    let final_state = shell.context().state();
    (String::from_utf8(out).unwrap(), final_state)
}

#[tokio::test]
async fn scripted_session_generates_runs_and_analyzes() {
    let db = FakeDatabase::new();
    db.respond(
        "SELECT CITY FROM HR.LOCATIONS",
        table(&["CITY"], vec![vec![json!("Oslo")], vec![json!("Lima")]]),
    );
    let backend = ScriptedBackend::new();
    backend
        .reply("SELECT CITY FROM HR.LOCATIONS;")
        .reply("Two cities on two continents.");
    let state = app(&db, backend.clone());

    let (output, final_state) = run_script(
        &state,
        "\\run\n\\connect hr pw\nwhich cities do we have\n\\run\n\\analyze\n\\quit\n",
    )
    .await;

    assert!(output.contains("Error: No query to execute"));
    assert!(output.contains("Connected to localhost:5432/hr as hr"));
    assert!(output.contains("Generated SQL:\nSELECT CITY FROM HR.LOCATIONS;"));
    assert!(output.contains(" CITY\n------\n Oslo\n Lima\n(2 rows"));
    assert!(output.contains("Insights:\nTwo cities on two continents."));
    assert_eq!(final_state, PipelineState::Analyzing);
    assert!(backend.requests()[0].user.contains("Target schema: HR"));
}

#[tokio::test]
async fn blocked_and_failed_statements_are_reported_not_fatal() {
    let db = FakeDatabase::new();
    let state = app(&db, ScriptedBackend::new());

    let (output, _) = run_script(
        &state,
        "\\connect hr nope\n\\connect hr pw\n\\sql DELETE FROM HR.EMPLOYEES;\n\\run\n\\sql SELECT * FROM HR.NOPE;\n\\run\nlist jobs\n\\history\n",
    )
    .await;

    assert!(output.contains("Connection failed: Authentication failed: 28P01"));
    assert!(output.contains("Error: Query blocked by security rules: only SELECT statements are allowed"));
    assert!(output.contains("Error: Execution error: 42P01"));
    assert!(output.contains("Error: Completion backend error"));
    assert!(output.contains("Error: Query history is disabled."));
    assert!(db.executed().iter().all(|sql| !sql.contains("DELETE")));
}

#[tokio::test]
async fn end_of_input_ends_the_session() {
    let db = FakeDatabase::new();
    let state = app(&db, ScriptedBackend::new());

    let (output, final_state) = run_script(&state, "\\state\n\\help\n").await;
    assert!(output.contains("state Idle | disconnected | schema HR"));
    assert!(output.contains("\\analyze"));
    assert_eq!(final_state, PipelineState::Idle);
}

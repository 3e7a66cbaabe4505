// End-to-end tests for the recall binary.
// Every test points RECALL_CONFIG and --memory-dir at a temp dir so the
// user's real state is never touched.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn recall(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_recall"))
        .env("RECALL_CONFIG", home.join("config.toml"))
        .env_remove("RUST_LOG")
        .arg("--memory-dir")
        .arg(home.join("memories"))
        .args(args)
        .output()
        .expect("failed to run recall")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn cli_help_displays_correctly() {
    let output = Command::new(env!("CARGO_BIN_EXE_recall"))
        .arg("--help")
        .output()
        .expect("failed to run recall --help");

    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("persistent memory"));
    assert!(text.contains("add"));
    assert!(text.contains("supersede"));
    assert!(text.contains("tasks"));
    assert!(text.contains("config"));
}

#[test]
fn memory_lifecycle_through_the_cli() {
    let home = TempDir::new().unwrap();

    let added = recall(
        home.path(),
        &["add", "projects", "Phase", "1", "planning", "--context", "Finance"],
    );
    assert!(added.status.success(), "{}", stderr(&added));
    assert!(stdout(&added).contains("Added to [projects] #1"));
    assert!(home.path().join("memories/projects.md").exists());

    let replaced = recall(
        home.path(),
        &["supersede", "projects", "1", "Phase", "2", "build"],
    );
    assert!(replaced.status.success(), "{}", stderr(&replaced));

    let shown = stdout(&recall(home.path(), &["show", "projects"]));
    assert!(shown.contains("Phase 2 build"));
    assert!(!shown.contains("Phase 1 planning"));

    let history = stdout(&recall(home.path(), &["show", "projects", "--all"]));
    assert!(history.contains("Phase 1 planning"));
    assert!(history.contains("[superseded by"));

    let found = stdout(&recall(home.path(), &["search", "PHASE"]));
    assert!(found.contains("Found 1 match(es)"));

    let archived = recall(home.path(), &["archive", "projects", "#2"]);
    assert!(archived.status.success(), "{}", stderr(&archived));
    let empty = stdout(&recall(home.path(), &["show", "projects"]));
    assert!(empty.contains("No memories in category 'projects'"));
}

#[test]
fn json_output_is_machine_readable() {
    let home = TempDir::new().unwrap();
    recall(home.path(), &["add", "tools", "ripgrep", "for", "search"]);

    let output = recall(home.path(), &["show", "--format", "json"]);
    assert!(output.status.success());
    let entries: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["category"], "tools");
    assert_eq!(entries[0]["body"], "ripgrep for search");
}

#[test]
fn idea_tracker_through_the_cli() {
    let home = TempDir::new().unwrap();

    let added = recall(
        home.path(),
        &["idea", "add", "Genome Pipeline", "rebuild", "the", "caller"],
    );
    assert!(added.status.success(), "{}", stderr(&added));
    assert!(stdout(&added).contains("Idea added: genome-pipeline"));
    assert!(home.path().join("memories/ideas/genome-pipeline.md").exists());

    for args in [
        ["idea", "priority", "genome-pipeline", "1"],
        ["idea", "status", "genome-pipeline", "active"],
        ["idea", "link", "genome-pipeline", "/tmp/genome"],
    ] {
        let output = recall(home.path(), &args);
        assert!(output.status.success(), "{}", stderr(&output));
    }

    let listed = stdout(&recall(home.path(), &["idea", "list"]));
    assert!(listed.contains("P1"));
    assert!(listed.contains("active"));
    assert!(listed.contains("[/tmp/genome]"));

    let shown = stdout(&recall(home.path(), &["idea", "show", "genome-pipeline"]));
    assert!(shown.contains("Priority: HIGH"));
    assert!(shown.contains("> rebuild the caller"));

    let missing = recall(home.path(), &["idea", "show", "nope"]);
    assert_eq!(missing.status.code(), Some(1));
    assert!(stderr(&missing).contains("recall idea list"));

    // Ideas live beside the category logs without becoming a category.
    let categories = stdout(&recall(home.path(), &["categories"]));
    assert!(!categories.contains("ideas"));
}

#[test]
fn unknown_entry_reports_error_with_hint() {
    let home = TempDir::new().unwrap();
    recall(home.path(), &["add", "projects", "only", "one"]);

    let output = recall(home.path(), &["archive", "projects", "7"]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.starts_with("Error:"));
    assert!(err.contains("hint:"));
}

#[test]
fn failing_task_sets_exit_code_and_skips_dependents() {
    let home = TempDir::new().unwrap();
    let tasks = home.path().join("tasks.toml");
    std::fs::write(
        &tasks,
        r#"
[[tasks]]
id = "fetch"
command = "exit 3"
schedule = "on_demand"

[[tasks]]
id = "report"
command = "echo report"
schedule = "on_demand"
depends_on = ["fetch"]
"#,
    )
    .unwrap();
    let tasks = tasks.to_string_lossy().into_owned();
    let state = home.path().join("state").to_string_lossy().into_owned();

    let output = recall(
        home.path(),
        &[
            "tasks",
            "--tasks",
            &tasks,
            "--state-dir",
            &state,
            "trigger",
            "fetch",
            "report",
        ],
    );
    assert_eq!(output.status.code(), Some(1), "{}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("FAILED"));
    assert!(text.contains("SKIPPED"));

    let status = recall(
        home.path(),
        &["tasks", "--tasks", &tasks, "--state-dir", &state, "status"],
    );
    assert!(status.status.success());
    assert!(stdout(&status).contains("FAILED"));
}

#[test]
fn cyclic_tasks_file_is_rejected() {
    let home = TempDir::new().unwrap();
    let tasks = home.path().join("tasks.toml");
    std::fs::write(
        &tasks,
        r#"
[[tasks]]
id = "a"
command = "true"
schedule = "daily"
depends_on = ["b"]

[[tasks]]
id = "b"
command = "true"
schedule = "daily"
depends_on = ["a"]
"#,
    )
    .unwrap();
    let tasks = tasks.to_string_lossy().into_owned();

    let output = recall(home.path(), &["tasks", "--tasks", &tasks, "check"]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("cycle"));
    assert!(err.contains("recall tasks check"));
}

#[test]
fn config_path_honours_env_override() {
    let home = TempDir::new().unwrap();
    let output = recall(home.path(), &["config", "path"]);
    assert!(output.status.success());
    assert_eq!(
        stdout(&output).trim(),
        home.path().join("config.toml").display().to_string()
    );
}

use super::*;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

fn config_message(source: &str) -> String {
    let err = load_config(source, DEFAULT_TIMEOUT).unwrap_err();
    match err.downcast_ref::<AppError>() {
        Some(AppError::Config(message)) => message.clone(),
        other => panic!("expected config error, got {other:?}: {err:#}"),
    }
}

#[test]
fn full_task_definition_parses() {
    let tasks = load_config(
        r#"
[[tasks]]
id = "finance-reconcile"
command = "python finance.py reconcile"
schedule = "weekly"
time = "08:30"
weekdays = ["mon", "Friday"]
timeout_secs = 120
depends_on = ["import"]
notify = true
working_dir = "/srv/finance"
description = "Match bank rows to ledger"

[[tasks]]
id = "import"
command = "python finance.py import"
schedule = "daily"
"#,
        DEFAULT_TIMEOUT,
    )
    .unwrap();

    assert_eq!(tasks.len(), 2);
    // Dependency order, not file order.
    assert_eq!(tasks[0].id, "import");
    let reconcile = &tasks[1];
    assert_eq!(reconcile.schedule, Schedule::Weekly);
    assert_eq!(reconcile.time, NaiveTime::from_hms_opt(8, 30, 0).unwrap());
    assert_eq!(reconcile.weekdays, [Weekday::Mon, Weekday::Fri]);
    assert_eq!(reconcile.timeout, Duration::from_secs(120));
    assert!(reconcile.notify);
    assert_eq!(reconcile.working_dir.as_deref(), Some(Path::new("/srv/finance")));
    assert!(reconcile.runs_on(Weekday::Fri));
    assert!(!reconcile.runs_on(Weekday::Tue));
}

#[test]
fn defaults_apply_to_minimal_task() {
    let tasks = load_config(
        "[[tasks]]\nid = \"dashboard\"\ncommand = \"make dashboard\"\nschedule = \"hourly\"\n",
        DEFAULT_TIMEOUT,
    )
    .unwrap();
    let task = &tasks[0];
    assert_eq!(task.time, NaiveTime::MIN);
    assert!(task.weekdays.is_empty());
    assert!(task.runs_on(Weekday::Sun));
    assert_eq!(task.timeout, DEFAULT_TIMEOUT);
    assert!(!task.notify);
    assert!(task.depends_on.is_empty());
}

#[test]
fn empty_file_has_no_tasks() {
    assert!(load_config("", DEFAULT_TIMEOUT).unwrap().is_empty());
}

#[test]
fn dependency_cycle_is_rejected() {
    let message = config_message(
        r#"
[[tasks]]
id = "A"
command = "true"
schedule = "daily"
depends_on = ["B"]

[[tasks]]
id = "B"
command = "true"
schedule = "daily"
depends_on = ["A"]
"#,
    );
    assert!(message.contains("cycle"), "{message}");
    assert!(message.contains("A, B"), "{message}");
}

#[test]
fn duplicate_and_unknown_ids_are_rejected() {
    let duplicate = config_message(
        "[[tasks]]\nid = \"a\"\ncommand = \"true\"\nschedule = \"daily\"\n\
         [[tasks]]\nid = \"a\"\ncommand = \"false\"\nschedule = \"daily\"\n",
    );
    assert!(duplicate.contains("duplicate task id 'a'"), "{duplicate}");

    let unknown = config_message(
        "[[tasks]]\nid = \"a\"\ncommand = \"true\"\nschedule = \"daily\"\ndepends_on = [\"ghost\"]\n",
    );
    assert!(unknown.contains("unknown task 'ghost'"), "{unknown}");
}

#[test]
fn malformed_fields_are_rejected() {
    let cases = [
        ("id = \"\"\ncommand = \"true\"\nschedule = \"daily\"", "id must not be empty"),
        ("id = \"a\"\ncommand = \" \"\nschedule = \"daily\"", "empty command"),
        ("id = \"a\"\ncommand = \"true\"\nschedule = \"daily\"\ntime = \"25:00\"", "not HH:MM"),
        ("id = \"a\"\ncommand = \"true\"\nschedule = \"daily\"\nweekdays = [\"funday\"]", "unknown weekday"),
        ("id = \"a\"\ncommand = \"true\"\nschedule = \"monthly\"\nday_of_month = 32", "outside 1-31"),
        ("id = \"a\"\ncommand = \"true\"\nschedule = \"daily\"\nday_of_month = 3", "only applies to monthly"),
        ("id = \"a\"\ncommand = \"true\"\nschedule = \"daily\"\ntimeout_secs = 0", "must be > 0"),
        ("id = \"a\"\ncommand = \"true\"\nschedule = \"daily\"\ndepends_on = [\"a\"]", "depends on itself"),
    ];
    for (body, expected) in cases {
        let message = config_message(&format!("[[tasks]]\n{body}\n"));
        assert!(message.contains(expected), "{body:?}: {message}");
    }
}

#[test]
fn unknown_schedule_and_fields_are_config_errors() {
    config_message("[[tasks]]\nid = \"a\"\ncommand = \"true\"\nschedule = \"fortnightly\"\n");
    config_message("[[tasks]]\nid = \"a\"\ncommand = \"true\"\nschedule = \"daily\"\nretries = 3\n");
    config_message("this is not toml");
}

#[test]
fn load_config_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasks.toml");
    std::fs::write(&path, "[[tasks]]\nid = \"a\"\n").unwrap();

    let err = load_config_file(&path, DEFAULT_TIMEOUT).unwrap_err();
    assert!(format!("{err:#}").contains("tasks.toml"));
    assert!(matches!(
        recall_core::error::find_app_error(&err),
        Some(AppError::Config(_))
    ));

    let missing = load_config_file(&dir.path().join("nope.toml"), DEFAULT_TIMEOUT);
    assert!(missing.is_err());
}

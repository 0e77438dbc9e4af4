use std::fs;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use taskflow_core::backup::ExportDocument;
use taskflow_core::datastore::{FileStore, MemoryStore};
use taskflow_core::filter::{CategoryMatch, Match, TaskFilter};
use taskflow_core::store::TaskStore;
use taskflow_core::task::{CategoryDraft, Status, TaskDraft};
use tempfile::tempdir;

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 2, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

#[test]
fn file_store_survives_a_reopen() {
    let temp = tempdir().expect("tempdir");
    let storage = FileStore::open(temp.path()).expect("open file store");
    let mut store = TaskStore::open(storage, at(9)).expect("open task store");

    let errands = store
        .add_category(CategoryDraft::new("Errands", "#0EA5E9"), at(9))
        .expect("add category");
    let task = store
        .add_task(
            TaskDraft {
                description: "quarterly numbers".to_string(),
                due_date: NaiveDate::from_ymd_opt(2026, 5, 9),
                category: Some(errands.id.clone()),
                ..TaskDraft::titled("Write report")
            },
            at(10),
        )
        .expect("add task");
    store.toggle_status(&task.id, at(11)).expect("toggle");

    let (tasks, categories) = (store.tasks().to_vec(), store.categories().to_vec());
    drop(store);

    let storage = FileStore::open(temp.path()).expect("reopen file store");
    let reopened = TaskStore::open(storage, at(12)).expect("reopen task store");
    assert_eq!(reopened.tasks(), tasks.as_slice());
    assert_eq!(reopened.categories(), categories.as_slice());
    assert_eq!(reopened.tasks()[0].status, Status::InProgress);
    assert_eq!(reopened.categories()[3].color, "#0ea5e9");
}

#[test]
fn corrupt_files_load_empty_and_reseed_categories() {
    let temp = tempdir().expect("tempdir");
    fs::write(temp.path().join("tasks.json"), "{not json").expect("write tasks");
    fs::write(temp.path().join("categories.json"), "[{\"id\": 7}]").expect("write categories");

    let storage = FileStore::open(temp.path()).expect("open file store");
    let store = TaskStore::open(storage, at(9)).expect("open task store");

    assert!(store.tasks().is_empty());
    let names: Vec<&str> = store.categories().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Work", "Personal", "Shopping"]);

    let persisted = fs::read_to_string(temp.path().join("categories.json")).expect("read back");
    assert!(persisted.contains("\"Shopping\""));
}

#[test]
fn legacy_browser_data_loads_verbatim() {
    let temp = tempdir().expect("tempdir");
    fs::write(
        temp.path().join("tasks.json"),
        r#"[{"id":"1700000000000","title":"Buy milk","description":"","dueDate":"",
            "priority":"low","status":"completed","category":"3",
            "createdAt":"2023-11-14T22:13:20.000Z","updatedAt":"2023-11-14T22:13:20.000Z"}]"#,
    )
    .expect("write tasks");

    let storage = FileStore::open(temp.path()).expect("open file store");
    let store = TaskStore::open(storage, at(9)).expect("open task store");

    let task = store.task("1700000000000").expect("legacy id kept");
    assert_eq!(task.due_date, None);
    assert_eq!(store.task_category(task).map(|c| c.name.as_str()), Some("Shopping"));
    assert_eq!(
        store.resolve_task_id("17000").expect("prefix resolves"),
        "1700000000000"
    );
}

#[test]
fn null_description_does_not_discard_the_collection() {
    let temp = tempdir().expect("tempdir");
    fs::write(
        temp.path().join("tasks.json"),
        r#"[{"id":"a1","title":"Kept","description":"fine","dueDate":"","priority":"low",
            "status":"todo","category":"","createdAt":"2026-05-01T08:00:00.000Z",
            "updatedAt":"2026-05-01T08:00:00.000Z"},
           {"id":"a2","title":"Also kept","description":null,"dueDate":null,"priority":"high",
            "status":"completed","category":null,"createdAt":"2026-05-01T09:00:00.000Z",
            "updatedAt":"2026-05-01T09:00:00.000Z"}]"#,
    )
    .expect("write tasks");

    let storage = FileStore::open(temp.path()).expect("open file store");
    let mut store = TaskStore::open(storage, at(9)).expect("open task store");
    assert_eq!(store.tasks().len(), 2);
    assert_eq!(store.task("a2").expect("second task").description, "");

    store.add_task(TaskDraft::titled("New"), at(10)).expect("add");
    let persisted = fs::read_to_string(temp.path().join("tasks.json")).expect("read back");
    assert!(persisted.contains("\"Also kept\""));
}

#[test]
fn work_report_scenario() {
    let mut store = TaskStore::open(MemoryStore::new(), at(9)).expect("open");
    let work = store
        .add_category(CategoryDraft::new("Work", "#6366f1"), at(9))
        .expect("add category");
    let report = store
        .add_task(
            TaskDraft {
                priority: taskflow_core::task::Priority::High,
                category: Some(work.id.clone()),
                ..TaskDraft::titled("Write report")
            },
            at(10),
        )
        .expect("add task");
    store
        .add_task(TaskDraft::titled("Walk dog"), at(11))
        .expect("add task");

    let todo = TaskFilter {
        status: Match::Only(Status::Todo),
        category: CategoryMatch::Id(work.id.clone()),
        ..TaskFilter::default()
    };
    let ids: Vec<&str> = store.query(&todo).iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec![report.id.as_str()]);

    let detached = store.delete_category(&work.id).expect("delete category");
    assert_eq!(detached, Some(1));
    assert!(store.query(&todo).is_empty());
    assert_eq!(store.tasks().len(), 2);

    let orphans = TaskFilter {
        category: CategoryMatch::Uncategorized,
        ..TaskFilter::default()
    };
    assert_eq!(store.query(&orphans).len(), 2);
}

#[test]
fn dashboard_and_recent_follow_creation_order() {
    let mut store = TaskStore::open(MemoryStore::new(), at(9)).expect("open");
    let today = NaiveDate::from_ymd_opt(2026, 5, 2).expect("valid date");
    assert_eq!(store.dashboard_stats(today).progress_percent, 0);

    let first = store
        .add_task(
            TaskDraft {
                due_date: today.pred_opt(),
                ..TaskDraft::titled("Overdue")
            },
            at(9),
        )
        .expect("add");
    let second = store
        .add_task(TaskDraft::titled("Done"), at(9) + Duration::minutes(5))
        .expect("add");
    store.toggle_status(&second.id, at(10)).expect("toggle");
    store.toggle_status(&second.id, at(10)).expect("toggle");

    let recent: Vec<&str> = store.recent_tasks(5).iter().map(|t| t.id.as_str()).collect();
    assert_eq!(recent, vec![second.id.as_str(), first.id.as_str()]);

    let stats = store.dashboard_stats(today);
    assert_eq!(stats.total, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.overdue, 1);
    assert_eq!(stats.progress_percent, 50);
}

#[test]
fn export_restores_into_a_fresh_directory() {
    let source_dir = tempdir().expect("tempdir");
    let mut source =
        TaskStore::open(FileStore::open(source_dir.path()).expect("open"), at(9)).expect("open");
    source
        .add_task(TaskDraft::titled("Pack boxes"), at(10))
        .expect("add");

    let document = source.export(at(12));
    let backup_dir = tempdir().expect("tempdir");
    let path = document.write_into(backup_dir.path()).expect("write backup");
    assert!(path.ends_with("taskflow-backup-2026-05-02.json"));

    let target_dir = tempdir().expect("tempdir");
    let mut target =
        TaskStore::open(FileStore::open(target_dir.path()).expect("open"), at(9)).expect("open");
    target
        .add_task(TaskDraft::titled("Will be replaced"), at(9))
        .expect("add");
    target
        .restore(ExportDocument::read_from(&path).expect("read backup"), at(13))
        .expect("restore");

    assert_eq!(target.tasks(), source.tasks());
    assert_eq!(target.categories(), source.categories());

    target.clear_all(at(14)).expect("clear");
    assert!(target.tasks().is_empty());
    assert_eq!(target.categories().len(), 3);
    assert!(!target_dir.path().join("tasks.json").exists());
}

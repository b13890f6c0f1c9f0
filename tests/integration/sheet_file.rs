//! Full cycles against a workbook on disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use oddsheet::engine::progress::CancelFlag;
use oddsheet::engine::scheduler::Scheduler;
use oddsheet::engine::task::FetchTask;
use oddsheet::engine::GroupSpec;
use oddsheet::storage::sheet_file::SheetFileStore;
use oddsheet::storage::{SheetLayout, Store};
use oddsheet::types::TaskState;

use crate::mock_source::{lines, MockSource};

struct TempWorkbook(PathBuf);

impl TempWorkbook {
    fn new() -> Self {
        let mut path = std::env::temp_dir();
        path.push(format!("oddsheet-it-{}.json", uuid::Uuid::new_v4()));
        Self(path)
    }
}

impl Drop for TempWorkbook {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn cells(path: &PathBuf, sheet: &str) -> Vec<Vec<String>> {
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    serde_json::from_value(json["sheets"][sheet].clone()).unwrap()
}

#[tokio::test]
async fn test_operator_layout_is_respected() {
    let file = TempWorkbook::new();
    // Operator has arranged columns by hand and left a note outside the block
    std::fs::write(
        &file.0,
        r#"{ "sheets": { "epl": [
            ["", "Coral", "Bet365", "Unibet"],
            ["Home", "9.9", "9.9", "9.9"],
            ["Away", "9.9", "9.9", "9.9"],
            ["note: do not edit row 4"]
        ] } }"#,
    )
    .unwrap();

    let store = Arc::new(SheetFileStore::new(file.0.clone()));
    let source = Arc::new(MockSource::new([lines(&["Unibet", "Paddy", "Bet365"])]));
    let task = FetchTask::new(GroupSpec::new("epl", "epl", Duration::from_secs(60)), source, store);

    assert_eq!(task.run(CancelFlag::new()).await, TaskState::Succeeded);

    let grid = cells(&file.0, "epl");
    assert_eq!(grid[0], ["", "Bet365", "Unibet", "Paddy"]);
    assert_eq!(grid[1], ["Home", "4.00", "2.00", "3.00"]);
    assert_eq!(grid[2], ["Away", "1.20", "1.00", "1.10"]);
    assert_eq!(grid[3], ["note: do not edit row 4"]);
}

#[tokio::test]
async fn test_swapped_columns_persist_across_cycles() {
    let file = TempWorkbook::new();
    let store = Arc::new(SheetFileStore::new(file.0.clone()));
    let layout = SheetLayout::default();

    let source = Arc::new(MockSource::new([lines(&["Bet365", "Unibet", "Coral"])]));
    let mut scheduler = Scheduler::new(source, store.clone());
    scheduler.register(GroupSpec::new("epl", "epl", Duration::from_secs(3600))).unwrap();
    let mut rx = scheduler.subscribe("epl").unwrap();
    timeout(Duration::from_secs(5), rx.wait_for(|s| s.state == TaskState::Succeeded))
        .await
        .unwrap()
        .unwrap();

    // Operator drags Coral to the front by rewriting the header order
    let existing = store.read_existing("epl", &layout).await.unwrap().unwrap();
    let mut rows = existing.snapshot();
    rows.rotate_right(1);
    for (position, row) in rows.iter_mut().enumerate() {
        row.position = position;
    }
    store.write_ordered("epl", &layout, &rows).await.unwrap();

    assert!(scheduler.run_once("epl").await.unwrap());
    timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.run_id == 2 && s.state == TaskState::Succeeded),
    )
    .await
    .unwrap()
    .unwrap();

    let grid = cells(&file.0, "epl");
    assert_eq!(grid[0], ["", "Coral", "Bet365", "Unibet"]);
    assert_eq!(grid[1], ["", "4.00", "2.00", "3.00"]);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_groups_share_one_workbook() {
    let file = TempWorkbook::new();
    let store = Arc::new(SheetFileStore::new(file.0.clone()));
    let layout = SheetLayout {
        name_row: 2,
        first_col: 0,
        ..SheetLayout::default()
    };

    let source = Arc::new(MockSource::new([lines(&["Bet365", "Unibet"])]));
    let mut scheduler = Scheduler::new(source, store.clone());
    scheduler.register(GroupSpec::new("epl", "epl", Duration::from_secs(3600))).unwrap();
    scheduler
        .register(GroupSpec::new("nba", "nba", Duration::from_secs(3600)).with_layout(layout))
        .unwrap();

    for group in ["epl", "nba"] {
        let mut rx = scheduler.subscribe(group).unwrap();
        timeout(Duration::from_secs(5), rx.wait_for(|s| s.state == TaskState::Succeeded))
            .await
            .unwrap()
            .unwrap();
    }
    scheduler.shutdown().await;

    let epl = store.read_existing("epl", &SheetLayout::default()).await.unwrap().unwrap();
    let nba = store.read_existing("nba", &layout).await.unwrap().unwrap();
    assert_eq!(epl.names_in_order().collect::<Vec<_>>(), ["Bet365", "Unibet"]);
    assert_eq!(nba.names_in_order().collect::<Vec<_>>(), ["Bet365", "Unibet"]);

    let grid = cells(&file.0, "nba");
    assert_eq!(grid[2], ["Bet365", "Unibet"]);
}

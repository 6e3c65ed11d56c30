//! Integration tests for workspaces, SQL across sheets and workbooks

use eruo::io::{read_file, read_workbook, workbook::read_workbook_schema, write_workbook};
use eruo::search::{self, SearchOptions};
use eruo::sql::create_sheet_from_sql;
use eruo::workspace::Workspace;
use std::path::Path;
use tempfile::TempDir;

fn workspace() -> Workspace {
    let mut workspace = Workspace::new();
    for name in ["sales", "regions"] {
        let frame = read_file(Path::new(&format!("testdata/{name}.csv"))).unwrap();
        workspace.create_sheet(frame, Some(name));
    }
    workspace
}

#[test]
fn test_sql_join_across_sheets() {
    let mut workspace = workspace();
    let id = create_sheet_from_sql(
        &mut workspace,
        None,
        "Managers = SELECT s.region, r.manager, SUM(s.qty) AS qty \
         FROM sales s JOIN regions r ON s.region = r.region \
         GROUP BY s.region, r.manager ORDER BY region",
    )
    .unwrap();

    let sheet = workspace.get(&id).unwrap();
    assert_eq!(sheet.title(), "Managers");
    let df = sheet.main().unwrap();
    assert_eq!(df.height(), 3);
    let managers: Vec<Option<&str>> = df.column("manager").unwrap().str().unwrap().into_iter().collect();
    assert_eq!(managers, [Some("Linus"), Some("Ada"), Some("Grace")]);
}

#[test]
fn test_workbook_round_trip_after_edits() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sales.erbook");

    let mut workspace = workspace();
    let sales = workspace.by_title("sales").unwrap().id().to_owned();
    {
        let sheet = workspace.get_mut(&sales).unwrap();
        let replaced = search::replace_all(sheet, "pear", "quince", &SearchOptions::default()).unwrap();
        assert_eq!(replaced, 2);
        sheet.hide_columns(0, 1).unwrap();
    }
    workspace.duplicate_sheet(&sales).unwrap();
    workspace.active_tab = 2;

    write_workbook(&workspace, &path).unwrap();

    let schema = read_workbook_schema(&path).unwrap();
    assert_eq!(schema.sheets.len(), 3);
    assert_eq!(schema.current_active_tab, 2);

    let loaded = read_workbook(&path).unwrap();
    assert_eq!(loaded.titles(), ["sales", "regions", "sales 1"]);
    let copy = loaded.active().unwrap();
    assert_eq!(copy.title(), "sales 1");
    assert!(!copy.view().is_column_visible(0));
    assert!(copy.history().is_empty());

    let products: Vec<Option<&str>> = copy
        .main()
        .unwrap()
        .column("product")
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(products[1], Some("quince"));
    assert_eq!(products[4], Some("quince"));
}

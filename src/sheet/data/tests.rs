use super::*;
use crate::sheet::view::FilterJoin;

fn sample() -> SheetData {
    SheetData::new(
        df!(
            "name" => ["alpha", "beta", "gamma", "delta"],
            "qty" => [Some(3i64), Some(1), None, Some(2)],
            "$note" => ["a", "b", "c", "d"],
        )
        .unwrap(),
    )
}

fn names(data: &SheetData, dfi: usize) -> Vec<String> {
    data.frame(dfi)
        .unwrap()
        .get_column_names_str()
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn texts(data: &SheetData, column: &str) -> Vec<Option<String>> {
    data.frame(0)
        .unwrap()
        .column(column)
        .unwrap()
        .cast(&DataType::String)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|v| v.map(str::to_owned))
        .collect()
}

fn qty(data: &SheetData) -> Vec<Option<i64>> {
    data.frame(0)
        .unwrap()
        .column("qty")
        .unwrap()
        .i64()
        .unwrap()
        .into_iter()
        .collect()
}

#[test]
fn test_setup_strips_reserved_prefix() {
    let data = sample();
    assert_eq!(names(&data, 0), ["name", "qty", "note"]);
    assert_eq!(data.bbox(0), Some(&BoundingBox::new(1, 1, 3, 5)));
}

#[test]
fn test_cell_metadata_at() {
    let mut data = sample();
    data.add_table(df!("x" => [1i64]).unwrap(), 6, 2);
    assert_eq!(data.cell_metadata_at(2, 1), CellMetadata::new(1, 0, 0));
    assert_eq!(data.cell_metadata_at(0, 0), CellMetadata::new(0, 0, 0));
    assert_eq!(data.cell_metadata_at(3, 5), CellMetadata::new(2, 4, 0));
    assert_eq!(data.cell_metadata_at(3, 6), CellMetadata::OUTSIDE);
    assert_eq!(data.cell_metadata_at(6, 3), CellMetadata::new(0, 1, 1));
}

#[test]
fn test_invalid_table_fails_softly() {
    let mut data = sample();
    assert!(!data.insert_blank_rows(1, 1, 9).unwrap());
    assert!(!data.delete_columns(0, 1, 9).unwrap());
    assert!(data.read_cell(0, 0, 9).is_none());
    assert!(data.filter_mask(&[], 9).unwrap().is_none());
    assert!(data.sort_rows(&[], 9).unwrap().is_none());
}

#[test]
fn test_read_cell_and_block() {
    let data = sample();
    assert_eq!(
        data.read_cell(0, 0, 0),
        Some(AnyValue::StringOwned("name".into()))
    );
    assert_eq!(data.read_cell(1, 1, 0), Some(AnyValue::Int64(3)));
    let block = data.read_block(Block::new(0, 2, 2, 2), 0).unwrap();
    assert_eq!(block.shape(), (2, 2));
    assert_eq!(block.column("name").unwrap().str().unwrap().get(0), Some("beta"));
}

#[test]
fn test_insert_blank_rows_and_columns() {
    let mut data = sample();
    assert!(data.insert_blank_rows(2, 2, 0).unwrap());
    assert_eq!(qty(&data), [Some(3), None, None, Some(1), None, Some(2)]);
    assert_eq!(data.bbox(0).unwrap().row_span, 7);

    assert!(data.insert_blank_columns(0, 2, false, 0).unwrap());
    assert_eq!(names(&data, 0), ["name", "column_1", "column_2", "qty", "note"]);
    assert!(data.insert_blank_columns(0, 1, true, 0).unwrap());
    assert_eq!(names(&data, 0).first().map(String::as_str), Some("column_3"));
}

#[test]
fn test_insert_from_frames() {
    let mut data = sample();
    let rows = df!("a" => ["omega"], "b" => ["9"]).unwrap();
    assert!(data.insert_rows_from(&rows, 1, 0).unwrap());
    assert_eq!(qty(&data).first(), Some(&Some(9)));

    let columns = df!("qty" => [1i64, 2]).unwrap();
    assert!(data.insert_columns_from(&columns, 1, 0).unwrap());
    assert_eq!(names(&data, 0), ["name", "qty_1", "qty", "note"]);
    let padded = data.frame(0).unwrap().column("qty_1").unwrap();
    assert_eq!(padded.null_count(), 3);
}

#[test]
fn test_duplicate_rows_and_columns() {
    let mut data = sample();
    assert!(data.duplicate_rows(1, 2, 0).unwrap());
    assert_eq!(
        texts(&data, "name"),
        ["alpha", "beta", "alpha", "beta", "gamma", "delta"].map(|s| Some(s.to_owned()))
    );

    assert!(data.duplicate_columns(1, 1, false, 0).unwrap());
    assert!(data.duplicate_columns(2, 1, true, 0).unwrap());
    assert_eq!(names(&data, 0), ["name", "qty", "qty_2", "qty_1", "note"]);
}

#[test]
fn test_delete_rows_protects_header() {
    let mut data = sample();
    assert!(data.delete_rows(0, 2, 0).unwrap());
    assert_eq!(qty(&data), [Some(1), None, Some(2)]);
    assert!(data.delete_rows(2, 5, 0).unwrap());
    assert_eq!(qty(&data), [Some(1)]);
    assert!(data.delete_columns(1, 5, 0).unwrap());
    assert_eq!(names(&data, 0), ["name"]);
}

#[test]
fn test_update_block_with_value_converts_to_column_type() {
    let mut data = sample();
    let view = SheetView::default();
    assert!(data
        .update_block_with_value(Block::new(1, 1, 1, 2), "7", &view, 0)
        .unwrap());
    assert_eq!(qty(&data), [Some(7), Some(7), None, Some(2)]);

    assert!(data
        .update_block_with_value(Block::new(1, 4, 1, 1), "", &view, 0)
        .unwrap());
    assert_eq!(qty(&data).last(), Some(&None));
}

#[test]
fn test_update_block_with_unconvertible_value_keeps_text() {
    let mut data = sample();
    let view = SheetView::default();
    data.update_block_with_value(Block::new(1, 1, 1, 1), "many", &view, 0)
        .unwrap();
    assert_eq!(data.column_dtype(1, 0), Some(DataType::String));
    assert_eq!(texts(&data, "qty").first(), Some(&Some("many".to_owned())));
}

#[test]
fn test_update_block_whole_column_and_header() {
    let mut data = sample();
    let view = SheetView::default();
    let block = Block {
        column: 1,
        row: 0,
        column_span: Some(1),
        row_span: None,
    };
    data.update_block_with_value(block, "5", &view, 0).unwrap();
    assert_eq!(names(&data, 0), ["name", "5", "note"]);
    assert_eq!(texts(&data, "5"), vec![Some("5".to_owned()); 4]);
}

#[test]
fn test_update_block_skips_hidden_rows_and_columns() {
    let mut data = sample();
    let mut view = SheetView::default();
    view.set_row_mask([true, false, true, true]);
    view.hide_columns(2, 1, 3);
    data.update_block_with_value(Block::new(1, 1, 2, 4), "0", &view, 0)
        .unwrap();
    assert_eq!(qty(&data), [Some(0), Some(1), Some(0), Some(0)]);
    assert_eq!(texts(&data, "note").first(), Some(&Some("a".to_owned())));
}

#[test]
fn test_update_block_with_operator() {
    let mut data = sample();
    let view = SheetView::default();
    let block = Block::new(0, 0, 1, 3);
    assert!(data
        .update_block_with_operator(block, "uppercase", &[], &view, 0)
        .unwrap());
    assert_eq!(names(&data, 0).first().map(String::as_str), Some("NAME"));
    assert_eq!(
        texts(&data, "NAME"),
        ["ALPHA", "BETA", "gamma", "delta"].map(|s| Some(s.to_owned()))
    );
    assert!(data
        .update_block_with_operator(block, "no-such-operator", &[], &view, 0)
        .is_err());
}

#[test]
fn test_update_block_with_content() {
    let mut data = sample();
    data.insert_blank_columns(2, 1, false, 0).unwrap();
    let content = df!("pasted" => [10i64, 20, 30, 40, 50]).unwrap();
    let block = Block::new(3, 2, 1, 5);
    assert!(data.update_block_with_content(block, &content, 0).unwrap());

    let pasted = data.frame(0).unwrap().column("column_1").unwrap();
    assert_eq!(pasted.dtype(), &DataType::Int64);
    let values: Vec<Option<i64>> = pasted.i64().unwrap().into_iter().collect();
    assert_eq!(values, [None, Some(10), Some(20), Some(30)]);
}

#[test]
fn test_update_columns_with_expression() {
    let mut data = sample();
    assert!(data
        .update_columns_with_expression("double", col("qty") * lit(2), 0)
        .unwrap());
    assert_eq!(data.bbox(0).unwrap().column_span, 4);
    assert!(data
        .update_columns_with_expression("qty", col("qty") + lit(1), 0)
        .unwrap());
    assert_eq!(qty(&data), [Some(4), Some(2), None, Some(3)]);
}

#[test]
fn test_filter_mask_keeps_header() {
    let data = sample();
    let mut second = Filter::equals("name", Some("delta".to_owned()));
    second.join = FilterJoin::Or;
    let filters = [Filter::equals("qty", Some("1".to_owned())), second];
    let mask: Vec<Option<bool>> = data.filter_mask(&filters, 0).unwrap().unwrap().into_iter().collect();
    assert_eq!(mask, [Some(true), Some(false), Some(true), Some(false), Some(true)]);

    let all = data.filter_mask(&[], 0).unwrap().unwrap();
    assert_eq!(all.len(), 5);
    assert_eq!(all.sum(), Some(5));
}

#[test]
fn test_materialize_view() {
    let mut data = sample();
    data.add_table(df!("x" => [1i64]).unwrap(), 8, 1);
    let filters = [Filter::not_equals("qty", None)];
    assert!(data
        .materialize_view(&filters, &["qty".to_owned(), "name".to_owned()])
        .unwrap());
    assert_eq!(data.len(), 1);
    assert_eq!(names(&data, 0), ["qty", "name"]);
    assert_eq!(qty(&data), [Some(3), Some(1), Some(2)]);
}

#[test]
fn test_sort_rows_puts_nulls_last() {
    let mut data = sample();
    let order = data.sort_rows(&[SortKey::new("qty", false)], 0).unwrap().unwrap();
    assert_eq!(order, [1, 3, 0, 2]);
    assert_eq!(qty(&data), [Some(1), Some(2), Some(3), None]);
    assert_eq!(names(&data, 0), ["name", "qty", "note"]);

    data.sort_rows(&[SortKey::new("qty", true)], 0).unwrap();
    assert_eq!(qty(&data), [Some(3), Some(2), Some(1), None]);
}

#[test]
fn test_reorder_columns() {
    let mut data = sample();
    let order = data.reorder_columns(&["note".to_owned()], 0).unwrap().unwrap();
    assert_eq!(order, [2, 0, 1]);
    assert_eq!(names(&data, 0), ["note", "name", "qty"]);
    assert!(data.reorder_columns(&["missing".to_owned()], 0).is_err());
}

#[test]
fn test_convert_columns_dtype() {
    let mut data = SheetData::new(
        df!(
            "when" => [Some(" 2024-03-01"), None, Some("2024-12-31")],
            "count" => ["1", "2", "x"],
            "at" => ["08:30 PM", "09:15 AM", "12:00 PM"],
        )
        .unwrap(),
    );
    assert!(data.convert_columns_dtype(0, 1, &DataType::Date, 0).unwrap());
    assert_eq!(data.column_dtype(0, 0), Some(DataType::Date));
    assert_eq!(
        data.read_cell(0, 3, 0).map(|v| v.to_string()),
        Some("2024-12-31".to_owned())
    );

    let err = data
        .convert_columns_dtype(1, 1, &DataType::Int64, 0)
        .unwrap_err();
    assert_eq!(err.to_string(), "Cannot be converted to: integer 64");
    assert_eq!(data.column_dtype(1, 0), Some(DataType::String));

    assert!(data.convert_columns_dtype(2, 1, &DataType::Time, 0).unwrap());
    assert_eq!(data.column_dtype(2, 0), Some(DataType::Time));

    assert!(data
        .convert_columns_dtype(1, 1, &DataType::Categorical(None, Default::default()), 0)
        .unwrap());
    assert!(matches!(
        data.column_dtype(1, 0),
        Some(DataType::Categorical(_, CategoricalOrdering::Lexical))
    ));
}

#[test]
fn test_replace_in_cell() {
    let mut data = sample();
    assert!(data.replace_in_cell(0, 1, "ALPH", "B", false, 0).unwrap());
    assert_eq!(texts(&data, "name").first(), Some(&Some("Ba".to_owned())));
    assert!(data.replace_in_cell(0, 2, "BETA", "x", true, 0).unwrap());
    assert_eq!(texts(&data, "name").get(1), Some(&Some("beta".to_owned())));
    assert!(data.replace_in_cell(0, 2, "beta", "", true, 0).unwrap());
    assert_eq!(texts(&data, "name").get(1), Some(&None));
}

#[test]
fn test_unique_values_are_cached_until_change() {
    let mut data = sample();
    let values = data.unique_values(0, 0, None).unwrap().unwrap();
    assert_eq!(values.len(), 4);
    let filtered = data.unique_values(0, 0, Some("ET")).unwrap().unwrap();
    assert_eq!(filtered.len(), 1);

    data.delete_rows(1, 1, 0).unwrap();
    let values = data.unique_values(0, 0, None).unwrap().unwrap();
    assert_eq!(values.len(), 3);
}

#[test]
fn test_header_promotion_and_demotion() {
    let mut data = SheetData::new(
        df!(
            "column_1" => ["id", "1", "2"],
            "column_2" => [None, Some("x"), Some("y")],
        )
        .unwrap(),
    );
    assert!(data.use_first_row_as_headers(0).unwrap());
    assert_eq!(names(&data, 0), ["id", "column_1"]);
    assert_eq!(data.frame(0).unwrap().height(), 2);

    assert!(data.use_headers_as_first_row(0).unwrap());
    assert_eq!(names(&data, 0), ["column_1", "column_2"]);
    assert_eq!(texts(&data, "column_1").first(), Some(&Some("id".to_owned())));
    assert_eq!(data.frame(0).unwrap().height(), 3);
}

#[test]
fn test_rename_column() {
    let mut data = sample();
    assert_eq!(
        data.rename_column(1, "name", 0).unwrap(),
        Some("name_1".to_owned())
    );
    assert_eq!(data.rename_column(7, "x", 0).unwrap(), None);
}

#[test]
fn test_insert_rows_after_rename() {
    let mut data = SheetData::new(df!("name" => ["alpha", "beta"], "qty" => [1i64, 2]).unwrap());
    assert_eq!(
        data.rename_column(1, "amount", 0).unwrap(),
        Some("amount".to_owned())
    );
    assert!(data.insert_blank_rows(1, 1, 0).unwrap());
    assert!(data
        .insert_rows_from(&df!("a" => ["gamma"], "b" => [7i64]).unwrap(), 1, 0)
        .unwrap());

    let frame = data.frame(0).unwrap();
    assert_eq!(names(&data, 0), ["name", "amount"]);
    let schema: Vec<&str> = frame.schema().iter_names().map(|name| name.as_str()).collect();
    assert_eq!(schema, ["name", "amount"]);
    let amounts: Vec<Option<i64>> = frame.column("amount").unwrap().i64().unwrap().into_iter().collect();
    assert_eq!(amounts, [Some(7), None, Some(1), Some(2)]);
}

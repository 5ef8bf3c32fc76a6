//! Table loading, merging and feature extraction using Polars

use crate::config::{ColumnConfig, TrainConfig};
use crate::error::TrainError;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use ndarray::Array2;
use polars::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Temporary row-order columns used to keep the merge output stable
const ACTIVITY_ROW: &str = "__activity_row";
const SLEEP_ROW: &str = "__sleep_row";

/// Date-only layouts, tried in order
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// Date-time layouts; `%.f` also matches a missing fractional part
const DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Merged training rows ready for scaling
#[derive(Debug, Clone)]
pub struct TrainingData {
    /// Raw feature matrix (n_rows, 3), missing values already zero-filled
    pub features: Array2<f64>,
    /// Feature names in column order
    pub feature_columns: Vec<String>,
}

impl TrainingData {
    /// Build feature rows from a merged table, keeping merge order.
    pub fn from_merged(merged: &DataFrame, columns: &ColumnConfig) -> crate::Result<Self> {
        let feature_columns = columns.feature_names();
        let features = extract_features(merged, &feature_columns)?;

        Ok(Self {
            features,
            feature_columns,
        })
    }

    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.features.nrows() == 0
    }
}

/// Load both sources, join them and extract the feature matrix.
pub fn load_training_data(config: &TrainConfig) -> crate::Result<TrainingData> {
    // Both inputs are checked before either is parsed
    ensure_exists(&config.activity_path)?;
    ensure_exists(&config.sleep_path)?;

    let activity = load_activity(&config.activity_path, &config.columns)?;
    let sleep = load_sleep(&config.sleep_path, &config.columns)?;
    let merged = merge_tables(activity, sleep, &config.columns)?;

    let data = TrainingData::from_merged(&merged, &config.columns)?;
    info!(rows = data.len(), "Extracted feature matrix");
    Ok(data)
}

/// Load the daily activity table, normalizing its date column.
pub fn load_activity(path: &Path, columns: &ColumnConfig) -> crate::Result<DataFrame> {
    let df = read_csv(path)?;
    let df = prepare_table(df, "activity", &columns.id, &columns.activity_date)?;
    info!(path = %path.display(), rows = df.height(), "Loaded activity table");
    Ok(df)
}

/// Load the daily sleep table, normalizing its date column.
pub fn load_sleep(path: &Path, columns: &ColumnConfig) -> crate::Result<DataFrame> {
    let df = read_csv(path)?;
    let df = prepare_table(df, "sleep", &columns.id, &columns.sleep_date)?;
    info!(path = %path.display(), rows = df.height(), "Loaded sleep table");
    Ok(df)
}

/// Read a CSV file with a header row. Fails with `NotFound` before parsing.
pub fn read_csv(path: &Path) -> crate::Result<DataFrame> {
    ensure_exists(path)?;

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(df)
}

/// Validate the key columns of a loaded table and normalize them for joining.
///
/// Ids become strings so integer and textual identifiers compare equal, and the date column
/// becomes a `YYYY-MM-DD` string with time-of-day and offset dropped.
pub fn prepare_table(
    mut df: DataFrame,
    table: &str,
    id_column: &str,
    date_column: &str,
) -> crate::Result<DataFrame> {
    for column in [date_column, id_column] {
        if df.column(column).is_err() {
            return Err(TrainError::Validation {
                table: table.to_string(),
                column: column.to_string(),
            });
        }
    }

    let ids = df.column(id_column)?.cast(&DataType::String)?;
    df.with_column(ids)?;

    let dates = normalize_dates(df.column(date_column)?, date_column)?;
    df.with_column(dates)?;

    Ok(df)
}

/// Inner-join activity and sleep tables on (id, date).
///
/// The sleep date column is renamed to the activity date column first. Rows with a null key
/// component never match. Output follows activity row order, then sleep row order.
pub fn merge_tables(
    activity: DataFrame,
    sleep: DataFrame,
    columns: &ColumnConfig,
) -> crate::Result<DataFrame> {
    let id = columns.id.as_str();
    let date = columns.activity_date.as_str();
    let keys = [col(id), col(date)];

    let activity = activity
        .lazy()
        .with_row_index(ACTIVITY_ROW, None)
        .filter(col(id).is_not_null().and(col(date).is_not_null()));

    let mut sleep = sleep.lazy();
    if columns.sleep_date != columns.activity_date {
        sleep = sleep.rename([columns.sleep_date.as_str()], [date]);
    }
    let sleep = sleep
        .with_row_index(SLEEP_ROW, None)
        .filter(col(id).is_not_null().and(col(date).is_not_null()));

    let merged = activity
        .join(sleep, keys.clone(), keys, JoinArgs::new(JoinType::Inner))
        .sort_by_exprs(
            [col(ACTIVITY_ROW), col(SLEEP_ROW)],
            SortMultipleOptions::default(),
        )
        .collect()?;
    let merged = merged.drop(ACTIVITY_ROW)?.drop(SLEEP_ROW)?;

    if merged.height() == 0 {
        return Err(TrainError::EmptyResult);
    }

    info!(rows = merged.height(), "Merged activity and sleep tables");
    Ok(merged)
}

/// Select the feature columns in order, replacing null or NaN cells with 0.0.
///
/// The schema is checked once up front and every absent column is reported together. A cell
/// that is present but not numeric fails with `InvalidNumber`.
pub fn extract_features(merged: &DataFrame, feature_columns: &[String]) -> crate::Result<Array2<f64>> {
    let missing: Vec<String> = feature_columns
        .iter()
        .filter(|name| merged.column(name.as_str()).is_err())
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(TrainError::MissingColumns { columns: missing });
    }

    let mut features = Array2::zeros((merged.height(), feature_columns.len()));
    for (j, name) in feature_columns.iter().enumerate() {
        let raw = merged.column(name.as_str())?;
        let values = raw.cast(&DataType::Float64)?;
        // The cast turns unparseable text into null
        if values.null_count() > raw.null_count() {
            return Err(unparsed_cell(raw, &values, name)?);
        }

        let mut filled = 0usize;
        for (i, value) in values.f64()?.into_iter().enumerate() {
            features[[i, j]] = match value {
                Some(v) if !v.is_nan() => v,
                _ => {
                    filled += 1;
                    0.0
                }
            };
        }
        if filled > 0 {
            debug!(column = %name, filled, "Filled missing feature values with zero");
        }
    }

    Ok(features)
}

/// Parse a date-like cell into a calendar date, discarding time-of-day.
///
/// Offsets are honored: the date is the one shown in the stated offset.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.date());
        }
    }
    None
}

fn normalize_dates(series: &Series, column: &str) -> crate::Result<Series> {
    let text = series.cast(&DataType::String)?;
    let mut dates: Vec<Option<String>> = Vec::with_capacity(text.len());

    for cell in text.str()? {
        let date = match cell.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => {
                let date = parse_calendar_date(raw).ok_or_else(|| TrainError::InvalidDate {
                    column: column.to_string(),
                    value: raw.to_string(),
                })?;
                Some(date.format("%Y-%m-%d").to_string())
            }
            None => None,
        };
        dates.push(date);
    }

    Ok(Series::new(column, dates))
}

/// Report the first cell that was present before the float cast and null after it.
fn unparsed_cell(raw: &Series, parsed: &Series, column: &str) -> crate::Result<TrainError> {
    let text = raw.cast(&DataType::String)?;
    let value = text
        .str()?
        .into_iter()
        .zip(parsed.f64()?.into_iter())
        .find_map(|(cell, number)| match (cell, number) {
            (Some(cell), None) => Some(cell.to_string()),
            _ => None,
        })
        .unwrap_or_default();

    Ok(TrainError::InvalidNumber {
        column: column.to_string(),
        value,
    })
}

fn ensure_exists(path: &Path) -> crate::Result<()> {
    if !path.exists() {
        return Err(TrainError::NotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn columns() -> ColumnConfig {
        ColumnConfig::default()
    }

    fn string_column(df: &DataFrame, name: &str) -> Vec<String> {
        let values = df.column(name).unwrap().cast(&DataType::String).unwrap();
        values
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.unwrap_or_default().to_string())
            .collect()
    }

    fn activity_frame() -> DataFrame {
        let df = df!(
            "Id" => &[1i64, 1, 2, 3],
            "ActivityDate" => &["4/12/2016", "4/13/2016", "4/12/2016", "4/12/2016"],
            "TotalSteps" => &[10000i64, 8000, 12000, 3000],
            "Calories" => &[2000.0, 1900.0, 2500.0, 1500.0]
        )
        .unwrap();
        prepare_table(df, "activity", "Id", "ActivityDate").unwrap()
    }

    fn sleep_frame() -> DataFrame {
        let df = df!(
            "Id" => &[1i64, 2, 4],
            "SleepDay" => &[
                "4/12/2016 12:00:00 AM",
                "4/12/2016 12:00:00 AM",
                "4/12/2016 12:00:00 AM"
            ],
            "TotalMinutesAsleep" => &[400i64, 350, 500]
        )
        .unwrap();
        prepare_table(df, "sleep", "Id", "SleepDay").unwrap()
    }

    #[test]
    fn test_parse_calendar_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2016, 4, 12).unwrap();
        for raw in [
            "2016-04-12",
            "2016-04-12 23:59:59",
            "2016-04-12T08:30:00",
            "2016-04-12T08:30:00.250",
            "2016-04-12T23:30:00-05:00",
            "4/12/2016",
            "04/12/2016",
            "4/12/2016 12:00:00 AM",
            "4/12/2016 11:15:00 PM",
            " 2016/04/12 ",
        ] {
            assert_eq!(parse_calendar_date(raw), Some(expected), "failed on {raw}");
        }
        assert_eq!(parse_calendar_date("yesterday"), None);
        assert_eq!(parse_calendar_date("2016-13-45"), None);
    }

    #[test]
    fn test_prepare_table_normalizes_keys() {
        let sleep = sleep_frame();
        let dates: Vec<Option<&str>> = sleep.column("SleepDay").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(dates, vec![Some("2016-04-12"); 3]);
        assert_eq!(sleep.column("Id").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_prepare_table_missing_date_column() {
        let df = df!("Id" => &[1i64], "Day" => &["2020-01-01"]).unwrap();
        let err = prepare_table(df, "sleep", "Id", "SleepDay").unwrap_err();
        match err {
            TrainError::Validation { table, column } => {
                assert_eq!(table, "sleep");
                assert_eq!(column, "SleepDay");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_prepare_table_rejects_garbage_dates() {
        let df = df!("Id" => &[1i64], "ActivityDate" => &["not a date"]).unwrap();
        let err = prepare_table(df, "activity", "Id", "ActivityDate").unwrap_err();
        assert!(matches!(err, TrainError::InvalidDate { .. }));
    }

    #[test]
    fn test_merge_is_inner_join() {
        let merged = merge_tables(activity_frame(), sleep_frame(), &columns()).unwrap();

        // Only (1, 2016-04-12) and (2, 2016-04-12) exist on both sides
        assert_eq!(merged.height(), 2);
        let ids = string_column(&merged, "Id");
        let dates = string_column(&merged, "ActivityDate");
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(dates, vec!["2016-04-12", "2016-04-12"]);
        assert!(merged.column("SleepDay").is_err());
        assert!(merged.column("TotalMinutesAsleep").is_ok());
    }

    #[test]
    fn test_merge_keys_exist_in_both_sources() {
        let activity = activity_frame();
        let sleep = sleep_frame();
        let activity_keys: Vec<(String, String)> = string_column(&activity, "Id")
            .into_iter()
            .zip(string_column(&activity, "ActivityDate"))
            .collect();
        let sleep_keys: Vec<(String, String)> = string_column(&sleep, "Id")
            .into_iter()
            .zip(string_column(&sleep, "SleepDay"))
            .collect();

        let merged = merge_tables(activity, sleep, &columns()).unwrap();
        let merged_keys = string_column(&merged, "Id")
            .into_iter()
            .zip(string_column(&merged, "ActivityDate"));
        for key in merged_keys {
            assert!(activity_keys.contains(&key));
            assert!(sleep_keys.contains(&key));
        }
    }

    #[test]
    fn test_merge_with_disjoint_dates_is_empty_error() {
        let activity = prepare_table(
            df!("Id" => &[1i64], "ActivityDate" => &["2020-01-01"], "TotalSteps" => &[10i64]).unwrap(),
            "activity",
            "Id",
            "ActivityDate",
        )
        .unwrap();
        let sleep = prepare_table(
            df!("Id" => &[1i64], "SleepDay" => &["2020-01-02"], "TotalMinutesAsleep" => &[400i64]).unwrap(),
            "sleep",
            "Id",
            "SleepDay",
        )
        .unwrap();

        let err = merge_tables(activity, sleep, &columns()).unwrap_err();
        assert!(matches!(err, TrainError::EmptyResult));
    }

    #[test]
    fn test_merge_drops_null_keys() {
        let activity = prepare_table(
            df!("Id" => &[Some(1i64), None], "ActivityDate" => &["2020-01-01", "2020-01-01"]).unwrap(),
            "activity",
            "Id",
            "ActivityDate",
        )
        .unwrap();
        let sleep = prepare_table(
            df!("Id" => &[Some(1i64), None], "SleepDay" => &["2020-01-01", "2020-01-01"]).unwrap(),
            "sleep",
            "Id",
            "SleepDay",
        )
        .unwrap();

        let merged = merge_tables(activity, sleep, &columns()).unwrap();
        assert_eq!(merged.height(), 1);
    }

    #[test]
    fn test_extract_features_fills_missing_values() {
        let merged = df!(
            "TotalSteps" => &[Some(100.0), None],
            "TotalMinutesAsleep" => &[Some(f64::NAN), Some(420.0)],
            "Calories" => &[1500i64, 1800]
        )
        .unwrap();

        let features = extract_features(&merged, &columns().feature_names()).unwrap();
        assert_eq!(features.shape(), &[2, 3]);
        assert_eq!(features.row(0).to_vec(), vec![100.0, 0.0, 1500.0]);
        assert_eq!(features.row(1).to_vec(), vec![0.0, 420.0, 1800.0]);
    }

    #[test]
    fn test_extract_features_rejects_text_cells() {
        let merged = df!(
            "TotalSteps" => &["10000", "n/a"],
            "TotalMinutesAsleep" => &[400i64, 420],
            "Calories" => &["2000", "2,100"]
        )
        .unwrap();

        let err = extract_features(&merged, &columns().feature_names()).unwrap_err();
        match err {
            TrainError::InvalidNumber { column, value } => {
                assert_eq!(column, "TotalSteps");
                assert_eq!(value, "n/a");
            }
            other => panic!("unexpected error: {other}"),
        }

        let merged = df!(
            "TotalSteps" => &["10000", "9000"],
            "TotalMinutesAsleep" => &[400i64, 420],
            "Calories" => &["2000", "2,100"]
        )
        .unwrap();
        let err = extract_features(&merged, &columns().feature_names()).unwrap_err();
        assert!(matches!(err, TrainError::InvalidNumber { ref value, .. } if value == "2,100"));
    }

    #[test]
    fn test_extract_features_parses_numeric_text() {
        let merged = df!(
            "TotalSteps" => &[Some("10000"), None],
            "TotalMinutesAsleep" => &[400i64, 420],
            "Calories" => &["2000", "2100.5"]
        )
        .unwrap();

        let features = extract_features(&merged, &columns().feature_names()).unwrap();
        assert_eq!(features.row(0).to_vec(), vec![10000.0, 400.0, 2000.0]);
        assert_eq!(features.row(1).to_vec(), vec![0.0, 420.0, 2100.5]);
    }

    #[test]
    fn test_extract_features_reports_all_missing_columns() {
        let merged = df!("TotalSteps" => &[1.0]).unwrap();
        let err = extract_features(&merged, &columns().feature_names()).unwrap_err();
        match err {
            TrainError::MissingColumns { columns } => {
                assert_eq!(columns, vec!["TotalMinutesAsleep", "Calories"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_read_csv_missing_file() {
        let err = read_csv(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, TrainError::NotFound { .. }));
    }

    #[test]
    fn test_load_activity_from_csv() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Id,ActivityDate,TotalSteps,Calories").unwrap();
        writeln!(file, "1503960366,4/12/2016,13162,1985").unwrap();
        writeln!(file, "1503960366,4/13/2016,10735,1797").unwrap();

        let df = load_activity(file.path(), &columns()).unwrap();
        assert_eq!(df.height(), 2);
        let dates = string_column(&df, "ActivityDate");
        assert_eq!(dates, vec!["2016-04-12", "2016-04-13"]);
        let ids = string_column(&df, "Id");
        assert_eq!(ids[0], "1503960366");
    }
}

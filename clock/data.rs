//! # Data Loading and Validation Module
//!
//! This module is the exclusive entry point for the blood sample table. It reads the
//! CSV with polars, validates it against a fixed schema, and turns every row into a
//! typed [`BearSample`].
//!
//! - Strict Schema: column names are not configurable. `Sample_ID`, `birth`,
//!   `sampling_date`, `age_years`, `sex`, `environment` and the three marker columns
//!   must all be present.
//! - Typed Dates: `birth` and `sampling_date` become `NaiveDate`s. Every bear is
//!   assumed to be born on February 1, and that assumption is what resolves
//!   day-first versus month-first dates.
//! - User-Centric Errors: failures are assumed to be input errors and `DataError`
//!   names the column and, where possible, the offending value.

use crate::types::{BearSample, Environment, Marker, Sex};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

pub const SAMPLE_ID_COLUMN: &str = "Sample_ID";
pub const BIRTH_COLUMN: &str = "birth";
pub const SAMPLING_DATE_COLUMN: &str = "sampling_date";
pub const AGE_COLUMN: &str = "age_years";
pub const SEX_COLUMN: &str = "sex";
pub const ENVIRONMENT_COLUMN: &str = "environment";

/// Date layouts tried in order. Day-first precedes month-first; the February 1
/// birth date check decides between them when both parse.
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%m/%d/%Y"];

/// A comprehensive error type for all data loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The required column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Missing or null values were found in the required column '{0}'. This tool requires complete data with no missing values."
    )]
    MissingValuesFound(String),
    #[error(
        "Non-finite values (NaN or Infinity) were found in the required column '{0}'. This tool requires all data to be finite."
    )]
    NonFiniteValuesFound(String),
    #[error(
        "The value '{value}' in column '{column_name}' is not a date in any supported layout (YYYY-MM-DD, YYYY/MM/DD, DD/MM/YYYY, MM/DD/YYYY)."
    )]
    UnparseableDate { column_name: String, value: String },
    #[error(
        "The dates in column '{0}' do not share a single layout. Use one date layout per column."
    )]
    InconsistentDateLayout(String),
    #[error(
        "Birth date '{value}' on row {row} is not February 1 under any supported date layout. All bears are assumed to be born on February 1."
    )]
    BirthDateNotFebruaryFirst { row: usize, value: String },
    #[error("Invalid value on row {row} of column '{column_name}': {message}")]
    InvalidCategory {
        column_name: String,
        row: usize,
        message: String,
    },
    #[error(
        "Sample id '{0}' has no sampling place. Expected the id to end with a space-separated place name."
    )]
    MissingSamplingPlace(String),
}

/// Reads the raw CSV into a polars `DataFrame` without any schema validation.
pub fn read_frame(path: &Path) -> Result<DataFrame, DataError> {
    let df = CsvReader::new(File::open(path)?)
        .with_options(CsvReadOptions::default().with_has_header(true))
        .finish()?;
    log::debug!(
        "Read {} rows and {} columns from '{}'",
        df.height(),
        df.width(),
        path.display()
    );
    Ok(df)
}

/// Loads and validates the blood sample table, deriving `sampling_place` for every row.
pub fn load_dataset(path: &Path) -> Result<Vec<BearSample>, DataError> {
    log::info!("Loading samples from '{}'", path.display());
    let df = read_frame(path)?;
    let samples = samples_from_frame(&df)?;
    log::info!("Loaded {} validated samples", samples.len());
    Ok(samples)
}

/// Validates an already-read table and converts it into typed samples.
pub fn samples_from_frame(df: &DataFrame) -> Result<Vec<BearSample>, DataError> {
    internal::ensure_required_columns(df)?;
    if df.height() == 0 {
        log::warn!("The sample table has a header but no data rows");
        return Ok(Vec::new());
    }

    let sample_ids = internal::extract_text_column(df, SAMPLE_ID_COLUMN)?;
    let places = sample_ids
        .iter()
        .map(|id| sampling_place(id))
        .collect::<Result<Vec<String>, DataError>>()?;

    let birth_text = internal::extract_text_column(df, BIRTH_COLUMN)?;
    let (birth, birth_layout) = internal::parse_birth_dates(&birth_text)?;
    let sampling_text = internal::extract_text_column(df, SAMPLING_DATE_COLUMN)?;
    let (sampling, sampling_layout) =
        internal::parse_dates(SAMPLING_DATE_COLUMN, &sampling_text, Some(birth_layout))?;
    log::debug!("Resolved date layouts: birth '{birth_layout}', sampling_date '{sampling_layout}'");

    let ages = internal::extract_numeric_column(df, AGE_COLUMN)?;
    let sexes = internal::parse_category(df, SEX_COLUMN, Sex::parse)?;
    let environments = internal::parse_category(df, ENVIRONMENT_COLUMN, Environment::parse)?;
    let slc12a5 = internal::extract_numeric_column(df, Marker::Slc12a5.column())?;
    let vgf = internal::extract_numeric_column(df, Marker::Vgf.column())?;
    let scgn = internal::extract_numeric_column(df, Marker::Scgn.column())?;

    let samples = (0..df.height())
        .map(|row| BearSample {
            sample_id: sample_ids[row].clone(),
            birth: birth[row],
            sampling_date: sampling[row],
            age_years: ages[row],
            sex: sexes[row],
            environment: environments[row],
            slc12a5: slc12a5[row],
            vgf: vgf[row],
            scgn: scgn[row],
            sampling_place: places[row].clone(),
        })
        .collect();
    Ok(samples)
}

/// The sampling place is the last space-separated word of a sample id.
pub fn sampling_place(sample_id: &str) -> Result<String, DataError> {
    let mut words = sample_id.split_whitespace();
    let first = words.next();
    match (first, words.last()) {
        (Some(_), Some(place)) => Ok(place.to_string()),
        _ => Err(DataError::MissingSamplingPlace(sample_id.to_string())),
    }
}

/// Internal module for shared data loading logic.
mod internal {
    use super::*;

    pub(super) fn ensure_required_columns(df: &DataFrame) -> Result<(), DataError> {
        let present: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        let required = [
            SAMPLE_ID_COLUMN,
            BIRTH_COLUMN,
            SAMPLING_DATE_COLUMN,
            AGE_COLUMN,
            SEX_COLUMN,
            ENVIRONMENT_COLUMN,
        ]
        .into_iter()
        .chain(Marker::ALL.iter().map(|marker| marker.column()));

        for column_name in required {
            if !present.iter().any(|name| name == column_name) {
                return Err(DataError::ColumnNotFound(column_name.to_string()));
            }
        }
        Ok(())
    }

    pub(super) fn extract_numeric_column(
        df: &DataFrame,
        column_name: &str,
    ) -> Result<Vec<f64>, DataError> {
        let series = df.column(column_name)?.as_materialized_series();
        if series.null_count() > 0 {
            return Err(DataError::MissingValuesFound(column_name.to_string()));
        }

        if !series.dtype().is_primitive_numeric() {
            return Err(DataError::ColumnWrongType {
                column_name: column_name.to_string(),
                expected_type: "f64 (numeric)",
                found_type: format!("{:?}", series.dtype()),
            });
        }

        let casted = series.cast(&DataType::Float64)?;
        let chunked = casted.f64()?.rechunk();
        let values: Vec<f64> = chunked.into_no_null_iter().collect();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
        }
        Ok(values)
    }

    pub(super) fn extract_text_column(
        df: &DataFrame,
        column_name: &str,
    ) -> Result<Vec<String>, DataError> {
        let series = df.column(column_name)?.as_materialized_series();
        let casted = series.cast(&DataType::String)?;
        casted
            .str()?
            .into_iter()
            .map(|value| match value.map(str::trim) {
                Some(text) if !text.is_empty() => Ok(text.to_string()),
                _ => Err(DataError::MissingValuesFound(column_name.to_string())),
            })
            .collect()
    }

    pub(super) fn parse_category<T>(
        df: &DataFrame,
        column_name: &str,
        parse: fn(&str) -> Result<T, String>,
    ) -> Result<Vec<T>, DataError> {
        extract_text_column(df, column_name)?
            .iter()
            .enumerate()
            .map(|(row, text)| {
                parse(text).map_err(|message| DataError::InvalidCategory {
                    column_name: column_name.to_string(),
                    row: row + 1,
                    message,
                })
            })
            .collect()
    }

    /// Keeps only the calendar date of a timestamp such as `2005-02-01 00:00:00`.
    fn date_part(value: &str) -> &str {
        value.split(['T', ' ']).next().unwrap_or(value)
    }

    fn parse_all(values: &[String], layout: &str) -> Option<Vec<NaiveDate>> {
        values
            .iter()
            .map(|value| NaiveDate::parse_from_str(date_part(value), layout).ok())
            .collect()
    }

    fn is_february_first(date: &NaiveDate) -> bool {
        date.month() == 2 && date.day() == 1
    }

    pub(super) fn parse_birth_dates(
        values: &[String],
    ) -> Result<(Vec<NaiveDate>, &'static str), DataError> {
        let mut parsed_any_layout = false;
        for layout in DATE_FORMATS {
            if let Some(dates) = parse_all(values, layout) {
                parsed_any_layout = true;
                if dates.iter().all(is_february_first) {
                    return Ok((dates, layout));
                }
            }
        }

        if !parsed_any_layout {
            return Err(first_unparseable(BIRTH_COLUMN, values));
        }

        // Some layout fits every value, so report the first row that no layout reads
        // as February 1.
        let offending = values.iter().enumerate().find(|(_, value)| {
            !DATE_FORMATS.iter().any(|layout| {
                NaiveDate::parse_from_str(date_part(value), layout)
                    .is_ok_and(|date| is_february_first(&date))
            })
        });
        match offending {
            Some((row, value)) => Err(DataError::BirthDateNotFebruaryFirst {
                row: row + 1,
                value: value.clone(),
            }),
            None => Err(DataError::InconsistentDateLayout(BIRTH_COLUMN.to_string())),
        }
    }

    pub(super) fn parse_dates(
        column_name: &str,
        values: &[String],
        preferred: Option<&'static str>,
    ) -> Result<(Vec<NaiveDate>, &'static str), DataError> {
        let candidates = preferred
            .into_iter()
            .chain(DATE_FORMATS.into_iter().filter(|layout| Some(*layout) != preferred));
        for layout in candidates {
            if let Some(dates) = parse_all(values, layout) {
                return Ok((dates, layout));
            }
        }
        Err(first_unparseable(column_name, values))
    }

    fn first_unparseable(column_name: &str, values: &[String]) -> DataError {
        let unreadable = values.iter().find(|value| {
            !DATE_FORMATS
                .iter()
                .any(|layout| NaiveDate::parse_from_str(date_part(value), layout).is_ok())
        });
        match unreadable {
            Some(value) => DataError::UnparseableDate {
                column_name: column_name.to_string(),
                value: value.clone(),
            },
            None => DataError::InconsistentDateLayout(column_name.to_string()),
        }
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io::{self, Write};
    use tempfile::NamedTempFile;

    const HEADER: &str = "Sample_ID,birth,sampling_date,age_years,sex,environment,SLC12A5,VGF,SCGN";

    /// A helper to create a temporary CSV file for testing.
    fn create_test_csv(content: &str) -> io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "{}", content)?;
        file.flush()?;
        Ok(file)
    }

    fn load(content: &str) -> Result<Vec<BearSample>, DataError> {
        let file = create_test_csv(content).unwrap();
        load_dataset(file.path())
    }

    #[test]
    fn test_load_dataset_success() {
        let content = format!(
            "{HEADER}\n\
             B01 Sapporo,2005-02-01,2010-06-15,5.37,F,wild,0.41,0.22,0.63\n\
             B02 Noboribetsu,2001-02-01,2012-09-01,11.58,M,captive,0.52,0.31,0.71"
        );
        let samples = load(&content).unwrap();
        assert_eq!(samples.len(), 2);

        let first = &samples[0];
        assert_eq!(first.sample_id, "B01 Sapporo");
        assert_eq!(first.sampling_place, "Sapporo");
        assert_eq!(first.birth, NaiveDate::from_ymd_opt(2005, 2, 1).unwrap());
        assert_eq!(first.sampling_date, NaiveDate::from_ymd_opt(2010, 6, 15).unwrap());
        assert_eq!(first.sex, Sex::Female);
        assert_eq!(first.environment, Environment::Wild);
        assert_abs_diff_eq!(first.age_years, 5.37, epsilon = 1e-12);
        assert_abs_diff_eq!(first.methylation(Marker::Scgn), 0.63, epsilon = 1e-12);

        assert_eq!(samples[1].sampling_place, "Noboribetsu");
        assert_eq!(samples[1].environment, Environment::Captive);
    }

    #[test]
    fn test_day_first_birth_dates_resolve_to_february() {
        let content = format!(
            "{HEADER}\n\
             B01 Sapporo,01/02/2005,15/06/2010,5.37,F,wild,0.41,0.22,0.63\n\
             B02 Sapporo,01/02/2001,03/09/2012,11.58,M,wild,0.52,0.31,0.71"
        );
        let samples = load(&content).unwrap();
        assert_eq!(samples[0].birth, NaiveDate::from_ymd_opt(2005, 2, 1).unwrap());
        assert_eq!(
            samples[1].sampling_date,
            NaiveDate::from_ymd_opt(2012, 9, 3).unwrap()
        );
    }

    #[test]
    fn test_month_first_birth_dates_resolve_to_february() {
        let content = format!(
            "{HEADER}\n\
             B01 Sapporo,02/01/2005,06/15/2010,5.37,F,wild,0.41,0.22,0.63"
        );
        let samples = load(&content).unwrap();
        assert_eq!(samples[0].birth, NaiveDate::from_ymd_opt(2005, 2, 1).unwrap());
        assert_eq!(
            samples[0].sampling_date,
            NaiveDate::from_ymd_opt(2010, 6, 15).unwrap()
        );
    }

    #[test]
    fn test_birth_not_on_february_first_is_rejected() {
        let content = format!(
            "{HEADER}\n\
             B01 Sapporo,2005-02-01,2010-06-15,5.37,F,wild,0.41,0.22,0.63\n\
             B02 Sapporo,2005-03-01,2010-06-15,5.30,F,wild,0.41,0.22,0.63"
        );
        match load(&content).unwrap_err() {
            DataError::BirthDateNotFebruaryFirst { row, value } => {
                assert_eq!(row, 2);
                assert_eq!(value, "2005-03-01");
            }
            other => panic!("Expected BirthDateNotFebruaryFirst, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_date_is_reported() {
        let content = format!(
            "{HEADER}\n\
             B01 Sapporo,2005-02-01,yesterday,5.37,F,wild,0.41,0.22,0.63"
        );
        match load(&content).unwrap_err() {
            DataError::UnparseableDate { column_name, value } => {
                assert_eq!(column_name, "sampling_date");
                assert_eq!(value, "yesterday");
            }
            other => panic!("Expected UnparseableDate, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_column_is_reported() {
        let content = "Sample_ID,birth,sampling_date,age_years,sex,environment,SLC12A5,VGF\n\
                       B01 Sapporo,2005-02-01,2010-06-15,5.37,F,wild,0.41,0.22";
        assert!(matches!(
            load(content).unwrap_err(),
            DataError::ColumnNotFound(name) if name == "SCGN"
        ));
    }

    #[test]
    fn test_missing_age_is_rejected() {
        let content = format!(
            "{HEADER}\n\
             B01 Sapporo,2005-02-01,2010-06-15,,F,wild,0.41,0.22,0.63\n\
             B02 Sapporo,2005-02-01,2010-06-15,4.0,F,wild,0.41,0.22,0.63"
        );
        assert!(matches!(
            load(&content).unwrap_err(),
            DataError::MissingValuesFound(name) if name == "age_years"
        ));
    }

    #[test]
    fn test_textual_marker_is_rejected() {
        let content = format!(
            "{HEADER}\n\
             B01 Sapporo,2005-02-01,2010-06-15,5.37,F,wild,high,0.22,0.63"
        );
        match load(&content).unwrap_err() {
            DataError::ColumnWrongType { column_name, .. } => assert_eq!(column_name, "SLC12A5"),
            other => panic!("Expected ColumnWrongType, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_sex_code_is_rejected() {
        let content = format!(
            "{HEADER}\n\
             B01 Sapporo,2005-02-01,2010-06-15,5.37,X,wild,0.41,0.22,0.63"
        );
        match load(&content).unwrap_err() {
            DataError::InvalidCategory {
                column_name, row, ..
            } => {
                assert_eq!(column_name, "sex");
                assert_eq!(row, 1);
            }
            other => panic!("Expected InvalidCategory, got {other:?}"),
        }
    }

    #[test]
    fn test_header_only_file_loads_empty() {
        let samples = load(HEADER).unwrap();
        assert!(samples.is_empty());
    }

    #[test]
    fn test_lowercase_sex_code_is_rejected() {
        let content = format!(
            "{HEADER}\n\
             B01 Sapporo,2005-02-01,2010-06-15,5.37,f,wild,0.41,0.22,0.63"
        );
        assert!(matches!(
            load(&content).unwrap_err(),
            DataError::InvalidCategory { column_name, .. } if column_name == "sex"
        ));
    }

    #[test]
    fn test_narrow_integer_age_column_is_accepted() {
        let content = format!(
            "{HEADER}\n\
             B01 Sapporo,2005-02-01,2010-02-01,5,F,wild,0.41,0.22,0.63"
        );
        let file = create_test_csv(&content).unwrap();
        let mut df = read_frame(file.path()).unwrap();
        let age = df
            .column("age_years")
            .unwrap()
            .cast(&DataType::Int16)
            .unwrap();
        df.with_column(age).unwrap();

        let samples = samples_from_frame(&df).unwrap();
        assert_abs_diff_eq!(samples[0].age_years, 5.0);
    }

    #[test]
    fn test_sampling_place_is_last_word() {
        assert_eq!(sampling_place("Bear01 Sapporo").unwrap(), "Sapporo");
        assert_eq!(sampling_place("  K 12  Shiretoko ").unwrap(), "Shiretoko");
        assert!(matches!(
            sampling_place("Bear01").unwrap_err(),
            DataError::MissingSamplingPlace(id) if id == "Bear01"
        ));
    }
}

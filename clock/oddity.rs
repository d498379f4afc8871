//! # Positional Parity Scaling
//!
//! Rescales every element of a numeric sequence by a multiplier chosen from the
//! parity of its position: `x100` at even positions, `x1000` at odd positions.
//!
//! - Positional: the index is the element's rank in the sequence handed in, always
//!   starting at 0. Callers that filter or sort a table must do so *before* calling
//!   in here; row labels of the source table never leak into the parity decision.
//! - Copy-then-scale: every entry point scales an owned copy and leaves the caller's
//!   values untouched.
//! - Bulk: even and odd lanes are scaled as two strided slices rather than with a
//!   per-element branch.

use ndarray::{Array1, ArrayView1, s};
use polars::prelude::*;
use thiserror::Error;

/// The fixed pair of multipliers applied by [`parity_transform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParityPolicy;

impl ParityPolicy {
    /// Multiplier for positions 0, 2, 4, ...
    pub const EVEN_MULTIPLIER: f64 = 100.0;
    /// Multiplier for positions 1, 3, 5, ...
    pub const ODD_MULTIPLIER: f64 = 1000.0;

    #[inline]
    pub const fn multiplier(position: usize) -> f64 {
        if position % 2 == 0 {
            Self::EVEN_MULTIPLIER
        } else {
            Self::ODD_MULTIPLIER
        }
    }
}

/// Failures of the dataframe-column entry point. The slice and array entry points are
/// numeric by construction and cannot fail.
#[derive(Error, Debug)]
pub enum OddityError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("The column '{0}' was not found in the input table.")]
    ColumnNotFound(String),
    #[error(
        "The column '{column_name}' must hold numeric values for parity scaling, but has type {found_type}."
    )]
    NonNumericColumn {
        column_name: String,
        found_type: String,
    },
    #[error(
        "The column '{column_name}' has a missing value at position {position}. Parity scaling requires every value to be present."
    )]
    MissingValue { column_name: String, position: usize },
}

/// Scales `values[i]` by 100 when `i` is even and by 1000 when `i` is odd.
///
/// ```
/// use bearclock::oddity::parity_transform;
///
/// assert_eq!(parity_transform(&[10.0, 9.5, 8.0]), vec![1000.0, 9500.0, 800.0]);
/// assert_eq!(parity_transform(&[2.0]), vec![200.0]);
/// assert!(parity_transform(&[]).is_empty());
/// ```
pub fn parity_transform(values: &[f64]) -> Vec<f64> {
    parity_transform_array(ArrayView1::from(values)).to_vec()
}

/// Array form of [`parity_transform`]. Positions follow the logical order of the
/// view, so a strided or reversed view is renumbered from 0 as well.
pub fn parity_transform_array(values: ArrayView1<f64>) -> Array1<f64> {
    let mut scaled = values.to_owned();
    if scaled.is_empty() {
        return scaled;
    }

    scaled
        .slice_mut(s![..;2])
        .mapv_inplace(|v| v * ParityPolicy::EVEN_MULTIPLIER);
    if scaled.len() > 1 {
        scaled
            .slice_mut(s![1..;2])
            .mapv_inplace(|v| v * ParityPolicy::ODD_MULTIPLIER);
    }
    scaled
}

/// Applies [`parity_transform`] to one column of a table.
///
/// The column must have an integer or floating point dtype and no missing values.
/// An empty column yields an empty array whatever its dtype, since a header-only CSV
/// infers every column as text. Positions are the row positions of `df` as given, starting at 0; pass an already
/// filtered and sorted frame to control which rows land on even positions.
pub fn oddity_column(df: &DataFrame, column_name: &str) -> Result<Array1<f64>, OddityError> {
    let column = df
        .column(column_name)
        .map_err(|_| OddityError::ColumnNotFound(column_name.to_string()))?;
    let series = column.as_materialized_series();
    if series.is_empty() {
        return Ok(Array1::zeros(0));
    }

    if !series.dtype().is_primitive_numeric() {
        return Err(OddityError::NonNumericColumn {
            column_name: column_name.to_string(),
            found_type: format!("{:?}", series.dtype()),
        });
    }

    let casted = series.cast(&DataType::Float64)?;
    let values = casted
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(position, value)| {
            value.ok_or_else(|| OddityError::MissingValue {
                column_name: column_name.to_string(),
                position,
            })
        })
        .collect::<Result<Vec<f64>, OddityError>>()?;

    log::debug!(
        "Applying parity scaling to {} values of column '{column_name}'",
        values.len()
    );
    Ok(parity_transform_array(ArrayView1::from(values.as_slice())))
}

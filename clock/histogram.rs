use thiserror::Error;

/// Bin count used by the age histograms unless the caller asks for another.
pub const DEFAULT_BINS: usize = 30;

#[derive(Error, Debug, PartialEq)]
pub enum HistogramError {
    #[error("Cannot build a histogram from an empty set of values.")]
    Empty,
    #[error("A histogram needs at least one bin.")]
    ZeroBins,
    #[error("Histogram input contains a non-finite value ({0}).")]
    NonFinite(f64),
}

/// Equal-width histogram over the range of its own values.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// `bins + 1` edges in ascending order.
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

impl Histogram {
    /// Bins are half-open `[lo, hi)` except the last, which also takes the maximum.
    /// When every value is equal the range is widened by 0.5 on each side.
    pub fn from_values(values: &[f64], bins: usize) -> Result<Self, HistogramError> {
        if bins == 0 {
            return Err(HistogramError::ZeroBins);
        }
        if let Some(&bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(HistogramError::NonFinite(bad));
        }
        let (mut lo, mut hi) = values
            .iter()
            .fold(None, |range: Option<(f64, f64)>, &v| match range {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
            .ok_or(HistogramError::Empty)?;
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }

        let width = (hi - lo) / bins as f64;
        let edges: Vec<f64> = (0..=bins)
            .map(|i| if i == bins { hi } else { lo + width * i as f64 })
            .collect();

        let mut counts = vec![0usize; bins];
        for &v in values {
            let slot = (((v - lo) / width).floor() as usize).min(bins - 1);
            counts[slot] += 1;
        }

        Ok(Self { edges, counts })
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn max_count(&self) -> usize {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// Counts scaled so the histogram integrates to one.
    pub fn densities(&self) -> Vec<f64> {
        let total = self.total() as f64;
        self.counts
            .iter()
            .zip(self.edges.windows(2))
            .map(|(&count, edge)| {
                let width = edge[1] - edge[0];
                if total == 0.0 || width <= 0.0 {
                    0.0
                } else {
                    count as f64 / (total * width)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn counts_sum_to_input_length() {
        let values: Vec<f64> = (0..100).map(|i| (i as f64).sqrt()).collect();
        let hist = Histogram::from_values(&values, DEFAULT_BINS).unwrap();
        assert_eq!(hist.bins(), 30);
        assert_eq!(hist.edges.len(), 31);
        assert_eq!(hist.total(), 100);
    }

    #[test]
    fn maximum_lands_in_last_bin() {
        let hist = Histogram::from_values(&[0.0, 1.0, 2.0, 3.0, 4.0], 4).unwrap();
        assert_eq!(hist.counts, vec![1, 1, 1, 2]);
        assert_eq!(hist.edges, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn constant_values_widen_range() {
        let hist = Histogram::from_values(&[5.0, 5.0, 5.0], 2).unwrap();
        assert_eq!(hist.edges, vec![4.5, 5.0, 5.5]);
        assert_eq!(hist.counts, vec![0, 3]);
    }

    #[test]
    fn densities_integrate_to_one() {
        let values = [0.2, 0.4, 1.1, 1.9, 2.5, 2.6, 2.7];
        let hist = Histogram::from_values(&values, 5).unwrap();
        let area: f64 = hist
            .densities()
            .iter()
            .zip(hist.edges.windows(2))
            .map(|(d, e)| d * (e[1] - e[0]))
            .sum();
        assert_abs_diff_eq!(area, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn rejects_degenerate_input() {
        assert_eq!(Histogram::from_values(&[], 3), Err(HistogramError::Empty));
        assert_eq!(Histogram::from_values(&[1.0], 0), Err(HistogramError::ZeroBins));
        assert_eq!(
            Histogram::from_values(&[1.0, f64::INFINITY], 3),
            Err(HistogramError::NonFinite(f64::INFINITY))
        );
    }
}

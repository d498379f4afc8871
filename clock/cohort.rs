//! Ordering and grouping of samples ahead of the per-group computations.
//!
//! The parity scaling in [`crate::oddity`] is purely positional, so the order of the
//! sequence it receives is decided here: filter to one sex, sort by ascending age,
//! then number positions afresh from 0.

use crate::oddity::parity_transform;
use crate::types::{BearSample, Environment, Sex};
use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeMap;

/// One scaled age within a single-sex, age-ordered sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OddityRow {
    pub sex: Sex,
    pub position: usize,
    pub sample_id: String,
    pub age_years: f64,
    pub oddity: f64,
}

/// Scaled ages for both sexes, each ordered by ascending age.
#[derive(Debug, Clone, Default)]
pub struct SexOddity {
    pub female: Vec<OddityRow>,
    pub male: Vec<OddityRow>,
}

impl SexOddity {
    pub fn rows(&self) -> impl Iterator<Item = &OddityRow> {
        self.female.iter().chain(self.male.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaceCount {
    pub sampling_place: String,
    pub count: usize,
}

/// Samples of one sex in ascending age order. Equal ages keep their file order.
pub fn ordered_by_age(samples: &[BearSample], sex: Sex) -> Vec<&BearSample> {
    samples
        .iter()
        .filter(|sample| sample.sex == sex)
        .sorted_by(|a, b| a.age_years.total_cmp(&b.age_years))
        .collect()
}

/// Applies the parity scaling to the ages of one sex, ordered by ascending age.
pub fn sex_oddity(samples: &[BearSample], sex: Sex) -> Vec<OddityRow> {
    let ordered = ordered_by_age(samples, sex);
    let ages: Vec<f64> = ordered.iter().map(|sample| sample.age_years).collect();
    let scaled = parity_transform(&ages);

    ordered
        .into_iter()
        .zip(scaled)
        .enumerate()
        .map(|(position, (sample, oddity))| OddityRow {
            sex,
            position,
            sample_id: sample.sample_id.clone(),
            age_years: sample.age_years,
            oddity,
        })
        .collect()
}

pub fn oddity_by_sex(samples: &[BearSample]) -> SexOddity {
    let result = SexOddity {
        female: sex_oddity(samples, Sex::Female),
        male: sex_oddity(samples, Sex::Male),
    };
    log::info!(
        "Scaled {} female and {} male ages",
        result.female.len(),
        result.male.len()
    );
    result
}

/// Number of samples collected at each place, most frequent first. Ties are broken
/// by place name.
pub fn sampling_place_counts(samples: &[BearSample]) -> Vec<PlaceCount> {
    samples
        .iter()
        .map(|sample| sample.sampling_place.as_str())
        .counts()
        .into_iter()
        .map(|(place, count)| PlaceCount {
            sampling_place: place.to_string(),
            count,
        })
        .sorted_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.sampling_place.cmp(&b.sampling_place))
        })
        .collect()
}

/// Ages grouped by every (sex, environment) combination present in the data.
pub fn group_by_sex_environment(samples: &[BearSample]) -> BTreeMap<(Sex, Environment), Vec<f64>> {
    let mut groups: BTreeMap<(Sex, Environment), Vec<f64>> = BTreeMap::new();
    for sample in samples {
        groups
            .entry((sample.sex, sample.environment))
            .or_default()
            .push(sample.age_years);
    }
    groups
}

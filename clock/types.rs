// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// This file is ONLY for types that are SHARED BETWEEN FILES, not types that only are used in one file.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// Sex code as recorded in the `sex` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Sex {
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "M")]
    Male,
}

impl Sex {
    pub const ALL: [Sex; 2] = [Sex::Female, Sex::Male];

    pub fn code(self) -> &'static str {
        match self {
            Sex::Female => "F",
            Sex::Male => "M",
        }
    }

    pub fn parse(code: &str) -> Result<Self, String> {
        match code.trim() {
            "F" => Ok(Sex::Female),
            "M" => Ok(Sex::Male),
            other => Err(format!(
                "Invalid sex code '{other}'. Expected 'F' (female) or 'M' (male)."
            )),
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Growth environment of the animal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Captive,
    Wild,
}

impl Environment {
    pub fn label(self) -> &'static str {
        match self {
            Environment::Captive => "captive",
            Environment::Wild => "wild",
        }
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("captive") {
            Ok(Environment::Captive)
        } else if trimmed.eq_ignore_ascii_case("wild") {
            Ok(Environment::Wild)
        } else {
            Err(format!(
                "Invalid environment '{trimmed}'. Expected 'captive' or 'wild'."
            ))
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The three CpG markers whose methylation levels are measured per sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    Slc12a5,
    Vgf,
    Scgn,
}

impl Marker {
    pub const ALL: [Marker; 3] = [Marker::Slc12a5, Marker::Vgf, Marker::Scgn];

    /// Column name in the source CSV.
    pub fn column(self) -> &'static str {
        match self {
            Marker::Slc12a5 => "SLC12A5",
            Marker::Vgf => "VGF",
            Marker::Scgn => "SCGN",
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// One row of the blood sample table after validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BearSample {
    #[serde(rename = "Sample_ID")]
    pub sample_id: String,
    pub birth: NaiveDate,
    pub sampling_date: NaiveDate,
    pub age_years: f64,
    pub sex: Sex,
    pub environment: Environment,
    #[serde(rename = "SLC12A5")]
    pub slc12a5: f64,
    #[serde(rename = "VGF")]
    pub vgf: f64,
    #[serde(rename = "SCGN")]
    pub scgn: f64,
    pub sampling_place: String,
}

impl BearSample {
    #[inline]
    pub fn methylation(&self, marker: Marker) -> f64 {
        match marker {
            Marker::Slc12a5 => self.slc12a5,
            Marker::Vgf => self.vgf,
            Marker::Scgn => self.scgn,
        }
    }
}

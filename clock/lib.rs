#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod cohort;
pub mod config;
pub mod data;
pub mod diagnostics;
pub mod figure;
pub mod histogram;
pub mod hmc;
pub mod model;
pub mod oddity;
pub mod types;

#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use polars::prelude::DataType;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use bearclock::cohort::{group_by_sex_environment, oddity_by_sex, sampling_place_counts};
use bearclock::config::SamplerConfig;
use bearclock::data::{load_dataset, read_frame};
use bearclock::diagnostics::{PosteriorSummary, summarize};
use bearclock::figure::{render_age_histograms, render_marker_scatter, render_posterior, write_svg};
use bearclock::histogram::DEFAULT_BINS;
use bearclock::hmc;
use bearclock::model::AgeRegression;
use bearclock::oddity::oddity_column;
use bearclock::types::BearSample;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Sampler settings: an optional TOML file, then individual flag overrides.
#[derive(Args)]
pub struct SamplerArgs {
    /// TOML file with sampler settings; missing keys use the defaults
    #[arg(long, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// Kept draws per chain
    #[arg(long, value_name = "N")]
    pub draws: Option<usize>,

    /// Tuning iterations per chain
    #[arg(long, value_name = "N")]
    pub tune: Option<usize>,

    /// Number of independent chains
    #[arg(long, value_name = "N")]
    pub chains: Option<usize>,

    /// Base random seed; chain k uses seed + k
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,
}

impl SamplerArgs {
    fn resolve(&self) -> Result<SamplerConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => SamplerConfig::load(path)?,
            None => SamplerConfig::default(),
        };
        if let Some(draws) = self.draws {
            config.draws = draws;
        }
        if let Some(tune) = self.tune {
            config.tune = tune;
        }
        if let Some(chains) = self.chains {
            config.chains = chains;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Parser)]
#[command(
    name = "bearclock",
    about = "Epigenetic age worksheet for bear blood methylation data",
    long_about = "Loads a table of bear blood samples (SLC12A5, VGF and SCGN methylation), \
                 derives the per-sex parity-scaled ages, draws the exploratory figures and \
                 fits a Bayesian regression of age on SCGN methylation."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Count samples per sampling place
    #[command(about = "Count samples per sampling place")]
    Places {
        /// CSV file with Sample_ID, birth, sampling_date, age_years, sex, environment and marker columns
        #[arg(value_name = "CSV")]
        data: PathBuf,
    },

    /// Parity-scaled ages of each sex, ordered by age
    #[command(about = "Parity-scale ages per sex (outputs: oddity.csv with --out)")]
    Oddity {
        #[arg(value_name = "CSV")]
        data: PathBuf,

        /// Scale this numeric column in file order instead of the per-sex ages
        #[arg(long, value_name = "NAME")]
        column: Option<String>,

        /// Write the rows as CSV instead of printing them
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Overlaid age histograms per sex and environment
    #[command(about = "Draw age histograms (outputs: age_histograms.svg)")]
    Hist {
        #[arg(value_name = "CSV")]
        data: PathBuf,

        #[arg(long, default_value_t = DEFAULT_BINS)]
        bins: usize,

        #[arg(long, value_name = "FILE", default_value = "age_histograms.svg")]
        out: PathBuf,
    },

    /// Age against each methylation marker
    #[command(about = "Draw marker scatter plots (outputs: methylation_scatter.svg)")]
    Scatter {
        #[arg(value_name = "CSV")]
        data: PathBuf,

        #[arg(long, value_name = "FILE", default_value = "methylation_scatter.svg")]
        out: PathBuf,
    },

    /// Fit the age regression on SCGN methylation
    #[command(about = "Fit the age model (outputs: posterior.toml, posterior.svg)")]
    Fit {
        #[arg(value_name = "CSV")]
        data: PathBuf,

        #[command(flatten)]
        sampler: SamplerArgs,

        /// Output directory
        #[arg(long, value_name = "DIR", default_value = ".")]
        out: PathBuf,
    },

    /// Run every step and write all tables and figures
    #[command(about = "Write the full worksheet report into a directory")]
    Report {
        #[arg(value_name = "CSV")]
        data: PathBuf,

        #[command(flatten)]
        sampler: SamplerArgs,

        /// Output directory
        #[arg(long, value_name = "DIR", default_value = "report")]
        out: PathBuf,
    },

    /// Display version and build information
    #[command(about = "Display version and build information")]
    Version,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Places { data }) => run_places(&data),
        Some(Commands::Oddity { data, column, out }) => {
            run_oddity(&data, column.as_deref(), out.as_deref())
        }
        Some(Commands::Hist { data, bins, out }) => run_hist(&data, bins, &out),
        Some(Commands::Scatter { data, out }) => run_scatter(&data, &out),
        Some(Commands::Fit { data, sampler, out }) => run_fit(&data, &sampler, &out),
        Some(Commands::Report { data, sampler, out }) => run_report(&data, &sampler, &out),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_places(data: &Path) -> CliResult {
    let samples = load_dataset(data)?;
    println!("{:<24} {:>6}", "sampling_place", "count");
    for place in sampling_place_counts(&samples) {
        println!("{:<24} {:>6}", place.sampling_place, place.count);
    }
    Ok(())
}

#[derive(Serialize)]
struct ColumnOddityRow {
    position: usize,
    value: f64,
    oddity: f64,
}

fn run_oddity(data: &Path, column: Option<&str>, out: Option<&Path>) -> CliResult {
    if let Some(column_name) = column {
        let frame = read_frame(data)?;
        let scaled = oddity_column(&frame, column_name)?;
        let raw = frame
            .column(column_name)?
            .as_materialized_series()
            .cast(&DataType::Float64)?;
        let values = raw.f64()?;
        let rows: Vec<ColumnOddityRow> = values
            .into_iter()
            .zip(scaled.iter())
            .enumerate()
            .map(|(position, (value, oddity))| ColumnOddityRow {
                position,
                value: value.unwrap_or(f64::NAN),
                oddity: *oddity,
            })
            .collect();
        return match out {
            Some(path) => write_csv(path, &rows),
            None => {
                println!("{:>8} {:>14} {:>16}", "position", column_name, "oddity");
                for row in &rows {
                    println!("{:>8} {:>14.4} {:>16.4}", row.position, row.value, row.oddity);
                }
                Ok(())
            }
        };
    }

    let samples = load_dataset(data)?;
    let oddity = oddity_by_sex(&samples);
    match out {
        Some(path) => write_csv(path, oddity.rows()),
        None => {
            println!(
                "{:<4} {:>8} {:<24} {:>10} {:>14}",
                "sex", "position", "Sample_ID", "age_years", "oddity"
            );
            for row in oddity.rows() {
                println!(
                    "{:<4} {:>8} {:<24} {:>10.3} {:>14.3}",
                    row.sex, row.position, row.sample_id, row.age_years, row.oddity
                );
            }
            Ok(())
        }
    }
}

fn run_hist(data: &Path, bins: usize, out: &Path) -> CliResult {
    let samples = load_dataset(data)?;
    let svg = render_age_histograms(&group_by_sex_environment(&samples), bins)?;
    write_svg(out, &svg)?;
    Ok(())
}

fn run_scatter(data: &Path, out: &Path) -> CliResult {
    let samples = load_dataset(data)?;
    write_svg(out, &render_marker_scatter(&samples)?)?;
    Ok(())
}

fn run_fit(data: &Path, sampler: &SamplerArgs, out: &Path) -> CliResult {
    let config = sampler.resolve()?;
    let samples = load_dataset(data)?;
    fs::create_dir_all(out)?;
    fit_and_save(&samples, &config, out)?;
    Ok(())
}

fn run_report(data: &Path, sampler: &SamplerArgs, out: &Path) -> CliResult {
    let config = sampler.resolve()?;
    let samples = load_dataset(data)?;
    fs::create_dir_all(out)?;

    write_csv(&out.join("samples.csv"), &samples)?;
    write_csv(&out.join("oddity.csv"), oddity_by_sex(&samples).rows())?;
    write_csv(&out.join("places.csv"), &sampling_place_counts(&samples))?;
    write_svg(
        &out.join("age_histograms.svg"),
        &render_age_histograms(&group_by_sex_environment(&samples), DEFAULT_BINS)?,
    )?;
    write_svg(
        &out.join("methylation_scatter.svg"),
        &render_marker_scatter(&samples)?,
    )?;
    fit_and_save(&samples, &config, out)?;

    println!("Report written to {}", out.display());
    Ok(())
}

fn fit_and_save(
    samples: &[BearSample],
    config: &SamplerConfig,
    out: &Path,
) -> CliResult {
    let model = AgeRegression::from_samples(samples)?;
    log::info!("Fitting age ~ SCGN on {} samples", model.n_observations());
    let trace = hmc::sample(&model, config)?;
    let summary = summarize(&trace, config.hdi_prob);
    print_summary_table(&summary);

    let summary_path = out.join("posterior.toml");
    summary.save(&summary_path)?;
    log::info!("Saved posterior summary to {}", summary_path.display());
    write_svg(&out.join("posterior.svg"), &render_posterior(&summary, &trace)?)?;
    Ok(())
}

fn print_summary_table(summary: &PosteriorSummary) {
    let hdi_percent = summary.hdi_prob * 100.0;
    println!(
        "{:<8} {:>10} {:>10} {:>12} {:>12} {:>8} {:>8}",
        "param",
        "mean",
        "sd",
        format!("hdi_{:.0}%_lo", hdi_percent),
        format!("hdi_{:.0}%_hi", hdi_percent),
        "r_hat",
        "ess"
    );
    for p in &summary.parameters {
        println!(
            "{:<8} {:>10.3} {:>10.3} {:>12.3} {:>12.3} {:>8.3} {:>8.0}",
            p.name, p.mean, p.sd, p.hdi_low, p.hdi_high, p.r_hat, p.ess
        );
    }
    println!(
        "{} chains x {} draws",
        summary.chains, summary.draws_per_chain
    );
}

fn write_csv<'a, T, I>(path: &Path, rows: I) -> CliResult
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

/// Format seconds into a human-readable duration like "2.4 hours ago"
fn format_duration_ago(seconds: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    if seconds < MINUTE {
        format!("{seconds} seconds ago")
    } else if seconds < HOUR {
        format!("{:.1} minutes ago", seconds as f64 / MINUTE as f64)
    } else if seconds < DAY {
        format!("{:.1} hours ago", seconds as f64 / HOUR as f64)
    } else {
        format!("{:.1} days ago", seconds as f64 / DAY as f64)
    }
}

fn print_version_info() {
    let version = env!("CARGO_PKG_VERSION");
    let build_timestamp: u64 = env!("BEARCLOCK_BUILD_TIMESTAMP").parse().unwrap_or(0);

    println!("bearclock {version}");

    if build_timestamp > 0 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if now > build_timestamp {
            println!("Built: {}", format_duration_ago(now - build_timestamp));
        } else {
            println!("Built: just now");
        }
    }
}

use std::fs;
use std::path::Path;
use std::process::Command;

use bearclock::diagnostics::PosteriorSummary;
use tempfile::tempdir;

fn write_table(dir: &Path) -> std::path::PathBuf {
    let mut table =
        String::from("Sample_ID,birth,sampling_date,age_years,sex,environment,SLC12A5,VGF,SCGN\n");
    for i in 0..16 {
        let scgn = 0.2 + 0.04 * i as f64;
        let age = 1.0 + 10.0 * scgn + if i % 2 == 0 { 0.2 } else { -0.2 };
        let sex = if i % 2 == 0 { "F" } else { "M" };
        let environment = if i % 3 == 0 { "captive" } else { "wild" };
        let place = if i % 4 == 0 { "Sapporo" } else { "Noboribetsu" };
        table.push_str(&format!(
            "Bear{i:02} {place},2000-02-01,2010-02-01,{age:.3},{sex},{environment},{:.3},0.30,{scgn:.3}\n",
            0.5 * scgn
        ));
    }
    let path = dir.join("bears.csv");
    fs::write(&path, table).expect("write table");
    path
}

#[test]
fn report_writes_every_table_and_figure() {
    let tmp = tempdir().expect("temporary directory");
    let data = write_table(tmp.path());
    let out = tmp.path().join("report");

    let exe = env!("CARGO_BIN_EXE_bearclock");
    let status = Command::new(exe)
        .current_dir(tmp.path())
        .args([
            "report",
            data.to_str().expect("path str"),
            "--out",
            out.to_str().expect("path str"),
            "--draws",
            "150",
            "--tune",
            "150",
            "--chains",
            "2",
            "--seed",
            "5",
        ])
        .status()
        .expect("run bearclock cli");
    assert!(status.success(), "CLI exited with status {status:?}");

    for name in [
        "samples.csv",
        "oddity.csv",
        "places.csv",
        "age_histograms.svg",
        "methylation_scatter.svg",
        "posterior.toml",
        "posterior.svg",
    ] {
        assert!(out.join(name).exists(), "{name} missing");
    }

    let samples = fs::read_to_string(out.join("samples.csv")).expect("read samples.csv");
    let header = samples.lines().next().expect("samples header");
    assert!(header.starts_with("Sample_ID,birth,sampling_date"));
    assert!(header.ends_with("sampling_place"));
    assert_eq!(samples.lines().count(), 17);

    let oddity = fs::read_to_string(out.join("oddity.csv")).expect("read oddity.csv");
    let mut lines = oddity.lines();
    assert_eq!(
        lines.next(),
        Some("sex,position,sample_id,age_years,oddity")
    );
    assert!(lines.next().expect("first oddity row").starts_with("F,0,Bear00 Sapporo,"));

    let places = fs::read_to_string(out.join("places.csv")).expect("read places.csv");
    assert_eq!(
        places.lines().collect::<Vec<_>>(),
        vec!["sampling_place,count", "Noboribetsu,12", "Sapporo,4"]
    );

    let summary = PosteriorSummary::load(&out.join("posterior.toml")).expect("load summary");
    assert_eq!(summary.chains, 2);
    assert_eq!(summary.draws_per_chain, 150);
    assert!(summary.parameter("beta").is_some());
}

#[test]
fn oddity_column_option_scales_raw_column_in_file_order() {
    let tmp = tempdir().expect("temporary directory");
    let data = write_table(tmp.path());
    let out = tmp.path().join("vgf.csv");

    let exe = env!("CARGO_BIN_EXE_bearclock");
    let status = Command::new(exe)
        .args([
            "oddity",
            data.to_str().expect("path str"),
            "--column",
            "VGF",
            "--out",
            out.to_str().expect("path str"),
        ])
        .status()
        .expect("run bearclock cli");
    assert!(status.success(), "CLI exited with status {status:?}");

    let written = fs::read_to_string(&out).expect("read oddity output");
    let rows: Vec<&str> = written.lines().collect();
    assert_eq!(rows[0], "position,value,oddity");
    assert_eq!(rows[1], "0,0.3,30.0");
    assert_eq!(rows[2], "1,0.3,300.0");
    assert_eq!(rows.len(), 17);
}

#[test]
fn oddity_column_option_accepts_header_only_table() {
    let tmp = tempdir().expect("temporary directory");
    let data = tmp.path().join("empty.csv");
    fs::write(
        &data,
        "Sample_ID,birth,sampling_date,age_years,sex,environment,SLC12A5,VGF,SCGN\n",
    )
    .expect("write table");
    let out = tmp.path().join("age.csv");

    let exe = env!("CARGO_BIN_EXE_bearclock");
    let output = Command::new(exe)
        .args([
            "oddity",
            data.to_str().expect("path str"),
            "--column",
            "age_years",
            "--out",
            out.to_str().expect("path str"),
        ])
        .output()
        .expect("run bearclock cli");
    assert!(
        output.status.success(),
        "stderr was: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let written = fs::read_to_string(&out).expect("read oddity output");
    assert_eq!(written.lines().count(), 0);
}

#[test]
fn missing_column_fails_with_error_message() {
    let tmp = tempdir().expect("temporary directory");
    let data = tmp.path().join("broken.csv");
    fs::write(&data, "Sample_ID,birth\nB01 Sapporo,2000-02-01\n").expect("write table");

    let exe = env!("CARGO_BIN_EXE_bearclock");
    let output = Command::new(exe)
        .args(["places", data.to_str().expect("path str")])
        .output()
        .expect("run bearclock cli");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error:"), "stderr was: {stderr}");
    assert!(stderr.contains("sampling_date"), "stderr was: {stderr}");
}

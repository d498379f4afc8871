//! SVG figures for the exploratory plots and the posterior.
//!
//! A small immediate-mode canvas collects SVG elements as strings; the three
//! `render_*` functions lay out axes on it and return the finished document.

use crate::diagnostics::PosteriorSummary;
use crate::hmc::Trace;
use crate::histogram::{Histogram, HistogramError};
use crate::types::{BearSample, Environment, Marker, Sex};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Bins of the posterior density panels.
const POSTERIOR_BINS: usize = 40;

#[derive(Error, Debug)]
pub enum FigureError {
    #[error("Failed to write figure: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Histogram could not be built: {0}")]
    Histogram(#[from] HistogramError),
    #[error("Nothing to plot: {0}")]
    NoData(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub u8, pub u8, pub u8);

impl Color {
    pub const BLACK: Color = Color(0, 0, 0);
    pub const GREY: Color = Color(120, 120, 120);
    pub const RED: Color = Color(214, 39, 40);
    pub const BLUE: Color = Color(31, 119, 180);
    pub const GREEN: Color = Color(44, 160, 44);
    pub const ORANGE: Color = Color(255, 127, 14);

    fn hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// Fill colors cycled over histogram groups.
const PALETTE: [Color; 4] = [Color::BLUE, Color::ORANGE, Color::GREEN, Color::RED];

#[derive(Debug, Clone, Copy)]
pub struct Style {
    pub fill: Option<Color>,
    pub stroke: Option<Color>,
    pub stroke_width: f64,
    pub opacity: f64,
}

impl Style {
    pub fn filled(color: Color, opacity: f64) -> Self {
        Self {
            fill: Some(color),
            stroke: None,
            stroke_width: 0.0,
            opacity,
        }
    }

    pub fn stroked(color: Color, width: f64) -> Self {
        Self {
            fill: None,
            stroke: Some(color),
            stroke_width: width,
            opacity: 1.0,
        }
    }

    fn attributes(&self) -> String {
        let fill = self.fill.map_or_else(|| "none".to_string(), Color::hex);
        let stroke = self.stroke.map_or_else(|| "none".to_string(), Color::hex);
        format!(
            "fill=\"{fill}\" stroke=\"{stroke}\" stroke-width=\"{:.2}\" opacity=\"{:.2}\"",
            self.stroke_width, self.opacity
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Start,
    Middle,
    End,
}

impl Anchor {
    fn as_str(self) -> &'static str {
        match self {
            Anchor::Start => "start",
            Anchor::Middle => "middle",
            Anchor::End => "end",
        }
    }
}

/// Immediate-mode SVG canvas. Coordinates are pixels from the top-left corner.
pub struct SvgCanvas {
    pub width: f64,
    pub height: f64,
    elements: Vec<String>,
}

impl SvgCanvas {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            elements: Vec::new(),
        }
    }

    pub fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, style: &Style) {
        self.elements.push(format!(
            "<rect x=\"{x:.2}\" y=\"{y:.2}\" width=\"{:.2}\" height=\"{:.2}\" {}/>",
            w.max(0.0),
            h.max(0.0),
            style.attributes()
        ));
    }

    pub fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, style: &Style) {
        self.elements.push(format!(
            "<line x1=\"{x1:.2}\" y1=\"{y1:.2}\" x2=\"{x2:.2}\" y2=\"{y2:.2}\" {}/>",
            style.attributes()
        ));
    }

    pub fn circle(&mut self, cx: f64, cy: f64, r: f64, style: &Style) {
        self.elements.push(format!(
            "<circle cx=\"{cx:.2}\" cy=\"{cy:.2}\" r=\"{r:.2}\" {}/>",
            style.attributes()
        ));
    }

    pub fn polyline(&mut self, points: &[(f64, f64)], style: &Style) {
        if points.is_empty() {
            return;
        }
        let coords = points
            .iter()
            .map(|(x, y)| format!("{x:.2},{y:.2}"))
            .collect::<Vec<_>>()
            .join(" ");
        self.elements.push(format!(
            "<polyline points=\"{coords}\" {}/>",
            style.attributes()
        ));
    }

    pub fn text(&mut self, x: f64, y: f64, content: &str, size: f64, anchor: Anchor) {
        self.elements.push(format!(
            "<text x=\"{x:.2}\" y=\"{y:.2}\" font-family=\"sans-serif\" font-size=\"{size:.1}\" text-anchor=\"{}\">{}</text>",
            anchor.as_str(),
            escape_xml(content)
        ));
    }

    /// Text rotated 90 degrees counter-clockwise around its anchor.
    pub fn vertical_text(&mut self, x: f64, y: f64, content: &str, size: f64) {
        self.elements.push(format!(
            "<text x=\"{x:.2}\" y=\"{y:.2}\" font-family=\"sans-serif\" font-size=\"{size:.1}\" text-anchor=\"middle\" transform=\"rotate(-90 {x:.2} {y:.2})\">{}</text>",
            escape_xml(content)
        ));
    }

    pub fn render(&self) -> String {
        let mut svg = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w:.0}\" height=\"{h:.0}\" viewBox=\"0 0 {w:.0} {h:.0}\">\n",
            w = self.width,
            h = self.height
        );
        svg.push_str(&format!(
            "<rect x=\"0\" y=\"0\" width=\"{:.0}\" height=\"{:.0}\" fill=\"#ffffff\"/>\n",
            self.width, self.height
        ));
        for element in &self.elements {
            svg.push_str(element);
            svg.push('\n');
        }
        svg.push_str("</svg>\n");
        svg
    }
}

/// Writes a rendered SVG document to `path`.
pub fn write_svg(path: &Path, svg: &str) -> Result<(), FigureError> {
    fs::write(path, svg)?;
    log::info!("Wrote figure to {}", path.display());
    Ok(())
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// A plotting area mapping data coordinates onto a canvas rectangle.
#[derive(Debug, Clone, Copy)]
struct Axes {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    x_range: (f64, f64),
    y_range: (f64, f64),
}

impl Axes {
    fn new(left: f64, top: f64, width: f64, height: f64, x_range: (f64, f64), y_range: (f64, f64)) -> Self {
        Self {
            left,
            top,
            width,
            height,
            x_range: widen(x_range),
            y_range: widen(y_range),
        }
    }

    fn map_x(&self, x: f64) -> f64 {
        self.left + (x - self.x_range.0) / (self.x_range.1 - self.x_range.0) * self.width
    }

    fn map_y(&self, y: f64) -> f64 {
        self.top + self.height - (y - self.y_range.0) / (self.y_range.1 - self.y_range.0) * self.height
    }

    fn bottom(&self) -> f64 {
        self.top + self.height
    }

    fn draw_frame(&self, canvas: &mut SvgCanvas, x_label: &str, y_label: &str) {
        let frame = Style::stroked(Color::BLACK, 1.0);
        canvas.rect(self.left, self.top, self.width, self.height, &frame);

        let tick = Style::stroked(Color::BLACK, 0.8);
        for x in nice_ticks(self.x_range.0, self.x_range.1, 6) {
            let px = self.map_x(x);
            canvas.line(px, self.bottom(), px, self.bottom() + 5.0, &tick);
            canvas.text(px, self.bottom() + 18.0, &format_tick(x, self.x_range), 11.0, Anchor::Middle);
        }
        for y in nice_ticks(self.y_range.0, self.y_range.1, 5) {
            let py = self.map_y(y);
            canvas.line(self.left - 5.0, py, self.left, py, &tick);
            canvas.text(self.left - 8.0, py + 4.0, &format_tick(y, self.y_range), 11.0, Anchor::End);
        }

        if !x_label.is_empty() {
            canvas.text(self.left + self.width / 2.0, self.bottom() + 38.0, x_label, 13.0, Anchor::Middle);
        }
        if !y_label.is_empty() {
            canvas.vertical_text(self.left - 48.0, self.top + self.height / 2.0, y_label, 13.0);
        }
    }

    /// Legend box in the upper-right corner, one swatch per entry.
    fn draw_legend(&self, canvas: &mut SvgCanvas, entries: &[(String, Style)]) {
        if entries.is_empty() {
            return;
        }
        let row_height = 18.0;
        let box_width = 150.0;
        let x = self.left + self.width - box_width - 10.0;
        let y = self.top + 10.0;
        canvas.rect(
            x,
            y,
            box_width,
            row_height * entries.len() as f64 + 8.0,
            &Style {
                fill: Some(Color(255, 255, 255)),
                stroke: Some(Color::GREY),
                stroke_width: 0.8,
                opacity: 0.9,
            },
        );
        for (i, (label, style)) in entries.iter().enumerate() {
            let row_y = y + 4.0 + row_height * i as f64;
            canvas.rect(x + 8.0, row_y + 3.0, 14.0, 10.0, style);
            canvas.text(x + 28.0, row_y + 12.0, label, 11.0, Anchor::Start);
        }
    }
}

/// Guards against a zero-width range, which would make the mapping undefined.
fn widen(range: (f64, f64)) -> (f64, f64) {
    if range.1 > range.0 {
        range
    } else {
        (range.0 - 0.5, range.1 + 0.5)
    }
}

fn nice_ticks(lo: f64, hi: f64, target: usize) -> Vec<f64> {
    let span = hi - lo;
    if !(span > 0.0) || target == 0 {
        return vec![lo];
    }
    let raw = span / target as f64;
    let magnitude = 10f64.powf(raw.log10().floor());
    let normalized = raw / magnitude;
    let step = magnitude
        * if normalized < 1.5 {
            1.0
        } else if normalized < 3.0 {
            2.0
        } else if normalized < 7.0 {
            5.0
        } else {
            10.0
        };
    let first = (lo / step).ceil() as i64;
    let last = (hi / step + 1e-9).floor() as i64;
    (first..=last).map(|k| k as f64 * step).collect()
}

fn format_tick(value: f64, range: (f64, f64)) -> String {
    let span = (range.1 - range.0).abs();
    let decimals = if span >= 10.0 {
        0
    } else if span >= 1.0 {
        1
    } else {
        (-(span.log10().floor()) as usize) + 1
    };
    format!("{value:.decimals$}")
}

fn padded(lo: f64, hi: f64) -> (f64, f64) {
    let pad = (hi - lo).abs() * 0.05;
    (lo - pad, hi + pad)
}

fn min_max(values: impl IntoIterator<Item = f64>) -> Option<(f64, f64)> {
    values.into_iter().fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Overlaid age histograms, one semi-transparent layer per (sex, environment) group.
pub fn render_age_histograms(
    groups: &BTreeMap<(Sex, Environment), Vec<f64>>,
    bins: usize,
) -> Result<String, FigureError> {
    if groups.is_empty() {
        return Err(FigureError::NoData("no samples to histogram"));
    }
    let histograms = groups
        .iter()
        .map(|((sex, environment), ages)| {
            Histogram::from_values(ages, bins).map(|hist| (format!("{sex} - {environment}"), hist))
        })
        .collect::<Result<Vec<_>, HistogramError>>()?;

    let x_range = min_max(histograms.iter().flat_map(|(_, h)| h.edges.iter().copied()))
        .ok_or(FigureError::NoData("no histogram edges"))?;
    let y_max = histograms.iter().map(|(_, h)| h.max_count()).max().unwrap_or(0) as f64;

    let mut canvas = SvgCanvas::new(720.0, 480.0);
    let axes = Axes::new(80.0, 30.0, 610.0, 380.0, x_range, (0.0, (y_max * 1.05).max(1.0)));

    let mut legend = Vec::with_capacity(histograms.len());
    for (i, (label, hist)) in histograms.iter().enumerate() {
        let style = Style::filled(PALETTE[i % PALETTE.len()], 0.5);
        for (count, edge) in hist.counts.iter().zip(hist.edges.windows(2)) {
            if *count == 0 {
                continue;
            }
            let x0 = axes.map_x(edge[0]);
            let x1 = axes.map_x(edge[1]);
            let y = axes.map_y(*count as f64);
            canvas.rect(x0, y, x1 - x0, axes.bottom() - y, &style);
        }
        legend.push((label.clone(), style));
    }
    axes.draw_frame(&mut canvas, "age_years", "Frequency");
    axes.draw_legend(&mut canvas, &legend);
    Ok(canvas.render())
}

/// Three stacked scatter plots of age against each methylation marker.
pub fn render_marker_scatter(samples: &[BearSample]) -> Result<String, FigureError> {
    if samples.is_empty() {
        return Err(FigureError::NoData("no samples to scatter"));
    }
    let colors = [Color::RED, Color::BLUE, Color::GREEN];
    let (age_lo, age_hi) = min_max(samples.iter().map(|s| s.age_years))
        .ok_or(FigureError::NoData("no ages"))?;
    let x_range = padded(age_lo, age_hi);

    let row_height = 380.0;
    let mut canvas = SvgCanvas::new(720.0, 60.0 + row_height * Marker::ALL.len() as f64);
    for (row, (marker, color)) in Marker::ALL.iter().zip(colors).enumerate() {
        let (lo, hi) = min_max(samples.iter().map(|s| s.methylation(*marker)))
            .ok_or(FigureError::NoData("no methylation values"))?;
        let top = 30.0 + row_height * row as f64;
        let axes = Axes::new(90.0, top, 600.0, row_height - 90.0, x_range, padded(lo, hi));

        let style = Style::filled(color, 0.8);
        for sample in samples {
            canvas.circle(
                axes.map_x(sample.age_years),
                axes.map_y(sample.methylation(*marker)),
                3.0,
                &style,
            );
        }
        let x_label = if row + 1 == Marker::ALL.len() {
            "age years"
        } else {
            ""
        };
        axes.draw_frame(&mut canvas, x_label, "Methylation");
        axes.draw_legend(&mut canvas, &[(marker.column().to_string(), style)]);
    }
    Ok(canvas.render())
}

/// One density panel per parameter with the mean and the highest-density interval.
pub fn render_posterior(summary: &PosteriorSummary, trace: &Trace) -> Result<String, FigureError> {
    if summary.parameters.is_empty() || trace.total_draws() == 0 {
        return Err(FigureError::NoData("no posterior draws"));
    }
    let panel_width = 340.0;
    let mut canvas = SvgCanvas::new(panel_width * summary.parameters.len() as f64, 320.0);
    let hdi_percent = (summary.hdi_prob * 100.0).round();

    for (column, parameter) in summary.parameters.iter().enumerate() {
        let Some(index) = trace.parameter_index(&parameter.name) else {
            continue;
        };
        let draws = trace.pooled(index);
        let hist = Histogram::from_values(&draws, POSTERIOR_BINS)?;
        let densities = hist.densities();
        let y_max = densities.iter().copied().fold(0.0, f64::max);

        let left = panel_width * column as f64 + 30.0;
        let axes = Axes::new(
            left,
            50.0,
            panel_width - 60.0,
            200.0,
            (hist.edges[0], hist.edges[hist.edges.len() - 1]),
            (0.0, y_max * 1.1),
        );

        let outline: Vec<(f64, f64)> = densities
            .iter()
            .zip(hist.edges.windows(2))
            .flat_map(|(density, edge)| {
                let y = axes.map_y(*density);
                [(axes.map_x(edge[0]), y), (axes.map_x(edge[1]), y)]
            })
            .collect();
        canvas.polyline(&outline, &Style::stroked(Color::BLUE, 1.6));

        let hdi_y = axes.bottom() - 8.0;
        canvas.line(
            axes.map_x(parameter.hdi_low),
            hdi_y,
            axes.map_x(parameter.hdi_high),
            hdi_y,
            &Style::stroked(Color::BLACK, 4.0),
        );
        canvas.text(
            axes.map_x(parameter.hdi_low),
            hdi_y - 8.0,
            &format!("{:.3}", parameter.hdi_low),
            10.0,
            Anchor::Middle,
        );
        canvas.text(
            axes.map_x(parameter.hdi_high),
            hdi_y - 8.0,
            &format!("{:.3}", parameter.hdi_high),
            10.0,
            Anchor::Middle,
        );
        canvas.text(
            (axes.map_x(parameter.hdi_low) + axes.map_x(parameter.hdi_high)) / 2.0,
            hdi_y - 22.0,
            &format!("{hdi_percent:.0}% HDI"),
            11.0,
            Anchor::Middle,
        );
        canvas.text(
            axes.map_x(parameter.mean),
            axes.top + 20.0,
            &format!("mean={:.3}", parameter.mean),
            12.0,
            Anchor::Middle,
        );
        canvas.text(left + (panel_width - 60.0) / 2.0, 30.0, &parameter.name, 15.0, Anchor::Middle);

        let tick = Style::stroked(Color::BLACK, 0.8);
        canvas.line(axes.left, axes.bottom(), axes.left + axes.width, axes.bottom(), &tick);
        for x in nice_ticks(axes.x_range.0, axes.x_range.1, 4) {
            let px = axes.map_x(x);
            canvas.line(px, axes.bottom(), px, axes.bottom() + 5.0, &tick);
            canvas.text(px, axes.bottom() + 18.0, &format_tick(x, axes.x_range), 11.0, Anchor::Middle);
        }
    }
    Ok(canvas.render())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::summarize;
    use chrono::NaiveDate;
    use ndarray::Array2;

    fn sample(age: f64, scgn: f64, sex: Sex, environment: Environment) -> BearSample {
        let birth = NaiveDate::from_ymd_opt(2000, 2, 1).unwrap();
        BearSample {
            sample_id: "B Sapporo".to_string(),
            birth,
            sampling_date: birth,
            age_years: age,
            sex,
            environment,
            slc12a5: 0.1 * age,
            vgf: 0.2,
            scgn,
            sampling_place: "Sapporo".to_string(),
        }
    }

    #[test]
    fn ticks_fall_on_round_numbers() {
        assert_eq!(nice_ticks(0.0, 10.0, 5), vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
        assert_eq!(nice_ticks(3.0, 3.0, 5), vec![3.0]);
    }

    #[test]
    fn text_is_escaped() {
        let mut canvas = SvgCanvas::new(10.0, 10.0);
        canvas.text(1.0, 1.0, "F & M <wild>", 10.0, Anchor::Start);
        let svg = canvas.render();
        assert!(svg.contains("F &amp; M &lt;wild&gt;"));
        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn written_svg_matches_rendered_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.svg");
        let mut canvas = SvgCanvas::new(20.0, 20.0);
        canvas.line(0.0, 0.0, 20.0, 20.0, &Style::stroked(Color::BLACK, 1.0));
        write_svg(&path, &canvas.render()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), canvas.render());
    }

    #[test]
    fn histogram_figure_has_one_legend_entry_per_group() {
        let mut groups = BTreeMap::new();
        groups.insert((Sex::Female, Environment::Wild), vec![1.0, 2.0, 3.5]);
        groups.insert((Sex::Male, Environment::Captive), vec![4.0, 8.0]);
        let svg = render_age_histograms(&groups, 30).unwrap();
        assert!(svg.contains("F - wild"));
        assert!(svg.contains("M - captive"));
        assert!(svg.contains("opacity=\"0.50\""));
    }

    #[test]
    fn scatter_figure_labels_every_marker() {
        let samples = vec![
            sample(1.0, 0.3, Sex::Female, Environment::Wild),
            sample(9.0, 0.7, Sex::Male, Environment::Captive),
        ];
        let svg = render_marker_scatter(&samples).unwrap();
        for marker in Marker::ALL {
            assert!(svg.contains(marker.column()));
        }
        assert_eq!(svg.matches("<circle").count(), 6);
        assert_eq!(svg.matches(">age years<").count(), 1);
        assert_eq!(svg.matches(">Methylation<").count(), 3);
    }

    #[test]
    fn empty_inputs_are_rejected() {
        assert!(matches!(
            render_marker_scatter(&[]),
            Err(FigureError::NoData(_))
        ));
        assert!(matches!(
            render_age_histograms(&BTreeMap::new(), 30),
            Err(FigureError::NoData(_))
        ));
    }

    #[test]
    fn posterior_figure_shows_every_parameter() {
        let draws = Array2::from_shape_fn((100, 2), |(i, j)| (i as f64 / 100.0) + j as f64);
        let trace = Trace {
            parameter_names: vec!["alpha".to_string(), "beta".to_string()],
            chains: vec![draws],
            run_stats: None,
        };
        let summary = summarize(&trace, 0.94);
        let svg = render_posterior(&summary, &trace).unwrap();
        assert!(svg.contains(">alpha<"));
        assert!(svg.contains(">beta<"));
        assert_eq!(svg.matches("94% HDI").count(), 2);
    }
}

//! Chart export to PNG (plotters bitmap) and SVG (plotters svg).
//!
//! Panels are laid out on a near-square grid, one chart per cell.

use color_eyre::eyre::eyre;
use color_eyre::Result;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::f64::consts::PI;
use std::path::Path;

use crate::chart_data::{truncate_label, AggregatedResult, ChartPanel, DatasetSummary};
use crate::config::{AppConfig, ColorParser};
use crate::recommend::{ChartChoice, ChartKind, GroupedChartKind};
use crate::statistics::{BoxSummary, GroupStats, HistogramBin, ScatterSeries};
use crate::survival::{SurvivalAnalysis, SurvivalCurve};
use crate::value::format_number;
use biostudio_cli::ExportFormat;

/// Image size, label truncation and series palette for export.
#[derive(Debug, Clone)]
pub struct ChartExportOptions {
    pub width: u32,
    pub height: u32,
    pub label_max_len: usize,
    pub palette: Vec<RGBColor>,
}

impl ChartExportOptions {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let parser = ColorParser::true_color();
        let palette = config
            .theme
            .series
            .iter()
            .map(|c| parser.parse(c).map(to_rgb))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            width: config.charts.export_width,
            height: config.charts.export_height,
            label_max_len: config.charts.label_max_len,
            palette,
        })
    }

    fn color(&self, index: usize) -> RGBColor {
        if self.palette.is_empty() {
            return BLUE;
        }
        self.palette[index % self.palette.len()]
    }
}

/// Terminal color to an RGB color that reads on a white background.
pub fn to_rgb(color: ratatui::style::Color) -> RGBColor {
    use ratatui::style::Color as C;
    match color {
        C::Rgb(r, g, b) => RGBColor(r, g, b),
        C::Red | C::LightRed => RED,
        C::Green | C::LightGreen => RGBColor(0, 150, 0),
        C::Yellow | C::LightYellow => RGBColor(200, 160, 0),
        C::Blue | C::LightBlue => BLUE,
        C::Magenta | C::LightMagenta => MAGENTA,
        C::Cyan | C::LightCyan => RGBColor(0, 160, 190),
        C::Black | C::Reset => BLACK,
        _ => RGBColor(110, 110, 110),
    }
}

/// Rows and columns of the panel grid.
pub fn grid_shape(panels: usize) -> (usize, usize) {
    if panels == 0 {
        return (0, 0);
    }
    let cols = (panels as f64).sqrt().ceil() as usize;
    (panels.div_ceil(cols), cols)
}

fn plot_err<E: std::fmt::Display>(e: E) -> color_eyre::Report {
    eyre!("Chart rendering failed: {}", e)
}

/// Write the panels to `path` as PNG or SVG.
pub fn export_panels(
    path: &Path,
    format: ExportFormat,
    panels: &[ChartPanel],
    options: &ChartExportOptions,
) -> Result<()> {
    if panels.is_empty() {
        return Err(eyre!("No charts to export"));
    }
    let size = (options.width, options.height);
    match format {
        ExportFormat::Png => {
            draw_panels(&BitMapBackend::new(path, size).into_drawing_area(), panels, options)
        }
        ExportFormat::Svg => {
            draw_panels(&SVGBackend::new(path, size).into_drawing_area(), panels, options)
        }
    }
}

fn draw_panels<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    panels: &[ChartPanel],
    options: &ChartExportOptions,
) -> Result<()> {
    root.fill(&WHITE).map_err(plot_err)?;
    let (rows, cols) = grid_shape(panels.len());
    for (panel, area) in panels.iter().zip(root.split_evenly((rows, cols))) {
        draw_panel(&area, panel, options)?;
    }
    root.present().map_err(plot_err)?;
    Ok(())
}

fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &ChartPanel,
    options: &ChartExportOptions,
) -> Result<()> {
    let area = area.margin(8, 8, 8, 8);
    let area = area
        .titled(&panel.title, ("sans-serif", 18))
        .map_err(plot_err)?;
    let x_desc = panel.x_label.as_str();
    let y_desc = panel.y_label.as_str();

    match &panel.data {
        AggregatedResult::Frequency(table) => {
            let labels: Vec<String> = table.entries.iter().map(|e| e.value.to_string()).collect();
            let counts: Vec<f64> = table.entries.iter().map(|e| e.count as f64).collect();
            if panel.recommendation.chart == ChartChoice::Field(ChartKind::Pie) {
                draw_pie(&area, &labels, &counts, options)
            } else {
                draw_bars(&area, &labels, &counts, None, x_desc, y_desc, options)
            }
        }
        AggregatedResult::GroupMeans(means) => {
            let labels: Vec<String> = means
                .iter()
                .map(|m| format!("{} (n={})", m.group, m.count))
                .collect();
            let values: Vec<f64> = means.iter().map(|m| m.mean).collect();
            let errors: Vec<f64> = means.iter().map(|m| m.standard_error).collect();
            draw_bars(&area, &labels, &values, Some(&errors), x_desc, y_desc, options)
        }
        AggregatedResult::GroupedStats { stats, total } => {
            draw_lines(&area, &stats_table_lines(stats, *total))
        }
        AggregatedResult::BoxPlot(boxes) => {
            let violin =
                panel.recommendation.chart == ChartChoice::Grouped(GroupedChartKind::Violin);
            draw_boxes(&area, boxes, violin, x_desc, y_desc, options)
        }
        AggregatedResult::Histogram(bins) => draw_histogram(
            &area,
            &[(panel.title.clone(), bins.as_slice())],
            x_desc,
            y_desc,
            options,
        ),
        AggregatedResult::GroupedHistogram(grouped) => {
            let series: Vec<(String, &[HistogramBin])> = grouped
                .series
                .iter()
                .map(|(g, bins)| (g.clone(), bins.as_slice()))
                .collect();
            draw_histogram(&area, &series, x_desc, y_desc, options)
        }
        AggregatedResult::Scatter(series) => draw_scatter(&area, series, x_desc, y_desc, options),
        AggregatedResult::Survival(analysis) => {
            draw_survival(&area, analysis, x_desc, y_desc, options)
        }
        AggregatedResult::DistinctCount { distinct, rows } => draw_lines(
            &area,
            &[format!("{distinct} distinct values in {rows} loaded rows")],
        ),
        AggregatedResult::Summary(summary) => draw_lines(&area, &summary_lines(summary)),
        AggregatedResult::Empty(reason) => draw_lines(&area, &[reason.to_string()]),
    }
}

/// Plain text, one line per row, from the top-left corner.
fn draw_lines<DB: DrawingBackend>(area: &DrawingArea<DB, Shift>, lines: &[String]) -> Result<()> {
    let style = ("sans-serif", 14).into_font().color(&RGBColor(60, 60, 60));
    let (_, height) = area.dim_in_pixel();
    for (i, line) in lines.iter().enumerate() {
        let y = 20 + i as i32 * 18;
        if y > height as i32 {
            break;
        }
        area.draw(&Text::new(line.clone(), (10, y), style.clone()))
            .map_err(plot_err)?;
    }
    Ok(())
}

pub(crate) fn stats_table_lines(stats: &[GroupStats], total: usize) -> Vec<String> {
    let mut lines = vec!["Group | Count | Freq (%) | Mean | Median | Min | Max | Std".to_string()];
    lines.extend(stats.iter().map(|s| {
        format!(
            "{} | {} | {:.1} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2}",
            s.group,
            s.count,
            s.percent_of(total),
            s.mean,
            s.median,
            s.min,
            s.max,
            s.std
        )
    }));
    lines
}

pub(crate) fn summary_lines(summary: &DatasetSummary) -> Vec<String> {
    let mut lines = vec![
        format!("Total rows: {}", summary.total),
        format!("Loaded rows: {}", summary.loaded),
        format!("Fields: {}", summary.fields),
    ];
    if !summary.missing.is_empty() {
        lines.push("Missing values:".to_string());
        lines.extend(
            summary
                .missing
                .iter()
                .map(|(key, n)| format!("  {key}: {n}")),
        );
    }
    lines
}

fn draw_pie<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    labels: &[String],
    values: &[f64],
    options: &ChartExportOptions,
) -> Result<()> {
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return draw_lines(area, &["No data".to_string()]);
    }
    let (w, h) = area.dim_in_pixel();
    let center = (w as i32 / 2, h as i32 / 2);
    let radius = w.min(h) as f64 * 0.35;
    let label_style = ("sans-serif", 12).into_font().color(&BLACK);

    let mut start = -PI / 2.0;
    for (i, (label, value)) in labels.iter().zip(values).enumerate() {
        let sweep = value / total * 2.0 * PI;
        let steps = ((sweep / 0.05).ceil() as usize).max(2);
        let mut points = vec![center];
        points.extend((0..=steps).map(|s| {
            let a = start + sweep * s as f64 / steps as f64;
            (
                center.0 + (radius * a.cos()) as i32,
                center.1 + (radius * a.sin()) as i32,
            )
        }));
        area.draw(&Polygon::new(points, options.color(i).filled()))
            .map_err(plot_err)?;

        let mid = start + sweep / 2.0;
        let text = format!(
            "{} ({:.1}%)",
            truncate_label(label, options.label_max_len),
            value / total * 100.0
        );
        let pos = (
            center.0 + (radius * 1.15 * mid.cos()) as i32,
            center.1 + (radius * 1.15 * mid.sin()) as i32,
        );
        area.draw(&Text::new(text, pos, label_style.clone()))
            .map_err(plot_err)?;
        start += sweep;
    }
    Ok(())
}

/// Categorical axis label at integer positions; blank between categories.
fn category_label(labels: &[String], x: f64) -> String {
    if (x - x.round()).abs() > 1e-6 || x < 0.0 {
        return String::new();
    }
    labels.get(x.round() as usize).cloned().unwrap_or_default()
}

fn draw_bars<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    labels: &[String],
    values: &[f64],
    errors: Option<&[f64]>,
    x_desc: &str,
    y_desc: &str,
    options: &ChartExportOptions,
) -> Result<()> {
    let err = |i: usize| errors.and_then(|e| e.get(i)).copied().unwrap_or(0.0);
    let top = values
        .iter()
        .enumerate()
        .map(|(i, v)| v + err(i))
        .fold(0.0, f64::max);
    let y_max = if top > 0.0 { top * 1.1 } else { 1.0 };
    let n = labels.len().max(1);
    let short: Vec<String> = labels
        .iter()
        .map(|l| truncate_label(l, options.label_max_len))
        .collect();

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(-0.5..(n as f64 - 0.5), 0.0..y_max)
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n)
        .x_label_formatter(&|x| category_label(&short, *x))
        .x_desc(x_desc)
        .y_desc(y_desc)
        .draw()
        .map_err(plot_err)?;

    for (i, v) in values.iter().enumerate() {
        let x = i as f64;
        let color = options.color(i);
        chart
            .draw_series(std::iter::once(Rectangle::new(
                [(x - 0.4, 0.0), (x + 0.4, *v)],
                color.filled(),
            )))
            .map_err(plot_err)?;
        let e = err(i);
        if e > 0.0 {
            chart
                .draw_series([
                    PathElement::new(vec![(x, v - e), (x, v + e)], BLACK),
                    PathElement::new(vec![(x - 0.1, v + e), (x + 0.1, v + e)], BLACK),
                    PathElement::new(vec![(x - 0.1, v - e), (x + 0.1, v - e)], BLACK),
                ])
                .map_err(plot_err)?;
        }
    }
    Ok(())
}

fn draw_boxes<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    boxes: &[BoxSummary],
    violin: bool,
    x_desc: &str,
    y_desc: &str,
    options: &ChartExportOptions,
) -> Result<()> {
    let lo = boxes
        .iter()
        .flat_map(|b| std::iter::once(b.min).chain(b.outliers.iter().copied()))
        .fold(f64::INFINITY, f64::min);
    let hi = boxes
        .iter()
        .flat_map(|b| std::iter::once(b.max).chain(b.outliers.iter().copied()))
        .fold(f64::NEG_INFINITY, f64::max);
    let (lo, hi) = padded_range(lo, hi);
    let labels: Vec<String> = boxes
        .iter()
        .map(|b| truncate_label(&b.group, options.label_max_len))
        .collect();
    let n = boxes.len().max(1);

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(-0.5..(n as f64 - 0.5), lo..hi)
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n)
        .x_label_formatter(&|x| category_label(&labels, *x))
        .x_desc(x_desc)
        .y_desc(y_desc)
        .draw()
        .map_err(plot_err)?;

    for (i, b) in boxes.iter().enumerate() {
        let x = i as f64;
        let color = options.color(i);
        if violin {
            // Outline through the quartiles, widest at the median.
            let outline = vec![
                (x, b.min),
                (x + 0.15, b.q1),
                (x + 0.35, b.median),
                (x + 0.15, b.q3),
                (x, b.max),
                (x - 0.15, b.q3),
                (x - 0.35, b.median),
                (x - 0.15, b.q1),
            ];
            chart
                .draw_series(std::iter::once(Polygon::new(outline, color.mix(0.4).filled())))
                .map_err(plot_err)?;
        } else {
            chart
                .draw_series([
                    Rectangle::new([(x - 0.3, b.q1), (x + 0.3, b.q3)], color.mix(0.3).filled()),
                    Rectangle::new([(x - 0.3, b.q1), (x + 0.3, b.q3)], color.stroke_width(1)),
                ])
                .map_err(plot_err)?;
            chart
                .draw_series([
                    PathElement::new(vec![(x, b.q3), (x, b.upper_whisker)], color),
                    PathElement::new(vec![(x, b.q1), (x, b.lower_whisker)], color),
                    PathElement::new(
                        vec![(x - 0.1, b.upper_whisker), (x + 0.1, b.upper_whisker)],
                        color,
                    ),
                    PathElement::new(
                        vec![(x - 0.1, b.lower_whisker), (x + 0.1, b.lower_whisker)],
                        color,
                    ),
                ])
                .map_err(plot_err)?;
            chart
                .draw_series(b.outliers.iter().map(|o| Circle::new((x, *o), 3, color.filled())))
                .map_err(plot_err)?;
        }
        chart
            .draw_series(std::iter::once(PathElement::new(
                vec![(x - 0.3, b.median), (x + 0.3, b.median)],
                BLACK.stroke_width(2),
            )))
            .map_err(plot_err)?;
    }
    Ok(())
}

fn padded_range(lo: f64, hi: f64) -> (f64, f64) {
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if hi <= lo {
        return (lo - 0.5, hi + 0.5);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}

fn draw_histogram<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    series: &[(String, &[HistogramBin])],
    x_desc: &str,
    y_desc: &str,
    options: &ChartExportOptions,
) -> Result<()> {
    let bins = || series.iter().flat_map(|(_, b)| b.iter());
    let lo = bins().map(|b| b.start).fold(f64::INFINITY, f64::min);
    let hi = bins().map(|b| b.end).fold(f64::NEG_INFINITY, f64::max);
    let (lo, hi) = padded_range(lo, hi);
    let top = bins().map(|b| b.count).max().unwrap_or(0).max(1) as f64 * 1.1;

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(lo..hi, 0.0..top)
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc(y_desc)
        .draw()
        .map_err(plot_err)?;

    let alpha = if series.len() > 1 { 0.5 } else { 0.9 };
    for (i, (name, bins)) in series.iter().enumerate() {
        let color = options.color(i);
        let drawn = chart
            .draw_series(bins.iter().map(|b| {
                let (start, end) = if b.end > b.start {
                    (b.start, b.end)
                } else {
                    (b.start - 0.5, b.end + 0.5)
                };
                Rectangle::new([(start, 0.0), (end, b.count as f64)], color.mix(alpha).filled())
            }))
            .map_err(plot_err)?;
        if series.len() > 1 {
            drawn
                .label(truncate_label(name, options.label_max_len))
                .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
        }
    }
    if series.len() > 1 {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(plot_err)?;
    }
    Ok(())
}

fn draw_scatter<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    series: &[ScatterSeries],
    x_desc: &str,
    y_desc: &str,
    options: &ChartExportOptions,
) -> Result<()> {
    let points = || series.iter().flat_map(|s| s.points.iter());
    let (x_lo, x_hi) = padded_range(
        points().map(|p| p.0).fold(f64::INFINITY, f64::min),
        points().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max),
    );
    let (y_lo, y_hi) = padded_range(
        points().map(|p| p.1).fold(f64::INFINITY, f64::min),
        points().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max),
    );

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc(y_desc)
        .draw()
        .map_err(plot_err)?;

    let legend = series.iter().any(|s| s.group.is_some());
    for (i, s) in series.iter().enumerate() {
        let color = options.color(i);
        let drawn = chart
            .draw_series(
                s.points
                    .iter()
                    .map(|&p| Circle::new(p, 3, color.mix(0.7).filled())),
            )
            .map_err(plot_err)?;
        if let Some(group) = &s.group {
            drawn
                .label(truncate_label(group, options.label_max_len))
                .legend(move |(x, y)| Circle::new((x + 5, y), 3, color.filled()));
        }
    }
    if legend {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(plot_err)?;
    }
    Ok(())
}

/// Staircase vertices for a survival curve: horizontal to each time, then down.
pub fn step_points(curve: &SurvivalCurve) -> Vec<(f64, f64)> {
    let mut out = Vec::with_capacity(curve.points.len() * 2);
    let mut prev = match curve.points.first() {
        Some(p) => p.survival,
        None => return out,
    };
    for p in &curve.points {
        out.push((p.time, prev));
        if p.survival != prev {
            out.push((p.time, p.survival));
        }
        prev = p.survival;
    }
    out
}

fn draw_survival<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    analysis: &SurvivalAnalysis,
    x_desc: &str,
    y_desc: &str,
    options: &ChartExportOptions,
) -> Result<()> {
    let t_max = analysis
        .curves
        .iter()
        .flat_map(|c| c.points.iter().map(|p| p.time))
        .fold(0.0, f64::max);
    let t_max = if t_max > 0.0 { t_max * 1.05 } else { 1.0 };

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0..t_max, 0.0..1.05)
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc(y_desc)
        .y_label_formatter(&|y: &f64| format_number((y * 100.0).round() / 100.0))
        .draw()
        .map_err(plot_err)?;

    for (i, curve) in analysis.curves.iter().enumerate() {
        let color = options.color(i);
        chart
            .draw_series(LineSeries::new(step_points(curve), color.stroke_width(2)))
            .map_err(plot_err)?
            .label(curve.name.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        // Censored observations
        chart
            .draw_series(
                curve
                    .points
                    .iter()
                    .skip(1)
                    .filter(|p| p.event == 0)
                    .map(|p| Cross::new((p.time, p.survival), 4, color)),
            )
            .map_err(plot_err)?;
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survival::SurvivalPoint;

    fn point(time: f64, survival: f64, event: u8) -> SurvivalPoint {
        SurvivalPoint {
            time,
            survival,
            event,
            at_risk: 0,
            label: None,
        }
    }

    #[test]
    fn test_grid_shape() {
        assert_eq!(grid_shape(0), (0, 0));
        assert_eq!(grid_shape(1), (1, 1));
        assert_eq!(grid_shape(3), (2, 2));
        assert_eq!(grid_shape(5), (2, 3));
        assert_eq!(grid_shape(9), (3, 3));
    }

    #[test]
    fn test_step_points() {
        let curve = SurvivalCurve {
            name: "All (n=3)".into(),
            group: "All".into(),
            n: 3,
            points: vec![point(0.0, 1.0, 0), point(5.0, 0.5, 1), point(10.0, 0.5, 0)],
        };
        assert_eq!(
            step_points(&curve),
            vec![(0.0, 1.0), (5.0, 1.0), (5.0, 0.5), (10.0, 0.5)]
        );
    }

    #[test]
    fn test_palette_from_config() -> Result<()> {
        let options = ChartExportOptions::from_config(&AppConfig::default())?;
        assert_eq!(options.palette.len(), 8);
        assert_eq!(options.color(0), RGBColor(0x1f, 0x77, 0xb4));
        assert_eq!(options.color(9), options.color(1));
        assert_eq!((options.width, options.height), (1024, 768));
        Ok(())
    }

    #[test]
    fn test_export_without_panels_fails() {
        let dir = tempfile::tempdir().unwrap();
        let options = ChartExportOptions::from_config(&AppConfig::default()).unwrap();
        let err = export_panels(&dir.path().join("x.svg"), ExportFormat::Svg, &[], &options)
            .unwrap_err();
        assert_eq!(err.to_string(), "No charts to export");
    }

    #[test]
    fn test_category_labels_only_on_integers() {
        let labels = vec!["A".to_string(), "B".to_string()];
        assert_eq!(category_label(&labels, 1.0), "B");
        assert_eq!(category_label(&labels, 0.5), "");
        assert_eq!(category_label(&labels, 2.0), "");
        assert_eq!(category_label(&labels, -1.0), "");
    }

    #[test]
    fn test_summary_lines() {
        let lines = summary_lines(&DatasetSummary {
            total: 10,
            loaded: 4,
            fields: 3,
            missing: vec![("age".into(), 2)],
        });
        assert_eq!(lines[0], "Total rows: 10");
        assert_eq!(lines.last().map(String::as_str), Some("  age: 2"));
    }
}

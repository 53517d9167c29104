//! Terminal rendering of chart panels.
//!
//! Pie, box and violin charts have no ratatui widget, so they are drawn as styled text.

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Rect},
    style::{Style, Stylize},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, Bar, BarChart, BarGroup, Block, Borders, Cell, Chart, Dataset, GraphType,
        LegendPosition, Paragraph, Row, Table, Widget, Wrap,
    },
};

use crate::chart_data::{truncate_label, AggregatedResult, ChartPanel};
use crate::chart_export::{step_points, summary_lines};
use crate::config::Theme;
use crate::recommend::{ChartChoice, ChartKind, GroupedChartKind};
use crate::statistics::{BoxSummary, FrequencyTable, GroupMean, GroupStats, HistogramBin};
use crate::value::format_number;

/// Renders one panel inside a bordered block titled with the panel and chart names.
pub fn render_panel(
    area: Rect,
    buf: &mut Buffer,
    panel: &ChartPanel,
    theme: &Theme,
    label_max_len: usize,
    focused: bool,
) {
    let border = if focused {
        theme.get("panel_border_active")
    } else {
        theme.get("panel_border")
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(Line::from(vec![
            Span::styled(format!(" {} ", panel.title), Style::default().bold()),
            Span::styled(
                format!("[{}] ", panel.recommendation.chart),
                Style::default().fg(theme.get("text_secondary")),
            ),
        ]));
    let inner = block.inner(area);
    block.render(area, buf);
    if inner.width == 0 || inner.height == 0 {
        return;
    }

    match &panel.data {
        AggregatedResult::Frequency(table) => match panel.recommendation.chart {
            ChartChoice::Field(ChartKind::Pie) => {
                render_pie(inner, buf, table, theme, label_max_len)
            }
            ChartChoice::Field(ChartKind::Table) => render_frequency_table(inner, buf, table, theme),
            _ => {
                let bars: Vec<(String, u64, String)> = table
                    .entries
                    .iter()
                    .map(|e| (e.value.to_string(), e.count as u64, e.count.to_string()))
                    .collect();
                render_bars(inner, buf, &bars, theme, label_max_len)
            }
        },
        AggregatedResult::GroupedStats { stats, total } => {
            render_stats_table(inner, buf, stats, *total, theme)
        }
        AggregatedResult::GroupMeans(means) => {
            render_bars(inner, buf, &mean_bars(means), theme, label_max_len)
        }
        AggregatedResult::Histogram(bins) => {
            let bars: Vec<(String, u64, String)> = bins
                .iter()
                .map(|b| (format_axis_label(b.start), b.count as u64, b.count.to_string()))
                .collect();
            render_bars(inner, buf, &bars, theme, label_max_len)
        }
        AggregatedResult::GroupedHistogram(grouped) => {
            let series: Vec<(String, Vec<(f64, f64)>)> = grouped
                .series
                .iter()
                .map(|(group, bins)| (group.clone(), bin_midpoints(bins)))
                .collect();
            render_xy(inner, buf, panel, &series, GraphType::Line, theme, label_max_len)
        }
        AggregatedResult::BoxPlot(boxes) => {
            let violin =
                panel.recommendation.chart == ChartChoice::Grouped(GroupedChartKind::Violin);
            render_boxes(inner, buf, boxes, violin, theme, label_max_len)
        }
        AggregatedResult::Scatter(series) => {
            let series: Vec<(String, Vec<(f64, f64)>)> = series
                .iter()
                .map(|s| {
                    let name = s.group.clone().unwrap_or_else(|| panel.y_label.clone());
                    (name, s.points.clone())
                })
                .collect();
            render_xy(inner, buf, panel, &series, GraphType::Scatter, theme, label_max_len)
        }
        AggregatedResult::Survival(analysis) => {
            let series: Vec<(String, Vec<(f64, f64)>)> = analysis
                .curves
                .iter()
                .map(|c| (c.name.clone(), step_points(c)))
                .collect();
            render_xy(inner, buf, panel, &series, GraphType::Line, theme, label_max_len)
        }
        AggregatedResult::DistinctCount { distinct, rows } => render_message(
            inner,
            buf,
            vec![Line::from(vec![
                Span::styled(distinct.to_string(), Style::default().bold()),
                Span::raw(format!(" distinct values in {rows} loaded rows")),
            ])],
            theme,
        ),
        AggregatedResult::Summary(summary) => render_message(
            inner,
            buf,
            summary_lines(summary).into_iter().map(Line::from).collect(),
            theme,
        ),
        AggregatedResult::Empty(reason) => {
            Paragraph::new(reason.to_string())
                .style(Style::default().fg(theme.get("text_secondary")))
                .wrap(Wrap { trim: true })
                .centered()
                .render(inner, buf);
        }
    }
}

fn render_message(area: Rect, buf: &mut Buffer, lines: Vec<Line<'_>>, theme: &Theme) {
    Paragraph::new(lines)
        .style(Style::default().fg(theme.get("text_primary")))
        .wrap(Wrap { trim: false })
        .render(area, buf);
}

/// Legend-style pie: one colored line per slice with its share.
fn render_pie(
    area: Rect,
    buf: &mut Buffer,
    table: &FrequencyTable,
    theme: &Theme,
    label_max_len: usize,
) {
    let total = table.counted();
    if total == 0 {
        render_message(area, buf, vec![Line::from("No data")], theme);
        return;
    }
    let label_room = u16::try_from(label_max_len).unwrap_or(u16::MAX).saturating_add(16);
    let bar_room = area.width.saturating_sub(label_room) as usize;
    let lines: Vec<Line> = table
        .entries
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let share = e.count as f64 / total as f64;
            let color = theme.series_color(i);
            let filled = (share * bar_room as f64).round() as usize;
            Line::from(vec![
                Span::styled("■ ", Style::default().fg(color)),
                Span::raw(format!(
                    "{:<width$} ",
                    truncate_label(&e.value.to_string(), label_max_len),
                    width = label_max_len + 1
                )),
                Span::styled("█".repeat(filled), Style::default().fg(color)),
                Span::raw(format!(" {:.1}%", share * 100.0)),
            ])
        })
        .collect();
    render_message(area, buf, lines, theme);
}

fn render_frequency_table(area: Rect, buf: &mut Buffer, table: &FrequencyTable, theme: &Theme) {
    let total = table.counted().max(1) as f64;
    let header = Row::new(["Value", "Count", "Percent"])
        .style(Style::default().fg(theme.get("primary")).bold());
    let rows = table.entries.iter().map(|e| {
        Row::new(vec![
            Cell::from(e.value.to_string()),
            Cell::from(e.count.to_string()),
            Cell::from(format!("{:.1}%", e.count as f64 / total * 100.0)),
        ])
    });
    Table::new(
        rows,
        [
            Constraint::Fill(1),
            Constraint::Length(8),
            Constraint::Length(8),
        ],
    )
    .header(header)
    .style(Style::default().fg(theme.get("text_primary")))
    .render(area, buf);
}

fn render_stats_table(
    area: Rect,
    buf: &mut Buffer,
    stats: &[GroupStats],
    total: usize,
    theme: &Theme,
) {
    let header = Row::new([
        "Group", "Count", "Freq (%)", "Mean", "Median", "Min", "Max", "Std",
    ])
    .style(Style::default().fg(theme.get("primary")).bold());
    let rows = stats.iter().map(|s| {
        Row::new(vec![
            s.group.clone(),
            s.count.to_string(),
            format!("{:.1}", s.percent_of(total)),
            format!("{:.2}", s.mean),
            format!("{:.2}", s.median),
            format!("{:.2}", s.min),
            format!("{:.2}", s.max),
            format!("{:.2}", s.std),
        ])
    });
    let mut widths = vec![Constraint::Fill(1)];
    widths.extend([Constraint::Length(9); 7]);
    Table::new(rows, widths)
        .header(header)
        .style(Style::default().fg(theme.get("text_primary")))
        .render(area, buf);
}

/// Bars scaled by 100 so means keep two decimals of height; labels carry the real value.
fn mean_bars(means: &[GroupMean]) -> Vec<(String, u64, String)> {
    means
        .iter()
        .map(|m| {
            let height = (m.mean.max(0.0) * 100.0).round() as u64;
            let text = format!(
                "{}±{}",
                format_number(m.mean),
                format_number(m.standard_error)
            );
            (format!("{} (n={})", m.group, m.count), height, text)
        })
        .collect()
}

/// Vertical bars from `(label, height, text)`; widths shrink to fit the area.
fn render_bars(
    area: Rect,
    buf: &mut Buffer,
    bars: &[(String, u64, String)],
    theme: &Theme,
    label_max_len: usize,
) {
    if bars.is_empty() {
        render_message(area, buf, vec![Line::from("No data")], theme);
        return;
    }
    let gap = 1u16;
    let count = u16::try_from(bars.len()).unwrap_or(u16::MAX).max(1);
    let slot = (area.width / count).max(1);
    let bar_width = slot.saturating_sub(gap).max(1);
    let data: Vec<Bar> = bars
        .iter()
        .enumerate()
        .map(|(i, (label, height, text))| {
            Bar::default()
                .value(*height)
                .label(Line::from(truncate_label(label, label_max_len)))
                .text_value(text.clone())
                .style(Style::default().fg(theme.series_color(i)))
                .value_style(Style::default().fg(theme.get("text_primary")).reversed())
        })
        .collect();
    BarChart::default()
        .bar_width(bar_width)
        .bar_gap(gap)
        .data(BarGroup::default().bars(&data))
        .render(area, buf);
}

fn bin_midpoints(bins: &[HistogramBin]) -> Vec<(f64, f64)> {
    bins.iter()
        .map(|b| ((b.start + b.end) / 2.0, b.count as f64))
        .collect()
}

/// Shared x/y chart for scatter, survival and grouped histogram panels.
fn render_xy(
    area: Rect,
    buf: &mut Buffer,
    panel: &ChartPanel,
    series: &[(String, Vec<(f64, f64)>)],
    graph_type: GraphType,
    theme: &Theme,
    label_max_len: usize,
) {
    let points = series.iter().flat_map(|(_, p)| p.iter());
    let (x_min, x_max, y_min, y_max) = points.fold(
        (
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
        ),
        |(a, b, c, d), &(x, y)| (a.min(x), b.max(x), c.min(y), d.max(y)),
    );
    if !x_min.is_finite() || !y_min.is_finite() {
        render_message(area, buf, vec![Line::from("No valid data points")], theme);
        return;
    }
    let (x_min, x_max) = widen(x_min, x_max);
    let (y_min, y_max) = if graph_type == GraphType::Scatter {
        widen(y_min, y_max)
    } else {
        widen(0.0f64.min(y_min), y_max)
    };

    let datasets: Vec<Dataset> = series
        .iter()
        .enumerate()
        .map(|(i, (name, points))| {
            Dataset::default()
                .name(truncate_label(name, label_max_len.max(12)))
                .marker(symbols::Marker::Braille)
                .graph_type(graph_type)
                .style(Style::default().fg(theme.series_color(i)))
                .data(points)
        })
        .collect();

    let label_style = Style::default().fg(theme.get("text_primary"));
    let labels = |lo: f64, hi: f64| {
        vec![
            Span::styled(format_axis_label(lo), label_style),
            Span::styled(format_axis_label((lo + hi) / 2.0), label_style),
            Span::styled(format_axis_label(hi), label_style),
        ]
    };
    let axis_style = Style::default().fg(theme.get("axis"));
    let x_axis = Axis::default()
        .title(panel.x_label.clone())
        .style(axis_style)
        .bounds([x_min, x_max])
        .labels(labels(x_min, x_max));
    let y_axis = Axis::default()
        .title(panel.y_label.clone())
        .style(axis_style)
        .bounds([y_min, y_max])
        .labels(labels(y_min, y_max));

    let legend = (series.len() > 1).then_some(LegendPosition::TopRight);
    Chart::new(datasets)
        .x_axis(x_axis)
        .y_axis(y_axis)
        .legend_position(legend)
        .render(area, buf);
}

fn widen(lo: f64, hi: f64) -> (f64, f64) {
    if hi > lo {
        (lo, hi)
    } else {
        (lo - 0.5, hi + 0.5)
    }
}

/// One text row per group, scaled to a shared value range, plus a range footer.
fn render_boxes(
    area: Rect,
    buf: &mut Buffer,
    boxes: &[BoxSummary],
    violin: bool,
    theme: &Theme,
    label_max_len: usize,
) {
    if boxes.is_empty() {
        render_message(area, buf, vec![Line::from("No data")], theme);
        return;
    }
    let lo = boxes
        .iter()
        .map(|b| b.min)
        .fold(f64::INFINITY, f64::min);
    let hi = boxes
        .iter()
        .map(|b| b.max)
        .fold(f64::NEG_INFINITY, f64::max);
    let label_width = boxes
        .iter()
        .map(|b| truncate_label(&b.group, label_max_len).chars().count())
        .max()
        .unwrap_or(0);
    let plot_width = (area.width as usize).saturating_sub(label_width + 1).max(3);
    let outlier_style = Style::default().fg(theme.get("outlier_marker"));

    let mut lines: Vec<Line> = boxes
        .iter()
        .enumerate()
        .map(|(i, b)| {
            let style = Style::default().fg(theme.series_color(i));
            let mut spans = vec![Span::raw(format!(
                "{:<label_width$} ",
                truncate_label(&b.group, label_max_len)
            ))];
            // Outliers get their own color, so split the row into runs.
            let row = box_line(b, lo, hi, plot_width, violin);
            let mut run = String::new();
            let mut run_is_outlier = false;
            for ch in row.chars() {
                let is_outlier = ch == '•';
                if is_outlier != run_is_outlier && !run.is_empty() {
                    let s = if run_is_outlier { outlier_style } else { style };
                    spans.push(Span::styled(std::mem::take(&mut run), s));
                }
                run_is_outlier = is_outlier;
                run.push(ch);
            }
            if !run.is_empty() {
                let s = if run_is_outlier { outlier_style } else { style };
                spans.push(Span::styled(run, s));
            }
            Line::from(spans)
        })
        .collect();

    let lo_label = format_axis_label(lo);
    let hi_label = format_axis_label(hi);
    let pad = plot_width.saturating_sub(lo_label.chars().count() + hi_label.chars().count());
    lines.push(Line::styled(
        format!(
            "{:label_width$} {lo_label}{}{hi_label}",
            "",
            " ".repeat(pad)
        ),
        Style::default().fg(theme.get("axis")),
    ));
    render_message(area, buf, lines, theme);
}

/// Text box plot of one group over `[lo, hi]` in `width` cells.
///
/// Whiskers are `├─` and `─┤`, the box spans the quartiles with the median as `│`,
/// and outliers are `•`. Violins fill the box with a lighter shade.
pub fn box_line(b: &BoxSummary, lo: f64, hi: f64, width: usize, violin: bool) -> String {
    if width == 0 {
        return String::new();
    }
    let pos = |v: f64| -> usize {
        if hi <= lo {
            return width / 2;
        }
        let t = ((v - lo) / (hi - lo)).clamp(0.0, 1.0);
        (t * (width - 1) as f64).round() as usize
    };
    let mut cells = vec![' '; width];
    let (lw, q1, med, q3, uw) = (
        pos(b.lower_whisker),
        pos(b.q1),
        pos(b.median),
        pos(b.q3),
        pos(b.upper_whisker),
    );
    for c in cells.iter_mut().take(uw + 1).skip(lw) {
        *c = '─';
    }
    let fill = if violin { '▒' } else { '█' };
    for c in cells.iter_mut().take(q3 + 1).skip(q1) {
        *c = fill;
    }
    if lw < q1 {
        cells[lw] = '├';
    }
    if uw > q3 {
        cells[uw] = '┤';
    }
    cells[med] = '│';
    for &o in &b.outliers {
        cells[pos(o)] = '•';
    }
    cells.into_iter().collect()
}

fn format_axis_label(v: f64) -> String {
    if v.abs() >= 1e6 || (v.abs() < 1e-2 && v != 0.0) {
        format!("{:.2e}", v)
    } else {
        format!("{:.2}", v)
    }
}

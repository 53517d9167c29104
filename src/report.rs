//! Plain-text rendering of a session and its panels, for `--print`.

use crate::chart_data::{AggregatedResult, ChartPanel};
use crate::chart_export::{stats_table_lines, summary_lines};
use crate::session::DatasetSession;
use crate::value::format_number;
use std::fmt::Write;

/// Header describing the dataset, filter and page.
pub fn session_header(session: &DatasetSession) -> Vec<String> {
    let page = session.page();
    vec![
        format!("Dataset: {} ({})", session.key(), session.version()),
        format!("Filter: {}", session.filter_description()),
        format!(
            "Rows: {} of {}  Page {}/{}",
            page.records.len(),
            page.total,
            session.page_number(),
            session.page_count()
        ),
    ]
}

/// Body lines for one panel.
pub fn panel_lines(panel: &ChartPanel) -> Vec<String> {
    match &panel.data {
        AggregatedResult::Frequency(table) => {
            let counted = table.counted().max(1) as f64;
            let mut lines: Vec<String> = table
                .entries
                .iter()
                .map(|e| {
                    format!(
                        "{}\t{}\t{:.1}%",
                        e.value,
                        e.count,
                        e.count as f64 / counted * 100.0
                    )
                })
                .collect();
            if table.missing > 0 {
                lines.push(format!("(missing)\t{}", table.missing));
            }
            lines
        }
        AggregatedResult::GroupedStats { stats, total } => stats_table_lines(stats, *total),
        AggregatedResult::GroupMeans(means) => means
            .iter()
            .map(|m| {
                format!(
                    "{} (n={})\t{} ± {}",
                    m.group,
                    m.count,
                    format_number(m.mean),
                    format_number(m.standard_error)
                )
            })
            .collect(),
        AggregatedResult::Survival(analysis) => {
            let mut lines = vec![format!(
                "time: {}  event: {}",
                analysis.time_key, analysis.event_key
            )];
            lines.extend(analysis.curves.iter().map(|c| {
                format!(
                    "{}\tevents {}\tfinal survival {:.3}",
                    c.name,
                    c.events(),
                    c.final_survival()
                )
            }));
            lines
        }
        AggregatedResult::Histogram(bins) => bins
            .iter()
            .map(|b| {
                format!(
                    "[{}, {})\t{}",
                    format_number(b.start),
                    format_number(b.end),
                    b.count
                )
            })
            .collect(),
        AggregatedResult::GroupedHistogram(grouped) => grouped
            .series
            .iter()
            .map(|(group, bins)| {
                let counts: Vec<String> = bins.iter().map(|b| b.count.to_string()).collect();
                format!("{group}\t{}", counts.join(" "))
            })
            .collect(),
        AggregatedResult::BoxPlot(boxes) => boxes
            .iter()
            .map(|b| {
                format!(
                    "{} (n={})\tmin {} q1 {} median {} q3 {} max {}\toutliers {}",
                    b.group,
                    b.n,
                    format_number(b.min),
                    format_number(b.q1),
                    format_number(b.median),
                    format_number(b.q3),
                    format_number(b.max),
                    b.outliers.len()
                )
            })
            .collect(),
        AggregatedResult::Scatter(series) => series
            .iter()
            .map(|s| {
                format!(
                    "{}\t{} points",
                    s.group.as_deref().unwrap_or("all"),
                    s.points.len()
                )
            })
            .collect(),
        AggregatedResult::DistinctCount { distinct, rows } => {
            vec![format!("{distinct} distinct values in {rows} loaded rows")]
        }
        AggregatedResult::Summary(summary) => summary_lines(summary),
        AggregatedResult::Empty(reason) => vec![reason.to_string()],
    }
}

/// Full report: header, then each panel under its title.
pub fn render_report(session: &DatasetSession, panels: &[ChartPanel]) -> String {
    let mut out = session_header(session).join("\n");
    out.push('\n');
    for panel in panels {
        let _ = write!(
            out,
            "\n== {} [{}] ==\n",
            panel.title, panel.recommendation.chart
        );
        for line in panel_lines(panel) {
            out.push_str(&line);
            out.push('\n');
        }
    }
    if let Some(message) = session.notification() {
        let _ = writeln!(out, "\nWarning: {message}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart_data::EmptyReason;
    use crate::recommend::{ChartChoice, ChartKind, Recommendation};
    use crate::session::SessionOptions;
    use crate::statistics::{FrequencyEntry, FrequencyTable};
    use crate::value::Scalar;

    fn panel(data: AggregatedResult) -> ChartPanel {
        ChartPanel {
            title: "sex".to_string(),
            recommendation: Recommendation {
                chart: ChartChoice::Field(ChartKind::Pie),
                primary_field: "sex".to_string(),
                secondary_field: None,
            },
            x_label: "sex".to_string(),
            y_label: "Count".to_string(),
            data,
        }
    }

    #[test]
    fn test_frequency_lines_include_missing() {
        let table = FrequencyTable {
            entries: vec![
                FrequencyEntry {
                    value: Scalar::from("F"),
                    count: 3,
                },
                FrequencyEntry {
                    value: Scalar::from("M"),
                    count: 1,
                },
            ],
            missing: 2,
        };
        let lines = panel_lines(&panel(AggregatedResult::Frequency(table)));
        assert_eq!(lines, vec!["F\t3\t75.0%", "M\t1\t25.0%", "(missing)\t2"]);
    }

    #[test]
    fn test_report_has_header_and_titles() {
        let session = DatasetSession::new("brca", "latest", SessionOptions::default());
        let report = render_report(
            &session,
            &[panel(AggregatedResult::Empty(EmptyReason::NoValidData))],
        );
        assert!(report.starts_with("Dataset: brca (latest)\nFilter: No filters\n"));
        assert!(report.contains("== sex [pie] =="));
        assert!(report.contains("No valid data for grouped analysis"));
    }
}

//! Render directives: a recommended chart plus the aggregated data that feeds it.
//!
//! Renderers only map a [`ChartPanel`] onto widgets; they never recompute statistics.

use crate::dictionary::{DataDictionary, DataType, FieldMeta};
use crate::recommend::{
    endpoint_of_key, recommend, recommend_pair, ChartChoice, ChartKind, GroupedChartKind,
    Recommendation,
};
use crate::statistics::{
    all_missing, box_summaries, distinct_count, frequency_table, group_rows, grouped_histogram,
    grouped_stats, histogram, mean_with_standard_error, scatter_series, BoxSummary,
    FrequencyOrder, FrequencyTable, GroupMean, GroupStats, GroupedHistogram, HistogramBin,
    ScatterSeries,
};
use crate::survival::{kaplan_meier, SurvivalAnalysis, SurvivalGrouping};
use crate::value::{cell, RowPage};
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

/// Why a panel has nothing to draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptyReason {
    NoGroupBy,
    TooFewFields,
    GroupByNotSelected(String),
    AllMissing(String),
    NoValidData,
    UnsupportedField(DataType),
    UnsupportedPair,
    RequiresNumeric(GroupedChartKind),
    MissingSurvivalFields,
    RequiresCategoricalGroup,
}

impl fmt::Display for EmptyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmptyReason::NoGroupBy => f.write_str("Please select a group by field"),
            EmptyReason::TooFewFields => f.write_str("Please select at least two fields"),
            EmptyReason::GroupByNotSelected(key) => {
                write!(f, "The group by field {key} is not among the selected fields")
            }
            EmptyReason::AllMissing(name) => write!(f, "All values in {name} are missing"),
            EmptyReason::NoValidData => f.write_str("No valid data for grouped analysis"),
            EmptyReason::UnsupportedField(t) => write!(f, "Unsupported {t} field"),
            EmptyReason::UnsupportedPair => {
                f.write_str("No chart is available for this combination of fields")
            }
            EmptyReason::RequiresNumeric(kind) => {
                write!(f, "{} requires numeric fields", kind.label())
            }
            EmptyReason::MissingSurvivalFields => f.write_str(
                "KM Plot requires valid time/event fields, like os_months and os_status \
                 (also dfs, rfs, dmfs)",
            ),
            EmptyReason::RequiresCategoricalGroup => f.write_str(
                "KM Plot requires a categorical grouping field, like os_status or dfs_status",
            ),
        }
    }
}

/// Shorten a group label to `max_len` characters, marking the cut with an ellipsis.
pub fn truncate_label(label: &str, max_len: usize) -> String {
    if label.chars().count() <= max_len {
        return label.to_string();
    }
    let mut short: String = label.chars().take(max_len).collect();
    short.push('…');
    short
}

/// Overview shown by the summary panel.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSummary {
    pub total: usize,
    pub loaded: usize,
    pub fields: usize,
    /// Missing cells per selected field, in selection order.
    pub missing: Vec<(String, usize)>,
}

/// Aggregated data for one panel.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregatedResult {
    Frequency(FrequencyTable),
    GroupedStats {
        stats: Vec<GroupStats>,
        /// Server match count; the denominator of the frequency column.
        total: usize,
    },
    GroupMeans(Vec<GroupMean>),
    Survival(SurvivalAnalysis),
    Histogram(Vec<HistogramBin>),
    GroupedHistogram(GroupedHistogram),
    BoxPlot(Vec<BoxSummary>),
    Scatter(Vec<ScatterSeries>),
    DistinctCount { distinct: usize, rows: usize },
    Summary(DatasetSummary),
    Empty(EmptyReason),
}

impl AggregatedResult {
    pub fn is_empty(&self) -> bool {
        matches!(self, AggregatedResult::Empty(_))
    }
}

/// What a renderer draws for one field or field pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPanel {
    pub title: String,
    pub recommendation: Recommendation,
    pub x_label: String,
    pub y_label: String,
    pub data: AggregatedResult,
}

/// Inputs shared by every panel of one view.
#[derive(Debug, Clone, Copy)]
pub struct PanelContext<'a> {
    pub dictionary: &'a DataDictionary,
    pub page: &'a RowPage,
    pub selected: &'a [String],
    pub id_column: Option<&'a str>,
    pub histogram_bins: Option<usize>,
}

impl PanelContext<'_> {
    fn selected_set(&self) -> HashSet<&str> {
        self.selected.iter().map(String::as_str).collect()
    }
}

/// Panel for one field, using the recommended chart.
pub fn build_field_panel(ctx: &PanelContext<'_>, field: &FieldMeta) -> ChartPanel {
    let recommendation = recommend(field, ctx.page.total, &ctx.selected_set());
    let rows = &ctx.page.records;
    let kind = match recommendation.chart {
        ChartChoice::Field(kind) => kind,
        ChartChoice::Grouped(_) => ChartKind::Unsupported,
    };
    let (x_label, y_label) = match kind {
        ChartKind::KaplanMeier => (field.label().to_string(), "Survival Probability".to_string()),
        ChartKind::Histogram => (field.label().to_string(), "Frequency".to_string()),
        _ => (field.label().to_string(), "Count".to_string()),
    };
    let data = match kind {
        ChartKind::Pie | ChartKind::Bar => {
            AggregatedResult::Frequency(frequency_table(rows, &field.key, FrequencyOrder::Encounter))
        }
        ChartKind::Table => AggregatedResult::Frequency(frequency_table(
            rows,
            &field.key,
            FrequencyOrder::CountDescending,
        )),
        ChartKind::Id => AggregatedResult::DistinctCount {
            distinct: distinct_count(rows, &field.key),
            rows: rows.len(),
        },
        ChartKind::Histogram => {
            AggregatedResult::Histogram(histogram(rows, &field.key, ctx.histogram_bins))
        }
        ChartKind::KaplanMeier => match &recommendation.secondary_field {
            Some(event_key) => AggregatedResult::Survival(kaplan_meier(
                rows,
                &field.key,
                event_key,
                SurvivalGrouping::None,
                ctx.id_column,
            )),
            None => AggregatedResult::Empty(EmptyReason::MissingSurvivalFields),
        },
        ChartKind::Summary => AggregatedResult::Summary(dataset_summary(ctx)),
        ChartKind::Unsupported => {
            AggregatedResult::Empty(EmptyReason::UnsupportedField(field.data_type.clone()))
        }
    };
    ChartPanel {
        title: field.label().to_string(),
        recommendation,
        x_label,
        y_label,
        data,
    }
}

/// Panels for every selected field known to the dictionary, in selection order.
pub fn build_field_panels(ctx: &PanelContext<'_>) -> Vec<ChartPanel> {
    ctx.selected
        .iter()
        .filter_map(|key| match ctx.dictionary.field(key) {
            Some(field) => Some(build_field_panel(ctx, field)),
            None => {
                warn!(field = %key, "selected field is not in the data dictionary");
                None
            }
        })
        .collect()
}

fn dataset_summary(ctx: &PanelContext<'_>) -> DatasetSummary {
    DatasetSummary {
        total: ctx.page.total,
        loaded: ctx.page.records.len(),
        fields: ctx.dictionary.fields.len(),
        missing: ctx
            .selected
            .iter()
            .map(|key| {
                let n = ctx
                    .page
                    .records
                    .iter()
                    .filter(|r| cell(r, key).is_missing())
                    .count();
                (key.clone(), n)
            })
            .collect(),
    }
}

/// Panel comparing `y` across the groups of `x`.
///
/// `kind` overrides the recommended chart; the override is kept even when the
/// fields cannot support it, and the panel then explains why it is empty.
pub fn build_pair_panel(
    ctx: &PanelContext<'_>,
    x: &FieldMeta,
    y: &FieldMeta,
    kind: Option<GroupedChartKind>,
) -> ChartPanel {
    let kind = kind.unwrap_or_else(|| recommend_pair(x, y));
    let recommendation = Recommendation {
        chart: ChartChoice::Grouped(kind),
        primary_field: x.key.clone(),
        secondary_field: Some(y.key.clone()),
    };
    let panel = |x_label: String, y_label: String, data: AggregatedResult| ChartPanel {
        title: format!("{} by {}", y.label(), x.label()),
        recommendation: recommendation.clone(),
        x_label,
        y_label,
        data,
    };
    let empty = |reason| panel(x.label().to_string(), y.label().to_string(), AggregatedResult::Empty(reason));

    let rows = &ctx.page.records;
    if all_missing(rows, &x.key) {
        return empty(EmptyReason::AllMissing(x.label().to_string()));
    }
    if all_missing(rows, &y.key) {
        return empty(EmptyReason::AllMissing(y.label().to_string()));
    }
    if group_rows(rows, &x.key, &y.key).is_empty() {
        return empty(EmptyReason::NoValidData);
    }

    let numeric_pair = x.data_type == DataType::Number && y.data_type == DataType::Number;
    let xl = x.label().to_string();
    let yl = y.label().to_string();
    match kind {
        GroupedChartKind::Summary => panel(
            xl,
            yl,
            AggregatedResult::GroupedStats {
                stats: grouped_stats(rows, &x.key, &y.key),
                total: ctx.page.total,
            },
        ),
        GroupedChartKind::Bar => {
            if x.data_type == DataType::String && y.data_type == DataType::Number {
                panel(
                    xl,
                    format!("Mean {yl}"),
                    AggregatedResult::GroupMeans(mean_with_standard_error(rows, &x.key, &y.key)),
                )
            } else {
                let paired: Vec<_> = group_rows(rows, &x.key, &y.key)
                    .into_iter()
                    .flat_map(|g| g.rows.into_iter().cloned())
                    .collect();
                panel(
                    xl,
                    "Count".to_string(),
                    AggregatedResult::Frequency(frequency_table(
                        &paired,
                        &x.key,
                        FrequencyOrder::Encounter,
                    )),
                )
            }
        }
        GroupedChartKind::Box | GroupedChartKind::Violin => {
            if y.data_type != DataType::Number {
                return empty(EmptyReason::RequiresNumeric(kind));
            }
            panel(xl, yl, AggregatedResult::BoxPlot(box_summaries(rows, &x.key, &y.key)))
        }
        GroupedChartKind::Scatter => {
            if !numeric_pair {
                return empty(EmptyReason::RequiresNumeric(kind));
            }
            let group = ctx
                .selected
                .iter()
                .filter(|k| **k != x.key && **k != y.key)
                .filter_map(|k| ctx.dictionary.field(k))
                .find(|f| f.data_type == DataType::String)
                .map(|f| f.key.as_str());
            panel(
                xl,
                yl,
                AggregatedResult::Scatter(scatter_series(rows, &x.key, &y.key, group)),
            )
        }
        GroupedChartKind::Histogram => {
            if !numeric_pair {
                return empty(EmptyReason::RequiresNumeric(kind));
            }
            panel(
                yl,
                "Frequency".to_string(),
                AggregatedResult::GroupedHistogram(grouped_histogram(
                    rows,
                    &x.key,
                    &y.key,
                    ctx.histogram_bins,
                )),
            )
        }
        GroupedChartKind::KmPlot => {
            if x.data_type != DataType::String {
                return empty(EmptyReason::RequiresCategoricalGroup);
            }
            let Some((time, event)) = endpoint_of_key(&x.key).and_then(|ep| {
                let time = ctx.dictionary.field(&format!("{ep}_months"))?;
                let event = ctx.dictionary.field(&format!("{ep}_status"))?;
                Some((time, event))
            }) else {
                return empty(EmptyReason::MissingSurvivalFields);
            };
            let paired: Vec<_> = group_rows(rows, &x.key, &y.key)
                .into_iter()
                .flat_map(|g| g.rows.into_iter().cloned())
                .collect();
            panel(
                time.label().to_string(),
                "Survival Probability".to_string(),
                AggregatedResult::Survival(kaplan_meier(
                    &paired,
                    &time.key,
                    &event.key,
                    SurvivalGrouping::for_field(&y.key, &y.data_type),
                    ctx.id_column,
                )),
            )
        }
        GroupedChartKind::Unsupported => empty(EmptyReason::UnsupportedPair),
    }
}

/// One panel per selected field compared against `group_by`.
pub fn build_grouped_panels(
    ctx: &PanelContext<'_>,
    group_by: Option<&str>,
    kind: Option<GroupedChartKind>,
) -> Vec<ChartPanel> {
    let placeholder = |reason: EmptyReason, key: &str| ChartPanel {
        title: "Grouped Analysis".to_string(),
        recommendation: Recommendation {
            chart: ChartChoice::Grouped(GroupedChartKind::Unsupported),
            primary_field: key.to_string(),
            secondary_field: None,
        },
        x_label: String::new(),
        y_label: String::new(),
        data: AggregatedResult::Empty(reason),
    };

    let Some(group_by) = group_by else {
        return vec![placeholder(EmptyReason::NoGroupBy, "")];
    };
    if !ctx.selected.iter().any(|k| k == group_by) {
        return vec![placeholder(
            EmptyReason::GroupByNotSelected(group_by.to_string()),
            group_by,
        )];
    }
    if ctx.selected.len() < 2 {
        return vec![placeholder(EmptyReason::TooFewFields, group_by)];
    }
    let Some(x) = ctx.dictionary.field(group_by) else {
        return vec![placeholder(
            EmptyReason::GroupByNotSelected(group_by.to_string()),
            group_by,
        )];
    };
    ctx.selected
        .iter()
        .filter(|k| k.as_str() != group_by)
        .filter_map(|k| ctx.dictionary.field(k))
        .map(|y| build_pair_panel(ctx, x, y, kind))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Record;

    fn dictionary() -> DataDictionary {
        DataDictionary::new(vec![
            FieldMeta::new("sex", DataType::String).with_allowed_values(["M", "F"]),
            FieldMeta::new("age", DataType::Number),
            FieldMeta::new("os_months", DataType::Number),
            FieldMeta::new("os_status", DataType::String)
                .with_allowed_values(["0:LIVING", "1:DECEASED"]),
            FieldMeta::new("sample_id", DataType::String),
        ])
    }

    fn page(json: &str, total: usize) -> RowPage {
        let records: Vec<Record> = serde_json::from_str(json).unwrap();
        RowPage {
            page_size: records.len(),
            records,
            total,
            page: 1,
        }
    }

    fn ctx<'a>(dict: &'a DataDictionary, page: &'a RowPage, selected: &'a [String]) -> PanelContext<'a> {
        PanelContext {
            dictionary: dict,
            page,
            selected,
            id_column: Some("sample_id"),
            histogram_bins: None,
        }
    }

    fn keys(k: &[&str]) -> Vec<String> {
        k.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_truncate_label() {
        assert_eq!(truncate_label("Infiltrating Ductal", 10), "Infiltrati…");
        assert_eq!(truncate_label("short", 10), "short");
        assert_eq!(truncate_label("ÄÖÜäöüßéèê", 10), "ÄÖÜäöüßéèê");
    }

    #[test]
    fn test_field_panels_follow_recommendation() {
        let dict = dictionary();
        let p = page(r#"[{"sex":"M","age":30},{"sex":"F","age":45},{"sex":"M","age":null}]"#, 1000);
        let selected = keys(&["sex", "age", "unknown"]);
        let panels = build_field_panels(&ctx(&dict, &p, &selected));
        assert_eq!(panels.len(), 2);
        assert_eq!(panels[0].recommendation.chart, ChartChoice::Field(ChartKind::Pie));
        match &panels[0].data {
            AggregatedResult::Frequency(t) => {
                assert_eq!(t.entries[0].count, 2);
                assert_eq!(t.entries[1].count, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(panels[1].recommendation.chart, ChartChoice::Field(ChartKind::Histogram));
    }

    #[test]
    fn test_km_field_panel() {
        let dict = dictionary();
        let p = page(
            r#"[{"os_months":5,"os_status":"1:DECEASED"},{"os_months":10,"os_status":"0:LIVING"}]"#,
            2,
        );
        let selected = keys(&["os_months", "os_status"]);
        let panels = build_field_panels(&ctx(&dict, &p, &selected));
        match &panels[0].data {
            AggregatedResult::Survival(s) => {
                assert_eq!(s.event_key, "os_status");
                assert_eq!(s.curves[0].points.len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_pair_panel_box_and_override() {
        let dict = dictionary();
        let p = page(r#"[{"sex":"M","age":30},{"sex":"F","age":45},{"sex":"M","age":50}]"#, 3);
        let selected = keys(&["sex", "age"]);
        let c = ctx(&dict, &p, &selected);
        let sex = dict.field("sex").unwrap();
        let age = dict.field("age").unwrap();

        let panel = build_pair_panel(&c, sex, age, None);
        assert_eq!(panel.recommendation.chart, ChartChoice::Grouped(GroupedChartKind::Box));
        assert_eq!(panel.title, "age by sex");
        assert!(matches!(&panel.data, AggregatedResult::BoxPlot(b) if b.len() == 2));

        let bar = build_pair_panel(&c, sex, age, Some(GroupedChartKind::Bar));
        assert!(matches!(&bar.data, AggregatedResult::GroupMeans(m) if m[0].mean == 40.0));

        let scatter = build_pair_panel(&c, sex, age, Some(GroupedChartKind::Scatter));
        assert_eq!(
            scatter.data,
            AggregatedResult::Empty(EmptyReason::RequiresNumeric(GroupedChartKind::Scatter))
        );
    }

    #[test]
    fn test_pair_panel_missing_values() {
        let dict = dictionary();
        let p = page(r#"[{"sex":"M","age":null},{"sex":"F"}]"#, 2);
        let selected = keys(&["sex", "age"]);
        let c = ctx(&dict, &p, &selected);
        let panel = build_pair_panel(&c, dict.field("sex").unwrap(), dict.field("age").unwrap(), None);
        assert_eq!(panel.data, AggregatedResult::Empty(EmptyReason::AllMissing("age".into())));
    }

    #[test]
    fn test_km_plot_grouped_by_status() {
        let dict = dictionary();
        let p = page(
            r#"[{"os_status":"1:DECEASED","os_months":4,"sex":"M"},
                {"os_status":"0:LIVING","os_months":9,"sex":"F"},
                {"os_status":"1:DECEASED","os_months":7,"sex":"F"}]"#,
            3,
        );
        let selected = keys(&["os_status", "sex"]);
        let c = ctx(&dict, &p, &selected);
        let panels = build_grouped_panels(&c, Some("os_status"), Some(GroupedChartKind::KmPlot));
        assert_eq!(panels.len(), 1);
        match &panels[0].data {
            AggregatedResult::Survival(s) => {
                let names: Vec<&str> = s.curves.iter().map(|c| c.name.as_str()).collect();
                assert_eq!(names, vec!["M (n=1)", "F (n=2)"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_grouped_panel_empty_states() {
        let dict = dictionary();
        let p = page(r#"[{"sex":"M","age":1}]"#, 1);
        let one = keys(&["sex"]);
        let c = ctx(&dict, &p, &one);
        assert_eq!(
            build_grouped_panels(&c, None, None)[0].data,
            AggregatedResult::Empty(EmptyReason::NoGroupBy)
        );
        assert_eq!(
            build_grouped_panels(&c, Some("sex"), None)[0].data,
            AggregatedResult::Empty(EmptyReason::TooFewFields)
        );
        assert_eq!(
            build_grouped_panels(&c, Some("age"), None)[0].data,
            AggregatedResult::Empty(EmptyReason::GroupByNotSelected("age".into()))
        );
    }

    #[test]
    fn test_summary_stats_panel() {
        let dict = dictionary();
        let p = page(r#"[{"sex":"M","os_status":"0:LIVING"},{"sex":"F","os_status":"1:DECEASED"}]"#, 10);
        let selected = keys(&["sex", "os_status"]);
        let c = ctx(&dict, &p, &selected);
        let panels = build_grouped_panels(&c, Some("sex"), None);
        match &panels[0].data {
            AggregatedResult::GroupedStats { stats, total } => {
                assert_eq!(*total, 10);
                assert_eq!(stats.len(), 2);
                assert_eq!(stats[0].percent_of(*total), 10.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

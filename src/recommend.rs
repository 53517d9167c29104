//! Chart choice from field metadata and cardinality.
//!
//! Both entry points are total: every input maps to exactly one chart kind, with
//! `Unsupported` as the explicit "nothing to draw" answer.

use crate::dictionary::{DataType, FieldMeta};
use std::collections::HashSet;
use std::fmt;

/// Synthetic field key for the whole-dataset summary panel.
pub const SUMMARY_KEY: &str = "__summary";

/// Survival endpoints recognized by `<endpoint>_months` / `<endpoint>_status` pairs.
pub const SURVIVAL_ENDPOINTS: [&str; 4] = ["os", "dfs", "rfs", "dmfs"];

/// At most this many distinct values is drawn as a pie.
pub const PIE_MAX_VALUES: usize = 6;
/// At most this many distinct values is drawn as a bar chart.
pub const BAR_MAX_VALUES: usize = 25;
/// At most this many distinct values is listed as a frequency table.
pub const TABLE_MAX_VALUES: usize = 500;
/// Above this many distinct values a near-unique STRING column is an identifier.
pub const ID_MIN_VALUES: usize = 100;
/// Distinct values per row above which a column is treated as continuous or unique.
pub const UNIQUE_RATIO: f64 = 0.8;

/// Chart for a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartKind {
    Pie,
    Bar,
    Table,
    Id,
    Histogram,
    KaplanMeier,
    Summary,
    Unsupported,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Pie => "pie",
            ChartKind::Bar => "bar",
            ChartKind::Table => "table",
            ChartKind::Id => "id",
            ChartKind::Histogram => "histogram",
            ChartKind::KaplanMeier => "kaplan_meier",
            ChartKind::Summary => "summary",
            ChartKind::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chart for a grouped (two-field) view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupedChartKind {
    Bar,
    Box,
    Violin,
    Scatter,
    Histogram,
    KmPlot,
    Summary,
    Unsupported,
}

impl GroupedChartKind {
    /// Kinds a user may pick instead of the recommendation.
    pub const CHOICES: [GroupedChartKind; 7] = [
        GroupedChartKind::Bar,
        GroupedChartKind::Box,
        GroupedChartKind::Violin,
        GroupedChartKind::Scatter,
        GroupedChartKind::Histogram,
        GroupedChartKind::KmPlot,
        GroupedChartKind::Summary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupedChartKind::Bar => "bar",
            GroupedChartKind::Box => "box",
            GroupedChartKind::Violin => "violin",
            GroupedChartKind::Scatter => "scatter",
            GroupedChartKind::Histogram => "histogram",
            GroupedChartKind::KmPlot => "kmplot",
            GroupedChartKind::Summary => "summary",
            GroupedChartKind::Unsupported => "unsupported",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GroupedChartKind::Bar => "Bar Chart",
            GroupedChartKind::Box => "Box Plot",
            GroupedChartKind::Violin => "Violin Plot",
            GroupedChartKind::Scatter => "Scatter Plot",
            GroupedChartKind::Histogram => "Histogram",
            GroupedChartKind::KmPlot => "KM Plot",
            GroupedChartKind::Summary => "Summary",
            GroupedChartKind::Unsupported => "Unsupported",
        }
    }

    /// Next entry of [`Self::CHOICES`], wrapping around.
    pub fn next_choice(&self) -> GroupedChartKind {
        let pos = Self::CHOICES.iter().position(|k| k == self);
        match pos {
            Some(i) => Self::CHOICES[(i + 1) % Self::CHOICES.len()],
            None => Self::CHOICES[0],
        }
    }
}

impl fmt::Display for GroupedChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<biostudio_cli::ChartOverride> for GroupedChartKind {
    fn from(o: biostudio_cli::ChartOverride) -> Self {
        use biostudio_cli::ChartOverride;
        match o {
            ChartOverride::Bar => GroupedChartKind::Bar,
            ChartOverride::Box => GroupedChartKind::Box,
            ChartOverride::Violin => GroupedChartKind::Violin,
            ChartOverride::Scatter => GroupedChartKind::Scatter,
            ChartOverride::Histogram => GroupedChartKind::Histogram,
            ChartOverride::Kmplot => GroupedChartKind::KmPlot,
            ChartOverride::Summary => GroupedChartKind::Summary,
        }
    }
}

/// Either kind of chart, as carried by a [`Recommendation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartChoice {
    Field(ChartKind),
    Grouped(GroupedChartKind),
}

impl fmt::Display for ChartChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartChoice::Field(k) => write!(f, "{k}"),
            ChartChoice::Grouped(k) => write!(f, "{k}"),
        }
    }
}

/// Derived, never stored: recomputed whenever selection, page or total changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    pub chart: ChartChoice,
    pub primary_field: String,
    pub secondary_field: Option<String>,
}

/// Survival endpoint whose `_months` field is `key`, when its `_status` partner is selected too.
pub fn survival_endpoint(key: &str, selected: &HashSet<&str>) -> Option<&'static str> {
    SURVIVAL_ENDPOINTS.into_iter().find(|ep| {
        key == format!("{ep}_months") && selected.contains(format!("{ep}_status").as_str())
    })
}

/// Survival endpoint named by a grouping field such as `os_status`.
pub fn endpoint_of_key(key: &str) -> Option<&'static str> {
    SURVIVAL_ENDPOINTS
        .into_iter()
        .find(|ep| key.strip_prefix(ep).is_some_and(|rest| rest.starts_with('_')))
}

/// Distinct values per row. Zero rows gives 0 for an unconstrained field and infinity otherwise.
pub fn cardinality_ratio(n: usize, total: usize) -> f64 {
    match (n, total) {
        (0, _) => 0.0,
        (_, 0) => f64::INFINITY,
        (n, t) => n as f64 / t as f64,
    }
}

/// Chart kind for one field.
///
/// `total` is the server's full match count, not the loaded page size.
pub fn recommend_field(field: &FieldMeta, total: usize, selected: &HashSet<&str>) -> ChartKind {
    if survival_endpoint(&field.key, selected).is_some() {
        return ChartKind::KaplanMeier;
    }
    if field.key == SUMMARY_KEY {
        return ChartKind::Summary;
    }

    let n = field.cardinality();
    let ratio = cardinality_ratio(n, total);
    match field.data_type {
        DataType::Boolean => ChartKind::Pie,
        DataType::String => {
            if n <= PIE_MAX_VALUES {
                ChartKind::Pie
            } else if n <= BAR_MAX_VALUES {
                ChartKind::Bar
            } else if n <= TABLE_MAX_VALUES && ratio <= UNIQUE_RATIO {
                ChartKind::Table
            } else if n > ID_MIN_VALUES && ratio > UNIQUE_RATIO {
                ChartKind::Id
            } else {
                ChartKind::Unsupported
            }
        }
        DataType::Number => {
            // Unconstrained numeric fields carry no value list.
            if n == 0 || ratio > UNIQUE_RATIO {
                ChartKind::Histogram
            } else if n <= PIE_MAX_VALUES {
                ChartKind::Pie
            } else if n <= BAR_MAX_VALUES {
                ChartKind::Bar
            } else if n <= TABLE_MAX_VALUES {
                ChartKind::Table
            } else {
                ChartKind::Histogram
            }
        }
        DataType::Other(_) => ChartKind::Unsupported,
    }
}

/// Recommendation for one field.
pub fn recommend(field: &FieldMeta, total: usize, selected: &HashSet<&str>) -> Recommendation {
    let kind = recommend_field(field, total, selected);
    let secondary_field = match kind {
        ChartKind::KaplanMeier => {
            survival_endpoint(&field.key, selected).map(|ep| format!("{ep}_status"))
        }
        _ => None,
    };
    Recommendation {
        chart: ChartChoice::Field(kind),
        primary_field: field.key.clone(),
        secondary_field,
    }
}

/// Chart kind for a grouped view: `x` groups, `y` is compared across groups.
pub fn recommend_pair(x: &FieldMeta, y: &FieldMeta) -> GroupedChartKind {
    match (&x.data_type, &y.data_type) {
        (DataType::String, DataType::Number) => GroupedChartKind::Box,
        (DataType::Number, DataType::Number) => GroupedChartKind::Scatter,
        (DataType::String, DataType::String) => GroupedChartKind::Summary,
        _ => GroupedChartKind::Unsupported,
    }
}

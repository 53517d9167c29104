//! Kaplan-Meier survival curves.
//!
//! The estimator steps once per row, even when several rows share a time, and
//! coerces event indicators permissively. Both behaviours are kept so curves
//! match what users have seen before.

use crate::dictionary::DataType;
use crate::value::{cell, Record, Scalar};

/// One step of a survival curve.
#[derive(Debug, Clone, PartialEq)]
pub struct SurvivalPoint {
    pub time: f64,
    pub survival: f64,
    /// 1 when the row recorded an event, 0 when censored (and for the seed point).
    pub event: u8,
    /// Subjects still at risk after this step.
    pub at_risk: usize,
    /// Sample id of the row, when an id column is configured and present.
    pub label: Option<String>,
}

/// A curve for one cohort, starting at `(0, 1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SurvivalCurve {
    /// Legend name, `"<group> (n=<N>)"`.
    pub name: String,
    pub group: String,
    pub n: usize,
    pub points: Vec<SurvivalPoint>,
}

impl SurvivalCurve {
    pub fn final_survival(&self) -> f64 {
        self.points.last().map(|p| p.survival).unwrap_or(1.0)
    }

    /// Number of rows with an event.
    pub fn events(&self) -> usize {
        self.points.iter().filter(|p| p.event == 1).count()
    }
}

/// How curves are split into cohorts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurvivalGrouping<'a> {
    /// One curve for everyone.
    None,
    /// One curve per value of a categorical field.
    Category(&'a str),
    /// Two curves split at the median of a numeric field.
    MedianSplit(&'a str),
}

impl<'a> SurvivalGrouping<'a> {
    /// Grouping appropriate for a field of the given type.
    pub fn for_field(key: &'a str, data_type: &DataType) -> Self {
        match data_type {
            DataType::Number => SurvivalGrouping::MedianSplit(key),
            _ => SurvivalGrouping::Category(key),
        }
    }
}

/// Result of a survival analysis: the curves and the fields they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SurvivalAnalysis {
    pub time_key: String,
    pub event_key: String,
    pub curves: Vec<SurvivalCurve>,
}

/// Event indicator coercion.
///
/// `1`, `"1"`, `true` and any text starting with `1` (e.g. `"1:DECEASED"`) are
/// events. Everything else, including unrecognized text, is censored.
pub fn event_indicator(value: &Scalar) -> u8 {
    match value {
        Scalar::Number(n) if *n == 1.0 => 1,
        Scalar::Bool(true) => 1,
        Scalar::String(s) if s.starts_with('1') => 1,
        _ => 0,
    }
}

struct Observation<'a> {
    time: f64,
    event: u8,
    row: &'a Record,
}

/// Rows with a numeric time and a present event indicator, sorted by time (stable).
fn observations<'a>(rows: &'a [Record], time_key: &str, event_key: &str) -> Vec<Observation<'a>> {
    let mut obs: Vec<Observation<'a>> = rows
        .iter()
        .filter(|r| !cell(r, event_key).is_missing())
        .filter_map(|r| {
            let time = cell(r, time_key);
            if time.is_missing() {
                return None;
            }
            time.coerce_number().map(|t| Observation {
                time: t,
                event: event_indicator(cell(r, event_key)),
                row: r,
            })
        })
        .collect();
    obs.sort_by(|a, b| a.time.total_cmp(&b.time));
    obs
}

fn curve(group: &str, obs: &[&Observation<'_>], id_column: Option<&str>) -> SurvivalCurve {
    let n = obs.len();
    let mut at_risk = n;
    let mut survival = 1.0;
    let mut points = Vec::with_capacity(n + 1);
    points.push(SurvivalPoint {
        time: 0.0,
        survival: 1.0,
        event: 0,
        at_risk: n,
        label: None,
    });
    for o in obs {
        if o.event == 1 {
            survival *= (at_risk - 1) as f64 / at_risk as f64;
        }
        at_risk -= 1;
        let label = id_column
            .map(|id| cell(o.row, id))
            .filter(|v| !v.is_missing())
            .map(ToString::to_string);
        points.push(SurvivalPoint {
            time: o.time,
            survival,
            event: o.event,
            at_risk,
            label,
        });
    }
    SurvivalCurve {
        name: format!("{group} (n={n})"),
        group: group.to_string(),
        n,
        points,
    }
}

/// Kaplan-Meier curves for `time_key`/`event_key`, optionally split into cohorts.
///
/// Rows with a missing or non-numeric time, or a missing event, are dropped.
/// With no valid rows, grouped or not, the result is a single seed-point curve.
pub fn kaplan_meier(
    rows: &[Record],
    time_key: &str,
    event_key: &str,
    grouping: SurvivalGrouping<'_>,
    id_column: Option<&str>,
) -> SurvivalAnalysis {
    let obs = observations(rows, time_key, event_key);
    let mut cohorts: Vec<(String, Vec<&Observation<'_>>)> = match grouping {
        SurvivalGrouping::None => vec![("All".to_string(), obs.iter().collect())],
        SurvivalGrouping::Category(key) => {
            let mut groups: Vec<(String, Vec<&Observation<'_>>)> = Vec::new();
            for o in &obs {
                let value = cell(o.row, key);
                if value.is_missing() {
                    continue;
                }
                let label = value.to_string();
                match groups.iter_mut().find(|(g, _)| *g == label) {
                    Some((_, members)) => members.push(o),
                    None => groups.push((label, vec![o])),
                }
            }
            groups
        }
        SurvivalGrouping::MedianSplit(key) => median_split(&obs, key),
    };
    if cohorts.is_empty() {
        cohorts.push(("All".to_string(), Vec::new()));
    }

    SurvivalAnalysis {
        time_key: time_key.to_string(),
        event_key: event_key.to_string(),
        curves: cohorts
            .iter()
            .map(|(group, members)| curve(group, members, id_column))
            .collect(),
    }
}

/// Split at the element at index `n / 2` of the sorted values (the upper median for even counts).
fn median_split<'o, 'a>(
    obs: &'o [Observation<'a>],
    key: &str,
) -> Vec<(String, Vec<&'o Observation<'a>>)> {
    let mut values: Vec<f64> = obs
        .iter()
        .filter_map(|o| cell(o.row, key).coerce_number())
        .collect();
    if values.is_empty() {
        return Vec::new();
    }
    values.sort_by(f64::total_cmp);
    let median = values[values.len() / 2];
    let (mut low, mut high) = (Vec::new(), Vec::new());
    for o in obs {
        match cell(o.row, key).coerce_number() {
            Some(v) if v <= median => low.push(o),
            Some(_) => high.push(o),
            None => {}
        }
    }
    vec![
        (format!("<= median ({median:.2})"), low),
        (format!("> median ({median:.2})"), high),
    ]
}

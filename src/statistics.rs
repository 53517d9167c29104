//! Descriptive statistics over the loaded page of records.
//!
//! Every function here is pure and works on whatever rows were loaded, not the
//! full dataset. Missing cells (null, absent or empty string) never count.

use crate::value::{cell, Record, Scalar};

/// One distinct value and how often it occurs.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyEntry {
    pub value: Scalar,
    pub count: usize,
}

/// Order of a frequency table's entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FrequencyOrder {
    /// First-seen order, for pie and bar charts.
    #[default]
    Encounter,
    /// Descending count, ties in first-seen order, for tables.
    CountDescending,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrequencyTable {
    pub entries: Vec<FrequencyEntry>,
    /// Rows whose cell was missing.
    pub missing: usize,
}

impl FrequencyTable {
    /// Sum of all counts (non-missing rows).
    pub fn counted(&self) -> usize {
        self.entries.iter().map(|e| e.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Count each distinct non-missing value of `key`.
pub fn frequency_table(rows: &[Record], key: &str, order: FrequencyOrder) -> FrequencyTable {
    let mut table = FrequencyTable::default();
    for row in rows {
        let value = cell(row, key);
        if value.is_missing() {
            table.missing += 1;
            continue;
        }
        match table.entries.iter_mut().find(|e| &e.value == value) {
            Some(entry) => entry.count += 1,
            None => table.entries.push(FrequencyEntry {
                value: value.clone(),
                count: 1,
            }),
        }
    }
    if order == FrequencyOrder::CountDescending {
        // Stable: equal counts keep first-seen order.
        table.entries.sort_by(|a, b| b.count.cmp(&a.count));
    }
    table
}

/// Number of distinct non-missing values.
pub fn distinct_count(rows: &[Record], key: &str) -> usize {
    frequency_table(rows, key, FrequencyOrder::Encounter)
        .entries
        .len()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median of ascending-sorted values; the mean of the two middle values for even counts.
pub fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        0.0
    } else if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Population standard deviation: `sqrt(mean((v - mean)^2))`.
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Bessel-corrected standard deviation (`n - 1` denominator); 0 for fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64).sqrt()
}

/// Quantile of ascending-sorted values with linear interpolation between ranks.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(f64::total_cmp);
    v
}

/// Rows of one x value in a grouped view.
#[derive(Debug, Clone)]
pub struct RowGroup<'a> {
    pub group: String,
    pub rows: Vec<&'a Record>,
}

/// Keep rows where both `x` and `y` are present, grouped by the text of `x` in first-seen order.
pub fn group_rows<'a>(rows: &'a [Record], x: &str, y: &str) -> Vec<RowGroup<'a>> {
    let mut groups: Vec<RowGroup<'a>> = Vec::new();
    for row in rows {
        let xv = cell(row, x);
        if xv.is_missing() || cell(row, y).is_missing() {
            continue;
        }
        let label = xv.to_string();
        match groups.iter_mut().find(|g| g.group == label) {
            Some(g) => g.rows.push(row),
            None => groups.push(RowGroup {
                group: label,
                rows: vec![row],
            }),
        }
    }
    groups
}

/// Values of `key` that are actual numbers (numeric text does not count).
fn numeric_values(rows: &[&Record], key: &str) -> Vec<f64> {
    rows.iter()
        .filter_map(|r| cell(r, key).as_number())
        .collect()
}

/// Summary row of the grouped statistics table.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStats {
    pub group: String,
    /// Records in the group, numeric or not.
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation.
    pub std: f64,
}

impl GroupStats {
    /// Share of `total` rows in this group, in percent.
    pub fn percent_of(&self, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            self.count as f64 / total as f64 * 100.0
        }
    }
}

/// Count, mean, median, min, max and population std of `y` per `x` group.
///
/// A group without numeric `y` values reports zeros for every statistic.
pub fn grouped_stats(rows: &[Record], x: &str, y: &str) -> Vec<GroupStats> {
    group_rows(rows, x, y)
        .into_iter()
        .map(|g| {
            let values = sorted(&numeric_values(&g.rows, y));
            let count = g.rows.len();
            if values.is_empty() {
                return GroupStats {
                    group: g.group,
                    count,
                    mean: 0.0,
                    median: 0.0,
                    min: 0.0,
                    max: 0.0,
                    std: 0.0,
                };
            }
            GroupStats {
                group: g.group,
                count,
                mean: mean(&values),
                median: median_sorted(&values),
                min: values[0],
                max: values[values.len() - 1],
                std: population_std(&values),
            }
        })
        .collect()
}

/// Bar height and error bar of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMean {
    pub group: String,
    /// Records in the group, shown as `n=` above the bar.
    pub count: usize,
    pub mean: f64,
    /// Standard error using the Bessel-corrected std; 0 with fewer than two values.
    pub standard_error: f64,
}

/// Mean of `y` per `x` group with standard-error bars.
///
/// Uses the `n - 1` std, unlike [`grouped_stats`] which reports the population std.
pub fn mean_with_standard_error(rows: &[Record], x: &str, y: &str) -> Vec<GroupMean> {
    group_rows(rows, x, y)
        .into_iter()
        .map(|g| {
            let values = numeric_values(&g.rows, y);
            let standard_error = if values.len() > 1 {
                sample_std(&values) / (values.len() as f64).sqrt()
            } else {
                0.0
            };
            GroupMean {
                group: g.group,
                count: g.rows.len(),
                mean: mean(&values),
                standard_error,
            }
        })
        .collect()
}

/// Five-number summary of one group for box and violin plots.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxSummary {
    pub group: String,
    pub n: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub mean: f64,
    /// Most extreme values within 1.5 IQR of the quartiles.
    pub lower_whisker: f64,
    pub upper_whisker: f64,
    pub outliers: Vec<f64>,
}

/// Quartiles, whiskers and outliers of `y` per `x` group. Groups without numeric values are skipped.
pub fn box_summaries(rows: &[Record], x: &str, y: &str) -> Vec<BoxSummary> {
    group_rows(rows, x, y)
        .into_iter()
        .filter_map(|g| box_summary(g.group, &numeric_values(&g.rows, y)))
        .collect()
}

pub fn box_summary(group: String, values: &[f64]) -> Option<BoxSummary> {
    if values.is_empty() {
        return None;
    }
    let s = sorted(values);
    let q1 = quantile_sorted(&s, 0.25);
    let q3 = quantile_sorted(&s, 0.75);
    let iqr = q3 - q1;
    let lower_fence = q1 - 1.5 * iqr;
    let upper_fence = q3 + 1.5 * iqr;
    let inside: Vec<f64> = s
        .iter()
        .copied()
        .filter(|v| *v >= lower_fence && *v <= upper_fence)
        .collect();
    let outliers = s
        .iter()
        .copied()
        .filter(|v| *v < lower_fence || *v > upper_fence)
        .collect();
    Some(BoxSummary {
        group,
        n: s.len(),
        min: s[0],
        q1,
        median: median_sorted(&s),
        q3,
        max: s[s.len() - 1],
        mean: mean(&s),
        lower_whisker: inside.first().copied().unwrap_or(q1),
        upper_whisker: inside.last().copied().unwrap_or(q3),
        outliers,
    })
}

/// One histogram bin, `[start, end)`; the last bin also includes `end`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

/// Sturges' rule: `ceil(log2(n)) + 1` bins.
pub fn sturges_bins(n: usize) -> usize {
    if n <= 1 {
        1
    } else {
        (n as f64).log2().ceil() as usize + 1
    }
}

/// Equal-width bin edges covering `values`. A constant column gets one bin.
pub fn histogram_edges(values: &[f64], bins: Option<usize>) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        return vec![min, max];
    }
    let k = bins.unwrap_or_else(|| sturges_bins(values.len())).max(1);
    let width = (max - min) / k as f64;
    let mut edges: Vec<f64> = (0..k).map(|i| min + width * i as f64).collect();
    edges.push(max);
    edges
}

/// Count `values` into the bins delimited by `edges`. Values outside the edges are ignored.
pub fn bin_counts(values: &[f64], edges: &[f64]) -> Vec<HistogramBin> {
    if edges.len() < 2 {
        return Vec::new();
    }
    let mut bins: Vec<HistogramBin> = edges
        .windows(2)
        .map(|w| HistogramBin {
            start: w[0],
            end: w[1],
            count: 0,
        })
        .collect();
    let last = bins.len() - 1;
    for &v in values {
        let idx = bins
            .iter()
            .position(|b| v >= b.start && v < b.end)
            .or_else(|| (v == bins[last].end).then_some(last));
        if let Some(i) = idx {
            bins[i].count += 1;
        }
    }
    bins
}

/// Histogram of one column's numeric values (numeric text is read as a number).
pub fn histogram(rows: &[Record], key: &str, bins: Option<usize>) -> Vec<HistogramBin> {
    let values: Vec<f64> = rows
        .iter()
        .filter_map(|r| cell(r, key).coerce_number())
        .collect();
    bin_counts(&values, &histogram_edges(&values, bins))
}

/// Histograms of `y` per `x` group on shared bin edges.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedHistogram {
    pub edges: Vec<f64>,
    pub series: Vec<(String, Vec<HistogramBin>)>,
}

pub fn grouped_histogram(rows: &[Record], x: &str, y: &str, bins: Option<usize>) -> GroupedHistogram {
    let groups = group_rows(rows, x, y);
    let all: Vec<f64> = groups
        .iter()
        .flat_map(|g| numeric_values(&g.rows, y))
        .collect();
    let edges = histogram_edges(&all, bins);
    let series = groups
        .into_iter()
        .map(|g| {
            let counts = bin_counts(&numeric_values(&g.rows, y), &edges);
            (g.group, counts)
        })
        .collect();
    GroupedHistogram { edges, series }
}

/// Points of one scatter trace.
#[derive(Debug, Clone, PartialEq)]
pub struct ScatterSeries {
    /// Group value, or `None` for the single ungrouped trace.
    pub group: Option<String>,
    pub points: Vec<(f64, f64)>,
}

/// Numeric `(x, y)` pairs, split into one trace per value of `group` when given.
/// Rows with a missing group value are collected under `NA`.
pub fn scatter_series(rows: &[Record], x: &str, y: &str, group: Option<&str>) -> Vec<ScatterSeries> {
    let mut series: Vec<ScatterSeries> = Vec::new();
    for row in rows {
        let (Some(xv), Some(yv)) = (cell(row, x).as_number(), cell(row, y).as_number()) else {
            continue;
        };
        let name = group.map(|g| {
            let v = cell(row, g);
            if v.is_missing() {
                "NA".to_string()
            } else {
                v.to_string()
            }
        });
        match series.iter_mut().find(|s| s.group == name) {
            Some(s) => s.points.push((xv, yv)),
            None => series.push(ScatterSeries {
                group: name,
                points: vec![(xv, yv)],
            }),
        }
    }
    series
}

/// Whether every value of `key` in `rows` is missing (true for no rows).
pub fn all_missing(rows: &[Record], key: &str) -> bool {
    rows.iter().all(|r| cell(r, key).is_missing())
}

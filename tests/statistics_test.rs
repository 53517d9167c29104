use biostudio::statistics::{
    box_summary, frequency_table, grouped_histogram, grouped_stats, histogram,
    mean_with_standard_error, scatter_series, FrequencyOrder,
};
use biostudio::value::Scalar;
use color_eyre::Result;

mod common;

#[test]
fn test_frequency_orders() -> Result<()> {
    let rows = common::clinical_records(30);

    let encounter = frequency_table(&rows, "sex", FrequencyOrder::Encounter);
    let values: Vec<&Scalar> = encounter.entries.iter().map(|e| &e.value).collect();
    assert_eq!(values, vec![&Scalar::from("F"), &Scalar::from("M")]);
    assert_eq!(encounter.counted(), 30);
    assert_eq!(encounter.missing, 0);

    let by_count = frequency_table(&rows, "sex", FrequencyOrder::CountDescending);
    assert_eq!(by_count.entries[0].value, Scalar::from("M"));
    assert_eq!(by_count.entries[0].count, 20);
    assert_eq!(by_count.entries[1].count, 10);

    let ages = frequency_table(&rows, "age", FrequencyOrder::Encounter);
    assert_eq!(ages.missing, 5);
    Ok(())
}

#[test]
fn test_grouped_stats_skip_missing_rows() -> Result<()> {
    let rows = common::clinical_records(30);
    let stats = grouped_stats(&rows, "sex", "age");

    // Row 0 (F) has no age, so M is seen first.
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].group, "M");
    assert_eq!(stats[0].count, 17);
    assert_eq!(stats[0].median, 56.0);
    assert_eq!(stats[0].min, 41.0);
    assert_eq!(stats[0].max, 69.0);

    let f = &stats[1];
    assert_eq!(f.group, "F");
    assert_eq!(f.count, 8);
    assert!((f.mean - 54.25).abs() < 1e-9);
    assert!((f.median - 53.5).abs() < 1e-9);
    assert!((f.std - 7.901740314639554).abs() < 1e-9);
    assert!((f.percent_of(25) - 32.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_mean_with_standard_error() -> Result<()> {
    let rows = common::clinical_records(30);
    let means = mean_with_standard_error(&rows, "sex", "age");
    let f = means.iter().find(|m| m.group == "F").unwrap();
    assert_eq!(f.count, 8);
    assert!((f.standard_error - 2.9865771138785044).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_histogram_uses_sturges_bins() -> Result<()> {
    let rows = common::clinical_records(30);
    let bins = histogram(&rows, "age", None);
    // 25 ages: ceil(log2(25)) + 1
    assert_eq!(bins.len(), 6);
    assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 25);
    assert_eq!(bins[0].start, 41.0);
    assert_eq!(bins[5].end, 69.0);

    let fixed = histogram(&rows, "age", Some(4));
    assert_eq!(fixed.len(), 4);
    Ok(())
}

#[test]
fn test_grouped_histogram_shares_edges() -> Result<()> {
    let rows = common::clinical_records(30);
    let grouped = grouped_histogram(&rows, "sex", "age", Some(5));
    assert_eq!(grouped.edges.len(), 6);
    assert_eq!(grouped.series.len(), 2);
    for (_, bins) in &grouped.series {
        assert_eq!(bins.len(), 5);
    }
    let total: usize = grouped
        .series
        .iter()
        .flat_map(|(_, bins)| bins.iter().map(|b| b.count))
        .sum();
    assert_eq!(total, 25);
    Ok(())
}

#[test]
fn test_box_summary_outliers() {
    let b = box_summary("A".to_string(), &[1.0, 2.0, 3.0, 4.0, 100.0]).unwrap();
    assert_eq!(b.q1, 2.0);
    assert_eq!(b.median, 3.0);
    assert_eq!(b.q3, 4.0);
    assert_eq!(b.lower_whisker, 1.0);
    assert_eq!(b.upper_whisker, 4.0);
    assert_eq!(b.outliers, vec![100.0]);
    assert_eq!(b.max, 100.0);

    assert!(box_summary("empty".to_string(), &[]).is_none());
}

#[test]
fn test_scatter_series_by_group() {
    let rows = common::clinical_records(30);
    let ungrouped = scatter_series(&rows, "age", "tmb", None);
    assert_eq!(ungrouped.len(), 1);
    assert_eq!(ungrouped[0].points.len(), 25);

    let grouped = scatter_series(&rows, "age", "tmb", Some("sex"));
    assert_eq!(grouped.len(), 2);
    let n: usize = grouped.iter().map(|s| s.points.len()).sum();
    assert_eq!(n, 25);
}

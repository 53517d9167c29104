use biostudio::chart_data::{AggregatedResult, EmptyReason};
use biostudio::recommend::{recommend, recommend_field, recommend_pair, SUMMARY_KEY};
use biostudio::{
    run_load, ChartChoice, ChartKind, DataType, DatasetSession, FieldMeta, GroupedChartKind,
    SessionOptions,
};
use std::collections::HashSet;

mod common;

fn ready_session(n: usize, selected: &[&str]) -> DatasetSession {
    let backend = common::clinical_backend(n);
    let mut session = DatasetSession::new(
        "brca",
        "1",
        SessionOptions {
            page_size: n,
            ..SessionOptions::default()
        },
    );
    session.set_selected(common::keys(selected));
    let request = session.start();
    for event in run_load(&backend, &request) {
        session.handle(event);
    }
    session
}

#[test]
fn test_fixture_field_recommendations() {
    let dict = common::clinical_dictionary();
    let selected: HashSet<&str> = ["os_months", "os_status"].into_iter().collect();
    let kind = |key: &str| recommend_field(dict.field(key).unwrap(), 300, &selected);

    assert_eq!(kind("sex"), ChartKind::Pie);
    assert_eq!(kind("stage"), ChartKind::Pie);
    assert_eq!(kind("age"), ChartKind::Histogram);
    assert_eq!(kind("os_months"), ChartKind::KaplanMeier);
    // A status field alone is just a category.
    assert_eq!(kind("os_status"), ChartKind::Pie);

    let without_status: HashSet<&str> = ["os_months"].into_iter().collect();
    assert_eq!(
        recommend_field(dict.field("os_months").unwrap(), 300, &without_status),
        ChartKind::Histogram
    );
}

#[test]
fn test_recommendation_carries_survival_partner() {
    let dict = common::clinical_dictionary();
    let selected: HashSet<&str> = ["dfs_months", "dfs_status"].into_iter().collect();
    let field = FieldMeta::new("dfs_months", DataType::Number);
    let rec = recommend(&field, 10, &selected);
    assert_eq!(rec.chart, ChartChoice::Field(ChartKind::KaplanMeier));
    assert_eq!(rec.secondary_field.as_deref(), Some("dfs_status"));

    let rec = recommend(dict.field("sex").unwrap(), 10, &selected);
    assert_eq!(rec.secondary_field, None);

    let summary = FieldMeta::new(SUMMARY_KEY, DataType::String);
    assert_eq!(
        recommend_field(&summary, 0, &HashSet::new()),
        ChartKind::Summary
    );
}

#[test]
fn test_identifier_columns() {
    let ids = FieldMeta::new("sample_id", DataType::String)
        .with_allowed_values((0..150).map(|i| format!("S{i:03}")).collect::<Vec<_>>());
    assert_eq!(recommend_field(&ids, 150, &HashSet::new()), ChartKind::Id);
    assert_eq!(recommend_field(&ids, 1000, &HashSet::new()), ChartKind::Table);
}

#[test]
fn test_pair_recommendations() {
    let dict = common::clinical_dictionary();
    let f = |key: &str| dict.field(key).unwrap();
    assert_eq!(recommend_pair(f("sex"), f("age")), GroupedChartKind::Box);
    assert_eq!(recommend_pair(f("age"), f("tmb")), GroupedChartKind::Scatter);
    assert_eq!(recommend_pair(f("sex"), f("stage")), GroupedChartKind::Summary);
    assert_eq!(recommend_pair(f("age"), f("sex")), GroupedChartKind::Unsupported);
}

#[test]
fn test_grouped_panels_by_sex() {
    let session = ready_session(30, &["sex", "age", "stage"]);
    let panels = session.grouped_panels(Some("sex"), None);
    assert_eq!(panels.len(), 2);

    assert_eq!(panels[0].title, "Age by Sex");
    assert_eq!(
        panels[0].recommendation.chart,
        ChartChoice::Grouped(GroupedChartKind::Box)
    );
    let AggregatedResult::BoxPlot(boxes) = &panels[0].data else {
        panic!("expected box plots, got {:?}", panels[0].data);
    };
    assert_eq!(boxes.len(), 2);

    assert!(matches!(
        panels[1].data,
        AggregatedResult::GroupedStats { total: 30, .. }
    ));
}

#[test]
fn test_grouped_override_is_kept_when_unsupported() {
    let session = ready_session(30, &["sex", "stage"]);
    let panels = session.grouped_panels(Some("sex"), Some(GroupedChartKind::Scatter));
    assert_eq!(panels.len(), 1);
    assert_eq!(
        panels[0].recommendation.chart,
        ChartChoice::Grouped(GroupedChartKind::Scatter)
    );
    assert_eq!(
        panels[0].data,
        AggregatedResult::Empty(EmptyReason::RequiresNumeric(GroupedChartKind::Scatter))
    );
}

#[test]
fn test_grouped_placeholders() {
    let session = ready_session(10, &["sex", "age"]);
    let none = session.grouped_panels(None, None);
    assert_eq!(none[0].data, AggregatedResult::Empty(EmptyReason::NoGroupBy));

    let missing = session.grouped_panels(Some("stage"), None);
    assert_eq!(
        missing[0].data,
        AggregatedResult::Empty(EmptyReason::GroupByNotSelected("stage".to_string()))
    );

    let alone = ready_session(10, &["sex"]);
    assert_eq!(
        alone.grouped_panels(Some("sex"), None)[0].data,
        AggregatedResult::Empty(EmptyReason::TooFewFields)
    );
}

#[test]
fn test_km_plot_grouped_by_status_field() {
    let session = ready_session(40, &["os_status", "sex", "os_months"]);
    let panels = session.grouped_panels(Some("os_status"), Some(GroupedChartKind::KmPlot));
    let sex_panel = panels
        .iter()
        .find(|p| p.recommendation.secondary_field.as_deref() == Some("sex"))
        .unwrap();
    let AggregatedResult::Survival(km) = &sex_panel.data else {
        panic!("expected a survival curve, got {:?}", sex_panel.data);
    };
    assert_eq!(km.curves.len(), 2);
    assert_eq!(sex_panel.y_label, "Survival Probability");
}

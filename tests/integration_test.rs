use biostudio::export::{export_columns, export_table};
use biostudio::report::render_report;
use biostudio::{
    run_load, App, AppEvent, DatasetBackend, DatasetSession, LoadState, SessionOptions,
    StaticBackend, Theme,
};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::process::Command;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

mod common;

fn ready_session(backend: &dyn DatasetBackend, page_size: usize) -> DatasetSession {
    let mut session = DatasetSession::new(
        "brca",
        "latest",
        SessionOptions {
            page_size,
            ..SessionOptions::default()
        },
    );
    let request = session.start();
    for event in run_load(backend, &request) {
        session.handle(event);
    }
    session
}

fn key(code: KeyCode) -> AppEvent {
    AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
}

#[test]
fn test_worker_loads_next_page() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (dictionary, records) = common::write_clinical_files(dir.path(), 45)?;
    let backend = Arc::new(StaticBackend::from_files(&dictionary, &records)?);
    let session = ready_session(backend.as_ref(), 20);

    let (tx, rx) = mpsc::channel();
    let mut app = App::new(tx, backend, session, Theme::default());
    assert_eq!(app.panels().len(), 5);

    // 1. The key press yields a load request
    let load = app.event(&key(KeyCode::Char('n'))).unwrap();
    assert!(matches!(&load, AppEvent::Load(r) if r.page.page == 2 && !r.dictionary));

    // 2. The worker reports the page back over the channel
    app.event(&load);
    assert_eq!(app.session().state(), LoadState::Loading);
    let result = rx.recv_timeout(Duration::from_secs(5))?;
    assert!(matches!(result, AppEvent::Session(_)));
    app.event(&result);

    assert_eq!(app.session().state(), LoadState::Ready);
    assert_eq!(app.session().page_number(), 2);
    assert_eq!(app.session().page().records.len(), 20);

    // 3. Load everything
    let load = app.event(&key(KeyCode::Char('a'))).unwrap();
    app.event(&load);
    let result = rx.recv_timeout(Duration::from_secs(5))?;
    app.event(&result);
    assert_eq!(app.session().page().records.len(), 45);
    assert_eq!(app.session().page_count(), 1);
    Ok(())
}

#[test]
fn test_report_and_table_export() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (dictionary, records) = common::write_clinical_files(dir.path(), 12)?;
    let backend = StaticBackend::from_files(&dictionary, &records)?;
    let session = ready_session(&backend, 12);

    let report = render_report(&session, &session.field_panels());
    assert!(report.starts_with("Dataset: brca (latest)\nFilter: No filters\nRows: 12 of 12  Page 1/1\n"));
    assert!(report.contains("== Sex [pie] =="));
    assert!(report.contains("M\t8\t66.7%"));
    assert!(report.contains("== Age [histogram] =="));
    assert!(report.contains("== os_months [kaplan_meier] =="));
    assert!(report.contains("All (n=12)"));

    let dict = session.dictionary().unwrap();
    let columns = export_columns(dict, session.selected(), Some("sample_id"));
    let path = dir.path().join("rows.tsv");
    let rows = export_table(&path, dict, &session.page().records, &columns)?;
    assert_eq!(rows, 12);

    let text = std::fs::read_to_string(&path)?;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "sample_id\tsex\tage\tstage\tos_months\tos_status");
    // The first patient has no recorded age.
    assert_eq!(lines[1], "S000\tF\t\tI\t1\t1:DECEASED");
    assert_eq!(lines[2], "S001\tM\t41\tII\t6\t0:LIVING");
    Ok(())
}

#[test]
fn test_print_from_command_line() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (dictionary, records) = common::write_clinical_files(dir.path(), 30)?;

    let output = Command::new(env!("CARGO_BIN_EXE_biostudio"))
        .env("XDG_CONFIG_HOME", dir.path())
        .env_remove("RUST_LOG")
        .arg("brca")
        .arg("--dictionary")
        .arg(&dictionary)
        .arg("--records")
        .arg(&records)
        .args(["--column", "sex", "--column", "age", "--group-by", "sex"])
        .arg("--print")
        .output()?;

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Dataset: brca (latest)"));
    assert!(stdout.contains("== Age by Sex [box] =="));
    assert!(stdout.contains("M (n=17)"));
    Ok(())
}

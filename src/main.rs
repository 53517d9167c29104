use biostudio::chart_export::{export_panels, ChartExportOptions};
use biostudio::export::{export_columns, export_table};
use biostudio::report::render_report;
use biostudio::{
    run_load, AppConfig, App, AppEvent, Args, ChartPanel, ConfigManager, DatasetBackend,
    DatasetSession, ExportFormat, GroupOperator, GroupedChartKind, LoadRequest, MatchMode,
    QueryBuilder, StaticBackend, Theme,
};
use clap::Parser;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use ratatui::DefaultTerminal;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn render(terminal: &mut DefaultTerminal, app: &mut App) -> Result<()> {
    terminal.draw(|frame| frame.render_widget(app, frame.area()))?;
    Ok(())
}

fn run(
    mut terminal: DefaultTerminal,
    backend: Arc<dyn DatasetBackend>,
    session: DatasetSession,
    args: &Args,
    config: &AppConfig,
) -> Result<()> {
    let (tx, rx) = channel::<AppEvent>();
    let theme = Theme::from_config(&config.theme)?;
    let mut app = App::new(tx.clone(), backend, session, theme)
        .with_label_max_len(config.charts.label_max_len)
        .with_group_by(args.group_by.clone())
        .with_chart(args.chart.map(GroupedChartKind::from));
    if config.debug.enabled {
        app.enable_debug();
    }
    render(&mut terminal, &mut app)?;

    loop {
        if crossterm::event::poll(std::time::Duration::from_millis(25))? {
            match crossterm::event::read()? {
                crossterm::event::Event::Key(key) => tx.send(AppEvent::Key(key))?,
                crossterm::event::Event::Resize(cols, rows) => {
                    tx.send(AppEvent::Resize(cols, rows))?
                }
                _ => {}
            }
        }

        let updated = match rx.recv_timeout(std::time::Duration::from_millis(0)) {
            Ok(event) => {
                match event {
                    AppEvent::Exit => break,
                    AppEvent::Crash(msg) => {
                        return Err(eyre!(msg));
                    }
                    event => {
                        if let Some(event) = app.event(&event) {
                            tx.send(event)?;
                        }
                    }
                }
                true
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => false,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        };

        if updated {
            render(&mut terminal, &mut app)?;
        }
    }
    Ok(())
}

/// Logs go to stderr, or to `log_file` while the terminal UI owns the screen.
fn init_logging(config: &AppConfig, log_file: Option<PathBuf>) -> Result<()> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };
    let result = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .wrap_err_with(|| format!("Opening log file {}", path.display()))?;
            let builder = tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            if config.logging.json {
                builder.json().try_init()
            } else {
                builder.try_init()
            }
        }
        None => {
            let builder = tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_target(false)
                .with_writer(std::io::stderr);
            if config.logging.json {
                builder.json().try_init()
            } else {
                builder.try_init()
            }
        }
    };
    result.map_err(|e| eyre!("Failed to initialize logging: {e}"))
}

fn build_backend(args: &Args, config: &AppConfig) -> Result<Arc<dyn DatasetBackend>> {
    if let (Some(dictionary), Some(records)) = (&args.dictionary, &args.records) {
        info!(dictionary = %dictionary.display(), records = %records.display(), "using local files");
        return Ok(Arc::new(StaticBackend::from_files(dictionary, records)?));
    }
    #[cfg(feature = "http")]
    {
        Ok(Arc::new(biostudio::HttpBackend::new(
            &config.backend.base_url,
            config.backend.timeout_secs,
        )))
    }
    #[cfg(not(feature = "http"))]
    {
        let _ = config;
        Err(eyre!(
            "Built without HTTP support; use --dictionary and --records"
        ))
    }
}

fn load_blocking(backend: &dyn DatasetBackend, session: &mut DatasetSession, request: LoadRequest) {
    for event in run_load(backend, &request) {
        session.handle(event);
    }
}

/// Dictionary, filters and the requested page, loaded before any output is produced.
fn prepare_session(
    backend: &dyn DatasetBackend,
    args: &Args,
    config: &AppConfig,
) -> Result<DatasetSession> {
    let key = args
        .dataset
        .as_deref()
        .ok_or_else(|| eyre!("A dataset key is required"))?;
    let mut session = DatasetSession::new(
        key,
        &config.backend.dataset_version,
        config.session_options(),
    );
    if !args.columns.is_empty() {
        session.set_selected(args.columns.clone());
    }

    let request = session.start();
    load_blocking(backend, &mut session, request);
    let Some(dictionary) = session.dictionary().cloned() else {
        let message = session
            .take_notification()
            .unwrap_or_else(|| "Data dictionary load failed".to_string());
        return Err(eyre!(message));
    };

    if !args.filters.is_empty() {
        let operator = match args.match_mode {
            MatchMode::All => GroupOperator::And,
            MatchMode::Any => GroupOperator::Or,
        };
        let builder = QueryBuilder::from_rules(dictionary, &args.filters, operator)
            .wrap_err("Invalid --where rule")?;
        let request = session.apply_filters(&builder);
        load_blocking(backend, &mut session, request);
    }

    if args.load_all {
        let request = session.load_all();
        load_blocking(backend, &mut session, request);
    } else if let Some(page) = args.page.filter(|p| *p > 1) {
        let request = session.set_page(page);
        load_blocking(backend, &mut session, request);
    }
    Ok(session)
}

fn panels_for(session: &DatasetSession, args: &Args) -> Vec<ChartPanel> {
    match &args.group_by {
        Some(group_by) => {
            session.grouped_panels(Some(group_by), args.chart.map(GroupedChartKind::from))
        }
        None => session.field_panels(),
    }
}

/// Export and print requests. Returns true when the terminal UI should not start.
fn run_batch(session: &DatasetSession, args: &Args, config: &AppConfig) -> Result<bool> {
    let mut handled = false;
    let panels = panels_for(session, args);

    if let Some(path) = &args.export_chart {
        let format = args
            .export_format
            .or_else(|| ExportFormat::from_path(path))
            .unwrap_or(ExportFormat::Png);
        let options = ChartExportOptions::from_config(config)?;
        export_panels(path, format, &panels, &options)?;
        eprintln!("Wrote {} chart(s) to {}", panels.len(), path.display());
        handled = true;
    }

    if let Some(path) = &args.export_table {
        let dictionary = session
            .dictionary()
            .ok_or_else(|| eyre!("No data dictionary loaded"))?;
        let columns = export_columns(
            dictionary,
            session.selected(),
            config.session_options().id_column.as_deref(),
        );
        let rows = export_table(path, dictionary, &session.page().records, &columns)?;
        eprintln!("Wrote {rows} row(s) to {}", path.display());
        handled = true;
    }

    if args.print {
        print!("{}", render_report(session, &panels));
        handled = true;
    }
    Ok(handled)
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.generate_config {
        let manager = ConfigManager::new(biostudio::APP_NAME)?;
        let path = manager.write_default_config(args.force)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    color_eyre::install()?;

    let mut config = AppConfig::load(biostudio::APP_NAME)?;
    config.apply_args(&args);
    config.validate()?;

    let batch = args.print || args.export_chart.is_some() || args.export_table.is_some();
    let log_file = if batch {
        None
    } else {
        let manager = ConfigManager::new(biostudio::APP_NAME)?;
        manager.ensure_config_dir()?;
        Some(manager.config_path("biostudio.log"))
    };
    init_logging(&config, log_file)?;

    let backend = build_backend(&args, &config)?;
    let session = prepare_session(backend.as_ref(), &args, &config)?;

    if run_batch(&session, &args, &config)? {
        return Ok(());
    }

    let terminal = ratatui::init();
    let result = run(terminal, backend, session, &args, &config);
    ratatui::restore();
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use biostudio::{DataDictionary, DataType, FieldMeta};

    fn backend() -> StaticBackend {
        let dict = DataDictionary::new(vec![
            FieldMeta::new("sex", DataType::String).with_order(1),
            FieldMeta::new("age", DataType::Number).with_order(2),
        ]);
        let rows = (0..25)
            .map(|i| {
                [
                    (
                        "sex".to_string(),
                        biostudio::value::Scalar::from(if i % 2 == 0 { "F" } else { "M" }),
                    ),
                    ("age".to_string(), biostudio::value::Scalar::from(i as f64)),
                ]
                .into()
            })
            .collect();
        StaticBackend::new(dict, rows)
    }

    #[test]
    fn test_prepare_session_loads_requested_page() -> Result<()> {
        let args = Args::parse_from(["biostudio", "demo", "--page", "3", "--page-size", "10"]);
        let mut config = AppConfig::default();
        config.apply_args(&args);
        let session = prepare_session(&backend(), &args, &config)?;
        assert_eq!(session.page_number(), 3);
        assert_eq!(session.page().records.len(), 5);
        assert_eq!(session.selected(), ["sex", "age"]);
        Ok(())
    }

    #[test]
    fn test_prepare_session_rejects_bad_rule() {
        let args = Args::parse_from(["biostudio", "demo", "--where", "stage = II"]);
        let config = AppConfig::default();
        assert!(prepare_session(&backend(), &args, &config).is_err());
    }

    #[test]
    fn test_prepare_session_load_all_and_columns() -> Result<()> {
        let args = Args::parse_from(["biostudio", "demo", "--all", "--column", "age"]);
        let mut config = AppConfig::default();
        config.apply_args(&args);
        let session = prepare_session(&backend(), &args, &config)?;
        assert_eq!(session.page().records.len(), 25);
        assert_eq!(session.selected(), ["age"]);
        Ok(())
    }

    #[test]
    fn test_batch_writes_table() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("rows.tsv");
        let path_str = path.to_string_lossy().to_string();
        let args = Args::parse_from(["biostudio", "demo", "--export-table", path_str.as_str()]);
        let config = AppConfig::default();
        let session = prepare_session(&backend(), &args, &config)?;
        assert!(run_batch(&session, &args, &config)?);
        let text = std::fs::read_to_string(&path)?;
        assert_eq!(text.lines().next(), Some("sex\tage"));
        Ok(())
    }
}

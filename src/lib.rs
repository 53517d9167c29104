use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::sync::{mpsc::Sender, Arc};
use tracing::debug;

use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::{buffer::Buffer, layout::Rect, widgets::Widget};

use ratatui::widgets::{Block, Paragraph};

pub mod backend;
pub mod chart_data;
pub mod chart_export;
pub mod config;
pub mod dictionary;
pub mod error_display;
pub mod export;
pub mod query;
pub mod recommend;
pub mod report;
pub mod session;
pub mod statistics;
pub mod survival;
pub mod value;
pub mod widgets;

pub use backend::{run_load, spawn_load, DatasetBackend, StaticBackend};
#[cfg(feature = "http")]
pub use backend::HttpBackend;
pub use biostudio_cli::{Args, ChartOverride, ExportFormat, MatchMode};
pub use chart_data::{AggregatedResult, ChartPanel, EmptyReason};
pub use config::{
    rgb_to_256_color, rgb_to_basic_ansi, AppConfig, ColorParser, ConfigManager, Theme,
};
pub use dictionary::{DataDictionary, DataType, FieldMeta};
pub use query::{ComposeQuery, GroupOperator, Operator, QueryBuilder, QueryError};
pub use recommend::{ChartChoice, ChartKind, GroupedChartKind, Recommendation};
pub use session::{DatasetSession, LoadRequest, LoadState, SessionEvent, SessionOptions};

use chart_export::grid_shape;
use widgets::chart::render_panel;
use widgets::controls::Controls;

pub const APP_NAME: &str = "biostudio";

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    /// Run a load on a worker; its results come back as `Session` events.
    Load(LoadRequest),
    Session(SessionEvent),
    Exit,
    Crash(String),
    Resize(u16, u16), // resized (width, height)
}

impl From<SessionEvent> for AppEvent {
    fn from(event: SessionEvent) -> Self {
        AppEvent::Session(event)
    }
}

#[derive(Debug, Default)]
struct DebugState {
    enabled: bool,
    num_events: usize,
    num_frames: usize,
    dropped_events: usize,
}

/// Interactive dashboard over one [`DatasetSession`].
pub struct App {
    session: DatasetSession,
    backend: Arc<dyn DatasetBackend>,
    events: Sender<AppEvent>,
    theme: Theme,
    label_max_len: usize,
    group_by: Option<String>,
    chart: Option<GroupedChartKind>,
    panels: Vec<ChartPanel>,
    focus: usize,
    debug: DebugState,
}

impl App {
    pub fn new(
        events: Sender<AppEvent>,
        backend: Arc<dyn DatasetBackend>,
        session: DatasetSession,
        theme: Theme,
    ) -> App {
        let mut app = App {
            session,
            backend,
            events,
            theme,
            label_max_len: 10,
            group_by: None,
            chart: None,
            panels: Vec::new(),
            focus: 0,
            debug: DebugState::default(),
        };
        app.refresh_panels();
        app
    }

    pub fn with_group_by(mut self, group_by: Option<String>) -> Self {
        self.group_by = group_by;
        self.refresh_panels();
        self
    }

    pub fn with_chart(mut self, chart: Option<GroupedChartKind>) -> Self {
        self.chart = chart;
        self.refresh_panels();
        self
    }

    pub fn with_label_max_len(mut self, label_max_len: usize) -> Self {
        self.label_max_len = label_max_len.max(1);
        self
    }

    pub fn enable_debug(&mut self) {
        self.debug.enabled = true;
    }

    pub fn send_event(&mut self, event: AppEvent) -> color_eyre::Result<()> {
        self.events.send(event)?;
        Ok(())
    }

    pub fn session(&self) -> &DatasetSession {
        &self.session
    }

    pub fn panels(&self) -> &[ChartPanel] {
        &self.panels
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn chart(&self) -> Option<GroupedChartKind> {
        self.chart
    }

    fn refresh_panels(&mut self) {
        self.panels = match &self.group_by {
            Some(group_by) => self.session.grouped_panels(Some(group_by), self.chart),
            None => self.session.field_panels(),
        };
        if self.focus >= self.panels.len() {
            self.focus = 0;
        }
    }

    /// Cycle the grouped chart, starting from what the focused panel shows.
    fn cycle_chart(&mut self) {
        if self.group_by.is_none() {
            return;
        }
        let current = self.chart.or_else(|| {
            self.panels
                .get(self.focus)
                .and_then(|p| match p.recommendation.chart {
                    ChartChoice::Grouped(kind) => Some(kind),
                    ChartChoice::Field(_) => None,
                })
        });
        let next = current.map_or(GroupedChartKind::CHOICES[0], |k| k.next_choice());
        debug!(chart = %next, "chart override");
        self.chart = Some(next);
        self.refresh_panels();
    }

    fn key(&mut self, event: &KeyEvent) -> Option<AppEvent> {
        self.session.take_notification();
        match event.code {
            KeyCode::Char('q') | KeyCode::Esc => Some(AppEvent::Exit),
            KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(AppEvent::Exit)
            }
            KeyCode::Char('n') | KeyCode::Right => self.session.next_page().map(AppEvent::Load),
            KeyCode::Char('p') | KeyCode::Left => self.session.prev_page().map(AppEvent::Load),
            KeyCode::Char('+') => {
                let size = self.session.page_size().saturating_mul(2);
                Some(AppEvent::Load(self.session.set_page_size(size)))
            }
            KeyCode::Char('-') => {
                let size = self.session.page_size() / 2;
                Some(AppEvent::Load(self.session.set_page_size(size)))
            }
            KeyCode::Char('a') => Some(AppEvent::Load(self.session.load_all())),
            KeyCode::Tab => {
                if !self.panels.is_empty() {
                    self.focus = (self.focus + 1) % self.panels.len();
                }
                None
            }
            KeyCode::BackTab => {
                if !self.panels.is_empty() {
                    self.focus = (self.focus + self.panels.len() - 1) % self.panels.len();
                }
                None
            }
            KeyCode::Char('c') => {
                self.cycle_chart();
                None
            }
            _ => None,
        }
    }

    pub fn event(&mut self, event: &AppEvent) -> Option<AppEvent> {
        self.debug.num_events += 1;
        match event {
            AppEvent::Key(key) => self.key(key),
            AppEvent::Load(request) => {
                spawn_load(self.backend.clone(), request.clone(), self.events.clone());
                None
            }
            AppEvent::Session(session_event) => {
                if self.session.handle(session_event.clone()) {
                    self.refresh_panels();
                } else {
                    self.debug.dropped_events += 1;
                }
                None
            }
            AppEvent::Resize(_, _) | AppEvent::Exit | AppEvent::Crash(_) => None,
        }
    }

    fn color(&self, name: &str) -> ratatui::style::Color {
        self.theme.get(name)
    }

    fn render_header(&self, area: Rect, buf: &mut Buffer) {
        let mut spans = vec![
            Span::styled(
                format!(" {} ", self.session.key()),
                Style::default()
                    .fg(self.color("primary"))
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("({}) ", self.session.version()),
                Style::default().fg(self.color("text_secondary")),
            ),
            Span::raw(self.session.filter_description()),
        ];
        if let Some(group_by) = &self.group_by {
            spans.push(Span::styled(
                format!("  grouped by {group_by}"),
                Style::default().fg(self.color("secondary")),
            ));
        }
        if self.session.state() == LoadState::Loading {
            spans.push(Span::styled(
                "  Loading…",
                Style::default().fg(self.color("warning")),
            ));
        }
        Paragraph::new(Line::from(spans)).render(area, buf);
    }

    fn render_panels(&self, area: Rect, buf: &mut Buffer) {
        if self.panels.is_empty() {
            let text = match self.session.dictionary() {
                None => format!("Loading {}…", self.session.key()),
                Some(_) => "No fields selected".to_string(),
            };
            Paragraph::new(text)
                .style(Style::default().fg(self.color("text_secondary")))
                .centered()
                .render(area, buf);
            return;
        }
        let (rows, cols) = grid_shape(self.panels.len());
        let row_areas = Layout::default()
            .direction(Direction::Vertical)
            .constraints(vec![Constraint::Fill(1); rows])
            .split(area);
        for (r, row_area) in row_areas.iter().enumerate() {
            let cells = Layout::default()
                .direction(Direction::Horizontal)
                .constraints(vec![Constraint::Fill(1); cols])
                .split(*row_area);
            for (c, cell_area) in cells.iter().enumerate() {
                let i = r * cols + c;
                if let Some(panel) = self.panels.get(i) {
                    render_panel(
                        *cell_area,
                        buf,
                        panel,
                        &self.theme,
                        self.label_max_len,
                        i == self.focus,
                    );
                }
            }
        }
    }
}

impl Widget for &mut App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        self.debug.num_frames += 1;

        Block::default().render(area, buf);

        let mut constraints = vec![Constraint::Length(1), Constraint::Fill(1)];
        let notification = self.session.notification().map(str::to_string);
        if notification.is_some() {
            constraints.push(Constraint::Length(1));
        }
        constraints.push(Constraint::Length(1)); // Controls
        if self.debug.enabled {
            constraints.push(Constraint::Length(1));
        }
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(area);

        self.render_header(layout[0], buf);
        self.render_panels(layout[1], buf);

        let mut next = 2;
        if let Some(message) = notification {
            Paragraph::new(message)
                .style(Style::default().fg(self.color("error")))
                .render(layout[next], buf);
            next += 1;
        }

        let page = self.session.page();
        let controls = Controls::new()
            .with_page(
                self.session.page_number(),
                self.session.page_count(),
                page.total,
            )
            .with_dimmed(self.session.state() == LoadState::Loading)
            .with_grouped(self.group_by.is_some());
        controls.render(layout[next], buf);
        next += 1;

        if self.debug.enabled {
            let text = format!(
                "seq {} | events {} | dropped {} | frames {} | panels {} | rows {}",
                self.session.seq(),
                self.debug.num_events,
                self.debug.dropped_events,
                self.debug.num_frames,
                self.panels.len(),
                page.records.len()
            );
            Paragraph::new(text)
                .style(Style::default().fg(self.color("dimmed")))
                .render(layout[next], buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Record, Scalar};
    use std::sync::mpsc::{channel, Receiver};

    fn backend() -> StaticBackend {
        let dict = DataDictionary::new(vec![
            FieldMeta::new("sex", DataType::String).with_order(1),
            FieldMeta::new("age", DataType::Number).with_order(2),
        ]);
        let rows: Vec<Record> = (0..30)
            .map(|i| {
                [
                    (
                        "sex".to_string(),
                        Scalar::from(if i % 3 == 0 { "F" } else { "M" }),
                    ),
                    ("age".to_string(), Scalar::from(40.0 + i as f64)),
                ]
                .into()
            })
            .collect();
        StaticBackend::new(dict, rows)
    }

    fn app(page_size: usize) -> (App, Receiver<AppEvent>) {
        let (tx, rx) = channel();
        let options = SessionOptions {
            page_size,
            ..SessionOptions::default()
        };
        let session = DatasetSession::new("demo", "latest", options);
        let app = App::new(tx, Arc::new(backend()), session, Theme::default());
        (app, rx)
    }

    /// Run a load synchronously through the app, the way the worker would.
    fn load(app: &mut App, event: AppEvent) {
        let AppEvent::Load(request) = event else {
            panic!("expected a load request");
        };
        for e in run_load(app.backend.as_ref(), &request) {
            app.event(&AppEvent::Session(e));
        }
    }

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn test_start_builds_field_panels() {
        let (mut app, _rx) = app(10);
        let start = AppEvent::Load(app.session.start());
        load(&mut app, start);
        assert_eq!(app.session().state(), LoadState::Ready);
        assert_eq!(app.panels().len(), 2);
        assert_eq!(app.panels()[0].title, "sex");
    }

    #[test]
    fn test_paging_keys_issue_loads() {
        let (mut app, _rx) = app(10);
        let start = AppEvent::Load(app.session.start());
        load(&mut app, start);
        let next = app.event(&key(KeyCode::Char('n')));
        assert!(matches!(&next, Some(AppEvent::Load(r)) if r.page.page == 2));
        load(&mut app, next.unwrap());
        assert_eq!(app.session().page_number(), 2);
        // Already on the first page after going back.
        let prev = app.event(&key(KeyCode::Char('p')));
        load(&mut app, prev.unwrap());
        assert!(app.event(&key(KeyCode::Char('p'))).is_none());
    }

    #[test]
    fn test_quit_key_exits() {
        let (mut app, _rx) = app(10);
        assert!(matches!(
            app.event(&key(KeyCode::Char('q'))),
            Some(AppEvent::Exit)
        ));
    }

    #[test]
    fn test_tab_cycles_focus() {
        let (mut app, _rx) = app(10);
        let start = AppEvent::Load(app.session.start());
        load(&mut app, start);
        app.event(&key(KeyCode::Tab));
        assert_eq!(app.focus(), 1);
        app.event(&key(KeyCode::Tab));
        assert_eq!(app.focus(), 0);
        app.event(&key(KeyCode::BackTab));
        assert_eq!(app.focus(), 1);
    }

    #[test]
    fn test_chart_key_cycles_grouped_view() {
        let (app, _rx) = app(30);
        let mut app = app.with_group_by(Some("sex".to_string()));
        let start = AppEvent::Load(app.session.start());
        load(&mut app, start);
        assert_eq!(app.panels().len(), 1);
        assert_eq!(app.panels()[0].title, "age by sex");
        assert!(app.chart().is_none());
        app.event(&key(KeyCode::Char('c')));
        assert_eq!(app.chart(), Some(GroupedChartKind::Violin));
        assert_eq!(
            app.panels()[0].recommendation.chart,
            ChartChoice::Grouped(GroupedChartKind::Violin)
        );
    }

    #[test]
    fn test_stale_results_are_counted() {
        let (mut app, _rx) = app(10);
        let first = AppEvent::Load(app.session.start());
        let AppEvent::Load(stale) = first else {
            panic!("expected a load request");
        };
        let second = AppEvent::Load(app.session.start());
        load(&mut app, second);
        for e in run_load(app.backend.as_ref(), &stale) {
            app.event(&AppEvent::Session(e));
        }
        assert_eq!(app.debug.dropped_events, 2);
    }

    #[test]
    fn test_render_shows_header_and_controls() {
        let (mut app, _rx) = app(10);
        let start = AppEvent::Load(app.session.start());
        load(&mut app, start);
        let area = Rect::new(0, 0, 120, 30);
        let mut buf = Buffer::empty(area);
        (&mut app).render(area, &mut buf);
        let text: String = buf.content().iter().map(|c| c.symbol()).collect();
        assert!(text.contains("demo"));
        assert!(text.contains("No filters"));
        assert!(text.contains("Rows: 30"));
    }
}

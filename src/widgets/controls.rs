use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Style, Stylize},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
};

/// Key hints plus the page position, shown on the bottom line.
#[derive(Debug, Default)]
pub struct Controls {
    pub page: Option<(usize, usize)>,
    pub total: Option<usize>,
    pub dimmed: bool,
    pub grouped: bool,
}

impl Controls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, page: usize, page_count: usize, total: usize) -> Self {
        self.page = Some((page, page_count));
        self.total = Some(total);
        self
    }

    pub fn with_dimmed(mut self, dimmed: bool) -> Self {
        self.dimmed = dimmed;
        self
    }

    pub fn with_grouped(mut self, grouped: bool) -> Self {
        self.grouped = grouped;
        self
    }

    fn status(&self) -> Option<String> {
        match (self.page, self.total) {
            (Some((page, count)), Some(total)) => {
                Some(format!("Page {page}/{count}  Rows: {total}"))
            }
            (None, Some(total)) => Some(format!("Rows: {total}")),
            _ => None,
        }
    }
}

const CONTROLS: [(&str, &str); 8] = [
    ("n", "Next"),
    ("p", "Prev"),
    ("+", "More"),
    ("-", "Less"),
    ("a", "All"),
    ("Tab", "Panel"),
    ("c", "Chart"),
    ("q", "Quit"),
];

impl Widget for &Controls {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let fg = if self.dimmed { Color::DarkGray } else { Color::White };
        let bar = Style::default().bg(Color::DarkGray);

        let mut spans = Vec::with_capacity(CONTROLS.len() * 2);
        for (key, action) in CONTROLS {
            spans.push(Span::styled(format!(" {key} "), Style::default().fg(fg).bold()));
            // Chart switching only applies to the grouped view.
            let action_fg = if key == "c" && !self.grouped {
                Color::Gray
            } else {
                fg
            };
            spans.push(Span::styled(format!("{action} "), bar.fg(action_fg)));
        }

        let status = self.status().unwrap_or_default();
        let [keys_area, status_area] = Layout::horizontal([
            Constraint::Fill(1),
            Constraint::Length(status.chars().count() as u16 + 1),
        ])
        .areas(area);

        buf.set_style(area, bar);
        Paragraph::new(Line::from(spans)).render(keys_area, buf);
        Paragraph::new(status)
            .style(bar.fg(fg))
            .right_aligned()
            .render(status_area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text() {
        assert_eq!(
            Controls::new().with_page(2, 5, 480).status().as_deref(),
            Some("Page 2/5  Rows: 480")
        );
        assert_eq!(Controls::new().status(), None);
    }

    #[test]
    fn test_render_shows_keys_and_status() {
        let area = Rect::new(0, 0, 120, 1);
        let mut buf = Buffer::empty(area);
        Controls::new().with_page(1, 3, 250).render(area, &mut buf);
        let text: String = buf.content().iter().map(|c| c.symbol()).collect();
        assert!(text.contains("Next"));
        assert!(text.contains("Quit"));
        assert!(text.contains("Rows: 250"));
    }
}

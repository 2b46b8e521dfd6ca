//! About overlay: product details and keyboard shortcuts.

use ratatui::{
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use super::{centered_rect, theme::Theme};
use crate::settings::AboutInfo;

const SHORTCUTS: [(&str, &str); 9] = [
    ("Tab / ↓", "Next field"),
    ("Shift+Tab / ↑", "Previous field"),
    ("← / →", "Change date, time or selection"),
    ("PgUp / PgDn", "Change date by a month"),
    ("t", "Set date to today"),
    ("Enter", "Browse / press button"),
    ("x", "Clear the image"),
    ("F1", "Show this dialog"),
    ("q / Ctrl+C", "Quit"),
];

/// About dialog
pub struct AboutOverlay<'a> {
    about: &'a AboutInfo,
    theme: &'a Theme,
}

impl<'a> AboutOverlay<'a> {
    pub fn new(about: &'a AboutInfo, theme: &'a Theme) -> Self {
        AboutOverlay { about, theme }
    }

    fn details(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Company", self.about.company.clone()),
            ("Application", self.about.app_name.clone()),
            ("Version", concat!("v", env!("CARGO_PKG_VERSION")).to_string()),
            ("Project", self.about.project.clone()),
            ("Website", self.about.website.clone()),
        ]
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let popup_area = centered_rect(65, 80, area);
        frame.render_widget(Clear, popup_area);

        let mut lines: Vec<Line> = vec![Line::from("")];
        for (label, value) in self.details() {
            lines.push(Line::from(vec![
                Span::raw("  "),
                Span::styled(format!("{label:<14}"), Style::default().fg(self.theme.title)),
                Span::raw(value),
            ]));
        }
        lines.push(Line::from(""));

        lines.push(Line::from(Span::styled(
            "  Keys ",
            Style::default()
                .add_modifier(Modifier::BOLD)
                .add_modifier(Modifier::UNDERLINED),
        )));
        lines.push(Line::from(""));
        for (key, desc) in SHORTCUTS {
            lines.push(Line::from(vec![
                Span::raw("    "),
                Span::styled(format!("{key:<16}"), Style::default().fg(self.theme.title)),
                Span::raw(desc),
            ]));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "  [Esc] close",
            self.theme.dimmed_title_style(),
        )));

        let paragraph = Paragraph::new(lines)
            .block(
                Block::default()
                    .title(" About ")
                    .title_alignment(Alignment::Center)
                    .borders(Borders::ALL)
                    .border_style(self.theme.border_style())
                    .title_style(self.theme.title_style())
                    .style(self.theme.surface_style()),
            )
            .alignment(Alignment::Left)
            .wrap(Wrap { trim: false })
            .style(self.theme.surface_style());

        frame.render_widget(paragraph, popup_area);
    }
}

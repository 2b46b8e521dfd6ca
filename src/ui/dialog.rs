//! Modal message box for completion and error notices.

use ratatui::{
    layout::{Alignment, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use super::{centered_rect, theme::Theme};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    Info,
    Error,
}

/// A titled message closed with Esc or Enter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDialog {
    pub kind: DialogKind,
    pub title: String,
    pub message: String,
}

impl MessageDialog {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        MessageDialog {
            kind: DialogKind::Info,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        MessageDialog {
            kind: DialogKind::Error,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let popup = centered_rect(60, 30, area);
        frame.render_widget(Clear, popup);

        let (border, title) = match self.kind {
            DialogKind::Info => (theme.focused_border_style(), theme.success_style()),
            DialogKind::Error => (theme.error_style(), theme.error_style()),
        };

        let lines = vec![
            Line::from(""),
            Line::from(self.message.as_str()),
            Line::from(""),
            Line::from(Span::styled("[Enter] OK", theme.dimmed_title_style())),
        ];

        let paragraph = Paragraph::new(lines)
            .block(
                Block::default()
                    .title(format!(" {} ", self.title))
                    .title_alignment(Alignment::Center)
                    .borders(Borders::ALL)
                    .border_style(border)
                    .title_style(title)
                    .style(theme.surface_style()),
            )
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: false });

        frame.render_widget(paragraph, popup);
    }
}

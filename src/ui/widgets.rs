//! Form widgets: banner, field panel and status bar.

use std::path::Path;

use ratatui::{
    layout::{Alignment, Rect},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph},
    Frame,
};

use super::theme::Theme;
use crate::form::{FormField, FormState};
use crate::settings::AboutInfo;

/// Title lines at the top of the screen
pub struct Banner<'a> {
    about: &'a AboutInfo,
    theme: &'a Theme,
}

impl<'a> Banner<'a> {
    pub fn new(about: &'a AboutInfo, theme: &'a Theme) -> Self {
        Banner { about, theme }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let lines = vec![
            Line::from(Span::styled(self.about.company.as_str(), self.theme.title_style())),
            Line::from(Span::styled(
                format!("{} | {}", self.about.app_name, self.about.project),
                self.theme.normal_style(),
            )),
        ];
        let paragraph = Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::BOTTOM).border_style(self.theme.border_style()));
        frame.render_widget(paragraph, area);
    }
}

/// Text shown for a field's current value
pub fn field_value(form: &FormState, field: FormField, save_dir: &Path) -> String {
    match field {
        FormField::StartDate => form.start_date.display(),
        FormField::StartTime => form.start_time.display(),
        FormField::EndDate => form.end_date.display(),
        FormField::EndTime => form.end_time.display(),
        FormField::Database => form.database.selected().unwrap_or("(none)").to_string(),
        FormField::Table => form.table.selected().unwrap_or("(none)").to_string(),
        FormField::Image => form
            .image
            .as_ref()
            .map_or_else(|| "(none)".to_string(), |p| p.display().to_string()),
        FormField::SaveLocation => save_dir.display().to_string(),
        FormField::Generate | FormField::About => String::new(),
    }
}

/// Key hint for the focused field
pub fn field_hint(field: FormField) -> &'static str {
    match field {
        FormField::StartDate | FormField::EndDate => "←/→ day  PgUp/PgDn month  t today",
        FormField::StartTime | FormField::EndTime => "←/→ hour",
        FormField::Database | FormField::Table => "←/→ choose",
        FormField::Image => "Enter browse  x clear",
        FormField::SaveLocation => "Enter browse",
        FormField::Generate => "Enter generate report",
        FormField::About => "Enter show details",
    }
}

/// The report form: one line per field
pub struct FormPanel<'a> {
    form: &'a FormState,
    save_dir: &'a Path,
    theme: &'a Theme,
}

impl<'a> FormPanel<'a> {
    pub fn new(form: &'a FormState, save_dir: &'a Path, theme: &'a Theme) -> Self {
        FormPanel {
            form,
            save_dir,
            theme,
        }
    }

    fn line(&self, field: FormField) -> Line<'static> {
        let focused = self.form.focused == field;
        let marker = if focused { "> " } else { "  " };

        if field.is_button() {
            let style = if focused {
                self.theme.highlight_style()
            } else {
                self.theme.title_style()
            };
            return Line::from(vec![
                Span::raw(marker),
                Span::styled(format!("[ {} ]", field.label()), style),
            ]);
        }

        let value = field_value(self.form, field, self.save_dir);
        let value_style = if focused {
            self.theme.highlight_style()
        } else {
            self.theme.normal_style()
        };
        let mut spans = vec![
            Span::raw(marker),
            Span::styled(format!("{:<15}", field.label()), self.theme.title_style()),
            Span::styled(format!(" {value} "), value_style),
        ];
        if focused {
            spans.push(Span::styled(
                format!("   {}", field_hint(field)),
                self.theme.dimmed_title_style(),
            ));
        }
        Line::from(spans)
    }

    pub fn render(&self, frame: &mut Frame, area: Rect, focused: bool) {
        let mut lines = Vec::with_capacity(FormField::ALL.len() + 2);
        for field in FormField::ALL {
            // gap before the buttons
            if field == FormField::Generate {
                lines.push(Line::from(""));
            }
            lines.push(self.line(field));
        }

        let block = Block::default()
            .title(" Report ")
            .borders(Borders::ALL)
            .border_type(if focused {
                BorderType::Double
            } else {
                BorderType::Plain
            })
            .border_style(if focused {
                self.theme.focused_border_style()
            } else {
                self.theme.border_style()
            })
            .title_style(self.theme.title_style());

        frame.render_widget(Paragraph::new(lines).block(block), area);
    }
}

/// Save location, asset warnings and the key legend
pub struct StatusBar<'a> {
    save_dir: &'a Path,
    warnings: &'a [String],
    theme: &'a Theme,
}

impl<'a> StatusBar<'a> {
    pub fn new(save_dir: &'a Path, warnings: &'a [String], theme: &'a Theme) -> Self {
        StatusBar {
            save_dir,
            warnings,
            theme,
        }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let first = match self.warnings.first() {
            Some(warning) => Line::from(Span::styled(
                format!("Warning: {warning}"),
                self.theme.warning_style(),
            )),
            None => Line::from(format!("Saving to {}", self.save_dir.display())),
        };
        let legend = Line::from(Span::styled(
            "[Tab] next  [Enter] select  [F1] about  [q] quit",
            self.theme.dimmed_title_style(),
        ));

        let paragraph = Paragraph::new(vec![first, legend])
            .block(Block::default().borders(Borders::TOP).border_style(self.theme.border_style()));
        frame.render_widget(paragraph, area);
    }
}

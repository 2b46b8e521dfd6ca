//! Main application logic and TUI event loop.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::info;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    Terminal,
};

use crate::data::{RowSource, SqlServerSource};
use crate::form::{FormField, FormState};
use crate::pipeline;
use crate::prefs::Preferences;
use crate::settings::AppConfig;
use crate::ui::{
    widgets::{Banner, FormPanel, StatusBar},
    AboutOverlay, BrowseMode, BrowseOutcome, FileBrowser, MessageDialog, Theme,
};

/// Popup drawn over the form; only one at a time
#[derive(Debug, Clone)]
enum Overlay {
    None,
    Message(MessageDialog),
    About,
    Browser(FileBrowser),
}

/// Application state
pub struct App {
    config: AppConfig,
    theme: Theme,
    form: FormState,
    prefs: Preferences,
    source: Box<dyn RowSource>,
    overlay: Overlay,
    asset_warnings: Vec<String>,
    should_quit: bool,
}

impl App {
    pub fn new(
        config: AppConfig,
        prefs: Preferences,
        source: Box<dyn RowSource>,
        asset_warnings: Vec<String>,
        today: NaiveDate,
    ) -> Self {
        let form = FormState::new(&config, today);
        App {
            config,
            theme: Theme::default(),
            form,
            prefs,
            source,
            overlay: Overlay::None,
            asset_warnings,
            should_quit: false,
        }
    }

    fn show_error(&mut self, message: impl Into<String>) {
        self.overlay = Overlay::Message(MessageDialog::error("Error", message));
    }

    /// Handle keyboard input
    fn handle_input(&mut self, key: KeyCode, modifiers: KeyModifiers) -> Result<()> {
        match &mut self.overlay {
            Overlay::Message(_) | Overlay::About => {
                if matches!(key, KeyCode::Esc | KeyCode::Enter | KeyCode::F(1)) {
                    self.overlay = Overlay::None;
                }
                return Ok(());
            }
            Overlay::Browser(browser) => {
                let mode = browser.mode();
                match browser.handle_key(key) {
                    BrowseOutcome::Pending => {}
                    BrowseOutcome::Cancelled => self.overlay = Overlay::None,
                    BrowseOutcome::Picked(path) => {
                        self.overlay = Overlay::None;
                        self.apply_pick(mode, path)?;
                    }
                }
                return Ok(());
            }
            Overlay::None => {}
        }

        // Global shortcuts
        match key {
            KeyCode::Char('q') => {
                self.should_quit = true;
                return Ok(());
            }
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
                return Ok(());
            }
            KeyCode::F(1) => {
                self.overlay = Overlay::About;
                return Ok(());
            }
            KeyCode::Tab | KeyCode::Down => {
                self.form.focused = self.form.focused.next();
                return Ok(());
            }
            KeyCode::BackTab | KeyCode::Up => {
                self.form.focused = self.form.focused.prev();
                return Ok(());
            }
            _ => {}
        }

        self.handle_field_input(key);
        Ok(())
    }

    fn handle_field_input(&mut self, key: KeyCode) {
        let form = &mut self.form;
        match form.focused {
            FormField::StartDate | FormField::EndDate => {
                let date = if form.focused == FormField::StartDate {
                    &mut form.start_date
                } else {
                    &mut form.end_date
                };
                match key {
                    KeyCode::Right => date.shift_days(1),
                    KeyCode::Left => date.shift_days(-1),
                    KeyCode::PageUp => date.shift_months(1),
                    KeyCode::PageDown => date.shift_months(-1),
                    KeyCode::Char('t') => date.set(Local::now().date_naive()),
                    _ => {}
                }
            }
            FormField::StartTime | FormField::EndTime => {
                let time = if form.focused == FormField::StartTime {
                    &mut form.start_time
                } else {
                    &mut form.end_time
                };
                match key {
                    KeyCode::Right => time.next(),
                    KeyCode::Left => time.prev(),
                    _ => {}
                }
            }
            FormField::Database => match key {
                KeyCode::Right => form.cycle_database(&self.config.catalog, true),
                KeyCode::Left => form.cycle_database(&self.config.catalog, false),
                _ => {}
            },
            FormField::Table => match key {
                KeyCode::Right => form.table.next(),
                KeyCode::Left => form.table.prev(),
                _ => {}
            },
            FormField::Image => match key {
                KeyCode::Enter => {
                    let start = form
                        .image
                        .as_deref()
                        .and_then(|p| p.parent())
                        .unwrap_or(self.prefs.save_dir())
                        .to_path_buf();
                    self.overlay = Overlay::Browser(FileBrowser::open(BrowseMode::Image, &start));
                }
                KeyCode::Char('x') => form.image = None,
                _ => {}
            },
            FormField::SaveLocation => {
                if key == KeyCode::Enter {
                    self.overlay = Overlay::Browser(FileBrowser::open(
                        BrowseMode::Directory,
                        self.prefs.save_dir(),
                    ));
                }
            }
            FormField::Generate => {
                if key == KeyCode::Enter {
                    self.generate();
                }
            }
            FormField::About => {
                if key == KeyCode::Enter {
                    self.overlay = Overlay::About;
                }
            }
        }
    }

    fn apply_pick(&mut self, mode: BrowseMode, path: PathBuf) -> Result<()> {
        match mode {
            BrowseMode::Image => self.form.image = Some(path),
            BrowseMode::Directory => self
                .prefs
                .set_save_dir(path)
                .context("Failed to remember save location")?,
        }
        Ok(())
    }

    /// Run the report pipeline and report the outcome in a dialog
    fn generate(&mut self) {
        let params = self.form.query_parameters();
        let outcome = pipeline::generate_report(
            &self.config,
            &params,
            self.form.image.as_deref(),
            self.prefs.save_dir(),
            self.source.as_ref(),
        );
        self.overlay = match outcome {
            Ok(path) => {
                info!("Report ready: {}", path.display());
                Overlay::Message(MessageDialog::info(
                    "Success",
                    format!("Report saved to {}", path.display()),
                ))
            }
            Err(e) => Overlay::Message(MessageDialog::error("Error", e.to_string())),
        };
    }

    /// Render the UI
    fn render(&self, frame: &mut ratatui::Frame) {
        let size = frame.area();

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Banner
                Constraint::Min(14),   // Form
                Constraint::Length(3), // Status bar
            ])
            .split(size);

        Banner::new(&self.config.about, &self.theme).render(frame, chunks[0]);

        let form_focused = matches!(self.overlay, Overlay::None);
        FormPanel::new(&self.form, self.prefs.save_dir(), &self.theme).render(
            frame,
            chunks[1],
            form_focused,
        );

        StatusBar::new(self.prefs.save_dir(), &self.asset_warnings, &self.theme)
            .render(frame, chunks[2]);

        match &self.overlay {
            Overlay::None => {}
            Overlay::Message(dialog) => dialog.render(frame, size, &self.theme),
            Overlay::About => AboutOverlay::new(&self.config.about, &self.theme).render(frame, size),
            Overlay::Browser(browser) => browser.render(frame, size, &self.theme),
        }
    }
}

/// Restore terminal to normal state
fn restore_terminal() {
    // Best effort cleanup - ignore errors since we may be in a panic
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
}

/// Run the TUI application
pub fn run(config: AppConfig, prefs: Preferences, asset_warnings: Vec<String>) -> Result<()> {
    // Setup terminal
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    if let Err(e) = execute!(stdout, EnterAlternateScreen, EnableMouseCapture) {
        restore_terminal();
        return Err(e).context("Failed to setup terminal");
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = match Terminal::new(backend) {
        Ok(t) => t,
        Err(e) => {
            restore_terminal();
            return Err(e).context("Failed to create terminal");
        }
    };

    let mut app = App::new(
        config,
        prefs,
        Box::new(SqlServerSource::new()),
        asset_warnings,
        Local::now().date_naive(),
    );

    let result = run_main_loop(&mut terminal, &mut app);

    // Always restore terminal, regardless of result
    restore_terminal();
    terminal.show_cursor().ok();

    result
}

/// Main application loop
fn run_main_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        terminal.draw(|f| app.render(f))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Err(e) = app.handle_input(key.code, key.modifiers) {
                        // Keep running; the failure is shown instead
                        app.show_error(format!("{e:#}"));
                    }
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::fs;
    use std::path::Path;
    use std::rc::Rc;

    use super::*;
    use crate::data::{BuiltQuery, CellValue, DatabaseDescriptor, ResultSet};
    use crate::error::AppResult;
    use crate::prefs::PREFERENCE_FILE;
    use crate::settings::Paths;
    use crate::ui::dialog::DialogKind;

    struct CountingSource(Rc<Cell<usize>>);

    impl RowSource for CountingSource {
        fn fetch(&self, _: &DatabaseDescriptor, _: &BuiltQuery) -> AppResult<ResultSet> {
            self.0.set(self.0.get() + 1);
            let mut result = ResultSet::new(vec!["DateAndTime".to_string()]);
            result.push_row(vec![CellValue::Text("05-03-2024 01:00:00".to_string())]);
            Ok(result)
        }
    }

    fn app(root: &Path, with_template: bool) -> (App, Rc<Cell<usize>>) {
        let paths = Paths::new(root, root.join("assets"));
        if with_template {
            fs::create_dir_all(&paths.assets_dir).unwrap();
            let mut workbook = rust_xlsxwriter::Workbook::new();
            workbook.add_worksheet();
            workbook.save(paths.bundled_template()).unwrap();
        }
        let prefs = Preferences::load(root.join(PREFERENCE_FILE), &paths.reports_dir).unwrap();
        let calls = Rc::new(Cell::new(0));
        let app = App::new(
            AppConfig::with_defaults(paths),
            prefs,
            Box::new(CountingSource(Rc::clone(&calls))),
            Vec::new(),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
        );
        (app, calls)
    }

    fn press(app: &mut App, key: KeyCode) {
        app.handle_input(key, KeyModifiers::NONE).unwrap();
    }

    fn focus(app: &mut App, field: FormField) {
        while app.form.focused != field {
            press(app, KeyCode::Tab);
        }
    }

    fn dialog(app: &App) -> Option<&MessageDialog> {
        match &app.overlay {
            Overlay::Message(d) => Some(d),
            _ => None,
        }
    }

    #[test]
    fn test_quit_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut app, _) = app(tmp.path(), true);
        press(&mut app, KeyCode::Char('q'));
        assert!(app.should_quit);

        let (mut app, _) = self::app(tmp.path(), true);
        app.handle_input(KeyCode::Char('c'), KeyModifiers::CONTROL).unwrap();
        assert!(app.should_quit);
    }

    #[test]
    fn test_quit_ignored_while_about_is_open() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut app, _) = app(tmp.path(), true);
        press(&mut app, KeyCode::F(1));
        assert!(matches!(app.overlay, Overlay::About));

        press(&mut app, KeyCode::Char('q'));
        assert!(!app.should_quit);
        press(&mut app, KeyCode::Esc);
        assert!(matches!(app.overlay, Overlay::None));
    }

    #[test]
    fn test_focus_navigation() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut app, _) = app(tmp.path(), true);
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.form.focused, FormField::StartTime);
        press(&mut app, KeyCode::Down);
        assert_eq!(app.form.focused, FormField::EndDate);
        press(&mut app, KeyCode::BackTab);
        press(&mut app, KeyCode::Up);
        assert_eq!(app.form.focused, FormField::StartDate);
    }

    #[test]
    fn test_date_and_time_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut app, _) = app(tmp.path(), true);
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::PageDown);
        assert_eq!(app.form.start_date.display(), "2024-02-06");

        focus(&mut app, FormField::EndTime);
        press(&mut app, KeyCode::Left);
        assert_eq!(app.form.end_time.display(), "23:00:00");
    }

    #[test]
    fn test_database_change_refreshes_tables() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut app, _) = app(tmp.path(), true);
        focus(&mut app, FormField::Database);
        press(&mut app, KeyCode::Right);
        assert_eq!(app.form.database.selected(), Some("KINLEY_RO_DB"));
        assert_eq!(app.form.table.selected(), Some("all_data"));
    }

    #[test]
    fn test_generate_shows_output_path() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut app, calls) = app(tmp.path(), true);
        focus(&mut app, FormField::Generate);
        press(&mut app, KeyCode::Enter);

        assert_eq!(calls.get(), 1);
        let dialog = dialog(&app).unwrap();
        assert_eq!(dialog.kind, DialogKind::Info);
        assert!(dialog.message.contains("CP_CPK_"));

        press(&mut app, KeyCode::Enter);
        assert!(matches!(app.overlay, Overlay::None));
        assert!(!app.should_quit);
    }

    #[test]
    fn test_generate_without_table_shows_error() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut app, calls) = app(tmp.path(), true);
        app.form.table.set_items(Vec::new());
        focus(&mut app, FormField::Generate);
        press(&mut app, KeyCode::Enter);

        assert_eq!(calls.get(), 0);
        let dialog = dialog(&app).unwrap();
        assert_eq!(dialog.kind, DialogKind::Error);
        assert_eq!(dialog.message, "Table not selected");
    }

    #[test]
    fn test_generate_without_template_shows_error() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut app, calls) = app(tmp.path(), false);
        focus(&mut app, FormField::Generate);
        press(&mut app, KeyCode::Enter);

        assert_eq!(calls.get(), 0);
        assert_eq!(dialog(&app).unwrap().kind, DialogKind::Error);
    }

    #[test]
    fn test_save_location_is_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut app, _) = app(tmp.path(), true);
        let chosen = app.prefs.save_dir().join("monthly");
        fs::create_dir_all(&chosen).unwrap();

        focus(&mut app, FormField::SaveLocation);
        press(&mut app, KeyCode::Enter);
        assert!(matches!(app.overlay, Overlay::Browser(_)));
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Char('s'));

        assert!(matches!(app.overlay, Overlay::None));
        assert_eq!(app.prefs.save_dir(), chosen);
        assert_eq!(
            fs::read_to_string(tmp.path().join(PREFERENCE_FILE)).unwrap(),
            chosen.to_string_lossy()
        );
    }

    #[test]
    fn test_image_pick_and_clear() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut app, _) = app(tmp.path(), true);
        let logo = app.prefs.save_dir().join("logo.png");
        fs::write(&logo, b"").unwrap();

        focus(&mut app, FormField::Image);
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.form.image.as_deref(), Some(logo.as_path()));

        press(&mut app, KeyCode::Char('x'));
        assert!(app.form.image.is_none());
    }

    #[test]
    fn test_browser_cancel_keeps_values() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut app, _) = app(tmp.path(), true);
        let before = app.prefs.save_dir().to_path_buf();

        focus(&mut app, FormField::SaveLocation);
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Char('q'));
        assert!(!app.should_quit);
        press(&mut app, KeyCode::Esc);

        assert!(matches!(app.overlay, Overlay::None));
        assert_eq!(app.prefs.save_dir(), before);
    }
}

//! Modal file browser used by the image and save-location pickers.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crossterm::event::KeyCode;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Frame,
};

use super::{centered_rect, theme::Theme};

/// Image extensions offered by the image picker
pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "gif"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowseMode {
    /// Pick an image file
    Image,
    /// Pick a directory
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Result of feeding a key to the browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseOutcome {
    Pending,
    Picked(PathBuf),
    Cancelled,
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|i| i.eq_ignore_ascii_case(ext)))
}

/// Visible entries of `dir`: directories first, then files, each sorted by
/// name; hidden entries are skipped and image mode lists only images
pub fn list_entries(dir: &Path, mode: BrowseMode) -> io::Result<Vec<BrowserEntry>> {
    let mut entries: Vec<BrowserEntry> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                return None;
            }
            let path = entry.path();
            let is_dir = path.is_dir();
            let keep = match mode {
                _ if is_dir => true,
                BrowseMode::Image => is_image_file(&path),
                BrowseMode::Directory => false,
            };
            keep.then_some(BrowserEntry { name, path, is_dir })
        })
        .collect();

    entries.sort_by(|a, b| {
        b.is_dir
            .cmp(&a.is_dir)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    Ok(entries)
}

/// Browser state: current directory, its entries and the cursor
#[derive(Debug, Clone)]
pub struct FileBrowser {
    mode: BrowseMode,
    dir: PathBuf,
    entries: Vec<BrowserEntry>,
    selected: usize,
    error: Option<String>,
}

impl FileBrowser {
    pub fn open(mode: BrowseMode, start: &Path) -> Self {
        let mut browser = FileBrowser {
            mode,
            dir: start.to_path_buf(),
            entries: Vec::new(),
            selected: 0,
            error: None,
        };
        browser.load();
        browser
    }

    pub fn mode(&self) -> BrowseMode {
        self.mode
    }

    fn load(&mut self) {
        self.selected = 0;
        match list_entries(&self.dir, self.mode) {
            Ok(entries) => {
                self.entries = entries;
                self.error = None;
            }
            Err(e) => {
                self.entries.clear();
                self.error = Some(format!("Cannot read {}: {e}", self.dir.display()));
            }
        }
    }

    fn enter(&mut self, dir: PathBuf) {
        self.dir = dir;
        self.load();
    }

    pub fn handle_key(&mut self, key: KeyCode) -> BrowseOutcome {
        match key {
            KeyCode::Esc => return BrowseOutcome::Cancelled,
            KeyCode::Down | KeyCode::Char('j') => {
                if !self.entries.is_empty() {
                    self.selected = (self.selected + 1) % self.entries.len();
                }
            }
            KeyCode::Up | KeyCode::Char('k') => {
                if !self.entries.is_empty() {
                    self.selected = self
                        .selected
                        .checked_sub(1)
                        .unwrap_or(self.entries.len() - 1);
                }
            }
            KeyCode::Backspace | KeyCode::Left => {
                if let Some(parent) = self.dir.parent().map(Path::to_path_buf) {
                    self.enter(parent);
                }
            }
            KeyCode::Enter | KeyCode::Right => {
                if let Some(entry) = self.entries.get(self.selected).cloned() {
                    if entry.is_dir {
                        self.enter(entry.path);
                    } else if self.mode == BrowseMode::Image {
                        return BrowseOutcome::Picked(entry.path);
                    }
                }
            }
            KeyCode::Char('s') if self.mode == BrowseMode::Directory => {
                return BrowseOutcome::Picked(self.dir.clone());
            }
            _ => {}
        }
        BrowseOutcome::Pending
    }

    pub fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let popup = centered_rect(70, 70, area);
        frame.render_widget(Clear, popup);

        let title = match self.mode {
            BrowseMode::Image => " Select Image ",
            BrowseMode::Directory => " Select Save Location ",
        };
        let block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(theme.focused_border_style())
            .title_style(theme.title_style())
            .style(theme.surface_style());
        let inner = block.inner(popup);
        frame.render_widget(block, popup);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // Current directory
                Constraint::Min(1),    // Entries
                Constraint::Length(1), // Keys
            ])
            .split(inner);

        frame.render_widget(
            Paragraph::new(self.dir.display().to_string()).style(theme.title_style()),
            chunks[0],
        );

        if let Some(error) = &self.error {
            frame.render_widget(Paragraph::new(error.as_str()).style(theme.error_style()), chunks[1]);
        } else {
            let items: Vec<ListItem> = self
                .entries
                .iter()
                .map(|e| {
                    if e.is_dir {
                        ListItem::new(format!("{}/", e.name)).style(theme.title_style())
                    } else {
                        ListItem::new(e.name.clone()).style(theme.normal_style())
                    }
                })
                .collect();
            let list = List::new(items)
                .highlight_style(theme.highlight_style())
                .highlight_symbol("> ");
            let mut state = ListState::default();
            if !self.entries.is_empty() {
                state.select(Some(self.selected));
            }
            frame.render_stateful_widget(list, chunks[1], &mut state);
        }

        let keys = match self.mode {
            BrowseMode::Image => "[Enter] open/pick  [Backspace] up  [Esc] cancel",
            BrowseMode::Directory => "[Enter] open  [s] select this folder  [Backspace] up  [Esc] cancel",
        };
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(keys, theme.dimmed_title_style()))),
            chunks[2],
        );
    }
}

//! Form field state.
//!
//! Holds the values behind the report form and the rules for changing them,
//! independent of how they are drawn.

use std::path::PathBuf;

use chrono::{Days, Months, NaiveDate, NaiveTime};

use crate::data::{QueryParameters, TableCatalog};
use crate::settings::AppConfig;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Focusable form fields, in tab order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    StartDate,
    StartTime,
    EndDate,
    EndTime,
    Database,
    Table,
    Image,
    SaveLocation,
    Generate,
    About,
}

impl FormField {
    pub const ALL: [FormField; 10] = [
        FormField::StartDate,
        FormField::StartTime,
        FormField::EndDate,
        FormField::EndTime,
        FormField::Database,
        FormField::Table,
        FormField::Image,
        FormField::SaveLocation,
        FormField::Generate,
        FormField::About,
    ];

    fn index(self) -> usize {
        Self::ALL.iter().position(|f| *f == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }

    pub fn label(self) -> &'static str {
        match self {
            FormField::StartDate => "Start Date",
            FormField::StartTime => "Start Time",
            FormField::EndDate => "End Date",
            FormField::EndTime => "End Time",
            FormField::Database => "Database",
            FormField::Table => "Table",
            FormField::Image => "Image",
            FormField::SaveLocation => "Save Location",
            FormField::Generate => "Generate Excel",
            FormField::About => "About",
        }
    }

    pub fn is_button(self) -> bool {
        matches!(self, FormField::Generate | FormField::About)
    }
}

/// Calendar date stepped by day or month
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateField {
    date: NaiveDate,
}

impl DateField {
    pub fn new(date: NaiveDate) -> Self {
        DateField { date }
    }

    pub fn set(&mut self, date: NaiveDate) {
        self.date = date;
    }

    pub fn shift_days(&mut self, days: i64) {
        let step = Days::new(days.unsigned_abs());
        let moved = if days >= 0 {
            self.date.checked_add_days(step)
        } else {
            self.date.checked_sub_days(step)
        };
        if let Some(date) = moved {
            self.date = date;
        }
    }

    /// Month arithmetic clamps to the last day of shorter months
    pub fn shift_months(&mut self, months: i32) {
        let step = Months::new(months.unsigned_abs());
        let moved = if months >= 0 {
            self.date.checked_add_months(step)
        } else {
            self.date.checked_sub_months(step)
        };
        if let Some(date) = moved {
            self.date = date;
        }
    }

    pub fn display(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }
}

/// On-the-hour choices offered by the time dropdowns
pub fn hourly_times() -> Vec<NaiveTime> {
    (0..24)
        .filter_map(|h| NaiveTime::from_hms_opt(h, 0, 0))
        .collect()
}

/// Time-of-day dropdown.
///
/// The value need not be one of the options (the end time starts at
/// `23:59:59`); stepping moves to the nearest option in that direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeField {
    value: NaiveTime,
    options: Vec<NaiveTime>,
}

impl TimeField {
    pub fn new(value: NaiveTime) -> Self {
        TimeField {
            value,
            options: hourly_times(),
        }
    }

    pub fn next(&mut self) {
        if let Some(t) = self
            .options
            .iter()
            .find(|t| **t > self.value)
            .or_else(|| self.options.first())
        {
            self.value = *t;
        }
    }

    pub fn prev(&mut self) {
        if let Some(t) = self
            .options
            .iter()
            .rev()
            .find(|t| **t < self.value)
            .or_else(|| self.options.last())
        {
            self.value = *t;
        }
    }

    pub fn display(&self) -> String {
        self.value.format(TIME_FORMAT).to_string()
    }
}

/// Dropdown over a list of names; wraps at both ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Choice {
    items: Vec<String>,
    selected: usize,
}

impl Choice {
    pub fn new(items: Vec<String>) -> Self {
        Choice { items, selected: 0 }
    }

    pub fn selected(&self) -> Option<&str> {
        self.items.get(self.selected).map(String::as_str)
    }

    /// Replace the items and select the first one
    pub fn set_items(&mut self, items: Vec<String>) {
        self.items = items;
        self.selected = 0;
    }

    pub fn next(&mut self) {
        if !self.items.is_empty() {
            self.selected = (self.selected + 1) % self.items.len();
        }
    }

    pub fn prev(&mut self) {
        if !self.items.is_empty() {
            self.selected = self.selected.checked_sub(1).unwrap_or(self.items.len() - 1);
        }
    }
}

/// Values of every form field
#[derive(Debug, Clone)]
pub struct FormState {
    pub focused: FormField,
    pub start_date: DateField,
    pub start_time: TimeField,
    pub end_date: DateField,
    pub end_time: TimeField,
    pub database: Choice,
    pub table: Choice,
    pub image: Option<PathBuf>,
}

impl FormState {
    /// Defaults: today's full day, first database and its first table
    pub fn new(config: &AppConfig, today: NaiveDate) -> Self {
        let database = Choice::new(config.database_names());
        let table = Choice::new(
            database
                .selected()
                .map(|db| config.catalog.tables(db).to_vec())
                .unwrap_or_default(),
        );
        FormState {
            focused: FormField::StartDate,
            start_date: DateField::new(today),
            start_time: TimeField::new(NaiveTime::MIN),
            end_date: DateField::new(today),
            end_time: TimeField::new(end_of_day()),
            database,
            table,
            image: None,
        }
    }

    /// Step the database dropdown and reload the table list for it
    pub fn cycle_database(&mut self, catalog: &TableCatalog, forward: bool) {
        if forward {
            self.database.next();
        } else {
            self.database.prev();
        }
        let tables = self
            .database
            .selected()
            .map(|db| catalog.tables(db).to_vec())
            .unwrap_or_default();
        self.table.set_items(tables);
    }

    pub fn start_bound(&self) -> String {
        format!("{} {}", self.start_date.display(), self.start_time.display())
    }

    pub fn end_bound(&self) -> String {
        format!("{} {}", self.end_date.display(), self.end_time.display())
    }

    /// Parameters for the current selection; an empty table means none chosen
    pub fn query_parameters(&self) -> QueryParameters {
        QueryParameters {
            database: self.database.selected().unwrap_or_default().to_string(),
            table: self.table.selected().unwrap_or_default().to_string(),
            start: self.start_bound(),
            end: self.end_bound(),
        }
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

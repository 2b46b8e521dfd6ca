//! Form submission: query, fetch and render in one synchronous call.

use std::path::{Path, PathBuf};

use chrono::Local;
use log::{error, info};

use crate::data::{build_query, QueryParameters, RowSource};
use crate::error::{AppError, AppResult};
use crate::report::{ensure_writable_template, render_report, ReportRequest};
use crate::settings::AppConfig;

/// Produce a report for the submitted form values and return its path
pub fn generate_report(
    config: &AppConfig,
    params: &QueryParameters,
    image: Option<&Path>,
    save_dir: &Path,
    source: &dyn RowSource,
) -> AppResult<PathBuf> {
    let result = run(config, params, image, save_dir, source);
    if let Err(e) = &result {
        error!("Report generation failed: {e}");
    }
    result
}

fn run(
    config: &AppConfig,
    params: &QueryParameters,
    image: Option<&Path>,
    save_dir: &Path,
    source: &dyn RowSource,
) -> AppResult<PathBuf> {
    if params.table.trim().is_empty() {
        return Err(AppError::NoTableSelected);
    }
    let database = config
        .database(&params.database)
        .ok_or_else(|| AppError::UnknownDatabase(params.database.clone()))?;

    let query = build_query(params)?;
    let template =
        ensure_writable_template(&config.paths.bundled_template(), &config.paths.scratch_dir)?;

    info!(
        "Querying {}.{} from {} to {} (style {})",
        params.database,
        params.table,
        params.start,
        params.end,
        query.style.code()
    );
    let result = source.fetch(database, &query)?;

    render_report(
        &result,
        &ReportRequest {
            template: &template,
            save_dir,
            database: &params.database,
            table: &params.table,
            start: &params.start,
            end: &params.end,
            image,
            generated_at: Local::now().naive_local(),
        },
    )
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fs;
    use std::io;

    use super::*;
    use crate::data::{BuiltQuery, CellValue, DatabaseDescriptor, ResultSet};
    use crate::settings::Paths;

    /// Returns a canned result and remembers what it was asked for
    struct FakeSource {
        result: ResultSet,
        seen: RefCell<Vec<(String, BuiltQuery)>>,
    }

    impl FakeSource {
        fn new() -> Self {
            let mut result = ResultSet::new(vec!["DateAndTime".to_string(), "Flow".to_string()]);
            result.push_row(vec![
                CellValue::Text("31-01-2024 23:00:00".to_string()),
                CellValue::Float(4.25),
            ]);
            FakeSource {
                result,
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl RowSource for FakeSource {
        fn fetch(&self, database: &DatabaseDescriptor, query: &BuiltQuery) -> AppResult<ResultSet> {
            self.seen
                .borrow_mut()
                .push((database.name.clone(), query.clone()));
            Ok(self.result.clone())
        }
    }

    struct Unreachable;

    impl RowSource for Unreachable {
        fn fetch(&self, _: &DatabaseDescriptor, _: &BuiltQuery) -> AppResult<ResultSet> {
            Err(AppError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "server unreachable",
            )))
        }
    }

    fn config(root: &Path, with_template: bool) -> AppConfig {
        let paths = Paths::new(root, root.join("assets"));
        if with_template {
            fs::create_dir_all(&paths.assets_dir).unwrap();
            let mut workbook = rust_xlsxwriter::Workbook::new();
            workbook.add_worksheet();
            workbook.save(paths.bundled_template()).unwrap();
        }
        AppConfig::with_defaults(paths)
    }

    fn params(table: &str) -> QueryParameters {
        QueryParameters {
            database: "KINLEY_MIS_DB".to_string(),
            table: table.to_string(),
            start: "2024-01-01 00:00:00".to_string(),
            end: "2024-01-31 23:59:59".to_string(),
        }
    }

    #[test]
    fn test_generates_report() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path(), true);
        let save_dir = tmp.path().join("out");
        fs::create_dir_all(&save_dir).unwrap();
        let source = FakeSource::new();

        let output = generate_report(&config, &params("mis_tab"), None, &save_dir, &source).unwrap();

        assert_eq!(output.parent(), Some(save_dir.as_path()));
        let name = output.file_name().unwrap().to_string_lossy().into_owned();
        let stamp = name
            .strip_prefix("mis_tab_")
            .and_then(|s| s.strip_suffix(".xlsx"))
            .unwrap();
        assert_eq!(stamp.len(), 15);
        assert!(stamp[..8].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(&stamp[8..9], "_");
        assert!(stamp[9..].chars().all(|c| c.is_ascii_digit()));
        assert!(output.is_file());

        let seen = source.seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "KINLEY_MIS_DB");
        assert_eq!(seen[0].1.style.code(), 105);
        assert_eq!(seen[0].1.start, "01-01-2024 00:00:00");
        assert_eq!(seen[0].1.end, "31-01-2024 23:59:59");

        // writable copy provisioned next to the log file
        assert!(config.paths.scratch_dir.join("Report_Template.xlsx").is_file());
    }

    #[test]
    fn test_empty_table_is_rejected_before_querying() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path(), true);
        let source = FakeSource::new();

        let result = generate_report(&config, &params(""), None, tmp.path(), &source);
        assert!(matches!(result, Err(AppError::NoTableSelected)));
        assert_eq!(result.unwrap_err().to_string(), "Table not selected");
        assert!(source.seen.borrow().is_empty());
    }

    #[test]
    fn test_unknown_database() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path(), true);
        let mut p = params("mis_tab");
        p.database = "OTHER".to_string();

        let result = generate_report(&config, &p, None, tmp.path(), &FakeSource::new());
        assert!(matches!(result, Err(AppError::UnknownDatabase(name)) if name == "OTHER"));
    }

    #[test]
    fn test_missing_template_stops_before_querying() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path(), false);
        let source = FakeSource::new();

        let result = generate_report(&config, &params("mis_tab"), None, tmp.path(), &source);
        assert!(matches!(result, Err(AppError::TemplateMissing(_))));
        assert!(source.seen.borrow().is_empty());
    }

    #[test]
    fn test_connection_failure_is_returned() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path(), true);

        let result = generate_report(&config, &params("mis_tab"), None, tmp.path(), &Unreachable);
        assert!(matches!(result, Err(AppError::Io(_))));
        let reports = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|x| x == "xlsx"))
            .count();
        assert_eq!(reports, 0);
    }

    #[test]
    fn test_inverted_range_still_runs() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path(), true);
        let mut p = params("ro_tab");
        p.database = "KINLEY_RO_DB".to_string();
        std::mem::swap(&mut p.start, &mut p.end);
        let source = FakeSource::new();

        generate_report(&config, &p, None, tmp.path(), &source).unwrap();
        assert_eq!(source.seen.borrow()[0].1.style.code(), 120);
    }
}

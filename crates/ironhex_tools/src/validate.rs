//! Data validation utilities.
//!
//! A data directory holds unit definitions under `units/` and boards under
//! `boards/`, one RON value per `.ron` file.

use std::path::{Path, PathBuf};

use thiserror::Error;

use ironhex_core::data::{max_armor, parse_board, parse_unit, UnitData};
use ironhex_core::entity::{Chassis, Entity};

/// Error type for validation runs.
#[derive(Error, Debug)]
pub enum ValidateError {
    /// The directory could not be read.
    #[error("Failed to read '{path}': {source}")]
    Io {
        /// Path being read.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Some files failed.
    #[error("{failed} of {checked} data files failed validation")]
    Invalid {
        /// Files checked.
        checked: usize,
        /// Files that failed.
        failed: usize,
    },
}

/// One problem with one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Offending file.
    pub path: PathBuf,
    /// What is wrong.
    pub message: String,
}

/// Outcome of checking a directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Files checked.
    pub checked: usize,
    /// Problems found.
    pub failures: Vec<Failure>,
}

impl ValidationReport {
    /// Whether every file passed.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, path: &Path, message: impl Into<String>) {
        self.failures.push(Failure {
            path: path.to_path_buf(),
            message: message.into(),
        });
    }
}

/// `.ron` files directly inside `dir`, sorted. A missing directory has none.
fn ron_files(dir: &Path) -> Result<Vec<PathBuf>, ValidateError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(dir).map_err(|source| ValidateError::Io {
        path: dir.display().to_string(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("ron"))
        .collect();
    files.sort();
    Ok(files)
}

/// Armor over the location maximum, which construction does not catch.
fn armor_problems(unit: &UnitData) -> Vec<String> {
    if unit.layout == Chassis::Platoon {
        return Vec::new();
    }
    unit.armor
        .iter()
        .filter_map(|a| {
            let max = max_armor(unit.layout, unit.tonnage, a.location);
            (a.front + a.rear > max).then(|| {
                format!(
                    "{:?} carries {} armor, more than the {max} allowed",
                    a.location,
                    a.front + a.rear
                )
            })
        })
        .collect()
}

/// Check one unit file.
fn check_unit(path: &Path, report: &mut ValidationReport) {
    let label = path.display().to_string();
    let unit = match std::fs::read_to_string(path) {
        Ok(source) => parse_unit(&source, &label),
        Err(e) => {
            report.fail(path, e.to_string());
            return;
        }
    };
    let unit = match unit {
        Ok(unit) => unit,
        Err(e) => {
            report.fail(path, e.to_string());
            return;
        }
    };
    if let Err(e) = Entity::from_unit_data(0, 0, &unit) {
        report.fail(path, e.to_string());
        return;
    }
    for problem in armor_problems(&unit) {
        report.fail(path, problem);
    }
    tracing::debug!(unit = %unit.display_name(), "unit checked");
}

/// Check one board file.
fn check_board(path: &Path, report: &mut ValidationReport) {
    let label = path.display().to_string();
    let result = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|source| parse_board(&source, &label).map_err(|e| e.to_string()));
    match result {
        Ok(board) => tracing::debug!(board = board.name(), "board checked"),
        Err(e) => report.fail(path, e),
    }
}

/// Kind of data held in a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    /// A `UnitData` definition.
    Unit,
    /// A `BoardData` definition.
    Board,
}

/// Check one data file.
#[must_use]
pub fn check_file(path: &Path, kind: DataKind) -> ValidationReport {
    let mut report = ValidationReport {
        checked: 1,
        ..ValidationReport::default()
    };
    match kind {
        DataKind::Unit => check_unit(path, &mut report),
        DataKind::Board => check_board(path, &mut report),
    }
    report
}

/// Check every unit and board file under a data directory.
///
/// # Errors
///
/// Returns an error if a directory exists but cannot be read.
pub fn check_data_directory(path: &Path) -> Result<ValidationReport, ValidateError> {
    let mut report = ValidationReport::default();
    for file in ron_files(&path.join("units"))? {
        report.checked += 1;
        check_unit(&file, &mut report);
    }
    for file in ron_files(&path.join("boards"))? {
        report.checked += 1;
        check_board(&file, &mut report);
    }
    Ok(report)
}

/// Log every problem in a report and turn it into a pass or fail.
///
/// # Errors
///
/// Returns [`ValidateError::Invalid`] if any file failed.
pub fn conclude(report: &ValidationReport) -> Result<(), ValidateError> {
    for failure in &report.failures {
        tracing::warn!(path = %failure.path.display(), "{}", failure.message);
    }
    tracing::info!(checked = report.checked, failed = report.failures.len(), "validation finished");
    if report.is_ok() {
        return Ok(());
    }
    let mut failed: Vec<&PathBuf> = report.failures.iter().map(|f| &f.path).collect();
    failed.dedup();
    Err(ValidateError::Invalid {
        checked: report.checked,
        failed: failed.len(),
    })
}

/// Validate all RON data files in a directory, logging each problem.
///
/// # Errors
///
/// Returns an error if the directory cannot be read or any data file fails.
pub fn validate_data_directory(path: &Path) -> Result<(), ValidateError> {
    conclude(&check_data_directory(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironhex_core::entity::Location;
    use ironhex_test_utils::fixtures;

    fn write(dir: &Path, sub: &str, name: &str, contents: &str) {
        let folder = dir.join(sub);
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join(name), contents).unwrap();
    }

    fn unit_ron(unit: &UnitData) -> String {
        ron::ser::to_string_pretty(unit, ron::ser::PrettyConfig::default()).unwrap()
    }

    #[test]
    fn test_valid_directory_passes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "units", "locust.ron", &unit_ron(&fixtures::locust()));
        write(dir.path(), "units", "atlas.ron", &unit_ron(&fixtures::atlas()));
        write(
            dir.path(),
            "boards",
            "hill.ron",
            "BoardData(name: \"hill\", width: 6, height: 6, hexes: [((x: 2, y: 2), (elevation: 2))])",
        );

        let report = check_data_directory(dir.path()).unwrap();
        assert_eq!(report.checked, 3);
        assert!(report.is_ok(), "{:?}", report.failures);
        assert!(validate_data_directory(dir.path()).is_ok());
    }

    #[test]
    fn test_problems_are_reported_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let overloaded = UnitData::mech("Locust", "LCT-X", 20, 8).with_armor(Location::Head, 12, 0);
        let unknown_item = UnitData::mech("Locust", "LCT-Y", 20, 8).with_item("death_ray", Location::CenterTorso);
        write(dir.path(), "units", "heavy_head.ron", &unit_ron(&overloaded));
        write(dir.path(), "units", "death_ray.ron", &unit_ron(&unknown_item));
        write(dir.path(), "boards", "broken.ron", "BoardData(name: \"x\", width: 0, height: 3)");

        let report = check_data_directory(dir.path()).unwrap();
        assert_eq!(report.checked, 3);
        assert_eq!(report.failures.len(), 3);
        assert!(report.failures.iter().any(|f| f.message.contains("more than the 9 allowed")));
        assert!(matches!(
            validate_data_directory(dir.path()),
            Err(ValidateError::Invalid { checked: 3, failed: 3 })
        ));
    }

    #[test]
    fn test_single_files_checked_by_kind() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "units", "atlas.ron", &unit_ron(&fixtures::atlas()));
        let atlas = dir.path().join("units").join("atlas.ron");
        assert!(check_file(&atlas, DataKind::Unit).is_ok());

        let report = check_file(&atlas, DataKind::Board);
        assert_eq!(report.checked, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(conclude(&report).is_err());

        let missing = check_file(&dir.path().join("nothing.ron"), DataKind::Unit);
        assert_eq!(missing.failures[0].path, dir.path().join("nothing.ron"));
    }

    #[test]
    fn test_empty_directory_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let report = check_data_directory(dir.path()).unwrap();
        assert_eq!(report.checked, 0);
    }
}

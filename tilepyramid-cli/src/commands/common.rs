//! Common types and utilities shared across CLI commands.

use chrono::{Duration as ChronoDuration, Utc};
use clap::ValueEnum;
use std::time::SystemTime;
use tilepyramid::config::ConfigFile;
use tilepyramid::coord::validate_metatile_size;
use tilepyramid::pool::ExecutionModel;
use tilepyramid::projection::GeoBounds;
use tilepyramid::storage::OutputFormat;
use tilepyramid::worker::{EmptyTilePolicy, SkipPolicy, TerminationMode};

use crate::error::CliError;

/// Execution model selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ParallelMode {
    /// Isolated child processes
    Processes,
    /// Threads sharing one output store
    Threads,
    /// One worker, no parallelism
    Single,
}

impl From<ParallelMode> for ExecutionModel {
    fn from(mode: ParallelMode) -> Self {
        match mode {
            ParallelMode::Processes => ExecutionModel::Processes,
            ParallelMode::Threads => ExecutionModel::Threads,
            ParallelMode::Single => ExecutionModel::Single,
        }
    }
}

/// Empty tile handling for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum EmptyMode {
    /// Leave fully transparent tiles out
    Skip,
    /// Store fully transparent tiles too
    Render,
}

impl From<EmptyMode> for EmptyTilePolicy {
    fn from(mode: EmptyMode) -> Self {
        match mode {
            EmptyMode::Skip => EmptyTilePolicy::Skip,
            EmptyMode::Render => EmptyTilePolicy::Render,
        }
    }
}

/// Termination mode for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum TerminationArg {
    /// A skipped metatile reports nothing
    Strict,
    /// A skipped metatile sends a skip notice
    Lenient,
}

impl From<TerminationArg> for TerminationMode {
    fn from(arg: TerminationArg) -> Self {
        match arg {
            TerminationArg::Strict => TerminationMode::Strict,
            TerminationArg::Lenient => TerminationMode::Lenient,
        }
    }
}

/// Output layout for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum FormatArg {
    /// A <z>/<x>/<y>.png directory tree
    Tiles,
    /// One MBTiles file
    Mbtiles,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Tiles => OutputFormat::Tiles,
            FormatArg::Mbtiles => OutputFormat::MbTiles,
        }
    }
}

/// Parses a metatile size, accepting powers of two only.
pub fn parse_metatile_size(value: &str) -> Result<u32, String> {
    let size: u32 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    validate_metatile_size(size).map_err(|e| e.to_string())
}

/// Resolve the bounding box from `--bbox`, `--bbox-name` and config.
pub fn resolve_bounds(
    bbox: Option<GeoBounds>,
    bbox_name: Option<&str>,
    config: &ConfigFile,
) -> Result<GeoBounds, CliError> {
    match (bbox, bbox_name) {
        (Some(bounds), _) => Ok(bounds),
        (None, Some(name)) => config.bbox(name).ok_or_else(|| {
            CliError::Config(format!(
                "Unknown bounding box '{}'. Use 'tilepyramid bboxes' to list the named boxes.",
                name
            ))
        }),
        (None, None) => Ok(GeoBounds::world()),
    }
}

/// Skip policy from `--skip-existing` and `--skip-newer`.
///
/// `--skip-newer` wins when both are given.
pub fn resolve_skip(
    skip_existing: bool,
    skip_newer_days: Option<u32>,
) -> Result<SkipPolicy, CliError> {
    match skip_newer_days {
        Some(days) => {
            let cutoff = ChronoDuration::try_days(i64::from(days))
                .and_then(|age| Utc::now().checked_sub_signed(age))
                .ok_or_else(|| {
                    CliError::Config(format!("--skip-newer {} reaches past the calendar", days))
                })?;
            Ok(SkipPolicy::NewerThan(SystemTime::from(cutoff)))
        }
        None if skip_existing => Ok(SkipPolicy::Existing),
        None => Ok(SkipPolicy::Never),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_metatile_size() {
        assert_eq!(parse_metatile_size("8"), Ok(8));
        assert_eq!(parse_metatile_size("1"), Ok(1));
        assert!(parse_metatile_size("6").unwrap_err().contains("power of two"));
        assert!(parse_metatile_size("eight").is_err());
    }

    #[test]
    fn test_resolve_bounds_precedence() {
        let mut config = ConfigFile::default();
        let alps: GeoBounds = "5.5,43.5,16.5,48.5".parse().unwrap();
        config.bboxes.insert("alps".to_string(), alps);
        let explicit: GeoBounds = "0,0,1,1".parse().unwrap();

        assert_eq!(
            resolve_bounds(Some(explicit), Some("alps"), &config).unwrap(),
            explicit
        );
        assert_eq!(resolve_bounds(None, Some("alps"), &config).unwrap(), alps);
        assert_eq!(
            resolve_bounds(None, None, &config).unwrap(),
            GeoBounds::world()
        );
        assert!(resolve_bounds(None, Some("sahara"), &config).is_err());
    }

    #[test]
    fn test_resolve_skip() {
        assert_eq!(resolve_skip(false, None).unwrap(), SkipPolicy::Never);
        assert_eq!(resolve_skip(true, None).unwrap(), SkipPolicy::Existing);

        let SkipPolicy::NewerThan(cutoff) = resolve_skip(true, Some(2)).unwrap() else {
            panic!("expected a cutoff");
        };
        let age = SystemTime::now().duration_since(cutoff).unwrap();
        assert!(age >= Duration::from_secs(2 * 86_400 - 5));
        assert!(age <= Duration::from_secs(2 * 86_400 + 5));
    }

    #[test]
    fn test_resolve_skip_rejects_unreachable_cutoff() {
        assert!(matches!(
            resolve_skip(false, Some(u32::MAX)),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn test_value_enums_map_to_library_types() {
        assert_eq!(
            ExecutionModel::from(ParallelMode::Processes),
            ExecutionModel::Processes
        );
        assert_eq!(EmptyTilePolicy::from(EmptyMode::Render), EmptyTilePolicy::Render);
        assert_eq!(
            TerminationMode::from(TerminationArg::Strict),
            TerminationMode::Strict
        );
    }
}

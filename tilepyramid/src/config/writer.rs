//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! Produces the commented representation written by `tilepyramid init`.

use std::fmt::Write;
use std::path::Path;

use super::parser::BBOX_SECTION_PREFIX;
use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let mut out = format!(
        r#"[render]
; Metatile side in tiles, a power of two (default: 8)
; Each worker renders one metatile image and slices it into tiles
metatile_size = {}
; Number of workers (default: number of CPU cores)
threads = {}
; How workers run:
;   processes - isolated child processes
;   threads   - threads sharing one output store (default)
;   single    - one worker on the scheduler thread
parallel = {}
; Fully transparent tiles:
;   skip   - not stored (default)
;   render - stored like any other tile
empty = {}
; What a worker reports for a metatile it skips:
;   lenient - a skip notice, its subtree is dropped (default)
;   strict  - nothing; pair with --stall-timeout
termination = {}

[output]
; Root of the <z>/<x>/<y>.png tile tree, or the MBTiles file
directory = {}
; Layout of the stored tiles:
;   tiles   - a <z>/<x>/<y>.png directory tree (default)
;   mbtiles - one MBTiles (SQLite) file
format = {}

[logging]
; Log file path (default: ~/.tilepyramid/tilepyramid.log)
file = {}

; Named bounding boxes, selected with --bbox-name <name>:
;
; [bbox.alps]
; bounds = 5.5,43.5,16.5,48.5
"#,
        config.render.metatile_size,
        config.render.threads,
        config.render.parallel,
        config.render.empty,
        config.render.termination,
        path_to_string(&config.output.directory),
        config.output.format,
        path_to_string(&config.logging.file),
    );

    for (name, bounds) in &config.bboxes {
        let _ = write!(out, "\n[{}{}]\nbounds = {}\n", BBOX_SECTION_PREFIX, name, bounds);
    }

    out
}

/// Writes paths under the home directory with a `~/` prefix.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ExecutionModel;
    use crate::projection::GeoBounds;
    use crate::storage::OutputFormat;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_commented() {
        let content = to_config_string(&ConfigFile::default());

        assert!(content.contains("[render]"));
        assert!(content.contains("metatile_size = 8"));
        assert!(content.contains("parallel = threads"));
        assert!(content.contains("termination = lenient"));
        assert!(content.contains("; [bbox.alps]"));
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.render.metatile_size = 2;
        config.render.threads = 5;
        config.render.parallel = ExecutionModel::Single;
        config.output.directory = PathBuf::from("/srv/tiles");
        config.output.format = OutputFormat::MbTiles;
        config
            .bboxes
            .insert("alps".to_string(), "5.5,43.5,16.5,48.5".parse::<GeoBounds>().unwrap());

        config.save_to(&config_path).unwrap();
        let loaded = ConfigFile::load_from(&config_path).unwrap();

        assert_eq!(loaded.render, config.render);
        assert_eq!(loaded.output, config.output);
        assert_eq!(loaded.bboxes, config.bboxes);
    }
}

//! Init command - write the default configuration file.

use std::path::Path;
use tilepyramid::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Run the init command.
pub fn run(force: bool) -> Result<(), CliError> {
    let path = config_file_path();
    init_at(&path, force)
}

fn init_at(path: &Path, force: bool) -> Result<(), CliError> {
    if force {
        ConfigFile::default().save_to(path)?;
        println!("Wrote default configuration to {}", path.display());
    } else if ConfigFile::ensure_exists_at(path)? {
        println!("Created configuration file {}", path.display());
    } else {
        println!("Configuration file already exists: {}", path.display());
        println!("Use --force to overwrite it with the defaults.");
    }

    println!();
    println!("Add named bounding boxes as [bbox.<name>] sections and select");
    println!("them with: tilepyramid generate --bbox-name <name>");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_keeps_existing_unless_forced() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");

        init_at(&path, false).unwrap();
        std::fs::write(&path, "[render]\nthreads = 2\n").unwrap();

        init_at(&path, false).unwrap();
        assert_eq!(ConfigFile::load_from(&path).unwrap().render.threads, 2);

        init_at(&path, true).unwrap();
        assert_eq!(ConfigFile::load_from(&path).unwrap(), ConfigFile::default());
    }
}

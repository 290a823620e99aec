//! Bboxes command - list the named bounding boxes of config.ini.

use tilepyramid::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Run the bboxes command.
pub fn run() -> Result<(), CliError> {
    let config = ConfigFile::load()?;

    if config.bboxes.is_empty() {
        println!("No named bounding boxes in {}", config_file_path().display());
        println!("Add one as a section like:");
        println!();
        println!("  [bbox.alps]");
        println!("  bounds = 5.5,43.5,16.5,48.5");
        return Ok(());
    }

    let width = config.bboxes.keys().map(String::len).max().unwrap_or(0);
    for (name, bounds) in &config.bboxes {
        println!("{:width$}  {}", name, bounds, width = width);
    }
    Ok(())
}

//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use ini::Ini;
use std::path::PathBuf;
use std::str::FromStr;

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::coord::validate_metatile_size;
use crate::projection::GeoBounds;

/// Prefix of named bounding box sections.
pub(super) const BBOX_SECTION_PREFIX: &str = "bbox.";

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [render] section
    if let Some(section) = ini.section(Some("render")) {
        if let Some(v) = section.get("metatile_size") {
            config.render.metatile_size = v
                .trim()
                .parse::<u32>()
                .ok()
                .and_then(|size| validate_metatile_size(size).ok())
                .ok_or_else(|| {
                    invalid("render", "metatile_size", v, "must be a power of two up to 64")
                })?;
        }
        if let Some(v) = section.get("threads") {
            config.render.threads = match v.trim().parse::<usize>() {
                Ok(threads) if threads > 0 => threads,
                _ => return Err(invalid("render", "threads", v, "must be a positive integer")),
            };
        }
        if let Some(v) = section.get("parallel") {
            config.render.parallel = parse_value("render", "parallel", v)?;
        }
        if let Some(v) = section.get("empty") {
            config.render.empty = parse_value("render", "empty", v)?;
        }
        if let Some(v) = section.get("termination") {
            config.render.termination = parse_value("render", "termination", v)?;
        }
    }

    // [output] section
    if let Some(section) = ini.section(Some("output")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.output.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("format") {
            config.output.format = parse_value("output", "format", v)?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = expand_tilde(v);
            }
        }
    }

    // [bbox.<name>] sections
    for (name, section) in ini.iter() {
        let Some(name) = name.and_then(|n| n.strip_prefix(BBOX_SECTION_PREFIX)) else {
            continue;
        };
        let section_name = format!("{}{}", BBOX_SECTION_PREFIX, name);
        let Some(v) = section.get("bounds") else {
            return Err(invalid(&section_name, "bounds", "", "missing bounding box"));
        };
        let bounds = v
            .parse::<GeoBounds>()
            .map_err(|e| invalid(&section_name, "bounds", v, &e.to_string()))?;
        config.bboxes.insert(name.to_string(), bounds);
    }

    Ok(config)
}

/// Parses a value through its `FromStr` impl, keeping the impl's message.
fn parse_value<T>(section: &str, key: &str, value: &str) -> Result<T, ConfigFileError>
where
    T: FromStr<Err = String>,
{
    value
        .trim()
        .parse()
        .map_err(|reason: String| invalid(section, key, value, &reason))
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

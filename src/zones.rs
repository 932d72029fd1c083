//! Zone lists: map cells expanded into the save files that back them.
//!
//! A zone is written `X_Y` (for example `10_12`). Each configured template
//! turns it into one relative save path by substituting `{xy}`.

use std::fmt::{Display, Formatter};
use std::path::Path;

use crate::{AppError, Result};

/// Placeholder substituted with the zone identifier in templates.
pub const ZONE_PLACEHOLDER: &str = "{xy}";

/// A map cell identified by its `X_Y` coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Zone {
    /// Cell column.
    pub x: u32,
    /// Cell row.
    pub y: u32,
}

impl Zone {
    /// Parse `X_Y`.
    ///
    /// Coordinates must be written the way save files name them: plain
    /// decimal digits without sign or leading zeros, so `010_12` is
    /// rejected rather than read as `10_12`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for anything other than two canonical
    /// unsigned integers joined by an underscore.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let (x, y) = trimmed
            .split_once('_')
            .ok_or_else(|| AppError::Config(format!("zone '{trimmed}' is not X_Y")))?;
        let coordinate = |part: &str| {
            let canonical = !part.is_empty()
                && part.bytes().all(|b| b.is_ascii_digit())
                && (part == "0" || !part.starts_with('0'));
            if !canonical {
                return Err(AppError::Config(format!(
                    "zone '{trimmed}' is not X_Y: '{part}' is not a canonical coordinate"
                )));
            }
            part.parse::<u32>()
                .map_err(|err| AppError::Config(format!("zone '{trimmed}' is not X_Y: {err}")))
        };
        Ok(Self {
            x: coordinate(x)?,
            y: coordinate(y)?,
        })
    }

    /// Relative save paths for this zone, one per template.
    #[must_use]
    pub fn save_files(&self, templates: &[String]) -> Vec<String> {
        let id = self.to_string();
        templates
            .iter()
            .map(|template| template.replace(ZONE_PLACEHOLDER, &id))
            .collect()
    }
}

impl Display for Zone {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.x, self.y)
    }
}

/// Parse a zone list: one zone per line, `#` starts a comment.
///
/// # Errors
///
/// Returns `AppError::Config` naming the first malformed line.
pub fn parse_zone_list(text: &str) -> Result<Vec<Zone>> {
    text.lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let content = line.split('#').next().unwrap_or_default().trim();
            (!content.is_empty()).then_some((index + 1, content))
        })
        .map(|(line_no, content)| {
            Zone::parse(content).map_err(|err| AppError::Config(format!("line {line_no}: {err}")))
        })
        .collect()
}

/// Read and parse a zone list file.
///
/// # Errors
///
/// Returns `AppError::Config` if the file cannot be read or parsed.
pub fn load_zone_list(path: impl AsRef<Path>) -> Result<Vec<Zone>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|err| {
        AppError::Config(format!("cannot read zone list {}: {err}", path.display()))
    })?;
    parse_zone_list(&text)
}

/// Expand `zones` through `templates`, zone by zone.
#[must_use]
pub fn expand_zones(zones: &[Zone], templates: &[String]) -> Vec<String> {
    zones
        .iter()
        .flat_map(|zone| zone.save_files(templates))
        .collect()
}

use regex::Regex;
use std::{fs, path::Path};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Where the backend keeps the dashboard it embeds, relative to the repository root.
pub const DEFAULT_TARGET_FILE: &str =
    "backend/src/main/java/com/branddashboard/controller/ReportController.java";
pub const DEFAULT_CONSTANT: &str = "SUPERSET_DASHBOARD_ID";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The constant now holds the new value; it used to hold `previous`.
    Changed { previous: String },
    /// The constant already held the value.
    Unchanged,
    /// Neither pattern matched. The file was left alone.
    NotFound,
}

impl PatchOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, PatchOutcome::Changed { .. })
    }
}

/// Rewrites the value of one string constant in a source file.
///
/// The full Java declaration is tried first, then a bare `NAME = "...";`
/// assignment. Only the first match is replaced.
#[derive(Debug, Clone)]
pub struct ConstantPatcher {
    constant: String,
    patterns: Vec<Regex>,
}

impl ConstantPatcher {
    pub fn new(constant: &str) -> Result<Self> {
        let name = regex::escape(constant);
        let patterns = [
            format!(
                r#"(?P<head>private\s+static\s+final\s+String\s+{name}\s*=\s*)"(?P<value>[^"\n]*)"(?P<tail>\s*;)"#
            ),
            format!(r#"(?P<head>\b{name}\s*=\s*)"(?P<value>[^"\n]*)"(?P<tail>\s*;)"#),
        ]
        .iter()
        .map(|pattern| {
            Regex::new(pattern)
                .map_err(|error| Error::Config(format!("bad pattern for {constant}: {error}")))
        })
        .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            constant: constant.to_string(),
            patterns,
        })
    }

    /// Returns the new content alongside what happened to it.
    pub fn substitute(&self, content: &str, value: &str) -> Result<(String, PatchOutcome)> {
        // Anything that would end the string literal early is off-limits.
        if value.contains(['"', '\\', '\n', '\r']) {
            return Err(Error::InvalidPatchValue(value.to_string()));
        }

        let Some((captures, whole)) = self.patterns.iter().find_map(|pattern| {
            let captures = pattern.captures(content)?;
            let whole = captures.get(0)?;
            Some((captures, whole))
        }) else {
            return Ok((content.to_string(), PatchOutcome::NotFound));
        };

        let previous = &captures["value"];
        if previous == value {
            return Ok((content.to_string(), PatchOutcome::Unchanged));
        }

        let mut patched = String::with_capacity(content.len() + value.len());
        patched.push_str(&content[..whole.start()]);
        patched.push_str(&captures["head"]);
        patched.push('"');
        patched.push_str(value);
        patched.push('"');
        patched.push_str(&captures["tail"]);
        patched.push_str(&content[whole.end()..]);

        Ok((
            patched,
            PatchOutcome::Changed {
                previous: previous.to_string(),
            },
        ))
    }

    /// Reads `path`, substitutes, and writes it back only when something changed.
    ///
    /// There's no backup and no atomic rename: the file is simply rewritten.
    pub fn patch_file(&self, path: &Path, value: &str) -> Result<PatchOutcome> {
        let io_error = |source| Error::Patch {
            path: path.to_path_buf(),
            source,
        };

        let content = fs::read_to_string(path).map_err(io_error)?;
        let (patched, outcome) = self.substitute(&content, value)?;

        match &outcome {
            PatchOutcome::Changed { previous } => {
                fs::write(path, patched).map_err(io_error)?;
                info!(
                    "updated {} in {} from {previous:?} to {value:?}",
                    self.constant,
                    path.display()
                );
            }
            PatchOutcome::Unchanged => {
                info!("{} in {} is already {value:?}", self.constant, path.display())
            }
            PatchOutcome::NotFound => warn!(
                "could not find {} in {}; update it by hand",
                self.constant,
                path.display()
            ),
        }
        Ok(outcome)
    }
}

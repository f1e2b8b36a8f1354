//! Stamp variable substitution
//!
//! Stamp-info files are written by the build, one `KEY value` pair per line.
//! Any `{KEY}` in a stamped string is replaced by its value.

use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::sync::OnceLock;
use tracing::{debug, warn};

fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("stamp variable pattern is valid")
    })
}

/// Substitutes `{KEY}` stamp variables
#[derive(Debug, Clone, Default)]
pub struct Stamper {
    values: HashMap<String, String>,
}

impl Stamper {
    /// Stamper without any variables; stamping is the identity for
    /// strings without `{KEY}` references.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load variables from stamp-info files, later files overriding earlier ones.
    pub fn from_files(paths: &[Utf8PathBuf]) -> Result<Self> {
        let mut stamper = Self::empty();
        for path in paths {
            stamper.load_file(path)?;
        }
        Ok(stamper)
    }

    /// Build a stamper from explicit pairs
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    fn load_file(&mut self, path: &Utf8Path) -> Result<()> {
        let content = fs::read_to_string(path).map_err(|source| Error::StampInfoRead {
            path: path.to_string(),
            source,
        })?;
        debug!("Reading stamp info from {}", path);

        for line in content.lines() {
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once(' ').ok_or_else(|| Error::StampInfo {
                path: path.to_string(),
                line: line.to_string(),
            })?;
            if let Some(previous) = self.values.insert(key.to_string(), value.to_string()) {
                warn!(
                    "Duplicate value for stamp key {:?}: using {:?} instead of {:?}",
                    key, value, previous
                );
            }
        }
        Ok(())
    }

    /// Value of a single variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Replace every `{KEY}` in `input`.
    ///
    /// A referenced key with no value is an error.
    pub fn stamp(&self, input: &str) -> Result<String> {
        let pattern = variable_pattern();
        let mut out = String::with_capacity(input.len());
        let mut last = 0;

        for captures in pattern.captures_iter(input) {
            let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            let value = self
                .values
                .get(name.as_str())
                .ok_or_else(|| Error::UnknownStampVariable {
                    name: name.as_str().to_string(),
                    input: input.to_string(),
                })?;
            out.push_str(&input[last..whole.start()]);
            out.push_str(value);
            last = whole.end();
        }
        out.push_str(&input[last..]);
        Ok(out)
    }
}

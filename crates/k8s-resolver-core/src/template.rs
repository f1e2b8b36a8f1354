//! Template loading
//!
//! YAML templates are used as-is. JSON templates are converted into YAML
//! documents first: a top-level array yields one document per element, a
//! top-level object yields a single document.

use crate::error::{Error, Result};
use crate::yaml::decode_stream;
use camino::{Utf8Path, Utf8PathBuf};
use serde_yaml_ng::Value;
use std::fs;
use tracing::debug;

/// Source format of a template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFormat {
    Yaml,
    Json,
}

impl TemplateFormat {
    /// Pick the format from a file extension (`.json` or anything else)
    pub fn from_path(path: &Utf8Path) -> Self {
        match path.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// A loaded manifest template
#[derive(Debug, Clone)]
pub struct Template {
    pub path: Utf8PathBuf,
    pub format: TemplateFormat,
    pub contents: String,
}

impl Template {
    /// Read a template from disk
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|source| Error::TemplateRead {
            path: path.to_string(),
            source,
        })?;
        let format = TemplateFormat::from_path(path);
        debug!("Loaded {:?} template {} ({} bytes)", format, path, contents.len());

        Ok(Self {
            path: path.to_owned(),
            format,
            contents,
        })
    }

    /// In-memory YAML template, mostly for tests
    pub fn from_yaml(contents: impl Into<String>) -> Self {
        Self {
            path: Utf8PathBuf::from("<memory>"),
            format: TemplateFormat::Yaml,
            contents: contents.into(),
        }
    }

    /// Decode the template into its YAML documents
    pub fn documents(&self) -> Result<Vec<Value>> {
        match self.format {
            TemplateFormat::Yaml => decode_stream(self.contents.as_bytes()),
            TemplateFormat::Json => json_documents(&self.contents),
        }
    }
}

fn json_documents(contents: &str) -> Result<Vec<Value>> {
    let data: serde_json::Value =
        serde_json::from_str(contents).map_err(|e| Error::decode(0, e))?;

    let items = match data {
        serde_json::Value::Array(items) => items,
        object @ serde_json::Value::Object(_) => vec![object],
        _ => {
            return Err(Error::decode(
                0,
                "JSON template must be an object or an array of objects",
            ))
        }
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| serde_yaml_ng::to_value(item).map_err(|e| Error::decode(index, e)))
        .collect()
}

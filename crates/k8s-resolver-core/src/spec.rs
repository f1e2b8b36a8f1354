//! Image spec parsing and layer assembly
//!
//! An image spec is the flat string the build passes for every image it
//! produced, e.g.
//!
//! ```text
//! name=gcr.io/proj/app:dev;config=app.json;digest=l1.sha256,l2.sha256;diff_id=l1.diff,l2.diff;compressed_layer=l1.tar.gz,l2.tar.gz;uncompressed_layer=l1.tar,l2.tar
//! ```

use crate::error::{Error, Result};
use camino::Utf8PathBuf;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// One container image produced by the build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSpec {
    /// Name of the image; also the placeholder looked up in the template
    pub name: String,
    /// Image in the `docker save` tarball format
    pub tarball: Option<Utf8PathBuf>,
    /// Config JSON file of the image
    pub config: Option<Utf8PathBuf>,
    /// Files with the sha256 digests of the compressed layers
    pub digests: Vec<Utf8PathBuf>,
    /// Files with the sha256 digests of the uncompressed layers
    pub diff_ids: Vec<Utf8PathBuf>,
    /// Compressed layer tarballs
    pub compressed_layers: Vec<Utf8PathBuf>,
    /// Uncompressed layer tarballs
    pub uncompressed_layers: Vec<Utf8PathBuf>,
}

/// Metadata of a single layer, zipped from the parallel spec sequences
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerParts {
    pub compressed: Utf8PathBuf,
    pub uncompressed: Utf8PathBuf,
    /// File holding the compressed layer digest
    pub digest: Utf8PathBuf,
    /// File holding the uncompressed layer digest
    pub diff_id: Utf8PathBuf,
}

impl fmt::Display for LayerParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.compressed, self.uncompressed, self.digest, self.diff_id
        )
    }
}

impl ImageSpec {
    /// Parse a spec string of the form `key1=val1;key2=val2`.
    ///
    /// Recognized keys are `name`, `tarball`, `config`, and the comma
    /// separated lists `diff_id`, `digest`, `compressed_layer` and
    /// `uncompressed_layer`.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut result = Self::default();
        let mut seen: Vec<&str> = Vec::new();

        for item in spec.split(';') {
            let (key, value) = item
                .split_once('=')
                .ok_or_else(|| Error::malformed_field(item))?;

            if seen.contains(&key) {
                warn!("Duplicate image spec field {:?} in {:?}, using the last value", key, spec);
            } else {
                seen.push(key);
            }

            match key {
                "name" => result.name = value.to_string(),
                "tarball" => result.tarball = Some(Utf8PathBuf::from(value)),
                "config" => result.config = Some(Utf8PathBuf::from(value)),
                "diff_id" => result.diff_ids = split_list(value),
                "digest" => result.digests = split_list(value),
                "compressed_layer" => result.compressed_layers = split_list(value),
                "uncompressed_layer" => result.uncompressed_layers = split_list(value),
                _ => return Err(Error::unknown_field(key)),
            }
        }

        if result.name.is_empty() {
            return Err(Error::missing_field(spec, "name"));
        }

        Ok(result)
    }

    /// Zip the four layer sequences into one tuple per layer, in index order.
    ///
    /// Fails when the sequences do not all have the same length.
    pub fn layers(&self) -> Result<Vec<LayerParts>> {
        let lengths = (
            self.digests.len(),
            self.diff_ids.len(),
            self.compressed_layers.len(),
            self.uncompressed_layers.len(),
        );
        if lengths.0 != lengths.1 || lengths.1 != lengths.2 || lengths.2 != lengths.3 {
            return Err(Error::LayerCountMismatch {
                image: self.name.clone(),
                digests: lengths.0,
                diff_ids: lengths.1,
                compressed: lengths.2,
                uncompressed: lengths.3,
            });
        }

        Ok(self
            .compressed_layers
            .iter()
            .zip(&self.uncompressed_layers)
            .zip(self.digests.iter().zip(&self.diff_ids))
            .map(|((compressed, uncompressed), (digest, diff_id))| LayerParts {
                compressed: compressed.clone(),
                uncompressed: uncompressed.clone(),
                digest: digest.clone(),
                diff_id: diff_id.clone(),
            })
            .collect())
    }
}

impl FromStr for ImageSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Parse every spec in declaration order, stopping at the first failure.
pub fn parse_specs<S: AsRef<str>>(specs: &[S]) -> Result<Vec<ImageSpec>> {
    specs.iter().map(|s| ImageSpec::parse(s.as_ref())).collect()
}

fn split_list(value: &str) -> Vec<Utf8PathBuf> {
    if value.is_empty() {
        return Vec::new();
    }
    value.split(',').map(Utf8PathBuf::from).collect()
}

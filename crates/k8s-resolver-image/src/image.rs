//! In-memory images assembled from build outputs
//!
//! An image is read either from a config file plus per-layer blobs and
//! digest files, or from a `docker save` tarball. Either way the result is
//! a config blob, gzipped layer blobs and a Docker v2 schema 2 manifest.

use crate::types::{
    ImageManifest, ManifestConfig, ManifestLayer, CONFIG_MEDIA_TYPE, LAYER_MEDIA_TYPE,
    MANIFEST_MEDIA_TYPE,
};
use anyhow::{anyhow, bail, Context, Result};
use camino::Utf8Path;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use k8s_resolver_core::{ImageSpec, LayerParts};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// `sha256:<hex>` digest of `data`
pub fn sha256_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{:x}", hasher.finalize())
}

/// A content-addressed blob ready for upload
#[derive(Debug, Clone)]
pub struct Blob {
    pub digest: String,
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            digest: sha256_digest(&data),
            data,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A gzipped layer blob with the digest of its uncompressed content
#[derive(Debug, Clone)]
pub struct Layer {
    pub blob: Blob,
    pub diff_id: String,
}

/// An image read from local build outputs
#[derive(Debug, Clone)]
pub struct LocalImage {
    config: Blob,
    layers: Vec<Layer>,
    manifest: ImageManifest,
    manifest_bytes: Vec<u8>,
    digest: String,
}

impl LocalImage {
    /// Read the image described by `spec`.
    ///
    /// A config file takes precedence; the tarball is only used when no
    /// config is given.
    pub fn read(spec: &ImageSpec, layers: &[LayerParts]) -> Result<Self> {
        match (&spec.config, &spec.tarball) {
            (Some(config), _) => Self::from_config(config, layers),
            (None, Some(tarball)) => Self::from_tarball(tarball),
            (None, None) => bail!("image spec has neither a config nor a tarball"),
        }
    }

    /// Read a config file and the layers listed alongside it
    pub fn from_config(config: &Utf8Path, layers: &[LayerParts]) -> Result<Self> {
        let config_bytes =
            fs::read(config).with_context(|| format!("Failed to read config {}", config))?;

        let mut read_layers = Vec::with_capacity(layers.len());
        for parts in layers {
            let data = fs::read(&parts.compressed).with_context(|| {
                format!("Failed to read compressed layer {}", parts.compressed)
            })?;
            let blob = Blob::new(data);

            let expected = read_digest_file(&parts.digest)?;
            if expected != blob.digest {
                bail!(
                    "digest file {} says {} but layer {} hashes to {}",
                    parts.digest,
                    expected,
                    parts.compressed,
                    blob.digest
                );
            }

            read_layers.push(Layer {
                blob,
                diff_id: read_digest_file(&parts.diff_id)?,
            });
        }

        check_diff_ids(config, &config_bytes, &read_layers)?;
        Self::assemble(config_bytes, read_layers)
    }

    /// Read a `docker save` tarball
    pub fn from_tarball(path: &Utf8Path) -> Result<Self> {
        let file =
            fs::File::open(path).with_context(|| format!("Failed to open tarball {}", path))?;
        let mut archive = tar::Archive::new(file);

        let mut entries: HashMap<String, Vec<u8>> = HashMap::new();
        for entry in archive
            .entries()
            .with_context(|| format!("Failed to read tarball {}", path))?
        {
            let mut entry = entry.with_context(|| format!("Corrupt entry in {}", path))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = entry
                .path()
                .with_context(|| format!("Invalid entry path in {}", path))?
                .to_string_lossy()
                .trim_start_matches("./")
                .to_string();
            let mut data = Vec::new();
            entry
                .read_to_end(&mut data)
                .with_context(|| format!("Failed to read {} from {}", name, path))?;
            entries.insert(name, data);
        }

        let manifest_json = entries
            .get("manifest.json")
            .ok_or_else(|| anyhow!("{} has no manifest.json", path))?;
        let saved: Vec<SavedManifest> = serde_json::from_slice(manifest_json)
            .with_context(|| format!("Failed to parse manifest.json in {}", path))?;
        let saved = match saved.as_slice() {
            [single] => single,
            [] => bail!("manifest.json in {} lists no images", path),
            many => bail!(
                "manifest.json in {} lists {} images, expected exactly one",
                path,
                many.len()
            ),
        };

        let config = entries
            .get(&saved.config)
            .ok_or_else(|| anyhow!("{} is missing config {}", path, saved.config))?
            .clone();

        let mut layers = Vec::with_capacity(saved.layers.len());
        for name in &saved.layers {
            let data = entries
                .get(name)
                .ok_or_else(|| anyhow!("{} is missing layer {}", path, name))?;
            layers.push(layer_from_archive_bytes(data).with_context(|| {
                format!("Failed to prepare layer {} from {}", name, path)
            })?);
        }

        Self::assemble(config, layers)
    }

    fn assemble(config: Vec<u8>, layers: Vec<Layer>) -> Result<Self> {
        let config = Blob::new(config);
        let manifest = ImageManifest {
            schema_version: 2,
            media_type: MANIFEST_MEDIA_TYPE.to_string(),
            config: ManifestConfig {
                media_type: CONFIG_MEDIA_TYPE.to_string(),
                size: config.size(),
                digest: config.digest.clone(),
            },
            layers: layers
                .iter()
                .map(|layer| ManifestLayer {
                    media_type: LAYER_MEDIA_TYPE.to_string(),
                    size: layer.blob.size(),
                    digest: layer.blob.digest.clone(),
                })
                .collect(),
        };
        let manifest_bytes =
            serde_json::to_vec(&manifest).context("Failed to serialize image manifest")?;
        let digest = sha256_digest(&manifest_bytes);

        debug!("Assembled image {} with {} layers", digest, layers.len());

        Ok(Self {
            config,
            layers,
            manifest,
            manifest_bytes,
            digest,
        })
    }

    /// Digest of the serialized manifest
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn config(&self) -> &Blob {
        &self.config
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn manifest(&self) -> &ImageManifest {
        &self.manifest
    }

    /// Exact bytes pushed as the manifest
    pub fn manifest_bytes(&self) -> &[u8] {
        &self.manifest_bytes
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SavedManifest {
    config: String,
    layers: Vec<String>,
}

/// The part of an image config naming its layers
#[derive(Debug, Default, Deserialize)]
struct ConfigRootFs {
    #[serde(default)]
    rootfs: Option<RootFs>,
}

#[derive(Debug, Default, Deserialize)]
struct RootFs {
    #[serde(default)]
    diff_ids: Vec<String>,
}

/// Reject layers whose diff-ids disagree with the config's `rootfs.diff_ids`.
///
/// Configs without a `rootfs` section are not checked.
fn check_diff_ids(path: &Utf8Path, config: &[u8], layers: &[Layer]) -> Result<()> {
    let Some(rootfs) = serde_json::from_slice::<ConfigRootFs>(config)
        .ok()
        .and_then(|c| c.rootfs)
    else {
        return Ok(());
    };

    let actual: Vec<&str> = layers.iter().map(|l| l.diff_id.as_str()).collect();
    if rootfs.diff_ids != actual {
        bail!(
            "config {} lists diff_ids [{}] but the layers have [{}]",
            path,
            rootfs.diff_ids.join(", "),
            actual.join(", ")
        );
    }
    Ok(())
}

/// Read a digest file, adding the `sha256:` prefix when absent
fn read_digest_file(path: &Utf8Path) -> Result<String> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("Failed to read digest file {}", path))?;
    let digest = raw.trim();
    if digest.is_empty() {
        bail!("digest file {} is empty", path);
    }
    Ok(if digest.starts_with("sha256:") {
        digest.to_string()
    } else {
        format!("sha256:{}", digest)
    })
}

/// Build a gzipped layer from a tarball member, compressing it if needed
fn layer_from_archive_bytes(data: &[u8]) -> Result<Layer> {
    if data.starts_with(&GZIP_MAGIC) {
        let mut uncompressed = Vec::new();
        GzDecoder::new(data)
            .read_to_end(&mut uncompressed)
            .context("Failed to decompress layer")?;
        return Ok(Layer {
            blob: Blob::new(data.to_vec()),
            diff_id: sha256_digest(&uncompressed),
        });
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).context("Failed to compress layer")?;
    let compressed = encoder.finish().context("Failed to compress layer")?;
    Ok(Layer {
        blob: Blob::new(compressed),
        diff_id: sha256_digest(data),
    })
}

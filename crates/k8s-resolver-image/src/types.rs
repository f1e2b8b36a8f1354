use anyhow::{anyhow, bail, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Registry used when a name has no registry component
pub const DEFAULT_REGISTRY: &str = "index.docker.io";

/// Tag used when a name has no tag component
pub const DEFAULT_TAG: &str = "latest";

/// Docker v2 schema 2 manifest media type
pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Docker image config media type
pub const CONFIG_MEDIA_TYPE: &str = "application/vnd.docker.container.image.v1+json";

/// Gzipped layer media type
pub const LAYER_MEDIA_TYPE: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";

/// OCI manifest media type, accepted when looking up tags
pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

fn repository_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*(?:/[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*)*$")
            .expect("repository pattern is valid")
    })
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("tag pattern is valid")
    })
}

fn registry_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9.-]*[A-Za-z0-9])?(?::[0-9]+)?$")
            .expect("registry pattern is valid")
    })
}

/// Container image reference with registry, repository, and tag/digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    /// Registry hostname (e.g., "gcr.io", "index.docker.io", "localhost:5000")
    pub registry: String,
    /// Repository path (e.g., "proj/app")
    pub repository: String,
    /// Tag (e.g., "dev") - mutually exclusive with digest
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc123...") - mutually exclusive with tag
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse a tag reference such as "gcr.io/proj/app:dev".
    ///
    /// Missing parts are defaulted the way `docker push` does: the registry
    /// becomes `index.docker.io` (with `library/` for single-component
    /// names) and the tag becomes `latest`.
    pub fn parse_tag(s: &str) -> Result<Self> {
        let parsed = Parsed::split(s)?;
        Ok(Self {
            registry: parsed.registry,
            repository: parsed.repository,
            tag: Some(parsed.tag.unwrap_or_else(|| DEFAULT_TAG.to_string())),
            digest: None,
        })
    }

    /// Parse `s` only if it names its registry and tag explicitly.
    ///
    /// Used to pick out tag references in templates without mistaking
    /// ordinary strings for image names.
    pub fn parse_qualified_tag(s: &str) -> Option<Self> {
        let parsed = Parsed::split(s).ok()?;
        if !parsed.explicit_registry {
            return None;
        }
        Some(Self {
            registry: parsed.registry,
            repository: parsed.repository,
            tag: Some(parsed.tag?),
            digest: None,
        })
    }

    /// The same repository pinned to `digest`
    pub fn with_digest(&self, digest: impl Into<String>) -> Self {
        Self {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: None,
            digest: Some(digest.into()),
        }
    }

    /// Tag or digest, whichever identifies this reference
    pub fn identifier(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or(DEFAULT_TAG)
    }

    /// "registry/repository" without tag or digest
    pub fn context(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// URL scheme for the registry API; local registries speak plain HTTP
    pub fn scheme(&self) -> &'static str {
        let host = self
            .registry
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or(&self.registry);
        if host == "localhost" || host == "127.0.0.1" || host.ends_with(".localhost") {
            "http"
        } else {
            "https"
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = self.context();
        if let Some(digest) = &self.digest {
            write!(f, "{}@{}", base, digest)
        } else if let Some(tag) = &self.tag {
            write!(f, "{}:{}", base, tag)
        } else {
            write!(f, "{}:{}", base, DEFAULT_TAG)
        }
    }
}

struct Parsed {
    registry: String,
    repository: String,
    tag: Option<String>,
    explicit_registry: bool,
}

impl Parsed {
    fn split(s: &str) -> Result<Self> {
        if s.contains('@') {
            bail!("{:?} is a digest reference, not a tag", s);
        }

        // A ':' after the last '/' separates the tag; earlier ones are ports
        let (name, tag) = match s.rsplit_once(':') {
            Some((name, tag)) if !tag.contains('/') => (name, Some(tag)),
            _ => (s, None),
        };
        if let Some(tag) = tag {
            if !tag_pattern().is_match(tag) {
                bail!("invalid tag {:?} in {:?}", tag, s);
            }
        }

        let (registry, repository, explicit_registry) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first, rest.to_string(), true)
            }
            _ => (DEFAULT_REGISTRY, name.to_string(), false),
        };

        if !registry_pattern().is_match(registry) {
            bail!("invalid registry {:?} in {:?}", registry, s);
        }
        let registry = if registry == "docker.io" {
            DEFAULT_REGISTRY.to_string()
        } else {
            registry.to_string()
        };

        let repository = if registry == DEFAULT_REGISTRY && !repository.contains('/') {
            format!("library/{}", repository)
        } else {
            repository
        };
        if !repository_pattern().is_match(&repository) {
            return Err(anyhow!(
                "invalid repository {:?} in {:?}: must be lowercase alphanumerics separated by '.', '_', '-' or '/'",
                repository,
                s
            ));
        }

        Ok(Self {
            registry,
            repository,
            tag: tag.map(str::to_string),
            explicit_registry,
        })
    }
}

/// Image manifest pushed to the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: i32,
    pub media_type: String,
    pub config: ManifestConfig,
    pub layers: Vec<ManifestLayer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestConfig {
    pub media_type: String,
    pub size: u64,
    pub digest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestLayer {
    pub media_type: String,
    pub size: u64,
    pub digest: String,
}

//! Resolver configuration
//!
//! Built once at startup from the command line and passed by reference to
//! everything that needs it.

use crate::error::{Error, Result};
use camino::Utf8PathBuf;

/// Immutable configuration for one resolver run
#[derive(Debug, Clone, Default)]
pub struct ResolverConfig {
    /// The k8s YAML (or JSON) template to resolve
    pub template: Utf8PathBuf,

    /// Image specs, in declaration order
    pub image_specs: Vec<String>,

    /// Bazel stamp info files
    pub stamp_info_files: Vec<Utf8PathBuf>,

    /// Repository under which to chroot image references when publishing
    pub image_chroot: Option<String>,

    /// Accept images that never appear in the template
    pub allow_unused_images: bool,

    /// Compute digests without pushing
    pub no_push: bool,

    /// Also pin fully qualified tag references found in the template
    pub resolve_tags: bool,

    /// Where to write the resolved manifest; standard output when unset
    pub output: Option<Utf8PathBuf>,
}

impl ResolverConfig {
    /// Create a configuration for the given template
    pub fn new(template: impl Into<Utf8PathBuf>) -> Self {
        Self {
            template: template.into(),
            ..Self::default()
        }
    }

    /// Add an image spec
    pub fn with_image_spec(mut self, spec: impl Into<String>) -> Self {
        self.image_specs.push(spec.into());
        self
    }

    /// Set the image chroot
    pub fn with_image_chroot(mut self, chroot: impl Into<String>) -> Self {
        self.image_chroot = Some(chroot.into());
        self
    }

    /// Allow or reject unused images
    pub fn with_allow_unused_images(mut self, allow: bool) -> Self {
        self.allow_unused_images = allow;
        self
    }

    /// Enable or disable pushing
    pub fn with_no_push(mut self, no_push: bool) -> Self {
        self.no_push = no_push;
        self
    }

    /// Enable or disable tag pinning for non-placeholder references
    pub fn with_resolve_tags(mut self, resolve_tags: bool) -> Self {
        self.resolve_tags = resolve_tags;
        self
    }

    /// Image chroot with surrounding slashes removed; `None` when blank
    pub fn chroot(&self) -> Option<&str> {
        self.image_chroot
            .as_deref()
            .map(|c| c.trim_matches('/'))
            .filter(|c| !c.is_empty())
    }

    /// Check the configuration before any work starts
    pub fn validate(&self) -> Result<()> {
        if self.template.as_str().is_empty() {
            return Err(Error::invalid_config("--template is required"));
        }
        if let Some(chroot) = self.chroot() {
            if chroot.chars().any(char::is_whitespace) {
                return Err(Error::invalid_config(format!(
                    "image chroot {:?} must not contain whitespace",
                    chroot
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ResolverConfig::new("deploy.yaml").with_image_spec("name=a");
        assert_eq!(config.template, "deploy.yaml");
        assert_eq!(config.image_specs, vec!["name=a"]);
        assert!(!config.allow_unused_images);
        assert!(!config.no_push);
        assert!(!config.resolve_tags);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_chroot_normalized() {
        let config = ResolverConfig::new("t.yaml").with_image_chroot("gcr.io/proj/");
        assert_eq!(config.chroot(), Some("gcr.io/proj"));

        let blank = ResolverConfig::new("t.yaml").with_image_chroot("/");
        assert_eq!(blank.chroot(), None);
    }

    #[test]
    fn test_validate_rejects_missing_template() {
        let config = ResolverConfig::default();
        assert!(matches!(config.validate(), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_validate_rejects_whitespace_chroot() {
        let config = ResolverConfig::new("t.yaml").with_image_chroot("gcr.io/my proj");
        assert!(config.validate().is_err());
    }
}

//! Publishing a single image spec to its registry

use crate::credentials::Keychain;
use crate::image::LocalImage;
use crate::registry::RegistryClient;
use crate::types::ImageReference;
use k8s_resolver_core::{Error, ImageSpec, ResolverConfig, Result, Stamper};
use tracing::{debug, info};

/// Publishes images under their stamped (and optionally chrooted) names
#[derive(Debug, Clone)]
pub struct RegistryPublisher {
    image_chroot: Option<String>,
    no_push: bool,
    keychain: Keychain,
}

impl RegistryPublisher {
    pub fn new(keychain: Keychain) -> Self {
        Self {
            image_chroot: None,
            no_push: false,
            keychain,
        }
    }

    /// Publisher configured from the run's settings and the Docker keychain
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            image_chroot: config.chroot().map(str::to_string),
            no_push: config.no_push,
            keychain: Keychain::from_env(),
        }
    }

    pub fn with_image_chroot(mut self, chroot: impl Into<String>) -> Self {
        let chroot = chroot.into();
        let chroot = chroot.trim_matches('/');
        self.image_chroot = (!chroot.is_empty()).then(|| chroot.to_string());
        self
    }

    pub fn with_no_push(mut self, no_push: bool) -> Self {
        self.no_push = no_push;
        self
    }

    /// Name the image is tagged as, with the chroot prepended
    pub fn tag_name(&self, stamped: &str) -> String {
        match &self.image_chroot {
            Some(chroot) => join_path(&[chroot, stamped]),
            None => stamped.to_string(),
        }
    }

    /// Publish `spec` and return its digest-pinned reference
    pub async fn publish_image(&self, spec: &ImageSpec, stamper: &Stamper) -> Result<String> {
        let name = spec.name.as_str();

        let layers = spec.layers()?;
        let image =
            LocalImage::read(spec, &layers).map_err(|e| Error::image_read(name, format!("{:#}", e)))?;

        let stamped = stamper
            .stamp(name)
            .map_err(|e| Error::tag_construction(name, e))?;
        let tag = ImageReference::parse_tag(&self.tag_name(&stamped))
            .map_err(|e| Error::tag_construction(name, format!("{:#}", e)))?;
        debug!("Image {} will be tagged as {}", name, tag);

        if self.no_push {
            info!("Skipping push of {} ({})", tag, image.digest());
        } else {
            let credential = self
                .keychain
                .resolve(&tag.registry)
                .map_err(|e| Error::auth_resolution(name, format!("{:#}", e)))?;

            let client = RegistryClient::new(&tag, credential)
                .map_err(|e| Error::publish(name, format!("{:#}", e)))?;
            client
                .push(&tag, &image)
                .await
                .map_err(|e| Error::publish(name, format!("{:#}", e)))?;
        }

        Ok(tag.with_digest(image.digest()).to_string())
    }
}

/// Slash-join `parts`, dropping empty segments
fn join_path(parts: &[&str]) -> String {
    parts
        .iter()
        .flat_map(|part| part.split('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

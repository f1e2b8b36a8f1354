//! Bridge between k8s-resolver-core's `ImagePublisher` / `TagResolver`
//! traits and the registry types in this crate.

use crate::credentials::Keychain;
use crate::publisher::RegistryPublisher;
use crate::registry::RegistryClient;
use crate::types::ImageReference;
use k8s_resolver_core::{BoxFuture, Error, ImagePublisher, ImageSpec, Result, Stamper, TagResolver};
use tracing::{debug, warn};

impl ImagePublisher for RegistryPublisher {
    fn publish<'a>(
        &'a self,
        spec: &'a ImageSpec,
        stamper: &'a Stamper,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.publish_image(spec, stamper))
    }
}

/// Concrete [`TagResolver`] that asks the owning registry for the digest
/// currently behind a tag.
///
/// Only strings naming an explicit registry and an explicit tag are looked
/// up; everything else is left alone. A failed lookup is logged and the
/// string is left alone as well.
#[derive(Debug, Clone)]
pub struct RegistryTagResolver {
    keychain: Keychain,
}

impl RegistryTagResolver {
    pub fn new(keychain: Keychain) -> Self {
        Self { keychain }
    }

    async fn pin(&self, candidate: &str, reference: ImageReference) -> Result<String> {
        let fail = |e: anyhow::Error| Error::scalar_resolution(candidate, format!("{:#}", e));

        let credential = self.keychain.resolve(&reference.registry).map_err(fail)?;
        let client = RegistryClient::new(&reference, credential).map_err(fail)?;
        client
            .authenticate(&reference.repository, "pull")
            .await
            .map_err(fail)?;
        let digest = client
            .manifest_digest(&reference.repository, reference.identifier())
            .await
            .map_err(fail)?;

        Ok(reference.with_digest(digest).to_string())
    }
}

impl TagResolver for RegistryTagResolver {
    fn resolve_tag<'a>(&'a self, candidate: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            let Some(reference) = ImageReference::parse_qualified_tag(candidate) else {
                return Ok(None);
            };
            debug!("Looking up digest for {}", reference);
            match self.pin(candidate, reference).await {
                Ok(pinned) => Ok(Some(pinned)),
                Err(e) => {
                    warn!("Leaving {} unresolved: {}", candidate, e);
                    Ok(None)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_non_references_are_skipped() {
        let resolver = RegistryTagResolver::new(Keychain::anonymous());
        for candidate in ["hello", "nginx:1.25", "gcr.io/proj/app", "8080", ""] {
            assert_eq!(resolver.resolve_tag(candidate).await.unwrap(), None);
        }
    }

    #[test]
    fn test_publisher_is_object_safe() {
        let publisher = RegistryPublisher::new(Keychain::anonymous());
        let _: &dyn ImagePublisher = &publisher;
    }
}

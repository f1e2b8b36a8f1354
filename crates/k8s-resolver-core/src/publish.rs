//! Seams to the registry side of the resolver
//!
//! The core crate does not talk to registries itself. Implementors live in
//! k8s-resolver-image (or tests can provide a mock).

use crate::error::Result;
use crate::spec::ImageSpec;
use crate::stamp::Stamper;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by the trait methods below
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Publishes an image and returns its digest-pinned reference.
pub trait ImagePublisher: Send + Sync {
    /// Publish `spec` under its stamped name.
    ///
    /// Returns `registry/repository@sha256:...`. Errors name the image and
    /// the stage that failed.
    fn publish<'a>(
        &'a self,
        spec: &'a ImageSpec,
        stamper: &'a Stamper,
    ) -> BoxFuture<'a, Result<String>>;
}

/// Pins tag references found in a template to their current digest.
pub trait TagResolver: Send + Sync {
    /// Resolve `candidate` if it is a fully qualified tag reference.
    ///
    /// Returns `Ok(None)` for strings that are not tag references.
    fn resolve_tag<'a>(&'a self, candidate: &'a str) -> BoxFuture<'a, Result<Option<String>>>;
}

//! Image publishing for k8s-resolver
//!
//! This crate provides functionality for:
//! - Parsing and normalizing image tag references
//! - Assembling images from build outputs or `docker save` tarballs
//! - Resolving registry credentials from the Docker client configuration
//! - Pushing images over the OCI distribution API and looking up tag digests
//!
//! # Example
//!
//! ```no_run
//! use k8s_resolver_core::{ImageSpec, Stamper};
//! use k8s_resolver_image::{Keychain, RegistryPublisher};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let spec: ImageSpec = "name=gcr.io/proj/app:dev;config=app.json".parse()?;
//!     let publisher = RegistryPublisher::new(Keychain::from_env());
//!
//!     let reference = publisher.publish_image(&spec, &Stamper::empty()).await?;
//!     println!("Published: {}", reference);
//!
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod credentials;
pub mod image;
pub mod publisher;
pub mod registry;
pub mod types;

// Re-export main types for convenience
pub use bridge::RegistryTagResolver;
pub use credentials::{Credential, Keychain};
pub use image::{Blob, Layer, LocalImage};
pub use publisher::RegistryPublisher;
pub use registry::RegistryClient;
pub use types::{ImageManifest, ImageReference};

/// Version of the k8s-resolver-image crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

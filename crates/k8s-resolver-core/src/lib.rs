//! # k8s-resolver-core
//!
//! Core library for k8s-resolver providing:
//! - Image spec parsing and layer assembly
//! - Stamp variable substitution
//! - Shape-preserving YAML template walking
//! - The resolution session tying publishing and template walking together
//!
//! Registry access is abstracted behind [`ImagePublisher`] and
//! [`TagResolver`]; the concrete implementations live in k8s-resolver-image.

pub mod config;
pub mod error;
pub mod publish;
pub mod session;
pub mod spec;
pub mod stamp;
pub mod template;
pub mod yaml;

pub use config::ResolverConfig;
pub use error::{Error, Result};
pub use publish::{BoxFuture, ImagePublisher, TagResolver};
pub use session::{PublishedImages, ResolutionSession, ResolvedManifest};
pub use spec::{ImageSpec, LayerParts};
pub use stamp::Stamper;
pub use template::{Template, TemplateFormat};
pub use yaml::{ResolvedStream, YamlResolver};

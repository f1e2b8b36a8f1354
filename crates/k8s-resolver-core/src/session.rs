//! End-to-end resolution of one template
//!
//! A session runs the stages strictly in order, each fail-fast:
//!
//! 1. parse every `--image_spec`
//! 2. publish every image in declaration order
//! 3. (optionally) pin fully qualified tag references in the template
//! 4. walk the template, replacing placeholders with digest references
//! 5. reject images the template never used, unless allowed

use crate::config::ResolverConfig;
use crate::error::{Error, Result};
use crate::publish::{ImagePublisher, TagResolver};
use crate::spec::{parse_specs, ImageSpec};
use crate::stamp::Stamper;
use crate::template::Template;
use crate::yaml::{collect_strings, ResolvedStream, YamlResolver};
use serde_yaml_ng::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Published images and the placeholders not yet seen in the template
#[derive(Debug, Clone, Default)]
pub struct PublishedImages {
    resolved: BTreeMap<String, String>,
    unseen: BTreeSet<String>,
}

impl PublishedImages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a published image; it starts out unseen.
    pub fn insert(&mut self, name: impl Into<String>, reference: impl Into<String>) {
        let name = name.into();
        if self.resolved.insert(name.clone(), reference.into()).is_some() {
            warn!("Image {} was declared more than once, using the last reference", name);
        }
        self.unseen.insert(name);
    }

    /// Digest reference published for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.resolved.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolved.contains_key(name)
    }

    /// Look up a scalar from the template, marking it seen on a match.
    pub fn lookup(&mut self, scalar: &str) -> Option<String> {
        let reference = self.resolved.get(scalar)?.clone();
        if self.unseen.remove(scalar) {
            debug!("Resolved {} to {}", scalar, reference);
        }
        Some(reference)
    }

    /// Declared names not referenced so far, sorted
    pub fn unseen(&self) -> impl Iterator<Item = &str> {
        self.unseen.iter().map(String::as_str)
    }

    pub fn unseen_count(&self) -> usize {
        self.unseen.len()
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    /// All name → reference pairs
    pub fn references(&self) -> &BTreeMap<String, String> {
        &self.resolved
    }
}

/// Outcome of a successful session
#[derive(Debug, Clone)]
pub struct ResolvedManifest {
    /// The resolved template, re-serialized as YAML
    pub content: String,
    /// Number of documents in the template
    pub document_count: usize,
    /// Published image name → digest reference
    pub images: BTreeMap<String, String>,
    /// Declared images the template never referenced (only when allowed)
    pub unused: Vec<String>,
}

/// Orchestrates publishing and template resolution for one run
pub struct ResolutionSession<'a> {
    config: &'a ResolverConfig,
    stamper: &'a Stamper,
    publisher: &'a dyn ImagePublisher,
    tag_resolver: Option<&'a dyn TagResolver>,
}

impl<'a> ResolutionSession<'a> {
    pub fn new(
        config: &'a ResolverConfig,
        stamper: &'a Stamper,
        publisher: &'a dyn ImagePublisher,
    ) -> Self {
        Self {
            config,
            stamper,
            publisher,
            tag_resolver: None,
        }
    }

    /// Resolver used for tag pinning when `resolve_tags` is enabled
    pub fn with_tag_resolver(mut self, resolver: &'a dyn TagResolver) -> Self {
        self.tag_resolver = Some(resolver);
        self
    }

    /// Parse every configured image spec.
    pub fn parse_specs(&self) -> Result<Vec<ImageSpec>> {
        let specs = parse_specs(&self.config.image_specs)?;
        debug!("Parsed {} image specs", specs.len());
        Ok(specs)
    }

    /// Publish images one at a time in declaration order.
    pub async fn publish_all(&self, specs: &[ImageSpec]) -> Result<PublishedImages> {
        let mut published = PublishedImages::new();
        for spec in specs {
            info!("Publishing image {}", spec.name);
            let reference = self.publisher.publish(spec, self.stamper).await?;
            info!("Published {} as {}", spec.name, reference);
            published.insert(spec.name.clone(), reference);
        }
        Ok(published)
    }

    /// Look up digests for tag references that are not image placeholders.
    pub async fn pin_tags(
        &self,
        documents: &[Value],
        published: &PublishedImages,
    ) -> Result<BTreeMap<String, String>> {
        let mut pinned = BTreeMap::new();
        let Some(resolver) = self.tag_resolver else {
            warn!("Tag resolution requested but no tag resolver is configured");
            return Ok(pinned);
        };

        let candidates: BTreeSet<String> = collect_strings(documents)
            .into_iter()
            .filter(|s| !published.contains(s))
            .collect();
        for candidate in candidates {
            if let Some(reference) = resolver.resolve_tag(&candidate).await? {
                debug!("Pinned {} to {}", candidate, reference);
                pinned.insert(candidate, reference);
            }
        }
        Ok(pinned)
    }

    /// Walk the documents, replacing declared image names and pinned tags.
    pub fn resolve_documents(
        &self,
        documents: Vec<Value>,
        published: &mut PublishedImages,
        pinned: &BTreeMap<String, String>,
    ) -> Result<ResolvedStream> {
        let mut resolver = YamlResolver::new(|scalar: &str| {
            if let Some(reference) = published.lookup(scalar) {
                return Ok(reference);
            }
            Ok(pinned
                .get(scalar)
                .cloned()
                .unwrap_or_else(|| scalar.to_string()))
        });
        resolver.resolve_documents(documents)
    }

    /// Apply the unused-image policy after the walk.
    pub fn check_unused(&self, published: &PublishedImages) -> Result<Vec<String>> {
        let unused: Vec<String> = published.unseen().map(str::to_string).collect();
        if unused.is_empty() {
            return Ok(unused);
        }
        if self.config.allow_unused_images {
            for name in &unused {
                warn!("Image {} given as --image_spec was not found in the template", name);
            }
            return Ok(unused);
        }
        Err(Error::UnusedImages { names: unused })
    }

    /// Run every stage against `template`.
    pub async fn run(&self, template: &Template) -> Result<ResolvedManifest> {
        let specs = self.parse_specs()?;
        let mut published = self.publish_all(&specs).await?;

        let documents = template.documents()?;
        let pinned = if self.config.resolve_tags {
            self.pin_tags(&documents, &published).await?
        } else {
            BTreeMap::new()
        };

        let stream = self.resolve_documents(documents, &mut published, &pinned)?;
        debug!(
            "Resolved {} documents of template {}",
            stream.document_count(),
            template.path
        );

        let unused = self.check_unused(&published)?;
        Ok(ResolvedManifest {
            content: stream.to_yaml()?,
            document_count: stream.document_count(),
            images: published.references().clone(),
            unused,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::BoxFuture;
    use std::sync::Mutex;

    /// Publisher that never touches a registry
    struct FakePublisher {
        calls: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl FakePublisher {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: None,
            }
        }

        fn failing_on(name: &str) -> Self {
            Self {
                fail_on: Some(name.to_string()),
                ..Self::new()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ImagePublisher for FakePublisher {
        fn publish<'a>(
            &'a self,
            spec: &'a ImageSpec,
            stamper: &'a Stamper,
        ) -> BoxFuture<'a, Result<String>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(spec.name.clone());
                if self.fail_on.as_deref() == Some(spec.name.as_str()) {
                    return Err(Error::publish(&spec.name, "registry unavailable"));
                }
                let stamped = stamper.stamp(&spec.name)?;
                Ok(format!("gcr.io/x/{}@sha256:deadbeef", stamped.to_lowercase()))
            })
        }
    }

    struct FakeTagResolver;

    impl TagResolver for FakeTagResolver {
        fn resolve_tag<'a>(&'a self, candidate: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
            Box::pin(async move {
                Ok(candidate
                    .strip_suffix(":1.25")
                    .map(|repo| format!("{}@sha256:cafe", repo)))
            })
        }
    }

    fn config(specs: &[&str]) -> ResolverConfig {
        specs
            .iter()
            .fold(ResolverConfig::new("deploy.yaml"), |c, s| c.with_image_spec(*s))
    }

    #[tokio::test]
    async fn test_placeholder_replaced() {
        let config = config(&["name=PLACEHOLDER_A"]);
        let stamper = Stamper::empty();
        let publisher = FakePublisher::new();
        let session = ResolutionSession::new(&config, &stamper, &publisher);

        let manifest = session
            .run(&Template::from_yaml("image: PLACEHOLDER_A\n"))
            .await
            .unwrap();

        assert_eq!(manifest.content, "image: gcr.io/x/placeholder_a@sha256:deadbeef\n");
        assert_eq!(manifest.document_count, 1);
        assert!(manifest.unused.is_empty());
    }

    #[tokio::test]
    async fn test_empty_template_is_one_document() {
        let config = config(&[]);
        let stamper = Stamper::empty();
        let publisher = FakePublisher::new();
        let session = ResolutionSession::new(&config, &stamper, &publisher);

        let manifest = session.run(&Template::from_yaml("")).await.unwrap();
        assert_eq!(manifest.document_count, 1);
        assert_eq!(manifest.content.trim(), "null");
    }

    #[tokio::test]
    async fn test_unused_image_rejected() {
        let config = config(&["name=PLACEHOLDER_A", "name=PLACEHOLDER_B"]);
        let stamper = Stamper::empty();
        let publisher = FakePublisher::new();
        let session = ResolutionSession::new(&config, &stamper, &publisher);

        let err = session
            .run(&Template::from_yaml("image: PLACEHOLDER_A\n"))
            .await
            .unwrap_err();
        match err {
            Error::UnusedImages { names } => assert_eq!(names, vec!["PLACEHOLDER_B"]),
            other => panic!("Expected UnusedImages, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unused_image_allowed() {
        let config =
            config(&["name=PLACEHOLDER_A", "name=PLACEHOLDER_B"]).with_allow_unused_images(true);
        let stamper = Stamper::empty();
        let publisher = FakePublisher::new();
        let session = ResolutionSession::new(&config, &stamper, &publisher);

        let manifest = session
            .run(&Template::from_yaml("image: PLACEHOLDER_A\n"))
            .await
            .unwrap();
        assert_eq!(manifest.unused, vec!["PLACEHOLDER_B"]);
        assert_eq!(manifest.images.len(), 2);
    }

    #[tokio::test]
    async fn test_publish_fails_fast_in_declaration_order() {
        let config = config(&["name=a", "name=b", "name=c"]);
        let stamper = Stamper::empty();
        let publisher = FakePublisher::failing_on("b");
        let session = ResolutionSession::new(&config, &stamper, &publisher);

        let err = session
            .run(&Template::from_yaml("- a\n- b\n- c\n"))
            .await
            .unwrap_err();
        assert_eq!(err.image(), Some("b"));
        assert_eq!(publisher.calls(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_parse_error_stops_before_publishing() {
        let config = config(&["name=a", "name=b;colour=blue"]);
        let stamper = Stamper::empty();
        let publisher = FakePublisher::new();
        let session = ResolutionSession::new(&config, &stamper, &publisher);

        let err = session.run(&Template::from_yaml("a\n")).await.unwrap_err();
        assert!(matches!(err, Error::UnknownField { .. }));
        assert!(publisher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_multi_document_stream() {
        let config = config(&["name=a", "name=d"]);
        let stamper = Stamper::empty();
        let publisher = FakePublisher::new();
        let session = ResolutionSession::new(&config, &stamper, &publisher);

        let manifest = session
            .run(&Template::from_yaml("- a\n- b\n---\nc: d\n"))
            .await
            .unwrap();
        assert_eq!(manifest.document_count, 2);
        assert_eq!(
            manifest.content,
            "- gcr.io/x/a@sha256:deadbeef\n- b\n---\nc: gcr.io/x/d@sha256:deadbeef\n"
        );
    }

    #[tokio::test]
    async fn test_stamped_names_used_for_publishing() {
        let config = config(&["name=app-{BUILD_USER}"]);
        let stamper = Stamper::from_pairs([("BUILD_USER", "alice")]);
        let publisher = FakePublisher::new();
        let session = ResolutionSession::new(&config, &stamper, &publisher);

        let manifest = session
            .run(&Template::from_yaml("image: app-{BUILD_USER}\n"))
            .await
            .unwrap();
        assert_eq!(manifest.content, "image: gcr.io/x/app-alice@sha256:deadbeef\n");
    }

    #[test]
    fn test_lookup_removes_unseen_once() {
        let mut published = PublishedImages::new();
        published.insert("A", "gcr.io/x/a@sha256:deadbeef");
        published.insert("B", "gcr.io/x/b@sha256:deadbeef");
        assert_eq!(published.unseen_count(), 2);

        assert_eq!(
            published.lookup("A").as_deref(),
            Some("gcr.io/x/a@sha256:deadbeef")
        );
        assert_eq!(published.unseen_count(), 1);
        assert!(published.lookup("A").is_some());
        assert_eq!(published.unseen_count(), 1);
        assert!(published.lookup("C").is_none());
        assert_eq!(published.unseen().collect::<Vec<_>>(), vec!["B"]);
    }

    #[test]
    fn test_resolve_documents_leaves_other_strings() {
        let config = config(&[]);
        let stamper = Stamper::empty();
        let publisher = FakePublisher::new();
        let session = ResolutionSession::new(&config, &stamper, &publisher);

        let mut published = PublishedImages::new();
        published.insert("PH", "gcr.io/x/ph@sha256:deadbeef");
        let documents = Template::from_yaml("a: PH\nb: PH\nc: other\n")
            .documents()
            .unwrap();
        let stream = session
            .resolve_documents(documents, &mut published, &BTreeMap::new())
            .unwrap();
        assert_eq!(
            stream.to_yaml().unwrap(),
            "a: gcr.io/x/ph@sha256:deadbeef\nb: gcr.io/x/ph@sha256:deadbeef\nc: other\n"
        );
        assert_eq!(published.unseen_count(), 0);
    }

    #[tokio::test]
    async fn test_resolve_tags_pins_external_references() {
        let config = config(&["name=PH"]).with_resolve_tags(true);
        let stamper = Stamper::empty();
        let publisher = FakePublisher::new();
        let tags = FakeTagResolver;
        let session =
            ResolutionSession::new(&config, &stamper, &publisher).with_tag_resolver(&tags);

        let manifest = session
            .run(&Template::from_yaml(
                "app: PH\nsidecar: docker.io/library/nginx:1.25\nname: web\n",
            ))
            .await
            .unwrap();
        assert_eq!(
            manifest.content,
            "app: gcr.io/x/ph@sha256:deadbeef\nsidecar: docker.io/library/nginx@sha256:cafe\nname: web\n"
        );
    }

    #[tokio::test]
    async fn test_tags_untouched_without_resolve_tags() {
        let config = config(&[]);
        let stamper = Stamper::empty();
        let publisher = FakePublisher::new();
        let tags = FakeTagResolver;
        let session =
            ResolutionSession::new(&config, &stamper, &publisher).with_tag_resolver(&tags);

        let manifest = session
            .run(&Template::from_yaml("sidecar: docker.io/library/nginx:1.25\n"))
            .await
            .unwrap();
        assert_eq!(manifest.content, "sidecar: docker.io/library/nginx:1.25\n");
    }
}

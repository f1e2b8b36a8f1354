//! Error types for k8s-resolver-core

use thiserror::Error;

/// Result type alias using k8s-resolver-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the resolver
#[derive(Error, Debug)]
pub enum Error {
    /// Image spec segment that is not `key=value`
    #[error("image spec item {field:?} split by '=' into unexpected fields, want 2")]
    MalformedField { field: String },

    /// Image spec key outside the recognized set
    #[error("unknown image spec field {key:?}")]
    UnknownField { key: String },

    /// Missing required image spec field
    #[error("image spec {spec:?} is missing required field {field:?}")]
    MissingField { spec: String, field: String },

    /// Layer metadata sequences of unequal length
    #[error(
        "digest, diffID, compressed blobs & uncompressed blobs had unequal lengths for image {image}, \
         got {digests}, {diff_ids}, {compressed}, {uncompressed}, want all of the lengths to be equal"
    )]
    LayerCountMismatch {
        image: String,
        digests: usize,
        diff_ids: usize,
        compressed: usize,
        uncompressed: usize,
    },

    /// Image could not be assembled from its parts
    #[error("error reading image {image}: {message}")]
    ImageRead { image: String, message: String },

    /// Stamped name is not a valid tag reference
    #[error("unable to create a docker tag for image {image}: {message}")]
    TagConstruction { image: String, message: String },

    /// Registry credentials could not be resolved
    #[error("unable to get authenticator for image {image}: {message}")]
    AuthResolution { image: String, message: String },

    /// Registry push failed
    #[error("unable to push image {image}: {message}")]
    Publish { image: String, message: String },

    /// Template bytes are not a YAML stream
    #[error("unable to parse document {document} as YAML: {message}")]
    Decode { document: usize, message: String },

    /// Two keys of one mapping resolved to the same key
    #[error("resolved mapping key {key} collides with another key in the same mapping")]
    DuplicateKey { key: String },

    /// The string-resolution callback failed
    #[error("unable to resolve {value:?}: {message}")]
    ScalarResolution { value: String, message: String },

    /// A walk error annotated with its document index
    #[error("document {index}: {source}")]
    Document {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    /// Declared images the template never referenced
    #[error(
        "the following images given as --image_spec were not found in the template: {}; \
         --allow_unused_images can be specified to ignore this error",
        .names.join(", ")
    )]
    UnusedImages { names: Vec<String> },

    /// Stamp-info file could not be read
    #[error("unable to read stamp info file {path}: {source}")]
    StampInfoRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed stamp-info file
    #[error("malformed line {line:?} in stamp info file {path}")]
    StampInfo { path: String, line: String },

    /// `{KEY}` with no value in any stamp-info file
    #[error("unknown stamp variable {{{name}}} in {input:?}")]
    UnknownStampVariable { name: String, input: String },

    /// Template file could not be read
    #[error("unable to open template file {path}: {source}")]
    TemplateRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid resolver configuration
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl Error {
    /// Create a malformed field error
    pub fn malformed_field(field: impl Into<String>) -> Self {
        Self::MalformedField {
            field: field.into(),
        }
    }

    /// Create an unknown field error
    pub fn unknown_field(key: impl Into<String>) -> Self {
        Self::UnknownField { key: key.into() }
    }

    /// Create a missing field error
    pub fn missing_field(spec: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            spec: spec.into(),
            field: field.into(),
        }
    }

    /// Create an image read error
    pub fn image_read(image: impl Into<String>, message: impl ToString) -> Self {
        Self::ImageRead {
            image: image.into(),
            message: message.to_string(),
        }
    }

    /// Create a tag construction error
    pub fn tag_construction(image: impl Into<String>, message: impl ToString) -> Self {
        Self::TagConstruction {
            image: image.into(),
            message: message.to_string(),
        }
    }

    /// Create an auth resolution error
    pub fn auth_resolution(image: impl Into<String>, message: impl ToString) -> Self {
        Self::AuthResolution {
            image: image.into(),
            message: message.to_string(),
        }
    }

    /// Create a publish error
    pub fn publish(image: impl Into<String>, message: impl ToString) -> Self {
        Self::Publish {
            image: image.into(),
            message: message.to_string(),
        }
    }

    /// Create a decode error
    pub fn decode(document: usize, message: impl ToString) -> Self {
        Self::Decode {
            document,
            message: message.to_string(),
        }
    }

    /// Create a scalar resolution error
    pub fn scalar_resolution(value: impl Into<String>, message: impl ToString) -> Self {
        Self::ScalarResolution {
            value: value.into(),
            message: message.to_string(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Attach a document index to an error raised while walking that document
    pub fn in_document(self, index: usize) -> Self {
        match self {
            // Decode errors already name their document
            Self::Decode { .. } | Self::Document { .. } => self,
            other => Self::Document {
                index,
                source: Box::new(other),
            },
        }
    }

    /// Name of the image this error concerns, when it is tied to one
    pub fn image(&self) -> Option<&str> {
        match self {
            Self::LayerCountMismatch { image, .. }
            | Self::ImageRead { image, .. }
            | Self::TagConstruction { image, .. }
            | Self::AuthResolution { image, .. }
            | Self::Publish { image, .. } => Some(image),
            _ => None,
        }
    }
}

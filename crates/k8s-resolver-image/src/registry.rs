use crate::credentials::Credential;
use crate::image::{Blob, LocalImage};
use crate::types::{ImageReference, MANIFEST_MEDIA_TYPE, OCI_MANIFEST_MEDIA_TYPE};
use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use regex::Regex;
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, LOCATION};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tokio::sync::RwLock;
use tracing::{debug, info, trace};
use url::Url;

const DIGEST_HEADER: &str = "docker-content-digest";

/// Client for the OCI distribution API of a single registry
pub struct RegistryClient {
    client: reqwest::Client,
    registry: String,
    scheme: &'static str,
    credential: Credential,
    /// Authorization header obtained from the registry's challenge
    authorization: RwLock<Option<HeaderValue>>,
}

impl RegistryClient {
    /// Create a client for the registry hosting `reference`
    pub fn new(reference: &ImageReference, credential: Credential) -> Result<Self> {
        Self::for_registry(&reference.registry, reference.scheme(), credential)
    }

    /// Create a client for `registry` reached over `scheme`
    pub fn for_registry(
        registry: impl Into<String>,
        scheme: &'static str,
        credential: Credential,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("k8s-resolver/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            registry: registry.into(),
            scheme,
            credential,
            authorization: RwLock::new(None),
        })
    }

    fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.registry)
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v2/{}", self.base_url(), path)
    }

    /// Ping the registry and answer its authentication challenge, if any.
    ///
    /// `actions` is the scope requested from a token service, e.g.
    /// `"pull"` or `"pull,push"`.
    pub async fn authenticate(&self, repository: &str, actions: &str) -> Result<()> {
        let url = self.api_url("");
        debug!("Pinging registry at {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to connect to registry at {}", url))?;

        if response.status().is_success() {
            trace!("Registry {} does not require authentication", self.registry);
            return Ok(());
        }
        if response.status() != StatusCode::UNAUTHORIZED {
            return Err(status_error("ping", &url, response).await);
        }

        let header = response
            .headers()
            .get(reqwest::header::WWW_AUTHENTICATE)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| anyhow!("Registry {} returned 401 without a challenge", self.registry))?;
        let challenge = Challenge::parse(header)?;

        let authorization = match challenge.scheme.as_str() {
            "bearer" => {
                let token = self.fetch_token(&challenge, repository, actions).await?;
                HeaderValue::from_str(&format!("Bearer {}", token))?
            }
            "basic" => match &self.credential {
                Credential::Basic { username, password } => HeaderValue::from_str(&format!(
                    "Basic {}",
                    BASE64.encode(format!("{}:{}", username, password))
                ))?,
                Credential::Anonymous => bail!(
                    "Registry {} requires basic authentication but no credentials were found",
                    self.registry
                ),
            },
            other => bail!("Unsupported authentication scheme {:?} from {}", other, self.registry),
        };

        *self.authorization.write().await = Some(authorization);
        Ok(())
    }

    /// Exchange the credential for a bearer token at the challenge realm
    async fn fetch_token(
        &self,
        challenge: &Challenge,
        repository: &str,
        actions: &str,
    ) -> Result<String> {
        let realm = challenge
            .params
            .get("realm")
            .ok_or_else(|| anyhow!("Bearer challenge from {} has no realm", self.registry))?;
        let mut url =
            Url::parse(realm).with_context(|| format!("Invalid token realm {:?}", realm))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = challenge.params.get("service") {
                query.append_pair("service", service);
            }
            query.append_pair("scope", &format!("repository:{}:{}", repository, actions));
        }

        debug!("Requesting registry token from: {}", url);

        let mut request = self.client.get(url.as_str());
        if let Credential::Basic { username, password } = &self.credential {
            request = request.basic_auth(username, Some(password));
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to request token from {}", url))?;

        if !response.status().is_success() {
            return Err(status_error("token request", url.as_str(), response).await);
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;
        token
            .token
            .or(token.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow!("Token response from {} carried no token", url))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = match self.authorization.read().await.as_ref() {
            Some(authorization) => request.header(AUTHORIZATION, authorization.clone()),
            None => request,
        };
        request.send().await.context("Registry request failed")
    }

    /// Whether the registry already has `digest` in `repository`
    pub async fn blob_exists(&self, repository: &str, digest: &str) -> Result<bool> {
        let url = self.api_url(&format!("{}/blobs/{}", repository, digest));
        let response = self.send(self.client.head(&url)).await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(status_error("blob check", &url, response).await),
        }
    }

    /// Upload `blob` in a single request, skipping blobs already present
    pub async fn upload_blob(&self, repository: &str, blob: &Blob) -> Result<()> {
        if self.blob_exists(repository, &blob.digest).await? {
            debug!("Blob {} already present in {}", blob.digest, repository);
            return Ok(());
        }

        let url = self.api_url(&format!("{}/blobs/uploads/", repository));
        let response = self.send(self.client.post(&url)).await?;
        if !response.status().is_success() {
            return Err(status_error("upload start", &url, response).await);
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| anyhow!("Upload start at {} returned no Location", url))?;
        let mut upload_url = Url::parse(&self.base_url())
            .and_then(|base| base.join(location))
            .with_context(|| format!("Invalid upload location {:?}", location))?;
        upload_url
            .query_pairs_mut()
            .append_pair("digest", &blob.digest);

        trace!("Uploading {} ({} bytes) to {}", blob.digest, blob.size(), upload_url);

        let response = self
            .send(
                self.client
                    .put(upload_url.as_str())
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .body(blob.data.clone()),
            )
            .await?;
        if !response.status().is_success() {
            return Err(status_error("blob upload", upload_url.as_str(), response).await);
        }
        Ok(())
    }

    /// Put a manifest under `reference` (a tag or digest)
    pub async fn put_manifest(
        &self,
        repository: &str,
        reference: &str,
        media_type: &str,
        manifest: &[u8],
    ) -> Result<Option<String>> {
        let url = self.api_url(&format!("{}/manifests/{}", repository, reference));
        debug!("Putting manifest to: {}", url);

        let response = self
            .send(
                self.client
                    .put(&url)
                    .header(CONTENT_TYPE, media_type)
                    .body(manifest.to_vec()),
            )
            .await?;
        if !response.status().is_success() {
            return Err(status_error("manifest put", &url, response).await);
        }
        Ok(digest_header(&response))
    }

    /// Digest of the manifest currently stored under `reference`
    pub async fn manifest_digest(&self, repository: &str, reference: &str) -> Result<String> {
        let url = self.api_url(&format!("{}/manifests/{}", repository, reference));
        debug!("Fetching manifest digest from: {}", url);

        let accept = format!("{},{}", OCI_MANIFEST_MEDIA_TYPE, MANIFEST_MEDIA_TYPE);
        let response = self
            .send(self.client.head(&url).header(ACCEPT, accept))
            .await?;
        if !response.status().is_success() {
            return Err(status_error("manifest lookup", &url, response).await);
        }
        digest_header(&response)
            .ok_or_else(|| anyhow!("Registry returned no digest for {}", url))
    }

    /// Push every blob of `image`, then its manifest under the tag of `target`
    pub async fn push(&self, target: &ImageReference, image: &LocalImage) -> Result<()> {
        let repository = &target.repository;
        self.authenticate(repository, "pull,push").await?;

        for layer in image.layers() {
            self.upload_blob(repository, &layer.blob).await?;
        }
        self.upload_blob(repository, image.config()).await?;

        let remote_digest = self
            .put_manifest(
                repository,
                target.identifier(),
                MANIFEST_MEDIA_TYPE,
                image.manifest_bytes(),
            )
            .await?;
        if let Some(remote) = remote_digest.filter(|d| d != image.digest()) {
            bail!(
                "Registry stored manifest as {} but it hashes to {}",
                remote,
                image.digest()
            );
        }

        info!("Pushed {} ({})", target, image.digest());
        Ok(())
    }
}

fn digest_header(response: &Response) -> Option<String> {
    response
        .headers()
        .get(DIGEST_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

async fn status_error(operation: &str, url: &str, response: Response) -> anyhow::Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    anyhow!(
        "Registry {} returned {} for {}: {}",
        operation,
        status,
        url,
        if body.is_empty() {
            "(no response body)".to_string()
        } else {
            body
        }
    )
}

/// Parsed `WWW-Authenticate` header
#[derive(Debug, PartialEq, Eq)]
struct Challenge {
    /// Lowercased scheme, e.g. "bearer"
    scheme: String,
    params: HashMap<String, String>,
}

impl Challenge {
    fn parse(header: &str) -> Result<Self> {
        static PARAM: OnceLock<Regex> = OnceLock::new();
        let param = PARAM.get_or_init(|| {
            Regex::new(r#"([A-Za-z_]+)="([^"]*)""#).expect("challenge pattern is valid")
        });

        let header = header.trim();
        let (scheme, rest) = header.split_once(' ').unwrap_or((header, ""));
        if scheme.is_empty() {
            bail!("Empty authentication challenge");
        }

        let params = param
            .captures_iter(rest)
            .map(|c| (c[1].to_ascii_lowercase(), c[2].to_string()))
            .collect();

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            params,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

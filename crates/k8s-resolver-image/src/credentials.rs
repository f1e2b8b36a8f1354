//! Registry credentials from the Docker client configuration
//!
//! Reads `$DOCKER_CONFIG/config.json` (or `~/.docker/config.json`) the way
//! the Docker CLI does: per-registry credential helpers first, then inline
//! `auths` entries, then the default credential store.

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, trace};

const DOCKER_HUB_AUTH_KEY: &str = "https://index.docker.io/v1/";

/// Credential used to authenticate against a registry
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Credential {
    #[default]
    Anonymous,
    Basic {
        username: String,
        password: String,
    },
}

/// Docker `config.json` contents relevant to authentication
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
    #[serde(default)]
    cred_helpers: HashMap<String, String>,
    #[serde(default)]
    creds_store: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthEntry {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HelperResponse {
    username: String,
    secret: String,
}

/// Resolves credentials for registry hosts
#[derive(Debug, Clone)]
pub struct Keychain {
    config_path: Option<Utf8PathBuf>,
}

impl Keychain {
    /// Keychain backed by the default Docker config location
    pub fn from_env() -> Self {
        let config_dir = std::env::var("DOCKER_CONFIG")
            .ok()
            .filter(|dir| !dir.is_empty())
            .map(Utf8PathBuf::from)
            .or_else(|| {
                dirs::home_dir()
                    .and_then(|home| Utf8PathBuf::from_path_buf(home).ok())
                    .map(|home| home.join(".docker"))
            });

        Self {
            config_path: config_dir.map(|dir| dir.join("config.json")),
        }
    }

    /// Keychain backed by a specific config file
    pub fn with_config_path(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Keychain that never finds credentials
    pub fn anonymous() -> Self {
        Self { config_path: None }
    }

    /// Resolve the credential for `registry` (a host, optionally with port)
    pub fn resolve(&self, registry: &str) -> Result<Credential> {
        let Some(path) = &self.config_path else {
            return Ok(Credential::Anonymous);
        };
        if !path.exists() {
            trace!("No docker config at {}, using anonymous access", path);
            return Ok(Credential::Anonymous);
        }

        let config = load_config(path)?;

        if let Some(helper) = config.cred_helpers.get(registry) {
            debug!("Using credential helper {} for {}", helper, registry);
            return run_helper(helper, registry);
        }

        for key in auth_keys(registry) {
            if let Some(entry) = config.auths.get(&key) {
                if let Some(credential) = decode_entry(entry)
                    .with_context(|| format!("Invalid auths entry {:?} in {}", key, path))?
                {
                    debug!("Using auths entry {:?} for {}", key, registry);
                    return Ok(credential);
                }
            }
        }

        if let Some(store) = &config.creds_store {
            debug!("Using credential store {} for {}", store, registry);
            return run_helper(store, registry);
        }

        Ok(Credential::Anonymous)
    }
}

fn load_config(path: &Utf8Path) -> Result<DockerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read docker config {}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse docker config {}", path))
}

/// Keys under which `auths` may hold the entry for `registry`
fn auth_keys(registry: &str) -> Vec<String> {
    let mut keys = vec![
        registry.to_string(),
        format!("https://{}", registry),
        format!("http://{}", registry),
    ];
    if registry == "index.docker.io" || registry == "docker.io" {
        keys.extend(
            [DOCKER_HUB_AUTH_KEY, "index.docker.io", "docker.io"]
                .iter()
                .map(|k| k.to_string()),
        );
    }
    keys
}

fn decode_entry(entry: &AuthEntry) -> Result<Option<Credential>> {
    if let Some(auth) = entry.auth.as_deref().filter(|a| !a.is_empty()) {
        let decoded = BASE64.decode(auth).context("auth is not valid base64")?;
        let decoded = String::from_utf8(decoded).context("auth is not valid UTF-8")?;
        let (username, password) = decoded
            .split_once(':')
            .ok_or_else(|| anyhow!("auth is not of the form user:password"))?;
        return Ok(Some(Credential::Basic {
            username: username.to_string(),
            password: password.to_string(),
        }));
    }

    match (&entry.username, &entry.password) {
        (Some(username), Some(password)) if !username.is_empty() => Ok(Some(Credential::Basic {
            username: username.clone(),
            password: password.clone(),
        })),
        _ => Ok(None),
    }
}

/// Run `docker-credential-<helper> get` for `registry`
fn run_helper(helper: &str, registry: &str) -> Result<Credential> {
    let program = format!("docker-credential-{}", helper);
    let output = duct::cmd(program.as_str(), ["get"])
        .stdin_bytes(registry.as_bytes())
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()
        .with_context(|| format!("Failed to run {}", program))?;

    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        // Helpers report unknown registries on stdout rather than failing hard
        if stdout.contains("credentials not found") {
            return Ok(Credential::Anonymous);
        }
        bail!(
            "{} get failed ({}): {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let response: HelperResponse = serde_json::from_slice(&output.stdout)
        .with_context(|| format!("Failed to parse output of {}", program))?;
    Ok(Credential::Basic {
        username: response.username,
        password: response.secret,
    })
}

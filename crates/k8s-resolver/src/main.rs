//! k8s-resolver - Resolve image placeholders in Kubernetes manifests
//!
//! Publishes every image given with `--image_spec`, then rewrites the
//! template so each image name becomes its digest-pinned reference.

mod cli;

use anyhow::{Context, Result};
use camino::Utf8Path;
use clap::Parser;
use k8s_resolver_core::{ResolutionSession, ResolverConfig, Stamper, Template};
use k8s_resolver_image::{Keychain, RegistryPublisher, RegistryTagResolver};
use std::io::Write;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider (required for rustls 0.23+)
    // This must be done before any TLS operations
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    run(&cli.to_config()).await
}

async fn run(config: &ResolverConfig) -> Result<()> {
    config.validate()?;

    let stamper = Stamper::from_files(&config.stamp_info_files)?;
    let template = Template::load(&config.template)?;

    let publisher = RegistryPublisher::from_config(config);
    let tag_resolver = RegistryTagResolver::new(Keychain::from_env());
    let session =
        ResolutionSession::new(config, &stamper, &publisher).with_tag_resolver(&tag_resolver);

    let manifest = session.run(&template).await?;
    info!(
        "Resolved {} images across {} documents",
        manifest.images.len(),
        manifest.document_count
    );

    write_output(config.output.as_deref(), &manifest.content)
}

fn write_output(output: Option<&Utf8Path>, content: &str) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, content)
            .with_context(|| format!("Failed to write resolved manifest to {}", path)),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(content.as_bytes())
                .and_then(|_| stdout.flush())
                .context("Failed to write resolved manifest")
        }
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    // Logs go to stderr so stdout carries only the manifest
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

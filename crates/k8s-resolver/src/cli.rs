//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::Parser;
use k8s_resolver_core::ResolverConfig;

/// k8s-resolver - Publish images and pin them by digest in k8s manifests
#[derive(Parser, Debug)]
#[command(name = "k8s-resolver")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,

    /// The k8s YAML (or JSON) template file to resolve
    #[arg(long, value_name = "PATH")]
    pub template: Utf8PathBuf,

    /// Image spec of the form name=...;config=...;digest=... (repeatable)
    #[arg(long = "image_spec", value_name = "SPEC")]
    pub image_specs: Vec<String>,

    /// File with `KEY value` lines used to stamp image names (repeatable)
    #[arg(long = "stamp-info-file", value_name = "PATH")]
    pub stamp_info_files: Vec<Utf8PathBuf>,

    /// Repository prefix under which images are published
    #[arg(long = "image_chroot", env = "K8S_RESOLVER_IMAGE_CHROOT", value_name = "PREFIX")]
    pub image_chroot: Option<String>,

    /// Succeed even if some images are not referenced by the template
    #[arg(long = "allow_unused_images")]
    pub allow_unused_images: bool,

    /// Compute digests without pushing anything
    #[arg(long = "no_push")]
    pub no_push: bool,

    /// Also pin fully qualified tag references (registry/repo:tag) found in the template
    #[arg(long = "resolve_tags")]
    pub resolve_tags: bool,

    /// Write the resolved manifest here instead of standard output
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<Utf8PathBuf>,
}

impl Cli {
    /// Configuration for this run
    pub fn to_config(&self) -> ResolverConfig {
        ResolverConfig {
            template: self.template.clone(),
            image_specs: self.image_specs.clone(),
            stamp_info_files: self.stamp_info_files.clone(),
            image_chroot: self.image_chroot.clone(),
            allow_unused_images: self.allow_unused_images,
            no_push: self.no_push,
            resolve_tags: self.resolve_tags,
            output: self.output.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_full_command_line() {
        let cli = Cli::try_parse_from([
            "k8s-resolver",
            "--template",
            "deploy.yaml",
            "--image_spec",
            "name=a;config=a.json",
            "--image_spec",
            "name=b;tarball=b.tar",
            "--stamp-info-file",
            "stable-status.txt",
            "--stamp-info-file",
            "volatile-status.txt",
            "--image_chroot",
            "gcr.io/proj",
            "--allow_unused_images",
            "--no_push",
            "-vv",
        ])
        .unwrap();

        let config = cli.to_config();
        assert_eq!(config.template, "deploy.yaml");
        assert_eq!(config.image_specs.len(), 2);
        assert_eq!(config.image_specs[1], "name=b;tarball=b.tar");
        assert_eq!(config.stamp_info_files.len(), 2);
        assert_eq!(config.chroot(), Some("gcr.io/proj"));
        assert!(config.allow_unused_images);
        assert!(config.no_push);
        assert!(!config.resolve_tags);
        assert!(config.output.is_none());
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_template_is_required() {
        assert!(Cli::try_parse_from(["k8s-resolver", "--image_spec", "name=a"]).is_err());
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["k8s-resolver", "--template", "t.yaml", "-q"]).unwrap();
        assert!(cli.image_specs.is_empty());
        assert!(!cli.allow_unused_images);
        assert!(!cli.no_push);
        assert!(cli.quiet);
    }
}

//! On-disk image fixtures

use camino::Utf8PathBuf;
use flate2::write::GzEncoder;
use flate2::Compression;
use k8s_resolver_core::ImageSpec;
use k8s_resolver_image::image::sha256_digest;
use std::io::Write;
use tempfile::TempDir;

/// Image built from a config file and `layer_count` layers in a temp dir
pub struct ImageFixture {
    #[allow(dead_code)]
    pub dir: TempDir,
    pub spec: ImageSpec,
}

fn utf8(dir: &TempDir, name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap()
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

impl ImageFixture {
    pub fn new(name: &str, layer_count: usize) -> Self {
        let dir = TempDir::new().unwrap();
        let config = utf8(&dir, "config.json");
        std::fs::write(&config, br#"{"architecture":"amd64","os":"linux"}"#).unwrap();

        let mut spec = ImageSpec {
            name: name.to_string(),
            config: Some(config),
            ..ImageSpec::default()
        };

        for i in 0..layer_count {
            let contents = format!("layer {} contents", i);
            let compressed = gzip(contents.as_bytes());

            let compressed_path = utf8(&dir, &format!("layer{}.tar.gz", i));
            let uncompressed_path = utf8(&dir, &format!("layer{}.tar", i));
            let digest_path = utf8(&dir, &format!("layer{}.sha256", i));
            let diff_id_path = utf8(&dir, &format!("layer{}.diff_id", i));

            std::fs::write(&compressed_path, &compressed).unwrap();
            std::fs::write(&uncompressed_path, contents.as_bytes()).unwrap();
            std::fs::write(&digest_path, sha256_digest(&compressed)).unwrap();
            std::fs::write(&diff_id_path, sha256_digest(contents.as_bytes())).unwrap();

            spec.compressed_layers.push(compressed_path);
            spec.uncompressed_layers.push(uncompressed_path);
            spec.digests.push(digest_path);
            spec.diff_ids.push(diff_id_path);
        }

        Self { dir, spec }
    }
}

//! Temporary configuration files for service tests.

use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

/// A YAML file written into a fresh temporary directory.
///
/// The directory is removed when this value is dropped, so keep it alive for
/// as long as the file is needed.
pub struct TempConfig {
    pub dir: TempDir,
    pub path: PathBuf,
}

/// Write `contents` to `<tmp>/<name>`.
pub fn write_temp_config(name: &str, contents: &str) -> TempConfig {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).expect("create config file");
    file.write_all(contents.as_bytes()).expect("write config file");
    TempConfig { dir, path }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_config_written() {
        let config = write_temp_config("service.yaml", "cache:\n  max_entries: 3\n");
        let text = std::fs::read_to_string(&config.path).unwrap();
        assert!(text.contains("max_entries"));
        assert!(config.path.starts_with(config.dir.path()));
    }
}

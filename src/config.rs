use anyhow::{Context, Result};
use celebmatch_vision::{ModelPaths, Thresholds};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(
        option_env!("CELEBMATCH_CONFIG_PATH").unwrap_or("/usr/local/etc/celebmatch/config.toml"),
    )
});

/// Per-user fallback, e.g. `~/.config/celebmatch/config.toml`.
pub static USER_CONFIG_PATH: Lazy<Option<PathBuf>> = Lazy::new(|| {
    directories::ProjectDirs::from("", "", "celebmatch")
        .map(|dirs| dirs.config_dir().join("config.toml"))
});

pub const URL_ENV: &str = "SUPABASE_URL";
pub const KEY_ENV: &str = "SUPABASE_ANON_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub corpus: CorpusConfig,
    pub vision: VisionConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Records requested per page.
    pub page_size: u64,
    /// Serve from a local snapshot file instead of the remote catalog.
    pub snapshot: Option<PathBuf>,
    pub remote: RemoteConfig,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            page_size: 1000,
            snapshot: None,
            remote: RemoteConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    pub url: String,
    pub key: String,
    pub table: String,
    pub count_table: String,
    /// Column to order pages by; unordered when unset.
    pub order_by: Option<String>,
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            key: String::new(),
            table: "celebritydataset".to_string(),
            count_table: "celebritydataset_count".to_string(),
            order_by: None,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub detector_model: PathBuf,
    pub recognizer_model: PathBuf,
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        let thresholds = Thresholds::default();
        Self {
            detector_model: PathBuf::from(
                "/usr/local/share/celebmatch/face_detection_yunet_2023mar.onnx",
            ),
            recognizer_model: PathBuf::from(
                "/usr/local/share/celebmatch/face_recognition_sface_2021dec.onnx",
            ),
            score_threshold: thresholds.score,
            nms_threshold: thresholds.nms,
        }
    }
}

impl VisionConfig {
    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths {
            detector: self.detector_model.clone(),
            recognizer: self.recognizer_model.clone(),
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            score: self.score_threshold,
            nms: self.nms_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub max_upload_bytes: usize,
    pub default_num_results: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
            default_num_results: 8,
        }
    }
}

impl Config {
    /// Settings every command needs, checked before any collaborator is built.
    pub fn validate(&self) -> Result<()> {
        if self.corpus.page_size == 0 {
            anyhow::bail!("corpus.page_size must be greater than 0");
        }
        if self.server.default_num_results < 1 {
            anyhow::bail!("server.default_num_results must be at least 1");
        }
        for (name, v) in [
            ("vision.score_threshold", self.vision.score_threshold),
            ("vision.nms_threshold", self.vision.nms_threshold),
        ] {
            if !(0.0..=1.0).contains(&v) {
                anyhow::bail!("{} must be within [0, 1], got {}", name, v);
            }
        }
        if self.corpus.snapshot.is_none() {
            self.validate_remote()?;
        }
        Ok(())
    }

    /// The remote catalog must be reachable: needed for serving without a snapshot and for `snapshot`.
    pub fn validate_remote(&self) -> Result<()> {
        let remote = &self.corpus.remote;
        if remote.url.trim().is_empty() {
            anyhow::bail!("corpus.remote.url is not set (or export {})", URL_ENV);
        }
        if remote.key.trim().is_empty() {
            anyhow::bail!("corpus.remote.key is not set (or export {})", KEY_ENV);
        }
        if remote.table.is_empty() || remote.count_table.is_empty() {
            anyhow::bail!("corpus.remote.table and corpus.remote.count_table must be set");
        }
        Ok(())
    }

    /// Environment variables win over the file for the remote credentials.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(URL_ENV) {
            self.corpus.remote.url = url;
        }
        if let Ok(key) = std::env::var(KEY_ENV) {
            self.corpus.remote.key = key;
        }
    }
}

/// The explicit path if given, else the system path, else the per-user path.
pub fn resolve_path(path: Option<&Path>) -> PathBuf {
    if let Some(p) = path {
        return p.to_path_buf();
    }
    if CONFIG_PATH.exists() {
        return CONFIG_PATH.to_path_buf();
    }
    match USER_CONFIG_PATH.as_ref() {
        Some(user) if user.exists() => user.clone(),
        _ => CONFIG_PATH.to_path_buf(),
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = resolve_path(path);
    let mut cfg = if path.exists() {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config at {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?
    } else {
        log::debug!("no config at {}, using defaults", path.display());
        Config::default()
    };
    cfg.apply_env();
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: &Path) -> Result<()> {
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_config() -> Config {
        let mut cfg = Config::default();
        cfg.corpus.remote.url = "https://example.supabase.co".into();
        cfg.corpus.remote.key = "anon".into();
        cfg
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.corpus.page_size, 1000);
        assert_eq!(cfg.server.default_num_results, 8);
        assert_eq!(cfg.corpus.remote.table, "celebritydataset");
    }

    #[test]
    fn test_partial_toml() {
        let cfg: Config = toml::from_str(
            r#"
            [corpus]
            page_size = 250

            [corpus.remote]
            url = "https://example.supabase.co"
            key = "anon"

            [server]
            bind = "0.0.0.0:9000"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.corpus.page_size, 250);
        assert_eq!(cfg.corpus.remote.count_table, "celebritydataset_count");
        assert_eq!(cfg.server.bind, "0.0.0.0:9000");
        assert_eq!(cfg.server.default_num_results, 8);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_validate() {
        assert!(remote_config().validate().is_ok());

        // remote credentials are required unless a snapshot is configured
        let mut cfg = Config::default();
        assert!(cfg.validate().is_err());
        cfg.corpus.snapshot = Some(PathBuf::from("catalog.bin"));
        assert!(cfg.validate().is_ok());

        let mut cfg = remote_config();
        cfg.corpus.page_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = remote_config();
        cfg.server.default_num_results = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = remote_config();
        cfg.vision.nms_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("celebmatch").join("config.toml");
        let mut cfg = remote_config();
        cfg.corpus.page_size = 42;

        save_config(&cfg, &path).unwrap();
        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.corpus.page_size, 42);
    }
}

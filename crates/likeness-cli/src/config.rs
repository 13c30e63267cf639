use likeness_core::embedder::{ARCFACE_EMBEDDING_DIM, ARCFACE_MATCH_THRESHOLD};
use likeness_core::{
    EuclideanMatcher, SamplePolicy, ServiceOptions, SizeGate, DEFAULT_MAX_FACE_SIZE,
    DEFAULT_MIN_FACE_SIZE, DEFAULT_SAMPLE_QUOTA,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// `sample_policy` as written in config files and the environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicySetting {
    #[default]
    All,
    First,
}

impl PolicySetting {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "first" => Some(Self::First),
            _ => None,
        }
    }
}

impl From<PolicySetting> for SamplePolicy {
    fn from(p: PolicySetting) -> Self {
        match p {
            PolicySetting::All => SamplePolicy::AllSamples,
            PolicySetting::First => SamplePolicy::FirstSampleOnly,
        }
    }
}

/// Runtime configuration: defaults, then an optional TOML file, then
/// `LIKENESS_*` environment variables.
///
/// Defaults are tuned for the bundled ONNX models (unit-length ArcFace
/// embeddings), so the threshold is wider than the 0.6 library default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Smallest accepted face width in pixels.
    pub min_face_size: u32,
    /// Largest accepted face width in pixels.
    pub max_face_size: u32,
    /// Euclidean distance below which a probe matches a stored face.
    pub match_threshold: f32,
    /// Accepted samples needed to finish an enrollment.
    pub sample_quota: usize,
    /// Embedding dimension the store enforces.
    pub embedding_dim: usize,
    pub sample_policy: PolicySetting,
    /// CSV face store.
    pub data_file: PathBuf,
    /// Root of the per-label enrollment image archive.
    pub image_dir: PathBuf,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            min_face_size: DEFAULT_MIN_FACE_SIZE,
            max_face_size: DEFAULT_MAX_FACE_SIZE,
            match_threshold: ARCFACE_MATCH_THRESHOLD,
            sample_quota: DEFAULT_SAMPLE_QUOTA,
            embedding_dim: ARCFACE_EMBEDDING_DIM,
            sample_policy: PolicySetting::All,
            data_file: data_dir.join("face_data.csv"),
            image_dir: data_dir.join("images"),
            model_dir: data_dir.join("models"),
        }
    }
}

impl Config {
    /// Load from the config file (if any) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var("LIKENESS_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(|| Some(config_dir().join("config.toml")).filter(|p| p.exists()));

        let mut config = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    /// Override fields from `LIKENESS_*` variables looked up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        fn parsed<T: std::str::FromStr>(
            var: &impl Fn(&str) -> Option<String>,
            key: &'static str,
            slot: &mut T,
        ) -> Result<(), ConfigError> {
            if let Some(value) = var(key) {
                *slot = value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidEnv {
                        key,
                        value: value.clone(),
                    })?;
            }
            Ok(())
        }

        parsed(&var, "LIKENESS_MIN_FACE_SIZE", &mut self.min_face_size)?;
        parsed(&var, "LIKENESS_MAX_FACE_SIZE", &mut self.max_face_size)?;
        parsed(&var, "LIKENESS_MATCH_THRESHOLD", &mut self.match_threshold)?;
        parsed(&var, "LIKENESS_SAMPLE_QUOTA", &mut self.sample_quota)?;
        parsed(&var, "LIKENESS_EMBEDDING_DIM", &mut self.embedding_dim)?;
        parsed(&var, "LIKENESS_DATA_FILE", &mut self.data_file)?;
        parsed(&var, "LIKENESS_IMAGE_DIR", &mut self.image_dir)?;
        parsed(&var, "LIKENESS_MODEL_DIR", &mut self.model_dir)?;

        if let Some(value) = var("LIKENESS_SAMPLE_POLICY") {
            match PolicySetting::parse(&value) {
                Some(policy) => self.sample_policy = policy,
                None => {
                    return Err(ConfigError::InvalidEnv {
                        key: "LIKENESS_SAMPLE_POLICY",
                        value,
                    })
                }
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_quota == 0 {
            return Err(ConfigError::Invalid("sample_quota must be at least 1".into()));
        }
        if self.embedding_dim == 0 {
            return Err(ConfigError::Invalid("embedding_dim must be at least 1".into()));
        }
        if !(self.match_threshold.is_finite() && self.match_threshold > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "match_threshold must be a positive number, got {}",
                self.match_threshold
            )));
        }
        SizeGate::new(self.min_face_size, self.max_face_size)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    pub fn service_options(&self) -> Result<ServiceOptions, ConfigError> {
        let gate = SizeGate::new(self.min_face_size, self.max_face_size)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(ServiceOptions {
            gate,
            matcher: EuclideanMatcher::new(self.match_threshold),
            policy: self.sample_policy.into(),
        })
    }
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
        .join("likeness")
}

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("likeness")
}

#[cfg(test)]
mod tests {
    use super::*;
    use likeness_core::{Embedding, Matcher};
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.min_face_size, 160);
        assert_eq!(config.max_face_size, 320);
        assert_eq!(config.match_threshold, ARCFACE_MATCH_THRESHOLD);
        assert_eq!(config.sample_quota, 5);
        assert_eq!(config.embedding_dim, 512);
        assert_eq!(config.sample_policy, PolicySetting::All);
        assert!(config.data_file.ends_with("likeness/face_data.csv"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("LIKENESS_MIN_FACE_SIZE", "100"),
                ("LIKENESS_MATCH_THRESHOLD", " 0.45 "),
                ("LIKENESS_SAMPLE_POLICY", "First"),
                ("LIKENESS_DATA_FILE", "/srv/faces.csv"),
            ]))
            .unwrap();
        assert_eq!(config.min_face_size, 100);
        assert!((config.match_threshold - 0.45).abs() < 1e-6);
        assert_eq!(config.sample_policy, PolicySetting::First);
        assert_eq!(config.data_file, PathBuf::from("/srv/faces.csv"));
        assert_eq!(config.max_face_size, 320);
    }

    #[test]
    fn test_bad_env_value_is_an_error() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("LIKENESS_SAMPLE_QUOTA", "five")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { key: "LIKENESS_SAMPLE_QUOTA", .. }));

        let err = config
            .apply_env(env(&[("LIKENESS_SAMPLE_POLICY", "most")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { key: "LIKENESS_SAMPLE_POLICY", .. }));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            Config { sample_quota: 0, ..Config::default() },
            Config { embedding_dim: 0, ..Config::default() },
            Config { match_threshold: 0.0, ..Config::default() },
            Config { match_threshold: f32::NAN, ..Config::default() },
            Config { min_face_size: 400, ..Config::default() },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{config:?} should be invalid");
        }
    }

    #[test]
    fn test_partial_toml_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "max_face_size = 480\nembedding_dim = 128\nsample_policy = \"first\"\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.max_face_size, 480);
        assert_eq!(config.embedding_dim, 128);
        assert_eq!(config.sample_policy, PolicySetting::First);
        assert_eq!(config.min_face_size, 160);
    }

    #[test]
    fn test_default_threshold_matches_arcface_pairs() {
        // Unit vectors with cosine 0.70: a typical same-person ArcFace pair.
        let enrolled = Embedding::new(vec![1.0, 0.0]);
        let probe = Embedding::new(vec![0.7, (1.0f32 - 0.49).sqrt()]);
        let gallery = [("alice", &enrolled)];

        let options = Config::default().service_options().unwrap();
        let result = options.matcher.compare(&probe, gallery);
        assert!(result.matched, "distance {:?}", result.distance);
        assert_eq!(result.label.as_deref(), Some("alice"));

        // The library default stays at 0.6 and would miss this pair.
        assert!(!EuclideanMatcher::default().compare(&probe, gallery).matched);

        // Cosine 0.30 is still a stranger.
        let stranger = Embedding::new(vec![0.3, (1.0f32 - 0.09).sqrt()]);
        assert!(!options.matcher.compare(&stranger, gallery).matched);
    }

    #[test]
    fn test_misspelled_toml_key_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "match_treshold = 0.9\n").unwrap();
        match Config::from_file(&path) {
            Err(ConfigError::Parse { source, .. }) => {
                assert!(source.to_string().contains("match_treshold"), "{source}");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_face_size = \"wide\"\n").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_service_options_mapping() {
        let config = Config {
            sample_policy: PolicySetting::First,
            match_threshold: 0.5,
            ..Config::default()
        };
        let options = config.service_options().unwrap();
        assert_eq!(options.policy, SamplePolicy::FirstSampleOnly);
        assert_eq!(options.matcher.threshold, 0.5);
        assert_eq!(options.gate.min_face_size(), 160);
    }
}

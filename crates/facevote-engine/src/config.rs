use facevote_core::detector::DEFAULT_CONFIDENCE_THRESHOLD;
use facevote_core::{Ballot, NamePolicy, ValidationError, SCRFD_MODEL_FILE};
use facevote_store::LEDGER_FILE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("invalid ballot: {0}")]
    Ballot(#[from] ValidationError),
}

/// Station configuration.
///
/// Resolved in three layers: built-in defaults, then an optional TOML file,
/// then `FACEVOTE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// V4L2 device path.
    pub camera_device: String,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Frames discarded after opening the camera while exposure settles.
    pub warmup_frames: usize,
    /// Directory containing the SCRFD model.
    pub model_dir: PathBuf,
    /// Minimum detector score for a face to count.
    pub detection_confidence: f32,
    /// Holds the enrollment store and the vote ledger.
    pub data_dir: PathBuf,
    /// Side of the square pixel grid a face is resized to.
    pub signature_size: u32,
    /// Neighbor count `k` for identification.
    pub neighbors: usize,
    /// Samples captured per enrollment session.
    pub target_samples: usize,
    /// Capture one sample every `capture_stride` frames with a face.
    pub capture_stride: usize,
    /// Smallest batch persisted when enrollment is cancelled early.
    pub min_samples: usize,
    /// Permit spaces inside names and constituencies.
    pub allow_spaces: bool,
    /// Candidate labels in display order. NOTA is always added last.
    pub ballot: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            frame_width: 640,
            frame_height: 480,
            warmup_frames: 4,
            model_dir: facevote_core::default_model_dir(),
            detection_confidence: DEFAULT_CONFIDENCE_THRESHOLD,
            data_dir: default_data_dir(),
            signature_size: facevote_core::signature::DEFAULT_GRID_SIZE,
            neighbors: facevote_core::classifier::DEFAULT_NEIGHBORS,
            target_samples: 50,
            capture_stride: 2,
            min_samples: facevote_core::classifier::DEFAULT_NEIGHBORS,
            allow_spaces: false,
            ballot: ["BJP", "CONGRESS", "AAP"].map(String::from).to_vec(),
        }
    }
}

impl Config {
    /// Load the configuration.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// read if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = default_config_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
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

    /// Apply `FACEVOTE_*` overrides, reading each variable through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FACEVOTE_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = lookup("FACEVOTE_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEVOTE_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEVOTE_BALLOT") {
            self.ballot = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Some(v) = lookup("FACEVOTE_ALLOW_SPACES") {
            self.allow_spaces = match v.as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => return Err(invalid("FACEVOTE_ALLOW_SPACES", v)),
            };
        }

        env_parse(&lookup, "FACEVOTE_FRAME_WIDTH", &mut self.frame_width)?;
        env_parse(&lookup, "FACEVOTE_FRAME_HEIGHT", &mut self.frame_height)?;
        env_parse(&lookup, "FACEVOTE_WARMUP_FRAMES", &mut self.warmup_frames)?;
        env_parse(&lookup, "FACEVOTE_DETECTION_CONFIDENCE", &mut self.detection_confidence)?;
        env_parse(&lookup, "FACEVOTE_SIGNATURE_SIZE", &mut self.signature_size)?;
        env_parse(&lookup, "FACEVOTE_NEIGHBORS", &mut self.neighbors)?;
        env_parse(&lookup, "FACEVOTE_TARGET_SAMPLES", &mut self.target_samples)?;
        env_parse(&lookup, "FACEVOTE_CAPTURE_STRIDE", &mut self.capture_stride)?;
        env_parse(&lookup, "FACEVOTE_MIN_SAMPLES", &mut self.min_samples)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(ConfigError::Invalid("frame size must be non-zero".into()));
        }
        if !(self.detection_confidence > 0.0 && self.detection_confidence < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "detection_confidence must be in (0, 1), got {}",
                self.detection_confidence
            )));
        }
        if self.signature_size == 0 {
            return Err(ConfigError::Invalid("signature_size must be at least 1".into()));
        }
        if self.neighbors == 0 {
            return Err(ConfigError::Invalid("neighbors must be at least 1".into()));
        }
        if self.capture_stride == 0 {
            return Err(ConfigError::Invalid("capture_stride must be at least 1".into()));
        }
        if self.min_samples < self.neighbors {
            return Err(ConfigError::Invalid(format!(
                "min_samples ({}) must be at least neighbors ({})",
                self.min_samples, self.neighbors
            )));
        }
        if self.target_samples < self.min_samples {
            return Err(ConfigError::Invalid(format!(
                "target_samples ({}) must be at least min_samples ({})",
                self.target_samples, self.min_samples
            )));
        }
        self.parsed_ballot()?;
        Ok(())
    }

    pub fn parsed_ballot(&self) -> Result<Ballot, ConfigError> {
        Ok(Ballot::new(&self.ballot)?)
    }

    pub fn name_policy(&self) -> NamePolicy {
        if self.allow_spaces {
            NamePolicy::AllowSpaces
        } else {
            NamePolicy::Strict
        }
    }

    pub fn enrollment_dir(&self) -> PathBuf {
        self.data_dir.join("enrollment")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(LEDGER_FILE)
    }

    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join(SCRFD_MODEL_FILE)
    }
}

fn invalid(key: &'static str, value: String) -> ConfigError {
    ConfigError::InvalidValue { key, value }
}

fn env_parse<F, T>(lookup: &F, key: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        *slot = raw.trim().parse().map_err(|_| invalid(key, raw))?;
    }
    Ok(())
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
        .join("facevote")
}

pub fn default_config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("facevote/config.toml")
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.neighbors, 5);
        assert_eq!(config.target_samples, 50);
        assert_eq!(config.capture_stride, 2);
        assert_eq!(config.detection_confidence, DEFAULT_CONFIDENCE_THRESHOLD);
        assert_eq!(config.parsed_ballot().unwrap().len(), 4);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "camera_device = \"/dev/video4\"\nneighbors = 3\nmin_samples = 3\nballot = [\"RED\", \"BLUE\"]\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.camera_device, "/dev/video4");
        assert_eq!(config.neighbors, 3);
        assert_eq!(config.target_samples, 50);
        assert_eq!(config.ballot, vec!["RED", "BLUE"]);
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "similarity_threshold = 0.4\n").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup_from(&[
                ("FACEVOTE_DATA_DIR", "/srv/facevote"),
                ("FACEVOTE_NEIGHBORS", "7"),
                ("FACEVOTE_MIN_SAMPLES", "7"),
                ("FACEVOTE_ALLOW_SPACES", "1"),
                ("FACEVOTE_BALLOT", "RED, BLUE"),
                ("FACEVOTE_DETECTION_CONFIDENCE", "0.6"),
            ]))
            .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/srv/facevote"));
        assert_eq!(config.ledger_path(), PathBuf::from("/srv/facevote/votes.csv"));
        assert_eq!(config.neighbors, 7);
        assert_eq!(config.name_policy(), NamePolicy::AllowSpaces);
        assert_eq!(config.ballot, vec!["RED", "BLUE"]);
        assert!((config.detection_confidence - 0.6).abs() < 1e-6);
        config.validate().unwrap();
    }

    #[test]
    fn test_unparseable_env_value_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(lookup_from(&[("FACEVOTE_NEIGHBORS", "five")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "FACEVOTE_NEIGHBORS", .. }));
    }

    #[test]
    fn test_validation_rules() {
        let mut config = Config {
            min_samples: 3,
            ..Config::default()
        };
        assert!(config.validate().is_err(), "min_samples below k");

        config.min_samples = 60;
        assert!(config.validate().is_err(), "target below min_samples");

        config = Config {
            capture_stride: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        config = Config {
            ballot: vec!["AAP".into(), "nota".into()],
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Ballot(_))));
    }
}

use serde::{Deserialize, Serialize};

/// Interpreter tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Call-frame depth at which a call raises `Stack overflow`.
    pub max_frames: usize,
    /// Bytes allocated before the first collection.
    pub gc_initial_threshold: usize,
    /// After a cycle the next threshold is live bytes times this factor.
    pub gc_grow_factor: f64,
    /// Collect before every allocation. Slow; flushes out rooting bugs.
    pub gc_stress: bool,
    /// Install the prelude globals and the built-in method tables.
    pub stdlib: bool,
    /// Write uncaught runtime errors to stderr.
    pub print_errors: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_frames: 64,
            gc_initial_threshold: 1024 * 1024,
            gc_grow_factor: 2.0,
            gc_stress: false,
            stdlib: true,
            print_errors: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

impl Config {
    pub fn from_json(text: &str) -> Result<Config, ConfigError> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frames == 0 {
            return Err(ConfigError::Invalid("max_frames must be at least 1"));
        }
        if !(self.gc_grow_factor >= 1.0) {
            return Err(ConfigError::Invalid("gc_grow_factor must be >= 1.0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.max_frames, 64);
        assert_eq!(c.gc_initial_threshold, 1 << 20);
        assert_eq!(c.gc_grow_factor, 2.0);
        assert!(c.stdlib);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = Config::from_json(r#"{"max_frames": 16, "gc_stress": true}"#).unwrap();
        assert_eq!(c.max_frames, 16);
        assert!(c.gc_stress);
        assert_eq!(c.gc_grow_factor, 2.0);
    }

    #[test]
    fn rejects_unknown_fields_and_bad_values() {
        assert!(Config::from_json(r#"{"frames": 1}"#).is_err());
        assert!(Config::from_json(r#"{"max_frames": 0}"#).is_err());
        assert!(Config::from_json(r#"{"gc_grow_factor": 0.5}"#).is_err());
        assert!(Config::from_json("not json").is_err());
    }
}

use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::{component::DEFAULT_COMPONENT_COUNT, Error, InternalResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_component_count")]
    pub component_count: usize,

    /// Replay the whole program each time it completes.
    #[serde(default, rename = "loop")]
    pub loop_program: bool,

    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,

    /// Upper bound for a single `subiri`; unbounded when absent.
    #[serde(
        default,
        with = "duration_ms_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_wait: Option<Duration>,

    #[serde(default = "default_max_expanded_lines")]
    pub max_expanded_lines: usize,

    #[serde(default = "default_true")]
    pub timestamps: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            component_count: default_component_count(),
            loop_program: false,
            event_buffer_size: default_event_buffer_size(),
            max_wait: None,
            max_expanded_lines: default_max_expanded_lines(),
            timestamps: default_true(),
        }
    }
}

impl ExecutorConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> InternalResult<Self> {
        from_file(path)
    }

    pub fn from_str(s: &str) -> InternalResult<Self> {
        from_str(s)
    }

    /// Overwrites the fields present in `update`.
    pub fn apply(&mut self, update: &ConfigUpdate) {
        if let Some(count) = update.component_count {
            self.component_count = count;
        }
        if let Some(loop_program) = update.loop_program {
            self.loop_program = loop_program;
        }
    }
}

/// Partial configuration change accepted while an executor is live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub component_count: Option<usize>,
    #[serde(default, rename = "loop")]
    pub loop_program: Option<bool>,
}

impl ConfigUpdate {
    pub fn component_count(count: usize) -> Self {
        Self {
            component_count: Some(count),
            ..Default::default()
        }
    }

    pub fn loop_program(loop_program: bool) -> Self {
        Self {
            loop_program: Some(loop_program),
            ..Default::default()
        }
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> InternalResult<T> {
    let file = File::open(path)
        .map_err(|e| Error::Internal(format!("Failed to open config file: {}", e)))?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| Error::Internal(format!("Failed to parse config file: {}", e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> InternalResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| Error::Internal(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

fn default_component_count() -> usize {
    DEFAULT_COMPONENT_COUNT
}
fn default_event_buffer_size() -> usize {
    1024
}
fn default_max_expanded_lines() -> usize {
    crate::preprocessor::DEFAULT_MAX_EXPANDED_LINES
}
fn default_true() -> bool {
    true
}

mod duration_ms_option {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => serializer.serialize_u64(duration.as_millis() as u64),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_object() {
        let config = ExecutorConfig::from_str("{}").unwrap();
        assert_eq!(config, ExecutorConfig::default());
        assert_eq!(config.component_count, 20);
        assert!(!config.loop_program);
        assert_eq!(config.event_buffer_size, 1024);
        assert_eq!(config.max_wait, None);
        assert!(config.timestamps);
    }

    #[test]
    fn test_parse_all_keys() {
        let json = r#"{
            "component_count": 8,
            "loop": true,
            "event_buffer_size": 16,
            "max_wait": 2500,
            "max_expanded_lines": 500,
            "timestamps": false
        }"#;
        let config = ExecutorConfig::from_str(json).unwrap();
        assert_eq!(
            config,
            ExecutorConfig {
                component_count: 8,
                loop_program: true,
                event_buffer_size: 16,
                max_wait: Some(Duration::from_millis(2500)),
                max_expanded_lines: 500,
                timestamps: false,
            }
        );
    }

    #[test]
    fn test_json_round_trip() {
        let config = ExecutorConfig {
            max_wait: Some(Duration::from_secs(3)),
            loop_program: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"loop\":true"));
        assert!(json.contains("\"max_wait\":3000"));
        assert_eq!(ExecutorConfig::from_str(&json).unwrap(), config);
    }

    #[test]
    fn test_apply_update() {
        let mut config = ExecutorConfig::default();
        config.apply(&ConfigUpdate::component_count(5));
        assert_eq!(config.component_count, 5);
        assert!(!config.loop_program);

        config.apply(&ConfigUpdate::loop_program(true));
        assert_eq!(config.component_count, 5);
        assert!(config.loop_program);
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("umeme-config-{}.json", std::process::id()));
        let mut file = File::create(&path).unwrap();
        write!(file, r#"{{"component_count": 3}}"#).unwrap();

        let config = ExecutorConfig::from_file(&path).unwrap();
        assert_eq!(config.component_count, 3);
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            ExecutorConfig::from_file(&path),
            Err(Error::Internal(_))
        ));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            ExecutorConfig::from_str("{\"component_count\": \"many\"}"),
            Err(Error::Internal(_))
        ));
    }
}

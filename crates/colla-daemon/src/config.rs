//! Configuration file management.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use colla_types::Address;

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Reward epoch schedule.
    #[serde(default)]
    pub epochs: EpochConfig,
    /// Role assignments.
    #[serde(default)]
    pub roles: RolesConfig,
    /// Proof-verified feed ingestion.
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Advanced settings.
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

/// Epoch schedule: epoch `e` spans
/// `[genesis + e * duration, genesis + (e + 1) * duration)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochConfig {
    #[serde(default)]
    pub genesis_timestamp: u64,
    #[serde(default = "default_epoch_duration")]
    pub epoch_duration_secs: u64,
}

/// Role assignments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RolesConfig {
    /// May set any validator's distribution config.
    #[serde(default)]
    pub admins: BTreeSet<Address>,
    /// May settle non-target rewards for any validator.
    #[serde(default)]
    pub operators: BTreeSet<Address>,
    /// May submit feeds and state roots.
    #[serde(default)]
    pub feeders: BTreeSet<Address>,
    /// Operator-of-record per validator.
    #[serde(default)]
    pub validator_operators: BTreeMap<Address, Address>,
}

/// Feed ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Hex-encoded 32-byte program key. Empty = all zeroes.
    #[serde(default)]
    pub program_key: String,
    /// Seconds after a target during which its state root may be fetched.
    #[serde(default = "default_state_root_grace")]
    pub state_root_grace_secs: u64,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// "error" | "warn" | "info" | "debug" | "trace".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_epoch_duration() -> u64 {
    86_400
}

fn default_state_root_grace() -> u64 {
    3_600
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self {
            genesis_timestamp: 0,
            epoch_duration_secs: default_epoch_duration(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            program_key: String::new(),
            state_root_grace_secs: default_state_root_grace(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl IngestConfig {
    /// Decode the configured program key.
    pub fn program_key(&self) -> anyhow::Result<[u8; 32]> {
        let mut key = [0u8; 32];
        let text = self.program_key.trim_start_matches("0x");
        if !text.is_empty() {
            hex::decode_to_slice(text, &mut key)
                .map_err(|e| anyhow::anyhow!("invalid ingest.program_key: {e}"))?;
        }
        Ok(key)
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: DaemonConfig = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject settings the daemon cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.epochs.epoch_duration_secs == 0 {
            anyhow::bail!("epochs.epoch_duration_secs must be positive");
        }
        self.ingest.program_key()?;
        Ok(())
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("COLLA_DATA_DIR") {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/Colla")
        }
        #[cfg(not(target_os = "macos"))]
        {
            dirs_fallback(".colla")
        }
    }
}

/// Fallback home directory resolution.
fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/colla"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.epochs.epoch_duration_secs, 86_400);
        assert_eq!(config.ingest.state_root_grace_secs, 3_600);
        assert_eq!(config.advanced.log_level, "info");
        assert!(config.roles.admins.is_empty());
        assert_eq!(config.ingest.program_key().expect("key"), [0u8; 32]);
    }

    #[test]
    fn test_config_serialization() {
        let config = DaemonConfig::default();
        let toml_str = toml::to_string(&config).expect("serialize");
        let _parsed: DaemonConfig = toml::from_str(&toml_str).expect("parse");
    }

    #[test]
    fn test_parse_roles_and_epochs() {
        let admin = Address::repeat_byte(0x11);
        let validator = Address::repeat_byte(0x22);
        let operator = Address::repeat_byte(0x33);
        let toml_str = format!(
            r#"
            [epochs]
            genesis_timestamp = 1700000000
            epoch_duration_secs = 3600

            [roles]
            admins = ["{admin}"]
            feeders = ["{admin}"]

            [roles.validator_operators]
            "{validator}" = "{operator}"

            [ingest]
            program_key = "{key}"
            "#,
            key = "ab".repeat(32),
        );
        let config: DaemonConfig = toml::from_str(&toml_str).expect("parse");
        assert_eq!(config.epochs.genesis_timestamp, 1_700_000_000);
        assert_eq!(config.epochs.epoch_duration_secs, 3_600);
        assert!(config.roles.admins.contains(&admin));
        assert_eq!(config.roles.validator_operators.get(&validator), Some(&operator));
        assert_eq!(config.ingest.program_key().expect("key"), [0xab; 32]);
        assert_eq!(config.ingest.state_root_grace_secs, 3_600);
    }

    #[test]
    fn test_zero_epoch_duration_rejected() {
        let config: DaemonConfig = toml::from_str(
            r#"
            [epochs]
            epoch_duration_secs = 0
            "#,
        )
        .expect("parse");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("epoch_duration_secs"));
        assert!(DaemonConfig::default().validate().is_ok());
    }

    #[test]
    fn test_bad_program_key_rejected() {
        let config = IngestConfig {
            program_key: "zz".to_string(),
            state_root_grace_secs: 1,
        };
        assert!(config.program_key().is_err());
    }
}

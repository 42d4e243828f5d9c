use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Directory where VMware Fusion's DHCP daemons keep their lease files.
pub const VMWARE_LEASES_DIR: &str = "/var/db/vmware";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Virtual network name, e.g. `vmnet1` (host-only) or `vmnet8` (NAT).
    pub network: String,
    pub leases_dir: PathBuf,
    /// Explicit lease file. Overrides `network` and `leases_dir` when set.
    #[serde(default)]
    pub leases_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: "vmnet8".to_string(),
            leases_dir: PathBuf::from(VMWARE_LEASES_DIR),
            leases_file: None,
        }
    }
}

impl Config {
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(leases_file) = &self.leases_file {
            if leases_file.as_os_str().is_empty() {
                return Err(Error::Configuration(
                    "leases_file must not be empty".to_string(),
                ));
            }
            return Ok(());
        }

        if self.network.is_empty() {
            return Err(Error::Configuration(
                "network must not be empty".to_string(),
            ));
        }

        if !self
            .network
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_')
        {
            return Err(Error::Configuration(format!(
                "network name '{}' contains invalid characters",
                self.network
            )));
        }

        Ok(())
    }

    /// Path of the lease file to read.
    ///
    /// Without an explicit `leases_file` this is the file VMware's DHCP
    /// daemon writes for `network`: `<leases_dir>/vmnet-dhcpd-<network>.leases`.
    pub fn leases_path(&self) -> PathBuf {
        match &self.leases_file {
            Some(leases_file) => leases_file.clone(),
            None => self
                .leases_dir
                .join(format!("vmnet-dhcpd-{}.leases", self.network)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestGuard(PathBuf);
    impl Drop for TestGuard {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_leases_path() {
        let config = Config::default();
        assert_eq!(
            config.leases_path(),
            PathBuf::from("/var/db/vmware/vmnet-dhcpd-vmnet8.leases")
        );
    }

    #[test]
    fn test_network_leases_path() {
        let config = Config {
            network: "vmnet1".to_string(),
            leases_dir: PathBuf::from("/tmp/leases"),
            ..Default::default()
        };
        assert_eq!(
            config.leases_path(),
            PathBuf::from("/tmp/leases/vmnet-dhcpd-vmnet1.leases")
        );
    }

    #[test]
    fn test_explicit_leases_file_wins() {
        let config = Config {
            leases_file: Some(PathBuf::from("/var/lib/dhcp/dhcpd.leases")),
            ..Default::default()
        };
        assert_eq!(
            config.leases_path(),
            PathBuf::from("/var/lib/dhcp/dhcpd.leases")
        );
    }

    #[test]
    fn test_empty_network() {
        let config = Config {
            network: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_network_with_path_separator() {
        let config = Config {
            network: "../etc".to_string(),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_empty_leases_file() {
        let config = Config {
            leases_file: Some(PathBuf::new()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let path = std::env::temp_dir().join(format!(
            "test_dhcpd_config_{}.json",
            std::process::id()
        ));
        let _guard = TestGuard(path.clone());

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        let loaded = Config::load_or_create(&path).unwrap();
        assert_eq!(created.leases_path(), loaded.leases_path());
    }

    #[test]
    fn test_leases_file_defaults_to_none() {
        let config: Config =
            serde_json::from_str(r#"{"network": "vmnet1", "leases_dir": "/x"}"#).unwrap();
        assert!(config.leases_file.is_none());
        assert_eq!(config.leases_path(), PathBuf::from("/x/vmnet-dhcpd-vmnet1.leases"));
    }
}

use std::{env, fs, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::prelude::*;

pub const DEFAULT_PROCESS_NAME: &str = "dotnet.exe";

/// Persistent configuration for pooldump.
///
/// Stored in the filesystem following the XDG Base Directory Specification,
/// typically at `~/.config/pooldump/config.yaml`. Carries the ProcDump
/// location and the executable names that may host an IIS-deployed
/// application.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PooldumpConfig {
    pub procdump: ProcDumpConfig,
    /// Executable names to scan for, e.g. `dotnet.exe` or a self-contained
    /// application's own executable name.
    pub process_names: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProcDumpConfig {
    /// Full path to ProcDump.exe. `~` is expanded on use.
    pub path: Option<String>,
}

impl Default for PooldumpConfig {
    fn default() -> Self {
        Self {
            procdump: ProcDumpConfig::default(),
            process_names: vec![DEFAULT_PROCESS_NAME.to_string()],
        }
    }
}

/// Get the path to the configuration file, following the XDG Base Directory
/// Specification.
///
/// If config_name is None, returns ~/.config/pooldump/config.yaml (default)
/// If config_name is Some, returns ~/.config/pooldump/{config_name}.yaml
fn get_configuration_file_path(config_name: Option<&str>) -> PathBuf {
    let config_dir = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = env::var("HOME")
                .or_else(|_| env::var("USERPROFILE"))
                .expect("Neither HOME nor USERPROFILE is set");
            PathBuf::from(home).join(".config")
        });
    let config_dir = config_dir.join("pooldump");

    match config_name {
        Some(name) => config_dir.join(format!("{name}.yaml")),
        None => config_dir.join("config.yaml"),
    }
}

impl PooldumpConfig {
    /// Load the configuration. If it does not exist, return a default
    /// configuration.
    ///
    /// If procdump_path_override is provided, the path from the loaded
    /// configuration is ignored and the override is used instead.
    pub fn load_with_override(
        config_name: Option<&str>,
        procdump_path_override: Option<&str>,
    ) -> Result<Self> {
        let config_path = get_configuration_file_path(config_name);

        let mut config = match fs::read(&config_path) {
            Ok(config_str) => {
                let config: PooldumpConfig = serde_yaml::from_slice(&config_str).context(
                    format!("Failed to parse config at {}", config_path.display()),
                )?;
                debug!("Config loaded from {}", config_path.display());
                config
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Config file not found at {}", config_path.display());
                PooldumpConfig::default()
            }
            Err(e) => bail!("Failed to load config: {e}"),
        };

        if let Some(procdump_path) = procdump_path_override {
            config.procdump.path = Some(procdump_path.to_owned());
        }

        if config.process_names.is_empty() {
            warn!("No process names configured; only {DEFAULT_PROCESS_NAME} will be checked");
            config.process_names = vec![DEFAULT_PROCESS_NAME.to_string()];
        }

        Ok(config)
    }

    /// Persist changes to the configuration.
    pub fn persist(&self, config_name: Option<&str>) -> Result<()> {
        let config_path = get_configuration_file_path(config_name);
        fs::create_dir_all(config_path.parent().unwrap())?;

        let config_str = serde_yaml::to_string(self)?;
        fs::write(&config_path, config_str)?;
        debug!("Config written to {}", config_path.display());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_the_default_config() {
        let tmp_dir = tempfile::tempdir().unwrap();
        temp_env::with_var("XDG_CONFIG_HOME", Some(tmp_dir.path()), || {
            let config = PooldumpConfig::load_with_override(None, None).unwrap();
            assert_eq!(config.procdump.path, None);
            assert_eq!(config.process_names, vec![DEFAULT_PROCESS_NAME]);
        });
    }

    #[test]
    fn persist_then_load_round_trips() {
        let tmp_dir = tempfile::tempdir().unwrap();
        temp_env::with_var("XDG_CONFIG_HOME", Some(tmp_dir.path()), || {
            let config = PooldumpConfig {
                procdump: ProcDumpConfig {
                    path: Some("C:\\Tools\\procdump.exe".to_string()),
                },
                process_names: vec!["dotnet.exe".to_string(), "MyApp.exe".to_string()],
            };
            config.persist(Some("test")).unwrap();

            let loaded = PooldumpConfig::load_with_override(Some("test"), None).unwrap();
            assert_eq!(
                loaded.procdump.path.as_deref(),
                Some("C:\\Tools\\procdump.exe")
            );
            assert_eq!(loaded.process_names, vec!["dotnet.exe", "MyApp.exe"]);
        });
    }

    #[test]
    fn the_cli_override_wins_over_the_file() {
        let tmp_dir = tempfile::tempdir().unwrap();
        temp_env::with_var("XDG_CONFIG_HOME", Some(tmp_dir.path()), || {
            let config = PooldumpConfig {
                procdump: ProcDumpConfig {
                    path: Some("C:\\old\\procdump.exe".to_string()),
                },
                ..Default::default()
            };
            config.persist(None).unwrap();

            let loaded =
                PooldumpConfig::load_with_override(None, Some("C:\\new\\procdump.exe")).unwrap();
            assert_eq!(
                loaded.procdump.path.as_deref(),
                Some("C:\\new\\procdump.exe")
            );
        });
    }

    #[test]
    fn an_emptied_process_name_list_falls_back_to_dotnet() {
        let tmp_dir = tempfile::tempdir().unwrap();
        temp_env::with_var("XDG_CONFIG_HOME", Some(tmp_dir.path()), || {
            let config = PooldumpConfig {
                process_names: vec![],
                ..Default::default()
            };
            config.persist(None).unwrap();

            let loaded = PooldumpConfig::load_with_override(None, None).unwrap();
            assert_eq!(loaded.process_names, vec![DEFAULT_PROCESS_NAME]);
        });
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::env;
use std::path;
use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use clap::ArgMatches;
use clap::Command;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;
use tokio::fs;

static CONFIG: Lazy<DashMap<String, String>> = Lazy::new(DashMap::new);

#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ConfigKey {
    #[strum(serialize = "api-url")]
    ApiURL,
    ConfigFile,
    PollInterval,
    ProjectRefreshInterval,
    RequestTimeout,
    SessionFile,
    SupabaseAnonKey,
    #[strum(serialize = "supabase-url")]
    SupabaseURL,
    WatchInterval,
    #[strum(serialize = "webhook-url")]
    WebhookURL,
}

impl ConfigKey {
    /// Keys holding a duration in milliseconds.
    pub fn is_interval(&self) -> bool {
        return matches!(
            self,
            ConfigKey::PollInterval
                | ConfigKey::ProjectRefreshInterval
                | ConfigKey::RequestTimeout
                | ConfigKey::WatchInterval
        );
    }
}

pub struct Config {}

impl Config {
    pub fn get(key: ConfigKey) -> String {
        if let Some(val) = CONFIG.get(&key.to_string()) {
            return val.to_string();
        }

        return "".to_string();
    }

    pub fn set(key: ConfigKey, value: &str) {
        CONFIG.insert(key.to_string(), value.to_string());
    }

    pub fn get_duration(key: ConfigKey) -> Result<Duration> {
        if !key.is_interval() {
            bail!(format!("Config key '{key}' is not an interval"));
        }

        let raw = Config::get(key);
        let millis = match raw.parse::<u64>() {
            Ok(millis) => millis,
            Err(_) => bail!(format!(
                "Config key '{key}' must be a number of milliseconds, got '{raw}'"
            )),
        };
        if millis == 0 {
            bail!(format!("Config key '{key}' must be greater than zero"));
        }

        return Ok(Duration::from_millis(millis));
    }

    /// Base URL used to build webhook addresses. Falls back to the API URL
    /// when no public tunnel address is configured.
    pub fn webhook_base() -> String {
        let webhook_url = Config::get(ConfigKey::WebhookURL);
        if webhook_url.is_empty() {
            return Config::get(ConfigKey::ApiURL);
        }

        return webhook_url;
    }

    /// Where the JSON debug log goes when `RUST_LOG` enables it.
    pub fn log_dir() -> path::PathBuf {
        if let Ok(dir) = env::var("LUMIS_LOG_DIR") {
            return path::PathBuf::from(dir);
        }

        return dirs::cache_dir()
            .unwrap_or_else(env::temp_dir)
            .join("lumis");
    }

    fn data_dir() -> path::PathBuf {
        #[cfg(not(target_os = "macos"))]
        let dir = dirs::cache_dir()
            .unwrap_or_else(env::temp_dir)
            .join("lumis");
        #[cfg(target_os = "macos")]
        let dir = dirs::home_dir()
            .unwrap_or_else(env::temp_dir)
            .join(".config/lumis");

        return dir;
    }

    pub fn default(key: ConfigKey) -> String {
        let data_dir = Config::data_dir();

        let res = match key {
            ConfigKey::ApiURL => "http://localhost:5000".to_string(),
            ConfigKey::PollInterval => "2000".to_string(),
            ConfigKey::ProjectRefreshInterval => "12000".to_string(),
            ConfigKey::RequestTimeout => "30000".to_string(),
            ConfigKey::SupabaseAnonKey => "".to_string(),
            ConfigKey::SupabaseURL => "".to_string(),
            ConfigKey::WatchInterval => "3000".to_string(),
            ConfigKey::WebhookURL => "".to_string(),

            // Special
            ConfigKey::ConfigFile => data_dir.join("config.toml").to_string_lossy().to_string(),
            ConfigKey::SessionFile => data_dir.join("session.json").to_string_lossy().to_string(),
        };

        return res;
    }

    pub async fn load(clap_arg_matches: Vec<&ArgMatches>) -> Result<()> {
        for key in ConfigKey::iter() {
            Config::set(key, &Config::default(key))
        }

        let mut config_file = Config::default(ConfigKey::ConfigFile);
        for matches in clap_arg_matches.as_slice() {
            if let Ok(Some(arg_config_file)) =
                matches.try_get_one::<String>(&ConfigKey::ConfigFile.to_string())
            {
                config_file = arg_config_file.to_string();
            }
        }

        let config_path = path::PathBuf::from(config_file);
        if config_path.exists() {
            let toml_str = fs::read_to_string(config_path).await?;
            Config::load_toml(&toml_str)?;
        }

        for key in ConfigKey::iter() {
            for matches in clap_arg_matches.as_slice() {
                if let Ok(Some(val)) = matches.try_get_one::<String>(&key.to_string()) {
                    if val.is_empty() {
                        continue;
                    }
                    Config::set(key, val)
                }
            }
        }

        for key in ConfigKey::iter().filter(|key| return key.is_interval()) {
            Config::get_duration(key)?;
        }

        // The anon key is a credential, keep it out of the debug log.
        tracing::debug!(
            api_url = Config::get(ConfigKey::ApiURL),
            supabase_url = Config::get(ConfigKey::SupabaseURL),
            webhook_url = Config::webhook_base(),
            poll_interval = Config::get(ConfigKey::PollInterval),
            watch_interval = Config::get(ConfigKey::WatchInterval),
            project_refresh_interval = Config::get(ConfigKey::ProjectRefreshInterval),
            session_file = Config::get(ConfigKey::SessionFile),
            "config"
        );

        return Ok(());
    }

    fn load_toml(toml_str: &str) -> Result<()> {
        let doc = toml_str.parse::<toml_edit::Document>()?;

        for key in ConfigKey::iter() {
            if let Some(val) = doc.get(&key.to_string()) {
                if let Some(val_int) = val.as_integer() {
                    if !key.is_interval() {
                        bail!(format!(
                            "config.toml has an invalid value for key '{key}': expected a string"
                        ));
                    }
                    Config::set(key, &val_int.to_string());
                } else if let Some(val_str) = val.as_str() {
                    if val_str.is_empty() {
                        continue;
                    }
                    Config::set(key, val_str);
                } else {
                    bail!(format!(
                        "config.toml has an invalid value for key '{key}': {val}"
                    ));
                }
            }
        }

        return Ok(());
    }

    pub fn serialize_default(cmd: Command) -> String {
        let toml_str = ConfigKey::iter()
            .filter_map(|key| {
                if key == ConfigKey::ConfigFile {
                    return None;
                }

                let arg = cmd
                    .get_arguments()
                    .find(|e| return e.get_long() == Some(key.to_string().as_str()))?;

                let description = arg
                    .get_help()
                    .map(|help| return help.to_string())
                    .unwrap_or_default()
                    .split("[default:")
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();

                let mut val = Config::default(key);
                if val.is_empty() {
                    val = format!("# {key} = \"\"");
                } else if key.is_interval() {
                    val = format!("{key} = {val}");
                } else {
                    val = format!("{key} = \"{val}\"");
                }

                return Some(format!("# {description}\n{val}"));
            })
            .collect::<Vec<String>>()
            .join("\n\n");

        return toml_str;
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::env;
use std::path;

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
    ApiURL,
    ConfigFile,
    ConnectTimeout,
    CredentialsFile,
    DocumentViewerURL,
    PollInterval,
    WsURL,
}

pub struct Config {}

fn app_dir(base: Option<path::PathBuf>) -> path::PathBuf {
    return base.unwrap_or_else(env::temp_dir).join("quill");
}

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

    pub fn default(key: ConfigKey) -> String {
        let config_path = app_dir(dirs::config_dir()).join("config.toml");
        let credentials_path = app_dir(dirs::data_dir()).join("credentials.json");

        let res = match key {
            ConfigKey::ApiURL => "http://localhost:8000".to_string(),
            ConfigKey::ConnectTimeout => "10000".to_string(),
            ConfigKey::DocumentViewerURL => "https://docs.google.com/viewer".to_string(),
            ConfigKey::PollInterval => "5000".to_string(),
            ConfigKey::WsURL => "".to_string(),

            // Special
            ConfigKey::ConfigFile => config_path.to_string_lossy().to_string(),
            ConfigKey::CredentialsFile => credentials_path.to_string_lossy().to_string(),
        };

        return res;
    }

    pub fn log_dir() -> path::PathBuf {
        if let Ok(dir) = env::var("QUILL_LOG_DIR") {
            return path::PathBuf::from(dir);
        }

        return app_dir(dirs::cache_dir());
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
            let toml_str = fs::read_to_string(&config_path).await?;
            let doc = toml_str.parse::<toml_edit::Document>()?;

            for key in ConfigKey::iter() {
                if key == ConfigKey::ConfigFile {
                    continue;
                }

                if let Some(val) = doc.get(&key.to_string()) {
                    let is_numeric = Config::default(key).parse::<u64>().is_ok();
                    if let Some(val_int) = val.as_integer() {
                        if val_int < 0 {
                            bail!(format!(
                                "config.toml has an invalid value for key '{key}': {val_int}"
                            ));
                        }
                        Config::set(key, &val_int.to_string());
                    } else if let Some(val_str) = val.as_str() {
                        if val_str.is_empty() {
                            continue;
                        }
                        if is_numeric && val_str.parse::<u64>().is_err() {
                            bail!(format!("config.toml has an invalid value for key '{key}': {val_str}\nExpected a number of milliseconds"));
                        }
                        Config::set(key, val_str);
                    } else {
                        bail!(format!(
                            "config.toml has an invalid value for key '{key}'"
                        ));
                    }
                }
            }
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

        // Numeric keys are periods in milliseconds and must be at least 1.
        for key in [ConfigKey::PollInterval, ConfigKey::ConnectTimeout] {
            let val = Config::get(key);
            match val.parse::<u64>() {
                Ok(millis) if millis > 0 => {}
                _ => bail!(format!(
                    "Invalid value for '{key}': {val}\nExpected a positive number of milliseconds"
                )),
            }
        }

        tracing::debug!(
            api_url = %Config::get(ConfigKey::ApiURL),
            ws_url = %Config::get(ConfigKey::WsURL),
            credentials_file = %Config::get(ConfigKey::CredentialsFile),
            poll_interval = %Config::get(ConfigKey::PollInterval),
            "config"
        );

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

                let mut description = arg
                    .get_help()
                    .map(|help| return help.to_string())
                    .unwrap_or_default();

                description = description
                    .split("[default:")
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();

                let mut val = Config::default(key);
                if val.is_empty() {
                    val = format!("# {key} = \"\"");
                } else if val.parse::<u64>().is_ok() {
                    val = format!("{key} = {val}");
                } else {
                    val = format!("{key} = \"{}\"", val.replace('\\', "\\\\"));
                }

                return Some(format!("# {description}\n{val}"));
            })
            .collect::<Vec<String>>()
            .join("\n\n");

        return toml_str;
    }
}

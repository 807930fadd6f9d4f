use crate::error::ConfigError;
use crate::logging::{LogLevel, LogTarget};
use clap::Parser;
use serde_derive::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MODULE: &str = "wallbox";

const DEFAULT_DATA_COLLECTION_INTERVAL: u64 = 60;
const DEFAULT_BACKUP_INTERVAL: u64 = 60;
const DEFAULT_PORT: u16 = 4000;

/// Command line flags. Debug flags override the config file when set.
#[derive(Debug, Parser)]
#[command(version, about = "Tracks the charging runtime of a wallbox from a meter gateway")]
pub struct Cli {
    /// Config file
    #[arg(long, default_value_t = default_config_file())]
    pub config: String,

    /// Log target: stderr, stdout or a file path
    #[arg(long, alias = "debugFile")]
    pub debug_file: Option<String>,

    /// Log verbosity: standard, debug or trace
    #[arg(long, alias = "debugFlag")]
    pub debug_flag: Option<String>,
}

fn default_config_file() -> String {
    format!("/opt/womat/conf/{MODULE}.yaml")
}

fn default_data_file() -> String {
    format!("/opt/womat/data/{MODULE}.yaml")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct YamlDebug {
    file: String,
    flag: String,
}

impl Default for YamlDebug {
    fn default() -> Self {
        Self {
            file: "stderr".into(),
            flag: "standard".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct YamlWebserver {
    port: u16,
    webservices: HashMap<String, bool>,
}

impl Default for YamlWebserver {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            webservices: HashMap::from([
                ("version".to_string(), false),
                ("currentdata".to_string(), false),
            ]),
        }
    }
}

/// Layout of the config file. Intervals are in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct YamlConfig {
    datacollectioninterval: u64,
    #[serde(alias = "backupinterval")]
    backupintervall: u64,
    datafile: String,
    debug: YamlDebug,
    webserver: YamlWebserver,
    meterurl: String,
}

impl Default for YamlConfig {
    fn default() -> Self {
        Self {
            datacollectioninterval: DEFAULT_DATA_COLLECTION_INTERVAL,
            backupintervall: DEFAULT_BACKUP_INTERVAL,
            datafile: default_data_file(),
            debug: YamlDebug::default(),
            webserver: YamlWebserver::default(),
            meterurl: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DebugConfig {
    pub target: LogTarget,
    pub level: LogLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebserverConfig {
    pub port: u16,
    pub webservices: HashMap<String, bool>,
}

/// Runtime configuration, built once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_collection_interval: Duration,
    pub backup_interval: Duration,
    pub data_file: PathBuf,
    pub debug: DebugConfig,
    pub webserver: WebserverConfig,
    pub meter_url: String,
}

impl Config {
    /// Reads the config file named on the command line and applies the
    /// command line overrides.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(&cli.config).map_err(|source| ConfigError::Io {
            path: cli.config.clone(),
            source,
        })?;
        Self::from_yaml(&raw, Path::new(&cli.config), cli)
    }

    fn from_yaml(raw: &str, path: &Path, cli: &Cli) -> Result<Self, ConfigError> {
        let file: YamlConfig = serde_yaml::from_str(raw).map_err(|source| ConfigError::Yaml {
            path: path.display().to_string(),
            source,
        })?;

        let debug_file = pick(cli.debug_file.as_deref(), &file.debug.file);
        let debug_flag = pick(cli.debug_flag.as_deref(), &file.debug.flag);

        if file.datacollectioninterval == 0 || file.backupintervall == 0 {
            return Err(ConfigError::Invalid(
                "datacollectioninterval and backupintervall must be at least 1s".into(),
            ));
        }
        if file.meterurl.trim().is_empty() {
            return Err(ConfigError::Invalid("meterurl is not set".into()));
        }

        let mut webservices = YamlWebserver::default().webservices;
        webservices.extend(file.webserver.webservices);

        Ok(Self {
            data_collection_interval: Duration::from_secs(file.datacollectioninterval),
            backup_interval: Duration::from_secs(file.backupintervall),
            data_file: PathBuf::from(file.datafile),
            debug: DebugConfig {
                target: LogTarget::from(debug_file),
                level: debug_flag.parse()?,
            },
            webserver: WebserverConfig {
                port: file.webserver.port,
                webservices,
            },
            meter_url: file.meterurl,
        })
    }
}

/// Command line value if given and non-empty, else the file value.
fn pick<'a>(flag: Option<&'a str>, file: &'a str) -> &'a str {
    match flag {
        Some(s) if !s.is_empty() => s,
        _ => file,
    }
}

//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::time::Duration;

use nomen_fwd::table::cs::{ContentStore, UnsolicitedDataPolicy};
use nomen_utils::name::Name;

use crate::config::{
    ConfigError, ConfigItem, ConfigSection, parse_number,
};
use crate::logging::LogLevel;

/// Typed view of the daemon configuration file.
#[derive(Debug, Default)]
pub struct DaemonConfig {
    pub general: GeneralConfig,
    pub log: LogConfig,
    pub tables: TablesConfig,
    pub rib: RibConfig,
}

/// `general` section: the identity the daemon drops privileges to.
#[derive(Debug, Default)]
pub struct GeneralConfig {
    pub user: Option<String>,
    pub group: Option<String>,
}

/// `log` section: default level plus per-module overrides.
#[derive(Debug, Default)]
pub struct LogConfig {
    pub default_level: Option<LogLevel>,
    pub module_levels: BTreeMap<String, LogLevel>,
}

/// `tables` section.
#[derive(Debug)]
pub struct TablesConfig {
    pub cs_max_packets: usize,
    pub cs_policy: Option<String>,
    pub cs_unsolicited_policy: UnsolicitedDataPolicy,
    pub strategy_choice: Vec<(Name, Name)>,
    pub network_region: Vec<Name>,
}

/// `rib` section.
#[derive(Debug, Default)]
pub struct RibConfig {
    pub remote_register: Option<RemoteRegisterConfig>,
}

#[derive(Debug)]
pub struct RemoteRegisterConfig {
    pub cost: u64,
    pub timeout: Duration,
    pub retry: u64,
    pub refresh_interval: Duration,
}

// ===== impl DaemonConfig =====

impl DaemonConfig {
    /// Builds the typed configuration from a parsed file. Unknown options
    /// inside recognized sections fail the parse; `face_system`
    /// subsections are face-type specific and accepted as-is.
    pub fn from_section(
        root: &ConfigSection,
        file: &str,
    ) -> Result<DaemonConfig, ConfigError> {
        let mut config = DaemonConfig::default();
        for (key, item) in root.iter() {
            let section = match item {
                ConfigItem::Section(section) => section,
                ConfigItem::Value(_) => {
                    return Err(ConfigError::UnknownOption {
                        file: file.to_owned(),
                        section: String::new(),
                        option: key.to_owned(),
                    });
                }
            };
            match key {
                "general" => {
                    config.general = GeneralConfig::parse(section, file)?;
                }
                "log" => config.log = LogConfig::parse(section, file)?,
                "tables" => {
                    config.tables = TablesConfig::parse(section, file)?;
                }
                "face_system" => (),
                "rib" => config.rib = RibConfig::parse(section, file)?,
                _ => {
                    return Err(ConfigError::UnknownSection {
                        file: file.to_owned(),
                        section: key.to_owned(),
                    });
                }
            }
        }
        Ok(config)
    }
}

// ===== impl GeneralConfig =====

impl GeneralConfig {
    fn parse(
        section: &ConfigSection,
        file: &str,
    ) -> Result<GeneralConfig, ConfigError> {
        let mut config = GeneralConfig::default();
        for (key, item) in section.iter() {
            match (key, item) {
                ("user", ConfigItem::Value(user)) => {
                    config.user = Some(user.clone());
                }
                ("group", ConfigItem::Value(group)) => {
                    config.group = Some(group.clone());
                }
                _ => {
                    return Err(ConfigError::UnknownOption {
                        file: file.to_owned(),
                        section: "general".to_owned(),
                        option: key.to_owned(),
                    });
                }
            }
        }
        Ok(config)
    }
}

// ===== impl LogConfig =====

impl LogConfig {
    // `default_level <LEVEL>` followed by `<ModuleName> <LEVEL>` pairs.
    fn parse(
        section: &ConfigSection,
        file: &str,
    ) -> Result<LogConfig, ConfigError> {
        let mut config = LogConfig::default();
        for (key, item) in section.iter() {
            let ConfigItem::Value(value) = item else {
                return Err(ConfigError::UnknownOption {
                    file: file.to_owned(),
                    section: "log".to_owned(),
                    option: key.to_owned(),
                });
            };
            let level: LogLevel =
                value.parse().map_err(|()| ConfigError::BadValue {
                    file: file.to_owned(),
                    section: "log".to_owned(),
                    option: key.to_owned(),
                    value: value.clone(),
                    reason: "unknown log level".to_owned(),
                })?;
            if key == "default_level" {
                config.default_level = Some(level);
            } else {
                config.module_levels.insert(key.to_owned(), level);
            }
        }
        Ok(config)
    }
}

// ===== impl TablesConfig =====

impl TablesConfig {
    fn parse(
        section: &ConfigSection,
        file: &str,
    ) -> Result<TablesConfig, ConfigError> {
        let mut config = TablesConfig::default();
        for (key, item) in section.iter() {
            match (key, item) {
                ("cs_max_packets", ConfigItem::Value(value)) => {
                    config.cs_max_packets = parse_number::<usize>(
                        value,
                        0..=usize::MAX,
                        file,
                        "tables",
                        key,
                    )?;
                }
                ("cs_policy", ConfigItem::Value(value)) => {
                    config.cs_policy = Some(value.clone());
                }
                ("cs_unsolicited_policy", ConfigItem::Value(value)) => {
                    config.cs_unsolicited_policy =
                        value.parse().map_err(|reason: String| {
                            ConfigError::BadValue {
                                file: file.to_owned(),
                                section: "tables".to_owned(),
                                option: key.to_owned(),
                                value: value.clone(),
                                reason,
                            }
                        })?;
                }
                ("strategy_choice", ConfigItem::Section(choices)) => {
                    for (prefix, choice) in choices.iter() {
                        let ConfigItem::Value(strategy) = choice else {
                            return Err(ConfigError::UnknownOption {
                                file: file.to_owned(),
                                section: "tables.strategy_choice".to_owned(),
                                option: prefix.to_owned(),
                            });
                        };
                        let prefix =
                            parse_name(prefix, file, "strategy_choice")?;
                        let strategy =
                            parse_name(strategy, file, "strategy_choice")?;
                        config.strategy_choice.push((prefix, strategy));
                    }
                }
                ("network_region", ConfigItem::Section(regions)) => {
                    for (region, _) in regions.iter() {
                        config
                            .network_region
                            .push(parse_name(region, file, "network_region")?);
                    }
                }
                _ => {
                    return Err(ConfigError::UnknownOption {
                        file: file.to_owned(),
                        section: "tables".to_owned(),
                        option: key.to_owned(),
                    });
                }
            }
        }
        Ok(config)
    }
}

impl Default for TablesConfig {
    fn default() -> TablesConfig {
        TablesConfig {
            cs_max_packets: ContentStore::DEFAULT_MAX_PACKETS,
            cs_policy: None,
            cs_unsolicited_policy: UnsolicitedDataPolicy::default(),
            strategy_choice: Vec::new(),
            network_region: Vec::new(),
        }
    }
}

// ===== impl RibConfig =====

impl RibConfig {
    const REFRESH_DEFAULT: Duration = Duration::from_secs(25);
    const REFRESH_MAX: u64 = 600;

    fn parse(
        section: &ConfigSection,
        file: &str,
    ) -> Result<RibConfig, ConfigError> {
        let mut config = RibConfig::default();
        for (key, item) in section.iter() {
            match (key, item) {
                ("remote_register", ConfigItem::Section(remote)) => {
                    config.remote_register =
                        Some(RemoteRegisterConfig::parse(remote, file)?);
                }
                // Other RIB-management subsections are outside the
                // forwarding core.
                (_, ConfigItem::Section(_)) => (),
                _ => {
                    return Err(ConfigError::UnknownOption {
                        file: file.to_owned(),
                        section: "rib".to_owned(),
                        option: key.to_owned(),
                    });
                }
            }
        }
        Ok(config)
    }
}

// ===== impl RemoteRegisterConfig =====

impl RemoteRegisterConfig {
    fn parse(
        section: &ConfigSection,
        file: &str,
    ) -> Result<RemoteRegisterConfig, ConfigError> {
        let mut config = RemoteRegisterConfig::default();
        for (key, item) in section.iter() {
            let ConfigItem::Value(value) = item else {
                return Err(ConfigError::UnknownOption {
                    file: file.to_owned(),
                    section: "rib.remote_register".to_owned(),
                    option: key.to_owned(),
                });
            };
            let s = "rib.remote_register";
            match key {
                "cost" => {
                    config.cost =
                        parse_number(value, 0..=u64::MAX, file, s, key)?;
                }
                "timeout" => {
                    config.timeout = Duration::from_millis(parse_number(
                        value,
                        0..=u64::MAX,
                        file,
                        s,
                        key,
                    )?);
                }
                "retry" => {
                    config.retry =
                        parse_number(value, 0..=u64::MAX, file, s, key)?;
                }
                "refresh_interval" => {
                    config.refresh_interval =
                        Duration::from_secs(parse_number(
                            value,
                            1..=RibConfig::REFRESH_MAX,
                            file,
                            s,
                            key,
                        )?);
                }
                _ => {
                    return Err(ConfigError::UnknownOption {
                        file: file.to_owned(),
                        section: s.to_owned(),
                        option: key.to_owned(),
                    });
                }
            }
        }
        Ok(config)
    }
}

impl Default for RemoteRegisterConfig {
    fn default() -> RemoteRegisterConfig {
        RemoteRegisterConfig {
            cost: 15,
            timeout: Duration::from_secs(10),
            retry: 0,
            refresh_interval: RibConfig::REFRESH_DEFAULT,
        }
    }
}

// ===== global functions =====

fn parse_name(
    value: &str,
    file: &str,
    option: &str,
) -> Result<Name, ConfigError> {
    value.parse().map_err(|_| ConfigError::BadValue {
        file: file.to_owned(),
        section: "tables".to_owned(),
        option: option.to_owned(),
        value: value.to_owned(),
        reason: "invalid name".to_owned(),
    })
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use super::*;

    fn load(input: &str) -> Result<DaemonConfig, ConfigError> {
        let root = ConfigSection::parse(input, "test.conf").unwrap();
        DaemonConfig::from_section(&root, "test.conf")
    }

    #[test]
    fn full_configuration() {
        let config = load(
            r#"
general
{
  user nomen
  group nomen
}
log
{
  default_level INFO
  Forwarder DEBUG
  NameTree 255
}
tables
{
  cs_max_packets 4096
  cs_unsolicited_policy drop-all
  strategy_choice
  {
    / /localhost/nfd/strategy/best-route
  }
  network_region
  {
    /example/region
  }
}
rib
{
  remote_register
  {
    cost 20
    refresh_interval 60
  }
}
"#,
        )
        .unwrap();

        assert_eq!(config.general.user.as_deref(), Some("nomen"));
        assert_eq!(config.log.default_level, Some(LogLevel::Info));
        assert_eq!(
            config.log.module_levels.get("Forwarder"),
            Some(&LogLevel::Debug)
        );
        assert_eq!(
            config.log.module_levels.get("NameTree"),
            Some(&LogLevel::All)
        );
        assert_eq!(config.tables.cs_max_packets, 4096);
        assert_eq!(config.tables.strategy_choice.len(), 1);
        assert_eq!(config.tables.network_region.len(), 1);
        let remote = config.rib.remote_register.unwrap();
        assert_eq!(remote.cost, 20);
        assert_eq!(remote.refresh_interval, Duration::from_secs(60));
        assert_eq!(remote.timeout, Duration::from_secs(10));
    }

    #[test]
    fn unknown_option_in_recognized_section_fails() {
        let result = load("general\n{\n  shoesize 46\n}\n");
        assert!(matches!(
            result,
            Err(ConfigError::UnknownOption { .. })
        ));
    }

    #[test]
    fn refresh_interval_is_bounded() {
        let result = load(
            "rib\n{\n  remote_register\n  {\n    refresh_interval 601\n  }\n}\n",
        );
        assert!(matches!(result, Err(ConfigError::BadValue { .. })));
    }

    #[test]
    fn defaults_apply() {
        let config = load("").unwrap();
        assert_eq!(
            config.tables.cs_max_packets,
            ContentStore::DEFAULT_MAX_PACKETS
        );
        assert!(config.rib.remote_register.is_none());
        assert!(config.log.default_level.is_none());
    }
}

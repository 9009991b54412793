use anyhow::{Context, Result};
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use crate::channels::HoldSetting;
use crate::decision::{CooldownPolicy, CooldownThresholds, Cooldowns};
use crate::domain::{ChannelKind, Sink, SinkId, SolarSystem, SystemId};
use crate::metering::DaylightWindow;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub cycle: CycleConfig,
    #[serde(default)]
    pub daylight: DaylightWindow,
    pub cooldowns: CooldownsConfig,
    pub enphase: EnphaseConfig,
    pub sendgrid: SendGridConfig,
    pub ecobee: EcobeeConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub systems: Vec<SystemConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    /// Host name used in links inside outgoing messages.
    pub public_hostname: String,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CycleConfig {
    pub interval_minutes: u64,
    pub send_timeout_seconds: u64,
    pub history_depth: usize,
    #[serde(default)]
    pub run_on_startup: bool,
}

impl CycleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.max(1) * 60)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_seconds.max(1))
    }
}

/// Cooldown thresholds in whole minutes.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CooldownMinutes {
    pub consume_to_consume: i64,
    pub produce_to_consume: i64,
    pub produce_to_produce: i64,
}

impl From<CooldownMinutes> for CooldownPolicy {
    fn from(m: CooldownMinutes) -> Self {
        CooldownPolicy::new(CooldownThresholds::from_minutes(
            m.consume_to_consume,
            m.produce_to_consume,
            m.produce_to_produce,
        ))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CooldownsConfig {
    pub sms: CooldownMinutes,
    pub email: CooldownMinutes,
    pub ecobee: CooldownMinutes,
}

impl CooldownsConfig {
    pub fn to_cooldowns(&self) -> Cooldowns {
        Cooldowns {
            sms: self.sms.into(),
            email: self.email.into(),
            ecobee: self.ecobee.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnphaseConfig {
    pub base_url: String,
    pub api_key: String,
    pub http_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendGridConfig {
    pub base_url: String,
    /// Email sinks record a failed delivery while unset.
    #[serde(default)]
    pub api_key: Option<String>,
    pub from_address: String,
    pub from_name: String,
    pub http_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EcobeeConfig {
    pub base_url: String,
    pub http_timeout_seconds: u64,
    pub consume_hold: HoldSetting,
    pub produce_hold: HoldSetting,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
}

/// A metered system and its sinks, seeded into the catalog at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    pub user_id: String,
    pub system_id: SystemId,
    pub timezone: String,
    pub access_token: String,
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    pub id: SinkId,
    pub channel: String,
    #[serde(default)]
    pub recipient: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file("config/default.toml"))
                .merge(Env::prefixed("SOLAR_NUDGE__").split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        Ok(figment.extract()?)
    }

    /// Systems and validated sinks for the static catalog.
    ///
    /// Sink ids key the action log, so they must be unique across systems.
    pub fn seed(&self) -> Result<(Vec<SolarSystem>, Vec<Sink>)> {
        let mut systems = Vec::with_capacity(self.systems.len());
        let mut sinks = Vec::new();
        let mut seen = HashSet::new();
        for sys in &self.systems {
            for s in &sys.sinks {
                if !seen.insert(s.id) {
                    anyhow::bail!("duplicate sink id {} in system {}", s.id, sys.system_id);
                }
                let channel = ChannelKind::parse(&s.channel)
                    .with_context(|| format!("sink {} of system {}", s.id, sys.system_id))?;
                let sink = Sink::new(s.id, sys.user_id.clone(), sys.system_id, channel, s.recipient.clone())
                    .with_context(|| format!("sink {} of system {}", s.id, sys.system_id))?;
                sinks.push(sink);
            }
            systems.push(SolarSystem {
                user_id: sys.user_id.clone(),
                system_id: sys.system_id,
                timezone: sys.timezone.clone(),
                access_token: sys.access_token.clone(),
            });
        }
        Ok((systems, sinks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    const DEFAULT_TOML: &str = include_str!("../config/default.toml");

    fn default_config() -> Config {
        Config::from_figment(Figment::new().merge(Toml::string(DEFAULT_TOML))).unwrap()
    }

    #[test]
    fn test_default_config_parses() {
        let cfg = default_config();
        assert_eq!(cfg.cycle.interval(), Duration::from_secs(15 * 60));
        assert_eq!(cfg.daylight.start, NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert!(cfg.sendgrid.api_key.is_none());
        assert_eq!(cfg.server.socket_addr().unwrap().port(), cfg.server.port);
    }

    #[test]
    fn test_default_cooldowns_match_built_ins() {
        assert_eq!(default_config().cooldowns.to_cooldowns(), Cooldowns::default());
    }

    #[test]
    fn test_seed_validates_sinks() {
        let figment = Figment::new().merge(Toml::string(DEFAULT_TOML)).merge(Toml::string(
            r#"
            [[systems]]
            user_id = "user-1"
            system_id = 42
            timezone = "America/New_York"
            access_token = "tok"

            [[systems.sinks]]
            id = 1
            channel = "logger"

            [[systems.sinks]]
            id = 2
            channel = "email"
            "#,
        ));
        let cfg = Config::from_figment(figment).unwrap();
        let err = cfg.seed().unwrap_err();
        assert!(format!("{err:#}").contains("'recipient' is required for email sinks"));
    }

    #[test]
    fn test_seed_rejects_duplicate_sink_ids() {
        let figment = Figment::new().merge(Toml::string(DEFAULT_TOML)).merge(Toml::string(
            r#"
            [[systems]]
            user_id = "user-1"
            system_id = 42
            timezone = "America/New_York"
            access_token = "tok"

            [[systems.sinks]]
            id = 1
            channel = "logger"

            [[systems]]
            user_id = "user-2"
            system_id = 43
            timezone = "America/Denver"
            access_token = "tok-2"

            [[systems.sinks]]
            id = 1
            channel = "logger"
            "#,
        ));
        let err = Config::from_figment(figment).unwrap().seed().unwrap_err();
        assert!(err.to_string().contains("duplicate sink id 1"), "{err}");
    }

    #[test]
    fn test_seed_builds_catalog_inputs() {
        let figment = Figment::new().merge(Toml::string(DEFAULT_TOML)).merge(Toml::string(
            r#"
            [[systems]]
            user_id = "user-1"
            system_id = 42
            timezone = "Europe/Berlin"
            access_token = "tok"

            [[systems.sinks]]
            id = 5
            channel = "email"
            recipient = "owner@example.com"
            "#,
        ));
        let (systems, sinks) = Config::from_figment(figment).unwrap().seed().unwrap();
        assert_eq!(systems.len(), 1);
        assert_eq!(sinks[0].channel, ChannelKind::Email);
        assert_eq!(sinks[0].user_id, "user-1");
    }
}

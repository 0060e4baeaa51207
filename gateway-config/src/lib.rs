//! Environment-variable configuration for the gateway monitor
//! (spec.md §6 "Environment-variable configuration").

use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

/// Gateway Poller tuning (spec.md §4.1 "Configuration (enumerated)").
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub sinr_drop_threshold_db: f64,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env::var("GATEWAY_HOST").unwrap_or_else(|_| "192.168.1.1".to_string()),
            port: parse_env_or("GATEWAY_PORT", 80)?,
            poll_interval: Duration::from_millis(parse_env_or("GATEWAY_POLL_INTERVAL_MS", 2000)?),
            timeout: Duration::from_secs_f64(parse_env_or("GATEWAY_TIMEOUT_SECONDS", 2.0)?),
            failure_threshold: parse_env_or("GATEWAY_FAILURE_THRESHOLD", 3)?,
            recovery_timeout: Duration::from_secs(parse_env_or("GATEWAY_RECOVERY_TIMEOUT_SECONDS", 30)?),
            sinr_drop_threshold_db: parse_env_or("GATEWAY_SINR_DROP_THRESHOLD_DB", 10.0)?,
        })
    }
}

/// Postgres connection settings, resolved either from a single `DATABASE_URL`
/// or from the discrete `DB_*` variables (spec.md §6).
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(url) = env::var("DATABASE_URL") {
            return Ok(Self { url });
        }

        let host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
        let port: u16 = parse_env_or("DB_PORT", 5432)?;
        let name = env::var("DB_NAME").unwrap_or_else(|_| "gateway_monitor".to_string());
        let user = env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string());
        let password = env::var("DB_PASSWORD").unwrap_or_default();

        Ok(Self {
            url: format!("postgres://{user}:{password}@{host}:{port}/{name}"),
        })
    }
}

/// Alert Engine policy defaults (spec.md §4.4 "Policy (enumerated
/// configuration)", GLOSSARY "Default alert thresholds"). Thresholds apply
/// per metric across both radios (5G-NR and 4G LTE share one SINR/RSRP pair).
#[derive(Debug, Clone)]
pub struct AlertPolicyConfig {
    pub enabled: bool,
    pub sinr_critical: f64,
    pub sinr_warning: f64,
    pub rsrp_critical: f64,
    pub rsrp_warning: f64,
    pub rsrq_critical: f64,
    pub rsrq_warning: f64,
    pub speed_low_threshold_mbps: f64,
    pub packet_loss_threshold_percent: f64,
    pub jitter_threshold_ms: f64,
    pub signal_drop_threshold_db: f64,
    pub notify_on_warning: bool,
    pub notify_on_critical: bool,
    pub cooldown_minutes: f64,
}

impl Default for AlertPolicyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sinr_critical: -5.0,
            sinr_warning: 0.0,
            rsrp_critical: -110.0,
            rsrp_warning: -100.0,
            rsrq_critical: -19.0,
            rsrq_warning: -15.0,
            speed_low_threshold_mbps: 10.0,
            packet_loss_threshold_percent: 5.0,
            jitter_threshold_ms: 50.0,
            signal_drop_threshold_db: 10.0,
            notify_on_warning: true,
            notify_on_critical: true,
            cooldown_minutes: 5.0,
        }
    }
}

impl AlertPolicyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            enabled: parse_env_or("ALERT_ENABLED", defaults.enabled)?,
            sinr_critical: parse_env_or("ALERT_SINR_CRITICAL", defaults.sinr_critical)?,
            sinr_warning: parse_env_or("ALERT_SINR_WARNING", defaults.sinr_warning)?,
            rsrp_critical: parse_env_or("ALERT_RSRP_CRITICAL", defaults.rsrp_critical)?,
            rsrp_warning: parse_env_or("ALERT_RSRP_WARNING", defaults.rsrp_warning)?,
            rsrq_critical: parse_env_or("ALERT_RSRQ_CRITICAL", defaults.rsrq_critical)?,
            rsrq_warning: parse_env_or("ALERT_RSRQ_WARNING", defaults.rsrq_warning)?,
            speed_low_threshold_mbps: parse_env_or("ALERT_SPEED_LOW_THRESHOLD_MBPS", defaults.speed_low_threshold_mbps)?,
            packet_loss_threshold_percent: parse_env_or(
                "ALERT_PACKET_LOSS_THRESHOLD_PERCENT",
                defaults.packet_loss_threshold_percent,
            )?,
            jitter_threshold_ms: parse_env_or("ALERT_JITTER_THRESHOLD_MS", defaults.jitter_threshold_ms)?,
            signal_drop_threshold_db: parse_env_or("ALERT_SIGNAL_DROP_THRESHOLD_DB", defaults.signal_drop_threshold_db)?,
            notify_on_warning: parse_env_or("ALERT_NOTIFY_ON_WARNING", defaults.notify_on_warning)?,
            notify_on_critical: parse_env_or("ALERT_NOTIFY_ON_CRITICAL", defaults.notify_on_critical)?,
            cooldown_minutes: parse_env_or("ALERT_COOLDOWN_MINUTES", defaults.cooldown_minutes)?,
        })
    }
}

/// Disruption Detector thresholds (spec.md §4.3, GLOSSARY "Default
/// disruption thresholds").
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub sinr_drop_5g_db: f64,
    pub sinr_drop_4g_db: f64,
    pub critical_escalation_db: f64,
    pub cooldown_seconds: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sinr_drop_5g_db: 10.0,
            sinr_drop_4g_db: 10.0,
            critical_escalation_db: 20.0,
            cooldown_seconds: 60.0,
        }
    }
}

impl DetectorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            sinr_drop_5g_db: parse_env_or("DETECTOR_SINR_DROP_5G_DB", defaults.sinr_drop_5g_db)?,
            sinr_drop_4g_db: parse_env_or("DETECTOR_SINR_DROP_4G_DB", defaults.sinr_drop_4g_db)?,
            critical_escalation_db: parse_env_or("DETECTOR_CRITICAL_ESCALATION_DB", defaults.critical_escalation_db)?,
            cooldown_seconds: parse_env_or("DETECTOR_COOLDOWN_SECONDS", defaults.cooldown_seconds)?,
        })
    }
}

/// Scheduler defaults (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_minutes: f64,
    pub window_start_hour: u32,
    pub window_end_hour: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: 60.0,
            window_start_hour: 0,
            window_end_hour: 24,
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            enabled: parse_env_or("SCHEDULER_ENABLED", defaults.enabled)?,
            interval_minutes: parse_env_or("SCHEDULER_INTERVAL_MINUTES", defaults.interval_minutes)?,
            window_start_hour: parse_env_or("SCHEDULER_WINDOW_START_HOUR", defaults.window_start_hour)?,
            window_end_hour: parse_env_or("SCHEDULER_WINDOW_END_HOUR", defaults.window_end_hour)?,
        })
    }
}

/// Top-level configuration, assembled once at startup. Loads `.env` via
/// `dotenvy` before reading any variable, mirroring the teacher's pattern of
/// tolerating a missing file.
#[derive(Debug, Clone)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub database: DatabaseConfig,
    pub alert_policy: AlertPolicyConfig,
    pub detector: DetectorConfig,
    pub scheduler: SchedulerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            gateway: GatewayConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            alert_policy: AlertPolicyConfig::from_env()?,
            detector: DetectorConfig::from_env()?,
            scheduler: SchedulerConfig::from_env()?,
        })
    }
}

fn parse_env_or<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match env::var(var) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue { var, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_policy_defaults_match_glossary() {
        let policy = AlertPolicyConfig::default();
        assert!(policy.enabled);
        assert_eq!(policy.sinr_critical, -5.0);
        assert_eq!(policy.speed_low_threshold_mbps, 10.0);
        assert_eq!(policy.cooldown_minutes, 5.0);
    }

    #[test]
    fn database_config_url_shape_is_postgres() {
        let db = DatabaseConfig { url: "postgres://postgres:@localhost:5432/gateway_monitor".to_string() };
        assert!(db.url.starts_with("postgres://"));
    }

    #[test]
    fn scheduler_defaults_cover_full_day_disabled() {
        let sched = SchedulerConfig::default();
        assert!(!sched.enabled);
        assert_eq!(sched.window_start_hour, 0);
        assert_eq!(sched.window_end_hour, 24);
    }
}

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use chrono::{FixedOffset, NaiveTime, Offset, Utc};
use log::*;
use resale_common::{helpers::parse_boolean_flag, Secret};
use resale_engine::helpers::{OrderCodePattern, DEFAULT_ORDER_CODE_PATTERN};

const DEFAULT_RSL_HOST: &str = "127.0.0.1";
const DEFAULT_RSL_PORT: u16 = 8460;
const DEFAULT_SIGNATURE_HEADER: &str = "X-Signature";
const DEFAULT_API_KEY_HEADER: &str = "Authorization";
const DEFAULT_UTC_OFFSET_HOURS: i32 = 7;
const DEFAULT_MAINTENANCE_AT: &str = "00:05";
const DEFAULT_NOTICES_AT: &str = "09:00";
const DEFAULT_SCHEDULER_TICK_SECS: u64 = 60;
const DEFAULT_RETRY_RESCAN_DAYS: u64 = 3;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub auth: WebhookAuthConfig,
    /// The pattern used to find order codes in transfer memos.
    pub order_code_pattern: OrderCodePattern,
    /// The business timezone. "Today" for every date comparison is the calendar date at this offset.
    pub utc_offset: FixedOffset,
    pub schedule: ScheduleConfig,
    /// If set, the daily maintenance job writes a copy of the database here after every successful run.
    pub backup_dir: Option<PathBuf>,
    /// If set, advance notices are POSTed as JSON to this URL. Otherwise they are only logged.
    pub notifier_url: Option<String>,
    /// How far back the manual renewal retry looks for payments when no order codes are given.
    pub retry_rescan_days: u64,
}

/// Credentials for the webhook and the operator API. Requests must carry either a valid signature of the body (webhook
/// only) or the static API key.
#[derive(Clone, Debug)]
pub struct WebhookAuthConfig {
    pub api_key: Secret<String>,
    pub hmac_secret: Secret<String>,
    pub signature_header: String,
    pub api_key_header: String,
}

#[derive(Clone, Copy, Debug)]
pub struct ScheduleConfig {
    pub enabled: bool,
    /// Local time of day at which the daily maintenance job runs.
    pub maintenance_at: NaiveTime,
    /// Local time of day at which the advance notices go out.
    pub notices_at: NaiveTime,
    /// How often the schedulers wake up to check whether a job is due.
    pub tick: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            maintenance_at: parse_time_of_day(DEFAULT_MAINTENANCE_AT).unwrap_or(NaiveTime::MIN),
            notices_at: parse_time_of_day(DEFAULT_NOTICES_AT).unwrap_or(NaiveTime::MIN),
            tick: Duration::from_secs(DEFAULT_SCHEDULER_TICK_SECS),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RSL_HOST.to_string(),
            port: DEFAULT_RSL_PORT,
            database_url: String::default(),
            auth: WebhookAuthConfig::default(),
            order_code_pattern: OrderCodePattern::default(),
            utc_offset: utc_offset_from_hours(DEFAULT_UTC_OFFSET_HOURS).unwrap_or_else(|| Utc.fix()),
            schedule: ScheduleConfig::default(),
            backup_dir: None,
            notifier_url: None,
            retry_rescan_days: DEFAULT_RETRY_RESCAN_DAYS,
        }
    }
}

impl Default for WebhookAuthConfig {
    fn default() -> Self {
        Self {
            api_key: Secret::default(),
            hmac_secret: Secret::default(),
            signature_header: DEFAULT_SIGNATURE_HEADER.to_string(),
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("RSL_HOST").ok().unwrap_or_else(|| DEFAULT_RSL_HOST.into());
        let port = env_or_default("RSL_PORT", DEFAULT_RSL_PORT);
        let database_url = env::var("RSL_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ RSL_DATABASE_URL is not set. Please set it to the URL for the ledger database.");
            String::default()
        });
        let auth = WebhookAuthConfig::from_env_or_default();
        let order_code_pattern = match env::var("RSL_ORDER_CODE_PATTERN") {
            Ok(s) => OrderCodePattern::new(&s).unwrap_or_else(|e| {
                error!("🪛️ {e}. Using the default order code pattern, {DEFAULT_ORDER_CODE_PATTERN}, instead.");
                OrderCodePattern::default()
            }),
            Err(_) => OrderCodePattern::default(),
        };
        info!("🪛️ Order codes are matched with {}", order_code_pattern.as_str());
        let offset_hours = env_or_default("RSL_UTC_OFFSET_HOURS", DEFAULT_UTC_OFFSET_HOURS);
        let utc_offset = utc_offset_from_hours(offset_hours).unwrap_or_else(|| {
            error!("🪛️ {offset_hours} is not a valid UTC offset for RSL_UTC_OFFSET_HOURS. Using UTC+{DEFAULT_UTC_OFFSET_HOURS}.");
            ServerConfig::default().utc_offset
        });
        let schedule = ScheduleConfig::from_env_or_default();
        let backup_dir = env::var("RSL_BACKUP_DIR").ok().filter(|s| !s.trim().is_empty()).map(PathBuf::from);
        if backup_dir.is_none() {
            info!("🪛️ RSL_BACKUP_DIR is not set. The daily maintenance job will not take backups.");
        }
        let notifier_url = env::var("RSL_NOTIFIER_URL").ok().filter(|s| !s.trim().is_empty());
        if notifier_url.is_none() {
            info!("🪛️ RSL_NOTIFIER_URL is not set. Advance notices will only be written to the log.");
        }
        let retry_rescan_days = env_or_default("RSL_RETRY_RESCAN_DAYS", DEFAULT_RETRY_RESCAN_DAYS);
        Self {
            host,
            port,
            database_url,
            auth,
            order_code_pattern,
            utc_offset,
            schedule,
            backup_dir,
            notifier_url,
            retry_rescan_days,
        }
    }
}

impl WebhookAuthConfig {
    pub fn from_env_or_default() -> Self {
        let api_key = Secret::new(env::var("RSL_WEBHOOK_API_KEY").ok().unwrap_or_default());
        let hmac_secret = Secret::new(env::var("RSL_WEBHOOK_HMAC_SECRET").ok().unwrap_or_default());
        if !api_key.is_set() && !hmac_secret.is_set() {
            warn!(
                "🚨️ Neither RSL_WEBHOOK_API_KEY nor RSL_WEBHOOK_HMAC_SECRET is set. Every webhook and API call will be \
                 rejected."
            );
        }
        let signature_header =
            env::var("RSL_SIGNATURE_HEADER").ok().unwrap_or_else(|| DEFAULT_SIGNATURE_HEADER.to_string());
        let api_key_header = env::var("RSL_API_KEY_HEADER").ok().unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string());
        Self { api_key, hmac_secret, signature_header, api_key_header }
    }
}

impl ScheduleConfig {
    pub fn from_env_or_default() -> Self {
        let defaults = Self::default();
        let enabled = !parse_boolean_flag(env::var("RSL_DISABLE_SCHEDULER").ok(), false);
        if !enabled {
            warn!("🪛️ The schedulers are disabled. Daily maintenance and advance notices will not run.");
        }
        let maintenance_at = time_of_day_from_env("RSL_MAINTENANCE_AT", defaults.maintenance_at);
        let notices_at = time_of_day_from_env("RSL_NOTICES_AT", defaults.notices_at);
        let tick_secs = env_or_default("RSL_SCHEDULER_TICK_SECS", DEFAULT_SCHEDULER_TICK_SECS).max(1);
        Self { enabled, maintenance_at, notices_at, tick: Duration::from_secs(tick_secs) }
    }
}

/// A subset of the server configuration that request handlers need. Secrets are deliberately excluded.
#[derive(Clone, Copy, Debug)]
pub struct ServerOptions {
    pub utc_offset: FixedOffset,
    pub retry_rescan_days: u64,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { utc_offset: config.utc_offset, retry_rescan_days: config.retry_rescan_days }
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

/// Parses `HH:MM` or `HH:MM:SS`.
pub fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M").or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S")).ok()
}

pub fn utc_offset_from_hours(hours: i32) -> Option<FixedOffset> {
    if !(-12..=14).contains(&hours) {
        return None;
    }
    FixedOffset::east_opt(hours * 3600)
}

fn env_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
    }
}

fn time_of_day_from_env(name: &str, default: NaiveTime) -> NaiveTime {
    match env::var(name) {
        Ok(s) => parse_time_of_day(&s).unwrap_or_else(|| {
            error!("🪛️ {s} is not a valid time of day for {name}. Use HH:MM. Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}

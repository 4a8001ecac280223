//! Settings - Dispatcher と Polling service の設定
//!
//! `Settings::default()` がそのまま動く値を持つ。環境変数（`WEFT_*`）で
//! 上書きできる。時間系の値は秒単位で指定する。

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

const DEFAULT_QUEUE: &str = "default";
const DEFAULT_MAX_NUMBER_OF_MESSAGES: u32 = 10;
const DEFAULT_WAIT_TIME_SECS: u64 = 2;
const DEFAULT_NO_QUEUES_WAIT_TIME_SECS: u64 = 5;
const DEFAULT_REFRESH_PREFIX_QUEUES_SECS: u64 = 10;
const DEFAULT_HEALTHCHECK_FILE_NAME: &str = "healthcheck.txt";
const DEFAULT_HEALTHCHECK_UNHEALTHY_PERIOD_SECS: u64 = 60;
const DEFAULT_MIN_HEALTHCHECK_WRITE_PERIOD_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Queue used when a task does not name one.
    pub default_queue: String,
    /// Prepended to every queue name the dispatcher sends to.
    pub queue_prefix: String,
    pub default_max_retries: u32,
    pub default_delay: Duration,
    /// Whether retries count toward `max_retries` unless the task says otherwise.
    pub default_count_retries: bool,
    /// Run every submitted task in-process instead of sending it.
    pub execute_inline: bool,
    /// Build retry successors through a serialize/deserialize round trip.
    pub force_serialization: bool,

    pub max_number_of_messages: u32,
    /// Long-poll wait per receive call.
    pub wait_time: Duration,
    pub no_queues_wait_time: Duration,
    pub refresh_prefix_queues: Duration,

    pub healthcheck_file_name: PathBuf,
    pub healthcheck_unhealthy_period: Duration,
    pub min_healthcheck_write_period: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_queue: DEFAULT_QUEUE.to_string(),
            queue_prefix: String::new(),
            default_max_retries: 0,
            default_delay: Duration::ZERO,
            default_count_retries: true,
            execute_inline: false,
            force_serialization: false,
            max_number_of_messages: DEFAULT_MAX_NUMBER_OF_MESSAGES,
            wait_time: Duration::from_secs(DEFAULT_WAIT_TIME_SECS),
            no_queues_wait_time: Duration::from_secs(DEFAULT_NO_QUEUES_WAIT_TIME_SECS),
            refresh_prefix_queues: Duration::from_secs(DEFAULT_REFRESH_PREFIX_QUEUES_SECS),
            healthcheck_file_name: PathBuf::from(DEFAULT_HEALTHCHECK_FILE_NAME),
            healthcheck_unhealthy_period: Duration::from_secs(
                DEFAULT_HEALTHCHECK_UNHEALTHY_PERIOD_SECS,
            ),
            min_healthcheck_write_period: Duration::from_secs(
                DEFAULT_MIN_HEALTHCHECK_WRITE_PERIOD_SECS,
            ),
        }
    }
}

/// Defaults applied when a wire message omits optional fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefaults {
    pub queue: String,
    pub max_retries: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("invalid value '{value}' for {key}: expected {expected}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl Settings {
    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`; missing keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        Ok(Self {
            default_queue: lookup("WEFT_DEFAULT_QUEUE").unwrap_or(d.default_queue),
            queue_prefix: lookup("WEFT_QUEUE_PREFIX").unwrap_or(d.queue_prefix),
            default_max_retries: parse(&lookup, "WEFT_DEFAULT_MAX_RETRIES", "an integer")?
                .unwrap_or(d.default_max_retries),
            default_delay: secs(&lookup, "WEFT_DEFAULT_DELAY_S")?.unwrap_or(d.default_delay),
            default_count_retries: flag(&lookup, "WEFT_DEFAULT_COUNT_RETRIES")?
                .unwrap_or(d.default_count_retries),
            execute_inline: flag(&lookup, "WEFT_EXECUTE_INLINE")?.unwrap_or(d.execute_inline),
            force_serialization: flag(&lookup, "WEFT_FORCE_SERIALIZATION")?
                .unwrap_or(d.force_serialization),
            max_number_of_messages: parse(&lookup, "WEFT_MAX_NUMBER_OF_MESSAGES", "an integer")?
                .unwrap_or(d.max_number_of_messages),
            wait_time: secs(&lookup, "WEFT_WAIT_TIME_S")?.unwrap_or(d.wait_time),
            no_queues_wait_time: secs(&lookup, "WEFT_NO_QUEUES_WAIT_TIME_S")?
                .unwrap_or(d.no_queues_wait_time),
            refresh_prefix_queues: secs(&lookup, "WEFT_REFRESH_PREFIX_QUEUES_S")?
                .unwrap_or(d.refresh_prefix_queues),
            healthcheck_file_name: lookup("WEFT_HEALTHCHECK_FILE_NAME")
                .map(PathBuf::from)
                .unwrap_or(d.healthcheck_file_name),
            healthcheck_unhealthy_period: secs(&lookup, "WEFT_HEALTHCHECK_UNHEALTHY_PERIOD_S")?
                .unwrap_or(d.healthcheck_unhealthy_period),
            min_healthcheck_write_period: secs(&lookup, "WEFT_MIN_HEALTHCHECK_WRITE_PERIOD_S")?
                .unwrap_or(d.min_healthcheck_write_period),
        })
    }

    pub fn task_defaults(&self) -> TaskDefaults {
        TaskDefaults {
            queue: self.default_queue.clone(),
            max_retries: self.default_max_retries,
        }
    }

    /// Log the effective values once at startup.
    pub fn log_summary(&self) {
        info!(
            wait_time_s = self.wait_time.as_secs(),
            no_queues_wait_time_s = self.no_queues_wait_time.as_secs(),
            max_number_of_messages = self.max_number_of_messages,
            refresh_prefix_queues_s = self.refresh_prefix_queues.as_secs(),
            "polling settings"
        );
        info!(
            default_queue = %self.default_queue,
            queue_prefix = %self.queue_prefix,
            default_max_retries = self.default_max_retries,
            default_count_retries = self.default_count_retries,
            execute_inline = self.execute_inline,
            force_serialization = self.force_serialization,
            "dispatch settings"
        );
    }
}

fn parse<T, F>(lookup: &F, key: &'static str, expected: &'static str) -> Result<Option<T>, SettingsError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SettingsError::Invalid {
                key,
                value,
                expected,
            }),
    }
}

fn secs<F>(lookup: &F, key: &'static str) -> Result<Option<Duration>, SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parse::<u64, F>(lookup, key, "a number of seconds")?.map(Duration::from_secs))
}

fn flag<F>(lookup: &F, key: &'static str) -> Result<Option<bool>, SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => {
            let normalized = value.trim().to_lowercase();
            match normalized.as_str() {
                "1" | "true" | "yes" | "on" => Ok(Some(true)),
                "0" | "false" | "no" | "off" => Ok(Some(false)),
                _ => Err(SettingsError::Invalid {
                    key,
                    value,
                    expected: "a boolean",
                }),
            }
        }
    }
}

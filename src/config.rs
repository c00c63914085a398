use crate::phone_book::RetryPolicy;
use log::{debug, warn};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub serial: SerialConfig,
    pub output_directory: PathBuf,
    pub phone_book: PhoneBookConfig,
    pub transfer: TransferConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub port: String,
    pub baudrate: u32,
    /// How long one answer line may take; `None` waits forever.
    pub read_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct PhoneBookConfig {
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Upper bound for one upload chunk, whatever the phone accepts.
    pub upload_buffer_size: usize,
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Skip a message that fails to decode instead of aborting the batch.
    pub keep_going: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            serial: SerialConfig {
                port: "/dev/ttyUSB0".to_string(),
                baudrate: 115200,
                read_timeout: None,
            },
            output_directory: PathBuf::from("Output"),
            phone_book: PhoneBookConfig {
                retry: RetryPolicy::default(),
            },
            transfer: TransferConfig {
                upload_buffer_size: 1024,
            },
            batch: BatchConfig { keep_going: false },
        }
    }
}

impl Config {
    /// Defaults, then `B100_*` environment overrides.
    pub fn load() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        let get_parsed = |key: &str| -> Option<u64> {
            let value = lookup(key)?;
            match u64::from_str(value.trim()) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!("Ignoring {}={:?}: {}", key, value, e);
                    None
                }
            }
        };

        if let Some(baudrate) =
            get_parsed("B100_SERIAL_BAUDRATE").and_then(|b| u32::try_from(b).ok())
        {
            config.serial.baudrate = baudrate;
        }
        if let Some(seconds) = get_parsed("B100_READ_TIMEOUT") {
            config.serial.read_timeout = (seconds > 0).then(|| Duration::from_secs(seconds));
        }
        if let Some(directory) = lookup("B100_OUTPUT_DIRECTORY").filter(|d| !d.is_empty()) {
            config.output_directory = PathBuf::from(directory);
        }
        if let Some(attempts) =
            get_parsed("B100_PHONE_BOOK_RETRIES").and_then(|a| u32::try_from(a).ok())
        {
            config.phone_book.retry.max_attempts = attempts.max(1);
        }

        debug!("Loaded configuration: {:?}", config);
        config
    }
}

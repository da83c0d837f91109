use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration, read once at startup. Every knob has a default
/// so a bare `reverie` invocation works against a local data directory.
#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_token: String,
    pub data_dir: PathBuf,
    pub max_connect_attempts: u32,
    pub connect_base_delay: Duration,
    pub dispatch_batch_size: usize,
    pub per_user_timeout: Duration,
    /// Production deployments keep running with the dispatcher disabled
    /// when the store never comes up; everywhere else that is a hard
    /// startup failure.
    pub degraded_mode_allowed: bool,
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("REVERIE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        Self {
            telegram_token: std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
            data_dir,
            max_connect_attempts: env_parsed("REVERIE_CONNECT_ATTEMPTS", 10),
            connect_base_delay: Duration::from_millis(env_parsed(
                "REVERIE_CONNECT_BASE_DELAY_MS",
                5_000,
            )),
            dispatch_batch_size: env_parsed("REVERIE_DISPATCH_BATCH_SIZE", 50),
            per_user_timeout: Duration::from_secs(env_parsed("REVERIE_USER_TIMEOUT_SECS", 30)),
            degraded_mode_allowed: std::env::var("REVERIE_ENV")
                .map(|v| v == "production")
                .unwrap_or(false),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("reverie.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parsed_falls_back_on_missing_or_garbage() {
        assert_eq!(env_parsed("REVERIE_TEST_UNSET_VAR", 7u32), 7);
        // SAFETY: test-only env mutation, no concurrent readers of this key.
        unsafe { std::env::set_var("REVERIE_TEST_GARBAGE_VAR", "not-a-number") };
        assert_eq!(env_parsed("REVERIE_TEST_GARBAGE_VAR", 7u32), 7);
        unsafe { std::env::remove_var("REVERIE_TEST_GARBAGE_VAR") };
    }

    #[test]
    fn db_path_lives_under_the_data_dir() {
        let cfg = Config {
            telegram_token: String::new(),
            data_dir: PathBuf::from("/tmp/reverie-test"),
            max_connect_attempts: 1,
            connect_base_delay: Duration::from_millis(1),
            dispatch_batch_size: 50,
            per_user_timeout: Duration::from_secs(30),
            degraded_mode_allowed: false,
        };
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/reverie-test/reverie.db"));
    }
}

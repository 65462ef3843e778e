use std::path::Path;
use std::time::Duration;

use shared_types::SimulationOptions;

/// Engine timing and boot options.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pause between two ticks of a pendulum loop
    pub tick_interval: Duration,
    /// Minimum wait after a collision before the pool may restart
    pub restart_timeout: Duration,
    /// Upper bound for delivering a command to every pendulum
    pub command_timeout: Duration,
    /// Capacity of the collaborator event channel
    pub event_buffer: usize,
    /// Options the pool is sized for and idles with until the first start
    pub initial_options: SimulationOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: tick_interval(60),
            restart_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(1),
            event_buffer: 1024,
            initial_options: SimulationOptions::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let tick_rate: u32 = env_parse("PENDULUM_TICK_RATE_HZ", 60)?;
        if tick_rate == 0 {
            anyhow::bail!("PENDULUM_TICK_RATE_HZ must be greater than zero");
        }

        let initial_options = match std::env::var("PENDULUM_OPTIONS_PATH") {
            Ok(path) => load_options(Path::new(&path))?,
            Err(_) => SimulationOptions::default(),
        };
        if initial_options.is_empty() {
            anyhow::bail!("Initial simulation options must contain at least one pendulum");
        }

        Ok(Self {
            tick_interval: tick_interval(tick_rate),
            restart_timeout: Duration::from_millis(env_parse(
                "PENDULUM_RESTART_TIMEOUT_MS",
                5_000,
            )?),
            command_timeout: Duration::from_millis(env_parse(
                "PENDULUM_COMMAND_TIMEOUT_MS",
                1_000,
            )?),
            event_buffer: env_parse("PENDULUM_EVENT_BUFFER", 1024usize)?.max(1),
            initial_options,
        })
    }

    pub fn with_restart_timeout(mut self, restart_timeout: Duration) -> Self {
        self.restart_timeout = restart_timeout;
        self
    }

    pub fn with_initial_options(mut self, options: SimulationOptions) -> Self {
        self.initial_options = options;
        self
    }

    pub fn pool_size(&self) -> usize {
        self.initial_options.len()
    }
}

fn tick_interval(rate_hz: u32) -> Duration {
    Duration::from_micros(1_000_000 / u64::from(rate_hz.max(1)))
}

/// Read `SimulationOptions` from a JSON file.
pub fn load_options(path: &Path) -> anyhow::Result<SimulationOptions> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read options file {}: {e}", path.display()))?;
    serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("Failed to parse options file {}: {e}", path.display()))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.tick_interval, Duration::from_micros(16_666));
        assert_eq!(config.restart_timeout, Duration::from_secs(5));
        assert_eq!(config.pool_size(), 5);
    }

    #[test]
    fn test_env_parse_uses_default_when_unset() {
        let value: u64 = env_parse("PENDULUM_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_env_parse_rejects_garbage() {
        std::env::set_var("PENDULUM_TEST_GARBAGE_VARIABLE", "sixty");
        let result: anyhow::Result<u32> = env_parse("PENDULUM_TEST_GARBAGE_VARIABLE", 60);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("PENDULUM_TEST_GARBAGE_VARIABLE=sixty"));
    }

    #[test]
    fn test_load_options_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "pendulums": [
                    {{"angle": -0.5, "mass": 0.2, "radius": 0.02, "length": 0.3, "anchor": {{"x": 0.2, "y": 0.05}}}},
                    {{"angle": 0.5, "mass": 0.2, "radius": 0.03, "length": 0.3, "anchor": {{"x": 0.35, "y": 0.05}}}}
                ],
                "wind": {{"enabled": true, "direction": 1.0, "velocity": 20.0}}
            }}"#
        )
        .unwrap();

        let options = load_options(file.path()).unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options.pendulums[1].radius, 0.03);
        assert!(options.wind.enabled);
    }

    #[test]
    fn test_load_options_reports_path_on_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = load_options(file.path()).unwrap_err().to_string();
        assert!(err.contains("Failed to parse options file"));
    }
}

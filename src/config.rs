//! Command-line and environment configuration.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::emitter::{Pacing, FIRST_TOKEN_CEILING, MIN_WORDS_PER_SEC};
use crate::error::{Result, ServiceError};

/// Simulated streaming LLM API serving a canned response over SSE
#[derive(Parser, Debug, Clone)]
#[command(name = "canned-stream-api")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Listen address
    #[arg(short, long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8000")]
    pub listen: String,

    /// Also serve on this Unix socket path
    #[arg(short, long, env = "SOCKET_PATH")]
    pub socket: Option<PathBuf>,

    /// Words per streamed chunk
    #[arg(short = 'c', long, env = "CHUNK_SIZE", default_value = "3")]
    pub chunk_size: NonZeroUsize,

    /// Delay before the first chunk in milliseconds
    #[arg(long, env = "STARTUP_DELAY_MS", default_value = "500")]
    pub startup_delay_ms: u64,

    /// Delay between chunks in milliseconds
    #[arg(short = 'd', long, env = "CHUNK_DELAY_MS", default_value = "50")]
    pub chunk_delay_ms: u64,

    /// Text file to stream instead of the built-in response
    #[arg(short, long, env = "PAYLOAD_FILE")]
    pub payload_file: Option<PathBuf>,

    /// Number of Tokio worker threads (0 = num_cpus)
    #[arg(short = 'w', long, env = "WORKERS", default_value = "0")]
    pub workers: usize,

    /// Seconds to wait for open streams on shutdown
    #[arg(long, default_value = "10")]
    pub shutdown_timeout_secs: u64,

    /// Log output format
    #[arg(long, value_enum, env = "LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Minimal logging output
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    pub fn worker_threads(&self) -> usize {
        if self.workers == 0 {
            num_cpus()
        } else {
            self.workers
        }
    }

    pub fn pacing(&self) -> Pacing {
        Pacing::new(
            Duration::from_millis(self.startup_delay_ms),
            Duration::from_millis(self.chunk_delay_ms),
        )
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Reject pacing that breaks the latency or throughput targets.
    pub fn validate(&self) -> Result<()> {
        let pacing = self.pacing();

        if pacing.startup_delay >= FIRST_TOKEN_CEILING {
            return Err(ServiceError::Config(format!(
                "startup delay {}ms must stay below {}ms",
                self.startup_delay_ms,
                FIRST_TOKEN_CEILING.as_millis()
            )));
        }

        if let Some(rate) = pacing.words_per_sec(self.chunk_size) {
            if rate <= MIN_WORDS_PER_SEC {
                return Err(ServiceError::Config(format!(
                    "{} words every {}ms is {:.1} words/s, need more than {}",
                    self.chunk_size, self.chunk_delay_ms, rate, MIN_WORDS_PER_SEC
                )));
            }
        }

        Ok(())
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["canned-stream-api"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.listen, "0.0.0.0:8000");
        assert_eq!(config.chunk_size.get(), 3);
        assert_eq!(config.pacing(), Pacing::default());
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.socket.is_none());
        assert!(config.payload_file.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let config = parse(&[
            "--listen",
            "127.0.0.1:9000",
            "--chunk-size",
            "5",
            "--chunk-delay-ms",
            "20",
            "--log-format",
            "json",
            "-w",
            "2",
        ]);
        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(config.chunk_size.get(), 5);
        assert_eq!(config.pacing().chunk_delay, Duration::from_millis(20));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.worker_threads(), 2);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let result = Config::try_parse_from(["canned-stream-api", "--chunk-size", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_startup_delay_ceiling() {
        let config = parse(&["--startup-delay-ms", "2426"]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("2426ms"));

        assert!(parse(&["--startup-delay-ms", "2425"]).validate().is_ok());
    }

    #[test]
    fn test_throughput_floor() {
        // 1 word per 40ms is exactly 25 words/s
        let config = parse(&["--chunk-size", "1", "--chunk-delay-ms", "40"]);
        assert!(matches!(config.validate(), Err(ServiceError::Config(_))));

        assert!(parse(&["--chunk-size", "1", "--chunk-delay-ms", "39"])
            .validate()
            .is_ok());
        assert!(parse(&["--chunk-delay-ms", "0"]).validate().is_ok());
    }

    #[test]
    fn test_worker_threads_auto() {
        assert!(parse(&[]).worker_threads() >= 1);
    }
}

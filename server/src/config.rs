//! Command line and environment configuration for the bot binary

use crate::distribution::UploadLimits;
use crate::fetch::RetryPolicy;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// IP address to bind the chat transport to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// UDP port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Base URL of the panel, e.g. https://panel.example.com
    #[arg(long, env = "PANEL_URL")]
    pub panel_url: String,

    /// Application API key (server listing, user lookups)
    #[arg(long, env = "PANEL_APPLICATION_KEY", hide_env_values = true)]
    pub application_key: String,

    /// Client API key (power actions)
    #[arg(long, env = "PANEL_CLIENT_KEY", hide_env_values = true)]
    pub client_key: String,

    /// Operator ids allowed to use the bot; repeat the flag or pass a comma list
    #[arg(long = "operator", env = "PANELBOT_OPERATORS", value_delimiter = ',')]
    pub operators: Vec<u64>,

    /// Volume root tried before the platform defaults
    #[arg(long, env = "PANELBOT_VOLUME_ROOT")]
    pub volume_root: Option<PathBuf>,

    /// Where the panel host blacklist is persisted
    #[arg(long, env = "PANELBOT_BLACKLIST_FILE", default_value = "blacklist.json")]
    pub blacklist_file: PathBuf,

    /// Largest accepted credential file, in KiB
    #[arg(long, default_value = "256", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_file_kib: u64,

    /// Pause between consecutive server restarts, in milliseconds
    #[arg(long, default_value = "2000")]
    pub restart_delay_ms: u64,

    /// Maximum number of connected consoles
    #[arg(long, default_value = "16")]
    pub max_links: usize,

    /// Seconds of silence before a console link is dropped
    #[arg(long, default_value = "120")]
    pub link_timeout_secs: u64,

    /// Attempts per panel read or download before giving up
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..))]
    pub retry_attempts: u32,

    /// Timeout for a single HTTP request, in seconds
    #[arg(long, default_value = "30")]
    pub request_timeout_secs: u64,
}

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub panel_url: String,
    pub application_key: String,
    pub client_key: String,
    pub operators: Vec<u64>,
    pub volume_root: Option<PathBuf>,
    pub blacklist_file: PathBuf,
    pub limits: UploadLimits,
    pub restart_delay: Duration,
    pub max_links: usize,
    pub link_timeout: Duration,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let mut operators = args.operators;
        operators.sort_unstable();
        operators.dedup();

        Self {
            bind_addr: format!("{}:{}", args.host, args.port),
            panel_url: args.panel_url,
            application_key: args.application_key,
            client_key: args.client_key,
            operators,
            volume_root: args.volume_root,
            blacklist_file: args.blacklist_file,
            limits: UploadLimits {
                max_file_bytes: args.max_file_kib.saturating_mul(1024),
            },
            restart_delay: Duration::from_millis(args.restart_delay_ms),
            max_links: args.max_links,
            link_timeout: Duration::from_secs(args.link_timeout_secs),
            retry: RetryPolicy::new(args.retry_attempts),
            request_timeout: Duration::from_secs(args.request_timeout_secs),
        }
    }
}

impl Config {
    pub fn from_args() -> Self {
        Args::parse().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 7] = [
        "panelbot",
        "--panel-url",
        "https://panel.example.com",
        "--application-key",
        "ptla_x",
        "--client-key",
        "ptlc_x",
    ];

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(REQUIRED).unwrap();
        let config = Config::from(args);

        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.limits.max_file_bytes, 256 * 1024);
        assert_eq!(config.restart_delay, Duration::from_millis(2000));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.blacklist_file, PathBuf::from("blacklist.json"));
        assert!(config.volume_root.is_none());
    }

    #[test]
    fn test_operator_list() {
        let mut argv = REQUIRED.to_vec();
        argv.extend(["--operator", "30,10", "--operator", "10"]);
        let config = Config::from(Args::try_parse_from(argv).unwrap());
        assert_eq!(config.operators, vec![10, 30]);
    }

    #[test]
    fn test_overrides() {
        let mut argv = REQUIRED.to_vec();
        argv.extend([
            "-H",
            "0.0.0.0",
            "-p",
            "9000",
            "--max-file-kib",
            "4",
            "--volume-root",
            "/data/volumes",
            "--restart-delay-ms",
            "0",
        ]);
        let config = Config::from(Args::try_parse_from(argv).unwrap());
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.limits.max_file_bytes, 4096);
        assert_eq!(config.volume_root, Some(PathBuf::from("/data/volumes")));
        assert!(config.restart_delay.is_zero());
    }

    #[test]
    fn test_rejects_zero_limits() {
        let mut argv = REQUIRED.to_vec();
        argv.extend(["--max-file-kib", "0"]);
        assert!(Args::try_parse_from(argv).is_err());

        let mut argv = REQUIRED.to_vec();
        argv.extend(["--retry-attempts", "0"]);
        assert!(Args::try_parse_from(argv).is_err());
    }
}

use crate::cli::{CliConfig, CliPlugin};
use clap::{Arg, ArgMatches, Command};

pub struct HttpCliPlugin;

impl HttpCliPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl CliPlugin for HttpCliPlugin {
    fn name(&self) -> &'static str {
        "http"
    }

    fn scopes(&self) -> &'static [&'static str] {
        &["add", "test", "streams", "play"]
    }

    fn augment_command(&self, cmd: Command) -> Command {
        cmd.arg(
            Arg::new("http_user_agent")
                .long("user-agent")
                .help_heading("HTTP")
                .help("User-Agent sent to addons and debrid services")
                .default_value("OrangeStreams/0.1")
                .num_args(1),
        )
        .arg(
            Arg::new("http_timeout_secs")
                .long("timeout-secs")
                .help_heading("HTTP")
                .help("Timeout for every request in seconds [default: 10 for manifests, 20 for streams]")
                .num_args(1),
        )
        .arg(
            Arg::new("http_retries")
                .long("retries")
                .help_heading("HTTP")
                .help("Manifest fetch retries for transient errors")
                .default_value("1")
                .num_args(1),
        )
        .arg(
            Arg::new("http_retry_backoff_ms")
                .long("retry-backoff-ms")
                .help_heading("HTTP")
                .help("Retry backoff base in milliseconds")
                .default_value("400")
                .num_args(1),
        )
    }

    fn apply_matches(&self, matches: &ArgMatches, cfg: &mut CliConfig) -> anyhow::Result<()> {
        if let Some(ua) = matches.get_one::<String>("http_user_agent") {
            cfg.http.user_agent = ua.clone();
        }
        if let Some(s) = matches.get_one::<String>("http_timeout_secs") {
            let secs: u64 = s.parse()?;
            cfg.http.manifest_timeout_secs = secs;
            cfg.http.stream_timeout_secs = secs;
        }
        if let Some(s) = matches.get_one::<String>("http_retries") {
            cfg.http.retries = s.parse()?;
        }
        if let Some(s) = matches.get_one::<String>("http_retry_backoff_ms") {
            cfg.http.retry_backoff_ms = s.parse()?;
        }
        Ok(())
    }
}

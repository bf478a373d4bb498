use crate::cli::{CliConfig, CliPlugin};
use crate::debrid::DebridService;
use clap::{Arg, ArgMatches, Command};

pub struct DebridCliPlugin;

impl DebridCliPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl CliPlugin for DebridCliPlugin {
    fn name(&self) -> &'static str {
        "debrid"
    }

    fn scopes(&self) -> &'static [&'static str] {
        &["play", "set"]
    }

    fn augment_command(&self, cmd: Command) -> Command {
        cmd.arg(
            Arg::new("debrid_service")
                .long("debrid-service")
                .help_heading("Debrid")
                .help("Debrid service: real-debrid, alldebrid, premiumize or none")
                .num_args(1),
        )
        .arg(
            Arg::new("debrid_key")
                .long("debrid-key")
                .help_heading("Debrid")
                .help("API key for the debrid service")
                .num_args(1),
        )
        .arg(
            Arg::new("debrid_poll_interval_ms")
                .long("poll-interval-ms")
                .help_heading("Debrid")
                .help("Delay between torrent status checks [default: 2000]")
                .num_args(1),
        )
        .arg(
            Arg::new("debrid_max_polls")
                .long("max-polls")
                .help_heading("Debrid")
                .help("Status checks before giving up [default: 30]")
                .num_args(1),
        )
    }

    fn apply_matches(&self, matches: &ArgMatches, cfg: &mut CliConfig) -> anyhow::Result<()> {
        if let Some(s) = matches.get_one::<String>("debrid_service") {
            let service = DebridService::parse(s).ok_or_else(|| anyhow::anyhow!("unknown debrid service: {}", s))?;
            cfg.debrid.service = Some(service);
        }
        if let Some(key) = matches.get_one::<String>("debrid_key") {
            cfg.debrid.api_key = Some(key.trim().to_string());
        }
        if let Some(s) = matches.get_one::<String>("debrid_poll_interval_ms") {
            cfg.debrid.poll_interval_ms = Some(s.parse()?);
        }
        if let Some(s) = matches.get_one::<String>("debrid_max_polls") {
            cfg.debrid.max_attempts = Some(s.parse()?);
        }
        Ok(())
    }
}

pub mod debrid;
pub mod http;

use crate::debrid::{DebridConfig, DebridService};
use crate::http::HttpContext;
use clap::{ArgMatches, Command};

/// Debrid settings given on the command line. They override the stored configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebridOverrides {
    pub service: Option<DebridService>,
    pub api_key: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub max_attempts: Option<u32>,
}

impl DebridOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, cfg: &mut DebridConfig) {
        if let Some(service) = self.service {
            cfg.service = service;
        }
        if let Some(key) = &self.api_key {
            cfg.api_key = key.clone();
        }
        if let Some(ms) = self.poll_interval_ms {
            cfg.poll_interval_ms = ms;
        }
        if let Some(n) = self.max_attempts {
            cfg.max_attempts = n;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub http: HttpContext,
    pub debrid: DebridOverrides,
}

/// A group of command-line flags that feeds one part of [`CliConfig`].
pub trait CliPlugin: Send + Sync {
    fn name(&self) -> &'static str;
    /// Leaf subcommands that accept this plugin's flags.
    fn scopes(&self) -> &'static [&'static str];
    fn augment_command(&self, cmd: Command) -> Command;
    fn apply_matches(&self, matches: &ArgMatches, cfg: &mut CliConfig) -> anyhow::Result<()>;
}

pub struct CliPlugins {
    plugins: Vec<Box<dyn CliPlugin>>,
}

impl CliPlugins {
    pub fn with_defaults() -> Self {
        Self {
            plugins: vec![
                Box::new(http::HttpCliPlugin::new()),
                Box::new(debrid::DebridCliPlugin::new()),
            ],
        }
    }

    fn scoped<'a>(&'a self, subcommand: &'a str) -> impl Iterator<Item = &'a dyn CliPlugin> + 'a {
        self.plugins
            .iter()
            .map(|p| p.as_ref())
            .filter(move |p| p.scopes().contains(&subcommand))
    }

    pub fn augment_command(&self, cmd: Command) -> Command {
        let name = cmd.get_name().to_string();
        self.scoped(&name).fold(cmd, |c, p| p.augment_command(c))
    }

    pub fn apply_matches(&self, subcommand: &str, matches: &ArgMatches, cfg: &mut CliConfig) -> anyhow::Result<()> {
        for p in self.scoped(subcommand) {
            p.apply_matches(matches, cfg)?;
        }
        Ok(())
    }
}

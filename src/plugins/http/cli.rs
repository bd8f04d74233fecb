use crate::plugins::registry::{CliPlugin, RunnerCliConfig};
use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

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

    fn augment_separate_command(&self, cmd: Command) -> Command {
        cmd.arg(
            Arg::new("http_user_agent")
                .long("user-agent")
                .help_heading("HTTP")
                .help("User-Agent sent when fetching the source audio")
                .default_value("stem-runner/0.1")
                .num_args(1),
        )
        .arg(
            Arg::new("http_fetch_timeout_secs")
                .long("fetch-timeout-secs")
                .help_heading("HTTP")
                .help("Timeout for downloading the source audio, in seconds")
                .default_value("300")
                .num_args(1),
        )
        .arg(
            Arg::new("http_notify_timeout_secs")
                .long("notify-timeout-secs")
                .help_heading("HTTP")
                .help("Timeout for a single webhook notification, in seconds")
                .default_value("10")
                .num_args(1),
        )
        .arg(
            Arg::new("http_notify_drain_secs")
                .long("notify-drain-secs")
                .help_heading("HTTP")
                .help("How long to keep posting queued notifications after the job ends, in seconds")
                .default_value("30")
                .num_args(1),
        )
    }

    fn apply_separate_matches(&self, matches: &ArgMatches, cfg: &mut RunnerCliConfig) -> anyhow::Result<()> {
        if let Some(ua) = matches.get_one::<String>("http_user_agent") {
            cfg.engine.driver_ctx.user_agent = ua.clone();
        }
        if let Some(s) = matches.get_one::<String>("http_fetch_timeout_secs") {
            cfg.engine.driver_ctx.timeout_secs = s.parse()?;
        }
        if let Some(s) = matches.get_one::<String>("http_notify_timeout_secs") {
            cfg.engine.delivery.timeout = Duration::from_secs(s.parse()?);
        }
        if let Some(s) = matches.get_one::<String>("http_notify_drain_secs") {
            cfg.engine.delivery.drain_timeout = Duration::from_secs(s.parse()?);
        }
        Ok(())
    }
}

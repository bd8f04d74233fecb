use crate::core::model::OutputFormat;
use crate::plugins::registry::{CliPlugin, RunnerCliConfig};
use clap::{Arg, ArgMatches, Command};

pub struct DemucsCliPlugin;

impl DemucsCliPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl CliPlugin for DemucsCliPlugin {
    fn name(&self) -> &'static str {
        "demucs"
    }

    fn augment_separate_command(&self, cmd: Command) -> Command {
        cmd.arg(
            Arg::new("demucs_python")
                .long("python")
                .help_heading("Demucs")
                .help("Python interpreter that has demucs installed")
                .default_value("python")
                .num_args(1),
        )
        .arg(
            Arg::new("demucs_device")
                .long("device")
                .help_heading("Demucs")
                .help("Torch device passed to demucs, e.g. cuda or cpu")
                .num_args(1),
        )
        .arg(
            Arg::new("demucs_format")
                .long("format")
                .help_heading("Demucs")
                .help("Stem file format")
                .value_parser(["mp3", "wav"])
                .default_value("mp3")
                .num_args(1),
        )
    }

    fn apply_separate_matches(&self, matches: &ArgMatches, cfg: &mut RunnerCliConfig) -> anyhow::Result<()> {
        if let Some(p) = matches.get_one::<String>("demucs_python") {
            cfg.engine.separator.python = p.clone();
        }
        cfg.engine.separator.device = matches.get_one::<String>("demucs_device").cloned();
        if let Some(f) = matches.get_one::<String>("demucs_format") {
            cfg.engine.output_format = OutputFormat::parse(f)?;
        }
        Ok(())
    }
}

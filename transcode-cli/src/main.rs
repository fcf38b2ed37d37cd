//! Transcode CLI - MP4 fast-start, inspection and conversion planning.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{CmdCompletions, CmdFastStart, CmdInfo, CmdPlan};

/// Command-line arguments for the transcode tool.
#[derive(Parser, Debug)]
#[command(name = "transcode")]
#[command(version)]
#[command(about = "MP4 packaging and conversion planning")]
#[command(long_about = "Transcode prepares MP4 files for progressive download and plans \n\
    preset conversions.\n\n\
    EXAMPLES:\n    \
    transcode faststart recording.mp4 web.mp4\n    \
    transcode info web.mp4 --json\n    \
    transcode plan --width 1920 --height 1080 --duration 95 --preset 720p")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Move the moov atom to the front of an MP4 file
    #[command(name = "faststart")]
    FastStart(CmdFastStart),
    /// Show the structure and tracks of an MP4 file
    Info(CmdInfo),
    /// Show output size and bitrate for the conversion presets
    Plan(CmdPlan),
    /// Generate shell completions
    Completions(CmdCompletions),
}

fn log_filter(verbose: u8) -> EnvFilter {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::FastStart(cmd) => cmd.run(),
        Commands::Info(cmd) => cmd.run(),
        Commands::Plan(cmd) => cmd.run(),
        Commands::Completions(cmd) => cmd.run::<Cli>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_faststart() {
        let cli = Cli::try_parse_from(["transcode", "-vv", "faststart", "in.mp4", "out.mp4"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::FastStart(cmd) => {
                assert_eq!(cmd.input.to_str(), Some("in.mp4"));
                assert_eq!(cmd.output.to_str(), Some("out.mp4"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_plan() {
        let cli = Cli::try_parse_from([
            "transcode", "plan", "--width", "1920", "--height", "1080", "--duration", "12.5", "--preset", "1080p-h265",
        ])
        .unwrap();
        let Commands::Plan(cmd) = cli.command else {
            panic!("expected plan");
        };
        assert_eq!(cmd.preset, Some(transcode::ConversionPreset::P1080H265));
        assert_eq!(cmd.duration, 12.5);
    }

    #[test]
    fn test_parse_rejects_unknown_preset() {
        assert!(Cli::try_parse_from(["transcode", "plan", "--width", "1", "--height", "1", "--duration", "1", "--preset", "4k"]).is_err());
    }
}

//! Fast-start packaging command.

use anyhow::Context;
use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;
use transcode::{fast_start, FastStartOutcome};

use super::format_size;

/// Move the `moov` atom ahead of the media data.
#[derive(Args, Debug)]
pub struct CmdFastStart {
    /// Source MP4 file.
    pub input: PathBuf,

    /// Destination file. Replaced if it exists.
    pub output: PathBuf,

    /// Only print errors.
    #[arg(short, long)]
    pub quiet: bool,
}

impl CmdFastStart {
    /// Execute the faststart command.
    pub fn run(&self) -> anyhow::Result<()> {
        if !self.input.exists() {
            anyhow::bail!("File not found: {}", self.input.display());
        }

        let spinner = (!self.quiet).then(|| {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::with_template("{spinner:.green} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.set_message(format!("Relocating moov in {}", self.input.display()));
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        });

        let started = Instant::now();
        let result = fast_start(&self.input, &self.output)
            .with_context(|| format!("fast-start of {} failed", self.input.display()));
        if let Some(pb) = &spinner {
            pb.finish_and_clear();
        }
        let outcome = result?;
        info!(?outcome, elapsed_ms = started.elapsed().as_millis() as u64, "fast-start done");

        if !self.quiet {
            println!("{}", describe(&outcome, &self.output));
        }
        Ok(())
    }
}

fn describe(outcome: &FastStartOutcome, output: &std::path::Path) -> String {
    match outcome {
        FastStartOutcome::AlreadyFastStart => format!(
            "{} {} (already streamable, copied)",
            style("✓").green(),
            output.display()
        ),
        FastStartOutcome::Relocated { moov_size } => format!(
            "{} {} (moov of {} moved to front)",
            style("✓").green(),
            output.display(),
            format_size(*moov_size)
        ),
    }
}

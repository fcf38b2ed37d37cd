//! Conversion planning command.

use clap::Args;
use console::style;
use transcode::{ConversionPlan, ConversionPreset};

use super::{format_duration, format_size};

/// Show what the presets would produce for a source.
#[derive(Args, Debug)]
pub struct CmdPlan {
    /// Source width in pixels.
    #[arg(long)]
    pub width: u32,

    /// Source height in pixels.
    #[arg(long)]
    pub height: u32,

    /// Length of the converted range in seconds.
    #[arg(long)]
    pub duration: f64,

    /// Plan a single preset (240p, 360p, 480p, 720p, 720p-h265, 1080p, 1080p-h265).
    #[arg(long)]
    pub preset: Option<ConversionPreset>,

    /// Output in JSON format.
    #[arg(long)]
    pub json: bool,
}

impl CmdPlan {
    /// Execute the plan command.
    pub fn run(&self) -> anyhow::Result<()> {
        let plans = self.plans()?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&plans)?);
            return Ok(());
        }

        println!();
        println!(
            "{} {}x{}, {}",
            style("Conversion Plan").cyan().bold(),
            self.width,
            self.height,
            format_duration(self.duration)
        );
        println!();
        println!(
            "{:<12} {:<6} {:<11} {:>10} {:>10} {:>12}",
            style("PRESET").white().bold(),
            style("CODEC").white().bold(),
            style("SIZE").white().bold(),
            style("VIDEO").white().bold(),
            style("AUDIO").white().bold(),
            style("ESTIMATE").white().bold()
        );
        println!("{}", style("-".repeat(66)).dim());
        for plan in &plans {
            println!(
                "{:<12} {:<6} {:<11} {:>10} {:>10} {:>12}",
                style(plan.preset).yellow(),
                plan.codec,
                format!("{}x{}", plan.width, plan.height),
                format!("{} kbps", plan.video_bitrate / 1000),
                format!("{} kbps", plan.audio_bitrate / 1000),
                format_size(plan.estimated_bytes)
            );
        }
        println!();
        Ok(())
    }

    fn plans(&self) -> anyhow::Result<Vec<ConversionPlan>> {
        if self.width == 0 || self.height == 0 {
            anyhow::bail!("Invalid source size {}x{}", self.width, self.height);
        }
        if !self.duration.is_finite() || self.duration < 0.0 {
            anyhow::bail!("Invalid duration {}", self.duration);
        }
        let duration_us = (self.duration * 1_000_000.0).round() as i64;
        let presets = match self.preset {
            Some(preset) => vec![preset],
            None => ConversionPreset::ALL.to_vec(),
        };
        Ok(presets
            .into_iter()
            .map(|preset| preset.plan(self.width, self.height, duration_us))
            .collect())
    }
}

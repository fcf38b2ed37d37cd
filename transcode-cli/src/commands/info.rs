//! MP4 inspection command.

use anyhow::Context;
use clap::Args;
use console::style;
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use transcode::Mp4Info;
use transcode_containers::mp4::TrackInfo;

use super::{format_duration, format_size};

/// Track summary for display.
#[derive(Debug, Clone, Serialize)]
pub struct TrackSummary {
    pub track_id: u32,
    #[serde(rename = "type")]
    pub kind: String,
    /// Sample entry fourcc.
    pub codec: String,
    pub duration_seconds: f64,
    pub samples: usize,
    pub chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_samples: Option<usize>,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<i32>,
    /// 64-bit chunk offsets in use.
    pub co64: bool,
}

impl From<&TrackInfo> for TrackSummary {
    fn from(track: &TrackInfo) -> Self {
        let video = track.is_video();
        Self {
            track_id: track.track_id,
            kind: match track.handler.as_str() {
                "vide" => "video".to_string(),
                "soun" => "audio".to_string(),
                other => other.to_string(),
            },
            codec: track.sample_entry.clone(),
            duration_seconds: track.duration_seconds(),
            samples: track.sample_count,
            chunks: track.chunk_count,
            sync_samples: track.sync_sample_count,
            language: track.language.clone(),
            width: video.then_some(track.width),
            height: video.then_some(track.height),
            rotation: track.rotation.filter(|r| *r != 0),
            co64: track.co64,
        }
    }
}

/// MP4 file information.
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub file: String,
    pub size_bytes: u64,
    pub major_brand: String,
    pub compatible_brands: Vec<String>,
    pub duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    /// `moov` precedes the media data.
    pub fast_start: bool,
    /// Top-level atoms as `type@offset+size`.
    pub atoms: Vec<String>,
    pub tracks: Vec<TrackSummary>,
}

impl FileSummary {
    fn new(file: String, size_bytes: u64, info: &Mp4Info) -> Self {
        let duration_seconds = info.duration_seconds();
        Self {
            file,
            size_bytes,
            major_brand: info.major_brand.clone(),
            compatible_brands: info.compatible_brands.clone(),
            duration_seconds,
            bitrate: (duration_seconds > 0.0).then(|| (size_bytes as f64 * 8.0 / duration_seconds) as u64),
            fast_start: info.is_fast_start(),
            atoms: info
                .atoms
                .iter()
                .map(|a| format!("{}@{}+{}", a.kind, a.offset, a.size))
                .collect(),
            tracks: info.tracks.iter().map(TrackSummary::from).collect(),
        }
    }
}

/// Inspect an MP4 file.
#[derive(Args, Debug)]
pub struct CmdInfo {
    /// Path to the MP4 file.
    pub file: PathBuf,

    /// Output in JSON format.
    #[arg(long)]
    pub json: bool,
}

impl CmdInfo {
    /// Execute the info command.
    pub fn run(&self) -> anyhow::Result<()> {
        let summary = self.summarize()?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            print_summary(&summary);
        }
        Ok(())
    }

    fn summarize(&self) -> anyhow::Result<FileSummary> {
        if !self.file.exists() {
            anyhow::bail!("File not found: {}", self.file.display());
        }
        let size_bytes = std::fs::metadata(&self.file)?.len();
        let file = File::open(&self.file).with_context(|| format!("cannot open {}", self.file.display()))?;
        let info = Mp4Info::read(&mut BufReader::new(file))
            .with_context(|| format!("{} is not a readable MP4 file", self.file.display()))?;
        Ok(FileSummary::new(self.file.display().to_string(), size_bytes, &info))
    }
}

fn print_summary(info: &FileSummary) {
    println!();
    println!("{}", style("MP4 Information").cyan().bold());
    println!();

    println!("  {:<16} {}", style("File:").white(), info.file);
    println!("  {:<16} {}", style("Size:").white(), format_size(info.size_bytes));
    println!(
        "  {:<16} {} ({})",
        style("Brand:").white(),
        info.major_brand,
        info.compatible_brands.join(", ")
    );
    println!("  {:<16} {}", style("Duration:").white(), format_duration(info.duration_seconds));
    if let Some(bitrate) = info.bitrate {
        println!("  {:<16} {:.0} kbps", style("Bitrate:").white(), bitrate as f64 / 1000.0);
    }
    let layout = if info.fast_start {
        style("fast-start").green()
    } else {
        style("moov at end").yellow()
    };
    println!("  {:<16} {}", style("Layout:").white(), layout);
    println!("  {:<16} {}", style("Atoms:").white(), info.atoms.join(" "));

    for track in &info.tracks {
        println!();
        println!(
            "  {} #{} ({})",
            style("Track").white(),
            track.track_id,
            style(&track.kind).yellow()
        );
        println!("    {:<14} {}", style("Codec:").dim(), track.codec);
        println!("    {:<14} {}", style("Duration:").dim(), format_duration(track.duration_seconds));
        println!("    {:<14} {} in {} chunks", style("Samples:").dim(), track.samples, track.chunks);
        if let Some(sync) = track.sync_samples {
            println!("    {:<14} {}", style("Key frames:").dim(), sync);
        }
        if let (Some(w), Some(h)) = (track.width, track.height) {
            println!("    {:<14} {}x{}", style("Resolution:").dim(), w, h);
        }
        if let Some(rotation) = track.rotation {
            println!("    {:<14} {}°", style("Rotation:").dim(), rotation);
        }
        println!("    {:<14} {}", style("Language:").dim(), track.language);
        if track.co64 {
            println!("    {:<14} 64-bit", style("Offsets:").dim());
        }
    }
    println!();
}

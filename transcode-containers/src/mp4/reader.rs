//! Read-back of an MP4 file's structure and sample tables.

use std::io::{Read, Seek, SeekFrom};

use super::atoms::{children, scan_top_level, FtypAtom, HdlrAtom, MdhdAtom, MvhdAtom, StblInfo, TkhdAtom};
use serde::Serialize;
use tracing::debug;
use transcode_core::error::{Error, Result};

/// One top-level atom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopLevelAtom {
    /// Atom type as text.
    pub kind: String,
    /// File offset of the atom header.
    pub offset: u64,
    /// Atom size including its header.
    pub size: u64,
}

/// Summary of one `trak`.
#[derive(Debug, Clone, Serialize)]
pub struct TrackInfo {
    pub track_id: u32,
    /// `vide`, `soun`, or whatever the `hdlr` says.
    pub handler: String,
    /// Sample entry fourcc (`avc1`, `hvc1`, `mp4a`).
    pub sample_entry: String,
    pub timescale: u32,
    /// Duration from `mdhd`, in the track timescale.
    pub duration: u64,
    /// Duration from `tkhd`, in the movie timescale.
    pub movie_duration: u64,
    pub language: String,
    pub width: u32,
    pub height: u32,
    /// Rotation decoded from the `tkhd` matrix.
    pub rotation: Option<i32>,
    pub sample_count: usize,
    pub chunk_count: usize,
    pub sync_sample_count: Option<usize>,
    pub co64: bool,
    #[serde(skip)]
    pub tables: StblInfo,
}

impl TrackInfo {
    /// Check if this is a video track.
    pub fn is_video(&self) -> bool {
        self.handler == "vide"
    }

    /// Check if this is an audio track.
    pub fn is_audio(&self) -> bool {
        self.handler == "soun"
    }

    /// Duration in seconds.
    pub fn duration_seconds(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        self.duration as f64 / self.timescale as f64
    }

    /// Sum of the `stts` deltas.
    pub fn stts_total(&self) -> u64 {
        self.tables
            .stts
            .iter()
            .fold(0u64, |total, &(count, delta)| {
                total.saturating_add(u64::from(count) * u64::from(delta))
            })
    }

    /// File offset and size of every sample, in decode order.
    ///
    /// Resolves `stsc` against the chunk offsets and sample sizes.
    pub fn sample_ranges(&self) -> Result<Vec<(u64, u32)>> {
        let t = &self.tables;
        let mut ranges = Vec::with_capacity(t.sample_sizes.len());
        let mut sample = 0usize;

        for (chunk_index, &chunk_offset) in t.chunk_offsets.iter().enumerate() {
            let chunk_number = chunk_index as u32 + 1;
            let per_chunk = t
                .stsc
                .iter()
                .rev()
                .find(|&&(first, _, _)| first <= chunk_number)
                .map(|&(_, count, _)| count)
                .ok_or_else(|| Error::malformed(format!("no stsc entry for chunk {}", chunk_number)))?;

            let mut offset = chunk_offset;
            for _ in 0..per_chunk {
                let size = *t.sample_sizes.get(sample).ok_or_else(|| {
                    Error::malformed(format!("chunk {} references missing sample {}", chunk_number, sample + 1))
                })?;
                ranges.push((offset, size));
                offset = offset.checked_add(u64::from(size)).ok_or_else(|| {
                    Error::malformed(format!("chunk {} runs past the end of a 64-bit file", chunk_number))
                })?;
                sample += 1;
            }
        }

        if sample != t.sample_sizes.len() {
            return Err(Error::malformed(format!(
                "stsc covers {} of {} samples",
                sample,
                t.sample_sizes.len()
            )));
        }
        Ok(ranges)
    }
}

/// Structure of an MP4 file.
#[derive(Debug, Clone, Serialize)]
pub struct Mp4Info {
    pub major_brand: String,
    pub compatible_brands: Vec<String>,
    pub atoms: Vec<TopLevelAtom>,
    /// Movie timescale from `mvhd`.
    pub timescale: u32,
    /// Movie duration from `mvhd`.
    pub duration: u64,
    pub next_track_id: u32,
    pub tracks: Vec<TrackInfo>,
}

impl Mp4Info {
    /// Parse the top-level layout, `mvhd` and every `trak`.
    pub fn read<R: Read + Seek + ?Sized>(reader: &mut R) -> Result<Self> {
        let headers = scan_top_level(reader)?;
        let file_len = headers.last().map_or(0, |h| h.end());

        let ftyp = headers
            .iter()
            .find(|h| &h.atom_type == b"ftyp")
            .ok_or_else(|| Error::malformed("no ftyp atom"))?;
        let ftyp = FtypAtom::parse(&read_payload(reader, ftyp.content_offset(), ftyp.content_size())?)?;

        let moov = headers
            .iter()
            .find(|h| &h.atom_type == b"moov")
            .ok_or_else(|| Error::malformed("no moov atom"))?;
        let moov = read_payload(reader, moov.content_offset(), moov.content_size())?;

        let mut mvhd = None;
        let mut tracks = Vec::new();
        for (atom_type, content) in children(&moov)? {
            match &atom_type {
                b"mvhd" => mvhd = Some(MvhdAtom::parse(content)?),
                b"trak" => tracks.push(parse_trak(content, file_len)?),
                _ => {}
            }
        }
        let mvhd = mvhd.ok_or_else(|| Error::malformed("moov has no mvhd"))?;

        debug!(tracks = tracks.len(), atoms = headers.len(), "MP4 structure read");

        Ok(Self {
            major_brand: fourcc_text(&ftyp.major_brand),
            compatible_brands: ftyp.compatible_brands.iter().map(fourcc_text).collect(),
            atoms: headers
                .iter()
                .map(|h| TopLevelAtom {
                    kind: h.type_name(),
                    offset: h.offset,
                    size: h.size,
                })
                .collect(),
            timescale: mvhd.timescale,
            duration: mvhd.duration,
            next_track_id: mvhd.next_track_id,
            tracks,
        })
    }

    /// Read from an in-memory file.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read(&mut std::io::Cursor::new(data))
    }

    /// Whether `moov` comes before the first `mdat`.
    pub fn is_fast_start(&self) -> bool {
        let moov = self.atoms.iter().position(|a| a.kind == "moov");
        let mdat = self.atoms.iter().position(|a| a.kind == "mdat");
        match (moov, mdat) {
            (Some(moov), Some(mdat)) => moov < mdat,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// First video track.
    pub fn video_track(&self) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| t.is_video())
    }

    /// First audio track.
    pub fn audio_track(&self) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| t.is_audio())
    }

    /// Movie duration in seconds.
    pub fn duration_seconds(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        self.duration as f64 / self.timescale as f64
    }
}

fn fourcc_text(fourcc: &[u8; 4]) -> String {
    String::from_utf8_lossy(fourcc).into_owned()
}

fn read_payload<R: Read + Seek + ?Sized>(reader: &mut R, offset: u64, size: u64) -> Result<Vec<u8>> {
    let size = usize::try_from(size).map_err(|_| Error::malformed("atom too large to load"))?;
    reader.seek(SeekFrom::Start(offset))?;
    let mut data = vec![0u8; size];
    reader.read_exact(&mut data)?;
    Ok(data)
}

/// Find the first child of `data` with type `fourcc`.
fn child<'a>(data: &'a [u8], fourcc: &[u8; 4]) -> Result<Option<&'a [u8]>> {
    Ok(children(data)?
        .into_iter()
        .find(|(t, _)| t == fourcc)
        .map(|(_, content)| content))
}

fn required<'a>(data: &'a [u8], fourcc: &[u8; 4]) -> Result<&'a [u8]> {
    child(data, fourcc)?.ok_or_else(|| Error::malformed(format!("missing {} atom", fourcc_text(fourcc))))
}

fn parse_trak(trak: &[u8], file_len: u64) -> Result<TrackInfo> {
    let tkhd = TkhdAtom::parse(required(trak, b"tkhd")?)?;
    let mdia = required(trak, b"mdia")?;
    let mdhd = MdhdAtom::parse(required(mdia, b"mdhd")?)?;
    let hdlr = HdlrAtom::parse(required(mdia, b"hdlr")?)?;
    let minf = required(mdia, b"minf")?;
    let tables = StblInfo::parse(required(minf, b"stbl")?, file_len)?;

    Ok(TrackInfo {
        track_id: tkhd.track_id,
        handler: fourcc_text(&hdlr.handler_type),
        sample_entry: tables.sample_entry.as_ref().map(fourcc_text).unwrap_or_default(),
        timescale: mdhd.timescale,
        duration: mdhd.duration,
        movie_duration: tkhd.duration,
        language: mdhd.language_code(),
        width: tkhd.width_pixels(),
        height: tkhd.height_pixels(),
        rotation: tkhd.rotation(),
        sample_count: tables.sample_sizes.len(),
        chunk_count: tables.chunk_offsets.len(),
        sync_sample_count: tables.stss.as_ref().map(Vec::len),
        co64: tables.co64,
        tables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::track::{Handler, TrackDescription};
    use crate::mp4::{make_box, Mp4Writer};
    use pretty_assertions::assert_eq;
    use transcode_core::error::ContainerError;
    use transcode_core::MediaSample;

    fn sound(timescale: u32) -> TrackDescription {
        TrackDescription {
            handler: Handler::Sound,
            timescale,
            language: "und".into(),
            sample_entry: make_box(b"mp4a", &[0u8; 28]),
            width: 0,
            height: 0,
            rotation: 0,
            track_id: None,
        }
    }

    #[test]
    fn test_reads_writer_output() {
        let mut writer = Mp4Writer::new(Vec::new(), vec![sound(48_000)]).unwrap();
        for i in 0..200u32 {
            let data = vec![i as u8; 10 + (i as usize % 7)];
            writer.accept_sample(0, MediaSample::new(data, 1024, true)).unwrap();
        }
        let out = writer.close().unwrap();

        let info = Mp4Info::from_bytes(&out).unwrap();
        assert_eq!(info.major_brand, "mp42");
        assert_eq!(info.compatible_brands, vec!["isom", "mp42"]);
        assert!(!info.is_fast_start());
        assert_eq!(info.timescale, 48_000);
        assert_eq!(info.duration, 200 * 1024);
        assert_eq!(info.next_track_id, 2);

        let track = info.audio_track().unwrap();
        assert_eq!(track.sample_entry, "mp4a");
        assert_eq!(track.language, "und");
        assert_eq!(track.sample_count, 200);
        assert_eq!(track.stts_total(), track.duration);
        assert_eq!(track.sync_sample_count, Some(200));

        for (i, (offset, size)) in track.sample_ranges().unwrap().into_iter().enumerate() {
            let start = offset as usize;
            assert_eq!(size as usize, 10 + i % 7);
            assert!(out[start..start + size as usize].iter().all(|&b| b == i as u8));
        }
    }

    #[test]
    fn test_missing_ftyp() {
        let moov = make_box(b"moov", &[]);
        assert!(Mp4Info::from_bytes(&moov).is_err());
    }

    fn ftyp() -> Vec<u8> {
        make_box(b"ftyp", b"mp42\0\0\0\0isommp42")
    }

    fn assert_malformed(data: &[u8]) {
        let result = Mp4Info::from_bytes(data);
        assert!(
            matches!(result, Err(Error::Container(ContainerError::Malformed(_)))),
            "expected a malformed-container error, got {:?}",
            result.map(|info| info.atoms)
        );
    }

    #[test]
    fn test_short_track_header_is_malformed() {
        let mut file = ftyp();
        file.extend(make_box(b"moov", &make_box(b"trak", &make_box(b"tkhd", &[0]))));
        assert_malformed(&file);
    }

    #[test]
    fn test_short_movie_header_is_malformed() {
        let mut file = ftyp();
        file.extend(make_box(b"moov", &make_box(b"mvhd", &[0, 0, 0])));
        assert_malformed(&file);

        let mut empty = ftyp();
        empty.extend(make_box(b"moov", &[]));
        assert_malformed(&empty);
    }

    #[test]
    fn test_missing_moov_is_malformed() {
        let mut file = ftyp();
        file.extend(make_box(b"mdat", &[1, 2, 3, 4]));
        assert_malformed(&file);
    }

    #[test]
    fn test_overrunning_mdat_is_malformed() {
        let mut file = ftyp();
        file.extend_from_slice(&100u32.to_be_bytes());
        file.extend_from_slice(b"mdat");
        assert_eq!(file.len(), 32);
        assert_malformed(&file);
    }

    #[test]
    fn test_oversized_uniform_stsz_is_malformed() {
        let mut writer = Mp4Writer::new(Vec::new(), vec![sound(48_000)]).unwrap();
        for _ in 0..4 {
            writer.accept_sample(0, MediaSample::new(vec![7; 16], 1024, true)).unwrap();
        }
        let mut out = writer.close().unwrap();

        // Rewrite stsz to a uniform size with a count no file could hold.
        let at = out.windows(4).position(|w| w == b"stsz").unwrap();
        out[at + 8..at + 12].copy_from_slice(&4096u32.to_be_bytes());
        out[at + 12..at + 16].copy_from_slice(&u32::MAX.to_be_bytes());
        assert_malformed(&out);
    }

    #[test]
    fn test_truncated_chunk_table_is_malformed() {
        let mut writer = Mp4Writer::new(Vec::new(), vec![sound(48_000)]).unwrap();
        writer.accept_sample(0, MediaSample::new(vec![7; 16], 1024, true)).unwrap();
        let mut out = writer.close().unwrap();

        let at = out.windows(4).position(|w| w == b"stco").unwrap();
        out[at + 8..at + 12].copy_from_slice(&1_000_000u32.to_be_bytes());
        assert_malformed(&out);
    }
}

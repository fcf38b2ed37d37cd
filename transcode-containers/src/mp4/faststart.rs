//! Fast-start packaging: move `moov` in front of `mdat` so playback can begin
//! before the whole file has arrived.
//!
//! The input is read as a flat list of top-level atoms. A file whose `moov`
//! already precedes its `mdat` is copied unchanged. Otherwise `moov` must be
//! the last atom; it is loaded, every `stco`/`co64` entry is shifted by the
//! size of `moov`, and the output is everything up to the end of `ftyp`
//! (padding atoms such as `free` or `wide` may precede it), the patched
//! `moov`, then the bytes between `ftyp` and the old `moov`.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::atoms::{scan_top_level, AtomHeader};
use super::{read_u32_be, read_u64_be, TOP_LEVEL_TYPES};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use transcode_core::error::{ContainerError, Error, Result};

/// What the packager did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastStartOutcome {
    /// `moov` already preceded `mdat`; the output is a copy of the input.
    AlreadyFastStart,
    /// `moov` was moved to the front and chunk offsets grew by `moov_size`.
    Relocated { moov_size: u64 },
}

enum Plan {
    Copy,
    Relocate { ftyp: AtomHeader, moov: AtomHeader },
}

fn is_top_level(atom_type: &[u8; 4]) -> bool {
    TOP_LEVEL_TYPES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(atom_type))
}

fn is_padding(atom_type: &[u8; 4]) -> bool {
    matches!(atom_type, b"free" | b"skip" | b"wide" | b"junk" | b"pnot" | b"PICT")
}

fn plan<R: Read + Seek + ?Sized>(reader: &mut R) -> Result<Plan> {
    let atoms = scan_top_level(reader)?;

    if let Some(bad) = atoms.iter().find(|a| !is_top_level(&a.atom_type)) {
        return Err(Error::malformed(format!(
            "unexpected top-level atom '{}' at offset {}",
            bad.type_name(),
            bad.offset
        )));
    }

    // Padding atoms may precede `ftyp`; media may not.
    let ftyp = match atoms.iter().find(|a| !is_padding(&a.atom_type)) {
        Some(first) if &first.atom_type == b"ftyp" => first.clone(),
        _ => return Err(Error::malformed("no ftyp atom ahead of the media")),
    };

    let mut moovs = atoms.iter().filter(|a| &a.atom_type == b"moov");
    let moov = moovs
        .next()
        .ok_or_else(|| Error::malformed("no moov atom"))?
        .clone();
    if moovs.next().is_some() {
        return Err(Error::malformed("more than one moov atom"));
    }

    let first_mdat = atoms.iter().find(|a| &a.atom_type == b"mdat");
    if first_mdat.map_or(true, |mdat| moov.offset < mdat.offset) {
        return Ok(Plan::Copy);
    }

    if atoms.last().map(|a| a.offset) != Some(moov.offset) {
        return Err(Error::malformed("moov is not the last atom"));
    }

    Ok(Plan::Relocate { ftyp, moov })
}

/// Add `delta` to every `stco`/`co64` entry of an in-memory `moov`.
///
/// The atom is scanned byte by byte for the two table type codes. Returns the
/// number of tables patched.
fn patch_chunk_offsets(moov: &mut [u8], delta: u64) -> Result<usize> {
    let len = moov.len();
    let mut patched = 0;
    let mut idx = 4;

    while idx + 4 < len {
        let kind_name: [u8; 4] = [moov[idx], moov[idx + 1], moov[idx + 2], moov[idx + 3]];
        let entry_size = match &kind_name {
            b"stco" => 4,
            b"co64" => 8,
            _ => {
                idx += 1;
                continue;
            }
        };

        let atom_start = idx - 4;
        let atom_size = read_u32_be(&moov[atom_start..idx])? as usize;
        let atom_end = atom_start
            .checked_add(atom_size)
            .filter(|&end| end <= len && atom_size >= 16)
            .ok_or_else(|| malformed_table(&kind_name, atom_start, "size out of range"))?;

        let count = read_u32_be(&moov[idx + 8..idx + 12])? as usize;
        let entries_start = idx + 12;
        let entries_end = count
            .checked_mul(entry_size)
            .and_then(|n| n.checked_add(entries_start))
            .filter(|&end| end <= atom_end)
            .ok_or_else(|| malformed_table(&kind_name, atom_start, "entries overrun the atom"))?;

        for entry in moov[entries_start..entries_end].chunks_exact_mut(entry_size) {
            if entry_size == 4 {
                let shifted = u64::from(read_u32_be(entry)?) + delta;
                let shifted = u32::try_from(shifted).map_err(|_| {
                    malformed_table(&kind_name, atom_start, &format!("offset {} does not fit in 32 bits", shifted))
                })?;
                entry.copy_from_slice(&shifted.to_be_bytes());
            } else {
                let shifted = read_u64_be(entry)?
                    .checked_add(delta)
                    .ok_or_else(|| malformed_table(&kind_name, atom_start, "offset overflows 64 bits"))?;
                entry.copy_from_slice(&shifted.to_be_bytes());
            }
        }

        patched += 1;
        idx = atom_end;
    }

    Ok(patched)
}

fn malformed_table(kind: &[u8], offset: usize, message: &str) -> Error {
    Error::malformed(format!(
        "{} at moov offset {}: {}",
        String::from_utf8_lossy(kind),
        offset,
        message
    ))
}

/// Write the fast-start form of `reader` to `writer`.
pub fn fast_start_stream<R, W>(reader: &mut R, writer: &mut W) -> Result<FastStartOutcome>
where
    R: Read + Seek + ?Sized,
    W: Write + ?Sized,
{
    match plan(reader)? {
        Plan::Copy => {
            debug!("moov precedes mdat, copying");
            reader.seek(SeekFrom::Start(0))?;
            io::copy(reader, writer)?;
            Ok(FastStartOutcome::AlreadyFastStart)
        }
        Plan::Relocate { ftyp, moov } => {
            let moov_len = usize::try_from(moov.size).map_err(|_| Error::malformed("moov too large to load"))?;
            let mut moov_data = vec![0u8; moov_len];
            reader.seek(SeekFrom::Start(moov.offset))?;
            reader.read_exact(&mut moov_data)?;

            let child = usize::from(moov.header_size);
            if moov_data.get(child + 4..child + 8) == Some(b"cmov".as_slice()) {
                return Err(ContainerError::CompressedMoovUnsupported.into());
            }

            let tables = patch_chunk_offsets(&mut moov_data, moov.size)?;
            debug!(tables, delta = moov.size, "chunk offsets patched");

            reader.seek(SeekFrom::Start(0))?;
            let head = io::copy(&mut (&mut *reader).take(ftyp.end()), writer)?;
            if head != ftyp.end() {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input shrank while copying").into());
            }
            writer.write_all(&moov_data)?;
            reader.seek(SeekFrom::Start(ftyp.end()))?;
            let copied = io::copy(&mut (&mut *reader).take(moov.offset - ftyp.end()), writer)?;
            if copied != moov.offset - ftyp.end() {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input shrank while copying").into());
            }

            Ok(FastStartOutcome::Relocated { moov_size: moov.size })
        }
    }
}

/// Fast-start an in-memory file.
pub fn fast_start_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    fast_start_stream(&mut Cursor::new(data), &mut out)?;
    Ok(out)
}

/// Fast-start `input` into `output`.
///
/// The result is written to a temporary file next to `output` and renamed
/// over it only on success, so `output` is never left half-written. `input`
/// and `output` may be the same path.
pub fn fast_start(input: &Path, output: &Path) -> Result<FastStartOutcome> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut reader = BufReader::new(File::open(input)?);
    let mut temp = NamedTempFile::new_in(dir)?;
    let outcome = {
        let mut writer = BufWriter::new(temp.as_file_mut());
        let outcome = fast_start_stream(&mut reader, &mut writer)?;
        writer.flush()?;
        outcome
    };
    temp.as_file().sync_all()?;
    drop(reader);
    temp.persist(output).map_err(|e| e.error)?;

    match outcome {
        FastStartOutcome::AlreadyFastStart => {
            info!(input = %input.display(), output = %output.display(), "already fast-start")
        }
        FastStartOutcome::Relocated { moov_size } => {
            info!(input = %input.display(), output = %output.display(), moov_size, "moov relocated")
        }
    }
    Ok(outcome)
}

/// Fast-start a file in place.
pub fn fast_start_in_place(path: &Path) -> Result<FastStartOutcome> {
    fast_start(path, path)
}

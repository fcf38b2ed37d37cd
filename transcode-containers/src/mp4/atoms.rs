//! MP4 atom (box) parsing and writing.

use super::{read_u32_be, read_u64_be, write_u32_be, write_u64_be, Mp4Brand};
use transcode_core::error::{Error, Result};
use std::io::{Read, Seek, SeekFrom, Write};

/// Atom header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomHeader {
    /// Atom type (4 bytes).
    pub atom_type: [u8; 4],
    /// Atom size (including header).
    pub size: u64,
    /// Header size (8 or 16 bytes).
    pub header_size: u8,
    /// Offset in file.
    pub offset: u64,
}

impl AtomHeader {
    /// Read atom header from reader.
    ///
    /// Returns `Ok(None)` at a clean end of input. A `size` of 1 selects the
    /// 64-bit `largesize` that follows the type; a `size` of 0 means the atom
    /// runs to the end of the input.
    pub fn read<R: Read + Seek + ?Sized>(reader: &mut R) -> Result<Option<Self>> {
        let offset = reader.stream_position()?;

        let mut header = [0u8; 8];
        match reader.read_exact(&mut header) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let atom_type = [header[4], header[5], header[6], header[7]];

        let (size, header_size) = if size == 1 {
            let mut ext_size = [0u8; 8];
            reader.read_exact(&mut ext_size).map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => Error::malformed(format!("truncated largesize at offset {}", offset)),
                _ => e.into(),
            })?;
            (u64::from_be_bytes(ext_size), 16)
        } else if size == 0 {
            let current = reader.stream_position()?;
            let end = reader.seek(SeekFrom::End(0))?;
            reader.seek(SeekFrom::Start(current))?;
            (end - offset, 8)
        } else {
            (size as u64, 8)
        };

        if size < header_size as u64 {
            return Err(Error::malformed(format!(
                "atom size {} at offset {} is smaller than its header",
                size, offset
            )));
        }
        if offset.checked_add(size).is_none() {
            return Err(Error::malformed(format!("atom size {} at offset {} overflows", size, offset)));
        }

        Ok(Some(Self {
            atom_type,
            size,
            header_size,
            offset,
        }))
    }

    /// Write atom header.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        if self.size > u32::MAX as u64 {
            writer.write_all(&[0, 0, 0, 1])?;
            writer.write_all(&self.atom_type)?;
            writer.write_all(&write_u64_be(self.size))?;
        } else {
            writer.write_all(&write_u32_be(self.size as u32))?;
            writer.write_all(&self.atom_type)?;
        }
        Ok(())
    }

    /// Get content size (size - header).
    pub fn content_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size as u64)
    }

    /// Get content offset.
    pub fn content_offset(&self) -> u64 {
        self.offset + self.header_size as u64
    }

    /// Offset one past the last byte of the atom. Saturates for headers not
    /// produced by [`AtomHeader::read`].
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }

    /// Atom type as text, for diagnostics.
    pub fn type_name(&self) -> String {
        String::from_utf8_lossy(&self.atom_type).into_owned()
    }
}

/// Read every top-level atom header, seeking over the payloads.
///
/// The reader is left at the end of the last atom.
pub fn scan_top_level<R: Read + Seek + ?Sized>(reader: &mut R) -> Result<Vec<AtomHeader>> {
    let len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(0))?;

    let mut atoms = Vec::new();
    let mut position = 0;
    while position < len {
        if len - position < 8 {
            return Err(Error::malformed(format!(
                "{} trailing bytes at offset {} are not an atom",
                len - position,
                position
            )));
        }
        let header = match AtomHeader::read(reader)? {
            Some(header) => header,
            None => break,
        };
        if header.end() > len {
            return Err(Error::malformed(format!(
                "{} atom of {} bytes at offset {} runs past end of file ({})",
                header.type_name(),
                header.size,
                header.offset,
                len
            )));
        }
        position = header.end();
        reader.seek(SeekFrom::Start(position))?;
        atoms.push(header);
    }
    Ok(atoms)
}

/// File type atom (ftyp).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtypAtom {
    /// Major brand.
    pub major_brand: [u8; 4],
    /// Minor version.
    pub minor_version: u32,
    /// Compatible brands.
    pub compatible_brands: Vec<[u8; 4]>,
}

impl FtypAtom {
    /// The `mp42` file type written by the streaming writer.
    pub fn mp42() -> Self {
        Self {
            major_brand: Mp4Brand::Mp42.to_bytes(),
            minor_version: 0,
            compatible_brands: vec![Mp4Brand::Isom.to_bytes(), Mp4Brand::Mp42.to_bytes()],
        }
    }

    /// Parse ftyp atom.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(Error::malformed("ftyp atom too short"));
        }

        let major_brand = [data[0], data[1], data[2], data[3]];
        let minor_version = read_u32_be(&data[4..8])?;

        let compatible_brands = data[8..]
            .chunks_exact(4)
            .map(|b| [b[0], b[1], b[2], b[3]])
            .collect();

        Ok(Self {
            major_brand,
            minor_version,
            compatible_brands,
        })
    }

    /// Size of the serialised atom.
    pub fn size(&self) -> u64 {
        (8 + 8 + self.compatible_brands.len() * 4) as u64
    }

    /// Write ftyp atom.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&write_u32_be(self.size() as u32))?;
        writer.write_all(b"ftyp")?;
        writer.write_all(&self.major_brand)?;
        writer.write_all(&write_u32_be(self.minor_version))?;

        for brand in &self.compatible_brands {
            writer.write_all(brand)?;
        }

        Ok(())
    }
}

/// Version byte of a full box, after checking the 4-byte version/flags
/// prefix is present.
fn full_box_version(data: &[u8], name: &str) -> Result<u8> {
    match data.get(..4) {
        Some(prefix) => Ok(prefix[0]),
        None => Err(Error::malformed(format!("{} atom of {} bytes has no version/flags", name, data.len()))),
    }
}

/// Big-endian u32 at `at`, if the payload is long enough.
fn u32_at(data: &[u8], at: usize) -> Option<u32> {
    data.get(at..at.checked_add(4)?).map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Movie header atom (mvhd).
#[derive(Debug, Clone)]
pub struct MvhdAtom {
    /// Version.
    pub version: u8,
    /// Timescale (units per second).
    pub timescale: u32,
    /// Duration.
    pub duration: u64,
    /// Next track ID.
    pub next_track_id: u32,
}

impl MvhdAtom {
    /// Parse mvhd atom.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let version = full_box_version(data, "mvhd")?;
        let (timescale, duration, offset) = if version == 1 {
            if data.len() < 32 {
                return Err(Error::malformed("mvhd v1 atom too short"));
            }
            (read_u32_be(&data[20..24])?, read_u64_be(&data[24..32])?, 32)
        } else {
            if data.len() < 20 {
                return Err(Error::malformed("mvhd v0 atom too short"));
            }
            (read_u32_be(&data[12..16])?, read_u32_be(&data[16..20])? as u64, 20)
        };

        // rate, volume, reserved, matrix, pre_defined
        let next_track_id = u32_at(data, offset + 76).unwrap_or(1);

        Ok(Self {
            version,
            timescale,
            duration,
            next_track_id,
        })
    }
}

/// Track header atom (tkhd).
#[derive(Debug, Clone)]
pub struct TkhdAtom {
    /// Version.
    pub version: u8,
    /// Flags.
    pub flags: u32,
    /// Track ID.
    pub track_id: u32,
    /// Duration in movie timescale units.
    pub duration: u64,
    /// Transformation matrix.
    pub matrix: [u32; 9],
    /// Width (fixed-point 16.16).
    pub width: u32,
    /// Height (fixed-point 16.16).
    pub height: u32,
}

impl TkhdAtom {
    /// Parse tkhd atom.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let version = full_box_version(data, "tkhd")?;
        let flags = read_u32_be(data)? & 0x00FF_FFFF;

        let (track_id, duration, offset) = if version == 1 {
            if data.len() < 36 {
                return Err(Error::malformed("tkhd v1 atom too short"));
            }
            (read_u32_be(&data[20..24])?, read_u64_be(&data[28..36])?, 36)
        } else {
            if data.len() < 24 {
                return Err(Error::malformed("tkhd v0 atom too short"));
            }
            (read_u32_be(&data[12..16])?, read_u32_be(&data[20..24])? as u64, 24)
        };

        // reserved(8) layer(2) alternate_group(2) volume(2) reserved(2)
        let matrix_offset = offset + 16;
        let mut matrix = [0u32; 9];
        let dim_offset = matrix_offset + 36;
        let (width, height) = match (u32_at(data, dim_offset), u32_at(data, dim_offset + 4)) {
            (Some(width), Some(height)) => {
                for (i, m) in matrix.iter_mut().enumerate() {
                    *m = u32_at(data, matrix_offset + i * 4).unwrap_or(0);
                }
                (width, height)
            }
            _ => (0, 0),
        };

        Ok(Self {
            version,
            flags,
            track_id,
            duration,
            matrix,
            width,
            height,
        })
    }

    /// Get width in pixels.
    pub fn width_pixels(&self) -> u32 {
        self.width >> 16
    }

    /// Get height in pixels.
    pub fn height_pixels(&self) -> u32 {
        self.height >> 16
    }

    /// Clockwise rotation in degrees encoded by the matrix, if it is one of
    /// the four right-angle rotations.
    pub fn rotation(&self) -> Option<i32> {
        [0, 90, 180, 270]
            .into_iter()
            .find(|&degrees| super::track::rotation_matrix(degrees) == self.matrix)
    }
}

/// Media header atom (mdhd).
#[derive(Debug, Clone)]
pub struct MdhdAtom {
    /// Version.
    pub version: u8,
    /// Timescale.
    pub timescale: u32,
    /// Duration.
    pub duration: u64,
    /// Packed ISO-639-2 language code.
    pub language: u16,
}

impl MdhdAtom {
    /// Parse mdhd atom.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let version = full_box_version(data, "mdhd")?;

        let (timescale, duration, lang_offset) = if version == 1 {
            if data.len() < 32 {
                return Err(Error::malformed("mdhd v1 atom too short"));
            }
            (read_u32_be(&data[20..24])?, read_u64_be(&data[24..32])?, 32)
        } else {
            if data.len() < 20 {
                return Err(Error::malformed("mdhd v0 atom too short"));
            }
            (read_u32_be(&data[12..16])?, read_u32_be(&data[16..20])? as u64, 20)
        };

        let language = data
            .get(lang_offset..lang_offset + 2)
            .map_or(0, |b| u16::from_be_bytes([b[0], b[1]]));

        Ok(Self {
            version,
            timescale,
            duration,
            language,
        })
    }

    /// Unpacked three-letter language code.
    pub fn language_code(&self) -> String {
        super::track::unpack_language(self.language)
    }
}

/// Handler reference atom (hdlr). Only the handler type is kept.
#[derive(Debug, Clone)]
pub struct HdlrAtom {
    pub handler_type: [u8; 4],
}

impl HdlrAtom {
    /// Parse hdlr atom.
    pub fn parse(data: &[u8]) -> Result<Self> {
        match data.get(8..12) {
            Some(t) => Ok(Self {
                handler_type: [t[0], t[1], t[2], t[3]],
            }),
            None => Err(Error::malformed("hdlr atom too short")),
        }
    }
}

/// Sample table box (stbl) contents.
#[derive(Debug, Clone, Default)]
pub struct StblInfo {
    /// Type of the first sample entry in `stsd`.
    pub sample_entry: Option<[u8; 4]>,
    /// Raw first sample entry (header included).
    pub sample_entry_data: Vec<u8>,
    /// Sample sizes.
    pub sample_sizes: Vec<u32>,
    /// Sample to chunk mapping (first_chunk, samples_per_chunk, description_index).
    pub stsc: Vec<(u32, u32, u32)>,
    /// Chunk offsets.
    pub chunk_offsets: Vec<u64>,
    /// Whether the offsets came from `co64`.
    pub co64: bool,
    /// Time to sample mapping (sample_count, sample_delta).
    pub stts: Vec<(u32, u32)>,
    /// Composition time offsets (sample_count, offset).
    pub ctts: Vec<(u32, i32)>,
    /// Sync samples, 1-based. `None` when the track has no `stss`.
    pub stss: Option<Vec<u32>>,
}

impl StblInfo {
    /// Parse the children of an `stbl` atom held in memory. `file_len` bounds
    /// the media a uniform-size `stsz` may claim.
    pub fn parse(data: &[u8], file_len: u64) -> Result<Self> {
        let mut info = StblInfo::default();

        for (atom_type, content) in children(data)? {
            match &atom_type {
                b"stsd" => {
                    if content.len() >= 16 {
                        let size = (read_u32_be(&content[8..12])? as usize).min(content.len() - 8);
                        info.sample_entry = Some([content[12], content[13], content[14], content[15]]);
                        info.sample_entry_data = content[8..8 + size].to_vec();
                    } else if !content.is_empty() {
                        return Err(Error::malformed("stsd atom too short"));
                    }
                }
                b"stsz" => info.sample_sizes = Self::parse_stsz(content, file_len)?,
                b"stsc" => {
                    info.stsc = table(content, 12, |e| {
                        Ok((read_u32_be(&e[0..4])?, read_u32_be(&e[4..8])?, read_u32_be(&e[8..12])?))
                    })?
                }
                b"stco" => info.chunk_offsets = table(content, 4, |e| Ok(read_u32_be(e)? as u64))?,
                b"co64" => {
                    info.chunk_offsets = table(content, 8, read_u64_be)?;
                    info.co64 = true;
                }
                b"stts" => {
                    info.stts = table(content, 8, |e| Ok((read_u32_be(&e[0..4])?, read_u32_be(&e[4..8])?)))?
                }
                b"ctts" => {
                    info.ctts = table(content, 8, |e| {
                        Ok((read_u32_be(&e[0..4])?, read_u32_be(&e[4..8])? as i32))
                    })?
                }
                b"stss" => info.stss = Some(table(content, 4, read_u32_be)?),
                _ => {}
            }
        }

        Ok(info)
    }

    fn parse_stsz(data: &[u8], file_len: u64) -> Result<Vec<u32>> {
        if data.len() < 12 {
            return Err(Error::malformed("stsz too short"));
        }

        let sample_size = read_u32_be(&data[4..8])?;
        let sample_count = read_u32_be(&data[8..12])? as usize;

        if sample_size != 0 {
            if sample_count as u64 * u64::from(sample_size) > file_len {
                return Err(Error::malformed(format!(
                    "stsz claims {} samples of {} bytes",
                    sample_count, sample_size
                )));
            }
            Ok(vec![sample_size; sample_count])
        } else {
            if (data.len() - 12) / 4 < sample_count {
                return Err(Error::malformed(format!(
                    "stsz lists {} of {} sample sizes",
                    (data.len() - 12) / 4,
                    sample_count
                )));
            }
            data[12..]
                .chunks_exact(4)
                .take(sample_count)
                .map(read_u32_be)
                .collect()
        }
    }
}

/// Split an in-memory atom payload into its child atoms.
pub(crate) fn children(data: &[u8]) -> Result<Vec<([u8; 4], &[u8])>> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    while offset < data.len() {
        let overrun = |what: &str| {
            Error::malformed(format!("{} at offset {} overruns its parent of {} bytes", what, offset, data.len()))
        };
        let rest = &data[offset..];
        if rest.len() < 8 {
            return Err(overrun("child header"));
        }
        let atom_type = [rest[4], rest[5], rest[6], rest[7]];
        let name = String::from_utf8_lossy(&atom_type).into_owned();
        let (size, header) = match read_u32_be(rest)? {
            1 => match rest.get(8..16) {
                Some(ext) => (read_u64_be(ext)?, 16u64),
                None => return Err(overrun(&name)),
            },
            0 => (rest.len() as u64, 8u64),
            s => (u64::from(s), 8u64),
        };
        if size < header || size > rest.len() as u64 {
            return Err(overrun(&name));
        }
        out.push((atom_type, &rest[header as usize..size as usize]));
        offset += size as usize;
    }
    Ok(out)
}

/// Parse a full-box table: version/flags, u32 entry count, fixed-size entries.
fn table<T>(data: &[u8], entry_size: usize, parse: impl Fn(&[u8]) -> Result<T>) -> Result<Vec<T>> {
    if data.len() < 8 {
        return Err(Error::malformed("sample table too short"));
    }
    let entry_count = read_u32_be(&data[4..8])? as usize;
    if (data.len() - 8) / entry_size < entry_count {
        return Err(Error::malformed(format!(
            "sample table lists {} entries but holds {}",
            entry_count,
            (data.len() - 8) / entry_size
        )));
    }
    data[8..]
        .chunks_exact(entry_size)
        .take(entry_count)
        .map(parse)
        .collect()
}

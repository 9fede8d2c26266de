//! PNG codec.
//!
//! Strict chunk-based state machine: signature, IHDR, optional PLTE/tRNS,
//! consecutive IDAT chunks, IEND. Every chunk CRC is verified. Bit depth 8
//! is supported for color types 0, 2, 3, 4 and 6; other depths and Adam7
//! interlacing are reported as unsupported rather than mis-decoded.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::buffer::{Image, ImageBuffer};
use crate::codecs::{ByteReader, ImageDecoder, ImageEncoder};
use crate::error::{Error, Result};
use crate::format::{ImageFormat, PNG_SIGNATURE};
use crate::pixel::{ColorType, Pixel, Rgba, L, La, Rgb};

const COLOR_GREYSCALE: u8 = 0;
const COLOR_RGB: u8 = 2;
const COLOR_PALETTE: u8 = 3;
const COLOR_GREY_ALPHA: u8 = 4;
const COLOR_RGBA: u8 = 6;

const FILTER_NONE: u8 = 0;
const FILTER_SUB: u8 = 1;
const FILTER_UP: u8 = 2;
const FILTER_AVERAGE: u8 = 3;
const FILTER_PAETH: u8 = 4;

/// PNG decoder/encoder
pub struct PngCodec;

#[derive(Debug, Clone, Copy)]
struct Ihdr {
    width: u32,
    height: u32,
    bit_depth: u8,
    color_type: u8,
}

impl Ihdr {
    fn channels(self) -> usize {
        match self.color_type {
            COLOR_GREYSCALE | COLOR_PALETTE => 1,
            COLOR_GREY_ALPHA => 2,
            COLOR_RGB => 3,
            COLOR_RGBA => 4,
            _ => unreachable!("validated at parse time"),
        }
    }
}

struct Chunk<'a> {
    kind: [u8; 4],
    data: &'a [u8],
}

fn section_for(kind: [u8; 4]) -> &'static str {
    match &kind {
        b"IHDR" => "IHDR",
        b"PLTE" => "PLTE",
        b"tRNS" => "tRNS",
        b"IDAT" => "IDAT",
        b"IEND" => "IEND",
        _ => "PNG chunk",
    }
}

fn read_chunk<'a>(reader: &mut ByteReader<'a>) -> Result<Chunk<'a>> {
    reader.set_section("PNG chunk");
    let length = reader.read_u32_be()?;
    let kind: [u8; 4] = reader.read_slice(4)?.try_into().unwrap();
    let section = section_for(kind);
    reader.set_section(section);
    if length > 0x7FFF_FFFF {
        return Err(Error::corrupt(section, format!("chunk length {length} exceeds 2^31-1")));
    }
    let data = reader.read_slice(length as usize)?;
    let declared_crc = reader.read_u32_be()?;
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&kind);
    hasher.update(data);
    let actual_crc = hasher.finalize();
    if actual_crc != declared_crc {
        return Err(Error::corrupt(
            section,
            format!("CRC mismatch: declared {declared_crc:08X}, computed {actual_crc:08X}"),
        ));
    }
    Ok(Chunk { kind, data })
}

fn parse_ihdr(chunk: &Chunk<'_>) -> Result<Ihdr> {
    if chunk.data.len() != 13 {
        return Err(Error::corrupt("IHDR", format!("length {} != 13", chunk.data.len())));
    }
    let mut r = ByteReader::new(chunk.data);
    r.set_section("IHDR");
    let width = r.read_u32_be()?;
    let height = r.read_u32_be()?;
    let bit_depth = r.read_u8()?;
    let color_type = r.read_u8()?;
    let compression = r.read_u8()?;
    let filter = r.read_u8()?;
    let interlace = r.read_u8()?;

    if width == 0 || height == 0 || width > crate::MAX_DIMENSION || height > crate::MAX_DIMENSION {
        return Err(Error::InvalidDimensions { width, height });
    }
    if !matches!(
        color_type,
        COLOR_GREYSCALE | COLOR_RGB | COLOR_PALETTE | COLOR_GREY_ALPHA | COLOR_RGBA
    ) {
        return Err(Error::corrupt("IHDR", format!("invalid color type {color_type}")));
    }
    if compression != 0 {
        return Err(Error::corrupt("IHDR", format!("invalid compression method {compression}")));
    }
    if filter != 0 {
        return Err(Error::corrupt("IHDR", format!("invalid filter method {filter}")));
    }
    match interlace {
        0 => {}
        1 => {
            return Err(Error::unsupported(ImageFormat::Png, "Adam7 interlacing"));
        }
        other => {
            return Err(Error::corrupt("IHDR", format!("invalid interlace method {other}")));
        }
    }
    if bit_depth != 8 {
        return Err(Error::unsupported(
            ImageFormat::Png,
            format!("bit depth {bit_depth}"),
        ));
    }
    Ok(Ihdr {
        width,
        height,
        bit_depth,
        color_type,
    })
}

impl ImageDecoder for PngCodec {
    fn format(&self) -> ImageFormat {
        ImageFormat::Png
    }

    fn decode(&self, data: &[u8]) -> Result<Image> {
        let mut reader = ByteReader::new(data);
        reader.set_section("PNG signature");
        reader.expect(PNG_SIGNATURE)?;

        let first = read_chunk(&mut reader)?;
        if &first.kind != b"IHDR" {
            return Err(Error::corrupt(
                "IHDR",
                format!("first chunk is {:?}, expected IHDR", String::from_utf8_lossy(&first.kind)),
            ));
        }
        let header = parse_ihdr(&first)?;
        log::debug!(
            "PNG {}x{}, color type {}, bit depth {}",
            header.width,
            header.height,
            header.color_type,
            header.bit_depth
        );

        let mut palette: Option<Vec<Rgb>> = None;
        let mut trns: Option<Vec<u8>> = None;
        let mut idat: Vec<u8> = Vec::new();
        let mut idat_done = false;

        loop {
            let chunk = read_chunk(&mut reader)?;
            match &chunk.kind {
                b"IHDR" => {
                    return Err(Error::corrupt("IHDR", "duplicate IHDR chunk"));
                }
                b"PLTE" => {
                    if palette.is_some() {
                        return Err(Error::corrupt("PLTE", "duplicate PLTE chunk"));
                    }
                    if !idat.is_empty() {
                        return Err(Error::corrupt("PLTE", "PLTE after IDAT"));
                    }
                    if chunk.data.is_empty() || chunk.data.len() % 3 != 0 || chunk.data.len() > 256 * 3 {
                        return Err(Error::corrupt(
                            "PLTE",
                            format!("invalid palette length {}", chunk.data.len()),
                        ));
                    }
                    palette = Some(
                        chunk
                            .data
                            .chunks_exact(3)
                            .map(|c| Rgb::new(c[0], c[1], c[2]))
                            .collect(),
                    );
                }
                b"tRNS" => {
                    if !idat.is_empty() {
                        return Err(Error::corrupt("tRNS", "tRNS after IDAT"));
                    }
                    if header.color_type == COLOR_PALETTE {
                        if chunk.data.len() > 256 {
                            return Err(Error::corrupt(
                                "tRNS",
                                format!("invalid transparency length {}", chunk.data.len()),
                            ));
                        }
                        trns = Some(chunk.data.to_vec());
                    }
                    // Full-color transparency keys are ancillary; skipped.
                }
                b"IDAT" => {
                    if idat_done {
                        return Err(Error::corrupt("IDAT", "IDAT chunks are not consecutive"));
                    }
                    idat.extend_from_slice(chunk.data);
                }
                b"IEND" => {
                    if !chunk.data.is_empty() {
                        return Err(Error::corrupt("IEND", "IEND carries data"));
                    }
                    // Trailing garbage after IEND is tolerated.
                    break;
                }
                kind => {
                    if !idat.is_empty() {
                        idat_done = true;
                    }
                    let critical = kind[0].is_ascii_uppercase();
                    if critical {
                        return Err(Error::unsupported(
                            ImageFormat::Png,
                            format!("critical chunk {:?}", String::from_utf8_lossy(kind)),
                        ));
                    }
                    // Ancillary chunk; skipped.
                }
            }
        }

        if idat.is_empty() {
            return Err(Error::corrupt("IDAT", "no image data"));
        }

        let channels = header.channels();
        let stride = header.width as usize * channels;
        let expected = header.height as usize * (stride + 1);

        // `expected` is header-claimed; the buffer grows from real data only
        let mut raw = Vec::new();
        let mut inflater = ZlibDecoder::new(idat.as_slice());
        inflater
            .read_to_end(&mut raw)
            .map_err(|e| Error::corrupt("IDAT", format!("zlib stream: {e}")))?;
        if raw.len() != expected {
            return Err(Error::corrupt(
                "IDAT",
                format!("decompressed {} bytes, expected {expected}", raw.len()),
            ));
        }

        unfilter(&mut raw, stride, channels)?;

        // Scanlines are now raw; `raw` holds height rows of
        // `1 + stride` bytes each with the leading filter byte dead.
        let rows = raw
            .chunks_exact(stride + 1)
            .map(|row| &row[1..]);

        to_image(header, rows, palette.as_deref(), trns.as_deref())
    }
}

fn unfilter(raw: &mut [u8], stride: usize, bpp: usize) -> Result<()> {
    let row_len = stride + 1;
    for row_start in (0..raw.len()).step_by(row_len) {
        let filter = raw[row_start];
        for i in 0..stride {
            let pos = row_start + 1 + i;
            let left = if i >= bpp { raw[pos - bpp] } else { 0 };
            let up = if row_start > 0 { raw[pos - row_len] } else { 0 };
            let up_left = if row_start > 0 && i >= bpp {
                raw[pos - row_len - bpp]
            } else {
                0
            };
            let reconstructed = match filter {
                FILTER_NONE => raw[pos],
                FILTER_SUB => raw[pos].wrapping_add(left),
                FILTER_UP => raw[pos].wrapping_add(up),
                FILTER_AVERAGE => {
                    raw[pos].wrapping_add(((u16::from(left) + u16::from(up)) / 2) as u8)
                }
                FILTER_PAETH => raw[pos].wrapping_add(paeth(left, up, up_left)),
                other => {
                    return Err(Error::corrupt("IDAT", format!("unknown filter type {other}")));
                }
            };
            raw[pos] = reconstructed;
        }
    }
    Ok(())
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

fn to_image<'a>(
    header: Ihdr,
    rows: impl Iterator<Item = &'a [u8]>,
    palette: Option<&[Rgb]>,
    trns: Option<&[u8]>,
) -> Result<Image> {
    let len = header.width as usize * header.height as usize;
    match header.color_type {
        COLOR_GREYSCALE => {
            let mut pixels = Vec::with_capacity(len);
            for row in rows {
                pixels.extend(row.iter().map(|&l| L(l)));
            }
            Ok(ImageBuffer::from_pixels(header.width, pixels)?.into())
        }
        COLOR_GREY_ALPHA => {
            let mut pixels = Vec::with_capacity(len);
            for row in rows {
                pixels.extend(row.chunks_exact(2).map(La::read_bytes));
            }
            Ok(ImageBuffer::from_pixels(header.width, pixels)?.into())
        }
        COLOR_RGB => {
            let mut pixels = Vec::with_capacity(len);
            for row in rows {
                pixels.extend(row.chunks_exact(3).map(Rgb::read_bytes));
            }
            Ok(ImageBuffer::from_pixels(header.width, pixels)?.into())
        }
        COLOR_RGBA => {
            let mut pixels = Vec::with_capacity(len);
            for row in rows {
                pixels.extend(row.chunks_exact(4).map(Rgba::read_bytes));
            }
            Ok(ImageBuffer::from_pixels(header.width, pixels)?.into())
        }
        COLOR_PALETTE => {
            let palette = palette.ok_or_else(|| Error::corrupt("PLTE", "missing palette"))?;
            let lookup = |index: u8| -> Result<Rgb> {
                palette.get(index as usize).copied().ok_or_else(|| {
                    Error::corrupt("IDAT", format!("palette index {index} out of range"))
                })
            };
            if let Some(trns) = trns {
                let mut pixels = Vec::with_capacity(len);
                for row in rows {
                    for &index in row {
                        let rgb = lookup(index)?;
                        let alpha = trns.get(index as usize).copied().unwrap_or(255);
                        pixels.push(Rgba::new(rgb.r, rgb.g, rgb.b, alpha));
                    }
                }
                Ok(ImageBuffer::from_pixels(header.width, pixels)?.into())
            } else {
                let mut pixels = Vec::with_capacity(len);
                for row in rows {
                    for &index in row {
                        pixels.push(lookup(index)?);
                    }
                }
                Ok(ImageBuffer::from_pixels(header.width, pixels)?.into())
            }
        }
        _ => unreachable!("validated at parse time"),
    }
}

fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(kind);
    hasher.update(data);
    out.extend_from_slice(&hasher.finalize().to_be_bytes());
}

impl ImageEncoder for PngCodec {
    fn format(&self) -> ImageFormat {
        ImageFormat::Png
    }

    fn encode(&self, image: &Image, out: &mut Vec<u8>) -> Result<()> {
        let (width, height) = image.dimensions();
        let color_type = match image.color_type() {
            ColorType::L => COLOR_GREYSCALE,
            ColorType::La => COLOR_GREY_ALPHA,
            ColorType::Rgb => COLOR_RGB,
            ColorType::Rgba => COLOR_RGBA,
        };
        let channels = image.color_type().channels();

        out.extend_from_slice(PNG_SIGNATURE);

        let mut ihdr = Vec::with_capacity(13);
        ihdr.extend_from_slice(&width.to_be_bytes());
        ihdr.extend_from_slice(&height.to_be_bytes());
        ihdr.extend_from_slice(&[8, color_type, 0, 0, 0]);
        write_chunk(out, b"IHDR", &ihdr);

        // Filter type 0 on every scanline; simple and always valid.
        let bytes = image.as_bytes();
        let stride = width as usize * channels;
        let mut encoder = ZlibEncoder::new(
            Vec::with_capacity(bytes.len() / 2),
            Compression::default(),
        );
        for row in bytes.chunks_exact(stride) {
            let written = encoder
                .write_all(&[FILTER_NONE])
                .and_then(|()| encoder.write_all(row));
            written.map_err(|e| Error::EncodingError(format!("zlib: {e}")))?;
        }
        let idat = encoder
            .finish()
            .map_err(|e| Error::EncodingError(format!("zlib: {e}")))?;
        write_chunk(out, b"IDAT", &idat);
        write_chunk(out, b"IEND", &[]);
        Ok(())
    }
}

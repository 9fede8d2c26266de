//! BMP codec.
//!
//! BITMAPINFOHEADER files only: uncompressed (BI_RGB) 8-bit paletted,
//! 24-bit BGR and 32-bit BGRA pixel data, bottom-up or top-down. The
//! encoder writes 8-bit greyscale-palette, 24-bit or 32-bit BI_RGB
//! depending on the source encoding, so lossless round-trips hold for
//! every encoding this crate defines.

use crate::buffer::{Image, ImageBuffer};
use crate::codecs::{ByteReader, ImageDecoder, ImageEncoder};
use crate::error::{Error, Result};
use crate::format::{ImageFormat, BMP_SIGNATURE};
use crate::pixel::{ColorType, Rgba, L, Rgb};

const FILE_HEADER_SIZE: u32 = 14;
const INFO_HEADER_SIZE: u32 = 40;

const BI_RGB: u32 = 0;

/// BMP decoder/encoder
pub struct BmpCodec;

struct BmpHeader {
    width: u32,
    height: u32,
    top_down: bool,
    bits_per_pixel: u16,
    palette: Vec<Rgb>,
    pixel_offset: usize,
}

fn parse_header(reader: &mut ByteReader<'_>) -> Result<BmpHeader> {
    reader.set_section("BMP file header");
    reader.expect(BMP_SIGNATURE)?;
    let _file_size = reader.read_u32_le()?;
    reader.skip(4)?; // reserved
    let pixel_offset = reader.read_u32_le()? as usize;

    reader.set_section("BMP info header");
    let header_size = reader.read_u32_le()?;
    if header_size < INFO_HEADER_SIZE {
        return Err(Error::unsupported(
            ImageFormat::Bmp,
            format!("DIB header size {header_size}"),
        ));
    }
    let raw_width = reader.read_i32_le()?;
    let raw_height = reader.read_i32_le()?;
    let planes = reader.read_u16_le()?;
    let bits_per_pixel = reader.read_u16_le()?;
    let compression = reader.read_u32_le()?;
    let _image_size = reader.read_u32_le()?;
    reader.skip(8)?; // pixels-per-metre resolutions
    let colors_used = reader.read_u32_le()?;
    let _colors_important = reader.read_u32_le()?;
    // Skip any BITMAPV4/V5 extension fields.
    reader.skip(header_size as usize - INFO_HEADER_SIZE as usize)?;

    if planes != 1 {
        return Err(Error::corrupt("BMP info header", format!("{planes} color planes")));
    }
    if compression != BI_RGB {
        return Err(Error::unsupported(
            ImageFormat::Bmp,
            format!("compression method {compression}"),
        ));
    }
    if raw_width <= 0 || raw_height == 0 || raw_height == i32::MIN {
        return Err(Error::InvalidDimensions {
            width: raw_width.max(0) as u32,
            height: raw_height.unsigned_abs(),
        });
    }
    let top_down = raw_height < 0;
    let width = raw_width as u32;
    let height = raw_height.unsigned_abs();
    if width > crate::MAX_DIMENSION || height > crate::MAX_DIMENSION {
        return Err(Error::InvalidDimensions { width, height });
    }

    let palette = match bits_per_pixel {
        8 => {
            reader.set_section("BMP palette");
            let entries = if colors_used == 0 { 256 } else { colors_used };
            if entries > 256 {
                return Err(Error::corrupt(
                    "BMP palette",
                    format!("{entries} palette entries"),
                ));
            }
            let mut palette = Vec::with_capacity(entries as usize);
            for _ in 0..entries {
                let quad = reader.read_slice(4)?;
                palette.push(Rgb::new(quad[2], quad[1], quad[0]));
            }
            palette
        }
        24 | 32 => Vec::new(),
        other => {
            return Err(Error::unsupported(
                ImageFormat::Bmp,
                format!("{other} bits per pixel"),
            ));
        }
    };

    Ok(BmpHeader {
        width,
        height,
        top_down,
        bits_per_pixel,
        palette,
        pixel_offset,
    })
}

fn row_stride(width: u32, bits_per_pixel: u16) -> usize {
    (width as usize * bits_per_pixel as usize).div_ceil(8).div_ceil(4) * 4
}

/// True for the identity greyscale ramp our encoder writes for L images
fn is_greyscale_ramp(palette: &[Rgb]) -> bool {
    palette.len() == 256
        && palette
            .iter()
            .enumerate()
            .all(|(i, c)| c.r == i as u8 && c.g == i as u8 && c.b == i as u8)
}

impl ImageDecoder for BmpCodec {
    fn format(&self) -> ImageFormat {
        ImageFormat::Bmp
    }

    fn decode(&self, data: &[u8]) -> Result<Image> {
        let mut reader = ByteReader::new(data);
        let header = parse_header(&mut reader)?;

        if header.pixel_offset < reader.position() || header.pixel_offset > data.len() {
            return Err(Error::corrupt(
                "BMP file header",
                format!("pixel data offset {}", header.pixel_offset),
            ));
        }

        let stride = row_stride(header.width, header.bits_per_pixel);
        let mut rows = ByteReader::new(&data[header.pixel_offset..]);
        rows.set_section("BMP pixel data");

        let mut scanlines = Vec::with_capacity(header.height as usize);
        for _ in 0..header.height {
            scanlines.push(rows.read_slice(stride)?);
        }
        if !header.top_down {
            scanlines.reverse();
        }

        let len = header.width as usize * header.height as usize;
        match header.bits_per_pixel {
            8 => {
                if is_greyscale_ramp(&header.palette) {
                    let mut pixels = Vec::with_capacity(len);
                    for row in scanlines {
                        pixels.extend(row[..header.width as usize].iter().map(|&l| L(l)));
                    }
                    Ok(ImageBuffer::from_pixels(header.width, pixels)?.into())
                } else {
                    let mut pixels = Vec::with_capacity(len);
                    for row in scanlines {
                        for &index in &row[..header.width as usize] {
                            let color =
                                header.palette.get(index as usize).copied().ok_or_else(|| {
                                    Error::corrupt(
                                        "BMP pixel data",
                                        format!("palette index {index} out of range"),
                                    )
                                })?;
                            pixels.push(color);
                        }
                    }
                    Ok(ImageBuffer::from_pixels(header.width, pixels)?.into())
                }
            }
            24 => {
                let mut pixels = Vec::with_capacity(len);
                for row in scanlines {
                    pixels.extend(
                        row[..header.width as usize * 3]
                            .chunks_exact(3)
                            .map(|bgr| Rgb::new(bgr[2], bgr[1], bgr[0])),
                    );
                }
                Ok(ImageBuffer::from_pixels(header.width, pixels)?.into())
            }
            32 => {
                let mut pixels = Vec::with_capacity(len);
                for row in scanlines {
                    pixels.extend(
                        row[..header.width as usize * 4]
                            .chunks_exact(4)
                            .map(|bgra| Rgba::new(bgra[2], bgra[1], bgra[0], bgra[3])),
                    );
                }
                Ok(ImageBuffer::from_pixels(header.width, pixels)?.into())
            }
            _ => unreachable!("validated at parse time"),
        }
    }
}

fn write_headers(
    out: &mut Vec<u8>,
    width: u32,
    height: u32,
    bits_per_pixel: u16,
    palette_entries: u32,
) {
    let stride = row_stride(width, bits_per_pixel);
    let pixel_offset = FILE_HEADER_SIZE + INFO_HEADER_SIZE + palette_entries * 4;
    let file_size = pixel_offset + (stride * height as usize) as u32;

    out.extend_from_slice(BMP_SIGNATURE);
    out.extend_from_slice(&file_size.to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&pixel_offset.to_le_bytes());

    out.extend_from_slice(&INFO_HEADER_SIZE.to_le_bytes());
    out.extend_from_slice(&(width as i32).to_le_bytes());
    out.extend_from_slice(&(height as i32).to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&bits_per_pixel.to_le_bytes());
    out.extend_from_slice(&BI_RGB.to_le_bytes());
    out.extend_from_slice(&((stride * height as usize) as u32).to_le_bytes());
    out.extend_from_slice(&[0; 8]); // resolutions
    out.extend_from_slice(&palette_entries.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
}

impl ImageEncoder for BmpCodec {
    fn format(&self) -> ImageFormat {
        ImageFormat::Bmp
    }

    fn encode(&self, image: &Image, out: &mut Vec<u8>) -> Result<()> {
        let (width, height) = image.dimensions();
        match image.color_type() {
            ColorType::L => {
                let Image::L(buf) = image else { unreachable!() };
                write_headers(out, width, height, 8, 256);
                for i in 0..=255u8 {
                    out.extend_from_slice(&[i, i, i, 0]);
                }
                let stride = row_stride(width, 8);
                let rows: Vec<&[L]> = buf.rows().collect();
                for row in rows.into_iter().rev() {
                    let start = out.len();
                    out.extend(row.iter().map(|p| p.0));
                    out.resize(start + stride, 0);
                }
            }
            ColorType::Rgb => {
                let Image::Rgb(buf) = image else { unreachable!() };
                write_headers(out, width, height, 24, 0);
                let stride = row_stride(width, 24);
                let rows: Vec<&[Rgb]> = buf.rows().collect();
                for row in rows.into_iter().rev() {
                    let start = out.len();
                    for p in row {
                        out.extend_from_slice(&[p.b, p.g, p.r]);
                    }
                    out.resize(start + stride, 0);
                }
            }
            ColorType::La | ColorType::Rgba => {
                let buf: ImageBuffer<Rgba> = image.to_rgba_buffer();
                write_headers(out, width, height, 32, 0);
                let rows: Vec<&[Rgba]> = buf.rows().collect();
                for row in rows.into_iter().rev() {
                    for p in row {
                        out.extend_from_slice(&[p.b, p.g, p.r, p.a]);
                    }
                }
            }
        }
        Ok(())
    }
}

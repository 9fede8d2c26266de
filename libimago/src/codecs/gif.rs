//! GIF codec.
//!
//! Strict block-based state machine over the GIF87a/89a grammar: logical
//! screen descriptor, color tables, graphic-control and application
//! extensions, LZW-compressed image data, trailer. Frames are composited
//! onto the logical canvas honoring disposal, so every frame handed out is
//! the complete picture at that point of the animation.
//!
//! The encoder writes one local color table per image: exact when a frame
//! has at most 256 distinct colors (lossless round-trip), otherwise a
//! fixed 6x7x6 color cube (documented lossy fallback). Pixels with alpha
//! below 128 become the transparent index.

use std::collections::HashMap;
use std::time::Duration;

use crate::buffer::{Image, ImageBuffer};
use crate::codecs::{ByteReader, ImageDecoder, ImageEncoder};
use crate::error::{Error, Result};
use crate::format::{ImageFormat, GIF87A_SIGNATURE, GIF89A_SIGNATURE};
use crate::pixel::{Rgba, Rgb};
use crate::sequence::{DisposalMethod, Frame, ImageSequence, LoopCount};

const BLOCK_EXTENSION: u8 = 0x21;
const BLOCK_IMAGE: u8 = 0x2C;
const BLOCK_TRAILER: u8 = 0x3B;

const EXT_GRAPHIC_CONTROL: u8 = 0xF9;
const EXT_APPLICATION: u8 = 0xFF;

const MAX_CODES: usize = 4096;

/// Alpha threshold below which an encoded pixel becomes fully transparent
const ALPHA_CUTOFF: u8 = 128;

/// GIF decoder/encoder
pub struct GifCodec;

#[derive(Debug, Clone, Copy, Default)]
struct GraphicControl {
    delay_cs: u16,
    transparent_index: Option<u8>,
    disposal: DisposalMethod,
}

fn read_color_table(reader: &mut ByteReader<'_>, packed_size: u8) -> Result<Vec<Rgb>> {
    let entries = 2usize << packed_size;
    let raw = reader.read_slice(entries * 3)?;
    Ok(raw
        .chunks_exact(3)
        .map(|c| Rgb::new(c[0], c[1], c[2]))
        .collect())
}

/// Concatenate a terminated chain of data sub-blocks
fn read_sub_blocks(reader: &mut ByteReader<'_>) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    loop {
        let len = reader.read_u8()?;
        if len == 0 {
            return Ok(data);
        }
        data.extend_from_slice(reader.read_slice(len as usize)?);
    }
}

fn skip_sub_blocks(reader: &mut ByteReader<'_>) -> Result<()> {
    loop {
        let len = reader.read_u8()?;
        if len == 0 {
            return Ok(());
        }
        reader.skip(len as usize)?;
    }
}

fn parse_graphic_control(reader: &mut ByteReader<'_>) -> Result<GraphicControl> {
    reader.set_section("graphic control extension");
    let block_size = reader.read_u8()?;
    if block_size != 4 {
        return Err(Error::corrupt(
            "graphic control extension",
            format!("block size {block_size} != 4"),
        ));
    }
    let packed = reader.read_u8()?;
    let delay_cs = reader.read_u16_le()?;
    let transparent = reader.read_u8()?;
    let terminator = reader.read_u8()?;
    if terminator != 0 {
        return Err(Error::corrupt(
            "graphic control extension",
            format!("missing block terminator, found {terminator:#04X}"),
        ));
    }
    let disposal = match (packed >> 2) & 0x07 {
        0 | 1 => DisposalMethod::None,
        2 => DisposalMethod::Background,
        3 => DisposalMethod::Previous,
        other => {
            return Err(Error::corrupt(
                "graphic control extension",
                format!("reserved disposal method {other}"),
            ));
        }
    };
    let transparent_index = (packed & 0x01 != 0).then_some(transparent);
    Ok(GraphicControl {
        delay_cs,
        transparent_index,
        disposal,
    })
}

fn parse_loop_count(data: &[u8]) -> Option<LoopCount> {
    // NETSCAPE2.0 / ANIMEXTS1.0 looping application extension
    let (ident, rest) = data.split_first_chunk::<11>()?;
    if ident != b"NETSCAPE2.0" && ident != b"ANIMEXTS1.0" {
        return None;
    }
    if rest.len() < 3 || rest[0] != 1 {
        return None;
    }
    let count = u16::from_le_bytes([rest[1], rest[2]]);
    Some(if count == 0 {
        LoopCount::Infinite
    } else {
        LoopCount::Exactly(count)
    })
}

/// First pixel of the string a code expands to
fn first_unit(prefix: &[u16], suffix: &[u8], mut code: u16) -> u8 {
    while prefix[code as usize] != u16::MAX {
        code = prefix[code as usize];
    }
    suffix[code as usize]
}

/// Expand a code's string, walking the prefix chain backwards
fn emit_chain(prefix: &[u16], suffix: &[u8], mut code: u16, stack: &mut Vec<u8>, out: &mut Vec<u8>) {
    stack.clear();
    loop {
        stack.push(suffix[code as usize]);
        if prefix[code as usize] == u16::MAX {
            break;
        }
        code = prefix[code as usize];
    }
    out.extend(stack.iter().rev());
}

/// GIF-variant LZW decompression: LSB-first codes with growing width
fn lzw_decode(data: &[u8], min_code_size: u8, expected: usize) -> Result<Vec<u8>> {
    const SECTION: &str = "GIF image data";
    if !(2..=8).contains(&min_code_size) {
        return Err(Error::corrupt(
            SECTION,
            format!("LZW minimum code size {min_code_size}"),
        ));
    }
    let clear_code = 1u16 << min_code_size;
    let end_code = clear_code + 1;

    // prefix/suffix chain per code; root codes terminate at u16::MAX
    let mut prefix = vec![u16::MAX; MAX_CODES];
    let mut suffix = vec![0u8; MAX_CODES];
    for code in 0..clear_code {
        suffix[code as usize] = code as u8;
    }

    let mut next_code = end_code + 1;
    let mut code_size = min_code_size as u32 + 1;
    let mut prev: Option<u16> = None;

    let mut out = Vec::with_capacity(expected);
    let mut stack = Vec::with_capacity(MAX_CODES);

    let mut bit_buf: u32 = 0;
    let mut bit_cnt: u32 = 0;
    let mut pos = 0usize;

    loop {
        while bit_cnt < code_size {
            if pos >= data.len() {
                return Err(Error::TruncatedInput { section: SECTION });
            }
            bit_buf |= u32::from(data[pos]) << bit_cnt;
            bit_cnt += 8;
            pos += 1;
        }
        let code = (bit_buf & ((1 << code_size) - 1)) as u16;
        bit_buf >>= code_size;
        bit_cnt -= code_size;

        if code == clear_code {
            next_code = end_code + 1;
            code_size = min_code_size as u32 + 1;
            prev = None;
            continue;
        }
        if code == end_code {
            break;
        }

        match prev {
            None => {
                if code >= clear_code {
                    return Err(Error::corrupt(SECTION, format!("first LZW code {code} not a root")));
                }
                out.push(code as u8);
            }
            Some(prev_code) => {
                if code > next_code || code == next_code && next_code as usize >= MAX_CODES {
                    return Err(Error::corrupt(SECTION, format!("LZW code {code} out of range")));
                }
                if code == next_code {
                    // KwKwK case: the new entry is prev + first(prev)
                    let k = first_unit(&prefix, &suffix, prev_code);
                    prefix[next_code as usize] = prev_code;
                    suffix[next_code as usize] = k;
                    next_code += 1;
                    emit_chain(&prefix, &suffix, code, &mut stack, &mut out);
                } else {
                    emit_chain(&prefix, &suffix, code, &mut stack, &mut out);
                    if (next_code as usize) < MAX_CODES {
                        prefix[next_code as usize] = prev_code;
                        suffix[next_code as usize] = first_unit(&prefix, &suffix, code);
                        next_code += 1;
                    }
                }
                if next_code as usize >= (1 << code_size) && code_size < 12 {
                    code_size += 1;
                }
            }
        }
        prev = Some(code);

        if out.len() > expected {
            return Err(Error::corrupt(
                SECTION,
                format!("LZW output exceeds {expected} pixels"),
            ));
        }
    }

    if out.len() != expected {
        return Err(Error::corrupt(
            SECTION,
            format!("LZW produced {} of {expected} pixels", out.len()),
        ));
    }
    Ok(out)
}

/// Map interlaced row order back to display order
fn deinterlace(indices: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = vec![0u8; indices.len()];
    let passes: [(usize, usize); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];
    let mut src_row = 0;
    for (start, step) in passes {
        let mut y = start;
        while y < height {
            out[y * width..(y + 1) * width]
                .copy_from_slice(&indices[src_row * width..(src_row + 1) * width]);
            src_row += 1;
            y += step;
        }
    }
    out
}

impl ImageDecoder for GifCodec {
    fn format(&self) -> ImageFormat {
        ImageFormat::Gif
    }

    fn decode(&self, data: &[u8]) -> Result<Image> {
        let sequence = self.decode_sequence(data)?;
        let frame = sequence
            .into_frames()
            .into_iter()
            .next()
            .ok_or_else(|| Error::corrupt("GIF trailer", "no image data before trailer"))?;
        Ok(frame.into_image())
    }

    fn decode_sequence(&self, data: &[u8]) -> Result<ImageSequence> {
        let mut reader = ByteReader::new(data);
        reader.set_section("GIF header");
        let signature = reader.read_slice(6)?;
        if signature != GIF87A_SIGNATURE && signature != GIF89A_SIGNATURE {
            return Err(Error::corrupt(
                "GIF header",
                format!("bad signature {signature:02X?}"),
            ));
        }

        reader.set_section("logical screen descriptor");
        let screen_width = u32::from(reader.read_u16_le()?);
        let screen_height = u32::from(reader.read_u16_le()?);
        let packed = reader.read_u8()?;
        let _background_index = reader.read_u8()?;
        let _aspect_ratio = reader.read_u8()?;
        if screen_width == 0 || screen_height == 0 {
            return Err(Error::InvalidDimensions {
                width: screen_width,
                height: screen_height,
            });
        }

        let global_table = if packed & 0x80 != 0 {
            reader.set_section("global color table");
            Some(read_color_table(&mut reader, packed & 0x07)?)
        } else {
            None
        };

        let mut canvas = ImageBuffer::new(screen_width, screen_height, Rgba::transparent())?;
        let mut sequence = ImageSequence::new();
        let mut control: Option<GraphicControl> = None;

        loop {
            reader.set_section("GIF block");
            let block = reader.read_u8()?;
            match block {
                BLOCK_TRAILER => break,
                BLOCK_EXTENSION => {
                    let label = reader.read_u8()?;
                    match label {
                        EXT_GRAPHIC_CONTROL => {
                            control = Some(parse_graphic_control(&mut reader)?);
                        }
                        EXT_APPLICATION => {
                            reader.set_section("application extension");
                            let payload = read_sub_blocks(&mut reader)?;
                            if let Some(loop_count) = parse_loop_count(&payload) {
                                sequence.set_loop_count(loop_count);
                            }
                        }
                        _ => {
                            // Comment and plain-text extensions carry no pixels
                            reader.set_section("GIF extension");
                            skip_sub_blocks(&mut reader)?;
                        }
                    }
                }
                BLOCK_IMAGE => {
                    reader.set_section("image descriptor");
                    let left = u32::from(reader.read_u16_le()?);
                    let top = u32::from(reader.read_u16_le()?);
                    let width = u32::from(reader.read_u16_le()?);
                    let height = u32::from(reader.read_u16_le()?);
                    let packed = reader.read_u8()?;
                    if width == 0 || height == 0 {
                        return Err(Error::InvalidDimensions { width, height });
                    }
                    if left + width > screen_width || top + height > screen_height {
                        return Err(Error::corrupt(
                            "image descriptor",
                            format!(
                                "frame {width}x{height}+{left}+{top} exceeds {screen_width}x{screen_height} canvas"
                            ),
                        ));
                    }

                    let local_table = if packed & 0x80 != 0 {
                        reader.set_section("local color table");
                        Some(read_color_table(&mut reader, packed & 0x07)?)
                    } else {
                        None
                    };
                    let interlaced = packed & 0x40 != 0;
                    let table = local_table
                        .as_deref()
                        .or(global_table.as_deref())
                        .ok_or_else(|| {
                            Error::corrupt("image descriptor", "no color table in scope")
                        })?;

                    reader.set_section("GIF image data");
                    let min_code_size = reader.read_u8()?;
                    let compressed = read_sub_blocks(&mut reader)?;
                    let expected = width as usize * height as usize;
                    let mut indices = lzw_decode(&compressed, min_code_size, expected)?;
                    if interlaced {
                        indices = deinterlace(&indices, width as usize, height as usize);
                    }

                    let gc = control.take().unwrap_or_default();

                    let saved = (gc.disposal == DisposalMethod::Previous).then(|| canvas.clone());

                    for (i, &index) in indices.iter().enumerate() {
                        if Some(index) == gc.transparent_index {
                            continue;
                        }
                        let color = table.get(index as usize).copied().ok_or_else(|| {
                            Error::corrupt(
                                "GIF image data",
                                format!("color index {index} outside table"),
                            )
                        })?;
                        let x = left + (i as u32 % width);
                        let y = top + (i as u32 / width);
                        canvas.set_pixel(x, y, Rgba::new(color.r, color.g, color.b, 255))?;
                    }

                    sequence.push(
                        Frame::from_image(canvas.clone().into())
                            .with_delay(Duration::from_millis(u64::from(gc.delay_cs) * 10))
                            .with_disposal(gc.disposal),
                    );

                    match gc.disposal {
                        DisposalMethod::None => {}
                        DisposalMethod::Background => {
                            for y in top..top + height {
                                for x in left..left + width {
                                    canvas.set_pixel(x, y, Rgba::transparent())?;
                                }
                            }
                        }
                        DisposalMethod::Previous => {
                            if let Some(previous) = saved {
                                canvas = previous;
                            }
                        }
                    }
                }
                other => {
                    return Err(Error::corrupt(
                        "GIF block",
                        format!("unknown block introducer {other:#04X}"),
                    ));
                }
            }
        }

        if sequence.is_empty() {
            return Err(Error::corrupt("GIF trailer", "no image data before trailer"));
        }
        log::debug!(
            "GIF {}x{}, {} frame(s)",
            screen_width,
            screen_height,
            sequence.len()
        );
        Ok(sequence)
    }
}

// --- encoding ---

struct Palette {
    colors: Vec<Rgb>,
    transparent: Option<u8>,
    /// Index lookup for exact palettes; None means cube quantization
    exact: Option<HashMap<Rgb, u8>>,
}

const CUBE_R: usize = 6;
const CUBE_G: usize = 7;
const CUBE_B: usize = 6;

fn cube_level(value: u8, levels: usize) -> usize {
    value as usize * levels / 256
}

fn cube_value(level: usize, levels: usize) -> u8 {
    (level * 255 / (levels - 1)) as u8
}

fn build_palette(buf: &ImageBuffer<Rgba>) -> Palette {
    let has_transparency = buf.pixels().any(|p| p.a < ALPHA_CUTOFF);
    let reserve = usize::from(has_transparency);

    let mut exact: HashMap<Rgb, u8> = HashMap::new();
    let mut colors = Vec::new();
    for pixel in buf.pixels() {
        if pixel.a < ALPHA_CUTOFF {
            continue;
        }
        let rgb = Rgb::new(pixel.r, pixel.g, pixel.b);
        if !exact.contains_key(&rgb) {
            if colors.len() + reserve >= 256 {
                // Too many distinct colors; fall back to the fixed cube.
                let mut colors = Vec::with_capacity(CUBE_R * CUBE_G * CUBE_B + 1);
                for r in 0..CUBE_R {
                    for g in 0..CUBE_G {
                        for b in 0..CUBE_B {
                            colors.push(Rgb::new(
                                cube_value(r, CUBE_R),
                                cube_value(g, CUBE_G),
                                cube_value(b, CUBE_B),
                            ));
                        }
                    }
                }
                let transparent = (colors.len()) as u8;
                colors.push(Rgb::black());
                return Palette {
                    colors,
                    transparent: has_transparency.then_some(transparent),
                    exact: None,
                };
            }
            exact.insert(rgb, colors.len() as u8);
            colors.push(rgb);
        }
    }
    let transparent = if has_transparency {
        let index = colors.len() as u8;
        colors.push(Rgb::black());
        Some(index)
    } else {
        None
    };
    Palette {
        colors,
        transparent,
        exact: Some(exact),
    }
}

impl Palette {
    fn index_of(&self, pixel: Rgba) -> u8 {
        if pixel.a < ALPHA_CUTOFF {
            if let Some(t) = self.transparent {
                return t;
            }
        }
        match &self.exact {
            Some(map) => map[&Rgb::new(pixel.r, pixel.g, pixel.b)],
            None => {
                let r = cube_level(pixel.r, CUBE_R);
                let g = cube_level(pixel.g, CUBE_G);
                let b = cube_level(pixel.b, CUBE_B);
                ((r * CUBE_G + g) * CUBE_B + b) as u8
            }
        }
    }

    /// Table size field: log2(entries) - 1, entries padded to a power of two
    fn size_field(&self) -> u8 {
        let mut field = 0u8;
        while (2usize << field) < self.colors.len() {
            field += 1;
        }
        field
    }
}

/// GIF-variant LZW compression with growing code width
fn lzw_encode(indices: &[u8], min_code_size: u8, out: &mut Vec<u8>) {
    let clear_code = 1u16 << min_code_size;
    let end_code = clear_code + 1;

    let mut dict: HashMap<(u16, u8), u16> = HashMap::new();
    let mut next_code = end_code + 1;
    let mut code_size = u32::from(min_code_size) + 1;

    let mut bit_buf: u32 = 0;
    let mut bit_cnt: u32 = 0;
    let mut push_code = |code: u16, size: u32, bit_buf: &mut u32, bit_cnt: &mut u32, out: &mut Vec<u8>| {
        *bit_buf |= u32::from(code) << *bit_cnt;
        *bit_cnt += size;
        while *bit_cnt >= 8 {
            out.push((*bit_buf & 0xFF) as u8);
            *bit_buf >>= 8;
            *bit_cnt -= 8;
        }
    };

    push_code(clear_code, code_size, &mut bit_buf, &mut bit_cnt, out);

    let mut current = u16::from(indices[0]);
    for &k in &indices[1..] {
        match dict.get(&(current, k)) {
            Some(&code) => current = code,
            None => {
                push_code(current, code_size, &mut bit_buf, &mut bit_cnt, out);
                dict.insert((current, k), next_code);
                if u32::from(next_code) == (1 << code_size) && code_size < 12 {
                    code_size += 1;
                }
                next_code += 1;
                if next_code as usize >= MAX_CODES {
                    push_code(clear_code, code_size, &mut bit_buf, &mut bit_cnt, out);
                    dict.clear();
                    next_code = end_code + 1;
                    code_size = u32::from(min_code_size) + 1;
                }
                current = u16::from(k);
            }
        }
    }
    push_code(current, code_size, &mut bit_buf, &mut bit_cnt, out);
    push_code(end_code, code_size, &mut bit_buf, &mut bit_cnt, out);
    if bit_cnt > 0 {
        out.push((bit_buf & 0xFF) as u8);
    }
}

fn write_sub_blocks(data: &[u8], out: &mut Vec<u8>) {
    for chunk in data.chunks(255) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
    out.push(0);
}

fn write_frame(
    buf: &ImageBuffer<Rgba>,
    delay: Duration,
    disposal: DisposalMethod,
    out: &mut Vec<u8>,
) {
    let palette = build_palette(buf);
    let size_field = palette.size_field();
    let table_len = 2usize << size_field;

    // Graphic control extension
    let disposal_bits: u8 = match disposal {
        DisposalMethod::None => 1,
        DisposalMethod::Background => 2,
        DisposalMethod::Previous => 3,
    };
    let delay_cs = u16::try_from(delay.as_millis() / 10).unwrap_or(u16::MAX);
    out.extend_from_slice(&[BLOCK_EXTENSION, EXT_GRAPHIC_CONTROL, 4]);
    out.push(disposal_bits << 2 | u8::from(palette.transparent.is_some()));
    out.extend_from_slice(&delay_cs.to_le_bytes());
    out.push(palette.transparent.unwrap_or(0));
    out.push(0);

    // Image descriptor with a local color table
    out.push(BLOCK_IMAGE);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(buf.width() as u16).to_le_bytes());
    out.extend_from_slice(&(buf.height() as u16).to_le_bytes());
    out.push(0x80 | size_field);
    for i in 0..table_len {
        let color = palette.colors.get(i).copied().unwrap_or(Rgb::black());
        out.extend_from_slice(&[color.r, color.g, color.b]);
    }

    let indices: Vec<u8> = buf.pixels().map(|p| palette.index_of(p)).collect();
    let min_code_size = (size_field + 1).max(2);
    out.push(min_code_size);
    let mut compressed = Vec::with_capacity(indices.len() / 2);
    lzw_encode(&indices, min_code_size, &mut compressed);
    write_sub_blocks(&compressed, out);
}

fn check_frame_size(width: u32, height: u32) -> Result<()> {
    if width > u32::from(u16::MAX) || height > u32::from(u16::MAX) {
        return Err(Error::EncodingError(format!(
            "{width}x{height} exceeds the 65535x65535 GIF limit"
        )));
    }
    Ok(())
}

fn write_screen(width: u32, height: u32, out: &mut Vec<u8>) {
    out.extend_from_slice(GIF89A_SIGNATURE);
    out.extend_from_slice(&(width as u16).to_le_bytes());
    out.extend_from_slice(&(height as u16).to_le_bytes());
    // No global color table; every image carries its own.
    out.extend_from_slice(&[0, 0, 0]);
}

impl ImageEncoder for GifCodec {
    fn format(&self) -> ImageFormat {
        ImageFormat::Gif
    }

    fn encode(&self, image: &Image, out: &mut Vec<u8>) -> Result<()> {
        let (width, height) = image.dimensions();
        check_frame_size(width, height)?;
        write_screen(width, height, out);
        write_frame(
            &image.to_rgba_buffer(),
            Duration::ZERO,
            DisposalMethod::None,
            out,
        );
        out.push(BLOCK_TRAILER);
        Ok(())
    }

    fn encode_sequence(&self, sequence: &ImageSequence, out: &mut Vec<u8>) -> Result<()> {
        let first = sequence
            .first()
            .ok_or_else(|| Error::EncodingError("cannot encode an empty sequence".into()))?;
        let (width, height) = first.dimensions();
        check_frame_size(width, height)?;
        for frame in sequence {
            if frame.dimensions() != (width, height) {
                return Err(Error::EncodingError(format!(
                    "frame dimensions {:?} differ from {:?}",
                    frame.dimensions(),
                    (width, height)
                )));
            }
        }

        write_screen(width, height, out);

        // NETSCAPE looping extension
        let count = match sequence.loop_count() {
            LoopCount::Infinite => 0u16,
            LoopCount::Exactly(n) => n,
        };
        out.extend_from_slice(&[BLOCK_EXTENSION, EXT_APPLICATION, 11]);
        out.extend_from_slice(b"NETSCAPE2.0");
        out.extend_from_slice(&[3, 1]);
        out.extend_from_slice(&count.to_le_bytes());
        out.push(0);

        for frame in sequence {
            write_frame(
                &frame.image().to_rgba_buffer(),
                frame.delay(),
                frame.disposal(),
                out,
            );
        }
        out.push(BLOCK_TRAILER);
        Ok(())
    }
}

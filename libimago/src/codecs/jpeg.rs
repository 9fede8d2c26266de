//! JPEG codec.
//!
//! Baseline sequential DCT only: Huffman entropy coding, 8-bit precision,
//! grayscale or YCbCr with 4:4:4 / 4:2:2 / 4:2:0 subsampling and restart
//! markers. Progressive, arithmetic, hierarchical and 12-bit streams are
//! reported as unsupported. The encoder writes 4:4:4 (or a single luma
//! component) with Annex K quantization tables scaled by quality and the
//! standard Huffman tables.
//!
//! JPEG is lossy: round-trips preserve dimensions and approximate pixel
//! values, never exact bytes.

use std::f32::consts::{FRAC_1_SQRT_2, PI};

use crate::buffer::{Image, ImageBuffer};
use crate::codecs::{ByteReader, ImageDecoder, ImageEncoder};
use crate::error::{Error, Result};
use crate::format::{ImageFormat, JPEG_SIGNATURE};
use crate::pixel::{ColorType, L, Rgb};

const MARKER_SOI: u8 = 0xD8;
const MARKER_EOI: u8 = 0xD9;
const MARKER_SOF0: u8 = 0xC0;
const MARKER_SOF1: u8 = 0xC1;
const MARKER_DHT: u8 = 0xC4;
const MARKER_DQT: u8 = 0xDB;
const MARKER_SOS: u8 = 0xDA;
const MARKER_DRI: u8 = 0xDD;
const MARKER_COM: u8 = 0xFE;

/// Zigzag scan order: zigzag index -> natural block index
const ZIGZAG: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27,
    20, 13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58,
    59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

// Annex K reference quantization tables
const BASE_LUMA_QUANT: [u16; 64] = [
    16, 11, 10, 16, 24, 40, 51, 61, 12, 12, 14, 19, 26, 58, 60, 55, 14, 13, 16, 24, 40, 57, 69,
    56, 14, 17, 22, 29, 51, 87, 80, 62, 18, 22, 37, 56, 68, 109, 103, 77, 24, 35, 55, 64, 81, 104,
    113, 92, 49, 64, 78, 87, 103, 121, 120, 101, 72, 92, 95, 98, 112, 100, 103, 99,
];
const BASE_CHROMA_QUANT: [u16; 64] = [
    17, 18, 24, 47, 99, 99, 99, 99, 18, 21, 26, 66, 99, 99, 99, 99, 24, 26, 56, 99, 99, 99, 99,
    99, 47, 66, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99,
];

// Standard Huffman tables from Annex K
const DC_LUMA_BITS: [u8; 16] = [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0];
const DC_LUMA_VALS: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];
const DC_CHROMA_BITS: [u8; 16] = [0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0];
const DC_CHROMA_VALS: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];
const AC_LUMA_BITS: [u8; 16] = [0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 125];
const AC_LUMA_VALS: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61,
    0x07, 0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xA1, 0x08, 0x23, 0x42, 0xB1, 0xC1, 0x15, 0x52,
    0xD1, 0xF0, 0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0A, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x25,
    0x26, 0x27, 0x28, 0x29, 0x2A, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3A, 0x43, 0x44, 0x45,
    0x46, 0x47, 0x48, 0x49, 0x4A, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5A, 0x63, 0x64,
    0x65, 0x66, 0x67, 0x68, 0x69, 0x6A, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7A, 0x83,
    0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8A, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99,
    0x9A, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8, 0xA9, 0xAA, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6,
    0xB7, 0xB8, 0xB9, 0xBA, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6, 0xC7, 0xC8, 0xC9, 0xCA, 0xD2, 0xD3,
    0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xE1, 0xE2, 0xE3, 0xE4, 0xE5, 0xE6, 0xE7, 0xE8,
    0xE9, 0xEA, 0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0xFA,
];
const AC_CHROMA_BITS: [u8; 16] = [0, 2, 1, 2, 4, 4, 3, 4, 7, 5, 4, 4, 0, 1, 2, 119];
const AC_CHROMA_VALS: [u8; 162] = [
    0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21, 0x31, 0x06, 0x12, 0x41, 0x51, 0x07, 0x61,
    0x71, 0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91, 0xA1, 0xB1, 0xC1, 0x09, 0x23, 0x33,
    0x52, 0xF0, 0x15, 0x62, 0x72, 0xD1, 0x0A, 0x16, 0x24, 0x34, 0xE1, 0x25, 0xF1, 0x17, 0x18,
    0x19, 0x1A, 0x26, 0x27, 0x28, 0x29, 0x2A, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3A, 0x43, 0x44,
    0x45, 0x46, 0x47, 0x48, 0x49, 0x4A, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5A, 0x63,
    0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0x6A, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7A,
    0x82, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8A, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97,
    0x98, 0x99, 0x9A, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8, 0xA9, 0xAA, 0xB2, 0xB3, 0xB4,
    0xB5, 0xB6, 0xB7, 0xB8, 0xB9, 0xBA, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6, 0xC7, 0xC8, 0xC9, 0xCA,
    0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xE2, 0xE3, 0xE4, 0xE5, 0xE6, 0xE7,
    0xE8, 0xE9, 0xEA, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0xFA,
];

/// JPEG decoder/encoder
pub struct JpegCodec {
    /// Encoding quality, 1-100
    pub quality: u8,
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self { quality: 85 }
    }
}

// --- shared DCT machinery ---

/// Separable 8-point DCT basis, cos[(2x+1) * k * pi / 16]
struct Dct {
    cos: [[f32; 8]; 8],
}

impl Dct {
    fn new() -> Self {
        let mut cos = [[0f32; 8]; 8];
        for (x, row) in cos.iter_mut().enumerate() {
            for (k, value) in row.iter_mut().enumerate() {
                *value = (PI * (2 * x + 1) as f32 * k as f32 / 16.0).cos();
            }
        }
        Self { cos }
    }

    fn scale(k: usize) -> f32 {
        if k == 0 {
            FRAC_1_SQRT_2
        } else {
            1.0
        }
    }

    /// Inverse transform of dequantized coefficients, level-shifted to 0-255
    fn inverse(&self, block: &[i32; 64]) -> [u8; 64] {
        let mut tmp = [0f32; 64];
        // Rows
        for y in 0..8 {
            for x in 0..8 {
                let mut sum = 0f32;
                for k in 0..8 {
                    sum += Self::scale(k) * block[y * 8 + k] as f32 * self.cos[x][k];
                }
                tmp[y * 8 + x] = sum * 0.5;
            }
        }
        // Columns
        let mut out = [0u8; 64];
        for x in 0..8 {
            for y in 0..8 {
                let mut sum = 0f32;
                for k in 0..8 {
                    sum += Self::scale(k) * tmp[k * 8 + x] * self.cos[y][k];
                }
                out[y * 8 + x] = (sum * 0.5 + 128.0).round().clamp(0.0, 255.0) as u8;
            }
        }
        out
    }

    /// Forward transform of level-shifted samples
    fn forward(&self, samples: &[f32; 64]) -> [f32; 64] {
        let mut tmp = [0f32; 64];
        for y in 0..8 {
            for k in 0..8 {
                let mut sum = 0f32;
                for x in 0..8 {
                    sum += samples[y * 8 + x] * self.cos[x][k];
                }
                tmp[y * 8 + k] = sum * Self::scale(k) * 0.5;
            }
        }
        let mut out = [0f32; 64];
        for k in 0..8 {
            for x in 0..8 {
                let mut sum = 0f32;
                for y in 0..8 {
                    sum += tmp[y * 8 + x] * self.cos[y][k];
                }
                out[k * 8 + x] = sum * Self::scale(k) * 0.5;
            }
        }
        out
    }
}

// --- decoding ---

/// Canonical Huffman decoding tables per ITU T.81 F.2.2.3
struct HuffmanTable {
    min_code: [i32; 17],
    max_code: [i32; 17],
    val_ptr: [usize; 17],
    values: Vec<u8>,
}

impl HuffmanTable {
    fn build(bits: &[u8; 16], values: Vec<u8>) -> Result<Self> {
        let total: usize = bits.iter().map(|&b| usize::from(b)).sum();
        if total != values.len() || total > 256 {
            return Err(Error::corrupt(
                "DHT segment",
                format!("{} codes declared, {} values present", total, values.len()),
            ));
        }
        let mut min_code = [0i32; 17];
        let mut max_code = [-1i32; 17];
        let mut val_ptr = [0usize; 17];
        let mut code = 0i32;
        let mut index = 0usize;
        for len in 1..=16usize {
            let count = usize::from(bits[len - 1]);
            if count > 0 {
                val_ptr[len] = index;
                min_code[len] = code;
                code += count as i32;
                max_code[len] = code - 1;
                index += count;
            }
            code <<= 1;
        }
        Ok(Self {
            min_code,
            max_code,
            val_ptr,
            values,
        })
    }

    fn decode(&self, bits: &mut BitReader<'_>) -> Result<u8> {
        let mut code = 0i32;
        for len in 1..=16usize {
            code = (code << 1) | i32::from(bits.read_bit()?);
            if self.max_code[len] >= 0 && code <= self.max_code[len] {
                let offset = (code - self.min_code[len]) as usize;
                return Ok(self.values[self.val_ptr[len] + offset]);
            }
        }
        Err(Error::corrupt("JPEG scan", "invalid Huffman code"))
    }
}

/// MSB-first bit reader over entropy-coded data with 0xFF00 unstuffing
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    buf: u8,
    cnt: u8,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            buf: 0,
            cnt: 0,
        }
    }

    fn read_bit(&mut self) -> Result<u8> {
        if self.cnt == 0 {
            if self.pos >= self.data.len() {
                return Err(Error::TruncatedInput {
                    section: "JPEG scan",
                });
            }
            let byte = self.data[self.pos];
            self.pos += 1;
            if byte == 0xFF {
                match self.data.get(self.pos) {
                    Some(0x00) => self.pos += 1,
                    _ => {
                        return Err(Error::TruncatedInput {
                            section: "JPEG scan",
                        });
                    }
                }
            }
            self.buf = byte;
            self.cnt = 8;
        }
        self.cnt -= 1;
        Ok((self.buf >> self.cnt) & 1)
    }

    fn read_bits(&mut self, n: u8) -> Result<i32> {
        let mut value = 0i32;
        for _ in 0..n {
            value = (value << 1) | i32::from(self.read_bit()?);
        }
        Ok(value)
    }

    /// Align to a byte boundary and consume one RSTn marker
    fn consume_restart(&mut self, expected: u8) -> Result<()> {
        self.cnt = 0;
        if self.pos + 1 >= self.data.len() {
            return Err(Error::TruncatedInput {
                section: "JPEG scan",
            });
        }
        let (a, b) = (self.data[self.pos], self.data[self.pos + 1]);
        if a != 0xFF || !(0xD0..=0xD7).contains(&b) {
            return Err(Error::corrupt(
                "JPEG scan",
                format!("expected restart marker, found {a:02X} {b:02X}"),
            ));
        }
        if b != 0xD0 + expected {
            return Err(Error::corrupt(
                "JPEG scan",
                format!("restart marker out of sequence: {b:02X}"),
            ));
        }
        self.pos += 2;
        Ok(())
    }
}

/// Sign-extend an n-bit magnitude per ITU T.81 F.2.2.1
fn extend(value: i32, n: u8) -> i32 {
    if n == 0 {
        return 0;
    }
    if value < (1 << (n - 1)) {
        value - (1 << n) + 1
    } else {
        value
    }
}

#[derive(Debug, Clone, Copy)]
struct Component {
    id: u8,
    h_samp: usize,
    v_samp: usize,
    quant_id: usize,
    dc_table: usize,
    ac_table: usize,
}

struct FrameHeader {
    width: u32,
    height: u32,
    components: Vec<Component>,
}

fn parse_sof(segment: &[u8]) -> Result<FrameHeader> {
    let mut r = ByteReader::new(segment);
    r.set_section("SOF header");
    let precision = r.read_u8()?;
    if precision != 8 {
        return Err(Error::unsupported(
            ImageFormat::Jpeg,
            format!("{precision}-bit sample precision"),
        ));
    }
    let height = u32::from(r.read_u16_be()?);
    let width = u32::from(r.read_u16_be()?);
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }
    let count = r.read_u8()?;
    if count != 1 && count != 3 {
        return Err(Error::unsupported(
            ImageFormat::Jpeg,
            format!("{count}-component images"),
        ));
    }
    let mut components = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = r.read_u8()?;
        let sampling = r.read_u8()?;
        let quant_id = r.read_u8()?;
        let h_samp = usize::from(sampling >> 4);
        let v_samp = usize::from(sampling & 0x0F);
        if !(1..=4).contains(&h_samp) || !(1..=4).contains(&v_samp) {
            return Err(Error::corrupt(
                "SOF header",
                format!("sampling factors {h_samp}x{v_samp}"),
            ));
        }
        if quant_id > 3 {
            return Err(Error::corrupt(
                "SOF header",
                format!("quantization table id {quant_id}"),
            ));
        }
        components.push(Component {
            id,
            h_samp,
            v_samp,
            quant_id: usize::from(quant_id),
            dc_table: 0,
            ac_table: 0,
        });
    }
    Ok(FrameHeader {
        width,
        height,
        components,
    })
}

impl ImageDecoder for JpegCodec {
    fn format(&self) -> ImageFormat {
        ImageFormat::Jpeg
    }

    fn decode(&self, data: &[u8]) -> Result<Image> {
        let mut reader = ByteReader::new(data);
        reader.set_section("SOI marker");
        reader.expect(JPEG_SIGNATURE)?;

        let mut quant: [Option<[u16; 64]>; 4] = [None; 4];
        let mut dc_tables: [Option<HuffmanTable>; 4] = [None, None, None, None];
        let mut ac_tables: [Option<HuffmanTable>; 4] = [None, None, None, None];
        let mut frame: Option<FrameHeader> = None;
        let mut restart_interval: u16 = 0;

        loop {
            reader.set_section("JPEG marker");
            let mut marker = reader.read_u8()?;
            if marker != 0xFF {
                return Err(Error::corrupt(
                    "JPEG marker",
                    format!("expected marker, found {marker:02X}"),
                ));
            }
            // Fill bytes before a marker are legal
            marker = reader.read_u8()?;
            while marker == 0xFF {
                marker = reader.read_u8()?;
            }

            match marker {
                MARKER_EOI => {
                    return Err(Error::corrupt("JPEG marker", "EOI before any scan"));
                }
                MARKER_SOF0 | MARKER_SOF1 => {
                    let length = segment_length(&mut reader, "SOF header")?;
                    let segment = reader.read_slice(length)?;
                    if frame.is_some() {
                        return Err(Error::corrupt("SOF header", "duplicate frame header"));
                    }
                    frame = Some(parse_sof(segment)?);
                }
                0xC2 => {
                    return Err(Error::unsupported(ImageFormat::Jpeg, "progressive DCT"));
                }
                0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => {
                    return Err(Error::unsupported(
                        ImageFormat::Jpeg,
                        format!("SOF marker {marker:02X}"),
                    ));
                }
                MARKER_DQT => {
                    let length = segment_length(&mut reader, "DQT segment")?;
                    let segment = reader.read_slice(length)?;
                    parse_dqt(segment, &mut quant)?;
                }
                MARKER_DHT => {
                    let length = segment_length(&mut reader, "DHT segment")?;
                    let segment = reader.read_slice(length)?;
                    parse_dht(segment, &mut dc_tables, &mut ac_tables)?;
                }
                MARKER_DRI => {
                    let length = segment_length(&mut reader, "DRI segment")?;
                    let segment = reader.read_slice(length)?;
                    if segment.len() != 2 {
                        return Err(Error::corrupt("DRI segment", "bad length"));
                    }
                    restart_interval = u16::from_be_bytes([segment[0], segment[1]]);
                }
                MARKER_SOS => {
                    let length = segment_length(&mut reader, "SOS header")?;
                    let segment = reader.read_slice(length)?;
                    let mut frame = frame
                        .ok_or_else(|| Error::corrupt("SOS header", "scan before frame header"))?;
                    parse_sos(segment, &mut frame)?;
                    let scan = &data[reader.position()..];
                    return decode_scan(
                        &frame,
                        scan,
                        &quant,
                        &dc_tables,
                        &ac_tables,
                        restart_interval,
                    );
                }
                0xE0..=0xEF | MARKER_COM => {
                    // Application segments and comments carry no pixels
                    let length = segment_length(&mut reader, "JPEG marker")?;
                    reader.skip(length)?;
                }
                other => {
                    return Err(Error::corrupt(
                        "JPEG marker",
                        format!("unexpected marker {other:02X}"),
                    ));
                }
            }
        }
    }
}

/// Read a segment length field, returning the payload byte count
fn segment_length(reader: &mut ByteReader<'_>, section: &'static str) -> Result<usize> {
    reader.set_section(section);
    let length = reader.read_u16_be()?;
    if length < 2 {
        return Err(Error::corrupt(section, format!("segment length {length}")));
    }
    Ok(usize::from(length) - 2)
}

fn parse_dqt(segment: &[u8], quant: &mut [Option<[u16; 64]>; 4]) -> Result<()> {
    let mut r = ByteReader::new(segment);
    r.set_section("DQT segment");
    while !r.is_empty() {
        let spec = r.read_u8()?;
        let precision = spec >> 4;
        let id = usize::from(spec & 0x0F);
        if id > 3 {
            return Err(Error::corrupt("DQT segment", format!("table id {id}")));
        }
        let mut table = [0u16; 64];
        match precision {
            0 => {
                let raw = r.read_slice(64)?;
                for (zz, &value) in raw.iter().enumerate() {
                    table[ZIGZAG[zz]] = u16::from(value);
                }
            }
            1 => {
                for zz in 0..64 {
                    table[ZIGZAG[zz]] = r.read_u16_be()?;
                }
            }
            other => {
                return Err(Error::corrupt(
                    "DQT segment",
                    format!("table precision {other}"),
                ));
            }
        }
        if table.contains(&0) {
            return Err(Error::corrupt("DQT segment", "zero quantizer"));
        }
        quant[id] = Some(table);
    }
    Ok(())
}

fn parse_dht(
    segment: &[u8],
    dc_tables: &mut [Option<HuffmanTable>; 4],
    ac_tables: &mut [Option<HuffmanTable>; 4],
) -> Result<()> {
    let mut r = ByteReader::new(segment);
    r.set_section("DHT segment");
    while !r.is_empty() {
        let spec = r.read_u8()?;
        let class = spec >> 4;
        let id = usize::from(spec & 0x0F);
        if class > 1 || id > 3 {
            return Err(Error::corrupt(
                "DHT segment",
                format!("table class {class}, id {id}"),
            ));
        }
        let bits: [u8; 16] = r.read_slice(16)?.try_into().unwrap();
        let total: usize = bits.iter().map(|&b| usize::from(b)).sum();
        let values = r.read_slice(total)?.to_vec();
        let table = HuffmanTable::build(&bits, values)?;
        if class == 0 {
            dc_tables[id] = Some(table);
        } else {
            ac_tables[id] = Some(table);
        }
    }
    Ok(())
}

fn parse_sos(segment: &[u8], frame: &mut FrameHeader) -> Result<()> {
    let mut r = ByteReader::new(segment);
    r.set_section("SOS header");
    let count = usize::from(r.read_u8()?);
    if count != frame.components.len() {
        return Err(Error::corrupt(
            "SOS header",
            format!(
                "{count} scan components, frame declares {}",
                frame.components.len()
            ),
        ));
    }
    for _ in 0..count {
        let id = r.read_u8()?;
        let tables = r.read_u8()?;
        let component = frame
            .components
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::corrupt("SOS header", format!("unknown component id {id}")))?;
        component.dc_table = usize::from(tables >> 4);
        component.ac_table = usize::from(tables & 0x0F);
    }
    let spectral_start = r.read_u8()?;
    let spectral_end = r.read_u8()?;
    let approximation = r.read_u8()?;
    if spectral_start != 0 || spectral_end != 63 || approximation != 0 {
        return Err(Error::corrupt(
            "SOS header",
            "non-baseline spectral selection",
        ));
    }
    Ok(())
}

fn decode_scan(
    frame: &FrameHeader,
    scan: &[u8],
    quant: &[Option<[u16; 64]>; 4],
    dc_tables: &[Option<HuffmanTable>; 4],
    ac_tables: &[Option<HuffmanTable>; 4],
    restart_interval: u16,
) -> Result<Image> {
    let components = &frame.components;
    let max_h = components.iter().map(|c| c.h_samp).max().unwrap_or(1);
    let max_v = components.iter().map(|c| c.v_samp).max().unwrap_or(1);
    let mcus_x = (frame.width as usize).div_ceil(max_h * 8);
    let mcus_y = (frame.height as usize).div_ceil(max_v * 8);

    log::debug!(
        "JPEG {}x{}, {} component(s), {}x{} MCUs",
        frame.width,
        frame.height,
        components.len(),
        mcus_x,
        mcus_y
    );

    // Per-component sample planes at component resolution
    let mut planes: Vec<Vec<u8>> = Vec::with_capacity(components.len());
    let mut plane_dims: Vec<(usize, usize)> = Vec::with_capacity(components.len());
    for c in components {
        let w = mcus_x * c.h_samp * 8;
        let h = mcus_y * c.v_samp * 8;
        planes.push(vec![0u8; w * h]);
        plane_dims.push((w, h));
    }

    let dct = Dct::new();
    let mut bits = BitReader::new(scan);
    let mut dc_prev = vec![0i32; components.len()];
    let mut restart_index = 0u8;
    let mut mcu_count = 0u32;

    for my in 0..mcus_y {
        for mx in 0..mcus_x {
            if restart_interval > 0 && mcu_count > 0 && mcu_count % u32::from(restart_interval) == 0
            {
                bits.consume_restart(restart_index)?;
                restart_index = (restart_index + 1) % 8;
                dc_prev.fill(0);
            }

            for (ci, c) in components.iter().enumerate() {
                let qtable = quant[c.quant_id]
                    .as_ref()
                    .ok_or_else(|| Error::corrupt("JPEG scan", "missing quantization table"))?;
                let dc_huff = dc_tables[c.dc_table]
                    .as_ref()
                    .ok_or_else(|| Error::corrupt("JPEG scan", "missing DC Huffman table"))?;
                let ac_huff = ac_tables[c.ac_table]
                    .as_ref()
                    .ok_or_else(|| Error::corrupt("JPEG scan", "missing AC Huffman table"))?;

                for bv in 0..c.v_samp {
                    for bh in 0..c.h_samp {
                        let mut block = [0i32; 64];

                        let dc_size = dc_huff.decode(&mut bits)?;
                        if dc_size > 11 {
                            return Err(Error::corrupt(
                                "JPEG scan",
                                format!("DC magnitude category {dc_size}"),
                            ));
                        }
                        let diff = extend(bits.read_bits(dc_size)?, dc_size);
                        dc_prev[ci] += diff;
                        block[0] = dc_prev[ci] * i32::from(qtable[0]);

                        let mut k = 1usize;
                        while k < 64 {
                            let symbol = ac_huff.decode(&mut bits)?;
                            let run = usize::from(symbol >> 4);
                            let size = symbol & 0x0F;
                            if size == 0 {
                                if symbol == 0x00 {
                                    break; // EOB
                                }
                                if symbol == 0xF0 {
                                    k += 16; // ZRL
                                    continue;
                                }
                                return Err(Error::corrupt(
                                    "JPEG scan",
                                    format!("AC symbol {symbol:02X}"),
                                ));
                            }
                            k += run;
                            if k > 63 {
                                return Err(Error::corrupt(
                                    "JPEG scan",
                                    "AC run past end of block",
                                ));
                            }
                            let value = extend(bits.read_bits(size)?, size);
                            let pos = ZIGZAG[k];
                            block[pos] = value * i32::from(qtable[pos]);
                            k += 1;
                        }

                        let spatial = dct.inverse(&block);

                        let (pw, _) = plane_dims[ci];
                        let origin_x = (mx * c.h_samp + bh) * 8;
                        let origin_y = (my * c.v_samp + bv) * 8;
                        for row in 0..8 {
                            let dst = (origin_y + row) * pw + origin_x;
                            planes[ci][dst..dst + 8]
                                .copy_from_slice(&spatial[row * 8..row * 8 + 8]);
                        }
                    }
                }
            }
            mcu_count += 1;
        }
    }

    let width = frame.width as usize;
    let height = frame.height as usize;

    if components.len() == 1 {
        let (pw, _) = plane_dims[0];
        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                pixels.push(L(planes[0][y * pw + x]));
            }
        }
        return Ok(ImageBuffer::from_pixels(frame.width, pixels)?.into());
    }

    // YCbCr -> RGB with nearest-neighbor chroma upsampling
    let (yw, _) = plane_dims[0];
    let (cbw, cbh) = plane_dims[1];
    let (crw, crh) = plane_dims[2];
    let mut pixels = Vec::with_capacity(width * height);
    for py in 0..height {
        for px in 0..width {
            let y = f32::from(planes[0][py * yw + px]);
            let cb_x = (px * components[1].h_samp / max_h).min(cbw - 1);
            let cb_y = (py * components[1].v_samp / max_v).min(cbh - 1);
            let cb = f32::from(planes[1][cb_y * cbw + cb_x]) - 128.0;
            let cr_x = (px * components[2].h_samp / max_h).min(crw - 1);
            let cr_y = (py * components[2].v_samp / max_v).min(crh - 1);
            let cr = f32::from(planes[2][cr_y * crw + cr_x]) - 128.0;

            let r = (y + 1.402 * cr).round().clamp(0.0, 255.0) as u8;
            let g = (y - 0.344136 * cb - 0.714136 * cr).round().clamp(0.0, 255.0) as u8;
            let b = (y + 1.772 * cb).round().clamp(0.0, 255.0) as u8;
            pixels.push(Rgb::new(r, g, b));
        }
    }
    Ok(ImageBuffer::from_pixels(frame.width, pixels)?.into())
}

// --- encoding ---

/// Scale an Annex K base table by quality, libjpeg-style
fn scaled_quant_table(base: &[u16; 64], quality: u8) -> [u16; 64] {
    let quality = u32::from(quality.clamp(1, 100));
    let scale = if quality < 50 {
        5000 / quality
    } else {
        200 - 2 * quality
    };
    let mut table = [0u16; 64];
    for (out, &b) in table.iter_mut().zip(base.iter()) {
        *out = ((u32::from(b) * scale + 50) / 100).clamp(1, 255) as u16;
    }
    table
}

/// Canonical Huffman encoding table: symbol -> (code, length)
struct HuffmanEncoder {
    codes: [(u16, u8); 256],
}

impl HuffmanEncoder {
    fn build(bits: &[u8; 16], values: &[u8]) -> Self {
        let mut codes = [(0u16, 0u8); 256];
        let mut code = 0u16;
        let mut index = 0usize;
        for len in 1..=16u8 {
            for _ in 0..bits[len as usize - 1] {
                codes[usize::from(values[index])] = (code, len);
                code += 1;
                index += 1;
            }
            code <<= 1;
        }
        Self { codes }
    }

    fn get(&self, symbol: u8) -> (u16, u8) {
        self.codes[usize::from(symbol)]
    }
}

/// MSB-first bit writer with 0xFF byte stuffing; flush pads with 1-bits
struct BitWriter {
    buf: u32,
    cnt: u8,
}

impl BitWriter {
    fn new() -> Self {
        Self { buf: 0, cnt: 0 }
    }

    fn write(&mut self, out: &mut Vec<u8>, code: u32, len: u8) {
        for i in (0..len).rev() {
            self.buf = (self.buf << 1) | ((code >> i) & 1);
            self.cnt += 1;
            if self.cnt == 8 {
                let byte = (self.buf & 0xFF) as u8;
                out.push(byte);
                if byte == 0xFF {
                    out.push(0x00);
                }
                self.buf = 0;
                self.cnt = 0;
            }
        }
    }

    fn flush(&mut self, out: &mut Vec<u8>) {
        while self.cnt != 0 {
            self.write(out, 1, 1);
        }
    }
}

/// Magnitude category of a coefficient (number of bits)
fn category(value: i32) -> u8 {
    (32 - value.unsigned_abs().leading_zeros()) as u8
}

/// Low `cat` bits encoding a signed magnitude
fn magnitude_bits(value: i32, cat: u8) -> u32 {
    let v = if value < 0 { value - 1 } else { value };
    (v as u32) & ((1u32 << cat) - 1)
}

fn write_marker(out: &mut Vec<u8>, marker: u8, data: &[u8]) {
    out.extend_from_slice(&[0xFF, marker]);
    out.extend_from_slice(&((data.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(data);
}

fn write_dqt(out: &mut Vec<u8>, id: u8, table: &[u16; 64]) {
    let mut data = Vec::with_capacity(65);
    data.push(id);
    for zz in 0..64 {
        data.push(table[ZIGZAG[zz]] as u8);
    }
    write_marker(out, MARKER_DQT, &data);
}

fn write_dht(out: &mut Vec<u8>, spec: u8, bits: &[u8; 16], values: &[u8]) {
    let mut data = Vec::with_capacity(1 + 16 + values.len());
    data.push(spec);
    data.extend_from_slice(bits);
    data.extend_from_slice(values);
    write_marker(out, MARKER_DHT, &data);
}

struct BlockEncoder<'a> {
    dct: Dct,
    bits: BitWriter,
    out: &'a mut Vec<u8>,
}

impl BlockEncoder<'_> {
    /// Quantize, zigzag and entropy-code one level-shifted 8x8 block.
    /// Returns the quantized DC value for the next block's predictor.
    fn encode_block(
        &mut self,
        samples: &[f32; 64],
        qtable: &[u16; 64],
        dc_huff: &HuffmanEncoder,
        ac_huff: &HuffmanEncoder,
        dc_prev: i32,
    ) -> i32 {
        let coefficients = self.dct.forward(samples);
        let mut quantized = [0i32; 64];
        for zz in 0..64 {
            let pos = ZIGZAG[zz];
            // Baseline coefficients are 11 bits; keeps every symbol inside
            // the standard Huffman tables
            quantized[zz] =
                ((coefficients[pos] / f32::from(qtable[pos])).round() as i32).clamp(-1023, 1023);
        }

        let diff = quantized[0] - dc_prev;
        let cat = category(diff);
        let (code, len) = dc_huff.get(cat);
        self.bits.write(self.out, u32::from(code), len);
        if cat > 0 {
            self.bits.write(self.out, magnitude_bits(diff, cat), cat);
        }

        let mut run = 0u8;
        for &value in &quantized[1..] {
            if value == 0 {
                run += 1;
                continue;
            }
            while run >= 16 {
                let (code, len) = ac_huff.get(0xF0);
                self.bits.write(self.out, u32::from(code), len);
                run -= 16;
            }
            let cat = category(value);
            let (code, len) = ac_huff.get(run << 4 | cat);
            self.bits.write(self.out, u32::from(code), len);
            self.bits.write(self.out, magnitude_bits(value, cat), cat);
            run = 0;
        }
        if run > 0 {
            let (code, len) = ac_huff.get(0x00);
            self.bits.write(self.out, u32::from(code), len);
        }

        quantized[0]
    }
}

/// Extract one 8x8 level-shifted block from a plane, replicating edges
fn extract_block(
    plane: &[u8],
    width: usize,
    height: usize,
    block_x: usize,
    block_y: usize,
) -> [f32; 64] {
    let mut samples = [0f32; 64];
    for row in 0..8 {
        for col in 0..8 {
            let x = (block_x * 8 + col).min(width - 1);
            let y = (block_y * 8 + row).min(height - 1);
            samples[row * 8 + col] = f32::from(plane[y * width + x]) - 128.0;
        }
    }
    samples
}

impl ImageEncoder for JpegCodec {
    fn format(&self) -> ImageFormat {
        ImageFormat::Jpeg
    }

    fn encode(&self, image: &Image, out: &mut Vec<u8>) -> Result<()> {
        let (width, height) = image.dimensions();
        if width > u32::from(u16::MAX) || height > u32::from(u16::MAX) {
            return Err(Error::EncodingError(format!(
                "{width}x{height} exceeds the 65535x65535 JPEG limit"
            )));
        }
        let w = width as usize;
        let h = height as usize;
        let grayscale = matches!(image.color_type(), ColorType::L);

        // Component planes: Y only, or full-resolution Y, Cb, Cr
        let planes: Vec<Vec<u8>> = if grayscale {
            let Image::L(buf) = image else { unreachable!() };
            vec![buf.pixels().map(|p| p.0).collect()]
        } else {
            let rgba = image.to_rgba_buffer();
            let mut y = Vec::with_capacity(w * h);
            let mut cb = Vec::with_capacity(w * h);
            let mut cr = Vec::with_capacity(w * h);
            for p in rgba.pixels() {
                let (r, g, b) = (f32::from(p.r), f32::from(p.g), f32::from(p.b));
                y.push((0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8);
                cb.push((-0.168736 * r - 0.331264 * g + 0.5 * b + 128.0)
                    .round()
                    .clamp(0.0, 255.0) as u8);
                cr.push((0.5 * r - 0.418688 * g - 0.081312 * b + 128.0)
                    .round()
                    .clamp(0.0, 255.0) as u8);
            }
            vec![y, cb, cr]
        };

        let luma_quant = scaled_quant_table(&BASE_LUMA_QUANT, self.quality);
        let chroma_quant = scaled_quant_table(&BASE_CHROMA_QUANT, self.quality);

        out.extend_from_slice(&[0xFF, MARKER_SOI]);
        // JFIF identification segment
        write_marker(
            out,
            0xE0,
            &[b'J', b'F', b'I', b'F', 0, 1, 1, 0, 0, 1, 0, 1, 0, 0],
        );
        write_dqt(out, 0, &luma_quant);
        if !grayscale {
            write_dqt(out, 1, &chroma_quant);
        }

        // SOF0: 4:4:4 sampling keeps block geometry identical per component
        let mut sof = Vec::new();
        sof.push(8u8);
        sof.extend_from_slice(&(height as u16).to_be_bytes());
        sof.extend_from_slice(&(width as u16).to_be_bytes());
        if grayscale {
            sof.push(1);
            sof.extend_from_slice(&[1, 0x11, 0]);
        } else {
            sof.push(3);
            sof.extend_from_slice(&[1, 0x11, 0]);
            sof.extend_from_slice(&[2, 0x11, 1]);
            sof.extend_from_slice(&[3, 0x11, 1]);
        }
        write_marker(out, MARKER_SOF0, &sof);

        write_dht(out, 0x00, &DC_LUMA_BITS, &DC_LUMA_VALS);
        write_dht(out, 0x10, &AC_LUMA_BITS, &AC_LUMA_VALS);
        if !grayscale {
            write_dht(out, 0x01, &DC_CHROMA_BITS, &DC_CHROMA_VALS);
            write_dht(out, 0x11, &AC_CHROMA_BITS, &AC_CHROMA_VALS);
        }

        let sos: &[u8] = if grayscale {
            &[1, 1, 0x00, 0, 63, 0]
        } else {
            &[3, 1, 0x00, 2, 0x11, 3, 0x11, 0, 63, 0]
        };
        write_marker(out, MARKER_SOS, sos);

        let dc_luma = HuffmanEncoder::build(&DC_LUMA_BITS, &DC_LUMA_VALS);
        let ac_luma = HuffmanEncoder::build(&AC_LUMA_BITS, &AC_LUMA_VALS);
        let dc_chroma = HuffmanEncoder::build(&DC_CHROMA_BITS, &DC_CHROMA_VALS);
        let ac_chroma = HuffmanEncoder::build(&AC_CHROMA_BITS, &AC_CHROMA_VALS);

        let mut encoder = BlockEncoder {
            dct: Dct::new(),
            bits: BitWriter::new(),
            out,
        };
        let mut dc_prev = [0i32; 3];
        for by in 0..h.div_ceil(8) {
            for bx in 0..w.div_ceil(8) {
                for (ci, plane) in planes.iter().enumerate() {
                    let (qtable, dc_huff, ac_huff) = if ci == 0 {
                        (&luma_quant, &dc_luma, &ac_luma)
                    } else {
                        (&chroma_quant, &dc_chroma, &ac_chroma)
                    };
                    let samples = extract_block(plane, w, h, bx, by);
                    dc_prev[ci] =
                        encoder.encode_block(&samples, qtable, dc_huff, ac_huff, dc_prev[ci]);
                }
            }
        }
        encoder.bits.flush(encoder.out);
        encoder.out.extend_from_slice(&[0xFF, MARKER_EOI]);
        Ok(())
    }
}

//! Minimal FITS primary-HDU reader
//!
//! Only what preview rendering needs: the header cards of the primary HDU and
//! the first 2-D plane of its data array, scaled to physical values.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────────────────┐
//! │ header: 80-byte cards    │  padded to a multiple of 2880 bytes,
//! │ SIMPLE, BITPIX, NAXIS... │  terminated by an END card
//! ├──────────────────────────┤
//! │ data: big-endian samples │  NAXIS1 varies fastest (columns),
//! │ row 0 = bottom of frame  │  then NAXIS2 (rows), then planes
//! └──────────────────────────┘
//! ```

use crate::error::{RelayError, Result};
use byteorder::{BigEndian, ByteOrder};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

pub const BLOCK_SIZE: usize = 2880;
const CARD_SIZE: usize = 80;
const MAX_AXES: usize = 999;

/// One keyword card from the header.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderCard {
    pub keyword: String,
    /// Value field with comments stripped and string quotes removed.
    pub value: Option<String>,
}

/// Parsed primary header.
#[derive(Debug, Clone, Default)]
pub struct FitsHeader {
    cards: Vec<HeaderCard>,
}

impl FitsHeader {
    pub fn value(&self, keyword: &str) -> Option<&str> {
        self.cards
            .iter()
            .find(|c| c.keyword == keyword)
            .and_then(|c| c.value.as_deref())
    }

    pub fn int(&self, keyword: &str) -> Option<i64> {
        let raw = self.value(keyword)?;
        raw.parse::<i64>()
            .ok()
            .or_else(|| parse_float(raw).filter(|v| v.fract() == 0.0).map(|v| v as i64))
    }

    pub fn float(&self, keyword: &str) -> Option<f64> {
        self.value(keyword).and_then(parse_float)
    }
}

/// Sample encoding declared by `BITPIX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bitpix {
    U8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl Bitpix {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            8 => Some(Bitpix::U8),
            16 => Some(Bitpix::I16),
            32 => Some(Bitpix::I32),
            64 => Some(Bitpix::I64),
            -32 => Some(Bitpix::F32),
            -64 => Some(Bitpix::F64),
            _ => None,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Bitpix::U8 | Bitpix::I16 | Bitpix::I32 | Bitpix::I64)
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            Bitpix::U8 => 1,
            Bitpix::I16 => 2,
            Bitpix::I32 | Bitpix::F32 => 4,
            Bitpix::I64 | Bitpix::F64 => 8,
        }
    }
}

/// First image plane of a primary HDU, in physical units.
#[derive(Debug, Clone)]
pub struct FitsImage {
    pub header: FitsHeader,
    pub bitpix: Bitpix,
    pub width: usize,
    pub height: usize,
    /// Row-major, `pixels[y * width + x]`, row 0 at the bottom of the frame.
    /// Blank integer samples are NaN.
    pub pixels: Vec<f64>,
}

/// Read the primary HDU image from a FITS file.
pub fn read_primary(path: &Path) -> Result<FitsImage> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    read_primary_from(&mut reader, path)
}

/// Read the primary HDU image from any byte source; `path` is used for errors.
pub fn read_primary_from<R: Read>(reader: &mut R, path: &Path) -> Result<FitsImage> {
    let header = read_header(reader, path)?;

    match header.cards.first() {
        Some(card) if card.keyword == "SIMPLE" && card.value.as_deref() == Some("T") => {}
        _ => return Err(RelayError::fits(path, "missing SIMPLE = T, not a FITS file")),
    }

    let bitpix_code = header
        .int("BITPIX")
        .ok_or_else(|| RelayError::fits(path, "missing BITPIX"))?;
    let bitpix = Bitpix::from_code(bitpix_code)
        .ok_or_else(|| RelayError::fits(path, format!("unsupported BITPIX {}", bitpix_code)))?;

    let naxis = header
        .int("NAXIS")
        .ok_or_else(|| RelayError::fits(path, "missing NAXIS"))?;
    if naxis < 0 || naxis as usize > MAX_AXES {
        return Err(RelayError::fits(path, format!("invalid NAXIS {}", naxis)));
    }
    if naxis == 0 {
        return Err(RelayError::NoData(path.to_path_buf()));
    }

    let mut axes = Vec::with_capacity(naxis as usize);
    for n in 1..=naxis {
        let keyword = format!("NAXIS{}", n);
        let len = header
            .int(&keyword)
            .ok_or_else(|| RelayError::fits(path, format!("missing {}", keyword)))?;
        if len < 0 {
            return Err(RelayError::fits(path, format!("negative {}", keyword)));
        }
        axes.push(len as usize);
    }
    if axes.iter().any(|&len| len == 0) {
        return Err(RelayError::NoData(path.to_path_buf()));
    }

    let width = axes[0];
    let height = axes.get(1).copied().unwrap_or(1);
    let count = width
        .checked_mul(height)
        .ok_or_else(|| RelayError::fits(path, "image dimensions overflow"))?;

    let bscale = header.float("BSCALE").unwrap_or(1.0);
    let bzero = header.float("BZERO").unwrap_or(0.0);
    let blank = if bitpix.is_integer() {
        header.int("BLANK")
    } else {
        None
    };

    let data_len = count
        .checked_mul(bitpix.bytes_per_sample())
        .ok_or_else(|| RelayError::fits(path, "image dimensions overflow"))?;

    // Sized by the bytes present, not by the header.
    let mut data = Vec::new();
    reader.by_ref().take(data_len as u64).read_to_end(&mut data)?;
    if data.len() < data_len {
        return Err(RelayError::fits(path, "data section is truncated"));
    }
    let raw = decode_samples(&data, bitpix);

    let pixels = match raw {
        Samples::Int(values) => values
            .into_iter()
            .map(|v| {
                if blank == Some(v) {
                    f64::NAN
                } else {
                    bzero + bscale * v as f64
                }
            })
            .collect(),
        Samples::Float(values) => values.into_iter().map(|v| bzero + bscale * v).collect(),
    };

    Ok(FitsImage {
        header,
        bitpix,
        width,
        height,
        pixels,
    })
}

enum Samples {
    Int(Vec<i64>),
    Float(Vec<f64>),
}

fn decode_samples(data: &[u8], bitpix: Bitpix) -> Samples {
    let width = bitpix.bytes_per_sample();
    let words = data.chunks_exact(width);
    match bitpix {
        Bitpix::U8 => Samples::Int(data.iter().map(|&b| i64::from(b)).collect()),
        Bitpix::I16 => Samples::Int(words.map(|w| i64::from(BigEndian::read_i16(w))).collect()),
        Bitpix::I32 => Samples::Int(words.map(|w| i64::from(BigEndian::read_i32(w))).collect()),
        Bitpix::I64 => Samples::Int(words.map(BigEndian::read_i64).collect()),
        Bitpix::F32 => Samples::Float(words.map(|w| f64::from(BigEndian::read_f32(w))).collect()),
        Bitpix::F64 => Samples::Float(words.map(BigEndian::read_f64).collect()),
    }
}

fn read_header<R: Read>(reader: &mut R, path: &Path) -> Result<FitsHeader> {
    let mut cards = Vec::new();
    let mut block = [0u8; BLOCK_SIZE];

    loop {
        reader.read_exact(&mut block).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                RelayError::fits(path, "header is truncated or has no END card")
            } else {
                RelayError::Io(e)
            }
        })?;

        for raw in block.chunks_exact(CARD_SIZE) {
            let card = parse_card(raw);
            if card.keyword == "END" {
                return Ok(FitsHeader { cards });
            }
            if !card.keyword.is_empty() {
                cards.push(card);
            }
        }
    }
}

fn parse_card(raw: &[u8]) -> HeaderCard {
    let text = String::from_utf8_lossy(raw);
    let keyword = text.get(..8).unwrap_or(text.as_ref()).trim().to_string();

    let value = if text.get(8..10) == Some("= ") {
        text.get(10..).and_then(parse_value)
    } else {
        None
    };

    HeaderCard { keyword, value }
}

fn parse_value(field: &str) -> Option<String> {
    let field = field.trim_start();
    if let Some(rest) = field.strip_prefix('\'') {
        // Quoted string; '' is an escaped quote.
        let mut out = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch == '\'' {
                if chars.peek() == Some(&'\'') {
                    out.push('\'');
                    chars.next();
                } else {
                    break;
                }
            } else {
                out.push(ch);
            }
        }
        return Some(out.trim_end().to_string());
    }

    let value = field.split('/').next().unwrap_or("").trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_float(raw: &str) -> Option<f64> {
    raw.replace(['D', 'd'], "E").parse::<f64>().ok()
}

//! Reader and writer for NumPy `.npy` single-array files.
//!
//! Only what sample files need: numeric dtypes converted to `f64`, any shape
//! flattened in storage order. A file that ends before its header or data is
//! complete is reported as [`LoadError::Truncated`], which is what a reader
//! sees while the producer is still writing.

use crate::core::sample::{LoadError, SampleArray};
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};
use std::path::Path;

const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Header alignment used by current NumPy writers.
const HEADER_ALIGN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Float,
    Int,
    Uint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Dtype {
    kind: Kind,
    size: usize,
    big_endian: bool,
}

impl Dtype {
    fn parse(descr: &str) -> Result<Self, LoadError> {
        let mut chars = descr.chars();
        let (order, rest) = match chars.next() {
            Some(c @ ('<' | '>' | '|' | '=')) => (c, chars.as_str()),
            _ => ('=', descr),
        };
        let mut rest_chars = rest.chars();
        let kind = match rest_chars.next() {
            Some('f') => Kind::Float,
            Some('i') => Kind::Int,
            Some('u') => Kind::Uint,
            _ => return Err(LoadError::Format(format!("unsupported dtype '{descr}'"))),
        };
        let size: usize = rest_chars
            .as_str()
            .parse()
            .map_err(|_| LoadError::Format(format!("unsupported dtype '{descr}'")))?;

        let supported = match kind {
            Kind::Float => matches!(size, 4 | 8),
            Kind::Int | Kind::Uint => matches!(size, 1 | 2 | 4 | 8),
        };
        if !supported {
            return Err(LoadError::Format(format!("unsupported dtype '{descr}'")));
        }

        Ok(Self {
            kind,
            size,
            big_endian: order == '>',
        })
    }
}

/// Parsed `.npy` header.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Header {
    dtype: Dtype,
    shape: Vec<usize>,
}

impl Header {
    fn parse(text: &str) -> Result<Self, LoadError> {
        let descr = quoted_value(text, "descr")
            .ok_or_else(|| LoadError::Format("header has no 'descr'".to_string()))?;
        let shape = shape_value(text)
            .ok_or_else(|| LoadError::Format("header has no valid 'shape'".to_string()))?;
        Ok(Self {
            dtype: Dtype::parse(descr)?,
            shape,
        })
    }

    fn count(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Text following `'key':` in the header dict.
fn after_key<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let quoted = format!("'{key}'");
    let at = text.find(&quoted)? + quoted.len();
    let rest = text[at..].trim_start();
    Some(rest.strip_prefix(':')?.trim_start())
}

fn quoted_value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let rest = after_key(text, key)?;
    let quote = rest.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let body = &rest[1..];
    body.find(quote).map(|end| &body[..end])
}

fn shape_value(text: &str) -> Option<Vec<usize>> {
    let rest = after_key(text, "shape")?.strip_prefix('(')?;
    let inner = &rest[..rest.find(')')?];
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('L').parse().ok())
        .collect()
}

/// Read a sample array from a `.npy` file.
pub fn read_sample_array(path: &Path) -> Result<SampleArray, LoadError> {
    let bytes = std::fs::read(path)?;
    decode(&bytes)
}

/// Decode the bytes of a `.npy` file.
pub fn decode(bytes: &[u8]) -> Result<SampleArray, LoadError> {
    if bytes.len() < 10 {
        return Err(LoadError::Truncated {
            expected: 10,
            found: bytes.len(),
        });
    }
    if &bytes[..6] != MAGIC {
        return Err(LoadError::Format("missing NUMPY magic".to_string()));
    }

    let major = bytes[6];
    let (prefix, header_len) = match major {
        1 => (10, LittleEndian::read_u16(&bytes[8..10]) as usize),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(LoadError::Truncated {
                    expected: 12,
                    found: bytes.len(),
                });
            }
            (12, LittleEndian::read_u32(&bytes[8..12]) as usize)
        }
        v => return Err(LoadError::Format(format!("unsupported format version {v}"))),
    };

    let data_start = prefix + header_len;
    if bytes.len() < data_start {
        return Err(LoadError::Truncated {
            expected: data_start,
            found: bytes.len(),
        });
    }
    let text = std::str::from_utf8(&bytes[prefix..data_start])
        .map_err(|e| LoadError::Format(format!("header is not text: {e}")))?;
    let header = Header::parse(text)?;

    let count = header.count();
    let expected = data_start + count * header.dtype.size;
    if bytes.len() < expected {
        return Err(LoadError::Truncated {
            expected,
            found: bytes.len(),
        });
    }

    let data = &bytes[data_start..expected];
    let values = if header.dtype.big_endian {
        decode_values::<BigEndian>(data, header.dtype, count)?
    } else {
        decode_values::<LittleEndian>(data, header.dtype, count)?
    };
    Ok(SampleArray::new(values))
}

fn decode_values<E: ByteOrder>(
    data: &[u8],
    dtype: Dtype,
    count: usize,
) -> Result<Vec<f64>, LoadError> {
    let mut cursor = Cursor::new(data);
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        let value = match (dtype.kind, dtype.size) {
            (Kind::Float, 8) => cursor.read_f64::<E>()?,
            (Kind::Float, _) => cursor.read_f32::<E>()? as f64,
            (Kind::Int, 1) => cursor.read_i8()? as f64,
            (Kind::Int, 2) => cursor.read_i16::<E>()? as f64,
            (Kind::Int, 4) => cursor.read_i32::<E>()? as f64,
            (Kind::Int, _) => cursor.read_i64::<E>()? as f64,
            (Kind::Uint, 1) => cursor.read_u8()? as f64,
            (Kind::Uint, 2) => cursor.read_u16::<E>()? as f64,
            (Kind::Uint, 4) => cursor.read_u32::<E>()? as f64,
            (Kind::Uint, _) => cursor.read_u64::<E>()? as f64,
        };
        values.push(value);
    }
    Ok(values)
}

/// Encode a 1-D `float64` array as a version 1.0 `.npy` file.
pub fn encode(values: &[f64]) -> Vec<u8> {
    let dict = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': ({},), }}",
        values.len()
    );
    // Pad with spaces so the data starts on an aligned offset; the header
    // always ends in a newline.
    let unpadded = 10 + dict.len() + 1;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    let header_len = dict.len() + padding + 1;

    let mut out = Vec::with_capacity(10 + header_len + values.len() * 8);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    // Writing into a Vec cannot fail.
    let _ = out.write_u16::<LittleEndian>(header_len as u16);
    out.extend_from_slice(dict.as_bytes());
    out.extend(std::iter::repeat(b' ').take(padding));
    out.push(b'\n');
    for value in values {
        let _ = out.write_f64::<LittleEndian>(*value);
    }
    out
}

/// Write a 1-D `float64` array to `path`.
pub fn write_sample_array(path: &Path, values: &[f64]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(&encode(values))?;
    file.flush()
}

//! PCD file loading functions

use crate::error::{DataError, Result};
use crate::pcd::{PcdEncoding, PcdHeader};
use byteorder::{ByteOrder, LittleEndian};
use glam::Vec3;
use std::path::Path;
use tracing::{debug, info, warn};

/// Point positions read from a PCD file, with the parsed header.
#[derive(Debug, Clone)]
pub struct PcdCloud {
    pub header: PcdHeader,
    pub positions: Vec<Vec3>,
}

impl PcdCloud {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Label declared in the header, if any.
    pub fn label(&self) -> Option<i32> {
        self.header.label
    }
}

/// Load point positions from a PCD file.
///
/// Only the `x`, `y` and `z` fields are kept. Points with a non-finite
/// coordinate (PCD's marker for invalid samples) are dropped.
#[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_pcd(path: impl AsRef<Path>) -> Result<PcdCloud> {
    let path = path.as_ref();
    debug!("Loading PCD file");
    let bytes = std::fs::read(path).map_err(|e| DataError::io(path, e))?;
    parse_pcd(path, &bytes)
}

/// Parse an in-memory PCD document. `path` is only used in error messages.
pub fn parse_pcd(path: &Path, bytes: &[u8]) -> Result<PcdCloud> {
    let (header_lines, body_start) = split_header(path, bytes)?;
    let header = PcdHeader::parse(path, header_lines.iter().map(String::as_str))?;

    let body = &bytes[body_start..];
    let positions = match header.encoding {
        PcdEncoding::Ascii => read_ascii(path, &header, body)?,
        PcdEncoding::Binary => read_binary(path, &header, body)?,
        PcdEncoding::BinaryCompressed => {
            return Err(DataError::UnsupportedEncoding {
                path: path.to_path_buf(),
                encoding: "binary_compressed".to_string(),
            });
        }
    };

    if positions.is_empty() {
        warn!("PCD file contains no valid points");
    }
    info!(
        "PCD file parsed: {} valid points of {} declared",
        positions.len(),
        header.points
    );

    Ok(PcdCloud { header, positions })
}

/// Split header lines from the body; returns the lines and the body offset.
fn split_header(path: &Path, bytes: &[u8]) -> Result<(Vec<String>, usize)> {
    let mut lines = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let end = bytes[pos..]
            .iter()
            .position(|b| *b == b'\n')
            .map(|i| pos + i)
            .unwrap_or(bytes.len());
        let line = std::str::from_utf8(&bytes[pos..end])
            .map_err(|_| DataError::parse(path, "header is not valid UTF-8"))?
            .trim_end_matches('\r')
            .to_string();
        pos = (end + 1).min(bytes.len());
        let is_data = line
            .split_whitespace()
            .next()
            .is_some_and(|k| k.eq_ignore_ascii_case("DATA"));
        lines.push(line);
        if is_data {
            return Ok((lines, pos));
        }
    }
    Err(DataError::parse(path, "missing DATA line"))
}

fn xyz_offsets(path: &Path, header: &PcdHeader, offset: impl Fn(&str) -> Option<usize>) -> Result<[usize; 3]> {
    let mut out = [0; 3];
    for (slot, name) in out.iter_mut().zip(["x", "y", "z"]) {
        *slot = offset(name).ok_or_else(|| DataError::parse(path, format!("missing '{name}' field")))?;
    }
    debug!("Coordinate offsets {:?} in fields {:?}", out, header.fields);
    Ok(out)
}

fn read_ascii(path: &Path, header: &PcdHeader, body: &[u8]) -> Result<Vec<Vec3>> {
    let offsets = xyz_offsets(path, header, |n| header.element_offset(n))?;
    let text = std::str::from_utf8(body).map_err(|_| DataError::parse(path, "ASCII data is not valid UTF-8"))?;
    let per_point = header.elements_per_point();

    let mut positions = Vec::with_capacity(header.points);
    let mut skipped = 0usize;
    for (i, line) in text.lines().map(str::trim).filter(|l| !l.is_empty()).enumerate() {
        if i >= header.points {
            break;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < per_point {
            return Err(DataError::parse(
                path,
                format!("point {i} has {} values, expected {per_point}", tokens.len()),
            ));
        }
        let mut xyz = [0.0f32; 3];
        for (value, &offset) in xyz.iter_mut().zip(&offsets) {
            *value = tokens[offset]
                .parse::<f32>()
                .map_err(|_| DataError::parse(path, format!("invalid coordinate '{}' at point {i}", tokens[offset])))?;
        }
        let p = Vec3::from_array(xyz);
        if p.is_finite() {
            positions.push(p);
        } else {
            skipped += 1;
        }
    }

    if positions.len() + skipped < header.points {
        return Err(DataError::parse(
            path,
            format!("expected {} points, found {}", header.points, positions.len() + skipped),
        ));
    }
    if skipped > 0 {
        debug!("Skipped {} non-finite points", skipped);
    }
    Ok(positions)
}

fn read_binary(path: &Path, header: &PcdHeader, body: &[u8]) -> Result<Vec<Vec3>> {
    let offsets = xyz_offsets(path, header, |n| header.byte_offset(n))?;
    let mut kinds = [(' ', 0usize); 3];
    for (kind, name) in kinds.iter_mut().zip(["x", "y", "z"]) {
        *kind = header
            .field_type(name)
            .ok_or_else(|| DataError::parse(path, format!("missing type for '{name}'")))?;
    }

    let stride = header.bytes_per_point();
    let needed = stride * header.points;
    if body.len() < needed {
        return Err(DataError::parse(
            path,
            format!("binary data holds {} bytes, expected {needed}", body.len()),
        ));
    }

    let mut positions = Vec::with_capacity(header.points);
    for record in body[..needed].chunks_exact(stride) {
        let mut xyz = [0.0f32; 3];
        for ((value, &offset), &(ty, size)) in xyz.iter_mut().zip(&offsets).zip(&kinds) {
            *value = read_scalar(&record[offset..offset + size], ty, size)
                .ok_or_else(|| DataError::parse(path, format!("unsupported scalar {ty}{size}")))?
                as f32;
        }
        let p = Vec3::from_array(xyz);
        if p.is_finite() {
            positions.push(p);
        }
    }
    Ok(positions)
}

fn read_scalar(bytes: &[u8], ty: char, size: usize) -> Option<f64> {
    Some(match (ty, size) {
        ('F', 4) => LittleEndian::read_f32(bytes) as f64,
        ('F', 8) => LittleEndian::read_f64(bytes),
        ('I', 1) => bytes[0] as i8 as f64,
        ('I', 2) => LittleEndian::read_i16(bytes) as f64,
        ('I', 4) => LittleEndian::read_i32(bytes) as f64,
        ('I', 8) => LittleEndian::read_i64(bytes) as f64,
        ('U', 1) => bytes[0] as f64,
        ('U', 2) => LittleEndian::read_u16(bytes) as f64,
        ('U', 4) => LittleEndian::read_u32(bytes) as f64,
        ('U', 8) => LittleEndian::read_u64(bytes) as f64,
        _ => return None,
    })
}

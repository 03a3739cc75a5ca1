//! PCD header structures

use crate::error::{DataError, Result};
use std::path::Path;

/// Encoding of the point records following the `DATA` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcdEncoding {
    Ascii,
    Binary,
    BinaryCompressed,
}

/// Parsed PCD header.
#[derive(Debug, Clone, PartialEq)]
pub struct PcdHeader {
    pub version: Option<String>,
    pub fields: Vec<String>,
    pub sizes: Vec<usize>,
    pub types: Vec<char>,
    pub counts: Vec<usize>,
    pub width: usize,
    pub height: usize,
    pub points: usize,
    pub encoding: PcdEncoding,
    /// Label taken from a `# label <n>` comment, if present.
    pub label: Option<i32>,
}

impl PcdHeader {
    /// Parse header lines up to and including `DATA`.
    ///
    /// `lines` yields the header lines in order; parsing stops at `DATA`.
    pub(crate) fn parse<'a>(path: &Path, lines: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut version = None;
        let mut fields = Vec::new();
        let mut sizes = Vec::new();
        let mut types = Vec::new();
        let mut counts = Vec::new();
        let mut width = None;
        let mut height = None;
        let mut points = None;
        let mut encoding = None;
        let mut label = None;

        for raw in lines {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix('#') {
                if label.is_none() {
                    label = parse_label_comment(comment);
                }
                continue;
            }

            let mut tokens = line.split_whitespace();
            let Some(key) = tokens.next() else { continue };
            let values: Vec<&str> = tokens.collect();

            match key.to_ascii_uppercase().as_str() {
                "VERSION" => version = values.first().map(|v| v.to_string()),
                "FIELDS" => fields = values.iter().map(|v| v.to_string()).collect(),
                "SIZE" => sizes = parse_usizes(path, "SIZE", &values)?,
                "TYPE" => {
                    types = values
                        .iter()
                        .map(|v| {
                            let c = v.chars().next().unwrap_or(' ').to_ascii_uppercase();
                            if matches!(c, 'F' | 'I' | 'U') && v.len() == 1 {
                                Ok(c)
                            } else {
                                Err(DataError::parse(path, format!("invalid TYPE entry '{v}'")))
                            }
                        })
                        .collect::<Result<_>>()?
                }
                "COUNT" => counts = parse_usizes(path, "COUNT", &values)?,
                "WIDTH" => width = Some(parse_single(path, "WIDTH", &values)?),
                "HEIGHT" => height = Some(parse_single(path, "HEIGHT", &values)?),
                "POINTS" => points = Some(parse_single(path, "POINTS", &values)?),
                "VIEWPOINT" => {}
                "DATA" => {
                    let kind = values
                        .first()
                        .ok_or_else(|| DataError::parse(path, "DATA line has no encoding"))?;
                    encoding = Some(match kind.to_ascii_lowercase().as_str() {
                        "ascii" => PcdEncoding::Ascii,
                        "binary" => PcdEncoding::Binary,
                        "binary_compressed" => PcdEncoding::BinaryCompressed,
                        other => {
                            return Err(DataError::UnsupportedEncoding {
                                path: path.to_path_buf(),
                                encoding: other.to_string(),
                            });
                        }
                    });
                    break;
                }
                other => {
                    return Err(DataError::parse(path, format!("unknown header key '{other}'")));
                }
            }
        }

        let encoding = encoding.ok_or_else(|| DataError::parse(path, "missing DATA line"))?;
        if fields.is_empty() {
            return Err(DataError::parse(path, "missing FIELDS line"));
        }
        if counts.is_empty() {
            counts = vec![1; fields.len()];
        }
        if counts.len() != fields.len() {
            return Err(DataError::parse(path, "COUNT entries do not match FIELDS"));
        }
        if sizes.contains(&0) || counts.contains(&0) {
            return Err(DataError::parse(path, "SIZE and COUNT entries must be greater than zero"));
        }
        if encoding != PcdEncoding::Ascii && (sizes.len() != fields.len() || types.len() != fields.len()) {
            return Err(DataError::parse(
                path,
                "binary data requires one SIZE and TYPE entry per field",
            ));
        }

        let width = width.unwrap_or(0);
        let height = height.unwrap_or(1);
        let points = points.unwrap_or(width * height);

        Ok(Self {
            version,
            fields,
            sizes,
            types,
            counts,
            width,
            height,
            points,
            encoding,
            label,
        })
    }

    /// Index of the first element of `name` within one point record.
    pub fn element_offset(&self, name: &str) -> Option<usize> {
        let index = self.fields.iter().position(|f| f.eq_ignore_ascii_case(name))?;
        Some(self.counts[..index].iter().sum())
    }

    /// Number of scalar elements in one point record.
    pub fn elements_per_point(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Byte offset of `name` within one binary point record.
    pub fn byte_offset(&self, name: &str) -> Option<usize> {
        let index = self.fields.iter().position(|f| f.eq_ignore_ascii_case(name))?;
        Some(
            self.sizes[..index]
                .iter()
                .zip(&self.counts[..index])
                .map(|(s, c)| s * c)
                .sum(),
        )
    }

    /// Bytes in one binary point record.
    pub fn bytes_per_point(&self) -> usize {
        self.sizes.iter().zip(&self.counts).map(|(s, c)| s * c).sum()
    }

    /// `(type, size)` of field `name`.
    pub fn field_type(&self, name: &str) -> Option<(char, usize)> {
        let index = self.fields.iter().position(|f| f.eq_ignore_ascii_case(name))?;
        Some((*self.types.get(index)?, *self.sizes.get(index)?))
    }
}

fn parse_label_comment(comment: &str) -> Option<i32> {
    let rest = comment.trim();
    let rest = rest
        .strip_prefix("label")
        .or_else(|| rest.strip_prefix("LABEL"))?;
    let rest = rest.trim_start().trim_start_matches(':').trim();
    rest.split_whitespace().next()?.parse().ok()
}

fn parse_usizes(path: &Path, key: &str, values: &[&str]) -> Result<Vec<usize>> {
    values
        .iter()
        .map(|v| {
            v.parse::<usize>()
                .map_err(|_| DataError::parse(path, format!("invalid {key} entry '{v}'")))
        })
        .collect()
}

fn parse_single(path: &Path, key: &str, values: &[&str]) -> Result<usize> {
    match values {
        [v] => v
            .parse()
            .map_err(|_| DataError::parse(path, format!("invalid {key} value '{v}'"))),
        _ => Err(DataError::parse(path, format!("{key} expects one value"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<PcdHeader> {
        PcdHeader::parse(Path::new("test.pcd"), text.lines())
    }

    #[test]
    fn test_header_basic() {
        let header = parse(
            "# .PCD v0.7\nVERSION 0.7\nFIELDS x y z rgb\nSIZE 4 4 4 4\nTYPE F F F U\nCOUNT 1 1 1 1\nWIDTH 3\nHEIGHT 1\nVIEWPOINT 0 0 0 1 0 0 0\nPOINTS 3\nDATA ascii\n",
        )
        .unwrap();
        assert_eq!(header.fields, vec!["x", "y", "z", "rgb"]);
        assert_eq!(header.points, 3);
        assert_eq!(header.encoding, PcdEncoding::Ascii);
        assert_eq!(header.element_offset("z"), Some(2));
        assert_eq!(header.byte_offset("rgb"), Some(12));
        assert_eq!(header.bytes_per_point(), 16);
        assert_eq!(header.field_type("rgb"), Some(('U', 4)));
        assert_eq!(header.label, None);
    }

    #[test]
    fn test_header_label_comment() {
        let header = parse("# label: 1\nFIELDS x y z\nPOINTS 0\nDATA ascii\n").unwrap();
        assert_eq!(header.label, Some(1));
        let header = parse("# label 0\nFIELDS x y z\nDATA ascii\n").unwrap();
        assert_eq!(header.label, Some(0));
    }

    #[test]
    fn test_header_points_defaults_to_width_times_height() {
        let header = parse("FIELDS x y z\nWIDTH 4\nHEIGHT 2\nDATA ascii\n").unwrap();
        assert_eq!(header.points, 8);
        assert_eq!(header.counts, vec![1, 1, 1]);
    }

    #[test]
    fn test_header_missing_data() {
        assert!(parse("FIELDS x y z\nPOINTS 1\n").is_err());
    }

    #[test]
    fn test_header_binary_requires_sizes() {
        let err = parse("FIELDS x y z\nPOINTS 1\nDATA binary\n").unwrap_err();
        assert!(err.to_string().contains("SIZE"));
    }

    #[test]
    fn test_header_rejects_zero_sizes() {
        let err = parse("FIELDS x y z\nSIZE 0 0 0\nTYPE F F F\nPOINTS 1\nDATA binary\n").unwrap_err();
        assert!(matches!(err, DataError::Parse { .. }));
        let err = parse("FIELDS x y z\nCOUNT 1 0 1\nDATA ascii\n").unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn test_header_unknown_encoding() {
        let err = parse("FIELDS x y z\nDATA lzf\n").unwrap_err();
        assert!(matches!(err, DataError::UnsupportedEncoding { .. }));
    }
}

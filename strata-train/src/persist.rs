//! On-disk model format.
//!
//! Models are stored as a single JSON document tagged with a format name and
//! version. Output files are created exclusively: writing never replaces an
//! existing file.

use crate::config::CdbnConfig;
use crate::error::{CdbnError, Result};
use crate::rbm::{ConvRbmLayer, LayerGeometry, LayerParams};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind as IoErrorKind, Write};
use std::path::Path;
use tracing::{debug, warn};

pub const MODEL_FORMAT: &str = "strata-cdbn";
pub const MODEL_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ModelFile {
    format: String,
    version: u32,
    config: CdbnConfig,
    layers: Vec<LayerRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LayerRecord {
    geometry: LayerGeometry,
    weights: Vec<f32>,
    hidden_bias: Vec<f32>,
    visible_bias: f32,
}

/// Fail if `path` exists, otherwise make sure its parent directory does.
pub fn ensure_output_available(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(CdbnError::OutputExists(path.to_path_buf()));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| CdbnError::CreateDir {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// Create `path` for writing; never truncates an existing file.
pub fn create_output_file(path: &Path) -> Result<File> {
    ensure_output_available(path)?;
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|source| match source.kind() {
            IoErrorKind::AlreadyExists => CdbnError::OutputExists(path.to_path_buf()),
            _ => CdbnError::Io {
                path: path.to_path_buf(),
                source,
            },
        })
}

/// Serialize `value` as JSON into a freshly created file.
///
/// A partially written file is removed before the error is returned.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = create_output_file(path)?;
    let mut writer = BufWriter::new(file);
    let written = serde_json::to_writer(&mut writer, value)
        .map_err(std::io::Error::from)
        .and_then(|()| writer.flush());
    if let Err(source) = written {
        drop(writer);
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "Could not remove partial output");
        }
        return Err(CdbnError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    debug!(path = %path.display(), "Wrote JSON document");
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|source| CdbnError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| CdbnError::Format {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub(crate) fn write_model(path: &Path, config: &CdbnConfig, layers: &[ConvRbmLayer]) -> Result<()> {
    let document = ModelFile {
        format: MODEL_FORMAT.to_string(),
        version: MODEL_VERSION,
        config: *config,
        layers: layers
            .iter()
            .map(|layer| {
                let params = layer.params();
                LayerRecord {
                    geometry: *layer.geometry(),
                    weights: params.weights.clone(),
                    hidden_bias: params.hidden_bias.clone(),
                    visible_bias: params.visible_bias,
                }
            })
            .collect(),
    };
    write_json(path, &document)
}

#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub(crate) fn read_model(path: &Path) -> Result<(CdbnConfig, Vec<ConvRbmLayer>)> {
    let document: ModelFile = read_json(path)?;
    let malformed = |message: String| CdbnError::Format {
        path: path.to_path_buf(),
        message,
    };

    if document.format != MODEL_FORMAT {
        return Err(malformed(format!(
            "format tag is '{}', expected '{MODEL_FORMAT}'",
            document.format
        )));
    }
    if document.version != MODEL_VERSION {
        return Err(malformed(format!(
            "unsupported version {}, expected {MODEL_VERSION}",
            document.version
        )));
    }
    let config = document.config;
    config
        .validate()
        .map_err(|e| malformed(format!("stored configuration is invalid: {e}")))?;
    if document.layers.is_empty() {
        return Err(malformed("model has no layers".to_string()));
    }

    let mut channels = 1;
    let mut visible = [config.input_size; 3];
    let mut layers = Vec::with_capacity(document.layers.len());
    for (index, record) in document.layers.into_iter().enumerate() {
        let stored = record.geometry;
        // Rebuild the geometry from its free parameters so derived shapes are
        // checked rather than trusted.
        let rebuilt = LayerGeometry::new(
            channels,
            visible,
            config.filter_size,
            stored.filters,
            config.pooling_size,
            config.group_size,
        )
        .map_err(|e| malformed(format!("layer {index}: {e}")))?;
        if rebuilt != stored {
            return Err(malformed(format!(
                "layer {index}: stored geometry {stored:?} does not match the expected {rebuilt:?}"
            )));
        }
        let params = LayerParams {
            weights: record.weights,
            hidden_bias: record.hidden_bias,
            visible_bias: record.visible_bias,
        };
        if !params.fits(&rebuilt) {
            return Err(malformed(format!(
                "layer {index}: {} weights and {} hidden biases, expected {} and {}",
                params.weights.len(),
                params.hidden_bias.len(),
                rebuilt.weight_len(),
                rebuilt.filters
            )));
        }
        let layer = ConvRbmLayer::from_params(rebuilt, params)?;
        channels = rebuilt.filters;
        visible = rebuilt.pooled_shape();
        layers.push(layer);
    }
    Ok((config, layers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn sample_layer() -> (CdbnConfig, ConvRbmLayer) {
        let config = CdbnConfig::new(5, 1, 2, 4, 1);
        let geometry = LayerGeometry::new(1, [5; 3], 2, 3, 1, 1).unwrap();
        let layer = ConvRbmLayer::initialize(geometry, 0.3, &mut ChaCha8Rng::seed_from_u64(4)).unwrap();
        (config, layer)
    }

    #[test]
    fn test_model_round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.json");
        let (config, layer) = sample_layer();
        write_model(&path, &config, std::slice::from_ref(&layer)).unwrap();

        let (read_config, layers) = read_model(&path).unwrap();
        assert_eq!(read_config, config);
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].params(), layer.params());
        assert_eq!(layers[0].geometry(), layer.geometry());
    }

    #[test]
    fn test_write_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, "keep me").unwrap();
        let (config, layer) = sample_layer();
        let err = write_model(&path, &config, &[layer]).unwrap_err();
        assert!(matches!(err, CdbnError::OutputExists(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep me");
    }

    #[test]
    fn test_read_rejects_wrong_format_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let (config, layer) = sample_layer();
        write_model(&path, &config, &[layer]).unwrap();
        let text = fs::read_to_string(&path).unwrap().replace(MODEL_FORMAT, "something-else");
        let other = dir.path().join("other.json");
        fs::write(&other, text).unwrap();

        let err = read_model(&other).unwrap_err();
        assert!(err.to_string().contains("format tag"));
    }

    #[test]
    fn test_read_rejects_truncated_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let (config, layer) = sample_layer();
        let mut document = ModelFile {
            format: MODEL_FORMAT.to_string(),
            version: MODEL_VERSION,
            config,
            layers: vec![LayerRecord {
                geometry: *layer.geometry(),
                weights: layer.params().weights.clone(),
                hidden_bias: layer.params().hidden_bias.clone(),
                visible_bias: 0.0,
            }],
        };
        document.layers[0].weights.pop();
        write_json(&path, &document).unwrap();

        let err = read_model(&path).unwrap_err();
        assert!(matches!(err, CdbnError::Format { .. }));
    }

    #[test]
    fn test_read_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(read_model(&path).unwrap_err(), CdbnError::Format { .. }));
        assert!(matches!(
            read_model(&dir.path().join("missing.json")).unwrap_err(),
            CdbnError::Io { .. }
        ));
    }
}

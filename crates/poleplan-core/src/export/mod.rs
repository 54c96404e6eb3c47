//! Geodata export chain.
//!
//! Every format other than GeoJSON is served in two tiers: the rich converter
//! from the [`ConverterRegistry`], then plain GeoJSON when that converter is
//! missing or fails. Callers always get a usable file; [`ExportOutcome`] says
//! which tier produced it.

pub mod converter;
pub mod kml;
#[cfg(feature = "shapefile")]
pub mod shapefile;
pub mod sink;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use converter::{ConvertError, ConvertedPayload, Converter, ConverterRegistry, Unavailable};
pub use sink::{Artifact, DirectorySink, ExportSink, MemorySink};

use crate::geodata::FeatureCollection;

const DEFAULT_BASENAME: &str = "export";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    GeoJson,
    Kml,
    Kmz,
    Shapefile,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [Self::GeoJson, Self::Kml, Self::Kmz, Self::Shapefile];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "geojson" | "json" => Some(Self::GeoJson),
            "kml" => Some(Self::Kml),
            "kmz" => Some(Self::Kmz),
            "shapefile" | "shp" | "zip" => Some(Self::Shapefile),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GeoJson => "geojson",
            Self::Kml => "kml",
            Self::Kmz => "kmz",
            Self::Shapefile => "shapefile",
        }
    }

    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::GeoJson => "geojson",
            Self::Kml => "kml",
            Self::Kmz => "kmz",
            Self::Shapefile => "zip",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::GeoJson => "application/geo+json",
            Self::Kml => "application/vnd.google-earth.kml+xml",
            Self::Kmz => "application/vnd.google-earth.kmz",
            Self::Shapefile => "application/zip",
        }
    }

    /// Whether the rich converter is expected to be missing in some builds.
    fn converter_is_optional(self) -> bool {
        matches!(self, Self::Shapefile)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to serialize GeoJSON: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {filename}: {source}")]
    Sink {
        filename: String,
        #[source]
        source: std::io::Error,
    },
}

/// What an export call actually delivered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOutcome {
    pub requested: ExportFormat,
    /// Format of the written file; GeoJSON when the chain fell back
    pub delivered: ExportFormat,
    pub filename: String,
    pub mime_type: &'static str,
    pub bytes: usize,
    /// Set when the rich converter was skipped
    pub fallback: Option<Unavailable>,
}

impl ExportOutcome {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Serialize a feature collection as UTF-8 GeoJSON.
pub fn geojson_bytes(fc: &FeatureCollection) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec_pretty(fc)
}

/// GeoJSON filename used when a rich export falls back.
///
/// A trailing `.kml`, `.kmz` or `.zip` is replaced; any other name just gets
/// `.geojson` appended. Blank names become `export.geojson`.
pub fn fallback_filename(filename: &str) -> String {
    let trimmed = filename.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.ends_with(".geojson") {
        return trimmed.to_string();
    }
    let stem = [".kml", ".kmz", ".zip"]
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map_or(trimmed, |ext| &trimmed[..trimmed.len() - ext.len()]);
    let stem = if stem.is_empty() { DEFAULT_BASENAME } else { stem };
    format!("{stem}.geojson")
}

/// Filename for a primary-tier export; blank names get a default.
fn primary_filename(filename: &str, format: ExportFormat) -> String {
    let trimmed = filename.trim();
    if trimmed.is_empty() {
        format!("{DEFAULT_BASENAME}.{}", format.extension())
    } else {
        trimmed.to_string()
    }
}

/// Runs exports against a shared, read-only converter registry.
#[derive(Debug, Clone)]
pub struct Exporter {
    registry: Arc<ConverterRegistry>,
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new(Arc::new(ConverterRegistry::with_defaults()))
    }
}

impl Exporter {
    pub fn new(registry: Arc<ConverterRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    /// Export `fc` as `format`, falling back to GeoJSON when needed.
    ///
    /// Only GeoJSON serialization and sink failures are returned as errors.
    pub fn export(
        &self,
        format: ExportFormat,
        fc: &FeatureCollection,
        filename: &str,
        sink: &mut dyn ExportSink,
    ) -> Result<ExportOutcome, ExportError> {
        if format == ExportFormat::GeoJson {
            return write_geojson(fc, &primary_filename(filename, format), format, None, sink);
        }

        let primary = self
            .registry
            .try_convert(format, fc)
            .and_then(ConvertedPayload::into_bytes);

        match primary {
            Ok(bytes) => {
                let filename = primary_filename(filename, format);
                write_to_sink(sink, &bytes, &filename, format.mime_type())?;
                tracing::debug!(format = %format, filename = %filename, bytes = bytes.len(), "export written");
                Ok(ExportOutcome {
                    requested: format,
                    delivered: format,
                    filename,
                    mime_type: format.mime_type(),
                    bytes: bytes.len(),
                    fallback: None,
                })
            }
            Err(reason) => {
                if format.converter_is_optional() {
                    tracing::warn!(format = %format, reason = %reason, "optional converter unavailable, exporting GeoJSON");
                } else {
                    tracing::error!(format = %format, reason = %reason, "converter failed, exporting GeoJSON");
                }
                write_geojson(fc, &fallback_filename(filename), format, Some(reason), sink)
            }
        }
    }

    pub fn export_geojson(
        &self,
        fc: &FeatureCollection,
        filename: &str,
        sink: &mut dyn ExportSink,
    ) -> Result<ExportOutcome, ExportError> {
        self.export(ExportFormat::GeoJson, fc, filename, sink)
    }

    pub fn export_kml(
        &self,
        fc: &FeatureCollection,
        filename: &str,
        sink: &mut dyn ExportSink,
    ) -> Result<ExportOutcome, ExportError> {
        self.export(ExportFormat::Kml, fc, filename, sink)
    }

    pub fn export_kmz(
        &self,
        fc: &FeatureCollection,
        filename: &str,
        sink: &mut dyn ExportSink,
    ) -> Result<ExportOutcome, ExportError> {
        self.export(ExportFormat::Kmz, fc, filename, sink)
    }

    pub fn export_shapefile(
        &self,
        fc: &FeatureCollection,
        filename: &str,
        sink: &mut dyn ExportSink,
    ) -> Result<ExportOutcome, ExportError> {
        self.export(ExportFormat::Shapefile, fc, filename, sink)
    }
}

fn write_geojson(
    fc: &FeatureCollection,
    filename: &str,
    requested: ExportFormat,
    fallback: Option<Unavailable>,
    sink: &mut dyn ExportSink,
) -> Result<ExportOutcome, ExportError> {
    let bytes = geojson_bytes(fc)?;
    let mime_type = ExportFormat::GeoJson.mime_type();
    write_to_sink(sink, &bytes, filename, mime_type)?;
    Ok(ExportOutcome {
        requested,
        delivered: ExportFormat::GeoJson,
        filename: filename.to_string(),
        mime_type,
        bytes: bytes.len(),
        fallback,
    })
}

fn write_to_sink(
    sink: &mut dyn ExportSink,
    bytes: &[u8],
    filename: &str,
    mime_type: &str,
) -> Result<(), ExportError> {
    sink.write(bytes, filename, mime_type)
        .map_err(|source| ExportError::Sink {
            filename: filename.to_string(),
            source,
        })
}

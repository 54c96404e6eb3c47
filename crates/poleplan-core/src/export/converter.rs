//! Converter registry for rich export formats.
//!
//! Each converter either produces a payload or reports why it could not.
//! The registry never panics on a missing converter; absence is an ordinary
//! answer that the export chain turns into a GeoJSON fallback.

use std::collections::HashMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;

use super::ExportFormat;
use crate::geodata::FeatureCollection;

/// Why a rich converter did not produce output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum Unavailable {
    #[error("no {0} converter is available")]
    Missing(ExportFormat),
    #[error("{0}")]
    Failed(String),
}

/// Errors raised while a converter builds its output.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("xml write failed: {0}")]
    Xml(String),
    #[error("zip packaging failed: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("nothing to convert: {0}")]
    Empty(&'static str),
}

impl From<ConvertError> for Unavailable {
    fn from(err: ConvertError) -> Self {
        Unavailable::Failed(err.to_string())
    }
}

/// Converter output before it reaches a sink.
#[derive(Clone, PartialEq, Eq)]
pub enum ConvertedPayload {
    Bytes(Vec<u8>),
    /// Base64 text of binary content (zip bundles).
    Base64(String),
}

impl fmt::Debug for ConvertedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::Base64(text) => write!(f, "Base64({} chars)", text.len()),
        }
    }
}

impl ConvertedPayload {
    /// Raw bytes, decoding base64 payloads first.
    pub fn into_bytes(self) -> Result<Vec<u8>, Unavailable> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Base64(text) => STANDARD
                .decode(text.trim())
                .map_err(|e| Unavailable::Failed(format!("invalid base64 payload: {e}"))),
        }
    }
}

/// A rich converter for one export format.
pub trait Converter: Send + Sync {
    fn format(&self) -> ExportFormat;

    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn try_convert(&self, fc: &FeatureCollection) -> Result<ConvertedPayload, Unavailable>;
}

/// Converters available to the export chain, at most one per format.
#[derive(Default)]
pub struct ConverterRegistry {
    converters: HashMap<ExportFormat, Box<dyn Converter>>,
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.converters.values().map(|c| c.name()).collect();
        names.sort_unstable();
        f.debug_struct("ConverterRegistry")
            .field("converters", &names)
            .finish()
    }
}

impl ConverterRegistry {
    /// A registry with no rich converters; every export degrades to GeoJSON.
    pub fn new() -> Self {
        Self::default()
    }

    /// KML and KMZ always, shapefile when the `shapefile` feature is built.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(super::kml::KmlConverter::default()));
        registry.register(Box::new(super::kml::KmzConverter::default()));
        #[cfg(feature = "shapefile")]
        registry.register(Box::new(super::shapefile::ShapefileConverter::default()));
        registry
    }

    /// Register a converter, replacing any previous one for the same format.
    pub fn register(&mut self, converter: Box<dyn Converter>) {
        self.converters.insert(converter.format(), converter);
    }

    pub fn unregister(&mut self, format: ExportFormat) -> bool {
        self.converters.remove(&format).is_some()
    }

    pub fn contains(&self, format: ExportFormat) -> bool {
        self.converters.contains_key(&format)
    }

    pub fn try_convert(
        &self,
        format: ExportFormat,
        fc: &FeatureCollection,
    ) -> Result<ConvertedPayload, Unavailable> {
        let converter = self
            .converters
            .get(&format)
            .ok_or(Unavailable::Missing(format))?;
        converter.try_convert(fc)
    }
}

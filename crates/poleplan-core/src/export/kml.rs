//! KML and KMZ converters.
//!
//! Poles and spans go into separate folders. Every non-null property is kept
//! as `ExtendedData` so nothing in the feature collection is lost.

use std::io::{Cursor, Write};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde_json::Value;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::converter::{ConvertError, ConvertedPayload, Converter, Unavailable};
use super::ExportFormat;
use crate::geodata::{Feature, FeatureCollection, Geometry};

const KML_NS: &str = "http://www.opengis.net/kml/2.2";
const KMZ_ENTRY: &str = "doc.kml";
const POLE_STYLE: &str = "pole";
const SPAN_STYLE: &str = "span";

/// Renders a feature collection as a KML document.
#[derive(Debug, Clone)]
pub struct KmlConverter {
    pub document_name: String,
}

impl Default for KmlConverter {
    fn default() -> Self {
        Self {
            document_name: "PolePlan Export".to_string(),
        }
    }
}

impl Converter for KmlConverter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Kml
    }

    fn name(&self) -> &'static str {
        "kml"
    }

    fn try_convert(&self, fc: &FeatureCollection) -> Result<ConvertedPayload, Unavailable> {
        Ok(ConvertedPayload::Bytes(render_kml(fc, &self.document_name)?))
    }
}

/// KML zipped as `doc.kml`.
#[derive(Debug, Clone, Default)]
pub struct KmzConverter {
    pub kml: KmlConverter,
}

impl Converter for KmzConverter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Kmz
    }

    fn name(&self) -> &'static str {
        "kmz"
    }

    fn try_convert(&self, fc: &FeatureCollection) -> Result<ConvertedPayload, Unavailable> {
        let kml = render_kml(fc, &self.kml.document_name)?;
        Ok(ConvertedPayload::Bytes(package_kmz(&kml)?))
    }
}

/// Zip a rendered KML document into a KMZ archive.
pub fn package_kmz(kml: &[u8]) -> Result<Vec<u8>, ConvertError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(KMZ_ENTRY, options)?;
    zip.write_all(kml)?;
    Ok(zip.finish()?.into_inner())
}

/// Render `fc` as a UTF-8 KML document.
pub fn render_kml(fc: &FeatureCollection, document_name: &str) -> Result<Vec<u8>, ConvertError> {
    let mut kml = KmlWriter::new();
    kml.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("kml");
    root.push_attribute(("xmlns", KML_NS));
    kml.event(Event::Start(root))?;
    kml.start("Document")?;
    kml.text_element("name", document_name)?;
    kml.style(POLE_STYLE, "IconStyle", &[("color", "ff00ffff"), ("scale", "0.8")])?;
    kml.style(SPAN_STYLE, "LineStyle", &[("color", "ff00a5ff"), ("width", "2")])?;

    kml.folder("Poles", fc.points(), POLE_STYLE)?;
    kml.folder("Spans", fc.lines(), SPAN_STYLE)?;

    kml.end("Document")?;
    kml.end("kml")?;
    Ok(kml.finish())
}

struct KmlWriter {
    inner: Writer<Vec<u8>>,
}

impl KmlWriter {
    fn new() -> Self {
        Self {
            inner: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn finish(self) -> Vec<u8> {
        self.inner.into_inner()
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), ConvertError> {
        self.inner
            .write_event(event)
            .map_err(|e| ConvertError::Xml(e.to_string()))
    }

    fn start(&mut self, name: &str) -> Result<(), ConvertError> {
        self.event(Event::Start(BytesStart::new(name)))
    }

    fn end(&mut self, name: &str) -> Result<(), ConvertError> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<(), ConvertError> {
        self.start(name)?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn style(&mut self, id: &str, kind: &str, fields: &[(&str, &str)]) -> Result<(), ConvertError> {
        let mut style = BytesStart::new("Style");
        style.push_attribute(("id", id));
        self.event(Event::Start(style))?;
        self.start(kind)?;
        for (name, value) in fields {
            self.text_element(name, value)?;
        }
        self.end(kind)?;
        self.end("Style")
    }

    fn folder<'a>(
        &mut self,
        name: &str,
        features: impl Iterator<Item = &'a Feature>,
        style: &str,
    ) -> Result<(), ConvertError> {
        self.start("Folder")?;
        self.text_element("name", name)?;
        for feature in features {
            self.placemark(feature, style)?;
        }
        self.end("Folder")
    }

    fn placemark(&mut self, feature: &Feature, style: &str) -> Result<(), ConvertError> {
        self.start("Placemark")?;
        self.text_element("name", feature.id().unwrap_or_default())?;
        self.text_element("styleUrl", &format!("#{style}"))?;

        let data: Vec<(&String, String)> = feature
            .properties
            .iter()
            .filter_map(|(key, value)| display_value(value).map(|text| (key, text)))
            .collect();
        if !data.is_empty() {
            self.start("ExtendedData")?;
            for (key, text) in data {
                let mut entry = BytesStart::new("Data");
                entry.push_attribute(("name", key.as_str()));
                self.event(Event::Start(entry))?;
                self.text_element("value", &text)?;
                self.end("Data")?;
            }
            self.end("ExtendedData")?;
        }

        match &feature.geometry {
            Geometry::Point { coordinates } => {
                self.start("Point")?;
                self.text_element("coordinates", &coordinate(coordinates))?;
                self.end("Point")?;
            }
            Geometry::LineString { coordinates } => {
                self.start("LineString")?;
                self.text_element("tessellate", "1")?;
                let joined = coordinates
                    .iter()
                    .map(coordinate)
                    .collect::<Vec<_>>()
                    .join(" ");
                self.text_element("coordinates", &joined)?;
                self.end("LineString")?;
            }
        }
        self.end("Placemark")
    }
}

fn coordinate([lon, lat]: &[f64; 2]) -> String {
    format!("{lon},{lat},0")
}

fn display_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

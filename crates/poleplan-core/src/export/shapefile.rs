//! Shapefile bundle converter.
//!
//! Writes a `poles` point layer and a `spans` polyline layer, each as
//! `.shp/.shx/.dbf/.prj/.cpg`, zipped together. Layers with no features are
//! left out. The bundle is handed to the export chain base64-encoded.

use std::collections::HashSet;
use std::io::{Cursor, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use chrono::{Datelike, Utc};
use serde_json::Value;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::converter::{ConvertError, ConvertedPayload, Converter, Unavailable};
use super::ExportFormat;
use crate::geodata::{Feature, FeatureCollection, Geometry};

const FILE_CODE: i32 = 9994;
const VERSION: i32 = 1000;
const SHAPE_POINT: i32 = 1;
const SHAPE_POLYLINE: i32 = 3;
const HEADER_BYTES: usize = 100;

const DBF_MAX_CHAR: usize = 254;
const DBF_MAX_NUMERIC: usize = 20;
const DBF_DECIMALS: usize = 6;

const WGS84_PRJ: &str = "GEOGCS[\"GCS_WGS_1984\",DATUM[\"D_WGS_1984\",SPHEROID[\"WGS_1984\",6378137.0,298.257223563]],PRIMEM[\"Greenwich\",0.0],UNIT[\"Degree\",0.0174532925199433]]";

/// DBF column names for the properties the feature builder emits.
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("id", "ID"),
    ("jobId", "JOB_ID"),
    ("status", "STATUS"),
    ("height", "HEIGHT"),
    ("poleClass", "POLE_CLASS"),
    ("powerHeight", "POWER_HT"),
    ("voltage", "VOLTAGE"),
    ("hasTransformer", "XFMR"),
    ("attachmentType", "ATTACH_TYP"),
    ("incomingBearingDeg", "IN_BRG"),
    ("outgoingBearingDeg", "OUT_BRG"),
    ("PULL_ft", "PULL_FT"),
    ("timestamp", "TIMESTAMP"),
    ("asBuiltAttach", "AB_ATTACH"),
    ("asBuiltPower", "AB_POWER"),
    ("varianceIn", "VAR_IN"),
    ("variancePass", "VAR_PASS"),
    ("fromId", "FROM_ID"),
    ("toId", "TO_ID"),
    ("lengthFt", "LENGTH_FT"),
    ("proposedAttach", "PROP_ATT"),
    ("environment", "ENV"),
];

#[derive(Debug, Clone, Default)]
pub struct ShapefileConverter;

impl Converter for ShapefileConverter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Shapefile
    }

    fn name(&self) -> &'static str {
        "shapefile"
    }

    fn try_convert(&self, fc: &FeatureCollection) -> Result<ConvertedPayload, Unavailable> {
        let bundle = write_bundle(fc)?;
        Ok(ConvertedPayload::Base64(STANDARD.encode(bundle)))
    }
}

/// Zip bytes of the full shapefile bundle.
pub fn write_bundle(fc: &FeatureCollection) -> Result<Vec<u8>, ConvertError> {
    let poles: Vec<&Feature> = fc.points().collect();
    let spans: Vec<&Feature> = fc.lines().collect();
    if poles.is_empty() && spans.is_empty() {
        return Err(ConvertError::Empty("feature collection has no features"));
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, shape_type, features) in [
        ("poles", SHAPE_POINT, poles),
        ("spans", SHAPE_POLYLINE, spans),
    ] {
        if features.is_empty() {
            continue;
        }
        let layer = Layer::write(shape_type, &features)?;
        for (ext, bytes) in [
            ("shp", layer.shp.as_slice()),
            ("shx", layer.shx.as_slice()),
            ("dbf", layer.dbf.as_slice()),
            ("prj", WGS84_PRJ.as_bytes()),
            ("cpg", b"UTF-8".as_slice()),
        ] {
            zip.start_file(format!("{name}.{ext}"), options)?;
            zip.write_all(bytes)?;
        }
    }
    Ok(zip.finish()?.into_inner())
}

struct Layer {
    shp: Vec<u8>,
    shx: Vec<u8>,
    dbf: Vec<u8>,
}

impl Layer {
    fn write(shape_type: i32, features: &[&Feature]) -> Result<Self, ConvertError> {
        let mut bounds = Bounds::default();
        let mut contents = Vec::with_capacity(features.len());
        for feature in features {
            contents.push(shape_content(&feature.geometry, &mut bounds)?);
        }

        let shp_words: usize = HEADER_BYTES / 2
            + contents.iter().map(|c| 4 + c.len() / 2).sum::<usize>();
        let shx_words = HEADER_BYTES / 2 + 4 * contents.len();

        let mut shp = Vec::with_capacity(shp_words * 2);
        let mut shx = Vec::with_capacity(shx_words * 2);
        write_header(&mut shp, shp_words, shape_type, &bounds)?;
        write_header(&mut shx, shx_words, shape_type, &bounds)?;

        let mut offset_words = HEADER_BYTES / 2;
        for (i, content) in contents.iter().enumerate() {
            let content_words = content.len() / 2;
            shp.write_i32::<BigEndian>(to_i32(i + 1)?)?;
            shp.write_i32::<BigEndian>(to_i32(content_words)?)?;
            shp.write_all(content)?;

            shx.write_i32::<BigEndian>(to_i32(offset_words)?)?;
            shx.write_i32::<BigEndian>(to_i32(content_words)?)?;
            offset_words += 4 + content_words;
        }

        Ok(Self {
            shp,
            shx,
            dbf: write_dbf(features)?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Bounds {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }
}

impl Bounds {
    fn extend(&mut self, [x, y]: [f64; 2]) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    fn of(points: &[[f64; 2]]) -> Self {
        let mut bounds = Self::default();
        for point in points {
            bounds.extend(*point);
        }
        bounds
    }

    fn merge(&mut self, other: &Bounds) {
        if !other.min_x.is_finite() {
            return;
        }
        self.extend([other.min_x, other.min_y]);
        self.extend([other.max_x, other.max_y]);
    }

    fn write(&self, buf: &mut Vec<u8>) -> std::io::Result<()> {
        let finite = self.min_x.is_finite();
        for v in [self.min_x, self.min_y, self.max_x, self.max_y] {
            buf.write_f64::<LittleEndian>(if finite { v } else { 0.0 })?;
        }
        Ok(())
    }
}

fn write_header(
    buf: &mut Vec<u8>,
    file_words: usize,
    shape_type: i32,
    bounds: &Bounds,
) -> Result<(), ConvertError> {
    buf.write_i32::<BigEndian>(FILE_CODE)?;
    for _ in 0..5 {
        buf.write_i32::<BigEndian>(0)?;
    }
    buf.write_i32::<BigEndian>(to_i32(file_words)?)?;
    buf.write_i32::<LittleEndian>(VERSION)?;
    buf.write_i32::<LittleEndian>(shape_type)?;
    bounds.write(buf)?;
    // Z and M ranges are unused for 2D shapes.
    for _ in 0..4 {
        buf.write_f64::<LittleEndian>(0.0)?;
    }
    Ok(())
}

fn shape_content(geometry: &Geometry, layer_bounds: &mut Bounds) -> Result<Vec<u8>, ConvertError> {
    let mut content = Vec::new();
    match geometry {
        Geometry::Point { coordinates } => {
            layer_bounds.extend(*coordinates);
            content.write_i32::<LittleEndian>(SHAPE_POINT)?;
            content.write_f64::<LittleEndian>(coordinates[0])?;
            content.write_f64::<LittleEndian>(coordinates[1])?;
        }
        Geometry::LineString { coordinates } => {
            let bounds = Bounds::of(coordinates);
            layer_bounds.merge(&bounds);
            content.write_i32::<LittleEndian>(SHAPE_POLYLINE)?;
            bounds.write(&mut content)?;
            content.write_i32::<LittleEndian>(1)?;
            content.write_i32::<LittleEndian>(to_i32(coordinates.len())?)?;
            content.write_i32::<LittleEndian>(0)?;
            for [x, y] in coordinates {
                content.write_f64::<LittleEndian>(*x)?;
                content.write_f64::<LittleEndian>(*y)?;
            }
        }
    }
    Ok(content)
}

fn to_i32(value: usize) -> Result<i32, ConvertError> {
    i32::try_from(value).map_err(|_| {
        ConvertError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "shapefile exceeds 2 GiB record limits",
        ))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Character,
    Numeric,
    Logical,
}

#[derive(Debug, Clone)]
struct DbfField {
    key: String,
    name: String,
    kind: FieldKind,
    length: usize,
    decimals: usize,
}

impl DbfField {
    fn type_code(&self) -> u8 {
        match self.kind {
            FieldKind::Character => b'C',
            FieldKind::Numeric => b'N',
            FieldKind::Logical => b'L',
        }
    }

    fn render(&self, value: Option<&Value>) -> Vec<u8> {
        let value = value.filter(|v| !v.is_null());
        let text = match (self.kind, value) {
            (_, None) => String::new(),
            (FieldKind::Logical, Some(Value::Bool(b))) => (if *b { "T" } else { "F" }).to_string(),
            (FieldKind::Numeric, Some(Value::Number(n))) => n
                .as_f64()
                .map(|v| format!("{:>width$.prec$}", v, width = self.length, prec = self.decimals))
                .unwrap_or_default(),
            (_, Some(Value::String(s))) => s.clone(),
            (_, Some(other)) => other.to_string(),
        };
        let mut bytes = truncate_utf8(&text, self.length).as_bytes().to_vec();
        bytes.resize(self.length, b' ');
        bytes
    }
}

fn truncate_utf8(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn numeric_text(value: f64) -> String {
    format!("{:.*}", DBF_DECIMALS, value)
}

fn plan_fields(features: &[&Feature]) -> Vec<DbfField> {
    let mut keys: Vec<&String> = Vec::new();
    for feature in features {
        for key in feature.properties.keys() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }

    let mut taken = HashSet::new();
    keys.into_iter()
        .map(|key| {
            let values: Vec<&Value> = features
                .iter()
                .filter_map(|f| f.properties.get(key))
                .filter(|v| !v.is_null())
                .collect();
            let (kind, length, decimals) = field_shape(&values);
            DbfField {
                key: key.clone(),
                name: field_name(key, &mut taken),
                kind,
                length,
                decimals,
            }
        })
        .collect()
}

fn field_shape(values: &[&Value]) -> (FieldKind, usize, usize) {
    if !values.is_empty() && values.iter().all(|v| v.is_boolean()) {
        return (FieldKind::Logical, 1, 0);
    }
    if !values.is_empty() && values.iter().all(|v| v.is_number()) {
        let width = values
            .iter()
            .filter_map(|v| v.as_f64())
            .map(|v| numeric_text(v).len())
            .max()
            .unwrap_or(1);
        if width <= DBF_MAX_NUMERIC {
            return (FieldKind::Numeric, width.max(DBF_DECIMALS + 2), DBF_DECIMALS);
        }
    }
    let width = values
        .iter()
        .map(|v| match v {
            Value::String(s) => s.len(),
            other => other.to_string().len(),
        })
        .max()
        .unwrap_or(1)
        .clamp(1, DBF_MAX_CHAR);
    (FieldKind::Character, width, 0)
}

fn field_name(key: &str, taken: &mut HashSet<String>) -> String {
    let base = FIELD_ALIASES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, alias)| (*alias).to_string())
        .unwrap_or_else(|| {
            let cleaned: String = key
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
                .map(|c| c.to_ascii_uppercase())
                .take(10)
                .collect();
            if cleaned.is_empty() {
                "FIELD".to_string()
            } else {
                cleaned
            }
        });

    let mut name = base.clone();
    let mut n = 1;
    while !taken.insert(name.clone()) {
        let suffix = n.to_string();
        let keep = 10usize.saturating_sub(suffix.len()).min(base.len());
        name = format!("{}{}", &base[..keep], suffix);
        n += 1;
    }
    name
}

fn write_dbf(features: &[&Feature]) -> Result<Vec<u8>, ConvertError> {
    let fields = plan_fields(features);
    let header_len = 32 + 32 * fields.len() + 1;
    let record_len = 1 + fields.iter().map(|f| f.length).sum::<usize>();
    let header_len = u16::try_from(header_len).map_err(|_| too_wide())?;
    let record_len = u16::try_from(record_len).map_err(|_| too_wide())?;
    let record_count = u32::try_from(features.len()).map_err(|_| too_wide())?;

    let today = Utc::now().date_naive();
    let mut buf = Vec::new();
    buf.write_u8(0x03)?;
    buf.write_u8(u8::try_from(today.year() - 1900).unwrap_or(u8::MAX))?;
    buf.write_u8(today.month() as u8)?;
    buf.write_u8(today.day() as u8)?;
    buf.write_u32::<LittleEndian>(record_count)?;
    buf.write_u16::<LittleEndian>(header_len)?;
    buf.write_u16::<LittleEndian>(record_len)?;
    buf.write_all(&[0u8; 20])?;

    for field in &fields {
        let mut name = [0u8; 11];
        name[..field.name.len()].copy_from_slice(field.name.as_bytes());
        buf.write_all(&name)?;
        buf.write_u8(field.type_code())?;
        buf.write_all(&[0u8; 4])?;
        buf.write_u8(field.length as u8)?;
        buf.write_u8(field.decimals as u8)?;
        buf.write_all(&[0u8; 14])?;
    }
    buf.write_u8(0x0D)?;

    for feature in features {
        buf.write_u8(b' ')?;
        for field in &fields {
            buf.write_all(&field.render(feature.properties.get(&field.key)))?;
        }
    }
    buf.write_u8(0x1A)?;
    Ok(buf)
}

fn too_wide() -> ConvertError {
    ConvertError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        "attribute table exceeds dBase limits",
    ))
}

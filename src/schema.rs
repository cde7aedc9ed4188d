//! Field schema: the ordered declaration every run is driven by.
//!
//! A [`Schema`] is an immutable, non-empty list of [`FieldSpec`]s. Each field
//! names a [`BinaryKind`] (its fixed slot in the packed record) and a
//! [`ParseRule`] (how the text cell becomes a [`Scalar`]). Field order is the
//! expected input column order and the byte order of the packed record.
//!
//! ## Persistence
//!
//! Schemas round-trip through YAML via `serde_yaml`:
//!
//! ```yaml
//! fields:
//!   - name: time
//!     kind: float64
//!   - name: price
//!     kind: int32
//!     parse: fixed_point(4)
//! ```
//!
//! `parse` defaults to `integer` for integer and bool kinds and `float` for
//! float kinds. Kinds also accept the short aliases `i8`..`u64`, `f32`, `f64`
//! and the single-character struct codes (`b`, `h`, `i`, `q`, `d`, ...).

use std::{
    collections::HashMap,
    fmt,
    fs::File,
    io::BufReader,
    path::Path,
    str::FromStr,
};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::SchemaError;

pub const FIXED_POINT_MAX_SCALE: u32 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryKind {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Bool,
}

impl BinaryKind {
    pub const fn width(self) -> usize {
        match self {
            BinaryKind::Int8 | BinaryKind::UInt8 | BinaryKind::Bool => 1,
            BinaryKind::Int16 | BinaryKind::UInt16 => 2,
            BinaryKind::Int32 | BinaryKind::UInt32 | BinaryKind::Float32 => 4,
            BinaryKind::Int64 | BinaryKind::UInt64 | BinaryKind::Float64 => 8,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, BinaryKind::Float32 | BinaryKind::Float64)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BinaryKind::Int8 => "int8",
            BinaryKind::Int16 => "int16",
            BinaryKind::Int32 => "int32",
            BinaryKind::Int64 => "int64",
            BinaryKind::UInt8 => "uint8",
            BinaryKind::UInt16 => "uint16",
            BinaryKind::UInt32 => "uint32",
            BinaryKind::UInt64 => "uint64",
            BinaryKind::Float32 => "float32",
            BinaryKind::Float64 => "float64",
            BinaryKind::Bool => "bool",
        }
    }

    /// Single-character struct code, as used by packed-record tooling in
    /// other ecosystems (`<dbqiib`).
    pub fn struct_code(self) -> char {
        match self {
            BinaryKind::Int8 => 'b',
            BinaryKind::UInt8 => 'B',
            BinaryKind::Int16 => 'h',
            BinaryKind::UInt16 => 'H',
            BinaryKind::Int32 => 'i',
            BinaryKind::UInt32 => 'I',
            BinaryKind::Int64 => 'q',
            BinaryKind::UInt64 => 'Q',
            BinaryKind::Float32 => 'f',
            BinaryKind::Float64 => 'd',
            BinaryKind::Bool => '?',
        }
    }

    pub fn default_rule(self) -> ParseRule {
        if self.is_float() {
            ParseRule::Float
        } else {
            ParseRule::Integer
        }
    }
}

impl fmt::Display for BinaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BinaryKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        // Struct codes are case-sensitive: `b` is signed, `B` unsigned.
        let by_code = match trimmed {
            "b" => Some(BinaryKind::Int8),
            "B" => Some(BinaryKind::UInt8),
            "h" => Some(BinaryKind::Int16),
            "H" => Some(BinaryKind::UInt16),
            "i" => Some(BinaryKind::Int32),
            "I" => Some(BinaryKind::UInt32),
            "q" => Some(BinaryKind::Int64),
            "Q" => Some(BinaryKind::UInt64),
            "f" => Some(BinaryKind::Float32),
            "d" => Some(BinaryKind::Float64),
            "?" => Some(BinaryKind::Bool),
            _ => None,
        };
        if let Some(kind) = by_code {
            return Ok(kind);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "int8" | "i8" => Ok(BinaryKind::Int8),
            "int16" | "i16" => Ok(BinaryKind::Int16),
            "int32" | "i32" => Ok(BinaryKind::Int32),
            "int64" | "i64" => Ok(BinaryKind::Int64),
            "uint8" | "u8" => Ok(BinaryKind::UInt8),
            "uint16" | "u16" => Ok(BinaryKind::UInt16),
            "uint32" | "u32" => Ok(BinaryKind::UInt32),
            "uint64" | "u64" => Ok(BinaryKind::UInt64),
            "float32" | "f32" => Ok(BinaryKind::Float32),
            "float64" | "f64" | "double" => Ok(BinaryKind::Float64),
            "bool" | "boolean" => Ok(BinaryKind::Bool),
            _ => Err(anyhow!("Unknown binary kind '{value}'")),
        }
    }
}

impl Serialize for BinaryKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BinaryKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        BinaryKind::from_str(&token).map_err(|err| de::Error::custom(err.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Seconds,
    Millis,
    Micros,
    Nanos,
}

impl TimeUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Seconds => "s",
            TimeUnit::Millis => "ms",
            TimeUnit::Micros => "us",
            TimeUnit::Nanos => "ns",
        }
    }

    const fn per_second(self) -> i64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Millis => 1_000,
            TimeUnit::Micros => 1_000_000,
            TimeUnit::Nanos => 1_000_000_000,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "seconds" => Ok(TimeUnit::Seconds),
            "ms" | "millis" | "milliseconds" => Ok(TimeUnit::Millis),
            "us" | "micros" | "microseconds" => Ok(TimeUnit::Micros),
            "ns" | "nanos" | "nanoseconds" => Ok(TimeUnit::Nanos),
            other => Err(anyhow!("Unknown time unit '{other}'")),
        }
    }
}

/// A parsed cell, prior to being narrowed into its binary slot.
///
/// Integers are carried as `i128` so both the full `i64` and `u64` ranges are
/// representable; range checks happen when the value is packed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Integer(i128),
    Float(f64),
}

impl Scalar {
    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Integer(v) => v as f64,
            Scalar::Float(v) => v,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Integer(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Turns one text cell into a [`Scalar`].
pub trait ScalarParser {
    fn parse_scalar(&self, text: &str) -> Result<Scalar>;

    /// Renders a scalar back into text this parser accepts.
    fn render_scalar(&self, value: Scalar) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseRule {
    Integer,
    Float,
    FixedPoint { scale: u32 },
    Boolean,
    Timestamp { unit: TimeUnit },
}

impl ParseRule {
    pub fn signature(&self) -> String {
        match self {
            ParseRule::Integer => "integer".to_string(),
            ParseRule::Float => "float".to_string(),
            ParseRule::FixedPoint { scale } => format!("fixed_point({scale})"),
            ParseRule::Boolean => "boolean".to_string(),
            ParseRule::Timestamp { unit } => format!("timestamp({})", unit.as_str()),
        }
    }
}

impl fmt::Display for ParseRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

impl FromStr for ParseRule {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let lowered = trimmed.to_ascii_lowercase();
        let (head, argument) = match lowered.split_once('(') {
            Some((head, rest)) => {
                let inner = rest
                    .strip_suffix(')')
                    .ok_or_else(|| anyhow!("Parse rule '{trimmed}' is missing a closing ')'"))?;
                (head.trim().to_string(), Some(inner.trim().to_string()))
            }
            None => (lowered.clone(), None),
        };
        match (head.as_str(), argument) {
            ("integer" | "int", None) => Ok(ParseRule::Integer),
            ("float", None) => Ok(ParseRule::Float),
            ("boolean" | "bool", None) => Ok(ParseRule::Boolean),
            ("fixed_point" | "fixed", Some(scale)) => {
                let scale = scale
                    .parse::<u32>()
                    .with_context(|| format!("Invalid fixed-point scale in '{trimmed}'"))?;
                Ok(ParseRule::FixedPoint { scale })
            }
            ("fixed_point" | "fixed", None) => {
                bail!("Fixed-point rule requires a scale, e.g. fixed_point(4)")
            }
            ("timestamp", None) => Ok(ParseRule::Timestamp {
                unit: TimeUnit::Nanos,
            }),
            ("timestamp", Some(unit)) => Ok(ParseRule::Timestamp {
                unit: unit.parse()?,
            }),
            _ => Err(anyhow!("Unknown parse rule '{trimmed}'")),
        }
    }
}

impl Serialize for ParseRule {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.signature())
    }
}

impl<'de> Deserialize<'de> for ParseRule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        ParseRule::from_str(&token).map_err(|err| de::Error::custom(err.to_string()))
    }
}

impl ScalarParser for ParseRule {
    fn parse_scalar(&self, text: &str) -> Result<Scalar> {
        let value = text.trim();
        match self {
            ParseRule::Integer => {
                let parsed: i128 = value
                    .parse()
                    .with_context(|| format!("Failed to parse '{value}' as integer"))?;
                Ok(Scalar::Integer(parsed))
            }
            ParseRule::Float => {
                let parsed: f64 = value
                    .parse()
                    .with_context(|| format!("Failed to parse '{value}' as float"))?;
                Ok(Scalar::Float(parsed))
            }
            ParseRule::FixedPoint { scale } => parse_fixed_point(value, *scale),
            ParseRule::Boolean => {
                let parsed = match value.to_ascii_lowercase().as_str() {
                    "true" | "t" | "yes" | "y" | "1" => 1,
                    "false" | "f" | "no" | "n" | "0" => 0,
                    _ => bail!("Failed to parse '{value}' as boolean"),
                };
                Ok(Scalar::Integer(parsed))
            }
            ParseRule::Timestamp { unit } => parse_timestamp(value, *unit),
        }
    }

    fn render_scalar(&self, value: Scalar) -> String {
        match (self, value) {
            (ParseRule::FixedPoint { scale }, Scalar::Integer(raw)) => {
                match Decimal::try_from_i128_with_scale(raw, *scale) {
                    Ok(decimal) => decimal.to_string(),
                    Err(_) => raw.to_string(),
                }
            }
            (ParseRule::Boolean, Scalar::Integer(raw)) => (raw != 0).to_string(),
            (ParseRule::Timestamp { unit }, Scalar::Integer(raw)) => render_timestamp(raw, *unit),
            (_, other) => other.to_string(),
        }
    }
}

fn parse_fixed_point(value: &str, scale: u32) -> Result<Scalar> {
    let decimal = Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .with_context(|| format!("Failed to parse '{value}' as decimal"))?
        .normalize();
    if decimal.scale() > scale {
        bail!(
            "'{value}' has {} fractional digit(s) but the field allows {scale}",
            decimal.scale()
        );
    }
    let factor = Decimal::from_i128_with_scale(10i128.pow(scale), 0);
    let scaled = decimal
        .checked_mul(factor)
        .and_then(|product| product.trunc().to_i128())
        .ok_or_else(|| anyhow!("'{value}' is out of range at scale {scale}"))?;
    Ok(Scalar::Integer(scaled))
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y%m%d %H:%M:%S%.f",
];

fn parse_timestamp(value: &str, unit: TimeUnit) -> Result<Scalar> {
    // Bare integers are already epoch offsets in the declared unit.
    if let Ok(raw) = value.parse::<i64>() {
        return Ok(Scalar::Integer(raw.into()));
    }
    let trimmed = value.trim_end_matches('Z');
    let naive = TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| anyhow!("Failed to parse '{value}' as timestamp"))?;
    let utc = naive.and_utc();
    let offset = match unit {
        TimeUnit::Seconds => Some(utc.timestamp()),
        TimeUnit::Millis => Some(utc.timestamp_millis()),
        TimeUnit::Micros => Some(utc.timestamp_micros()),
        TimeUnit::Nanos => utc.timestamp_nanos_opt(),
    }
    .ok_or_else(|| anyhow!("'{value}' is outside the representable nanosecond range"))?;
    Ok(Scalar::Integer(offset.into()))
}

fn render_timestamp(raw: i128, unit: TimeUnit) -> String {
    let Ok(raw) = i64::try_from(raw) else {
        return raw.to_string();
    };
    let per_second = unit.per_second();
    let seconds = raw.div_euclid(per_second);
    let sub_second = raw.rem_euclid(per_second);
    let nanos = sub_second * (1_000_000_000 / per_second);
    match u32::try_from(nanos)
        .ok()
        .and_then(|nanos| DateTime::from_timestamp(seconds, nanos))
    {
        Some(stamp) => stamp.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        None => raw.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FieldDocument", into = "FieldDocument")]
pub struct FieldSpec {
    pub name: String,
    pub kind: BinaryKind,
    pub parse: ParseRule,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: BinaryKind) -> Self {
        Self {
            name: name.into(),
            kind,
            parse: kind.default_rule(),
        }
    }

    pub fn with_rule(name: impl Into<String>, kind: BinaryKind, parse: ParseRule) -> Self {
        Self {
            name: name.into(),
            kind,
            parse,
        }
    }

    pub fn width(&self) -> usize {
        self.kind.width()
    }

    /// Parses `field:kind[:rule]`, e.g. `price:int32:fixed_point(2)`.
    pub fn parse_declaration(declaration: &str) -> Result<Self, SchemaError> {
        let invalid = |reason: String| SchemaError::InvalidDeclaration {
            declaration: declaration.trim().to_string(),
            reason,
        };
        let mut parts = declaration.trim().splitn(3, ':');
        let name = parts.next().map(str::trim).unwrap_or_default();
        let kind = parts
            .next()
            .map(str::trim)
            .filter(|kind| !kind.is_empty())
            .ok_or_else(|| invalid("expected 'name:kind[:rule]'".to_string()))?;
        let kind = BinaryKind::from_str(kind).map_err(|err| invalid(err.to_string()))?;
        let parse = match parts.next().map(str::trim).filter(|rule| !rule.is_empty()) {
            Some(rule) => ParseRule::from_str(rule).map_err(|err| invalid(err.to_string()))?,
            None => kind.default_rule(),
        };
        Ok(FieldSpec::with_rule(name, kind, parse))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FieldDocument {
    name: String,
    kind: BinaryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parse: Option<ParseRule>,
}

impl From<FieldDocument> for FieldSpec {
    fn from(doc: FieldDocument) -> Self {
        let parse = doc.parse.unwrap_or_else(|| doc.kind.default_rule());
        FieldSpec {
            name: doc.name,
            kind: doc.kind,
            parse,
        }
    }
}

impl From<FieldSpec> for FieldDocument {
    fn from(field: FieldSpec) -> Self {
        let parse = (field.parse != field.kind.default_rule()).then_some(field.parse);
        FieldDocument {
            name: field.name,
            kind: field.kind,
            parse,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SchemaDocument", into = "SchemaDocument")]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SchemaDocument {
    fields: Vec<FieldSpec>,
}

impl TryFrom<SchemaDocument> for Schema {
    type Error = SchemaError;

    fn try_from(doc: SchemaDocument) -> Result<Self, Self::Error> {
        Schema::new(doc.fields)
    }
}

impl From<Schema> for SchemaDocument {
    fn from(schema: Schema) -> Self {
        SchemaDocument {
            fields: schema.fields,
        }
    }
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError::Empty);
        }
        let mut seen: HashMap<&str, usize> = HashMap::with_capacity(fields.len());
        for (idx, field) in fields.iter().enumerate() {
            let position = idx + 1;
            if field.name.trim().is_empty() {
                return Err(SchemaError::EmptyName { position });
            }
            if let Some(first) = seen.insert(field.name.as_str(), position) {
                return Err(SchemaError::DuplicateName {
                    name: field.name.clone(),
                    first,
                    second: position,
                });
            }
            if let ParseRule::FixedPoint { scale } = field.parse
                && scale > FIXED_POINT_MAX_SCALE
            {
                return Err(SchemaError::InvalidScale {
                    name: field.name.clone(),
                    scale,
                    max: FIXED_POINT_MAX_SCALE,
                });
            }
        }
        Ok(Schema { fields })
    }

    /// Builds a schema from a comma-separated list of `name:kind[:rule]`
    /// declarations.
    pub fn from_declarations(list: &str) -> Result<Self, SchemaError> {
        let fields = list
            .split(',')
            .map(str::trim)
            .filter(|decl| !decl.is_empty())
            .map(FieldSpec::parse_declaration)
            .collect::<Result<Vec<_>, _>>()?;
        Schema::new(fields)
    }

    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|field| field.name.clone()).collect()
    }

    pub fn record_width(&self) -> usize {
        self.fields.iter().map(FieldSpec::width).sum()
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).context("Parsing schema YAML")
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing schema to YAML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening schema file {path:?}"))?;
        let reader = BufReader::new(file);
        let schema: Schema = serde_yaml::from_reader(reader).context("Parsing schema YAML")?;
        Ok(schema)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating schema file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing schema YAML")
    }
}

//! # Info Document Parsing
//!
//! The schema arrives as a JSON "info" document supplied by an external
//! collaborator (catalog layer, remote service). Only the fields the engine
//! needs for adaptation and formatting are validated here: the type name,
//! the fill literal, and the declared sizes. Everything else is carried
//! through untouched so the JSON encoder can embed the document verbatim.
//!
//! ```json
//! {
//!   "startDate": "2020-01-01T00:00Z",
//!   "stopDate": "2024-01-01T00:00Z",
//!   "parameters": [
//!     { "name": "Time", "type": "isotime", "length": 24, "fill": null },
//!     { "name": "proton_density", "type": "double", "units": "/cc", "fill": "-1e31" }
//!   ]
//! }
//! ```
//!
//! A computed field declares its transform inline:
//!
//! ```json
//! { "name": "flux_log", "type": "double", "fill": "-1e31",
//!   "virtual": { "function": "log10", "components": ["flux"] } }
//! ```

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{FieldDef, FieldType, Schema};
use crate::time::{TimeComponents, TimeRange};

/// Declarative definition of a virtual (computed) field. Validation of the
/// function name and its arguments happens at adapter-graph construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VirtualSpec {
    pub function: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axis: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDoc {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Vec<usize>>,
    #[serde(default, rename = "virtual", skip_serializing_if = "Option::is_none")]
    pub virtual_spec: Option<VirtualSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoDocument {
    #[serde(rename = "startDate")]
    pub start_date: String,
    #[serde(rename = "stopDate")]
    pub stop_date: String,
    #[serde(
        default,
        rename = "sampleStartDate",
        skip_serializing_if = "Option::is_none"
    )]
    pub sample_start_date: Option<String>,
    #[serde(
        default,
        rename = "sampleStopDate",
        skip_serializing_if = "Option::is_none"
    )]
    pub sample_stop_date: Option<String>,
    pub parameters: Vec<ParameterDoc>,
}

impl InfoDocument {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).wrap_err("malformed info document")
    }

    pub fn into_schema(self) -> Result<Schema> {
        let start = TimeComponents::parse(&self.start_date).wrap_err("bad startDate")?;
        let stop = TimeComponents::parse(&self.stop_date).wrap_err("bad stopDate")?;
        let mut fields = Vec::with_capacity(self.parameters.len());
        for p in &self.parameters {
            fields.push(FieldDef {
                name: p.name.clone(),
                ftype: FieldType::parse(&p.type_name)?,
                units: p.units.clone(),
                fill: p.fill.clone(),
                length: p.length,
                size: p
                    .size
                    .as_deref()
                    .map(SmallVec::from_slice)
                    .unwrap_or_default(),
                virtual_spec: p.virtual_spec.clone(),
            });
        }
        let mut schema = Schema::new(fields, start, stop)?;
        if let (Some(a), Some(b)) = (&self.sample_start_date, &self.sample_stop_date) {
            schema.sample_range = Some(TimeRange::new(
                TimeComponents::parse(a).wrap_err("bad sampleStartDate")?,
                TimeComponents::parse(b).wrap_err("bad sampleStopDate")?,
            ));
        }
        Ok(schema)
    }
}

impl Schema {
    pub fn from_json(json: &str) -> Result<Schema> {
        InfoDocument::from_json(json)?.into_schema()
    }

    /// Rebuild the info document for embedding in the JSON encoding.
    pub fn to_document(&self) -> InfoDocument {
        InfoDocument {
            start_date: self.start_date.format_at_length(20),
            stop_date: self.stop_date.format_at_length(20),
            sample_start_date: self.sample_range.map(|r| r.start.format_at_length(20)),
            sample_stop_date: self.sample_range.map(|r| r.stop.format_at_length(20)),
            parameters: self
                .fields()
                .iter()
                .map(|f| ParameterDoc {
                    name: f.name.clone(),
                    type_name: f.ftype.as_str().to_string(),
                    units: f.units.clone(),
                    fill: f.fill.clone(),
                    length: f.length,
                    size: if f.size.is_empty() {
                        None
                    } else {
                        Some(f.size.to_vec())
                    },
                    virtual_spec: f.virtual_spec.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "startDate": "2020-01-01T00:00Z",
        "stopDate": "2024-01-01T00:00Z",
        "parameters": [
            { "name": "Time", "type": "isotime", "length": 24 },
            { "name": "proton_density", "type": "double", "units": "/cc", "fill": "-1e31" },
            { "name": "flux", "type": "double", "fill": "-1e31", "size": [64, 96] },
            { "name": "flux_log", "type": "double", "fill": "-1e31",
              "virtual": { "function": "log10", "components": ["flux"] } }
        ]
    }"#;

    #[test]
    fn parses_full_document() {
        let schema = Schema::from_json(DOC).unwrap();
        assert_eq!(schema.field_count(), 4);
        assert_eq!(schema.field(0).length, Some(24));
        assert_eq!(schema.field(1).units.as_deref(), Some("/cc"));
        assert_eq!(schema.field(2).element_count(), 64 * 96);
        let v = schema.field(3).virtual_spec.as_ref().unwrap();
        assert_eq!(v.function, "log10");
        assert_eq!(v.components, vec!["flux"]);
    }

    #[test]
    fn rejects_unsupported_type() {
        let doc = r#"{
            "startDate": "2020-01-01T00:00Z",
            "stopDate": "2024-01-01T00:00Z",
            "parameters": [ { "name": "Time", "type": "datetime", "length": 24 } ]
        }"#;
        let err = Schema::from_json(doc).unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(Schema::from_json("{").is_err());
    }

    #[test]
    fn document_round_trips_through_schema() {
        let schema = Schema::from_json(DOC).unwrap();
        let doc = schema.to_document();
        assert_eq!(doc.parameters.len(), 4);
        assert_eq!(doc.parameters[2].size.as_deref(), Some(&[64, 96][..]));
        assert_eq!(doc.start_date, "2020-01-01T00:00:00Z");
    }
}

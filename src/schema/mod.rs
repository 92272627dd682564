//! # Dataset Schema
//!
//! This module provides the `Schema` struct describing the ordered, typed
//! fields of a dataset response. The schema governs both the adaptation
//! rules (how raw storage arrays become typed values) and every encoder's
//! byte layout, so it is immutable once a response starts.
//!
//! ## Field Model
//!
//! | Property | Meaning |
//! |----------|---------|
//! | `name` | unique field name |
//! | `ftype` | isotime, string, double, or integer |
//! | `fill` | "no data" sentinel literal, canonical for the response |
//! | `length` | byte width for isotime/string fields |
//! | `size` | dimension sizes; empty means scalar |
//! | `virtual_spec` | transform definition for computed fields |
//!
//! Invariant: a field's element count is the product of its dimension sizes
//! (1 if scalar). The first field of a schema is the record time tag and must
//! be an isotime.
//!
//! Schemas are parsed from JSON info documents by [`document`] and cached
//! process-wide by the catalog.

pub mod document;

use eyre::{bail, ensure, Result};
use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::config::MAX_DIMENSIONS;
use crate::time::TimeComponents;

pub use document::{InfoDocument, ParameterDoc, VirtualSpec};

/// The four canonical output types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Isotime,
    String,
    Double,
    Integer,
}

impl FieldType {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "isotime" => Ok(FieldType::Isotime),
            "string" => Ok(FieldType::String),
            "double" => Ok(FieldType::Double),
            "integer" => Ok(FieldType::Integer),
            other => bail!(
                "\"{}\" type not supported, must be one of: isotime, string, double, integer",
                other
            ),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Isotime => "isotime",
            FieldType::String => "string",
            FieldType::Double => "double",
            FieldType::Integer => "integer",
        }
    }
}

/// One field description within a schema.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub ftype: FieldType,
    pub units: Option<String>,
    pub fill: Option<String>,
    pub length: Option<usize>,
    pub size: SmallVec<[usize; 2]>,
    pub virtual_spec: Option<VirtualSpec>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ftype: FieldType) -> Self {
        Self {
            name: name.into(),
            ftype,
            units: None,
            fill: None,
            length: None,
            size: SmallVec::new(),
            virtual_spec: None,
        }
    }

    pub fn with_fill(mut self, fill: impl Into<String>) -> Self {
        self.fill = Some(fill.into());
        self
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_size(mut self, size: &[usize]) -> Self {
        self.size = SmallVec::from_slice(size);
        self
    }

    /// Total element count: the product of the dimension sizes, 1 if scalar.
    pub fn element_count(&self) -> usize {
        self.size.iter().product::<usize>().max(1)
    }

    pub fn is_array(&self) -> bool {
        !self.size.is_empty()
    }

    /// The declared fill parsed as a double, NaN when absent or non-numeric.
    pub fn fill_double(&self) -> f64 {
        self.fill
            .as_deref()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(f64::NAN)
    }
}

/// Ordered field descriptions plus the dataset's valid time extent.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<FieldDef>,
    by_name: HashMap<String, usize>,
    pub start_date: TimeComponents,
    pub stop_date: TimeComponents,
    pub sample_range: Option<crate::time::TimeRange>,
}

impl Schema {
    pub fn new(
        fields: Vec<FieldDef>,
        start_date: TimeComponents,
        stop_date: TimeComponents,
    ) -> Result<Self> {
        ensure!(!fields.is_empty(), "schema has no fields");
        ensure!(
            fields[0].ftype == FieldType::Isotime,
            "first field must be the isotime time tag, got {:?}",
            fields[0].name
        );
        let mut by_name = HashMap::with_capacity(fields.len());
        for (i, f) in fields.iter().enumerate() {
            match f.ftype {
                FieldType::Isotime | FieldType::String => {
                    ensure!(
                        f.length.is_some(),
                        "required tag length is missing for field {:?}",
                        f.name
                    );
                }
                _ => {}
            }
            ensure!(
                f.size.len() <= MAX_DIMENSIONS,
                "field {:?} declares {} dimensions, limit is {}",
                f.name,
                f.size.len(),
                MAX_DIMENSIONS
            );
            ensure!(
                !f.size.iter().any(|&d| d == 0),
                "field {:?} declares a zero-length dimension",
                f.name
            );
            if by_name.insert(f.name.clone(), i).is_some() {
                bail!("duplicate field name {:?}", f.name);
            }
        }
        Ok(Self {
            fields,
            by_name,
            start_date,
            stop_date,
            sample_range: None,
        })
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, i: usize) -> &FieldDef {
        &self.fields[i]
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Resolve a projection by name, preserving schema order is the caller's
    /// concern; the time tag is always included as the first projected field.
    pub fn projection(&self, names: &[String]) -> Result<Vec<usize>> {
        let mut map = Vec::with_capacity(names.len() + 1);
        map.push(0);
        for name in names {
            let idx = self
                .by_name
                .get(name.as_str())
                .copied()
                .ok_or_else(|| eyre::eyre!("unknown parameter {:?}", name))?;
            if !map.contains(&idx) {
                map.push(idx);
            }
        }
        Ok(map)
    }

    /// Build a schema containing only the projected fields, in projected order.
    pub fn subset(&self, map: &[usize]) -> Result<Schema> {
        let fields = map
            .iter()
            .map(|&i| {
                self.fields
                    .get(i)
                    .cloned()
                    .ok_or_else(|| eyre::eyre!("projection index {} out of range", i))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut s = Schema::new(fields, self.start_date, self.stop_date)?;
        s.sample_range = self.sample_range;
        Ok(s)
    }
}

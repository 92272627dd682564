//! # Raw Backing Arrays and Leaf Adaptation
//!
//! A granule decodes into one primitive array per stored field. Science
//! files use a zoo of storage encodings; [`RawArray`] enumerates the ones
//! the engine accepts and [`LeafAdapter`] turns them into canonical typed
//! values, applying two repairs on the way:
//!
//! ## Fill Canonicalization
//!
//! Values round-trip through single precision and per-field arithmetic, so
//! a "no data" sentinel like -1e31 arrives as many slightly different
//! doubles. Any decoded value within `tolerance` relative distance of the
//! declared fill is replaced by the exact fill, so downstream equality
//! comparison and formatting see one canonical bit pattern.
//!
//! ## Length Repair
//!
//! The decoded element count must be nrec × elements-per-record. Two
//! deviations are repairable:
//!
//! | Observed length | Repair |
//! |-----------------|--------|
//! | missing entirely | synthesize a fill-valued array of the expected shape |
//! | exactly one record's worth | broadcast it to every record (non-record-varying field) |
//!
//! Anything else is a fatal adaptation error: the decode contract was
//! violated and no guess about alignment would be safe.

use eyre::{bail, Result};

use crate::schema::{FieldDef, FieldType};
use crate::time::TimeComponents;

use super::{AdapterOptions, ValueKind};

/// One decoded primitive array backing a stored field for one granule.
#[derive(Debug, Clone)]
pub enum RawArray {
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    /// Milliseconds since 0001-01-01, a common storage time encoding.
    EpochMillis(Vec<f64>),
    /// Nanoseconds since J2000 on the TT scale, leap-second aware.
    Tt2000(Vec<i64>),
    /// Fixed-width character data, `width` bytes per element.
    Chars { data: Vec<u8>, width: usize },
}

impl RawArray {
    /// Number of stored elements, independent of record structure.
    pub fn element_len(&self) -> usize {
        match self {
            RawArray::Int8(v) => v.len(),
            RawArray::Int16(v) => v.len(),
            RawArray::Int32(v) => v.len(),
            RawArray::Int64(v) => v.len(),
            RawArray::UInt8(v) => v.len(),
            RawArray::UInt16(v) => v.len(),
            RawArray::UInt32(v) => v.len(),
            RawArray::Float(v) => v.len(),
            RawArray::Double(v) => v.len(),
            RawArray::EpochMillis(v) => v.len(),
            RawArray::Tt2000(v) => v.len(),
            RawArray::Chars { data, width } => {
                if *width == 0 {
                    0
                } else {
                    data.len() / width
                }
            }
        }
    }

    pub fn encoding_name(&self) -> &'static str {
        match self {
            RawArray::Int8(_) => "int8",
            RawArray::Int16(_) => "int16",
            RawArray::Int32(_) => "int32",
            RawArray::Int64(_) => "int64",
            RawArray::UInt8(_) => "uint8",
            RawArray::UInt16(_) => "uint16",
            RawArray::UInt32(_) => "uint32",
            RawArray::Float(_) => "float",
            RawArray::Double(_) => "double",
            RawArray::EpochMillis(_) => "epoch_millis",
            RawArray::Tt2000(_) => "tt2000",
            RawArray::Chars { .. } => "chars",
        }
    }

    fn is_numeric(&self) -> bool {
        !matches!(
            self,
            RawArray::Chars { .. } | RawArray::EpochMillis(_) | RawArray::Tt2000(_)
        )
    }

    /// Element as f64, no fill handling.
    fn get_f64(&self, i: usize) -> f64 {
        match self {
            RawArray::Int8(v) => v[i] as f64,
            RawArray::Int16(v) => v[i] as f64,
            RawArray::Int32(v) => v[i] as f64,
            RawArray::Int64(v) => v[i] as f64,
            RawArray::UInt8(v) => v[i] as f64,
            RawArray::UInt16(v) => v[i] as f64,
            RawArray::UInt32(v) => v[i] as f64,
            RawArray::Float(v) => v[i] as f64,
            RawArray::Double(v) => v[i],
            RawArray::EpochMillis(v) => v[i],
            RawArray::Tt2000(v) => v[i] as f64,
            RawArray::Chars { .. } => f64::NAN,
        }
    }

    fn get_i32(&self, i: usize) -> i32 {
        match self {
            RawArray::Int8(v) => v[i] as i32,
            RawArray::Int16(v) => v[i] as i32,
            RawArray::Int32(v) => v[i],
            RawArray::Int64(v) => v[i] as i32,
            RawArray::UInt8(v) => v[i] as i32,
            RawArray::UInt16(v) => v[i] as i32,
            RawArray::UInt32(v) => v[i] as i32,
            RawArray::Float(v) => v[i] as i32,
            RawArray::Double(v) => v[i] as i32,
            RawArray::EpochMillis(v) => v[i] as i32,
            RawArray::Tt2000(v) => v[i] as i32,
            RawArray::Chars { .. } => 0,
        }
    }
}

/// Replace a value within relative `tolerance` of `fill` by the exact fill.
/// A fill of zero cannot be distinguished from data and is left alone.
pub fn fuzzy_fill(d: f64, fill: f64, tolerance: f64) -> f64 {
    if fill != 0.0 && fill.is_finite() {
        let check = d / fill;
        if check > 1.0 - tolerance && check < 1.0 + tolerance {
            return fill;
        }
    }
    d
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Repair {
    /// Raw length is nrec × elements-per-record.
    None,
    /// Raw holds a single record's worth; every record reads index 0.
    Broadcast,
    /// No raw data; every element is the fill value.
    Synthesize,
}

/// Leaf of the adapter graph: owns one raw array and serves canonical typed
/// values per record index.
#[derive(Debug)]
pub struct LeafAdapter {
    raw: Option<RawArray>,
    kind: ValueKind,
    repair: Repair,
    /// Elements per record, from the field's declared sizes.
    epr: usize,
    fill: f64,
    tolerance: f64,
}

impl LeafAdapter {
    /// Bind a raw array (or its absence) to a schema field, deciding the
    /// repair policy. Fails when the encoding cannot produce the field's
    /// type or the element count is unreconcilable.
    pub fn bind(
        field: &FieldDef,
        raw: Option<RawArray>,
        nrec: usize,
        options: &AdapterOptions,
    ) -> Result<Self> {
        let kind = ValueKind::of_field(field);
        let epr = field.element_count();

        if let Some(raw) = &raw {
            match (field.ftype, raw) {
                (FieldType::Isotime, RawArray::EpochMillis(_))
                | (FieldType::Isotime, RawArray::Tt2000(_))
                | (FieldType::Isotime, RawArray::Chars { .. })
                | (FieldType::String, RawArray::Chars { .. }) => {}
                (FieldType::Double, r) | (FieldType::Integer, r) if r.is_numeric() => {}
                (ftype, r) => bail!(
                    "field {:?}: {} storage cannot adapt to {}",
                    field.name,
                    r.encoding_name(),
                    ftype.as_str()
                ),
            }
        }

        let repair = match &raw {
            None => {
                if matches!(field.ftype, FieldType::Isotime | FieldType::String) {
                    bail!(
                        "field {:?} is missing and {} cannot be synthesized from fill",
                        field.name,
                        field.ftype.as_str()
                    );
                }
                tracing::debug!(field = %field.name, "synthesizing fill-valued field");
                Repair::Synthesize
            }
            Some(raw) => {
                let len = raw.element_len();
                if len == nrec * epr {
                    Repair::None
                } else if len == epr {
                    tracing::debug!(
                        field = %field.name,
                        nrec,
                        "broadcasting single-record field to all records"
                    );
                    Repair::Broadcast
                } else {
                    bail!(
                        "field {:?}: raw element count {} is inconsistent with {} records of {} elements",
                        field.name,
                        len,
                        nrec,
                        epr
                    );
                }
            }
        };

        Ok(Self {
            raw,
            kind,
            repair,
            epr,
            fill: field.fill_double(),
            tolerance: options.fuzzy_fill_tolerance,
        })
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// First element offset for a record index, after repair remapping.
    fn base(&self, index: usize) -> usize {
        match self.repair {
            Repair::Broadcast => 0,
            _ => index * self.epr,
        }
    }

    pub fn double(&self, index: usize) -> f64 {
        match (&self.raw, self.repair) {
            (Some(raw), _) => fuzzy_fill(raw.get_f64(self.base(index)), self.fill, self.tolerance),
            (None, _) => self.fill,
        }
    }

    pub fn integer(&self, index: usize) -> i32 {
        match &self.raw {
            Some(raw) => raw.get_i32(self.base(index)),
            None => self.fill as i32,
        }
    }

    pub fn double_array_into(&self, index: usize, out: &mut Vec<f64>) {
        out.clear();
        match &self.raw {
            Some(raw) => {
                let base = self.base(index);
                out.extend(
                    (0..self.epr)
                        .map(|j| fuzzy_fill(raw.get_f64(base + j), self.fill, self.tolerance)),
                );
            }
            // synthesized fill row; caller memoizes by skipping re-eval
            None => out.resize(self.epr, self.fill),
        }
    }

    pub fn integer_array_into(&self, index: usize, out: &mut Vec<i32>) {
        out.clear();
        match &self.raw {
            Some(raw) => {
                let base = self.base(index);
                out.extend((0..self.epr).map(|j| raw.get_i32(base + j)));
            }
            None => out.resize(self.epr, self.fill as i32),
        }
    }

    /// True when evaluation is index-independent, so one evaluation can be
    /// reused for every record of the granule.
    pub fn index_independent(&self) -> bool {
        matches!(self.repair, Repair::Broadcast | Repair::Synthesize)
    }

    pub fn text_into(&self, index: usize, out: &mut String) -> Result<()> {
        out.clear();
        let raw = match &self.raw {
            Some(raw) => raw,
            None => bail!("no raw data for text field"),
        };
        let base = self.base(index);
        match raw {
            RawArray::EpochMillis(v) => {
                out.push_str(&TimeComponents::from_epoch_millis(v[base]).format_full());
            }
            RawArray::Tt2000(v) => {
                out.push_str(&TimeComponents::from_tt2000(v[base]).format_full());
            }
            RawArray::Chars { data, width } => {
                let chunk = &data[base * width..(base + 1) * width];
                let end = chunk
                    .iter()
                    .rposition(|&b| b != 0 && b != b' ')
                    .map(|p| p + 1)
                    .unwrap_or(0);
                let s = std::str::from_utf8(&chunk[..end])
                    .map_err(|_| eyre::eyre!("character field is not valid UTF-8"))?;
                out.push_str(s);
            }
            other => bail!("{} storage cannot render text", other.encoding_name()),
        }
        Ok(())
    }
}

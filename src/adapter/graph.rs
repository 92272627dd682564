//! # Adapter Graph
//!
//! Virtual variables compose already-adapted fields: a computed field may
//! slice an array field, gate a measurement on a quality flag, or shift a
//! time tag. Built naively from declarative configuration such a composition
//! can contain cycles or type mismatches, and neither may survive to the
//! per-record path.
//!
//! The graph is therefore an explicit arena: nodes live in one `Vec`,
//! children are referenced by [`AdapterId`], and construction proceeds
//! bottom-up so that **every child id is smaller than its parent id**. That
//! invariant gives two things at once: acyclicity is guaranteed by
//! construction (a cycle is caught while resolving names, before any node
//! is appended), and evaluation can split the arena at a node's index to
//! borrow its children's finished outputs while mutating its own scratch.
//!
//! ## Evaluation
//!
//! `eval(id, index)` computes the node's value for one record index into
//! the node's owned output buffer; `datum(id)` then lends it out. Scratch
//! buffers are reused across records and are invalid after the next
//! evaluation, consistent with the record non-retention rule. Work that
//! depends on shape but not index (fill-row synthesis, broadcast leaves,
//! constants) is computed once and skipped on later records.
//!
//! ## Supported Transforms
//!
//! | function | components | result |
//! |----------|------------|--------|
//! | `constant` | none, takes `value` | double scalar |
//! | `shift_time` | 1 isotime, takes `offset` duration | isotime |
//! | `log10` | 1 double (scalar or array) | same shape |
//! | `arr_slice` | 1 double array, takes `axis`, `index` | array less one axis |
//! | `filter_flag` | data + flag, takes `condition`, `value` | data's shape |
//!
//! Anything else fails at construction with the field name in the error.

use eyre::{bail, ensure, eyre, Result, WrapErr};
use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::records::Datum;
use crate::schema::{FieldDef, FieldType, Schema, VirtualSpec};
use crate::time::{parse_iso8601_duration, TimeComponents, TimeDelta};

use super::raw::{LeafAdapter, RawArray};
use super::{AdapterOptions, ValueKind};

/// Index of a node in the adapter arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdapterId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "eq" => CompareOp::Eq,
            "ne" => CompareOp::Ne,
            "lt" => CompareOp::Lt,
            "le" => CompareOp::Le,
            "gt" => CompareOp::Gt,
            "ge" => CompareOp::Ge,
            other => bail!("unsupported filter condition {:?}", other),
        })
    }

    fn test(&self, a: f64, b: f64) -> bool {
        match self {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
            CompareOp::Lt => a < b,
            CompareOp::Le => a <= b,
            CompareOp::Gt => a > b,
            CompareOp::Ge => a >= b,
        }
    }
}

/// Precomputed index arithmetic for extracting one axis-slice out of a
/// row-major array. For dims [d0, .., dn] slicing axis a at position k:
/// out[o * inner + i] = src[(o * dims[a] + k) * inner + i], where inner is
/// the product of the dims after a and outer the product before. A trailing
/// axis gives the strided case (inner = 1), a leading axis the contiguous
/// one (outer = 1).
#[derive(Debug, Clone, Copy)]
struct SlicePlan {
    outer: usize,
    axis_len: usize,
    pick: usize,
    inner: usize,
}

impl SlicePlan {
    fn new(dims: &[usize], axis: usize, pick: usize) -> Result<Self> {
        ensure!(axis < dims.len(), "slice axis {} out of {} dims", axis, dims.len());
        ensure!(
            pick < dims[axis],
            "slice index {} out of range for axis of {}",
            pick,
            dims[axis]
        );
        Ok(Self {
            outer: dims[..axis].iter().product(),
            axis_len: dims[axis],
            pick,
            inner: dims[axis + 1..].iter().product(),
        })
    }

    fn out_len(&self) -> usize {
        self.outer * self.inner
    }

    fn apply(&self, src: &[f64], out: &mut Vec<f64>) {
        out.clear();
        for o in 0..self.outer {
            let base = (o * self.axis_len + self.pick) * self.inner;
            out.extend_from_slice(&src[base..base + self.inner]);
        }
    }
}

#[derive(Debug)]
enum NodeOp {
    Leaf(LeafAdapter),
    Constant(f64),
    TimeShift { base: AdapterId, delta: TimeDelta },
    Log10 { base: AdapterId, fill: f64 },
    Slice { base: AdapterId, plan: SlicePlan },
    FilterFlag {
        data: AdapterId,
        flag: AdapterId,
        op: CompareOp,
        value: f64,
        fill: f64,
    },
}

#[derive(Debug)]
enum OutBuf {
    Double(f64),
    DoubleArray(Vec<f64>),
    Integer(i32),
    IntegerArray(Vec<i32>),
    Text(String),
}

#[derive(Debug)]
struct Node {
    kind: ValueKind,
    op: NodeOp,
    out: OutBuf,
    /// Record index the output buffer currently holds, for skipping
    /// re-evaluation of index-independent nodes and shared DAG children.
    evaluated_for: Option<usize>,
    index_independent: bool,
}

impl Node {
    fn children(&self) -> SmallVec<[AdapterId; 2]> {
        match &self.op {
            NodeOp::Leaf(_) | NodeOp::Constant(_) => SmallVec::new(),
            NodeOp::TimeShift { base, .. }
            | NodeOp::Log10 { base, .. }
            | NodeOp::Slice { base, .. } => SmallVec::from_slice(&[*base]),
            NodeOp::FilterFlag { data, flag, .. } => SmallVec::from_slice(&[*data, *flag]),
        }
    }
}

/// The arena of adapters for one request. Built once per request by
/// [`AdapterGraph::build`]; evaluated per record index.
#[derive(Debug)]
pub struct AdapterGraph {
    nodes: Vec<Node>,
    nrec: usize,
}

impl AdapterGraph {
    /// Build adapters for `wanted` schema field indices out of the decoded
    /// raw arrays of one granule. Cycles, unknown component names, and
    /// type-incompatible transforms are rejected here, before any record
    /// is produced.
    pub fn build(
        schema: &Schema,
        mut data: HashMap<String, RawArray>,
        nrec: usize,
        wanted: &[usize],
        options: &AdapterOptions,
    ) -> Result<(AdapterGraph, Vec<AdapterId>)> {
        let mut b = Builder {
            schema,
            data: &mut data,
            nrec,
            options,
            nodes: Vec::new(),
            by_name: HashMap::new(),
            in_progress: Vec::new(),
        };
        let mut roots = Vec::with_capacity(wanted.len());
        for &i in wanted {
            let field = schema.field(i);
            let id = b
                .build_field(field)
                .wrap_err_with(|| format!("building adapter for field {:?}", field.name))?;
            roots.push(id);
        }
        Ok((
            AdapterGraph {
                nodes: b.nodes,
                nrec,
            },
            roots,
        ))
    }

    pub fn record_count(&self) -> usize {
        self.nrec
    }

    pub fn kind(&self, id: AdapterId) -> ValueKind {
        self.nodes[id.0].kind
    }

    /// Evaluate a node (and transitively its children) for one record
    /// index. The result is readable through [`AdapterGraph::datum`] until
    /// the next evaluation of the same node.
    pub fn eval(&mut self, id: AdapterId, index: usize) -> Result<()> {
        debug_assert!(index < self.nrec);
        {
            let node = &self.nodes[id.0];
            if node.evaluated_for == Some(index)
                || (node.index_independent && node.evaluated_for.is_some())
            {
                return Ok(());
            }
        }
        for child in self.nodes[id.0].children() {
            self.eval(child, index)?;
        }
        // children are finished; split so their outputs can be read while
        // this node's buffers are written (child id < parent id)
        let (before, rest) = self.nodes.split_at_mut(id.0);
        let node = &mut rest[0];
        match (&mut node.op, &mut node.out) {
            (NodeOp::Leaf(leaf), out) => match out {
                OutBuf::Double(d) => *d = leaf.double(index),
                OutBuf::Integer(i) => *i = leaf.integer(index),
                OutBuf::DoubleArray(v) => leaf.double_array_into(index, v),
                OutBuf::IntegerArray(v) => leaf.integer_array_into(index, v),
                OutBuf::Text(s) => leaf.text_into(index, s)?,
            },
            (NodeOp::Constant(c), OutBuf::Double(d)) => *d = *c,
            (NodeOp::TimeShift { base, delta }, OutBuf::Text(s)) => {
                let src = before[base.0].out_text()?;
                let t = TimeComponents::parse(src).wrap_err("shift_time input")?;
                s.clear();
                s.push_str(&t.add(delta).format_full());
            }
            (NodeOp::Log10 { base, fill }, OutBuf::Double(d)) => {
                let v = before[base.0].out_double()?;
                // fill passes through so canonicalization survives the transform
                *d = if v == *fill { *fill } else { v.log10() };
            }
            (NodeOp::Log10 { base, fill }, OutBuf::DoubleArray(out)) => {
                let src = before[base.0].out_double_array()?;
                out.clear();
                out.extend(
                    src.iter()
                        .map(|&v| if v == *fill { *fill } else { v.log10() }),
                );
            }
            (NodeOp::Slice { base, plan }, OutBuf::DoubleArray(out)) => {
                let src = before[base.0].out_double_array()?;
                plan.apply(src, out);
            }
            (NodeOp::Slice { base, plan }, OutBuf::Double(d)) => {
                // scalar target: outer and inner are both 1
                let src = before[base.0].out_double_array()?;
                *d = src[plan.pick * plan.inner];
            }
            (
                NodeOp::FilterFlag {
                    data,
                    flag,
                    op,
                    value,
                    fill,
                },
                out,
            ) => {
                let pass = op.test(before[flag.0].out_double()?, *value);
                match out {
                    OutBuf::Double(d) => {
                        *d = if pass { before[data.0].out_double()? } else { *fill };
                    }
                    OutBuf::DoubleArray(v) => {
                        let src = before[data.0].out_double_array()?;
                        v.clear();
                        if pass {
                            v.extend_from_slice(src);
                        } else {
                            v.resize(src.len(), *fill);
                        }
                    }
                    _ => bail!("filter_flag output must be double-typed"),
                }
            }
            _ => bail!("adapter node evaluated with mismatched output buffer"),
        }
        node.evaluated_for = Some(index);
        Ok(())
    }

    /// Lend the node's most recently evaluated value.
    pub fn datum(&self, id: AdapterId) -> Datum<'_> {
        match &self.nodes[id.0].out {
            OutBuf::Double(d) => Datum::Double(*d),
            OutBuf::DoubleArray(v) => Datum::DoubleArray(v),
            OutBuf::Integer(i) => Datum::Integer(*i),
            OutBuf::IntegerArray(v) => Datum::IntegerArray(v),
            OutBuf::Text(s) => match self.nodes[id.0].kind {
                ValueKind::Isotime => Datum::Isotime(s),
                _ => Datum::Str(s),
            },
        }
    }
}

impl Node {
    fn out_double(&self) -> Result<f64> {
        match &self.out {
            OutBuf::Double(d) => Ok(*d),
            OutBuf::Integer(i) => Ok(*i as f64),
            _ => bail!("adapter child does not produce a double scalar"),
        }
    }

    fn out_double_array(&self) -> Result<&[f64]> {
        match &self.out {
            OutBuf::DoubleArray(v) => Ok(v),
            _ => bail!("adapter child does not produce a double array"),
        }
    }

    fn out_text(&self) -> Result<&str> {
        match &self.out {
            OutBuf::Text(s) => Ok(s),
            _ => bail!("adapter child does not produce text"),
        }
    }
}

struct Builder<'a> {
    schema: &'a Schema,
    data: &'a mut HashMap<String, RawArray>,
    nrec: usize,
    options: &'a AdapterOptions,
    nodes: Vec<Node>,
    by_name: HashMap<String, AdapterId>,
    in_progress: Vec<String>,
}

impl<'a> Builder<'a> {
    fn build_field(&mut self, field: &FieldDef) -> Result<AdapterId> {
        if let Some(&id) = self.by_name.get(&field.name) {
            return Ok(id);
        }
        if self.in_progress.contains(&field.name) {
            bail!(
                "virtual variable cycle: {} -> {}",
                self.in_progress.join(" -> "),
                field.name
            );
        }
        self.in_progress.push(field.name.clone());
        let result = match &field.virtual_spec {
            Some(spec) => self.build_virtual(field, spec),
            None => self.build_leaf(field),
        };
        self.in_progress.pop();
        let id = result?;
        self.by_name.insert(field.name.clone(), AdapterId(id.0));
        Ok(id)
    }

    fn build_leaf(&mut self, field: &FieldDef) -> Result<AdapterId> {
        let raw = self.data.remove(&field.name);
        let leaf = LeafAdapter::bind(field, raw, self.nrec, self.options)?;
        let kind = leaf.kind();
        let index_independent = leaf.index_independent();
        Ok(self.push(Node {
            kind,
            out: out_buf_for(kind),
            op: NodeOp::Leaf(leaf),
            evaluated_for: None,
            index_independent,
        }))
    }

    fn component(&mut self, spec: &VirtualSpec, i: usize) -> Result<AdapterId> {
        let name = spec
            .components
            .get(i)
            .ok_or_else(|| eyre!("{} requires component {}", spec.function, i + 1))?;
        let idx = self
            .schema
            .index_of(name)
            .ok_or_else(|| eyre!("virtual component {:?} is not in the schema", name))?;
        let field = self.schema.field(idx).clone();
        self.build_field(&field)
    }

    fn build_virtual(&mut self, field: &FieldDef, spec: &VirtualSpec) -> Result<AdapterId> {
        match spec.function.as_str() {
            "constant" => {
                ensure!(
                    field.ftype == FieldType::Double && !field.is_array(),
                    "constant requires a scalar double field"
                );
                let value = spec
                    .value
                    .ok_or_else(|| eyre!("constant requires a value"))?;
                Ok(self.push(Node {
                    kind: ValueKind::Double,
                    op: NodeOp::Constant(value),
                    out: OutBuf::Double(0.0),
                    evaluated_for: None,
                    index_independent: true,
                }))
            }
            "shift_time" => {
                ensure!(
                    field.ftype == FieldType::Isotime,
                    "shift_time requires an isotime field"
                );
                let base = self.component(spec, 0)?;
                ensure!(
                    self.nodes[base.0].kind == ValueKind::Isotime,
                    "shift_time component must be an isotime"
                );
                let offset = spec
                    .offset
                    .as_deref()
                    .ok_or_else(|| eyre!("shift_time requires an offset duration"))?;
                let delta = parse_iso8601_duration(offset)?;
                let index_independent = self.nodes[base.0].index_independent;
                Ok(self.push(Node {
                    kind: ValueKind::Isotime,
                    op: NodeOp::TimeShift { base, delta },
                    out: OutBuf::Text(String::new()),
                    evaluated_for: None,
                    index_independent,
                }))
            }
            "log10" => {
                ensure!(
                    field.ftype == FieldType::Double,
                    "log10 requires a double field"
                );
                let base = self.component(spec, 0)?;
                let kind = self.nodes[base.0].kind;
                ensure!(
                    matches!(kind, ValueKind::Double | ValueKind::DoubleArray),
                    "log10 component must be double-typed"
                );
                let index_independent = self.nodes[base.0].index_independent;
                Ok(self.push(Node {
                    kind,
                    op: NodeOp::Log10 {
                        base,
                        fill: field.fill_double(),
                    },
                    out: out_buf_for(kind),
                    evaluated_for: None,
                    index_independent,
                }))
            }
            "arr_slice" => {
                let base = self.component(spec, 0)?;
                ensure!(
                    self.nodes[base.0].kind == ValueKind::DoubleArray,
                    "arr_slice component must be a double array"
                );
                let src_name = &spec.components[0];
                let src_idx = self
                    .schema
                    .index_of(src_name)
                    .ok_or_else(|| eyre!("virtual component {:?} is not in the schema", src_name))?;
                let dims = &self.schema.field(src_idx).size;
                let axis = spec.axis.ok_or_else(|| eyre!("arr_slice requires an axis"))?;
                let pick = spec
                    .index
                    .ok_or_else(|| eyre!("arr_slice requires an index"))?;
                let plan = SlicePlan::new(dims, axis, pick)?;
                ensure!(
                    plan.out_len() == field.element_count(),
                    "arr_slice produces {} elements but field {:?} declares {}",
                    plan.out_len(),
                    field.name,
                    field.element_count()
                );
                // a declared-scalar target yields a scalar, not a 1-element array
                let (kind, out) = if field.is_array() {
                    (ValueKind::DoubleArray, OutBuf::DoubleArray(Vec::new()))
                } else {
                    (ValueKind::Double, OutBuf::Double(0.0))
                };
                let index_independent = self.nodes[base.0].index_independent;
                Ok(self.push(Node {
                    kind,
                    op: NodeOp::Slice { base, plan },
                    out,
                    evaluated_for: None,
                    index_independent,
                }))
            }
            "filter_flag" => {
                ensure!(
                    field.ftype == FieldType::Double,
                    "filter_flag requires a double field"
                );
                let data = self.component(spec, 0)?;
                let flag = self.component(spec, 1)?;
                ensure!(
                    matches!(
                        self.nodes[data.0].kind,
                        ValueKind::Double | ValueKind::DoubleArray
                    ),
                    "filter_flag data component must be double-typed"
                );
                ensure!(
                    matches!(
                        self.nodes[flag.0].kind,
                        ValueKind::Double | ValueKind::Integer
                    ),
                    "filter_flag flag component must be a scalar"
                );
                let op = CompareOp::parse(
                    spec.condition
                        .as_deref()
                        .ok_or_else(|| eyre!("filter_flag requires a condition"))?,
                )?;
                let value = spec
                    .value
                    .ok_or_else(|| eyre!("filter_flag requires a comparison value"))?;
                let kind = self.nodes[data.0].kind;
                let index_independent =
                    self.nodes[data.0].index_independent && self.nodes[flag.0].index_independent;
                Ok(self.push(Node {
                    kind,
                    op: NodeOp::FilterFlag {
                        data,
                        flag,
                        op,
                        value,
                        fill: field.fill_double(),
                    },
                    out: out_buf_for(kind),
                    evaluated_for: None,
                    index_independent,
                }))
            }
            other => bail!("unsupported virtual function {:?}", other),
        }
    }

    fn push(&mut self, node: Node) -> AdapterId {
        self.nodes.push(node);
        AdapterId(self.nodes.len() - 1)
    }
}

fn out_buf_for(kind: ValueKind) -> OutBuf {
    match kind {
        ValueKind::Double => OutBuf::Double(0.0),
        ValueKind::DoubleArray => OutBuf::DoubleArray(Vec::new()),
        ValueKind::Integer => OutBuf::Integer(0),
        ValueKind::IntegerArray => OutBuf::IntegerArray(Vec::new()),
        ValueKind::Isotime | ValueKind::Str => OutBuf::Text(String::new()),
    }
}

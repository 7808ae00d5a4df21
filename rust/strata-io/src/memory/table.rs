use ahash::AHashMap;
use bytemuck::Pod;
use serde_json::Value;
use strata_common::{Result, error::Error, verify_arg};
use strata_format::{FieldPath, GroupNode, PrimitiveType, SchemaNode};

use crate::{
    frame::{RecordFrame, SequenceValue},
    memory::json::push_primitive,
    source::{BindTarget, TableSource},
};

/// Column values of one leaf, for all records of a `MemoryTable`.
#[derive(Debug, Clone)]
pub enum ColumnData {
    /// Fixed-width values: `width` native bytes per record. Scalars and fixed-size
    /// arrays are both stored this way.
    Scalar {
        ty: PrimitiveType,
        width: usize,
        bytes: Vec<u8>,
    },
    /// One sequence value per record.
    Sequence {
        element: PrimitiveType,
        depth: usize,
        values: Vec<SequenceValue>,
    },
}

impl ColumnData {
    pub fn scalars<T: Pod>(ty: PrimitiveType, values: &[T]) -> Result<ColumnData> {
        ColumnData::arrays(ty, 1, values)
    }

    /// A column of fixed-size arrays of `len` elements each, `values` holding all
    /// elements back to back.
    pub fn arrays<T: Pod>(ty: PrimitiveType, len: usize, values: &[T]) -> Result<ColumnData> {
        verify_arg!(values, std::mem::size_of::<T>() == ty.size());
        verify_arg!(len, len > 0 && values.len() % len == 0);
        Ok(ColumnData::Scalar {
            ty,
            width: ty.size() * len,
            bytes: bytemuck::cast_slice(values).to_vec(),
        })
    }

    pub fn sequences(
        element: PrimitiveType,
        depth: usize,
        values: Vec<SequenceValue>,
    ) -> Result<ColumnData> {
        verify_arg!(depth, depth > 0);
        Ok(ColumnData::Sequence {
            element,
            depth,
            values,
        })
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Scalar { width, bytes, .. } => bytes.len() / width,
            ColumnData::Sequence { values, .. } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds an empty column for a declared type, if the type has a native
    /// in-memory representation.
    fn for_leaf(schema: &GroupNode, path: &FieldPath) -> Option<ColumnData> {
        let declared = &schema.resolve_leaf(path)?.declared_type;
        if let Some(ty) = declared.scalar() {
            return Some(ColumnData::Scalar {
                ty,
                width: ty.size(),
                bytes: Vec::new(),
            });
        }
        if let Some(array) = declared.fixed_array() {
            return Some(ColumnData::Scalar {
                ty: array.element,
                width: array.element.size() * array.len,
                bytes: Vec::new(),
            });
        }
        declared.sequence().map(|seq| ColumnData::Sequence {
            element: seq.element,
            depth: seq.depth,
            values: Vec::new(),
        })
    }

    fn push_json(&mut self, value: &Value) -> Result<()> {
        match self {
            ColumnData::Scalar { ty, width, bytes } => {
                let start = bytes.len();
                let res = match value {
                    Value::Array(items) if *width != ty.size() => {
                        verify_arg!(value, items.len() * ty.size() == *width);
                        items
                            .iter()
                            .try_for_each(|item| push_primitive(bytes, *ty, item))
                    }
                    _ => push_primitive(bytes, *ty, value),
                };
                if res.is_err() || bytes.len() - start != *width {
                    bytes.truncate(start);
                    res?;
                    return Err(Error::invalid_arg(
                        "value",
                        format!("{value} does not fill {width} bytes"),
                    ));
                }
                Ok(())
            }
            ColumnData::Sequence {
                element,
                depth,
                values,
            } => {
                values.push(sequence_from_json(value, *element, *depth)?);
                Ok(())
            }
        }
    }
}

fn sequence_from_json(
    value: &Value,
    element: PrimitiveType,
    depth: usize,
) -> Result<SequenceValue> {
    let Value::Array(items) = value else {
        return Err(Error::invalid_arg(
            "value",
            format!("{value} is not a sequence"),
        ));
    };
    if depth == 1 {
        let mut bytes = Vec::with_capacity(items.len() * element.size());
        for item in items {
            push_primitive(&mut bytes, element, item)?;
        }
        Ok(SequenceValue::Flat(bytes))
    } else {
        items
            .iter()
            .map(|item| sequence_from_json(item, element, depth - 1))
            .collect::<Result<Vec<_>>>()
            .map(SequenceValue::Nested)
    }
}

/// A `TableSource` over in-memory columns, one column per record field path.
pub struct MemoryTable {
    name: String,
    schema: SchemaNode,
    record_count: usize,
    columns: AHashMap<FieldPath, ColumnData>,
    bindings: Vec<(FieldPath, BindTarget)>,
}

impl MemoryTable {
    /// Creates a table without columns. `schema` must be a valid group node.
    pub fn new(
        name: impl Into<String>,
        schema: SchemaNode,
        record_count: usize,
    ) -> Result<MemoryTable> {
        verify_arg!(schema, schema.as_group().is_some());
        schema.validate()?;
        Ok(MemoryTable {
            name: name.into(),
            schema,
            record_count,
            columns: AHashMap::new(),
            bindings: Vec::new(),
        })
    }

    /// Builds a table from JSON records keyed by record field path components.
    ///
    /// A leaf `c.leaf_1` is read from `{"c": {"leaf_1": ...}}`; a scalar group `x`
    /// is read from `{"x": ...}`. Leaves whose declared type has no native
    /// representation get no column and are not read.
    pub fn from_json(
        name: impl Into<String>,
        schema: SchemaNode,
        records: &[Value],
    ) -> Result<MemoryTable> {
        let mut table = MemoryTable::new(name, schema, records.len())?;
        let group = table.root_group()?;
        let mut columns = group
            .leaf_paths()
            .into_iter()
            .filter_map(|path| ColumnData::for_leaf(group, &path).map(|column| (path, column)))
            .collect::<Vec<_>>();
        for (index, record) in records.iter().enumerate() {
            for (path, column) in columns.iter_mut() {
                let value = lookup(record, path).ok_or_else(|| {
                    Error::invalid_arg(
                        "records",
                        format!("record {index} of '{}' has no value for '{path}'", table.name),
                    )
                })?;
                column.push_json(value)?;
            }
        }
        table.columns.extend(columns);
        Ok(table)
    }

    /// Sets the column of the leaf at `path`.
    pub fn add_column(&mut self, path: impl Into<FieldPath>, column: ColumnData) -> Result<()> {
        let path = path.into();
        if self.root_group()?.resolve_leaf(&path).is_none() {
            return Err(Error::invalid_arg(
                "path",
                format!("'{path}' is not a leaf of table '{}'", self.name),
            ));
        }
        if column.len() != self.record_count {
            return Err(Error::invalid_arg(
                "column",
                format!(
                    "column '{path}' has {} values, table has {} records",
                    column.len(),
                    self.record_count
                ),
            ));
        }
        self.columns.insert(path, column);
        Ok(())
    }

    pub fn with_column(mut self, path: impl Into<FieldPath>, column: ColumnData) -> Result<Self> {
        self.add_column(path, column)?;
        Ok(self)
    }

    pub fn column(&self, path: &FieldPath) -> Option<&ColumnData> {
        self.columns.get(path)
    }

    /// The field paths bound so far, in binding order.
    pub fn bound_paths(&self) -> impl Iterator<Item = &FieldPath> {
        self.bindings.iter().map(|(path, _)| path)
    }

    fn root_group(&self) -> Result<&GroupNode> {
        self.schema
            .as_group()
            .ok_or_else(|| Error::invalid_operation("table schema is not a group"))
    }
}

fn lookup<'a>(record: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    path.as_str()
        .split(FieldPath::SEPARATOR)
        .try_fold(record, |value, name| value.get(name))
}

impl TableSource for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &SchemaNode {
        &self.schema
    }

    fn record_count(&self) -> usize {
        self.record_count
    }

    fn bind_field(&mut self, path: &FieldPath, target: BindTarget) -> Result<()> {
        let column = self.columns.get(path).ok_or_else(|| {
            Error::invalid_arg(
                "path",
                format!("table '{}' has no column '{path}'", self.name),
            )
        })?;
        match (column, target) {
            (ColumnData::Scalar { width, .. }, BindTarget::Slot { size, .. })
                if *width == size => {}
            (ColumnData::Sequence { .. }, BindTarget::Holding(_)) => {}
            _ => {
                return Err(Error::invalid_arg(
                    "target",
                    format!("{target:?} is incompatible with column '{path}'"),
                ));
            }
        }
        self.bindings.push((path.clone(), target));
        Ok(())
    }

    fn load_record(&mut self, index: usize, frame: &mut RecordFrame) -> Result<()> {
        if index >= self.record_count {
            return Err(Error::invalid_arg(
                "index",
                format!("record {index} out of {} records", self.record_count),
            ));
        }
        for (path, target) in &self.bindings {
            let column = self
                .columns
                .get(path)
                .ok_or_else(|| Error::invalid_operation("bound column disappeared"))?;
            match (column, target) {
                (ColumnData::Scalar { width, bytes, .. }, BindTarget::Slot { offset, .. }) => {
                    let start = index * width;
                    frame.write_slot(*offset, &bytes[start..start + width])?;
                }
                (
                    ColumnData::Sequence {
                        element,
                        depth,
                        values,
                    },
                    BindTarget::Holding(id),
                ) => {
                    let holding = frame.holding_mut(*id)?;
                    if holding.element() != *element || holding.depth() != *depth {
                        return Err(Error::invalid_format(
                            "holding",
                            format!("holding of '{path}' does not match the column type"),
                        ));
                    }
                    holding.set(values[index].clone());
                }
                _ => return Err(Error::invalid_operation("binding kind mismatch")),
            }
        }
        Ok(())
    }
}

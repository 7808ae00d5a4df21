use ahash::AHashSet;
use serde::Serialize;
use serde_json::{Map, Value};
use strata_common::{Result, error::Error};
use strata_format::PrimitiveType;

use crate::{
    frame::{RecordView, VarLenSlot},
    memory::json::read_primitive,
    sink::{DatasetHandle, GroupHandle, OutputSink, TypeHandle, TypeRef},
};

/// A fully resolved output type definition, as kept by `MemorySink`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TypeDef {
    Primitive {
        #[serde(rename = "type")]
        ty: PrimitiveType,
    },
    Compound {
        size: usize,
        fields: Vec<CompoundField>,
    },
    Array {
        element: Box<TypeDef>,
        len: usize,
    },
    Sequence {
        element: Box<TypeDef>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompoundField {
    pub name: String,
    pub offset: usize,
    #[serde(rename = "type")]
    pub ty: TypeDef,
}

impl TypeDef {
    pub fn size(&self) -> usize {
        match self {
            TypeDef::Primitive { ty } => ty.size(),
            TypeDef::Compound { size, .. } => *size,
            TypeDef::Array { element, len } => element.size() * len,
            TypeDef::Sequence { .. } => VarLenSlot::SIZE,
        }
    }

    /// Members of a compound type, empty for any other type.
    pub fn fields(&self) -> &[CompoundField] {
        match self {
            TypeDef::Compound { fields, .. } => fields,
            _ => &[],
        }
    }

    pub fn field(&self, name: &str) -> Option<&CompoundField> {
        self.fields().iter().find(|f| f.name == name)
    }
}

/// Export form of a group and everything below it.
#[derive(Debug, Serialize)]
pub struct GroupExport {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupExport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub datasets: Vec<DatasetExport>,
}

/// Export form of a dataset: its type tree and its decoded records.
#[derive(Debug, Serialize)]
pub struct DatasetExport {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDef,
    pub records: Vec<Value>,
}

struct TypeEntry {
    def: TypeDef,
    open: bool,
}

struct GroupEntry {
    name: String,
    parent: Option<usize>,
    open: bool,
    members: AHashSet<String>,
}

struct StoredRecord {
    bytes: Vec<u8>,
    heap: Vec<u8>,
}

struct DatasetEntry {
    name: String,
    group: usize,
    ty: TypeDef,
    records: Vec<Option<StoredRecord>>,
    open: bool,
}

/// An `OutputSink` keeping everything in memory.
///
/// Validates every operation the way a strict storage backend would: members must fit
/// inside their compound and must not overlap, member names are unique, closed handles
/// cannot be used and handles cannot be closed twice.
pub struct MemorySink {
    types: Vec<TypeEntry>,
    groups: Vec<GroupEntry>,
    datasets: Vec<DatasetEntry>,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    pub fn new() -> MemorySink {
        MemorySink {
            types: Vec::new(),
            groups: vec![GroupEntry {
                name: String::new(),
                parent: None,
                open: true,
                members: AHashSet::new(),
            }],
            datasets: Vec::new(),
        }
    }

    /// Definition of a type handle, whether open or already closed.
    pub fn type_def(&self, handle: TypeHandle) -> Result<&TypeDef> {
        self.types
            .get(handle.0 as usize)
            .map(|entry| &entry.def)
            .ok_or_else(|| Error::invalid_arg("handle", format!("unknown type {handle:?}")))
    }

    /// Number of type handles created and not yet closed.
    pub fn open_type_count(&self) -> usize {
        self.types.iter().filter(|t| t.open).count()
    }

    pub fn open_dataset_count(&self) -> usize {
        self.datasets.iter().filter(|d| d.open).count()
    }

    /// Number of open groups, not counting the root.
    pub fn open_group_count(&self) -> usize {
        self.groups.iter().skip(1).filter(|g| g.open).count()
    }

    pub fn dataset_count(&self) -> usize {
        self.datasets.len()
    }

    /// Finds a dataset by its slash-separated path from the root group, e.g. `run1/events`.
    pub fn find_dataset(&self, path: &str) -> Option<DatasetHandle> {
        self.datasets
            .iter()
            .position(|d| self.dataset_path(d) == path)
            .map(|i| DatasetHandle(i as u32))
    }

    /// Slash-separated paths of all datasets, in creation order.
    pub fn dataset_paths(&self) -> Vec<String> {
        self.datasets.iter().map(|d| self.dataset_path(d)).collect()
    }

    pub fn dataset_type(&self, dataset: DatasetHandle) -> Result<&TypeDef> {
        Ok(&self.dataset(dataset)?.ty)
    }

    pub fn dataset_len(&self, dataset: DatasetHandle) -> Result<usize> {
        Ok(self.dataset(dataset)?.records.len())
    }

    /// Number of records of the dataset that have been written.
    pub fn written_count(&self, dataset: DatasetHandle) -> Result<usize> {
        Ok(self
            .dataset(dataset)?
            .records
            .iter()
            .filter(|r| r.is_some())
            .count())
    }

    /// Raw bytes of a written record.
    pub fn record_bytes(&self, dataset: DatasetHandle, index: usize) -> Result<&[u8]> {
        Ok(&self.stored_record(dataset, index)?.bytes)
    }

    /// Decodes a written record into a JSON value following the dataset type.
    pub fn decode_record(&self, dataset: DatasetHandle, index: usize) -> Result<Value> {
        let ty = &self.dataset(dataset)?.ty;
        let record = self.stored_record(dataset, index)?;
        decode_value(ty, &record.bytes, 0, &record.heap)
    }

    /// Exports the whole container: groups, dataset types and decoded records.
    pub fn export(&self) -> Result<GroupExport> {
        self.export_group(0)
    }

    fn export_group(&self, index: usize) -> Result<GroupExport> {
        let groups = (0..self.groups.len())
            .filter(|&i| self.groups[i].parent == Some(index))
            .map(|i| self.export_group(i))
            .collect::<Result<Vec<_>>>()?;
        let datasets = self
            .datasets
            .iter()
            .filter(|d| d.group == index)
            .map(|d| {
                let records = d
                    .records
                    .iter()
                    .map(|r| match r {
                        Some(r) => decode_value(&d.ty, &r.bytes, 0, &r.heap),
                        None => Ok(Value::Null),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(DatasetExport {
                    name: d.name.clone(),
                    ty: d.ty.clone(),
                    records,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(GroupExport {
            name: self.groups[index].name.clone(),
            groups,
            datasets,
        })
    }

    fn dataset_path(&self, dataset: &DatasetEntry) -> String {
        let mut components = vec![dataset.name.as_str()];
        let mut group = Some(dataset.group);
        while let Some(index) = group {
            let entry = &self.groups[index];
            if entry.parent.is_some() {
                components.push(&entry.name);
            }
            group = entry.parent;
        }
        components.reverse();
        components.join("/")
    }

    fn dataset(&self, dataset: DatasetHandle) -> Result<&DatasetEntry> {
        self.datasets
            .get(dataset.0 as usize)
            .ok_or_else(|| Error::invalid_arg("dataset", format!("unknown {dataset:?}")))
    }

    fn stored_record(&self, dataset: DatasetHandle, index: usize) -> Result<&StoredRecord> {
        self.dataset(dataset)?
            .records
            .get(index)
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                Error::invalid_arg("index", format!("record {index} of {dataset:?} not written"))
            })
    }

    fn resolve(&self, ty: TypeRef, operation: &str) -> Result<TypeDef> {
        match ty {
            TypeRef::Primitive(ty) => Ok(TypeDef::Primitive { ty }),
            TypeRef::Handle(handle) => match self.types.get(handle.0 as usize) {
                Some(entry) if entry.open => Ok(entry.def.clone()),
                Some(_) => Err(Error::resource(
                    operation,
                    format!("type {handle:?} is closed"),
                )),
                None => Err(Error::resource(
                    operation,
                    format!("unknown type {handle:?}"),
                )),
            },
        }
    }

    fn open_group(&mut self, group: GroupHandle, operation: &str) -> Result<&mut GroupEntry> {
        match self.groups.get_mut(group.0 as usize) {
            Some(entry) if entry.open => Ok(entry),
            _ => Err(Error::resource(
                operation,
                format!("group {group:?} is not open"),
            )),
        }
    }

    fn add_type(&mut self, def: TypeDef) -> Result<TypeHandle> {
        let id = u32::try_from(self.types.len())
            .map_err(|_| Error::resource("create_type", "too many types"))?;
        self.types.push(TypeEntry { def, open: true });
        Ok(TypeHandle(id))
    }
}

impl OutputSink for MemorySink {
    fn root_group(&self) -> GroupHandle {
        GroupHandle(0)
    }

    fn create_group(&mut self, parent: GroupHandle, name: &str) -> Result<GroupHandle> {
        let parent_entry = self.open_group(parent, "create_group")?;
        if name.is_empty() || !parent_entry.members.insert(name.to_string()) {
            return Err(Error::resource(
                "create_group",
                format!("invalid or duplicate group name '{name}'"),
            ));
        }
        let id = self.groups.len() as u32;
        self.groups.push(GroupEntry {
            name: name.to_string(),
            parent: Some(parent.0 as usize),
            open: true,
            members: AHashSet::new(),
        });
        Ok(GroupHandle(id))
    }

    fn close_group(&mut self, group: GroupHandle) -> Result<()> {
        if group == self.root_group() {
            return Err(Error::resource("close_group", "the root group cannot be closed"));
        }
        self.open_group(group, "close_group")?.open = false;
        Ok(())
    }

    fn create_compound_type(&mut self, size: usize) -> Result<TypeHandle> {
        if size == 0 {
            return Err(Error::resource(
                "create_compound_type",
                "compound size must be positive",
            ));
        }
        self.add_type(TypeDef::Compound {
            size,
            fields: Vec::new(),
        })
    }

    fn create_array_type(&mut self, element: TypeRef, len: usize) -> Result<TypeHandle> {
        if len == 0 {
            return Err(Error::resource(
                "create_array_type",
                "array length must be positive",
            ));
        }
        let element = self.resolve(element, "create_array_type")?;
        self.add_type(TypeDef::Array {
            element: Box::new(element),
            len,
        })
    }

    fn create_sequence_type(&mut self, element: TypeRef) -> Result<TypeHandle> {
        let element = self.resolve(element, "create_sequence_type")?;
        self.add_type(TypeDef::Sequence {
            element: Box::new(element),
        })
    }

    fn insert_field(
        &mut self,
        compound: TypeHandle,
        name: &str,
        offset: usize,
        ty: TypeRef,
    ) -> Result<()> {
        let member = self.resolve(ty, "insert_field")?;
        let member_size = member.size();
        let entry = match self.types.get_mut(compound.0 as usize) {
            Some(entry) if entry.open => entry,
            _ => {
                return Err(Error::resource(
                    "insert_field",
                    format!("compound {compound:?} is not open"),
                ));
            }
        };
        let TypeDef::Compound { size, fields } = &mut entry.def else {
            return Err(Error::resource(
                "insert_field",
                format!("{compound:?} is not a compound type"),
            ));
        };
        if name.is_empty() || fields.iter().any(|f| f.name == name) {
            return Err(Error::resource(
                "insert_field",
                format!("invalid or duplicate member name '{name}'"),
            ));
        }
        let end = offset + member_size;
        if end > *size {
            return Err(Error::resource(
                "insert_field",
                format!("member '{name}' at {offset}..{end} exceeds compound size {size}"),
            ));
        }
        if let Some(other) = fields
            .iter()
            .find(|f| offset < f.offset + f.ty.size() && f.offset < end)
        {
            return Err(Error::resource(
                "insert_field",
                format!("member '{name}' overlaps member '{}'", other.name),
            ));
        }
        fields.push(CompoundField {
            name: name.to_string(),
            offset,
            ty: member,
        });
        Ok(())
    }

    fn type_size(&self, ty: TypeRef) -> Result<usize> {
        match ty {
            TypeRef::Primitive(ty) => Ok(ty.size()),
            TypeRef::Handle(handle) => Ok(self.type_def(handle)?.size()),
        }
    }

    fn close_type(&mut self, ty: TypeHandle) -> Result<()> {
        match self.types.get_mut(ty.0 as usize) {
            Some(entry) if entry.open => {
                entry.open = false;
                Ok(())
            }
            Some(_) => Err(Error::resource(
                "close_type",
                format!("type {ty:?} is already closed"),
            )),
            None => Err(Error::resource("close_type", format!("unknown type {ty:?}"))),
        }
    }

    fn create_dataset(
        &mut self,
        group: GroupHandle,
        name: &str,
        ty: TypeRef,
        record_count: usize,
    ) -> Result<DatasetHandle> {
        let ty = self.resolve(ty, "create_dataset")?;
        let group_entry = self.open_group(group, "create_dataset")?;
        if name.is_empty() || !group_entry.members.insert(name.to_string()) {
            return Err(Error::resource(
                "create_dataset",
                format!("invalid or duplicate dataset name '{name}'"),
            ));
        }
        let id = self.datasets.len() as u32;
        let mut records = Vec::with_capacity(record_count);
        records.resize_with(record_count, || None);
        self.datasets.push(DatasetEntry {
            name: name.to_string(),
            group: group.0 as usize,
            ty,
            records,
            open: true,
        });
        log::trace!("created dataset '{name}' with {record_count} records");
        Ok(DatasetHandle(id))
    }

    fn write_record(
        &mut self,
        dataset: DatasetHandle,
        index: usize,
        record: RecordView<'_>,
    ) -> Result<()> {
        let entry = match self.datasets.get_mut(dataset.0 as usize) {
            Some(entry) if entry.open => entry,
            _ => {
                return Err(Error::resource(
                    "write_record",
                    format!("dataset {dataset:?} is not open"),
                ));
            }
        };
        let expected = entry.ty.size();
        if record.bytes.len() != expected {
            return Err(Error::resource(
                "write_record",
                format!(
                    "record of {} bytes does not match type size {expected}",
                    record.bytes.len()
                ),
            ));
        }
        let len = entry.records.len();
        let slot = entry.records.get_mut(index).ok_or_else(|| {
            Error::resource(
                "write_record",
                format!("index {index} out of dataset bounds {len}"),
            )
        })?;
        *slot = Some(StoredRecord {
            bytes: record.bytes.to_vec(),
            heap: record.heap.to_vec(),
        });
        Ok(())
    }

    fn close_dataset(&mut self, dataset: DatasetHandle) -> Result<()> {
        match self.datasets.get_mut(dataset.0 as usize) {
            Some(entry) if entry.open => {
                entry.open = false;
                Ok(())
            }
            _ => Err(Error::resource(
                "close_dataset",
                format!("dataset {dataset:?} is not open"),
            )),
        }
    }
}

fn decode_value(def: &TypeDef, data: &[u8], pos: usize, heap: &[u8]) -> Result<Value> {
    match def {
        TypeDef::Primitive { ty } => {
            let bytes = data
                .get(pos..)
                .ok_or_else(|| Error::invalid_format("record", "value out of bounds"))?;
            read_primitive(bytes, *ty)
        }
        TypeDef::Compound { fields, .. } => {
            let mut map = Map::with_capacity(fields.len());
            for field in fields {
                let value = decode_value(&field.ty, data, pos + field.offset, heap)?;
                map.insert(field.name.clone(), value);
            }
            Ok(Value::Object(map))
        }
        TypeDef::Array { element, len } => (0..*len)
            .map(|i| decode_value(element, data, pos + i * element.size(), heap))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        TypeDef::Sequence { element } => {
            let slot = VarLenSlot::read_from(data, pos)?;
            let start = slot.offset as usize;
            (0..slot.len as usize)
                .map(|i| decode_value(element, heap, start + i * element.size(), heap))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use strata_format::PrimitiveType;

    use super::{MemorySink, TypeDef};
    use crate::{
        frame::{RecordFrame, SequenceValue},
        sink::{OutputSink, TypeRef},
    };

    #[test]
    fn test_compound_insert_validation() {
        let mut sink = MemorySink::new();
        let compound = sink.create_compound_type(8).unwrap();
        sink.insert_field(compound, "a", 0, PrimitiveType::Int32.into())
            .unwrap();
        // overlap
        assert!(
            sink.insert_field(compound, "b", 2, PrimitiveType::Int16.into())
                .is_err()
        );
        // out of bounds
        assert!(
            sink.insert_field(compound, "c", 4, PrimitiveType::Int64.into())
                .is_err()
        );
        // duplicate name
        assert!(
            sink.insert_field(compound, "a", 4, PrimitiveType::Int32.into())
                .is_err()
        );
        sink.insert_field(compound, "b", 4, PrimitiveType::Bool.into())
            .unwrap();
        assert_eq!(sink.type_def(compound).unwrap().fields().len(), 2);
        assert!(sink.create_compound_type(0).is_err());
    }

    #[test]
    fn test_close_exactly_once() {
        let mut sink = MemorySink::new();
        let inner = sink.create_compound_type(4).unwrap();
        sink.insert_field(inner, "v", 0, PrimitiveType::Float32.into())
            .unwrap();
        let outer = sink.create_compound_type(8).unwrap();
        sink.insert_field(outer, "inner", 4, inner.into()).unwrap();
        assert_eq!(sink.open_type_count(), 2);

        sink.close_type(inner).unwrap();
        assert!(sink.close_type(inner).is_err());
        // closed handles cannot be used anymore
        assert!(sink.insert_field(outer, "again", 0, inner.into()).is_err());
        assert!(sink.insert_field(inner, "w", 0, PrimitiveType::Int8.into()).is_err());

        // the inserted copy survives the close of its source handle
        let inner_field = sink.type_def(outer).unwrap().field("inner").unwrap();
        assert_eq!(inner_field.ty.fields()[0].name, "v");

        sink.close_type(outer).unwrap();
        assert_eq!(sink.open_type_count(), 0);
    }

    #[test]
    fn test_dataset_write_and_decode() {
        let mut sink = MemorySink::new();
        let seq = sink.create_sequence_type(PrimitiveType::Int32.into()).unwrap();
        let root = sink.create_compound_type(24).unwrap();
        sink.insert_field(root, "id", 0, PrimitiveType::UInt16.into())
            .unwrap();
        sink.insert_field(root, "hits", 8, TypeRef::Handle(seq)).unwrap();

        let group = sink.create_group(sink.root_group(), "run1").unwrap();
        let dataset = sink.create_dataset(group, "events", root.into(), 2).unwrap();

        let mut frame = RecordFrame::new(24);
        let holding = frame.allocate_holding(PrimitiveType::Int32, 1).unwrap();
        frame.write_slot(0, &7u16.to_ne_bytes()).unwrap();
        frame
            .holding_mut(holding)
            .unwrap()
            .set(SequenceValue::from_slice(&[4i32, 5]));
        frame.encode_sequence(holding, 8).unwrap();
        sink.write_record(dataset, 1, frame.view()).unwrap();
        assert!(sink.write_record(dataset, 2, frame.view()).is_err());

        assert_eq!(sink.find_dataset("run1/events"), Some(dataset));
        assert_eq!(sink.written_count(dataset).unwrap(), 1);
        assert_eq!(
            sink.decode_record(dataset, 1).unwrap(),
            json!({ "id": 7, "hits": [4, 5] })
        );
        assert!(sink.decode_record(dataset, 0).is_err());

        sink.close_dataset(dataset).unwrap();
        assert!(sink.close_dataset(dataset).is_err());
        assert!(sink.write_record(dataset, 0, frame.view()).is_err());
        sink.close_group(group).unwrap();
        assert!(sink.close_group(sink.root_group()).is_err());

        let export = sink.export().unwrap();
        assert_eq!(export.groups[0].name, "run1");
        assert_eq!(export.groups[0].datasets[0].records[0], json!(null));
        assert!(matches!(
            export.groups[0].datasets[0].ty,
            TypeDef::Compound { size: 24, .. }
        ));
    }
}

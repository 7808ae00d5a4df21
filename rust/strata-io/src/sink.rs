//! The output-side capability boundary.
//!
//! Any storage backend able to describe nested compound types with explicit member
//! offsets and to store fixed-layout records can serve as an `OutputSink`.

use strata_common::Result;
use strata_format::PrimitiveType;

use crate::frame::RecordView;

/// An opaque handle to a type allocated by the sink. Must be closed exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeHandle(pub u32);

/// An opaque handle to an output group (a container of datasets and nested groups).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupHandle(pub u32);

/// An opaque handle to an output dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatasetHandle(pub u32);

/// A reference to an output type: either a builtin primitive, which needs no
/// lifetime management, or a type allocated by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Primitive(PrimitiveType),
    Handle(TypeHandle),
}

impl From<PrimitiveType> for TypeRef {
    fn from(ty: PrimitiveType) -> Self {
        TypeRef::Primitive(ty)
    }
}

impl From<TypeHandle> for TypeRef {
    fn from(handle: TypeHandle) -> Self {
        TypeRef::Handle(handle)
    }
}

/// Storage backend operations required by the conversion core.
///
/// Member types are captured by value when they are inserted into a compound,
/// array or sequence type, so a handle may be closed as soon as nothing else is
/// going to be derived from it.
pub trait OutputSink {
    /// The top-level group of the output container.
    fn root_group(&self) -> GroupHandle;

    /// Creates a nested group under `parent`.
    fn create_group(&mut self, parent: GroupHandle, name: &str) -> Result<GroupHandle>;

    fn close_group(&mut self, group: GroupHandle) -> Result<()>;

    /// Creates an empty compound type spanning `size` bytes.
    fn create_compound_type(&mut self, size: usize) -> Result<TypeHandle>;

    /// Creates a fixed-size array type of `len` elements.
    fn create_array_type(&mut self, element: TypeRef, len: usize) -> Result<TypeHandle>;

    /// Creates a variable-length sequence type. Its in-record representation is a
    /// [`VarLenSlot`](crate::frame::VarLenSlot).
    fn create_sequence_type(&mut self, element: TypeRef) -> Result<TypeHandle>;

    /// Inserts a named member at `offset` bytes from the start of `compound`.
    fn insert_field(
        &mut self,
        compound: TypeHandle,
        name: &str,
        offset: usize,
        ty: TypeRef,
    ) -> Result<()>;

    /// Size in bytes of a value of the given type.
    fn type_size(&self, ty: TypeRef) -> Result<usize>;

    fn close_type(&mut self, ty: TypeHandle) -> Result<()>;

    /// Creates a dataset of `record_count` records of type `ty` under `group`.
    fn create_dataset(
        &mut self,
        group: GroupHandle,
        name: &str,
        ty: TypeRef,
        record_count: usize,
    ) -> Result<DatasetHandle>;

    /// Stores one converted record at `index`.
    fn write_record(
        &mut self,
        dataset: DatasetHandle,
        index: usize,
        record: RecordView<'_>,
    ) -> Result<()>;

    fn close_dataset(&mut self, dataset: DatasetHandle) -> Result<()>;
}

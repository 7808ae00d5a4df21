use std::sync::{Arc, Mutex, MutexGuard};

use strata_common::{Result, error::Error};

use crate::{
    frame::RecordView,
    sink::{DatasetHandle, GroupHandle, OutputSink, TypeHandle, TypeRef},
};

/// An `OutputSink` shared between conversion workers.
///
/// Every sink operation takes the lock for its own duration only; each worker keeps
/// its own handles, so operations of different tables may interleave freely.
pub struct SharedSink<S> {
    inner: Arc<Mutex<S>>,
    root: GroupHandle,
}

impl<S: OutputSink> SharedSink<S> {
    pub fn new(sink: S) -> SharedSink<S> {
        let root = sink.root_group();
        SharedSink {
            inner: Arc::new(Mutex::new(sink)),
            root,
        }
    }

    /// Returns the wrapped sink once all other clones have been dropped.
    pub fn into_inner(self) -> Result<S> {
        let mutex = Arc::try_unwrap(self.inner)
            .map_err(|_| Error::invalid_operation("shared sink is still in use"))?;
        mutex
            .into_inner()
            .map_err(|_| Error::resource("lock", "sink lock poisoned"))
    }

    fn lock(&self) -> Result<MutexGuard<'_, S>> {
        self.inner
            .lock()
            .map_err(|_| Error::resource("lock", "sink lock poisoned"))
    }
}

impl<S> Clone for SharedSink<S> {
    fn clone(&self) -> Self {
        SharedSink {
            inner: Arc::clone(&self.inner),
            root: self.root,
        }
    }
}

impl<S: OutputSink> OutputSink for SharedSink<S> {
    fn root_group(&self) -> GroupHandle {
        self.root
    }

    fn create_group(&mut self, parent: GroupHandle, name: &str) -> Result<GroupHandle> {
        self.lock()?.create_group(parent, name)
    }

    fn close_group(&mut self, group: GroupHandle) -> Result<()> {
        self.lock()?.close_group(group)
    }

    fn create_compound_type(&mut self, size: usize) -> Result<TypeHandle> {
        self.lock()?.create_compound_type(size)
    }

    fn create_array_type(&mut self, element: TypeRef, len: usize) -> Result<TypeHandle> {
        self.lock()?.create_array_type(element, len)
    }

    fn create_sequence_type(&mut self, element: TypeRef) -> Result<TypeHandle> {
        self.lock()?.create_sequence_type(element)
    }

    fn insert_field(
        &mut self,
        compound: TypeHandle,
        name: &str,
        offset: usize,
        ty: TypeRef,
    ) -> Result<()> {
        self.lock()?.insert_field(compound, name, offset, ty)
    }

    fn type_size(&self, ty: TypeRef) -> Result<usize> {
        self.lock()?.type_size(ty)
    }

    fn close_type(&mut self, ty: TypeHandle) -> Result<()> {
        self.lock()?.close_type(ty)
    }

    fn create_dataset(
        &mut self,
        group: GroupHandle,
        name: &str,
        ty: TypeRef,
        record_count: usize,
    ) -> Result<DatasetHandle> {
        self.lock()?.create_dataset(group, name, ty, record_count)
    }

    fn write_record(
        &mut self,
        dataset: DatasetHandle,
        index: usize,
        record: RecordView<'_>,
    ) -> Result<()> {
        self.lock()?.write_record(dataset, index, record)
    }

    fn close_dataset(&mut self, dataset: DatasetHandle) -> Result<()> {
        self.lock()?.close_dataset(dataset)
    }
}

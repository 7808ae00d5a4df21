use strata_common::Result;
use strata_format::TypeName;
use strata_io::{BindTarget, OutputSink, RecordFrame, TableSource, TypeRef, VarLenSlot};

use super::{LeafBinding, LeafConversion, MemberLayout, OutputType, TypeStrategy, scalar};
use crate::teardown::Teardown;

/// Variable-length sequences `vector<T>`, nested to any depth.
///
/// The record slot holds a [`VarLenSlot`]. The source fills a holding buffer owned by
/// the record frame, and the per-record converter encodes it into the record heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequenceStrategy;

impl TypeStrategy for SequenceStrategy {
    fn name(&self) -> &'static str {
        "sequence"
    }

    fn can_handle(&self, ty: &TypeName) -> bool {
        ty.sequence().is_some()
    }

    fn member_layout(&self, ty: &TypeName) -> Option<MemberLayout> {
        ty.sequence().map(|_| MemberLayout {
            size: VarLenSlot::SIZE,
            align: VarLenSlot::ALIGN,
        })
    }

    fn output_type(&self, ty: &TypeName, sink: &mut dyn OutputSink) -> Result<OutputType> {
        let sequence = ty.sequence().ok_or_else(|| scalar::unsupported(ty))?;
        let mut teardown = Teardown::new();
        let mut type_ref = TypeRef::from(sequence.element);
        for _ in 0..sequence.depth {
            match sink.create_sequence_type(type_ref) {
                Ok(handle) => {
                    teardown.close_type(handle);
                    type_ref = handle.into();
                }
                Err(e) => {
                    if let Err(cleanup) = teardown.run(sink) {
                        log::warn!("cleanup after failed sequence type: {cleanup}");
                    }
                    return Err(e);
                }
            }
        }
        Ok(OutputType { type_ref, teardown })
    }

    fn bind(
        &self,
        leaf: &LeafBinding<'_>,
        frame: &mut RecordFrame,
        source: &mut dyn TableSource,
    ) -> Result<LeafConversion> {
        let sequence = leaf
            .declared_type
            .sequence()
            .ok_or_else(|| scalar::unsupported(leaf.declared_type))?;
        let holding = frame.allocate_holding(sequence.element, sequence.depth)?;
        if let Err(e) = source.bind_field(leaf.path, BindTarget::Holding(holding)) {
            if let Err(cleanup) = frame.release_holding(holding) {
                log::warn!("releasing holding of '{}': {cleanup}", leaf.path);
            }
            return Err(e);
        }
        let offset = leaf.offset;
        Ok(LeafConversion {
            converter: Some(Box::new(move |frame: &mut RecordFrame| {
                frame.encode_sequence(holding, offset)
            })),
            deallocator: Some(Box::new(move |frame: &mut RecordFrame| {
                frame.release_holding(holding)
            })),
        })
    }
}

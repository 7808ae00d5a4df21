use strata_common::Result;
use strata_format::TypeName;
use strata_io::{BindTarget, OutputSink, RecordFrame, TableSource};

use super::{LeafBinding, LeafConversion, MemberLayout, OutputType, TypeStrategy, scalar};
use crate::teardown::Teardown;

/// Fixed-size arrays `T[N]`, stored in place as `N` consecutive elements.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedArrayStrategy;

impl TypeStrategy for FixedArrayStrategy {
    fn name(&self) -> &'static str {
        "array"
    }

    fn can_handle(&self, ty: &TypeName) -> bool {
        ty.fixed_array().is_some()
    }

    fn member_layout(&self, ty: &TypeName) -> Option<MemberLayout> {
        let array = ty.fixed_array()?;
        Some(MemberLayout {
            size: array.element.size().checked_mul(array.len)?,
            align: array.element.align(),
        })
    }

    fn output_type(&self, ty: &TypeName, sink: &mut dyn OutputSink) -> Result<OutputType> {
        let array = ty.fixed_array().ok_or_else(|| scalar::unsupported(ty))?;
        let handle = sink.create_array_type(array.element.into(), array.len)?;
        let mut teardown = Teardown::new();
        teardown.close_type(handle);
        Ok(OutputType {
            type_ref: handle.into(),
            teardown,
        })
    }

    fn bind(
        &self,
        leaf: &LeafBinding<'_>,
        _frame: &mut RecordFrame,
        source: &mut dyn TableSource,
    ) -> Result<LeafConversion> {
        source.bind_field(
            leaf.path,
            BindTarget::Slot {
                offset: leaf.offset,
                size: leaf.size,
            },
        )?;
        Ok(LeafConversion::default())
    }
}

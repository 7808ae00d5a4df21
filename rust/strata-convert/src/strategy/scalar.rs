use strata_common::{Result, error::Error};
use strata_format::TypeName;
use strata_io::{BindTarget, OutputSink, RecordFrame, TableSource};

use super::{LeafBinding, LeafConversion, MemberLayout, OutputType, TypeStrategy};

/// Primitive scalars. The source writes straight into the buffer slot.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScalarStrategy;

impl TypeStrategy for ScalarStrategy {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn can_handle(&self, ty: &TypeName) -> bool {
        ty.scalar().is_some()
    }

    fn member_layout(&self, ty: &TypeName) -> Option<MemberLayout> {
        ty.scalar().map(|p| MemberLayout {
            size: p.size(),
            align: p.align(),
        })
    }

    fn output_type(&self, ty: &TypeName, _sink: &mut dyn OutputSink) -> Result<OutputType> {
        let primitive = ty.scalar().ok_or_else(|| unsupported(ty))?;
        Ok(OutputType::primitive(primitive.into()))
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

pub(super) fn unsupported(ty: &TypeName) -> Error {
    Error::invalid_arg("type", format!("unsupported type '{ty}'"))
}

//! Conversion strategies for declared field types.
//!
//! A strategy decides, for the declared types it claims, how much room a field takes
//! in the record buffer, which output type describes it, and how its value gets from
//! the source into the record.

use strata_common::Result;
use strata_format::{FieldPath, TypeName};
use strata_io::{OutputSink, RecordFrame, TableSource, TypeRef};

use crate::teardown::Teardown;

mod array;
mod scalar;
mod sequence;

pub use array::FixedArrayStrategy;
pub use scalar::ScalarStrategy;
pub use sequence::SequenceStrategy;

/// Size and alignment of a field's slot in the record buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberLayout {
    pub size: usize,
    pub align: usize,
}

/// The output type of a field, with the steps that release it once the table is done.
#[derive(Debug)]
pub struct OutputType {
    pub type_ref: TypeRef,
    pub teardown: Teardown,
}

impl OutputType {
    /// A builtin type, nothing to release.
    pub fn primitive(type_ref: TypeRef) -> OutputType {
        OutputType {
            type_ref,
            teardown: Teardown::new(),
        }
    }
}

/// Per-record step of a field, run after the source has loaded the record.
pub type Converter = Box<dyn FnMut(&mut RecordFrame) -> Result<()> + Send>;

/// Release step of a field, run once after the last record.
pub type DeallocAction = Box<dyn FnOnce(&mut RecordFrame) -> Result<()> + Send>;

/// The buffer location assigned to a leaf.
#[derive(Debug, Clone, Copy)]
pub struct LeafBinding<'a> {
    pub path: &'a FieldPath,
    pub declared_type: &'a TypeName,
    /// Offset from the start of the record buffer.
    pub offset: usize,
    pub size: usize,
}

/// What binding a leaf produced. Fields aliased in place need neither part.
#[derive(Default)]
pub struct LeafConversion {
    pub converter: Option<Converter>,
    pub deallocator: Option<DeallocAction>,
}

pub trait TypeStrategy: Send + Sync {
    /// Short name, used in logs and layout reports.
    fn name(&self) -> &'static str;

    fn can_handle(&self, ty: &TypeName) -> bool;

    /// Slot layout of a field of type `ty`, `None` when `ty` is not supported.
    fn member_layout(&self, ty: &TypeName) -> Option<MemberLayout>;

    /// Creates the output type of a field of type `ty`.
    fn output_type(&self, ty: &TypeName, sink: &mut dyn OutputSink) -> Result<OutputType>;

    /// Connects the source field to its slot.
    ///
    /// Anything allocated here and not handed back in the returned `LeafConversion`
    /// must be released before an error is returned.
    fn bind(
        &self,
        leaf: &LeafBinding<'_>,
        frame: &mut RecordFrame,
        source: &mut dyn TableSource,
    ) -> Result<LeafConversion>;
}

/// Ordered list of strategies; the first one able to handle a type wins.
pub struct StrategyRegistry {
    strategies: Vec<Box<dyn TypeStrategy>>,
}

impl StrategyRegistry {
    /// A registry without any strategy.
    pub fn empty() -> StrategyRegistry {
        StrategyRegistry {
            strategies: Vec::new(),
        }
    }

    /// Scalars, fixed-size arrays and variable-length sequences, in that order.
    pub fn builtin() -> StrategyRegistry {
        StrategyRegistry::empty()
            .with_strategy(ScalarStrategy)
            .with_strategy(FixedArrayStrategy)
            .with_strategy(SequenceStrategy)
    }

    /// Adds a strategy after the ones already registered.
    pub fn with_strategy(mut self, strategy: impl TypeStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn find(&self, ty: &TypeName) -> Option<&dyn TypeStrategy> {
        self.strategies
            .iter()
            .find(|s| s.can_handle(ty))
            .map(|s| s.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.strategies.iter().map(|s| s.name())
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        StrategyRegistry::builtin()
    }
}

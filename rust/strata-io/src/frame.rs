//! The per-table record buffer and its auxiliary storage.

use bytemuck::{Pod, Zeroable};
use strata_common::{Result, error::Error, verify_arg};
use strata_format::PrimitiveType;

/// In-buffer descriptor of a variable-length value.
///
/// `offset` points into the heap that accompanies the record buffer; `len` is the
/// number of elements (not bytes) found there.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct VarLenSlot {
    pub len: u64,
    pub offset: u64,
}

impl VarLenSlot {
    pub const SIZE: usize = std::mem::size_of::<VarLenSlot>();
    pub const ALIGN: usize = 8;

    /// Reads a slot at the given position of a byte buffer.
    pub fn read_from(bytes: &[u8], pos: usize) -> Result<VarLenSlot> {
        let end = pos
            .checked_add(Self::SIZE)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| Error::invalid_format("var_len_slot", "slot out of bounds"))?;
        Ok(bytemuck::pod_read_unaligned(&bytes[pos..end]))
    }
}

/// The value of a sequence field for one record.
///
/// A depth-1 sequence is `Flat`: the packed native bytes of its elements.
/// Deeper sequences are `Nested`, one child value per item of the outer level.
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceValue {
    Flat(Vec<u8>),
    Nested(Vec<SequenceValue>),
}

impl SequenceValue {
    /// An empty value of the given nesting depth.
    pub fn empty(depth: usize) -> SequenceValue {
        if depth <= 1 {
            SequenceValue::Flat(Vec::new())
        } else {
            SequenceValue::Nested(Vec::new())
        }
    }

    pub fn from_slice<T: Pod>(values: &[T]) -> SequenceValue {
        SequenceValue::Flat(bytemuck::cast_slice(values).to_vec())
    }

    pub fn nested(items: impl IntoIterator<Item = SequenceValue>) -> SequenceValue {
        SequenceValue::Nested(items.into_iter().collect())
    }

    /// Number of items at the outermost level.
    pub fn item_count(&self, element: PrimitiveType) -> usize {
        match self {
            SequenceValue::Flat(bytes) => bytes.len() / element.size(),
            SequenceValue::Nested(items) => items.len(),
        }
    }
}

/// Identifies the holding buffer of a sequence field within a `RecordFrame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HoldingId(u32);

impl HoldingId {
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

/// Intermediate storage a source fills with the native value of a sequence field,
/// before it is encoded into the record.
#[derive(Debug, Clone)]
pub struct SequenceHolding {
    element: PrimitiveType,
    depth: usize,
    value: SequenceValue,
}

impl SequenceHolding {
    pub fn element(&self) -> PrimitiveType {
        self.element
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn value(&self) -> &SequenceValue {
        &self.value
    }

    pub fn set(&mut self, value: SequenceValue) {
        self.value = value;
    }
}

/// A borrowed view of a fully converted record: the fixed-layout buffer and the
/// heap its variable-length slots point into.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    pub bytes: &'a [u8],
    pub heap: &'a [u8],
}

/// The single record buffer of a table conversion.
pub struct RecordFrame {
    buffer: Vec<u8>,
    heap: Vec<u8>,
    holdings: Vec<Option<SequenceHolding>>,
}

impl RecordFrame {
    /// Creates a zero-initialized frame with a record buffer of `size` bytes.
    pub fn new(size: usize) -> RecordFrame {
        RecordFrame {
            buffer: vec![0u8; size],
            heap: Vec::new(),
            holdings: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn heap(&self) -> &[u8] {
        &self.heap
    }

    pub fn view(&self) -> RecordView<'_> {
        RecordView {
            bytes: &self.buffer,
            heap: &self.heap,
        }
    }

    /// Resets the per-record heap. The fixed buffer keeps its contents: every bound
    /// slot is overwritten when the next record is loaded.
    pub fn begin_record(&mut self) {
        self.heap.clear();
    }

    /// Copies `bytes` into the record buffer at `offset`.
    pub fn write_slot(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let range = self.slot_range(offset, bytes.len())?;
        self.buffer[range].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_slot(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let range = self.slot_range(offset, len)?;
        Ok(&self.buffer[range])
    }

    /// Allocates a holding buffer for a sequence field, initially holding an empty value.
    pub fn allocate_holding(&mut self, element: PrimitiveType, depth: usize) -> Result<HoldingId> {
        verify_arg!(depth, depth > 0);
        let id = u32::try_from(self.holdings.len())
            .map_err(|_| Error::invalid_operation("allocate_holding"))?;
        self.holdings.push(Some(SequenceHolding {
            element,
            depth,
            value: SequenceValue::empty(depth),
        }));
        Ok(HoldingId(id))
    }

    pub fn holding(&self, id: HoldingId) -> Result<&SequenceHolding> {
        self.holdings
            .get(id.as_usize())
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::invalid_arg("holding", format!("no live holding {id:?}")))
    }

    pub fn holding_mut(&mut self, id: HoldingId) -> Result<&mut SequenceHolding> {
        self.holdings
            .get_mut(id.as_usize())
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::invalid_arg("holding", format!("no live holding {id:?}")))
    }

    /// Frees a holding buffer. Releasing the same buffer twice is an error.
    pub fn release_holding(&mut self, id: HoldingId) -> Result<()> {
        self.holdings
            .get_mut(id.as_usize())
            .and_then(Option::take)
            .map(|_| ())
            .ok_or_else(|| {
                Error::invalid_operation(format!("release of unknown or released holding {id:?}"))
            })
    }

    /// Number of holding buffers that have been allocated and not yet released.
    pub fn live_holdings(&self) -> usize {
        self.holdings.iter().filter(|h| h.is_some()).count()
    }

    /// Encodes the current value of a holding buffer into the heap and stores the
    /// resulting `VarLenSlot` in the record buffer at `offset`.
    pub fn encode_sequence(&mut self, id: HoldingId, offset: usize) -> Result<()> {
        let RecordFrame {
            buffer,
            heap,
            holdings,
        } = self;
        let holding = holdings
            .get(id.as_usize())
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::invalid_arg("holding", format!("no live holding {id:?}")))?;
        let slot = encode_value(heap, &holding.value, holding.element, holding.depth)?;
        let end = offset
            .checked_add(VarLenSlot::SIZE)
            .filter(|&end| end <= buffer.len())
            .ok_or_else(|| Error::invalid_arg("offset", "slot out of record bounds"))?;
        buffer[offset..end].copy_from_slice(bytemuck::bytes_of(&slot));
        Ok(())
    }

    fn slot_range(&self, offset: usize, len: usize) -> Result<std::ops::Range<usize>> {
        match offset.checked_add(len) {
            Some(end) if end <= self.buffer.len() => Ok(offset..end),
            _ => Err(Error::invalid_arg(
                "offset",
                format!(
                    "slot {offset}..{offset}+{len} exceeds record size {}",
                    self.buffer.len()
                ),
            )),
        }
    }
}

fn align_heap(heap: &mut Vec<u8>, align: usize) {
    let padded = heap.len().next_multiple_of(align);
    heap.resize(padded, 0);
}

fn encode_value(
    heap: &mut Vec<u8>,
    value: &SequenceValue,
    element: PrimitiveType,
    depth: usize,
) -> Result<VarLenSlot> {
    match value {
        SequenceValue::Flat(bytes) if depth == 1 => {
            if bytes.len() % element.size() != 0 {
                return Err(Error::invalid_format(
                    "sequence",
                    format!(
                        "{} bytes is not a whole number of {element} values",
                        bytes.len()
                    ),
                ));
            }
            align_heap(heap, element.align());
            let offset = heap.len();
            heap.extend_from_slice(bytes);
            Ok(VarLenSlot {
                len: (bytes.len() / element.size()) as u64,
                offset: offset as u64,
            })
        }
        SequenceValue::Nested(items) if depth > 1 => {
            let slots = items
                .iter()
                .map(|item| encode_value(heap, item, element, depth - 1))
                .collect::<Result<Vec<_>>>()?;
            align_heap(heap, VarLenSlot::ALIGN);
            let offset = heap.len();
            heap.extend_from_slice(bytemuck::cast_slice(&slots));
            Ok(VarLenSlot {
                len: slots.len() as u64,
                offset: offset as u64,
            })
        }
        _ => Err(Error::invalid_format(
            "sequence",
            format!("value shape does not match nesting depth {depth}"),
        )),
    }
}

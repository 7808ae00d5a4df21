//! Conversions between JSON values and native primitive bytes.

use serde_json::Value;
use strata_common::{Result, error::Error};
use strata_format::PrimitiveType;

/// Appends the native bytes of `value`, interpreted as `ty`, to `out`.
pub(crate) fn push_primitive(out: &mut Vec<u8>, ty: PrimitiveType, value: &Value) -> Result<()> {
    let bytes = match ty {
        PrimitiveType::Bool => match value {
            Value::Bool(b) => Some(vec![*b as u8]),
            Value::Number(n) => n.as_u64().filter(|&v| v <= 1).map(|v| vec![v as u8]),
            _ => None,
        },
        PrimitiveType::Int8 => signed::<i8>(value).map(|v| v.to_ne_bytes().to_vec()),
        PrimitiveType::Int16 => signed::<i16>(value).map(|v| v.to_ne_bytes().to_vec()),
        PrimitiveType::Int32 => signed::<i32>(value).map(|v| v.to_ne_bytes().to_vec()),
        PrimitiveType::Int64 => signed::<i64>(value).map(|v| v.to_ne_bytes().to_vec()),
        PrimitiveType::UInt8 => unsigned::<u8>(value).map(|v| v.to_ne_bytes().to_vec()),
        PrimitiveType::UInt16 => unsigned::<u16>(value).map(|v| v.to_ne_bytes().to_vec()),
        PrimitiveType::UInt32 => unsigned::<u32>(value).map(|v| v.to_ne_bytes().to_vec()),
        PrimitiveType::UInt64 => unsigned::<u64>(value).map(|v| v.to_ne_bytes().to_vec()),
        PrimitiveType::Float32 => value.as_f64().map(|v| (v as f32).to_ne_bytes().to_vec()),
        PrimitiveType::Float64 => value.as_f64().map(|v| v.to_ne_bytes().to_vec()),
    };
    let bytes =
        bytes.ok_or_else(|| Error::invalid_arg("value", format!("{value} is not a valid {ty}")))?;
    out.extend_from_slice(&bytes);
    Ok(())
}

/// Reads a primitive of type `ty` from the start of `bytes`.
pub(crate) fn read_primitive(bytes: &[u8], ty: PrimitiveType) -> Result<Value> {
    let bytes = bytes
        .get(..ty.size())
        .ok_or_else(|| Error::invalid_format("record", format!("truncated {ty} value")))?;
    let value = match ty {
        PrimitiveType::Bool => Value::Bool(bytes[0] != 0),
        PrimitiveType::Int8 => Value::from(bytemuck::pod_read_unaligned::<i8>(bytes)),
        PrimitiveType::UInt8 => Value::from(bytes[0]),
        PrimitiveType::Int16 => Value::from(bytemuck::pod_read_unaligned::<i16>(bytes)),
        PrimitiveType::UInt16 => Value::from(bytemuck::pod_read_unaligned::<u16>(bytes)),
        PrimitiveType::Int32 => Value::from(bytemuck::pod_read_unaligned::<i32>(bytes)),
        PrimitiveType::UInt32 => Value::from(bytemuck::pod_read_unaligned::<u32>(bytes)),
        PrimitiveType::Int64 => Value::from(bytemuck::pod_read_unaligned::<i64>(bytes)),
        PrimitiveType::UInt64 => Value::from(bytemuck::pod_read_unaligned::<u64>(bytes)),
        PrimitiveType::Float32 => Value::from(bytemuck::pod_read_unaligned::<f32>(bytes) as f64),
        PrimitiveType::Float64 => Value::from(bytemuck::pod_read_unaligned::<f64>(bytes)),
    };
    Ok(value)
}

fn signed<T: TryFrom<i64>>(value: &Value) -> Option<T> {
    T::try_from(value.as_i64()?).ok()
}

fn unsigned<T: TryFrom<u64>>(value: &Value) -> Option<T> {
    T::try_from(value.as_u64()?).ok()
}

//! Compiled record layout: byte offsets and little-endian scalar encoding.
//!
//! [`compile`] turns a [`Schema`] into a [`CompiledLayout`] once per run.
//! Fields are packed densely in declaration order: no padding, no alignment,
//! every slot little-endian.

use itertools::Itertools;

use crate::{
    error::EncodeError,
    schema::{BinaryKind, Scalar, Schema},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSlot {
    pub name: String,
    pub offset: usize,
    pub width: usize,
    pub kind: BinaryKind,
}

impl FieldSlot {
    pub fn end(&self) -> usize {
        self.offset + self.width
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledLayout {
    record_width: usize,
    slots: Vec<FieldSlot>,
}

pub fn compile(schema: &Schema) -> CompiledLayout {
    let mut offset = 0usize;
    let slots = schema
        .fields()
        .iter()
        .map(|field| {
            let slot = FieldSlot {
                name: field.name.clone(),
                offset,
                width: field.kind.width(),
                kind: field.kind,
            };
            offset += slot.width;
            slot
        })
        .collect();
    CompiledLayout {
        record_width: offset,
        slots,
    }
}

macro_rules! put_integer {
    ($ty:ty, $slot:expr, $raw:expr, $dst:expr) => {{
        let narrowed = <$ty>::try_from($raw).map_err(|_| EncodeError::OutOfRange {
            field: $slot.name.clone(),
            kind: $slot.kind,
            value: $raw.to_string(),
        })?;
        $dst.copy_from_slice(&narrowed.to_le_bytes());
    }};
}

macro_rules! get_integer {
    ($ty:ty, $src:expr) => {{
        let mut bytes = [0u8; std::mem::size_of::<$ty>()];
        bytes.copy_from_slice($src);
        Scalar::Integer(<$ty>::from_le_bytes(bytes).into())
    }};
}

impl CompiledLayout {
    pub fn record_width(&self) -> usize {
        self.record_width
    }

    pub fn slots(&self) -> &[FieldSlot] {
        &self.slots
    }

    pub fn arity(&self) -> usize {
        self.slots.len()
    }

    /// Struct-style format string, e.g. `<dbqiib`.
    pub fn signature(&self) -> String {
        std::iter::once('<')
            .chain(self.slots.iter().map(|slot| slot.kind.struct_code()))
            .collect()
    }

    pub fn describe(&self) -> String {
        self.slots
            .iter()
            .map(|slot| format!("{}@{}:{}", slot.name, slot.offset, slot.kind))
            .join(" ")
    }

    /// Packs `values` into `buf`. On error the buffer contents are
    /// unspecified and must not be emitted.
    pub fn pack(&self, values: &[Scalar], buf: &mut [u8]) -> Result<(), EncodeError> {
        if values.len() != self.arity() {
            return Err(EncodeError::Arity {
                expected: self.arity(),
                actual: values.len(),
            });
        }
        if buf.len() != self.record_width {
            return Err(EncodeError::RecordLength {
                expected: self.record_width,
                actual: buf.len(),
            });
        }
        for (slot, value) in self.slots.iter().zip(values) {
            encode_slot(slot, *value, &mut buf[slot.offset..slot.end()])?;
        }
        Ok(())
    }

    pub fn pack_to_vec(&self, values: &[Scalar]) -> Result<Vec<u8>, EncodeError> {
        let mut buf = vec![0u8; self.record_width];
        self.pack(values, &mut buf)?;
        Ok(buf)
    }

    pub fn unpack(&self, record: &[u8]) -> Result<Vec<Scalar>, EncodeError> {
        if record.len() != self.record_width {
            return Err(EncodeError::RecordLength {
                expected: self.record_width,
                actual: record.len(),
            });
        }
        Ok(self
            .slots
            .iter()
            .map(|slot| decode_slot(slot.kind, &record[slot.offset..slot.end()]))
            .collect())
    }
}

fn encode_slot(slot: &FieldSlot, value: Scalar, dst: &mut [u8]) -> Result<(), EncodeError> {
    match (slot.kind, value) {
        (BinaryKind::Float64, value) => dst.copy_from_slice(&value.as_f64().to_le_bytes()),
        (BinaryKind::Float32, value) => {
            let wide = value.as_f64();
            if wide.is_finite() && wide.abs() > f64::from(f32::MAX) {
                return Err(EncodeError::OutOfRange {
                    field: slot.name.clone(),
                    kind: slot.kind,
                    value: value.to_string(),
                });
            }
            dst.copy_from_slice(&(wide as f32).to_le_bytes());
        }
        (kind, Scalar::Float(_)) => {
            return Err(EncodeError::TypeMismatch {
                field: slot.name.clone(),
                kind,
                value: value.to_string(),
            });
        }
        (BinaryKind::Bool, Scalar::Integer(raw)) => dst[0] = u8::from(raw != 0),
        (BinaryKind::Int8, Scalar::Integer(raw)) => put_integer!(i8, slot, raw, dst),
        (BinaryKind::Int16, Scalar::Integer(raw)) => put_integer!(i16, slot, raw, dst),
        (BinaryKind::Int32, Scalar::Integer(raw)) => put_integer!(i32, slot, raw, dst),
        (BinaryKind::Int64, Scalar::Integer(raw)) => put_integer!(i64, slot, raw, dst),
        (BinaryKind::UInt8, Scalar::Integer(raw)) => put_integer!(u8, slot, raw, dst),
        (BinaryKind::UInt16, Scalar::Integer(raw)) => put_integer!(u16, slot, raw, dst),
        (BinaryKind::UInt32, Scalar::Integer(raw)) => put_integer!(u32, slot, raw, dst),
        (BinaryKind::UInt64, Scalar::Integer(raw)) => put_integer!(u64, slot, raw, dst),
    }
    Ok(())
}

fn decode_slot(kind: BinaryKind, src: &[u8]) -> Scalar {
    match kind {
        BinaryKind::Int8 => get_integer!(i8, src),
        BinaryKind::Int16 => get_integer!(i16, src),
        BinaryKind::Int32 => get_integer!(i32, src),
        BinaryKind::Int64 => get_integer!(i64, src),
        BinaryKind::UInt8 => get_integer!(u8, src),
        BinaryKind::UInt16 => get_integer!(u16, src),
        BinaryKind::UInt32 => get_integer!(u32, src),
        BinaryKind::UInt64 => get_integer!(u64, src),
        BinaryKind::Bool => Scalar::Integer(i128::from(src[0] != 0)),
        BinaryKind::Float32 => {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(src);
            Scalar::Float(f32::from_le_bytes(bytes).into())
        }
        BinaryKind::Float64 => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(src);
            Scalar::Float(f64::from_le_bytes(bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(decls: &str) -> CompiledLayout {
        compile(&Schema::from_declarations(decls).expect("valid schema"))
    }

    #[test]
    fn offsets_are_dense_and_in_declaration_order() {
        let layout = layout("time:d,event_type:b,order_id:q,size:i,price:i,direction:b");
        let offsets: Vec<_> = layout.slots().iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0, 8, 9, 17, 21, 25]);
        assert_eq!(layout.record_width(), 26);
        assert_eq!(layout.signature(), "<dbqiib");
    }

    #[test]
    fn pack_writes_little_endian_bytes() {
        let layout = layout("a:int16,b:uint32,c:bool");
        let bytes = layout
            .pack_to_vec(&[
                Scalar::Integer(-2),
                Scalar::Integer(0x0102_0304),
                Scalar::Integer(5),
            ])
            .unwrap();
        assert_eq!(bytes, vec![0xFE, 0xFF, 0x04, 0x03, 0x02, 0x01, 0x01]);
    }

    #[test]
    fn integer_overflow_names_the_field() {
        let layout = layout("direction:int8");
        let err = layout.pack_to_vec(&[Scalar::Integer(128)]).unwrap_err();
        assert_eq!(
            err,
            EncodeError::OutOfRange {
                field: "direction".to_string(),
                kind: BinaryKind::Int8,
                value: "128".to_string(),
            }
        );
        let err = self::layout("qty:uint16")
            .pack_to_vec(&[Scalar::Integer(-1)])
            .unwrap_err();
        assert!(matches!(err, EncodeError::OutOfRange { .. }));
    }

    #[test]
    fn float_into_integer_slot_is_a_type_mismatch() {
        let layout = layout("size:int32");
        let err = layout.pack_to_vec(&[Scalar::Float(1.5)]).unwrap_err();
        assert!(matches!(err, EncodeError::TypeMismatch { .. }));
    }

    #[test]
    fn integers_widen_into_float_slots() {
        let layout = layout("px:float64");
        let bytes = layout.pack_to_vec(&[Scalar::Integer(3)]).unwrap();
        assert_eq!(bytes, 3.0f64.to_le_bytes().to_vec());
    }

    #[test]
    fn float32_rejects_values_beyond_its_range() {
        let layout = layout("px:float32");
        assert!(layout.pack_to_vec(&[Scalar::Float(1e39)]).is_err());
        let bytes = layout.pack_to_vec(&[Scalar::Float(f64::INFINITY)]).unwrap();
        assert_eq!(bytes, f32::INFINITY.to_le_bytes().to_vec());
    }

    #[test]
    fn pack_checks_arity_and_buffer_length() {
        let layout = layout("x:int32,y:int32");
        assert_eq!(layout.arity(), 2);
        let err = layout.pack_to_vec(&[Scalar::Integer(1)]).unwrap_err();
        assert_eq!(
            err,
            EncodeError::Arity {
                expected: 2,
                actual: 1
            }
        );
        let mut short = [0u8; 4];
        let err = layout
            .pack(&[Scalar::Integer(1), Scalar::Integer(2)], &mut short)
            .unwrap_err();
        assert!(matches!(err, EncodeError::RecordLength { expected: 8, .. }));
    }

    #[test]
    fn unpack_inverts_pack() {
        let layout = layout("t:float64,side:int8,id:uint64,qty:int32,flag:bool");
        let values = vec![
            Scalar::Float(34200.189607515),
            Scalar::Integer(-1),
            Scalar::Integer(u64::MAX.into()),
            Scalar::Integer(i32::MIN.into()),
            Scalar::Integer(1),
        ];
        let packed = layout.pack_to_vec(&values).unwrap();
        assert_eq!(layout.unpack(&packed).unwrap(), values);
        assert!(layout.unpack(&packed[1..]).is_err());
    }
}

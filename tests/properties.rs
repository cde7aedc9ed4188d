use std::io::Cursor;

use csv_binpack::{
    layout::compile,
    pipeline::{TranscodeOptions, Transcoder},
    schema::{BinaryKind, FieldSpec, Scalar, Schema},
    sink::RecordReader,
};
use proptest::prelude::*;

fn kind_strategy() -> impl Strategy<Value = BinaryKind> {
    prop_oneof![
        Just(BinaryKind::Int8),
        Just(BinaryKind::Int16),
        Just(BinaryKind::Int32),
        Just(BinaryKind::Int64),
        Just(BinaryKind::UInt8),
        Just(BinaryKind::UInt16),
        Just(BinaryKind::UInt32),
        Just(BinaryKind::UInt64),
        Just(BinaryKind::Float32),
        Just(BinaryKind::Float64),
        Just(BinaryKind::Bool),
    ]
}

/// A value that fits `kind` exactly, so packing then unpacking returns it.
fn value_strategy(kind: BinaryKind) -> BoxedStrategy<Scalar> {
    match kind {
        BinaryKind::Int8 => any::<i8>().prop_map(|v| Scalar::Integer(v.into())).boxed(),
        BinaryKind::Int16 => any::<i16>().prop_map(|v| Scalar::Integer(v.into())).boxed(),
        BinaryKind::Int32 => any::<i32>().prop_map(|v| Scalar::Integer(v.into())).boxed(),
        BinaryKind::Int64 => any::<i64>().prop_map(|v| Scalar::Integer(v.into())).boxed(),
        BinaryKind::UInt8 => any::<u8>().prop_map(|v| Scalar::Integer(v.into())).boxed(),
        BinaryKind::UInt16 => any::<u16>().prop_map(|v| Scalar::Integer(v.into())).boxed(),
        BinaryKind::UInt32 => any::<u32>().prop_map(|v| Scalar::Integer(v.into())).boxed(),
        BinaryKind::UInt64 => any::<u64>().prop_map(|v| Scalar::Integer(v.into())).boxed(),
        BinaryKind::Bool => (0i128..=1).prop_map(Scalar::Integer).boxed(),
        BinaryKind::Float32 => proptest::num::f32::NORMAL
            .prop_map(|v| Scalar::Float(v.into()))
            .boxed(),
        BinaryKind::Float64 => proptest::num::f64::NORMAL.prop_map(Scalar::Float).boxed(),
    }
}

fn schema_for(kinds: &[BinaryKind]) -> Schema {
    let fields = kinds
        .iter()
        .enumerate()
        .map(|(idx, kind)| FieldSpec::new(format!("f{idx}"), *kind))
        .collect();
    Schema::new(fields).expect("generated schema is valid")
}

fn record_strategy() -> impl Strategy<Value = (Vec<BinaryKind>, Vec<Scalar>)> {
    proptest::collection::vec(kind_strategy(), 1..12).prop_flat_map(|kinds| {
        let values = kinds
            .iter()
            .map(|kind| value_strategy(*kind))
            .collect::<Vec<_>>();
        (Just(kinds), values)
    })
}

proptest! {
    #[test]
    fn layout_offsets_are_contiguous(kinds in proptest::collection::vec(kind_strategy(), 1..24)) {
        let layout = compile(&schema_for(&kinds));
        let expected: usize = kinds.iter().map(|kind| kind.width()).sum();
        prop_assert_eq!(layout.record_width(), expected);
        let mut cursor = 0;
        for (slot, kind) in layout.slots().iter().zip(&kinds) {
            prop_assert_eq!(slot.offset, cursor);
            prop_assert_eq!(slot.width, kind.width());
            cursor = slot.end();
        }
        prop_assert_eq!(cursor, layout.record_width());
    }

    #[test]
    fn packed_records_decode_to_the_same_values((kinds, values) in record_strategy()) {
        let layout = compile(&schema_for(&kinds));
        let record = layout.pack_to_vec(&values).expect("values fit their slots");
        prop_assert_eq!(record.len(), layout.record_width());
        prop_assert_eq!(layout.unpack(&record).expect("full record"), values);
    }

    #[test]
    fn sniffed_and_explicit_delimiters_pack_identically(
        rows in proptest::collection::vec((any::<i32>(), any::<i32>(), any::<i32>()), 1..40),
        delimiter in prop_oneof![Just(b','), Just(b';'), Just(b'|'), Just(b'\t')],
    ) {
        let sep = delimiter as char;
        let csv = rows
            .iter()
            .map(|(a, b, c)| format!("{a}{sep}{b}{sep}{c}\n"))
            .collect::<String>();
        let schema = Schema::from_declarations("a:i32,b:i32,c:i32").expect("schema");

        let sniffing = Transcoder::new(schema.clone(), TranscodeOptions::default());
        let mut sniffed = Vec::new();
        let summary = sniffing
            .transcode(Cursor::new(csv.clone().into_bytes()), &mut sniffed)
            .expect("sniffed transcode");
        prop_assert_eq!(summary.records_written, rows.len() as u64);

        let explicit = Transcoder::new(
            schema.clone(),
            TranscodeOptions {
                delimiter: Some(delimiter),
                ..TranscodeOptions::default()
            },
        );
        let mut direct = Vec::new();
        explicit
            .transcode(Cursor::new(csv.into_bytes()), &mut direct)
            .expect("explicit transcode");
        prop_assert_eq!(&sniffed, &direct);

        let layout = compile(&schema);
        let decoded = RecordReader::new(Cursor::new(direct), &layout)
            .collect::<Result<Vec<_>, _>>()
            .expect("whole records");
        let expected = rows
            .iter()
            .map(|(a, b, c)| {
                vec![
                    Scalar::Integer((*a).into()),
                    Scalar::Integer((*b).into()),
                    Scalar::Integer((*c).into()),
                ]
            })
            .collect::<Vec<_>>();
        prop_assert_eq!(decoded, expected);
    }
}

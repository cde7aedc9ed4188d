//! Built-in schemas for well-known market-data files.

use crate::{
    cli::Preset,
    error::SchemaError,
    schema::{BinaryKind, FieldSpec, Schema},
};

pub fn schema(preset: Preset) -> Result<Schema, SchemaError> {
    match preset {
        Preset::Lobster => lobster_messages(),
    }
}

/// LOBSTER message file: seconds after midnight, event type, order id,
/// size, price in 1/10000 currency units, and direction (1 buy, -1 sell).
pub fn lobster_messages() -> Result<Schema, SchemaError> {
    Schema::new(vec![
        FieldSpec::new("time", BinaryKind::Float64),
        FieldSpec::new("event_type", BinaryKind::Int8),
        FieldSpec::new("order_id", BinaryKind::Int64),
        FieldSpec::new("size", BinaryKind::Int32),
        FieldSpec::new("price", BinaryKind::Int32),
        FieldSpec::new("direction", BinaryKind::Int8),
    ])
}

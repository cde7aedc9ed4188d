use std::io::Read;

use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::UnpackArgs,
    io_utils,
    layout::compile,
    schema::{ScalarParser, Schema},
    sink::RecordReader,
};

pub fn execute(args: &UnpackArgs) -> Result<()> {
    let schema = crate::load_schema(&args.source)?;
    let input: Box<dyn Read> = if io_utils::is_dash(&args.input) {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(io_utils::open_input_file(&args.input)?)
    };
    let written = write_csv(&schema, input, args)
        .with_context(|| format!("Unpacking {:?}", args.input))?;
    info!("Unpacked {} record(s) from {:?}", written, args.input);
    Ok(())
}

fn write_csv<R: Read>(schema: &Schema, input: R, args: &UnpackArgs) -> Result<u64> {
    let layout = compile(schema);
    let mut writer = io_utils::open_csv_writer(args.output.as_deref(), args.delimiter)?;
    if !args.no_header {
        writer.write_record(schema.names())?;
    }
    let mut written = 0u64;
    for record in RecordReader::new(input, &layout) {
        if args.limit.is_some_and(|limit| written >= limit) {
            break;
        }
        let values = record.with_context(|| format!("Reading record {}", written + 1))?;
        let rendered = schema
            .fields()
            .iter()
            .zip(values)
            .map(|(field, value)| field.parse.render_scalar(value));
        writer.write_record(rendered)?;
        written += 1;
    }
    writer.flush().context("Flushing output")?;
    Ok(written)
}

pub mod cli;
pub mod dialect;
pub mod error;
pub mod io_utils;
pub mod layout;
pub mod pipeline;
pub mod presets;
pub mod rows;
pub mod schema;
pub mod sink;
pub mod table;
pub mod unpack;

use std::{env, io::Write, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};
use serde_json::json;

use crate::{
    cli::{Cli, Commands, SchemaSource},
    dialect::Dialect,
    layout::compile,
    pipeline::{TranscodeOptions, Transcoder},
    schema::Schema,
    table::Align,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_binpack", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Pack(args) => handle_pack(&args),
        Commands::Layout(args) => handle_layout(&args),
        Commands::Unpack(args) => unpack::execute(&args),
        Commands::SchemaTemplate(args) => handle_schema_template(&args),
    }
}

pub(crate) fn load_schema(source: &SchemaSource) -> Result<Schema> {
    if let Some(path) = &source.schema {
        return Schema::load(path).with_context(|| format!("Loading schema from {path:?}"));
    }
    if let Some(list) = &source.fields {
        return Schema::from_declarations(list)
            .with_context(|| format!("Parsing field list '{list}'"));
    }
    match source.preset {
        Some(preset) => presets::schema(preset).context("Building preset schema"),
        None => anyhow::bail!("One of --schema, --fields or --preset is required"),
    }
}

fn handle_pack(args: &cli::PackArgs) -> Result<()> {
    let schema = load_schema(&args.source)?;
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let options = TranscodeOptions {
        delimiter: io_utils::resolve_input_delimiter(&args.input, args.delimiter),
        has_header: args.header,
        error_policy: args.on_error.into(),
        encoding,
        limit: args.limit,
    };
    let transcoder = Transcoder::new(schema, options);
    info!(
        "Packing '{}' -> {} ({} field(s), {}-byte records)",
        args.input.display(),
        args.output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdout".into()),
        transcoder.schema().arity(),
        transcoder.layout().record_width()
    );
    debug!(
        "Row error policy {:?}, record limit {:?}",
        transcoder.options().error_policy,
        transcoder.options().limit
    );

    let sniff_hint = || {
        format!(
            "Resolving the dialect of {:?} (pass --delimiter to skip sniffing)",
            args.input
        )
    };
    let outcome = if io_utils::is_dash(&args.input) {
        let (dialect, input) = transcoder
            .resolve_stream(std::io::stdin().lock())
            .with_context(sniff_hint)?;
        log_dialect(&dialect);
        let output = io_utils::open_record_writer(args.output.as_deref())?;
        transcoder.run(input, &dialect, output)
    } else {
        let mut input = io_utils::open_input_file(&args.input)?;
        let dialect = transcoder
            .resolve_seekable(&mut input)
            .with_context(sniff_hint)?;
        log_dialect(&dialect);
        let output = io_utils::open_record_writer(args.output.as_deref())?;
        transcoder.run(input, &dialect, output)
    };
    let summary = outcome.with_context(|| format!("Transcoding {:?}", args.input))?;

    info!(
        "Wrote {} record(s), {} byte(s) from {} row(s) ({} blank skipped)",
        summary.records_written, summary.bytes_written, summary.rows_read, summary.blank_rows
    );
    if summary.rows_rejected > 0 {
        warn!("{} row(s) rejected and left out", summary.rows_rejected);
    }
    Ok(())
}

fn log_dialect(dialect: &Dialect) {
    debug!(
        "Using delimiter '{}', quote '{}', header {}",
        printable_delimiter(dialect.delimiter),
        dialect.quote as char,
        if dialect.has_header {
            "skipped"
        } else {
            "absent"
        }
    );
}

fn handle_layout(args: &cli::LayoutArgs) -> Result<()> {
    let schema = load_schema(&args.source)?;
    let layout = compile(&schema);
    if args.json {
        let fields = schema
            .fields()
            .iter()
            .zip(layout.slots())
            .map(|(field, slot)| {
                json!({
                    "name": slot.name,
                    "kind": slot.kind.as_str(),
                    "offset": slot.offset,
                    "width": slot.width,
                    "parse": field.parse.signature(),
                })
            })
            .collect::<Vec<_>>();
        let document = json!({
            "signature": layout.signature(),
            "record_width": layout.record_width(),
            "fields": fields,
        });
        let rendered =
            serde_json::to_string_pretty(&document).context("Serializing layout JSON")?;
        println!("{rendered}");
        return Ok(());
    }
    let rows = schema
        .fields()
        .iter()
        .zip(layout.slots())
        .map(|(field, slot)| {
            vec![
                slot.name.clone(),
                slot.kind.to_string(),
                slot.kind.struct_code().to_string(),
                slot.offset.to_string(),
                slot.width.to_string(),
                field.parse.signature(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(
        &["field", "kind", "code", "offset", "width", "parse"],
        &[
            Align::Left,
            Align::Left,
            Align::Left,
            Align::Right,
            Align::Right,
            Align::Left,
        ],
        &rows,
    );
    println!(
        "record width: {} byte(s), format {}",
        layout.record_width(),
        layout.signature()
    );
    Ok(())
}

fn handle_schema_template(args: &cli::SchemaTemplateArgs) -> Result<()> {
    let schema = load_schema(&args.source)?;
    match args.output.as_deref() {
        Some(path) if !io_utils::is_dash(path) => {
            schema
                .save(path)
                .with_context(|| format!("Writing schema to {path:?}"))?;
            info!(
                "Schema with {} field(s) written to {:?}",
                schema.arity(),
                path
            );
        }
        _ => {
            let yaml = schema.to_yaml_string()?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(yaml.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}

pub mod cli;
pub mod config;
pub mod encoding;
pub mod error;
pub mod import;
pub mod io_utils;
pub mod mapper;
pub mod option;
pub mod records;
pub mod resolver;
pub mod schema;
pub mod serializer;
pub mod table;
pub mod validate;

use std::{env, io::Write, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info};
use serde_json::json;

use crate::{
    cli::{Cli, Commands},
    config::ImportConfig,
    encoding::EncodingNormalizer,
    resolver::Resolution,
    schema::ParserRegistry,
    validate::RequiredFieldsValidator,
};

pub use crate::{
    error::{FormatError, MAP_NOT_FOUND, MapError, SchemaError},
    import::{Attachment, ImportOutcome, Importer},
    mapper::RecordMapper,
    option::{MappingOption, SourceFormat},
    records::{BoundRecord, MappedData, RecordSet, RowRecord},
    resolver::{MappingResolver, resolve},
    schema::{FieldDef, LabelSchema, TargetSchema},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_map", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Probe(args) => handle_probe(&args),
        Commands::Resolve(args) => handle_resolve(&args),
        Commands::Extract(args) => handle_extract(&args),
        Commands::Import(args) => handle_import(&args),
    }
}

fn load_options(path: &std::path::Path) -> Result<Vec<MappingOption>> {
    let config =
        ImportConfig::load(path).with_context(|| format!("Loading map options from {path:?}"))?;
    config.build_options(&ParserRegistry::default())
}

fn handle_probe(args: &cli::ProbeArgs) -> Result<()> {
    let hint = io_utils::resolve_encoding(args.encoding.as_deref())?;
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    info!(
        "Probing '{}' with delimiter '{}'",
        args.input.display(),
        printable_delimiter(delimiter)
    );
    let mut input = io_utils::open_input(&args.input)?;
    let normalizer = EncodingNormalizer::new(hint);
    let detected = normalizer
        .detect(&mut input)
        .with_context(|| format!("Detecting encoding of {:?}", args.input))?;
    let headers = {
        let normalized = normalizer
            .normalize(&mut input)
            .with_context(|| format!("Normalizing {:?}", args.input))?;
        let mut reader = io_utils::open_csv_reader(normalized, delimiter);
        io_utils::reader_headers(&mut reader, io_utils::default_encoding())
            .with_context(|| format!("Reading header row of {:?}", args.input))?
    };

    println!("Encoding: {}", detected.name());
    let rows: Vec<Vec<String>> = headers
        .iter()
        .enumerate()
        .map(|(idx, label)| vec![(idx + 1).to_string(), label.clone()])
        .collect();
    table::print_table(&["#", "label"], &rows);

    if let Some(path) = &args.config {
        let options = load_options(path)?;
        let mut verdicts = Vec::with_capacity(options.len());
        for option in &options {
            let verdict = match option.can_map(&mut input) {
                Ok(true) => "yes".to_string(),
                Ok(false) => "no".to_string(),
                Err(MapError::NotSupported(_)) => "unsupported".to_string(),
                Err(err) => return Err(err).with_context(|| format!("Probing {option}")),
            };
            verdicts.push(vec![
                option.kind().to_string(),
                option.prefix().to_string(),
                verdict,
                option.missing_labels(&headers).join(", "),
            ]);
        }
        println!();
        table::print_table(&["kind", "prefix", "can_map", "missing"], &verdicts);
    }
    Ok(())
}

fn handle_resolve(args: &cli::ResolveArgs) -> Result<()> {
    let options = load_options(&args.config)?;
    let mut input = io_utils::open_input(&args.input)?;
    match resolve(&options, &mut input)? {
        Resolution::Matched { index, option } => {
            debug!("Matched option #{index}");
            println!("{}\t{}", option.kind(), option.prefix());
            Ok(())
        }
        Resolution::NoMatch { message } => bail!("{message}"),
    }
}

fn handle_extract(args: &cli::ExtractArgs) -> Result<()> {
    let options = load_options(&args.config)?;
    let mut input = io_utils::open_input(&args.input)?;
    let option = resolve(&options, &mut input)?.into_result()?;
    let mut mapper = option.mapper(&mut input)?;
    let flat = mapper
        .data()
        .with_context(|| format!("Extracting rows from {:?}", args.input))?
        .flatten();
    info!(
        "Extracted {} row(s) as '{}'",
        mapper.n_forms(),
        option.kind()
    );

    let mut writer = io_utils::open_output(args.output.as_deref())?;
    serde_json::to_writer_pretty(&mut writer, &flat).context("Writing extracted data")?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

fn handle_import(args: &cli::ImportArgs) -> Result<()> {
    let config = ImportConfig::load(&args.config)
        .with_context(|| format!("Loading map options from {:?}", args.config))?;
    let mut importer = config.importer()?;
    if let Some(limit) = args.max_upload_bytes {
        importer = importer.with_max_upload_bytes(limit);
    }
    let mut input = io_utils::open_input(&args.input)?;
    let mut outcome = importer
        .import(&mut input)
        .with_context(|| format!("Importing {:?}", args.input))?;
    outcome.validate(&RequiredFieldsValidator);

    let valid = outcome.valid_records();
    let invalid = outcome.invalid_records();
    info!(
        "{} valid and {} invalid row(s) for '{}'",
        valid.len(),
        invalid.len(),
        outcome.option().kind()
    );

    let report = json!({
        "kind": outcome.option().kind(),
        "prefix": outcome.option().prefix(),
        "total": outcome.records().len(),
        "valid": valid,
        "invalid": invalid,
    });
    let mut writer = io_utils::open_output(args.output.as_deref())?;
    serde_json::to_writer_pretty(&mut writer, &report).context("Writing import report")?;
    writeln!(writer)?;
    writer.flush()?;

    if let Some(path) = &args.invalid_output {
        match outcome.invalid_csv()? {
            Some(body) => {
                std::fs::write(path, body)
                    .with_context(|| format!("Writing invalid rows to {path:?}"))?;
                info!("Invalid rows written to {path:?}");
            }
            None => info!("No invalid rows; {path:?} not written"),
        }
    }
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}

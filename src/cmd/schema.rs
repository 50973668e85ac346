//! The `schema` subcommand.

use clap::{Args, ValueEnum};
use schemars::schema_for;
use tokio::fs;

use crate::{
    card::{EvidenceCard, ImageSlot},
    fields::{EvidenceFields, RubricMatch},
    ocr::ExtractionResult,
    prelude::*,
};

/// The different schema types we support.
///
/// We parse these as PascalCase, because they represent type names.
#[derive(Debug, Clone, Copy, ValueEnum)]
#[clap(rename_all = "PascalCase")]
pub enum SchemaType {
    /// A finished evidence card.
    EvidenceCard,
    /// The description fields of a card.
    EvidenceFields,
    /// One OCR extraction result.
    ExtractionResult,
    /// One per-image slot on a card.
    ImageSlot,
    /// One rubric-category match.
    RubricMatch,
}

/// Schema command line arguments.
#[derive(Debug, Args)]
pub struct SchemaOpts {
    /// The schema type to generate.
    #[clap(value_enum, value_name = "TYPE")]
    pub schema_type: SchemaType,

    /// The output path to write the schema to.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `schema` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_schema(schema_opts: &SchemaOpts) -> Result<()> {
    let schema = match schema_opts.schema_type {
        SchemaType::EvidenceCard => schema_for!(EvidenceCard),
        SchemaType::EvidenceFields => schema_for!(EvidenceFields),
        SchemaType::ExtractionResult => schema_for!(ExtractionResult),
        SchemaType::ImageSlot => schema_for!(ImageSlot),
        SchemaType::RubricMatch => schema_for!(RubricMatch),
    };

    let schema_str =
        serde_json::to_string_pretty(&schema).context("failed to serialize schema")?;
    match &schema_opts.output_path {
        Some(path) => fs::write(path, schema_str.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{schema_str}"),
    }
    Ok(())
}

//! The `process` subcommand.

use clap::Args;
use tokio::fs;

use crate::{
    card::{CardRequest, ImageUpload},
    llm::LlmOpts,
    ocr::OcrOpts,
    pipeline::Pipeline,
    prelude::*,
};

/// Process command line arguments.
#[derive(Debug, Args)]
pub struct ProcessOpts {
    /// Paths to one or two evidence photos.
    #[clap(value_name = "IMAGE", num_args = 1..=2, required = true)]
    pub images: Vec<PathBuf>,

    /// Teacher name.
    #[clap(long, default_value = "")]
    pub teacher: String,

    /// Subject taught.
    #[clap(long, default_value = "")]
    pub subject: String,

    /// School name.
    #[clap(long, default_value = "")]
    pub school: String,

    /// School principal name.
    #[clap(long, default_value = "")]
    pub principal: String,

    /// Program name for the card header.
    #[clap(long)]
    pub program_name: Option<String>,

    /// A sentence or two describing the program, passed to synthesis.
    #[clap(long)]
    pub program_description: Option<String>,

    /// The output path to write the card to.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,

    #[clap(flatten)]
    pub ocr: OcrOpts,

    #[clap(flatten)]
    pub llm: LlmOpts,
}

/// The `process` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_process(opts: &ProcessOpts) -> Result<()> {
    let mut images = Vec::with_capacity(opts.images.len());
    for path in &opts.images {
        let bytes = fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        images.push(ImageUpload { filename, bytes });
    }

    let request = CardRequest {
        teacher: opts.teacher.clone(),
        subject: opts.subject.clone(),
        school: opts.school.clone(),
        principal: opts.principal.clone(),
        program_name: opts.program_name.clone(),
        program_description: opts.program_description.clone(),
        images,
    };

    let pipeline = Pipeline::from_env(opts.ocr.clone(), opts.llm.clone());
    let card = pipeline.process(request).await?;

    let card_str =
        serde_json::to_string_pretty(&card).context("failed to serialize card")?;
    match &opts.output_path {
        Some(path) => fs::write(path, card_str.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{card_str}"),
    }
    Ok(())
}

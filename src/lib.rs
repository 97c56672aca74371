//! Labelspace: frame- and region-scoped annotations over multi-media data.
//!
//! A [`LabelRow`] holds every annotation of one data unit. Annotations live
//! on [`Space`]s (an image, a video, an audio track, a text document, or the
//! row's implicit root space) and reference shared entities
//! ([`ObjectInstance`], [`ClassificationInstance`]) by hash, so one entity
//! can appear on several spaces at once.
//!
//! # Modules
//!
//! - [`label_row`]: the aggregate root, its lifecycle and the bundle seam
//! - [`space`]: per-media annotation indices and their editing handles
//! - [`entity`]: object and classification instances with their answers
//! - [`geometry`]: every annotation geometry and its document form
//! - [`rle`]: the COCO-compatible bitmask RLE codec
//! - [`wire`]: the label document format
//! - [`validation`]: non-fatal checks over a label row
//! - [`error`]: error types

pub mod annotation;
pub mod entity;
pub mod error;
pub mod frames;
pub mod geometry;
pub mod ids;
pub mod label_row;
pub mod ontology;
pub mod rle;
pub mod space;
pub mod validation;
pub mod wire;

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

pub use annotation::{AnnotationMetadata, MetadataUpdate, OverlapStrategy, PutOptions};
pub use entity::{AnswerValue, Binding, ClassificationInstance, FrameAnswer, ObjectInstance};
pub use error::{ErrorKind, LabelError};
pub use frames::{FrameKey, Frames, Range};
pub use geometry::{Geometry, Shape};
pub use ids::{EntityHash, FeatureHash, SpaceId};
pub use label_row::{Bundle, LabelClient, LabelRow, LabelRowMetadata, MemoryClient};
pub use ontology::Ontology;
pub use space::{MediaSize, Space, SpaceKind, SpaceMut, SpaceRef};

/// The labelspace CLI application.
#[derive(Parser)]
#[command(name = "labelspace")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a label document, validate it and check that it re-serializes.
    Validate(ValidateArgs),
    /// Convert between 0/1 text rasters and compressed RLE strings.
    #[command(subcommand)]
    Rle(RleCommand),
}

#[derive(clap::Args)]
struct ValidateArgs {
    /// Label document to validate.
    input: PathBuf,

    /// Ontology the document was labelled against (.json, .yaml or .yml).
    #[arg(long, env = "LABELSPACE_ONTOLOGY")]
    ontology: PathBuf,

    /// Treat warnings as errors (exit non-zero if any warnings).
    #[arg(long)]
    strict: bool,

    /// Output format for the report ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,
}

#[derive(Subcommand)]
enum RleCommand {
    /// Encode a text raster ('-' reads stdin) and print its COCO form.
    Encode {
        input: PathBuf,
    },
    /// Decode a compressed RLE string and print the raster.
    Decode {
        #[arg(long)]
        height: usize,
        #[arg(long)]
        width: usize,
        counts: String,
    },
}

/// Run the labelspace CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), LabelError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Validate(args)) => run_validate(args),
        Some(Commands::Rle(command)) => run_rle(command),
        None => {
            println!("labelspace {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Frame- and region-scoped annotation documents.");
            println!();
            println!("Run 'labelspace --help' for usage information.");
            Ok(())
        }
    }
}

fn run_validate(args: ValidateArgs) -> Result<(), LabelError> {
    let ontology = Arc::new(Ontology::load(&args.ontology)?);
    let row = wire::read_label_row(ontology, &args.input)?;
    tracing::info!(
        input = %args.input.display(),
        entities = row.registry().len(),
        "loaded label row"
    );

    let opts = validation::ValidateOptions {
        strict: args.strict,
    };
    let report = validation::validate_label_row(&row, &opts);

    match args.output.as_str() {
        "json" => {
            let rendered = serde_json::to_string_pretty(&report.to_json())
                .map_err(|e| LabelError::malformed(e.to_string()))?;
            println!("{}", rendered);
        }
        _ => print!("{}", report),
    }

    let has_errors = report.error_count() > 0;
    let has_warnings = report.warning_count() > 0;

    if has_errors || (opts.strict && has_warnings) {
        return Err(LabelError::ValidationFailed {
            error_count: report.error_count(),
            warning_count: report.warning_count(),
            report,
        });
    }

    // A clean report should always serialize; surface anything it missed.
    row.to_wire_document()?;
    Ok(())
}

fn run_rle(command: RleCommand) -> Result<(), LabelError> {
    match command {
        RleCommand::Encode { input } => {
            let text = if input.as_os_str() == "-" {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                std::fs::read_to_string(&input)?
            };
            let mask = rle::Mask::from_text(&text)?;
            let coco = rle::CocoRle::from_mask(&mask);
            let rendered =
                serde_json::to_string(&coco).map_err(|e| LabelError::malformed(e.to_string()))?;
            println!("{}", rendered);
        }
        RleCommand::Decode {
            height,
            width,
            counts,
        } => {
            let mask = rle::decode(counts.trim(), height, width)?;
            print!("{}", mask.to_text());
        }
    }
    Ok(())
}

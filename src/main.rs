use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use radiograph_labeler::analytics::cooccurrence::{export_from_csv_file, NoHeatmap};
use radiograph_labeler::{Config, ExportFormat, FilterCriteria, Library};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "radiograph-labeler")]
#[command(author, version, about = "Chest radiograph annotation data manager", long_about = None)]
struct Args {
    /// Configuration file (JSON); defaults to the per-user config if present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print annotation statistics as JSON
    Stats {
        /// Dataset folder
        dataset: PathBuf,
    },

    /// List the images matching every given criterion
    Filter {
        dataset: PathBuf,
        #[arg(long)]
        pathology: Option<String>,
        #[arg(long)]
        sex: Option<String>,
        #[arg(long)]
        view: Option<String>,
        /// Earliest study date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        date_min: Option<String>,
        /// Latest study date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        date_max: Option<String>,
        #[arg(long)]
        age_min: Option<f64>,
        #[arg(long)]
        age_max: Option<f64>,
        /// Only images with at least one annotation
        #[arg(long, conflicts_with = "unannotated")]
        annotated: bool,
        /// Only images without annotations
        #[arg(long)]
        unannotated: bool,
    },

    /// Export every annotated image
    Export {
        dataset: PathBuf,
        /// Output file (output directory for YOLO)
        output: PathBuf,
        /// json, csv, coco or yolo
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Import a JSON or CSV export and save the result
    Import {
        dataset: PathBuf,
        input: PathBuf,
    },

    /// Write the pathology co-occurrence matrix as CSV
    Cooccurrence {
        dataset: PathBuf,
        output: PathBuf,
        /// Fall back to annotation pathologies for images without findings
        #[arg(long)]
        with_annotations: bool,
    },

    /// Co-occurrence matrix of any CSV file, no dataset needed
    CooccurrenceFromCsv {
        csv: PathBuf,
        output_dir: PathBuf,
    },

    /// Write the HTML localization report of the reference images
    Report {
        dataset: PathBuf,
        output: PathBuf,
    },

    /// List reference examples for a pathology
    References {
        dataset: PathBuf,
        pathology: String,
        #[arg(long, default_value_t = 3)]
        limit: usize,
        /// Image currently being edited
        #[arg(long)]
        exclude: Option<String>,
    },
}

fn open_library(config: Option<&Path>, dataset: &Path) -> Result<Library> {
    let config = Config::load_or_default(config).context("Failed to load configuration")?;
    let mut library = Library::new(config).context("Failed to initialize library")?;
    let count = library.load_dataset(dataset);
    if count == 0 {
        log::warn!("No images found under {}", dataset.display());
    }
    Ok(library)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.config.as_deref();

    match args.command {
        Command::Stats { dataset } => {
            let library = open_library(config, &dataset)?;
            let stats = library.statistics();
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Command::Filter {
            dataset,
            pathology,
            sex,
            view,
            date_min,
            date_max,
            age_min,
            age_max,
            annotated,
            unannotated,
        } => {
            let library = open_library(config, &dataset)?;
            let has_annotations = match (annotated, unannotated) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let criteria = FilterCriteria {
                pathology,
                sex,
                view,
                date_min,
                date_max,
                age_min,
                age_max,
                has_annotations,
            };
            for path in library.filter_images(&criteria) {
                println!("{}", path);
            }
        }

        Command::Export {
            dataset,
            output,
            format,
        } => {
            let format: ExportFormat = format.parse()?;
            let library = open_library(config, &dataset)?;
            let summary = library
                .export(&output, format)
                .with_context(|| format!("Failed to export to {}", output.display()))?;
            println!(
                "✅ Exported {} annotations on {} images ({}) to {}",
                summary.annotations_exported,
                summary.images_exported,
                format,
                output.display()
            );
        }

        Command::Import { dataset, input } => {
            let mut library = open_library(config, &dataset)?;
            let summary = library
                .import(&input)
                .with_context(|| format!("Failed to import {}", input.display()))?;
            let saved = library.save_all()?;
            println!(
                "✅ Imported {} annotations for {} images ({} outside the dataset), saved {} files",
                summary.annotations, summary.images, summary.unknown_images, saved
            );
        }

        Command::Cooccurrence {
            dataset,
            output,
            with_annotations,
        } => {
            let library = open_library(config, &dataset)?;
            library.export_cooccurrence_csv(&output, !with_annotations)?;
            println!("✅ Co-occurrence matrix written to {}", output.display());
        }

        Command::CooccurrenceFromCsv { csv, output_dir } => {
            let (csv_out, heatmap) = export_from_csv_file(&csv, &output_dir, &NoHeatmap)
                .with_context(|| format!("Failed to analyse {}", csv.display()))?;
            println!("✅ Co-occurrence matrix written to {}", csv_out.display());
            match heatmap {
                Some(path) => println!("🖼️  Heatmap written to {}", path.display()),
                None => println!("⚠️  Heatmap unavailable"),
            }
        }

        Command::Report { dataset, output } => {
            let library = open_library(config, &dataset)?;
            let count = library.export_localization_report(&output)?;
            println!("✅ Report with {} images written to {}", count, output.display());
        }

        Command::References {
            dataset,
            pathology,
            limit,
            exclude,
        } => {
            let library = open_library(config, &dataset)?;
            let examples = library.reference_examples(&pathology, limit, exclude.as_deref());
            if examples.is_empty() {
                println!("No reference examples for {}", pathology);
            }
            for example in examples {
                println!("{} ({} boxes)", example.image_path, example.annotations.len());
            }
        }
    }

    Ok(())
}

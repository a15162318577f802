use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use log::LevelFilter;

use comic_stitch::io::{default_output_dir, load_images, save_sections, OutputFormat};
use comic_stitch::{
    LogProgress, PipelineConfig, SlicePolicy, StitchPipeline, TemplateStore,
};

/// Template folder used when `--templates` is not given and it exists.
const DEFAULT_TEMPLATE_DIR: &str = "assets";

#[derive(Parser)]
#[command(
    name = "comic-stitch",
    about = "Trim watermark bands from comic panels and stitch them into tall strips",
    version,
    after_help = "Simple usage: comic-stitch <folder>  (writes <folder>[Stitched] next to it)"
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Folder containing the panel images
    input: PathBuf,

    /// Output directory (default: sibling "<name>[Stitched]")
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output width in pixels (0: widest input)
    #[arg(long, default_value_t = 0)]
    width: u32,

    /// Maximum section height in pixels (0: one single image)
    #[arg(long, default_value_t = 12_000)]
    height: u32,

    /// Output format: jpg, png, webp or bmp
    #[arg(long, default_value = "jpg")]
    format: OutputFormat,

    /// JPEG quality (1-100)
    #[arg(long, default_value_t = 90, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Folder of watermark template images (default: ./assets if present)
    #[arg(long)]
    templates: Option<PathBuf>,

    /// Stitch images as-is without removing watermark bands
    #[arg(long)]
    no_trim: bool,

    /// Cut at exact multiples of the height instead of searching for gutters
    #[arg(long)]
    fixed_cuts: bool,

    /// Enable verbose output
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        LevelFilter::Debug
    } else if cli.quiet {
        LevelFilter::Error
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn template_dir(cli: &Cli) -> Option<PathBuf> {
    cli.templates.clone().or_else(|| {
        let fallback = Path::new(DEFAULT_TEMPLATE_DIR);
        fallback.is_dir().then(|| fallback.to_path_buf())
    })
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if !cli.input.is_dir() {
        eprintln!("Error: Input folder does not exist: {}", cli.input.display());
        process::exit(1);
    }

    let mut config = PipelineConfig::default();
    config.stitch.target_width = cli.width;
    config.stitch.target_height = cli.height;
    if cli.fixed_cuts {
        config.stitch.slicing = SlicePolicy::Fixed;
    }

    let pipeline = if cli.no_trim {
        StitchPipeline::without_trimming(&config)
    } else {
        let store = TemplateStore::load(template_dir(&cli).as_deref(), &config.matching);
        StitchPipeline::new(&config, store)
    };
    let pipeline = match pipeline {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Fatal: {e}");
            process::exit(1);
        }
    };

    let images = match load_images(&cli.input) {
        Ok(images) => images,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    let total = images.len();

    let output = pipeline.run(images, &LogProgress);

    let output_dir = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_dir(&cli.input));
    let written = match save_sections(&output.sections, &output_dir, cli.format, cli.quality) {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("Error: Failed to write output: {e}");
            process::exit(1);
        }
    };

    if !cli.quiet {
        eprintln!(
            "[Summary] Images: {total}, Trimmed: {}, Sections: {} -> {}",
            output.trimmed,
            written.len(),
            output_dir.display()
        );
    }
}

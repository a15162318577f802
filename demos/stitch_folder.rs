//! Trim and stitch one folder of panels with progress printed to stdout.
//!
//! Usage:
//! ```sh
//! cargo run --example stitch_folder -- chapter-01/ out/
//! ```

use std::env;
use std::path::Path;
use std::process;

use comic_stitch::io::{load_images, save_sections, OutputFormat};
use comic_stitch::{PipelineConfig, StitchPipeline, TemplateStore};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <input_dir> <output_dir>", args[0]);
        process::exit(1);
    }

    let config = PipelineConfig::default();
    let store = TemplateStore::load(None, &config.matching);
    let pipeline = StitchPipeline::new(&config, store).expect("default config is valid");

    let images = match load_images(Path::new(&args[1])) {
        Ok(images) => images,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let progress = |percent: f32, message: &str| println!("{percent:>5.1}% {message}");
    let output = pipeline.run(images, &progress);

    match save_sections(&output.sections, Path::new(&args[2]), OutputFormat::Png, 90) {
        Ok(paths) => println!("Done: {} sections, {} images trimmed", paths.len(), output.trimmed),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, ValueEnum};
use log::{LevelFilter, debug, error, info, warn};

use dicom_mpr::{
    Diagnostics, DicomFileSource, Orientation, QualityMode, SliceDescriptor, VolumeBuilder,
    scan_directory,
};

/// Build a volume from a DICOM series and extract the three standard views.
#[derive(Parser, Debug)]
#[command(name = "dicom-mpr", version)]
struct Cli {
    /// Directory containing the .dcm series
    #[arg(value_name = "DIRECTORY")]
    directory: PathBuf,

    /// Normalized slice position along each axis
    #[arg(short, long, default_value_t = 0.5)]
    position: f32,

    /// Reconstruction quality tier
    #[arg(short, long, value_enum, default_value = "medium")]
    quality: QualityArg,

    /// Directory the PNG views are written to
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Print a diagnostics report after extraction
    #[arg(short, long)]
    diagnostics: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum QualityArg {
    Low,
    Medium,
    High,
}

impl From<QualityArg> for QualityMode {
    fn from(arg: QualityArg) -> Self {
        match arg {
            QualityArg::Low => QualityMode::Low,
            QualityArg::Medium => QualityMode::Medium,
            QualityArg::High => QualityMode::High,
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let paths = match scan_directory(&cli.directory) {
        Ok(paths) => paths,
        Err(error) => {
            error!("cannot scan {}: {error}", cli.directory.display());
            process::exit(1);
        }
    };
    info!(
        "found {} DICOM files in {}",
        paths.len(),
        cli.directory.display()
    );

    let builder = VolumeBuilder::new(DicomFileSource);
    let progress = |label: &str, percent: f32| debug!("{label} ({percent:.0}%)");
    let mut session = match builder.build_with_progress(&paths, progress).await {
        Ok(session) => session,
        Err(error) => {
            error!("reconstruction failed: {error}");
            process::exit(1);
        }
    };
    session.set_quality(cli.quality.into());

    for orientation in Orientation::ALL {
        let slice = session
            .extract_slice(orientation, cli.position)
            .unwrap_or_else(|| {
                warn!("reconstruction failed for the {orientation} view, substituting fallback");
                Diagnostics::fallback_slice(&session, orientation, cli.position)
            });
        save_view(&slice, &cli.output);
    }

    if cli.diagnostics {
        println!("{}", Diagnostics::report(&session));
    }
}

fn save_view(slice: &SliceDescriptor, output: &Path) {
    let path = output.join(format!("{}.png", slice.orientation));
    let Some(image) = slice.to_image() else {
        error!("could not render the {} view", slice.orientation);
        return;
    };
    match image.save(&path) {
        Ok(()) => info!(
            "wrote {} ({}x{}{})",
            path.display(),
            slice.width,
            slice.height,
            if slice.is_fallback { ", fallback" } else { "" }
        ),
        Err(error) => error!("cannot write {}: {error}", path.display()),
    }
}

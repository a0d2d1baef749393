use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use clap::Parser;

use scope_average::{AcquisitionConfiguration, Library, Oscilloscope, RunConfiguration};

/// Acquires a single block and writes its samples to a CSV file.
#[derive(Parser)]
#[command(name = "scope-block", long_about = None)]
struct Cli {
    /// Run configuration (TOML); only the acquisition section is used.
    /// Defaults to the settings in `config/block.toml`
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output file
    #[arg(long, default_value = "OscilloscopeBlock.csv")]
    output: PathBuf,

    /// Also dump the samples as little-endian f32 to this file
    #[arg(long)]
    raw: Option<PathBuf>,
}

fn create(path: &Path) -> scope_average::Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|error| scope_average::Error::FileOpen { path: path.to_owned(), error })
}

fn main() -> scope_average::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let acquisition = match &cli.config {
        Some(path) => RunConfiguration::load(path)?.acquisition,
        None => AcquisitionConfiguration::block(),
    };

    let mut library = Library::new()?;
    let mut scope = Oscilloscope::open(&mut library)?;
    scope.configure(&acquisition)?;
    println!("{}", scope.info()?);

    let mut block = scope.block()?;
    scope.acquire(&mut block)?;

    scope_average::write_block(create(&cli.output)?, &block)?;
    println!("Data written to: {}", cli.output.display());
    if let Some(raw) = &cli.raw {
        scope_average::write_raw_block(create(raw)?, &block)?;
        println!("Raw data written to: {}", raw.display());
    }
    Ok(())
}

use std::path::PathBuf;

use clap::Parser;

use scope_average::{AveragesRecord, Library, Oscilloscope, RunConfiguration};

/// Acquires a series of blocks and writes the average over every cycle to a CSV file.
#[derive(Parser)]
#[command(name = "scope-average", long_about = None)]
struct Cli {
    /// Run configuration (TOML); defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory, overriding the configuration
    #[arg(long)]
    output: Option<PathBuf>,

    /// Number of blocks to acquire, overriding the configuration
    #[arg(long)]
    blocks: Option<usize>,
}

fn main() -> scope_average::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RunConfiguration::load(path)?,
        None => RunConfiguration::default(),
    };
    if let Some(directory) = cli.output {
        config.output.directory = directory;
    }
    if let Some(block_count) = cli.blocks {
        config.averaging.block_count = block_count;
    }
    config.validate()?;

    let mut library = Library::new()?;
    let mut scope = Oscilloscope::open(&mut library)?;
    let settings = scope.configure(&config.acquisition)?;
    println!("{}", scope.info()?);
    config.averaging.validate(settings.record_length)?;
    let mut block = scope.block()?;
    let averages = scope_average::capture_averages(&mut scope, &mut block, &config.averaging)?;
    println!("Elapsed time is {:.3} seconds", averages.elapsed.as_secs_f64());

    let (path, file) = scope_average::create_output(&config.output)?;
    let writer = std::io::BufWriter::new(file);
    scope_average::write_averages(writer, &AveragesRecord::new(&settings, &averages))?;
    println!("Data written to: {}", path.display());
    Ok(())
}

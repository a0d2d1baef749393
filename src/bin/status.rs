use std::path::PathBuf;

use clap::Parser;

use scope_average::{
    AcquisitionConfiguration, ClockSource, Driver, Library, Oscilloscope, RunConfiguration,
};

/// Configures the first oscilloscope and prints what it reports.
#[derive(Parser)]
#[command(name = "scope-status", long_about = None)]
struct Cli {
    /// Run configuration (TOML); only the acquisition section is used.
    /// Defaults to the block capture settings with the external clock
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> scope_average::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let acquisition = match &cli.config {
        Some(path) => RunConfiguration::load(path)?.acquisition,
        None => AcquisitionConfiguration {
            clock_source: ClockSource::External,
            ..AcquisitionConfiguration::block()
        },
    };

    let mut library = Library::new()?;
    println!("Library version: {}", library.version());
    let mut scope = Oscilloscope::open(&mut library)?;
    let settings = scope.configure(&acquisition)?;
    println!("{}", scope.info()?);
    println!("Applied settings:");
    println!("  Sample frequency: {} Sa/s", settings.sample_frequency);
    println!("  Record length:    {} Sa", settings.record_length);
    println!("  Resolution:       {} bits", settings.resolution);
    for &(channel, range) in &settings.channels {
        println!("  Ch{} range:        {} V", channel + 1, range);
    }
    Ok(())
}

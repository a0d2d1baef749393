mod sys;
mod config;
mod params;
mod device;
mod trigger;
mod average;
mod capture;
mod record;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug)]
pub enum Error {
    NotFound,
    Removed,
    Timeout(Duration),
    ShapeMismatch { expected: usize, actual: usize },
    TooManyBlocks { expected: usize },
    Incomplete { expected: usize, received: usize },
    InvalidConfiguration(String),
    FileOpen { path: PathBuf, error: io::Error },
    Library { status: i32, message: String },
    Io(io::Error),
    Csv(csv::Error),
    Config(toml::de::Error),
    Other(Box<dyn std::error::Error + Sync + Send + 'static>),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::NotFound =>
                write!(f, "no oscilloscope available with block measurement support"),
            Self::Removed =>
                write!(f, "device gone"),
            Self::Timeout(duration) =>
                write!(f, "no data after {:.3} s", duration.as_secs_f64()),
            Self::ShapeMismatch { expected, actual } =>
                write!(f, "block has {} samples, expected {}", actual, expected),
            Self::TooManyBlocks { expected } =>
                write!(f, "more than {} blocks supplied", expected),
            Self::Incomplete { expected, received } =>
                write!(f, "only {} of {} blocks accumulated", received, expected),
            Self::InvalidConfiguration(reason) =>
                write!(f, "invalid configuration: {}", reason),
            Self::FileOpen { path, error } =>
                write!(f, "couldn't open file {}: {}", path.display(), error),
            Self::Library { status, message } =>
                write!(f, "vendor library status {}: {}", status, message),
            Self::Io(io_error) =>
                write!(f, "I/O error: {}", io_error),
            Self::Csv(csv_error) =>
                write!(f, "CSV error: {}", csv_error),
            Self::Config(toml_error) =>
                write!(f, "configuration file: {}", toml_error),
            Self::Other(error) =>
                write!(f, "{}", error),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            &Self::FileOpen { ref error, .. } => Some(error),
            &Self::Io(ref io_error) => Some(io_error),
            &Self::Csv(ref csv_error) => Some(csv_error),
            &Self::Config(ref toml_error) => Some(toml_error),
            _ => None
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        match error.downcast::<Self>() {
            Ok(error) => error,
            Err(error) => Error::Io(error),
        }
    }
}

impl From<csv::Error> for Error {
    fn from(error: csv::Error) -> Self {
        Error::Csv(error)
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Config(error)
    }
}

pub type Result<T> =
    core::result::Result<T, Error>;

pub use config::{
    Coupling,
    ClockSource,
    TriggerKind,
    TriggerSource,
    PreTrigger,
    ChannelConfiguration,
    TriggerConfiguration,
    AcquisitionConfiguration,
    AveragingConfiguration,
    Naming,
    OutputConfiguration,
    RunConfiguration,
};

pub use params::{
    MeasureModes,
    ScopeStatus,
    Settings,
};

pub use sys::{Driver, Handle};

pub use sys::sim::{Simulator, SimulatedDevice, SimulatedSignal};

#[cfg(feature = "hardware")]
pub use sys::libtiepie::LibTiePie;

/// The library session used by the programs: the vendor library with the `hardware` feature,
/// the simulator otherwise.
pub type Library = crate::sys::imp::LibraryImpl;

pub use device::{DeviceInfo, Oscilloscope};

pub use trigger::{
    EdgeFilter,
    Edge,
    Trigger,
};

pub use average::Averager;

pub use capture::{
    Block,
    BlockSource,
    ChannelAverage,
    Averages,
    capture_averages,
};

pub use record::{
    AveragesRecord,
    create_output,
    write_averages,
    write_block,
    write_raw_block,
};

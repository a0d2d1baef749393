//! High-level configuration of an averaging run in terms of physical qualities.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coupling {
    #[default]
    DC,
    AC,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockSource {
    #[default]
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    #[default]
    Rising,
    Falling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    /// Zero-based analog input.
    Channel(u16),
    /// Zero-based external trigger input (`EXT 1` is `0`).
    External(u16),
}

/// Position of the trigger point within the record.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreTrigger {
    /// Fraction of the record before the trigger point.
    Ratio(f64),
    /// Time before the trigger point, in seconds.
    Time(f64),
}

impl Default for PreTrigger {
    fn default() -> Self {
        PreTrigger::Ratio(0.0)
    }
}

impl PreTrigger {
    pub fn ratio(self, sample_frequency: f64, record_length: u64) -> f64 {
        match self {
            PreTrigger::Ratio(ratio) => ratio,
            PreTrigger::Time(time) => time * sample_frequency / record_length as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfiguration {
    pub enabled: bool,
    /// Full scale range in volts.
    pub range: f64,
    pub coupling: Coupling,
}

impl Default for ChannelConfiguration {
    fn default() -> Self {
        Self {
            enabled: true,
            range: 4.0,
            coupling: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerConfiguration {
    pub source: TriggerSource,
    #[serde(default)]
    pub kind: TriggerKind,
    /// Absolute level in volts; only meaningful for channel triggers.
    #[serde(default)]
    pub level: f64,
    /// Hysteresis as a fraction of the channel range; only meaningful for channel triggers.
    #[serde(default)]
    pub hysteresis: f64,
}

impl Default for TriggerConfiguration {
    fn default() -> Self {
        Self {
            source: TriggerSource::External(0),
            kind: TriggerKind::Falling,
            level: 0.0,
            hysteresis: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AcquisitionConfiguration {
    /// Sample frequency in Hz.
    pub sample_frequency: f64,
    /// Samples per channel per block.
    pub record_length: u64,
    pub pre_trigger: PreTrigger,
    /// ADC resolution in bits.
    pub resolution: u8,
    /// Seconds the device waits for a trigger before triggering by itself.
    pub trigger_timeout: f64,
    pub clock_source: ClockSource,
    /// Indexed by device channel; channels past the end are disabled.
    pub channels: Vec<ChannelConfiguration>,
    pub trigger: TriggerConfiguration,
    /// Milliseconds between data-ready polls.
    pub poll_interval: u64,
    /// Seconds to wait for a block before giving up, if any.
    pub acquisition_timeout: Option<f64>,
}

impl Default for AcquisitionConfiguration {
    fn default() -> Self {
        Self {
            sample_frequency: 500e6,
            record_length: 50_000_000,
            pre_trigger: PreTrigger::Time(400e-9),
            resolution: 12,
            trigger_timeout: 100e-3,
            clock_source: ClockSource::External,
            channels: vec![
                ChannelConfiguration { enabled: true, range: 0.4, coupling: Coupling::AC },
                ChannelConfiguration { enabled: false, ..Default::default() },
            ],
            trigger: Default::default(),
            poll_interval: 10,
            acquisition_timeout: None,
        }
    }
}

impl AcquisitionConfiguration {
    /// Single short capture: Ch1 at 4 V DC, rising edge on Ch1 at 1.5 V, trigger point centered.
    pub fn block() -> Self {
        Self {
            sample_frequency: 500e6,
            record_length: 10_000,
            pre_trigger: PreTrigger::Ratio(0.5),
            clock_source: ClockSource::Internal,
            channels: vec![
                ChannelConfiguration { enabled: true, range: 4.0, coupling: Coupling::DC },
                ChannelConfiguration { enabled: false, ..Default::default() },
            ],
            trigger: TriggerConfiguration {
                source: TriggerSource::Channel(0),
                kind: TriggerKind::Rising,
                level: 1.5,
                hysteresis: 0.05,
            },
            ..Default::default()
        }
    }

    pub fn enabled_channels(&self) -> impl Iterator<Item = (u16, &ChannelConfiguration)> + '_ {
        self.channels.iter()
            .enumerate()
            .filter(|(_, channel)| channel.enabled)
            .map(|(index, channel)| (index as u16, channel))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }

    pub fn acquisition_timeout(&self) -> Option<Duration> {
        self.acquisition_timeout.map(Duration::from_secs_f64)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.sample_frequency > 0.0) {
            return Err(invalid(format!("sample frequency {} Hz", self.sample_frequency)))
        }
        if self.record_length == 0 {
            return Err(invalid("record length of zero samples"))
        }
        let ratio = self.pre_trigger.ratio(self.sample_frequency, self.record_length);
        if !(0.0..=1.0).contains(&ratio) {
            return Err(invalid(format!("pre-sample ratio {} outside of 0..1", ratio)))
        }
        if self.resolution == 0 {
            return Err(invalid("resolution of zero bits"))
        }
        if self.trigger_timeout < 0.0 {
            return Err(invalid(format!("trigger timeout {} s", self.trigger_timeout)))
        }
        if self.enabled_channels().next().is_none() {
            return Err(invalid("no channel enabled"))
        }
        for (index, channel) in self.enabled_channels() {
            if !(channel.range > 0.0) {
                return Err(invalid(format!("range {} V on Ch{}", channel.range, index + 1)))
            }
        }
        match self.trigger.source {
            TriggerSource::Channel(index) => {
                if index as usize >= self.channels.len() {
                    return Err(invalid(format!("trigger on unconfigured Ch{}", index + 1)))
                }
                if !(0.0..=1.0).contains(&self.trigger.hysteresis) {
                    return Err(invalid(format!("trigger hysteresis {}", self.trigger.hysteresis)))
                }
            }
            TriggerSource::External(_) => (),
        }
        if let Some(timeout) = self.acquisition_timeout {
            if !(timeout > 0.0) {
                return Err(invalid(format!("acquisition timeout {} s", timeout)))
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AveragingConfiguration {
    /// Number of blocks averaged together.
    pub block_count: usize,
    /// Samples per cycle; should divide the record length.
    pub cycle_length: usize,
    /// Leave out the first cycle of every block.
    pub skip_first_cycle: bool,
}

impl Default for AveragingConfiguration {
    fn default() -> Self {
        Self {
            block_count: 200,
            cycle_length: 10_000,
            skip_first_cycle: false,
        }
    }
}

impl AveragingConfiguration {
    pub fn validate(&self, record_length: u64) -> Result<()> {
        if self.block_count == 0 {
            return Err(invalid("block count of zero"))
        }
        if self.cycle_length == 0 || self.cycle_length as u64 > record_length {
            return Err(invalid(format!("cycle length {} for record length {}",
                self.cycle_length, record_length)))
        }
        let cycles = record_length / self.cycle_length as u64;
        if self.skip_first_cycle && cycles < 2 {
            return Err(invalid("skipping the first cycle leaves no cycle to average"))
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Naming {
    /// `<stem>_<n>.csv` with the first `n` not already taken.
    #[default]
    Numbered,
    /// `<stem>.csv`, overwritten on every run.
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfiguration {
    pub directory: PathBuf,
    pub naming: Naming,
    pub stem: String,
}

impl Default for OutputConfiguration {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data"),
            naming: Naming::Numbered,
            stem: "record".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfiguration {
    pub acquisition: AcquisitionConfiguration,
    pub averaging: AveragingConfiguration,
    pub output: OutputConfiguration,
}

impl RunConfiguration {
    pub fn from_toml(text: &str) -> Result<RunConfiguration> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<RunConfiguration> {
        log::debug!("loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.acquisition.validate()?;
        self.averaging.validate(self.acquisition.record_length)?;
        if self.output.stem.is_empty() {
            return Err(invalid("empty output file stem"))
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::InvalidConfiguration(reason.into())
}

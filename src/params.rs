//! Vendor library codes and the parameters a device actually applied.

#![allow(dead_code)]

use bitflags::bitflags;

use crate::config::{ClockSource, Coupling, TriggerKind};

pub(crate) const IDKIND_INDEX: u32 = 0x0000_0002;

pub(crate) const DEVICETYPE_OSCILLOSCOPE: u32 = 0x0000_0001;

pub(crate) const TLM_ABSOLUTE: u32 = 0x0000_0002;

bitflags! {
    /// Measure modes supported by (or selected on) an oscilloscope.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MeasureModes: u32 {
        const Stream = 1<<0;
        const Block  = 1<<1;
    }
}

bitflags! {
    /// Result of polling an oscilloscope for the end of a measurement.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScopeStatus: u32 {
        const DataReady = 1<<0;
        const Removed   = 1<<1;
    }
}

impl Coupling {
    pub(crate) fn libtiepie_code(self) -> u64 {
        match self {
            Self::DC => 1<<0, // CK_DCV
            Self::AC => 1<<1, // CK_ACV
        }
    }
}

impl TriggerKind {
    pub(crate) fn libtiepie_code(self) -> u64 {
        match self {
            Self::Rising  => 1<<0, // TK_RISINGEDGE
            Self::Falling => 1<<1, // TK_FALLINGEDGE
        }
    }
}

impl ClockSource {
    pub(crate) fn libtiepie_code(self) -> u32 {
        match self {
            Self::External => 1<<0, // CS_EXTERNAL
            Self::Internal => 1<<1, // CS_INTERNAL
        }
    }
}

/// Acquisition parameters as applied by the device, which may round what was requested.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub sample_frequency: f64,
    pub record_length: u64,
    pub pre_sample_ratio: f64,
    pub resolution: u8,
    pub trigger_timeout: f64,
    /// Enabled channels with their applied range in volts, in channel order.
    pub channels: Vec<(u16, f64)>,
}

impl Settings {
    /// Record duration in seconds.
    pub fn duration(&self) -> f64 {
        self.record_length as f64 / self.sample_frequency
    }

    /// Volts per LSB for a channel of the given range.
    pub fn amplitude_resolution(&self, range: f64) -> f64 {
        range / 2f64.powi(self.resolution as i32 - 1)
    }

    pub fn channel_indices(&self) -> Vec<u16> {
        self.channels.iter().map(|&(index, _)| index).collect()
    }
}

use crate::Result;
use crate::config::{ClockSource, Coupling, TriggerKind, TriggerSource};
use crate::params::{MeasureModes, ScopeStatus};

/// Handle of a device opened through a library session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub u32);

/// An initialized vendor library session.
///
/// The session is owned: it is initialized when the implementation is constructed and torn
/// down when it is dropped. Setters return the value the device actually applied.
pub trait Driver {
    fn version(&self) -> String;

    fn set_network_auto_detect(&mut self, enabled: bool) -> Result<()>;
    fn update_device_list(&mut self) -> Result<()>;
    fn device_count(&self) -> Result<u32>;
    fn can_open_oscilloscope(&self, index: u32) -> Result<bool>;
    fn open_oscilloscope(&mut self, index: u32) -> Result<Handle>;
    fn close(&mut self, handle: Handle) -> Result<()>;

    fn name(&self, handle: Handle) -> Result<String>;
    fn serial_number(&self, handle: Handle) -> Result<u32>;
    fn measure_modes(&self, handle: Handle) -> Result<MeasureModes>;
    fn channel_count(&self, handle: Handle) -> Result<u16>;
    fn clock_source_frequencies(&self, handle: Handle) -> Result<Vec<f64>>;

    fn set_measure_mode(&mut self, handle: Handle, mode: MeasureModes) -> Result<()>;
    fn set_sample_frequency(&mut self, handle: Handle, frequency: f64) -> Result<f64>;
    fn set_record_length(&mut self, handle: Handle, length: u64) -> Result<u64>;
    fn set_pre_sample_ratio(&mut self, handle: Handle, ratio: f64) -> Result<f64>;
    fn set_resolution(&mut self, handle: Handle, bits: u8) -> Result<u8>;
    fn set_trigger_timeout(&mut self, handle: Handle, seconds: f64) -> Result<f64>;
    fn set_clock_source(&mut self, handle: Handle, source: ClockSource) -> Result<()>;

    fn set_channel_enabled(&mut self, handle: Handle, channel: u16, enabled: bool) -> Result<()>;
    fn set_channel_range(&mut self, handle: Handle, channel: u16, range: f64) -> Result<f64>;
    fn set_channel_coupling(&mut self, handle: Handle, channel: u16, coupling: Coupling)
        -> Result<()>;

    fn set_trigger_enabled(&mut self, handle: Handle, source: TriggerSource, enabled: bool)
        -> Result<()>;
    fn set_trigger_kind(&mut self, handle: Handle, source: TriggerSource, kind: TriggerKind)
        -> Result<()>;
    /// Sets an absolute trigger level in volts.
    fn set_trigger_level(&mut self, handle: Handle, channel: u16, level: f64) -> Result<f64>;
    /// Sets the hysteresis as a fraction of the channel range.
    fn set_trigger_hysteresis(&mut self, handle: Handle, channel: u16, hysteresis: f64)
        -> Result<f64>;

    fn start(&mut self, handle: Handle) -> Result<()>;
    fn status(&self, handle: Handle) -> Result<ScopeStatus>;
    /// Copies samples starting at `start` into the buffers of the enabled channels (indexed by
    /// channel, `None` for channels not read) and returns the number of samples per channel.
    fn get_data(&mut self, handle: Handle, buffers: &mut [Option<&mut [f32]>], start: u64)
        -> Result<u64>;
}

pub mod sim;

#[cfg(feature = "hardware")]
pub mod libtiepie;

pub mod imp {
    #[cfg(feature = "hardware")]
    pub type LibraryImpl = super::libtiepie::LibTiePie;

    #[cfg(not(feature = "hardware"))]
    pub type LibraryImpl = super::sim::Simulator;
}

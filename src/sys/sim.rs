//! Simulated oscilloscope, used when the vendor library is not linked in.
//!
//! Every channel carries a repeating burst: a damped sine starting at each period boundary,
//! with uniform noise on top. Captures are aligned with the software edge trigger the same
//! way the hardware trigger would align them, and samples are clipped to the channel range
//! and quantized to the configured resolution.

use std::cell::Cell;
use std::f64::consts::PI;

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use crate::{Error, Result};
use crate::config::{ClockSource, Coupling, TriggerKind, TriggerSource};
use crate::params::{MeasureModes, ScopeStatus};
use crate::trigger::Trigger;
use super::Handle;

const RANGES: [f64; 9] = [0.2, 0.4, 0.8, 2.0, 4.0, 8.0, 20.0, 40.0, 80.0];
const SCAN_CHUNK: usize = 4096;
const EXTERNAL_INPUTS: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedSignal {
    /// Burst repetition period in seconds.
    pub period: f64,
    /// Oscillation frequency within a burst in Hz.
    pub frequency: f64,
    /// Peak amplitude in volts.
    pub amplitude: f64,
    /// Decay time constant in seconds.
    pub decay: f64,
    /// DC offset in volts, removed by AC coupling.
    pub offset: f64,
    /// Peak uniform noise in volts.
    pub noise: f64,
}

impl Default for SimulatedSignal {
    fn default() -> Self {
        Self {
            period: 20e-6,
            frequency: 5e6,
            amplitude: 2.0,
            decay: 4e-6,
            offset: 0.0,
            noise: 0.05,
        }
    }
}

impl SimulatedSignal {
    pub fn flat(level: f64) -> Self {
        Self { amplitude: 0.0, offset: level, noise: 0.0, ..Default::default() }
    }

    /// Noiseless voltage at sample `n`.
    fn voltage(&self, sample_frequency: f64, n: i64) -> f64 {
        let time = n as f64 / sample_frequency;
        let since_burst = time.rem_euclid(self.period);
        let envelope = if self.decay > 0.0 { (-since_burst / self.decay).exp() } else { 1.0 };
        self.offset + self.amplitude * envelope * (2.0 * PI * self.frequency * since_burst).sin()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedDevice {
    pub name: String,
    pub serial_number: u32,
    pub channel_count: u16,
    pub measure_modes: MeasureModes,
    /// Highest sample frequency with a single channel enabled; halved for more channels.
    pub max_sample_frequency: f64,
    pub max_record_length: u64,
    /// Signal per channel; channels past the end see a flat zero volt input.
    pub signals: Vec<SimulatedSignal>,
    pub clock_source_frequencies: Vec<f64>,
    pub seed: u64,
    /// The device disappears when this many blocks have been acquired.
    pub removed_after: Option<usize>,
    /// Measurements are started but never complete.
    pub stalled: bool,
    /// Status polls answered before the data of a measurement becomes ready.
    pub polls_until_ready: u32,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self {
            name: "Handyscope HS6 DIFF (simulated)".to_owned(),
            serial_number: 27000,
            channel_count: 2,
            measure_modes: MeasureModes::Stream | MeasureModes::Block,
            max_sample_frequency: 1e9,
            max_record_length: 64 << 20,
            signals: vec![SimulatedSignal::default(), SimulatedSignal::default()],
            clock_source_frequencies: vec![10e6],
            seed: 0x5eed,
            removed_after: None,
            stalled: false,
            polls_until_ready: 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Channel {
    enabled: bool,
    range: f64,
    coupling: Coupling,
    trigger_enabled: bool,
    trigger_kind: TriggerKind,
    trigger_level: f64,
    trigger_hysteresis: f64,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            enabled: true,
            range: 8.0,
            coupling: Coupling::DC,
            trigger_enabled: false,
            trigger_kind: TriggerKind::Rising,
            trigger_level: 0.0,
            trigger_hysteresis: 0.05,
        }
    }
}

#[derive(Debug)]
struct Scope {
    device: SimulatedDevice,
    measure_mode: MeasureModes,
    sample_frequency: f64,
    record_length: u64,
    pre_sample_ratio: f64,
    resolution: u8,
    trigger_timeout: f64,
    clock_source: ClockSource,
    channels: Vec<Channel>,
    external: Vec<Option<TriggerKind>>,
    rng: StdRng,
    position: i64,
    blocks: usize,
    removed: bool,
    running: bool,
    pending: Option<Vec<Vec<f32>>>,
    polls: Cell<u32>,
}

impl Scope {
    fn new(device: SimulatedDevice) -> Scope {
        let rng = StdRng::seed_from_u64(device.seed);
        let channels = vec![Channel::default(); device.channel_count as usize];
        Scope {
            measure_mode: MeasureModes::Stream,
            sample_frequency: 1e6,
            record_length: 5000,
            pre_sample_ratio: 0.0,
            resolution: 8,
            trigger_timeout: 0.1,
            clock_source: ClockSource::Internal,
            channels,
            external: vec![None; EXTERNAL_INPUTS as usize],
            rng,
            position: 0,
            blocks: 0,
            removed: false,
            running: false,
            pending: None,
            polls: Cell::new(0),
            device,
        }
    }

    fn channel(&mut self, index: u16) -> Result<&mut Channel> {
        self.channels.get_mut(index as usize).ok_or_else(|| Error::Library {
            status: -1,
            message: format!("invalid channel {}", index),
        })
    }

    fn signal(&self, index: usize) -> SimulatedSignal {
        self.device.signals.get(index).copied().unwrap_or(SimulatedSignal::flat(0.0))
    }

    fn max_sample_frequency(&self) -> f64 {
        match self.channels.iter().filter(|channel| channel.enabled).count() {
            0 | 1 => self.device.max_sample_frequency,
            _ => self.device.max_sample_frequency / 2.0,
        }
    }

    /// Digitized sample `n` of a channel.
    fn sample(&mut self, index: usize, n: i64) -> f32 {
        let signal = self.signal(index);
        let channel = self.channels[index];
        let mut voltage = signal.voltage(self.sample_frequency, n);
        if channel.coupling == Coupling::AC {
            voltage -= signal.offset;
        }
        if signal.noise > 0.0 {
            voltage += self.rng.gen_range(-signal.noise..=signal.noise);
        }
        let lsb = channel.range / 2f64.powi(self.resolution as i32 - 1);
        let voltage = voltage.clamp(-channel.range, channel.range - lsb);
        ((voltage / lsb).round() * lsb) as f32
    }

    /// Returns the sample index of the next trigger at or after the current position.
    fn find_trigger(&mut self) -> i64 {
        let window = if self.trigger_timeout > 0.0 {
            (self.trigger_timeout * self.sample_frequency).ceil() as i64
        } else {
            self.record_length as i64 * 64
        };
        let source = self.channels.iter()
            .position(|channel| channel.enabled && channel.trigger_enabled)
            .map(|index| TriggerSource::Channel(index as u16))
            .or_else(|| self.external.iter()
                .position(|input| input.is_some())
                .map(|index| TriggerSource::External(index as u16)));
        match source {
            None => self.position,
            Some(TriggerSource::External(_)) => {
                // the external trigger is taken to be synchronous with the burst period
                let period = self.signal(0).period * self.sample_frequency;
                let bursts = (self.position as f64 / period).ceil();
                (bursts * period).round() as i64
            }
            Some(TriggerSource::Channel(index)) => {
                let index = index as usize;
                let channel = self.channels[index];
                let mut trigger = Trigger::new(
                    channel.trigger_level as f32,
                    (channel.trigger_hysteresis * channel.range) as f32);
                let mut chunk = vec![0f32; SCAN_CHUNK];
                let mut position = self.position;
                while position - self.position < window {
                    for (offset, sample) in chunk.iter_mut().enumerate() {
                        *sample = self.sample(index, position + offset as i64);
                    }
                    let (consumed, edge) = trigger.find(&chunk, channel.trigger_kind.into());
                    position += consumed as i64;
                    if edge.is_some() {
                        return position
                    }
                }
                log::debug!("simulated trigger timed out after {} samples", window);
                self.position + window
            }
        }
    }

    fn capture(&mut self) -> Vec<Vec<f32>> {
        let length = self.record_length as usize;
        let pre_samples = (self.pre_sample_ratio * length as f64).round() as i64;
        let start = self.find_trigger() - pre_samples;
        log::trace!("simulated capture of {} samples from {}", length, start);
        let mut data = Vec::with_capacity(self.channels.len());
        for index in 0..self.channels.len() {
            if self.channels[index].enabled {
                data.push((0..length as i64).map(|n| self.sample(index, start + n)).collect());
            } else {
                data.push(Vec::new());
            }
        }
        self.position = start + length as i64;
        data
    }
}

/// A library session with simulated devices attached.
#[derive(Debug)]
pub struct Simulator {
    devices: Vec<SimulatedDevice>,
    listed: u32,
    auto_detect: bool,
    scopes: Vec<Option<Scope>>,
}

impl Simulator {
    /// Creates a session with a single default device attached.
    pub fn new() -> Result<Simulator> {
        Ok(Self::with_devices(vec![SimulatedDevice::default()]))
    }

    pub fn with_devices(devices: Vec<SimulatedDevice>) -> Simulator {
        log::debug!("simulator initialized with {} device(s)", devices.len());
        Simulator { devices, listed: 0, auto_detect: false, scopes: Vec::new() }
    }

    fn scope(&self, handle: Handle) -> Result<&Scope> {
        handle.0.checked_sub(1)
            .and_then(|index| self.scopes.get(index as usize))
            .and_then(|scope| scope.as_ref())
            .ok_or_else(|| invalid_handle(handle))
    }

    fn scope_mut(&mut self, handle: Handle) -> Result<&mut Scope> {
        handle.0.checked_sub(1)
            .and_then(|index| self.scopes.get_mut(index as usize))
            .and_then(|scope| scope.as_mut())
            .ok_or_else(|| invalid_handle(handle))
    }
}

fn invalid_handle(handle: Handle) -> Error {
    Error::Library { status: -1, message: format!("invalid handle {}", handle.0) }
}

impl super::Driver for Simulator {
    fn version(&self) -> String {
        format!("{} (simulator)", env!("CARGO_PKG_VERSION"))
    }

    fn set_network_auto_detect(&mut self, enabled: bool) -> Result<()> {
        self.auto_detect = enabled;
        Ok(())
    }

    fn update_device_list(&mut self) -> Result<()> {
        self.listed = self.devices.len() as u32;
        log::debug!("simulator lists {} device(s), network auto-detect {}",
            self.listed, self.auto_detect);
        Ok(())
    }

    fn device_count(&self) -> Result<u32> {
        Ok(self.listed)
    }

    fn can_open_oscilloscope(&self, index: u32) -> Result<bool> {
        Ok(index < self.listed && self.devices[index as usize].channel_count > 0)
    }

    fn open_oscilloscope(&mut self, index: u32) -> Result<Handle> {
        if !self.can_open_oscilloscope(index)? {
            return Err(Error::NotFound)
        }
        let scope = Scope::new(self.devices[index as usize].clone());
        self.scopes.push(Some(scope));
        Ok(Handle(self.scopes.len() as u32))
    }

    fn close(&mut self, handle: Handle) -> Result<()> {
        self.scope(handle)?;
        self.scopes[handle.0 as usize - 1] = None;
        Ok(())
    }

    fn name(&self, handle: Handle) -> Result<String> {
        Ok(self.scope(handle)?.device.name.clone())
    }

    fn serial_number(&self, handle: Handle) -> Result<u32> {
        Ok(self.scope(handle)?.device.serial_number)
    }

    fn measure_modes(&self, handle: Handle) -> Result<MeasureModes> {
        Ok(self.scope(handle)?.device.measure_modes)
    }

    fn channel_count(&self, handle: Handle) -> Result<u16> {
        Ok(self.scope(handle)?.device.channel_count)
    }

    fn clock_source_frequencies(&self, handle: Handle) -> Result<Vec<f64>> {
        let scope = self.scope(handle)?;
        match scope.clock_source {
            ClockSource::External => Ok(scope.device.clock_source_frequencies.clone()),
            ClockSource::Internal => Ok(Vec::new()),
        }
    }

    fn set_measure_mode(&mut self, handle: Handle, mode: MeasureModes) -> Result<()> {
        let scope = self.scope_mut(handle)?;
        if !scope.device.measure_modes.contains(mode) {
            return Err(Error::Library { status: -1, message: format!("unsupported {:?}", mode) })
        }
        scope.measure_mode = mode;
        Ok(())
    }

    fn set_sample_frequency(&mut self, handle: Handle, frequency: f64) -> Result<f64> {
        let scope = self.scope_mut(handle)?;
        scope.sample_frequency = frequency.clamp(1.0, scope.max_sample_frequency());
        Ok(scope.sample_frequency)
    }

    fn set_record_length(&mut self, handle: Handle, length: u64) -> Result<u64> {
        let scope = self.scope_mut(handle)?;
        scope.record_length = length.clamp(1, scope.device.max_record_length);
        Ok(scope.record_length)
    }

    fn set_pre_sample_ratio(&mut self, handle: Handle, ratio: f64) -> Result<f64> {
        let scope = self.scope_mut(handle)?;
        scope.pre_sample_ratio = ratio.clamp(0.0, 1.0);
        Ok(scope.pre_sample_ratio)
    }

    fn set_resolution(&mut self, handle: Handle, bits: u8) -> Result<u8> {
        let scope = self.scope_mut(handle)?;
        scope.resolution = bits.clamp(8, 16);
        Ok(scope.resolution)
    }

    fn set_trigger_timeout(&mut self, handle: Handle, seconds: f64) -> Result<f64> {
        let scope = self.scope_mut(handle)?;
        scope.trigger_timeout = seconds;
        Ok(scope.trigger_timeout)
    }

    fn set_clock_source(&mut self, handle: Handle, source: ClockSource) -> Result<()> {
        self.scope_mut(handle)?.clock_source = source;
        Ok(())
    }

    fn set_channel_enabled(&mut self, handle: Handle, channel: u16, enabled: bool) -> Result<()> {
        let scope = self.scope_mut(handle)?;
        scope.channel(channel)?.enabled = enabled;
        scope.sample_frequency = scope.sample_frequency.min(scope.max_sample_frequency());
        Ok(())
    }

    fn set_channel_range(&mut self, handle: Handle, channel: u16, range: f64) -> Result<f64> {
        let range = RANGES.iter()
            .copied()
            .find(|&available| available >= range)
            .unwrap_or(RANGES[RANGES.len() - 1]);
        self.scope_mut(handle)?.channel(channel)?.range = range;
        Ok(range)
    }

    fn set_channel_coupling(&mut self, handle: Handle, channel: u16, coupling: Coupling)
            -> Result<()> {
        self.scope_mut(handle)?.channel(channel)?.coupling = coupling;
        Ok(())
    }

    fn set_trigger_enabled(&mut self, handle: Handle, source: TriggerSource, enabled: bool)
            -> Result<()> {
        let scope = self.scope_mut(handle)?;
        match source {
            TriggerSource::Channel(channel) =>
                scope.channel(channel)?.trigger_enabled = enabled,
            TriggerSource::External(input) => {
                let input = scope.external.get_mut(input as usize).ok_or_else(|| {
                    Error::Library { status: -1, message: format!("invalid input {}", input) }
                })?;
                *input = if enabled { Some(input.unwrap_or_default()) } else { None };
            }
        }
        Ok(())
    }

    fn set_trigger_kind(&mut self, handle: Handle, source: TriggerSource, kind: TriggerKind)
            -> Result<()> {
        let scope = self.scope_mut(handle)?;
        match source {
            TriggerSource::Channel(channel) =>
                scope.channel(channel)?.trigger_kind = kind,
            TriggerSource::External(input) => {
                if let Some(Some(input)) = scope.external.get_mut(input as usize) {
                    *input = kind;
                }
            }
        }
        Ok(())
    }

    fn set_trigger_level(&mut self, handle: Handle, channel: u16, level: f64) -> Result<f64> {
        self.scope_mut(handle)?.channel(channel)?.trigger_level = level;
        Ok(level)
    }

    fn set_trigger_hysteresis(&mut self, handle: Handle, channel: u16, hysteresis: f64)
            -> Result<f64> {
        let hysteresis = hysteresis.clamp(0.0, 1.0);
        self.scope_mut(handle)?.channel(channel)?.trigger_hysteresis = hysteresis;
        Ok(hysteresis)
    }

    fn start(&mut self, handle: Handle) -> Result<()> {
        let scope = self.scope_mut(handle)?;
        if scope.removed {
            return Err(Error::Removed)
        }
        if scope.device.removed_after == Some(scope.blocks) {
            log::debug!("simulated device removed after {} blocks", scope.blocks);
            scope.removed = true;
            return Ok(())
        }
        log::trace!("simulated start in {:?} mode", scope.measure_mode);
        scope.running = true;
        scope.polls.set(0);
        if !scope.device.stalled {
            scope.pending = Some(scope.capture());
            scope.blocks += 1;
        }
        Ok(())
    }

    fn status(&self, handle: Handle) -> Result<ScopeStatus> {
        let scope = self.scope(handle)?;
        if scope.removed {
            return Ok(ScopeStatus::Removed)
        }
        if !scope.running || scope.pending.is_none() {
            return Ok(ScopeStatus::empty())
        }
        let polls = scope.polls.get() + 1;
        scope.polls.set(polls);
        if polls > scope.device.polls_until_ready {
            Ok(ScopeStatus::DataReady)
        } else {
            Ok(ScopeStatus::empty())
        }
    }

    fn get_data(&mut self, handle: Handle, buffers: &mut [Option<&mut [f32]>], start: u64)
            -> Result<u64> {
        let scope = self.scope_mut(handle)?;
        let pending = scope.pending.take().ok_or_else(|| Error::Library {
            status: -1,
            message: "no data available".to_owned(),
        })?;
        scope.running = false;
        let start = start as usize;
        let mut copied = 0;
        for (index, buffer) in buffers.iter_mut().enumerate() {
            let Some(buffer) = buffer else { continue };
            let samples = match pending.get(index) {
                Some(samples) if !samples.is_empty() => &samples[start.min(samples.len())..],
                _ => return Err(Error::Library {
                    status: -1,
                    message: format!("channel {} not enabled", index),
                }),
            };
            let count = buffer.len().min(samples.len());
            buffer[..count].copy_from_slice(&samples[..count]);
            copied = count;
        }
        Ok(copied as u64)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sys::Driver;

    fn open(device: SimulatedDevice) -> (Simulator, Handle) {
        let mut sim = Simulator::with_devices(vec![device]);
        sim.update_device_list().unwrap();
        let handle = sim.open_oscilloscope(0).unwrap();
        (sim, handle)
    }

    fn acquire(sim: &mut Simulator, handle: Handle, length: usize) -> Vec<f32> {
        sim.start(handle).unwrap();
        while !sim.status(handle).unwrap().contains(ScopeStatus::DataReady) {}
        let mut data = vec![0f32; length];
        let count = sim.get_data(handle, &mut [Some(&mut data[..]), None], 0).unwrap();
        assert_eq!(count as usize, length);
        data
    }

    fn assert_close(a: &[f32], b: &[f32], tolerance: f32) {
        assert_eq!(a.len(), b.len());
        for (index, (a, b)) in a.iter().zip(b).enumerate() {
            assert!((a - b).abs() <= tolerance, "sample {}: {} != {}", index, a, b);
        }
    }

    #[test]
    fn test_not_listed_before_update() {
        let sim = Simulator::with_devices(vec![SimulatedDevice::default()]);
        assert_eq!(sim.device_count().unwrap(), 0);
        assert!(!sim.can_open_oscilloscope(0).unwrap());
    }

    #[test]
    fn test_rounding() {
        let (mut sim, handle) = open(SimulatedDevice::default());
        assert_eq!(sim.set_channel_range(handle, 0, 0.5).unwrap(), 0.8);
        assert_eq!(sim.set_channel_range(handle, 0, 1000.0).unwrap(), 80.0);
        assert_eq!(sim.set_sample_frequency(handle, 2e9).unwrap(), 5e8);
        sim.set_channel_enabled(handle, 1, false).unwrap();
        assert_eq!(sim.set_sample_frequency(handle, 2e9).unwrap(), 1e9);
        assert_eq!(sim.set_resolution(handle, 4).unwrap(), 8);
        assert!(sim.set_channel_enabled(handle, 2, true).is_err());
    }

    #[test]
    fn test_channel_trigger_alignment() {
        let device = SimulatedDevice {
            signals: vec![SimulatedSignal { noise: 0.0, ..Default::default() }],
            ..Default::default()
        };
        let (mut sim, handle) = open(device);
        sim.set_channel_enabled(handle, 1, false).unwrap();
        sim.set_sample_frequency(handle, 500e6).unwrap();
        // long enough for the burst to decay below the trigger level
        sim.set_record_length(handle, 3000).unwrap();
        sim.set_resolution(handle, 12).unwrap();
        sim.set_channel_range(handle, 0, 4.0).unwrap();
        sim.set_trigger_enabled(handle, TriggerSource::Channel(0), true).unwrap();
        sim.set_trigger_level(handle, 0, 1.0).unwrap();
        sim.set_trigger_hysteresis(handle, 0, 0.0).unwrap();
        let first = acquire(&mut sim, handle, 3000);
        let second = acquire(&mut sim, handle, 3000);
        assert!(first[0] > 1.0);
        assert!(first[..8].iter().all(|&sample| sample > 0.0));
        assert_close(&first, &second, 4.0 / 2048.0);
    }

    #[test]
    fn test_external_trigger_alignment() {
        let device = SimulatedDevice {
            signals: vec![SimulatedSignal { noise: 0.0, ..Default::default() }],
            ..Default::default()
        };
        let (mut sim, handle) = open(device);
        sim.set_sample_frequency(handle, 500e6).unwrap();
        sim.set_record_length(handle, 15000).unwrap();
        sim.set_trigger_enabled(handle, TriggerSource::External(0), true).unwrap();
        let first = acquire(&mut sim, handle, 15000);
        let second = acquire(&mut sim, handle, 15000);
        // bursts start at the trigger point, 10000 samples apart
        assert_eq!(first[0], 0.0);
        assert_close(&first[..5000], &first[10000..], 0.0625);
        assert_close(&first, &second, 0.0625);
    }

    #[test]
    fn test_removed() {
        let device = SimulatedDevice { removed_after: Some(1), ..Default::default() };
        let (mut sim, handle) = open(device);
        acquire(&mut sim, handle, 10);
        sim.start(handle).unwrap();
        assert_eq!(sim.status(handle).unwrap(), ScopeStatus::Removed);
        assert!(matches!(sim.start(handle), Err(Error::Removed)));
    }

    #[test]
    fn test_stalled() {
        let device = SimulatedDevice { stalled: true, ..Default::default() };
        let (mut sim, handle) = open(device);
        sim.start(handle).unwrap();
        for _ in 0..10 {
            assert_eq!(sim.status(handle).unwrap(), ScopeStatus::empty());
        }
    }

    #[test]
    fn test_closed_handle() {
        let (mut sim, handle) = open(SimulatedDevice::default());
        sim.close(handle).unwrap();
        assert!(matches!(sim.name(handle), Err(Error::Library { .. })));
    }
}

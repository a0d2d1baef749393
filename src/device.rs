use std::time::{Duration, Instant};
use std::thread::sleep;

use crate::{Error, Result};
use crate::capture::{Block, BlockSource};
use crate::config::{AcquisitionConfiguration, TriggerSource};
use crate::params::{MeasureModes, ScopeStatus, Settings};
use crate::sys::{Driver, Handle};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub name: String,
    pub serial_number: u32,
    pub channel_count: u16,
    pub measure_modes: MeasureModes,
    pub clock_source_frequencies: Vec<f64>,
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "Oscilloscope:")?;
        writeln!(f, "  Name:          {}", self.name)?;
        writeln!(f, "  Serial number: {}", self.serial_number)?;
        writeln!(f, "  Channels:      {}", self.channel_count)?;
        writeln!(f, "  Measure modes: {:?}", self.measure_modes)?;
        write!(f, "  Clock source frequencies:")?;
        if self.clock_source_frequencies.is_empty() {
            write!(f, " none")?;
        }
        for frequency in &self.clock_source_frequencies {
            write!(f, " {} Hz", frequency)?;
        }
        Ok(())
    }
}

/// An oscilloscope opened through a library session; closed when dropped.
#[derive(Debug)]
pub struct Oscilloscope<'a, D: Driver> {
    driver: &'a mut D,
    handle: Handle,
    channel_count: u16,
    settings: Option<Settings>,
    poll_interval: Duration,
    acquisition_timeout: Option<Duration>,
}

impl<'a, D: Driver> Oscilloscope<'a, D> {
    /// Opens the first listed oscilloscope that supports block measurements.
    pub fn open(driver: &'a mut D) -> Result<Oscilloscope<'a, D>> {
        log::info!("library version {}", driver.version());
        driver.set_network_auto_detect(true)?;
        driver.update_device_list()?;
        for index in 0..driver.device_count()? {
            if !driver.can_open_oscilloscope(index)? {
                continue
            }
            let handle = driver.open_oscilloscope(index)?;
            if driver.measure_modes(handle)?.contains(MeasureModes::Block) {
                let channel_count = driver.channel_count(handle)?;
                log::debug!("opened device #{} as {:?} with {} channels",
                    index, handle, channel_count);
                return Ok(Oscilloscope {
                    driver,
                    handle,
                    channel_count,
                    settings: None,
                    poll_interval: DEFAULT_POLL_INTERVAL,
                    acquisition_timeout: None,
                })
            }
            log::debug!("device #{} does not support block measurements", index);
            driver.close(handle)?;
        }
        Err(Error::NotFound)
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn settings(&self) -> Option<&Settings> {
        self.settings.as_ref()
    }

    pub fn info(&self) -> Result<DeviceInfo> {
        Ok(DeviceInfo {
            name: self.driver.name(self.handle)?,
            serial_number: self.driver.serial_number(self.handle)?,
            channel_count: self.channel_count,
            measure_modes: self.driver.measure_modes(self.handle)?,
            clock_source_frequencies: self.driver.clock_source_frequencies(self.handle)?,
        })
    }

    /// Applies a configuration and returns the settings the device ended up with.
    pub fn configure(&mut self, config: &AcquisitionConfiguration) -> Result<Settings> {
        config.validate()?;
        if let Some((index, _)) = config.enabled_channels()
                .find(|&(index, _)| index >= self.channel_count) {
            return Err(Error::InvalidConfiguration(format!(
                "Ch{} enabled on a {} channel device", index + 1, self.channel_count)))
        }
        let handle = self.handle;
        let driver = &mut *self.driver;

        driver.set_measure_mode(handle, MeasureModes::Block)?;

        let mut channels = Vec::new();
        for index in 0..self.channel_count {
            match config.channels.get(index as usize).filter(|channel| channel.enabled) {
                Some(channel) => {
                    driver.set_channel_enabled(handle, index, true)?;
                    let range = driver.set_channel_range(handle, index, channel.range)?;
                    driver.set_channel_coupling(handle, index, channel.coupling)?;
                    log::debug!("Ch{}: range {} V, {:?} coupling", index + 1, range, channel.coupling);
                    channels.push((index, range));
                }
                None => {
                    driver.set_channel_enabled(handle, index, false)?;
                }
            }
        }

        let sample_frequency = driver.set_sample_frequency(handle, config.sample_frequency)?;
        let record_length = driver.set_record_length(handle, config.record_length)?;
        let pre_sample_ratio = driver.set_pre_sample_ratio(handle,
            config.pre_trigger.ratio(sample_frequency, record_length))?;
        let resolution = driver.set_resolution(handle, config.resolution)?;
        let trigger_timeout = driver.set_trigger_timeout(handle, config.trigger_timeout)?;

        for index in 0..self.channel_count {
            driver.set_trigger_enabled(handle, TriggerSource::Channel(index), false)?;
        }
        let trigger = &config.trigger;
        driver.set_trigger_enabled(handle, trigger.source, true)?;
        driver.set_trigger_kind(handle, trigger.source, trigger.kind)?;
        if let TriggerSource::Channel(index) = trigger.source {
            let level = driver.set_trigger_level(handle, index, trigger.level)?;
            let hysteresis = driver.set_trigger_hysteresis(handle, index, trigger.hysteresis)?;
            log::debug!("trigger: {:?} edge on Ch{} at {} V, hysteresis {}",
                trigger.kind, index + 1, level, hysteresis);
        } else {
            log::debug!("trigger: {:?} edge on {:?}", trigger.kind, trigger.source);
        }

        driver.set_clock_source(handle, config.clock_source)?;

        let settings = Settings {
            sample_frequency,
            record_length,
            pre_sample_ratio,
            resolution,
            trigger_timeout,
            channels,
        };
        if sample_frequency != config.sample_frequency || record_length != config.record_length {
            log::warn!("device applied {} Sa/s and {} samples instead of {} Sa/s and {} samples",
                sample_frequency, record_length, config.sample_frequency, config.record_length);
        }
        log::debug!("configured: {:?}", settings);
        self.poll_interval = config.poll_interval();
        self.acquisition_timeout = config.acquisition_timeout();
        self.settings = Some(settings.clone());
        Ok(settings)
    }

    /// Returns an empty block sized for the current settings.
    pub fn block(&self) -> Result<Block> {
        let settings = self.configured()?;
        Ok(Block::new(&settings.channel_indices(), settings.record_length as usize))
    }

    /// Starts a measurement, waits for it to complete, and copies it into `block`.
    pub fn acquire(&mut self, block: &mut Block) -> Result<()> {
        let record_length = self.configured()?.record_length;
        if block.record_length() as u64 != record_length {
            return Err(Error::ShapeMismatch {
                expected: record_length as usize,
                actual: block.record_length(),
            })
        }

        self.driver.start(self.handle)?;
        let started = Instant::now();
        loop {
            let status = self.driver.status(self.handle)?;
            if status.contains(ScopeStatus::Removed) {
                return Err(Error::Removed)
            }
            if status.contains(ScopeStatus::DataReady) {
                break
            }
            if let Some(timeout) = self.acquisition_timeout {
                if started.elapsed() >= timeout {
                    return Err(Error::Timeout(timeout))
                }
            }
            sleep(self.poll_interval);
        }

        let copied = self.driver.get_data(self.handle,
            &mut block.buffers_mut(self.channel_count), 0)?;
        if copied != record_length {
            return Err(Error::ShapeMismatch {
                expected: record_length as usize,
                actual: copied as usize,
            })
        }
        log::trace!("acquired {} samples in {:?}", copied, started.elapsed());
        Ok(())
    }

    fn configured(&self) -> Result<&Settings> {
        self.settings.as_ref().ok_or_else(|| {
            Error::InvalidConfiguration("oscilloscope is not configured".to_owned())
        })
    }
}

impl<'a, D: Driver> BlockSource for Oscilloscope<'a, D> {
    fn next_block(&mut self, block: &mut Block) -> Result<()> {
        self.acquire(block)
    }
}

impl<'a, D: Driver> Drop for Oscilloscope<'a, D> {
    fn drop(&mut self) {
        match self.driver.close(self.handle) {
            Ok(()) => log::debug!("closed {:?}", self.handle),
            Err(error) => log::error!("failed to close {:?}: {}", self.handle, error),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::capture::capture_averages;
    use crate::config::{AveragingConfiguration, ChannelConfiguration, ClockSource, PreTrigger,
        TriggerConfiguration, TriggerKind};
    use crate::sys::sim::{SimulatedDevice, SimulatedSignal, Simulator};

    fn small_config() -> AcquisitionConfiguration {
        AcquisitionConfiguration {
            sample_frequency: 500e6,
            record_length: 40000,
            pre_trigger: PreTrigger::Ratio(0.0),
            channels: vec![ChannelConfiguration { range: 4.0, ..Default::default() }],
            trigger: TriggerConfiguration {
                source: TriggerSource::Channel(0),
                kind: TriggerKind::Rising,
                level: 1.0,
                hysteresis: 0.05,
            },
            poll_interval: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_not_found() {
        let mut sim = Simulator::with_devices(vec![]);
        assert!(matches!(Oscilloscope::open(&mut sim), Err(Error::NotFound)));

        let stream_only = SimulatedDevice {
            measure_modes: MeasureModes::Stream,
            ..Default::default()
        };
        let mut sim = Simulator::with_devices(vec![stream_only]);
        assert!(matches!(Oscilloscope::open(&mut sim), Err(Error::NotFound)));
    }

    #[test]
    fn test_skips_stream_only() {
        let stream_only = SimulatedDevice {
            name: "stream only".to_owned(),
            measure_modes: MeasureModes::Stream,
            ..Default::default()
        };
        let mut sim = Simulator::with_devices(vec![stream_only, SimulatedDevice::default()]);
        let scope = Oscilloscope::open(&mut sim).unwrap();
        let info = scope.info().unwrap();
        assert_eq!(info.serial_number, 27000);
        assert_ne!(info.name, "stream only");
    }

    #[test]
    fn test_configure() {
        let mut sim = Simulator::new().unwrap();
        let mut scope = Oscilloscope::open(&mut sim).unwrap();
        let mut config = small_config();
        config.channels[0].range = 0.5;
        config.resolution = 12;
        let settings = scope.configure(&config).unwrap();
        assert_eq!(settings.channels, vec![(0, 0.8)]);
        assert_eq!(settings.sample_frequency, 500e6);
        assert_eq!(settings.record_length, 40000);
        assert_eq!(settings.resolution, 12);
        let block = scope.block().unwrap();
        assert_eq!(block.record_length(), 40000);
        assert_eq!(block.channels().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_info_clock_source() {
        let mut sim = Simulator::new().unwrap();
        let mut scope = Oscilloscope::open(&mut sim).unwrap();
        let mut config = small_config();
        config.clock_source = ClockSource::Internal;
        scope.configure(&config).unwrap();
        let info = scope.info().unwrap();
        assert!(info.clock_source_frequencies.is_empty());
        assert!(info.to_string().ends_with("Clock source frequencies: none"));

        config.clock_source = ClockSource::External;
        scope.configure(&config).unwrap();
        let info = scope.info().unwrap();
        assert_eq!(info.clock_source_frequencies, vec![10e6]);
        assert_eq!(info.channel_count, 2);
        let text = info.to_string();
        assert!(text.starts_with("Oscilloscope:\n"));
        assert!(text.contains("  Serial number: 27000\n"));
        assert!(text.ends_with("Clock source frequencies: 10000000 Hz"));
    }

    #[test]
    fn test_block_configuration() {
        let mut sim = Simulator::new().unwrap();
        let mut scope = Oscilloscope::open(&mut sim).unwrap();
        let settings = scope.configure(&AcquisitionConfiguration::block()).unwrap();
        assert_eq!(settings.record_length, 10_000);
        assert_eq!(settings.pre_sample_ratio, 0.5);
        assert_eq!(settings.channels, vec![(0, 4.0)]);
        let mut block = scope.block().unwrap();
        scope.acquire(&mut block).unwrap();
        assert_eq!(block.record_length(), 10_000);
    }

    #[test]
    fn test_configure_too_many_channels() {
        let mut sim = Simulator::new().unwrap();
        let mut scope = Oscilloscope::open(&mut sim).unwrap();
        let mut config = small_config();
        config.channels = vec![ChannelConfiguration::default(); 3];
        assert!(matches!(scope.configure(&config), Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn test_acquire_unconfigured() {
        let mut sim = Simulator::new().unwrap();
        let mut scope = Oscilloscope::open(&mut sim).unwrap();
        let mut block = Block::new(&[0], 10);
        assert!(matches!(scope.acquire(&mut block), Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn test_acquire_wrong_block() {
        let mut sim = Simulator::new().unwrap();
        let mut scope = Oscilloscope::open(&mut sim).unwrap();
        scope.configure(&small_config()).unwrap();
        let mut block = Block::new(&[0], 10);
        assert!(matches!(scope.acquire(&mut block),
            Err(Error::ShapeMismatch { expected: 40000, actual: 10 })));
    }

    #[test]
    fn test_removed() {
        let device = SimulatedDevice { removed_after: Some(2), ..Default::default() };
        let mut sim = Simulator::with_devices(vec![device]);
        let mut scope = Oscilloscope::open(&mut sim).unwrap();
        scope.configure(&small_config()).unwrap();
        let mut block = scope.block().unwrap();
        let averaging = AveragingConfiguration { block_count: 3, cycle_length: 10000,
            skip_first_cycle: false };
        assert!(matches!(capture_averages(&mut scope, &mut block, &averaging),
            Err(Error::Removed)));
    }

    #[test]
    fn test_timeout() {
        let device = SimulatedDevice { stalled: true, ..Default::default() };
        let mut sim = Simulator::with_devices(vec![device]);
        let mut scope = Oscilloscope::open(&mut sim).unwrap();
        let mut config = small_config();
        config.poll_interval = 1;
        config.acquisition_timeout = Some(0.02);
        scope.configure(&config).unwrap();
        let mut block = scope.block().unwrap();
        assert!(matches!(scope.acquire(&mut block), Err(Error::Timeout(_))));
    }

    #[test]
    fn test_average_burst() {
        let device = SimulatedDevice {
            signals: vec![SimulatedSignal { noise: 0.0, ..Default::default() }],
            ..Default::default()
        };
        let mut sim = Simulator::with_devices(vec![device]);
        let mut scope = Oscilloscope::open(&mut sim).unwrap();
        let mut config = small_config();
        config.trigger.source = TriggerSource::External(0);
        scope.configure(&config).unwrap();
        let mut block = scope.block().unwrap();
        let averaging = AveragingConfiguration { block_count: 4, cycle_length: 10000,
            skip_first_cycle: false };
        let averages = capture_averages(&mut scope, &mut block, &averaging).unwrap();
        assert_eq!(averages.divisor, 16);
        let values = &averages.channels[0].values;
        assert_eq!(values.len(), 10000);
        // the burst peaks a quarter oscillation in, at 25 samples, and has decayed at the end
        assert!(values[25] > 1.9 && values[25] < 2.0);
        assert!(values[9999].abs() < 0.01);
    }
}

use std::time::{Duration, Instant};

use crate::{Error, Result};
use crate::average::Averager;
use crate::config::AveragingConfiguration;

/// Sample buffers for one acquisition, one per enabled channel.
///
/// A block is allocated once and refilled by every acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    channels: Vec<(u16, Vec<f32>)>,
}

impl Block {
    pub fn new(channels: &[u16], record_length: usize) -> Block {
        Block {
            channels: channels.iter()
                .map(|&channel| (channel, vec![0.0; record_length]))
                .collect()
        }
    }

    pub fn record_length(&self) -> usize {
        self.channels.first().map(|(_, samples)| samples.len()).unwrap_or(0)
    }

    pub fn channels(&self) -> impl Iterator<Item = u16> + '_ {
        self.channels.iter().map(|&(channel, _)| channel)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &[f32])> + '_ {
        self.channels.iter().map(|(channel, samples)| (*channel, &samples[..]))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u16, &mut [f32])> + '_ {
        self.channels.iter_mut().map(|(channel, samples)| (*channel, &mut samples[..]))
    }

    pub fn samples(&self, channel: u16) -> Option<&[f32]> {
        self.channels.iter()
            .find(|&&(index, _)| index == channel)
            .map(|(_, samples)| &samples[..])
    }

    /// Buffers indexed by device channel, `None` for channels not in this block.
    pub(crate) fn buffers_mut(&mut self, channel_count: u16) -> Vec<Option<&mut [f32]>> {
        let mut buffers = (0..channel_count).map(|_| None).collect::<Vec<_>>();
        for (channel, samples) in self.channels.iter_mut() {
            if let Some(buffer) = buffers.get_mut(*channel as usize) {
                *buffer = Some(&mut samples[..]);
            }
        }
        buffers
    }
}

/// Anything that can fill a block with the samples of one acquisition.
pub trait BlockSource {
    /// Blocks until the next acquisition completes and copies it into `block`.
    fn next_block(&mut self, block: &mut Block) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelAverage {
    pub channel: u16,
    pub values: Vec<f64>,
}

/// Result of an averaging run.
#[derive(Debug, Clone, PartialEq)]
pub struct Averages {
    pub channels: Vec<ChannelAverage>,
    pub block_count: usize,
    pub cycle_length: usize,
    pub cycles_per_block: usize,
    /// Samples past the last complete cycle of every block, left out of the averages.
    pub remainder: usize,
    /// Samples summed into every averaged value.
    pub divisor: usize,
    pub elapsed: Duration,
}

/// Acquires `averaging.block_count` blocks from `source` into `block` and averages them.
///
/// The first failure of the source ends the run, and whatever was accumulated is discarded.
pub fn capture_averages<S: BlockSource + ?Sized>(source: &mut S, block: &mut Block,
        averaging: &AveragingConfiguration) -> Result<Averages> {
    if block.channels.is_empty() {
        return Err(Error::InvalidConfiguration("no channel to average".to_owned()))
    }
    let start = Instant::now();
    let mut averagers = block.channels()
        .map(|channel| {
            let averager = Averager::new(averaging.block_count, block.record_length(),
                averaging.cycle_length, averaging.skip_first_cycle)?;
            Ok((channel, averager))
        })
        .collect::<Result<Vec<_>>>()?;

    for index in 0..averaging.block_count {
        if let Err(error) = source.next_block(block) {
            log::error!("acquisition failed after {} of {} blocks, discarding: {}",
                index, averaging.block_count, error);
            return Err(error)
        }
        for ((_, averager), (_, samples)) in averagers.iter_mut().zip(block.iter()) {
            averager.accumulate(samples)?;
        }
        log::debug!("block {}/{} accumulated", index + 1, averaging.block_count);
    }

    let mut channels = Vec::with_capacity(averagers.len());
    for (channel, averager) in averagers.iter() {
        channels.push(ChannelAverage { channel: *channel, values: averager.average()? });
    }
    let elapsed = start.elapsed();
    let (_, averager) = &averagers[0];
    log::info!("averaged {} blocks of {} cycles in {:.3} s",
        averager.block_count(), averager.cycles_per_block(), elapsed.as_secs_f64());
    Ok(Averages {
        channels,
        block_count: averager.block_count(),
        cycle_length: averager.cycle_length(),
        cycles_per_block: averager.cycles_per_block(),
        remainder: averager.remainder(),
        divisor: averager.divisor(),
        elapsed,
    })
}

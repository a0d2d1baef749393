//! Block averaging: accumulate equal-length blocks, then fold the sum into one cycle.

use wide::f64x4;

use crate::{Error, Result};

const LANES: usize = 4;

/// Averages `block_count` blocks of `record_length` samples over cycles of `cycle_length`.
///
/// Samples past the last complete cycle of a block (`record_length % cycle_length` of them)
/// are never folded, and the divisor only counts the cycles that are.
#[derive(Debug, Clone)]
pub struct Averager {
    block_count: usize,
    record_length: usize,
    cycle_length: usize,
    skip_first_cycle: bool,
    accumulator: Vec<f64>,
    accumulated: usize,
}

impl Averager {
    pub fn new(block_count: usize, record_length: usize, cycle_length: usize,
            skip_first_cycle: bool) -> Result<Averager> {
        if block_count == 0 {
            return Err(Error::InvalidConfiguration("block count of zero".to_owned()))
        }
        if cycle_length == 0 || cycle_length > record_length {
            return Err(Error::InvalidConfiguration(format!(
                "cycle length {} for record length {}", cycle_length, record_length)))
        }
        if skip_first_cycle && record_length / cycle_length < 2 {
            return Err(Error::InvalidConfiguration(
                "skipping the first cycle leaves no cycle to average".to_owned()))
        }
        let averager = Averager {
            block_count,
            record_length,
            cycle_length,
            skip_first_cycle,
            accumulator: vec![0.0; record_length],
            accumulated: 0,
        };
        if averager.remainder() != 0 {
            log::warn!("record length {} is not a multiple of cycle length {}; \
                the last {} samples of every block are not averaged",
                record_length, cycle_length, averager.remainder());
        }
        Ok(averager)
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    pub fn record_length(&self) -> usize {
        self.record_length
    }

    pub fn cycle_length(&self) -> usize {
        self.cycle_length
    }

    /// Blocks accumulated so far.
    pub fn accumulated(&self) -> usize {
        self.accumulated
    }

    /// Complete cycles folded from every block.
    pub fn cycles_per_block(&self) -> usize {
        self.record_length / self.cycle_length - self.skip_first_cycle as usize
    }

    /// Samples past the last complete cycle of every block.
    pub fn remainder(&self) -> usize {
        self.record_length % self.cycle_length
    }

    /// Number of samples summed into every slot of the folded cycle.
    pub fn divisor(&self) -> usize {
        self.block_count * self.cycles_per_block()
    }

    pub fn accumulator(&self) -> &[f64] {
        &self.accumulator
    }

    pub fn accumulate(&mut self, block: &[f32]) -> Result<()> {
        if block.len() != self.record_length {
            return Err(Error::ShapeMismatch { expected: self.record_length, actual: block.len() })
        }
        if self.accumulated == self.block_count {
            return Err(Error::TooManyBlocks { expected: self.block_count })
        }

        let whole = self.record_length / LANES * LANES;
        let (sums, sums_tail) = self.accumulator.split_at_mut(whole);
        let (samples, samples_tail) = block.split_at(whole);
        let sums: &mut [[f64; LANES]] = bytemuck::cast_slice_mut(sums);
        let samples: &[[f32; LANES]] = bytemuck::cast_slice(samples);
        for (sum, sample) in sums.iter_mut().zip(samples) {
            *sum = (f64x4::from(*sum) + f64x4::from(sample.map(f64::from))).to_array();
        }
        for (sum, &sample) in sums_tail.iter_mut().zip(samples_tail) {
            *sum += sample as f64;
        }

        self.accumulated += 1;
        log::trace!("accumulated block {}/{}", self.accumulated, self.block_count);
        Ok(())
    }

    /// Sums every complete cycle of the accumulator into a single cycle.
    pub fn fold(&self) -> Vec<f64> {
        let cycles = self.record_length / self.cycle_length;
        let mut cycle = vec![0.0; self.cycle_length];
        for segment in self.accumulator[..cycles * self.cycle_length]
                .chunks_exact(self.cycle_length)
                .skip(self.skip_first_cycle as usize) {
            for (sum, &value) in cycle.iter_mut().zip(segment) {
                *sum += value;
            }
        }
        cycle
    }

    /// Per-sample average of the folded cycle; all `block_count` blocks must be accumulated.
    pub fn average(&self) -> Result<Vec<f64>> {
        if self.accumulated != self.block_count {
            return Err(Error::Incomplete { expected: self.block_count, received: self.accumulated })
        }
        let divisor = self.divisor() as f64;
        Ok(self.fold().into_iter().map(|sum| sum / divisor).collect())
    }
}

#[cfg(test)]
mod test {
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    use super::*;

    fn assert_all_close(values: &[f64], expected: f64) {
        for (index, &value) in values.iter().enumerate() {
            assert!((value - expected).abs() < 1e-9, "{} at {}, expected {}", value, index, expected);
        }
    }

    #[test]
    fn test_constant_blocks() {
        for &(record_length, cycle_length) in &[(12, 4), (10, 5), (7, 7), (1000, 10)] {
            let mut averager = Averager::new(5, record_length, cycle_length, false).unwrap();
            for _ in 0..5 {
                averager.accumulate(&vec![0.25; record_length]).unwrap();
            }
            assert_all_close(&averager.average().unwrap(), 0.25);
        }
    }

    #[test]
    fn test_three_blocks_four_cycles() {
        let mut averager = Averager::new(3, 10000, 10000 / 4, false).unwrap();
        for value in [1.0, 2.0, 3.0] {
            averager.accumulate(&vec![value; 10000]).unwrap();
        }
        assert_all_close(averager.accumulator(), 6.0);
        assert_eq!(averager.divisor(), 12);
        let average = averager.average().unwrap();
        assert_eq!(average.len(), 2500);
        assert_all_close(&average, 2.0);
    }

    #[test]
    fn test_fold_sums_columns() {
        let mut rng = StdRng::seed_from_u64(1);
        let (rows, columns) = (6, 9);
        let mut averager = Averager::new(2, rows * columns, columns, false).unwrap();
        for _ in 0..2 {
            let block = (0..rows * columns).map(|_| rng.gen_range(-1.0..1.0)).collect::<Vec<f32>>();
            averager.accumulate(&block).unwrap();
        }
        let accumulator = averager.accumulator();
        let columns_summed = (0..columns)
            .map(|column| (0..rows).map(|row| accumulator[row * columns + column]).sum::<f64>())
            .collect::<Vec<_>>();
        for (folded, summed) in averager.fold().iter().zip(&columns_summed) {
            assert!((folded - summed).abs() < 1e-9);
        }
    }

    #[test]
    fn test_mean_is_preserved() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut averager = Averager::new(4, 1200, 300, false).unwrap();
        for _ in 0..4 {
            let block = (0..1200).map(|_| rng.gen_range(0.0..2.0)).collect::<Vec<f32>>();
            averager.accumulate(&block).unwrap();
        }
        let cycle_mean = averager.fold().iter().sum::<f64>()
            / averager.divisor() as f64 / averager.cycle_length() as f64;
        let block_mean = averager.accumulator().iter().sum::<f64>() / (4.0 * 1200.0);
        assert!((cycle_mean - block_mean).abs() < 1e-9);
    }

    #[test]
    fn test_shape_mismatch() {
        let mut averager = Averager::new(1, 100, 10, false).unwrap();
        assert!(matches!(averager.accumulate(&[0.0; 99]),
            Err(Error::ShapeMismatch { expected: 100, actual: 99 })));
        assert!(matches!(averager.accumulate(&[0.0; 101]),
            Err(Error::ShapeMismatch { expected: 100, actual: 101 })));
        assert_eq!(averager.accumulated(), 0);
    }

    #[test]
    fn test_remainder_truncated() {
        let mut averager = Averager::new(2, 10001, 2500, false).unwrap();
        assert_eq!(averager.remainder(), 1);
        assert_eq!(averager.cycles_per_block(), 4);
        assert_eq!(averager.divisor(), 8);
        let mut block = vec![1.0; 10001];
        block[10000] = 1e6;
        averager.accumulate(&block).unwrap();
        averager.accumulate(&block).unwrap();
        assert_all_close(&averager.average().unwrap(), 1.0);
    }

    #[test]
    fn test_skip_first_cycle() {
        let mut averager = Averager::new(1, 40, 10, true).unwrap();
        assert_eq!(averager.divisor(), 3);
        averager.accumulate(&[1.0; 40]).unwrap();
        assert_all_close(&averager.average().unwrap(), 1.0);

        let mut averager = Averager::new(1, 40, 10, true).unwrap();
        let mut block = vec![1.0; 40];
        block[..10].fill(100.0);
        averager.accumulate(&block).unwrap();
        assert_all_close(&averager.average().unwrap(), 1.0);
    }

    #[test]
    fn test_incomplete() {
        let mut averager = Averager::new(3, 8, 4, false).unwrap();
        averager.accumulate(&[1.0; 8]).unwrap();
        assert!(matches!(averager.average(),
            Err(Error::Incomplete { expected: 3, received: 1 })));
    }

    #[test]
    fn test_too_many_blocks() {
        let mut averager = Averager::new(1, 8, 4, false).unwrap();
        averager.accumulate(&[1.0; 8]).unwrap();
        assert!(matches!(averager.accumulate(&[1.0; 8]),
            Err(Error::TooManyBlocks { expected: 1 })));
        assert_all_close(&averager.average().unwrap(), 1.0);
    }

    #[test]
    fn test_invalid() {
        assert!(Averager::new(0, 8, 4, false).is_err());
        assert!(Averager::new(1, 8, 0, false).is_err());
        assert!(Averager::new(1, 8, 9, false).is_err());
        assert!(Averager::new(1, 8, 5, true).is_err());
        assert!(Averager::new(1, 10, 5, true).is_ok());
    }
}

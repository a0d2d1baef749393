//! Implements rising edge/falling edge/both edges trigger with hysteresis using SIMD operations.

use wide::{f32x8, CmpGt, CmpLt};

use crate::config::TriggerKind;

const GROUP: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeFilter {
    Rising  = 0b01,
    Falling = 0b10,
    Both    = 0b11,
}

impl From<TriggerKind> for EdgeFilter {
    fn from(kind: TriggerKind) -> Self {
        match kind {
            TriggerKind::Rising  => EdgeFilter::Rising,
            TriggerKind::Falling => EdgeFilter::Falling,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising  = 0b01,
    Falling = 0b10,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Below,
    Above
}

#[derive(Debug, Clone, Copy)]
pub struct Trigger {
    state: State,
    level: f32, // if let Fresh = state { state = if sample < level { Below } else { Above } }
    below: f32, // if sample < below { state = Below }
    above: f32, // if sample > above { state = Above }
}

impl Trigger {
    /// Create a new trigger mechanism at `level` volts.
    ///
    /// The trigger mechanism detects an "above condition" when it processes a sample that is
    /// strictly above `level + hysteresis`, and a "below condition" when it processes a sample
    /// that is strictly below `level - hysteresis`. A rising edge is detected at the sample where
    /// a below condition crosses into an above condition, and a falling edge is detected at
    /// the sample where an above condition crosses into a below condition.
    ///
    /// For example, if `hysteresis` is 0.1 and `level` is 1.0, when processing a stream of
    /// samples `[0.1, 0.95, 1.0, 1.05, 1.2, 1.3, 0.95, 0.8]`, a rising edge is detected at
    /// sample #4 (value 1.2), and a falling edge is detected at sample #7 (value 0.8).
    pub fn new(level: f32, hysteresis: f32) -> Trigger {
        let hysteresis = hysteresis.abs();
        Trigger {
            state: State::Fresh,
            level,
            below: level - hysteresis,
            above: level + hysteresis,
        }
    }

    /// Scan incoming data for edges.
    ///
    /// The return value indicates whether processing has ended because an edge has been detected,
    /// or because no more samples could been processed. If an edge has been detected, after
    /// the function returns, `samples` point to the sample that caused the edge to be detected.
    ///
    /// This function advances `samples` forward, moving past the samples that have been processed.
    /// Trigger processing is done on groups of 8 samples, and any samples not fitting into
    /// a group are left unprocessed.
    pub fn scan(&mut self, samples: &mut &[f32], filter: EdgeFilter) -> Option<Edge> {
        fn scan_for<P: Fn(f32x8) -> f32x8>(samples: &mut &[f32], predicate: P) -> bool {
            let mut found = false;
            let mut offset = 0;
            let whole = samples.len() / GROUP * GROUP;
            let groups: &[[f32; GROUP]] = bytemuck::cast_slice(&samples[..whole]);
            for &group in groups {
                let mask = predicate(f32x8::new(group));
                offset += (mask.move_mask() as u8).trailing_zeros() as usize;
                if mask.any() {
                    found = true;
                    break
                }
            }
            *samples = &samples[offset.min(samples.len())..];
            found
        }

        match (self.state, *samples) {
            (State::Fresh, []) =>
                return None,
            (State::Fresh, [first_sample, next_samples @ ..]) => {
                self.state = if *first_sample < self.level {
                    State::Below
                } else {
                    State::Above
                };
                *samples = next_samples;
            }
            _ => ()
        }

        let above = f32x8::splat(self.above);
        let below = f32x8::splat(self.below);
        loop {
            let found = match self.state {
                State::Fresh => unreachable!(),
                State::Below => scan_for(samples, |group| group.cmp_gt(above)),
                State::Above => scan_for(samples, |group| group.cmp_lt(below)),
            };
            if !found {
                return None
            }
            self.state = match self.state {
                State::Fresh => unreachable!(),
                State::Below => State::Above, // rising edge
                State::Above => State::Below, // falling edge
            };
            match (self.state, filter) {
                (State::Above, EdgeFilter::Both | EdgeFilter::Rising) =>
                    return Some(Edge::Rising),
                (State::Below, EdgeFilter::Both | EdgeFilter::Falling) =>
                    return Some(Edge::Falling),
                _ => ()
            }
        }
    }

    /// Like `scan`, but returns the amount of consumed samples.
    pub fn find(&mut self, mut samples: &[f32], filter: EdgeFilter) -> (usize, Option<Edge>) {
        let len_before = samples.len();
        let edge_opt = self.scan(&mut samples, filter);
        let len_after = samples.len();
        (len_before - len_after, edge_opt)
    }
}

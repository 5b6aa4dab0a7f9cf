// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! PCC: Performance-oriented Congestion Control.
//!
//! PCC treats the network as a black box. The sender runs a sequence of
//! small online experiments, called monitor intervals, each holding one
//! candidate sending rate. Once all packets of an experiment are acked or
//! lost, the observed goodput, losses and rtt evolution are condensed into
//! a utility value, and the sender moves the rate towards the direction of
//! higher utility.
//!
//! See <https://www.usenix.org/conference/nsdi15/technical-sessions/presentation/dong>.

use std::collections::VecDeque;
use std::time::Duration;
use std::time::Instant;

use log::*;
use rand::rngs::StdRng;
use rand::RngCore;
use rand::SeedableRng;

use super::monitor_interval::MonitorIntervalQueue;
use super::monitor_interval::UtilityInfo;
use super::CongestionController;
use super::CongestionEventPacket;
use super::CongestionStats;
use crate::RecoveryConfig;

/// Number of bits per megabit.
const MEGABIT: f64 = (1024 * 1024) as f64;

/// Number of microseconds per second.
const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Number of bits per byte.
const BITS_PER_BYTE: u64 = 8;

/// The smallest sending rate the controller will settle on.
const MIN_SENDING_RATE: f64 = 2.0 * MEGABIT;

/// The smallest amount that the rate can be changed by at a time.
const MINIMUM_RATE_CHANGE: f64 = 0.5 * MEGABIT;

/// Step size for rate deviation in PROBING mode.
const PROBING_STEP_SIZE: f64 = 0.05;

/// Base step size for restoring the rate when leaving DECISION_MADE mode.
const DECISION_MADE_STEP_SIZE: f64 = 0.02;

/// Maximum step size for restoring the rate when leaving DECISION_MADE
/// mode.
const MAX_DECISION_MADE_STEP_SIZE: f64 = 0.10;

/// Groups of useful monitor intervals each time in PROBING mode.
const NUM_INTERVAL_GROUPS_IN_PROBING: usize = 2;

/// Minimum number of packets per monitor interval.
const MINIMUM_PACKETS_PER_INTERVAL: u64 = 10;

/// Number of utility gradients to average.
const AVG_GRADIENT_SAMPLE_SIZE: usize = 1;

/// The factor that converts the average utility gradient to a rate change.
const UTILITY_GRADIENT_TO_RATE_CHANGE_FACTOR: f64 = 1.0 * MEGABIT;

/// The initial maximum rate change as a proportion of the current rate.
const INITIAL_MAXIMUM_PROPORTIONAL_CHANGE: f64 = 0.05;

/// The additional maximum proportional change each time it is incremented.
const MAXIMUM_PROPORTIONAL_CHANGE_STEP_SIZE: f64 = 0.06;

/// Ignore rtt fluctuation within 30 percent in STARTING mode.
const RTT_FLUCTUATION_TOLERANCE_IN_STARTING: f64 = 0.3;

/// Ignore rtt fluctuation within 5 percent in DECISION_MADE mode.
const RTT_FLUCTUATION_TOLERANCE_IN_DECISION_MADE: f64 = 0.05;

/// Pcc configurable parameters.
#[derive(Debug)]
pub struct PccConfig {
    /// Initial smoothed rtt.
    initial_rtt: Duration,

    /// Initial congestion window in packets.
    initial_cwnd: u64,

    /// Maximum congestion window in packets.
    max_cwnd: u64,

    /// Max datagram size in bytes.
    max_datagram_size: u64,

    /// The smallest sending rate in bits per second.
    min_sending_rate: f64,

    /// The smallest rate change in bits per second.
    minimum_rate_change: f64,

    /// Deviation applied around the central rate in PROBING mode.
    probing_step_size: f64,

    /// Base step used to restore the rate when leaving DECISION_MADE mode.
    decision_made_step_size: f64,

    /// Cap of the restore step when leaving DECISION_MADE mode.
    max_decision_made_step_size: f64,

    /// Groups of useful monitor intervals each time in PROBING mode.
    num_interval_groups_in_probing: usize,

    /// Minimum number of packets per monitor interval.
    minimum_packets_per_interval: u64,

    /// Number of utility gradients averaged by rate change computation.
    avg_gradient_sample_size: usize,

    /// Tolerable rtt fluctuation ratio in STARTING mode.
    rtt_fluctuation_tolerance_in_starting: f64,

    /// Tolerable rtt fluctuation ratio in DECISION_MADE mode.
    rtt_fluctuation_tolerance_in_decision_made: f64,
}

impl PccConfig {
    pub fn new(initial_rtt: Duration, initial_cwnd: u64, max_cwnd: u64, max_datagram_size: u64) -> Self {
        Self {
            initial_rtt,
            initial_cwnd,
            max_cwnd,
            max_datagram_size,
            ..Default::default()
        }
    }
}

impl Default for PccConfig {
    fn default() -> Self {
        Self {
            initial_rtt: crate::INITIAL_RTT,
            initial_cwnd: 10,
            max_cwnd: 10000,
            max_datagram_size: crate::DEFAULT_MAX_DATAGRAM_SIZE as u64,
            min_sending_rate: MIN_SENDING_RATE,
            minimum_rate_change: MINIMUM_RATE_CHANGE,
            probing_step_size: PROBING_STEP_SIZE,
            decision_made_step_size: DECISION_MADE_STEP_SIZE,
            max_decision_made_step_size: MAX_DECISION_MADE_STEP_SIZE,
            num_interval_groups_in_probing: NUM_INTERVAL_GROUPS_IN_PROBING,
            minimum_packets_per_interval: MINIMUM_PACKETS_PER_INTERVAL,
            avg_gradient_sample_size: AVG_GRADIENT_SAMPLE_SIZE,
            rtt_fluctuation_tolerance_in_starting: RTT_FLUCTUATION_TOLERANCE_IN_STARTING,
            rtt_fluctuation_tolerance_in_decision_made: RTT_FLUCTUATION_TOLERANCE_IN_DECISION_MADE,
        }
    }
}

impl From<&RecoveryConfig> for PccConfig {
    fn from(conf: &RecoveryConfig) -> Self {
        PccConfig::new(
            conf.initial_rtt,
            conf.initial_congestion_window,
            conf.max_congestion_window,
            conf.max_datagram_size as u64,
        )
    }
}

/// Sender's mode during a connection.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum SenderMode {
    /// Initial phase of the connection. The sending rate is doubled as
    /// long as utility keeps increasing, and the sender enters Probing
    /// mode when utility decreases.
    Starting,

    /// The sender tries alternating sending rates to decide whether a
    /// higher or a lower sending rate has greater utility, and enters
    /// DecisionMade mode once the probing groups agree.
    Probing,

    /// The sender keeps increasing or decreasing the sending rate until
    /// utility decreases, then returns to Probing mode.
    DecisionMade,
}

/// Indicates whether the sender should increase or decrease its rate.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum RateChangeDirection {
    /// Rate increasing.
    Increase,

    /// Rate decreasing.
    Decrease,
}

/// PCC: Performance-oriented Congestion Control.
///
/// Pcc evaluates the benefits of different sending rates by comparing
/// their utilities, and adjusts the sending rate towards the direction of
/// higher utility.
pub struct Pcc {
    /// Config.
    config: PccConfig,

    /// Statistics.
    stats: CongestionStats,

    /// Current mode of the sender.
    mode: SenderMode,

    /// Sending rate in bits per second for the next monitor intervals.
    sending_rate: f64,

    /// Most recent utility used when making the last rate change decision.
    latest_utility_info: UtilityInfo,

    /// Duration of the current monitor interval.
    monitor_duration: Duration,

    /// Current direction of rate changes.
    direction: RateChangeDirection,

    /// Number of rounds the sender remains in the current mode.
    rounds: usize,

    /// Queue of monitor intervals with pending utilities.
    interval_queue: MonitorIntervalQueue,

    /// Maximum congestion window in bits, reserved to cap the sending
    /// rate.
    max_cwnd_bits: u64,

    /// The current average of the last utility gradients.
    avg_gradient: f64,

    /// The gradient samples that have been averaged.
    gradient_samples: VecDeque<f64>,

    /// The initial rtt, used before a real rtt sample is taken.
    initial_rtt: Duration,

    /// Smoothed rtt over all congestion events. Zero until the first
    /// sample.
    avg_rtt: Duration,

    /// The number of consecutive rate changes in a single direction before
    /// the rate of change is accelerated.
    swing_buffer: usize,

    /// An acceleration factor for the rate of change.
    rate_change_amplifier: f64,

    /// The maximum rate change as a proportion of the current rate.
    rate_change_proportion_allowance: usize,

    /// The most recent change made to the sending rate.
    previous_change: f64,

    /// Source of the coin flip deciding which deviation of a probing pair
    /// goes first.
    rng: Box<dyn RngCore + Send + Sync>,
}

impl Pcc {
    pub fn new(config: PccConfig) -> Self {
        Self::with_rng(config, Box::new(StdRng::from_entropy()))
    }

    /// Create a Pcc controller with a caller provided random source.
    ///
    /// The coin flip in probing is the only nondeterministic input of the
    /// controller, so injecting a fixed source makes it fully
    /// deterministic.
    pub fn with_rng(config: PccConfig, rng: Box<dyn RngCore + Send + Sync>) -> Self {
        let initial_rtt = config.initial_rtt;
        let sending_rate = config.initial_cwnd as f64
            * (config.max_datagram_size * BITS_PER_BYTE) as f64
            * MICROS_PER_SECOND
            / initial_rtt.as_micros().max(1) as f64;
        let max_cwnd_bits = config
            .max_cwnd
            .saturating_mul(config.max_datagram_size * BITS_PER_BYTE);

        Self {
            config,
            stats: Default::default(),
            mode: SenderMode::Starting,
            sending_rate,
            latest_utility_info: UtilityInfo::default(),
            monitor_duration: Duration::ZERO,
            direction: RateChangeDirection::Increase,
            rounds: 1,
            interval_queue: MonitorIntervalQueue::new(),
            max_cwnd_bits,
            avg_gradient: 0.0,
            gradient_samples: VecDeque::new(),
            initial_rtt,
            avg_rtt: Duration::ZERO,
            swing_buffer: 0,
            rate_change_amplifier: 0.0,
            rate_change_proportion_allowance: 0,
            previous_change: 0.0,
            rng,
        }
    }

    /// Duration of the next monitor interval: at least 1.5 smoothed rtt,
    /// and long enough to carry the minimum number of packets at
    /// `sending_rate`.
    fn compute_monitor_duration(&self, sending_rate: f64, rtt: Duration) -> Duration {
        let floor_us = (self.config.minimum_packets_per_interval
            * BITS_PER_BYTE
            * self.config.max_datagram_size) as f64
            / sending_rate
            * MICROS_PER_SECOND;
        let duration_us = (1.5 * rtt.as_micros() as f64).max(floor_us);
        Duration::from_micros(duration_us as u64)
    }

    /// Return true if the next created monitor interval is useful, i.e.
    /// its utility will be used when a decision can be made.
    fn create_useful_interval(&self) -> bool {
        if self.avg_rtt.is_zero() {
            // Create non useful intervals upon starting a connection, until
            // there are valid rtt stats.
            return false;
        }

        // In Starting and DecisionMade mode there is at most one useful
        // interval in the queue; in Probing mode there are at most two per
        // probing group.
        let max_num_useful = if self.mode == SenderMode::Probing {
            2 * self.config.num_interval_groups_in_probing
        } else {
            1
        };
        self.interval_queue.num_useful_intervals() < max_num_useful
    }

    /// Maybe deviate the sending rate for the next created monitor
    /// interval.
    ///
    /// The rate is only deviated in Probing mode while probing intervals
    /// are still being created; in Starting and DecisionMade mode the rate
    /// was already chosen when the last utility batch arrived.
    fn maybe_set_sending_rate(&mut self) {
        let num_useful = self.interval_queue.num_useful_intervals();
        let max_useful = 2 * self.config.num_interval_groups_in_probing;
        if self.mode != SenderMode::Probing
            || (num_useful == max_useful
                && self.interval_queue.current().map_or(false, |mi| !mi.is_useful))
        {
            return;
        }

        if num_useful != 0 {
            // Restore the central sending rate first.
            match self.direction {
                RateChangeDirection::Increase => {
                    self.sending_rate *= 1.0 / (1.0 + self.config.probing_step_size)
                }
                RateChangeDirection::Decrease => {
                    self.sending_rate *= 1.0 / (1.0 - self.config.probing_step_size)
                }
            }
            if num_useful == max_useful {
                // This is the first not useful interval; it keeps the
                // central rate.
                return;
            }
        }

        // Each probing group pairs an interval with increased rate and one
        // with decreased rate. Which one goes first is decided by a coin
        // flip at the start of every pair.
        self.direction = if num_useful % 2 == 0 {
            if self.rng.next_u32() % 2 == 1 {
                RateChangeDirection::Increase
            } else {
                RateChangeDirection::Decrease
            }
        } else {
            match self.direction {
                RateChangeDirection::Increase => RateChangeDirection::Decrease,
                RateChangeDirection::Decrease => RateChangeDirection::Increase,
            }
        };

        match self.direction {
            RateChangeDirection::Increase => {
                self.sending_rate *= 1.0 + self.config.probing_step_size
            }
            RateChangeDirection::Decrease => {
                self.sending_rate *= 1.0 - self.config.probing_step_size
            }
        }

        trace!(
            "{} probing deviated rate to {:.0}bps ({:?})",
            self.name(),
            self.sending_rate,
            self.direction
        );
    }

    /// Return true if the sender can enter DecisionMade from Probing mode,
    /// i.e. all probing groups agree on the profitable direction.
    fn can_make_decision(&self, utility_info: &[UtilityInfo]) -> bool {
        let groups = self.config.num_interval_groups_in_probing;
        if utility_info.len() < 2 * groups {
            // The sender did not have enough data to fill all probing
            // intervals.
            return false;
        }

        let mut increase = false;
        for i in 0..groups {
            let first_sample = &utility_info[2 * i];
            let second_sample = &utility_info[2 * i + 1];
            let increase_i = if first_sample.utility > second_sample.utility {
                first_sample.sending_rate > second_sample.sending_rate
            } else {
                first_sample.sending_rate < second_sample.sending_rate
            };

            if i == 0 {
                increase = increase_i;
            }
            if increase_i != increase {
                return false;
            }
        }
        true
    }

    /// Maintain a sliding mean over the most recent utility gradients.
    fn update_average_gradient(&mut self, new_gradient: f64) {
        let num_samples = self.gradient_samples.len();
        if num_samples == 0 {
            self.avg_gradient = new_gradient;
        } else if num_samples < self.config.avg_gradient_sample_size {
            self.avg_gradient =
                (self.avg_gradient * num_samples as f64 + new_gradient) / (num_samples + 1) as f64;
        } else {
            let sample_size = self.config.avg_gradient_sample_size.max(1) as f64;
            if let Some(oldest_gradient) = self.gradient_samples.pop_front() {
                self.avg_gradient -= oldest_gradient / sample_size;
                self.avg_gradient += new_gradient / sample_size;
            }
        }
        self.gradient_samples.push_back(new_gradient);
    }

    /// Derive the next rate change from two utility samples by following
    /// the utility gradient. Monotonic runs are accelerated by the
    /// amplifier, a direction flip resets the acceleration, and the
    /// resulting change is bounded proportionally to the current rate and
    /// floored at the minimum rate change.
    fn compute_rate_change(&mut self, sample_1: &UtilityInfo, sample_2: &UtilityInfo) -> f64 {
        if sample_1.sending_rate == sample_2.sending_rate {
            return self.config.minimum_rate_change;
        }

        let utility_gradient = MEGABIT * (sample_1.utility - sample_2.utility)
            / (sample_1.sending_rate - sample_2.sending_rate);
        self.update_average_gradient(utility_gradient);
        let mut change = self.avg_gradient * UTILITY_GRADIENT_TO_RATE_CHANGE_FACTOR;

        if (change > 0.0) != (self.previous_change > 0.0) {
            // A direction flip resets the acceleration machinery and arms
            // the swing buffer, so the next run does not accelerate right
            // away.
            self.rate_change_amplifier = 0.0;
            self.rate_change_proportion_allowance = 0;
            if self.swing_buffer < 2 {
                self.swing_buffer += 1;
            }
        }

        change *= if self.rate_change_amplifier < 3.0 {
            self.rate_change_amplifier + 1.0
        } else if self.rate_change_amplifier < 6.0 {
            2.0 * self.rate_change_amplifier - 2.0
        } else if self.rate_change_amplifier < 9.0 {
            4.0 * self.rate_change_amplifier - 14.0
        } else {
            9.0 * self.rate_change_amplifier - 50.0
        };

        if (change > 0.0) == (self.previous_change > 0.0) {
            if self.swing_buffer == 0 {
                if self.rate_change_amplifier < 3.0 {
                    self.rate_change_amplifier += 0.5;
                } else {
                    self.rate_change_amplifier += 1.0;
                }
            }
            if self.swing_buffer > 0 {
                self.swing_buffer -= 1;
            }
        }

        let max_allowed_change_ratio = INITIAL_MAXIMUM_PROPORTIONAL_CHANGE
            + self.rate_change_proportion_allowance as f64 * MAXIMUM_PROPORTIONAL_CHANGE_STEP_SIZE;
        let change_ratio = (change / self.sending_rate).abs();

        if change_ratio > max_allowed_change_ratio {
            self.rate_change_proportion_allowance += 1;
            change = if change < 0.0 {
                -max_allowed_change_ratio * self.sending_rate
            } else {
                max_allowed_change_ratio * self.sending_rate
            };
        } else if self.rate_change_proportion_allowance > 0 {
            self.rate_change_proportion_allowance -= 1;
        }

        if (change > 0.0) != (self.previous_change > 0.0) {
            self.rate_change_amplifier = 0.0;
            self.rate_change_proportion_allowance = 0;
        }

        if change < 0.0 && change > -self.config.minimum_rate_change {
            change = -self.config.minimum_rate_change;
        } else if change > 0.0 && change < self.config.minimum_rate_change {
            change = self.config.minimum_rate_change;
        }

        trace!(
            "{} rate change {:.0}bps, gradient {:.4}, amplifier {:.1}, swing {}",
            self.name(),
            change,
            self.avg_gradient,
            self.rate_change_amplifier,
            self.swing_buffer
        );

        change
    }

    /// Consume a batch of utilities and drive the mode machine. Called
    /// when all useful intervals' utilities are available, so the sender
    /// can make a decision.
    fn on_utility_available(&mut self, utility_info: &[UtilityInfo]) {
        let first = match utility_info.first() {
            Some(first) => *first,
            None => return,
        };

        match self.mode {
            SenderMode::Starting => {
                if first.utility > self.latest_utility_info.utility {
                    // Stay in Starting mode. Double the sending rate and
                    // update the latest utility.
                    self.sending_rate *= 2.0;
                    self.latest_utility_info = first;
                    self.rounds += 1;
                    trace!(
                        "{} starting doubled rate to {:.0}bps",
                        self.name(),
                        self.sending_rate
                    );
                } else {
                    // Enter Probing mode if utility decreases.
                    self.enter_probing();
                }
            }
            SenderMode::Probing => {
                if self.can_make_decision(utility_info) {
                    let groups = self.config.num_interval_groups_in_probing;

                    // Enter DecisionMade mode since a decision is made.
                    self.direction = if utility_info[0].utility > utility_info[1].utility {
                        if utility_info[0].sending_rate > utility_info[1].sending_rate {
                            RateChangeDirection::Increase
                        } else {
                            RateChangeDirection::Decrease
                        }
                    } else if utility_info[0].sending_rate > utility_info[1].sending_rate {
                        RateChangeDirection::Decrease
                    } else {
                        RateChangeDirection::Increase
                    };
                    self.latest_utility_info = if utility_info[2 * groups - 2].utility
                        > utility_info[2 * groups - 1].utility
                    {
                        utility_info[2 * groups - 2]
                    } else {
                        utility_info[2 * groups - 1]
                    };

                    let mut rate_change =
                        self.compute_rate_change(&utility_info[0], &utility_info[1]);
                    if self.sending_rate + rate_change < self.config.min_sending_rate {
                        rate_change = self.config.min_sending_rate - self.sending_rate;
                    }
                    self.previous_change = rate_change;
                    self.enter_decision_made(self.sending_rate + rate_change);
                } else {
                    // Stay in Probing mode.
                    self.enter_probing();
                }
            }
            SenderMode::DecisionMade => {
                let latest = self.latest_utility_info;
                let mut rate_change = self.compute_rate_change(&first, &latest);
                if self.sending_rate + rate_change < self.config.min_sending_rate {
                    rate_change = self.config.min_sending_rate - self.sending_rate;
                }

                if (rate_change > 0.0) == (self.previous_change > 0.0) {
                    // Remain in DecisionMade mode. Keep increasing or
                    // decreasing the sending rate.
                    self.previous_change = rate_change;
                    self.sending_rate += rate_change;
                    self.latest_utility_info = first;
                    trace!(
                        "{} decision made rate {:.0}bps",
                        self.name(),
                        self.sending_rate
                    );
                } else {
                    // Enter Probing if the old direction is no longer best.
                    self.enter_probing();
                }
            }
        }
    }

    /// Move to (or stay in) Probing mode, restoring the central sending
    /// rate of the upcoming probing round.
    fn enter_probing(&mut self) {
        match self.mode {
            SenderMode::Starting => {
                // Use half the sending rate as the central probing rate.
                self.sending_rate *= 0.5;
            }
            SenderMode::DecisionMade => {
                // Use the sending rate right before the utility drop as the
                // central probing rate.
                let step = (self.rounds as f64 * self.config.decision_made_step_size)
                    .min(self.config.max_decision_made_step_size);
                match self.direction {
                    RateChangeDirection::Increase => self.sending_rate *= 1.0 / (1.0 + step),
                    RateChangeDirection::Decrease => self.sending_rate *= 1.0 / (1.0 - step),
                }
            }
            SenderMode::Probing => {
                // Reset the rate to the central rate when the sender did
                // not have enough data to fill all probing intervals.
                if self.interval_queue.current().map_or(false, |mi| mi.is_useful) {
                    match self.direction {
                        RateChangeDirection::Increase => {
                            self.sending_rate *= 1.0 / (1.0 + self.config.probing_step_size)
                        }
                        RateChangeDirection::Decrease => {
                            self.sending_rate *= 1.0 / (1.0 - self.config.probing_step_size)
                        }
                    }
                }
            }
        }

        if self.mode == SenderMode::Probing {
            self.rounds += 1;
            return;
        }

        trace!(
            "{} enter Probing from {:?}, central rate {:.0}bps",
            self.name(),
            self.mode,
            self.sending_rate
        );
        self.mode = SenderMode::Probing;
        self.rounds = 1;
    }

    /// Enter DecisionMade mode with the decided sending rate.
    fn enter_decision_made(&mut self, new_rate: f64) {
        trace!(
            "{} enter DecisionMade, rate {:.0}bps -> {:.0}bps",
            self.name(),
            self.sending_rate,
            new_rate
        );
        self.sending_rate = new_rate;
        self.mode = SenderMode::DecisionMade;
        self.rounds = 1;
    }
}

impl CongestionController for Pcc {
    fn name(&self) -> &str {
        "PCC"
    }

    fn on_packet_sent(
        &mut self,
        sent_time: Instant,
        bytes_in_flight: u64,
        packet_number: u64,
        bytes: u64,
        is_retransmittable: bool,
    ) {
        self.stats.bytes_in_flight = bytes_in_flight;
        self.stats.bytes_sent_in_total = self.stats.bytes_sent_in_total.saturating_add(bytes);

        // Start a new monitor interval if the queue is empty. Once the
        // latest rtt is available, also start one if there is no useful
        // interval yet or the current interval has run for more than
        // monitor_duration since its first packet.
        let start_new_interval = match self.interval_queue.current() {
            None => true,
            Some(tail) => {
                !self.avg_rtt.is_zero()
                    && (self.interval_queue.num_useful_intervals() == 0
                        || tail.first_packet_sent_time.map_or(true, |first| {
                            sent_time.saturating_duration_since(first) > self.monitor_duration
                        }))
            }
        };

        if start_new_interval {
            self.maybe_set_sending_rate();
            self.monitor_duration = self.compute_monitor_duration(self.sending_rate, self.avg_rtt);

            // No rtt fluctuation tolerance during Probing.
            let rtt_fluctuation_tolerance_ratio = match self.mode {
                // Use a larger tolerance in Starting to boost the rate.
                SenderMode::Starting => self.config.rtt_fluctuation_tolerance_in_starting,
                SenderMode::DecisionMade => self.config.rtt_fluctuation_tolerance_in_decision_made,
                SenderMode::Probing => 0.0,
            };

            let is_useful = self.create_useful_interval();
            self.interval_queue.enqueue_new_monitor_interval(
                self.sending_rate,
                is_useful,
                rtt_fluctuation_tolerance_ratio,
                self.avg_rtt,
                sent_time + self.monitor_duration,
            );
        }

        self.interval_queue
            .on_packet_sent(sent_time, packet_number, bytes);
    }

    fn on_congestion_event(
        &mut self,
        event_time: Instant,
        rtt: Duration,
        acked_packets: &[CongestionEventPacket],
        lost_packets: &[CongestionEventPacket],
    ) {
        for packet in acked_packets {
            self.stats.bytes_acked_in_total =
                self.stats.bytes_acked_in_total.saturating_add(packet.bytes);
            self.stats.bytes_in_flight = self.stats.bytes_in_flight.saturating_sub(packet.bytes);
        }
        for packet in lost_packets {
            self.stats.bytes_lost_in_total =
                self.stats.bytes_lost_in_total.saturating_add(packet.bytes);
            self.stats.bytes_in_flight = self.stats.bytes_in_flight.saturating_sub(packet.bytes);
        }

        if !rtt.is_zero() {
            if self.avg_rtt.is_zero() {
                self.avg_rtt = rtt;
            } else {
                self.avg_rtt = (self.avg_rtt * 3 + rtt) / 4;
            }

            if self.mode == SenderMode::Starting {
                // Directly enter Probing when the rtt inflation already
                // exceeds the tolerance ratio, so as to reduce packet
                // losses and mitigate the inflation.
                let inflated = self.interval_queue.current().map_or(false, |mi| {
                    !mi.rtt_on_monitor_start.is_zero()
                        && rtt
                            > mi.rtt_on_monitor_start
                                .mul_f64(1.0 + self.config.rtt_fluctuation_tolerance_in_starting)
                });
                if inflated {
                    trace!(
                        "{} rtt inflation in Starting, {}us",
                        self.name(),
                        rtt.as_micros()
                    );
                    self.interval_queue.on_rtt_inflation_in_starting();
                    self.enter_probing();
                    return;
                }
            }
        }

        if let Some(utility_info) =
            self.interval_queue
                .on_congestion_event(acked_packets, lost_packets, rtt, event_time)
        {
            self.on_utility_available(&utility_info);
        }
    }

    fn in_slow_start(&self) -> bool {
        self.mode == SenderMode::Starting
    }

    fn pacing_rate(&self) -> u64 {
        self.interval_queue
            .current()
            .map_or(self.sending_rate, |mi| mi.sending_rate) as u64
    }

    fn congestion_window(&self) -> u64 {
        // Use the smoothed rtt except when it is still zero, which happens
        // when the connection just starts.
        let rtt = if self.avg_rtt.is_zero() {
            self.initial_rtt
        } else {
            self.avg_rtt
        };
        (self.sending_rate * rtt.as_micros() as f64 / MICROS_PER_SECOND) as u64
    }

    fn stats(&self) -> &CongestionStats {
        &self.stats
    }
}

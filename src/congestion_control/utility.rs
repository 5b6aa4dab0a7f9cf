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

//! The PCC utility function.
//!
//! The utility of a monitor interval combines a sub-linear reward for
//! throughput with penalties for lost bytes and for rtt growth across the
//! interval. The rtt penalty is quantized so that jitter-level rtt changes
//! do not move the score.

use super::monitor_interval::MonitorInterval;

/// Number of bits per megabit.
const MEGABIT: f64 = (1024 * 1024) as f64;

/// Number of microseconds per second.
const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Alpha factor of the sending rate term.
const ALPHA: f64 = 1.0;

/// Exponent of the sending rate term.
const EXPONENT: f64 = 0.9;

/// Coefficient of the rtt penalty term.
const RTT_PENALTY_COEFFICIENT: f64 = 11330.0;

/// Loss rate up to which losses are charged at the base coefficient.
const LOSS_RATE_TOLERANCE: f64 = 0.03;

/// Coefficient of the loss term once the loss rate exceeds the tolerance.
const HIGH_LOSS_COEFFICIENT: f64 = 11.35;

/// Calculate the utility of a completed monitor interval.
///
/// Returns None if the interval is too small to have a well defined
/// utility, i.e. all of its packets carry the same sent time.
pub(crate) fn calculate_utility(interval: &MonitorInterval) -> Option<f64> {
    let (first_sent, last_sent) = match (
        interval.first_packet_sent_time,
        interval.last_packet_sent_time,
    ) {
        (Some(first), Some(last)) if last > first => (first, last),
        _ => return None,
    };

    let mi_duration_us = (last_sent - first_sent).as_micros().max(1) as f64;
    let mi_time_seconds = mi_duration_us / MICROS_PER_SECOND;

    let bytes_lost = interval.bytes_lost as f64;
    let bytes_sent = interval.bytes_sent as f64;
    let n_packets = interval.n_packets as f64;

    let sending_rate_bps = bytes_sent * 8.0 / mi_time_seconds;
    let sending_factor = ALPHA * (sending_rate_bps / MEGABIT).powf(EXPONENT);

    // Compare the rtt sums of the first and second half of the interval to
    // estimate how much queueing delay grew while it was in flight.
    let half_samples = interval.packet_rtt_samples.len() / 2;
    let mut rtt_first_half_sum = 0.0;
    let mut rtt_second_half_sum = 0.0;
    for i in 0..half_samples {
        rtt_first_half_sum += interval.packet_rtt_samples[i].sample_rtt.as_micros() as f64;
        rtt_second_half_sum += interval.packet_rtt_samples[i + half_samples]
            .sample_rtt
            .as_micros() as f64;
    }
    let rtt_sum = rtt_first_half_sum + rtt_second_half_sum;
    let latency_inflation = if rtt_sum == 0.0 {
        0.0
    } else {
        2.0 * (rtt_second_half_sum - rtt_first_half_sum) / rtt_sum
    };

    let rtt_penalty = quantize_rtt_penalty(latency_inflation);
    let rtt_contribution = RTT_PENALTY_COEFFICIENT * bytes_sent * rtt_penalty;

    let loss_rate = bytes_lost / bytes_sent;
    let loss_coefficient = if loss_rate <= LOSS_RATE_TOLERANCE {
        1.0
    } else {
        HIGH_LOSS_COEFFICIENT
    };
    let loss_contribution = n_packets * ((1.0 + loss_rate) - 1.0) * loss_coefficient;

    Some(
        sending_factor
            - (loss_contribution + rtt_contribution) * (sending_rate_bps / MEGABIT) / n_packets,
    )
}

/// Quantize the latency inflation into steps of 0.02, truncating towards
/// zero: values in `[0, 0.02)` map to `0`, `[0.02, 0.04)` to `0.02`, and so
/// on, symmetrically for negative inflation. Inflation below two percent
/// thus contributes nothing to the utility.
fn quantize_rtt_penalty(latency_inflation: f64) -> f64 {
    let hundredths = (latency_inflation * 100.0) as i64;
    let hundredths = (hundredths as f64 / 100.0 * 100.0) as i64;
    (hundredths / 2 * 2) as f64 / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::congestion_control::monitor_interval::PacketRttSample;
    use std::time::Duration;
    use std::time::Instant;

    fn build_interval(
        n_packets: u64,
        bytes_sent: u64,
        bytes_lost: u64,
        duration: Duration,
        rtts_us: &[u64],
    ) -> MonitorInterval {
        let now = Instant::now();
        let mut interval = MonitorInterval::new(
            8_000_000.0,
            true,
            0.05,
            Duration::from_millis(30),
            now + duration,
        );
        interval.first_packet_sent_time = Some(now);
        interval.last_packet_sent_time = Some(now + duration);
        interval.first_packet_number = 1;
        interval.last_packet_number = n_packets;
        interval.n_packets = n_packets;
        interval.bytes_sent = bytes_sent;
        interval.bytes_acked = bytes_sent - bytes_lost;
        interval.bytes_lost = bytes_lost;
        for (i, rtt) in rtts_us.iter().enumerate() {
            interval.packet_rtt_samples.push(PacketRttSample {
                packet_number: i as u64 + 1,
                sample_rtt: Duration::from_micros(*rtt),
            });
        }
        interval
    }

    #[test]
    fn utility_undefined_for_single_sent_time() {
        let interval = build_interval(1, 1200, 0, Duration::ZERO, &[30000]);
        assert!(calculate_utility(&interval).is_none());

        // An interval that never saw a packet has no utility either.
        let now = Instant::now();
        let empty = MonitorInterval::new(8_000_000.0, true, 0.05, Duration::from_millis(30), now);
        assert!(calculate_utility(&empty).is_none());
    }

    #[test]
    fn utility_rewards_throughput_without_penalties() {
        // Constant rtt and no loss: the utility reduces to the sub-linear
        // throughput reward.
        let interval = build_interval(10, 12000, 0, Duration::from_millis(9), &[30000; 10]);
        let utility = calculate_utility(&interval).unwrap();
        let expected = (12000.0 * 8.0 / 0.009 / MEGABIT).powf(EXPONENT);
        assert!((utility - expected).abs() < 1e-9);
    }

    #[test]
    fn utility_penalizes_rtt_inflation() {
        let flat = build_interval(10, 12000, 0, Duration::from_millis(9), &[30000; 10]);
        let inflated = build_interval(
            10,
            12000,
            0,
            Duration::from_millis(9),
            &[30000, 30000, 30000, 30000, 30000, 33000, 33000, 33000, 33000, 33000],
        );

        let utility_flat = calculate_utility(&flat).unwrap();
        let utility_inflated = calculate_utility(&inflated).unwrap();
        assert!(utility_inflated < utility_flat);
    }

    #[test]
    fn utility_loss_coefficient_boundary() {
        // At exactly three percent loss the base coefficient still applies;
        // right above it the high coefficient kicks in.
        let at_tolerance = build_interval(10, 10000, 300, Duration::from_millis(9), &[30000; 10]);
        let above_tolerance =
            build_interval(10, 10000, 400, Duration::from_millis(9), &[30000; 10]);

        let utility_at = calculate_utility(&at_tolerance).unwrap();
        let utility_above = calculate_utility(&above_tolerance).unwrap();

        let sending_rate_bps = 10000.0 * 8.0 / 0.009;
        let sending_factor = (sending_rate_bps / MEGABIT).powf(EXPONENT);
        let expected_at =
            sending_factor - 10.0 * ((1.0 + 0.03) - 1.0) * (sending_rate_bps / MEGABIT) / 10.0;
        let expected_above = sending_factor
            - 10.0 * ((1.0 + 0.04) - 1.0) * HIGH_LOSS_COEFFICIENT * (sending_rate_bps / MEGABIT)
                / 10.0;

        assert!((utility_at - expected_at).abs() < 1e-9);
        assert!((utility_above - expected_above).abs() < 1e-9);
    }

    #[test]
    fn utility_defined_when_everything_is_lost() {
        // No acks means no rtt samples; the latency term vanishes and the
        // loss term takes over.
        let interval = build_interval(5, 6000, 6000, Duration::from_millis(4), &[]);
        let utility = calculate_utility(&interval).unwrap();
        assert!(utility < 0.0);
    }

    #[test]
    fn rtt_penalty_quantization() {
        assert_eq!(quantize_rtt_penalty(0.0), 0.0);
        assert_eq!(quantize_rtt_penalty(0.0199), 0.0);
        assert_eq!(quantize_rtt_penalty(0.02), 0.02);
        assert_eq!(quantize_rtt_penalty(0.0295), 0.02);
        assert_eq!(quantize_rtt_penalty(0.045), 0.04);
        assert_eq!(quantize_rtt_penalty(1.0), 1.0);
        assert_eq!(quantize_rtt_penalty(-0.0199), 0.0);
        assert_eq!(quantize_rtt_penalty(-0.031), -0.02);
    }
}

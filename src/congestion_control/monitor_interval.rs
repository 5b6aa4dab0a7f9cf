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

//! Monitor intervals and the monitor interval queue.
//!
//! PCC partitions the sending timeline into monitor intervals, each holding
//! one candidate sending rate. The queue records which packets were sent
//! during which interval, attributes later ACK/loss feedback to the right
//! interval, and reports the utilities of a whole batch of useful intervals
//! back to the rate controller once every one of them is resolved.

use std::collections::VecDeque;
use std::time::Duration;
use std::time::Instant;

use super::utility::calculate_utility;
use super::CongestionEventPacket;

/// A packet number and the rtt sample attributed to it.
#[derive(Clone, Copy, Debug)]
pub struct PacketRttSample {
    /// Packet number of the sampled packet.
    pub packet_number: u64,

    /// Rtt sample corresponding to the packet.
    pub sample_rtt: Duration,
}

impl PacketRttSample {
    fn new(packet_number: u64, rtt: Duration) -> Self {
        Self {
            packet_number,
            sample_rtt: rtt,
        }
    }
}

/// A `(sending_rate, utility)` pair of one completed monitor interval.
#[derive(Clone, Copy, Debug, Default)]
pub struct UtilityInfo {
    /// Sending rate of the interval in bits per second.
    pub sending_rate: f64,

    /// Utility value measured for the interval.
    pub utility: f64,
}

/// MonitorInterval stores the information of one PCC monitor interval,
/// which is used to
/// - pinpoint an acked/lost packet to the corresponding interval,
/// - calculate the interval's utility value.
#[derive(Clone, Debug)]
pub struct MonitorInterval {
    /// Sending rate in bits per second.
    pub sending_rate: f64,

    /// True if the utility of this interval is used for a rate decision.
    pub is_useful: bool,

    /// The tolerable rtt fluctuation ratio.
    pub rtt_fluctuation_tolerance_ratio: f64,

    /// The planned earliest end time for this monitor interval.
    pub end_time: Instant,

    /// Sent time of the first packet.
    pub first_packet_sent_time: Option<Instant>,

    /// Sent time of the last packet.
    pub last_packet_sent_time: Option<Instant>,

    /// Packet number of the first sent packet.
    pub first_packet_number: u64,

    /// Packet number of the last sent packet.
    pub last_packet_number: u64,

    /// Number of bytes which are sent in total.
    pub bytes_sent: u64,

    /// Number of bytes which have been acked.
    pub bytes_acked: u64,

    /// Number of bytes which are considered as lost.
    pub bytes_lost: u64,

    /// Smoothed rtt when the interval was created.
    pub rtt_on_monitor_start: Duration,

    /// Smoothed rtt when all sent packets are either acked or lost.
    pub rtt_on_monitor_end: Duration,

    /// Utility value of this interval, which is calculated when all sent
    /// packets are either acked or lost.
    pub utility: f64,

    /// The number of packets sent in this monitor interval.
    pub n_packets: u64,

    /// An rtt sample for each acked packet, in ack arrival order.
    pub packet_rtt_samples: Vec<PacketRttSample>,
}

impl MonitorInterval {
    pub(crate) fn new(
        sending_rate: f64,
        is_useful: bool,
        rtt_fluctuation_tolerance_ratio: f64,
        rtt: Duration,
        end_time: Instant,
    ) -> Self {
        Self {
            sending_rate,
            is_useful,
            rtt_fluctuation_tolerance_ratio,
            end_time,
            first_packet_sent_time: None,
            last_packet_sent_time: None,
            first_packet_number: 0,
            last_packet_number: 0,
            bytes_sent: 0,
            bytes_acked: 0,
            bytes_lost: 0,
            rtt_on_monitor_start: rtt,
            rtt_on_monitor_end: rtt,
            utility: 0.0,
            n_packets: 0,
            packet_rtt_samples: Vec::new(),
        }
    }

    /// Return true if `packet_number` was sent within this interval.
    fn contains_packet(&self, packet_number: u64) -> bool {
        self.n_packets > 0
            && packet_number >= self.first_packet_number
            && packet_number <= self.last_packet_number
    }

    /// Return true if the utility of this interval is available, i.e. all
    /// its packets are either acked or lost after the planned end time.
    fn is_utility_available(&self, cur_time: Instant) -> bool {
        cur_time >= self.end_time && self.bytes_acked + self.bytes_lost == self.bytes_sent
    }
}

/// MonitorIntervalQueue contains a queue of MonitorIntervals.
///
/// New intervals are added to the tail of the queue, and only the tail
/// receives newly sent packets. Intervals are removed from the head once
/// the utilities of all useful intervals in the current batch have been
/// reported to the rate controller.
#[derive(Debug, Default)]
pub struct MonitorIntervalQueue {
    /// Queued intervals, oldest at the head.
    monitor_intervals: VecDeque<MonitorInterval>,

    /// Number of useful intervals in the queue.
    num_useful_intervals: usize,

    /// Number of useful intervals in the queue with available utilities.
    num_available_intervals: usize,
}

impl MonitorIntervalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new MonitorInterval and add it to the tail of the queue.
    pub fn enqueue_new_monitor_interval(
        &mut self,
        sending_rate: f64,
        is_useful: bool,
        rtt_fluctuation_tolerance_ratio: f64,
        rtt: Duration,
        end_time: Instant,
    ) {
        if is_useful {
            self.num_useful_intervals += 1;
        }

        self.monitor_intervals.push_back(MonitorInterval::new(
            sending_rate,
            is_useful,
            rtt_fluctuation_tolerance_ratio,
            rtt,
            end_time,
        ));
    }

    /// Called when a packet belonging to the current monitor interval is
    /// sent.
    pub fn on_packet_sent(&mut self, sent_time: Instant, packet_number: u64, bytes: u64) {
        let interval = match self.monitor_intervals.back_mut() {
            Some(interval) => interval,
            None => return,
        };

        if interval.bytes_sent == 0 {
            // This is the first packet of the interval.
            interval.first_packet_sent_time = Some(sent_time);
            interval.first_packet_number = packet_number;
        }

        interval.last_packet_sent_time = Some(sent_time);
        interval.last_packet_number = packet_number;
        interval.bytes_sent = interval.bytes_sent.saturating_add(bytes);
        interval.n_packets += 1;
    }

    /// Called when packets are acked or considered lost. Returns the
    /// utilities of the current batch of useful intervals once every one of
    /// them has its utility available.
    ///
    /// A batch containing an interval too small to be scored is dropped as
    /// a whole, with `None` returned.
    pub fn on_congestion_event(
        &mut self,
        acked_packets: &[CongestionEventPacket],
        lost_packets: &[CongestionEventPacket],
        rtt: Duration,
        event_time: Instant,
    ) -> Option<Vec<UtilityInfo>> {
        self.num_available_intervals = 0;
        if self.num_useful_intervals == 0 {
            // Skip all the received packets if no intervals are useful.
            return None;
        }

        let mut has_invalid_utility = false;
        for interval in self.monitor_intervals.iter_mut() {
            if !interval.is_useful {
                // Skips useless monitor intervals.
                continue;
            }

            if interval.is_utility_available(event_time) {
                // Skips intervals that already have available utilities.
                self.num_available_intervals += 1;
                continue;
            }

            for lost_packet in lost_packets {
                if interval.contains_packet(lost_packet.pkt_num) {
                    interval.bytes_lost = interval.bytes_lost.saturating_add(lost_packet.bytes);
                }
            }

            for acked_packet in acked_packets {
                if interval.contains_packet(acked_packet.pkt_num) {
                    interval.bytes_acked = interval.bytes_acked.saturating_add(acked_packet.bytes);
                    interval
                        .packet_rtt_samples
                        .push(PacketRttSample::new(acked_packet.pkt_num, rtt));
                }
            }

            if interval.is_utility_available(event_time) {
                interval.rtt_on_monitor_end = rtt;
                match calculate_utility(interval) {
                    Some(utility) => {
                        interval.utility = utility;
                        self.num_available_intervals += 1;
                    }
                    None => {
                        has_invalid_utility = true;
                        break;
                    }
                }
            }
        }

        if self.num_useful_intervals > self.num_available_intervals && !has_invalid_utility {
            // Keep waiting for feedback on the remaining intervals.
            return None;
        }

        let utility_info = if has_invalid_utility {
            None
        } else {
            Some(
                self.monitor_intervals
                    .iter()
                    .filter(|interval| interval.is_useful)
                    .map(|interval| UtilityInfo {
                        sending_rate: interval.sending_rate,
                        utility: interval.utility,
                    })
                    .collect(),
            )
        };

        // Remove intervals from the head of the queue until all useful
        // intervals have been removed.
        while self.num_useful_intervals > 0 {
            match self.monitor_intervals.pop_front() {
                Some(interval) => {
                    if interval.is_useful {
                        self.num_useful_intervals -= 1;
                    }
                }
                None => break,
            }
        }
        self.num_available_intervals = 0;

        utility_info
    }

    /// Called when the rtt inflation in STARTING mode exceeds the
    /// tolerance. All pending experiments are abandoned.
    pub fn on_rtt_inflation_in_starting(&mut self) {
        self.monitor_intervals.clear();
        self.num_useful_intervals = 0;
        self.num_available_intervals = 0;
    }

    /// Return the most recent MonitorInterval at the tail of the queue.
    pub fn current(&self) -> Option<&MonitorInterval> {
        self.monitor_intervals.back()
    }

    pub fn is_empty(&self) -> bool {
        self.monitor_intervals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.monitor_intervals.len()
    }

    pub fn num_useful_intervals(&self) -> usize {
        self.num_useful_intervals
    }

    pub fn num_available_intervals(&self) -> usize {
        self.num_available_intervals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack(pkt_num: u64, bytes: u64, time: Instant) -> CongestionEventPacket {
        CongestionEventPacket::new(pkt_num, bytes, time)
    }

    #[test]
    fn queue_initial_state() {
        let mut queue = MonitorIntervalQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.num_useful_intervals(), 0);
        assert_eq!(queue.num_available_intervals(), 0);
        assert!(queue.current().is_none());

        // Sending into an empty queue is a no-op.
        queue.on_packet_sent(Instant::now(), 1, 1200);
        assert!(queue.is_empty());
    }

    #[test]
    fn queue_accumulates_packets_into_tail() {
        let now = Instant::now();
        let rtt = Duration::from_millis(30);
        let mut queue = MonitorIntervalQueue::new();
        queue.enqueue_new_monitor_interval(
            8_000_000.0,
            true,
            0.05,
            rtt,
            now + Duration::from_millis(50),
        );
        assert_eq!(queue.num_useful_intervals(), 1);

        queue.on_packet_sent(now, 3, 1200);
        queue.on_packet_sent(now + Duration::from_millis(10), 4, 1200);
        queue.on_packet_sent(now + Duration::from_millis(20), 5, 1000);

        let interval = queue.current().unwrap();
        assert_eq!(interval.first_packet_number, 3);
        assert_eq!(interval.last_packet_number, 5);
        assert_eq!(interval.first_packet_sent_time, Some(now));
        assert_eq!(
            interval.last_packet_sent_time,
            Some(now + Duration::from_millis(20))
        );
        assert_eq!(interval.bytes_sent, 3400);
        assert_eq!(interval.n_packets, 3);
        assert_eq!(interval.rtt_on_monitor_start, rtt);
    }

    #[test]
    fn queue_attributes_feedback_and_delivers_batch() {
        let now = Instant::now();
        let rtt = Duration::from_millis(30);
        let mut queue = MonitorIntervalQueue::new();

        // Two useful intervals, plus a non useful tail that stays behind.
        queue.enqueue_new_monitor_interval(
            8_000_000.0,
            true,
            0.05,
            rtt,
            now + Duration::from_millis(50),
        );
        for (i, pkt_num) in (1..=3).enumerate() {
            queue.on_packet_sent(now + Duration::from_millis(10 * i as u64), pkt_num, 1200);
        }
        queue.enqueue_new_monitor_interval(
            9_000_000.0,
            true,
            0.05,
            rtt,
            now + Duration::from_millis(100),
        );
        for (i, pkt_num) in (4..=6).enumerate() {
            queue.on_packet_sent(
                now + Duration::from_millis(60 + 10 * i as u64),
                pkt_num,
                1200,
            );
        }
        queue.enqueue_new_monitor_interval(
            9_000_000.0,
            false,
            0.05,
            rtt,
            now + Duration::from_millis(150),
        );
        queue.on_packet_sent(now + Duration::from_millis(110), 7, 1200);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.num_useful_intervals(), 2);

        // Packet number ranges of queued intervals stay disjoint and
        // ordered.
        assert_eq!(queue.monitor_intervals[0].last_packet_number, 3);
        assert_eq!(queue.monitor_intervals[1].first_packet_number, 4);
        assert_eq!(queue.monitor_intervals[1].last_packet_number, 6);
        assert_eq!(queue.monitor_intervals[2].first_packet_number, 7);

        // Resolving only the first interval does not produce a batch.
        let event_time = now + Duration::from_millis(60);
        let acked: Vec<_> = (1..=3).map(|n| ack(n, 1200, event_time)).collect();
        assert!(queue
            .on_congestion_event(&acked, &[], rtt, event_time)
            .is_none());
        assert_eq!(queue.num_available_intervals(), 1);
        assert_eq!(queue.monitor_intervals[0].bytes_acked, 3600);
        assert_eq!(queue.monitor_intervals[0].packet_rtt_samples.len(), 3);

        // Resolving the second interval delivers both utilities in queue
        // order and pops everything up to the last useful interval.
        let event_time = now + Duration::from_millis(120);
        let acked: Vec<_> = (4..=6).map(|n| ack(n, 1200, event_time)).collect();
        let batch = queue
            .on_congestion_event(&acked, &[], rtt, event_time)
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].sending_rate, 8_000_000.0);
        assert_eq!(batch[1].sending_rate, 9_000_000.0);

        // All samples carried the same rtt, so there is no latency penalty
        // and no loss: the utility equals the throughput reward.
        let expected = (3600.0 * 8.0 / 0.02 / 1048576.0_f64).powf(0.9);
        assert!((batch[0].utility - expected).abs() < 1e-9);

        assert_eq!(queue.len(), 1);
        assert!(!queue.current().unwrap().is_useful);
        assert_eq!(queue.num_useful_intervals(), 0);
        assert_eq!(queue.num_available_intervals(), 0);
    }

    #[test]
    fn queue_counts_lost_bytes() {
        let now = Instant::now();
        let rtt = Duration::from_millis(30);
        let mut queue = MonitorIntervalQueue::new();
        queue.enqueue_new_monitor_interval(
            8_000_000.0,
            true,
            0.05,
            rtt,
            now + Duration::from_millis(20),
        );
        for pkt_num in 1..=4 {
            queue.on_packet_sent(now + Duration::from_millis(pkt_num), pkt_num, 1200);
        }

        let event_time = now + Duration::from_millis(40);
        let acked: Vec<_> = (1..=2).map(|n| ack(n, 1200, event_time)).collect();
        let lost: Vec<_> = (3..=4).map(|n| ack(n, 1200, event_time)).collect();
        let batch = queue
            .on_congestion_event(&acked, &lost, rtt, event_time)
            .unwrap();

        assert_eq!(batch.len(), 1);
        // Half of the interval was lost, which dominates the utility.
        assert!(batch[0].utility < 0.0);
        assert!(queue.is_empty());
    }

    #[test]
    fn queue_drops_batch_with_invalid_utility() {
        let now = Instant::now();
        let rtt = Duration::from_millis(30);
        let mut queue = MonitorIntervalQueue::new();

        // A single packet interval carries only one distinct sent time, so
        // its utility is undefined.
        queue.enqueue_new_monitor_interval(
            8_000_000.0,
            true,
            0.05,
            rtt,
            now + Duration::from_millis(20),
        );
        queue.on_packet_sent(now, 1, 1200);

        let event_time = now + Duration::from_millis(40);
        assert!(queue
            .on_congestion_event(&[ack(1, 1200, event_time)], &[], rtt, event_time)
            .is_none());

        // The batch was dropped silently and the queue was still cleaned.
        assert!(queue.is_empty());
        assert_eq!(queue.num_useful_intervals(), 0);
        assert_eq!(queue.num_available_intervals(), 0);
    }

    #[test]
    fn queue_rtt_inflation_clears_all_state() {
        let now = Instant::now();
        let rtt = Duration::from_millis(30);
        let mut queue = MonitorIntervalQueue::new();
        queue.enqueue_new_monitor_interval(
            8_000_000.0,
            true,
            0.3,
            rtt,
            now + Duration::from_millis(20),
        );
        queue.on_packet_sent(now, 1, 1200);
        queue.enqueue_new_monitor_interval(
            8_000_000.0,
            false,
            0.3,
            rtt,
            now + Duration::from_millis(40),
        );

        queue.on_rtt_inflation_in_starting();
        assert!(queue.is_empty());
        assert_eq!(queue.num_useful_intervals(), 0);
        assert_eq!(queue.num_available_intervals(), 0);
    }

    #[test]
    fn queue_waits_until_end_time() {
        let now = Instant::now();
        let rtt = Duration::from_millis(30);
        let mut queue = MonitorIntervalQueue::new();
        queue.enqueue_new_monitor_interval(
            8_000_000.0,
            true,
            0.05,
            rtt,
            now + Duration::from_millis(50),
        );
        queue.on_packet_sent(now, 1, 1200);
        queue.on_packet_sent(now + Duration::from_millis(5), 2, 1200);

        // All packets resolved, but the planned duration has not elapsed.
        let event_time = now + Duration::from_millis(10);
        let acked: Vec<_> = (1..=2).map(|n| ack(n, 1200, event_time)).collect();
        assert!(queue
            .on_congestion_event(&acked, &[], rtt, event_time)
            .is_none());
        assert_eq!(queue.num_available_intervals(), 0);
        assert_eq!(queue.len(), 1);

        // A later event completes the interval without new feedback.
        let event_time = now + Duration::from_millis(60);
        let batch = queue.on_congestion_event(&[], &[], rtt, event_time);
        assert!(batch.is_some());
        assert!(queue.is_empty());
    }
}

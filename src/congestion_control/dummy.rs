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

#![allow(unused_variables)]

use std::time::Duration;
use std::time::Instant;

use super::CongestionController;
use super::CongestionEventPacket;
use super::CongestionStats;
use crate::RecoveryConfig;

/// Dummy configurable parameters.
#[derive(Debug)]
pub struct DummyConfig {
    /// Congestion window in bytes.
    initial_cwnd: u64,

    /// Initial smoothed rtt.
    initial_rtt: Duration,
}

impl DummyConfig {
    pub fn new(initial_cwnd: u64, initial_rtt: Duration) -> Self {
        Self {
            initial_cwnd,
            initial_rtt,
        }
    }
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            initial_cwnd: 10 * crate::DEFAULT_MAX_DATAGRAM_SIZE as u64,
            initial_rtt: crate::INITIAL_RTT,
        }
    }
}

impl From<&RecoveryConfig> for DummyConfig {
    fn from(conf: &RecoveryConfig) -> Self {
        DummyConfig::new(
            conf.initial_congestion_window * conf.max_datagram_size as u64,
            conf.initial_rtt,
        )
    }
}

/// Dummy is a simple congestion controller with a static congestion window.
/// It is intended to be used for testing and experiments.
#[derive(Debug)]
pub struct Dummy {
    /// Config.
    config: DummyConfig,

    /// Congestion window in bytes.
    cwnd: u64,

    /// Congestion statistics.
    stats: CongestionStats,
}

impl Dummy {
    pub fn new(config: DummyConfig) -> Self {
        let cwnd = config.initial_cwnd;
        Self {
            config,
            cwnd,
            stats: Default::default(),
        }
    }
}

impl CongestionController for Dummy {
    fn name(&self) -> &str {
        "DUMMY"
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
    }

    fn in_slow_start(&self) -> bool {
        false
    }

    fn pacing_rate(&self) -> u64 {
        // Spread the static window over the configured rtt.
        let rtt_us = self.config.initial_rtt.as_micros().max(1) as u64;
        self.cwnd.saturating_mul(8).saturating_mul(1_000_000) / rtt_us
    }

    fn congestion_window(&self) -> u64 {
        self.cwnd
    }

    fn stats(&self) -> &CongestionStats {
        &self.stats
    }
}

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

//! PCC (Performance-oriented Congestion Control) is a sender-side rate
//! controller that selects a sending rate by measuring the utility of
//! candidate rates, instead of reacting to individual loss signals.
//!
//! The controller partitions the sending timeline into monitor intervals
//! and attributes acknowledgments, losses and round-trip delays to the
//! interval that sent the packets. Each completed interval is scored with a
//! utility function, and a mode-based search over the scores converges on
//! a locally utility-maximizing rate.
//!
//! The crate is transport agnostic. The host transport drives the
//! controller with `on_packet_sent` and `on_congestion_event` and reads
//! back `pacing_rate` and `congestion_window`. Packet transmission,
//! ACK/loss detection and rtt measurement stay on the host side.

#![allow(unused_imports)]
#![allow(dead_code)]

use std::cmp;
use std::time::Duration;

pub use crate::congestion_control::CongestionControlAlgorithm;

/// The RECOMMENDED value of the timer granularity is 1 millisecond.
/// See RFC 9002 Section 6.1
pub const TIMER_GRANULARITY: Duration = Duration::from_millis(1);

/// When no previous RTT is available, the initial RTT SHOULD be set to
/// 333 milliseconds. See RFC 9002 Section 6.2.2
const INITIAL_RTT: Duration = Duration::from_millis(333);

/// Default maximum datagram size in bytes. A conservative TCP MSS, used to
/// convert window sizes in packets into rates.
const DEFAULT_MAX_DATAGRAM_SIZE: usize = 1400;

/// Result type for congestion control operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Configurations about the congestion control engine.
#[derive(Clone, Debug)]
pub struct Config {
    /// Configurations about loss recovery and congestion control.
    pub recovery: RecoveryConfig,
}

impl Config {
    /// Create default configuration.
    ///
    /// The configuration may be customized by calling related set methods.
    pub fn new() -> Result<Self> {
        Ok(Self {
            recovery: RecoveryConfig::default(),
        })
    }

    /// Set the congestion control algorithm.
    /// The default value is Pcc.
    pub fn set_congestion_control_algorithm(&mut self, cca: CongestionControlAlgorithm) {
        self.recovery.congestion_control_algorithm = cca;
    }

    /// Set the initial congestion window in packets.
    /// The default value is 10. The window is at least 1 packet.
    pub fn set_initial_congestion_window(&mut self, packets: u64) {
        self.recovery.initial_congestion_window = cmp::max(packets, 1);
    }

    /// Set the maximum congestion window in packets.
    /// The default value is 10000. The window is at least 1 packet.
    pub fn set_max_congestion_window(&mut self, packets: u64) {
        self.recovery.max_congestion_window = cmp::max(packets, 1);
    }

    /// Set the initial RTT in microseconds. The default value is 333ms.
    ///
    /// The initial RTT determines the sending rate used before the first
    /// rtt sample is taken, so it should be changed with caution.
    pub fn set_initial_rtt(&mut self, micros: u64) {
        self.recovery.initial_rtt = cmp::max(Duration::from_micros(micros), TIMER_GRANULARITY);
    }

    /// Set the maximum datagram size in bytes.
    /// The default value is 1400.
    pub fn set_max_datagram_size(&mut self, v: usize) {
        self.recovery.max_datagram_size = cmp::max(v, 1);
    }
}

/// Configurations about loss recovery and congestion control.
#[derive(Clone, Debug)]
pub struct RecoveryConfig {
    /// The congestion control algorithm used for a path.
    pub congestion_control_algorithm: CongestionControlAlgorithm,

    /// The initial congestion window in packets.
    /// Endpoints SHOULD use an initial congestion window of ten times the
    /// maximum datagram size. See RFC 9002 Section 7.2
    pub initial_congestion_window: u64,

    /// The maximum congestion window in packets, used to cap the sending
    /// rate.
    pub max_congestion_window: u64,

    /// The initial rtt, used before a real rtt is estimated.
    pub initial_rtt: Duration,

    /// The maximum size of outgoing UDP payloads.
    pub max_datagram_size: usize,
}

impl Default for RecoveryConfig {
    fn default() -> RecoveryConfig {
        RecoveryConfig {
            congestion_control_algorithm: CongestionControlAlgorithm::Pcc,
            initial_congestion_window: 10_u64,
            max_congestion_window: 10000_u64,
            initial_rtt: INITIAL_RTT,
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[ctor::ctor]
    fn init() {
        env_logger::builder()
            .filter_level(log::LevelFilter::Trace)
            .format_timestamp_millis()
            .is_test(true)
            .init();
    }

    #[test]
    fn config_default() -> Result<()> {
        let config = Config::new()?;
        assert_eq!(
            config.recovery.congestion_control_algorithm,
            CongestionControlAlgorithm::Pcc
        );
        assert_eq!(config.recovery.initial_congestion_window, 10);
        assert_eq!(config.recovery.max_congestion_window, 10000);
        assert_eq!(config.recovery.initial_rtt, INITIAL_RTT);
        assert_eq!(config.recovery.max_datagram_size, 1400);
        Ok(())
    }

    #[test]
    fn initial_rtt() -> Result<()> {
        let mut config = Config::new()?;

        config.set_initial_rtt(0);
        assert_eq!(config.recovery.initial_rtt, TIMER_GRANULARITY);

        config.set_initial_rtt(30000);
        assert_eq!(config.recovery.initial_rtt, Duration::from_micros(30000));

        Ok(())
    }

    #[test]
    fn congestion_windows() -> Result<()> {
        let mut config = Config::new()?;

        config.set_initial_congestion_window(0);
        assert_eq!(config.recovery.initial_congestion_window, 1);

        config.set_initial_congestion_window(16);
        assert_eq!(config.recovery.initial_congestion_window, 16);

        config.set_max_congestion_window(0);
        assert_eq!(config.recovery.max_congestion_window, 1);

        config.set_max_congestion_window(20000);
        assert_eq!(config.recovery.max_congestion_window, 20000);

        Ok(())
    }

    #[test]
    fn max_datagram_size() -> Result<()> {
        let mut config = Config::new()?;

        config.set_max_datagram_size(0);
        assert_eq!(config.recovery.max_datagram_size, 1);

        config.set_max_datagram_size(1200);
        assert_eq!(config.recovery.max_datagram_size, 1200);

        Ok(())
    }
}

pub use crate::congestion_control::build_congestion_controller;
pub use crate::congestion_control::CongestionController;
pub use crate::error::Error;

#[path = "congestion_control/congestion_control.rs"]
pub mod congestion_control;

pub mod error;

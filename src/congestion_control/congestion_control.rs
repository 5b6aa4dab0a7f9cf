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

use core::str::FromStr;
use std::fmt;
use std::time::Duration;
use std::time::Instant;

use crate::Error;
use crate::RecoveryConfig;
use crate::Result;
pub use dummy::Dummy;
pub use dummy::DummyConfig;
pub use monitor_interval::MonitorInterval;
pub use monitor_interval::MonitorIntervalQueue;
pub use monitor_interval::PacketRttSample;
pub use monitor_interval::UtilityInfo;
pub use pcc::Pcc;
pub use pcc::PccConfig;

/// Available congestion control algorithms.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub enum CongestionControlAlgorithm {
    /// PCC evaluates the benefits of candidate sending rates by running
    /// online experiments (monitor intervals), comparing their measured
    /// utilities, and adjusting the sending rate towards the direction of
    /// higher utility.
    #[default]
    Pcc,

    /// Dummy is a simple congestion controller with a static congestion
    /// window. It is intended to be used for testing and experiments.
    Dummy,
}

impl FromStr for CongestionControlAlgorithm {
    type Err = Error;

    fn from_str(algor: &str) -> Result<CongestionControlAlgorithm> {
        if algor.eq_ignore_ascii_case("pcc") {
            Ok(CongestionControlAlgorithm::Pcc)
        } else if algor.eq_ignore_ascii_case("dummy") {
            Ok(CongestionControlAlgorithm::Dummy)
        } else {
            Err(Error::InvalidConfig("unknown".into()))
        }
    }
}

/// Congestion control statistics.
#[derive(Debug, Default, Clone)]
pub struct CongestionStats {
    /// Bytes in flight.
    pub bytes_in_flight: u64,

    /// Total bytes sent.
    pub bytes_sent_in_total: u64,

    /// Total bytes acked.
    pub bytes_acked_in_total: u64,

    /// Total bytes lost.
    pub bytes_lost_in_total: u64,
}

/// Metadata of a packet that was acknowledged or declared lost.
#[derive(Clone, Copy, Debug)]
pub struct CongestionEventPacket {
    /// The packet number of the sent packet.
    pub pkt_num: u64,

    /// The number of bytes acknowledged or lost.
    pub bytes: u64,

    /// The time the packet was acknowledged or declared lost.
    pub time: Instant,
}

impl CongestionEventPacket {
    pub fn new(pkt_num: u64, bytes: u64, time: Instant) -> Self {
        Self {
            pkt_num,
            bytes,
            time,
        }
    }
}

/// Congestion control interfaces shared by different algorithms.
pub trait CongestionController {
    /// Name of congestion control algorithm.
    fn name(&self) -> &str;

    /// Callback after a packet was sent out.
    fn on_packet_sent(
        &mut self,
        sent_time: Instant,
        bytes_in_flight: u64,
        packet_number: u64,
        bytes: u64,
        is_retransmittable: bool,
    );

    /// Callback for processing packets that were acknowledged or declared
    /// lost, together with the latest rtt sample. A zero `rtt` means no
    /// valid sample was taken for this event.
    fn on_congestion_event(
        &mut self,
        event_time: Instant,
        rtt: Duration,
        acked_packets: &[CongestionEventPacket],
        lost_packets: &[CongestionEventPacket],
    );

    /// Check if in slow start.
    fn in_slow_start(&self) -> bool {
        true
    }

    /// Current pacing rate in bits per second.
    fn pacing_rate(&self) -> u64;

    /// Current congestion window.
    fn congestion_window(&self) -> u64;

    /// Congestion stats.
    fn stats(&self) -> &CongestionStats;
}

impl fmt::Debug for dyn CongestionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "congestion controller.")
    }
}

/// Build a congestion controller.
pub fn build_congestion_controller(conf: &RecoveryConfig) -> Box<dyn CongestionController> {
    match conf.congestion_control_algorithm {
        CongestionControlAlgorithm::Pcc => Box::new(Pcc::new(PccConfig::from(conf))),
        CongestionControlAlgorithm::Dummy => Box::new(Dummy::new(DummyConfig::from(conf))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use crate::Result;

    #[test]
    fn congestion_control_name() {
        let cases = [
            ("pcc", Ok(CongestionControlAlgorithm::Pcc)),
            ("Pcc", Ok(CongestionControlAlgorithm::Pcc)),
            ("PCC", Ok(CongestionControlAlgorithm::Pcc)),
            ("dummy", Ok(CongestionControlAlgorithm::Dummy)),
            ("Dummy", Ok(CongestionControlAlgorithm::Dummy)),
            ("DUMMY", Ok(CongestionControlAlgorithm::Dummy)),
            ("pcc2", Err(Error::InvalidConfig("unknown".into()))),
        ];

        for (name, algor) in cases {
            assert_eq!(CongestionControlAlgorithm::from_str(name), algor);
        }
    }

    #[test]
    fn congestion_control_build_congestion_controller() -> Result<()> {
        let mut config = Config::new()?;

        let cc = build_congestion_controller(&config.recovery);
        assert_eq!(cc.name(), "PCC");
        assert_eq!(cc.in_slow_start(), true);
        assert!(cc.pacing_rate() > 0);
        assert!(cc.congestion_window() > 0);
        assert_eq!(format!("{:?}", cc), "congestion controller.");

        config.set_congestion_control_algorithm(CongestionControlAlgorithm::Dummy);
        let cc = build_congestion_controller(&config.recovery);
        assert_eq!(cc.name(), "DUMMY");
        assert_eq!(cc.in_slow_start(), false);

        Ok(())
    }
}

mod dummy;
mod monitor_interval;
mod pcc;
mod utility;

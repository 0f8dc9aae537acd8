//! Arrival records

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::epc::Epc;

/// One swimmer's finish entry
///
/// Records are created by the arrival register and never change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrivalRecord {
    /// 1-based finishing position, in registration order
    pub position: u32,

    /// Tag identifier
    pub epc: Epc,

    /// Capture instant of the accepted detection
    pub arrived_at: DateTime<Local>,

    /// Antenna of the accepted detection
    pub antenna: u8,

    /// Signal strength of the accepted detection (dBm)
    pub rssi: i16,

    /// Seconds since point zero
    ///
    /// `None` when no point zero had been established at registration time.
    pub race_time_seconds: Option<f64>,
}

impl ArrivalRecord {
    /// Race time rendered with millisecond precision, empty when absent
    pub fn race_time_display(&self) -> String {
        self.race_time_seconds
            .map(|secs| format!("{:.3}", secs))
            .unwrap_or_default()
    }
}

/// Final state of a competition session, handed to reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    /// Race start, if one was established
    pub point_zero: Option<DateTime<Local>>,

    /// Arrivals in position order
    pub arrivals: Vec<ArrivalRecord>,
}

impl SessionResult {
    pub fn len(&self) -> usize {
        self.arrivals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrivals.is_empty()
    }
}

impl fmt::Display for ArrivalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrived = self.arrived_at.format("%H:%M:%S%.3f");
        match self.race_time_seconds {
            Some(secs) => write!(
                f,
                "POSITION {}: EPC={} | Antenna={} | Arrival: {} | Race time: {:.3} s",
                self.position, self.epc, self.antenna, arrived, secs
            ),
            None => write!(
                f,
                "POSITION {}: EPC={} | Antenna={} | {}",
                self.position, self.epc, self.antenna, arrived
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(race_time_seconds: Option<f64>) -> ArrivalRecord {
        ArrivalRecord {
            position: 3,
            epc: "E28011900000000000000001".parse().unwrap(),
            arrived_at: Local.with_ymd_and_hms(2025, 1, 15, 10, 0, 5).unwrap(),
            antenna: 2,
            rssi: -57,
            race_time_seconds,
        }
    }

    #[test]
    fn test_display_with_race_time() {
        let line = record(Some(5.25)).to_string();
        assert_eq!(
            line,
            "POSITION 3: EPC=E28011900000000000000001 | Antenna=2 | Arrival: 10:00:05.000 | Race time: 5.250 s"
        );
    }

    #[test]
    fn test_display_without_race_time() {
        let line = record(None).to_string();
        assert!(line.ends_with("| 10:00:05.000"));
        assert!(!line.contains("Race time"));
    }

    #[test]
    fn test_race_time_display() {
        assert_eq!(record(Some(3.0)).race_time_display(), "3.000");
        assert_eq!(record(None).race_time_display(), "");
    }
}

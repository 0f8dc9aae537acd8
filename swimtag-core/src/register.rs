//! Arrival register for one competition session
//!
//! The register tracks:
//! - Point zero (race start, set once)
//! - EPCs already seen (first detection wins)
//! - Arrival records in finishing order

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tracing::{info, warn};

use swimtag_types::{ArrivalRecord, Epc, SessionResult, TagDetectionEvent};

use crate::error::{Error, Result};

/// Register state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterState {
    /// No point zero, no arrivals
    NotStarted,

    /// Point zero set, no arrivals yet
    Armed,

    /// At least one arrival registered
    Running,

    /// Finalized; arrivals are read-only
    Closed,
}

/// Arrival register
///
/// Deduplicates detections by EPC and assigns finishing positions.
/// Thread-safe and can be cloned cheaply (Arc internally), so several
/// readers can feed the same register.
///
/// # Examples
///
/// ```
/// use chrono::Local;
/// use swimtag_core::ArrivalRegister;
/// use swimtag_types::TagDetectionEvent;
///
/// let register = ArrivalRegister::new();
/// register.establish_point_zero().unwrap();
///
/// let event = TagDetectionEvent::new("E28011900000000000000001".parse().unwrap(), 1, -57, Local::now());
/// let record = register.register_arrival(&event).unwrap().unwrap();
/// assert_eq!(record.position, 1);
///
/// // The same tag seen again is ignored
/// assert!(register.register_arrival(&event).unwrap().is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ArrivalRegister {
    inner: Arc<Mutex<Competition>>,
}

#[derive(Debug, Default)]
struct Competition {
    /// Race start; first establishment wins
    point_zero: Option<DateTime<Local>>,

    /// EPCs already recorded
    seen: HashSet<Epc>,

    /// Append-only arrival list
    arrivals: Vec<ArrivalRecord>,

    closed: bool,
}

impl ArrivalRegister {
    /// Create an empty register
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current state
    pub fn state(&self) -> RegisterState {
        let inner = self.inner.lock();

        if inner.closed {
            RegisterState::Closed
        } else if !inner.arrivals.is_empty() {
            RegisterState::Running
        } else if inner.point_zero.is_some() {
            RegisterState::Armed
        } else {
            RegisterState::NotStarted
        }
    }

    /// Check if finalized
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Race start, if established
    pub fn point_zero(&self) -> Option<DateTime<Local>> {
        self.inner.lock().point_zero
    }

    /// Set point zero to now
    ///
    /// See [`ArrivalRegister::establish_point_zero_at`].
    pub fn establish_point_zero(&self) -> Result<DateTime<Local>> {
        self.establish_point_zero_at(Local::now())
    }

    /// Set point zero to `instant`
    ///
    /// The first call wins; later calls are logged and leave the start
    /// unchanged. Returns the point zero in effect. Arrivals registered
    /// before this call keep no race time.
    pub fn establish_point_zero_at(&self, instant: DateTime<Local>) -> Result<DateTime<Local>> {
        let mut inner = self.inner.lock();

        if inner.closed {
            return Err(Error::SessionClosed);
        }

        match inner.point_zero {
            Some(existing) => {
                warn!(
                    point_zero = %existing.format("%H:%M:%S%.3f"),
                    ignored = %instant.format("%H:%M:%S%.3f"),
                    "Point zero already set, ignoring"
                );
                Ok(existing)
            }
            None => {
                inner.point_zero = Some(instant);
                info!(point_zero = %instant.format("%H:%M:%S%.3f"), "Point zero set");
                Ok(instant)
            }
        }
    }

    /// Register a detection
    ///
    /// Returns the new record, or `None` when the EPC was already recorded.
    /// The race time is set only when point zero is known and the tag was
    /// captured at or after it.
    ///
    /// # Errors
    ///
    /// [`Error::SessionClosed`] after [`ArrivalRegister::finalize`].
    pub fn register_arrival(&self, event: &TagDetectionEvent) -> Result<Option<ArrivalRecord>> {
        let mut inner = self.inner.lock();

        if inner.closed {
            return Err(Error::SessionClosed);
        }

        if inner.seen.contains(&event.epc) {
            return Ok(None);
        }

        // A tag seen before the start carries no race time, even when it is
        // registered after point zero was set.
        let race_time_seconds = inner
            .point_zero
            .filter(|start| event.captured_at >= *start)
            .map(|start| {
                let elapsed = event.captured_at - start;
                match elapsed.num_microseconds() {
                    Some(us) => us as f64 / 1_000_000.0,
                    None => elapsed.num_milliseconds() as f64 / 1_000.0,
                }
            });

        let record = ArrivalRecord {
            position: inner.arrivals.len() as u32 + 1,
            epc: event.epc.clone(),
            arrived_at: event.captured_at,
            antenna: event.antenna,
            rssi: event.rssi,
            race_time_seconds,
        };

        inner.seen.insert(event.epc.clone());
        inner.arrivals.push(record.clone());

        info!("{}", record);

        Ok(Some(record))
    }

    /// Close the session and return its result
    ///
    /// Calling it again returns the same result.
    pub fn finalize(&self) -> SessionResult {
        let mut inner = self.inner.lock();

        if !inner.closed {
            inner.closed = true;
            info!(arrivals = inner.arrivals.len(), "Competition session closed");
        }

        SessionResult {
            point_zero: inner.point_zero,
            arrivals: inner.arrivals.clone(),
        }
    }

    /// Snapshot of the arrivals so far
    pub fn arrivals(&self) -> Vec<ArrivalRecord> {
        self.inner.lock().arrivals.clone()
    }

    /// Number of arrivals
    pub fn len(&self) -> usize {
        self.inner.lock().arrivals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if an EPC already has an arrival
    pub fn is_registered(&self, epc: &Epc) -> bool {
        self.inner.lock().seen.contains(epc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn start() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap()
    }

    fn epc(fill: char) -> Epc {
        fill.to_string().repeat(24).parse().unwrap()
    }

    fn event(fill: char, offset_ms: i64) -> TagDetectionEvent {
        TagDetectionEvent::new(epc(fill), 1, -60, start() + Duration::milliseconds(offset_ms))
    }

    #[test]
    fn test_register_new() {
        let register = ArrivalRegister::new();
        assert_eq!(register.state(), RegisterState::NotStarted);
        assert!(register.point_zero().is_none());
        assert!(register.is_empty());
    }

    #[test]
    fn test_duplicate_is_discarded() {
        let register = ArrivalRegister::new();

        register.register_arrival(&event('A', 0)).unwrap();
        register.register_arrival(&event('B', 10)).unwrap();
        let dup = register.register_arrival(&event('A', 20)).unwrap();

        assert!(dup.is_none());
        let arrivals = register.arrivals();
        assert_eq!(arrivals.len(), 2);
        assert_eq!((arrivals[0].epc.clone(), arrivals[0].position), (epc('A'), 1));
        assert_eq!((arrivals[1].epc.clone(), arrivals[1].position), (epc('B'), 2));
    }

    #[test]
    fn test_first_detection_wins() {
        let register = ArrivalRegister::new();
        for offset in [5, 50, 500] {
            register.register_arrival(&event('C', offset)).unwrap();
        }

        let arrivals = register.arrivals();
        assert_eq!(arrivals.len(), 1);
        assert_eq!(arrivals[0].arrived_at, start() + Duration::milliseconds(5));
    }

    #[test]
    fn test_positions_are_contiguous() {
        let register = ArrivalRegister::new();
        for (i, fill) in "ABCDEF".chars().enumerate() {
            register.register_arrival(&event(fill, i as i64)).unwrap();
            register.register_arrival(&event('A', 100)).unwrap();
        }

        let positions: Vec<u32> = register.finalize().arrivals.iter().map(|a| a.position).collect();
        assert_eq!(positions, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_race_time_with_point_zero() {
        let register = ArrivalRegister::new();
        register.establish_point_zero_at(start()).unwrap();
        assert_eq!(register.state(), RegisterState::Armed);

        let record = register.register_arrival(&event('A', 3_000)).unwrap().unwrap();
        assert_eq!(record.race_time_seconds, Some(3.0));
        assert_eq!(register.state(), RegisterState::Running);
    }

    #[test]
    fn test_race_time_absent_without_point_zero() {
        let register = ArrivalRegister::new();
        let record = register.register_arrival(&event('A', 0)).unwrap().unwrap();
        assert_eq!(record.race_time_seconds, None);
    }

    #[test]
    fn test_late_point_zero_is_not_retroactive() {
        let register = ArrivalRegister::new();
        for (i, fill) in ['A', 'B', 'C'].into_iter().enumerate() {
            register.register_arrival(&event(fill, i as i64)).unwrap();
        }

        register.establish_point_zero_at(start() + Duration::seconds(1)).unwrap();
        register.register_arrival(&event('D', 2_500)).unwrap();

        let result = register.finalize();
        assert!(result.arrivals[..3].iter().all(|a| a.race_time_seconds.is_none()));
        assert_eq!(result.arrivals[3].race_time_seconds, Some(1.5));
    }

    #[test]
    fn test_capture_before_point_zero_has_no_race_time() {
        let register = ArrivalRegister::new();
        register.establish_point_zero_at(start() + Duration::seconds(5)).unwrap();

        let early = register.register_arrival(&event('A', 4_990)).unwrap().unwrap();
        assert_eq!(early.race_time_seconds, None);

        let on_time = register.register_arrival(&event('B', 5_000)).unwrap().unwrap();
        assert_eq!(on_time.race_time_seconds, Some(0.0));
        assert_eq!(on_time.position, 2);
    }

    #[test]
    fn test_first_point_zero_wins() {
        let register = ArrivalRegister::new();
        let first = register.establish_point_zero_at(start()).unwrap();
        let second = register
            .establish_point_zero_at(start() + Duration::seconds(30))
            .unwrap();

        assert_eq!(first, start());
        assert_eq!(second, start());
        assert_eq!(register.point_zero(), Some(start()));
    }

    #[test]
    fn test_identical_timestamps_keep_processing_order() {
        let register = ArrivalRegister::new();
        register.register_arrival(&event('B', 0)).unwrap();
        register.register_arrival(&event('A', 0)).unwrap();

        let arrivals = register.arrivals();
        assert_eq!(arrivals[0].epc, epc('B'));
        assert_eq!(arrivals[1].epc, epc('A'));
    }

    #[test]
    fn test_finalize_closes() {
        let register = ArrivalRegister::new();
        register.establish_point_zero_at(start()).unwrap();
        register.register_arrival(&event('A', 100)).unwrap();

        let result = register.finalize();
        assert_eq!(register.state(), RegisterState::Closed);
        assert_eq!(result.point_zero, Some(start()));
        assert_eq!(result.len(), 1);

        assert!(matches!(register.register_arrival(&event('B', 0)), Err(Error::SessionClosed)));
        assert!(matches!(register.establish_point_zero(), Err(Error::SessionClosed)));

        // Idempotent
        assert_eq!(register.finalize(), result);
    }

    #[test]
    fn test_register_clone_shares_state() {
        let register1 = ArrivalRegister::new();
        let register2 = register1.clone();

        register1.register_arrival(&event('A', 0)).unwrap();
        assert!(register2.is_registered(&epc('A')));
        assert!(register2.register_arrival(&event('A', 1)).unwrap().is_none());
    }

    #[test]
    fn test_concurrent_registration() {
        let register = ArrivalRegister::new();
        let fills: Vec<char> = "12345678".chars().collect();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let register = register.clone();
                let fills = &fills;
                scope.spawn(move || {
                    for (i, fill) in fills.iter().enumerate() {
                        register.register_arrival(&event(*fill, i as i64)).unwrap();
                    }
                });
            }
        });

        let result = register.finalize();
        assert_eq!(result.len(), fills.len());
        let positions: Vec<u32> = result.arrivals.iter().map(|a| a.position).collect();
        assert_eq!(positions, (1..=fills.len() as u32).collect::<Vec<_>>());
    }
}

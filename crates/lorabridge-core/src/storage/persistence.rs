//! When to write a CSV row, and to which file
//!
//! A row is written only while storage is available, the current reading is
//! valid and the wall clock is synchronised. Writes are triggered right after
//! an accepted change, and as a heartbeat once `interval_ms` has passed
//! without any write. Failures are logged and forgotten: the next trigger
//! starts again from the rollover check.

use log::{debug, error, info, warn};

use super::{CSV_HEADER, LINE_ENDING, LogDestination, LogStorage, format_row};
use crate::clock::{WallClock, format_timestamp, local_datetime};
use crate::reading::{CurrentReading, UptimeMs};

/// Mutable persistence bookkeeping, owned by the gateway context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PersistenceState {
    /// Log file rows currently go to. `None` until the clock has been synchronised.
    pub destination: Option<LogDestination>,
    /// Uptime of the last successful write
    pub last_write: Option<UptimeMs>,
    /// Uptime of the last heartbeat attempt, successful or not
    pub last_heartbeat: Option<UptimeMs>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistTrigger {
    /// An accepted update changed the reading
    Changed,
    /// The periodic interval elapsed
    Heartbeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    StorageUnavailable,
    NoValidReading,
    TimeNotSynchronized,
    /// Heartbeat interval has not elapsed yet
    NotDue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistFailure {
    /// Checking or initialising the day's log failed
    Rollover,
    /// Appending the row failed
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Written(LogDestination),
    Skipped(SkipReason),
    Failed(PersistFailure),
}

impl PersistOutcome {
    /// Whether storage was actually touched
    pub fn attempted(&self) -> bool {
        !matches!(self, Self::Skipped(_))
    }
}

/// Precondition checks, daily rollover and row writing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceGate {
    interval_ms: u64,
    utc_offset_secs: i32,
}

impl PersistenceGate {
    pub fn new(interval_ms: u64, utc_offset_secs: i32) -> Self {
        Self {
            interval_ms,
            utc_offset_secs,
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Whether a heartbeat write is due at `now`
    pub fn heartbeat_due(&self, state: &PersistenceState, now: UptimeMs) -> bool {
        let since = state.last_heartbeat.max(state.last_write).unwrap_or(0);
        now.saturating_sub(since) >= self.interval_ms
    }

    /// Make `state.destination` point at `today`, creating the file with a header if needed.
    ///
    /// The switch is only committed once the new file is known to be usable, so
    /// a failed rollover leaves the previous destination in place for the
    /// next attempt to retry.
    pub fn ensure_destination<S: LogStorage>(
        &self,
        state: &mut PersistenceState,
        storage: &mut S,
        today: LogDestination,
    ) -> Result<(), S::Error> {
        if state.destination == Some(today) {
            return Ok(());
        }

        if !storage.exists(&today)? {
            let mut header = heapless::String::<64>::new();
            let _ = header.push_str(CSV_HEADER);
            let _ = header.push_str(LINE_ENDING);
            storage.append(&today, header.as_bytes())?;
            info!(" Created log file {}", today);
        }

        match state.destination {
            Some(previous) => info!(" Log rollover {} -> {}", previous, today),
            None => info!(" Logging to {}", today),
        }
        state.destination = Some(today);
        Ok(())
    }

    /// Destination for the local date at `epoch_secs`
    pub fn destination_for(&self, epoch_secs: u64) -> Option<LogDestination> {
        LogDestination::for_epoch(epoch_secs, self.utc_offset_secs)
    }

    /// Run the gate for one trigger and write a row when every condition holds
    pub fn persist<S: LogStorage, C: WallClock>(
        &self,
        state: &mut PersistenceState,
        reading: &CurrentReading,
        storage: &mut S,
        clock: &C,
        trigger: PersistTrigger,
        now: UptimeMs,
    ) -> PersistOutcome {
        if !storage.is_available() {
            return PersistOutcome::Skipped(SkipReason::StorageUnavailable);
        }
        if !reading.valid {
            return PersistOutcome::Skipped(SkipReason::NoValidReading);
        }
        let Some(epoch_secs) = clock.synced_epoch_secs() else {
            if trigger == PersistTrigger::Changed {
                info!(" Reading not saved: time not synchronised");
            }
            return PersistOutcome::Skipped(SkipReason::TimeNotSynchronized);
        };
        if trigger == PersistTrigger::Heartbeat {
            if !self.heartbeat_due(state, now) {
                return PersistOutcome::Skipped(SkipReason::NotDue);
            }
            state.last_heartbeat = Some(now);
        }

        let Some(local) = local_datetime(epoch_secs, self.utc_offset_secs) else {
            warn!(" Clock value {} has no calendar date", epoch_secs);
            return PersistOutcome::Failed(PersistFailure::Rollover);
        };
        let destination = LogDestination::new(local.date());

        if let Err(e) = self.ensure_destination(state, storage, destination) {
            error!(" Failed to prepare log file {}: {:?}", destination, e);
            return PersistOutcome::Failed(PersistFailure::Rollover);
        }

        let timestamp = format_timestamp(&local);
        let row = format_row(&timestamp, reading);

        if let Err(e) = storage.append(&destination, row.as_bytes()) {
            error!(" Failed to write reading to {}: {:?}", destination, e);
            return PersistOutcome::Failed(PersistFailure::Append);
        }

        state.last_write = Some(now);
        debug!(" Saved {:.1}°C at {} ({:?})", reading.temperature, timestamp, trigger);
        PersistOutcome::Written(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;
    use alloc::vec::Vec;
    use core::cell::Cell;

    #[derive(Default)]
    struct MemLog {
        files: Vec<(LogDestination, Vec<u8>)>,
        available: bool,
        fail_appends: bool,
        appends: Cell<usize>,
    }

    impl MemLog {
        fn new() -> Self {
            Self {
                available: true,
                ..Default::default()
            }
        }

        fn contents(&self, dest: &LogDestination) -> String {
            self.files
                .iter()
                .find(|(d, _)| d == dest)
                .map(|(_, data)| String::from_utf8_lossy(data).into_owned())
                .unwrap_or_default()
        }
    }

    impl LogStorage for MemLog {
        type Error = &'static str;

        fn is_available(&self) -> bool {
            self.available
        }

        fn exists(&self, dest: &LogDestination) -> Result<bool, Self::Error> {
            Ok(self.files.iter().any(|(d, _)| d == dest))
        }

        fn append(&mut self, dest: &LogDestination, data: &[u8]) -> Result<(), Self::Error> {
            self.appends.set(self.appends.get() + 1);
            if self.fail_appends {
                return Err("write protected");
            }
            match self.files.iter_mut().find(|(d, _)| d == dest) {
                Some((_, file)) => file.extend_from_slice(data),
                None => self.files.push((*dest, data.to_vec())),
            }
            Ok(())
        }

        fn read_at(&self, _: &LogDestination, _: u64, _: &mut [u8]) -> Result<usize, Self::Error> {
            Ok(0)
        }

        fn find_any_log(&self) -> Result<Option<LogDestination>, Self::Error> {
            Ok(self.files.first().map(|(d, _)| *d))
        }
    }

    struct Clock(Option<u64>);

    impl WallClock for Clock {
        fn is_synchronized(&self) -> bool {
            self.0.is_some()
        }

        fn epoch_secs(&self) -> Option<u64> {
            self.0
        }
    }

    // 2024-03-10 12:45:30 at UTC-5
    const EPOCH: u64 = 1_710_092_730;
    const OFFSET: i32 = -5 * 3600;

    fn valid_reading() -> CurrentReading {
        CurrentReading {
            temperature: 21.5,
            humidity: 48.0,
            lux: 320.0,
            soil_moisture: 33,
            last_update: 0,
            valid: true,
        }
    }

    #[test]
    fn test_first_write_creates_header() {
        let gate = PersistenceGate::new(60_000, OFFSET);
        let mut state = PersistenceState::default();
        let mut log = MemLog::new();

        let outcome = gate.persist(
            &mut state,
            &valid_reading(),
            &mut log,
            &Clock(Some(EPOCH)),
            PersistTrigger::Changed,
            1_000,
        );

        let dest = LogDestination::for_epoch(EPOCH, OFFSET).unwrap();
        assert_eq!(outcome, PersistOutcome::Written(dest));
        assert_eq!(
            log.contents(&dest),
            "timestamp,temperature,humidity,soil_moisture,lux\r\n\
             2024-03-10 12:45:30,21.50,48.00,33,320.0\r\n"
        );
        assert_eq!(state.destination, Some(dest));
        assert_eq!(state.last_write, Some(1_000));
    }

    #[test]
    fn test_gate_conditions() {
        let gate = PersistenceGate::new(60_000, OFFSET);
        let mut state = PersistenceState::default();
        let mut log = MemLog::new();

        let unsynced = gate.persist(
            &mut state,
            &valid_reading(),
            &mut log,
            &Clock(None),
            PersistTrigger::Changed,
            0,
        );
        assert_eq!(unsynced, PersistOutcome::Skipped(SkipReason::TimeNotSynchronized));

        let invalid = gate.persist(
            &mut state,
            &CurrentReading::new(),
            &mut log,
            &Clock(Some(EPOCH)),
            PersistTrigger::Changed,
            0,
        );
        assert_eq!(invalid, PersistOutcome::Skipped(SkipReason::NoValidReading));

        log.available = false;
        let unavailable = gate.persist(
            &mut state,
            &valid_reading(),
            &mut log,
            &Clock(Some(EPOCH)),
            PersistTrigger::Changed,
            0,
        );
        assert_eq!(unavailable, PersistOutcome::Skipped(SkipReason::StorageUnavailable));
        assert_eq!(log.appends.get(), 0, "skipped triggers must not touch storage");
    }

    #[test]
    fn test_heartbeat_interval() {
        let gate = PersistenceGate::new(60_000, OFFSET);
        let mut state = PersistenceState::default();
        let mut log = MemLog::new();
        let clock = Clock(Some(EPOCH));
        let reading = valid_reading();

        let mut beat = |state: &mut PersistenceState, now| {
            gate.persist(state, &reading, &mut log, &clock, PersistTrigger::Heartbeat, now)
        };

        assert_eq!(beat(&mut state, 59_999), PersistOutcome::Skipped(SkipReason::NotDue));
        assert!(beat(&mut state, 60_000).attempted());
        assert_eq!(beat(&mut state, 100_000), PersistOutcome::Skipped(SkipReason::NotDue));
        assert!(beat(&mut state, 120_000).attempted());
    }

    #[test]
    fn test_change_write_postpones_heartbeat() {
        let gate = PersistenceGate::new(60_000, OFFSET);
        let state = PersistenceState {
            last_write: Some(50_000),
            ..Default::default()
        };
        assert!(!gate.heartbeat_due(&state, 100_000));
        assert!(gate.heartbeat_due(&state, 110_000));
    }

    #[test]
    fn test_failed_rollover_keeps_previous_destination() {
        let gate = PersistenceGate::new(60_000, OFFSET);
        let yesterday = LogDestination::for_epoch(EPOCH - 86_400, OFFSET).unwrap();
        let mut state = PersistenceState {
            destination: Some(yesterday),
            ..Default::default()
        };
        let mut log = MemLog::new();
        log.fail_appends = true;

        let outcome = gate.persist(
            &mut state,
            &valid_reading(),
            &mut log,
            &Clock(Some(EPOCH)),
            PersistTrigger::Changed,
            5_000,
        );
        assert_eq!(outcome, PersistOutcome::Failed(PersistFailure::Rollover));
        assert_eq!(state.destination, Some(yesterday), "switch must not be committed");
        assert_eq!(state.last_write, None);

        log.fail_appends = false;
        let retry = gate.persist(
            &mut state,
            &valid_reading(),
            &mut log,
            &Clock(Some(EPOCH)),
            PersistTrigger::Changed,
            6_000,
        );
        let today = LogDestination::for_epoch(EPOCH, OFFSET).unwrap();
        assert_eq!(retry, PersistOutcome::Written(today));
        assert!(log.contents(&today).starts_with(CSV_HEADER));
    }

    #[test]
    fn test_existing_file_gets_no_second_header() {
        let gate = PersistenceGate::new(60_000, OFFSET);
        let today = LogDestination::for_epoch(EPOCH, OFFSET).unwrap();
        let mut log = MemLog::new();
        log.files.push((today, b"timestamp,temperature,humidity,soil_moisture,lux\r\n".to_vec()));

        let mut state = PersistenceState::default();
        gate.ensure_destination(&mut state, &mut log, today).unwrap();
        assert_eq!(log.appends.get(), 0);
        assert_eq!(state.destination, Some(today));

        // Idempotent within the same day
        gate.ensure_destination(&mut state, &mut log, today).unwrap();
        assert_eq!(log.appends.get(), 0);
    }
}

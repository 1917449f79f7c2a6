//! Update orchestrator
//!
//! [`Gateway`] owns every piece of mutable pipeline state in a single
//! [`GatewayContext`] together with its collaborators, and is driven from
//! exactly two entry points:
//!
//! - [`Gateway::handle_line`] for each line received from the radio
//! - [`Gateway::tick`] on the periodic cadence
//!
//! Both run to completion before returning, so callers that share the gateway
//! between tasks only need to hold a lock around each call.

use core::fmt::Debug;

use embedded_hal::digital::OutputPin;
use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use crate::change::ChangeDetector;
use crate::clock::WallClock;
use crate::config::GatewayConfig;
use crate::history::History;
use crate::indicator::{Indicator, IndicatorState, IndicatorTransition};
use crate::radio::{FrameError, PayloadError, parse_frame, parse_payload};
use crate::ranges::{RangeConfig, RangeError};
use crate::reading::{CurrentReading, SensorUpdate, UptimeMs};
use crate::settings::SettingsStore;
use crate::storage::{LogStorage, PersistOutcome, PersistTrigger, PersistenceGate, PersistenceState};

/// All mutable state of the pipeline
#[derive(Debug, Clone)]
pub struct GatewayContext {
    pub reading: CurrentReading,
    pub history: History,
    pub ranges: RangeConfig,
    pub indicator: IndicatorState,
    pub persistence: PersistenceState,
}

impl GatewayContext {
    pub fn new(ranges: RangeConfig) -> Self {
        Self {
            reading: CurrentReading::new(),
            history: History::new(),
            ranges,
            indicator: IndicatorState::Off,
            persistence: PersistenceState::default(),
        }
    }
}

/// Why an inbound line did not reach the change detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Module reply such as `+OK`, not sensor data
    Diagnostic,
    Frame(FrameError),
    Payload(PayloadError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Discarded(DiscardReason),
    /// Parsed fine but identical to the current reading
    Unchanged,
    Accepted {
        indicator: Option<IndicatorTransition>,
        persisted: PersistOutcome,
    },
}

impl UpdateOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// What one periodic tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Log destination prepared because the clock just became synchronised
    pub rollover: Option<bool>,
    pub indicator: Option<IndicatorTransition>,
    pub heartbeat: PersistOutcome,
}

#[derive(Error, Debug)]
pub enum RangeUpdateError<E: Debug> {
    #[error("{0}")]
    Invalid(RangeError),
    /// Applied in memory, but could not be saved
    #[error("ranges applied but not saved: {0:?}")]
    Store(E),
}

pub struct Gateway<P, S, C, K>
where
    P: OutputPin,
    S: LogStorage,
    C: WallClock,
    K: SettingsStore,
{
    context: GatewayContext,
    detector: ChangeDetector,
    indicator: Indicator<P>,
    gate: PersistenceGate,
    storage: S,
    clock: C,
    settings: K,
    config: GatewayConfig,
    clock_was_synced: bool,
}

impl<P, S, C, K> Gateway<P, S, C, K>
where
    P: OutputPin,
    S: LogStorage,
    C: WallClock,
    K: SettingsStore,
{
    /// Build the gateway, loading range bounds from `settings`.
    ///
    /// A settings read failure is logged and the default bounds are used.
    pub fn new(config: GatewayConfig, pin: P, storage: S, clock: C, settings: K) -> Self {
        let ranges = RangeConfig::load(&settings).unwrap_or_else(|e| {
            error!(" Failed to load ranges, using defaults: {:?}", e);
            RangeConfig::default()
        });

        let mut indicator = Indicator::new(pin, config.indicator_hold_ms);
        indicator.sync_pin(&IndicatorState::Off);

        Self {
            context: GatewayContext::new(ranges),
            detector: ChangeDetector::new(config.change_epsilon),
            indicator,
            gate: PersistenceGate::new(config.persist_interval_ms, config.utc_offset_secs),
            storage,
            clock,
            settings,
            config,
            clock_was_synced: false,
        }
    }

    /// Process one line from the radio UART
    pub fn handle_line(&mut self, line: &str, now: UptimeMs) -> UpdateOutcome {
        let frame = match parse_frame(line) {
            Ok(frame) => frame,
            Err(FrameError::NotData) => {
                debug!(" LoRa (no data): {}", line);
                return UpdateOutcome::Discarded(DiscardReason::Diagnostic);
            }
            Err(e) => {
                warn!(" LoRa frame discarded ({}): {}", e, line);
                return UpdateOutcome::Discarded(DiscardReason::Frame(e));
            }
        };

        debug!(
            " LoRa data from {:?} (rssi {:?}, snr {:?}): {}",
            frame.address, frame.rssi, frame.snr, frame.payload
        );
        self.handle_payload(frame.payload, now)
    }

    /// Process a bare sensor payload, without the `+RCV` envelope
    pub fn handle_payload(&mut self, payload: &str, now: UptimeMs) -> UpdateOutcome {
        match parse_payload(payload) {
            Ok(partial) => {
                let update = partial.resolve(self.config.invalid_token_policy);
                self.apply_update(&update, now)
            }
            Err(e) => {
                warn!(" LoRa payload discarded ({}): {}", e, payload);
                UpdateOutcome::Discarded(DiscardReason::Payload(e))
            }
        }
    }

    /// Run change detection and, when the reading changed, history, indicator and persistence
    pub fn apply_update(&mut self, update: &SensorUpdate, now: UptimeMs) -> UpdateOutcome {
        let ctx = &mut self.context;
        if !self.detector.apply(&mut ctx.reading, update, now) {
            debug!(" LoRa data received but nothing changed");
            return UpdateOutcome::Unchanged;
        }

        info!(" Received {}", ctx.reading);
        ctx.history.append(ctx.reading.snapshot(now));

        let indicator = self
            .indicator
            .evaluate(&mut ctx.indicator, &ctx.reading, &ctx.ranges, now);

        let persisted = self.gate.persist(
            &mut ctx.persistence,
            &ctx.reading,
            &mut self.storage,
            &self.clock,
            PersistTrigger::Changed,
            now,
        );

        UpdateOutcome::Accepted {
            indicator,
            persisted,
        }
    }

    /// Periodic work: first-sync rollover, indicator expiry and heartbeat write
    pub fn tick(&mut self, now: UptimeMs) -> TickReport {
        let rollover = self.rollover_on_first_sync();

        let ctx = &mut self.context;
        let indicator = self
            .indicator
            .evaluate(&mut ctx.indicator, &ctx.reading, &ctx.ranges, now);

        let heartbeat = self.gate.persist(
            &mut ctx.persistence,
            &ctx.reading,
            &mut self.storage,
            &self.clock,
            PersistTrigger::Heartbeat,
            now,
        );

        TickReport {
            rollover,
            indicator,
            heartbeat,
        }
    }

    /// Prepare today's log as soon as the clock is synchronised rather than at the first write
    fn rollover_on_first_sync(&mut self) -> Option<bool> {
        let synced = self.clock.is_synchronized();
        let just_synced = synced && !self.clock_was_synced;
        self.clock_was_synced = synced;

        if !just_synced || !self.storage.is_available() {
            return None;
        }

        let destination = self
            .clock
            .epoch_secs()
            .and_then(|secs| self.gate.destination_for(secs))?;
        let result =
            self.gate
                .ensure_destination(&mut self.context.persistence, &mut self.storage, destination);
        if let Err(e) = &result {
            warn!(" Could not prepare log file {} after time sync: {:?}", destination, e);
        }
        Some(result.is_ok())
    }

    /// Validate and apply new range bounds, then save them.
    ///
    /// Invalid bounds leave the current ones untouched.
    pub fn update_ranges(&mut self, ranges: RangeConfig) -> Result<(), RangeUpdateError<K::Error>> {
        ranges.validate().map_err(RangeUpdateError::Invalid)?;

        self.context.ranges = ranges;
        info!(" Ranges updated: {}", ranges);

        ranges.save(&mut self.settings).map_err(|e| {
            error!(" Failed to save ranges: {:?}", e);
            RangeUpdateError::Store(e)
        })
    }

    pub fn context(&self) -> &GatewayContext {
        &self.context
    }

    pub fn reading(&self) -> &CurrentReading {
        &self.context.reading
    }

    pub fn history(&self) -> &History {
        &self.context.history
    }

    pub fn ranges(&self) -> &RangeConfig {
        &self.context.ranges
    }

    pub fn indicator_active(&self) -> bool {
        self.context.indicator.is_on()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn settings(&self) -> &K {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut K {
        &mut self.settings
    }
}

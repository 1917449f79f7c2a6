//! Desktop simulator for the LoRaBridge gateway.
//!
//! Drives the same `lorabridge-core` pipeline as the firmware, with CSV logs
//! written to a host directory, the system clock and a console LED. Commands
//! are read from the file named on the command line, or from stdin.
//!
//! # Commands
//!
//! | Command          | Action                                            |
//! |------------------|---------------------------------------------------|
//! | `+RCV=...`       | Line received from the radio module               |
//! | `wait <ms>`      | Advance uptime, running the periodic tick         |
//! | `sync`/`unsync`  | Mark the wall clock synchronised or not           |
//! | `storage on/off` | Mount or unmount log storage                      |
//! | `status`         | Print `/api/data`                                 |
//! | `history`        | Print `/api/history`                              |
//! | `ranges [json]`  | Print, or replace, the indicator ranges           |
//! | `sd-info`        | Print `/api/sd-info`                              |
//! | `download`       | Print the log `/api/download-data` would send     |
//!
//! `RUST_LOG` controls log verbosity. Settings come from `simulator.toml`, or
//! the file named by `LORABRIDGE_SIM_CONFIG`.

mod config;
mod hardware;
mod script;
mod settings;
mod storage;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, bail};
use log::{debug, info, warn};
use lorabridge_core::api::{
    StatusReport, StorageReport, download_source, handle_range_update, history_json, to_json,
};
use lorabridge_core::config::RadioConfig;
use lorabridge_core::radio::{LineBuffer, init_commands};
use lorabridge_core::storage::LogStorage;
use lorabridge_core::{Gateway, UptimeMs};

use config::{DEFAULT_CONFIG_PATH, SimulatorConfig};
use hardware::{ConsoleLed, SystemClock};
use script::Command;
use settings::FileSettings;
use storage::DirStorage;

/// Longest radio line accepted, matching the firmware UART buffer
const RADIO_LINE_CAPACITY: usize = 256;

type SimGateway = Gateway<ConsoleLed, DirStorage, SystemClock, FileSettings>;

struct Simulator {
    gateway: SimGateway,
    radio: LineBuffer<RADIO_LINE_CAPACITY>,
    now: UptimeMs,
    tick_ms: u64,
}

impl Simulator {
    fn new(config: &SimulatorConfig) -> Self {
        let storage = if config.storage_missing {
            DirStorage::missing(&config.data_dir)
        } else {
            DirStorage::open(&config.data_dir)
        };
        let clock = SystemClock::new(config.start_synced);
        let settings = FileSettings::open(&config.settings_file);

        for command in init_commands(&RadioConfig::default()) {
            debug!(" radio init: {} (settle {} ms)", command.text, command.settle_ms);
        }

        Self {
            gateway: Gateway::new(config.gateway, ConsoleLed::default(), storage, clock, settings),
            radio: LineBuffer::new(),
            now: 0,
            tick_ms: config.gateway.tick_interval_ms.max(1),
        }
    }

    fn run(&mut self, line: &str) -> anyhow::Result<()> {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => bail!("{:?}: {}", e, line.trim()),
        };

        match command {
            Command::Skip => {}
            Command::Radio(line) => self.receive(line),
            Command::Wait(ms) => self.wait(ms),
            Command::Sync => {
                self.gateway.clock_mut().set_synchronized(true);
                info!(" Clock synchronised");
            }
            Command::Unsync => {
                self.gateway.clock_mut().set_synchronized(false);
                info!(" Clock no longer synchronised");
            }
            Command::Storage(available) => {
                self.gateway.storage_mut().set_available(available);
                info!(" Storage {}", if available { "mounted" } else { "removed" });
            }
            Command::Status => println!("{}", to_json(&StatusReport::new(&self.gateway, self.now))?),
            Command::History => println!("{}", history_json(self.gateway.history())?),
            Command::Ranges => println!("{}", to_json(self.gateway.ranges())?),
            Command::SetRanges(json) => {
                let response = handle_range_update(&mut self.gateway, json.as_bytes());
                println!("{} {}", response.status.line(), response.body);
            }
            Command::StorageInfo => {
                let current = self.gateway.context().persistence.destination;
                let report = StorageReport::new(self.gateway.storage(), current.as_ref());
                println!("{}", to_json(&report)?);
            }
            Command::Download => self.download()?,
        }
        Ok(())
    }

    /// Feed a radio line through the UART line buffer, as the firmware does
    fn receive(&mut self, line: &str) {
        let now = self.now;
        let gateway = &mut self.gateway;
        self.radio.feed(line.as_bytes(), |_| {});
        self.radio.feed(b"\r\n", |complete| {
            let outcome = gateway.handle_line(complete, now);
            debug!(" {:?}", outcome);
        });
    }

    fn wait(&mut self, ms: u64) {
        let end = self.now.saturating_add(ms);
        while self.now < end {
            self.now = (self.now + self.tick_ms).min(end);
            let report = self.gateway.tick(self.now);
            if report.rollover.is_some() || report.indicator.is_some() || report.heartbeat.attempted() {
                debug!(" t={} ms {:?}", self.now, report);
            }
        }
    }

    fn download(&self) -> anyhow::Result<()> {
        let storage = self.gateway.storage();
        let current = self.gateway.context().persistence.destination;
        let dest = match download_source(storage, current.as_ref()) {
            Ok(dest) => dest,
            Err(e) => {
                println!("404 {}", e);
                return Ok(());
            }
        };

        let mut stdout = io::stdout().lock();
        let mut buf = [0u8; 512];
        let mut offset = 0u64;
        loop {
            let n = storage
                .read_at(&dest, offset, &mut buf)
                .with_context(|| format!("failed to read {}", dest))?;
            if n == 0 {
                break;
            }
            stdout.write_all(&buf[..n])?;
            offset += n as u64;
        }
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting LoRaBridge simulator");

    let config_path = std::env::var_os("LORABRIDGE_SIM_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = SimulatorConfig::load_or_default(&config_path);

    let input: Box<dyn BufRead> = match std::env::args_os().nth(1) {
        Some(path) => {
            let file = File::open(&path)
                .with_context(|| format!("failed to open script {}", PathBuf::from(&path).display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(io::stdin().lock()),
    };

    let mut simulator = Simulator::new(&config);
    for (number, line) in input.lines().enumerate() {
        let line = line?;
        if let Err(e) = simulator.run(&line) {
            warn!(" line {}: {:#}", number + 1, e);
        }
    }

    info!("Simulator exiting at t={} ms", simulator.now);
    Ok(())
}

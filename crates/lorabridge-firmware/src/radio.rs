//! RYLR998 bring-up and the receive loop over UART2

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex as AsyncMutex;
use embassy_time::{Duration, Timer, with_timeout};
use embedded_hal::digital::OutputPin;
use embedded_io_async::{Read, Write};
use log::{debug, info, warn};
use lorabridge_core::Gateway;
use lorabridge_core::UpdateOutcome;
use lorabridge_core::clock::WallClock;
use lorabridge_core::config::RadioConfig;
use lorabridge_core::radio::{LineBuffer, init_commands};
use lorabridge_core::settings::SettingsStore;
use lorabridge_core::storage::LogStorage;

use crate::app_state::{AppError, FromTruncated};
use crate::uptime_ms;

/// Longest line the module sends; `+RCV` frames carry at most 240 payload bytes
pub const RADIO_LINE_CAPACITY: usize = 256;

/// How long the UART must stay quiet before a drain is considered done
const DRAIN_IDLE: Duration = Duration::from_millis(50);

/// Send the AT init sequence, waiting out each command's settle time and
/// logging whatever the module answers
pub async fn init_module<W, R>(tx: &mut W, rx: &mut R, config: &RadioConfig) -> Result<(), AppError>
where
    W: Write,
    R: Read,
{
    info!(" Configuring RYLR998 (address {}, network {})", config.address, config.network_id);

    for command in init_commands(config) {
        debug!(" -> {}", command.text);
        let mut line: heapless::String<34> = heapless::String::from_truncated(command.text.as_str());
        let _ = line.push_str("\r\n");
        tx.write_all(line.as_bytes()).await.map_err(uart_error)?;
        tx.flush().await.map_err(uart_error)?;

        Timer::after(Duration::from_millis(command.settle_ms)).await;
        drain(rx).await;
    }

    info!(" RYLR998 configured");
    Ok(())
}

fn uart_error<E: core::fmt::Debug>(e: E) -> AppError {
    AppError::Radio(heapless::String::from_truncated(format_args!("UART write: {:?}", e)))
}

/// Read and log replies until the UART goes idle
async fn drain<R: Read>(rx: &mut R) {
    let mut lines = LineBuffer::<RADIO_LINE_CAPACITY>::new();
    let mut buf = [0u8; 64];
    loop {
        match with_timeout(DRAIN_IDLE, rx.read(&mut buf)).await {
            Ok(Ok(n)) if n > 0 => lines.feed(&buf[..n], |line| debug!(" <- {}", line)),
            Ok(Err(e)) => {
                warn!(" UART read failed while draining: {:?}", e);
                break;
            }
            _ => break,
        }
    }
}

/// Feed received lines into the gateway forever
pub async fn receive_loop<M, R, P, S, C, K>(rx: &mut R, gateway: &AsyncMutex<M, Gateway<P, S, C, K>>) -> !
where
    M: RawMutex,
    R: Read,
    P: OutputPin,
    S: LogStorage,
    C: WallClock,
    K: SettingsStore,
{
    let mut lines = LineBuffer::<RADIO_LINE_CAPACITY>::new();
    let mut buf = [0u8; 128];

    loop {
        let n = match rx.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                warn!(" UART read failed: {:?}", e);
                lines.clear();
                Timer::after(Duration::from_millis(10)).await;
                continue;
            }
        };

        let now = uptime_ms();
        let mut gateway = gateway.lock().await;
        lines.feed(&buf[..n], |line| {
            if let UpdateOutcome::Discarded(reason) = gateway.handle_line(line, now) {
                debug!(" Line discarded: {:?}", reason);
            }
        });
    }
}

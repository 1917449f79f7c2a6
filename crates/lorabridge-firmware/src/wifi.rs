//! Wi-Fi station bring-up and reconnection
//!
//! Credentials are tried in order: the ones saved in the settings store, then
//! the ones compiled in from `.env`. When neither connects, the console UART
//! asks for an SSID and password. Whatever connects is saved back so the next
//! boot goes straight through.

use alloc::string::String;

use embassy_net::Stack;
use embassy_time::{Duration, Instant, Timer, with_deadline};
use embedded_io_async::{Read, Write};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController, WifiDevice, WifiEvent};
use log::{error, info, warn};
use lorabridge_core::config::InternetConfig;
use lorabridge_core::radio::LineBuffer;
use lorabridge_core::settings::{Credentials, SettingsStore};

use crate::app_state::{AppError, FromTruncated};

/// Deadline for the first association and DHCP lease
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Deadline for each attempt after the link drops
pub const RECONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// How long the console prompt waits for each answer
const PROMPT_TIMEOUT: Duration = Duration::from_secs(60);
const PROMPT_ATTEMPTS: usize = 3;

/// Credentials from `.env` at build time
pub fn compiled_in() -> Option<Credentials> {
    let config = InternetConfig {
        ssid: env!("WIFI_SSID"),
        password: env!("WIFI_PASSWORD"),
    };
    if !config.is_configured() {
        return None;
    }
    Credentials::new(config.ssid, config.password).ok()
}

fn wifi_error(args: core::fmt::Arguments<'_>) -> AppError {
    AppError::Wifi(heapless::String::from_truncated(args))
}

/// Configure the station for `credentials` and join within `timeout`
pub async fn connect(
    controller: &mut WifiController<'static>,
    stack: Stack<'_>,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<(), AppError> {
    info!(" Connecting to Wi-Fi SSID=\"{}\"", credentials.ssid);

    if matches!(controller.is_started(), Ok(true)) {
        let _ = controller.disconnect_async().await;
        if let Err(e) = controller.stop_async().await {
            warn!(" Wi-Fi stop_async error: {:?}", e);
        }
    }

    let client_config = ModeConfig::Client(
        ClientConfig::default()
            .with_ssid(String::from(credentials.ssid.as_str()))
            .with_password(String::from(credentials.password.as_str())),
    );
    controller
        .set_config(&client_config)
        .map_err(|e| wifi_error(format_args!("set_config: {:?}", e)))?;
    controller
        .start_async()
        .await
        .map_err(|e| wifi_error(format_args!("start: {:?}", e)))?;

    join(controller, stack, timeout).await
}

/// Associate with the configured network and wait for an IPv4 lease
async fn join(
    controller: &mut WifiController<'static>,
    stack: Stack<'_>,
    timeout: Duration,
) -> Result<(), AppError> {
    let deadline = Instant::now() + timeout;

    with_deadline(deadline, controller.connect_async())
        .await
        .map_err(|_| wifi_error(format_args!("association timed out")))?
        .map_err(|e| wifi_error(format_args!("connect: {:?}", e)))?;

    with_deadline(deadline, stack.wait_config_up())
        .await
        .map_err(|_| wifi_error(format_args!("no DHCP lease within {} s", timeout.as_secs())))?;

    if let Some(config) = stack.config_v4() {
        info!(" Wi-Fi link up: ip={}", config.address.address());
    }
    Ok(())
}

/// Bring the station up, trying every credential source in turn.
///
/// Returns the credentials that connected, after saving them to `settings`.
pub async fn establish<K, U>(
    controller: &mut WifiController<'static>,
    stack: Stack<'_>,
    settings: &mut K,
    console: &mut U,
) -> Result<Credentials, AppError>
where
    K: SettingsStore,
    U: Read + Write,
{
    let stored = match Credentials::load(settings) {
        Ok(stored) => stored,
        Err(e) => {
            warn!(" Failed to read stored credentials: {:?}", e);
            None
        }
    };

    for candidate in [stored.clone(), compiled_in()].into_iter().flatten() {
        match connect(controller, stack, &candidate, CONNECT_TIMEOUT).await {
            Ok(()) => {
                if stored.as_ref() != Some(&candidate) {
                    save(settings, &candidate);
                }
                return Ok(candidate);
            }
            Err(e) => warn!(" {}", e),
        }
    }

    for _ in 0..PROMPT_ATTEMPTS {
        let Some(candidate) = prompt_credentials(console).await else {
            break;
        };
        match connect(controller, stack, &candidate, CONNECT_TIMEOUT).await {
            Ok(()) => {
                save(settings, &candidate);
                return Ok(candidate);
            }
            Err(e) => {
                warn!(" {}", e);
                let _ = console.write_all(b"Connection failed\r\n").await;
            }
        }
    }

    Err(wifi_error(format_args!("no usable credentials")))
}

fn save<K: SettingsStore>(settings: &mut K, credentials: &Credentials) {
    match credentials.save(settings) {
        Ok(()) => info!(" Saved Wi-Fi credentials for \"{}\"", credentials.ssid),
        Err(e) => error!(" Failed to save Wi-Fi credentials: {:?}", e),
    }
}

/// Ask for an SSID and password on the console
async fn prompt_credentials<U: Read + Write>(console: &mut U) -> Option<Credentials> {
    let ssid = prompt_line(console, b"\r\nWi-Fi SSID: ").await?;
    if ssid.is_empty() {
        return None;
    }
    let password = prompt_line(console, b"Wi-Fi password: ").await?;

    match Credentials::new(&ssid, &password) {
        Ok(credentials) => Some(credentials),
        Err(e) => {
            warn!(" Rejected credentials: {}", e);
            None
        }
    }
}

/// One line from the console, or `None` when nothing arrives in time
async fn prompt_line<U: Read + Write>(console: &mut U, prompt: &[u8]) -> Option<heapless::String<64>> {
    if let Err(e) = console.write_all(prompt).await {
        warn!(" Console write failed: {:?}", e);
        return None;
    }
    let _ = console.flush().await;

    let deadline = Instant::now() + PROMPT_TIMEOUT;
    let mut lines = LineBuffer::<64>::new();
    let mut buf = [0u8; 16];
    loop {
        let n = match with_deadline(deadline, console.read(&mut buf)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                warn!(" Console read failed: {:?}", e);
                return None;
            }
            Err(_) => {
                warn!(" No answer on the console");
                return None;
            }
        };

        let mut answer = None;
        lines.feed(&buf[..n], |line| {
            if answer.is_none() {
                answer = Some(heapless::String::from_truncated(line.trim()));
            }
        });
        if answer.is_some() {
            return answer;
        }
    }
}

#[embassy_executor::task]
pub async fn net_task(mut runner: embassy_net::Runner<'static, WifiDevice<'static>>) {
    runner.run().await;
}

/// Rejoin whenever the station drops off the network
#[embassy_executor::task]
pub async fn wifi_task(mut controller: WifiController<'static>, stack: Stack<'static>) {
    loop {
        controller.wait_for_event(WifiEvent::StaDisconnected).await;
        warn!(" Wi-Fi STA disconnected; will retry");

        loop {
            match join(&mut controller, stack, RECONNECT_TIMEOUT).await {
                Ok(()) => break,
                Err(e) => {
                    warn!(" {}", e);
                    Timer::after(Duration::from_secs(5)).await;
                }
            }
        }
    }
}

//! Wall clock kept in step with `pool.ntp.org`
//!
//! The synchronised epoch is stored once, together with the uptime instant it
//! was taken at, so every reader derives the same wall time without touching
//! the network again.

use core::cell::Cell;

use embassy_net::dns::DnsQueryType;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpEndpoint, Stack};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Instant, Timer, with_deadline, with_timeout};
use log::{info, warn};
use lorabridge_core::clock::{
    NTP_PACKET_LEN, NTP_PORT, NTP_SERVER, WallClock, ntp_request, parse_ntp_response,
};

use crate::app_state::{AppError, FromTruncated};

/// Give up on a sync attempt after this long
pub const SYNC_DEADLINE: Duration = Duration::from_secs(15);
/// Wait this long after a failed sync before trying again
pub const RETRY_INTERVAL: Duration = Duration::from_secs(30);
/// Re-sync cadence once the clock is set, to bound drift
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(3600);

const REPLY_TIMEOUT: Duration = Duration::from_secs(3);
const LOCAL_PORT: u16 = 50_123;

#[derive(Debug, Clone, Copy)]
struct ClockBase {
    epoch_secs: u64,
    at: Instant,
}

static CLOCK_BASE: Mutex<CriticalSectionRawMutex, Cell<Option<ClockBase>>> =
    Mutex::new(Cell::new(None));

/// Record `epoch_secs` as the wall time right now
pub fn set_epoch(epoch_secs: u64) {
    CLOCK_BASE.lock(|base| {
        base.set(Some(ClockBase {
            epoch_secs,
            at: Instant::now(),
        }))
    });
}

/// Current Unix time, once a sync has succeeded
pub fn epoch_now() -> Option<u64> {
    CLOCK_BASE
        .lock(|base| base.get())
        .map(|base| base.epoch_secs + base.at.elapsed().as_secs())
}

/// [`WallClock`] reading the SNTP-derived time
#[derive(Debug, Default, Clone, Copy)]
pub struct SntpClock;

impl WallClock for SntpClock {
    fn is_synchronized(&self) -> bool {
        epoch_now().is_some()
    }

    fn epoch_secs(&self) -> Option<u64> {
        epoch_now()
    }
}

fn time_sync_error(args: core::fmt::Arguments<'_>) -> AppError {
    AppError::TimeSync(heapless::String::from_truncated(args))
}

/// Ask the NTP pool for the time, retrying until [`SYNC_DEADLINE`]
pub async fn query(stack: Stack<'_>) -> Result<u64, AppError> {
    let deadline = Instant::now() + SYNC_DEADLINE;

    let mut rx_meta = [PacketMetadata::EMPTY; 2];
    let mut rx_buffer = [0u8; 128];
    let mut tx_meta = [PacketMetadata::EMPTY; 2];
    let mut tx_buffer = [0u8; 128];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );
    socket
        .bind(LOCAL_PORT)
        .map_err(|e| time_sync_error(format_args!("bind: {:?}", e)))?;

    let result = with_deadline(deadline, async {
        loop {
            match attempt(stack, &socket).await {
                Ok(epoch) => break epoch,
                Err(e) => {
                    warn!(" SNTP attempt failed: {}", e);
                    Timer::after(Duration::from_secs(1)).await;
                }
            }
        }
    })
    .await;

    socket.close();
    result.map_err(|_| time_sync_error(format_args!("no reply within {} s", SYNC_DEADLINE.as_secs())))
}

async fn attempt(stack: Stack<'_>, socket: &UdpSocket<'_>) -> Result<u64, AppError> {
    let addrs = stack
        .dns_query(NTP_SERVER, DnsQueryType::A)
        .await
        .map_err(|e| time_sync_error(format_args!("DNS {}: {:?}", NTP_SERVER, e)))?;
    let addr = addrs
        .first()
        .copied()
        .ok_or_else(|| time_sync_error(format_args!("DNS {}: no address", NTP_SERVER)))?;

    socket
        .send_to(&ntp_request(), IpEndpoint::new(addr, NTP_PORT))
        .await
        .map_err(|e| time_sync_error(format_args!("send: {:?}", e)))?;

    let mut packet = [0u8; NTP_PACKET_LEN];
    let (n, _) = with_timeout(REPLY_TIMEOUT, socket.recv_from(&mut packet))
        .await
        .map_err(|_| time_sync_error(format_args!("reply timed out")))?
        .map_err(|e| time_sync_error(format_args!("recv: {:?}", e)))?;

    parse_ntp_response(&packet[..n]).map_err(|e| time_sync_error(format_args!("{}", e)))
}

/// Keep the clock synchronised for as long as the gateway runs
pub async fn sync_loop(stack: Stack<'_>) -> ! {
    loop {
        stack.wait_config_up().await;
        match query(stack).await {
            Ok(epoch) => {
                let first = epoch_now().is_none();
                set_epoch(epoch);
                if first {
                    info!(" Time synchronised: {} s since epoch", epoch);
                }
                Timer::after(RESYNC_INTERVAL).await;
            }
            Err(e) => {
                warn!(" {}", e);
                Timer::after(RETRY_INTERVAL).await;
            }
        }
    }
}

//! Dashboard HTTP server on port 80
//!
//! One connection at a time. Request parsing, routing and every JSON body come
//! from `lorabridge_core::api`; this module only moves bytes. The gateway lock
//! is held while a response is built, never across a socket write.

use alloc::string::{String, ToString};
use core::fmt::Display;

use embassy_net::Stack;
use embassy_net::tcp::{self, TcpSocket};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex as AsyncMutex;
use embassy_time::{Duration, Timer};
use embedded_hal::digital::OutputPin;
use log::{debug, info, warn};
use lorabridge_core::Gateway;
use lorabridge_core::api::http::{
    self, CONTENT_CSV, CONTENT_HTML, CONTENT_JSON, CONTENT_TEXT, MAX_REQUEST_SIZE, RequestError,
    Route, Status,
};
use lorabridge_core::api::{
    DownloadError, StatusReport, StorageReport, download_source, handle_range_update,
    history_json, to_json,
};
use lorabridge_core::clock::WallClock;
use lorabridge_core::settings::SettingsStore;
use lorabridge_core::storage::LogStorage;

use crate::uptime_ms;

pub const HTTP_PORT: u16 = 80;

/// Download chunk size; one chunk is read per lock of the gateway
const DOWNLOAD_CHUNK: usize = 512;

const DASHBOARD_HTML: &str = include_str!("dashboard.html");

/// Accept and serve connections forever
pub async fn serve<M, P, S, C, K>(stack: Stack<'_>, gateway: &AsyncMutex<M, Gateway<P, S, C, K>>) -> !
where
    M: RawMutex,
    P: OutputPin,
    S: LogStorage,
    C: WallClock,
    K: SettingsStore,
{
    let mut rx_buf = [0u8; 1024];
    let mut tx_buf = [0u8; 1536];

    info!(" HTTP server starting (port={})", HTTP_PORT);

    loop {
        // Ensure network is configured before accepting connections.
        stack.wait_config_up().await;

        let mut socket = TcpSocket::new(stack, &mut rx_buf, &mut tx_buf);
        socket.set_timeout(Some(Duration::from_secs(10)));

        match socket.accept(HTTP_PORT).await {
            Ok(()) => {
                if let Err(e) = handle_connection(&mut socket, gateway).await {
                    warn!(" HTTP connection handling error: {:?}", e);
                }
                let _ = socket.flush().await;
                socket.close();
            }
            Err(e) => {
                warn!(" HTTP accept error: {:?}", e);
                Timer::after(Duration::from_millis(200)).await;
            }
        }

        socket.abort();
    }
}

async fn handle_connection<M, P, S, C, K>(
    socket: &mut TcpSocket<'_>,
    gateway: &AsyncMutex<M, Gateway<P, S, C, K>>,
) -> Result<(), tcp::Error>
where
    M: RawMutex,
    P: OutputPin,
    S: LogStorage,
    C: WallClock,
    K: SettingsStore,
{
    let mut buf = [0u8; MAX_REQUEST_SIZE];
    let mut total = 0usize;

    // Read until the head is complete, then until the body has arrived
    let head = loop {
        let n = socket.read(&mut buf[total..]).await?;
        if n == 0 {
            return Ok(());
        }
        total += n;

        match http::parse_request_head(&buf[..total]) {
            Ok(head) if total >= head.total_len() => break head,
            Ok(_) => {}
            Err(RequestError::Incomplete) if total < buf.len() => {}
            Err(e) => {
                debug!(" Bad request: {}", e);
                return send(socket, Status::BadRequest, CONTENT_TEXT, e.to_string().as_bytes()).await;
            }
        }
    };

    let route = Route::resolve(head.method, head.path);
    debug!(" {:?} {} -> {:?}", head.method, head.path, route);
    let body = &buf[head.header_len..head.total_len()];

    match route {
        Route::Dashboard => send(socket, Status::Ok, CONTENT_HTML, DASHBOARD_HTML.as_bytes()).await,
        Route::Data => {
            let json = {
                let gateway = gateway.lock().await;
                to_json(&StatusReport::new(&*gateway, uptime_ms()))
            };
            send_json(socket, json).await
        }
        Route::History => {
            let json = history_json(gateway.lock().await.history());
            send_json(socket, json).await
        }
        Route::GetRanges => {
            let json = to_json(gateway.lock().await.ranges());
            send_json(socket, json).await
        }
        Route::SetRanges => {
            let response = handle_range_update(&mut *gateway.lock().await, body);
            send(socket, response.status, CONTENT_JSON, response.body.as_bytes()).await
        }
        Route::StorageInfo => {
            let json = {
                let gateway = gateway.lock().await;
                let current = gateway.context().persistence.destination;
                to_json(&StorageReport::new(gateway.storage(), current.as_ref()))
            };
            send_json(socket, json).await
        }
        Route::Download => download(socket, gateway).await,
        Route::NotFound => send(socket, Status::NotFound, CONTENT_TEXT, b"Not found").await,
    }
}

/// Stream the current log, or the fallback log, as an attachment
async fn download<M, P, S, C, K>(
    socket: &mut TcpSocket<'_>,
    gateway: &AsyncMutex<M, Gateway<P, S, C, K>>,
) -> Result<(), tcp::Error>
where
    M: RawMutex,
    P: OutputPin,
    S: LogStorage,
    C: WallClock,
    K: SettingsStore,
{
    let source = {
        let gateway = gateway.lock().await;
        let current = gateway.context().persistence.destination;
        download_source(gateway.storage(), current.as_ref()).and_then(|dest| {
            gateway
                .storage()
                .log_len(&dest)
                .map(|len| (dest, len))
                .map_err(DownloadError::Storage)
        })
    };

    let (dest, len) = match source {
        Ok(found) => found,
        Err(e) => {
            warn!(" Download unavailable: {}", e);
            return send(socket, Status::NotFound, CONTENT_TEXT, e.to_string().as_bytes()).await;
        }
    };

    info!(" Sending {} ({} bytes)", dest, len);
    let head = http::response_head(
        Status::Ok,
        CONTENT_CSV,
        len as usize,
        Some(dest.file_name().as_str()),
    );
    write_all(socket, head.as_bytes()).await?;

    let mut chunk = [0u8; DOWNLOAD_CHUNK];
    let mut offset = 0u64;
    while offset < len {
        let read = {
            let gateway = gateway.lock().await;
            gateway.storage().read_at(&dest, offset, &mut chunk)
        };
        let n = match read {
            Ok(0) => break,
            Ok(n) => n.min((len - offset) as usize),
            Err(e) => {
                // Headers are gone already; all that is left is to cut the connection short
                warn!(" Read of {} failed at {}: {:?}", dest, offset, e);
                break;
            }
        };
        write_all(socket, &chunk[..n]).await?;
        offset += n as u64;
    }
    Ok(())
}

async fn send_json<E: Display>(
    socket: &mut TcpSocket<'_>,
    json: Result<String, E>,
) -> Result<(), tcp::Error> {
    match json {
        Ok(body) => send(socket, Status::Ok, CONTENT_JSON, body.as_bytes()).await,
        Err(e) => {
            warn!(" JSON encoding failed: {}", e);
            send(socket, Status::InternalError, CONTENT_TEXT, b"encoding failed").await
        }
    }
}

async fn send(
    socket: &mut TcpSocket<'_>,
    status: Status,
    content_type: &str,
    body: &[u8],
) -> Result<(), tcp::Error> {
    let head = http::response_head(status, content_type, body.len(), None);
    write_all(socket, head.as_bytes()).await?;
    write_all(socket, body).await
}

async fn write_all(socket: &mut TcpSocket<'_>, mut data: &[u8]) -> Result<(), tcp::Error> {
    while !data.is_empty() {
        let n = socket.write(data).await?;
        if n == 0 {
            return Err(tcp::Error::ConnectionReset);
        }
        data = &data[n..];
    }
    Ok(())
}

#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_futures::select::{Either4, select4};
use embassy_net::StackResources;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex as AsyncMutex;
use embassy_time::{Delay, Duration, Ticker};
use embedded_hal_bus::spi::ExclusiveDevice;
use embedded_sdmmc::{SdCard, VolumeManager};
use esp_hal::Blocking;
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::rng::Rng;
use esp_hal::spi::Mode as SpiMode;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::{Config as UartConfig, Uart};
use log::{debug, error, info};
use static_cell::StaticCell;

use lorabridge_core::Gateway;
use lorabridge_core::config::{GatewayConfig, RadioConfig};
use lorabridge_firmware::app_state::AppRunState;
use lorabridge_firmware::sd_card::{SdCardStorage, SdSettings, SntpTimeSource};
use lorabridge_firmware::sntp::SntpClock;
use lorabridge_firmware::{http, radio, sntp, uptime_ms, wifi};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

type SdSpi = ExclusiveDevice<Spi<'static, Blocking>, Output<'static>, Delay>;

type FirmwareGateway<'a> = Gateway<
    Output<'static>,
    SdCardStorage<'a, SdSpi, Delay, SntpTimeSource>,
    SntpClock,
    SdSettings<'a, SdSpi, Delay, SntpTimeSource>,
>;

static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
static NET_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(size: 72 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("LoRaBridge gateway starting");
    let mut run_state = AppRunState::Uninitialized;
    let gateway_config = GatewayConfig::default();
    let radio_config = RadioConfig::default();

    // 1. RYLR998 on UART2 (RX GPIO16, TX GPIO17)
    run_state.advance(AppRunState::RadioInit);
    let radio_uart = Uart::new(
        peripherals.UART2,
        UartConfig::default().with_baudrate(radio_config.baud_rate),
    )
    .expect("Failed to configure radio UART")
    .with_rx(peripherals.GPIO16)
    .with_tx(peripherals.GPIO17)
    .into_async();
    let (mut radio_rx, mut radio_tx) = radio_uart.split();
    if let Err(e) = radio::init_module(&mut radio_tx, &mut radio_rx, &radio_config).await {
        error!(" {}", e);
    }

    // 2. Console on UART0, used to ask for Wi-Fi credentials
    let mut console = Uart::new(peripherals.UART0, UartConfig::default())
        .expect("Failed to configure console UART")
        .with_rx(peripherals.GPIO3)
        .with_tx(peripherals.GPIO1)
        .into_async();

    // 3. SD card on SPI2 (SCK GPIO18, MOSI GPIO23, MISO GPIO19, CS GPIO5)
    let spi_bus = Spi::new(
        peripherals.SPI2,
        SpiConfig::default()
            .with_frequency(Rate::from_khz(400))
            .with_mode(SpiMode::_0),
    )
    .expect("Failed to configure SD card SPI")
    .with_sck(peripherals.GPIO18)
    .with_mosi(peripherals.GPIO23)
    .with_miso(peripherals.GPIO19);
    let sd_cs = Output::new(peripherals.GPIO5, Level::High, OutputConfig::default());
    let sd_device = ExclusiveDevice::new(spi_bus, sd_cs, Delay).expect("Failed to set up SD card CS");
    let sd_card = SdCard::new(sd_device, Delay);
    let capacity = match sd_card.num_bytes() {
        Ok(bytes) => {
            info!(" SD card size: {} MiB", bytes / (1024 * 1024));
            Some(bytes)
        }
        Err(e) => {
            error!(" SD card not detected: {:?}", e);
            None
        }
    };
    let volume_mgr = VolumeManager::new(sd_card, SntpTimeSource::new(gateway_config.utc_offset_secs));
    let storage = SdCardStorage::mount(&volume_mgr, capacity);
    let mut settings = SdSettings::open(&volume_mgr);

    // 4. Indicator LED on GPIO2
    let led = Output::new(peripherals.GPIO2, Level::Low, OutputConfig::default());

    // 5. Wi-Fi station and network stack
    run_state.advance(AppRunState::WifiConnecting);
    let radio_init = RADIO.init(esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"));
    let (mut wifi_controller, interfaces) =
        esp_radio::wifi::new(radio_init, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi controller");

    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        NET_RESOURCES.init(StackResources::new()),
        seed,
    );
    spawner
        .spawn(wifi::net_task(runner))
        .expect("net_task spawn");

    match wifi::establish(&mut wifi_controller, stack, &mut settings, &mut console).await {
        Ok(_) => {
            run_state.advance(AppRunState::WifiConnected);
            spawner
                .spawn(wifi::wifi_task(wifi_controller, stack))
                .expect("wifi_task spawn");
        }
        Err(e) => {
            error!(" {}; continuing without network", e);
            run_state.advance(AppRunState::Offline);
        }
    }

    // 6. The pipeline: radio lines in, periodic tick, HTTP and SNTP alongside
    let gateway: AsyncMutex<CriticalSectionRawMutex, FirmwareGateway<'_>> =
        AsyncMutex::new(Gateway::new(gateway_config, led, storage, SntpClock, settings));
    run_state.advance(AppRunState::Running);

    match select4(
        radio::receive_loop(&mut radio_rx, &gateway),
        tick_loop(&gateway, Duration::from_millis(gateway_config.tick_interval_ms)),
        http::serve(stack, &gateway),
        sntp::sync_loop(stack),
    )
    .await
    {
        Either4::First(never)
        | Either4::Second(never)
        | Either4::Third(never)
        | Either4::Fourth(never) => never,
    }
}

/// Drive indicator timeouts, heartbeat writes and daily rollover
async fn tick_loop(
    gateway: &AsyncMutex<CriticalSectionRawMutex, FirmwareGateway<'_>>,
    interval: Duration,
) -> ! {
    let mut ticker = Ticker::every(interval);
    loop {
        ticker.next().await;
        let report = gateway.lock().await.tick(uptime_ms());
        if report.rollover.is_some() || report.indicator.is_some() || report.heartbeat.attempted() {
            debug!(" Tick: {:?}", report);
        }
    }
}

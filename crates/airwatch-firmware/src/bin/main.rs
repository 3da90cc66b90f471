#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use airwatch_firmware::board::{self, Co2Pins, DustPins, PressurePins};
use airwatch_firmware::broker::broker_task;
use airwatch_firmware::link::{dhcp_task, link_task, net_task};
use airwatch_firmware::station::{
    co2_task, dust_task, pressure_task, publisher_task, station_config,
};
use embassy_executor::Spawner;
use embassy_net::StackResources;
use esp_hal::clock::CpuClock;
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use log::info;
use static_cell::StaticCell;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!(log::LevelFilter::Info);

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("airwatch starting");
    let station = station_config();

    // Sensors
    let co2_uart = board::create_co2_uart(Co2Pins {
        uart: peripherals.UART1,
        tx: peripherals.GPIO17,
        rx: peripherals.GPIO18,
    })
    .expect("Failed to configure CO2 UART");
    let dust_uart = board::create_dust_uart(DustPins {
        uart: peripherals.UART2,
        tx: peripherals.GPIO15,
        rx: peripherals.GPIO16,
    })
    .expect("Failed to configure dust UART");
    let pressure_bus = board::create_pressure_bus(PressurePins {
        i2c: peripherals.I2C0,
        sda: peripherals.GPIO8,
        scl: peripherals.GPIO9,
    })
    .expect("Failed to configure I2C bus");

    spawner.spawn(co2_task(co2_uart, station)).expect("co2 task");
    spawner.spawn(dust_task(dust_uart, station)).expect("dust task");
    spawner.spawn(pressure_task(pressure_bus, station)).expect("pressure task");

    // Network
    let radio_init = {
        static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
        RADIO.init(esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"))
    };
    let (wifi_controller, interfaces) =
        esp_radio::wifi::new(radio_init, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi controller");

    let rng = Rng::new();
    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());

    static RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
    let (stack, net_runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        RESOURCES.init(StackResources::new()),
        seed,
    );

    spawner.spawn(net_task(net_runner)).expect("net task");
    spawner.spawn(dhcp_task(stack)).expect("dhcp task");
    spawner.spawn(link_task(wifi_controller, station.internet, station.link)).expect("link task");
    spawner.spawn(broker_task(stack, station.broker)).expect("broker task");
    spawner.spawn(publisher_task(station)).expect("publisher task");

    info!("all tasks spawned");
    loop {
        embassy_time::Timer::after(embassy_time::Duration::from_secs(3600)).await;
    }
}

//! Desktop simulator for the airwatch station.
//!
//! Runs the real acquisition tasks, telemetry store and publisher from
//! `airwatch-core` on the host executor. The sensors, the Wi-Fi link and the
//! broker are simulated; every publish is logged.
//!
//! Set `RUST_LOG=debug` to see individual frames and flag transitions.

mod devices;
mod network;

use airwatch_core::acquisition::{AcquisitionError, AcquisitionTask};
use airwatch_core::clock::EmbassyClock;
use airwatch_core::config::{Config, DEFAULT_LINK_MAX_RETRIES};
use airwatch_core::connectivity::ConnectivityState;
use airwatch_core::protocol::{Mhz19Codec, Pms7003Codec};
use airwatch_core::publisher::Publisher;
use airwatch_core::sensors::{Bmp280Sensor, SensorKind, UartSensor};
use airwatch_core::telemetry::TelemetryStore;
use airwatch_core::transport::SerialTransport;
use core::convert::Infallible;
use embassy_executor::Spawner;
use embassy_time::Duration;
use log::{error, info};

use devices::{FaultSchedule, SerialModel, SimulatedBmp280, SimulatedUart};
use network::LoggingBroker;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

static STORE: TelemetryStore = TelemetryStore::new();
static CONNECTIVITY: ConnectivityState = ConnectivityState::new(DEFAULT_LINK_MAX_RETRIES);

/// Time between simulated access point outages.
const OUTAGE_EVERY: Duration = Duration::from_secs(120);

const CO2_FAULTS: FaultSchedule = FaultSchedule {
    corrupt_every: 7,
    silent_every: 19,
};
const DUST_FAULTS: FaultSchedule = FaultSchedule {
    corrupt_every: 11,
    silent_every: 0,
};
const BMP280_NACK_EVERY: u32 = 13;

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

fn report_stopped(kind: SensorKind, result: Result<Infallible, AcquisitionError>) {
    if let Err(e) = result {
        error!("{} acquisition stopped: {}", kind.name(), e);
    }
}

#[embassy_executor::task]
async fn co2_task(config: Config<'static>) {
    let port = SimulatedUart::new(SerialModel::Mhz19, CO2_FAULTS);
    let sensor = UartSensor::new(SerialTransport::new(port, config.serial), Mhz19Codec);
    let task = AcquisitionTask::new(sensor, STORE.co2(), EmbassyClock, config.co2);
    report_stopped(SensorKind::Co2, task.run().await);
}

#[embassy_executor::task]
async fn dust_task(config: Config<'static>) {
    let port = SimulatedUart::new(SerialModel::Pms7003, DUST_FAULTS);
    let sensor = UartSensor::new(SerialTransport::new(port, config.serial), Pms7003Codec);
    let task = AcquisitionTask::new(sensor, STORE.dust(), EmbassyClock, config.dust);
    report_stopped(SensorKind::Dust, task.run().await);
}

#[embassy_executor::task]
async fn pressure_task(config: Config<'static>) {
    let sensor = Bmp280Sensor::new(
        SimulatedBmp280::new(BMP280_NACK_EVERY),
        config.temperature_correction,
    );
    let task = AcquisitionTask::new(sensor, STORE.pressure(), EmbassyClock, config.pressure);
    report_stopped(SensorKind::Pressure, task.run().await);
}

#[embassy_executor::task]
async fn publisher_task(config: Config<'static>) -> ! {
    Publisher::new(
        LoggingBroker::new(&CONNECTIVITY),
        EmbassyClock,
        &CONNECTIVITY,
        &STORE,
        config.publisher,
    )
    .run()
    .await
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::default();
    info!(
        "airwatch simulator: publishing under {}{}",
        config.publisher.topics.prefix, config.publisher.topics.device_id
    );

    spawner.spawn(co2_task(config)).expect("co2 task");
    spawner.spawn(dust_task(config)).expect("dust task");
    spawner.spawn(pressure_task(config)).expect("pressure task");
    spawner.spawn(network::link_task(&CONNECTIVITY, OUTAGE_EVERY)).expect("link task");
    spawner.spawn(network::broker_task(&CONNECTIVITY)).expect("broker task");
    spawner.spawn(publisher_task(config)).expect("publisher task");
}

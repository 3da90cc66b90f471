//! Shared station state and the acquisition / publishing tasks

use airwatch_core::acquisition::{AcquisitionError, AcquisitionTask};
use airwatch_core::clock::EmbassyClock;
use airwatch_core::config::{
    BrokerConfig, Config, DEFAULT_LINK_MAX_RETRIES, InternetConfig, PublisherConfig, TopicLayout,
};
use airwatch_core::connectivity::ConnectivityState;
use airwatch_core::protocol::{Mhz19Codec, Pms7003Codec};
use airwatch_core::publisher::Publisher;
use airwatch_core::sensors::{Bmp280Sensor, SensorKind, UartSensor};
use airwatch_core::telemetry::TelemetryStore;
use airwatch_core::transport::SerialTransport;
use core::convert::Infallible;
use log::error;

use crate::board::PressureBus;
use crate::broker::ChannelBroker;
use crate::serial::SensorUart;
use crate::wifi_secrets::{self, non_empty};

pub static STORE: TelemetryStore = TelemetryStore::new();
pub static CONNECTIVITY: ConnectivityState = ConnectivityState::new(DEFAULT_LINK_MAX_RETRIES);

/// Defaults plus the credentials baked in by `build.rs`.
pub fn station_config() -> Config<'static> {
    let device_id = non_empty(wifi_secrets::DEVICE_ID).unwrap_or("airwatch");
    let port = non_empty(wifi_secrets::BROKER_PORT)
        .and_then(|port| port.parse().ok())
        .unwrap_or(BrokerConfig::default().port);

    Config {
        internet: InternetConfig {
            ssid: wifi_secrets::WIFI_SSID,
            password: wifi_secrets::WIFI_PASSWORD,
        },
        broker: BrokerConfig {
            host: wifi_secrets::BROKER_HOST,
            port,
            client_id: device_id,
            username: non_empty(wifi_secrets::BROKER_USERNAME),
            password: non_empty(wifi_secrets::BROKER_PASSWORD),
            ..BrokerConfig::default()
        },
        publisher: PublisherConfig {
            topics: TopicLayout {
                device_id,
                ..TopicLayout::default()
            },
            ..PublisherConfig::default()
        },
        ..Config::default()
    }
}

fn report_stopped(kind: SensorKind, result: Result<Infallible, AcquisitionError>) {
    if let Err(e) = result {
        error!("{} acquisition stopped: {}", kind.name(), e);
    }
}

#[embassy_executor::task]
pub async fn co2_task(uart: SensorUart, config: Config<'static>) {
    let sensor = UartSensor::new(SerialTransport::new(uart, config.serial), Mhz19Codec);
    let task = AcquisitionTask::new(sensor, STORE.co2(), EmbassyClock, config.co2);
    report_stopped(SensorKind::Co2, task.run().await);
}

#[embassy_executor::task]
pub async fn dust_task(uart: SensorUart, config: Config<'static>) {
    let sensor = UartSensor::new(SerialTransport::new(uart, config.serial), Pms7003Codec);
    let task = AcquisitionTask::new(sensor, STORE.dust(), EmbassyClock, config.dust);
    report_stopped(SensorKind::Dust, task.run().await);
}

#[embassy_executor::task]
pub async fn pressure_task(i2c: PressureBus, config: Config<'static>) {
    let sensor = Bmp280Sensor::new(i2c, config.temperature_correction);
    let task = AcquisitionTask::new(sensor, STORE.pressure(), EmbassyClock, config.pressure);
    report_stopped(SensorKind::Pressure, task.run().await);
}

#[embassy_executor::task]
pub async fn publisher_task(config: Config<'static>) -> ! {
    Publisher::new(
        ChannelBroker::new(),
        EmbassyClock,
        &CONNECTIVITY,
        &STORE,
        config.publisher,
    )
    .run()
    .await
}

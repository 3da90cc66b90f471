//! Simulated Wi-Fi link and a broker that logs instead of sending.

use airwatch_core::connectivity::{BrokerEvent, ConnectivityState, LinkAction, LinkEvent};
use airwatch_core::publisher::{BrokerClient, BrokerError};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use log::{info, warn};

/// Association plus DHCP.
const ASSOCIATE_DELAY: Duration = Duration::from_millis(1500);
const HANDSHAKE_DELAY: Duration = Duration::from_millis(300);

/// Requested broker session state, `true` for up.
static SESSION: Signal<CriticalSectionRawMutex, bool> = Signal::new();

/// Brings the link up, then drops it every `outage_every`.
#[embassy_executor::task]
pub async fn link_task(connectivity: &'static ConnectivityState, outage_every: Duration) -> ! {
    let mut action = connectivity.handle_link_event(LinkEvent::Starting);
    loop {
        if action == LinkAction::Connect {
            Timer::after(ASSOCIATE_DELAY).await;
            connectivity.handle_link_event(LinkEvent::GotAddress);
        }

        Timer::after(outage_every).await;
        warn!("sim link: access point went away");
        connectivity.handle_link_event(LinkEvent::LostAddress);
        action = connectivity.handle_link_event(LinkEvent::Disconnected);
    }
}

/// Completes start / stop requests after a short handshake.
#[embassy_executor::task]
pub async fn broker_task(connectivity: &'static ConnectivityState) -> ! {
    loop {
        let up = SESSION.wait().await;
        Timer::after(HANDSHAKE_DELAY).await;
        let event = if up {
            BrokerEvent::Connected
        } else {
            BrokerEvent::Disconnected
        };
        connectivity.handle_broker_event(event);
    }
}

pub struct LoggingBroker {
    connectivity: &'static ConnectivityState,
    sent: u16,
}

impl LoggingBroker {
    pub fn new(connectivity: &'static ConnectivityState) -> Self {
        Self {
            connectivity,
            sent: 0,
        }
    }
}

impl BrokerClient for LoggingBroker {
    fn start(&mut self) {
        SESSION.signal(true);
    }

    fn stop(&mut self) {
        SESSION.signal(false);
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        if !self.connectivity.broker_up() {
            return Err(BrokerError::NotConnected);
        }
        self.sent = self.sent.wrapping_add(1);
        info!("PUBLISH {} = {}", topic, String::from_utf8_lossy(payload));
        self.connectivity
            .handle_broker_event(BrokerEvent::Published { id: self.sent });
        Ok(())
    }
}

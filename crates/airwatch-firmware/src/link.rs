//! Wi-Fi station link
//!
//! Radio events are translated into [`LinkEvent`]s inside esp-radio's event
//! handlers, which only update [`CONNECTIVITY`](crate::station::CONNECTIVITY)
//! and signal [`link_task`]. The task is the only code that drives the
//! controller.

use airwatch_core::config::{InternetConfig, LinkConfig};
use airwatch_core::connectivity::{LinkAction, LinkEvent};
use embassy_futures::select::{Either, select};
use embassy_net::{Runner, Stack};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::Timer;
use esp_radio::wifi::event::{self, EventExt};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController, WifiDevice};
use log::{debug, error, info, warn};

use crate::station::CONNECTIVITY;

static CONNECT_REQUESTED: Signal<CriticalSectionRawMutex, ()> = Signal::new();

fn dispatch(event: LinkEvent) {
    if CONNECTIVITY.handle_link_event(event) == LinkAction::Connect {
        CONNECT_REQUESTED.signal(());
    }
}

fn install_event_handlers() {
    event::StaStart::update_handler(|_| dispatch(LinkEvent::Starting));
    event::StaDisconnected::update_handler(|event| {
        debug!("link: disconnect reason {}", event.reason());
        dispatch(LinkEvent::Disconnected);
    });
}

#[embassy_executor::task]
pub async fn link_task(
    mut controller: WifiController<'static>,
    internet: InternetConfig<'static>,
    link: LinkConfig,
) {
    let client = ClientConfig::default()
        .with_ssid(internet.ssid.into())
        .with_password(internet.password.into());
    if let Err(e) = controller.set_config(&ModeConfig::Client(client)) {
        error!("link: wifi set_config failed: {:?}", e);
        return;
    }

    install_event_handlers();
    if let Err(e) = controller.start_async().await {
        error!("link: wifi start failed: {:?}", e);
        return;
    }
    info!("link: station started, ssid {}", internet.ssid);

    loop {
        match select(CONNECT_REQUESTED.wait(), Timer::after(link.failure_cooldown)).await {
            Either::First(()) => {
                // Failure shows up as a StaDisconnected event.
                if let Err(e) = controller.connect_async().await {
                    debug!("link: connect attempt failed: {:?}", e);
                }
            }
            Either::Second(()) => {
                if CONNECTIVITY.link_failed() {
                    warn!("link: still failed after cooldown, starting over");
                    CONNECTIVITY.rearm_link();
                    dispatch(LinkEvent::Starting);
                }
            }
        }
    }
}

/// Reports address changes from DHCP.
#[embassy_executor::task]
pub async fn dhcp_task(stack: Stack<'static>) -> ! {
    loop {
        stack.wait_config_up().await;
        if let Some(config) = stack.config_v4() {
            info!("link: address {}", config.address);
        }
        dispatch(LinkEvent::GotAddress);

        stack.wait_config_down().await;
        dispatch(LinkEvent::LostAddress);
    }
}

#[embassy_executor::task]
pub async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}

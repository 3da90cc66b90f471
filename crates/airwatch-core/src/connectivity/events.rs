use log::{debug, error, info, warn};

use super::{ConnectivityFlags, ConnectivityState};

/// Station-side network events, as reported by the radio and DHCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Station interface started.
    Starting,
    /// Association lost or a connect attempt failed.
    Disconnected,
    GotAddress,
    LostAddress,
}

/// What the link task has to do with the radio after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    Connect,
    None,
}

/// Broker session events, as reported by the broker task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerEvent {
    Connected,
    Disconnected,
    Error,
    Published { id: u16 },
}

impl ConnectivityState {
    /// Update the bitset for a link event. Never blocks.
    pub fn handle_link_event(&self, event: LinkEvent) -> LinkAction {
        match event {
            LinkEvent::Starting => {
                self.update_retries(|budget| budget.consume());
                info!("link: connecting to access point");
                LinkAction::Connect
            }
            LinkEvent::Disconnected => {
                self.clear(ConnectivityFlags::LINK_UP);
                self.set(ConnectivityFlags::MUST_DISCONNECT);

                let retried = self.update_retries(|budget| budget.try_consume());
                if retried {
                    warn!("link: disconnected, reconnecting ({})", self.link_retries());
                    LinkAction::Connect
                } else {
                    error!("link: reconnect budget exhausted, giving up");
                    self.set(ConnectivityFlags::LINK_FAILED);
                    LinkAction::None
                }
            }
            LinkEvent::GotAddress => {
                self.update_retries(|budget| budget.reset());
                self.clear(ConnectivityFlags::LINK_FAILED);
                self.set(ConnectivityFlags::LINK_UP);
                info!("link: address acquired");
                LinkAction::None
            }
            LinkEvent::LostAddress => {
                warn!("link: address lost");
                LinkAction::None
            }
        }
    }

    /// Update the bitset for a broker event. Never blocks.
    pub fn handle_broker_event(&self, event: BrokerEvent) {
        match event {
            BrokerEvent::Connected => {
                info!("broker: connected");
                self.set(ConnectivityFlags::BROKER_UP);
            }
            BrokerEvent::Disconnected => {
                info!("broker: disconnected");
                self.clear(ConnectivityFlags::BROKER_UP);
            }
            BrokerEvent::Error => {
                error!("broker: session error");
                self.set(ConnectivityFlags::MUST_DISCONNECT);
            }
            BrokerEvent::Published { id } => debug!("broker: published, msg_id={}", id),
        }
    }

    /// Start a fresh reconnect sequence after the link was declared failed.
    pub fn rearm_link(&self) {
        self.update_retries(|budget| budget.reset());
        info!("link: retry budget re-armed");
    }
}

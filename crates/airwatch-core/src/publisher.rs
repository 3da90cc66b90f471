//! Broker lifecycle and telemetry publishing
//!
//! Once per cycle the publisher waits for `MUST_DISCONNECT` (or the poll
//! interval), decides from the connectivity bitset whether to stop, start or
//! use the broker session. A `MUST_DISCONNECT` seen by the cycle is cleared
//! once the cycle has acted, whatever it decided; one raised mid-cycle is left
//! for the next cycle.

use core::fmt::Write as _;
use core::future::Future;

use heapless::String;
use log::{debug, info, warn};
use thiserror_no_std::Error;

use crate::clock::Clock;
use crate::config::PublisherConfig;
use crate::connectivity::{ConnectivityFlags, ConnectivityState};
use crate::sensors::SensorKind;
use crate::telemetry::{SlotSnapshot, TelemetrySnapshot, TelemetryStore};

pub const TOPIC_CAPACITY: usize = 64;
pub const PAYLOAD_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherAction {
    StopBroker,
    StartBroker,
    Publish,
    Idle,
}

/// The publisher's decision table.
///
/// | link | broker | must disconnect | action      |
/// |------|--------|-----------------|-------------|
/// | no   | up     | any             | StopBroker  |
/// | up   | up     | yes             | StopBroker  |
/// | up   | down   | any             | StartBroker |
/// | up   | up     | no              | Publish     |
/// | no   | down   | any             | Idle        |
pub const fn decide(flags: ConnectivityFlags) -> PublisherAction {
    match (flags.link_up(), flags.broker_up(), flags.must_disconnect()) {
        (false, true, _) | (true, true, true) => PublisherAction::StopBroker,
        (true, false, _) => PublisherAction::StartBroker,
        (true, true, false) => PublisherAction::Publish,
        (false, false, _) => PublisherAction::Idle,
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerError {
    #[error("broker session not established")]
    NotConnected,
    #[error("broker command queue full")]
    QueueFull,
    #[error("broker transport failure")]
    Transport,
}

/// Control surface of the broker session.
///
/// `start` and `stop` only request the transition; the outcome arrives later
/// as a [`crate::connectivity::BrokerEvent`].
pub trait BrokerClient {
    fn start(&mut self);
    fn stop(&mut self);
    /// QoS 0, not retained.
    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), BrokerError>>;
}

/// One published quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Pm25,
    Pm100,
    Co2,
    Pressure,
    Temperature,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Self::Pm25,
        Self::Pm100,
        Self::Co2,
        Self::Pressure,
        Self::Temperature,
    ];

    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Pm25 => "/pm25",
            Self::Pm100 => "/pm100",
            Self::Co2 => "/co2",
            Self::Pressure => "/pressure",
            Self::Temperature => "/temperature",
        }
    }

    pub const fn source(self) -> SensorKind {
        match self {
            Self::Pm25 | Self::Pm100 => SensorKind::Dust,
            Self::Co2 => SensorKind::Co2,
            Self::Pressure | Self::Temperature => SensorKind::Pressure,
        }
    }
}

/// Detects a slot whose writer stopped storing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Staleness {
    last_revision: Option<u32>,
    unchanged: u8,
    reported: bool,
}

impl Staleness {
    /// Returns `Some(true)` when the slot just became stale and `Some(false)`
    /// when a stale slot recovered.
    fn observe(&mut self, revision: u32, threshold: u8) -> Option<bool> {
        if self.last_revision == Some(revision) {
            self.unchanged = self.unchanged.saturating_add(1);
        } else {
            self.last_revision = Some(revision);
            self.unchanged = 0;
        }

        let stale = threshold > 0 && self.unchanged >= threshold;
        if stale == self.reported {
            return None;
        }
        self.reported = stale;
        Some(stale)
    }
}

pub struct Publisher<'a, B, C> {
    broker: B,
    clock: C,
    connectivity: &'a ConnectivityState,
    store: &'a TelemetryStore,
    config: PublisherConfig<'a>,
    staleness: [Staleness; 3],
}

impl<'a, B, C> Publisher<'a, B, C>
where
    B: BrokerClient,
    C: Clock,
{
    pub fn new(
        broker: B,
        clock: C,
        connectivity: &'a ConnectivityState,
        store: &'a TelemetryStore,
        config: PublisherConfig<'a>,
    ) -> Self {
        Self {
            broker,
            clock,
            connectivity,
            store,
            config,
            staleness: [Staleness::default(); 3],
        }
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub async fn run(mut self) -> ! {
        info!("publisher started");
        loop {
            self.run_cycle().await;
        }
    }

    /// Wait, decide, act, then clear `MUST_DISCONNECT` if this cycle saw it.
    pub async fn run_cycle(&mut self) -> PublisherAction {
        let flags = self
            .connectivity
            .wait_for(
                &self.clock,
                ConnectivityFlags::MUST_DISCONNECT,
                self.config.poll_interval,
            )
            .await;

        let action = decide(flags);
        debug!("publisher: {:?} -> {:?}", flags, action);

        match action {
            PublisherAction::StopBroker => {
                info!("publisher: stopping broker session");
                self.broker.stop();
                self.connectivity.clear(ConnectivityFlags::BROKER_UP);
            }
            PublisherAction::StartBroker => {
                info!("publisher: starting broker session");
                self.broker.start();
            }
            PublisherAction::Publish => self.publish().await,
            PublisherAction::Idle => {}
        }

        if flags.must_disconnect() {
            self.connectivity.clear(ConnectivityFlags::MUST_DISCONNECT);
        }
        action
    }

    async fn publish(&mut self) {
        let snapshot = self
            .store
            .snapshot(&self.clock, self.config.lock_timeout)
            .await;
        self.track_staleness(&snapshot);

        for metric in Metric::ALL {
            let Some(payload) = self.payload(&snapshot, metric) else {
                continue;
            };
            let Some(topic) = self.topic(metric) else {
                continue;
            };

            if let Err(e) = self.broker.publish(&topic, payload.as_bytes()).await {
                warn!("publisher: {} on {}, dropping remaining messages", e, topic);
                return;
            }
            debug!("publisher: {} = {}", topic, payload);
        }
    }

    fn topic(&self, metric: Metric) -> Option<String<TOPIC_CAPACITY>> {
        let layout = self.config.topics;
        let mut topic = String::new();
        match write!(topic, "{}{}{}", layout.prefix, layout.device_id, metric.suffix()) {
            Ok(()) => Some(topic),
            Err(_) => {
                warn!("publisher: topic for {:?} exceeds {} bytes", metric, TOPIC_CAPACITY);
                None
            }
        }
    }

    fn payload(
        &self,
        snapshot: &TelemetrySnapshot,
        metric: Metric,
    ) -> Option<String<PAYLOAD_CAPACITY>> {
        let mut payload = String::new();
        let written = match metric {
            Metric::Pm25 => slot(snapshot.dust, metric).map(|d| write!(payload, "{}", d.pm25)),
            Metric::Pm100 => slot(snapshot.dust, metric).map(|d| write!(payload, "{}", d.pm100)),
            Metric::Co2 => slot(snapshot.co2, metric).map(|c| write!(payload, "{}", c.ppm)),
            Metric::Pressure => slot(snapshot.pressure, metric).map(|p| {
                let converted = self.config.pressure_unit.convert_pascals(p.pressure_pa);
                write!(payload, "{:.0}", converted)
            }),
            Metric::Temperature => {
                slot(snapshot.pressure, metric).map(|p| write!(payload, "{:.1}", p.temperature_c))
            }
        };

        match written? {
            Ok(()) => Some(payload),
            Err(_) => {
                warn!("publisher: {:?} payload does not fit", metric);
                None
            }
        }
    }

    fn track_staleness(&mut self, snapshot: &TelemetrySnapshot) {
        let threshold = self.config.stale_after_cycles;
        let revisions = [
            snapshot.co2.map(|s| s.revision),
            snapshot.dust.map(|s| s.revision),
            snapshot.pressure.map(|s| s.revision),
        ];

        for ((kind, tracker), revision) in SensorKind::ALL
            .iter()
            .zip(self.staleness.iter_mut())
            .zip(revisions)
        {
            let Some(revision) = revision else { continue };
            match tracker.observe(revision, threshold) {
                Some(true) => warn!(
                    "publisher: {} readings have not changed for {} cycles",
                    kind.name(),
                    threshold
                ),
                Some(false) => info!("publisher: {} readings resumed", kind.name()),
                None => {}
            }
        }
    }
}

/// The slot's value, or `None` with a warning if its lock timed out.
fn slot<T: Copy>(snapshot: Option<SlotSnapshot<T>>, metric: Metric) -> Option<T> {
    match snapshot {
        Some(s) => Some(s.value),
        None => {
            warn!(
                "publisher: {} slot busy, skipping {:?}",
                metric.source().name(),
                metric
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PressureUnit, TopicLayout};
    use crate::connectivity::BrokerEvent;
    use crate::sensors::{Co2Reading, DustReading, PressureReading};
    use crate::testing::{InstantClock, RecordingBroker, logs};
    use embassy_futures::block_on;
    use embassy_time::Duration;
    use log::Level;

    const LOCK: Duration = Duration::from_secs(2);

    fn flags(link: bool, broker: bool, must: bool) -> ConnectivityFlags {
        let mut flags = ConnectivityFlags::empty();
        flags.set(ConnectivityFlags::LINK_UP, link);
        flags.set(ConnectivityFlags::BROKER_UP, broker);
        flags.set(ConnectivityFlags::MUST_DISCONNECT, must);
        flags
    }

    fn fill(store: &TelemetryStore, clock: &InstantClock) {
        block_on(async {
            store
                .co2()
                .with_lock(clock, LOCK, |s| s.store(Co2Reading { ppm: 800 }))
                .await
                .unwrap();
            store
                .dust()
                .with_lock(clock, LOCK, |s| s.store(DustReading { pm25: 12, pm100: 31 }))
                .await
                .unwrap();
            store
                .pressure()
                .with_lock(clock, LOCK, |s| {
                    s.store(PressureReading {
                        temperature_c: 25.08,
                        pressure_pa: 100_653.27,
                    })
                })
                .await
                .unwrap();
        });
    }

    #[test]
    fn test_decision_table() {
        use PublisherAction::*;
        let rows = [
            ((false, false, false), Idle),
            ((false, false, true), Idle),
            ((false, true, false), StopBroker),
            ((false, true, true), StopBroker),
            ((true, false, false), StartBroker),
            ((true, false, true), StartBroker),
            ((true, true, false), Publish),
            ((true, true, true), StopBroker),
        ];
        for ((link, broker, must), expected) in rows {
            assert_eq!(decide(flags(link, broker, must)), expected, "{link} {broker} {must}");
        }
    }

    #[test]
    fn test_broker_up_without_link_stops_and_clears_flags() {
        let connectivity = ConnectivityState::default();
        let store = TelemetryStore::new();
        let clock = InstantClock::new();
        connectivity.set(ConnectivityFlags::BROKER_UP);
        let mut publisher = Publisher::new(
            RecordingBroker::new(),
            &clock,
            &connectivity,
            &store,
            PublisherConfig::default(),
        );

        assert_eq!(block_on(publisher.run_cycle()), PublisherAction::StopBroker);

        assert_eq!(publisher.broker().stops, 1);
        assert!(!connectivity.broker_up());
        assert!(!connectivity.must_disconnect());
        assert_eq!(clock.timeouts(), alloc::vec![Duration::from_secs(10)]);
    }

    #[test]
    fn test_must_disconnect_is_cleared_after_any_cycle() {
        let connectivity = ConnectivityState::default();
        let store = TelemetryStore::new();
        let clock = InstantClock::new();
        connectivity.set(ConnectivityFlags::LINK_UP | ConnectivityFlags::MUST_DISCONNECT);
        let mut publisher = Publisher::new(
            RecordingBroker::new(),
            &clock,
            &connectivity,
            &store,
            PublisherConfig::default(),
        );

        assert_eq!(block_on(publisher.run_cycle()), PublisherAction::StartBroker);
        assert_eq!(publisher.broker().starts, 1);
        assert!(!connectivity.must_disconnect());
        assert!(connectivity.link_up());
        // The flag was already set, so the cycle did not wait.
        assert!(clock.timeouts().is_empty());
    }

    /// Broker whose session reports back through the bitset while the
    /// publisher is mid-call.
    struct SessionBroker<'a> {
        connectivity: &'a ConnectivityState,
        fail_during_publish: bool,
        starts: usize,
        stops: usize,
        published: usize,
    }

    impl<'a> SessionBroker<'a> {
        fn new(connectivity: &'a ConnectivityState) -> Self {
            Self {
                connectivity,
                fail_during_publish: false,
                starts: 0,
                stops: 0,
                published: 0,
            }
        }
    }

    impl BrokerClient for SessionBroker<'_> {
        /// A session that is still up answers a repeated start with `Connected`.
        fn start(&mut self) {
            self.starts += 1;
            self.connectivity.handle_broker_event(BrokerEvent::Connected);
        }

        /// Models a stop the session never acted on.
        fn stop(&mut self) {
            self.stops += 1;
        }

        async fn publish(&mut self, _topic: &str, _payload: &[u8]) -> Result<(), BrokerError> {
            if self.fail_during_publish {
                self.connectivity.handle_broker_event(BrokerEvent::Error);
            }
            self.published += 1;
            Ok(())
        }
    }

    #[test]
    fn test_session_error_during_publish_stops_next_cycle() {
        let connectivity = ConnectivityState::default();
        let store = TelemetryStore::new();
        let clock = InstantClock::new();
        connectivity.set(ConnectivityFlags::LINK_UP | ConnectivityFlags::BROKER_UP);
        let mut broker = SessionBroker::new(&connectivity);
        broker.fail_during_publish = true;
        let mut publisher =
            Publisher::new(broker, &clock, &connectivity, &store, PublisherConfig::default());

        assert_eq!(block_on(publisher.run_cycle()), PublisherAction::Publish);
        // Raised after the cycle looked, so it survives the cycle.
        assert!(connectivity.must_disconnect());

        assert_eq!(block_on(publisher.run_cycle()), PublisherAction::StopBroker);
        assert_eq!(publisher.broker().stops, 1);
        assert!(!connectivity.must_disconnect());
        assert!(!connectivity.broker_up());
    }

    #[test]
    fn test_restart_of_live_session_resumes_publishing() {
        let connectivity = ConnectivityState::default();
        let store = TelemetryStore::new();
        let clock = InstantClock::new();
        fill(&store, &clock);
        connectivity.set(
            ConnectivityFlags::LINK_UP
                | ConnectivityFlags::BROKER_UP
                | ConnectivityFlags::MUST_DISCONNECT,
        );
        let mut publisher = Publisher::new(
            SessionBroker::new(&connectivity),
            &clock,
            &connectivity,
            &store,
            PublisherConfig::default(),
        );

        assert_eq!(block_on(publisher.run_cycle()), PublisherAction::StopBroker);
        assert_eq!(block_on(publisher.run_cycle()), PublisherAction::StartBroker);
        assert!(connectivity.broker_up());
        assert_eq!(block_on(publisher.run_cycle()), PublisherAction::Publish);

        let broker = publisher.broker();
        assert_eq!((broker.stops, broker.starts), (1, 1));
        assert_eq!(broker.published, Metric::ALL.len());
    }

    #[test]
    fn test_publishes_every_metric_in_steady_state() {
        let connectivity = ConnectivityState::default();
        let store = TelemetryStore::new();
        let clock = InstantClock::new();
        fill(&store, &clock);
        connectivity.set(ConnectivityFlags::LINK_UP | ConnectivityFlags::BROKER_UP);
        let mut publisher = Publisher::new(
            RecordingBroker::new(),
            &clock,
            &connectivity,
            &store,
            PublisherConfig::default(),
        );

        assert_eq!(block_on(publisher.run_cycle()), PublisherAction::Publish);

        let broker = publisher.broker();
        assert_eq!(
            broker.topics(),
            alloc::vec![
                "sensors/dust/pm25",
                "sensors/dust/pm100",
                "sensors/dust/co2",
                "sensors/dust/pressure",
                "sensors/dust/temperature",
            ]
        );
        assert_eq!(broker.payload("sensors/dust/pm25"), Some("12"));
        assert_eq!(broker.payload("sensors/dust/pm100"), Some("31"));
        assert_eq!(broker.payload("sensors/dust/co2"), Some("800"));
        assert_eq!(broker.payload("sensors/dust/pressure"), Some("1007"));
        assert_eq!(broker.payload("sensors/dust/temperature"), Some("25.1"));
    }

    #[test]
    fn test_pressure_unit_and_topic_layout_are_configurable() {
        let connectivity = ConnectivityState::default();
        let store = TelemetryStore::new();
        let clock = InstantClock::new();
        fill(&store, &clock);
        connectivity.set(ConnectivityFlags::LINK_UP | ConnectivityFlags::BROKER_UP);
        let config = PublisherConfig {
            topics: TopicLayout {
                prefix: "home/",
                device_id: "kitchen",
            },
            pressure_unit: PressureUnit::MillimetersOfMercury,
            ..PublisherConfig::default()
        };
        let mut publisher =
            Publisher::new(RecordingBroker::new(), &clock, &connectivity, &store, config);

        block_on(publisher.run_cycle());

        assert_eq!(publisher.broker().payload("home/kitchen/pressure"), Some("755"));
    }

    #[test]
    fn test_unwritten_slots_publish_zero() {
        let connectivity = ConnectivityState::default();
        let store = TelemetryStore::new();
        let clock = InstantClock::new();
        connectivity.set(ConnectivityFlags::LINK_UP | ConnectivityFlags::BROKER_UP);
        let mut publisher = Publisher::new(
            RecordingBroker::new(),
            &clock,
            &connectivity,
            &store,
            PublisherConfig::default(),
        );

        block_on(publisher.run_cycle());

        let broker = publisher.broker();
        assert_eq!(broker.payload("sensors/dust/co2"), Some("0"));
        assert_eq!(broker.payload("sensors/dust/temperature"), Some("0.0"));
    }

    #[test]
    fn test_no_broker_calls_outside_steady_state() {
        let connectivity = ConnectivityState::default();
        let store = TelemetryStore::new();
        let clock = InstantClock::new();
        fill(&store, &clock);
        let mut publisher = Publisher::new(
            RecordingBroker::new(),
            &clock,
            &connectivity,
            &store,
            PublisherConfig::default(),
        );

        assert_eq!(block_on(publisher.run_cycle()), PublisherAction::Idle);

        let broker = publisher.broker();
        assert_eq!((broker.starts, broker.stops, broker.attempts), (0, 0, 0));
    }

    #[test]
    fn test_broker_error_abandons_remaining_messages() {
        let connectivity = ConnectivityState::default();
        let store = TelemetryStore::new();
        let clock = InstantClock::new();
        connectivity.set(ConnectivityFlags::LINK_UP | ConnectivityFlags::BROKER_UP);
        let mut broker = RecordingBroker::new();
        broker.reject_publishes = Some(BrokerError::QueueFull);
        let mut publisher =
            Publisher::new(broker, &clock, &connectivity, &store, PublisherConfig::default());

        let (_, records) = logs::capture(|| block_on(publisher.run_cycle()));

        assert_eq!(publisher.broker().attempts, 1);
        assert!(
            logs::at(&records, Level::Warn)
                .iter()
                .any(|w| w.contains("queue full"))
        );
    }

    #[test]
    fn test_busy_slot_skips_only_its_metrics() {
        let connectivity = ConnectivityState::default();
        let store = TelemetryStore::new();
        let clock = InstantClock::new();
        fill(&store, &clock);
        connectivity.set(ConnectivityFlags::LINK_UP | ConnectivityFlags::BROKER_UP);
        let mut publisher = Publisher::new(
            RecordingBroker::new(),
            &clock,
            &connectivity,
            &store,
            PublisherConfig::default(),
        );
        let _held = block_on(store.pressure().hold());

        block_on(publisher.run_cycle());

        assert_eq!(
            publisher.broker().topics(),
            alloc::vec!["sensors/dust/pm25", "sensors/dust/pm100", "sensors/dust/co2"]
        );
    }

    #[test]
    fn test_stale_slot_is_reported_once_and_recovery_logged() {
        let connectivity = ConnectivityState::default();
        let store = TelemetryStore::new();
        let clock = InstantClock::new();
        fill(&store, &clock);
        connectivity.set(ConnectivityFlags::LINK_UP | ConnectivityFlags::BROKER_UP);
        let config = PublisherConfig {
            stale_after_cycles: 2,
            ..PublisherConfig::default()
        };
        let mut publisher =
            Publisher::new(RecordingBroker::new(), &clock, &connectivity, &store, config);

        let (_, records) = logs::capture(|| {
            for _ in 0..5 {
                block_on(publisher.run_cycle());
            }
        });
        let stale: alloc::vec::Vec<_> = logs::at(&records, Level::Warn)
            .into_iter()
            .filter(|w| w.contains("have not changed"))
            .collect();
        // All three slots went stale on the third cycle, and were reported once.
        assert_eq!(stale.len(), 3);

        block_on(
            store
                .co2()
                .with_lock(&clock, LOCK, |s| s.store(Co2Reading { ppm: 900 })),
        )
        .unwrap();
        let (_, records) = logs::capture(|| block_on(publisher.run_cycle()));
        assert!(
            logs::at(&records, Level::Info)
                .iter()
                .any(|m| m.contains("co2 readings resumed"))
        );
    }
}

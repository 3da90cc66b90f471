//! Time source abstraction
//!
//! Every blocking point in the pipeline (serial reads, slot locks, the
//! connectivity wait and the inter-cycle sleep) goes through a [`Clock`], so the
//! tasks can be driven deterministically in tests and by the simulator.

use core::future::Future;

use embassy_time::{Duration, TimeoutError, Timer};

/// Injectable sleep / timeout provider.
pub trait Clock {
    /// Suspend the calling task for `duration`.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()>;

    /// Run `future` to completion unless `duration` elapses first.
    fn timeout<F: Future>(
        &self,
        duration: Duration,
        future: F,
    ) -> impl Future<Output = Result<F::Output, TimeoutError>>;
}

impl<C: Clock> Clock for &C {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> {
        (**self).sleep(duration)
    }

    fn timeout<F: Future>(
        &self,
        duration: Duration,
        future: F,
    ) -> impl Future<Output = Result<F::Output, TimeoutError>> {
        (**self).timeout(duration, future)
    }
}

/// [`Clock`] backed by the embassy time driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    async fn sleep(&self, duration: Duration) {
        Timer::after(duration).await;
    }

    async fn timeout<F: Future>(
        &self,
        duration: Duration,
        future: F,
    ) -> Result<F::Output, TimeoutError> {
        embassy_time::with_timeout(duration, future).await
    }
}

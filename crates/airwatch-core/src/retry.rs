/// Bounded failure counter scoped to a single operation.
///
/// One budget covers one frame read, one lock acquisition or one reconnect
/// sequence. It is created fresh for each operation and never carried over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    failures: u8,
    max: u8,
}

/// The budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted {
    pub failures: u8,
}

impl RetryBudget {
    pub const fn new(max: u8) -> Self {
        Self { failures: 0, max }
    }

    /// Record one failed attempt.
    ///
    /// The budget tolerates `max` failures; the one after that reports
    /// [`Exhausted`], so a caller makes at most `max + 1` attempts.
    pub fn record_failure(&mut self) -> Result<(), Exhausted> {
        self.failures = self.failures.saturating_add(1);
        if self.failures > self.max {
            Err(Exhausted {
                failures: self.failures,
            })
        } else {
            Ok(())
        }
    }

    /// Take one retry if any remain, for counters that are checked before the
    /// attempt is made (reconnects).
    pub fn try_consume(&mut self) -> bool {
        if self.failures < self.max {
            self.failures += 1;
            true
        } else {
            false
        }
    }

    /// Count a retry without checking the limit.
    pub fn consume(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub const fn failures(&self) -> u8 {
        self.failures
    }

    pub const fn max(&self) -> u8 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_failure_allows_max_failures() {
        let mut budget = RetryBudget::new(20);
        for _ in 0..20 {
            assert!(budget.record_failure().is_ok());
        }
        assert_eq!(budget.record_failure(), Err(Exhausted { failures: 21 }));
    }

    #[test]
    fn test_try_consume_stops_at_max() {
        let mut budget = RetryBudget::new(2);
        assert!(budget.try_consume());
        assert!(budget.try_consume());
        assert!(!budget.try_consume());
        assert_eq!(budget.failures(), 2);

        budget.reset();
        assert!(budget.try_consume());
    }

    #[test]
    fn test_zero_budget_fails_first_attempt() {
        let mut budget = RetryBudget::new(0);
        assert!(budget.record_failure().is_err());
    }
}

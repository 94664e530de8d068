use std::cell::Cell;

use chrono::{DateTime, Duration, SubsecRound, Utc};

/// Server timestamp source.
///
/// Timestamps are truncated to microseconds (the stored precision) and are
/// strictly increasing for the lifetime of the store, so two messages never
/// share an ordering key.
pub(crate) struct ServerClock {
    last: Cell<Option<DateTime<Utc>>>,
}

impl ServerClock {
    pub fn starting_after(last: Option<DateTime<Utc>>) -> Self {
        Self {
            last: Cell::new(last),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let mut ts = Utc::now().trunc_subsecs(6);
        if let Some(last) = self.last.get() {
            if ts <= last {
                ts = last + Duration::microseconds(1);
            }
        }
        self.last.set(Some(ts));
        ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strictly_increasing() {
        let clock = ServerClock::starting_after(None);
        let mut prev = clock.now();
        for _ in 0..1000 {
            let next = clock.now();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_never_goes_behind_persisted_value() {
        let future = Utc::now() + Duration::hours(1);
        let clock = ServerClock::starting_after(Some(future));
        assert!(clock.now() > future);
    }
}

//! A minimal clock driving [`ConsumerGroup::heartbeat`](crate::client::consumer_group::ConsumerGroup::heartbeat)
//! calls. Deliberately tiny -- one struct, one method -- in the same spirit as the
//! backoff envelope's `next()`: the caller's consumer loop decides when to call
//! [`trigger`](Heartbeat::trigger), this just decides whether it's time yet.

use std::time::{Duration, Instant};

use crate::client::consumer_group::ConsumerGroup;
use crate::client::error::Result;

/// Fires a heartbeat at most once per `interval`. Must be driven more often than the
/// group's session timeout or the coordinator expels this member; the consumer loop
/// calls [`trigger`](Self::trigger) between fetch cycles.
#[derive(Debug)]
pub struct Heartbeat {
    interval: Duration,
    last_sent: Instant,
}

impl Heartbeat {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: Instant::now() - interval,
        }
    }

    /// Sends a heartbeat if `interval` has elapsed since the last one, returning
    /// whether it actually sent one. `group` transparently rejoins on a
    /// `REBALANCE_IN_PROGRESS`/`ILLEGAL_GENERATION`/`UNKNOWN_MEMBER_ID` response, so a
    /// successful return means this member's heartbeat is current, though its partition
    /// assignment may have changed underneath -- check
    /// [`ConsumerGroup::assignment`](crate::client::consumer_group::ConsumerGroup::assignment)
    /// again after a call that took longer than usual.
    pub async fn trigger(&mut self, group: &ConsumerGroup) -> Result<bool> {
        if self.last_sent.elapsed() < self.interval {
            return Ok(false);
        }

        group.heartbeat().await?;
        self.last_sent = Instant::now();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_heartbeat_is_immediately_due() {
        let hb = Heartbeat::new(Duration::from_secs(10));
        assert!(hb.last_sent.elapsed() >= Duration::from_secs(10));
    }
}

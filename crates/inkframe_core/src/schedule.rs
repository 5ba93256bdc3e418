//! Coalescing redraw trigger
//!
//! Preview redraws are cheap to drop: when several requests arrive before the
//! host's next paint opportunity only the last one runs. The trigger owns no
//! timer; the host loop calls [`CoalescingTrigger::poll`] with its clock.

use std::time::{Duration, Instant};

/// When a pending request becomes due
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoalescePolicy {
    /// Due at the first poll after the request; later requests only replace the payload
    NextFrame,
    /// Due `delay` after the most recent request; every request re-arms the deadline
    Debounce(Duration),
}

#[derive(Debug)]
struct Pending<T> {
    payload: T,
    due: Instant,
}

/// Last-request-wins trigger
#[derive(Debug)]
pub struct CoalescingTrigger<T> {
    policy: CoalescePolicy,
    pending: Option<Pending<T>>,
    superseded: u64,
}

impl<T> CoalescingTrigger<T> {
    pub fn new(policy: CoalescePolicy) -> Self {
        Self {
            policy,
            pending: None,
            superseded: 0,
        }
    }

    /// Coalesce into the next paint opportunity
    pub fn next_frame() -> Self {
        Self::new(CoalescePolicy::NextFrame)
    }

    pub fn debounced(delay: Duration) -> Self {
        Self::new(CoalescePolicy::Debounce(delay))
    }

    /// Queue `payload`, replacing any request that has not fired yet
    ///
    /// Returns `true` when an earlier request was superseded.
    pub fn request(&mut self, payload: T, now: Instant) -> bool {
        let due = match (self.policy, &self.pending) {
            (CoalescePolicy::NextFrame, Some(pending)) => pending.due,
            (CoalescePolicy::NextFrame, None) => now,
            (CoalescePolicy::Debounce(delay), _) => now + delay,
        };
        let replaced = self.pending.replace(Pending { payload, due }).is_some();
        if replaced {
            self.superseded += 1;
            tracing::trace!("coalesced redraw request ({} superseded)", self.superseded);
        }
        replaced
    }

    /// Drop the pending request, if any
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|pending| pending.payload)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|pending| pending.due)
    }

    /// Number of requests dropped in favour of a later one
    pub fn superseded(&self) -> u64 {
        self.superseded
    }

    /// Take the pending payload if it is due at `now`
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some(pending) if pending.due <= now => self.cancel(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_frame_runs_only_the_last_request() {
        let mut trigger = CoalescingTrigger::next_frame();
        let now = Instant::now();
        assert!(!trigger.request(1, now));
        assert!(trigger.request(2, now));
        assert!(trigger.request(3, now + Duration::from_millis(5)));

        assert_eq!(trigger.poll(now + Duration::from_millis(16)), Some(3));
        assert_eq!(trigger.poll(now + Duration::from_millis(32)), None);
        assert_eq!(trigger.superseded(), 2);
    }

    #[test]
    fn debounce_rearms_on_every_request() {
        let mut trigger = CoalescingTrigger::debounced(Duration::from_millis(250));
        let start = Instant::now();
        trigger.request("a", start);
        trigger.request("b", start + Duration::from_millis(200));

        // The first deadline has passed but the second request pushed it out
        assert_eq!(trigger.poll(start + Duration::from_millis(300)), None);
        assert_eq!(trigger.poll(start + Duration::from_millis(450)), Some("b"));
    }

    #[test]
    fn cancel_discards_pending_work() {
        let mut trigger = CoalescingTrigger::next_frame();
        let now = Instant::now();
        trigger.request(7, now);
        assert_eq!(trigger.cancel(), Some(7));
        assert!(!trigger.is_pending());
        assert_eq!(trigger.poll(now + Duration::from_secs(1)), None);
    }
}

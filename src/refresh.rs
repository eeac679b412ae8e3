//! Supplementary player fetches issued when a stream event implies roster
//! changes the stream itself does not carry.
//!
//! Each request runs as its own task and reports back over a channel owned by
//! the dispatch loop, so completions are applied on the same task that
//! applies stream events. Requests are numbered; the numbers make the
//! out-of-order hazard visible without changing the default outcome:
//!
//! - [`RefreshOrdering::ArrivalOrder`] (default): whichever response arrives
//!   last wins, even if it answers an older request.
//! - [`RefreshOrdering::RequestOrder`]: a response older than one already
//!   applied is discarded.
//!
//! Teardown does not cancel requests in flight. Their completions land on a
//! closed channel and are dropped. A stream that ends on its own is not
//! teardown: the dispatch loop keeps receiving until [`in_flight`] is zero.
//!
//! [`in_flight`]: RefreshCoordinator::in_flight

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::MatchApi;
use crate::error::Result;
use crate::protocol::{MatchId, Player};
use crate::reconcile::RefreshReason;

/// How to order refresh responses that complete out of request order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshOrdering {
    /// Apply every response as it arrives; the last to arrive wins.
    #[default]
    ArrivalOrder,
    /// Discard responses older than the newest one already applied.
    RequestOrder,
}

/// A finished refresh request.
#[derive(Debug)]
pub struct RefreshCompletion {
    pub seq: u64,
    pub reason: RefreshReason,
    pub result: Result<Vec<Player>>,
}

/// What to do with a successful completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Replace the players. `out_of_order` is set when a newer request's
    /// response was already applied.
    Apply { out_of_order: bool },
    /// Drop the response; `newest_applied` already superseded it.
    Discard { newest_applied: u64 },
}

/// Issues refreshes for one match and sequences their completions.
pub struct RefreshCoordinator {
    api: Arc<dyn MatchApi>,
    match_id: MatchId,
    ordering: RefreshOrdering,
    next_seq: u64,
    newest_applied: Option<u64>,
    in_flight: u64,
    completions: mpsc::UnboundedSender<RefreshCompletion>,
}

impl RefreshCoordinator {
    /// Create a coordinator and the receiver its completions arrive on.
    pub fn new(
        api: Arc<dyn MatchApi>,
        match_id: MatchId,
        ordering: RefreshOrdering,
    ) -> (Self, mpsc::UnboundedReceiver<RefreshCompletion>) {
        let (completions, rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            api,
            match_id,
            ordering,
            next_seq: 0,
            newest_applied: None,
            in_flight: 0,
            completions,
        };
        (coordinator, rx)
    }

    /// Start a players refresh in the background and return its sequence
    /// number. Never blocks the caller.
    pub fn request(&mut self, reason: RefreshReason) -> u64 {
        self.next_seq += 1;
        self.in_flight += 1;
        let seq = self.next_seq;
        let api = Arc::clone(&self.api);
        let match_id = self.match_id;
        let tx = self.completions.clone();

        debug!(seq, ?reason, "players refresh requested");
        tokio::spawn(async move {
            let result = api.fetch_players(match_id).await;
            if tx
                .send(RefreshCompletion {
                    seq,
                    reason,
                    result,
                })
                .is_err()
            {
                debug!(seq, "refresh completed after teardown; dropped");
            }
        });
        seq
    }

    /// Mark one request as finished, whatever its outcome.
    pub fn settle(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Requests issued but not yet settled.
    pub fn in_flight(&self) -> u64 {
        self.in_flight
    }

    /// Decide whether a successful completion should be applied, and record
    /// it as applied if so.
    pub fn resolve(&mut self, seq: u64) -> Resolution {
        let out_of_order = self.newest_applied.is_some_and(|newest| seq < newest);
        match (self.ordering, self.newest_applied) {
            (RefreshOrdering::RequestOrder, Some(newest)) if out_of_order => {
                debug!(seq, newest, "discarding superseded refresh");
                Resolution::Discard {
                    newest_applied: newest,
                }
            }
            _ => {
                if out_of_order {
                    warn!(
                        seq,
                        newest = ?self.newest_applied,
                        "applying refresh response out of request order"
                    );
                }
                self.newest_applied = Some(self.newest_applied.map_or(seq, |n| n.max(seq)));
                Resolution::Apply { out_of_order }
            }
        }
    }

    /// Number of requests issued so far.
    pub fn issued(&self) -> u64 {
        self.next_seq
    }

    pub fn ordering(&self) -> RefreshOrdering {
        self.ordering
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("match_id", &self.match_id)
            .field("ordering", &self.ordering)
            .field("issued", &self.next_seq)
            .field("newest_applied", &self.newest_applied)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error::ObserverError;
    use crate::protocol::{ControlCommand, ExportDocument, MatchState, Phase};
    use async_trait::async_trait;

    struct FixedRoster;

    #[async_trait]
    impl MatchApi for FixedRoster {
        async fn fetch_state(&self, _match_id: MatchId) -> Result<MatchState> {
            Ok(MatchState {
                game_id: None,
                day: 1,
                phase: Phase::Night,
                seconds_remaining: 0,
                transcript: vec![],
                players: vec![Player {
                    id: "p".into(),
                    name: "P".into(),
                    role: "Villager".into(),
                    is_alive: false,
                }],
                is_paused: false,
                winner: None,
            })
        }

        async fn send_control(&self, _: MatchId, _: ControlCommand) -> Result<()> {
            Err(ObserverError::Request("not scripted".into()))
        }

        async fn export(&self, _: MatchId, _: bool) -> Result<ExportDocument> {
            Err(ObserverError::Request("not scripted".into()))
        }
    }

    fn coordinator(ordering: RefreshOrdering) -> RefreshCoordinator {
        RefreshCoordinator::new(Arc::new(FixedRoster), MatchId::nil(), ordering).0
    }

    #[tokio::test]
    async fn request_numbers_increase_and_complete() {
        let (mut c, mut rx) =
            RefreshCoordinator::new(Arc::new(FixedRoster), MatchId::nil(), RefreshOrdering::default());
        assert_eq!(c.request(RefreshReason::PhaseStart), 1);
        assert_eq!(c.request(RefreshReason::GameOver), 2);
        assert_eq!(c.issued(), 2);
        assert_eq!(c.in_flight(), 2);

        let mut seen = vec![];
        for _ in 0..2 {
            let done = rx.recv().await.unwrap();
            assert_eq!(done.result.unwrap().len(), 1);
            c.settle();
            seen.push(done.seq);
        }
        seen.sort_unstable();
        assert_eq!(seen, [1, 2]);
        assert_eq!(c.in_flight(), 0);

        c.settle();
        assert_eq!(c.in_flight(), 0);
    }

    #[tokio::test]
    async fn arrival_order_applies_stale_responses() {
        let mut c = coordinator(RefreshOrdering::ArrivalOrder);
        assert_eq!(c.resolve(2), Resolution::Apply { out_of_order: false });
        assert_eq!(c.resolve(1), Resolution::Apply { out_of_order: true });
        // The newest applied stays at 2.
        assert_eq!(c.resolve(1), Resolution::Apply { out_of_order: true });
        assert_eq!(c.resolve(3), Resolution::Apply { out_of_order: false });
    }

    #[tokio::test]
    async fn request_order_discards_stale_responses() {
        let mut c = coordinator(RefreshOrdering::RequestOrder);
        assert_eq!(c.resolve(2), Resolution::Apply { out_of_order: false });
        assert_eq!(c.resolve(1), Resolution::Discard { newest_applied: 2 });
        assert_eq!(c.resolve(3), Resolution::Apply { out_of_order: false });
    }

    #[tokio::test]
    async fn completion_after_receiver_drop_is_silent() {
        let (mut c, rx) =
            RefreshCoordinator::new(Arc::new(FixedRoster), MatchId::nil(), RefreshOrdering::default());
        drop(rx);
        c.request(RefreshReason::PhaseStart);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(c.issued(), 1);
    }
}

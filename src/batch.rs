// Bounded fan-out of one action over the players picked by a selector.

use std::future::Future;

use futures::stream::{self, StreamExt};

use crate::crcon::types::Player;
use crate::error::{BotError, BotResult};
use crate::metrics;
use crate::selector::IndexSelector;

/// Result for one selected index.
#[derive(Debug)]
pub struct BatchOutcome {
    pub index: u32,
    /// `None` when the index was outside the roster.
    pub player: Option<Player>,
    pub result: BotResult<()>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run `action` for every selected roster entry with at most `concurrency`
/// calls in flight. Every index gets an outcome; results come back in
/// ascending index order.
pub async fn run_batch<F, Fut>(
    roster: &[Player],
    selector: &IndexSelector,
    concurrency: usize,
    action: F,
) -> Vec<BatchOutcome>
where
    F: Fn(Player) -> Fut,
    Fut: Future<Output = BotResult<()>>,
{
    let action = &action;
    let mut outcomes: Vec<BatchOutcome> = stream::iter(selector.iter())
        .map(|index| async move {
            let Some(player) = roster.get(index as usize - 1).cloned() else {
                return BatchOutcome {
                    index,
                    player: None,
                    result: Err(BotError::IndexOutOfRange {
                        index,
                        max: roster.len(),
                    }),
                };
            };
            metrics::BATCH_IN_FLIGHT.inc();
            let result = action(player.clone()).await;
            metrics::BATCH_IN_FLIGHT.dec();
            BatchOutcome {
                index,
                player: Some(player),
                result,
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;
    outcomes.sort_by_key(|o| o.index);
    outcomes
}

pub fn count_succeeded(outcomes: &[BatchOutcome]) -> usize {
    outcomes.iter().filter(|o| o.succeeded()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crcon::ServerTarget;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn roster(n: usize) -> Vec<Player> {
        (1..=n)
            .map(|i| Player {
                name: format!("p{i}"),
                player_id: format!("id{i}"),
                ..Default::default()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_partial_failure_reported_per_index() {
        let roster = roster(5);
        let selector = IndexSelector::parse("1,3,5").unwrap();

        let outcomes = run_batch(&roster, &selector, 4, |p| async move {
            if p.player_id == "id3" {
                Err(BotError::ApiError {
                    operation: "kick",
                    server: ServerTarget::default(),
                    status: Some(500),
                    message: "boom".into(),
                })
            } else {
                Ok(())
            }
        })
        .await;

        let indices: Vec<u32> = outcomes.iter().map(|o| o.index).collect();
        assert_eq!(indices, vec![1, 3, 5]);
        assert!(outcomes[0].succeeded());
        assert!(!outcomes[1].succeeded());
        assert!(outcomes[2].succeeded());
        assert_eq!(count_succeeded(&outcomes), 2);
    }

    #[tokio::test]
    async fn test_out_of_range_indices_skip_action() {
        let roster = roster(2);
        let selector = IndexSelector::parse("2-4").unwrap();
        let calls = AtomicUsize::new(0);

        let outcomes = run_batch(&roster, &selector, 2, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].succeeded());
        assert!(matches!(
            outcomes[1].result,
            Err(BotError::IndexOutOfRange { index: 3, max: 2 })
        ));
        assert!(outcomes[2].player.is_none());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let roster = roster(10);
        let selector = IndexSelector::parse("1-10").unwrap();
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let outcomes = run_batch(&roster, &selector, 3, |_| {
            let active = &active;
            let peak = &peak;
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert_eq!(count_succeeded(&outcomes), 10);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }
}

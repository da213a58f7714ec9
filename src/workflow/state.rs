//! Consumer polling/consuming state machine
//!
//! Drives one consumer's decisions about when to hit the store. The machine
//! balances latency against idle cost: after a successful fetch it assumes
//! more backlog and drains eagerly (`pick_next_interval`); once the queue is
//! empty it parks in `FetchedEmpty` and waits for either a produced-signal
//! (push wakeup, immediate) or the long `polling_interval` fallback that
//! covers lost signals.
//!
//! # Transition table
//!
//! | From         | Trigger                        | To           | Schedule            |
//! |--------------|--------------------------------|--------------|---------------------|
//! | Initial      | start                          | Fetching     | immediate           |
//! | Fetching     | fetch done, event found         | Fetched      | immediate           |
//! | Fetching     | fetch empty, signal latched     | Fetching     | after pick_next     |
//! | Fetching     | fetch empty, no signal          | FetchedEmpty | immediate           |
//! | Fetching     | fetch error                     | Corrupted    | immediate, terminal |
//! | Fetched      | on-enter                       | Fetching     | after pick_next     |
//! | FetchedEmpty | produced-signal                | Fetching     | immediate           |
//! | FetchedEmpty | on-enter fallback              | Fetching     | after polling       |
//! | any          | stop                           | Initial      | unconditional       |
//!
//! Every transition is optimistic: it commits only if the state observed at
//! commit time is still the state the transition was planned against. A
//! stale transition is logged and dropped, never retried; the concurrent
//! scheduling that causes it is expected, not a fault.
//!
//! Timer callbacks, fetch completions and cross-producer notifications may
//! all race on one machine, so the current state lives in a single atomic
//! word guarded by compare-and-swap rather than a lock. The word packs the
//! state together with a generation counter: a pending scheduled transition
//! planned against an earlier occupancy of the same state value fails its
//! CAS instead of firing twice.

use crate::store::error::StoreResult;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strum_macros::Display;

/// Polling/consuming state of one consumer. `Corrupted` is terminal:
/// recovery requires constructing a replacement consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConsumerState {
    Initial,
    Fetching,
    Fetched,
    FetchedEmpty,
    Corrupted,
}

/// What happened, as input to the pure transition function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    Start,
    FetchCompleted { found: bool, signalled: bool },
    FetchFailed,
    ProducedSignal,
}

/// When an accepted transition should commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Schedule {
    Immediate,
    AfterPickNext,
    AfterPolling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Planned {
    pub next: ConsumerState,
    pub schedule: Schedule,
}

/// Pure transition function over the table above. Returns `None` when the
/// trigger is meaningless in the given state.
pub(crate) fn plan(state: ConsumerState, trigger: Trigger) -> Option<Planned> {
    use ConsumerState::*;
    use Schedule::*;

    let planned = match (state, trigger) {
        (Initial, Trigger::Start) => Planned {
            next: Fetching,
            schedule: Immediate,
        },
        (Fetching, Trigger::FetchCompleted { found: true, .. }) => Planned {
            next: Fetched,
            schedule: Immediate,
        },
        (
            Fetching,
            Trigger::FetchCompleted {
                found: false,
                signalled: true,
            },
        ) => Planned {
            next: Fetching,
            schedule: AfterPickNext,
        },
        (
            Fetching,
            Trigger::FetchCompleted {
                found: false,
                signalled: false,
            },
        ) => Planned {
            next: FetchedEmpty,
            schedule: Immediate,
        },
        (Fetching, Trigger::FetchFailed) => Planned {
            next: Corrupted,
            schedule: Immediate,
        },
        (FetchedEmpty, Trigger::ProducedSignal) => Planned {
            next: Fetching,
            schedule: Immediate,
        },
        _ => return None,
    };
    Some(planned)
}

const STATE_MASK: u64 = 0b111;

fn encode(state: ConsumerState) -> u64 {
    match state {
        ConsumerState::Initial => 0,
        ConsumerState::Fetching => 1,
        ConsumerState::Fetched => 2,
        ConsumerState::FetchedEmpty => 3,
        ConsumerState::Corrupted => 4,
    }
}

fn decode(word: u64) -> ConsumerState {
    match word & STATE_MASK {
        0 => ConsumerState::Initial,
        1 => ConsumerState::Fetching,
        2 => ConsumerState::Fetched,
        3 => ConsumerState::FetchedEmpty,
        _ => ConsumerState::Corrupted,
    }
}

fn pack(state: ConsumerState, epoch: u64) -> u64 {
    (epoch << 3) | encode(state)
}

/// Witness of one observed occupancy of a state: the state value plus the
/// generation it was entered in. Two occupancies of the same state value
/// compare unequal, which is what invalidates stale scheduled transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StateToken {
    state: ConsumerState,
    epoch: u64,
}

impl StateToken {
    pub fn state(&self) -> ConsumerState {
        self.state
    }
}

struct StateCell(AtomicU64);

impl StateCell {
    fn new(initial: ConsumerState) -> Self {
        Self(AtomicU64::new(pack(initial, 0)))
    }

    fn load(&self) -> StateToken {
        let word = self.0.load(Ordering::SeqCst);
        StateToken {
            state: decode(word),
            epoch: word >> 3,
        }
    }

    /// Commit `next` iff the cell still holds exactly `expected` (same state
    /// and same generation). Returns the token of the entered state, or the
    /// actual current token on a stale attempt.
    fn try_advance(&self, expected: StateToken, next: ConsumerState) -> Result<StateToken, StateToken> {
        let current = pack(expected.state, expected.epoch);
        let replacement = pack(next, expected.epoch + 1);
        match self
            .0
            .compare_exchange(current, replacement, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => Ok(StateToken {
                state: next,
                epoch: expected.epoch + 1,
            }),
            Err(actual) => Err(StateToken {
                state: decode(actual),
                epoch: actual >> 3,
            }),
        }
    }

    /// Unconditionally install `next`, bumping the generation so every
    /// pending scheduled transition fails its CAS.
    fn force(&self, next: ConsumerState) -> StateToken {
        let mut epoch = 0;
        let _ = self.0.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |word| {
            epoch = (word >> 3) + 1;
            Some(pack(next, epoch))
        });
        StateToken { state: next, epoch }
    }
}

/// Fetch callback: one attempt against the store, `Ok(true)` when events
/// were processed, `Ok(false)` when nothing was eligible.
pub(crate) type FetchFn = Arc<dyn Fn() -> BoxFuture<'static, StoreResult<bool>> + Send + Sync>;

struct MachineInner {
    cell: StateCell,
    /// Latched by a produced-signal arriving during a fetch; consulted only
    /// when choosing the post-fetch state, never to interrupt the fetch.
    produced_signal: AtomicBool,
    pick_next_interval: Duration,
    polling_interval: Duration,
    fetch: FetchFn,
}

/// Compare-and-swap guarded state machine for one consumer.
#[derive(Clone)]
pub struct ConsumerStateMachine {
    inner: Arc<MachineInner>,
}

impl ConsumerStateMachine {
    pub(crate) fn new(
        polling_interval: Duration,
        pick_next_interval: Duration,
        fetch: FetchFn,
    ) -> Self {
        Self {
            inner: Arc::new(MachineInner {
                cell: StateCell::new(ConsumerState::Initial),
                produced_signal: AtomicBool::new(false),
                pick_next_interval,
                polling_interval,
                fetch,
            }),
        }
    }

    pub fn current_state(&self) -> ConsumerState {
        self.inner.cell.load().state()
    }

    /// Enter `Fetching` from `Initial`. A machine that already ran (or is
    /// corrupted) stays where it is.
    pub fn start(&self) {
        let observed = self.inner.cell.load();
        if observed.state() == ConsumerState::Initial {
            MachineInner::transition(Arc::clone(&self.inner), observed, ConsumerState::Fetching);
        } else {
            log::warn!(
                "Ignoring start: state machine is {} rather than {}",
                observed.state(),
                ConsumerState::Initial
            );
        }
    }

    /// Unconditional reset to `Initial`. Pending scheduled transitions are
    /// invalidated through the generation bump, not chased down.
    pub fn stop(&self) {
        let token = self.inner.cell.force(ConsumerState::Initial);
        log::debug!("State machine reset to {}", token.state());
    }

    /// React to a produced-signal: latch it during a fetch, wake an idle
    /// machine immediately, ignore it anywhere else.
    pub fn handle_produced_signal(&self) {
        let observed = self.inner.cell.load();
        match observed.state() {
            ConsumerState::Fetching => {
                self.inner.produced_signal.store(true, Ordering::SeqCst);
            }
            ConsumerState::FetchedEmpty => {
                if let Some(planned) = plan(ConsumerState::FetchedEmpty, Trigger::ProducedSignal) {
                    MachineInner::apply(Arc::clone(&self.inner), observed, planned);
                }
            }
            _ => {}
        }
    }
}

impl MachineInner {
    fn apply(inner: Arc<Self>, expected: StateToken, planned: Planned) {
        match planned.schedule {
            Schedule::Immediate => Self::transition(inner, expected, planned.next),
            Schedule::AfterPickNext => {
                let delay = inner.pick_next_interval;
                Self::schedule_transition(inner, delay, expected, planned.next);
            }
            Schedule::AfterPolling => {
                let delay = inner.polling_interval;
                Self::schedule_transition(inner, delay, expected, planned.next);
            }
        }
    }

    fn transition(inner: Arc<Self>, expected: StateToken, next: ConsumerState) {
        match inner.cell.try_advance(expected, next) {
            Ok(entered) => {
                log::debug!("Entering state {}", entered.state());
                Self::on_enter(inner, entered);
            }
            Err(actual) => {
                log::warn!(
                    "Transition to {} not completed: expected {} but state is {}",
                    next,
                    expected.state(),
                    actual.state()
                );
            }
        }
    }

    fn schedule_transition(
        inner: Arc<Self>,
        delay: Duration,
        expected: StateToken,
        next: ConsumerState,
    ) {
        let current = inner.cell.load();
        if current != expected {
            log::warn!(
                "Skipping scheduled transition to {}: expected {} but state is {}",
                next,
                expected.state(),
                current.state()
            );
            return;
        }

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // try_advance re-validates the expected state at commit time
            Self::transition(inner, expected, next);
        });
    }

    fn on_enter(inner: Arc<Self>, entered: StateToken) {
        match entered.state() {
            ConsumerState::Fetching => {
                // Fresh occupancy, fresh latch; signals landing from here on
                // influence the post-fetch decision.
                inner.produced_signal.store(false, Ordering::SeqCst);

                let task_inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    let trigger = match (task_inner.fetch)().await {
                        Ok(found) => Trigger::FetchCompleted {
                            found,
                            signalled: task_inner.produced_signal.load(Ordering::SeqCst),
                        },
                        Err(err) => {
                            log::error!("Fetch failed, corrupting state machine: {err}");
                            Trigger::FetchFailed
                        }
                    };
                    if let Some(planned) = plan(ConsumerState::Fetching, trigger) {
                        Self::apply(task_inner, entered, planned);
                    }
                });
            }
            ConsumerState::Fetched => {
                // Assume more backlog and drain eagerly.
                let delay = inner.pick_next_interval;
                Self::schedule_transition(inner, delay, entered, ConsumerState::Fetching);
            }
            ConsumerState::FetchedEmpty => {
                // Poll fallback covering lost or unsent produced-signals.
                let delay = inner.polling_interval;
                Self::schedule_transition(inner, delay, entered, ConsumerState::Fetching);
            }
            ConsumerState::Corrupted => {
                log::error!("Consumer state machine corrupted; requires external replacement");
            }
            ConsumerState::Initial => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::error::StoreError;
    use futures::FutureExt;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::timeout;

    #[test]
    fn test_plan_matches_transition_table() {
        use ConsumerState::*;

        let cases = [
            (Initial, Trigger::Start, Some((Fetching, Schedule::Immediate))),
            (
                Fetching,
                Trigger::FetchCompleted {
                    found: true,
                    signalled: false,
                },
                Some((Fetched, Schedule::Immediate)),
            ),
            (
                Fetching,
                Trigger::FetchCompleted {
                    found: true,
                    signalled: true,
                },
                Some((Fetched, Schedule::Immediate)),
            ),
            (
                Fetching,
                Trigger::FetchCompleted {
                    found: false,
                    signalled: true,
                },
                Some((Fetching, Schedule::AfterPickNext)),
            ),
            (
                Fetching,
                Trigger::FetchCompleted {
                    found: false,
                    signalled: false,
                },
                Some((FetchedEmpty, Schedule::Immediate)),
            ),
            (Fetching, Trigger::FetchFailed, Some((Corrupted, Schedule::Immediate))),
            (
                FetchedEmpty,
                Trigger::ProducedSignal,
                Some((Fetching, Schedule::Immediate)),
            ),
            // Triggers that are meaningless in the given state
            (Initial, Trigger::ProducedSignal, None),
            (Fetched, Trigger::ProducedSignal, None),
            (Corrupted, Trigger::ProducedSignal, None),
            (Corrupted, Trigger::Start, None),
            (FetchedEmpty, Trigger::Start, None),
        ];

        for (state, trigger, expected) in cases {
            let planned = plan(state, trigger);
            match expected {
                Some((next, schedule)) => {
                    let planned = planned.unwrap_or_else(|| {
                        panic!("expected a transition for ({state}, {trigger:?})")
                    });
                    assert_eq!(planned.next, next);
                    assert_eq!(planned.schedule, schedule);
                }
                None => assert!(planned.is_none(), "unexpected transition for ({state}, {trigger:?})"),
            }
        }
    }

    #[test]
    fn test_corrupted_state_has_no_outbound_transitions() {
        for trigger in [
            Trigger::Start,
            Trigger::FetchCompleted {
                found: true,
                signalled: false,
            },
            Trigger::FetchFailed,
            Trigger::ProducedSignal,
        ] {
            assert!(plan(ConsumerState::Corrupted, trigger).is_none());
        }
    }

    #[test]
    fn test_state_cell_rejects_stale_token() {
        let cell = StateCell::new(ConsumerState::Initial);
        let token = cell.load();

        let entered = cell.try_advance(token, ConsumerState::Fetching).unwrap();
        assert_eq!(entered.state(), ConsumerState::Fetching);

        // The old token must no longer commit anything.
        let stale = cell.try_advance(token, ConsumerState::Fetched);
        assert!(stale.is_err());
        assert_eq!(cell.load().state(), ConsumerState::Fetching);
    }

    #[test]
    fn test_state_cell_distinguishes_occupancies_of_same_state() {
        let cell = StateCell::new(ConsumerState::Fetching);
        let first_occupancy = cell.load();

        // Leave and re-enter Fetching: same state value, new generation.
        let fetched = cell
            .try_advance(first_occupancy, ConsumerState::Fetched)
            .unwrap();
        let second_occupancy = cell.try_advance(fetched, ConsumerState::Fetching).unwrap();
        assert_eq!(second_occupancy.state(), ConsumerState::Fetching);

        // A transition planned against the first occupancy is stale now.
        assert!(cell
            .try_advance(first_occupancy, ConsumerState::FetchedEmpty)
            .is_err());
    }

    #[test]
    fn test_force_invalidates_outstanding_tokens() {
        let cell = StateCell::new(ConsumerState::FetchedEmpty);
        let token = cell.load();

        cell.force(ConsumerState::Initial);
        assert!(cell.try_advance(token, ConsumerState::Fetching).is_err());
        assert_eq!(cell.load().state(), ConsumerState::Initial);
    }

    /// Fetch stub returning scripted results and counting invocations.
    fn scripted_fetch(
        results: Vec<Result<bool, ()>>,
        calls: Arc<AtomicUsize>,
    ) -> FetchFn {
        let results = Arc::new(results);
        Arc::new(move || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            let results = Arc::clone(&results);
            async move {
                // Past the end of the script the queue stays empty.
                match results.get(call).copied().unwrap_or(Ok(false)) {
                    Ok(found) => Ok(found),
                    Err(()) => Err(StoreError::Unavailable {
                        reason: "scripted outage".to_string(),
                    }),
                }
            }
            .boxed()
        })
    }

    async fn wait_for_state(machine: &ConsumerStateMachine, state: ConsumerState) {
        timeout(Duration::from_secs(2), async {
            while machine.current_state() != state {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap_or_else(|_| {
            panic!(
                "machine never reached {state}, still {}",
                machine.current_state()
            )
        });
    }

    #[tokio::test]
    async fn test_drains_backlog_then_goes_idle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let machine = ConsumerStateMachine::new(
            Duration::from_secs(60),
            Duration::from_millis(1),
            scripted_fetch(vec![Ok(true), Ok(true), Ok(false)], Arc::clone(&calls)),
        );

        machine.start();
        wait_for_state(&machine, ConsumerState::FetchedEmpty).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_produced_signal_wakes_idle_machine_before_poll() {
        let calls = Arc::new(AtomicUsize::new(0));
        let machine = ConsumerStateMachine::new(
            // Polling fallback far beyond the test horizon
            Duration::from_secs(600),
            Duration::from_millis(1),
            scripted_fetch(vec![Ok(false)], Arc::clone(&calls)),
        );

        machine.start();
        wait_for_state(&machine, ConsumerState::FetchedEmpty).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let woken_at = std::time::Instant::now();
        machine.handle_produced_signal();
        timeout(Duration::from_secs(2), async {
            while calls.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("signal never triggered a fetch");

        // Push wakeup must be near-immediate, nowhere close to the poll.
        assert!(woken_at.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_fetch_error_corrupts_machine() {
        let calls = Arc::new(AtomicUsize::new(0));
        let machine = ConsumerStateMachine::new(
            Duration::from_secs(60),
            Duration::from_millis(1),
            scripted_fetch(vec![Err(())], Arc::clone(&calls)),
        );

        machine.start();
        wait_for_state(&machine, ConsumerState::Corrupted).await;

        // Terminal: neither signals nor start move it.
        machine.handle_produced_signal();
        machine.start();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(machine.current_state(), ConsumerState::Corrupted);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_signal_during_fetch_is_latched_not_interrupting() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        // First fetch is slow and empty; the signal arrives mid-fetch.
        let fetch: FetchFn = Arc::new(move || {
            let call = calls_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                Ok(false)
            }
            .boxed()
        });
        let machine =
            ConsumerStateMachine::new(Duration::from_secs(600), Duration::from_millis(1), fetch);

        machine.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(machine.current_state(), ConsumerState::Fetching);
        machine.handle_produced_signal();

        // The latched signal forces a short retry instead of going idle, so
        // a second fetch happens well before any polling interval.
        timeout(Duration::from_secs(2), async {
            while calls.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("latched signal never caused a retry");
    }

    #[tokio::test]
    async fn test_stop_invalidates_pending_transitions() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let fetch: FetchFn = Arc::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(true)
            }
            .boxed()
        });
        let machine =
            ConsumerStateMachine::new(Duration::from_secs(60), Duration::ZERO, fetch);

        machine.start();
        tokio::time::sleep(Duration::from_millis(5)).await;
        machine.stop();
        assert_eq!(machine.current_state(), ConsumerState::Initial);

        // The in-flight fetch completes but its transition is stale.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(machine.current_state(), ConsumerState::Initial);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

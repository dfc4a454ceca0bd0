//! Broadcast sequencing for a conflicting pair.
//!
//! A [`BroadcastSequencer`] submits the two transactions of one pair to a
//! [`TxSubmitter`] and records each outcome. It never retries and never rolls
//! back: the point is to observe what the network does with the conflict.
//!
//! ```text
//! Idle -> SubmittingFirst -> SubmittingSecond -> Done
//!              |                   |
//!              v                   v
//!        FirstRejected       SecondRejected
//! ```

use std::fmt;
use std::time::Duration;

use bitcoin::Txid;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::network::NetworkParams;
use crate::provider::TxSubmitter;
use crate::types::SignedTx;

pub const TIMEOUT_REASON: &str = "timeout";

// ==============================================================================
// Outcomes
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastLeg {
    First,
    Second,
}

impl fmt::Display for BroadcastLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => f.write_str("first"),
            Self::Second => f.write_str("second"),
        }
    }
}

/// `Pending` means the transaction was never submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Pending,
    Accepted { txid: Txid },
    Rejected { reason: String },
}

impl SubmissionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcastAttempt {
    pub txid: Txid,
    pub outcome: SubmissionOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencerState {
    Idle,
    SubmittingFirst,
    SubmittingSecond,
    Done,
    FirstRejected,
    SecondRejected,
}

impl SequencerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::FirstRejected | Self::SecondRejected)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastReport {
    pub first: BroadcastAttempt,
    pub second: BroadcastAttempt,
    pub state: SequencerState,
}

impl BroadcastReport {
    /// The rejection to surface to callers, attributed to its leg. The first
    /// leg wins when both failed.
    pub fn error(&self) -> Option<CoreError> {
        [
            (BroadcastLeg::First, &self.first),
            (BroadcastLeg::Second, &self.second),
        ]
        .into_iter()
        .find_map(|(leg, attempt)| match &attempt.outcome {
            SubmissionOutcome::Rejected { reason } => Some(CoreError::SubmissionRejected {
                leg,
                reason: reason.clone(),
            }),
            _ => None,
        })
    }
}

// ==============================================================================
// Policy
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BroadcastMode {
    /// Submit the second transaction only once the first has an outcome.
    #[default]
    Sequential,
    /// Submit both at once; completions are unordered.
    FireBoth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastPolicy {
    pub mode: BroadcastMode,
    /// Sequential mode only: still submit the second transaction after the
    /// first was rejected.
    pub continue_on_first_reject: bool,
    /// Sequential mode only: pause before submitting the second transaction.
    pub delay: Option<Duration>,
    /// Per-submission deadline; an expired call is reported as rejected.
    pub submit_timeout: Option<Duration>,
}

impl Default for BroadcastPolicy {
    fn default() -> Self {
        Self {
            mode: BroadcastMode::Sequential,
            continue_on_first_reject: true,
            delay: None,
            submit_timeout: None,
        }
    }
}

// ==============================================================================
// Sequencer
// ==============================================================================

pub struct BroadcastSequencer<'a> {
    submitter: &'a dyn TxSubmitter,
    network: NetworkParams,
    policy: BroadcastPolicy,
    state: SequencerState,
}

impl<'a> BroadcastSequencer<'a> {
    pub fn new(
        submitter: &'a dyn TxSubmitter,
        network: NetworkParams,
        policy: BroadcastPolicy,
    ) -> Self {
        Self {
            submitter,
            network,
            policy,
            state: SequencerState::Idle,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// Submit `first` (conventionally the lower-fee transaction) and `second`
    /// according to the policy.
    pub async fn run(mut self, first: &SignedTx, second: &SignedTx) -> BroadcastReport {
        let (first_outcome, second_outcome) = match self.policy.mode {
            BroadcastMode::Sequential => self.run_sequential(first, second).await,
            BroadcastMode::FireBoth => self.run_fire_both(first, second).await,
        };

        let terminal = match (&first_outcome, &second_outcome) {
            (SubmissionOutcome::Accepted { .. }, SubmissionOutcome::Accepted { .. }) => {
                SequencerState::Done
            }
            (SubmissionOutcome::Rejected { .. }, _) => SequencerState::FirstRejected,
            _ => SequencerState::SecondRejected,
        };
        self.transition(terminal);

        BroadcastReport {
            first: BroadcastAttempt {
                txid: first.txid(),
                outcome: first_outcome,
            },
            second: BroadcastAttempt {
                txid: second.txid(),
                outcome: second_outcome,
            },
            state: self.state,
        }
    }

    async fn run_sequential(
        &mut self,
        first: &SignedTx,
        second: &SignedTx,
    ) -> (SubmissionOutcome, SubmissionOutcome) {
        self.transition(SequencerState::SubmittingFirst);
        let first_outcome = self.submit(BroadcastLeg::First, first).await;

        if first_outcome.is_rejected() && !self.policy.continue_on_first_reject {
            debug!("first transaction rejected; second submission disabled by policy");
            return (first_outcome, SubmissionOutcome::Pending);
        }

        if let Some(delay) = self.policy.delay {
            debug!(delay_ms = delay.as_millis() as u64, "waiting before second submission");
            tokio::time::sleep(delay).await;
        }

        self.transition(SequencerState::SubmittingSecond);
        let second_outcome = self.submit(BroadcastLeg::Second, second).await;
        (first_outcome, second_outcome)
    }

    async fn run_fire_both(
        &mut self,
        first: &SignedTx,
        second: &SignedTx,
    ) -> (SubmissionOutcome, SubmissionOutcome) {
        self.transition(SequencerState::SubmittingFirst);
        self.transition(SequencerState::SubmittingSecond);
        let this = &*self;
        futures::future::join(
            this.submit(BroadcastLeg::First, first),
            this.submit(BroadcastLeg::Second, second),
        )
        .await
    }

    async fn submit(&self, leg: BroadcastLeg, tx: &SignedTx) -> SubmissionOutcome {
        let hex = tx.hex();
        let call = self.submitter.submit_raw(&hex, self.network);
        let result = match self.policy.submit_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(%leg, txid = %tx.txid(), "submission timed out");
                    return SubmissionOutcome::Rejected {
                        reason: TIMEOUT_REASON.to_owned(),
                    };
                }
            },
            None => call.await,
        };

        match result {
            Ok(txid) => {
                if txid != tx.txid() {
                    warn!(
                        %leg,
                        expected = %tx.txid(),
                        returned = %txid,
                        "endpoint returned a different txid"
                    );
                }
                info!(%leg, %txid, "transaction accepted");
                SubmissionOutcome::Accepted { txid }
            }
            Err(err) => {
                warn!(%leg, txid = %tx.txid(), error = %err, "transaction rejected");
                SubmissionOutcome::Rejected {
                    reason: err.reason(),
                }
            }
        }
    }

    fn transition(&mut self, next: SequencerState) {
        debug!(from = ?self.state, to = ?next, "sequencer transition");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::pin::pin;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    use async_trait::async_trait;
    use bitcoin::absolute::LockTime;
    use bitcoin::Witness;
    use tokio::sync::Notify;

    use super::*;
    use crate::assembler::{build_skeleton, finalize, input_sequence};
    use crate::error::ProviderError;
    use crate::primitives::Secp256k1Primitives;
    use crate::test_util::*;

    #[derive(Clone)]
    enum Reply {
        Accept,
        Reject(&'static str),
        Hang,
        /// Accept once the gate is opened.
        Gated(Arc<Notify>),
    }

    struct ScriptedSubmitter {
        by_hex: HashMap<String, (Txid, Reply)>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedSubmitter {
        fn new(first: (&SignedTx, Reply), second: (&SignedTx, Reply)) -> Self {
            let mut by_hex = HashMap::new();
            by_hex.insert(first.0.hex(), (first.0.txid(), first.1));
            by_hex.insert(second.0.hex(), (second.0.txid(), second.1));
            Self {
                by_hex,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl TxSubmitter for ScriptedSubmitter {
        async fn submit_raw(
            &self,
            hex: &str,
            _network: NetworkParams,
        ) -> Result<Txid, ProviderError> {
            self.calls.lock().expect("calls lock").push(hex.to_owned());
            let (txid, reply) = self.by_hex.get(hex).cloned().expect("unknown tx submitted");
            match reply {
                Reply::Accept => Ok(txid),
                Reply::Reject(body) => Err(ProviderError::Rejected {
                    status: 400,
                    body: body.to_owned(),
                }),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Err(ProviderError::InvalidResponse("hung call finished".into()))
                }
                Reply::Gated(gate) => {
                    gate.notified().await;
                    Ok(txid)
                }
            }
        }
    }

    fn pair() -> (SignedTx, SignedTx) {
        let p = Secp256k1Primitives::new();
        let key = test_key(21);
        let utxo = p2wpkh_utxo(&key, txid_from_byte(77), 0, 50_000);
        let build = |sats| {
            let skeleton = build_skeleton(
                &utxo,
                &output_to(&test_key(22), sats),
                input_sequence(true),
                LockTime::ZERO,
            );
            // Witness content is irrelevant to sequencing.
            finalize(&p, &skeleton, &[Witness::from_slice(&[vec![1u8; 72], vec![2u8; 33]])])
                .expect("finalize")
        };
        (build(49_000), build(48_000))
    }

    async fn run_default(
        submitter: &ScriptedSubmitter,
        a: &SignedTx,
        b: &SignedTx,
    ) -> BroadcastReport {
        BroadcastSequencer::new(submitter, NetworkParams::Test, BroadcastPolicy::default())
            .run(a, b)
            .await
    }

    #[tokio::test]
    async fn both_accepted_reaches_done() {
        let (a, b) = pair();
        let submitter = ScriptedSubmitter::new((&a, Reply::Accept), (&b, Reply::Accept));
        let report = run_default(&submitter, &a, &b).await;

        assert_eq!(report.state, SequencerState::Done);
        assert_eq!(report.first.outcome, SubmissionOutcome::Accepted { txid: a.txid() });
        assert_eq!(report.second.outcome, SubmissionOutcome::Accepted { txid: b.txid() });
        assert_eq!(submitter.calls(), vec![a.hex(), b.hex()]);
        assert!(report.error().is_none());
    }

    #[tokio::test]
    async fn second_rejection_is_attributed_to_second_leg() {
        let (a, b) = pair();
        let submitter = ScriptedSubmitter::new(
            (&a, Reply::Accept),
            (&b, Reply::Reject("txn-mempool-conflict")),
        );
        let report = run_default(&submitter, &a, &b).await;

        assert_eq!(report.state, SequencerState::SecondRejected);
        assert!(matches!(
            report.error(),
            Some(CoreError::SubmissionRejected { leg: BroadcastLeg::Second, reason })
                if reason == "txn-mempool-conflict"
        ));
    }

    #[tokio::test]
    async fn first_rejection_still_submits_second_when_allowed() {
        let (a, b) = pair();
        let submitter = ScriptedSubmitter::new(
            (&a, Reply::Reject("bad-txns-inputs-missingorspent")),
            (&b, Reply::Accept),
        );
        let report = run_default(&submitter, &a, &b).await;

        assert_eq!(report.state, SequencerState::FirstRejected);
        assert_eq!(submitter.calls().len(), 2);
        assert!(report.second.outcome.is_accepted());
        assert!(matches!(
            report.error(),
            Some(CoreError::SubmissionRejected { leg: BroadcastLeg::First, .. })
        ));
    }

    #[tokio::test]
    async fn first_rejection_stops_when_policy_forbids() {
        let (a, b) = pair();
        let submitter = ScriptedSubmitter::new((&a, Reply::Reject("dust")), (&b, Reply::Accept));
        let policy = BroadcastPolicy {
            continue_on_first_reject: false,
            ..BroadcastPolicy::default()
        };
        let report = BroadcastSequencer::new(&submitter, NetworkParams::Test, policy)
            .run(&a, &b)
            .await;

        assert_eq!(report.state, SequencerState::FirstRejected);
        assert_eq!(report.second.outcome, SubmissionOutcome::Pending);
        assert_eq!(submitter.calls(), vec![a.hex()]);
    }

    #[tokio::test]
    async fn timeout_is_reported_as_rejection() {
        let (a, b) = pair();
        let submitter = ScriptedSubmitter::new((&a, Reply::Accept), (&b, Reply::Hang));
        let policy = BroadcastPolicy {
            submit_timeout: Some(Duration::from_millis(50)),
            ..BroadcastPolicy::default()
        };
        let report = BroadcastSequencer::new(&submitter, NetworkParams::Test, policy)
            .run(&a, &b)
            .await;

        assert_eq!(report.state, SequencerState::SecondRejected);
        assert_eq!(
            report.second.outcome,
            SubmissionOutcome::Rejected {
                reason: TIMEOUT_REASON.to_owned()
            }
        );
    }

    #[tokio::test]
    async fn delay_is_honoured_before_second_submission() {
        let (a, b) = pair();
        let submitter = ScriptedSubmitter::new((&a, Reply::Accept), (&b, Reply::Accept));
        let policy = BroadcastPolicy {
            delay: Some(Duration::from_millis(80)),
            ..BroadcastPolicy::default()
        };
        let started = Instant::now();
        let report = BroadcastSequencer::new(&submitter, NetworkParams::Test, policy)
            .run(&a, &b)
            .await;

        assert!(started.elapsed() >= Duration::from_millis(80));
        assert_eq!(report.state, SequencerState::Done);
    }

    #[tokio::test]
    async fn fire_both_reports_outcomes_independently() {
        let (a, b) = pair();
        let submitter =
            ScriptedSubmitter::new((&a, Reply::Reject("rejected")), (&b, Reply::Accept));
        let policy = BroadcastPolicy {
            mode: BroadcastMode::FireBoth,
            continue_on_first_reject: false,
            ..BroadcastPolicy::default()
        };
        let report = BroadcastSequencer::new(&submitter, NetworkParams::Test, policy)
            .run(&a, &b)
            .await;

        // Fire-both ignores the sequential-only continuation flag.
        assert_eq!(submitter.calls().len(), 2);
        assert!(report.first.outcome.is_rejected());
        assert!(report.second.outcome.is_accepted());
        assert_eq!(report.state, SequencerState::FirstRejected);
    }

    #[tokio::test]
    async fn sequential_waits_for_first_outcome_before_second_submission() {
        let (a, b) = pair();
        let gate = Arc::new(Notify::new());
        let submitter =
            ScriptedSubmitter::new((&a, Reply::Gated(gate.clone())), (&b, Reply::Accept));

        let mut run = pin!(run_default(&submitter, &a, &b));
        let parked = tokio::time::timeout(Duration::from_millis(100), &mut run).await;
        assert!(parked.is_err(), "run must block while the first leg is pending");
        assert_eq!(submitter.calls(), vec![a.hex()]);

        gate.notify_one();
        let report = run.await;
        assert_eq!(report.state, SequencerState::Done);
        assert_eq!(submitter.calls(), vec![a.hex(), b.hex()]);
    }

    #[tokio::test]
    async fn fire_both_submits_second_while_first_is_pending() {
        let (a, b) = pair();
        let submitter = ScriptedSubmitter::new((&a, Reply::Hang), (&b, Reply::Hang));
        let limit = Duration::from_millis(300);
        let policy = BroadcastPolicy {
            mode: BroadcastMode::FireBoth,
            submit_timeout: Some(limit),
            ..BroadcastPolicy::default()
        };

        let started = Instant::now();
        let report = BroadcastSequencer::new(&submitter, NetworkParams::Test, policy)
            .run(&a, &b)
            .await;
        let elapsed = started.elapsed();

        assert_eq!(submitter.calls(), vec![a.hex(), b.hex()]);
        assert!(elapsed >= limit);
        assert!(elapsed < limit * 2, "legs ran one after the other: {elapsed:?}");
        assert_eq!(report.state, SequencerState::FirstRejected);
        let timed_out = SubmissionOutcome::Rejected {
            reason: TIMEOUT_REASON.to_owned(),
        };
        assert_eq!(report.first.outcome, timed_out);
        assert_eq!(report.second.outcome, timed_out);
    }

    #[tokio::test]
    async fn sequential_timeouts_run_back_to_back() {
        let (a, b) = pair();
        let submitter = ScriptedSubmitter::new((&a, Reply::Hang), (&b, Reply::Hang));
        let limit = Duration::from_millis(100);
        let policy = BroadcastPolicy {
            submit_timeout: Some(limit),
            ..BroadcastPolicy::default()
        };

        let started = Instant::now();
        let report = BroadcastSequencer::new(&submitter, NetworkParams::Test, policy)
            .run(&a, &b)
            .await;

        assert!(started.elapsed() >= limit * 2);
        assert_eq!(report.state, SequencerState::FirstRejected);
        assert!(report.second.outcome.is_rejected());
    }

    #[test]
    fn new_sequencer_starts_idle() {
        let (a, b) = pair();
        let submitter = ScriptedSubmitter::new((&a, Reply::Accept), (&b, Reply::Accept));
        let sequencer =
            BroadcastSequencer::new(&submitter, NetworkParams::Test, BroadcastPolicy::default());
        assert_eq!(sequencer.state(), SequencerState::Idle);
        assert!(!sequencer.state().is_terminal());
    }
}

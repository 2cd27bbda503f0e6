//! Candidate scoring for cross-ledger matching.
//!
//! Pure functions over in-memory candidates; the repository supplies the
//! time-windowed, ownership-filtered, unlinked candidate set and the
//! reconciler drives selection + linking.

use crate::domain::{AssetId, ChainTransaction, Decimal, EventKind, TimeMs, TxKind};
use std::str::FromStr;

/// Relative amount tolerance; covers fee variance between the two ledgers.
pub const AMOUNT_TOLERANCE: f64 = 0.02;

/// Floor for the relative-difference denominator, so zero-amount events
/// cannot divide by zero.
const AMOUNT_EPSILON: &str = "0.000000001";

/// Weight of the amount distance in the composite score.
const AMOUNT_WEIGHT: f64 = 0.7;
/// Weight of the time distance in the composite score.
const TIME_WEIGHT: f64 = 0.3;

/// Asymmetric candidate windows. Deposit confirmation lag is typically
/// shorter than withdrawal execution lag, so the deposit-side window is
/// tighter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchWindows {
    /// Window behind a deposit event (candidates are chain TRANSFER_OUTs).
    pub deposit_ms: i64,
    /// Window ahead of a withdrawal event (candidates are chain TRANSFER_INs).
    pub withdrawal_ms: i64,
}

impl Default for MatchWindows {
    fn default() -> Self {
        Self {
            deposit_ms: 3_600_000,    // 1h
            withdrawal_ms: 7_200_000, // 2h
        }
    }
}

impl MatchWindows {
    /// Candidate chain-transaction kind, window bounds and width for one
    /// matchable event kind. Non-matchable kinds get nothing.
    pub fn candidate_query(
        &self,
        kind: EventKind,
        event_time: TimeMs,
    ) -> Option<(TxKind, TimeMs, TimeMs, i64)> {
        match kind {
            EventKind::Deposit => Some((
                TxKind::TransferOut,
                event_time.minus(self.deposit_ms),
                event_time,
                self.deposit_ms,
            )),
            EventKind::Withdrawal => Some((
                TxKind::TransferIn,
                event_time,
                event_time.plus(self.withdrawal_ms),
                self.withdrawal_ms,
            )),
            _ => None,
        }
    }
}

/// The winning candidate of a scoring pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub tx_id: i64,
    pub time_ms: TimeMs,
    /// Composite distance; 0 is a perfect match.
    pub score: f64,
    pub amount_diff: f64,
}

/// Match confidence: `1 − score`, clamped to [0, 1]. Exact-reference
/// matches score 0 and therefore report 1.0.
pub fn confidence(score: f64) -> f64 {
    (1.0 - score).clamp(0.0, 1.0)
}

/// Score every candidate's flows of the canonical asset against the event
/// amount/timestamp and select the best within tolerance.
///
/// `score = 0.7·amount_diff + 0.3·(time_diff / window)` where
/// `amount_diff = |flow − event| / max(event, ε)`. Candidates with
/// `amount_diff > AMOUNT_TOLERANCE` are rejected. Ties break on the earliest
/// candidate timestamp. Malformed candidates (no flow of the asset, or
/// unrepresentable amounts) are skipped, never fatal.
pub fn select_best(
    event_amount: Decimal,
    event_time: TimeMs,
    asset: &AssetId,
    candidates: &[ChainTransaction],
    window_ms: i64,
) -> Option<ScoredCandidate> {
    let epsilon = Decimal::from_str(AMOUNT_EPSILON).unwrap_or_else(|_| Decimal::zero());
    let denominator = if event_amount > epsilon {
        event_amount
    } else {
        epsilon
    };
    let window = window_ms.max(1) as f64;

    let mut best: Option<ScoredCandidate> = None;

    for tx in candidates {
        if tx.is_linked() {
            continue;
        }

        let time_diff = (tx.time_ms.as_ms() - event_time.as_ms()).abs() as f64;

        for flow_amount in tx.amounts_for_asset(asset) {
            let amount_diff = ((flow_amount - event_amount).abs() / denominator).to_f64_lossy();
            if !amount_diff.is_finite() || amount_diff > AMOUNT_TOLERANCE {
                continue;
            }

            let score = AMOUNT_WEIGHT * amount_diff + TIME_WEIGHT * (time_diff / window);
            let candidate = ScoredCandidate {
                tx_id: tx.id,
                time_ms: tx.time_ms,
                score,
                amount_diff,
            };

            let replace = match &best {
                None => true,
                Some(current) => {
                    score < current.score
                        || (score == current.score && candidate.time_ms < current.time_ms)
                }
            };
            if replace {
                best = Some(candidate);
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Transfer, WalletId};

    const MIN_MS: i64 = 60_000;

    fn usdx() -> AssetId {
        AssetId::canonical("eth:0xusdx")
    }

    fn transfer_out(id: i64, time_ms: i64, raw: i128) -> ChainTransaction {
        ChainTransaction {
            id,
            signature: format!("0xsig{}", id),
            time_ms: TimeMs::new(time_ms),
            kind: TxKind::TransferOut,
            wallet_id: WalletId(1),
            transfers: vec![Transfer::from_raw(usdx(), -raw, 6).unwrap()],
            linked_event_id: None,
        }
    }

    fn amt(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn windows_are_asymmetric() {
        let w = MatchWindows::default();
        let t = TimeMs::new(100 * MIN_MS);

        let (kind, from, to, width) = w.candidate_query(EventKind::Deposit, t).unwrap();
        assert_eq!(kind, TxKind::TransferOut);
        assert_eq!((from, to), (t.minus(w.deposit_ms), t));
        assert_eq!(width, 3_600_000);

        let (kind, from, to, width) = w.candidate_query(EventKind::Withdrawal, t).unwrap();
        assert_eq!(kind, TxKind::TransferIn);
        assert_eq!((from, to), (t, t.plus(w.withdrawal_ms)));
        assert_eq!(width, 7_200_000);

        assert!(w.candidate_query(EventKind::Sell, t).is_none());
    }

    #[test]
    fn exact_amount_scores_on_time_only() {
        let t = 100 * MIN_MS;
        let candidates = vec![transfer_out(1, t - 10 * MIN_MS, 5_000_000)];

        let best = select_best(amt("5"), TimeMs::new(t), &usdx(), &candidates, 3_600_000).unwrap();
        assert_eq!(best.tx_id, 1);
        assert_eq!(best.amount_diff, 0.0);
        assert!((best.score - 0.05).abs() < 1e-9, "score was {}", best.score);
    }

    #[test]
    fn over_tolerance_amount_is_rejected() {
        let t = 100 * MIN_MS;
        // 5.11 vs 5.00 is a 2.2% difference.
        let candidates = vec![transfer_out(1, t - MIN_MS, 5_110_000)];
        assert!(select_best(amt("5"), TimeMs::new(t), &usdx(), &candidates, 3_600_000).is_none());
    }

    #[test]
    fn selected_candidate_never_exceeds_tolerance() {
        let t = 100 * MIN_MS;
        let candidates = vec![
            transfer_out(1, t - MIN_MS, 5_080_000),
            transfer_out(2, t - MIN_MS, 5_300_000),
        ];
        let best = select_best(amt("5"), TimeMs::new(t), &usdx(), &candidates, 3_600_000).unwrap();
        assert_eq!(best.tx_id, 1);
        assert!(best.amount_diff <= AMOUNT_TOLERANCE);
    }

    #[test]
    fn lower_composite_score_wins() {
        let t = 100 * MIN_MS;
        // Exact amount 10 minutes out vs 1.6% amount drift 55 minutes out:
        // 0.05 vs 0.7*0.016 + 0.3*(55/60) = 0.286.
        let candidates = vec![
            transfer_out(1, t - 10 * MIN_MS, 5_000_000),
            transfer_out(2, t - 55 * MIN_MS, 5_080_000),
        ];
        let best = select_best(amt("5"), TimeMs::new(t), &usdx(), &candidates, 3_600_000).unwrap();
        assert_eq!(best.tx_id, 1);
    }

    #[test]
    fn amount_drift_can_outweigh_recency() {
        let t = 100 * MIN_MS;
        // 1.6% drift 5 minutes out scores 0.0362, beating exact amount
        // 10 minutes out at 0.05; the composite is authoritative.
        let candidates = vec![
            transfer_out(1, t - 10 * MIN_MS, 5_000_000),
            transfer_out(2, t - 5 * MIN_MS, 5_080_000),
        ];
        let best = select_best(amt("5"), TimeMs::new(t), &usdx(), &candidates, 3_600_000).unwrap();
        assert_eq!(best.tx_id, 2);
        assert!(best.amount_diff <= AMOUNT_TOLERANCE);
    }

    #[test]
    fn ties_break_on_earliest_timestamp() {
        let t = 100 * MIN_MS;
        let early = transfer_out(1, t - 10 * MIN_MS, 5_000_000);
        let late = transfer_out(2, t + 10 * MIN_MS, 5_000_000);
        let candidates = vec![late, early];

        let best = select_best(amt("5"), TimeMs::new(t), &usdx(), &candidates, 3_600_000).unwrap();
        assert_eq!(best.tx_id, 1, "equal scores must prefer the earlier tx");
    }

    #[test]
    fn already_linked_candidates_are_skipped() {
        let t = 100 * MIN_MS;
        let mut linked = transfer_out(1, t - MIN_MS, 5_000_000);
        linked.linked_event_id = Some(99);
        let candidates = vec![linked, transfer_out(2, t - 20 * MIN_MS, 5_000_000)];

        let best = select_best(amt("5"), TimeMs::new(t), &usdx(), &candidates, 3_600_000).unwrap();
        assert_eq!(best.tx_id, 2);
    }

    #[test]
    fn wrong_asset_yields_no_match() {
        let t = 100 * MIN_MS;
        let candidates = vec![transfer_out(1, t - MIN_MS, 5_000_000)];
        let other = AssetId::canonical("eth:0xother");
        assert!(select_best(amt("5"), TimeMs::new(t), &other, &candidates, 3_600_000).is_none());
    }

    #[test]
    fn zero_event_amount_does_not_divide_by_zero() {
        let t = 100 * MIN_MS;
        let candidates = vec![transfer_out(1, t - MIN_MS, 5_000_000)];
        // amount_diff blows past tolerance via the epsilon denominator.
        assert!(select_best(amt("0"), TimeMs::new(t), &usdx(), &candidates, 3_600_000).is_none());
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(confidence(0.0), 1.0);
        assert!((confidence(0.05) - 0.95).abs() < 1e-9);
        assert_eq!(confidence(1.5), 0.0);
    }
}

//! Off-ramp detection: deposit-then-sell-within-24h review flagging.

use crate::domain::{
    AssetId, EventKind, ExchangeEvent, PendingClassification, ReviewPriority, TaxCategory, TimeMs,
};

/// Width of the sell-scan window after a deposit-side match.
pub const OFF_RAMP_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

/// Scan sell-type events for the deposited asset in
/// `[match_time, match_time + window)` and flag the first hit for manual
/// tax-category review.
///
/// Heuristic, not authoritative: it only ever creates a review record and
/// never mutates the transactions. Persistence is keyed by the matched
/// chain transaction, so repeated runs cannot duplicate the flag.
pub fn detect_off_ramp(
    matched_tx_id: i64,
    match_time: TimeMs,
    deposited_asset: &AssetId,
    deposited_symbol: &str,
    sell_events: &[ExchangeEvent],
    window_ms: i64,
) -> Option<PendingClassification> {
    let window_end = match_time.plus(window_ms);

    let mut hit: Option<&ExchangeEvent> = None;
    for event in sell_events {
        if !event.kind.is_sell() {
            continue;
        }
        if !event.asset_symbol.eq_ignore_ascii_case(deposited_symbol) {
            continue;
        }
        if event.time_ms < match_time || event.time_ms >= window_end {
            continue;
        }
        let earlier = hit.map(|h| event.time_ms < h.time_ms).unwrap_or(true);
        if earlier {
            hit = Some(event);
        }
    }

    hit.map(|sell| {
        tracing::debug!(
            matched_tx_id,
            sell_event = %sell.event_key,
            asset = %deposited_asset,
            "deposit-then-sell pattern flagged for review"
        );
        PendingClassification {
            matched_tx_id,
            trigger_event_id: sell.id,
            category: TaxCategory::DisposalSale,
            priority: ReviewPriority::from_estimated_value(sell.fiat_value),
            estimated_value: sell.fiat_value,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConnectionId, Decimal};
    use std::str::FromStr;

    const HOUR_MS: i64 = 3_600_000;

    fn sell(id: i64, symbol: &str, time_ms: i64, fiat_value: Option<&str>) -> ExchangeEvent {
        ExchangeEvent {
            id,
            event_key: format!("1:sell-{}", id),
            connection_id: ConnectionId(1),
            user_id: "user-1".to_string(),
            kind: EventKind::Sell,
            asset_symbol: symbol.to_string(),
            network_hint: None,
            amount: Decimal::from_str("5").unwrap(),
            time_ms: TimeMs::new(time_ms),
            claimed_tx_ref: None,
            fiat_value: fiat_value.map(|v| Decimal::from_str(v).unwrap()),
            raw_payload: serde_json::json!({}),
            matched_tx_id: None,
            match_confidence: None,
        }
    }

    fn asset() -> AssetId {
        AssetId::canonical("eth:0xtokenx")
    }

    #[test]
    fn sell_within_window_is_flagged() {
        let t = 100 * HOUR_MS;
        let sells = vec![sell(10, "TOKENX", t + 2 * HOUR_MS, Some("12000"))];

        let flag =
            detect_off_ramp(7, TimeMs::new(t), &asset(), "TOKENX", &sells, OFF_RAMP_WINDOW_MS)
                .unwrap();

        assert_eq!(flag.matched_tx_id, 7);
        assert_eq!(flag.trigger_event_id, 10);
        assert_eq!(flag.category, TaxCategory::DisposalSale);
        assert_eq!(flag.priority, ReviewPriority::High);
        assert_eq!(flag.estimated_value, Some(Decimal::from_str("12000").unwrap()));
    }

    #[test]
    fn sell_outside_window_is_ignored() {
        let t = 100 * HOUR_MS;
        let sells = vec![
            sell(10, "TOKENX", t - HOUR_MS, None),       // before the match
            sell(11, "TOKENX", t + 25 * HOUR_MS, None),  // past 24h
        ];
        assert!(detect_off_ramp(
            7,
            TimeMs::new(t),
            &asset(),
            "TOKENX",
            &sells,
            OFF_RAMP_WINDOW_MS
        )
        .is_none());
    }

    #[test]
    fn window_end_is_exclusive() {
        let t = 100 * HOUR_MS;
        let sells = vec![sell(10, "TOKENX", t + OFF_RAMP_WINDOW_MS, None)];
        assert!(detect_off_ramp(
            7,
            TimeMs::new(t),
            &asset(),
            "TOKENX",
            &sells,
            OFF_RAMP_WINDOW_MS
        )
        .is_none());
    }

    #[test]
    fn other_assets_do_not_trigger() {
        let t = 100 * HOUR_MS;
        let sells = vec![sell(10, "OTHER", t + HOUR_MS, None)];
        assert!(detect_off_ramp(
            7,
            TimeMs::new(t),
            &asset(),
            "TOKENX",
            &sells,
            OFF_RAMP_WINDOW_MS
        )
        .is_none());
    }

    #[test]
    fn earliest_sell_in_window_wins() {
        let t = 100 * HOUR_MS;
        let sells = vec![
            sell(11, "TOKENX", t + 5 * HOUR_MS, Some("100")),
            sell(10, "TOKENX", t + HOUR_MS, Some("50")),
        ];
        let flag =
            detect_off_ramp(7, TimeMs::new(t), &asset(), "TOKENX", &sells, OFF_RAMP_WINDOW_MS)
                .unwrap();
        assert_eq!(flag.trigger_event_id, 10);
    }

    #[test]
    fn non_sell_kinds_are_ignored() {
        let t = 100 * HOUR_MS;
        let mut buy = sell(10, "TOKENX", t + HOUR_MS, None);
        buy.kind = EventKind::Buy;
        assert!(detect_off_ramp(
            7,
            TimeMs::new(t),
            &asset(),
            "TOKENX",
            &[buy],
            OFF_RAMP_WINDOW_MS
        )
        .is_none());
    }
}

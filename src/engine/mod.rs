//! Pure computation engines for deterministic reconciliation logic.

pub mod extractor;
pub mod matcher;
pub mod offramp;
pub mod portfolio;
pub mod resolver;
pub mod valuation;

pub use extractor::{extract_flows, AssetDelta, BalanceDeltaPayload, TxContext};
pub use matcher::{confidence, select_best, MatchWindows, ScoredCandidate, AMOUNT_TOLERANCE};
pub use offramp::{detect_off_ramp, OFF_RAMP_WINDOW_MS};
pub use portfolio::{aggregate, AssetPosition};
pub use resolver::{AssetResolver, Resolution};
pub use valuation::attribute_values;

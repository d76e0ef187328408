// =============================================================================
// Signal definition, record, and state machine
// =============================================================================
//
//     created --> active --> triggered --> executing --> executed (terminal)
//                  |           |                           |
//                  |           +--> expired (terminal)     +--> failed (terminal)
//                  +--> cancelled (terminal)
//
// A signal transitions out of `active` exactly once; the Store enforces this
// with a compare-and-set against the prior status (see `store::Store::cas_signal`).
// =============================================================================

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "=")]
    Eq,
    CrossesAbove,
    CrossesBelow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub indicator_name: String,
    pub operator: Operator,
    pub threshold: f64,
}

impl Predicate {
    pub fn new(indicator_name: impl Into<String>, operator: Operator, threshold: f64) -> Self {
        Self {
            indicator_name: indicator_name.into(),
            operator,
            threshold,
        }
    }

    /// Evaluate this predicate given the current indicator value, the
    /// previous value (for the crossing operators), and the equality
    /// tolerance. Null current values always evaluate false — never an
    /// error (indicator warm-up is a normal state, not a fault).
    pub fn evaluate(&self, current: Option<f64>, previous: Option<f64>, eq_tolerance: f64) -> bool {
        let Some(curr) = current else { return false };
        match self.operator {
            Operator::Gt => curr > self.threshold,
            Operator::Lt => curr < self.threshold,
            Operator::Eq => (curr - self.threshold).abs() <= eq_tolerance,
            Operator::CrossesAbove => match previous {
                Some(prev) => prev <= self.threshold && curr > self.threshold,
                None => false,
            },
            Operator::CrossesBelow => match previous {
                Some(prev) => prev >= self.threshold && curr < self.threshold,
                None => false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDefinition {
    pub signal_id: String,
    pub instrument: String,
    pub action: Side,
    pub primary_predicate: Predicate,
    #[serde(default)]
    pub extra_predicates: Vec<Predicate>,
    /// Lifetime in seconds from `created_at`.
    pub lifetime_seconds: i64,
    pub created_at: DateTime<FixedOffset>,
    pub created_by: String,
}

impl SignalDefinition {
    pub fn expires_at(&self) -> DateTime<FixedOffset> {
        self.created_at + chrono::Duration::seconds(self.lifetime_seconds)
    }

    pub fn all_predicates(&self) -> impl Iterator<Item = &Predicate> {
        std::iter::once(&self.primary_predicate).chain(self.extra_predicates.iter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Created,
    Active,
    Triggered,
    Executing,
    Executed,
    Failed,
    Expired,
    Cancelled,
}

impl SignalStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Executed | Self::Failed | Self::Expired | Self::Cancelled)
    }

    /// Whether `self -> next` is a legal transition per the state machine.
    pub fn can_transition_to(self, next: SignalStatus) -> bool {
        use SignalStatus::*;
        matches!(
            (self, next),
            (Created, Active)
                | (Active, Triggered)
                | (Active, Expired)
                | (Active, Cancelled)
                | (Triggered, Executing)
                | (Triggered, Active) // rejected, retry=true
                | (Triggered, Failed) // rejected, retry=false
                | (Executing, Executed)
                | (Executing, Failed)
        )
    }
}

impl std::fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Active => "active",
            Self::Triggered => "triggered",
            Self::Executing => "executing",
            Self::Executed => "executed",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    #[serde(flatten)]
    pub definition: SignalDefinition,
    pub status: SignalStatus,
    #[serde(default)]
    pub current_value: Option<f64>,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub triggered_at: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub executed_at: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub exec_result: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl SignalRecord {
    pub fn new_created(definition: SignalDefinition) -> Self {
        Self {
            definition,
            status: SignalStatus::Created,
            current_value: None,
            last_checked_at: None,
            triggered_at: None,
            executed_at: None,
            exec_result: None,
            reason: None,
        }
    }
}

/// Emitted on `engine:signal:{instrument}` when a signal transitions
/// `active -> triggered`. Carries the `sequence` of the indicator message
/// that caused it, for causal debugging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub signal_id: String,
    pub instrument: String,
    pub action: Side,
    pub triggered_at: DateTime<FixedOffset>,
    pub causal_sequence: u64,
    pub snapshot: crate::model::IndicatorSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crosses_above_requires_prev_and_strict_inequality() {
        let p = Predicate::new("rsi_14", Operator::CrossesAbove, 30.0);
        assert!(p.evaluate(Some(31.0), Some(29.0), 1e-9));
        assert!(!p.evaluate(Some(30.0), Some(30.0), 1e-9));
        assert!(!p.evaluate(Some(31.0), None, 1e-9));
    }

    #[test]
    fn crosses_above_does_not_refire_when_already_above() {
        let p = Predicate::new("rsi_14", Operator::CrossesAbove, 50.0);
        // prev=52 > 50 already, so curr=55 is not a fresh cross.
        assert!(!p.evaluate(Some(55.0), Some(52.0), 1e-9));
    }

    #[test]
    fn null_current_value_is_false_not_error() {
        let p = Predicate::new("rsi_14", Operator::Gt, 70.0);
        assert!(!p.evaluate(None, Some(71.0), 1e-9));
    }

    #[test]
    fn eq_uses_tolerance() {
        let p = Predicate::new("rsi_14", Operator::Eq, 50.0);
        assert!(p.evaluate(Some(50.0000000001), None, 1e-9));
        assert!(!p.evaluate(Some(50.1), None, 1e-9));
    }

    #[test]
    fn terminal_states_accept_no_further_transitions() {
        for terminal in [
            SignalStatus::Executed,
            SignalStatus::Failed,
            SignalStatus::Expired,
            SignalStatus::Cancelled,
        ] {
            assert!(terminal.is_terminal());
            for next in [SignalStatus::Active, SignalStatus::Triggered, SignalStatus::Executing] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn active_to_triggered_is_legal() {
        assert!(SignalStatus::Active.can_transition_to(SignalStatus::Triggered));
    }
}

//! Audit records and scan context
//!
//! Every issuance and every validation attempt appends exactly one record,
//! whatever the outcome. Records carry the token reference, never the token.

use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Outcome classes recorded for every attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Success,
    Denied,
    Expired,
    Invalid,
}

impl ScanOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanOutcome::Success => "success",
            ScanOutcome::Denied => "denied",
            ScanOutcome::Expired => "expired",
            ScanOutcome::Invalid => "invalid",
        }
    }
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Geographic point reported by the scanning device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// User-agent fragments typical of scripted clients
const SCRIPTED_AGENT_FRAGMENTS: &[&str] =
    &["curl", "wget", "python-requests", "go-http-client", "bot"];

/// Where a validation attempt came from.
#[derive(Debug, Clone, Default)]
pub struct ScanContext {
    pub source_address: String,
    pub user_agent: String,
    pub location: Option<GeoPoint>,
}

impl ScanContext {
    pub fn new(source_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            source_address: source_address.into(),
            user_agent: user_agent.into(),
            location: None,
        }
    }

    /// Attach the device-reported location
    pub fn with_location(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }

    /// A bounded 0-100 oddness score for this request surface.
    ///
    /// Logged alongside the attempt for later review; never used to gate a
    /// validation.
    pub fn risk_score(&self) -> u8 {
        let mut score: u8 = 0;
        if self.user_agent.trim().is_empty() {
            score += 40;
        } else {
            let agent = self.user_agent.to_lowercase();
            if SCRIPTED_AGENT_FRAGMENTS.iter().any(|f| agent.contains(f)) {
                score += 25;
            }
        }
        if self.location.is_none() {
            score += 10;
        }
        score.min(100)
    }
}

/// One appended row per issuance or validation attempt.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub id: Uuid,
    pub token_ref: String,
    pub bearer_id: String,
    /// 0 when the attempt failed before tenant resolution
    pub tenant_id: i64,
    pub source_address: String,
    pub user_agent: String,
    pub outcome: ScanOutcome,
    pub location: Option<GeoPoint>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Record for a validation attempt
    pub fn new(
        token_ref: &str,
        bearer_id: &str,
        tenant_id: i64,
        ctx: &ScanContext,
        outcome: ScanOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            token_ref: token_ref.to_string(),
            bearer_id: bearer_id.to_string(),
            tenant_id,
            source_address: ctx.source_address.clone(),
            user_agent: ctx.user_agent.clone(),
            outcome,
            location: ctx.location,
            occurred_at: Utc::now(),
        }
    }

    /// Record for a mint; issuance has no scanning device behind it
    pub fn issuance(token_ref: &str, issued_by: &str, tenant_id: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            token_ref: token_ref.to_string(),
            bearer_id: issued_by.to_string(),
            tenant_id,
            source_address: "-".to_string(),
            user_agent: "-".to_string(),
            outcome: ScanOutcome::Success,
            location: None,
            occurred_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_with_location_scores_zero() {
        let ctx = ScanContext::new("203.0.113.9", "Mozilla/5.0 (X11; Linux x86_64)")
            .with_location(GeoPoint {
                latitude: 52.52,
                longitude: 13.405,
            });
        assert_eq!(ctx.risk_score(), 0);
    }

    #[test]
    fn test_missing_user_agent_scores_high() {
        let ctx = ScanContext::new("203.0.113.9", "");
        assert_eq!(ctx.risk_score(), 50);
        let ctx = ScanContext::new("203.0.113.9", "   ");
        assert_eq!(ctx.risk_score(), 50);
    }

    #[test]
    fn test_scripted_agents_score() {
        for agent in ["curl/8.5.0", "Wget/1.21", "python-requests/2.31", "Go-http-client/2.0"] {
            let ctx = ScanContext::new("203.0.113.9", agent);
            assert_eq!(ctx.risk_score(), 35, "agent {:?}", agent);
        }
    }

    #[test]
    fn test_missing_location_alone_scores_low() {
        let ctx = ScanContext::new("203.0.113.9", "Mozilla/5.0 (X11; Linux x86_64)");
        assert_eq!(ctx.risk_score(), 10);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(ScanOutcome::Success.to_string(), "success");
        assert_eq!(ScanOutcome::Denied.to_string(), "denied");
        assert_eq!(ScanOutcome::Expired.to_string(), "expired");
        assert_eq!(ScanOutcome::Invalid.to_string(), "invalid");
    }

    #[test]
    fn test_issuance_record_shape() {
        let record = AuditRecord::issuance("some-ref", "admin@site", 7);
        assert_eq!(record.token_ref, "some-ref");
        assert_eq!(record.bearer_id, "admin@site");
        assert_eq!(record.tenant_id, 7);
        assert_eq!(record.outcome, ScanOutcome::Success);
        assert_eq!(record.source_address, "-");
        assert!(record.location.is_none());
    }
}

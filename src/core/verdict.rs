use serde::Serialize;

use crate::core::component::ComponentResult;

/// Qualitative verdict bucket derived from the pass rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VerdictTier {
    Excellent,
    AcceptableWithConcerns,
    SystemIssuesDetected,
}

impl VerdictTier {
    pub fn label(&self) -> &'static str {
        match self {
            VerdictTier::Excellent => "EXCELLENT",
            VerdictTier::AcceptableWithConcerns => "ACCEPTABLE_WITH_CONCERNS",
            VerdictTier::SystemIssuesDetected => "SYSTEM_ISSUES_DETECTED",
        }
    }
}

/// Aggregate outcome of one combined run, computed once after all four
/// component handles are terminal.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateVerdict {
    pub total: u32,
    pub passed: u32,
    /// Integer percentage. The truncating division is deliberate: the tier
    /// boundaries are defined against it, and 3/4 must land exactly on 75.
    pub rate: u32,
    pub tier: VerdictTier,
}

impl AggregateVerdict {
    pub fn from_results(results: &[ComponentResult]) -> Self {
        let total = results.len() as u32;
        let passed = results.iter().filter(|r| r.passed()).count() as u32;
        Self::from_counts(passed, total)
    }

    pub fn from_counts(passed: u32, total: u32) -> Self {
        let rate = if total == 0 { 0 } else { passed * 100 / total };

        let tier = if rate == 100 {
            VerdictTier::Excellent
        } else if rate >= 75 {
            VerdictTier::AcceptableWithConcerns
        } else {
            VerdictTier::SystemIssuesDetected
        };

        Self { total, passed, rate, tier }
    }

    /// Process exit code contract: 0 only for a fully clean run, so calling
    /// automation can branch on overall health without parsing the report.
    pub fn exit_code(&self) -> i32 {
        if self.tier == VerdictTier::Excellent { 0 } else { 1 }
    }
}

//! Deterministic phase policy: the authority over verdict and engagement.
//!
//! The LLM supplies bucket/relatedness/hours as raw signal; this overlay maps
//! them onto the final verdict and recommended action. The hour cutoffs are a
//! business rule, so they live in configuration rather than code.

use serde::{Deserialize, Serialize};

use crate::{ScopeBucket, ScopeVerdict};

/// Recommended next operational action for a classified request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engagement {
    /// Reproduce and triage a reported defect.
    Investigate,
    /// Decline work on an unrelated system.
    DeclineUnrelated,
    /// Proceed under the current scope.
    Proceed,
    /// Ask the client to clarify intent or expected behavior.
    Clarify,
    /// Draft a change order with an updated estimate.
    ProposeChangeOrder,
    /// Offer to scope the work as a separate project.
    NewProjectOffer,
}

/// Whether the request concerns this project at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relatedness {
    /// Clearly about this engagement.
    InProject,
    /// Not determinable from the request.
    Unknown,
    /// Clearly about a different system or vendor.
    ExplicitlyUnrelated,
}

/// Engagement phase of the project at classification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectPhase {
    /// Requirements and design are still fluid.
    Design,
    /// Implementation in progress.
    Development,
    /// User acceptance testing.
    Uat,
    /// Unspecified; treated with the stricter development rules.
    Unknown,
}

/// Hour cutoffs for the phase policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhasePolicy {
    /// Changes at or under this size stay negotiable in any phase.
    pub small_max_hours: f64,
    /// Development/UAT ceiling for a change order; beyond is a new project.
    pub change_order_max_hours: f64,
    /// Design-phase ceiling before work becomes a new project offer.
    pub design_large_max_hours: f64,
}

impl Default for PhasePolicy {
    fn default() -> Self {
        Self {
            small_max_hours: 10.0,
            change_order_max_hours: 20.0,
            design_large_max_hours: 40.0,
        }
    }
}

/// Verdict and engagement produced by the policy overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyOutcome {
    /// Final scope verdict.
    pub verdict: ScopeVerdict,
    /// Final recommended action.
    pub engagement: Engagement,
}

impl PhasePolicy {
    /// Applies the policy to the classified signal.
    ///
    /// The outcome always overrides whatever verdict the LLM proposed.
    pub fn apply(
        &self,
        phase: ProjectPhase,
        bucket: ScopeBucket,
        relatedness: Relatedness,
        estimated_hours: f64,
    ) -> PolicyOutcome {
        if relatedness == Relatedness::ExplicitlyUnrelated {
            return PolicyOutcome {
                verdict: ScopeVerdict::OutOfScope,
                engagement: Engagement::DeclineUnrelated,
            };
        }

        if bucket == ScopeBucket::BugDefect {
            return PolicyOutcome {
                verdict: ScopeVerdict::InScope,
                engagement: Engagement::Investigate,
            };
        }

        if bucket == ScopeBucket::Clarification {
            return PolicyOutcome {
                verdict: ScopeVerdict::InScope,
                engagement: Engagement::Clarify,
            };
        }

        let hours = estimated_hours;

        if phase == ProjectPhase::Design {
            if hours > self.design_large_max_hours {
                return PolicyOutcome {
                    verdict: ScopeVerdict::OutOfScope,
                    engagement: Engagement::NewProjectOffer,
                };
            }
            return PolicyOutcome {
                verdict: ScopeVerdict::GreyArea,
                engagement: if hours <= self.small_max_hours {
                    Engagement::Clarify
                } else {
                    Engagement::ProposeChangeOrder
                },
            };
        }

        // Development/UAT (and unknown): strict unless small; size separates
        // a change order from a new-project offer.
        if hours <= self.small_max_hours {
            return PolicyOutcome {
                verdict: ScopeVerdict::GreyArea,
                engagement: Engagement::ProposeChangeOrder,
            };
        }
        if hours <= self.change_order_max_hours {
            return PolicyOutcome {
                verdict: ScopeVerdict::OutOfScope,
                engagement: Engagement::ProposeChangeOrder,
            };
        }
        PolicyOutcome {
            verdict: ScopeVerdict::OutOfScope,
            engagement: Engagement::NewProjectOffer,
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests covering the full policy matrix.

    use super::*;

    fn apply(phase: ProjectPhase, bucket: ScopeBucket, hours: f64) -> PolicyOutcome {
        PhasePolicy::default().apply(phase, bucket, Relatedness::InProject, hours)
    }

    #[test]
    fn unrelated_requests_are_declined_regardless_of_bucket() {
        let outcome = PhasePolicy::default().apply(
            ProjectPhase::Design,
            ScopeBucket::BugDefect,
            Relatedness::ExplicitlyUnrelated,
            1.0,
        );
        assert_eq!(outcome.verdict, ScopeVerdict::OutOfScope);
        assert_eq!(outcome.engagement, Engagement::DeclineUnrelated);
    }

    #[test]
    fn bugs_and_clarifications_stay_in_scope() {
        let bug = apply(ProjectPhase::Uat, ScopeBucket::BugDefect, 100.0);
        assert_eq!(bug.verdict, ScopeVerdict::InScope);
        assert_eq!(bug.engagement, Engagement::Investigate);

        let question = apply(ProjectPhase::Development, ScopeBucket::Clarification, 50.0);
        assert_eq!(question.verdict, ScopeVerdict::InScope);
        assert_eq!(question.engagement, Engagement::Clarify);
    }

    #[test]
    fn design_phase_is_collaborative_until_very_large() {
        let small = apply(ProjectPhase::Design, ScopeBucket::ChangeRequest, 8.0);
        assert_eq!(small.verdict, ScopeVerdict::GreyArea);
        assert_eq!(small.engagement, Engagement::Clarify);

        let medium = apply(ProjectPhase::Design, ScopeBucket::ChangeRequest, 15.0);
        assert_eq!(medium.verdict, ScopeVerdict::GreyArea);
        assert_eq!(medium.engagement, Engagement::ProposeChangeOrder);

        let huge = apply(ProjectPhase::Design, ScopeBucket::ChangeRequest, 41.0);
        assert_eq!(huge.verdict, ScopeVerdict::OutOfScope);
        assert_eq!(huge.engagement, Engagement::NewProjectOffer);
    }

    #[test]
    fn development_phase_escalates_by_size() {
        let small = apply(ProjectPhase::Development, ScopeBucket::ChangeRequest, 10.0);
        assert_eq!(small.verdict, ScopeVerdict::GreyArea);
        assert_eq!(small.engagement, Engagement::ProposeChangeOrder);

        let medium = apply(ProjectPhase::Development, ScopeBucket::ChangeRequest, 15.0);
        assert_eq!(medium.verdict, ScopeVerdict::OutOfScope);
        assert_eq!(medium.engagement, Engagement::ProposeChangeOrder);

        let large = apply(ProjectPhase::Uat, ScopeBucket::ChangeRequest, 21.0);
        assert_eq!(large.verdict, ScopeVerdict::OutOfScope);
        assert_eq!(large.engagement, Engagement::NewProjectOffer);
    }

    #[test]
    fn unknown_phase_uses_the_stricter_development_rules() {
        let outcome = apply(ProjectPhase::Unknown, ScopeBucket::ChangeRequest, 15.0);
        assert_eq!(outcome.verdict, ScopeVerdict::OutOfScope);
        assert_eq!(outcome.engagement, Engagement::ProposeChangeOrder);
    }
}

//! Allocation decisions

use std::fmt;

use serde::Serialize;

/// Verdict of a decider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Outcome {
    /// The action is allowed
    Yes,
    /// The action is allowed but not right now
    Throttle,
    /// The action is not allowed
    No,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Yes => "YES",
            Self::Throttle => "THROTTLE",
            Self::No => "NO",
        })
    }
}

/// Result of asking one or more deciders about an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Decision {
    /// A single decider's verdict
    Single {
        /// The verdict
        outcome: Outcome,
        /// Name of the decider that produced it
        label: Option<&'static str>,
        /// Human readable reason
        explanation: Option<String>,
    },
    /// Every decider's verdict, collected in debug mode
    Multi(Vec<Decision>),
}

impl Decision {
    /// Unlabelled YES
    pub const YES: Self = Self::Single {
        outcome: Outcome::Yes,
        label: None,
        explanation: None,
    };

    /// Unlabelled NO
    pub const NO: Self = Self::Single {
        outcome: Outcome::No,
        label: None,
        explanation: None,
    };

    /// Unlabelled THROTTLE
    pub const THROTTLE: Self = Self::Single {
        outcome: Outcome::Throttle,
        label: None,
        explanation: None,
    };

    /// Labelled verdict with an explanation
    pub fn single(outcome: Outcome, label: &'static str, explanation: impl Into<String>) -> Self {
        Self::Single {
            outcome,
            label: Some(label),
            explanation: Some(explanation.into()),
        }
    }

    /// Labelled YES
    pub fn yes(label: &'static str, explanation: impl Into<String>) -> Self {
        Self::single(Outcome::Yes, label, explanation)
    }

    /// Labelled NO
    pub fn no(label: &'static str, explanation: impl Into<String>) -> Self {
        Self::single(Outcome::No, label, explanation)
    }

    /// Labelled THROTTLE
    pub fn throttle(label: &'static str, explanation: impl Into<String>) -> Self {
        Self::single(Outcome::Throttle, label, explanation)
    }

    /// Overall verdict: NO if any part says NO, else THROTTLE if any part
    /// throttles, else YES
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Single { outcome, .. } => *outcome,
            Self::Multi(decisions) => decisions
                .iter()
                .map(Self::outcome)
                .max_by_key(|outcome| match outcome {
                    Outcome::Yes => 0,
                    Outcome::Throttle => 1,
                    Outcome::No => 2,
                })
                .unwrap_or(Outcome::Yes),
        }
    }

    /// Shortcut for `outcome() == Outcome::Yes`
    #[must_use]
    pub fn is_yes(&self) -> bool {
        self.outcome() == Outcome::Yes
    }

    /// Shortcut for `outcome() == Outcome::No`
    #[must_use]
    pub fn is_no(&self) -> bool {
        self.outcome() == Outcome::No
    }

    /// Label of a single decision
    #[must_use]
    pub const fn label(&self) -> Option<&'static str> {
        match self {
            Self::Single { label, .. } => *label,
            Self::Multi(_) => None,
        }
    }

    /// Explanation of a single decision
    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        match self {
            Self::Single { explanation, .. } => explanation.as_deref(),
            Self::Multi(_) => None,
        }
    }

    /// The individual verdicts of a multi decision
    #[must_use]
    pub fn decisions(&self) -> &[Self] {
        match self {
            Self::Single { .. } => std::slice::from_ref(self),
            Self::Multi(decisions) => decisions,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single {
                outcome,
                label,
                explanation,
            } => {
                write!(f, "{outcome}")?;
                if let Some(label) = label {
                    write!(f, "({label})")?;
                }
                if let Some(explanation) = explanation {
                    write!(f, ": {explanation}")?;
                }
                Ok(())
            }
            Self::Multi(decisions) => {
                for (i, decision) in decisions.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "[{decision}]")?;
                }
                Ok(())
            }
        }
    }
}

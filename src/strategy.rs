use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Placement policy deciding which qualifying free region
/// satisfies an allocation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Lowest-addressed region large enough for the request.
    FirstFit,
    /// Smallest region large enough; ties go to the lowest
    /// address.
    BestFit,
    /// Largest region large enough; ties go to the lowest
    /// address.
    WorstFit,
}

impl Strategy {
    /// All strategies, in the order the driver runs them when
    /// none is selected.
    pub const ALL: [Strategy; 3] = [Strategy::FirstFit, Strategy::BestFit, Strategy::WorstFit];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::FirstFit => "first-fit",
            Strategy::BestFit => "best-fit",
            Strategy::WorstFit => "worst-fit",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// Driver-level error: the pool never sees a strategy it does
// not know about.
#[derive(Error, Debug)]
#[error("Unknown strategy '{0}'. Expected first-fit, best-fit or worst-fit.")]
pub struct InvalidStrategy(pub String);

impl FromStr for Strategy {
    type Err = InvalidStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first-fit" | "first" => Ok(Strategy::FirstFit),
            "best-fit" | "best" => Ok(Strategy::BestFit),
            "worst-fit" | "worst" => Ok(Strategy::WorstFit),
            _ => Err(InvalidStrategy(s.to_owned())),
        }
    }
}

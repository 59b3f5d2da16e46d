mod agreement;
mod bootstrap;
mod cochran;
mod distributions;
mod effect_size;
mod mcnemar;
mod paired;

use serde::Serialize;

pub use agreement::{KappaResult, cohens_kappa};
pub use bootstrap::{BootstrapInterval, bootstrap_metrics};
pub use cochran::{CochranQResult, cochran_q};
pub use effect_size::{CliffsDeltaResult, cliffs_delta};
pub use mcnemar::{PairwiseMcNemar, pairwise_mcnemar};
pub use paired::{PairKey, correctness_by_group, file_correctness};

/// Outcome of a statistical routine whose preconditions may not hold.
///
/// Report generation keeps going on `Insufficient`; the reason ends up in the
/// written artifact instead of an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatResult<T> {
    Computed(T),
    Insufficient { reason: String },
}

impl<T> StatResult<T> {
    pub fn insufficient(reason: impl Into<String>) -> Self {
        Self::Insufficient {
            reason: reason.into(),
        }
    }

    pub fn computed(&self) -> Option<&T> {
        match self {
            Self::Computed(value) => Some(value),
            Self::Insufficient { .. } => None,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, Self::Computed(_))
    }
}

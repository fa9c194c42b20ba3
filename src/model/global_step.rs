use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of training steps applied to a model so far.
///
/// Owned by the driver and passed into the model explicitly. Only a
/// completed TRAIN invocation advances it, by exactly one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalStep(u64);

impl GlobalStep {
    pub fn new(value: u64) -> GlobalStep {
        GlobalStep(value)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    pub(crate) fn increment(&mut self) {
        self.0 += 1;
    }
}

impl fmt::Display for GlobalStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

use serde::{Deserialize, Serialize};

use crate::{
    db_types::{OpenPackage, PackageOrder},
    helpers::Countdown,
};

/// The advisory weight gauge shown next to an open package. Crossing the cap prompts the customer to close and
/// ship; nothing is enforced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeightGauge {
    pub virtual_weight_g: i64,
    pub display_cap_g: i64,
    /// Fill ratio against the display cap, clamped to 1.0 for rendering.
    pub fill_ratio: f64,
    pub over_cap: bool,
}

impl WeightGauge {
    pub fn new(virtual_weight_g: i64, display_cap_g: i64) -> Self {
        let fill_ratio = if display_cap_g <= 0 {
            0.0
        } else {
            (virtual_weight_g as f64 / display_cap_g as f64).clamp(0.0, 1.0)
        };
        Self { virtual_weight_g, display_cap_g, fill_ratio, over_cap: display_cap_g > 0 && virtual_weight_g >= display_cap_g }
    }
}

/// A package dressed for the read path: the row itself, the live countdown to its deadline, the weight gauge and
/// the orders it aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSummary {
    pub package: OpenPackage,
    pub countdown: Countdown,
    pub gauge: WeightGauge,
    pub orders: Vec<PackageOrder>,
}

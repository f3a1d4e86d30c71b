use serde::{Deserialize, Serialize};

/// Last recorded belief for a resolved binary market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// Probability assigned to the reference outcome (0.0 - 1.0)
    pub predicted: f64,

    /// 1.0 if the reference outcome won, else 0.0
    pub actual: f64,

    pub category: Option<String>,
}

/// Calibration report over resolved markets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub brier_score: Option<f64>,
    pub market_count: usize,
    pub calibration_curve: Vec<CalibrationBin>,
    pub category_breakdown: Vec<CategoryScore>,
}

impl CalibrationReport {
    pub fn empty() -> Self {
        Self {
            brier_score: None,
            market_count: 0,
            calibration_curve: Vec::new(),
            category_breakdown: Vec::new(),
        }
    }
}

/// One reliability-diagram bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub bin_start: f64,
    pub bin_end: f64,
    /// Mean prediction in the bin, or the bin midpoint when empty
    pub avg_predicted: f64,
    /// Observed outcome rate, `None` when empty
    pub actual_frequency: Option<f64>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: String,
    pub brier_score: f64,
    pub count: usize,
}

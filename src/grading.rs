use serde::{Deserialize, Serialize};

/// One row of the grading table: percentages at or above `min` earn `grade`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeBand {
    pub min: f64,
    pub grade: String,
    pub remark: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackBand {
    pub grade: String,
    pub remark: String,
}

/// Maps a percentage to a letter grade and remark.
///
/// Bands are evaluated top-down and the first band whose `min` the percentage reaches wins.
/// Anything below the lowest band (negative values and NaN included) takes the fallback.
/// Values far above 100 still land in the top band; nothing is clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeBandPolicy {
    pub bands: Vec<GradeBand>,
    pub fallback: FallbackBand,
}

impl Default for GradeBandPolicy {
    fn default() -> Self {
        let band = |min: f64, grade: &str, remark: &str| GradeBand {
            min,
            grade: grade.to_string(),
            remark: remark.to_string(),
        };
        Self {
            bands: vec![
                band(90.0, "A", "Excellent"),
                band(80.0, "B+", "Very good performance"),
                band(70.0, "B", "Good effort"),
                band(60.0, "C", "Fair"),
                band(50.0, "D", "Needs improvement"),
            ],
            fallback: FallbackBand {
                grade: "F".to_string(),
                remark: "Failed".to_string(),
            },
        }
    }
}

impl GradeBandPolicy {
    pub fn classify(&self, percentage: f64) -> (&str, &str) {
        for b in &self.bands {
            if percentage >= b.min {
                return (b.grade.as_str(), b.remark.as_str());
            }
        }
        (self.fallback.grade.as_str(), self.fallback.remark.as_str())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.bands.is_empty() {
            return Err("grading.bands must not be empty".to_string());
        }
        for (i, b) in self.bands.iter().enumerate() {
            if !b.min.is_finite() {
                return Err(format!("grading.bands[{}].min must be finite", i));
            }
            if b.grade.trim().is_empty() {
                return Err(format!("grading.bands[{}].grade must not be empty", i));
            }
            if i > 0 && b.min >= self.bands[i - 1].min {
                return Err(format!(
                    "grading.bands must be strictly descending by min (index {})",
                    i
                ));
            }
        }
        if self.fallback.grade.trim().is_empty() {
            return Err("grading.fallback.grade must not be empty".to_string());
        }
        Ok(())
    }
}

/// Classify with the default school table.
pub fn classify(percentage: f64) -> (String, String) {
    let policy = GradeBandPolicy::default();
    let (grade, remark) = policy.classify(percentage);
    (grade.to_string(), remark.to_string())
}

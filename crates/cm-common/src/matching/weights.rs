/// Points each match factor contributes to a 100-point compatibility score.
pub const BREAKDOWN_WEIGHTS: Weights = Weights {
    gender: 20.0,
    age: 20.0,
    height: 15.0,
    experience: 25.0,
    specialization: 20.0,
};

/// Scores at or above this land in the `high` bucket.
pub const HIGH_PRIORITY_THRESHOLD: f64 = 80.0;
/// Scores at or above this (and below high) land in the `medium` bucket.
pub const MEDIUM_PRIORITY_THRESHOLD: f64 = 60.0;

/// Score shown for user candidates found without a gig to score against.
pub const PLACEHOLDER_SCORE: f64 = 75.0;

pub const MAX_SCORE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    pub gender: f64,
    pub age: f64,
    pub height: f64,
    pub experience: f64,
    pub specialization: f64,
}

impl Weights {
    pub fn sum(&self) -> f64 {
        self.gender + self.age + self.height + self.experience + self.specialization
    }
}

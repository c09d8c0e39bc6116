//! Weighted checklist scoring.
//!
//! This is the only place the score is computed. The preview endpoint and
//! the submission pipeline both call [`score`].

use serde::Serialize;

use crate::models::checklist::Answer;

/// The totals for a list of `(coefficient, answer)` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    /// Sum of every coefficient, NA included.
    pub total_coefficient: f64,
    /// Sum of coefficients whose answer is not NA.
    pub applicable_coefficient: f64,
    /// Sum of coefficients answered Yes.
    pub earned: f64,
    /// `earned / applicable * 100`, or 0 when nothing is applicable. Unrounded.
    pub percentage: f64,
}

impl Score {
    /// The percentage as persisted: two decimals.
    pub fn rounded_percentage(&self) -> f64 {
        round2(self.percentage)
    }

    /// False once a total has overflowed.
    pub fn is_finite(&self) -> bool {
        self.total_coefficient.is_finite()
            && self.applicable_coefficient.is_finite()
            && self.earned.is_finite()
            && self.percentage.is_finite()
    }
}

/// What one answer contributes to the earned total.
pub fn earned_value(coefficient: f64, answer: Answer) -> f64 {
    match answer {
        Answer::Yes => coefficient,
        Answer::No | Answer::NA => 0.0,
    }
}

/// Scores an ordered list of `(coefficient, answer)` pairs.
pub fn score<I>(items: I) -> Score
where
    I: IntoIterator<Item = (f64, Answer)>,
{
    let mut total_coefficient = 0.0;
    let mut applicable_coefficient = 0.0;
    let mut earned = 0.0;

    for (coefficient, answer) in items {
        total_coefficient += coefficient;
        if answer != Answer::NA {
            applicable_coefficient += coefficient;
        }
        earned += earned_value(coefficient, answer);
    }

    let percentage = if applicable_coefficient > 0.0 {
        earned / applicable_coefficient * 100.0
    } else {
        0.0
    };

    Score {
        total_coefficient,
        applicable_coefficient,
        earned,
        percentage,
    }
}

/// Rounds half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

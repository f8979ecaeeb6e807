/// Scoring for candidate corrections
///
/// Confidence for pattern hits, the floor for tool rejections, and the decay
/// curve that lowers a queued item's standing while it waits for review.

/// Confidence of a single pattern hit
pub const PATTERN_BASE_CONFIDENCE: f64 = 0.6;

/// Bonus per extra distinct pattern family
pub const FAMILY_BONUS: f64 = 0.1;

/// Pattern hits never reach explicit-marker certainty
pub const PATTERN_MAX_CONFIDENCE: f64 = 0.85;

/// A rejected tool call with feedback starts here
pub const REJECTION_FLOOR: f64 = 0.85;

/// Explicit "remember:" notes
pub const EXPLICIT_CONFIDENCE: f64 = 1.0;

/// Decay window for strong signals (explicit notes, rejections)
pub const STRONG_SIGNAL_DECAY_DAYS: u32 = 120;

/// Scorer for calculating confidence scores
pub struct Scorer;

impl Scorer {
    /// Confidence for a pattern match
    ///
    /// # Arguments
    /// * `distinct_families` - Number of different pattern families that matched
    ///
    /// # Returns
    /// * 0.0 when nothing matched, otherwise between the baseline and the cap
    pub fn pattern_confidence(distinct_families: usize) -> f64 {
        if distinct_families == 0 {
            return 0.0;
        }

        let bonus = (distinct_families - 1) as f64 * FAMILY_BONUS;
        (PATTERN_BASE_CONFIDENCE + bonus).min(PATTERN_MAX_CONFIDENCE)
    }

    /// Confidence for a tool rejection whose feedback scored `feedback_confidence`
    pub fn rejection_confidence(feedback_confidence: f64) -> f64 {
        feedback_confidence.max(REJECTION_FLOOR).min(1.0)
    }

    /// Relevance weight of a queued item using exponential decay
    ///
    /// Half-life is half the item's decay window, so an item at the end of its
    /// window weighs a quarter of a fresh one.
    ///
    /// # Arguments
    /// * `age_days` - Days since the correction was captured
    /// * `decay_days` - The item's decay window
    pub fn decay_weight(age_days: f64, decay_days: u32) -> f64 {
        if decay_days == 0 {
            return 0.0;
        }
        let half_life = decay_days as f64 / 2.0;
        (-age_days.max(0.0) / half_life * 2.0_f64.ln()).exp()
    }

    /// Confidence adjusted for how long the item has waited
    pub fn effective_confidence(confidence: f64, age_days: f64, decay_days: u32) -> f64 {
        (confidence * Self::decay_weight(age_days, decay_days)).clamp(0.0, 1.0)
    }

    /// Past its decay window
    pub fn is_stale(age_days: i64, decay_days: u32) -> bool {
        age_days > decay_days as i64
    }
}

//! Two-signal threat scoring.
//!
//! One input (the event count in the window and the sampled entropies)
//! produces two outputs: a hard boolean wave verdict for textbook bulk
//! encryption signatures, and a 0-100 soft score that catches diffuse
//! patterns (moderate counts with high entropy, or the reverse). The engine
//! ORs the two at configurable thresholds.

use wb_common::report::{EntropyReason, ScoreDetail, ScoreReport};
use wb_common::DetectorConfig;

/// Hard verdict: enough events in the window AND enough of the sampled
/// files look encrypted.
pub fn is_wave(event_count: usize, entropies: &[f64], cfg: &DetectorConfig) -> bool {
    if event_count < cfg.modified_threshold {
        return false;
    }
    let high = entropies
        .iter()
        .filter(|&&e| e >= cfg.entropy_threshold)
        .count();
    high >= cfg.high_entropy_count
}

/// Soft score in [0, 100], rounded to one decimal:
/// `40·min(1, count/threshold) + 30·(avg/8) + 30·frac_high`.
///
/// With no entropy samples only the event-count term contributes and the
/// details carry a single `no-samples` marker.
pub fn score_files(event_count: usize, entropies: &[f64], cfg: &DetectorConfig) -> ScoreReport {
    let threshold = cfg.modified_threshold.max(1) as f64;
    let prop = (event_count as f64 / threshold).min(1.0);
    let mut score = prop * 40.0;

    let mut details = Vec::with_capacity(entropies.len().max(1));
    if entropies.is_empty() {
        details.push(ScoreDetail {
            entropy: None,
            reason: EntropyReason::NoSamples,
        });
    } else {
        let avg: f64 = entropies.iter().sum::<f64>() / entropies.len() as f64;
        let high = entropies
            .iter()
            .filter(|&&e| e >= cfg.entropy_threshold)
            .count();
        let frac_high = high as f64 / entropies.len() as f64;

        score += (avg / 8.0) * 30.0;
        score += frac_high * 30.0;

        for &e in entropies {
            let reason = if e >= cfg.entropy_threshold {
                EntropyReason::High
            } else {
                EntropyReason::Low
            };
            details.push(ScoreDetail {
                entropy: Some(e),
                reason,
            });
        }
    }

    let score = score.clamp(0.0, 100.0);
    ScoreReport {
        score: (score * 10.0).round() / 10.0,
        details,
    }
}

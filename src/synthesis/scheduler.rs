// src/synthesis/scheduler.rs
//! Epoch eligibility. Pure: no I/O, no clock.

use serde::{Deserialize, Serialize};

use crate::synthesis::types::SynthesisConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EpochBlockReason {
    ResynthesisThreshold,
    Debounce,
    DailyCap,
}

impl EpochBlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResynthesisThreshold => "resynthesis_threshold",
            Self::Debounce => "debounce",
            Self::DailyCap => "daily_cap",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EpochGuards {
    pub resynthesis_threshold_met: bool,
    pub debounce_met: bool,
    pub daily_cap_met: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EpochDecision {
    pub allowed: bool,
    pub guards: EpochGuards,
    pub blocked_by: Vec<EpochBlockReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochSchedulerInput {
    pub current_epoch: u64,
    pub comment_count_since_last: usize,
    pub unique_principals_since_last: usize,
    pub last_epoch_timestamp: Option<u64>,
    pub epochs_today: u32,
    pub now: u64,
}

/// Epoch 0 skips the activity and debounce guards; the daily cap always applies.
pub fn evaluate_epoch_eligibility(input: &EpochSchedulerInput, cfg: &SynthesisConfig) -> EpochDecision {
    let initial = input.current_epoch == 0;

    let threshold = initial
        || (input.comment_count_since_last >= cfg.resynthesis_comment_threshold
            && input.unique_principals_since_last >= cfg.resynthesis_unique_principal_min);

    let debounce = initial
        || input
            .last_epoch_timestamp
            .and_then(|last| input.now.checked_sub(last))
            .is_some_and(|elapsed| elapsed >= cfg.epoch_debounce_ms);

    let daily_cap = input.epochs_today < cfg.daily_epoch_cap_per_topic;

    let blocked_by: Vec<EpochBlockReason> = [
        (threshold, EpochBlockReason::ResynthesisThreshold),
        (debounce, EpochBlockReason::Debounce),
        (daily_cap, EpochBlockReason::DailyCap),
    ]
    .into_iter()
    .filter(|(met, _)| !met)
    .map(|(_, reason)| reason)
    .collect();

    EpochDecision {
        allowed: blocked_by.is_empty(),
        guards: EpochGuards {
            resynthesis_threshold_met: threshold,
            debounce_met: debounce,
            daily_cap_met: daily_cap,
        },
        blocked_by,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAST: u64 = 10_000_000;

    fn input(epoch: u64, now: u64, today: u32) -> EpochSchedulerInput {
        EpochSchedulerInput {
            current_epoch: epoch,
            comment_count_since_last: 10,
            unique_principals_since_last: 3,
            last_epoch_timestamp: Some(LAST),
            epochs_today: today,
            now,
        }
    }

    #[test]
    fn debounce_boundary() {
        let cfg = SynthesisConfig::default();
        assert!(evaluate_epoch_eligibility(&input(1, LAST + 1_800_000, 0), &cfg).allowed);

        let d = evaluate_epoch_eligibility(&input(1, LAST + 1_799_999, 0), &cfg);
        assert!(!d.allowed);
        assert_eq!(d.blocked_by, vec![EpochBlockReason::Debounce]);
    }

    #[test]
    fn daily_cap_boundary() {
        let cfg = SynthesisConfig::default();
        assert!(evaluate_epoch_eligibility(&input(1, LAST + 1_800_000, 3), &cfg).allowed);
        let d = evaluate_epoch_eligibility(&input(1, LAST + 1_800_000, 4), &cfg);
        assert_eq!(d.blocked_by, vec![EpochBlockReason::DailyCap]);
    }

    #[test]
    fn first_epoch_bypasses_activity_and_debounce() {
        let cfg = SynthesisConfig::default();
        let mut i = input(0, 0, 0);
        i.comment_count_since_last = 0;
        i.unique_principals_since_last = 0;
        i.last_epoch_timestamp = None;
        assert!(evaluate_epoch_eligibility(&i, &cfg).allowed);

        i.epochs_today = 4;
        assert_eq!(
            evaluate_epoch_eligibility(&i, &cfg).blocked_by,
            vec![EpochBlockReason::DailyCap]
        );
    }

    #[test]
    fn reports_every_failed_guard() {
        let cfg = SynthesisConfig::default();
        let i = EpochSchedulerInput {
            current_epoch: 2,
            comment_count_since_last: 9,
            unique_principals_since_last: 3,
            last_epoch_timestamp: None,
            epochs_today: 9,
            now: LAST,
        };
        let d = evaluate_epoch_eligibility(&i, &cfg);
        assert!(!d.allowed);
        let names: Vec<_> = d.blocked_by.iter().map(|r| r.as_str()).collect();
        assert_eq!(names, vec!["resynthesis_threshold", "debounce", "daily_cap"]);
        assert!(!d.guards.debounce_met);
    }

    #[test]
    fn clock_behind_last_epoch_fails_debounce() {
        let cfg = SynthesisConfig::default();
        let d = evaluate_epoch_eligibility(&input(1, LAST - 1, 0), &cfg);
        assert!(!d.guards.debounce_met);
    }
}

//! Weight budgeting for the job form.
//!
//! Everything here is a pure function of the current selection and the last
//! fetched [`QuotaToday`]; callers re-derive on every read instead of caching.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::types::{Feature, QuotaToday};

/// Processor name checked by default when the catalog is first loaded.
pub const DEFAULT_PROCESSOR: &str = "face_swapper";

/// Checked state per processor name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessorSelection {
    checked: BTreeMap<String, bool>,
}

impl ProcessorSelection {
    /// Initial selection for a freshly loaded catalog: every processor is
    /// known, only [`DEFAULT_PROCESSOR`] is checked.
    pub fn with_defaults<'a>(features: impl IntoIterator<Item = &'a Feature>) -> Self {
        let checked = features
            .into_iter()
            .filter(|feature| feature.is_processor())
            .map(|feature| (feature.name.clone(), feature.name == DEFAULT_PROCESSOR))
            .collect();
        Self { checked }
    }

    pub fn is_checked(&self, name: &str) -> bool {
        self.checked.get(name).copied().unwrap_or(false)
    }

    pub fn set(&mut self, name: impl Into<String>, checked: bool) {
        self.checked.insert(name.into(), checked);
    }

    /// Flip a processor and return its new state.
    pub fn toggle(&mut self, name: &str) -> bool {
        let entry = self.checked.entry(name.to_string()).or_insert(false);
        *entry = !*entry;
        *entry
    }

    pub fn clear(&mut self) {
        for checked in self.checked.values_mut() {
            *checked = false;
        }
    }

    /// Names of the checked processors among `processors`, in catalog order.
    pub fn enabled_names<'a>(&self, processors: impl IntoIterator<Item = &'a Feature>) -> Vec<String> {
        processors
            .into_iter()
            .filter(|processor| self.is_checked(&processor.name))
            .map(|processor| processor.name.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSummary {
    pub total_selected_weight: u64,
    pub remaining: u64,
    pub remaining_after: u64,
    pub used_weight: u64,
    pub daily_limit: u64,
    pub usage_percent: f64,
}

impl QuotaSummary {
    pub fn fits(&self) -> bool {
        self.total_selected_weight > 0 && self.remaining >= self.total_selected_weight
    }
}

/// Sum the weights of checked, active processors and compare them against
/// today's quota. A missing quota counts as all zeros.
pub fn summarize<'a>(
    processors: impl IntoIterator<Item = &'a Feature>,
    selection: &ProcessorSelection,
    quota: Option<&QuotaToday>,
) -> QuotaSummary {
    let total_selected_weight: u64 = processors
        .into_iter()
        .filter(|processor| processor.is_active_processor() && selection.is_checked(&processor.name))
        .map(|processor| u64::from(processor.weight))
        .sum();

    let remaining = quota.map_or(0, |q| q.remaining);
    let daily_limit = quota.map_or(0, |q| q.daily_limit);
    let used_weight = daily_limit.saturating_sub(remaining);
    let usage_percent = if daily_limit == 0 {
        0.0
    } else {
        (used_weight as f64 / daily_limit as f64 * 100.0).min(100.0)
    };

    QuotaSummary {
        total_selected_weight,
        remaining,
        remaining_after: remaining.saturating_sub(total_selected_weight),
        used_weight,
        daily_limit,
        usage_percent,
    }
}

/// Inputs to the submit gate that do not come from the quota itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitInputs {
    pub has_source: bool,
    pub has_target: bool,
    pub submitting: bool,
}

pub fn can_submit(summary: &QuotaSummary, inputs: SubmitInputs) -> bool {
    inputs.has_source && inputs.has_target && summary.fits() && !inputs.submitting
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor(name: &str, weight: u32) -> Feature {
        Feature {
            id: 0,
            name: name.to_string(),
            kind: "processor".to_string(),
            status: "ACTIVE".to_string(),
            weight,
            value: None,
            category: None,
            description: None,
            created_at: None,
        }
    }

    fn ready() -> SubmitInputs {
        SubmitInputs {
            has_source: true,
            has_target: true,
            submitting: false,
        }
    }

    #[test]
    fn scenario_exact_fit_then_over_budget() {
        let catalog = vec![
            processor("face_swapper", 2),
            processor("face_enhancer", 1),
            processor("frame_enhancer", 1),
        ];
        let quota = QuotaToday {
            date: None,
            used: 7,
            remaining: 3,
            daily_limit: 10,
        };

        let mut selection = ProcessorSelection::with_defaults(&catalog);
        selection.set("face_enhancer", true);

        let summary = summarize(&catalog, &selection, Some(&quota));
        assert_eq!(summary.total_selected_weight, 3);
        assert_eq!(summary.remaining_after, 0);
        assert!(can_submit(&summary, ready()));

        selection.toggle("frame_enhancer");
        let summary = summarize(&catalog, &selection, Some(&quota));
        assert_eq!(summary.total_selected_weight, 4);
        assert_eq!(summary.remaining_after, 0);
        assert!(!can_submit(&summary, ready()));
    }

    #[test]
    fn remaining_after_never_goes_negative() {
        let catalog = vec![processor("a", 5), processor("b", 9)];
        let mut selection = ProcessorSelection::default();
        selection.set("a", true);
        selection.set("b", true);

        for used in 0..=10u64 {
            let quota = QuotaToday::from_usage(used, 10);
            assert_eq!(quota.remaining, 10 - used);
            let summary = summarize(&catalog, &selection, Some(&quota));
            assert_eq!(summary.total_selected_weight, 14);
            assert_eq!(summary.remaining_after, (10 - used).saturating_sub(14));
        }
    }

    #[test]
    fn missing_quota_disables_submit() {
        let catalog = vec![processor("face_swapper", 1)];
        let selection = ProcessorSelection::with_defaults(&catalog);
        let summary = summarize(&catalog, &selection, None);

        assert_eq!(summary.total_selected_weight, 1);
        assert_eq!(summary.remaining, 0);
        assert_eq!(summary.usage_percent, 0.0);
        assert!(!can_submit(&summary, ready()));
    }

    #[test]
    fn gate_requires_every_condition() {
        let catalog = vec![processor("face_swapper", 1)];
        let selection = ProcessorSelection::with_defaults(&catalog);
        let quota = QuotaToday::from_usage(0, 5);
        let summary = summarize(&catalog, &selection, Some(&quota));
        assert!(can_submit(&summary, ready()));

        for inputs in [
            SubmitInputs { has_source: false, ..ready() },
            SubmitInputs { has_target: false, ..ready() },
            SubmitInputs { submitting: true, ..ready() },
        ] {
            assert!(!can_submit(&summary, inputs));
        }

        let mut nothing = selection.clone();
        nothing.clear();
        let empty = summarize(&catalog, &nothing, Some(&quota));
        assert_eq!(empty.total_selected_weight, 0);
        assert!(!can_submit(&empty, ready()));
    }

    #[test]
    fn inactive_and_non_processor_entries_do_not_count() {
        let mut inactive = processor("lip_syncer", 4);
        inactive.status = "INACTIVE".to_string();
        let mut option = processor("inswapper_128", 6);
        option.kind = "processor_option".to_string();
        let catalog = vec![processor("face_swapper", 1), inactive, option];

        let mut selection = ProcessorSelection::default();
        for name in ["face_swapper", "lip_syncer", "inswapper_128"] {
            selection.set(name, true);
        }

        let summary = summarize(&catalog, &selection, Some(&QuotaToday::from_usage(0, 10)));
        assert_eq!(summary.total_selected_weight, 1);
    }

    #[test]
    fn usage_percent_is_capped() {
        let quota = QuotaToday {
            date: None,
            used: 0,
            remaining: 2,
            daily_limit: 8,
        };
        let summary = summarize(std::iter::empty::<&Feature>(), &ProcessorSelection::default(), Some(&quota));
        assert_eq!(summary.used_weight, 6);
        assert_eq!(summary.usage_percent, 75.0);
    }

    #[test]
    fn defaults_check_only_face_swapper() {
        let catalog = vec![processor("face_swapper", 1), processor("face_enhancer", 1)];
        let selection = ProcessorSelection::with_defaults(&catalog);
        assert!(selection.is_checked("face_swapper"));
        assert!(!selection.is_checked("face_enhancer"));
        assert_eq!(selection.enabled_names(&catalog), vec!["face_swapper"]);
    }
}

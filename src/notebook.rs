//! Hypothesised-state classifier and lab-notebook records.

use std::fmt;

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::error::{QsfwError, QsfwResult};
use crate::params::CouplingParameters;

/// Possibly partial parameter set, keyed the way notebooks have always
/// written it (`ALPHA`, `GAMMA`, `G0`).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ParameterSet {
    #[serde(rename = "ALPHA", default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,
    #[serde(rename = "GAMMA", default, skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,
    #[serde(rename = "G0", default, skip_serializing_if = "Option::is_none")]
    pub g0: Option<f64>,
}

impl From<CouplingParameters> for ParameterSet {
    fn from(p: CouplingParameters) -> Self {
        Self {
            alpha: Some(p.alpha),
            gamma: Some(p.gamma),
            g0: Some(p.g0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ConsciousState {
    Unconscious,
    UnstableQuantum,
    Fragmented,
    OverIntegrated,
    ConsciousCandidate,
    Undefined,
}

impl ConsciousState {
    pub const ALL: [ConsciousState; 6] = [
        ConsciousState::Unconscious,
        ConsciousState::UnstableQuantum,
        ConsciousState::Fragmented,
        ConsciousState::OverIntegrated,
        ConsciousState::ConsciousCandidate,
        ConsciousState::Undefined,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ConsciousState::Unconscious => "UNCONSCIOUS - High decoherence",
            ConsciousState::UnstableQuantum => "UNSTABLE QUANTUM - Too little decoherence",
            ConsciousState::Fragmented => "FRAGMENTED - Scales too disconnected",
            ConsciousState::OverIntegrated => "OVER-INTEGRATED - Scales too coupled",
            ConsciousState::ConsciousCandidate => {
                "CONSCIOUS CANDIDATE - Balanced coherence/decoherence"
            }
            ConsciousState::Undefined => "UNDEFINED STATE",
        }
    }
}

impl fmt::Display for ConsciousState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<ConsciousState> for String {
    fn from(state: ConsciousState) -> Self {
        state.label().to_string()
    }
}

impl TryFrom<String> for ConsciousState {
    type Error = QsfwError;

    fn try_from(label: String) -> Result<Self, Self::Error> {
        ConsciousState::ALL
            .into_iter()
            .find(|s| s.label() == label)
            .ok_or_else(|| QsfwError::invalid(format!("unknown state label '{}'", label)))
    }
}

/// Threshold lookup on (alpha, gamma). Gamma is checked before alpha.
pub fn classify(params: &ParameterSet) -> ConsciousState {
    if let Some(gamma) = params.gamma {
        if gamma > 0.1 {
            return ConsciousState::Unconscious;
        }
        if gamma < 0.001 {
            return ConsciousState::UnstableQuantum;
        }
    }
    if let Some(alpha) = params.alpha {
        if alpha > 2.0 {
            return ConsciousState::Fragmented;
        }
        if alpha < 0.8 {
            return ConsciousState::OverIntegrated;
        }
    }
    match (params.alpha, params.gamma) {
        (Some(alpha), Some(gamma))
            if (0.001..=0.1).contains(&gamma) && (0.8..=2.0).contains(&alpha) =>
        {
            ConsciousState::ConsciousCandidate
        }
        _ => ConsciousState::Undefined,
    }
}

/// Headline numbers of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResultsSummary {
    pub mean_coherence: f64,
    pub fractal_dimension: f64,
    pub integration_measure: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookEntry {
    /// Local time, `%Y-%m-%d %H:%M:%S`.
    pub timestamp: String,
    pub parameters: ParameterSet,
    pub hypothesized_state: ConsciousState,
    pub results: ResultsSummary,
    pub observations: Vec<String>,
    pub conclusions: String,
}

impl NotebookEntry {
    pub fn observe(&mut self, note: impl Into<String>) {
        self.observations.push(note.into());
    }

    pub fn to_json_pretty(&self) -> QsfwResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| QsfwError::Config(format!("notebook serialisation: {e}")))
    }
}

/// Fresh entry stamped with the current local time.
pub fn build_notebook_entry(params: ParameterSet, results: ResultsSummary) -> NotebookEntry {
    NotebookEntry {
        timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        parameters: params,
        hypothesized_state: classify(&params),
        results,
        observations: Vec::new(),
        conclusions: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(alpha: Option<f64>, gamma: Option<f64>) -> ParameterSet {
        ParameterSet {
            alpha,
            gamma,
            g0: None,
        }
    }

    #[test]
    fn balanced_parameters_are_candidates() {
        let state = classify(&set(Some(1.2), Some(0.01)));
        assert_eq!(
            state.to_string(),
            "CONSCIOUS CANDIDATE - Balanced coherence/decoherence"
        );
    }

    #[test]
    fn high_decoherence_is_unconscious() {
        assert_eq!(
            classify(&set(Some(1.2), Some(0.5))).label(),
            "UNCONSCIOUS - High decoherence"
        );
    }

    #[test]
    fn empty_set_is_undefined() {
        let params: ParameterSet = serde_json::from_str("{}").unwrap();
        assert_eq!(classify(&params).label(), "UNDEFINED STATE");
    }

    #[test]
    fn gamma_checked_before_alpha() {
        assert_eq!(classify(&set(Some(3.0), Some(0.5))), ConsciousState::Unconscious);
        assert_eq!(
            classify(&set(Some(0.1), Some(0.0001))),
            ConsciousState::UnstableQuantum
        );
        assert_eq!(classify(&set(Some(2.5), Some(0.01))), ConsciousState::Fragmented);
        assert_eq!(classify(&set(Some(0.5), None)), ConsciousState::OverIntegrated);
        assert_eq!(classify(&set(Some(1.0), None)), ConsciousState::Undefined);
        assert_eq!(classify(&set(None, Some(0.05))), ConsciousState::Undefined);
    }

    #[test]
    fn boundaries_are_inclusive() {
        assert_eq!(
            classify(&set(Some(0.8), Some(0.1))),
            ConsciousState::ConsciousCandidate
        );
        assert_eq!(
            classify(&set(Some(2.0), Some(0.001))),
            ConsciousState::ConsciousCandidate
        );
    }

    #[test]
    fn notebook_entry_serialises_with_legacy_keys() {
        let params: ParameterSet =
            serde_json::from_str(r#"{"ALPHA": 1.2, "GAMMA": 0.01, "G0": 0.5}"#).unwrap();
        let mut entry = build_notebook_entry(
            params,
            ResultsSummary {
                mean_coherence: 0.78,
                fractal_dimension: 1.52,
                integration_measure: 0.65,
                stability_time: Some(120.0),
            },
        );
        entry.observe("Golden-ratio frequency peaks visible in PSD");
        assert_eq!(entry.timestamp.len(), 19);
        assert!(entry.conclusions.is_empty());

        let json = entry.to_json_pretty().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["parameters"]["ALPHA"], 1.2);
        assert_eq!(
            value["hypothesized_state"],
            "CONSCIOUS CANDIDATE - Balanced coherence/decoherence"
        );
        assert_eq!(value["results"]["stability_time"], 120.0);
        assert_eq!(value["observations"].as_array().unwrap().len(), 1);

        let back: NotebookEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn unknown_label_rejected() {
        assert!(ConsciousState::try_from("LUCID".to_string()).is_err());
    }
}

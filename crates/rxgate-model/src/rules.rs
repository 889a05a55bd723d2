use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use rxgate_core::domain::{FeedbackRecord, PatientInput, Prescription};
use rxgate_core::errors::ModelError;
use rxgate_core::provider::PredictionProvider;

/// Symptom substring → candidate medications.
const SYMPTOM_RULES: &[(&str, &[&str])] = &[
    ("back pain", &["Ibuprofen", "Acetaminophen"]),
    ("pain", &["Acetaminophen", "Ibuprofen"]),
    ("constipation", &["Docusate Sodium", "Senna"]),
    ("loss of appetite", &["Multivitamin", "B-Complex"]),
    ("fatigue", &["Iron Supplement", "Vitamin B12"]),
    ("headache", &["Acetaminophen", "Ibuprofen"]),
    ("nausea", &["Ondansetron", "Ginger Extract"]),
    ("dizziness", &["Meclizine"]),
    ("chest pain", &["Nitroglycerin"]),
    ("shortness of breath", &["Albuterol"]),
    ("cough", &["Dextromethorphan", "Guaifenesin"]),
];

/// Diagnosis substring → candidate medications.
const DIAGNOSIS_RULES: &[(&str, &[&str])] = &[
    ("hypertension", &["Lisinopril", "Amlodipine"]),
    ("diabetes", &["Metformin", "Glipizide"]),
    ("depression", &["Sertraline", "Fluoxetine"]),
    ("anxiety", &["Lorazepam", "Alprazolam"]),
    ("arthritis", &["Celecoxib", "Naproxen"]),
    ("asthma", &["Albuterol", "Fluticasone"]),
    ("heart disease", &["Aspirin", "Metoprolol"]),
    ("migraine", &["Sumatriptan", "Ibuprofen"]),
];

const FALLBACK_MEDICATIONS: &[&str] = &["General Supportive Care", "Multivitamin"];

/// Deterministic rule-engine provider.
///
/// Stands in for the learned model during development and as a degradation
/// target; interchangeable with [`crate::RemoteModelProvider`] behind the
/// `PredictionProvider` trait.
pub struct RuleBasedProvider {
    version: RwLock<String>,
}

impl RuleBasedProvider {
    pub const BASE_VERSION: &'static str = "1.0.0";

    pub fn new() -> Self {
        Self {
            version: RwLock::new(Self::BASE_VERSION.to_string()),
        }
    }

    /// Resume from a previously recorded version label.
    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            version: RwLock::new(version.into()),
        }
    }

    fn select_medications(input: &PatientInput) -> Vec<String> {
        let symptoms = input.symptoms.to_lowercase();
        let diagnosis = input.diagnosis.to_lowercase();
        let mut medications: Vec<String> = Vec::new();

        for (symptom, meds) in SYMPTOM_RULES {
            if symptoms.contains(symptom) {
                for med in *meds {
                    push_unique(&mut medications, med);
                }
            }
        }
        for (condition, meds) in DIAGNOSIS_RULES {
            if diagnosis.contains(condition) {
                for med in *meds {
                    push_unique(&mut medications, med);
                }
            }
        }

        if input.age > 65 {
            for med in ["Vitamin D", "Calcium"] {
                push_unique(&mut medications, med);
            }
        } else if input.age < 18 {
            // Aspirin is contraindicated in children
            medications.retain(|m| !m.contains("Aspirin"));
        }

        if medications.is_empty() {
            medications = FALLBACK_MEDICATIONS.iter().map(|m| m.to_string()).collect();
        }
        medications
    }

    fn confidence_for(input: &PatientInput) -> f64 {
        let mut confidence: f64 = 0.5;
        if !input.symptoms.is_empty() {
            confidence += 0.2;
        }
        if !input.diagnosis.is_empty() {
            confidence += 0.2;
        }
        if input.age > 0 {
            confidence += 0.1;
        }
        // Many distinct symptoms dilute the match quality
        if input.symptoms.split(',').count() > 3 {
            confidence -= 0.1;
        }
        confidence.clamp(0.1, 0.95)
    }
}

impl Default for RuleBasedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PredictionProvider for RuleBasedProvider {
    fn name(&self) -> &str {
        "rules"
    }

    fn current_version(&self) -> String {
        self.version.read().clone()
    }

    async fn generate(&self, input: &PatientInput) -> Prescription {
        let medications = Self::select_medications(input);
        let confidence = Self::confidence_for(input);
        debug!(count = medications.len(), confidence, "rule engine matched");
        Prescription::new(medications, confidence, self.current_version())
    }

    async fn update_with_feedback(&self, records: &[FeedbackRecord]) -> Result<String, ModelError> {
        let new_version = bump_patch(&self.current_version());
        *self.version.write() = new_version.clone();
        info!(
            version = %new_version,
            feedback_samples = records.len(),
            "rule engine re-versioned"
        );
        Ok(new_version)
    }
}

fn push_unique(list: &mut Vec<String>, med: &str) {
    if !list.iter().any(|m| m == med) {
        list.push(med.to_string());
    }
}

/// Increment the trailing numeric component of a version label
/// ("1.0.0" → "1.0.1"). A label with no numeric tail gets one appended.
pub fn bump_patch(version: &str) -> String {
    match version.rsplit_once('.') {
        Some((head, tail)) => match tail.parse::<u64>() {
            Ok(n) => format!("{head}.{}", n + 1),
            Err(_) => format!("{version}.1"),
        },
        None => format!("{version}.1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(symptoms: &str, age: u32, gender: &str, diagnosis: &str) -> PatientInput {
        PatientInput::new(symptoms, age, gender, diagnosis)
    }

    #[tokio::test]
    async fn migraine_example() {
        let provider = RuleBasedProvider::new();
        let rx = provider
            .generate(&input("headache, nausea", 45, "female", "migraine"))
            .await;
        assert!(!rx.medications.is_empty());
        assert!(rx.confidence >= 0.1 && rx.confidence <= 0.95);
        assert!(rx.medications.iter().any(|m| m == "Acetaminophen"));
        assert!(rx.medications.iter().any(|m| m == "Sumatriptan"));
    }

    #[tokio::test]
    async fn unknown_symptoms_fall_back_to_supportive_care() {
        let provider = RuleBasedProvider::new();
        let rx = provider.generate(&input("glowing ears", 30, "male", "")).await;
        assert_eq!(
            rx.medications,
            vec!["General Supportive Care".to_string(), "Multivitamin".to_string()]
        );
    }

    #[tokio::test]
    async fn elderly_patients_get_supplements() {
        let provider = RuleBasedProvider::new();
        let rx = provider.generate(&input("fatigue", 70, "male", "")).await;
        assert!(rx.medications.iter().any(|m| m == "Vitamin D"));
        assert!(rx.medications.iter().any(|m| m == "Calcium"));
    }

    #[tokio::test]
    async fn children_never_get_aspirin() {
        let provider = RuleBasedProvider::new();
        let rx = provider
            .generate(&input("chest pain", 10, "male", "heart disease"))
            .await;
        assert!(!rx.medications.iter().any(|m| m.contains("Aspirin")));
        assert!(!rx.medications.is_empty());
    }

    #[tokio::test]
    async fn medications_are_deduplicated() {
        // "headache" and "pain" both map to Acetaminophen/Ibuprofen
        let provider = RuleBasedProvider::new();
        let rx = provider.generate(&input("headache, pain", 40, "female", "")).await;
        let mut sorted = rx.medications.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), rx.medications.len());
    }

    #[tokio::test]
    async fn confidence_rewards_complete_input() {
        let provider = RuleBasedProvider::new();
        let full = provider
            .generate(&input("headache", 45, "female", "migraine"))
            .await;
        let sparse = provider.generate(&input("", 0, "Unknown", "")).await;
        assert!(full.confidence > sparse.confidence);
        assert!(sparse.confidence >= 0.1);
    }

    #[tokio::test]
    async fn confidence_penalizes_many_symptoms() {
        let provider = RuleBasedProvider::new();
        let few = provider.generate(&input("headache", 45, "f", "")).await;
        let many = provider
            .generate(&input("headache, nausea, cough, fatigue, dizziness", 45, "f", ""))
            .await;
        assert!(many.confidence < few.confidence);
    }

    #[tokio::test]
    async fn update_bumps_version_and_stamps_prescriptions() {
        let provider = RuleBasedProvider::new();
        assert_eq!(provider.current_version(), "1.0.0");

        let v = provider.update_with_feedback(&[]).await.unwrap();
        assert_eq!(v, "1.0.1");
        assert_eq!(provider.current_version(), "1.0.1");

        let rx = provider.generate(&input("cough", 20, "m", "")).await;
        assert_eq!(rx.model_version, "1.0.1");
    }

    #[test]
    fn bump_patch_variants() {
        assert_eq!(bump_patch("1.0.0"), "1.0.1");
        assert_eq!(bump_patch("1.0.9"), "1.0.10");
        assert_eq!(bump_patch("2.1"), "2.2");
        assert_eq!(bump_patch("v1"), "v1.1");
        assert_eq!(bump_patch("1.0.beta"), "1.0.beta.1");
    }
}

//! Minimum-requirement gate evaluated once every field is present.
//!
//! Hard checks always block completion. Coherence checks produce issues that
//! block only under [`CoherencePolicy::Blocking`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::property::{Condition, FieldName, PropertyFields};
use crate::validation::word_count;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoherencePolicy {
    #[default]
    Advisory,
    Blocking,
}

impl CoherencePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Advisory => "advisory",
            Self::Blocking => "blocking",
        }
    }
}

impl std::str::FromStr for CoherencePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "advisory" => Ok(Self::Advisory),
            "blocking" => Ok(Self::Blocking),
            other => Err(format!(
                "unsupported coherence policy `{other}` (expected advisory|blocking)"
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequirementPolicy {
    pub min_optional_documents: usize,
    pub min_photos: i64,
    pub min_description_words: usize,
    pub max_new_condition_age_years: i64,
    pub area_per_room_m2: (Decimal, Decimal),
    pub price_per_m2: (Decimal, Decimal),
    pub coherence: CoherencePolicy,
    pub current_year: i64,
}

impl Default for RequirementPolicy {
    fn default() -> Self {
        Self {
            min_optional_documents: 4,
            min_photos: 5,
            min_description_words: 50,
            max_new_condition_age_years: 5,
            area_per_room_m2: (Decimal::from(8), Decimal::from(200)),
            price_per_m2: (Decimal::from(500_000), Decimal::from(30_000_000)),
            coherence: CoherencePolicy::Advisory,
            current_year: i64::from(chrono::Datelike::year(&chrono::Utc::now())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementCheck {
    ExistenceCertificate,
    OptionalDocuments,
    MinimumPhotos,
    DescriptionLength,
}

impl RequirementCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExistenceCertificate => "existence_certificate",
            Self::OptionalDocuments => "optional_documents",
            Self::MinimumPhotos => "minimum_photos",
            Self::DescriptionLength => "description_length",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub check: RequirementCheck,
    pub passed: bool,
    pub detail: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoherenceIssueKind {
    FloorNotApplicable,
    NewConditionTooOld,
    AreaPerRoom,
    PricePerArea,
}

impl CoherenceIssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FloorNotApplicable => "floor_not_applicable",
            Self::NewConditionTooOld => "new_condition_too_old",
            Self::AreaPerRoom => "area_per_room",
            Self::PricePerArea => "price_per_area",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CoherenceIssue {
    pub kind: CoherenceIssueKind,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RequirementReport {
    pub checks: Vec<CheckResult>,
    pub issues: Vec<CoherenceIssue>,
    pub policy: CoherencePolicy,
}

impl RequirementReport {
    pub fn hard_checks_passed(&self) -> bool {
        self.checks.iter().all(|check| check.passed)
    }

    pub fn passed(&self) -> bool {
        self.hard_checks_passed()
            && (self.policy == CoherencePolicy::Advisory || self.issues.is_empty())
    }

    /// Names of whatever is currently blocking completion.
    pub fn blocking(&self) -> Vec<String> {
        let mut blocking: Vec<String> = self
            .checks
            .iter()
            .filter(|check| !check.passed)
            .map(|check| check.check.as_str().to_string())
            .collect();
        if self.policy == CoherencePolicy::Blocking {
            blocking.extend(self.issues.iter().map(|issue| issue.kind.as_str().to_string()));
        }
        blocking
    }

    /// Human-readable reasons, in Spanish, for the blocking items.
    pub fn blocking_details(&self) -> Vec<String> {
        let mut details: Vec<String> = self
            .checks
            .iter()
            .filter(|check| !check.passed)
            .map(|check| check.detail.clone())
            .collect();
        if self.policy == CoherencePolicy::Blocking {
            details.extend(self.issues.iter().map(|issue| issue.message.clone()));
        }
        details
    }
}

#[derive(Clone, Debug, Default)]
pub struct RequirementGate {
    policy: RequirementPolicy,
}

impl RequirementGate {
    pub fn new(policy: RequirementPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RequirementPolicy {
        &self.policy
    }

    pub fn evaluate(&self, fields: &PropertyFields) -> RequirementReport {
        RequirementReport {
            checks: self.hard_checks(fields),
            issues: self.coherence_issues(fields),
            policy: self.policy.coherence,
        }
    }

    fn hard_checks(&self, fields: &PropertyFields) -> Vec<CheckResult> {
        let policy = &self.policy;
        let documents = fields.optional_documents_present();
        let photos = fields.photo_count.unwrap_or(0);
        let words = fields.description.as_deref().map(word_count).unwrap_or(0);

        vec![
            CheckResult {
                check: RequirementCheck::ExistenceCertificate,
                passed: fields.existence_certificate == Some(true),
                detail: "falta el certificado de existencia y representación legal".to_string(),
            },
            CheckResult {
                check: RequirementCheck::OptionalDocuments,
                passed: documents >= policy.min_optional_documents,
                detail: format!(
                    "se necesitan al menos {} de los {} documentos adicionales (tienes {documents})",
                    policy.min_optional_documents,
                    FieldName::OPTIONAL_DOCUMENTS.len()
                ),
            },
            CheckResult {
                check: RequirementCheck::MinimumPhotos,
                passed: photos >= policy.min_photos,
                detail: format!("se necesitan al menos {} fotos (tienes {photos})", policy.min_photos),
            },
            CheckResult {
                check: RequirementCheck::DescriptionLength,
                passed: words >= policy.min_description_words,
                detail: format!(
                    "la descripción necesita al menos {} palabras (tiene {words})",
                    policy.min_description_words
                ),
            },
        ]
    }

    fn coherence_issues(&self, fields: &PropertyFields) -> Vec<CoherenceIssue> {
        let policy = &self.policy;
        let mut issues = Vec::new();

        if fields.floor.is_some() && !FieldName::Floor.is_applicable(fields.property_type) {
            issues.push(CoherenceIssue {
                kind: CoherenceIssueKind::FloorNotApplicable,
                message: "el piso solo aplica para apartamentos u oficinas".to_string(),
            });
        }

        if let (Some(Condition::New), Some(year)) = (fields.condition, fields.build_year) {
            let age = policy.current_year - year;
            if age > policy.max_new_condition_age_years {
                issues.push(CoherenceIssue {
                    kind: CoherenceIssueKind::NewConditionTooOld,
                    message: format!(
                        "un inmueble nuevo no debería tener más de {} años (tiene {age})",
                        policy.max_new_condition_age_years
                    ),
                });
            }
        }

        if let (Some(area), Some(rooms)) = (fields.built_area_m2, fields.bedrooms) {
            if rooms > 0 {
                let per_room = area / Decimal::from(rooms);
                let (low, high) = policy.area_per_room_m2;
                if per_room < low || per_room > high {
                    issues.push(CoherenceIssue {
                        kind: CoherenceIssueKind::AreaPerRoom,
                        message: format!(
                            "el área por habitación ({} m²) está fuera del rango esperado",
                            per_room.round_dp(1)
                        ),
                    });
                }
            }
        }

        if let (Some(price), Some(area)) = (fields.sale_price, fields.built_area_m2) {
            if !area.is_zero() {
                let per_m2 = price / area;
                let (low, high) = policy.price_per_m2;
                if per_m2 < low || per_m2 > high {
                    issues.push(CoherenceIssue {
                        kind: CoherenceIssueKind::PricePerArea,
                        message: format!(
                            "el precio por m² ({}) está fuera del rango esperado",
                            per_m2.round_dp(0)
                        ),
                    });
                }
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{
        CoherenceIssueKind, CoherencePolicy, RequirementCheck, RequirementGate, RequirementPolicy,
    };
    use crate::completion::fixtures::complete_house;
    use crate::domain::property::{Condition, PropertyType};

    fn gate(coherence: CoherencePolicy) -> RequirementGate {
        RequirementGate::new(RequirementPolicy {
            coherence,
            current_year: 2026,
            ..RequirementPolicy::default()
        })
    }

    #[test]
    fn complete_house_passes_every_check() {
        let report = gate(CoherencePolicy::Advisory).evaluate(&complete_house());

        assert!(report.passed(), "blocking: {:?}", report.blocking());
        assert!(report.issues.is_empty());
    }

    #[test]
    fn three_of_four_documents_fails_the_gate() {
        let mut fields = complete_house();
        fields.hoa_clearance = Some(false);
        let report = gate(CoherencePolicy::Advisory).evaluate(&fields);

        assert!(!report.passed());
        assert_eq!(report.blocking(), vec![RequirementCheck::OptionalDocuments.as_str().to_string()]);
    }

    #[test]
    fn minimum_documents_threshold_is_configurable() {
        let mut fields = complete_house();
        fields.hoa_clearance = Some(false);
        let gate = RequirementGate::new(RequirementPolicy {
            min_optional_documents: 3,
            current_year: 2026,
            ..RequirementPolicy::default()
        });

        assert!(gate.evaluate(&fields).passed());
    }

    #[test]
    fn missing_certificate_and_photos_are_reported_separately() {
        let mut fields = complete_house();
        fields.existence_certificate = Some(false);
        fields.photo_count = Some(2);
        let report = gate(CoherencePolicy::Advisory).evaluate(&fields);

        assert_eq!(
            report.blocking(),
            vec!["existence_certificate".to_string(), "minimum_photos".to_string()]
        );
        assert_eq!(report.blocking_details().len(), 2);
    }

    #[test]
    fn coherence_issues_are_advisory_by_default() {
        let mut fields = complete_house();
        fields.condition = Some(Condition::New);
        fields.build_year = Some(2001);
        let report = gate(CoherencePolicy::Advisory).evaluate(&fields);

        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, CoherenceIssueKind::NewConditionTooOld);
        assert!(report.passed());
        assert!(report.blocking().is_empty());
    }

    #[test]
    fn coherence_issues_block_under_blocking_policy() {
        let mut fields = complete_house();
        fields.sale_price = Some(Decimal::from(50_000_000_i64));
        fields.built_area_m2 = Some(Decimal::from(9_000));
        let report = gate(CoherencePolicy::Blocking).evaluate(&fields);

        let kinds: Vec<_> = report.issues.iter().map(|issue| issue.kind).collect();
        assert!(kinds.contains(&CoherenceIssueKind::PricePerArea));
        assert!(kinds.contains(&CoherenceIssueKind::AreaPerRoom));
        assert!(report.hard_checks_passed());
        assert!(!report.passed());
        assert!(report.blocking().contains(&"price_per_area".to_string()));
    }

    #[test]
    fn floor_on_a_house_is_flagged() {
        let mut fields = complete_house();
        fields.floor = Some(3);
        let report = gate(CoherencePolicy::Blocking).evaluate(&fields);
        assert_eq!(report.issues[0].kind, CoherenceIssueKind::FloorNotApplicable);

        fields.property_type = Some(PropertyType::Apartment);
        assert!(gate(CoherencePolicy::Blocking).evaluate(&fields).issues.is_empty());
    }

    #[test]
    fn coherence_policy_parses_from_config_strings() {
        assert_eq!("Blocking".parse::<CoherencePolicy>(), Ok(CoherencePolicy::Blocking));
        assert!("strict".parse::<CoherencePolicy>().is_err());
    }
}

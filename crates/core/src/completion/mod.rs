pub mod requirements;
pub mod tracker;

pub use requirements::{
    CheckResult, CoherenceIssue, CoherenceIssueKind, CoherencePolicy, RequirementCheck,
    RequirementGate, RequirementPolicy, RequirementReport,
};
pub use tracker::{CategoryCompletion, CompletionSnapshot, CompletionTracker, TrackerConfig};

use crate::domain::property::PropertyFields;
use crate::flows::FlowContext;

/// Tracker snapshot plus the gate report, which is only produced once the
/// tracker reports every field present.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionAssessment {
    pub snapshot: CompletionSnapshot,
    pub requirements: Option<RequirementReport>,
}

impl CompletionAssessment {
    pub fn is_complete(&self) -> bool {
        self.snapshot.is_complete
            && self.requirements.as_ref().map(RequirementReport::passed).unwrap_or(false)
    }

    /// Every field is present but the gate is still failing.
    pub fn awaiting_requirements(&self) -> bool {
        self.snapshot.is_complete && !self.is_complete()
    }

    pub fn flow_context(&self) -> FlowContext {
        FlowContext {
            missing_required_fields: self.snapshot.missing_fields.clone(),
            failed_requirements: self
                .requirements
                .as_ref()
                .map(RequirementReport::blocking)
                .unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CompletionEngine {
    tracker: CompletionTracker,
    gate: RequirementGate,
}

impl CompletionEngine {
    pub fn new(tracker: CompletionTracker, gate: RequirementGate) -> Self {
        Self { tracker, gate }
    }

    pub fn tracker(&self) -> &CompletionTracker {
        &self.tracker
    }

    pub fn gate(&self) -> &RequirementGate {
        &self.gate
    }

    pub fn assess(&self, fields: &PropertyFields) -> CompletionAssessment {
        let snapshot = self.tracker.completeness(fields);
        let requirements = snapshot.is_complete.then(|| self.gate.evaluate(fields));
        CompletionAssessment { snapshot, requirements }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use rust_decimal::Decimal;

    use crate::domain::property::{Condition, PropertyFields, PropertyType, SaleTimeframe};

    pub(crate) fn complete_house() -> PropertyFields {
        PropertyFields {
            property_type: Some(PropertyType::House),
            built_area_m2: Some(Decimal::from(120)),
            bedrooms: Some(3),
            bathrooms: Some(2),
            parking_spots: Some(1),
            floor: None,
            stratum: Some(4),
            build_year: Some(2015),
            condition: Some(Condition::Good),
            sale_price: Some(Decimal::from(450_000_000_i64)),
            price_negotiable: Some(true),
            sale_reason: Some("Cambio de ciudad".to_string()),
            sale_timeframe: Some(SaleTimeframe::OneToThreeMonths),
            accepts_financing: Some(true),
            pending_debts: Some(false),
            existence_certificate: Some(true),
            deed: Some(true),
            hoa_clearance: Some(true),
            utility_bill: Some(true),
            property_tax_certificate: Some(true),
            photo_count: Some(6),
            description: Some(vec!["amplia"; 60].join(" ")),
            highlights: Some("Cerca al parque".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::complete_house;
    use super::{
        CompletionEngine, CompletionTracker, RequirementGate, RequirementPolicy, TrackerConfig,
    };
    use crate::domain::property::FieldName;
    use crate::validation::{FieldValidator, ValidationRules};

    fn engine(tracker_min_photos: i64) -> CompletionEngine {
        CompletionEngine::new(
            CompletionTracker::new(
                FieldValidator::new(ValidationRules { min_description_words: 50, current_year: 2026 }),
                TrackerConfig { min_photos: tracker_min_photos },
            ),
            RequirementGate::new(RequirementPolicy { current_year: 2026, ..RequirementPolicy::default() }),
        )
    }

    #[test]
    fn gate_is_skipped_until_tracker_complete() {
        let mut fields = complete_house();
        fields.stratum = None;
        let assessment = engine(5).assess(&fields);

        assert!(assessment.requirements.is_none());
        assert!(!assessment.is_complete());
        assert_eq!(assessment.flow_context().missing_required_fields, vec![FieldName::Stratum]);
    }

    #[test]
    fn full_presence_with_too_few_photos_is_not_complete() {
        let mut fields = complete_house();
        fields.photo_count = Some(3);
        let assessment = engine(1).assess(&fields);

        assert!(assessment.snapshot.is_complete);
        assert_eq!(assessment.snapshot.percentage, 100.0);
        assert!(!assessment.is_complete());
        assert!(assessment.awaiting_requirements());
        assert_eq!(assessment.flow_context().failed_requirements, vec!["minimum_photos".to_string()]);
    }

    #[test]
    fn three_documents_keep_the_record_open() {
        let mut fields = complete_house();
        fields.utility_bill = Some(false);
        let assessment = engine(5).assess(&fields);

        assert!(assessment.snapshot.is_complete);
        assert!(!assessment.is_complete());
    }

    #[test]
    fn complete_record_passes_both_gates() {
        let assessment = engine(5).assess(&complete_house());
        assert!(assessment.is_complete());
        assert!(assessment.flow_context().failed_requirements.is_empty());
    }
}

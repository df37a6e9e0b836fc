use serde::Serialize;

use crate::domain::property::{FieldCategory, FieldName, FieldValue, PropertyFields};
use crate::validation::{FieldValidator, SubjectContext};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Photo count below this leaves `fotos` outstanding.
    pub min_photos: i64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { min_photos: 5 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CategoryCompletion {
    pub category: FieldCategory,
    pub satisfied: usize,
    pub required: usize,
    pub percentage: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompletionSnapshot {
    pub percentage: f64,
    pub per_category: Vec<CategoryCompletion>,
    pub missing_fields: Vec<FieldName>,
    /// Field presence only; the requirement gate is evaluated separately.
    pub is_complete: bool,
}

impl CompletionSnapshot {
    pub fn category(&self, category: FieldCategory) -> Option<&CategoryCompletion> {
        self.per_category.iter().find(|entry| entry.category == category)
    }
}

#[derive(Clone, Debug, Default)]
pub struct CompletionTracker {
    validator: FieldValidator,
    config: TrackerConfig,
}

impl CompletionTracker {
    pub fn new(validator: FieldValidator, config: TrackerConfig) -> Self {
        Self { validator, config }
    }

    pub fn validator(&self) -> &FieldValidator {
        &self.validator
    }

    pub fn config(&self) -> TrackerConfig {
        self.config
    }

    /// Every field, minus the ones the current property type makes inapplicable.
    pub fn required_fields(&self, fields: &PropertyFields) -> Vec<FieldName> {
        FieldName::ALL
            .into_iter()
            .filter(|field| field.is_applicable(fields.property_type))
            .collect()
    }

    pub fn has_valid_value(&self, fields: &PropertyFields, field: FieldName) -> bool {
        let Some(value) = fields.get(field) else {
            return false;
        };
        let context = SubjectContext::from_fields(fields);
        if self.validator.revalidate(field, &value, &context).is_err() {
            return false;
        }

        match (field, value) {
            (FieldName::PhotoCount, FieldValue::Integer(count)) => count >= self.config.min_photos,
            _ => true,
        }
    }

    pub fn missing_fields(&self, fields: &PropertyFields) -> Vec<FieldName> {
        self.required_fields(fields)
            .into_iter()
            .filter(|field| !self.has_valid_value(fields, *field))
            .collect()
    }

    pub fn completeness(&self, fields: &PropertyFields) -> CompletionSnapshot {
        let required = self.required_fields(fields);
        let missing = self.missing_fields(fields);

        let per_category = FieldCategory::ALL
            .into_iter()
            .map(|category| {
                let required_in_category =
                    required.iter().filter(|field| field.category() == category).count();
                let missing_in_category =
                    missing.iter().filter(|field| field.category() == category).count();
                let satisfied = required_in_category - missing_in_category;
                CategoryCompletion {
                    category,
                    satisfied,
                    required: required_in_category,
                    percentage: percentage(satisfied, required_in_category),
                }
            })
            .collect();

        CompletionSnapshot {
            percentage: percentage(required.len() - missing.len(), required.len()),
            per_category,
            is_complete: missing.is_empty(),
            missing_fields: missing,
        }
    }
}

fn percentage(satisfied: usize, required: usize) -> f64 {
    if required == 0 {
        return 100.0;
    }
    satisfied as f64 / required as f64 * 100.0
}

//! Intake validation of answer sets against the option catalog
//!
//! Only fields that are present are checked, so a multi-step flow can submit
//! partial answer sets across several saves. Validation stops at the first
//! violation, walking fields in questionnaire order.

use crate::catalog::{ChoiceField, FREE_TEXT_PREFIX, OptionCatalog};
use crate::model::Answers;
use std::sync::Arc;
use thiserror::Error;

/// Inclusive bounds for `age`
pub const AGE_RANGE: std::ops::RangeInclusive<i32> = 0..=120;

/// A single field-level violation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid {field}: {value:?}. Allowed options: {allowed:?}{}", free_text_hint(.free_text))]
    NotAnOption {
        field: ChoiceField,
        value: String,
        allowed: Vec<String>,
        free_text: bool,
    },

    #[error("age {age} is outside the allowed range 0..=120")]
    AgeOutOfRange { age: i32 },
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn free_text_hint(free_text: &bool) -> String {
    if *free_text {
        format!(" or custom text starting with '{FREE_TEXT_PREFIX}'")
    } else {
        String::new()
    }
}

impl ValidationError {
    /// Wire name of the offending field
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::NotAnOption { field, .. } => field.as_str(),
            Self::AgeOutOfRange { .. } => "age",
        }
    }
}

/// Checks answer sets against a shared, immutable catalog
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    catalog: Arc<OptionCatalog>,
}

impl ResponseValidator {
    pub fn new(catalog: Arc<OptionCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &OptionCatalog {
        &self.catalog
    }

    /// Validate every present field; hand the set back untouched on success
    pub fn validate(&self, answers: Answers) -> Result<Answers, ValidationError> {
        self.check(&answers)?;
        Ok(answers)
    }

    /// Borrowing form of [`ResponseValidator::validate`]
    pub fn check(&self, answers: &Answers) -> Result<(), ValidationError> {
        let Answers {
            name: _,
            age,
            period_description,
            birth_control,
            last_period_date: _,
            cycle_length,
            period_concerns,
            body_concerns,
            skin_hair_concerns,
            mental_health_concerns,
            other_concerns,
            top_concern,
            diagnosed_conditions,
        } = answers;

        if let Some(age) = *age
            && !AGE_RANGE.contains(&age)
        {
            return Err(ValidationError::AgeOutOfRange { age });
        }

        self.check_one(ChoiceField::PeriodDescription, period_description)?;
        self.check_many(ChoiceField::BirthControl, birth_control)?;
        self.check_one(ChoiceField::CycleLength, cycle_length)?;
        self.check_many(ChoiceField::PeriodConcerns, period_concerns)?;
        self.check_many(ChoiceField::BodyConcerns, body_concerns)?;
        self.check_many(ChoiceField::SkinHairConcerns, skin_hair_concerns)?;
        self.check_many(ChoiceField::MentalHealthConcerns, mental_health_concerns)?;
        self.check_many(ChoiceField::OtherConcerns, other_concerns)?;
        self.check_one(ChoiceField::TopConcern, top_concern)?;
        self.check_many(ChoiceField::DiagnosedConditions, diagnosed_conditions)?;
        Ok(())
    }

    fn check_one(&self, field: ChoiceField, value: &Option<String>) -> Result<(), ValidationError> {
        match value {
            Some(value) if !self.catalog.is_valid(field, value) => {
                Err(self.violation(field, value))
            }
            _ => Ok(()),
        }
    }

    fn check_many(
        &self,
        field: ChoiceField,
        values: &Option<Vec<String>>,
    ) -> Result<(), ValidationError> {
        let Some(values) = values else {
            return Ok(());
        };
        match self.catalog.first_invalid(field, values) {
            Some(value) => Err(self.violation(field, value)),
            None => Ok(()),
        }
    }

    fn violation(&self, field: ChoiceField, value: &str) -> ValidationError {
        ValidationError::NotAnOption {
            field,
            value: value.to_string(),
            allowed: self.catalog.options(field).to_vec(),
            free_text: field.allows_free_text(),
        }
    }
}

//! Option catalog for constrained survey questions
//!
//! Holds the enumerated answer domain for every single- and multi-select
//! question. Values are exact strings: no trimming, case folding or
//! localization. Two fields (`other_concerns`, `diagnosed_conditions`) also
//! accept free text introduced by [`FREE_TEXT_PREFIX`].
//!
//! The catalog is built once at start-up (built-in or from a TOML file) and
//! shared immutably afterwards.

use crate::errors::{IntakeError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Literal prefix that lets free text through on escape-enabled fields
pub const FREE_TEXT_PREFIX: &str = "Others:";

/// A question whose answers are drawn from the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChoiceField {
    PeriodDescription,
    CycleLength,
    BirthControl,
    PeriodConcerns,
    BodyConcerns,
    SkinHairConcerns,
    MentalHealthConcerns,
    OtherConcerns,
    TopConcern,
    DiagnosedConditions,
}

impl ChoiceField {
    pub const ALL: [ChoiceField; 10] = [
        Self::PeriodDescription,
        Self::CycleLength,
        Self::BirthControl,
        Self::PeriodConcerns,
        Self::BodyConcerns,
        Self::SkinHairConcerns,
        Self::MentalHealthConcerns,
        Self::OtherConcerns,
        Self::TopConcern,
        Self::DiagnosedConditions,
    ];

    /// Wire name of the answer field
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PeriodDescription => "period_description",
            Self::CycleLength => "cycle_length",
            Self::BirthControl => "birth_control",
            Self::PeriodConcerns => "period_concerns",
            Self::BodyConcerns => "body_concerns",
            Self::SkinHairConcerns => "skin_hair_concerns",
            Self::MentalHealthConcerns => "mental_health_concerns",
            Self::OtherConcerns => "other_concerns",
            Self::TopConcern => "top_concern",
            Self::DiagnosedConditions => "diagnosed_conditions",
        }
    }

    /// Parse from the wire name
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == s)
    }

    /// Whether `Others:`-prefixed free text is accepted
    pub fn allows_free_text(&self) -> bool {
        matches!(self, Self::OtherConcerns | Self::DiagnosedConditions)
    }

    /// Whether the question takes a list of answers
    pub fn is_multi_select(&self) -> bool {
        !matches!(
            self,
            Self::PeriodDescription | Self::CycleLength | Self::TopConcern
        )
    }
}

impl std::fmt::Display for ChoiceField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const PERIOD_DESCRIPTION: &[&str] = &[
    "Regular",
    "Irregular",
    "Occasional Skips",
    "I don't get periods",
    "I'm not sure",
];

const CYCLE_LENGTH: &[&str] = &[
    "Less than 21 days",
    "21-25 days",
    "26-30 days",
    "31-35 days",
    "35+ days",
    "I'm not sure",
];

const BIRTH_CONTROL: &[&str] = &["Hormonal Birth Control Pills", "IUD (Intrauterine Device)"];

const PERIOD_CONCERNS: &[&str] = &[
    "Irregular Periods",
    "Painful Periods",
    "Light periods / Spotting",
    "Heavy periods",
];

const BODY_CONCERNS: &[&str] = &[
    "Bloating",
    "Hot Flashes",
    "Nausea",
    "Difficulty losing weight / stubborn belly fat",
    "Recent weight gain",
    "Menstrual headaches",
];

// The double space in the Hirsutism entry matches what the client sends.
const SKIN_HAIR_CONCERNS: &[&str] = &[
    "Hirsutism (hair  growth on chin, nipples etc)",
    "Thinning of hair",
    "Adult Acne",
];

const MENTAL_HEALTH_CONCERNS: &[&str] = &["Mood swings", "Stress", "Fatigue"];

const OTHER_CONCERNS: &[&str] = &["None of these", "Others (please specify)"];

const TOP_CONCERN: &[&str] = &[
    "Painful Periods",
    "Bloating",
    "Recent weight gain",
    "Hirsutism (hair growth on chin, nipples etc)",
    "Adult Acne",
    "Mood swings",
];

const DIAGNOSED_CONDITIONS: &[&str] = &[
    "PCOS",
    "PCOD",
    "Endometriosis",
    "Dysmenorrhea (painful periods)",
    "Amenorrhea (absence of periods)",
    "Menorrhagia (prolonged/heavy bleeding)",
    "Metrorrhagia (irregular bleeding)",
    "Cushing's Syndrome (PMS)",
    "Premenstrual Syndrome (PMS)",
    "None of the above",
    "Others (please specify)",
];

fn builtin_options(field: ChoiceField) -> &'static [&'static str] {
    match field {
        ChoiceField::PeriodDescription => PERIOD_DESCRIPTION,
        ChoiceField::CycleLength => CYCLE_LENGTH,
        ChoiceField::BirthControl => BIRTH_CONTROL,
        ChoiceField::PeriodConcerns => PERIOD_CONCERNS,
        ChoiceField::BodyConcerns => BODY_CONCERNS,
        ChoiceField::SkinHairConcerns => SKIN_HAIR_CONCERNS,
        ChoiceField::MentalHealthConcerns => MENTAL_HEALTH_CONCERNS,
        ChoiceField::OtherConcerns => OTHER_CONCERNS,
        ChoiceField::TopConcern => TOP_CONCERN,
        ChoiceField::DiagnosedConditions => DIAGNOSED_CONDITIONS,
    }
}

/// One entry of a catalog file
#[derive(Debug, Deserialize)]
struct DomainFile {
    options: Vec<String>,
}

/// Immutable answer domains, one ordered list per [`ChoiceField`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionCatalog {
    domains: BTreeMap<ChoiceField, Vec<String>>,
}

impl Default for OptionCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl OptionCatalog {
    /// The catalog shipped with the client app
    pub fn builtin() -> Self {
        let domains = ChoiceField::ALL
            .into_iter()
            .map(|field| {
                let options = builtin_options(field)
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect();
                (field, options)
            })
            .collect();
        Self { domains }
    }

    /// Load a catalog from a TOML file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            IntakeError::config_with_source(
                format!("failed to read catalog at {}", path.display()),
                e,
            )
        })?;
        Self::parse(&contents)
    }

    /// Parse a catalog from TOML.
    ///
    /// Each table (`[period_description]`, ...) carries an `options` array and
    /// replaces the built-in domain of that field. Fields the file does not
    /// mention keep their built-in options.
    pub fn parse(contents: &str) -> Result<Self> {
        let tables: BTreeMap<String, DomainFile> = toml::from_str(contents)
            .map_err(|e| IntakeError::config_with_source("failed to parse catalog", e))?;

        let mut catalog = Self::builtin();
        for (name, domain) in tables {
            let field = ChoiceField::parse(&name)
                .ok_or_else(|| IntakeError::config(format!("unknown catalog field `{name}`")))?;
            if domain.options.is_empty() {
                return Err(IntakeError::config(format!(
                    "catalog field `{name}` has no options"
                )));
            }
            catalog.domains.insert(field, domain.options);
        }

        tracing::debug!(fields = catalog.domains.len(), "Option catalog parsed");
        Ok(catalog)
    }

    /// Allowed values for a field, in display order
    pub fn options(&self, field: ChoiceField) -> &[String] {
        self.domains.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Membership test for a single value
    pub fn is_valid(&self, field: ChoiceField, value: &str) -> bool {
        if self.options(field).iter().any(|option| option == value) {
            return true;
        }
        field.allows_free_text() && value.starts_with(FREE_TEXT_PREFIX)
    }

    /// Membership test for every value of a multi-select answer
    pub fn all_valid(&self, field: ChoiceField, values: &[String]) -> bool {
        values.iter().all(|value| self.is_valid(field, value))
    }

    /// First value of `values` that is not allowed, if any
    pub fn first_invalid<'v>(&self, field: ChoiceField, values: &'v [String]) -> Option<&'v str> {
        values
            .iter()
            .map(String::as_str)
            .find(|value| !self.is_valid(field, value))
    }
}

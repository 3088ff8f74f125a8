//! # Schema Registry
//!
//! Defines the closed set of admissible values for every field of a feature
//! record, together with the fallback value the repair loop substitutes when a
//! field keeps failing validation.
//!
//! Matching is exact: values are compared byte for byte, so `"actors"` is not
//! an admissible spelling of `"Actors"`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Field '{0}' is not defined in the schema")]
    UnknownField(String),
    #[error("Field '{0}' is defined more than once")]
    DuplicateField(String),
    #[error("Field '{0}' has an empty closed domain")]
    EmptyDomain(String),
    #[error("Schema '{0}' defines no fields")]
    EmptySchema(String),
}

/// The set of values a field may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Domain {
    /// A finite enumeration of exact-match strings.
    Closed(Vec<String>),
    /// Any non-blank string.
    FreeText,
}

impl Domain {
    pub fn admits(&self, value: &str) -> bool {
        match self {
            Domain::Closed(values) => values.iter().any(|v| v == value),
            Domain::FreeText => !value.trim().is_empty(),
        }
    }
}

/// A single field of a [`RecordSchema`]. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    name: String,
    domain: Domain,
    fallback: Option<String>,
}

impl FieldSpec {
    /// Creates a field restricted to the given values.
    pub fn closed<I, S>(name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            domain: Domain::Closed(values.into_iter().map(Into::into).collect()),
            fallback: None,
        }
    }

    /// Creates a field that accepts any non-blank text.
    pub fn free_text(name: &str) -> Self {
        Self {
            name: name.to_string(),
            domain: Domain::FreeText,
            fallback: None,
        }
    }

    /// Assigns the value substituted for this field when repair gives up.
    pub fn with_fallback(mut self, fallback: &str) -> Self {
        self.fallback = Some(fallback.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn fallback(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    pub fn admits(&self, value: &str) -> bool {
        self.domain.admits(value)
    }
}

/// The ordered, complete set of fields a valid feature record must contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSchema {
    name: String,
    fields: Vec<FieldSpec>,
    default_fallback: String,
}

/// Used for fields that do not assign their own fallback.
pub const DEFAULT_FALLBACK: &str = "Unclear";

impl RecordSchema {
    pub fn builder(name: &str) -> RecordSchemaBuilder {
        RecordSchemaBuilder {
            name: name.to_string(),
            fields: Vec::new(),
            default_fallback: DEFAULT_FALLBACK.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(FieldSpec::name)
    }

    pub fn field(&self, name: &str) -> Result<&FieldSpec, SchemaError> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| SchemaError::UnknownField(name.to_string()))
    }

    /// Returns the designated fallback for a field.
    ///
    /// Fields without an assigned fallback share the schema-wide default. The
    /// returned value is not guaranteed to be admissible; see
    /// [`RecordSchema::defective_fallbacks`].
    pub fn fallback_for(&self, name: &str) -> Result<&str, SchemaError> {
        let field = self.field(name)?;
        Ok(field.fallback().unwrap_or(&self.default_fallback))
    }

    /// Names of fields whose fallback lies outside their own domain.
    ///
    /// A non-empty result is a configuration defect: repairing any of these
    /// fields ends in an invariant violation.
    pub fn defective_fallbacks(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| {
                let fallback = f.fallback().unwrap_or(&self.default_fallback);
                !f.admits(fallback)
            })
            .map(FieldSpec::name)
            .collect()
    }
}

pub struct RecordSchemaBuilder {
    name: String,
    fields: Vec<FieldSpec>,
    default_fallback: String,
}

impl RecordSchemaBuilder {
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn default_fallback(mut self, fallback: &str) -> Self {
        self.default_fallback = fallback.to_string();
        self
    }

    pub fn build(self) -> Result<RecordSchema, SchemaError> {
        if self.fields.is_empty() {
            return Err(SchemaError::EmptySchema(self.name));
        }
        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
            if matches!(&field.domain, Domain::Closed(values) if values.is_empty()) {
                return Err(SchemaError::EmptyDomain(field.name.clone()));
            }
        }
        Ok(RecordSchema {
            name: self.name,
            fields: self.fields,
            default_fallback: self.default_fallback,
        })
    }
}

// --- Built-in schemas ---

const CREATIVE_THEMES: &[&str] = &[
    "Product-Centric",
    "Lifestyle & Aspirational",
    "Testimonial & Social Proof",
    "Educational & Explainer",
    "Promotional & Offer-Based",
    "Humor & Entertainment",
    "Brand Story & Mission-Driven",
    "Trend-Based & Reactive",
    "Not Applicable",
];

const CREATIVE_CONCEPTS: &[&str] = &[
    "Day-in-the-life story",
    "Product demo",
    "Expert review",
    "Animated explainer",
    "Limited-time offer",
    "Meme-based content",
    "Founder story",
    "Behind-the-scenes",
    "Comparison",
    "Unboxing",
    "Cinematic brand film",
    "Aspirational creator collaboration",
    "Before-and-after story",
    "Myth-busting",
    "FAQ",
    "Flash sale",
    "Countdown timer",
    "Member deal",
    "Parody",
    "Satire",
    "Real-time reactive",
    "Trending creator collaboration",
    "Event-driven",
    "User-generated content (UGC)",
    "None",
    "Not Applicable",
];

const FORMAT_PRODUCTION_STYLES: &[&str] = &[
    "Static Image",
    "Carousel",
    "Native Video",
    "High-Production Video",
    "Animation & Motion Graphics",
    "Shoppable Ad",
    "Dynamic Creative",
    "Poll",
    "Quiz",
    "Gamified Experience",
    "Unclear",
];

const TALENT_TYPES: &[&str] = &[
    "Actors",
    "Influencers",
    "Customers",
    "Experts",
    "Combination of actors and customers",
    "Combination of influencers and customers",
    "None",
    "Unclear",
];

const DEMOGRAPHIC_REPRESENTATIONS: &[&str] = &[
    "Primarily Young Adults",
    "Primarily Middle-Aged Adults",
    "Primarily Older Adults",
    "Diverse Age Range",
    "Primarily Male",
    "Primarily Female",
    "Diverse Gender Representation",
    "Primarily White",
    "Primarily Black/African American",
    "Primarily Asian",
    "Primarily Hispanic/Latino",
    "Diverse Ethnic Representation",
    "Unclear",
    "No People Featured",
];

const AUDIENCE_FOCUSES: &[&str] = &[
    "Unaware Audience",
    "Problem Aware",
    "Solution Aware",
    "Product Aware",
    "Most Aware",
    "Unclear",
];

const CAMPAIGN_OBJECTIVES: &[&str] = &[
    "Awareness",
    "Traffic",
    "Engagement",
    "Leads",
    "App Promotion",
    "Sales",
    "Unclear",
];

pub const UGC_ANSWER_FIELD: &str = "answer";
pub const UGC_JUSTIFICATION_FIELD: &str = "justification";

/// The seven-field creative analysis schema for video ads.
pub fn ad_analysis() -> RecordSchema {
    RecordSchema {
        name: "ad_analysis".to_string(),
        fields: vec![
            FieldSpec::closed("creative_theme", CREATIVE_THEMES.iter().copied())
                .with_fallback("Not Applicable"),
            FieldSpec::closed("creative_concept", CREATIVE_CONCEPTS.iter().copied())
                .with_fallback("Not Applicable"),
            FieldSpec::closed(
                "format_production_style",
                FORMAT_PRODUCTION_STYLES.iter().copied(),
            ),
            FieldSpec::closed("talent_type", TALENT_TYPES.iter().copied()),
            FieldSpec::closed(
                "demographic_representation",
                DEMOGRAPHIC_REPRESENTATIONS.iter().copied(),
            ),
            FieldSpec::closed("audience_focus", AUDIENCE_FOCUSES.iter().copied()),
            FieldSpec::closed("campaign_objective", CAMPAIGN_OBJECTIVES.iter().copied()),
        ],
        default_fallback: DEFAULT_FALLBACK.to_string(),
    }
}

/// The UGC-style detection schema: a Yes/No answer and a short justification.
pub fn ugc() -> RecordSchema {
    RecordSchema {
        name: "ugc".to_string(),
        fields: vec![
            FieldSpec::closed(UGC_ANSWER_FIELD, ["Yes", "No"]).with_fallback("No"),
            FieldSpec::free_text(UGC_JUSTIFICATION_FIELD)
                .with_fallback("No justification provided."),
        ],
        default_fallback: DEFAULT_FALLBACK.to_string(),
    }
}

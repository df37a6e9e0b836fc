//! Per-field validation and normalization.
//!
//! Every field declared in [`FieldName`] has exactly one rule here. Validation is
//! pure: the same raw value and context always produce the same result, and a
//! normalized value validates to itself.

use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;

use crate::domain::property::{
    Condition, FieldKind, FieldName, FieldValue, PropertyFields, PropertyType, SaleTimeframe,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{field}: {reason}")]
pub struct ValidationFailure {
    pub field: FieldName,
    pub reason: String,
}

impl ValidationFailure {
    pub fn new(field: FieldName, reason: impl Into<String>) -> Self {
        Self { field, reason: reason.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationRules {
    pub min_description_words: usize,
    pub current_year: i32,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self { min_description_words: 50, current_year: Utc::now().year() }
    }
}

/// What the validator needs to know about the record being filled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubjectContext {
    pub property_type: Option<PropertyType>,
}

impl SubjectContext {
    pub fn from_fields(fields: &PropertyFields) -> Self {
        Self { property_type: fields.property_type }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NumericRange {
    pub min: Decimal,
    pub max: Decimal,
    pub unit: &'static str,
}

impl NumericRange {
    fn new(min: i64, max: i64, unit: &'static str) -> Self {
        Self { min: Decimal::from(min), max: Decimal::from(max), unit }
    }

    pub fn contains(&self, value: Decimal) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Clone, Debug, Default)]
pub struct FieldValidator {
    rules: ValidationRules,
}

impl FieldValidator {
    pub fn new(rules: ValidationRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    pub fn numeric_range(&self, field: FieldName) -> Option<NumericRange> {
        let range = match field {
            FieldName::BuiltArea => NumericRange::new(10, 10_000, "m²"),
            FieldName::Bedrooms => NumericRange::new(0, 20, "habitaciones"),
            FieldName::Bathrooms => NumericRange::new(1, 10, "baños"),
            FieldName::ParkingSpots => NumericRange::new(0, 10, "parqueaderos"),
            FieldName::Floor => NumericRange::new(1, 100, ""),
            FieldName::Stratum => NumericRange::new(1, 6, ""),
            FieldName::BuildYear => NumericRange::new(1900, i64::from(self.rules.current_year), ""),
            FieldName::SalePrice => NumericRange::new(50_000_000, 50_000_000_000, "COP"),
            FieldName::PhotoCount => NumericRange::new(0, 100, "fotos"),
            _ => return None,
        };
        Some(range)
    }

    pub fn validate(
        &self,
        field: FieldName,
        raw: &Value,
        context: &SubjectContext,
    ) -> Result<FieldValue, ValidationFailure> {
        if raw.is_null() {
            return Err(ValidationFailure::new(field, "no recibí ningún valor"));
        }

        if field == FieldName::Floor {
            match context.property_type {
                Some(kind) if kind.allows_floor() => {}
                Some(kind) => {
                    return Err(ValidationFailure::new(
                        field,
                        format!(
                            "el piso solo aplica para apartamentos u oficinas, no para {}",
                            kind.as_str()
                        ),
                    ))
                }
                None => {
                    return Err(ValidationFailure::new(
                        field,
                        "necesito conocer el tipo de inmueble antes de registrar el piso",
                    ))
                }
            }
        }

        match field.kind() {
            FieldKind::Decimal => {
                let number = self.checked_number(field, raw)?;
                Ok(FieldValue::Decimal(number.normalize()))
            }
            FieldKind::Integer => {
                let number = self.checked_number(field, raw)?;
                if !number.fract().is_zero() {
                    return Err(ValidationFailure::new(field, "debe ser un número entero"));
                }
                let whole = i64::try_from(number.trunc())
                    .map_err(|_| ValidationFailure::new(field, "el número es demasiado grande"))?;
                Ok(FieldValue::Integer(whole))
            }
            FieldKind::Flag => parse_flag(field, raw).map(FieldValue::Flag),
            FieldKind::Text => self.parse_text(field, raw).map(FieldValue::Text),
            FieldKind::Choice => parse_choice(field, raw),
        }
    }

    /// Re-runs validation on a stored value; used to decide whether a field is satisfied.
    pub fn revalidate(
        &self,
        field: FieldName,
        value: &FieldValue,
        context: &SubjectContext,
    ) -> Result<FieldValue, ValidationFailure> {
        self.validate(field, &value.to_json(), context)
    }

    fn checked_number(&self, field: FieldName, raw: &Value) -> Result<Decimal, ValidationFailure> {
        let number = match raw {
            Value::Number(number) => number_from_json(number),
            Value::String(text) => parse_numeric_text(text),
            _ => None,
        }
        .ok_or_else(|| ValidationFailure::new(field, "necesito un valor numérico"))?;

        if let Some(range) = self.numeric_range(field) {
            if !range.contains(number) {
                let unit = if range.unit.is_empty() {
                    String::new()
                } else {
                    format!(" {}", range.unit)
                };
                return Err(ValidationFailure::new(
                    field,
                    format!("debe estar entre {} y {}{unit}", range.min, range.max),
                ));
            }
        }
        Ok(number)
    }

    fn parse_text(&self, field: FieldName, raw: &Value) -> Result<String, ValidationFailure> {
        let Value::String(text) = raw else {
            return Err(ValidationFailure::new(field, "necesito una respuesta en texto"));
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ValidationFailure::new(field, "la respuesta está vacía"));
        }

        if field == FieldName::Description {
            let words = word_count(trimmed);
            let minimum = self.rules.min_description_words;
            if words < minimum {
                return Err(ValidationFailure::new(
                    field,
                    format!("la descripción debe tener al menos {minimum} palabras (tiene {words})"),
                ));
            }
        }

        Ok(trimmed.to_string())
    }
}

pub fn word_count(text: &str) -> usize {
    text.trim().split_whitespace().count()
}

/// Lowercases, strips accents and punctuation, and joins words with `_`.
pub fn normalize_token(text: &str) -> String {
    fold_accents(&text.to_lowercase())
        .chars()
        .map(|ch| if ch.is_alphanumeric() { ch } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

pub fn fold_accents(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            'á' | 'à' | 'ä' | 'Á' => 'a',
            'é' | 'è' | 'ë' | 'É' => 'e',
            'í' | 'ì' | 'ï' | 'Í' => 'i',
            'ó' | 'ò' | 'ö' | 'Ó' => 'o',
            'ú' | 'ù' | 'ü' | 'Ú' | 'Ü' => 'u',
            'ñ' | 'Ñ' => 'n',
            other => other,
        })
        .collect()
}

fn number_from_json(number: &serde_json::Number) -> Option<Decimal> {
    if let Some(value) = number.as_i64() {
        return Some(Decimal::from(value));
    }
    if let Some(value) = number.as_u64() {
        return Some(Decimal::from(value));
    }
    number.as_f64().filter(|value| value.is_finite()).and_then(|value| Decimal::try_from(value).ok())
}

const NUMBER_WORDS: &[(&str, i64)] = &[
    ("cero", 0),
    ("un", 1),
    ("uno", 1),
    ("una", 1),
    ("dos", 2),
    ("tres", 3),
    ("cuatro", 4),
    ("cinco", 5),
    ("seis", 6),
    ("siete", 7),
    ("ocho", 8),
    ("nueve", 9),
    ("diez", 10),
];

/// Parses the first number in free text, honoring Colombian separators
/// (`450.000.000`, `1,5`) and magnitude words (`mil`, `millones`).
pub fn parse_numeric_text(text: &str) -> Option<Decimal> {
    let lowered = fold_accents(&text.to_lowercase());

    let Some(start) = lowered.find(|ch: char| ch.is_ascii_digit()) else {
        return lowered
            .split(|ch: char| !ch.is_alphanumeric())
            .find_map(|word| NUMBER_WORDS.iter().find(|(name, _)| *name == word))
            .map(|(_, value)| Decimal::from(*value));
    };

    let token: String = lowered[start..]
        .chars()
        .take_while(|ch| ch.is_ascii_digit() || *ch == '.' || *ch == ',')
        .collect();
    let rest = &lowered[start + token.len()..];
    let token = token.trim_end_matches(['.', ',']);
    let negative = lowered[..start].trim_end().ends_with('-');

    let value = normalize_separators(token).parse::<Decimal>().ok()?;
    let rest = rest.trim_start();
    let magnitude = if rest.starts_with("mil millones") {
        1_000_000_000_i64
    } else if rest.starts_with("millon") {
        1_000_000
    } else if rest.starts_with("mil") && !rest.starts_with("milimetro") {
        1_000
    } else {
        1
    };
    // Out-of-range magnitudes read as non-numeric.
    let value = value.checked_mul(Decimal::from(magnitude))?;

    Some(if negative { -value } else { value })
}

fn normalize_separators(token: &str) -> String {
    let dots = token.matches('.').count();
    let commas = token.matches(',').count();
    let digits_after = |separator: char| {
        token.rfind(separator).map(|index| token.len() - index - 1).unwrap_or(0)
    };

    match (dots, commas) {
        (0, 0) => token.to_string(),
        (dots, 0) => {
            if dots > 1 || digits_after('.') == 3 {
                token.replace('.', "")
            } else {
                token.to_string()
            }
        }
        (0, commas) => {
            if commas > 1 || digits_after(',') == 3 {
                token.replace(',', "")
            } else {
                token.replace(',', ".")
            }
        }
        _ => {
            let last_dot = token.rfind('.').unwrap_or(0);
            let last_comma = token.rfind(',').unwrap_or(0);
            if last_comma > last_dot {
                token.replace('.', "").replace(',', ".")
            } else {
                token.replace(',', "")
            }
        }
    }
}

const AFFIRMATIVE: &[&str] = &[
    "si",
    "yes",
    "true",
    "1",
    "claro",
    "correcto",
    "afirmativo",
    "tengo",
    "si_tengo",
    "si_senor",
    "si_claro",
    "claro_que_si",
    "si_la_tengo",
    "si_lo_tengo",
    "si_ya_la_tengo",
    "si_ya_lo_tengo",
    "ya_la_tengo",
    "ya_lo_tengo",
    "por_supuesto",
];

const NEGATIVE: &[&str] = &[
    "no",
    "false",
    "0",
    "ninguna",
    "ninguno",
    "no_tengo",
    "no_la_tengo",
    "no_lo_tengo",
    "no_no_tengo",
    "no_todavia_no",
    "aun_no",
    "todavia_no",
    "tampoco",
    "negativo",
];

fn parse_flag(field: FieldName, raw: &Value) -> Result<bool, ValidationFailure> {
    let clarification = || {
        ValidationFailure::new(field, "no entendí si la respuesta es sí o no, ¿me confirmas?")
    };

    match raw {
        Value::Bool(value) => Ok(*value),
        Value::Number(number) => match number.as_i64() {
            Some(1) => Ok(true),
            Some(0) => Ok(false),
            _ => Err(clarification()),
        },
        Value::String(text) => {
            let token = normalize_token(text);
            if AFFIRMATIVE.contains(&token.as_str()) {
                return Ok(true);
            }
            if NEGATIVE.contains(&token.as_str()) {
                return Ok(false);
            }
            Err(clarification())
        }
        _ => Err(clarification()),
    }
}

const LEADING_ARTICLES: &[&str] = &["un_", "una_", "el_", "la_", "es_un_", "es_una_"];

fn parse_choice(field: FieldName, raw: &Value) -> Result<FieldValue, ValidationFailure> {
    let Value::String(text) = raw else {
        return Err(ValidationFailure::new(field, "necesito una de las opciones en texto"));
    };
    let mut token = normalize_token(text);
    for article in LEADING_ARTICLES {
        if let Some(stripped) = token.strip_prefix(article) {
            token = stripped.to_string();
            break;
        }
    }

    match field {
        FieldName::PropertyType => PropertyType::ALL
            .into_iter()
            .find(|kind| kind.synonyms().contains(&token.as_str()))
            .map(FieldValue::PropertyType)
            .ok_or_else(|| {
                ValidationFailure::new(
                    field,
                    "el tipo debe ser casa, apartamento, oficina, local, lote, bodega o finca",
                )
            }),
        FieldName::Condition => Condition::ALL
            .into_iter()
            .find(|condition| condition.synonyms().contains(&token.as_str()))
            .map(FieldValue::Condition)
            .ok_or_else(|| {
                ValidationFailure::new(
                    field,
                    "el estado debe ser nuevo, excelente, bueno, regular o para remodelar",
                )
            }),
        FieldName::SaleTimeframe => match_timeframe(&token).map(FieldValue::Timeframe).ok_or_else(
            || {
                ValidationFailure::new(
                    field,
                    "el tiempo debe ser inmediato, 1 a 3 meses, 3 a 6 meses o más de 6 meses",
                )
            },
        ),
        other => Err(ValidationFailure::new(other, "el campo no admite opciones")),
    }
}

fn match_timeframe(token: &str) -> Option<SaleTimeframe> {
    SaleTimeframe::ALL
        .into_iter()
        .find(|bucket| bucket.as_str() == token)
        .or_else(|| {
            SaleTimeframe::ALL
                .into_iter()
                .find(|bucket| bucket.fragments().iter().any(|fragment| token.contains(fragment)))
        })
}

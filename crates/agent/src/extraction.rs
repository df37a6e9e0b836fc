//! Offline interpreter: keyword and number-unit patterns over Spanish replies.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

use listing_core::domain::property::{FieldKind, FieldName, PropertyType};
use listing_core::validation::{fold_accents, parse_numeric_text, SubjectContext};

use crate::interpreter::{Interpretation, ResponseInterpreter};

#[derive(Clone, Debug, Default)]
pub struct RuleBasedInterpreter;

impl RuleBasedInterpreter {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, utterance: &str, current_field: Option<FieldName>) -> BTreeMap<FieldName, Value> {
        let reply = utterance.trim();
        let mut fields = BTreeMap::new();

        // Free-text answers are stored whole and nothing else is read from them.
        if let Some(field) = current_field.filter(|field| field.kind() == FieldKind::Text) {
            if !reply.is_empty() {
                fields.insert(field, Value::String(reply.to_string()));
            }
            return fields;
        }

        let normalized = fold_accents(&utterance.to_lowercase());
        let tokens = tokenize(&normalized);

        if let Some(kind) = extract_property_type(&tokens) {
            fields.insert(FieldName::PropertyType, Value::String(kind.as_str().to_string()));
        }
        for (field, value) in extract_counted_units(&tokens) {
            fields.entry(field).or_insert(value);
        }
        for (field, value) in extract_labelled_numbers(&tokens) {
            fields.entry(field).or_insert(value);
        }
        if let Some(price) = extract_price(&tokens) {
            fields.entry(FieldName::SalePrice).or_insert(price);
        }

        if let Some(field) = current_field {
            if fields.is_empty() && !reply.is_empty() {
                fields.insert(field, Value::String(reply.to_string()));
            }
        }

        fields
    }
}

#[async_trait]
impl ResponseInterpreter for RuleBasedInterpreter {
    async fn interpret(
        &self,
        utterance: &str,
        current_field: Option<FieldName>,
        _context: &SubjectContext,
    ) -> Interpretation {
        Interpretation::from_map(self.extract(utterance, current_field))
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_alphanumeric() || matches!(character, '$' | '.' | ',') {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized
        .split_whitespace()
        .map(|token| token.trim_matches(|ch: char| ch == '.' || ch == ',').to_string())
        .filter(|token| !token.is_empty())
        .collect()
}

/// Longest synonym wins so that `casa campestre` is a farm, not a house.
fn extract_property_type(tokens: &[String]) -> Option<PropertyType> {
    let joined = format!("_{}_", tokens.join("_"));
    PropertyType::ALL
        .iter()
        .flat_map(|kind| kind.synonyms().iter().map(move |synonym| (*kind, *synonym)))
        .filter(|(_, synonym)| joined.contains(&format!("_{synonym}_")))
        .max_by_key(|(_, synonym)| synonym.len())
        .map(|(kind, _)| kind)
}

const AREA_UNITS: &[&str] = &["m2", "mt2", "mts", "mts2", "metros", "metro", "metros2"];
const BEDROOM_UNITS: &[&str] =
    &["habitaciones", "habitacion", "alcobas", "alcoba", "cuartos", "cuarto", "dormitorios"];
const BATHROOM_UNITS: &[&str] = &["banos", "bano"];
const PARKING_UNITS: &[&str] = &["parqueaderos", "parqueadero", "garajes", "garaje"];
const PHOTO_UNITS: &[&str] = &["fotos", "foto", "fotografias"];

fn unit_field(unit: &str) -> Option<FieldName> {
    let table: [(&[&str], FieldName); 5] = [
        (AREA_UNITS, FieldName::BuiltArea),
        (BEDROOM_UNITS, FieldName::Bedrooms),
        (BATHROOM_UNITS, FieldName::Bathrooms),
        (PARKING_UNITS, FieldName::ParkingSpots),
        (PHOTO_UNITS, FieldName::PhotoCount),
    ];
    table.iter().find(|(units, _)| units.contains(&unit)).map(|(_, field)| *field)
}

/// `<number> <unit>` pairs, plus glued forms such as `120m2`.
fn extract_counted_units(tokens: &[String]) -> Vec<(FieldName, Value)> {
    let mut found = Vec::new();
    for window in tokens.windows(2) {
        if let [value, unit] = window {
            let Some(field) = unit_field(unit) else {
                continue;
            };
            if let Some(number) = parse_number_token(value) {
                found.push((field, number_value(number)));
            }
        }
    }
    for token in tokens {
        if let Some(prefix) = AREA_UNITS.iter().find_map(|unit| token.strip_suffix(unit)) {
            if prefix.chars().next().is_some_and(|ch| ch.is_ascii_digit()) {
                if let Some(number) = parse_number_token(prefix) {
                    found.push((FieldName::BuiltArea, number_value(number)));
                }
            }
        }
    }
    found
}

const YEAR_CONTEXT: &[&str] = &["ano", "en", "del", "construccion", "construida", "construido"];

/// `estrato 4`, `piso 7`, `construida en 2015`.
fn extract_labelled_numbers(tokens: &[String]) -> Vec<(FieldName, Value)> {
    let mut found = Vec::new();
    for window in tokens.windows(2) {
        if let [label, value] = window {
            let field = match label.as_str() {
                "estrato" => Some(FieldName::Stratum),
                "piso" => Some(FieldName::Floor),
                label if YEAR_CONTEXT.contains(&label) && is_year(value) => Some(FieldName::BuildYear),
                _ => None,
            };
            let Some(field) = field else {
                continue;
            };
            if let Some(number) = parse_number_token(value) {
                found.push((field, number_value(number)));
            }
        }
    }
    found
}

fn is_year(token: &str) -> bool {
    token.len() == 4
        && token.chars().all(|ch| ch.is_ascii_digit())
        && token.parse::<i64>().map(|year| (1800..=2100).contains(&year)).unwrap_or(false)
}

/// `$450.000.000` or `450 millones`.
fn extract_price(tokens: &[String]) -> Option<Value> {
    for (index, token) in tokens.iter().enumerate() {
        let next = tokens.get(index + 1).map(String::as_str).unwrap_or("");
        let magnitude = next.starts_with("millon") || next == "mil";
        if let Some(amount) = token.strip_prefix('$') {
            let phrase = format!("{amount} {next}");
            return parse_numeric_text(&phrase).map(number_value);
        }
        if magnitude && token.chars().next().is_some_and(|ch| ch.is_ascii_digit()) {
            let after_next = tokens.get(index + 2).map(String::as_str).unwrap_or("");
            let phrase = if next == "mil" && after_next.starts_with("millon") {
                format!("{token} mil millones")
            } else {
                format!("{token} {next}")
            };
            let value = parse_numeric_text(&phrase)?;
            if value >= Decimal::from(1_000_000_i64) {
                return Some(number_value(value));
            }
        }
    }
    None
}

fn parse_number_token(token: &str) -> Option<Decimal> {
    if token.chars().any(|ch| ch.is_ascii_digit()) || NUMBER_WORDS.contains(&token) {
        parse_numeric_text(token)
    } else {
        None
    }
}

const NUMBER_WORDS: &[&str] =
    &["un", "una", "uno", "dos", "tres", "cuatro", "cinco", "seis", "siete", "ocho", "nueve", "diez"];

fn number_value(number: Decimal) -> Value {
    let normalized = number.normalize();
    if normalized.fract().is_zero() {
        if let Some(whole) = normalized.to_i64() {
            return Value::from(whole);
        }
    }
    normalized.to_f64().map(Value::from).unwrap_or_else(|| Value::String(normalized.to_string()))
}

#[cfg(test)]
mod tests {
    use listing_core::domain::property::FieldName;
    use serde_json::{json, Value};

    use super::RuleBasedInterpreter;

    #[test]
    fn extracts_house_layout_from_a_single_sentence() {
        let fields = RuleBasedInterpreter::new().extract(
            "Es una casa de 120 metros con 3 habitaciones y 2 baños",
            Some(FieldName::PropertyType),
        );

        assert_eq!(fields.get(&FieldName::PropertyType), Some(&json!("casa")));
        assert_eq!(fields.get(&FieldName::BuiltArea), Some(&json!(120)));
        assert_eq!(fields.get(&FieldName::Bedrooms), Some(&json!(3)));
        assert_eq!(fields.get(&FieldName::Bathrooms), Some(&json!(2)));
        assert_eq!(fields.len(), 4);
    }

    #[test]
    fn labelled_numbers_and_glued_units() {
        let fields = RuleBasedInterpreter::new()
            .extract("Apartamento de 85m2, estrato 4, piso 7, construido en 2012, un parqueadero", None);

        assert_eq!(fields.get(&FieldName::PropertyType), Some(&json!("apartamento")));
        assert_eq!(fields.get(&FieldName::BuiltArea), Some(&json!(85)));
        assert_eq!(fields.get(&FieldName::Stratum), Some(&json!(4)));
        assert_eq!(fields.get(&FieldName::Floor), Some(&json!(7)));
        assert_eq!(fields.get(&FieldName::BuildYear), Some(&json!(2012)));
        assert_eq!(fields.get(&FieldName::ParkingSpots), Some(&json!(1)));
    }

    #[test]
    fn longest_synonym_decides_property_type() {
        let fields = RuleBasedInterpreter::new().extract("es una casa campestre", None);
        assert_eq!(fields.get(&FieldName::PropertyType), Some(&json!("finca")));
    }

    #[test]
    fn prices_with_currency_sign_or_millions() {
        let interpreter = RuleBasedInterpreter::new();
        assert_eq!(
            interpreter.extract("Lo vendo en $450.000.000", None).get(&FieldName::SalePrice),
            Some(&json!(450_000_000_i64))
        );
        assert_eq!(
            interpreter.extract("pido 380 millones", None).get(&FieldName::SalePrice),
            Some(&json!(380_000_000_i64))
        );
    }

    #[test]
    fn unmatched_reply_is_handed_to_the_pending_field() {
        let fields = RuleBasedInterpreter::new()
            .extract("el área es gigante", Some(FieldName::BuiltArea));
        assert_eq!(
            fields.get(&FieldName::BuiltArea),
            Some(&Value::String("el área es gigante".to_string()))
        );

        let flag = RuleBasedInterpreter::new().extract("sí, claro", Some(FieldName::Deed));
        assert_eq!(flag.get(&FieldName::Deed), Some(&json!("sí, claro")));
    }

    #[test]
    fn text_fields_take_the_whole_reply() {
        let reply = "Casa esquinera con 3 habitaciones y patio amplio";
        let fields = RuleBasedInterpreter::new().extract(reply, Some(FieldName::Description));
        assert_eq!(fields.get(&FieldName::Description), Some(&json!(reply)));
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn nothing_recognised_without_pending_field() {
        assert!(RuleBasedInterpreter::new().extract("hola", None).is_empty());
    }
}

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyId(pub String);

impl PropertyId {
    pub fn generate() -> Self {
        Self(format!("PROP-{}", uuid::Uuid::new_v4()))
    }
}

/// Phone-number identity of the seller; digits only so that form input
/// (`+57 300 123 4567`) and webhook senders (`573001234567`) match.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContactId(pub String);

impl ContactId {
    pub fn normalized(raw: &str) -> Self {
        Self(raw.chars().filter(char::is_ascii_digit).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCategory {
    Physical,
    Commercial,
    Documentation,
    Description,
}

impl FieldCategory {
    pub const ALL: [FieldCategory; 4] =
        [Self::Physical, Self::Commercial, Self::Documentation, Self::Description];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Physical => "physical",
            Self::Commercial => "commercial",
            Self::Documentation => "documentation",
            Self::Description => "description",
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldName> + '_ {
        FieldName::ALL.into_iter().filter(move |field| field.category() == *self)
    }
}

/// Shape of the value a field holds once validated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Decimal,
    Integer,
    Flag,
    Text,
    Choice,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldName {
    #[serde(rename = "tipo_propiedad")]
    PropertyType,
    #[serde(rename = "area_construida")]
    BuiltArea,
    #[serde(rename = "habitaciones")]
    Bedrooms,
    #[serde(rename = "banos")]
    Bathrooms,
    #[serde(rename = "parqueaderos")]
    ParkingSpots,
    #[serde(rename = "piso")]
    Floor,
    #[serde(rename = "estrato")]
    Stratum,
    #[serde(rename = "ano_construccion")]
    BuildYear,
    #[serde(rename = "estado_conservacion")]
    Condition,
    #[serde(rename = "precio_venta")]
    SalePrice,
    #[serde(rename = "precio_negociable")]
    PriceNegotiable,
    #[serde(rename = "motivo_venta")]
    SaleReason,
    #[serde(rename = "tiempo_venta")]
    SaleTimeframe,
    #[serde(rename = "acepta_credito")]
    AcceptsFinancing,
    #[serde(rename = "deudas_pendientes")]
    PendingDebts,
    #[serde(rename = "certificado_existencia")]
    ExistenceCertificate,
    #[serde(rename = "escritura")]
    Deed,
    #[serde(rename = "paz_salvo_administracion")]
    HoaClearance,
    #[serde(rename = "recibo_servicios")]
    UtilityBill,
    #[serde(rename = "certificado_predial")]
    PropertyTaxCertificate,
    #[serde(rename = "fotos")]
    PhotoCount,
    #[serde(rename = "descripcion")]
    Description,
    #[serde(rename = "puntos_destacados")]
    Highlights,
}

impl FieldName {
    pub const ALL: [FieldName; 23] = [
        Self::PropertyType,
        Self::BuiltArea,
        Self::Bedrooms,
        Self::Bathrooms,
        Self::ParkingSpots,
        Self::Floor,
        Self::Stratum,
        Self::BuildYear,
        Self::Condition,
        Self::SalePrice,
        Self::PriceNegotiable,
        Self::SaleReason,
        Self::SaleTimeframe,
        Self::AcceptsFinancing,
        Self::PendingDebts,
        Self::ExistenceCertificate,
        Self::Deed,
        Self::HoaClearance,
        Self::UtilityBill,
        Self::PropertyTaxCertificate,
        Self::PhotoCount,
        Self::Description,
        Self::Highlights,
    ];

    /// The four documents that count toward the minimum-documents rule.
    pub const OPTIONAL_DOCUMENTS: [FieldName; 4] =
        [Self::Deed, Self::HoaClearance, Self::UtilityBill, Self::PropertyTaxCertificate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PropertyType => "tipo_propiedad",
            Self::BuiltArea => "area_construida",
            Self::Bedrooms => "habitaciones",
            Self::Bathrooms => "banos",
            Self::ParkingSpots => "parqueaderos",
            Self::Floor => "piso",
            Self::Stratum => "estrato",
            Self::BuildYear => "ano_construccion",
            Self::Condition => "estado_conservacion",
            Self::SalePrice => "precio_venta",
            Self::PriceNegotiable => "precio_negociable",
            Self::SaleReason => "motivo_venta",
            Self::SaleTimeframe => "tiempo_venta",
            Self::AcceptsFinancing => "acepta_credito",
            Self::PendingDebts => "deudas_pendientes",
            Self::ExistenceCertificate => "certificado_existencia",
            Self::Deed => "escritura",
            Self::HoaClearance => "paz_salvo_administracion",
            Self::UtilityBill => "recibo_servicios",
            Self::PropertyTaxCertificate => "certificado_predial",
            Self::PhotoCount => "fotos",
            Self::Description => "descripcion",
            Self::Highlights => "puntos_destacados",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|field| field.as_str() == normalized)
    }

    pub fn category(&self) -> FieldCategory {
        match self {
            Self::PropertyType
            | Self::BuiltArea
            | Self::Bedrooms
            | Self::Bathrooms
            | Self::ParkingSpots
            | Self::Floor
            | Self::Stratum
            | Self::BuildYear
            | Self::Condition => FieldCategory::Physical,
            Self::SalePrice
            | Self::PriceNegotiable
            | Self::SaleReason
            | Self::SaleTimeframe
            | Self::AcceptsFinancing
            | Self::PendingDebts => FieldCategory::Commercial,
            Self::ExistenceCertificate
            | Self::Deed
            | Self::HoaClearance
            | Self::UtilityBill
            | Self::PropertyTaxCertificate
            | Self::PhotoCount => FieldCategory::Documentation,
            Self::Description | Self::Highlights => FieldCategory::Description,
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Self::BuiltArea | Self::SalePrice => FieldKind::Decimal,
            Self::Bedrooms
            | Self::Bathrooms
            | Self::ParkingSpots
            | Self::Floor
            | Self::Stratum
            | Self::BuildYear
            | Self::PhotoCount => FieldKind::Integer,
            Self::PriceNegotiable
            | Self::AcceptsFinancing
            | Self::PendingDebts
            | Self::ExistenceCertificate
            | Self::Deed
            | Self::HoaClearance
            | Self::UtilityBill
            | Self::PropertyTaxCertificate => FieldKind::Flag,
            Self::SaleReason | Self::Description | Self::Highlights => FieldKind::Text,
            Self::PropertyType | Self::Condition | Self::SaleTimeframe => FieldKind::Choice,
        }
    }

    /// Fields whose applicability depends on the property type.
    pub fn is_applicable(&self, property_type: Option<PropertyType>) -> bool {
        match self {
            Self::Floor => property_type.map(|kind| kind.allows_floor()).unwrap_or(false),
            _ => true,
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    #[serde(rename = "casa")]
    House,
    #[serde(rename = "apartamento")]
    Apartment,
    #[serde(rename = "oficina")]
    Office,
    #[serde(rename = "local")]
    Storefront,
    #[serde(rename = "lote")]
    Lot,
    #[serde(rename = "bodega")]
    Warehouse,
    #[serde(rename = "finca")]
    Farm,
}

impl PropertyType {
    pub const ALL: [PropertyType; 7] = [
        Self::House,
        Self::Apartment,
        Self::Office,
        Self::Storefront,
        Self::Lot,
        Self::Warehouse,
        Self::Farm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::House => "casa",
            Self::Apartment => "apartamento",
            Self::Office => "oficina",
            Self::Storefront => "local",
            Self::Lot => "lote",
            Self::Warehouse => "bodega",
            Self::Farm => "finca",
        }
    }

    pub fn synonyms(&self) -> &'static [&'static str] {
        match self {
            Self::House => &["casa", "house", "vivienda"],
            Self::Apartment => &["apartamento", "apto", "apartment", "departamento"],
            Self::Office => &["oficina", "office", "consultorio"],
            Self::Storefront => &["local", "local_comercial", "comercial"],
            Self::Lot => &["lote", "terreno"],
            Self::Warehouse => &["bodega", "warehouse"],
            Self::Farm => &["finca", "casa_campestre", "finca_raiz_rural"],
        }
    }

    pub fn allows_floor(&self) -> bool {
        matches!(self, Self::Apartment | Self::Office)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    #[serde(rename = "nuevo")]
    New,
    #[serde(rename = "excelente")]
    Excellent,
    #[serde(rename = "bueno")]
    Good,
    #[serde(rename = "regular")]
    Fair,
    #[serde(rename = "para_remodelar")]
    NeedsRenovation,
}

impl Condition {
    pub const ALL: [Condition; 5] =
        [Self::New, Self::Excellent, Self::Good, Self::Fair, Self::NeedsRenovation];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "nuevo",
            Self::Excellent => "excelente",
            Self::Good => "bueno",
            Self::Fair => "regular",
            Self::NeedsRenovation => "para_remodelar",
        }
    }

    pub fn synonyms(&self) -> &'static [&'static str] {
        match self {
            Self::New => &["nuevo", "nueva", "new", "estrenar", "para_estrenar"],
            Self::Excellent => &["excelente", "excelente_estado", "impecable"],
            Self::Good => &["bueno", "buena", "buen_estado", "good"],
            Self::Fair => &["regular", "aceptable"],
            Self::NeedsRenovation => &["para_remodelar", "remodelar", "necesita_remodelacion"],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SaleTimeframe {
    #[serde(rename = "inmediato")]
    Immediate,
    #[serde(rename = "1_3_meses")]
    OneToThreeMonths,
    #[serde(rename = "3_6_meses")]
    ThreeToSixMonths,
    #[serde(rename = "mas_6_meses")]
    OverSixMonths,
}

impl SaleTimeframe {
    pub const ALL: [SaleTimeframe; 4] =
        [Self::Immediate, Self::OneToThreeMonths, Self::ThreeToSixMonths, Self::OverSixMonths];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "inmediato",
            Self::OneToThreeMonths => "1_3_meses",
            Self::ThreeToSixMonths => "3_6_meses",
            Self::OverSixMonths => "mas_6_meses",
        }
    }

    /// Fragments accepted by the near-miss match, checked in `ALL` order.
    pub fn fragments(&self) -> &'static [&'static str] {
        match self {
            Self::Immediate => &["inmediat", "urgente", "lo_antes_posible", "ya_mismo"],
            Self::OneToThreeMonths => &["1_3", "1_a_3", "1_y_3", "uno_a_tres", "un_mes", "2_meses"],
            Self::OverSixMonths => &["mas_6", "mas_de_6", "mas_de_seis", "sin_afan", "sin_prisa"],
            Self::ThreeToSixMonths => &["3_6", "3_a_6", "3_y_6", "tres_a_seis", "medio_ano", "4_meses"],
        }
    }
}

/// A validated, normalized field value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Decimal(Decimal),
    Integer(i64),
    Flag(bool),
    PropertyType(PropertyType),
    Condition(Condition),
    Timeframe(SaleTimeframe),
    Text(String),
}

impl FieldValue {
    /// JSON form used for re-validation and export. Whole decimals become
    /// integers so that `80.0` and `80` share one representation.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Decimal(value) => {
                let normalized = value.normalize();
                if normalized.fract().is_zero() {
                    match i64::try_from(normalized) {
                        Ok(whole) => Value::from(whole),
                        Err(_) => Value::String(normalized.to_string()),
                    }
                } else {
                    Value::String(normalized.to_string())
                }
            }
            Self::Integer(value) => Value::from(*value),
            Self::Flag(value) => Value::Bool(*value),
            Self::PropertyType(value) => Value::String(value.as_str().to_string()),
            Self::Condition(value) => Value::String(value.as_str().to_string()),
            Self::Timeframe(value) => Value::String(value.as_str().to_string()),
            Self::Text(value) => Value::String(value.clone()),
        }
    }

    pub fn display(&self) -> String {
        match self {
            Self::Decimal(value) => value.normalize().to_string(),
            Self::Integer(value) => value.to_string(),
            Self::Flag(true) => "sí".to_string(),
            Self::Flag(false) => "no".to_string(),
            Self::PropertyType(value) => value.as_str().to_string(),
            Self::Condition(value) => value.as_str().replace('_', " "),
            Self::Timeframe(value) => value.as_str().replace('_', " "),
            Self::Text(value) => value.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyFields {
    #[serde(rename = "tipo_propiedad", default, skip_serializing_if = "Option::is_none")]
    pub property_type: Option<PropertyType>,
    #[serde(rename = "area_construida", default, skip_serializing_if = "Option::is_none")]
    pub built_area_m2: Option<Decimal>,
    #[serde(rename = "habitaciones", default, skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<i64>,
    #[serde(rename = "banos", default, skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<i64>,
    #[serde(rename = "parqueaderos", default, skip_serializing_if = "Option::is_none")]
    pub parking_spots: Option<i64>,
    #[serde(rename = "piso", default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<i64>,
    #[serde(rename = "estrato", default, skip_serializing_if = "Option::is_none")]
    pub stratum: Option<i64>,
    #[serde(rename = "ano_construccion", default, skip_serializing_if = "Option::is_none")]
    pub build_year: Option<i64>,
    #[serde(rename = "estado_conservacion", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(rename = "precio_venta", default, skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<Decimal>,
    #[serde(rename = "precio_negociable", default, skip_serializing_if = "Option::is_none")]
    pub price_negotiable: Option<bool>,
    #[serde(rename = "motivo_venta", default, skip_serializing_if = "Option::is_none")]
    pub sale_reason: Option<String>,
    #[serde(rename = "tiempo_venta", default, skip_serializing_if = "Option::is_none")]
    pub sale_timeframe: Option<SaleTimeframe>,
    #[serde(rename = "acepta_credito", default, skip_serializing_if = "Option::is_none")]
    pub accepts_financing: Option<bool>,
    #[serde(rename = "deudas_pendientes", default, skip_serializing_if = "Option::is_none")]
    pub pending_debts: Option<bool>,
    #[serde(rename = "certificado_existencia", default, skip_serializing_if = "Option::is_none")]
    pub existence_certificate: Option<bool>,
    #[serde(rename = "escritura", default, skip_serializing_if = "Option::is_none")]
    pub deed: Option<bool>,
    #[serde(rename = "paz_salvo_administracion", default, skip_serializing_if = "Option::is_none")]
    pub hoa_clearance: Option<bool>,
    #[serde(rename = "recibo_servicios", default, skip_serializing_if = "Option::is_none")]
    pub utility_bill: Option<bool>,
    #[serde(rename = "certificado_predial", default, skip_serializing_if = "Option::is_none")]
    pub property_tax_certificate: Option<bool>,
    #[serde(rename = "fotos", default, skip_serializing_if = "Option::is_none")]
    pub photo_count: Option<i64>,
    #[serde(rename = "descripcion", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "puntos_destacados", default, skip_serializing_if = "Option::is_none")]
    pub highlights: Option<String>,
}

impl PropertyFields {
    pub fn get(&self, field: FieldName) -> Option<FieldValue> {
        match field {
            FieldName::PropertyType => self.property_type.map(FieldValue::PropertyType),
            FieldName::BuiltArea => self.built_area_m2.map(FieldValue::Decimal),
            FieldName::Bedrooms => self.bedrooms.map(FieldValue::Integer),
            FieldName::Bathrooms => self.bathrooms.map(FieldValue::Integer),
            FieldName::ParkingSpots => self.parking_spots.map(FieldValue::Integer),
            FieldName::Floor => self.floor.map(FieldValue::Integer),
            FieldName::Stratum => self.stratum.map(FieldValue::Integer),
            FieldName::BuildYear => self.build_year.map(FieldValue::Integer),
            FieldName::Condition => self.condition.map(FieldValue::Condition),
            FieldName::SalePrice => self.sale_price.map(FieldValue::Decimal),
            FieldName::PriceNegotiable => self.price_negotiable.map(FieldValue::Flag),
            FieldName::SaleReason => self.sale_reason.clone().map(FieldValue::Text),
            FieldName::SaleTimeframe => self.sale_timeframe.map(FieldValue::Timeframe),
            FieldName::AcceptsFinancing => self.accepts_financing.map(FieldValue::Flag),
            FieldName::PendingDebts => self.pending_debts.map(FieldValue::Flag),
            FieldName::ExistenceCertificate => self.existence_certificate.map(FieldValue::Flag),
            FieldName::Deed => self.deed.map(FieldValue::Flag),
            FieldName::HoaClearance => self.hoa_clearance.map(FieldValue::Flag),
            FieldName::UtilityBill => self.utility_bill.map(FieldValue::Flag),
            FieldName::PropertyTaxCertificate => {
                self.property_tax_certificate.map(FieldValue::Flag)
            }
            FieldName::PhotoCount => self.photo_count.map(FieldValue::Integer),
            FieldName::Description => self.description.clone().map(FieldValue::Text),
            FieldName::Highlights => self.highlights.clone().map(FieldValue::Text),
        }
    }

    /// Stores a validated value. The value variant must match the field's kind.
    pub fn set(&mut self, field: FieldName, value: FieldValue) -> Result<(), DomainError> {
        match (field, value) {
            (FieldName::PropertyType, FieldValue::PropertyType(v)) => self.property_type = Some(v),
            (FieldName::BuiltArea, FieldValue::Decimal(v)) => self.built_area_m2 = Some(v),
            (FieldName::Bedrooms, FieldValue::Integer(v)) => self.bedrooms = Some(v),
            (FieldName::Bathrooms, FieldValue::Integer(v)) => self.bathrooms = Some(v),
            (FieldName::ParkingSpots, FieldValue::Integer(v)) => self.parking_spots = Some(v),
            (FieldName::Floor, FieldValue::Integer(v)) => self.floor = Some(v),
            (FieldName::Stratum, FieldValue::Integer(v)) => self.stratum = Some(v),
            (FieldName::BuildYear, FieldValue::Integer(v)) => self.build_year = Some(v),
            (FieldName::Condition, FieldValue::Condition(v)) => self.condition = Some(v),
            (FieldName::SalePrice, FieldValue::Decimal(v)) => self.sale_price = Some(v),
            (FieldName::PriceNegotiable, FieldValue::Flag(v)) => self.price_negotiable = Some(v),
            (FieldName::SaleReason, FieldValue::Text(v)) => self.sale_reason = Some(v),
            (FieldName::SaleTimeframe, FieldValue::Timeframe(v)) => self.sale_timeframe = Some(v),
            (FieldName::AcceptsFinancing, FieldValue::Flag(v)) => self.accepts_financing = Some(v),
            (FieldName::PendingDebts, FieldValue::Flag(v)) => self.pending_debts = Some(v),
            (FieldName::ExistenceCertificate, FieldValue::Flag(v)) => {
                self.existence_certificate = Some(v)
            }
            (FieldName::Deed, FieldValue::Flag(v)) => self.deed = Some(v),
            (FieldName::HoaClearance, FieldValue::Flag(v)) => self.hoa_clearance = Some(v),
            (FieldName::UtilityBill, FieldValue::Flag(v)) => self.utility_bill = Some(v),
            (FieldName::PropertyTaxCertificate, FieldValue::Flag(v)) => {
                self.property_tax_certificate = Some(v)
            }
            (FieldName::PhotoCount, FieldValue::Integer(v)) => self.photo_count = Some(v),
            (FieldName::Description, FieldValue::Text(v)) => self.description = Some(v),
            (FieldName::Highlights, FieldValue::Text(v)) => self.highlights = Some(v),
            (field, value) => {
                return Err(DomainError::InvariantViolation(format!(
                    "value {value:?} does not match kind {:?} of field `{field}`",
                    field.kind()
                )))
            }
        }
        Ok(())
    }

    pub fn clear(&mut self, field: FieldName) {
        match field {
            FieldName::PropertyType => self.property_type = None,
            FieldName::BuiltArea => self.built_area_m2 = None,
            FieldName::Bedrooms => self.bedrooms = None,
            FieldName::Bathrooms => self.bathrooms = None,
            FieldName::ParkingSpots => self.parking_spots = None,
            FieldName::Floor => self.floor = None,
            FieldName::Stratum => self.stratum = None,
            FieldName::BuildYear => self.build_year = None,
            FieldName::Condition => self.condition = None,
            FieldName::SalePrice => self.sale_price = None,
            FieldName::PriceNegotiable => self.price_negotiable = None,
            FieldName::SaleReason => self.sale_reason = None,
            FieldName::SaleTimeframe => self.sale_timeframe = None,
            FieldName::AcceptsFinancing => self.accepts_financing = None,
            FieldName::PendingDebts => self.pending_debts = None,
            FieldName::ExistenceCertificate => self.existence_certificate = None,
            FieldName::Deed => self.deed = None,
            FieldName::HoaClearance => self.hoa_clearance = None,
            FieldName::UtilityBill => self.utility_bill = None,
            FieldName::PropertyTaxCertificate => self.property_tax_certificate = None,
            FieldName::PhotoCount => self.photo_count = None,
            FieldName::Description => self.description = None,
            FieldName::Highlights => self.highlights = None,
        }
    }

    pub fn optional_documents_present(&self) -> usize {
        FieldName::OPTIONAL_DOCUMENTS
            .into_iter()
            .filter(|field| matches!(self.get(*field), Some(FieldValue::Flag(true))))
            .count()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyStatus {
    Collecting,
    Complete,
}

impl PropertyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collecting => "collecting",
            Self::Complete => "complete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "collecting" => Some(Self::Collecting),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

/// Seller details captured by the registration form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerDetails {
    pub name: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub id: PropertyId,
    pub contact_id: ContactId,
    pub owner: OwnerDetails,
    pub fields: PropertyFields,
    pub status: PropertyStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PropertyRecord {
    pub fn new(id: PropertyId, contact_id: ContactId, owner: OwnerDetails, now: DateTime<Utc>) -> Self {
        Self {
            id,
            contact_id,
            owner,
            fields: PropertyFields::default(),
            status: PropertyStatus::Collecting,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{
        ContactId, FieldCategory, FieldName, FieldValue, PropertyFields, PropertyType,
    };

    #[test]
    fn every_field_round_trips_through_its_wire_name() {
        for field in FieldName::ALL {
            assert_eq!(FieldName::parse(field.as_str()), Some(field));
            let json = serde_json::to_value(field).expect("serialize field name");
            assert_eq!(json, serde_json::Value::String(field.as_str().to_string()));
        }
    }

    #[test]
    fn categories_partition_the_field_set() {
        let total: usize = FieldCategory::ALL.iter().map(|category| category.fields().count()).sum();
        assert_eq!(total, FieldName::ALL.len());
        assert_eq!(FieldCategory::Documentation.fields().count(), 6);
    }

    #[test]
    fn set_rejects_value_of_wrong_kind() {
        let mut fields = PropertyFields::default();
        let error = fields
            .set(FieldName::Stratum, FieldValue::Flag(true))
            .expect_err("flag is not a valid stratum");
        assert!(error.to_string().contains("estrato"));
        assert_eq!(fields.stratum, None);
    }

    #[test]
    fn get_returns_what_set_stored() {
        let mut fields = PropertyFields::default();
        fields
            .set(FieldName::BuiltArea, FieldValue::Decimal(Decimal::new(1205, 1)))
            .expect("area accepted");
        fields
            .set(FieldName::PropertyType, FieldValue::PropertyType(PropertyType::House))
            .expect("type accepted");

        assert_eq!(fields.get(FieldName::BuiltArea), Some(FieldValue::Decimal(Decimal::new(1205, 1))));
        assert_eq!(fields.get(FieldName::PropertyType), Some(FieldValue::PropertyType(PropertyType::House)));
        fields.clear(FieldName::BuiltArea);
        assert_eq!(fields.get(FieldName::BuiltArea), None);
    }

    #[test]
    fn floor_only_applies_to_apartments_and_offices() {
        assert!(FieldName::Floor.is_applicable(Some(PropertyType::Apartment)));
        assert!(FieldName::Floor.is_applicable(Some(PropertyType::Office)));
        assert!(!FieldName::Floor.is_applicable(Some(PropertyType::House)));
        assert!(!FieldName::Floor.is_applicable(None));
        assert!(FieldName::Stratum.is_applicable(None));
    }

    #[test]
    fn contact_ids_are_normalized_to_digits() {
        assert_eq!(ContactId::normalized("+57 300-123 4567"), ContactId("573001234567".to_string()));
    }

    #[test]
    fn whole_decimals_serialize_as_integers() {
        let value = FieldValue::Decimal(Decimal::new(800, 1));
        assert_eq!(value.to_json(), serde_json::json!(80));
        assert_eq!(value.display(), "80");
    }
}

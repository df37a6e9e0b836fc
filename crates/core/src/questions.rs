use crate::completion::CompletionTracker;
use crate::domain::property::{FieldName, PropertyFields};

/// Order in which outstanding fields are solicited: physical, commercial,
/// description, documentation.
pub const QUESTION_ORDER: [FieldName; 23] = [
    FieldName::PropertyType,
    FieldName::BuiltArea,
    FieldName::Bedrooms,
    FieldName::Bathrooms,
    FieldName::Floor,
    FieldName::Stratum,
    FieldName::ParkingSpots,
    FieldName::BuildYear,
    FieldName::Condition,
    FieldName::SalePrice,
    FieldName::PriceNegotiable,
    FieldName::SaleReason,
    FieldName::SaleTimeframe,
    FieldName::AcceptsFinancing,
    FieldName::PendingDebts,
    FieldName::Description,
    FieldName::Highlights,
    FieldName::ExistenceCertificate,
    FieldName::Deed,
    FieldName::HoaClearance,
    FieldName::UtilityBill,
    FieldName::PropertyTaxCertificate,
    FieldName::PhotoCount,
];

pub fn question_for(field: FieldName) -> &'static str {
    match field {
        FieldName::PropertyType => {
            "¿Qué tipo de inmueble es? (casa, apartamento, oficina, local, lote, bodega o finca)"
        }
        FieldName::BuiltArea => "¿Cuál es el área construida en metros cuadrados?",
        FieldName::Bedrooms => "¿Cuántas habitaciones tiene?",
        FieldName::Bathrooms => "¿Cuántos baños tiene?",
        FieldName::ParkingSpots => "¿Cuántos parqueaderos tiene?",
        FieldName::Floor => "¿En qué piso está ubicado?",
        FieldName::Stratum => "¿En qué estrato está el inmueble (1 a 6)?",
        FieldName::BuildYear => "¿En qué año fue construido?",
        FieldName::Condition => {
            "¿En qué estado se encuentra? (nuevo, excelente, bueno, regular o para remodelar)"
        }
        FieldName::SalePrice => "¿Cuál es el precio de venta en pesos?",
        FieldName::PriceNegotiable => "¿El precio es negociable?",
        FieldName::SaleReason => "¿Cuál es el motivo de la venta?",
        FieldName::SaleTimeframe => {
            "¿En cuánto tiempo necesitas vender? (inmediato, 1 a 3 meses, 3 a 6 meses o más de 6 meses)"
        }
        FieldName::AcceptsFinancing => "¿Aceptas compradores con crédito hipotecario?",
        FieldName::PendingDebts => "¿El inmueble tiene deudas pendientes (hipoteca, impuestos, administración)?",
        FieldName::ExistenceCertificate => {
            "¿Tienes el certificado de existencia y representación legal (libertad y tradición)?"
        }
        FieldName::Deed => "¿Tienes la escritura del inmueble?",
        FieldName::HoaClearance => "¿Tienes el paz y salvo de administración?",
        FieldName::UtilityBill => "¿Tienes un recibo de servicios públicos reciente?",
        FieldName::PropertyTaxCertificate => "¿Tienes el certificado de impuesto predial?",
        FieldName::PhotoCount => "¿Cuántas fotos del inmueble puedes compartir? Necesitamos al menos 5.",
        FieldName::Description => {
            "Cuéntanos cómo es el inmueble en una descripción de al menos 50 palabras."
        }
        FieldName::Highlights => "¿Qué es lo que más destacarías del inmueble?",
    }
}

/// Short label used when confirming what was recorded.
pub fn label_for(field: FieldName) -> &'static str {
    match field {
        FieldName::PropertyType => "tipo de inmueble",
        FieldName::BuiltArea => "área construida",
        FieldName::Bedrooms => "habitaciones",
        FieldName::Bathrooms => "baños",
        FieldName::ParkingSpots => "parqueaderos",
        FieldName::Floor => "piso",
        FieldName::Stratum => "estrato",
        FieldName::BuildYear => "año de construcción",
        FieldName::Condition => "estado",
        FieldName::SalePrice => "precio de venta",
        FieldName::PriceNegotiable => "precio negociable",
        FieldName::SaleReason => "motivo de venta",
        FieldName::SaleTimeframe => "tiempo de venta",
        FieldName::AcceptsFinancing => "acepta crédito",
        FieldName::PendingDebts => "deudas pendientes",
        FieldName::ExistenceCertificate => "certificado de existencia",
        FieldName::Deed => "escritura",
        FieldName::HoaClearance => "paz y salvo de administración",
        FieldName::UtilityBill => "recibo de servicios",
        FieldName::PropertyTaxCertificate => "certificado predial",
        FieldName::PhotoCount => "fotos",
        FieldName::Description => "descripción",
        FieldName::Highlights => "puntos destacados",
    }
}

/// First outstanding field in question order, skipping inapplicable ones.
pub fn next_field(tracker: &CompletionTracker, fields: &PropertyFields) -> Option<FieldName> {
    QUESTION_ORDER.into_iter().find(|field| {
        field.is_applicable(fields.property_type) && !tracker.has_valid_value(fields, *field)
    })
}

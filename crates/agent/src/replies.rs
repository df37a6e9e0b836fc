//! Outbound message texts.

use listing_core::domain::property::{FieldName, FieldValue};
use listing_core::questions::{label_for, question_for};
use listing_core::validation::ValidationFailure;

pub const NO_ACTIVE_SESSION: &str = "Hola 👋 No encontramos un registro activo para este número. \
Para publicar tu inmueble, completa primero el formulario en nuestra página web.";

pub const APOLOGY: &str = "Lo sentimos, tuvimos un problema técnico procesando tu mensaje. \
Por favor intenta de nuevo en unos minutos.";

pub const TIMEOUT_NOTICE: &str = "Cerramos tu registro por inactividad. Si quieres continuar, \
vuelve a diligenciar el formulario y retomamos desde donde quedaste.";

pub const TEXT_ONLY: &str = "Por ahora solo puedo leer mensajes de texto. Las fotos y documentos \
los recibirá el asesor que te contacte; por favor responde la pregunta escribiendo.";

pub const CLARIFICATION: &str = "No logré entender tu respuesta.";

pub const ALMOST_DONE: &str = "¡Ya casi terminamos! Tenemos todos los datos, pero aún falta \
cumplir algunos requisitos para publicar tu inmueble:";

pub fn welcome(owner_name: &str, first_question: Option<FieldName>) -> String {
    let greeting = format!(
        "¡Hola {owner_name}! Gracias por registrar tu inmueble. Te haré unas preguntas cortas \
         para completar la información."
    );
    match first_question {
        Some(field) => format!("{greeting}\n\n{}", question_for(field)),
        None => greeting,
    }
}

pub fn completed(owner_name: &str) -> String {
    format!(
        "¡Listo, {owner_name}! Registramos toda la información de tu inmueble. Un asesor se \
         pondrá en contacto contigo muy pronto."
    )
}

/// "Anoté: área construida: 120, habitaciones: 3."
pub fn confirmation(accepted: &[(FieldName, FieldValue)]) -> Option<String> {
    if accepted.is_empty() {
        return None;
    }
    let items = accepted
        .iter()
        .map(|(field, value)| format!("{}: {}", label_for(*field), value.display()))
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!("Anoté: {items}."))
}

pub fn rejections(rejected: &[ValidationFailure]) -> Option<String> {
    if rejected.is_empty() {
        return None;
    }
    let items = rejected
        .iter()
        .map(|failure| format!("{} ({})", label_for(failure.field), failure.reason))
        .collect::<Vec<_>>()
        .join("; ");
    Some(format!("No pude registrar: {items}."))
}

pub fn clarification(rejected: &[ValidationFailure], pending: Option<FieldName>) -> String {
    let mut parts = vec![rejections(rejected).unwrap_or_else(|| CLARIFICATION.to_string())];
    if let Some(field) = pending {
        parts.push(question_for(field).to_string());
    }
    parts.join("\n\n")
}

pub fn almost_done(details: &[String], pending: Option<FieldName>) -> String {
    let mut message = ALMOST_DONE.to_string();
    for detail in details {
        message.push_str("\n• ");
        message.push_str(detail);
    }
    if let Some(field) = pending {
        message.push_str("\n\n");
        message.push_str(question_for(field));
    }
    message
}

/// Joins non-empty message parts with blank lines.
pub fn compose(parts: impl IntoIterator<Item = Option<String>>) -> String {
    parts.into_iter().flatten().filter(|part| !part.is_empty()).collect::<Vec<_>>().join("\n\n")
}

#[cfg(test)]
mod tests {
    use listing_core::domain::property::{FieldName, FieldValue};
    use listing_core::validation::ValidationFailure;

    use super::{clarification, compose, confirmation, CLARIFICATION};

    #[test]
    fn confirmation_lists_labels_and_display_values() {
        let text = confirmation(&[
            (FieldName::Bedrooms, FieldValue::Integer(3)),
            (FieldName::Deed, FieldValue::Flag(true)),
        ])
        .expect("non-empty");
        assert_eq!(text, "Anoté: habitaciones: 3, escritura: sí.");
        assert!(confirmation(&[]).is_none());
    }

    #[test]
    fn clarification_repeats_pending_question() {
        let text = clarification(
            &[ValidationFailure::new(FieldName::BuiltArea, "necesito un valor numérico")],
            Some(FieldName::BuiltArea),
        );
        assert!(text.contains("necesito un valor numérico"));
        assert!(text.ends_with("¿Cuál es el área construida en metros cuadrados?"));

        assert!(clarification(&[], None).starts_with(CLARIFICATION));
    }

    #[test]
    fn compose_skips_missing_parts() {
        assert_eq!(compose([Some("a".to_string()), None, Some("b".to_string())]), "a\n\nb");
    }
}

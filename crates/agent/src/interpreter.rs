//! Turns a free-text reply into candidate field values.
//!
//! Interpreters never validate: every value they return goes through the
//! field validator, whatever field the conversation is currently asking for.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use listing_core::domain::property::{
    Condition, FieldKind, FieldName, PropertyType, SaleTimeframe,
};
use listing_core::questions::label_for;
use listing_core::validation::SubjectContext;

use crate::llm::{FunctionSpec, LlmClient};

const EXTRACTION_FUNCTION: &str = "registrar_datos_inmueble";

#[derive(Clone, Debug, PartialEq)]
pub enum Interpretation {
    Extracted(BTreeMap<FieldName, Value>),
    Failed(String),
}

impl Interpretation {
    /// Empty extractions are failures.
    pub fn from_map(map: BTreeMap<FieldName, Value>) -> Self {
        if map.is_empty() {
            Self::Failed("no usable data in reply".to_string())
        } else {
            Self::Extracted(map)
        }
    }
}

#[async_trait]
pub trait ResponseInterpreter: Send + Sync {
    async fn interpret(
        &self,
        utterance: &str,
        current_field: Option<FieldName>,
        context: &SubjectContext,
    ) -> Interpretation;
}

/// Function-calling interpreter over an LLM with a fixed extraction schema.
pub struct LlmInterpreter {
    client: Arc<dyn LlmClient>,
    function: FunctionSpec,
}

impl LlmInterpreter {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client, function: extraction_function() }
    }
}

#[async_trait]
impl ResponseInterpreter for LlmInterpreter {
    async fn interpret(
        &self,
        utterance: &str,
        current_field: Option<FieldName>,
        context: &SubjectContext,
    ) -> Interpretation {
        let prompt = extraction_prompt(utterance, current_field, context);
        match self.client.call_function(SYSTEM_PROMPT, &prompt, &self.function).await {
            Ok(arguments) => Interpretation::from_map(fields_from_arguments(&arguments)),
            Err(error) => {
                tracing::warn!(
                    event_name = "interpreter.llm_failed",
                    current_field = current_field.map(|field| field.as_str()).unwrap_or("none"),
                    error = %error,
                    "LLM extraction failed"
                );
                Interpretation::Failed(error.to_string())
            }
        }
    }
}

const SYSTEM_PROMPT: &str = "Eres un asistente que extrae datos de inmuebles en venta a partir de \
mensajes de WhatsApp en español de Colombia. Registra solo los datos que el vendedor menciona de \
forma explícita. No inventes valores. Si un dato no aparece, omítelo.";

fn extraction_prompt(
    utterance: &str,
    current_field: Option<FieldName>,
    context: &SubjectContext,
) -> String {
    let pending = current_field
        .map(|field| format!("{} ({})", label_for(field), field.as_str()))
        .unwrap_or_else(|| "ninguno".to_string());
    let property_type = context.property_type.map(|kind| kind.as_str()).unwrap_or("desconocido");
    format!(
        "Dato que se le preguntó al vendedor: {pending}\n\
         Tipo de inmueble conocido: {property_type}\n\
         Mensaje del vendedor: {utterance}"
    )
}

/// Keeps known, non-null keys only.
pub fn fields_from_arguments(arguments: &Value) -> BTreeMap<FieldName, Value> {
    let Some(object) = arguments.as_object() else {
        return BTreeMap::new();
    };
    object
        .iter()
        .filter(|(_, value)| !value.is_null())
        .filter_map(|(key, value)| FieldName::parse(key).map(|field| (field, value.clone())))
        .collect()
}

fn extraction_function() -> FunctionSpec {
    let mut properties = Map::new();
    for field in FieldName::ALL {
        properties.insert(field.as_str().to_string(), field_schema(field));
    }
    FunctionSpec {
        name: EXTRACTION_FUNCTION,
        description: "Registra los datos del inmueble mencionados en el mensaje.",
        parameters: json!({
            "type": "object",
            "properties": Value::Object(properties),
            "additionalProperties": false,
        }),
    }
}

fn field_schema(field: FieldName) -> Value {
    let description = label_for(field);
    match field.kind() {
        FieldKind::Decimal => json!({ "type": "number", "description": description }),
        FieldKind::Integer => json!({ "type": "integer", "description": description }),
        FieldKind::Flag => json!({ "type": "boolean", "description": description }),
        FieldKind::Text => json!({ "type": "string", "description": description }),
        FieldKind::Choice => {
            let values: Vec<&str> = match field {
                FieldName::PropertyType => PropertyType::ALL.iter().map(PropertyType::as_str).collect(),
                FieldName::Condition => Condition::ALL.iter().map(Condition::as_str).collect(),
                _ => SaleTimeframe::ALL.iter().map(SaleTimeframe::as_str).collect(),
            };
            json!({ "type": "string", "enum": values, "description": description })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use listing_core::domain::property::{FieldName, PropertyType};
    use listing_core::validation::SubjectContext;
    use serde_json::{json, Value};

    use super::{fields_from_arguments, Interpretation, LlmInterpreter, ResponseInterpreter};
    use crate::llm::{FunctionSpec, LlmClient};

    struct ScriptedLlm {
        arguments: Option<Value>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
            Err(anyhow!("not scripted"))
        }

        async fn call_function(
            &self,
            _system: &str,
            prompt: &str,
            function: &FunctionSpec,
        ) -> Result<Value> {
            assert!(prompt.contains("Tipo de inmueble conocido: casa"));
            assert!(function.parameters["properties"]["piso"].is_object());
            self.arguments.clone().ok_or_else(|| anyhow!("timeout"))
        }
    }

    fn house() -> SubjectContext {
        SubjectContext { property_type: Some(PropertyType::House) }
    }

    #[test]
    fn unknown_keys_and_nulls_are_dropped() {
        let fields = fields_from_arguments(&json!({
            "habitaciones": 3,
            "banos": null,
            "jacuzzi": true,
            "tipo_propiedad": "casa"
        }));
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get(&FieldName::Bedrooms), Some(&json!(3)));
        assert!(!fields.contains_key(&FieldName::Bathrooms));
    }

    #[tokio::test]
    async fn llm_arguments_become_extracted_fields() {
        let interpreter = LlmInterpreter::new(Arc::new(ScriptedLlm {
            arguments: Some(json!({ "area_construida": 120, "estrato": null })),
        }));
        let result = interpreter.interpret("120 metros", Some(FieldName::BuiltArea), &house()).await;

        match result {
            Interpretation::Extracted(fields) => {
                assert_eq!(fields.keys().copied().collect::<Vec<_>>(), vec![FieldName::BuiltArea]);
            }
            other => panic!("expected extraction, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_or_failed_calls_are_failures() {
        let empty = LlmInterpreter::new(Arc::new(ScriptedLlm { arguments: Some(json!({})) }));
        assert!(matches!(
            empty.interpret("hola", None, &house()).await,
            Interpretation::Failed(_)
        ));

        let failing = LlmInterpreter::new(Arc::new(ScriptedLlm { arguments: None }));
        assert!(matches!(
            failing.interpret("hola", None, &house()).await,
            Interpretation::Failed(_)
        ));
    }
}

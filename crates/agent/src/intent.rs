use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use listing_core::validation::fold_accents;

use crate::llm::LlmClient;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    Question,
    Answer,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::Answer => "answer",
        }
    }
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, utterance: &str) -> Result<Intent>;
}

// `que`, `como` and `cuando` also open answers ("como 120 metros", "que sí"),
// so they count only with a question mark.
const INTERROGATIVES: &[&str] = &[
    "cuanto", "cuanta", "cuantos", "cuantas", "donde", "cual", "cuales", "quien", "quienes",
    "por que", "puedo", "pueden", "debo", "necesito saber",
];

/// Question marks or a leading Spanish interrogative.
#[derive(Clone, Debug, Default)]
pub struct KeywordClassifier;

#[async_trait]
impl IntentClassifier for KeywordClassifier {
    async fn classify(&self, utterance: &str) -> Result<Intent> {
        Ok(classify_by_keywords(utterance))
    }
}

pub fn classify_by_keywords(utterance: &str) -> Intent {
    let trimmed = utterance.trim();
    if trimmed.contains('?') || trimmed.contains('¿') {
        return Intent::Question;
    }
    let lowered = fold_accents(&trimmed.to_lowercase());
    let starts_with_interrogative = INTERROGATIVES.iter().any(|word| {
        lowered
            .strip_prefix(word)
            .map(|rest| rest.is_empty() || rest.starts_with(|ch: char| !ch.is_alphanumeric()))
            .unwrap_or(false)
    });
    if starts_with_interrogative {
        Intent::Question
    } else {
        Intent::Answer
    }
}

const CLASSIFIER_PROMPT: &str = "Clasifica el mensaje de un vendedor de inmuebles que está \
respondiendo un cuestionario por WhatsApp. Responde solo con la palabra QUESTION si el vendedor \
hace una pregunta sobre el proceso, o ANSWER si está respondiendo o dando datos.";

pub struct LlmClassifier {
    client: Arc<dyn LlmClient>,
}

impl LlmClassifier {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IntentClassifier for LlmClassifier {
    async fn classify(&self, utterance: &str) -> Result<Intent> {
        let label = self.client.complete(CLASSIFIER_PROMPT, utterance).await?;
        match label.trim().to_ascii_uppercase().as_str() {
            "QUESTION" => Ok(Intent::Question),
            "ANSWER" => Ok(Intent::Answer),
            other => bail!("unexpected classifier label `{other}`"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::Value;

    use super::{classify_by_keywords, Intent, IntentClassifier, LlmClassifier};
    use crate::llm::{FunctionSpec, LlmClient};

    #[test]
    fn question_marks_and_interrogatives_are_questions() {
        assert_eq!(classify_by_keywords("¿cuánto cuesta el proceso?"), Intent::Question);
        assert_eq!(classify_by_keywords("Cuánto se demora la venta"), Intent::Question);
        assert_eq!(classify_by_keywords("por que necesitan la escritura"), Intent::Question);
    }

    #[test]
    fn data_replies_are_answers() {
        assert_eq!(classify_by_keywords("Es una casa de 120 metros"), Intent::Answer);
        assert_eq!(classify_by_keywords("sí"), Intent::Answer);
        assert_eq!(classify_by_keywords("quinto piso"), Intent::Answer);
    }

    #[test]
    fn ambiguous_openers_need_a_question_mark() {
        assert_eq!(classify_by_keywords("como 120 metros"), Intent::Answer);
        assert_eq!(classify_by_keywords("que sí tiene parqueadero"), Intent::Answer);
        assert_eq!(classify_by_keywords("cuando ustedes quieran"), Intent::Answer);
        assert_eq!(classify_by_keywords("¿como funciona el proceso?"), Intent::Question);
        assert_eq!(classify_by_keywords("que documentos necesitan?"), Intent::Question);
    }

    struct FixedLabel(&'static str);

    #[async_trait]
    impl LlmClient for FixedLabel {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }

        async fn call_function(&self, _: &str, _: &str, _: &FunctionSpec) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn llm_labels_are_parsed_and_garbage_is_an_error() {
        let question = LlmClassifier::new(Arc::new(FixedLabel(" question\n")));
        assert_eq!(question.classify("hola").await.expect("label"), Intent::Question);

        let garbage = LlmClassifier::new(Arc::new(FixedLabel("no estoy seguro")));
        assert!(garbage.classify("hola").await.is_err());
    }
}

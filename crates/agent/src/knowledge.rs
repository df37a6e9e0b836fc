//! Answers seller questions asked mid-conversation from a FAQ knowledge base.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use listing_core::domain::property::FieldName;
use listing_core::validation::normalize_token;

pub const FALLBACK_ANSWER: &str = "No tengo esa información a la mano, pero un asesor te \
contactará para resolver tu pregunta.";

/// What the answerer may use besides the question itself.
#[derive(Clone, Debug, Default)]
pub struct AnswerContext {
    pub current_field: Option<FieldName>,
    pub owner_name: Option<String>,
}

/// Never fails: implementations return [`FALLBACK_ANSWER`] when they have nothing.
#[async_trait]
pub trait AnswerCollaborator: Send + Sync {
    async fn answer(&self, question: &str, context: &AnswerContext) -> String;
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct FaqEntry {
    pub keywords: Vec<String>,
    pub answer: String,
}

#[derive(Clone, Debug)]
pub struct KnowledgeBase {
    entries: Vec<FaqEntry>,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::new(default_entries())
    }
}

impl KnowledgeBase {
    pub fn new(entries: Vec<FaqEntry>) -> Self {
        Self { entries }
    }

    /// Loads a JSON array of `{ "keywords": [...], "answer": "..." }` entries.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read knowledge base `{}`", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid knowledge base `{}`", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let entries: Vec<FaqEntry> = serde_json::from_str(raw)?;
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry with the most keyword hits; ties go to the earlier entry.
    pub fn lookup(&self, question: &str) -> Option<&FaqEntry> {
        let haystack = format!("_{}_", normalize_token(question));
        let mut best: Option<(usize, &FaqEntry)> = None;
        for entry in &self.entries {
            let hits = entry
                .keywords
                .iter()
                .filter(|keyword| haystack.contains(&format!("_{}_", normalize_token(keyword))))
                .count();
            if hits > 0 && best.map(|(score, _)| hits > score).unwrap_or(true) {
                best = Some((hits, entry));
            }
        }
        best.map(|(_, entry)| entry)
    }
}

#[async_trait]
impl AnswerCollaborator for KnowledgeBase {
    async fn answer(&self, question: &str, _context: &AnswerContext) -> String {
        match self.lookup(question) {
            Some(entry) => entry.answer.clone(),
            None => {
                tracing::debug!(event_name = "knowledge.no_match", "no FAQ entry matched question");
                FALLBACK_ANSWER.to_string()
            }
        }
    }
}

fn entry(keywords: &[&str], answer: &str) -> FaqEntry {
    FaqEntry {
        keywords: keywords.iter().map(|keyword| keyword.to_string()).collect(),
        answer: answer.to_string(),
    }
}

fn default_entries() -> Vec<FaqEntry> {
    vec![
        entry(
            &["cuesta", "costo", "cobran", "comision", "precio del servicio", "tarifa"],
            "Registrar tu inmueble no tiene costo. La comisión se acuerda con el asesor solo \
             cuando se concreta la venta.",
        ),
        entry(
            &["demora", "tiempo", "cuanto tarda", "cuando"],
            "El registro toma unos minutos. Cuando completemos los datos, un asesor revisará \
             tu inmueble en un plazo de 2 días hábiles.",
        ),
        entry(
            &["documentos", "escritura", "certificado", "paz y salvo", "predial"],
            "Pedimos certificado de libertad y tradición, escritura, paz y salvo de \
             administración, recibo de servicios y certificado predial para verificar que el \
             inmueble se pueda vender sin contratiempos.",
        ),
        entry(
            &["fotos", "fotografias", "imagenes"],
            "Necesitamos al menos 5 fotos claras del inmueble: fachada, sala, cocina, \
             habitaciones y baños. Puedes enviarlas por este chat.",
        ),
        entry(
            &["datos", "privacidad", "informacion personal", "seguro"],
            "Tus datos solo se usan para gestionar la venta de tu inmueble y no se comparten \
             con terceros sin tu autorización.",
        ),
    ]
}

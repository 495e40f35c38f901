//! Document processing: simplify, classify, count, save, then refresh the
//! tenant glossary.
//!
//! Saving is the authoritative step. Everything after it is best-effort and
//! reported as a warning.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::db::{LegalFlag, NewDocumentParams, SimplificationLevel, TenantDatabase};
use crate::error::PipelineError;
use crate::legal::classify::{WordCounter, is_likely_legal, word_count};
use crate::legal::glossary::{GlossaryMerger, MergeReport};

/// A text simplification model.
#[async_trait]
pub trait Simplifier: Send + Sync {
    async fn simplify(&self, text: &str, level: SimplificationLevel) -> Result<String, String>;
}

/// Returns its input unchanged. Registered as `passthrough`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughSimplifier;

#[async_trait]
impl Simplifier for PassthroughSimplifier {
    async fn simplify(&self, text: &str, _level: SimplificationLevel) -> Result<String, String> {
        Ok(text.to_string())
    }
}

pub const PASSTHROUGH_MODEL: &str = "passthrough";

/// Loaded simplification models by name.
///
/// Built once per process and passed to whoever needs a model.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, Arc<dyn Simplifier>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding only the passthrough model.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(PASSTHROUGH_MODEL, Arc::new(PassthroughSimplifier));
        registry
    }

    /// Replaces any model already registered under `name`.
    pub fn register(&mut self, name: impl Into<String>, model: Arc<dyn Simplifier>) {
        self.models.insert(name.into(), model);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Simplifier>> {
        self.models.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub user_id: i64,
    pub original_file_name: Option<String>,
    pub title: String,
    pub original_text: String,
    pub level: SimplificationLevel,
}

#[derive(Debug, Clone)]
pub struct ProcessingReport {
    pub document_id: i64,
    pub simplified_text: String,
    pub is_legal: LegalFlag,
    pub original_word_count: i64,
    pub simplified_word_count: i64,
    pub glossary: MergeReport,
    /// Non-fatal problems. The document is saved regardless.
    pub warnings: Vec<String>,
}

pub struct DocumentPipeline {
    models: Arc<ModelRegistry>,
    counter: Arc<dyn WordCounter>,
}

impl DocumentPipeline {
    pub fn new(models: Arc<ModelRegistry>, counter: Arc<dyn WordCounter>) -> Self {
        Self { models, counter }
    }

    /// Simplify `input` with the named model, then save and merge.
    pub async fn process(
        &self,
        store: &dyn TenantDatabase,
        model: &str,
        input: DocumentInput,
    ) -> Result<ProcessingReport, PipelineError> {
        if input.original_text.trim().is_empty() {
            return Err(PipelineError::EmptyInput);
        }
        let simplifier = self
            .models
            .get(model)
            .ok_or_else(|| PipelineError::UnknownModel(model.to_string()))?;
        let simplified = simplifier
            .simplify(&input.original_text, input.level)
            .await
            .map_err(PipelineError::Simplification)?;
        self.record(store, input, simplified).await
    }

    /// Save a document whose simplified text already exists, then merge.
    pub async fn record(
        &self,
        store: &dyn TenantDatabase,
        input: DocumentInput,
        simplified_text: String,
    ) -> Result<ProcessingReport, PipelineError> {
        if input.original_text.trim().is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let is_legal = is_likely_legal(&input.original_text);
        let original_word_count = word_count(self.counter.as_ref(), &input.original_text);
        let simplified_word_count = word_count(self.counter.as_ref(), &simplified_text);

        let document_id = store
            .save_document(&NewDocumentParams {
                user_id: input.user_id,
                original_file_name: input.original_file_name,
                title: input.title,
                original_text: input.original_text.clone(),
                simplified_text: simplified_text.clone(),
                simplification_level: input.level,
                is_legal,
                original_word_count,
                simplified_word_count,
            })
            .await
            .map_err(PipelineError::Save)?;

        let glossary =
            GlossaryMerger::update_from_text(store, &input.original_text, &simplified_text).await;
        let warnings = glossary
            .failed
            .iter()
            .map(|(term, err)| format!("glossary term '{term}' was not updated: {err}"))
            .collect::<Vec<_>>();
        if !warnings.is_empty() {
            tracing::warn!(
                document_id,
                failures = warnings.len(),
                "Glossary merge incomplete; document saved"
            );
        }

        Ok(ProcessingReport {
            document_id,
            simplified_text,
            is_legal,
            original_word_count,
            simplified_word_count,
            glossary,
            warnings,
        })
    }
}

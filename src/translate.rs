//! Best-effort automated translation of localized content fields.
//!
//! Runs after content mutations elsewhere in the system and must never block
//! or fail them: per-field translation failures are logged and skipped, and
//! an in-flight guard keyed by `(content_type, id)` drops concurrent triggers
//! for the same entity instead of double-translating it.

use crate::config::TranslateConfig;
use crate::errors::AppError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, AppError>;
}

/// Chat-completion based translator.
pub struct OpenAiTranslator {
    client: reqwest::Client,
    config: TranslateConfig,
}

impl OpenAiTranslator {
    pub fn new(config: TranslateConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Translator for OpenAiTranslator {
    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, AppError> {
        if self.config.api_key.is_empty() {
            return Err(AppError::ServerMisconfigured(
                "translation api key is missing".to_string(),
            ));
        }

        let system = "You are a precise translator for a yacht marketplace in Montenegro. \
                      Return ONLY the translated text. No quotes, no markdown, no explanations. \
                      Keep brand names, marina/city names, and proper nouns as-is. \
                      Preserve numbers, units, currency, and punctuation.";

        let payload = serde_json::json!({
            "model": self.config.model,
            "temperature": 0.1,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": format!("Translate from {from} to {to}:\n\n{text}") },
            ],
        });

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("translation request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "translation request failed: HTTP {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("translation response malformed: {e}")))?;

        Ok(body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

/// Fields to upsert per target locale after a translation pass.
pub type TranslationPatch = HashMap<String, Map<String, Value>>;

pub struct AutoTranslator {
    translator: Arc<dyn Translator>,
    in_flight: Mutex<HashSet<String>>,
}

impl AutoTranslator {
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        Self {
            translator,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Fills missing localized string fields for one entity. Returns the
    /// per-locale patches the caller should persist; empty when another
    /// trigger for the same entity is already running or nothing changed.
    pub async fn ensure_translations(
        &self,
        content_type: &str,
        id: i64,
        source_locale: &str,
        target_locales: &[String],
        fields: &[String],
        source: &Map<String, Value>,
        existing: &TranslationPatch,
    ) -> TranslationPatch {
        let guard_key = format!("{content_type}:{id}");
        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if !in_flight.insert(guard_key.clone()) {
                tracing::debug!(content_type, id, "translation already in flight, skipping");
                return TranslationPatch::new();
            }
        }

        let patches = self
            .translate_entity(content_type, id, source_locale, target_locales, fields, source, existing)
            .await;

        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&guard_key);

        patches
    }

    async fn translate_entity(
        &self,
        content_type: &str,
        id: i64,
        source_locale: &str,
        target_locales: &[String],
        fields: &[String],
        source: &Map<String, Value>,
        existing: &TranslationPatch,
    ) -> TranslationPatch {
        let mut patches = TranslationPatch::new();

        for to_locale in target_locales {
            let current = existing.get(to_locale);
            let mut patch = Map::new();

            for field in fields {
                let Some(src_val) = source.get(field).and_then(Value::as_str) else {
                    continue;
                };
                if src_val.trim().is_empty() {
                    continue;
                }

                // Hand-edited translations win; only fill blanks.
                let already = current
                    .and_then(|m| m.get(field))
                    .and_then(Value::as_str)
                    .is_some_and(|v| !v.trim().is_empty());
                if already {
                    continue;
                }

                match self.translator.translate(src_val, source_locale, to_locale).await {
                    Ok(out) => {
                        patch.insert(field.clone(), Value::String(out));
                    }
                    Err(e) => {
                        tracing::error!(
                            content_type,
                            id,
                            field,
                            from = source_locale,
                            to = %to_locale,
                            error = %e,
                            "field translation failed"
                        );
                    }
                }
            }

            if !patch.is_empty() {
                patches.insert(to_locale.clone(), patch);
            }
        }

        patches
    }
}

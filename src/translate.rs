//! Translation of already-produced records.
//!
//! Only documented free-text fields are rewritten; names, dates, links and
//! unknown keys pass through. Blank fields are never sent to the provider.

use crate::agent::{RetryPolicy, USER_AGENT};
use crate::config::{Config, ConfigError};
use crate::storage::{load, save, CacheStore};
use crate::subject::sha256_hex;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Free-text fields translated inside each list-valued section.
const SECTIONS: &[(&str, &[&str])] = &[
    ("careers", &["title", "description"]),
    ("dynasty", &["relationship", "position"]),
    ("cases", &["description"]),
    ("legislations", &["title", "description"]),
    ("projects", &["title", "description"]),
];

#[derive(Error, Debug)]
pub enum TranslationError {
    #[error("translation request failed: {0}")]
    Upstream(String),
    #[error("translation provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("translation provider fault: {0}")]
    Provider(String),
    #[error("invalid target language: {0:?}")]
    InvalidLanguage(String),
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),
}

impl TranslationError {
    pub fn is_transient(&self) -> bool {
        match self {
            TranslationError::Upstream(_) => true,
            TranslationError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Translates a single string.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target: &str) -> Result<String, TranslationError>;
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    target: &'a str,
    format: &'static str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Deserialize)]
struct TranslateData {
    #[serde(default)]
    translations: Vec<Translation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: String,
}

/// Google Cloud Translation (v2) client.
pub struct GoogleTranslator {
    http: Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl GoogleTranslator {
    pub fn new(config: &Config) -> Result<Self, TranslationError> {
        let api_key = config.translate_key()?.to_string();
        let timeout = Duration::from_secs(config.translation.timeout_secs);
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| TranslationError::Upstream(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: config.translation.endpoint.clone(),
            api_key,
            timeout,
            retry: RetryPolicy {
                max_retries: config.translation.max_retries,
                backoff: Duration::from_millis(config.translation.retry_backoff_ms),
            },
        })
    }

    async fn send_once(&self, text: &str, target: &str) -> Result<String, TranslationError> {
        tokio::time::timeout(self.timeout, self.post(text, target))
            .await
            .map_err(|_| TranslationError::Upstream(format!("timed out after {:?}", self.timeout)))?
    }

    async fn post(&self, text: &str, target: &str) -> Result<String, TranslationError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("X-goog-api-key", &self.api_key)
            .json(&TranslateRequest {
                q: text,
                target,
                format: "text",
            })
            .send()
            .await
            .map_err(|e| TranslationError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslationError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let reply: TranslateResponse = response
            .json()
            .await
            .map_err(|e| TranslationError::Provider(format!("malformed reply: {}", e)))?;

        reply
            .data
            .translations
            .into_iter()
            .next()
            .map(|t| t.translated_text)
            .ok_or_else(|| TranslationError::Provider("reply has no translations".to_string()))
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str, target: &str) -> Result<String, TranslationError> {
        self.retry
            .run("translation", TranslationError::is_transient, || {
                self.send_once(text, target)
            })
            .await
    }
}

/// Rewrites the translatable fields of a record, optionally cache-backed.
pub struct TranslationPass {
    translator: Arc<dyn Translator>,
    cache: Option<Arc<dyn CacheStore>>,
}

impl TranslationPass {
    pub fn new(translator: Arc<dyn Translator>, cache: Option<Arc<dyn CacheStore>>) -> Self {
        Self { translator, cache }
    }

    /// Translate a summary-shaped record, or an array of them.
    ///
    /// The input is not modified; a translated copy is returned.
    pub async fn translate(&self, record: &Value, target: &str) -> Result<Value, TranslationError> {
        let target = validate_language(target)?;
        let key = translation_key("record", record, target);
        if let Some(hit) = self.cached(&key).await {
            return Ok(hit);
        }

        let mut out = record.clone();
        match &mut out {
            Value::Object(map) => self.translate_record(map, target).await?,
            Value::Array(items) => {
                for item in items {
                    if let Value::Object(map) = item {
                        self.translate_record(map, target).await?;
                    }
                }
            }
            _ => {}
        }

        self.remember(&key, &out).await;
        Ok(out)
    }

    /// Translate the `summary` text of a comparison write-up.
    pub async fn translate_comparison(&self, record: &Value, target: &str) -> Result<Value, TranslationError> {
        let target = validate_language(target)?;
        let key = translation_key("comparison", record, target);
        if let Some(hit) = self.cached(&key).await {
            return Ok(hit);
        }

        let mut out = record.clone();
        if let Some(Value::String(summary)) = out.get_mut("summary") {
            let translated = self.field(summary, target).await?;
            *summary = translated;
        }

        self.remember(&key, &out).await;
        Ok(out)
    }

    async fn translate_record(&self, map: &mut Map<String, Value>, target: &str) -> Result<(), TranslationError> {
        if let Some(Value::String(description)) = map.get_mut("description") {
            let translated = self.field(description, target).await?;
            *description = translated;
        }

        for (section, fields) in SECTIONS {
            let Some(Value::Array(entries)) = map.get_mut(*section) else {
                continue;
            };
            for entry in entries.iter_mut() {
                let Value::Object(entry) = entry else {
                    continue;
                };
                for name in fields.iter() {
                    if let Some(Value::String(text)) = entry.get_mut(*name) {
                        let translated = self.field(text, target).await?;
                        *text = translated;
                    }
                }
            }
        }
        Ok(())
    }

    async fn field(&self, text: &str, target: &str) -> Result<String, TranslationError> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }
        self.translator.translate(text, target).await
    }

    async fn cached(&self, key: &str) -> Option<Value> {
        let store = self.cache.as_ref()?;
        match load::<Value>(store.as_ref(), key).await {
            Ok(Some(stored)) => {
                tracing::info!(key, "translation cache hit");
                Some(stored.value)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "translation cache read failed");
                None
            }
        }
    }

    async fn remember(&self, key: &str, value: &Value) {
        if let Some(store) = &self.cache {
            if let Err(e) = save(store.as_ref(), key, value).await {
                tracing::warn!(key, error = %e, "translation cache write failed");
            }
        }
    }
}

fn validate_language(target: &str) -> Result<&str, TranslationError> {
    let target = target.trim();
    let valid = !target.is_empty()
        && target.len() <= 16
        && target.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(target)
    } else {
        Err(TranslationError::InvalidLanguage(target.to_string()))
    }
}

/// Content hash of the record and target language.
pub fn translation_key(kind: &str, record: &Value, target: &str) -> String {
    format!("translation:{}", sha256_hex(&format!("{}\n{}\n{}", kind, record, target)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Prefixes text with the language and records what it was asked.
    #[derive(Default)]
    struct TaggingTranslator {
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Translator for TaggingTranslator {
        async fn translate(&self, text: &str, target: &str) -> Result<String, TranslationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(text.to_string());
            Ok(format!("[{}] {}", target, text))
        }
    }

    struct FailingTranslator;

    #[async_trait]
    impl Translator for FailingTranslator {
        async fn translate(&self, _text: &str, _target: &str) -> Result<String, TranslationError> {
            Err(TranslationError::Provider("quota exceeded".into()))
        }
    }

    fn make_pass(cache: Option<Arc<dyn CacheStore>>) -> (TranslationPass, Arc<TaggingTranslator>) {
        let translator = Arc::new(TaggingTranslator::default());
        (TranslationPass::new(translator.clone(), cache), translator)
    }

    #[tokio::test]
    async fn blank_fields_make_no_calls() {
        let (pass, translator) = make_pass(None);
        let record = json!({
            "commonName": "Juan",
            "description": "",
            "cases": [{"title": "Graft", "description": "", "dateFiled": "", "link": ""}],
            "careers": [{"title": "", "description": "  "}],
            "dynasty": "",
            "projects": ""
        });

        let out = pass.translate(&record, "fil").await.unwrap();
        assert_eq!(out, record);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cases_translate_description_only() {
        let (pass, translator) = make_pass(None);
        let record = json!({
            "cases": [
                {"title": "Plunder", "description": "Filed by the Ombudsman", "dateFiled": "2014", "link": "https://a"},
                {"title": "Graft", "description": "Dismissed", "dateFiled": "2016", "link": "https://b"},
                {"title": "Libel", "description": "Pending", "dateFiled": "2020", "link": "https://c"}
            ]
        });

        let out = pass.translate(&record, "fil").await.unwrap();
        assert_eq!(translator.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *translator.seen.lock().unwrap(),
            vec!["Filed by the Ombudsman", "Dismissed", "Pending"]
        );

        let cases = out["cases"].as_array().unwrap();
        for (before, after) in record["cases"].as_array().unwrap().iter().zip(cases) {
            assert_eq!(before["title"], after["title"]);
            assert_eq!(before["dateFiled"], after["dateFiled"]);
            assert_eq!(before["link"], after["link"]);
        }
        assert_eq!(cases[0]["description"], "[fil] Filed by the Ombudsman");
    }

    #[tokio::test]
    async fn documented_fields_only() {
        let (pass, _) = make_pass(None);
        let record = json!({
            "commonName": "Juan",
            "legalName": "Juan Santos",
            "description": "A senator",
            "careers": [{"title": "Senator", "description": "Two terms", "startDate": "2013"}],
            "dynasty": [{"name": "Maria", "relationship": "sister", "position": "Mayor", "link": ""}],
            "legislations": [{"title": "Free Tuition Act", "description": "Waives fees", "status": "Law"}],
            "projects": [{"title": "Bridge", "description": "River crossing", "date": "2018"}],
            "education": [{"school": "UP Diliman", "degree": "Law"}],
            "extra": {"description": "not mine"}
        });

        let out = pass.translate(&record, "ceb").await.unwrap();
        assert_eq!(out["commonName"], "Juan");
        assert_eq!(out["legalName"], "Juan Santos");
        assert_eq!(out["description"], "[ceb] A senator");
        assert_eq!(out["careers"][0]["title"], "[ceb] Senator");
        assert_eq!(out["careers"][0]["startDate"], "2013");
        assert_eq!(out["dynasty"][0]["name"], "Maria");
        assert_eq!(out["dynasty"][0]["relationship"], "[ceb] sister");
        assert_eq!(out["dynasty"][0]["position"], "[ceb] Mayor");
        assert_eq!(out["legislations"][0]["status"], "Law");
        assert_eq!(out["projects"][0]["description"], "[ceb] River crossing");
        assert_eq!(out["education"], record["education"]);
        assert_eq!(out["extra"], record["extra"]);
    }

    #[tokio::test]
    async fn comparison_arrays_are_walked() {
        let (pass, translator) = make_pass(None);
        let record = json!([{"description": "A"}, {"description": "B"}]);
        let out = pass.translate(&record, "fil").await.unwrap();
        assert_eq!(out, json!([{"description": "[fil] A"}, {"description": "[fil] B"}]));
        assert_eq!(translator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn comparison_summary_text() {
        let (pass, _) = make_pass(None);
        let out = pass
            .translate_comparison(&json!({"summary": "Both served as mayors."}), "fil")
            .await
            .unwrap();
        assert_eq!(out, json!({"summary": "[fil] Both served as mayors."}));
    }

    #[tokio::test]
    async fn identical_requests_hit_the_cache() {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
        let (pass, translator) = make_pass(Some(store));
        let record = json!({"description": "A senator"});

        let first = pass.translate(&record, "fil").await.unwrap();
        let second = pass.translate(&record, "fil").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 1);

        pass.translate(&record, "ceb").await.unwrap();
        assert_eq!(translator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn provider_faults_propagate() {
        let pass = TranslationPass::new(Arc::new(FailingTranslator), None);
        let err = pass
            .translate(&json!({"description": "A senator"}), "fil")
            .await
            .unwrap_err();
        assert!(matches!(err, TranslationError::Provider(_)));
    }

    #[tokio::test]
    async fn bad_language_is_rejected_before_any_call() {
        let (pass, translator) = make_pass(None);
        let err = pass.translate(&json!({"description": "x"}), " ").await.unwrap_err();
        assert!(matches!(err, TranslationError::InvalidLanguage(_)));
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn key_depends_on_language_and_content() {
        let a = translation_key("record", &json!({"d": "x"}), "fil");
        assert_eq!(a, translation_key("record", &json!({"d": "x"}), "fil"));
        assert_ne!(a, translation_key("record", &json!({"d": "x"}), "ceb"));
        assert_ne!(a, translation_key("record", &json!({"d": "y"}), "fil"));
        assert!(a.starts_with("translation:"));
    }
}

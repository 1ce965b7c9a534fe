use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::TranslationError;
use crate::settings::{MyMemoryConfig, OllamaConfig, TranslationService, TranslationSettings};

pub const MYMEMORY_ENDPOINT: &str = "https://api.mymemory.translated.net/get";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

type Result<T> = std::result::Result<T, TranslationError>;

// ── Wire types ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MyMemoryResponse {
    #[serde(default)]
    response_data: Option<MyMemoryData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MyMemoryData {
    #[serde(default)]
    translated_text: Option<String>,
}

// ── Translator ─────────────────────────────────────────────────────────────

/// Sends prompt text to the configured translation service.
///
/// Only the most recent call wins: when a newer `translate` starts while an
/// older one is still waiting on the network, the older one resolves to
/// [`TranslationError::Superseded`] instead of its result.
pub struct Translator {
    client: Client,
    mymemory_endpoint: String,
    latest: AtomicU64,
}

impl Translator {
    pub fn new() -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            mymemory_endpoint: MYMEMORY_ENDPOINT.to_string(),
            latest: AtomicU64::new(0),
        }
    }

    /// Point the public-API variant somewhere else (proxies, tests).
    pub fn with_mymemory_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.mymemory_endpoint = endpoint.into();
        self
    }

    pub async fn translate(&self, text: &str, settings: &TranslationSettings) -> Result<String> {
        if text.trim().is_empty() {
            return Err(TranslationError::EmptyInput);
        }

        let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let result = match settings.service {
            TranslationService::Ollama => self.ollama(text, &settings.ollama).await,
            TranslationService::MyMemory => self.mymemory(text, &settings.mymemory).await,
        };

        if self.latest.load(Ordering::SeqCst) != ticket {
            debug!(ticket, "Discarding translation superseded by a newer request");
            return Err(TranslationError::Superseded);
        }

        match &result {
            Ok(translated) => info!(service = ?settings.service, chars = translated.chars().count(), "Translation succeeded"),
            Err(e) => warn!(service = ?settings.service, error = %e, "Translation failed"),
        }
        result
    }

    async fn ollama(&self, text: &str, config: &OllamaConfig) -> Result<String> {
        if config.url.trim().is_empty() {
            return Err(TranslationError::NotConfigured("ollama url"));
        }
        if config.model.trim().is_empty() {
            return Err(TranslationError::NotConfigured("ollama model"));
        }

        let endpoint = format!("{}/api/generate", config.url.trim_end_matches('/'));
        let body = GenerateRequest {
            model: &config.model,
            prompt: config.prompt.replacen("{text}", text, 1),
            stream: false,
            options: GenerateOptions { temperature: 0.1 },
        };

        let response = self
            .client
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    TranslationError::ConnectionRefused {
                        url: config.url.clone(),
                    }
                } else {
                    TranslationError::Request(e)
                }
            })?;

        if response.status() != StatusCode::OK {
            return Err(TranslationError::Status(response.status().as_u16()));
        }

        let payload: GenerateResponse = response.json().await?;
        non_empty(payload.response)
    }

    async fn mymemory(&self, text: &str, config: &MyMemoryConfig) -> Result<String> {
        let mut url = Url::parse(&self.mymemory_endpoint)?;
        url.query_pairs_mut()
            .append_pair("q", text)
            .append_pair("langpair", &format!("{}|{}", config.source_lang, config.target_lang));

        let response = self.client.get(url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(TranslationError::Status(response.status().as_u16()));
        }

        let payload: MyMemoryResponse = response.json().await?;
        non_empty(payload.response_data.and_then(|data| data.translated_text))
    }
}

fn non_empty(text: Option<String>) -> Result<String> {
    match text.as_deref().map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => Ok(trimmed.to_string()),
        _ => Err(TranslationError::EmptyResult),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ollama_settings(url: &str) -> TranslationSettings {
        TranslationSettings {
            service: TranslationService::Ollama,
            ollama: OllamaConfig {
                url: format!("{}/", url),
                model: "qwen3:8b".to_string(),
                prompt: "Translate: {text} / {text}".to_string(),
                ..OllamaConfig::default()
            },
            ..TranslationSettings::default()
        }
    }

    fn mymemory_settings() -> TranslationSettings {
        TranslationSettings {
            service: TranslationService::MyMemory,
            ..TranslationSettings::default()
        }
    }

    #[tokio::test]
    async fn test_ollama_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "model": "qwen3:8b",
                "prompt": "Translate: 玻璃 / {text}",
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "  glass \n" })))
            .expect(1)
            .mount(&server)
            .await;

        let translator = Translator::new().unwrap();
        let result = translator.translate("玻璃", &ollama_settings(&server.uri())).await;
        assert_eq!(result.unwrap(), "glass");
    }

    #[tokio::test]
    async fn test_ollama_status_and_empty_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "   " })))
            .mount(&server)
            .await;

        let translator = Translator::new().unwrap();
        let settings = ollama_settings(&server.uri());
        assert!(matches!(
            translator.translate("x", &settings).await,
            Err(TranslationError::Status(500))
        ));
        assert!(matches!(
            translator.translate("x", &settings).await,
            Err(TranslationError::EmptyResult)
        ));
    }

    #[tokio::test]
    async fn test_ollama_connection_refused() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{}", port);
        let mut settings = ollama_settings(&url);
        settings.ollama.url = url.clone();

        let translator = Translator::new().unwrap();
        match translator.translate("x", &settings).await {
            Err(TranslationError::ConnectionRefused { url: reported }) => assert_eq!(reported, url),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_input_and_config_checks() {
        let translator = Translator::new().unwrap();
        assert!(matches!(
            translator.translate("  ", &TranslationSettings::default()).await,
            Err(TranslationError::EmptyInput)
        ));

        let mut settings = TranslationSettings::default();
        settings.ollama.model.clear();
        assert!(matches!(
            translator.translate("x", &settings).await,
            Err(TranslationError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_mymemory_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/get"))
            .and(query_param("q", "你好, 世界"))
            .and(query_param("langpair", "zh-CN|en-GB"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "responseData": { "translatedText": "Hello, world" } })),
            )
            .mount(&server)
            .await;

        let translator = Translator::new()
            .unwrap()
            .with_mymemory_endpoint(format!("{}/get", server.uri()));
        let result = translator.translate("你好, 世界", &mymemory_settings()).await;
        assert_eq!(result.unwrap(), "Hello, world");
    }

    #[tokio::test]
    async fn test_latest_request_wins() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "responseData": { "translatedText": "old" } }))
                    .set_delay(Duration::from_millis(400)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("q", "fast"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "responseData": { "translatedText": "new" } })),
            )
            .mount(&server)
            .await;

        let translator = Translator::new()
            .unwrap()
            .with_mymemory_endpoint(format!("{}/get", server.uri()));
        let settings = mymemory_settings();

        let (first, second) = tokio::join!(translator.translate("slow", &settings), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            translator.translate("fast", &settings).await
        });

        assert!(matches!(first, Err(TranslationError::Superseded)));
        assert_eq!(second.unwrap(), "new");
    }
}

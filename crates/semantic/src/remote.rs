//! Remote embedding tier.
//!
//! [`HttpEmbedder`] speaks the OpenAI-compatible `/v1/models` and
//! `/v1/embeddings` endpoints that most local inference servers expose. The
//! first call resolves a `(base_url, model)` pair by probing each candidate
//! base URL and picking the first preferred model it lists; the pair is reused
//! until a call fails.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreakerManager;
use crate::config::RemoteConfig;
use crate::SemanticError;

/// Vectors returned by a remote call and the model that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEmbeddings {
    pub model: String,
    pub vectors: Vec<Vec<f32>>,
}

/// A remote embedding service.
#[async_trait]
pub trait RemoteEmbedder: Send + Sync {
    /// Stable identity used in the provider's model id.
    fn name(&self) -> &str;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<RemoteEmbeddings, SemanticError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub base_url: String,
    pub model: String,
}

/// OpenAI-compatible HTTP embedder with endpoint discovery.
#[derive(Debug)]
pub struct HttpEmbedder {
    cfg: RemoteConfig,
    client: reqwest::Client,
    breakers: CircuitBreakerManager,
    resolved: Mutex<Option<ResolvedEndpoint>>,
}

impl HttpEmbedder {
    pub fn new(cfg: RemoteConfig) -> Result<Self, SemanticError> {
        cfg.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(cfg.probe_timeout)
            .pool_max_idle_per_host(8)
            .build()?;
        Ok(Self {
            breakers: CircuitBreakerManager::new(cfg.circuit_breaker),
            cfg,
            client,
            resolved: Mutex::new(None),
        })
    }

    pub fn breakers(&self) -> &CircuitBreakerManager {
        &self.breakers
    }

    /// The remembered endpoint, if discovery already succeeded.
    pub fn resolved(&self) -> Option<ResolvedEndpoint> {
        self.lock_resolved().clone()
    }

    fn lock_resolved(&self) -> MutexGuard<'_, Option<ResolvedEndpoint>> {
        self.resolved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn resolve(&self) -> Result<ResolvedEndpoint, SemanticError> {
        if let Some(endpoint) = self.resolved() {
            return Ok(endpoint);
        }

        for base in &self.cfg.base_urls {
            let base = base.trim_end_matches('/');
            let breaker = self.breakers.get_or_create(base);
            if !breaker.allow_request() {
                debug!(base_url = base, "remote_endpoint_circuit_open");
                continue;
            }

            match self.discover(base).await {
                Ok(model) => {
                    breaker.record_success();
                    let endpoint = ResolvedEndpoint {
                        base_url: base.to_string(),
                        model,
                    };
                    debug!(base_url = base, model = %endpoint.model, "remote_endpoint_resolved");
                    *self.lock_resolved() = Some(endpoint.clone());
                    return Ok(endpoint);
                }
                Err(err) => {
                    breaker.record_failure();
                    debug!(base_url = base, error = %err, "remote_endpoint_rejected");
                }
            }
        }
        Err(SemanticError::NoRemoteEndpoint)
    }

    async fn discover(&self, base: &str) -> Result<String, SemanticError> {
        // Any HTTP answer counts as alive; only transport errors fail the probe.
        self.client
            .get(base)
            .timeout(self.cfg.probe_timeout)
            .send()
            .await?;

        let mut request = self
            .client
            .get(format!("{base}/v1/models"))
            .timeout(self.cfg.list_timeout);
        if let Some(header) = self.cfg.auth_header.as_deref() {
            request = request.header("Authorization", header);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SemanticError::Remote(format!(
                "model listing returned {status}"
            )));
        }
        let listing: Value = response.json().await?;
        let available = parse_model_ids(&listing);
        pick_preferred_model(&available, &self.cfg.preferred_models).ok_or_else(|| {
            SemanticError::Remote(format!(
                "none of {:?} offered (found {:?})",
                self.cfg.preferred_models, available
            ))
        })
    }

    async fn post_embeddings(
        &self,
        endpoint: &ResolvedEndpoint,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, SemanticError> {
        let mut request = self
            .client
            .post(format!("{}/v1/embeddings", endpoint.base_url))
            .timeout(self.cfg.embed_timeout)
            .json(&json!({ "model": endpoint.model, "input": texts }));
        if let Some(header) = self.cfg.auth_header.as_deref() {
            request = request.header("Authorization", header);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SemanticError::Remote(format!("HTTP error {status}: {body}")));
        }
        let vectors = parse_embeddings_from_value(response.json::<Value>().await?)?;
        if vectors.len() != texts.len() {
            return Err(SemanticError::Remote(format!(
                "endpoint returned {} embeddings for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl RemoteEmbedder for HttpEmbedder {
    fn name(&self) -> &str {
        self.cfg
            .preferred_models
            .first()
            .map(String::as_str)
            .unwrap_or("remote")
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<RemoteEmbeddings, SemanticError> {
        if texts.is_empty() {
            return Ok(RemoteEmbeddings {
                model: self.name().to_string(),
                vectors: Vec::new(),
            });
        }

        let endpoint = self.resolve().await?;
        let breaker = self.breakers.get_or_create(&endpoint.base_url);
        match self.post_embeddings(&endpoint, texts).await {
            Ok(vectors) => {
                breaker.record_success();
                Ok(RemoteEmbeddings {
                    model: endpoint.model,
                    vectors,
                })
            }
            Err(err) => {
                breaker.record_failure();
                *self.lock_resolved() = None;
                warn!(base_url = %endpoint.base_url, error = %err, "remote_endpoint_forgotten");
                Err(err)
            }
        }
    }
}

/// Model ids from an OpenAI (`data[].id`) or Ollama (`models[].name`) listing.
pub(crate) fn parse_model_ids(listing: &Value) -> Vec<String> {
    let entries = listing
        .get("data")
        .or_else(|| listing.get("models"))
        .and_then(Value::as_array);
    entries
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(obj) => ["id", "name", "model"]
                        .iter()
                        .find_map(|key| obj.get(*key).and_then(Value::as_str))
                        .map(str::to_string),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// First preferred name (in preference order) offered by the endpoint.
///
/// Tagged (`name:latest`) and namespaced (`org/name`) ids match their bare name.
pub(crate) fn pick_preferred_model(available: &[String], preferred: &[String]) -> Option<String> {
    preferred.iter().find_map(|want| {
        let want = want.to_ascii_lowercase();
        available
            .iter()
            .find(|id| {
                let id = id.to_ascii_lowercase();
                let bare = id.rsplit('/').next().unwrap_or(&id);
                let bare = bare.split(':').next().unwrap_or(bare);
                bare == want
            })
            .cloned()
    })
}

pub(crate) fn parse_embeddings_from_value(value: Value) -> Result<Vec<Vec<f32>>, SemanticError> {
    match value {
        Value::Object(mut map) => {
            if let Some(embeddings) = map.remove("embeddings") {
                return parse_embedding_collection(embeddings);
            }
            if let Some(embedding) = map.remove("embedding") {
                return parse_embedding_vector(embedding).map(|v| vec![v]);
            }
            if let Some(Value::Array(items)) = map.remove("data") {
                let mut indexed = Vec::with_capacity(items.len());
                for (position, item) in items.into_iter().enumerate() {
                    let Value::Object(mut obj) = item else {
                        return Err(SemanticError::Remote(
                            "unexpected entry inside `data` array".into(),
                        ));
                    };
                    let index = obj
                        .get("index")
                        .and_then(Value::as_u64)
                        .map(|i| i as usize)
                        .unwrap_or(position);
                    let embedding = obj.remove("embedding").ok_or_else(|| {
                        SemanticError::Remote("missing `embedding` field in data item".into())
                    })?;
                    indexed.push((index, parse_embedding_vector(embedding)?));
                }
                indexed.sort_by_key(|(index, _)| *index);
                return Ok(indexed.into_iter().map(|(_, v)| v).collect());
            }
            Err(SemanticError::Remote("unsupported response shape".into()))
        }
        other => parse_embedding_collection(other),
    }
}

fn parse_embedding_collection(value: Value) -> Result<Vec<Vec<f32>>, SemanticError> {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                Ok(Vec::new())
            } else if items.iter().all(|item| matches!(item, Value::Array(_))) {
                items.into_iter().map(parse_embedding_vector).collect()
            } else {
                parse_embedding_vector(Value::Array(items)).map(|v| vec![v])
            }
        }
        other => parse_embedding_vector(other).map(|v| vec![v]),
    }
}

fn parse_embedding_vector(value: Value) -> Result<Vec<f32>, SemanticError> {
    match value {
        Value::Array(values) => values
            .into_iter()
            .map(|entry| match entry {
                Value::Number(num) => num
                    .as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| SemanticError::Remote("non-finite embedding value".into())),
                other => Err(SemanticError::Remote(format!(
                    "embedding entries must be numbers, got {other}"
                ))),
            })
            .collect(),
        other => Err(SemanticError::Remote(format!(
            "embedding vector must be an array, got {other}"
        ))),
    }
}

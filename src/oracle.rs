// Copyright 2026 Folio Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Text-completion oracle; [`LazyOracle`] connects once and serializes generation.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::config::OracleBackend;
use crate::config::OracleConfig;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("language model backend is disabled")]
    Disabled,

    #[error("language model server is not available at {url}")]
    Unavailable { url: String },

    #[error("model \"{model}\" is not available on the language model server")]
    ModelMissing { model: String },

    #[error("language model request failed: {message}")]
    RequestFailed { message: String },

    #[error("language model request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("failed to parse language model response: {message}")]
    ParseError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repetition_penalty: f32,
    pub num_candidates: usize,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 128,
            temperature: 0.7,
            top_p: 0.9,
            top_k: 50,
            repetition_penalty: 1.2,
            num_candidates: 3,
        }
    }
}

pub trait TextOracle: Send + Sync {
    fn generate(&self, prompt: &str, params: &GenerationParams)
    -> Result<Vec<String>, OracleError>;
}

type Connect = Box<dyn Fn() -> Result<Box<dyn TextOracle>, OracleError> + Send + Sync>;

pub struct LazyOracle {
    connect: Connect,
    slot: Mutex<Option<Arc<dyn TextOracle>>>,
    generation: Mutex<()>,
}

impl LazyOracle {
    pub fn new(
        connect: impl Fn() -> Result<Box<dyn TextOracle>, OracleError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            connect: Box::new(connect),
            slot: Mutex::new(None),
            generation: Mutex::new(()),
        }
    }

    pub fn from_config(config: &OracleConfig) -> Self {
        let config = config.clone();
        Self::new(move || match config.backend {
            OracleBackend::Disabled => Err(OracleError::Disabled),
            OracleBackend::Ollama => {
                let oracle = OllamaOracle::connect(&config)?;
                Ok(Box::new(oracle) as Box<dyn TextOracle>)
            }
        })
    }

    /// Return the shared backend, connecting it if this is the first use.
    ///
    /// Callers racing on the first use block on the slot lock and all observe
    /// the instance created by whichever of them connected.
    pub fn handle(&self) -> Result<Arc<dyn TextOracle>, OracleError> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(oracle) = slot.as_ref() {
            return Ok(Arc::clone(oracle));
        }
        tracing::info!("connecting language model backend");
        let oracle: Arc<dyn TextOracle> = Arc::from((self.connect)()?);
        *slot = Some(Arc::clone(&oracle));
        Ok(oracle)
    }

    pub fn is_connected(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl TextOracle for LazyOracle {
    fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Vec<String>, OracleError> {
        let oracle = self.handle()?;
        let _turn = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        oracle.generate(prompt, params)
    }
}

/// Completion backend speaking the Ollama REST API.
pub struct OllamaOracle {
    base_url: String,
    model: String,
    timeout_secs: u64,
    agent: ureq::Agent,
}

impl OllamaOracle {
    /// Probe the server and make sure the configured model is present.
    pub fn connect(config: &OracleConfig) -> Result<Self, OracleError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let probe = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(5))
            .build();
        let resp = probe
            .get(&format!("{base_url}/api/tags"))
            .call()
            .map_err(|_| OracleError::Unavailable {
                url: base_url.clone(),
            })?;
        let tags: Value = resp.into_json().map_err(|e| OracleError::ParseError {
            message: e.to_string(),
        })?;
        let models: Vec<&str> = tags["models"]
            .as_array()
            .map(|arr| arr.iter().filter_map(|m| m["name"].as_str()).collect())
            .unwrap_or_default();
        if !has_model(&models, &config.model) {
            return Err(OracleError::ModelMissing {
                model: config.model.clone(),
            });
        }
        tracing::debug!(model = %config.model, url = %base_url, "language model ready");

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        Ok(Self {
            base_url,
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            agent,
        })
    }

    fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String, OracleError> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "raw": true,
            "stream": false,
            "options": {
                "num_predict": params.max_new_tokens,
                "temperature": params.temperature,
                "top_p": params.top_p,
                "top_k": params.top_k,
                "repeat_penalty": params.repetition_penalty,
            },
        });
        let resp = self
            .agent
            .post(&format!("{}/api/generate", self.base_url))
            .send_json(body)
            .map_err(|e| request_error(e, self.timeout_secs))?;
        let json: Value = resp.into_json().map_err(|e| OracleError::ParseError {
            message: e.to_string(),
        })?;
        json["response"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| OracleError::ParseError {
                message: "missing 'response' field".into(),
            })
    }
}

impl TextOracle for OllamaOracle {
    fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Vec<String>, OracleError> {
        (0..params.num_candidates.max(1))
            .map(|_| self.complete(prompt, params))
            .collect()
    }
}

fn has_model(available: &[&str], target: &str) -> bool {
    available
        .iter()
        .any(|m| *m == target || m.split(':').next() == Some(target))
}

fn request_error(err: ureq::Error, timeout_secs: u64) -> OracleError {
    match err {
        ureq::Error::Status(code, _) => OracleError::RequestFailed {
            message: format!("server returned status {code}"),
        },
        ureq::Error::Transport(transport) => {
            let timed_out = std::error::Error::source(&transport)
                .and_then(|src| src.downcast_ref::<std::io::Error>())
                .is_some_and(|io| {
                    matches!(
                        io.kind(),
                        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                    )
                });
            if timed_out {
                OracleError::Timeout { timeout_secs }
            } else {
                OracleError::RequestFailed {
                    message: transport.to_string(),
                }
            }
        }
    }
}

//! Configuração do deckgate carregada a partir de `deckgate.toml`.
//!
//! A struct [`DeckgateConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `DECKGATE_ENGINE_URL` e
//! `DECKGATE_RATE_LIMIT_DISABLED` têm precedência sobre o arquivo.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::admission::{PolicyName, RateLimitPolicy};
use crate::state_machine::DEFAULT_TARGET_LANGUAGE;

/// Nome do arquivo procurado no diretório atual.
pub const CONFIG_FILE: &str = "deckgate.toml";

/// Configuração de nível superior carregada de `deckgate.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeckgateConfig {
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

/// Seção `[rate_limit]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateLimitConfig {
    /// Desliga toda a proteção. Apenas para testes ou administração.
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub auth: PolicyOverride,
    #[serde(default)]
    pub translate: PolicyOverride,
    #[serde(default)]
    pub upload: PolicyOverride,
    #[serde(default)]
    pub api: PolicyOverride,
}

/// Ajustes de uma política; campos ausentes usam o limite embutido.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyOverride {
    pub ceiling: Option<u32>,
    pub window_secs: Option<u64>,
    pub max_keys: Option<usize>,
}

impl RateLimitConfig {
    /// Política efetiva para `name`.
    pub fn policy(&self, name: PolicyName) -> RateLimitPolicy {
        let overrides = match name {
            PolicyName::Auth => &self.auth,
            PolicyName::Translate => &self.translate,
            PolicyName::Upload => &self.upload,
            PolicyName::Api => &self.api,
        };
        let base = RateLimitPolicy::default_for(name);
        RateLimitPolicy {
            ceiling: overrides.ceiling.unwrap_or(base.ceiling),
            window: overrides
                .window_secs
                .map(Duration::from_secs)
                .unwrap_or(base.window),
            max_keys: overrides.max_keys.unwrap_or(base.max_keys),
        }
    }

    pub fn policies(&self) -> HashMap<PolicyName, RateLimitPolicy> {
        PolicyName::ALL
            .into_iter()
            .map(|name| (name, self.policy(name)))
            .collect()
    }
}

/// Seção `[engine]`.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// URL base do motor de tradução (ex.: "http://localhost:8000").
    #[serde(default)]
    pub base_url: Option<String>,
    /// Tempo máximo de uma chamada ao motor, em segundos.
    #[serde(default = "default_engine_timeout_secs")]
    pub timeout_secs: u64,
    /// Tempo máximo para estabelecer a conexão, em segundos.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

// 10 minutos: decks grandes demoram.
fn default_engine_timeout_secs() -> u64 {
    600
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_engine_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Seção `[jobs]`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Por quanto tempo um job terminado fica em memória, em segundos.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Máximo de jobs com tópico de progresso em memória.
    #[serde(default = "default_max_tracked_jobs")]
    pub max_tracked_jobs: usize,
    /// Eventos enfileirados por assinante antes de descartá-lo.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
    /// Idioma de destino quando a submissão não informa um.
    #[serde(default = "default_target_language")]
    pub default_target_language: String,
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_max_tracked_jobs() -> usize {
    crate::progress::DEFAULT_MAX_TOPICS
}

fn default_subscriber_buffer() -> usize {
    crate::progress::DEFAULT_SUBSCRIBER_BUFFER
}

fn default_target_language() -> String {
    DEFAULT_TARGET_LANGUAGE.to_string()
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            max_tracked_jobs: default_max_tracked_jobs(),
            subscriber_buffer: default_subscriber_buffer(),
            default_target_language: default_target_language(),
        }
    }
}

impl JobsConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl DeckgateConfig {
    /// Carrega a configuração de `deckgate.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file(Path::new(CONFIG_FILE))?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Lê apenas o arquivo, sem considerar o ambiente.
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = toml::from_str::<DeckgateConfig>(&contents)
            .with_context(|| format!("invalid config in {}", path.display()))?;
        Ok(config)
    }

    /// Variáveis de ambiente têm precedência sobre o arquivo.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("DECKGATE_ENGINE_URL")
            && !url.is_empty()
        {
            self.engine.base_url = Some(url);
        }
        if let Some(flag) = var("DECKGATE_RATE_LIMIT_DISABLED") {
            self.rate_limit.disabled = matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
    }
}

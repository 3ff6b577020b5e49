//! Configuração do cliente carregada a partir de `nutrivision.toml`.
//!
//! A struct [`ClientConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis `NUTRIVISION_API_URL` e `NUTRIVISION_TOKEN` têm precedência
//! sobre o arquivo.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::api::{AnalysisMode, DEFAULT_API_URL};

/// Nome do arquivo procurado no diretório atual.
pub const CONFIG_FILE: &str = "nutrivision.toml";

/// Configuração de nível superior carregada de `nutrivision.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// URL base da API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Token de sessão (Bearer). Vazio significa sem autenticação.
    #[serde(default)]
    pub token: String,

    /// Intervalo fixo entre consultas de status do job, em milissegundos.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Tempo máximo para estabelecer a conexão, em segundos.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Tempo máximo de uma requisição inteira, em segundos.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Tipo de refeição enviado no upload.
    #[serde(default = "default_meal_type")]
    pub meal_type: String,

    /// Modo de análise padrão.
    #[serde(default)]
    pub mode: AnalysisMode,
}

// Valor padrão para a URL da API: o backend de produção.
fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

// Valor padrão para o intervalo de polling: 1500ms.
fn default_poll_interval_ms() -> u64 {
    1500
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_meal_type() -> String {
    "prato".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: String::new(),
            poll_interval_ms: default_poll_interval_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            meal_type: default_meal_type(),
            mode: AnalysisMode::default(),
        }
    }
}

impl ClientConfig {
    /// Carrega a configuração de `nutrivision.toml` no diretório atual.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Carrega a configuração de um caminho específico.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<ClientConfig>(&contents)
                .with_context(|| format!("invalid config in {}", path.display()))?
        } else {
            Self::default()
        };

        // Variáveis de ambiente têm precedência sobre o arquivo.
        if let Ok(url) = std::env::var("NUTRIVISION_API_URL")
            && !url.is_empty()
        {
            config.api_url = url;
        }
        if let Ok(token) = std::env::var("NUTRIVISION_TOKEN")
            && !token.is_empty()
        {
            config.token = token;
        }

        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Token como `Option`, `None` quando vazio.
    pub fn bearer_token(&self) -> Option<String> {
        Some(self.token.clone()).filter(|t| !t.is_empty())
    }
}

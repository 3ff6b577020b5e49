//! Tipos de erro para o cliente da API NutriVision.
//!
//! Define [`ApiError`] com variantes para sessão expirada, respostas não-2xx
//! e falhas de rede. Usa `thiserror` para derivar `Display` e `Error`.

use thiserror::Error;

/// Mensagem exibida quando o backend responde 401.
pub const SESSION_EXPIRED_MESSAGE: &str = "Sessao expirada. Faca login novamente.";

/// Detalhe usado quando o corpo de erro não é JSON.
pub const UNKNOWN_ERROR_DETAIL: &str = "Erro desconhecido";

/// Detalhe usado quando o corpo é JSON mas não traz o campo `detail`.
pub const REQUEST_ERROR_DETAIL: &str = "Erro na requisição";

/// Erros que podem ocorrer ao falar com o backend.
///
/// - [`SessionExpired`](ApiError::SessionExpired) — o servidor retornou HTTP 401
/// - [`Status`](ApiError::Status) — qualquer outra resposta não-2xx
/// - [`Network`](ApiError::Network) — falha de transporte ou corpo inválido
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Sessao expirada. Faca login novamente.")]
    SessionExpired,

    /// Contém o código HTTP e o `detail` extraído do corpo da resposta.
    #[error("API error (status {status}): {detail}")]
    Status { status: u16, detail: String },

    /// Encapsula o erro original do `reqwest` via `#[from]`.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl ApiError {
    /// Texto legível para mostrar ao usuário final.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::SessionExpired => SESSION_EXPIRED_MESSAGE.to_string(),
            ApiError::Status { detail, .. } => detail.clone(),
            ApiError::Network(e) if e.is_timeout() => {
                "O servidor demorou demais para responder.".to_string()
            }
            ApiError::Network(_) => "Falha de conexão com o servidor.".to_string(),
        }
    }

    /// Extrai o `detail` de um corpo de erro no formato do backend.
    pub(crate) fn detail_from_body(body: &str) -> String {
        match serde_json::from_str::<serde_json::Value>(body) {
            Ok(value) => match value.get("detail") {
                Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
                Some(serde_json::Value::Null) | None => REQUEST_ERROR_DETAIL.to_string(),
                Some(other) => other.to_string(),
            },
            Err(_) => UNKNOWN_ERROR_DETAIL.to_string(),
        }
    }
}

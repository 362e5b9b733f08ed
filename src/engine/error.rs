//! Tipos de erro para o motor de tradução externo.
//!
//! Define [`EngineError`] com variantes para indisponibilidade, recusa do
//! motor e respostas inválidas. Erros do `reqwest` são classificados na
//! conversão: falhas de conexão e timeouts viram
//! [`Unavailable`](EngineError::Unavailable).

use thiserror::Error;

use crate::error::FailureKind;

/// Erros que podem ocorrer ao chamar o motor de tradução.
#[derive(Debug, Error)]
pub enum EngineError {
    /// O motor não pôde ser alcançado, não respondeu a tempo ou está
    /// sobrecarregado (HTTP 429/5xx).
    #[error("translation engine unavailable: {0}")]
    Unavailable(String),

    /// O motor respondeu, mas recusou o trabalho (ex.: 400 arquivo inválido).
    #[error("translation engine rejected the job (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// A resposta não pôde ser interpretada.
    #[error("invalid response from translation engine: {0}")]
    InvalidResponse(String),
}

impl EngineError {
    /// Classificação estável usada no job que falhou.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            EngineError::Unavailable(_) => FailureKind::UpstreamUnavailable,
            EngineError::Rejected { .. } | EngineError::InvalidResponse(_) => {
                FailureKind::EngineRejected
            }
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            EngineError::InvalidResponse(err.to_string())
        } else {
            // Conexão recusada, DNS, timeout e corpo interrompido: todos
            // significam que o motor não está acessível.
            EngineError::Unavailable(err.to_string())
        }
    }
}

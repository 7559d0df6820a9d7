//! Tipos de erro para o transporte até o serviço de análise.
//!
//! Define [`TransportError`] com variantes para erros da API, falhas de rede
//! e respostas que não puderam ser decodificadas. Usa `thiserror` para derivar
//! `Display` e `Error` a partir dos atributos `#[error(...)]`.

use thiserror::Error;

/// Erros que podem ocorrer durante poll, cancel ou download de um job.
///
/// - [`ApiError`](TransportError::ApiError): o serviço respondeu com HTTP 4xx/5xx
/// - [`NetworkError`](TransportError::NetworkError): falha na camada de rede
/// - [`Decode`](TransportError::Decode): corpo da resposta em formato inesperado
#[derive(Debug, Error)]
pub enum TransportError {
    /// Erro retornado pelo serviço (ex.: 404 job não encontrado, 500 erro interno).
    #[error("service error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    /// Encapsula o erro original do `reqwest` via `#[from]`.
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// O corpo da resposta não corresponde ao formato esperado.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// URL base do serviço inválida.
    #[error("invalid service URL: {0}")]
    InvalidUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display() {
        let err = TransportError::ApiError {
            status: 404,
            message: "Job not found".into(),
        };
        assert_eq!(err.to_string(), "service error (status 404): Job not found");
    }

    #[test]
    fn decode_display() {
        let err = TransportError::Decode("unknown status `paused`".into());
        assert_eq!(err.to_string(), "unexpected response: unknown status `paused`");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TransportError>();
    }
}

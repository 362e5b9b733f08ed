//! Tipos de dados trocados com o motor de tradução.
//!
//! Todas as structs derivam `Serialize` e `Deserialize` para conversão JSON
//! conforme o formato esperado pelo endpoint `POST /translate` do motor.

use serde::{Deserialize, Serialize};

/// Corpo da requisição para o endpoint `/translate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateRequest {
    /// Referência opaca ao arquivo enviado pelo usuário.
    pub file_id: String,
    /// Idioma de destino (ex.: "ja").
    pub target_language: String,
}

/// Resultado de uma tradução bem-sucedida.
///
/// Os contadores são opcionais no JSON; motores que não os informam
/// produzem zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationOutput {
    /// Localizador do arquivo traduzido (ex.: link de download).
    pub result_url: String,
    /// Número de slides processados.
    #[serde(default)]
    pub slide_count: u32,
    /// Número de textos únicos encontrados.
    #[serde(default)]
    pub text_count: u32,
    /// Número de textos efetivamente traduzidos.
    #[serde(default)]
    pub translated_count: u32,
}

impl TranslationOutput {
    /// Resumo legível usado como mensagem final do job.
    pub fn summary(&self) -> String {
        format!(
            "Translated {}/{} texts across {} slides",
            self.translated_count, self.text_count, self.slide_count
        )
    }
}

/// Uma atualização de progresso informada pelo motor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineProgress {
    /// Percentual concluído (0–100).
    pub percent: u8,
    /// Mensagem de status, ex.: "Translating: 3/12".
    pub message: String,
}

//! Interface de linha de comando do deckgate baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (demo, translate,
//! limits, admit) e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use deckgate::admission::PolicyName;

/// deckgate: controle de admissão e progresso ao vivo para tradução de slides.
#[derive(Debug, Parser)]
#[command(name = "deckgate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho alternativo para o arquivo de configuração.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Política de limite aceita pela CLI, mapeada para [`PolicyName`].
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PolicyArg {
    /// Login e autenticação.
    Auth,
    /// Submissão de traduções.
    Translate,
    /// Upload de arquivos.
    Upload,
    /// Demais endpoints da API.
    Api,
}

impl From<PolicyArg> for PolicyName {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Auth => PolicyName::Auth,
            PolicyArg::Translate => PolicyName::Translate,
            PolicyArg::Upload => PolicyName::Upload,
            PolicyArg::Api => PolicyName::Api,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa um job simulado e acompanha o progresso ao vivo.
    Demo {
        /// Número de textos a "traduzir".
        #[arg(long, default_value_t = 24)]
        texts: u32,

        /// Número de slides informado no resultado.
        #[arg(long, default_value_t = 8)]
        slides: u32,

        /// Intervalo entre textos, em milissegundos.
        #[arg(long, default_value_t = 150)]
        step_ms: u64,

        /// Faz o motor falhar depois de N textos.
        #[arg(long)]
        fail_after: Option<u32>,
    },

    /// Envia um arquivo ao motor de tradução remoto e acompanha o job.
    Translate {
        /// Identificador do arquivo já enviado.
        file_id: String,

        /// Idioma de destino (padrão da configuração se omitido).
        #[arg(long)]
        language: Option<String>,

        /// URL base do motor; sobrepõe configuração e ambiente.
        #[arg(long)]
        engine_url: Option<String>,
    },

    /// Mostra as políticas de limite efetivas.
    Limits,

    /// Simula chamadas de admissão para uma chave e mostra as decisões.
    Admit {
        /// Política a consultar.
        policy: PolicyArg,

        /// Chave do cliente (ex.: endereço IP).
        key: String,

        /// Quantidade de chamadas.
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_translate_subcommand() {
        let cli = Cli::parse_from(["deckgate", "translate", "file-42", "--language", "fr"]);
        match cli.command {
            Command::Translate {
                file_id,
                language,
                engine_url,
            } => {
                assert_eq!(file_id, "file-42");
                assert_eq!(language.as_deref(), Some("fr"));
                assert!(engine_url.is_none());
            }
            _ => panic!("expected Translate command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from(["deckgate", "--config", "alt.toml", "--verbose", "limits"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
        assert!(matches!(cli.command, Command::Limits));
    }

    #[test]
    fn cli_parses_demo_defaults() {
        let cli = Cli::parse_from(["deckgate", "demo", "--fail-after", "3"]);
        match cli.command {
            Command::Demo {
                texts,
                slides,
                step_ms,
                fail_after,
            } => {
                assert_eq!(texts, 24);
                assert_eq!(slides, 8);
                assert_eq!(step_ms, 150);
                assert_eq!(fail_after, Some(3));
            }
            _ => panic!("expected Demo command"),
        }
    }

    #[test]
    fn cli_parses_admit_subcommand() {
        let cli = Cli::parse_from(["deckgate", "admit", "auth", "1.2.3.4", "--count", "11"]);
        match cli.command {
            Command::Admit { policy, key, count } => {
                assert_eq!(PolicyName::from(policy), PolicyName::Auth);
                assert_eq!(key, "1.2.3.4");
                assert_eq!(count, 11);
            }
            _ => panic!("expected Admit command"),
        }
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}

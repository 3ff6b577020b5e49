//! Interface de linha de comando do NutriVision baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (analyze, watch, job,
//! meal) e flags globais (--api-url, --token, --interval-ms, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::api::AnalysisMode;

/// NutriVision — análise nutricional de refeições a partir de fotos.
#[derive(Debug, Parser)]
#[command(name = "nutrivision", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./nutrivision.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// URL base da API (sobrepõe config e ambiente).
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Token de sessão (sobrepõe config e ambiente).
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Intervalo entre consultas de status, em milissegundos.
    #[arg(long, global = true)]
    pub interval_ms: Option<u64>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Modo de análise aceito pela CLI, mapeado para [`AnalysisMode`].
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// Análise rápida (5 créditos).
    Simple,
    /// Análise completa com sugestão melhorada (12 créditos).
    Full,
}

impl From<ModeArg> for AnalysisMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Simple => AnalysisMode::Simple,
            ModeArg::Full => AnalysisMode::Full,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Envia uma foto, inicia a análise e acompanha até o resultado.
    Analyze {
        /// Caminho da foto da refeição.
        image: PathBuf,

        /// Tipo de refeição (ex.: prato, lanche, bebida).
        #[arg(long)]
        meal_type: Option<String>,

        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },

    /// Acompanha um job já existente.
    Watch {
        job_id: u64,

        /// Refeição à qual o job pertence.
        #[arg(long)]
        meal: u64,
    },

    /// Mostra o status atual de um job, sem acompanhar.
    Job { job_id: u64 },

    /// Mostra o resultado da análise de uma refeição.
    Meal { meal_id: u64 },
}

//! Tipos de dados trocados com a API NutriVision.
//!
//! Todas as structs derivam `Serialize` e `Deserialize` conforme o formato
//! JSON dos endpoints `/jobs`, `/meals/{id}/analyze` e `/meals/{id}/answers`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::processing::Question;

/// Identificador opaco de um job, atribuído pelo backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identificador de uma refeição enviada pelo usuário.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MealId(pub u64);

impl fmt::Display for MealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status de um job conforme reportado pelo backend.
///
/// Strings desconhecidas caem em [`JobStatus::Other`] e são tratadas como
/// "em andamento".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Received,
    Running,
    Processing,
    WaitingUser,
    Completed,
    Failed,
    #[serde(other)]
    Other,
}

impl JobStatus {
    /// `completed` e `failed` são terminais: nenhuma transição ocorre depois deles.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Received => "received",
            JobStatus::Running => "running",
            JobStatus::Processing => "processing",
            JobStatus::WaitingUser => "waiting_user",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Other => "other",
        };
        f.write_str(s)
    }
}

/// Resposta de `GET /jobs/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    pub id: JobId,
    pub status: JobStatus,
    /// Rótulo legível da etapa em andamento (ex.: "Identificando alimentos").
    #[serde(default)]
    pub etapa_atual: Option<String>,
    /// Perguntas de esclarecimento; só presentes em `waiting_user`.
    #[serde(default)]
    pub questions: Option<Vec<Question>>,
    #[serde(default)]
    pub resultado_final: Option<serde_json::Value>,
    #[serde(default)]
    pub erro: Option<String>,
}

impl JobResponse {
    /// Interpreta `resultado_final` como [`AnalysisResult`].
    ///
    /// Retorna `None` quando o job ainda não tem resultado.
    pub fn analysis(&self) -> Option<Result<AnalysisResult, serde_json::Error>> {
        self.resultado_final
            .as_ref()
            .map(|value| serde_json::from_value(value.clone()))
    }
}

/// Resposta de `POST /meals/{id}/analyze` e `POST /meals/{id}/answers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTicket {
    pub job_id: JobId,
}

/// Modo de análise: `simple` (mais barato) ou `full` (com sugestão melhorada).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    #[default]
    Simple,
    Full,
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisMode::Simple => f.write_str("simple"),
            AnalysisMode::Full => f.write_str("full"),
        }
    }
}

/// Corpo de `POST /meals/{id}/analyze`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub mode: AnalysisMode,
}

/// Corpo de `POST /meals/{id}/answers`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswersRequest {
    pub answers: BTreeMap<String, String>,
}

/// Resposta de `POST /meals/upload-image`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealUpload {
    pub meal_id: MealId,
    pub image_url: String,
}

/// Resposta de `GET /meals/{id}` — a "tela de resultado".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealDetail {
    pub id: MealId,
    pub image_url: String,
    pub meal_type: String,
    pub status: String,
    pub mode: String,
    pub created_at: NaiveDateTime,
    #[serde(default)]
    pub analysis: Option<AnalysisResult>,
}

/// Faixa de calorias estimada.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Calorias {
    pub central: f64,
    pub min: f64,
    pub max: f64,
}

/// Macronutrientes em gramas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Macros {
    pub proteina_g: f64,
    pub carbo_g: f64,
    pub gordura_g: f64,
    #[serde(default)]
    pub fibra_g: Option<f64>,
}

/// Alimento reconhecido na foto.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemIdentificado {
    pub nome: String,
    #[serde(default)]
    pub alternativas: Vec<String>,
    pub confianca: String,
}

/// Porção estimada de um item, em gramas ou mililitros.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PorcaoEstimada {
    pub item: String,
    pub peso_g_ml_central: f64,
    pub faixa_min: f64,
    pub faixa_max: f64,
    pub confianca: String,
}

/// Resultado final de uma análise. Listas ausentes viram listas vazias.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub itens_identificados: Vec<ItemIdentificado>,
    #[serde(default)]
    pub porcoes_estimadas: Vec<PorcaoEstimada>,
    #[serde(default)]
    pub calorias: Calorias,
    #[serde(default)]
    pub macros: Macros,
    #[serde(default)]
    pub confianca: String,
    #[serde(default)]
    pub incertezas: Vec<String>,
    #[serde(default)]
    pub beneficios: Vec<String>,
    #[serde(default)]
    pub pontos_de_atencao: Vec<String>,
    #[serde(default)]
    pub recomendacoes_praticas: Vec<String>,
    #[serde(default)]
    pub aviso: Option<String>,
    #[serde(default)]
    pub sugestao_melhorada_texto: Option<String>,
}

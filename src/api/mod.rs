pub mod client;
pub mod error;
pub mod types;

pub use client::{ApiClient, DEFAULT_API_URL, JobApi};
pub use error::ApiError;
pub use types::{
    AnalysisMode, AnalysisResult, AnswersRequest, JobId, JobResponse, JobStatus, JobTicket,
    MealDetail, MealId, MealUpload,
};

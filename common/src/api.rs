use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{Job, JobId};

/* --------- Payloads HTTP entre client y master --------- */

/// Cuerpo de `POST /api/v1/graphs`: el grafo ya resuelto y su raíz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteGraphRequest {
    /// Lista de jobs serializada como JSON (texto dentro de texto)
    pub jobs: String,
    pub root_job_id: JobId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GraphStatus {
    Accepted,
    Rejected,
}

/// Lo que el master recuerda de cada grafo recibido.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphInfo {
    pub id: String,
    pub root_job_id: JobId,
    pub root_op: Option<String>,
    pub status: GraphStatus,
    /// Jobs recibidos (vacío si el grafo no se pudo parsear)
    #[serde(default)]
    pub jobs: Vec<Job>,
    pub submitted_at: DateTime<Utc>,
    /// Motivo del rechazo, si lo hubo
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionQuery {
    pub table: String,
    pub from: String,
    pub until: String,
}

/// Partición según el catálogo; los tiempos van como texto decimal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub partition_key: String,
    pub time_begin: String,
    pub time_limit: String,
}

impl PartitionInfo {
    pub fn new(key: impl Into<String>, begin: u64, limit: u64) -> Self {
        Self {
            partition_key: key.into(),
            time_begin: begin.to_string(),
            time_limit: limit.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputLines {
    pub lines: Vec<String>,
}

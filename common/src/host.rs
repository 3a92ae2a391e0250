use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use crate::api::PartitionInfo;
use crate::catalog::WindowCatalog;
use crate::job::{Job, JobId};

/// Los cuatro puntos de entrada que el entorno le provee a la capa de jobs.
///
/// Todas las llamadas son síncronas y bloqueantes.
pub trait Host {
    /// Sink de diagnóstico. Best-effort: nunca falla.
    fn log(&self, message: &str);

    /// Entrega un grafo resuelto (lista de jobs en JSON) para ejecutar.
    fn execute_graph(&self, jobs: &str, root_job_id: &str) -> Result<()>;

    /// Particiones de `table` que se solapan con `[from, until)`.
    /// Argumentos y tiempos devueltos van como texto decimal.
    fn list_partitions(&self, table: &str, from: &str, until: &str) -> Result<Vec<PartitionInfo>>;

    /// Canal de resultados hacia el que lanzó el script.
    fn write_output(&self, text: &str) -> Result<()>;
}

/* --------- Host en memoria --------- */

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub root_job_id: JobId,
    pub jobs: String,
}

impl Submission {
    pub fn decode_jobs(&self) -> serde_json::Result<Vec<Job>> {
        serde_json::from_str(&self.jobs)
    }
}

#[derive(Debug, Default)]
struct MemoryHostState {
    submissions: Vec<Submission>,
    outputs: Vec<String>,
    logs: Vec<String>,
    partitions: HashMap<String, Vec<PartitionInfo>>,
    fail_submissions: Option<String>,
}

/// Host que guarda todo en memoria. Lo usan los tests y el `--dry-run`
/// del client. Los clones comparten estado.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    state: Arc<Mutex<MemoryHostState>>,
    catalog: Option<WindowCatalog>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tablas sin particiones explícitas se responden con el catálogo.
    pub fn with_catalog(catalog: WindowCatalog) -> Self {
        Self {
            catalog: Some(catalog),
            ..Self::default()
        }
    }

    pub fn with_partitions(self, table: &str, partitions: Vec<PartitionInfo>) -> Self {
        self.lock().partitions.insert(table.to_string(), partitions);
        self
    }

    /// A partir de ahora `execute_graph` falla con `message`.
    pub fn fail_submissions(&self, message: &str) {
        self.lock().fail_submissions = Some(message.to_string());
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.lock().submissions.clone()
    }

    pub fn outputs(&self) -> Vec<String> {
        self.lock().outputs.clone()
    }

    pub fn logs(&self) -> Vec<String> {
        self.lock().logs.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryHostState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Host for MemoryHost {
    fn log(&self, message: &str) {
        self.lock().logs.push(message.to_string());
    }

    fn execute_graph(&self, jobs: &str, root_job_id: &str) -> Result<()> {
        let mut state = self.lock();
        if let Some(message) = &state.fail_submissions {
            return Err(anyhow!("{}", message));
        }

        state.submissions.push(Submission {
            root_job_id: root_job_id.to_string(),
            jobs: jobs.to_string(),
        });
        Ok(())
    }

    fn list_partitions(&self, table: &str, from: &str, until: &str) -> Result<Vec<PartitionInfo>> {
        if let Some(parts) = self.lock().partitions.get(table) {
            return Ok(parts.clone());
        }

        match &self.catalog {
            Some(catalog) => catalog.list_text(table, from, until),
            None => Ok(Vec::new()),
        }
    }

    fn write_output(&self, text: &str) -> Result<()> {
        self.lock().outputs.push(text.to_string());
        Ok(())
    }
}

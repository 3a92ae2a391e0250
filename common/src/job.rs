use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::value::{ScriptFn, Value};

pub type JobId = String;

/// Un job del grafo. Inmutable una vez creado.
///
/// En el wire se serializa como un objeto plano con el discriminador `op`:
/// `{"id": "job-1", "op": "map_table", "table_name": ..., ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    #[serde(flatten)]
    pub kind: JobKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JobKind {
    MapTable {
        table_name: String,
        from: u64,
        until: u64,
        /// Fuente de la función de map
        map_fn: String,
        /// Snapshot de globals, codificado con `codec::encode`
        globals: String,
        /// Params del usuario, codificados con `codec::encode`
        params: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        required_columns: Option<Vec<String>>,
    },
    Reduce {
        sources: Vec<JobId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        num_shards: Option<u32>,
        reduce_fn: String,
        globals: String,
        params: String,
    },
    SaveToTable {
        table_name: String,
        sources: Vec<JobId>,
    },
    SaveToTablePartition {
        table_name: String,
        partition_key: String,
        sources: Vec<JobId>,
    },
    ReturnResults {
        sources: Vec<JobId>,
        /// Vacío cuando no se pasó función de serialización
        #[serde(default)]
        serialize_fn: String,
    },
}

impl Job {
    pub fn sources(&self) -> &[JobId] {
        match &self.kind {
            JobKind::MapTable { .. } => &[],
            JobKind::Reduce { sources, .. }
            | JobKind::SaveToTable { sources, .. }
            | JobKind::SaveToTablePartition { sources, .. }
            | JobKind::ReturnResults { sources, .. } => sources.as_slice(),
        }
    }

    pub fn op(&self) -> &'static str {
        match self.kind {
            JobKind::MapTable { .. } => "map_table",
            JobKind::Reduce { .. } => "reduce",
            JobKind::SaveToTable { .. } => "save_to_table",
            JobKind::SaveToTablePartition { .. } => "save_to_table_partition",
            JobKind::ReturnResults { .. } => "return_results",
        }
    }

    /// Jobs cuya creación dispara la resolución y el envío del grafo.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            JobKind::SaveToTable { .. }
                | JobKind::SaveToTablePartition { .. }
                | JobKind::ReturnResults { .. }
        )
    }
}

/* --------- Tabla de jobs --------- */

/// Todos los jobs creados en una sesión. Sólo se agregan, nunca se borran.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: HashMap<JobId, Job>,
    order: Vec<JobId>,
}

impl JobTable {
    pub fn get(&self, id: &str) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.jobs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Jobs en orden de creación.
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.order.iter().filter_map(|id| self.jobs.get(id))
    }

    pub(crate) fn insert(&mut self, job: Job) {
        self.order.push(job.id.clone());
        self.jobs.insert(job.id.clone(), job);
    }
}

/* --------- Opciones de los constructores --------- */

// Los campos obligatorios son Option para poder reportar cuál falta
// en vez de aceptar un valor vacío.

#[derive(Debug, Clone, Default)]
pub struct MapTableOptions {
    pub table: Option<String>,
    pub from: Option<u64>,
    pub until: Option<u64>,
    pub map_fn: Option<ScriptFn>,
    pub params: Option<Value>,
    pub required_columns: Option<Vec<String>>,
}

impl MapTableOptions {
    pub fn new(table: impl Into<String>, from: u64, until: u64, map_fn: ScriptFn) -> Self {
        Self {
            table: Some(table.into()),
            from: Some(from),
            until: Some(until),
            map_fn: Some(map_fn),
            ..Self::default()
        }
    }

    pub fn params(mut self, params: impl Into<Value>) -> Self {
        self.params = Some(params.into());
        self
    }

    pub fn required_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReduceOptions {
    pub sources: Option<Vec<JobId>>,
    pub reduce_fn: Option<ScriptFn>,
    pub shards: Option<u32>,
    pub params: Option<Value>,
}

impl ReduceOptions {
    pub fn new(sources: Vec<JobId>, reduce_fn: ScriptFn) -> Self {
        Self {
            sources: Some(sources),
            reduce_fn: Some(reduce_fn),
            ..Self::default()
        }
    }

    pub fn shards(mut self, shards: u32) -> Self {
        self.shards = Some(shards);
        self
    }

    pub fn params(mut self, params: impl Into<Value>) -> Self {
        self.params = Some(params.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct SaveToTableOptions {
    pub table: Option<String>,
    pub sources: Option<Vec<JobId>>,
}

impl SaveToTableOptions {
    pub fn new(table: impl Into<String>, sources: Vec<JobId>) -> Self {
        Self {
            table: Some(table.into()),
            sources: Some(sources),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SaveToTablePartitionOptions {
    pub table: Option<String>,
    pub partition: Option<String>,
    pub sources: Option<Vec<JobId>>,
}

impl SaveToTablePartitionOptions {
    pub fn new(table: impl Into<String>, partition: impl Into<String>, sources: Vec<JobId>) -> Self {
        Self {
            table: Some(table.into()),
            partition: Some(partition.into()),
            sources: Some(sources),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_se_serializa_plano_con_op() {
        let job = Job {
            id: "job-3".to_string(),
            kind: JobKind::SaveToTablePartition {
                table_name: "clicks_daily".to_string(),
                partition_key: "clicks_daily/3600".to_string(),
                sources: vec!["job-1".to_string(), "job-2".to_string()],
            },
        };

        let v = serde_json::to_value(&job).unwrap();
        assert_eq!(
            v,
            json!({
                "id": "job-3",
                "op": "save_to_table_partition",
                "table_name": "clicks_daily",
                "partition_key": "clicks_daily/3600",
                "sources": ["job-1", "job-2"]
            })
        );

        let back: Job = serde_json::from_value(v).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn map_table_omite_columnas_si_no_hay() {
        let job = Job {
            id: "job-1".to_string(),
            kind: JobKind::MapTable {
                table_name: "clicks".to_string(),
                from: 0,
                until: 10,
                map_fn: "|r| r".to_string(),
                globals: "{}".to_string(),
                params: "{}".to_string(),
                required_columns: None,
            },
        };

        let v = serde_json::to_value(&job).unwrap();
        assert_eq!(v["op"], json!("map_table"));
        assert!(v.get("required_columns").is_none());
        assert!(job.sources().is_empty());
        assert!(!job.is_terminal());
    }

    #[test]
    fn tabla_itera_en_orden_de_creacion() {
        let mut table = JobTable::default();
        for id in ["job-1", "job-2", "job-10"] {
            table.insert(Job {
                id: id.to_string(),
                kind: JobKind::ReturnResults {
                    sources: vec![],
                    serialize_fn: String::new(),
                },
            });
        }

        let ids: Vec<&str> = table.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["job-1", "job-2", "job-10"]);
        assert_eq!(table.len(), 3);
        assert!(table.contains("job-10"));
    }
}

use tracing::info;

use crate::api::PartitionInfo;
use crate::error::{GraphError, Result};
use crate::host::Host;
use crate::job::{JobId, SaveToTablePartitionOptions};
use crate::session::Session;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub table: String,
    pub from: u64,
    pub until: u64,
}

impl StreamOptions {
    pub fn new(table: impl Into<String>, from: u64, until: u64) -> Self {
        Self {
            table: table.into(),
            from,
            until,
        }
    }
}

/// Partición con los límites ya parseados.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub key: String,
    pub begin: u64,
    pub limit: u64,
}

impl TryFrom<PartitionInfo> for Partition {
    type Error = GraphError;

    fn try_from(info: PartitionInfo) -> Result<Self> {
        let parse = |field: &str, text: &str| {
            text.trim().parse::<u64>().map_err(|_| {
                GraphError::InvalidArgument(format!(
                    "partición {}: {} no es decimal: '{}'",
                    info.partition_key, field, text
                ))
            })
        };

        let begin = parse("time_begin", &info.time_begin)?;
        let limit = parse("time_limit", &info.time_limit)?;

        Ok(Partition {
            key: info.partition_key,
            begin,
            limit,
        })
    }
}

// la función de cálculo tiene que devolver una lista de ids (strings)
fn into_job_ids(value: Value) -> Result<Vec<JobId>> {
    match value {
        Value::List(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Text(id) => Ok(id),
                other => Err(GraphError::InvalidReturnType(format!(
                    "lista con un elemento {}",
                    other.kind()
                ))),
            })
            .collect(),
        other => Err(GraphError::InvalidReturnType(other.kind().to_string())),
    }
}

impl<H: Host> Session<H> {
    /// Recorre las particiones de `table` en `[from, until)` y, por cada una,
    /// llama a `compute(session, begin, limit)`, guarda sus jobs en esa
    /// partición y envía el grafo.
    ///
    /// Las particiones se procesan en el orden del catálogo, una por una. Si
    /// una falla, las anteriores ya quedaron enviadas.
    pub fn process_stream<F>(&mut self, opts: StreamOptions, mut compute: F) -> Result<Vec<JobId>>
    where
        F: FnMut(&mut Session<H>, u64, u64) -> Result<Value>,
    {
        let partitions = self.host.list_partitions(
            &opts.table,
            &opts.from.to_string(),
            &opts.until.to_string(),
        )?;
        info!(
            "stream sobre {}: {} particiones en [{}, {})",
            opts.table,
            partitions.len(),
            opts.from,
            opts.until
        );

        let mut roots = Vec::with_capacity(partitions.len());
        for info in partitions {
            let partition = Partition::try_from(info)?;
            let sources = into_job_ids(compute(self, partition.begin, partition.limit)?)?;

            let root = self.save_to_table_partition(SaveToTablePartitionOptions::new(
                opts.table.clone(),
                partition.key,
                sources,
            ))?;
            roots.push(root);
        }

        Ok(roots)
    }
}

use std::fmt::Display;

use tracing::{debug, info};

use crate::broadcast::{BroadcastSet, Globals};
use crate::codec;
use crate::error::{GraphError, Result};
use crate::host::Host;
use crate::job::{
    Job, JobId, JobKind, JobTable, MapTableOptions, ReduceOptions, SaveToTableOptions,
    SaveToTablePartitionOptions,
};
use crate::value::{ScriptFn, Value};

/// Contexto de una corrida de armado de jobs.
///
/// Agrupa el estado que vive durante toda la corrida: contador de ids, tabla
/// de jobs, globals registrados y el log de broadcast. Cada sesión es
/// independiente; no hay estado global de proceso.
pub struct Session<H> {
    pub(crate) host: H,
    seq: u64,
    pub(crate) jobs: JobTable,
    pub(crate) globals: Globals,
    pub(crate) broadcasts: BroadcastSet,
}

fn required<T>(field: Option<T>, op: &str, name: &str) -> Result<T> {
    field.ok_or_else(|| GraphError::InvalidArgument(format!("{op}: falta el campo '{name}'")))
}

impl<H> Session<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            seq: 0,
            jobs: JobTable::default(),
            globals: Globals::default(),
            broadcasts: BroadcastSet::default(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    /// Registra (o reemplaza) un global visible para `broadcast`.
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.globals.define(name, value);
    }

    pub fn broadcasts(&self) -> &BroadcastSet {
        &self.broadcasts
    }

    // ids "job-1", "job-2", ... nunca se reutilizan dentro de la sesión
    fn next_job_id(&mut self) -> JobId {
        self.seq += 1;
        format!("job-{}", self.seq)
    }

    fn encoded_globals(&self) -> Result<String> {
        Ok(codec::encode(&Value::Map(self.broadcasts.snapshot()))?)
    }

    fn insert(&mut self, kind: JobKind) -> JobId {
        let id = self.next_job_id();
        let job = Job {
            id: id.clone(),
            kind,
        };
        debug!("job creado: {} ({})", job.id, job.op());
        self.jobs.insert(job);
        id
    }

    /// Job que recorre el rango `[from, until)` de una tabla aplicando `map_fn`.
    pub fn map_table(&mut self, opts: MapTableOptions) -> Result<JobId> {
        let table_name = required(opts.table, "map_table", "table")?;
        let from = required(opts.from, "map_table", "from")?;
        let until = required(opts.until, "map_table", "until")?;
        let map_fn = required(opts.map_fn, "map_table", "map_fn")?;
        let params = opts.params.unwrap_or_else(Value::empty_map);

        self.auto_broadcast()?;
        let globals = self.encoded_globals()?;
        let params = codec::encode(&params)?;

        Ok(self.insert(JobKind::MapTable {
            table_name,
            from,
            until,
            map_fn: map_fn.source().to_string(),
            globals,
            params,
            required_columns: opts.required_columns,
        }))
    }

    /// Job que combina las salidas de `sources` con `reduce_fn`.
    pub fn reduce(&mut self, opts: ReduceOptions) -> Result<JobId> {
        let sources = required(opts.sources, "reduce", "sources")?;
        let reduce_fn = required(opts.reduce_fn, "reduce", "reduce_fn")?;
        let params = opts.params.unwrap_or_else(Value::empty_map);

        self.auto_broadcast()?;
        let globals = self.encoded_globals()?;
        let params = codec::encode(&params)?;

        Ok(self.insert(JobKind::Reduce {
            sources,
            num_shards: opts.shards,
            reduce_fn: reduce_fn.source().to_string(),
            globals,
            params,
        }))
    }
}

impl<H: Host> Session<H> {
    /// Persiste las salidas de `sources` en una tabla y envía el grafo.
    pub fn save_to_table(&mut self, opts: SaveToTableOptions) -> Result<JobId> {
        let table_name = required(opts.table, "save_to_table", "table")?;
        let sources = required(opts.sources, "save_to_table", "sources")?;

        let id = self.insert(JobKind::SaveToTable {
            table_name,
            sources,
        });
        self.submit(&id)?;
        Ok(id)
    }

    /// Persiste las salidas de `sources` en una partición y envía el grafo.
    pub fn save_to_table_partition(&mut self, opts: SaveToTablePartitionOptions) -> Result<JobId> {
        let table_name = required(opts.table, "save_to_table_partition", "table")?;
        let partition_key = required(opts.partition, "save_to_table_partition", "partition")?;
        let sources = required(opts.sources, "save_to_table_partition", "sources")?;

        let id = self.insert(JobKind::SaveToTablePartition {
            table_name,
            partition_key,
            sources,
        });
        self.submit(&id)?;
        Ok(id)
    }

    /// Devuelve las salidas de `sources` al que llama y envía el grafo.
    pub fn download_results(
        &mut self,
        sources: Vec<JobId>,
        serialize_fn: Option<ScriptFn>,
    ) -> Result<JobId> {
        let id = self.insert(JobKind::ReturnResults {
            sources,
            serialize_fn: serialize_fn
                .map(|f| f.source().to_string())
                .unwrap_or_default(),
        });
        self.submit(&id)?;
        Ok(id)
    }

    /// Manda texto al canal de resultados del que llama.
    pub fn write_output(&self, value: impl Into<Value>) -> Result<()> {
        match value.into() {
            Value::Text(text) => {
                self.host.write_output(&text)?;
                Ok(())
            }
            other => Err(GraphError::InvalidArgument(format!(
                "el argumento de write_output debe ser un string, llegó {}",
                other.kind()
            ))),
        }
    }

    /// Log de diagnóstico hacia el host: une las partes con ", ".
    pub fn log<I>(&self, parts: I)
    where
        I: IntoIterator,
        I::Item: Display,
    {
        let line = parts
            .into_iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        info!("log del script: {}", line);
        self.host.log(&line);
    }
}

//! Capa que arma grafos de jobs map/reduce y se los pasa a un ejecutor externo.
//!
//! El script declara jobs sobre una `Session`; los jobs terminales (guardar en
//! tabla, guardar en partición, devolver resultados) resuelven sus
//! dependencias y envían el grafo al `Host`.

pub mod api;
pub mod broadcast;
pub mod catalog;
pub mod closure;
pub mod codec;
pub mod dag;
pub mod error;
mod gateway;
pub mod host;
pub mod job;
pub mod script;
pub mod session;
pub mod stream;
pub mod value;

pub use api::{ExecuteGraphRequest, GraphInfo, GraphStatus, OutputLines, PartitionInfo, PartitionQuery};
pub use broadcast::{BroadcastSet, Globals};
pub use catalog::WindowCatalog;
pub use closure::LoadedClosure;
pub use codec::{decode, encode, CodecError, FN_SENTINEL};
pub use error::GraphError;
pub use host::{Host, MemoryHost, Submission};
pub use job::{
    Job, JobId, JobKind, JobTable, MapTableOptions, ReduceOptions, SaveToTableOptions,
    SaveToTablePartitionOptions,
};
pub use script::{RuntimeLimits, ScriptError, ScriptRuntime};
pub use session::Session;
pub use stream::{Partition, StreamOptions};
pub use value::{ScriptFn, Value};

use thiserror::Error;

use crate::codec::CodecError;
use crate::job::JobId;

pub type Result<T> = std::result::Result<T, GraphError>;

/// Errores de la capa que arma y envía grafos de jobs.
///
/// Todos se devuelven en el momento de la violación y no se recuperan acá:
/// el que corre el script decide qué hacer con ellos.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Tipo de valor incorrecto o campo obligatorio ausente
    #[error("argumento inválido: {0}")]
    InvalidArgument(String),

    #[error("'{0}' es una variable reservada y no se puede transmitir")]
    ReservedName(String),

    #[error("no existe la variable global '{0}' (toda variable transmitida debe ser global)")]
    UndefinedBinding(String),

    #[error("id de job inválido: {0}")]
    UnknownJobReference(JobId),

    #[error("ciclo de dependencias a través del job {0}")]
    DependencyCycle(JobId),

    #[error("calculate_fn debe devolver una lista de ids de job, devolvió {0}")]
    InvalidReturnType(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("no se pudo serializar el grafo: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Falla del host externo; se propaga tal cual, sin reintentos
    #[error(transparent)]
    Host(#[from] anyhow::Error),
}

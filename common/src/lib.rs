//! Cola de tareas sobre el sistema de archivos para el servicio NBGWAS.
//!
//! El productor (REST) y el consumidor (task runner) solo se coordinan con
//! directorios y archivos JSON:
//!
//! ```text
//! <base>/<submitted|processing|done>/<ip del cliente>/<task id>/
//!     task.json        registro de la tarea
//!     result.json      puntajes, una vez terminada
//!     network_data     red subida por el cliente (opcional)
//! ```

pub mod error;
pub mod factory;
pub mod id;
pub mod jsonfile;
pub mod lifecycle;
pub mod state;
pub mod status;
pub mod store;
pub mod task;

pub use error::SubmitError;
pub use factory::SubmittedTaskFactory;
pub use id::{IdGenerator, IdStrategy, SequentialGenerator, UuidGenerator};
pub use lifecycle::{FileBasedTask, TaskPathParts};
pub use state::{Partition, TaskState};
pub use status::{query_status, read_done_task, StatusKind, StatusReport};
pub use store::{locate_task, Payload, PayloadData, TaskStore};
pub use task::{
    NetworkSource, NetworkTaskParams, ScoreMap, SnpTaskParams, SourceFields, TaskId, TaskKind,
    TaskRecord,
};

use serde::{Deserialize, Serialize};

/* --------- Nombres fijos dentro del directorio de una tarea --------- */

pub const TASK_JSON: &str = "task.json";
pub const RESULT: &str = "result.json";
pub const NETWORK_DATA: &str = "network_data";
pub const SNP_LEVEL_SUMMARY: &str = "snp_level_summary";
pub const PROTEIN_CODING: &str = "protein_coding";
/// Red descargada por el runner (NDEx o BigGIM)
pub const FETCHED_NETWORK: &str = "fetched_network";

/// Archivos grandes que se pueden borrar al cerrar la tarea
pub const TEMP_FILES: [&str; 3] = [NETWORK_DATA, SNP_LEVEL_SUMMARY, FETCHED_NETWORK];

/* --------- Respuestas HTTP compartidas con el cliente --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub task_id: TaskId,
    pub location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// "validation" o "internal"
    pub kind: String,
    pub message: String,
}

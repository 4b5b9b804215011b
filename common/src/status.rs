use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::warn;

use crate::{jsonfile::read_json, state::Partition, store::TaskStore, RESULT, TASK_JSON};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Notfound,
    Submitted,
    Processing,
    Done,
    Error,
}

/// Lo que devuelve `GET /nbgwas/tasks/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: StatusKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusReport {
    pub fn of(status: StatusKind) -> Self {
        Self {
            status,
            result: None,
            message: None,
        }
    }
}

#[derive(Deserialize)]
struct ErrorField {
    #[serde(default)]
    error: Option<String>,
}

/// Estado de una tarea que está en `done`: hace falta result.json para que
/// cuente como terminada.
pub fn read_done_task(taskdir: &Path) -> StatusReport {
    let rfile = taskdir.join(RESULT);
    if rfile.is_file() {
        match read_json::<Map<String, Value>>(&rfile) {
            Ok(result) => {
                return StatusReport {
                    status: StatusKind::Done,
                    result: Some(result),
                    message: None,
                }
            }
            Err(e) => warn!("resultado ilegible en {}: {}", rfile.display(), e),
        }
    }

    let message = read_json::<ErrorField>(&taskdir.join(TASK_JSON))
        .ok()
        .and_then(|f| f.error);
    StatusReport {
        status: StatusKind::Error,
        result: None,
        message,
    }
}

/// Busca la tarea en submitted, processing y done (en ese orden). No modifica nada.
pub fn query_status(store: &TaskStore, task_id: &str, client_hint: Option<&str>) -> StatusReport {
    match store.find(task_id, client_hint) {
        None => StatusReport::of(StatusKind::Notfound),
        Some((Partition::Submitted, _)) => StatusReport::of(StatusKind::Submitted),
        Some((Partition::Processing, _)) => StatusReport::of(StatusKind::Processing),
        Some((Partition::Done, taskdir)) => read_done_task(&taskdir),
    }
}

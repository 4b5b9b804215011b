use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Directorio de primer nivel bajo la ruta base de trabajos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Submitted,
    Processing,
    Done,
}

impl Partition {
    /// Orden en que se consulta el estado de una tarea.
    pub const ALL: [Partition; 3] = [Partition::Submitted, Partition::Processing, Partition::Done];

    pub fn dir_name(self) -> &'static str {
        match self {
            Partition::Submitted => "submitted",
            Partition::Processing => "processing",
            Partition::Done => "done",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for Partition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(Partition::Submitted),
            "processing" => Ok(Partition::Processing),
            "done" => Ok(Partition::Done),
            other => Err(format!("Unknown task state directory: {other}")),
        }
    }
}

/// Estado lógico de una tarea.
///
/// `Error` no tiene directorio propio: la tarea queda en `done` con el campo
/// `error` de su task.json.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Submitted,
    Processing,
    Done,
    Error,
}

impl TaskState {
    pub fn partition(self) -> Partition {
        match self {
            TaskState::Submitted => Partition::Submitted,
            TaskState::Processing => Partition::Processing,
            TaskState::Done | TaskState::Error => Partition::Done,
        }
    }
}

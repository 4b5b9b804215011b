use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

use crate::{
    jsonfile::read_json,
    lifecycle::FileBasedTask,
    state::{Partition, TaskState},
    task::TaskRecord,
    TASK_JSON,
};

pub const PROBLEM_TASK_MESSAGE: &str = "Unable to parse task metadata";

/// Entrega al runner la próxima tarea de `submitted`.
///
/// No es FIFO: devuelve la primera que aparece en el listado del directorio,
/// sin orden por fecha.
#[derive(Debug)]
pub struct SubmittedTaskFactory {
    submit_dir: PathBuf,
    // tareas cuyo task.json no se pudo leer
    problems: BTreeSet<PathBuf>,
}

impl SubmittedTaskFactory {
    /// `taskdir` es la ruta base de trabajos (la que contiene `submitted/`)
    pub fn new(taskdir: impl AsRef<Path>) -> Self {
        Self {
            submit_dir: taskdir.as_ref().join(Partition::Submitted.dir_name()),
            problems: BTreeSet::new(),
        }
    }

    pub fn submit_dir(&self) -> &Path {
        &self.submit_dir
    }

    pub fn next_task(&mut self) -> Option<FileBasedTask> {
        let clients = match fs::read_dir(&self.submit_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "{} no existe o no es un directorio: {}",
                    self.submit_dir.display(),
                    e
                );
                return None;
            }
        };

        for client in clients.flatten() {
            let client_path = client.path();
            if !client_path.is_dir() {
                continue;
            }
            let Ok(tasks) = fs::read_dir(&client_path) else {
                continue;
            };

            for entry in tasks.flatten() {
                let taskdir = entry.path();
                let tjson = taskdir.join(TASK_JSON);
                if !taskdir.is_dir() || !tjson.is_file() {
                    continue;
                }

                match read_json::<TaskRecord>(&tjson) {
                    Ok(record) => {
                        self.problems.remove(&taskdir);
                        debug!("tarea encontrada: {}", taskdir.display());
                        return Some(FileBasedTask::new(taskdir, record));
                    }
                    Err(e) => {
                        if !self.problems.contains(&taskdir) {
                            info!(
                                "salteando tarea {} por error leyendo task.json: {}",
                                taskdir.display(),
                                e
                            );
                            self.problems.insert(taskdir);
                        }
                    }
                }
            }
        }
        None
    }

    pub fn problem_list(&self) -> impl Iterator<Item = &Path> {
        self.problems.iter().map(PathBuf::as_path)
    }

    pub fn problem_count(&self) -> usize {
        self.problems.len()
    }

    /// Manda a error cada tarea de la lista de problemas y vacía la lista.
    /// Devuelve cuántas se movieron.
    pub fn drain_problems(&mut self) -> usize {
        let mut drained = 0;
        for taskdir in std::mem::take(&mut self.problems) {
            if !taskdir.is_dir() {
                debug!("{} ya no existe, se descarta", taskdir.display());
                continue;
            }
            let mut task = FileBasedTask::unparsed(&taskdir);
            match task.move_to(TaskState::Error, Some(PROBLEM_TASK_MESSAGE), true) {
                Ok(()) => drained += 1,
                Err(e) => warn!("no se pudo mover {} a error: {}", taskdir.display(), e),
            }
        }
        drained
    }
}

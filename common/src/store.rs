use chrono::Utc;
use std::{
    fs,
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, info, warn};

use crate::{
    error::SubmitError,
    id::IdGenerator,
    jsonfile::write_json_atomic,
    state::Partition,
    task::{NetworkSource, TaskId, TaskKind, TaskRecord},
    NETWORK_DATA, SNP_LEVEL_SUMMARY, TASK_JSON,
};

/// Contenido de un archivo subido.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadData {
    Bytes(Vec<u8>),
    /// Ya volcado a disco por quien recibió el pedido; se mueve al directorio
    /// de la tarea. El archivo de origen lo limpia quien lo creó.
    Spooled(PathBuf),
}

/// Archivo subido junto con el pedido; se guarda con nombre fijo.
#[derive(Debug, Clone)]
pub struct Payload {
    pub file_name: &'static str,
    pub data: PayloadData,
}

/// Un id o una ip solo pueden ser un segmento de ruta, nada de `..` ni `/`.
fn is_plain_segment(s: &str) -> bool {
    let mut components = Path::new(s).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !s.contains(['/', '\\'])
}

/// Busca `<basedir>/<ip>/<task_id>`.
///
/// Primero prueba la carpeta de `client_hint` y, si no está ahí, recorre cada
/// carpeta de cliente. Base inexistente, base que no es directorio o id `None`
/// devuelven `None`.
pub fn locate_task(
    basedir: &Path,
    task_id: Option<&str>,
    client_hint: Option<&str>,
) -> Option<PathBuf> {
    let task_id = task_id?;
    if !is_plain_segment(task_id) || !basedir.is_dir() {
        return None;
    }

    if let Some(hint) = client_hint.filter(|h| is_plain_segment(h)) {
        let hinted = basedir.join(hint).join(task_id);
        if hinted.is_dir() {
            return Some(hinted);
        }
    }

    let clients = fs::read_dir(basedir).ok()?;
    for client in clients.flatten() {
        let client_path = client.path();
        if !client_path.is_dir() {
            continue;
        }
        let candidate = client_path.join(task_id);
        if candidate.is_dir() {
            return Some(candidate);
        }
    }
    None
}

/// Persistencia de tareas en `<base>/<partición>/<ip>/<task id>/`.
#[derive(Clone)]
pub struct TaskStore {
    base: PathBuf,
    ids: Arc<dyn IdGenerator>,
}

impl TaskStore {
    pub fn new(base: impl Into<PathBuf>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            base: base.into(),
            ids,
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn partition_dir(&self, partition: Partition) -> PathBuf {
        self.base.join(partition.dir_name())
    }

    /// Crea la tarea en `submitted` y devuelve su id.
    ///
    /// Orden: validar, crear directorio, volcar archivos subidos y por último
    /// task.json (escritura atómica). El factory ignora directorios sin task.json,
    /// así que nunca ve una tarea a medio crear.
    pub fn submit(
        &self,
        remote_ip: &str,
        kind: TaskKind,
        payloads: Vec<Payload>,
    ) -> Result<TaskId, SubmitError> {
        if !is_plain_segment(remote_ip) {
            return Err(SubmitError::Validation(format!(
                "invalid client address: {remote_ip:?}"
            )));
        }
        kind.validate().map_err(SubmitError::Validation)?;
        check_payloads(&kind, &payloads)?;

        let task_id = self.ids.next_id();
        let taskdir = self
            .partition_dir(Partition::Submitted)
            .join(remote_ip)
            .join(&task_id);

        fs::create_dir_all(&taskdir)?;
        debug!("directorio de tarea creado: {}", taskdir.display());

        let record = TaskRecord {
            task_id: task_id.clone(),
            remote_ip: remote_ip.to_string(),
            submitted_at: Utc::now(),
            kind,
            error: None,
        };

        if let Err(e) = write_task_files(&taskdir, &record, &payloads) {
            warn!(
                "no se pudo escribir la tarea {}: {}, borrando {}",
                task_id,
                e,
                taskdir.display()
            );
            let _ = fs::remove_dir_all(&taskdir);
            return Err(e.into());
        }

        info!(
            "tarea {} ({}) recibida de {}",
            task_id,
            record.kind.label(),
            remote_ip
        );
        Ok(task_id)
    }

    pub fn locate(
        &self,
        partition: Partition,
        task_id: Option<&str>,
        client_hint: Option<&str>,
    ) -> Option<PathBuf> {
        locate_task(&self.partition_dir(partition), task_id, client_hint)
    }

    /// Busca la tarea en submitted, processing y done, en ese orden.
    pub fn find(&self, task_id: &str, client_hint: Option<&str>) -> Option<(Partition, PathBuf)> {
        Partition::ALL.iter().find_map(|p| {
            self.locate(*p, Some(task_id), client_hint)
                .map(|path| (*p, path))
        })
    }

    /// Sondea `done` cada `interval` hasta `attempts` veces.
    ///
    /// Solo lo usa el endpoint sincrónico heredado, que mantiene la conexión
    /// abierta mientras espera.
    pub async fn wait_until_done(
        &self,
        task_id: &str,
        client_hint: Option<&str>,
        attempts: u32,
        interval: Duration,
    ) -> Option<PathBuf> {
        let attempts = attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(path) = self.locate(Partition::Done, Some(task_id), client_hint) {
                return Some(path);
            }
            debug!(
                "tarea {} aún no termina (intento {}/{})",
                task_id, attempt, attempts
            );
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }
        None
    }
}

fn check_payloads(kind: &TaskKind, payloads: &[Payload]) -> Result<(), SubmitError> {
    let has = |name: &str| payloads.iter().any(|p| p.file_name == name);

    if matches!(kind.source(), NetworkSource::Upload(_)) && !has(NETWORK_DATA) {
        return Err(SubmitError::Validation(
            "network upload marker set but no network file was sent".to_string(),
        ));
    }
    if matches!(kind, TaskKind::SnpAnalysis(_)) && !has(SNP_LEVEL_SUMMARY) {
        return Err(SubmitError::Validation(
            "snp_level_summary file is required".to_string(),
        ));
    }
    Ok(())
}

fn write_task_files(
    taskdir: &Path,
    record: &TaskRecord,
    payloads: &[Payload],
) -> std::io::Result<()> {
    for payload in payloads {
        let dest = taskdir.join(payload.file_name);
        match &payload.data {
            PayloadData::Bytes(data) => fs::write(&dest, data)?,
            PayloadData::Spooled(src) => {
                // rename falla entre filesystems distintos
                if let Err(e) = fs::rename(src, &dest) {
                    debug!("rename de {} falló ({}), copiando", src.display(), e);
                    fs::copy(src, &dest)?;
                }
            }
        }
    }
    write_json_atomic(&taskdir.join(TASK_JSON), record)
}

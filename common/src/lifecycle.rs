use serde_json::json;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

use crate::{
    jsonfile::write_json_atomic,
    state::{Partition, TaskState},
    task::{ScoreMap, TaskKind, TaskRecord},
    NETWORK_DATA, PROTEIN_CODING, RESULT, SNP_LEVEL_SUMMARY, TASK_JSON, TEMP_FILES,
};

pub const UNKNOWN_ERROR: &str = "Unknown error";
const BAD_TASK_PATH: &str = "Unable to extract state basedir from task path";

/// Partes codificadas en `<basedir>/<estado>/<ip>/<task id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPathParts {
    pub basedir: PathBuf,
    pub state: Partition,
    pub remote_ip: String,
    pub task_id: String,
}

impl TaskPathParts {
    pub fn parse(taskdir: &Path) -> Result<Self, String> {
        fn name_of(p: &Path) -> Option<String> {
            p.file_name().map(|n| n.to_string_lossy().to_string())
        }

        let task_id = name_of(taskdir).ok_or(BAD_TASK_PATH)?;
        let ipdir = taskdir.parent().ok_or(BAD_TASK_PATH)?;
        let remote_ip = name_of(ipdir).ok_or(BAD_TASK_PATH)?;
        let statedir = ipdir.parent().ok_or(BAD_TASK_PATH)?;
        let state = name_of(statedir)
            .ok_or(BAD_TASK_PATH)?
            .parse::<Partition>()
            .map_err(|e| format!("{BAD_TASK_PATH}: {e}"))?;
        let basedir = statedir.parent().ok_or(BAD_TASK_PATH)?.to_path_buf();

        Ok(Self {
            basedir,
            state,
            remote_ip,
            task_id,
        })
    }

    /// Misma tarea en otra partición: solo cambia el segmento de estado
    pub fn path_for(&self, partition: Partition) -> PathBuf {
        self.basedir
            .join(partition.dir_name())
            .join(&self.remote_ip)
            .join(&self.task_id)
    }
}

/// Una tarea en disco y su registro en memoria.
///
/// El registro es `None` cuando task.json no se pudo leer (tareas de la lista de
/// problemas); aun así se pueden mover a error.
#[derive(Debug, Clone, Default)]
pub struct FileBasedTask {
    taskdir: Option<PathBuf>,
    record: Option<TaskRecord>,
    result: Option<ScoreMap>,
}

impl FileBasedTask {
    pub fn new(taskdir: impl Into<PathBuf>, record: TaskRecord) -> Self {
        Self {
            taskdir: Some(taskdir.into()),
            record: Some(record),
            result: None,
        }
    }

    /// Tarea cuyo task.json no se pudo parsear
    pub fn unparsed(taskdir: impl Into<PathBuf>) -> Self {
        Self {
            taskdir: Some(taskdir.into()),
            record: None,
            result: None,
        }
    }

    pub fn taskdir(&self) -> Option<&Path> {
        self.taskdir.as_deref()
    }

    pub fn set_taskdir(&mut self, taskdir: impl Into<PathBuf>) {
        self.taskdir = Some(taskdir.into());
    }

    pub fn record(&self) -> Option<&TaskRecord> {
        self.record.as_ref()
    }

    pub fn set_record(&mut self, record: TaskRecord) {
        self.record = Some(record);
    }

    pub fn result(&self) -> Option<&ScoreMap> {
        self.result.as_ref()
    }

    pub fn set_result(&mut self, result: ScoreMap) {
        self.result = Some(result);
    }

    fn parts(&self) -> Option<TaskPathParts> {
        TaskPathParts::parse(self.taskdir.as_deref()?).ok()
    }

    pub fn task_id(&self) -> Option<String> {
        self.parts().map(|p| p.task_id)
    }

    pub fn remote_ip(&self) -> Option<String> {
        self.parts().map(|p| p.remote_ip)
    }

    pub fn state(&self) -> Option<Partition> {
        self.parts().map(|p| p.state)
    }

    /// Resumen corto para logs
    pub fn summary(&self) -> String {
        match self.parts() {
            Some(p) => format!(
                "{{basedir: {}, state: {}, ipaddr: {}, uuid: {}}}",
                p.basedir.display(),
                p.state,
                p.remote_ip,
                p.task_id
            ),
            None => format!(
                "{{taskdir: {}}}",
                self.taskdir
                    .as_deref()
                    .map(|d| d.display().to_string())
                    .unwrap_or_else(|| "None".to_string())
            ),
        }
    }

    /* ---------------- archivos de la tarea ---------------- */

    fn existing_file(&self, name: &str) -> Option<PathBuf> {
        let path = self.taskdir.as_deref()?.join(name);
        path.is_file().then_some(path)
    }

    pub fn network_file(&self) -> Option<PathBuf> {
        self.existing_file(NETWORK_DATA)
    }

    pub fn snp_level_summary_file(&self) -> Option<PathBuf> {
        self.existing_file(SNP_LEVEL_SUMMARY)
    }

    /// Archivo de genes codificantes: primero el subido con la tarea, si no
    /// `<protein_coding_dir>/<protein_coding><suffix>`.
    pub fn protein_coding_file(
        &self,
        protein_coding_dir: Option<&Path>,
        suffix: &str,
    ) -> Option<PathBuf> {
        if let Some(path) = self.existing_file(PROTEIN_CODING) {
            return Some(path);
        }

        let Some(dir) = protein_coding_dir else {
            warn!("directorio de protein coding no configurado");
            return None;
        };
        let name = match self.record.as_ref().map(|r| &r.kind) {
            Some(TaskKind::SnpAnalysis(p)) => &p.protein_coding,
            _ => {
                warn!("la tarea no tiene parámetro protein_coding");
                return None;
            }
        };

        let path = dir.join(format!("{name}{suffix}"));
        debug!("buscando protein coding en {}", path.display());
        path.is_file().then_some(path)
    }

    /* ---------------- persistencia y transiciones ---------------- */

    /// Reescribe task.json (y result.json si hay resultado).
    pub fn save(&self) -> Result<(), String> {
        let taskdir = self.taskdir.as_deref().ok_or("Task dir is None")?;
        let record = self.record.as_ref().ok_or("Task record is None")?;
        if !taskdir.is_dir() {
            return Err(format!("{} is not a directory", taskdir.display()));
        }

        let tjson = taskdir.join(TASK_JSON);
        debug!("escribiendo task.json en {}", tjson.display());
        write_json_atomic(&tjson, record)
            .map_err(|e| format!("Unable to write {}: {e}", tjson.display()))?;

        if let Some(result) = &self.result {
            let rfile = taskdir.join(RESULT);
            debug!("escribiendo resultado en {}", rfile.display());
            write_json_atomic(&rfile, result)
                .map_err(|e| format!("Unable to write {}: {e}", rfile.display()))?;
        }
        Ok(())
    }

    fn persist_error(&mut self, message: &str) -> Result<(), String> {
        // un result.json que quedó de un intento fallido haría ver la tarea como done
        self.result = None;
        if let Some(rfile) = self.taskdir.as_deref().map(|dir| dir.join(RESULT)) {
            if rfile.is_file() {
                fs::remove_file(&rfile)
                    .map_err(|e| format!("Unable to remove {}: {e}", rfile.display()))?;
            }
        }

        match self.record.as_mut() {
            Some(record) => {
                record.error = Some(message.to_string());
                self.save()
            }
            None => {
                // task.json ilegible: se reemplaza por uno que solo trae el error
                let taskdir = self.taskdir.as_deref().ok_or("Task dir is None")?;
                write_json_atomic(&taskdir.join(TASK_JSON), &json!({ "error": message }))
                    .map_err(|e| format!("Unable to write error for {}: {e}", taskdir.display()))
            }
        }
    }

    /// Mueve la tarea a `new_state` renombrando su directorio.
    ///
    /// `Error` termina en `done`: primero se guarda el mensaje en task.json y
    /// recién después se mueve, así quien vea la tarea en `done` siempre lee un
    /// registro completo. Mover al mismo estado no hace nada.
    pub fn move_to(
        &mut self,
        new_state: TaskState,
        error_message: Option<&str>,
        delete_temp_files: bool,
    ) -> Result<(), String> {
        let taskdir = self.taskdir.clone().ok_or(BAD_TASK_PATH)?;
        let parts = TaskPathParts::parse(&taskdir)?;
        let target = new_state.partition();

        if new_state != TaskState::Error && parts.state == target {
            debug!("tarea {} ya está en {}", taskdir.display(), target);
            return Ok(());
        }

        if new_state == TaskState::Error {
            let emsg = error_message.unwrap_or(UNKNOWN_ERROR);
            info!("tarea {} pasa a error: {}", parts.task_id, emsg);
            self.persist_error(emsg)?;
        }

        if parts.state != target {
            let dest = parts.path_for(target);
            debug!("moviendo tarea {} a {}", parts.task_id, target);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("Unable to create {}: {e}", parent.display()))?;
            }
            fs::rename(&taskdir, &dest).map_err(|e| {
                format!(
                    "Unable to move {} to {}: {e}",
                    taskdir.display(),
                    dest.display()
                )
            })?;
            self.taskdir = Some(dest);
        }

        if delete_temp_files {
            self.delete_temp_files();
        }
        Ok(())
    }

    /// Borra los archivos grandes de la tarea. Los errores solo se loguean.
    pub fn delete_temp_files(&self) {
        let Some(taskdir) = self.taskdir.as_deref() else {
            return;
        };
        for name in TEMP_FILES {
            let path = taskdir.join(name);
            if !path.is_file() {
                continue;
            }
            debug!("borrando {}", path.display());
            if let Err(e) = fs::remove_file(&path) {
                warn!("no se pudo borrar {}: {}", path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        jsonfile::read_json,
        store::locate_task,
        task::{NetworkSource, NetworkTaskParams, SnpTaskParams},
    };
    use chrono::Utc;
    use serde_json::Value;
    use std::fs::File;

    fn record(kind: TaskKind) -> TaskRecord {
        TaskRecord {
            task_id: "qwerty-qwerty".into(),
            remote_ip: "192.168.1.1".into(),
            submitted_at: Utc::now(),
            kind,
            error: None,
        }
    }

    fn ndex_record() -> TaskRecord {
        record(TaskKind::NetworkPropagation(NetworkTaskParams {
            alpha: 0.1,
            seeds: "a,b".into(),
            source: NetworkSource::Ndex("ndex3".into()),
        }))
    }

    fn submitted_task(base: &Path) -> FileBasedTask {
        let taskdir = base.join("submitted").join("192.168.1.1").join("qwerty-qwerty");
        fs::create_dir_all(&taskdir).unwrap();
        let task = FileBasedTask::new(&taskdir, ndex_record());
        task.save().unwrap();
        task
    }

    fn error_of(task: &FileBasedTask) -> Option<String> {
        let v: Value = read_json(&task.taskdir().unwrap().join(TASK_JSON)).unwrap();
        v.get("error").and_then(|e| e.as_str()).map(str::to_string)
    }

    #[test]
    fn parse_de_rutas() {
        assert!(TaskPathParts::parse(Path::new("/foo")).is_err());
        assert!(TaskPathParts::parse(Path::new("/b/other/i/myjob")).is_err());

        let p = TaskPathParts::parse(Path::new("/b/submitted/i/myjob")).unwrap();
        assert_eq!(p.basedir, PathBuf::from("/b"));
        assert_eq!(p.state, Partition::Submitted);
        assert_eq!(p.remote_ip, "i");
        assert_eq!(p.task_id, "myjob");

        let p = TaskPathParts::parse(Path::new("/a/c/b/done/i/myjob")).unwrap();
        assert_eq!(p.basedir, PathBuf::from("/a/c/b"));
        assert_eq!(p.path_for(Partition::Processing), PathBuf::from("/a/c/b/processing/i/myjob"));
    }

    #[test]
    fn tarea_vacia_no_tiene_partes() {
        let task = FileBasedTask::default();
        assert_eq!(task.task_id(), None);
        assert_eq!(task.remote_ip(), None);
        assert_eq!(task.state(), None);
        assert_eq!(task.summary(), "{taskdir: None}");
        assert_eq!(task.network_file(), None);
    }

    #[test]
    fn save_valida_precondiciones() {
        let tmp = tempfile::tempdir().unwrap();

        let mut task = FileBasedTask::default();
        assert_eq!(task.save().unwrap_err(), "Task dir is None");

        task.set_taskdir(tmp.path());
        assert_eq!(task.save().unwrap_err(), "Task record is None");

        let somefile = tmp.path().join("somefile");
        File::create(&somefile).unwrap();
        task.set_taskdir(&somefile);
        let rec = ndex_record();
        task.set_record(rec.clone());
        assert_eq!(
            task.save().unwrap_err(),
            format!("{} is not a directory", somefile.display())
        );

        task.set_taskdir(tmp.path());
        task.set_result(ScoreMap::from([("GENE1".to_string(), 0.75)]));
        task.save().unwrap();

        let result: ScoreMap = read_json(&tmp.path().join(RESULT)).unwrap();
        assert_eq!(result["GENE1"], 0.75);
        let back: TaskRecord = read_json(&tmp.path().join(TASK_JSON)).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn error_descarta_resultado_ya_escrito() {
        let tmp = tempfile::tempdir().unwrap();
        let mut task = submitted_task(tmp.path());
        task.set_result(ScoreMap::from([("GENE1".to_string(), 0.5)]));
        task.save().unwrap();

        task.move_to(TaskState::Error, Some("disco lleno"), false).unwrap();

        let taskdir = task.taskdir().unwrap().to_path_buf();
        assert!(taskdir.starts_with(tmp.path().join("done")));
        assert!(!taskdir.join(RESULT).exists());
        assert!(task.result().is_none());
        let v: Value = read_json(&taskdir.join(TASK_JSON)).unwrap();
        assert_eq!(v["error"], "disco lleno");
    }

    #[test]
    fn move_sin_directorio_falla_con_mensaje() {
        let mut task = FileBasedTask::default();
        assert_eq!(
            task.move_to(TaskState::Processing, None, false).unwrap_err(),
            BAD_TASK_PATH
        );
    }

    #[test]
    fn move_recorre_los_estados() {
        let tmp = tempfile::tempdir().unwrap();
        let mut task = submitted_task(tmp.path());
        let original = task.taskdir().unwrap().to_path_buf();
        let id = Some("qwerty-qwerty");

        // mismo estado: no hace nada
        task.move_to(TaskState::Submitted, None, false).unwrap();
        assert_eq!(task.taskdir().unwrap(), original);

        task.move_to(TaskState::Processing, None, false).unwrap();
        assert!(!original.exists());
        assert_eq!(task.state(), Some(Partition::Processing));
        assert_eq!(locate_task(&tmp.path().join("submitted"), id, None), None);
        assert_eq!(
            locate_task(&tmp.path().join("processing"), id, None).as_deref(),
            task.taskdir()
        );

        task.move_to(TaskState::Done, None, false).unwrap();
        assert_eq!(task.state(), Some(Partition::Done));
        assert_eq!(locate_task(&tmp.path().join("processing"), id, None), None);

        task.move_to(TaskState::Submitted, None, false).unwrap();
        assert_eq!(task.state(), Some(Partition::Submitted));
    }

    #[test]
    fn error_queda_en_done_con_mensaje() {
        let tmp = tempfile::tempdir().unwrap();
        let mut task = submitted_task(tmp.path());

        task.move_to(TaskState::Error, None, false).unwrap();
        assert_eq!(task.state(), Some(Partition::Done));
        assert_eq!(error_of(&task).as_deref(), Some(UNKNOWN_ERROR));
        assert!(!tmp.path().join("error").exists());

        task.move_to(TaskState::Submitted, None, false).unwrap();
        task.move_to(TaskState::Error, Some("bad"), false).unwrap();
        assert_eq!(error_of(&task).as_deref(), Some("bad"));

        // ya en done: reescribe el mensaje sin mover
        let before = task.taskdir().unwrap().to_path_buf();
        task.move_to(TaskState::Error, Some("peor"), false).unwrap();
        assert_eq!(task.taskdir().unwrap(), before);
        assert_eq!(error_of(&task).as_deref(), Some("peor"));
    }

    #[test]
    fn error_sobre_task_json_corrupto() {
        let tmp = tempfile::tempdir().unwrap();
        let taskdir = tmp.path().join("submitted").join("1.1.1.1").join("x");
        fs::create_dir_all(&taskdir).unwrap();
        fs::write(taskdir.join(TASK_JSON), b"{ no es json").unwrap();

        let mut task = FileBasedTask::unparsed(&taskdir);
        task.move_to(TaskState::Error, Some("corrupto"), false).unwrap();
        assert_eq!(task.state(), Some(Partition::Done));
        assert_eq!(error_of(&task).as_deref(), Some("corrupto"));
    }

    #[test]
    fn borrar_temporales_despues_de_mover() {
        let tmp = tempfile::tempdir().unwrap();
        let mut task = submitted_task(tmp.path());
        let taskdir = task.taskdir().unwrap().to_path_buf();
        fs::write(taskdir.join(NETWORK_DATA), b"a\tb\n").unwrap();
        fs::write(taskdir.join(SNP_LEVEL_SUMMARY), b"snps").unwrap();
        fs::write(taskdir.join(PROTEIN_CODING), b"genes").unwrap();
        assert!(task.network_file().is_some());

        task.move_to(TaskState::Error, Some("x"), true).unwrap();
        assert_eq!(task.network_file(), None);
        assert_eq!(task.snp_level_summary_file(), None);
        let done_dir = task.taskdir().unwrap();
        assert!(done_dir.join(PROTEIN_CODING).is_file());
        assert!(done_dir.join(TASK_JSON).is_file());
    }

    #[test]
    fn protein_coding_busca_en_tarea_y_luego_en_directorio() {
        let tmp = tempfile::tempdir().unwrap();
        let pc_dir = tmp.path().join("pc");
        fs::create_dir_all(&pc_dir).unwrap();
        let taskdir = tmp.path().join("submitted").join("1.1.1.1").join("t");
        fs::create_dir_all(&taskdir).unwrap();

        let snp = record(TaskKind::SnpAnalysis(SnpTaskParams {
            alpha: None,
            window: 10,
            protein_coding: "hg19".into(),
            snp_level_summary_col_label: None,
            source: NetworkSource::Ndex("n".into()),
        }));
        let task = FileBasedTask::new(&taskdir, snp);

        assert_eq!(task.protein_coding_file(None, ".txt"), None);
        assert_eq!(task.protein_coding_file(Some(pc_dir.as_path()), ".txt"), None);

        let shared = pc_dir.join("hg19.txt");
        File::create(&shared).unwrap();
        assert_eq!(task.protein_coding_file(Some(pc_dir.as_path()), ".txt"), Some(shared));

        let local = taskdir.join(PROTEIN_CODING);
        File::create(&local).unwrap();
        assert_eq!(task.protein_coding_file(Some(pc_dir.as_path()), ".txt"), Some(local));
    }
}

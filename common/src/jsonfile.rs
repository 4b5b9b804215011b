use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

fn temp_path_for(path: &Path) -> io::Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", path.display()),
        )
    })?;
    Ok(path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy())))
}

/// Escribe `value` como JSON en un temporal del mismo directorio y lo renombra
/// encima de `path`. Un lector concurrente ve el archivo viejo o el nuevo, nunca
/// uno a medias.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<()> {
    let tmp = temp_path_for(path)?;
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> io::Result<T> {
    let reader = BufReader::new(File::open(path)?);
    serde_json::from_reader(reader).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("error al parsear {}: {e}", path.display()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn escritura_atomica_no_deja_temporales() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("task.json");

        write_json_atomic(&path, &json!({"blah": "value"})).unwrap();
        write_json_atomic(&path, &json!({"blah": "otro"})).unwrap();

        let v: Value = read_json(&path).unwrap();
        assert_eq!(v, json!({"blah": "otro"}));

        let names: Vec<String> = fs::read_dir(tmp.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["task.json".to_string()]);
    }

    #[test]
    fn read_json_de_archivo_vacio_es_invalid_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("task.json");
        File::create(&path).unwrap();

        let err = read_json::<Value>(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}

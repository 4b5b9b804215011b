use axum::{
    extract::{multipart::Field, FromRequest, Multipart, Request},
    http::{header::CONTENT_TYPE, StatusCode},
    Form,
};
use nbgwas_common::{
    task::{DEFAULT_ALPHA, DEFAULT_PROTEIN_CODING, DEFAULT_WINDOW},
    NetworkSource, NetworkTaskParams, Payload, PayloadData, SnpTaskParams, SourceFields,
    SubmitError, TaskKind, NETWORK_DATA, PROTEIN_CODING, SNP_LEVEL_SUMMARY,
};
use std::{collections::HashMap, path::Path, str::FromStr};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/* ---------------- nombres de parámetros del formulario ---------------- */

pub const ALPHA_PARAM: &str = "alpha";
pub const SEEDS_PARAM: &str = "seeds";
pub const NETWORK_PARAM: &str = "network";
pub const NDEX_PARAM: &str = "ndex";
pub const COLUMN_PARAM: &str = "column";
pub const WINDOW_PARAM: &str = "window";
pub const PROTEIN_CODING_PARAM: &str = "protein_coding";
pub const PROTEIN_CODING_FILE_PARAM: &str = "protein_coding_file";
pub const SNP_LEVEL_SUMMARY_PARAM: &str = "snp_level_summary";
pub const COL_LABEL_PARAM: &str = "snp_level_summary_col_label";

/// Archivo subido, ya volcado a un temporal. El temporal se borra al soltar el
/// formulario; si la tarea se creó, ya fue movido a su directorio.
#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub path: TempPath,
}

impl UploadedFile {
    fn payload(&self, file_name: &'static str) -> Payload {
        Payload {
            file_name,
            data: PayloadData::Spooled(self.path.to_path_buf()),
        }
    }
}

/// Campos de texto y archivos de un POST, venga como multipart o urlencoded.
#[derive(Debug, Default)]
pub struct SubmitForm {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, UploadedFile>,
}

// Pedido mal formado es validación; cuerpo demasiado grande o cortado, interno
fn read_failure(status: StatusCode, message: String) -> SubmitError {
    if status.is_client_error() && status != StatusCode::PAYLOAD_TOO_LARGE {
        SubmitError::Validation(message)
    } else {
        SubmitError::Upload(message)
    }
}

// Vuelca el stream del campo a un temporal en `spool_dir`, de a un chunk
async fn spool_field(field: &mut Field<'_>, spool_dir: &Path) -> Result<TempPath, SubmitError> {
    let (file, path) = tempfile::Builder::new()
        .prefix("upload-")
        .tempfile_in(spool_dir)?
        .into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let mut written: u64 = 0;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| read_failure(e.status(), e.body_text()))?
    {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    debug!("archivo subido volcado a {} ({} bytes)", path.display(), written);
    Ok(path)
}

impl SubmitForm {
    /// Lee el cuerpo del pedido. Los archivos van a `spool_dir`, que debe estar
    /// en el mismo filesystem que las tareas para poder moverlos sin copiar.
    pub async fn from_request(request: Request, spool_dir: &Path) -> Result<Self, SubmitError> {
        let is_multipart = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("multipart/form-data"))
            .unwrap_or(false);

        let mut form = SubmitForm::default();

        if is_multipart {
            let mut multipart = Multipart::from_request(request, &())
                .await
                .map_err(|e| read_failure(e.status(), e.body_text()))?;
            tokio::fs::create_dir_all(spool_dir).await?;

            while let Some(mut field) = multipart
                .next_field()
                .await
                .map_err(|e| read_failure(e.status(), e.body_text()))?
            {
                let Some(name) = field.name().map(str::to_string) else {
                    continue;
                };
                match field.file_name().map(str::to_string) {
                    Some(file_name) => {
                        let path = spool_field(&mut field, spool_dir).await?;
                        form.files.insert(name, UploadedFile { file_name, path });
                    }
                    None => {
                        let text = field
                            .text()
                            .await
                            .map_err(|e| read_failure(e.status(), e.body_text()))?;
                        form.fields.insert(name, text);
                    }
                }
            }
        } else {
            let Form(fields) = Form::<HashMap<String, String>>::from_request(request, &())
                .await
                .map_err(|e| read_failure(e.status(), e.body_text()))?;
            form.fields = fields;
        }

        Ok(form)
    }

    /// Campo de texto no vacío
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn required(&self, name: &str) -> Result<String, SubmitError> {
        self.text(name)
            .ok_or_else(|| SubmitError::Validation(format!("missing required parameter {name}")))
    }

    fn parsed<T: FromStr>(&self, name: &str) -> Result<Option<T>, SubmitError> {
        self.text(name)
            .map(|raw| {
                raw.parse::<T>().map_err(|_| {
                    SubmitError::Validation(format!("invalid value for {name}: {raw}"))
                })
            })
            .transpose()
    }

    /// Origen de la red: exactamente uno de network (archivo), ndex o column.
    fn network_source(&self) -> Result<(NetworkSource, Vec<Payload>), SubmitError> {
        let upload = self.files.get(NETWORK_PARAM);
        let fields = SourceFields {
            network: upload.map(|u| {
                if u.file_name.is_empty() {
                    NETWORK_PARAM.to_string()
                } else {
                    u.file_name.clone()
                }
            }),
            ndex: self.text(NDEX_PARAM),
            column: self.text(COLUMN_PARAM),
        };
        let source = NetworkSource::try_from(fields).map_err(SubmitError::Validation)?;

        let payloads = upload
            .map(|u| u.payload(NETWORK_DATA))
            .into_iter()
            .collect();
        Ok((source, payloads))
    }

    /// Tarea de propagación desde semillas
    pub fn into_network_task(&self) -> Result<(TaskKind, Vec<Payload>), SubmitError> {
        let alpha = self.parsed::<f64>(ALPHA_PARAM)?.unwrap_or(DEFAULT_ALPHA);
        let seeds = self.required(SEEDS_PARAM)?;
        let (source, payloads) = self.network_source()?;

        let kind = TaskKind::NetworkPropagation(NetworkTaskParams {
            alpha,
            seeds,
            source,
        });
        Ok((kind, payloads))
    }

    /// Tarea a partir de un resumen de SNPs
    pub fn into_snp_task(&self) -> Result<(TaskKind, Vec<Payload>), SubmitError> {
        let alpha = self.parsed::<f64>(ALPHA_PARAM)?;
        let window = self.parsed::<u32>(WINDOW_PARAM)?.unwrap_or(DEFAULT_WINDOW);
        let protein_coding = self
            .text(PROTEIN_CODING_PARAM)
            .unwrap_or_else(|| DEFAULT_PROTEIN_CODING.to_string());
        let snp_level_summary_col_label = self.text(COL_LABEL_PARAM);

        let snp_file = self.files.get(SNP_LEVEL_SUMMARY_PARAM).ok_or_else(|| {
            SubmitError::Validation(format!("missing required file {SNP_LEVEL_SUMMARY_PARAM}"))
        })?;
        let (source, mut payloads) = self.network_source()?;

        payloads.push(snp_file.payload(SNP_LEVEL_SUMMARY));
        if let Some(pc) = self.files.get(PROTEIN_CODING_FILE_PARAM) {
            payloads.push(pc.payload(PROTEIN_CODING));
        }

        let kind = TaskKind::SnpAnalysis(SnpTaskParams {
            alpha,
            window,
            protein_coding,
            snp_level_summary_col_label,
            source,
        });
        Ok((kind, payloads))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn uploaded(file_name: &str, data: &[u8]) -> UploadedFile {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(data).unwrap();
        UploadedFile {
            file_name: file_name.to_string(),
            path: tmp.into_temp_path(),
        }
    }

    fn form(fields: &[(&str, &str)]) -> SubmitForm {
        SubmitForm {
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            files: HashMap::new(),
        }
    }

    #[test]
    fn network_task_con_ndex() {
        let (kind, payloads) = form(&[("alpha", "0.4"), ("seeds", "s1,s2"), ("ndex", "someid")])
            .into_network_task()
            .unwrap();
        assert!(payloads.is_empty());
        assert_eq!(
            kind,
            TaskKind::NetworkPropagation(NetworkTaskParams {
                alpha: 0.4,
                seeds: "s1,s2".into(),
                source: NetworkSource::Ndex("someid".into()),
            })
        );
    }

    #[test]
    fn alpha_por_defecto_y_campos_vacios_ignorados() {
        let (kind, _) = form(&[("seeds", "a"), ("column", "c"), ("ndex", "  ")])
            .into_network_task()
            .unwrap();
        assert_eq!(kind.alpha(), Some(DEFAULT_ALPHA));
        assert_eq!(kind.source(), &NetworkSource::Column("c".into()));
    }

    #[test]
    fn sin_origen_o_con_dos_es_validacion() {
        let err = form(&[("seeds", "a")]).into_network_task().unwrap_err();
        assert!(err.is_validation());

        let err = form(&[("seeds", "a"), ("ndex", "x"), ("column", "y")])
            .into_network_task()
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn alpha_no_numerico_es_validacion() {
        let err = form(&[("seeds", "a"), ("ndex", "x"), ("alpha", "mucho")])
            .into_network_task()
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn snp_task_arma_payloads() {
        let mut f = form(&[("ndex", "n"), ("window", "500"), ("protein_coding", "hg19")]);
        f.files.insert(
            SNP_LEVEL_SUMMARY_PARAM.to_string(),
            uploaded("snps.txt", b"snps"),
        );
        let (kind, payloads) = f.into_snp_task().unwrap();

        let TaskKind::SnpAnalysis(params) = kind else {
            panic!("se esperaba snp_analysis");
        };
        assert_eq!(params.window, 500);
        assert_eq!(params.protein_coding, "hg19");
        assert_eq!(params.alpha, None);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].file_name, SNP_LEVEL_SUMMARY);
        assert_eq!(
            payloads[0].data,
            PayloadData::Spooled(f.files[SNP_LEVEL_SUMMARY_PARAM].path.to_path_buf())
        );
    }

    #[test]
    fn network_subido_usa_el_nombre_del_archivo() {
        let mut f = form(&[("seeds", "a")]);
        f.files
            .insert(NETWORK_PARAM.to_string(), uploaded("red.tsv", b"A\tB\n"));
        let (kind, payloads) = f.into_network_task().unwrap();
        assert_eq!(kind.source(), &NetworkSource::Upload("red.tsv".into()));
        assert_eq!(payloads[0].file_name, NETWORK_DATA);
    }

    #[test]
    fn lectura_fallida_se_clasifica_por_status() {
        assert!(read_failure(StatusCode::BAD_REQUEST, "x".into()).is_validation());
        let err = read_failure(StatusCode::PAYLOAD_TOO_LARGE, "x".into());
        assert_eq!(err.kind(), "internal");
        assert!(!read_failure(StatusCode::INTERNAL_SERVER_ERROR, "x".into()).is_validation());
    }
}

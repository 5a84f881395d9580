use std::collections::HashMap;

use axum::extract::Multipart;
use bytes::Bytes;
use tracing::debug;

use crate::infra::errors::{AppError, AppResult};

/// A buffered multipart body: text fields by name, file parts in the order
/// they arrived.
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    files: Vec<(String, Bytes)>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if field.file_name().is_some() {
                let data = field.bytes().await?;
                debug!(field = %name, size = data.len(), "received file part");
                form.files.push((name, data));
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Every file part whose field name is one of `names`.
    pub fn take_files(&mut self, names: &[&str]) -> Vec<Bytes> {
        let (matching, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|(name, _)| names.contains(&name.as_str()));
        self.files = rest;
        matching.into_iter().map(|(_, data)| data).collect()
    }

    /// Exactly one file under `name`; 400 otherwise.
    pub fn take_single_file(&mut self, name: &str) -> AppResult<Bytes> {
        let mut files = self.take_files(&[name]);
        match files.len() {
            0 => Err(AppError::bad_request(format!("No file provided in field '{name}'"))),
            1 => Ok(files.remove(0)),
            n => Err(AppError::bad_request(format!(
                "Expected one file in field '{name}', got {n}"
            ))),
        }
    }
}

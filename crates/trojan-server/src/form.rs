//! Typed access to multipart form submissions.
//!
//! Listing forms mix text fields with image files. [`MultipartForm::read`]
//! drains the stream once; the accessors then turn raw strings into the
//! domain types, so handlers only ever see parsed ids, prices and categories.

use std::collections::HashMap;

use axum::extract::Multipart;
use bytes::Bytes;
use trojan_shared::Category;

use crate::error::ServerError;

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub data: Bytes,
}

#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: Vec<UploadedFile>,
}

impl MultipartForm {
    /// Read every part. Parts with a file name are files; the rest are text.
    /// A trailing `[]` on a field name is ignored.
    pub async fn read(mut multipart: Multipart, max_file_size: usize) -> Result<Self, ServerError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ServerError::Validation(format!("Multipart error: {e}")))?
        {
            let name = field
                .name()
                .unwrap_or("")
                .trim_end_matches("[]")
                .to_string();
            let file_name = field.file_name().map(str::to_string);

            match file_name {
                Some(file_name) => {
                    let data = field.bytes().await.map_err(|e| {
                        ServerError::Validation(format!("Failed to read field {name}: {e}"))
                    })?;
                    if data.len() > max_file_size {
                        return Err(ServerError::PayloadTooLarge {
                            size: data.len(),
                            max: max_file_size,
                        });
                    }
                    if !data.is_empty() {
                        form.files.push(UploadedFile {
                            field: name,
                            file_name,
                            data,
                        });
                    }
                }
                None => {
                    let text = field.text().await.map_err(|e| {
                        ServerError::Validation(format!("Failed to read field {name}: {e}"))
                    })?;
                    form.fields.insert(name, text);
                }
            }
        }

        Ok(form)
    }

    #[cfg(test)]
    pub fn from_parts(fields: &[(&str, &str)], files: Vec<UploadedFile>) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            files,
        }
    }

    /// Trimmed text value; blank counts as absent.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn require(&self, name: &str) -> Result<&str, ServerError> {
        self.text(name)
            .ok_or_else(|| ServerError::Validation(format!("{name} is required")))
    }

    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field == field)
    }

    pub fn files<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a UploadedFile> + 'a {
        self.files.iter().filter(move |f| f.field == field)
    }

    pub fn price(&self, name: &str) -> Result<Option<u32>, ServerError> {
        self.text(name).map(parse_price).transpose()
    }

    pub fn category(&self, name: &str) -> Result<Option<Category>, ServerError> {
        Ok(self.text(name).map(str::parse::<Category>).transpose()?)
    }

    pub fn flag(&self, name: &str) -> Result<Option<bool>, ServerError> {
        self.text(name).map(parse_bool).transpose()
    }

    /// A JSON array of strings, e.g. `imagesToRemove`.
    pub fn string_list(&self, name: &str) -> Result<Vec<String>, ServerError> {
        match self.text(name) {
            None => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(raw).map_err(|_| {
                ServerError::Validation(format!("{name} must be a JSON array of strings"))
            }),
        }
    }
}

/// Whole currency units. Accepts `"120"` and `"120.00"`, rejects fractions
/// and negatives.
pub fn parse_price(raw: &str) -> Result<u32, ServerError> {
    let raw = raw.trim().trim_start_matches('$');
    let invalid = || ServerError::Validation(format!("Invalid price: {raw:?}"));

    let whole = match raw.split_once('.') {
        Some((whole, cents)) if cents.chars().all(|c| c == '0') => whole,
        Some(_) => return Err(invalid()),
        None => raw,
    };
    whole.parse::<u32>().map_err(|_| invalid())
}

pub fn parse_bool(raw: &str) -> Result<bool, ServerError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ServerError::Validation(format!("Invalid boolean: {other:?}"))),
    }
}

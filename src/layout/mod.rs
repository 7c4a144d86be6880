use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::Date;

use crate::data::{DataKind, ResourceDescriptor};
use crate::{Error, Result};

pub const JSON_EXT: &str = ".json";
pub const BINARY_EXT: &str = ".dat";
pub const RECORD_EXT: &str = ".jsonl";

/// Storage area a persisted item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PersistenceDataType {
    IotData,
    Historian,
    Prediction,
    Text,
}

impl PersistenceDataType {
    pub fn sub_path(self) -> &'static str {
        match self {
            PersistenceDataType::IotData => "dataStore",
            PersistenceDataType::Historian => "historianCache",
            PersistenceDataType::Prediction => "predictionCache",
            PersistenceDataType::Text => "textCache",
        }
    }
}

impl fmt::Display for PersistenceDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sub_path())
    }
}

/// `{root}/{product}/{typeSubPath}/...`
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
    product: String,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>, product: impl Into<String>) -> Result<Self> {
        let product = product.into();
        validate_component("product", &product)?;
        Ok(Self {
            root: root.into(),
            product,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn product_dir(&self) -> PathBuf {
        self.root.join(&self.product)
    }

    pub fn type_dir(&self, data_type: PersistenceDataType) -> PathBuf {
        self.product_dir().join(data_type.sub_path())
    }

    /// Resolves `name` (with any storage extension stripped) to a file under
    /// the type directory. Resolving an already-resolved name is stable.
    pub fn item_path(
        &self,
        name: &str,
        data_type: PersistenceDataType,
        ext: &str,
    ) -> Result<PathBuf> {
        let name = normalize_cache_name(name)?;
        Ok(self.type_dir(data_type).join(format!("{name}{ext}")))
    }

    pub fn record_dir(&self, resource: &ResourceDescriptor) -> Result<PathBuf> {
        validate_component("device", &resource.device_id)?;
        let mut dir = self.type_dir(PersistenceDataType::IotData);
        if let Some(location) = &resource.location_id {
            validate_component("location", location)?;
            dir = dir.join(location);
        }
        Ok(dir.join(&resource.device_id))
    }

    pub fn record_path(
        &self,
        resource: &ResourceDescriptor,
        kind: DataKind,
        day: Date,
    ) -> Result<PathBuf> {
        Ok(self
            .record_dir(resource)?
            .join(record_file_name(kind, day)))
    }
}

/// Strips one trailing storage extension and validates what is left.
pub fn normalize_cache_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    let stem = trimmed
        .strip_suffix(JSON_EXT)
        .or_else(|| trimmed.strip_suffix(BINARY_EXT))
        .unwrap_or(trimmed);
    if validate_component("cache_name", stem).is_err() {
        return Err(Error::InvalidCacheName(name.to_string()));
    }
    Ok(stem.to_string())
}

pub fn record_file_name(kind: DataKind, day: Date) -> String {
    let day = day
        .format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default();
    format!("{}_{day}{RECORD_EXT}", kind.as_str())
}

/// Day of a `{Kind}_{YYYY-MM-DD}.jsonl` file name, when it belongs to `kind`.
pub fn parse_record_file_name(kind: DataKind, file_name: &str) -> Option<Date> {
    let day = file_name
        .strip_prefix(kind.as_str())?
        .strip_prefix('_')?
        .strip_suffix(RECORD_EXT)?;
    Date::parse(day, format_description!("[year]-[month]-[day]")).ok()
}

fn validate_component(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains('/')
        || value.contains('\\')
        || value.contains('\0')
    {
        return Err(Error::InvalidComponent {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

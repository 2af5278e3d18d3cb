//! Static catalog of scan categories.

use std::{collections::HashSet, fs, path::Path};

use serde::Deserialize;
use shared::domain::{CategoryId, ScanCategory};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog has no categories")]
    Empty,
    #[error("duplicate category id '{0}'")]
    DuplicateId(CategoryId),
    #[error("category '{0}' accepts no file formats")]
    NoFormats(CategoryId),
    #[error("category '{id}' has non-positive processing duration {secs}")]
    InvalidDuration { id: CategoryId, secs: f64 },
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read catalog '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    categories: Vec<ScanCategory>,
}

/// Read-only after construction.
#[derive(Debug, Clone)]
pub struct Catalog {
    categories: Vec<ScanCategory>,
}

impl Catalog {
    pub fn new(categories: Vec<ScanCategory>) -> Result<Self, CatalogError> {
        if categories.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut seen = HashSet::new();
        for category in &categories {
            if !seen.insert(category.id.clone()) {
                return Err(CatalogError::DuplicateId(category.id.clone()));
            }
            if category.accepted_formats.is_empty() {
                return Err(CatalogError::NoFormats(category.id.clone()));
            }
            if !(category.processing_secs.is_finite() && category.processing_secs > 0.0) {
                return Err(CatalogError::InvalidDuration {
                    id: category.id.clone(),
                    secs: category.processing_secs,
                });
            }
        }
        Ok(Self { categories })
    }

    pub fn builtin() -> Self {
        Self {
            categories: vec![
                builtin_category(
                    "kidney-stone",
                    "Kidney Stone Detection",
                    3.0,
                    "Locates calculi in renal CT or ultrasound slices and estimates their size.",
                ),
                builtin_category(
                    "lung-nodule",
                    "Lung Nodule Screening",
                    5.0,
                    "Flags pulmonary nodules on chest CT or X-ray images.",
                ),
                builtin_category(
                    "brain-tumor",
                    "Brain Tumor Analysis",
                    4.0,
                    "Highlights suspected mass lesions on brain MRI slices.",
                ),
                builtin_category(
                    "bone-fracture",
                    "Bone Fracture Detection",
                    2.0,
                    "Detects cortical breaks on skeletal X-ray images.",
                ),
            ],
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(raw)?;
        Self::new(file.categories)
    }

    pub fn load_file(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn get(&self, id: &CategoryId) -> Option<&ScanCategory> {
        self.categories.iter().find(|c| &c.id == id)
    }

    pub fn categories(&self) -> &[ScanCategory] {
        &self.categories
    }
}

fn builtin_category(id: &str, name: &str, processing_secs: f64, description: &str) -> ScanCategory {
    ScanCategory {
        id: CategoryId::new(id),
        name: name.to_string(),
        accepted_formats: vec!["image/jpeg".to_string(), "image/png".to_string()],
        processing_secs,
        description: description.to_string(),
    }
}

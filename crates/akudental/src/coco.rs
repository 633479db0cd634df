//! Raw COCO records as they appear in the annotation file.
//!
//! The records are deliberately loose; [crate::dataset::Dataset]
//! turns them into checked entities.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchemaError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RawImage {
    pub(crate) id: u64,
    pub(crate) file_name: String,
    pub(crate) width: u32,
    pub(crate) height: u32,

    /// The cross-validation fold (1-based), if the file carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) fold: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum Segmentation {
    Polygons(Vec<Vec<f64>>),
    Rle(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RawAnnotation {
    pub(crate) id: u64,
    pub(crate) image_id: u64,
    pub(crate) category_id: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) segmentation: Option<Segmentation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) bbox: Option<Vec<f64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) area: Option<f64>,

    #[serde(default)]
    pub(crate) iscrowd: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RawCategory {
    pub(crate) id: u64,
    pub(crate) name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) supercategory: Option<String>,
}

/// The three record sections of a COCO document.
#[derive(Debug, Default)]
pub(crate) struct RawDocument {
    pub(crate) images: Vec<RawImage>,
    pub(crate) annotations: Vec<RawAnnotation>,
    pub(crate) categories: Vec<RawCategory>,
}

impl RawDocument {
    pub(crate) const IMAGES: &'static str = "images";
    pub(crate) const ANNOTATIONS: &'static str = "annotations";
    pub(crate) const CATEGORIES: &'static str = "categories";

    /// Splits a parsed JSON value into its record sections. Unknown
    /// top-level keys (`info`, `licenses`, ...) are ignored.
    pub(crate) fn from_value(value: Value) -> Result<Self, SchemaError> {
        let Value::Object(mut root) = value else {
            return Err(SchemaError::NotAnObject);
        };

        let mut section =
            |key: &'static str| -> Result<Vec<Value>, SchemaError> {
                match root.remove(key) {
                    None => Err(SchemaError::MissingKey(key)),
                    Some(Value::Array(values)) => Ok(values),
                    Some(_) => Err(SchemaError::NotAnArray(key)),
                }
            };

        let images = section(Self::IMAGES)?;
        let annotations = section(Self::ANNOTATIONS)?;
        let categories = section(Self::CATEGORIES)?;

        Ok(Self {
            images: records(Self::IMAGES, images)?,
            annotations: records(Self::ANNOTATIONS, annotations)?,
            categories: records(Self::CATEGORIES, categories)?,
        })
    }
}

fn records<T>(
    section: &'static str,
    values: Vec<Value>,
) -> Result<Vec<T>, SchemaError>
where
    T: for<'de> Deserialize<'de>,
{
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            serde_json::from_value(value).map_err(|e| {
                SchemaError::Malformed {
                    section,
                    index,
                    message: e.to_string(),
                }
            })
        })
        .collect()
}

pub(crate) type DatasetResult<T> = Result<T, DatasetError>;

macro_rules! bail {
    ($($arg:tt)*) => {{
        return Err(DatasetError::Other(format!($($arg)*)));
    }};
}

pub(crate) use bail;

#[derive(Debug, thiserror::Error)]
pub(crate) enum DatasetError {
    #[error(transparent)]
    IO(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("{0}")]
    Other(String),
}

impl DatasetError {
    #[inline]
    pub(crate) fn other<T: ToString>(s: T) -> Self {
        Self::Other(s.to_string())
    }
}

/// Fatal errors raised while loading an annotation file.
#[derive(Debug, PartialEq, thiserror::Error)]
pub(crate) enum SchemaError {
    #[error("document root must be an object")]
    NotAnObject,

    #[error("missing top-level key `{0}`")]
    MissingKey(&'static str),

    #[error("top-level key `{0}` must be an array")]
    NotAnArray(&'static str),

    #[error("malformed {section} record at index {index}: {message}")]
    Malformed {
        section: &'static str,
        index: usize,
        message: String,
    },

    #[error("duplicate {section} id {id}")]
    DuplicateId { section: &'static str, id: u64 },

    #[error("category {id} ('{name}') is not part of the vocabulary")]
    UnknownCategory { id: u64, name: String },

    #[error(
        "annotation {annotation} references undeclared category {category}"
    )]
    UndeclaredCategory { annotation: u64, category: u64 },

    #[error("annotation {0} has neither a polygon nor a bounding box")]
    MissingGeometry(u64),

    #[error("annotation {annotation}: invalid geometry ({message})")]
    InvalidGeometry { annotation: u64, message: String },

    #[error("invalid fold assignment: {0}")]
    Fold(String),
}

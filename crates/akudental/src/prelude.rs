pub(crate) use crate::config::{Config, Runtime};
pub(crate) use crate::dataset::Dataset;
pub(crate) use crate::error::{bail, DatasetError, DatasetResult};
pub(crate) use crate::project::{Project, Source, SourceArgs};

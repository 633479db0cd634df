pub(crate) use completions::Completions;
pub(crate) use config::Config;
pub(crate) use export::Export;
pub(crate) use init::Init;
pub(crate) use summary::Summary;
pub(crate) use validate::Validate;

mod completions;
mod config;
mod export;
mod init;
mod summary;
mod validate;

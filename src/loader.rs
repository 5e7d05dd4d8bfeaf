use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use log::debug;
use thiserror::Error;

use crate::{band::DataSet, ctx::ExtractionContext, preprocess::PreparedQuery, value::Row};

/// Loaders that read rows out of the report parameters or the definition itself.
mod builtin;

/// Loader delegating to an external SQL executor.
mod sql;

pub use builtin::{ParameterLoader, StaticLoader};
pub use sql::{SqlExecutor, SqlLoader};

pub const SQL_LOADER: &str = "sql";
pub const PARAMETER_LOADER: &str = "parameter";
pub const STATIC_LOADER: &str = "static";

/// Source of rows for a data set.
pub trait DataLoader: Send + Sync {
    /// Load rows of `data_set`. The query has already been through the preprocessor
    /// registered for the data set's loader type.
    fn load(
        &self,
        data_set: &DataSet,
        query: &PreparedQuery,
        ctx: &ExtractionContext,
    ) -> Result<Vec<Row>, LoadError>;
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("No data loader registered for type `{0}`")]
    UnknownLoader(String),

    #[error("Parameter `{name}` holds a list with a {kind} item, expected rows")]
    NotARow { name: String, kind: &'static str },

    #[error("Query execution failed: {0}")]
    Query(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Loaders keyed by type. Unlike preprocessors there is no fallback, an unknown type
/// is an error.
pub struct LoaderFactory {
    loaders: RwLock<HashMap<String, Arc<dyn DataLoader>>>,
}

impl LoaderFactory {
    pub fn empty() -> Self {
        Self {
            loaders: RwLock::new(HashMap::new()),
        }
    }

    /// Register the `sql` loader backed by the given executor.
    pub fn with_sql(self, executor: Arc<dyn SqlExecutor>) -> Self {
        self.register(SQL_LOADER, Arc::new(SqlLoader::new(executor)));
        self
    }

    /// Register a loader, replacing any previous one for the same type.
    pub fn register(&self, loader_type: impl Into<String>, loader: Arc<dyn DataLoader>) {
        let loader_type = loader_type.into();
        debug!("Registering data loader for `{loader_type}`");
        self.loaders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(loader_type, loader);
    }

    pub fn loader_by(&self, loader_type: &str) -> Result<Arc<dyn DataLoader>, LoadError> {
        self.loaders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(loader_type)
            .cloned()
            .ok_or_else(|| LoadError::UnknownLoader(loader_type.to_owned()))
    }
}

impl Default for LoaderFactory {
    /// `parameter` and `static` loaders. `sql` needs an executor, see [LoaderFactory::with_sql].
    fn default() -> Self {
        let factory = Self::empty();
        factory.register(PARAMETER_LOADER, Arc::new(ParameterLoader));
        factory.register(STATIC_LOADER, Arc::new(StaticLoader));
        factory
    }
}

impl std::fmt::Debug for LoaderFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.loaders.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<_> = registry.keys().collect();
        keys.sort();
        f.debug_struct("LoaderFactory")
            .field("registered", &keys)
            .finish()
    }
}

use std::sync::Arc;

use log::debug;

use super::*;

/// Database access, provided by the application. The query text uses `?` positional
/// markers bound to [PreparedQuery::values] in order.
pub trait SqlExecutor: Send + Sync {
    fn execute(
        &self,
        query: &PreparedQuery,
    ) -> Result<Vec<Row>, Box<dyn std::error::Error + Send + Sync>>;
}

pub struct SqlLoader {
    executor: Arc<dyn SqlExecutor>,
}

impl SqlLoader {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self { executor }
    }
}

impl DataLoader for SqlLoader {
    fn load(
        &self,
        data_set: &DataSet,
        query: &PreparedQuery,
        _: &ExtractionContext,
    ) -> Result<Vec<Row>, LoadError> {
        debug!(
            "Running SQL of `{}` with {} bound values",
            data_set.name,
            query.values.len()
        );
        self.executor.execute(query).map_err(LoadError::Query)
    }
}

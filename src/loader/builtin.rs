use log::trace;

use super::*;
use crate::value::Value;

/// Rows taken from a report parameter named by the data set query.
///
/// A list of maps gives one row per map, a single map gives one row, any other value
/// gives one row holding it under the parameter name. An unset or null parameter
/// gives no rows.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParameterLoader;

impl DataLoader for ParameterLoader {
    fn load(
        &self,
        data_set: &DataSet,
        _: &PreparedQuery,
        ctx: &ExtractionContext,
    ) -> Result<Vec<Row>, LoadError> {
        let name = data_set.query.trim();
        trace!("Loading rows of `{}` from parameter `{name}`", data_set.name);

        match ctx.params().get(name) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::List(items)) => items
                .iter()
                .map(|item| match item {
                    Value::Map(row) => Ok(row.clone()),
                    other => Err(LoadError::NotARow {
                        name: name.to_owned(),
                        kind: other.kind(),
                    }),
                })
                .collect(),
            Some(Value::Map(row)) => Ok(vec![row.clone()]),
            Some(other) => {
                let mut row = Row::new();
                row.insert(name.to_owned(), other.clone());
                Ok(vec![row])
            }
        }
    }
}

/// Rows written inline in the data set definition.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticLoader;

impl DataLoader for StaticLoader {
    fn load(
        &self,
        data_set: &DataSet,
        _: &PreparedQuery,
        _: &ExtractionContext,
    ) -> Result<Vec<Row>, LoadError> {
        Ok(data_set.rows.clone())
    }
}

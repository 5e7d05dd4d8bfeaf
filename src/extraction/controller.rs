use log::debug;

use super::*;

/// Runs the data sets of the band through their loaders.
///
/// The first data set gives the rows. Each further data set is merged in: with a
/// `link` field its rows are joined into the rows having the same value of that field,
/// without one its rows are appended.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultExtractionController;

impl ExtractionController for DefaultExtractionController {
    fn extract_data(
        &self,
        extractor: &DataExtractor,
        ctx: &ExtractionContext,
    ) -> Result<Vec<Row>, ExtractionError> {
        let mut rows: Option<Vec<Row>> = None;
        for data_set in &ctx.band().data_sets {
            let loaded = extractor.load_data_set(data_set, ctx)?;
            rows = Some(match rows {
                None => loaded,
                Some(existing) => match data_set.link.as_deref() {
                    Some(link) => join_on(existing, &loaded, link),
                    None => {
                        debug!(
                            "Appending {} rows of `{}` to band `{}`",
                            loaded.len(),
                            data_set.name,
                            ctx.band().name
                        );
                        let mut existing = existing;
                        existing.extend(loaded);
                        existing
                    }
                },
            });
        }
        Ok(rows.unwrap_or_default())
    }
}

/// Join `other` into `rows` by equal values of `link`. Fields already present in a row
/// are kept. Rows of `other` without a partner are dropped.
pub(crate) fn join_on(mut rows: Vec<Row>, other: &[Row], link: &str) -> Vec<Row> {
    for row in &mut rows {
        let Some(key) = row.get(link).cloned() else {
            continue;
        };
        if let Some(partner) = other.iter().find(|o| o.get(link) == Some(&key)) {
            for (field, value) in partner {
                row.entry(field.clone()).or_insert_with(|| value.clone());
            }
        }
    }
    rows
}

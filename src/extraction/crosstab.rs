use log::{debug, warn};

use super::*;
use crate::band::{BandData, BandOrientation, CROSSTAB_HEADER_SUFFIX, CROSSTAB_MASTER_SUFFIX};

/// Extraction of a crosstab band `X`.
///
/// `X` must have the child bands `X_dynamic_header` (columns) and `X_master_data`
/// (rows). The result is a single band data `X`, holding the header rows and the
/// master rows. Under every master row there is exactly one cell named `X` per header
/// row, in header order. A cell is the first row of `X`'s own data sets run with the
/// params extended by both the master and the header row, or an empty row.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrosstabExtractionController;

impl ExtractionController for CrosstabExtractionController {
    fn extract(
        &self,
        extractor: &DataExtractor,
        ctx: &ExtractionContext,
        tree: &mut BandTree,
    ) -> Result<Vec<BandDataId>, ExtractionError> {
        check_depth(extractor, ctx)?;

        let band = ctx.band();
        let header_def = crosstab_child(ctx, CROSSTAB_HEADER_SUFFIX)?;
        let master_def = crosstab_child(ctx, CROSSTAB_MASTER_SUFFIX)?;
        for other in band.children() {
            if other.name != header_def.name && other.name != master_def.name {
                warn!(
                    "Crosstab band `{}` ignores child band `{}`",
                    band.name, other.name
                );
            }
        }

        let data = Arc::new(Row::new());
        let id = tree.push(&band.name, BandOrientation::Crosstab, ctx.parent().id(), Arc::clone(&data));
        let inner = ctx.with_parent_data(ParentData::from_parts(id, &band.name, data, ctx.depth()));

        let controllers = extractor.controllers();
        let headers = controllers
            .controller_by(header_def.orientation)
            .extract(extractor, &inner.with_band(header_def), tree)?;
        let masters = controllers
            .controller_by(master_def.orientation)
            .extract(extractor, &inner.with_band(master_def), tree)?;

        let header_rows: Vec<Arc<Row>> = headers
            .iter()
            .filter_map(|h| tree.get(*h).map(BandData::shared_data))
            .collect();
        debug!(
            "Crosstab `{}`: {} master rows, {} header rows",
            band.name,
            masters.len(),
            header_rows.len()
        );

        let cell_depth = ctx.depth() + 2;
        let limit = extractor.config().max_depth;
        if cell_depth > limit {
            return Err(ExtractionError::TooDeep {
                band: band.name.to_string(),
                limit,
            });
        }
        for master in masters {
            let Some(master_data) = tree.get(master).map(BandData::shared_data) else {
                continue;
            };
            let master_ctx = inner
                .extend_params(&master_def.name, &master_data)
                .with_parent_data(ParentData::from_parts(
                    master,
                    &master_def.name,
                    Arc::clone(&master_data),
                    cell_depth - 1,
                ));

            for header in &header_rows {
                let cell_ctx = master_ctx.extend_params(&header_def.name, header);
                let mut rows = DefaultExtractionController.extract_data(extractor, &cell_ctx)?;
                if rows.len() > 1 {
                    debug!(
                        "Crosstab `{}` cell query gave {} rows, keeping the first",
                        band.name,
                        rows.len()
                    );
                }
                let cell = if rows.is_empty() {
                    Row::new()
                } else {
                    rows.swap_remove(0)
                };
                tree.push(&band.name, BandOrientation::Crosstab, master, Arc::new(cell));
            }
        }

        Ok(vec![id])
    }
}

fn crosstab_child<'def>(
    ctx: &ExtractionContext<'def>,
    suffix: &str,
) -> Result<&'def crate::band::ReportBand, ExtractionError> {
    let band = ctx.band();
    let name = format!("{}{suffix}", band.name);
    band.child(&name)
        .ok_or_else(|| ExtractionError::CrosstabChildMissing {
            band: band.name.to_string(),
            missing: name,
        })
}

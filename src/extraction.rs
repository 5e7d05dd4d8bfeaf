use std::sync::Arc;

use log::trace;
use thiserror::Error;

use crate::{
    band::{BandDataId, BandTree},
    ctx::{ExtractionContext, ParentData},
    extractor::DataExtractor,
    loader::LoadError,
    preprocess::PreprocessError,
    value::Row,
};

/// Default traversal and data set merging.
mod controller;

/// Traversal of crosstab bands.
mod crosstab;

/// Controllers keyed by band orientation.
mod factory;

pub use controller::DefaultExtractionController;
pub use crosstab::CrosstabExtractionController;
pub use factory::ExtractionControllerFactory;

/// Strategy for turning one band definition into band data.
pub trait ExtractionController: Send + Sync {
    /// Extract the rows of `ctx.band()` and, for each row, the rows of every child band.
    /// New band data hangs under `ctx.parent()`. Returns the ids of the band data created
    /// for `ctx.band()` itself, in order.
    fn extract(
        &self,
        extractor: &DataExtractor,
        ctx: &ExtractionContext,
        tree: &mut BandTree,
    ) -> Result<Vec<BandDataId>, ExtractionError> {
        check_depth(extractor, ctx)?;

        let band = ctx.band();
        let rows = self.extract_data(extractor, ctx)?;
        trace!("Band `{}` gave {} rows", band.name, rows.len());

        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let data = Arc::new(row);
            let id = tree.push(&band.name, band.orientation, ctx.parent().id(), Arc::clone(&data));
            let parent = ParentData::from_parts(id, &band.name, data, ctx.depth());
            extract_children(extractor, ctx, parent, tree)?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Rows of `ctx.band()`. Controllers that do not load anything produce no rows.
    fn extract_data(
        &self,
        _extractor: &DataExtractor,
        _ctx: &ExtractionContext,
    ) -> Result<Vec<Row>, ExtractionError> {
        Ok(Vec::new())
    }
}

/// Extract every child band of `ctx.band()` below `parent`, with the params extended by
/// the parent's row. Each child goes through the controller of its own orientation.
pub fn extract_children(
    extractor: &DataExtractor,
    ctx: &ExtractionContext,
    parent: ParentData,
    tree: &mut BandTree,
) -> Result<(), ExtractionError> {
    let band = ctx.band();
    if band.children().is_empty() {
        return Ok(());
    }

    let child_ctx = ctx
        .extend_params(&band.name, parent.data())
        .with_parent_data(parent);
    for child in band.children() {
        extractor
            .controllers()
            .controller_by(child.orientation)
            .extract(extractor, &child_ctx.with_band(child), tree)?;
    }
    Ok(())
}

fn check_depth(extractor: &DataExtractor, ctx: &ExtractionContext) -> Result<(), ExtractionError> {
    let limit = extractor.config().max_depth;
    if ctx.depth() > limit {
        return Err(ExtractionError::TooDeep {
            band: ctx.band().name.to_string(),
            limit,
        });
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Band `{band}`, data set `{data_set}`: {source}")]
    Load {
        band: String,
        data_set: String,
        source: LoadError,
    },

    #[error("Band `{band}`, data set `{data_set}`: {source}")]
    Preprocess {
        band: String,
        data_set: String,
        source: PreprocessError,
    },

    #[error("Crosstab band `{band}` has no child band `{missing}`")]
    CrosstabChildMissing { band: String, missing: String },

    #[error("Band `{band}` is nested deeper than the limit of {limit}")]
    TooDeep { band: String, limit: usize },

    #[error("Required parameters are not set: {}", .0.join(", "))]
    MissingParameters(Vec<String>),
}

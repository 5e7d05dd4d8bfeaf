use std::sync::Arc;

use crate::{
    band::{BandData, BandDataId, ReportBand, ROOT_BAND_NAME},
    value::{Params, Row, Value},
};

/// Band data that produced the parameters of a context, as seen by its children.
#[derive(Debug, Clone)]
pub struct ParentData {
    id: BandDataId,
    name: Arc<str>,
    data: Arc<Row>,
    depth: usize,
}

impl ParentData {
    /// Parent of the first-level bands.
    pub fn root(params: Arc<Params>) -> Self {
        Self {
            id: BandDataId::ROOT,
            name: Arc::from(ROOT_BAND_NAME),
            data: params,
            depth: 0,
        }
    }

    /// Wrap an extracted band data. `depth` is its distance from the root.
    pub fn new(band_data: &BandData, depth: usize) -> Self {
        Self {
            id: band_data.id(),
            name: Arc::from(band_data.name()),
            data: band_data.shared_data(),
            depth,
        }
    }

    pub(crate) fn from_parts(id: BandDataId, name: &str, data: Arc<Row>, depth: usize) -> Self {
        Self {
            id,
            name: Arc::from(name),
            data,
            depth,
        }
    }

    pub fn id(&self) -> BandDataId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &Row {
        &self.data
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Everything a controller needs to extract one band: the band definition, the band
/// data its rows will hang from, and the parameters visible at this level.
///
/// Contexts are never modified. Every derivation returns a new context sharing the
/// unchanged parts.
#[derive(Debug, Clone)]
pub struct ExtractionContext<'def> {
    band: &'def ReportBand,
    parent: ParentData,
    params: Arc<Params>,
}

impl<'def> ExtractionContext<'def> {
    /// Context of a first-level band. The root band data carries the same parameters.
    pub fn new(band: &'def ReportBand, params: Arc<Params>) -> Self {
        Self {
            band,
            parent: ParentData::root(Arc::clone(&params)),
            params,
        }
    }

    pub fn band(&self) -> &'def ReportBand {
        self.band
    }

    pub fn parent(&self) -> &ParentData {
        &self.parent
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Depth the rows extracted with this context will have in the band tree.
    pub fn depth(&self) -> usize {
        self.parent.depth + 1
    }

    /// Copy of this context whose params also hold every field of `row` under the
    /// qualified key `<band_name>.<field>`.
    pub fn extend_params(&self, band_name: &str, row: &Row) -> Self {
        let mut params = (*self.params).clone();
        for (field, value) in row {
            params.insert(qualified_key(band_name, field), value.clone());
        }
        self.with_params(params)
    }

    pub fn with_params(&self, params: Params) -> Self {
        Self {
            band: self.band,
            parent: self.parent.clone(),
            params: Arc::new(params),
        }
    }

    pub fn with_band(&self, band: &'def ReportBand) -> Self {
        Self {
            band,
            parent: self.parent.clone(),
            params: Arc::clone(&self.params),
        }
    }

    pub fn with_parent_data(&self, parent: ParentData) -> Self {
        Self {
            band: self.band,
            parent,
            params: Arc::clone(&self.params),
        }
    }

    /// Look a name up in the params, then, for bare names, in the parent row.
    pub fn resolve(&self, name: &str) -> Option<&Value> {
        self.params.get(name).or_else(|| {
            if name.contains('.') {
                None
            } else {
                self.parent.data.get(name)
            }
        })
    }
}

pub fn qualified_key(band_name: &str, field: &str) -> String {
    format!("{band_name}.{field}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{band::BandOrientation, row};

    fn band(name: &str) -> ReportBand {
        ReportBand::new(name.try_into().unwrap(), BandOrientation::Horizontal)
    }

    #[test]
    fn extend_params_does_not_touch_original() {
        let orders = band("Orders");
        let ctx = ExtractionContext::new(&orders, Arc::new(row! { "year" => 2024i64 }));
        let extended = ctx.extend_params("Orders", &row! { "id" => 7i64 });

        assert_eq!(ctx.params().len(), 1);
        assert_eq!(extended.params().len(), 2);
        assert_eq!(extended.params()["Orders.id"], Value::Integer(7));
        assert_eq!(extended.params()["year"], Value::Integer(2024));
    }

    #[test]
    fn derivations_replace_one_part() {
        let orders = band("Orders");
        let lines = band("Lines");
        let ctx = ExtractionContext::new(&orders, Arc::new(row! { "a" => 1i64 }));

        let moved = ctx.with_band(&lines);
        assert_eq!(moved.band().name, "Lines");
        assert_eq!(ctx.band().name, "Orders");
        assert_eq!(moved.params(), ctx.params());

        let replaced = ctx.with_params(row! { "b" => 2i64 });
        assert!(replaced.params().get("a").is_none());
        assert!(ctx.params().get("b").is_none());
        assert_eq!(ctx.parent().name(), ROOT_BAND_NAME);
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn resolve_falls_back_to_parent_row() {
        let mut tree = crate::band::BandTree::new(Row::new());
        let id = tree.push(
            "Orders",
            BandOrientation::Horizontal,
            BandDataId::ROOT,
            Arc::new(row! { "id" => 3i64 }),
        );
        let parent = ParentData::new(tree.get(id).unwrap(), 1);

        let lines = band("Lines");
        let ctx = ExtractionContext::new(&lines, Arc::new(row! { "limit" => 5i64 }))
            .with_parent_data(parent);

        assert_eq!(ctx.depth(), 2);
        assert_eq!(ctx.parent().id(), id);
        assert_eq!(ctx.resolve("limit"), Some(&Value::Integer(5)));
        assert_eq!(ctx.resolve("id"), Some(&Value::Integer(3)));
        assert_eq!(ctx.resolve("Orders.id"), None);
    }
}

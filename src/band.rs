use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{
    name::ItemName,
    value::{Row, Value},
};

/// Name of the band data created for the report parameters, at the top of every tree.
pub const ROOT_BAND_NAME: &str = "Root";

/// Suffix of the crosstab child band that provides the column headers.
pub const CROSSTAB_HEADER_SUFFIX: &str = "_dynamic_header";

/// Suffix of the crosstab child band that provides the rows.
pub const CROSSTAB_MASTER_SUFFIX: &str = "_master_data";

/// How the rows of a band expand in the output document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandOrientation {
    #[default]
    Horizontal,
    Vertical,
    /// Rows are produced for every pair of a master row and a header row.
    Crosstab,
    Undefined,
}

impl std::fmt::Display for BandOrientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BandOrientation::Horizontal => "horizontal",
            BandOrientation::Vertical => "vertical",
            BandOrientation::Crosstab => "crosstab",
            BandOrientation::Undefined => "undefined",
        };
        f.write_str(s)
    }
}

/// Band of a report template. Bands form a tree, the first level of which hangs
/// off the implicit root band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportBand {
    pub name: ItemName,

    #[serde(default)]
    pub orientation: BandOrientation,

    /// Data sets are run in order. The first one gives the rows, the rest are merged in.
    #[serde(default)]
    pub data_sets: Vec<DataSet>,

    #[serde(default)]
    pub bands: Vec<ReportBand>,
}

impl ReportBand {
    pub fn new(name: ItemName, orientation: BandOrientation) -> Self {
        Self {
            name,
            orientation,
            data_sets: Vec::new(),
            bands: Vec::new(),
        }
    }

    pub fn with_data_set(mut self, data_set: DataSet) -> Self {
        self.data_sets.push(data_set);
        self
    }

    pub fn with_child(mut self, band: ReportBand) -> Self {
        self.bands.push(band);
        self
    }

    pub fn children(&self) -> &[ReportBand] {
        &self.bands
    }

    pub fn child(&self, name: &str) -> Option<&ReportBand> {
        self.bands.iter().find(|band| band.name == name)
    }
}

/// Query of a band, run by the loader registered for its type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSet {
    pub name: ItemName,

    /// Loader type, such as `sql`, `parameter` or `static`.
    #[serde(rename = "type")]
    pub loader: String,

    #[serde(default)]
    pub query: String,

    /// Field by which rows of this data set are joined into the rows of the first
    /// data set of the band.
    #[serde(default)]
    pub link: Option<String>,

    /// Inline rows for the `static` loader.
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl DataSet {
    pub fn new(name: ItemName, loader: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name,
            loader: loader.into(),
            query: query.into(),
            link: None,
            rows: Vec::new(),
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }
}

/// Index of a [BandData] inside its [BandTree].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BandDataId(usize);

impl BandDataId {
    pub const ROOT: Self = Self(0);

    pub fn index(&self) -> usize {
        self.0
    }
}

/// One row of a band, materialized.
#[derive(Debug, Clone)]
pub struct BandData {
    id: BandDataId,
    name: String,
    orientation: BandOrientation,
    parent: Option<BandDataId>,
    data: Arc<Row>,
    children: SmallVec<[BandDataId; 4]>,
}

impl BandData {
    pub fn id(&self) -> BandDataId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn orientation(&self) -> BandOrientation {
        self.orientation
    }

    /// Band data that provided the parameters this row was extracted with.
    /// `None` only for the root.
    pub fn parent_id(&self) -> Option<BandDataId> {
        self.parent
    }

    pub fn data(&self) -> &Row {
        &self.data
    }

    pub fn shared_data(&self) -> Arc<Row> {
        Arc::clone(&self.data)
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    pub fn child_ids(&self) -> &[BandDataId] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Arena holding the extracted band data of one report run. Node 0 is the root,
/// whose row holds the report parameters.
#[derive(Debug, Clone)]
pub struct BandTree {
    nodes: Vec<BandData>,
}

impl BandTree {
    pub fn new(params: Row) -> Self {
        let root = BandData {
            id: BandDataId::ROOT,
            name: ROOT_BAND_NAME.to_owned(),
            orientation: BandOrientation::Horizontal,
            parent: None,
            data: Arc::new(params),
            children: SmallVec::new(),
        };
        Self { nodes: vec![root] }
    }

    /// Append a band data under the given parent. A parent id that does not belong to
    /// this tree leaves the node unattached.
    pub(crate) fn push(
        &mut self,
        name: &str,
        orientation: BandOrientation,
        parent: BandDataId,
        data: Arc<Row>,
    ) -> BandDataId {
        let id = BandDataId(self.nodes.len());
        self.nodes.push(BandData {
            id,
            name: name.to_owned(),
            orientation,
            parent: Some(parent),
            data,
            children: SmallVec::new(),
        });
        if let Some(parent) = self.nodes.get_mut(parent.0) {
            parent.children.push(id);
        }
        id
    }

    pub fn root(&self) -> &BandData {
        &self.nodes[0]
    }

    pub fn get(&self, id: BandDataId) -> Option<&BandData> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Tree always holds the root, so it is empty when nothing else was extracted.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn parent(&self, id: BandDataId) -> Option<&BandData> {
        self.get(id)?.parent.and_then(|p| self.get(p))
    }

    pub fn children(&self, id: BandDataId) -> impl Iterator<Item = &BandData> + '_ {
        self.get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.get(*child))
    }

    pub fn children_by_name<'a>(
        &'a self,
        id: BandDataId,
        name: &'a str,
    ) -> impl Iterator<Item = &'a BandData> + 'a {
        self.children(id).filter(move |child| child.name == name)
    }

    pub fn first_child_by_name(&self, id: BandDataId, name: &str) -> Option<&BandData> {
        self.children(id).find(|child| child.name == name)
    }

    /// Depth-first, pre-order search below `id` (excluding `id` itself).
    pub fn find_band_recursively(&self, id: BandDataId, name: &str) -> Option<&BandData> {
        let mut stack: Vec<BandDataId> = self.get(id)?.children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            let node = self.get(next)?;
            if node.name == name {
                return Some(node);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }

    /// Visit every band data, root first, in depth-first pre-order.
    pub fn visit(&self, mut visitor: impl FnMut(&BandData, usize)) {
        let mut stack = vec![(BandDataId::ROOT, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.get(id) else {
                continue;
            };
            visitor(node, depth);
            stack.extend(node.children.iter().rev().map(|c| (*c, depth + 1)));
        }
    }

    /// Owned nested representation of the tree, for handing over to a renderer or
    /// dumping as YAML.
    pub fn nested(&self) -> NestedBandData {
        self.nested_from(BandDataId::ROOT)
    }

    fn nested_from(&self, id: BandDataId) -> NestedBandData {
        let node = &self.nodes[id.0];
        NestedBandData {
            name: node.name.clone(),
            orientation: node.orientation,
            data: (*node.data).clone(),
            bands: node
                .children
                .iter()
                .map(|child| self.nested_from(*child))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedBandData {
    pub name: String,
    pub orientation: BandOrientation,
    pub data: Row,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bands: Vec<NestedBandData>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    fn tree() -> (BandTree, BandDataId, BandDataId, BandDataId) {
        let mut tree = BandTree::new(row! { "p" => 1i64 });
        let a = tree.push("A", BandOrientation::Horizontal, BandDataId::ROOT, Arc::new(row! { "i" => 1i64 }));
        let b = tree.push("B", BandOrientation::Vertical, a, Arc::new(row! { "j" => 2i64 }));
        let a2 = tree.push("A", BandOrientation::Horizontal, BandDataId::ROOT, Arc::new(row! { "i" => 2i64 }));
        (tree, a, b, a2)
    }

    #[test]
    fn root_holds_params() {
        let (tree, ..) = tree();
        assert_eq!(tree.root().name(), ROOT_BAND_NAME);
        assert!(tree.root().is_root());
        assert_eq!(tree.root().field("p"), Some(&Value::Integer(1)));
        assert_eq!(tree.len(), 4);
        assert!(!tree.is_empty());
        assert!(BandTree::new(Row::new()).is_empty());
    }

    #[test]
    fn parent_and_children() {
        let (tree, a, b, a2) = tree();
        assert_eq!(tree.parent(b).map(BandData::id), Some(a));
        assert_eq!(tree.parent(a).map(BandData::id), Some(BandDataId::ROOT));
        assert!(tree.parent(BandDataId::ROOT).is_none());

        let ids: Vec<_> = tree.children_by_name(BandDataId::ROOT, "A").map(BandData::id).collect();
        assert_eq!(ids, vec![a, a2]);
        assert_eq!(tree.first_child_by_name(a, "B").map(BandData::id), Some(b));
        assert!(tree.first_child_by_name(a2, "B").is_none());
    }

    #[test]
    fn find_recursively_is_preorder() {
        let (tree, _, b, _) = tree();
        assert_eq!(tree.find_band_recursively(BandDataId::ROOT, "B").map(BandData::id), Some(b));
        assert!(tree.find_band_recursively(b, "B").is_none());
        assert!(tree.find_band_recursively(BandDataId::ROOT, "Missing").is_none());
    }

    #[test]
    fn visit_order_and_depth() {
        let (tree, ..) = tree();
        let mut seen = Vec::new();
        tree.visit(|node, depth| seen.push((node.name().to_owned(), depth)));
        assert_eq!(
            seen,
            vec![
                ("Root".to_owned(), 0),
                ("A".to_owned(), 1),
                ("B".to_owned(), 2),
                ("A".to_owned(), 1)
            ]
        );
    }

    #[test]
    fn nested_mirrors_tree() {
        let (tree, ..) = tree();
        let nested = tree.nested();
        assert_eq!(nested.bands.len(), 2);
        assert_eq!(nested.bands[0].bands[0].name, "B");
        assert_eq!(nested.bands[1].data["i"], Value::Integer(2));
    }

    #[test]
    fn band_definition_from_yaml() {
        let band: ReportBand = serde_yml::from_str(
            r#"
name: Orders
orientation: vertical
data_sets:
  - name: orders
    type: sql
    query: select * from orders
bands:
  - name: Lines
"#,
        )
        .unwrap();
        assert_eq!(band.orientation, BandOrientation::Vertical);
        assert_eq!(band.data_sets[0].loader, "sql");
        assert_eq!(band.child("Lines").unwrap().orientation, BandOrientation::Horizontal);
    }
}

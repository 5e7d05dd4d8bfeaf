use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::*;

/// Panel settings, configurable under `panel` in the engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PanelOptions {
    /// Minimum number of columns, at most [MAX_PANEL_COLUMNS]. Attributes placed in a
    /// column beyond it add columns.
    pub columns: u32,

    /// Attributes per column before moving to the next one. By default attributes
    /// are spread evenly.
    pub rows_count: Option<u32>,
}

impl Default for PanelOptions {
    fn default() -> Self {
        Self {
            columns: 1,
            rows_count: None,
        }
    }
}

/// Editor component a renderer should create for a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorKind {
    TextField,
    NumberField,
    CheckBox,
    DateField,
    DateTimeField,
    ComboBox,
    EntityPicker,
    /// Any collection attribute.
    ValuesPicker,
}

impl EditorKind {
    pub fn of(attr: &AttributeDefinition) -> Self {
        if attr.collection {
            return EditorKind::ValuesPicker;
        }
        match attr.data_type {
            AttributeType::String => EditorKind::TextField,
            AttributeType::Integer | AttributeType::Double => EditorKind::NumberField,
            AttributeType::Boolean => EditorKind::CheckBox,
            AttributeType::Date => EditorKind::DateTimeField,
            AttributeType::DateWithoutTime => EditorKind::DateField,
            AttributeType::Enumeration => EditorKind::ComboBox,
            AttributeType::Entity => EditorKind::EntityPicker,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelCell {
    pub property: String,
    pub caption: String,
    pub required: bool,
    pub editor: EditorKind,
}

impl PanelCell {
    fn of(attr: &AttributeDefinition) -> Self {
        Self {
            property: attr.property_name(),
            caption: attr.name.clone(),
            required: attr.required,
            editor: EditorKind::of(attr),
        }
    }
}

/// Placement of an attribute set into the columns of an attributes panel. A column
/// may have holes where explicit row numbers skip rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PanelLayout {
    pub columns: Vec<Vec<Option<PanelCell>>>,
}

impl PanelLayout {
    /// Lay out the attributes visible on `screen`.
    ///
    /// Attributes with a configured column go there first, at their row if one is
    /// configured and free. The others fill the columns in order, `rows_count` per
    /// column (or an even share), the last column taking any overflow. Positions
    /// outside of [MAX_PANEL_COLUMNS] by [MAX_PANEL_ROWS] count as unset.
    pub fn build(
        attributes: &[Arc<AttributeDefinition>],
        options: &PanelOptions,
        screen: Option<&str>,
    ) -> Self {
        let mut visible: Vec<&AttributeDefinition> = attributes
            .iter()
            .map(Arc::as_ref)
            .filter(|a| a.visible_on(screen))
            .collect();
        visible.sort_by(|a, b| a.order_no.cmp(&b.order_no).then_with(|| a.code.cmp(&b.code)));

        for attr in visible.iter().filter(|a| !a.configuration.is_within_panel()) {
            log::warn!(
                "Panel position of `{}` is out of range, placing it with the others",
                attr.code
            );
        }

        let widest = visible
            .iter()
            .filter_map(|a| a.configuration.position())
            .map(|(column, _)| column as usize + 1)
            .max()
            .unwrap_or(0);
        let count = (options.columns.clamp(1, MAX_PANEL_COLUMNS) as usize).max(widest);
        let mut layout = PanelLayout {
            columns: vec![Vec::new(); count],
        };

        let (positioned, rest): (Vec<_>, Vec<_>) = visible
            .into_iter()
            .partition(|a| a.configuration.position().is_some());

        for attr in &positioned {
            if let Some((col, Some(row))) = attr.configuration.position() {
                layout.place_at(col as usize, row as usize, PanelCell::of(attr));
            }
        }
        for attr in &positioned {
            if let Some((col, None)) = attr.configuration.position() {
                layout.place_free(col as usize, PanelCell::of(attr));
            }
        }

        let per_column = options
            .rows_count
            .map(|r| r as usize)
            .unwrap_or_else(|| rest.len().div_ceil(count))
            .max(1);
        let mut col = 0;
        let mut in_column = 0;
        for attr in rest {
            if in_column == per_column && col + 1 < count {
                col += 1;
                in_column = 0;
            }
            layout.place_free(col, PanelCell::of(attr));
            in_column += 1;
        }

        layout
    }

    fn place_at(&mut self, col: usize, row: usize, cell: PanelCell) {
        let column = &mut self.columns[col];
        if column.len() <= row {
            column.resize(row + 1, None);
        }
        if column[row].is_none() {
            column[row] = Some(cell);
        } else {
            self.place_free(col, cell);
        }
    }

    fn place_free(&mut self, col: usize, cell: PanelCell) {
        let column = &mut self.columns[col];
        match column.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => *slot = Some(cell),
            None => column.push(Some(cell)),
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Cells column by column, top to bottom, skipping holes.
    pub fn cells(&self) -> impl Iterator<Item = &PanelCell> {
        self.columns.iter().flatten().flatten()
    }

    /// Property names per column, holes as `None`. Handy for assertions and logs.
    pub fn properties(&self) -> Vec<Vec<Option<&str>>> {
        self.columns
            .iter()
            .map(|column| {
                column
                    .iter()
                    .map(|slot| slot.as_ref().map(|cell| cell.property.as_str()))
                    .collect()
            })
            .collect()
    }
}

impl DynAttrMetadata {
    /// Layout of the attribute set of an entity category, see
    /// [DynAttrMetadata::attribute_set] and [PanelLayout::build].
    pub fn panel(
        &self,
        entity: &str,
        category: Option<&str>,
        options: &PanelOptions,
        screen: Option<&str>,
    ) -> Result<PanelLayout, DynAttrError> {
        let attributes = self.attribute_set(entity, category)?;
        let layout = PanelLayout::build(&attributes, options, screen);
        log::debug!(
            "Panel of `{entity}` has {} attributes in {} columns",
            layout.cells().count(),
            layout.column_count()
        );
        Ok(layout)
    }
}

//! Dynamic attributes: entity properties defined at runtime.
//!
//! Attributes are grouped into categories, each category belonging to one entity
//! type. An entity instance holds the values of the attributes of its category under
//! property names prefixed with `+`, e.g. `+discount`.
//!
//! [DynAttrMetadata] resolves categories and attributes out of a [CategoryStore] and
//! caches them until reloaded. On top of it:
//! - [default_values] and [fill_defaults] compute initial values of new entities;
//! - [recalculation_order] and [recalculate] run dependent attributes after a change;
//! - [PanelLayout] places an attribute set into the columns of an attributes panel.

use thiserror::Error;

use crate::value::Value;

/// Attribute and category definitions.
mod model;

/// Cached resolution of categories and attributes.
mod metadata;

/// Default values of new entities.
mod defaults;

/// Ordering and running of dependent attribute recalculation.
mod recalc;

/// Layout of the attributes panel.
mod panel;

pub use defaults::{default_values, fill_defaults};
pub use metadata::{CategoryStore, DynAttrMetadata, YamlCategoryStore};
pub use model::{
    code_of, property_name, AttributeConfiguration, AttributeDefinition, AttributeType,
    CategoryDefinition, MAX_PANEL_COLUMNS, MAX_PANEL_ROWS, PROPERTY_PREFIX,
};
pub use panel::{EditorKind, PanelCell, PanelLayout, PanelOptions};
pub use recalc::{recalculate, recalculation_order, AttributeRecalculator};

#[cfg(test)]
pub(crate) fn sample_metadata() -> DynAttrMetadata {
    DynAttrMetadata::new(std::sync::Arc::new(YamlCategoryStore::from_yaml(
        <&str>::from(crate::Sample::Categories),
    )))
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum DynAttrError {
    #[error("Failed to load categories. {0}")]
    Store(#[source] BoxError),

    #[error(
        "Dynamic attribute metadata is invalid: {}",
        .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    )]
    Invalid(Vec<MetadataError>),

    #[error("Attribute `{code}` is not defined for `{entity}`")]
    UnknownAttribute { entity: String, code: String },

    #[error("Category `{category}` is not defined for `{entity}`")]
    UnknownCategory { entity: String, category: String },

    #[error("Attributes depend on each other in a cycle: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("Recalculation of `{code}` failed. {source}")]
    Recalculation { code: String, source: BoxError },
}

/// Problem found in the loaded categories.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MetadataError {
    #[error("`{entity}` has more than one attribute with code `{code}`")]
    DuplicatedCode { entity: String, code: String },

    #[error("`{entity}` has more than one category named `{category}`")]
    DuplicatedCategory { entity: String, category: String },

    #[error("`{entity}` has more than one default category")]
    SeveralDefaultCategories { entity: String },

    #[error("Default of `{code}` is a {found} value, which does not fit type {expected}")]
    DefaultTypeMismatch {
        code: String,
        expected: AttributeType,
        found: &'static str,
    },

    #[error("Default `{value}` of `{code}` is not one of its enumeration values")]
    DefaultNotInEnumeration { code: String, value: Value },

    #[error("`{code}` depends on `{depends_on}`, which is not an attribute of `{entity}`")]
    UnknownDependency {
        entity: String,
        code: String,
        depends_on: String,
    },

    #[error("Entity attribute `{code}` has no entity class")]
    EntityClassMissing { code: String },

    #[error(
        "Panel position of `{code}` is outside of {} columns by {} rows",
        MAX_PANEL_COLUMNS,
        MAX_PANEL_ROWS
    )]
    PositionOutOfRange {
        code: String,
        column: Option<u32>,
        row: Option<u32>,
    },
}

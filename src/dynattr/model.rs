use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{name::ItemName, value::Value};

/// Columns an attributes panel can have.
pub const MAX_PANEL_COLUMNS: u32 = 64;

/// Rows a column of an attributes panel can have.
pub const MAX_PANEL_ROWS: u32 = 1024;

/// Prefix that turns an attribute code into the property name on the entity.
pub const PROPERTY_PREFIX: char = '+';

/// Property name of the attribute with the given code, e.g. `+discount`.
pub fn property_name(code: &str) -> String {
    format!("{PROPERTY_PREFIX}{code}")
}

/// Strip the property prefix, if any.
pub fn code_of(name: &str) -> &str {
    name.strip_prefix(PROPERTY_PREFIX).unwrap_or(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Integer,
    Double,
    Boolean,
    /// Date and time.
    Date,
    DateWithoutTime,
    Enumeration,
    /// Reference to another entity, held by its id.
    Entity,
}

impl AttributeType {
    /// Convert a value written in a category definition into the value type of the
    /// attribute. Dates are written as ISO strings. `None` if the value does not fit.
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        use AttributeType as T;

        match (self, value) {
            (T::String | T::Enumeration, Value::String(_)) => Some(value.clone()),
            (T::Integer, Value::Integer(_)) => Some(value.clone()),
            (T::Double, Value::Float(_)) => Some(value.clone()),
            (T::Double, Value::Integer(v)) => Some(Value::Float(*v as f64)),
            (T::Boolean, Value::Bool(_)) => Some(value.clone()),
            (T::Date, Value::DateTime(_)) => Some(value.clone()),
            (T::Date, Value::String(s)) => ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(Value::DateTime),
            (T::DateWithoutTime, Value::Date(_)) => Some(value.clone()),
            (T::DateWithoutTime, Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(Value::Date),
            (T::Entity, Value::String(_) | Value::Integer(_)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn is_date(&self) -> bool {
        matches!(self, AttributeType::Date | AttributeType::DateWithoutTime)
    }
}

impl std::fmt::Display for AttributeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AttributeType::String => "string",
            AttributeType::Integer => "integer",
            AttributeType::Double => "double",
            AttributeType::Boolean => "boolean",
            AttributeType::Date => "date",
            AttributeType::DateWithoutTime => "date_without_time",
            AttributeType::Enumeration => "enumeration",
            AttributeType::Entity => "entity",
        };
        f.write_str(s)
    }
}

/// Dynamic attribute, defined at runtime as part of a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub code: ItemName,

    /// Caption shown to users.
    pub name: String,

    #[serde(rename = "type")]
    pub data_type: AttributeType,

    #[serde(default)]
    pub order_no: i32,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub collection: bool,

    #[serde(default)]
    pub default: Option<Value>,

    /// For date attributes, the default is the moment the default is computed.
    #[serde(default)]
    pub default_date_is_current: bool,

    /// Allowed values of an enumeration attribute.
    #[serde(default)]
    pub enumeration: Vec<String>,

    /// Referenced entity of an entity attribute.
    #[serde(default)]
    pub entity_class: Option<String>,

    /// Codes of the attributes whose change makes this one recalculate.
    #[serde(default)]
    pub depends_on: Vec<ItemName>,

    #[serde(default)]
    pub configuration: AttributeConfiguration,

    /// Name of the owning category, filled in when metadata is loaded.
    #[serde(skip)]
    pub(crate) category: String,
}

impl AttributeDefinition {
    pub fn new(code: ItemName, name: impl Into<String>, data_type: AttributeType) -> Self {
        Self {
            code,
            name: name.into(),
            data_type,
            order_no: 0,
            required: false,
            collection: false,
            default: None,
            default_date_is_current: false,
            enumeration: Vec::new(),
            entity_class: None,
            depends_on: Vec::new(),
            configuration: AttributeConfiguration::default(),
            category: String::new(),
        }
    }

    pub fn property_name(&self) -> String {
        property_name(&self.code)
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Whether the attribute is shown on the given screen. No screen, or no target
    /// screens configured, means shown.
    pub fn visible_on(&self, screen: Option<&str>) -> bool {
        let targets = &self.configuration.target_screens;
        match screen {
            Some(screen) if !targets.is_empty() => targets.iter().any(|t| t == screen),
            _ => true,
        }
    }
}

/// Presentation settings of an attribute.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeConfiguration {
    /// Zero-based column in the attributes panel.
    pub column_number: Option<u32>,

    /// Zero-based row in the attributes panel, only with `column_number`.
    pub row_number: Option<u32>,

    /// Screens the attribute is shown on. Empty means all screens.
    pub target_screens: Vec<String>,
}

impl AttributeConfiguration {
    /// Whether the configured column and row, if any, fit the attributes panel.
    pub fn is_within_panel(&self) -> bool {
        self.column_number.map_or(true, |c| c < MAX_PANEL_COLUMNS)
            && self.row_number.map_or(true, |r| r < MAX_PANEL_ROWS)
    }

    /// Explicit column and row, when a column is set and both fit the panel.
    pub fn position(&self) -> Option<(u32, Option<u32>)> {
        if !self.is_within_panel() {
            return None;
        }
        self.column_number.map(|column| (column, self.row_number))
    }
}

/// Named set of dynamic attributes of one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDefinition {
    pub name: String,

    /// Entity type the category applies to.
    pub entity: String,

    #[serde(default)]
    pub is_default: bool,

    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_names() {
        assert_eq!(property_name("discount"), "+discount");
        assert_eq!(code_of("+discount"), "discount");
        assert_eq!(code_of("discount"), "discount");
    }

    #[test]
    fn coerce_by_type() {
        use AttributeType as T;

        assert_eq!(T::Double.coerce(&Value::Integer(2)), Some(Value::Float(2.0)));
        assert_eq!(T::Integer.coerce(&Value::Float(2.0)), None);
        assert_eq!(
            T::DateWithoutTime.coerce(&"2024-02-29".into()),
            Some(Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()))
        );
        assert!(T::Date.coerce(&"2024-02-29T10:00:00".into()).is_some());
        assert!(T::Date.coerce(&"yesterday".into()).is_none());
        assert!(T::Entity.coerce(&Value::Integer(42)).is_some());
        assert!(T::Boolean.coerce(&"true".into()).is_none());
    }

    #[test]
    fn visibility_by_screen() {
        let mut attr = AttributeDefinition::new(
            "vip".try_into().unwrap(),
            "VIP",
            AttributeType::Boolean,
        );
        assert!(attr.visible_on(Some("any")));

        attr.configuration.target_screens = vec!["customer_edit".to_owned()];
        assert!(attr.visible_on(Some("customer_edit")));
        assert!(!attr.visible_on(Some("customer_browse")));
        assert!(attr.visible_on(None));
    }

    #[test]
    fn position_within_panel() {
        let mut config = AttributeConfiguration::default();
        assert!(config.is_within_panel());
        assert_eq!(config.position(), None);

        config.column_number = Some(1);
        assert_eq!(config.position(), Some((1, None)));

        config.row_number = Some(20_000_000);
        assert!(!config.is_within_panel());
        assert_eq!(config.position(), None);

        config.row_number = Some(3);
        config.column_number = Some(MAX_PANEL_COLUMNS);
        assert_eq!(config.position(), None);
    }
}

use chrono::NaiveDateTime;
use log::trace;

use super::*;
use crate::value::Row;

/// Initial values of the given attributes, keyed by property name.
///
/// Date attributes flagged with `default_date_is_current` get `now` (only its date
/// for attributes without time). Collection attributes get a one-item list.
/// Attributes without a default are left out.
pub fn default_values<'a>(
    attributes: impl IntoIterator<Item = &'a AttributeDefinition>,
    now: NaiveDateTime,
) -> Row {
    let mut values = Row::new();
    for attr in attributes {
        if let Some(value) = default_of(attr, now) {
            trace!("Default of `{}` is {value}", attr.code);
            values.insert(attr.property_name(), value);
        }
    }
    values
}

/// Set the defaults of attributes that have no value yet. Returns the property names
/// that were filled.
pub fn fill_defaults<'a>(
    attributes: impl IntoIterator<Item = &'a AttributeDefinition>,
    values: &mut Row,
    now: NaiveDateTime,
) -> Vec<String> {
    let mut filled = Vec::new();
    for (property, value) in default_values(attributes, now) {
        let unset = values.get(&property).map_or(true, Value::is_null);
        if unset {
            values.insert(property.clone(), value);
            filled.push(property);
        }
    }
    filled
}

fn default_of(attr: &AttributeDefinition, now: NaiveDateTime) -> Option<Value> {
    let value = match attr.data_type {
        AttributeType::Date if attr.default_date_is_current => Value::DateTime(now),
        AttributeType::DateWithoutTime if attr.default_date_is_current => Value::Date(now.date()),
        _ => attr.default.clone().filter(|v| !v.is_null())?,
    };

    if attr.collection {
        Some(Value::List(vec![value]))
    } else {
        Some(value)
    }
}

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use log::debug;

use super::*;
use crate::value::Row;

/// Computes the new value of an attribute from the current values of the entity.
/// Provided by the application, usually backed by a script stored with the attribute.
pub trait AttributeRecalculator {
    fn recalculate(&self, attribute: &AttributeDefinition, values: &Row) -> Result<Value, BoxError>;
}

/// Attributes to recalculate after `changed` changed: every attribute depending on it
/// directly or through other attributes, each one after all of its dependencies.
/// Ties keep the order of `attributes`.
pub fn recalculation_order(
    attributes: &[Arc<AttributeDefinition>],
    changed: &str,
) -> Result<Vec<Arc<AttributeDefinition>>, DynAttrError> {
    let changed = code_of(changed);
    let index: HashMap<&str, usize> = attributes
        .iter()
        .enumerate()
        .map(|(i, a)| (a.code.as_str(), i))
        .collect();

    // dependents[i]: attributes depending on attribute i.
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); attributes.len()];
    for (i, attr) in attributes.iter().enumerate() {
        for dep in &attr.depends_on {
            if let Some(&d) = index.get(dep.as_str()) {
                dependents[d].push(i);
            }
        }
    }

    let Some(&start) = index.get(changed) else {
        return Ok(Vec::new());
    };

    let mut affected = BTreeSet::new();
    let mut stack = dependents[start].clone();
    while let Some(i) = stack.pop() {
        if i == start {
            return Err(DynAttrError::DependencyCycle(vec![changed.to_owned()]));
        }
        if affected.insert(i) {
            stack.extend(dependents[i].iter().copied());
        }
    }

    // Kahn's algorithm restricted to the affected attributes.
    let mut pending: HashMap<usize, usize> = affected
        .iter()
        .map(|&i| {
            let within = attributes[i]
                .depends_on
                .iter()
                .filter_map(|d| index.get(d.as_str()))
                .filter(|d| affected.contains(*d))
                .count();
            (i, within)
        })
        .collect();

    let mut ready: BTreeSet<usize> = pending
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(i, _)| *i)
        .collect();
    let mut order = Vec::with_capacity(affected.len());
    while let Some(i) = ready.pop_first() {
        pending.remove(&i);
        order.push(Arc::clone(&attributes[i]));
        for &dependent in &dependents[i] {
            if let Some(n) = pending.get_mut(&dependent) {
                *n -= 1;
                if *n == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if !pending.is_empty() {
        let mut codes: Vec<String> = pending
            .keys()
            .map(|&i| attributes[i].code.to_string())
            .collect();
        codes.sort();
        return Err(DynAttrError::DependencyCycle(codes));
    }
    Ok(order)
}

/// Recalculate everything depending on `changed`, writing each result into `values`
/// before the next attribute is computed. Returns the property names updated.
pub fn recalculate(
    attributes: &[Arc<AttributeDefinition>],
    changed: &str,
    values: &mut Row,
    recalculator: &dyn AttributeRecalculator,
) -> Result<Vec<String>, DynAttrError> {
    let order = recalculation_order(attributes, changed)?;
    debug!(
        "Change of `{}` recalculates {} attributes",
        code_of(changed),
        order.len()
    );

    let mut updated = Vec::with_capacity(order.len());
    for attr in order {
        let value = recalculator
            .recalculate(&attr, values)
            .map_err(|source| DynAttrError::Recalculation {
                code: attr.code.to_string(),
                source,
            })?;
        let property = attr.property_name();
        values.insert(property.clone(), value);
        updated.push(property);
    }
    Ok(updated)
}

impl DynAttrMetadata {
    /// [recalculation_order] over all attributes of the entity.
    pub fn recalculation_order(
        &self,
        entity: &str,
        changed: &str,
    ) -> Result<Vec<Arc<AttributeDefinition>>, DynAttrError> {
        let attributes = self.attributes(entity)?;
        if !attributes.iter().any(|a| a.code == code_of(changed)) {
            return Err(DynAttrError::UnknownAttribute {
                entity: entity.to_owned(),
                code: code_of(changed).to_owned(),
            });
        }
        recalculation_order(&attributes, changed)
    }
}

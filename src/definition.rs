use std::{collections::HashSet, path::Path};

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    band::{BandOrientation, ReportBand, CROSSTAB_HEADER_SUFFIX, CROSSTAB_MASTER_SUFFIX, ROOT_BAND_NAME},
    name::ItemName,
    value::{Params, Value},
};

/// Report as described in its YAML file: the parameters it accepts and the tree of
/// bands below the implicit root.
///
/// ```yaml
/// name: Orders by customer
/// parameters:
///   - name: customers
///     required: true
/// bands:
///   - name: Customer
///     data_sets:
///       - name: customers
///         type: parameter
///         query: customers
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDefinition {
    pub name: String,

    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,

    #[serde(default)]
    pub bands: Vec<ReportBand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: ItemName,

    #[serde(default)]
    pub required: bool,

    /// Used when the parameter is not given. A required parameter with a default is
    /// never missing.
    #[serde(default)]
    pub default: Option<Value>,
}

impl ReportDefinition {
    /// Parse and validate a definition.
    pub fn from_yaml(yaml: &str) -> Result<Self, Vec<DefinitionError>> {
        let definition: Self = serde_yml::from_str(yaml).map_err(|e| vec![DefinitionError::from(e)])?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn load(path: &Path) -> Result<Self, Vec<DefinitionError>> {
        debug!("Loading report definition from {}", path.display());
        let yaml = std::fs::read_to_string(path).map_err(|e| vec![DefinitionError::from(e)])?;
        Self::from_yaml(&yaml)
    }

    /// Check the whole definition, collecting every problem found.
    pub fn validate(&self) -> Result<(), Vec<DefinitionError>> {
        let mut errors = Vec::new();

        let mut params = HashSet::new();
        for param in &self.parameters {
            if !params.insert(param.name.as_str()) {
                errors.push(DefinitionError::DuplicatedParameter(param.name.to_string()));
            }
        }

        let mut bands = HashSet::new();
        let mut stack: Vec<&ReportBand> = self.bands.iter().collect();
        while let Some(band) = stack.pop() {
            trace!("Validating band `{}`", band.name);
            check_band(band, &mut bands, &mut errors);
            stack.extend(band.children());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Given parameters with defaults filled in. Fails listing every required
    /// parameter that is neither given nor defaulted.
    pub fn resolve_params(&self, mut given: Params) -> Result<Params, Vec<String>> {
        let mut missing = Vec::new();
        for param in &self.parameters {
            let is_set = given.get(param.name.as_str()).is_some_and(|v| !v.is_null());
            if is_set {
                continue;
            }
            match &param.default {
                Some(default) => {
                    given.insert(param.name.to_string(), default.clone());
                }
                None if param.required => missing.push(param.name.to_string()),
                None => {}
            }
        }

        if missing.is_empty() {
            Ok(given)
        } else {
            Err(missing)
        }
    }

    /// Find a band anywhere in the tree.
    pub fn band(&self, name: &str) -> Option<&ReportBand> {
        let mut stack: Vec<&ReportBand> = self.bands.iter().collect();
        while let Some(band) = stack.pop() {
            if band.name == name {
                return Some(band);
            }
            stack.extend(band.children());
        }
        None
    }
}

fn check_band<'a>(
    band: &'a ReportBand,
    seen: &mut HashSet<&'a str>,
    errors: &mut Vec<DefinitionError>,
) {
    if band.name == ROOT_BAND_NAME {
        errors.push(DefinitionError::ReservedName);
    } else if !seen.insert(band.name.as_str()) {
        errors.push(DefinitionError::DuplicatedBand(band.name.to_string()));
    }

    let mut data_sets = HashSet::new();
    for data_set in &band.data_sets {
        if !data_sets.insert(data_set.name.as_str()) {
            errors.push(DefinitionError::DuplicatedDataSet {
                band: band.name.to_string(),
                data_set: data_set.name.to_string(),
            });
        }
        if data_set.loader.trim().is_empty() {
            errors.push(DefinitionError::EmptyLoaderType {
                band: band.name.to_string(),
                data_set: data_set.name.to_string(),
            });
        }
    }

    if band.orientation == BandOrientation::Crosstab {
        for suffix in [CROSSTAB_HEADER_SUFFIX, CROSSTAB_MASTER_SUFFIX] {
            let name = format!("{}{suffix}", band.name);
            if band.child(&name).is_none() {
                errors.push(DefinitionError::CrosstabChildMissing {
                    band: band.name.to_string(),
                    missing: name,
                });
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("IO error occurred while reading the report definition. {0}")]
    Io(#[from] std::io::Error),

    #[error("Report definition is not valid. {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("Band name `{}` is reserved for the parameters band", ROOT_BAND_NAME)]
    ReservedName,

    #[error("Band `{0}` is defined more than once")]
    DuplicatedBand(String),

    #[error("Parameter `{0}` is defined more than once")]
    DuplicatedParameter(String),

    #[error("Band `{band}` has more than one data set named `{data_set}`")]
    DuplicatedDataSet { band: String, data_set: String },

    #[error("Data set `{data_set}` of band `{band}` has no loader type")]
    EmptyLoaderType { band: String, data_set: String },

    #[error("Crosstab band `{band}` has no child band `{missing}`")]
    CrosstabChildMissing { band: String, missing: String },
}

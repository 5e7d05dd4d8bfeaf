use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::{Arc, PoisonError, RwLock},
};

use log::{debug, info, trace};

use super::*;

/// Source of category definitions, provided by the application.
pub trait CategoryStore: Send + Sync {
    fn load_categories(&self) -> Result<Vec<CategoryDefinition>, BoxError>;
}

/// Categories written as a YAML list, either inline or in a file read on every load.
#[derive(Debug, Clone)]
pub struct YamlCategoryStore {
    source: YamlSource,
}

#[derive(Debug, Clone)]
enum YamlSource {
    Text(String),
    File(PathBuf),
}

impl YamlCategoryStore {
    pub fn from_yaml(yaml: impl Into<String>) -> Self {
        Self {
            source: YamlSource::Text(yaml.into()),
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: YamlSource::File(path.into()),
        }
    }
}

impl CategoryStore for YamlCategoryStore {
    fn load_categories(&self) -> Result<Vec<CategoryDefinition>, BoxError> {
        let categories = match &self.source {
            YamlSource::Text(yaml) => serde_yml::from_str(yaml)?,
            YamlSource::File(path) => {
                debug!("Reading categories from {}", path.display());
                serde_yml::from_str(&std::fs::read_to_string(path)?)?
            }
        };
        Ok(categories)
    }
}

/// Validated categories and attributes, grouped by entity.
#[derive(Debug, Default)]
struct Snapshot {
    categories: HashMap<String, Vec<Arc<CategoryDefinition>>>,

    /// Attributes of all categories of an entity, by `order_no` then code.
    attributes: HashMap<String, Vec<Arc<AttributeDefinition>>>,
}

impl Snapshot {
    fn build(categories: Vec<CategoryDefinition>) -> Result<Self, Vec<MetadataError>> {
        let mut errors = Vec::new();
        let mut snapshot = Snapshot::default();

        for mut category in categories {
            trace!("Loading category `{}` of `{}`", category.name, category.entity);
            for attr in &mut category.attributes {
                attr.category = category.name.clone();
                check_attribute(attr, &mut errors);
            }

            let entity = category.entity.clone();
            let category = Arc::new(category);
            snapshot
                .attributes
                .entry(entity.clone())
                .or_default()
                .extend(category.attributes.iter().cloned().map(Arc::new));
            snapshot.categories.entry(entity).or_default().push(category);
        }

        for (entity, categories) in &snapshot.categories {
            let mut names = HashSet::new();
            for category in categories {
                if !names.insert(category.name.as_str()) {
                    errors.push(MetadataError::DuplicatedCategory {
                        entity: entity.clone(),
                        category: category.name.clone(),
                    });
                }
            }
            if categories.iter().filter(|c| c.is_default).count() > 1 {
                errors.push(MetadataError::SeveralDefaultCategories {
                    entity: entity.clone(),
                });
            }
        }

        for (entity, attributes) in &mut snapshot.attributes {
            attributes.sort_by(|a, b| a.order_no.cmp(&b.order_no).then_with(|| a.code.cmp(&b.code)));

            let codes: HashSet<&str> = attributes.iter().map(|a| a.code.as_str()).collect();
            if codes.len() != attributes.len() {
                let mut seen = HashSet::new();
                for attr in attributes.iter() {
                    if !seen.insert(attr.code.as_str()) {
                        errors.push(MetadataError::DuplicatedCode {
                            entity: entity.clone(),
                            code: attr.code.to_string(),
                        });
                    }
                }
            }
            for attr in attributes.iter() {
                for dep in &attr.depends_on {
                    if !codes.contains(dep.as_str()) {
                        errors.push(MetadataError::UnknownDependency {
                            entity: entity.clone(),
                            code: attr.code.to_string(),
                            depends_on: dep.to_string(),
                        });
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(snapshot)
        } else {
            Err(errors)
        }
    }
}

/// Check one attribute, replacing its default with the coerced value.
fn check_attribute(attr: &mut AttributeDefinition, errors: &mut Vec<MetadataError>) {
    if attr.data_type == AttributeType::Entity && attr.entity_class.is_none() {
        errors.push(MetadataError::EntityClassMissing {
            code: attr.code.to_string(),
        });
    }

    if !attr.configuration.is_within_panel() {
        errors.push(MetadataError::PositionOutOfRange {
            code: attr.code.to_string(),
            column: attr.configuration.column_number,
            row: attr.configuration.row_number,
        });
    }

    let Some(default) = attr.default.take() else {
        return;
    };
    if default.is_null() {
        return;
    }
    match attr.data_type.coerce(&default) {
        Some(value) => {
            if attr.data_type == AttributeType::Enumeration {
                let known = value
                    .as_str()
                    .is_some_and(|s| attr.enumeration.iter().any(|e| e == s));
                if !known {
                    errors.push(MetadataError::DefaultNotInEnumeration {
                        code: attr.code.to_string(),
                        value: value.clone(),
                    });
                }
            }
            attr.default = Some(value);
        }
        None => errors.push(MetadataError::DefaultTypeMismatch {
            code: attr.code.to_string(),
            expected: attr.data_type,
            found: default.kind(),
        }),
    }
}

/// Resolution of categories and attributes by entity type. Definitions are loaded on
/// first use and kept until [DynAttrMetadata::reload].
pub struct DynAttrMetadata {
    store: Arc<dyn CategoryStore>,
    cache: RwLock<Option<Arc<Snapshot>>>,
}

impl DynAttrMetadata {
    pub fn new(store: Arc<dyn CategoryStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(None),
        }
    }

    /// Load the definitions again. On failure the previous ones stay in use.
    pub fn reload(&self) -> Result<(), DynAttrError> {
        let snapshot = self.load()?;
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
        Ok(())
    }

    fn load(&self) -> Result<Arc<Snapshot>, DynAttrError> {
        let categories = self.store.load_categories().map_err(DynAttrError::Store)?;
        let snapshot = Snapshot::build(categories).map_err(DynAttrError::Invalid)?;
        info!(
            "Loaded dynamic attributes of {} entities",
            snapshot.categories.len()
        );
        Ok(Arc::new(snapshot))
    }

    fn snapshot(&self) -> Result<Arc<Snapshot>, DynAttrError> {
        if let Some(snapshot) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(Arc::clone(snapshot));
        }

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have loaded it between the two locks.
        if let Some(snapshot) = cache.as_ref() {
            return Ok(Arc::clone(snapshot));
        }
        let snapshot = self.load()?;
        *cache = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    pub fn categories(&self, entity: &str) -> Result<Vec<Arc<CategoryDefinition>>, DynAttrError> {
        Ok(self
            .snapshot()?
            .categories
            .get(entity)
            .cloned()
            .unwrap_or_default())
    }

    pub fn default_category(
        &self,
        entity: &str,
    ) -> Result<Option<Arc<CategoryDefinition>>, DynAttrError> {
        Ok(self
            .categories(entity)?
            .into_iter()
            .find(|category| category.is_default))
    }

    /// Attributes of every category of the entity, by `order_no` then code.
    pub fn attributes(&self, entity: &str) -> Result<Vec<Arc<AttributeDefinition>>, DynAttrError> {
        Ok(self
            .snapshot()?
            .attributes
            .get(entity)
            .cloned()
            .unwrap_or_default())
    }

    pub fn attributes_by_category(
        &self,
        entity: &str,
        category: &str,
    ) -> Result<Vec<Arc<AttributeDefinition>>, DynAttrError> {
        let snapshot = self.snapshot()?;
        let known = snapshot
            .categories
            .get(entity)
            .is_some_and(|cats| cats.iter().any(|c| c.name == category));
        if !known {
            return Err(DynAttrError::UnknownCategory {
                entity: entity.to_owned(),
                category: category.to_owned(),
            });
        }

        Ok(snapshot
            .attributes
            .get(entity)
            .map(|attrs| {
                attrs
                    .iter()
                    .filter(|a| a.category == category)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Attribute by code or by property name (`+code`).
    pub fn attribute_by_code(
        &self,
        entity: &str,
        code: &str,
    ) -> Result<Option<Arc<AttributeDefinition>>, DynAttrError> {
        let code = code_of(code);
        Ok(self
            .snapshot()?
            .attributes
            .get(entity)
            .and_then(|attrs| attrs.iter().find(|a| a.code == code))
            .cloned())
    }

    /// Attribute set shown for an entity: the given category, else the default
    /// category, else every attribute of the entity.
    pub fn attribute_set(
        &self,
        entity: &str,
        category: Option<&str>,
    ) -> Result<Vec<Arc<AttributeDefinition>>, DynAttrError> {
        if let Some(category) = category {
            return self.attributes_by_category(entity, category);
        }
        match self.default_category(entity)? {
            Some(default) => self.attributes_by_category(entity, &default.name),
            None => self.attributes(entity),
        }
    }
}

impl std::fmt::Debug for DynAttrMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let loaded = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        f.debug_struct("DynAttrMetadata")
            .field("loaded", &loaded)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn codes(attrs: &[Arc<AttributeDefinition>]) -> Vec<&str> {
        attrs.iter().map(|a| a.code.as_str()).collect()
    }

    #[test]
    fn attributes_are_ordered_across_categories() {
        crate::init_log();

        let metadata = sample_metadata();
        let attrs = metadata.attributes("Customer").unwrap();
        assert_eq!(
            codes(&attrs),
            vec![
                "contacts",
                "tier_note",
                "vat_number",
                "birthday",
                "discount",
                "level",
                "level_since",
                "vip"
            ]
        );
        assert!(metadata.attributes("Unknown").unwrap().is_empty());
    }

    #[test]
    fn categories_and_lookup() {
        let metadata = sample_metadata();

        let categories = metadata.categories("Customer").unwrap();
        assert_eq!(categories.len(), 2);
        assert_eq!(
            metadata.default_category("Customer").unwrap().unwrap().name,
            "Individual"
        );
        assert!(metadata.default_category("Order").unwrap().is_none());

        let company = metadata.attributes_by_category("Customer", "Company").unwrap();
        assert_eq!(codes(&company), vec!["contacts", "vat_number"]);
        assert!(company.iter().all(|a| a.category() == "Company"));

        assert!(matches!(
            metadata.attributes_by_category("Customer", "Nope"),
            Err(DynAttrError::UnknownCategory { .. })
        ));

        let by_code = metadata.attribute_by_code("Customer", "discount").unwrap().unwrap();
        let by_property = metadata.attribute_by_code("Customer", "+discount").unwrap().unwrap();
        assert_eq!(by_code, by_property);
        assert_eq!(by_code.default, Some(Value::Float(0.05)));
        assert!(metadata.attribute_by_code("Order", "discount").unwrap().is_none());
    }

    #[test]
    fn attribute_set_prefers_default_category() {
        let metadata = sample_metadata();
        let set = metadata.attribute_set("Customer", None).unwrap();
        assert!(set.iter().all(|a| a.category() == "Individual"));

        let set = metadata.attribute_set("Order", None).unwrap();
        assert_eq!(codes(&set), vec!["notes", "priority"]);
    }

    #[test]
    fn defaults_are_coerced() {
        let metadata = sample_metadata();
        let since = metadata.attribute_by_code("Customer", "level_since").unwrap().unwrap();
        assert!(since.default_date_is_current);

        let birthday = metadata.attribute_by_code("Customer", "birthday").unwrap().unwrap();
        assert_eq!(
            birthday.default,
            Some(Value::Date(chrono::NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()))
        );
    }

    #[test]
    fn invalid_metadata_lists_every_problem() {
        let yaml = r#"
- name: A
  entity: E
  is_default: true
  attributes:
    - { code: x, name: X, type: integer, default: "one" }
    - { code: level, name: L, type: enumeration, enumeration: [a, b], default: c }
    - { code: ref, name: R, type: entity }
    - { code: calc, name: C, type: string, depends_on: [missing] }
- name: A
  entity: E
  is_default: true
  attributes:
    - { code: x, name: X again, type: string }
"#;
        let metadata = DynAttrMetadata::new(Arc::new(YamlCategoryStore::from_yaml(yaml)));
        let Err(DynAttrError::Invalid(errors)) = metadata.attributes("E") else {
            panic!("expected invalid metadata");
        };

        assert_eq!(errors.len(), 7, "{errors:#?}");
        assert!(errors.contains(&MetadataError::DuplicatedCode {
            entity: "E".to_owned(),
            code: "x".to_owned()
        }));
        assert!(errors.contains(&MetadataError::SeveralDefaultCategories {
            entity: "E".to_owned()
        }));
        assert!(errors.contains(&MetadataError::DuplicatedCategory {
            entity: "E".to_owned(),
            category: "A".to_owned()
        }));
        assert!(errors.contains(&MetadataError::DefaultTypeMismatch {
            code: "x".to_owned(),
            expected: AttributeType::Integer,
            found: "string"
        }));
        assert!(errors.iter().any(|e| matches!(e, MetadataError::DefaultNotInEnumeration { .. })));
        assert!(errors.iter().any(|e| matches!(e, MetadataError::EntityClassMissing { .. })));
        assert!(errors.iter().any(|e| matches!(e, MetadataError::UnknownDependency { .. })));
    }

    #[test]
    fn panel_positions_are_bounded() {
        let yaml = r#"
- name: A
  entity: E
  attributes:
    - code: far
      name: Far
      type: string
      configuration: { column_number: 0, row_number: 20000000 }
    - code: wide
      name: Wide
      type: string
      configuration: { column_number: 4294967295 }
    - code: near
      name: Near
      type: string
      configuration: { column_number: 2, row_number: 5 }
"#;
        let metadata = DynAttrMetadata::new(Arc::new(YamlCategoryStore::from_yaml(yaml)));
        let Err(DynAttrError::Invalid(errors)) = metadata.attributes("E") else {
            panic!("expected invalid metadata");
        };
        assert_eq!(
            errors,
            vec![
                MetadataError::PositionOutOfRange {
                    code: "far".to_owned(),
                    column: Some(0),
                    row: Some(20_000_000),
                },
                MetadataError::PositionOutOfRange {
                    code: "wide".to_owned(),
                    column: Some(u32::MAX),
                    row: None,
                },
            ]
        );
    }

    /// Counts loads and serves a different set of categories after the first one.
    struct Counting {
        loads: AtomicUsize,
    }

    impl CategoryStore for Counting {
        fn load_categories(&self) -> Result<Vec<CategoryDefinition>, BoxError> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst);
            let mut category = CategoryDefinition {
                name: "C".to_owned(),
                entity: "E".to_owned(),
                is_default: false,
                attributes: vec![AttributeDefinition::new(
                    "first".try_into().unwrap(),
                    "First",
                    AttributeType::String,
                )],
            };
            if n > 0 {
                category.attributes.push(AttributeDefinition::new(
                    "second".try_into().unwrap(),
                    "Second",
                    AttributeType::String,
                ));
            }
            Ok(vec![category])
        }
    }

    #[test]
    fn cached_until_reload() {
        let store = Arc::new(Counting {
            loads: AtomicUsize::new(0),
        });
        let metadata = DynAttrMetadata::new(store.clone());

        assert_eq!(metadata.attributes("E").unwrap().len(), 1);
        assert_eq!(metadata.categories("E").unwrap().len(), 1);
        assert_eq!(store.loads.load(Ordering::SeqCst), 1);

        metadata.reload().unwrap();
        assert_eq!(store.loads.load(Ordering::SeqCst), 2);
        assert_eq!(metadata.attributes("E").unwrap().len(), 2);
    }

    #[test]
    fn store_failure_is_reported() {
        let metadata = DynAttrMetadata::new(Arc::new(YamlCategoryStore::from_file(
            "/nonexistent/categories.yaml",
        )));
        assert!(matches!(metadata.categories("E"), Err(DynAttrError::Store(_))));
    }
}

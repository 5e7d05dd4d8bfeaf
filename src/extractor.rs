use std::sync::Arc;

use log::{debug, info, trace};

use crate::{
    band::{BandDataId, BandTree, DataSet},
    config::ExtractionConfig,
    ctx::ExtractionContext,
    definition::ReportDefinition,
    extraction::{ExtractionControllerFactory, ExtractionError},
    loader::LoaderFactory,
    preprocess::PreprocessorFactory,
    value::{Params, Row},
};

/// Entry point of band extraction. Holds the registries controllers consult while
/// walking the band tree.
#[derive(Debug)]
pub struct DataExtractor {
    controllers: ExtractionControllerFactory,
    loaders: LoaderFactory,
    preprocessors: PreprocessorFactory,
    config: ExtractionConfig,
}

impl DataExtractor {
    /// Extractor with the default registries: crosstab and default controllers,
    /// `parameter` and `static` loaders, the SQL preprocessor.
    pub fn new(config: ExtractionConfig) -> Self {
        Self {
            controllers: ExtractionControllerFactory::default(),
            loaders: LoaderFactory::default(),
            preprocessors: PreprocessorFactory::default(),
            config,
        }
    }

    pub fn with_controllers(mut self, controllers: ExtractionControllerFactory) -> Self {
        self.controllers = controllers;
        self
    }

    pub fn with_loaders(mut self, loaders: LoaderFactory) -> Self {
        self.loaders = loaders;
        self
    }

    pub fn with_preprocessors(mut self, preprocessors: PreprocessorFactory) -> Self {
        self.preprocessors = preprocessors;
        self
    }

    pub fn controllers(&self) -> &ExtractionControllerFactory {
        &self.controllers
    }

    pub fn loaders(&self) -> &LoaderFactory {
        &self.loaders
    }

    pub fn preprocessors(&self) -> &PreprocessorFactory {
        &self.preprocessors
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract the band data of a whole report.
    ///
    /// The root band data holds the parameters (with defaults applied). Every
    /// first-level band is extracted by the controller of its orientation.
    pub fn extract(
        &self,
        definition: &ReportDefinition,
        params: Params,
    ) -> Result<BandTree, ExtractionError> {
        info!("Extracting report `{}`", definition.name);

        let params = definition
            .resolve_params(params)
            .map_err(ExtractionError::MissingParameters)?;
        let mut tree = BandTree::new(params.clone());
        let params = Arc::new(params);

        for band in &definition.bands {
            let ctx = ExtractionContext::new(band, Arc::clone(&params));
            let ids = self
                .controllers
                .controller_by(band.orientation)
                .extract(self, &ctx, &mut tree)?;

            if ids.is_empty() && self.config.put_empty_row_if_no_data_selected {
                debug!("Band `{}` selected no rows, adding an empty one", band.name);
                tree.push(&band.name, band.orientation, BandDataId::ROOT, Arc::new(Row::new()));
            }
        }

        debug!(
            "Report `{}` extracted into {} band data",
            definition.name,
            tree.len()
        );
        Ok(tree)
    }

    /// Run one data set: preprocess its query with the preprocessor of its loader
    /// type, then hand it to the loader.
    pub fn load_data_set(
        &self,
        data_set: &DataSet,
        ctx: &ExtractionContext,
    ) -> Result<Vec<Row>, ExtractionError> {
        let band = ctx.band();
        trace!(
            "Loading data set `{}` of band `{}` with `{}`",
            data_set.name,
            band.name,
            data_set.loader
        );

        let query = self
            .preprocessors
            .preprocessor_by(&data_set.loader)
            .preprocess(&data_set.query, ctx)
            .map_err(|source| ExtractionError::Preprocess {
                band: band.name.to_string(),
                data_set: data_set.name.to_string(),
                source,
            })?;

        self.loaders
            .loader_by(&data_set.loader)
            .and_then(|loader| loader.load(data_set, &query, ctx))
            .map_err(|source| ExtractionError::Load {
                band: band.name.to_string(),
                data_set: data_set.name.to_string(),
                source,
            })
    }
}

impl Default for DataExtractor {
    fn default() -> Self {
        Self::new(ExtractionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        band::{BandData, BandOrientation, ReportBand, ROOT_BAND_NAME},
        loader::{LoadError, SqlExecutor, STATIC_LOADER},
        preprocess::PreparedQuery,
        row,
        value::Value,
        Sample,
    };

    /// Answers the queries of the orders sample from fixed tables.
    #[derive(Default)]
    struct Shop {
        queries: Mutex<Vec<PreparedQuery>>,
    }

    impl SqlExecutor for Shop {
        fn execute(
            &self,
            query: &PreparedQuery,
        ) -> Result<Vec<Row>, Box<dyn std::error::Error + Send + Sync>> {
            self.queries.lock().unwrap().push(query.clone());

            if query.text.contains("from order_line") {
                let customer = query.values[0].as_i64().ok_or("customer id")?;
                let lines = match customer {
                    1 => vec![
                        row! { "product" => "tea", "qty" => 2i64 },
                        row! { "product" => "cup", "qty" => 1i64 },
                    ],
                    2 => vec![row! { "product" => "pot", "qty" => 1i64 }],
                    _ => vec![],
                };
                return Ok(lines);
            }

            if query.text.contains("from sales") {
                let region = query.values[0].as_str().ok_or("region")?;
                let month = query.values[1].as_i64().ok_or("month")?;
                return Ok(match (region, month) {
                    ("north", 1) => vec![row! { "amount" => 10i64 }],
                    ("north", 2) => vec![row! { "amount" => 20i64 }],
                    ("south", 2) => vec![row! { "amount" => 5i64 }],
                    _ => vec![],
                });
            }

            Err(format!("unexpected query: {}", query.text).into())
        }
    }

    fn orders_extractor(shop: Arc<Shop>) -> DataExtractor {
        DataExtractor::default().with_loaders(LoaderFactory::default().with_sql(shop))
    }

    fn customers() -> Value {
        Value::List(vec![
            row! { "id" => 1i64, "name" => "Ann" }.into(),
            row! { "id" => 2i64, "name" => "Bob" }.into(),
        ])
    }

    fn names<'a>(rows: impl Iterator<Item = &'a BandData>) -> Vec<String> {
        rows.map(|b| b.name().to_owned()).collect()
    }

    #[test]
    fn extracts_orders_sample() {
        crate::init_log();

        let shop = Arc::new(Shop::default());
        let extractor = orders_extractor(shop.clone());
        let definition = ReportDefinition::from_yaml(Sample::Orders.into()).unwrap();

        let tree = extractor
            .extract(&definition, row! { "customers" => customers() })
            .unwrap();

        let root = tree.root();
        assert_eq!(root.name(), ROOT_BAND_NAME);
        assert_eq!(root.field("title"), Some(&Value::from("Orders")));
        assert_eq!(
            names(tree.children(root.id())),
            vec!["Header", "Customer", "Customer", "Sales"]
        );

        let header = tree.first_child_by_name(root.id(), "Header").unwrap();
        assert_eq!(header.field("title"), Some(&Value::from("Orders")));

        let customers: Vec<_> = tree.children_by_name(root.id(), "Customer").collect();
        assert_eq!(customers[0].field("rating"), Some(&Value::from("gold")));
        assert_eq!(customers[1].field("rating"), None);

        let ann_lines: Vec<_> = tree.children_by_name(customers[0].id(), "Lines").collect();
        assert_eq!(ann_lines.len(), 2);
        assert_eq!(ann_lines[1].field("product"), Some(&Value::from("cup")));
        assert_eq!(tree.children_by_name(customers[1].id(), "Lines").count(), 1);

        // `min_total` is unset, so the optional filter is gone.
        let queries = shop.queries.lock().unwrap();
        let lines_query = queries
            .iter()
            .find(|q| q.text.contains("order_line"))
            .unwrap();
        assert!(!lines_query.text.contains("total"));
        assert_eq!(lines_query.values, vec![Value::Integer(1)]);
    }

    #[test]
    fn parent_pointers_follow_params() {
        let shop = Arc::new(Shop::default());
        let extractor = orders_extractor(shop);
        let definition = ReportDefinition::from_yaml(Sample::Orders.into()).unwrap();
        let tree = extractor
            .extract(
                &definition,
                row! { "customers" => customers(), "min_total" => 3i64 },
            )
            .unwrap();

        tree.visit(|node, depth| {
            if node.name() == "Lines" {
                assert_eq!(depth, 2);
                let parent = tree.parent(node.id()).unwrap();
                assert_eq!(parent.name(), "Customer");
            }
        });

        let lines = tree.find_band_recursively(BandDataId::ROOT, "Lines").unwrap();
        assert_eq!(tree.parent(lines.id()).unwrap().field("id"), Some(&Value::Integer(1)));
    }

    #[test]
    fn crosstab_is_rectangular() {
        let shop = Arc::new(Shop::default());
        let extractor = orders_extractor(shop);
        let definition = ReportDefinition::from_yaml(Sample::Orders.into()).unwrap();
        let tree = extractor
            .extract(&definition, row! { "customers" => customers() })
            .unwrap();

        let sales = tree.first_child_by_name(BandDataId::ROOT, "Sales").unwrap();
        assert_eq!(sales.orientation(), BandOrientation::Crosstab);
        assert_eq!(
            names(tree.children(sales.id())),
            vec![
                "Sales_dynamic_header",
                "Sales_dynamic_header",
                "Sales_master_data",
                "Sales_master_data"
            ]
        );

        let amounts: Vec<Vec<Option<i64>>> = tree
            .children_by_name(sales.id(), "Sales_master_data")
            .map(|master| {
                tree.children_by_name(master.id(), "Sales")
                    .map(|cell| cell.field("amount").and_then(Value::as_i64))
                    .collect()
            })
            .collect();
        assert_eq!(amounts, vec![vec![Some(10), Some(20)], vec![None, Some(5)]]);
    }

    #[test]
    fn crosstab_without_header_fails() {
        let band = ReportBand::new("Grid".try_into().unwrap(), BandOrientation::Crosstab)
            .with_child(ReportBand::new(
                "Grid_master_data".try_into().unwrap(),
                BandOrientation::Vertical,
            ));
        let definition = ReportDefinition {
            name: "grid".to_owned(),
            parameters: Vec::new(),
            bands: vec![band],
        };

        let err = DataExtractor::default()
            .extract(&definition, Params::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::CrosstabChildMissing { ref missing, .. } if missing == "Grid_dynamic_header"
        ));
    }

    #[test]
    fn empty_row_when_nothing_selected() {
        let band = ReportBand::new("Empty".try_into().unwrap(), BandOrientation::Horizontal)
            .with_data_set(DataSet::new("none".try_into().unwrap(), STATIC_LOADER, ""));
        let definition = ReportDefinition {
            name: "empty".to_owned(),
            parameters: Vec::new(),
            bands: vec![band],
        };

        let tree = DataExtractor::default()
            .extract(&definition, Params::new())
            .unwrap();
        let empty = tree.first_child_by_name(BandDataId::ROOT, "Empty").unwrap();
        assert!(empty.data().is_empty());

        let config = ExtractionConfig {
            put_empty_row_if_no_data_selected: false,
            ..Default::default()
        };
        let tree = DataExtractor::new(config)
            .extract(&definition, Params::new())
            .unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn missing_parameters_and_loaders() {
        let definition = ReportDefinition::from_yaml(Sample::Orders.into()).unwrap();

        let err = DataExtractor::default()
            .extract(&definition, Params::new())
            .unwrap_err();
        assert!(matches!(err, ExtractionError::MissingParameters(ref p) if p == &["customers"]));

        // No SQL executor registered.
        let err = DataExtractor::default()
            .extract(&definition, row! { "customers" => customers() })
            .unwrap_err();
        match err {
            ExtractionError::Load {
                band,
                source: LoadError::UnknownLoader(loader),
                ..
            } => {
                assert_eq!(band, "Lines");
                assert_eq!(loader, "sql");
            }
            other => panic!("expected unknown loader, got {other}"),
        }
    }

    #[test]
    fn depth_limit() {
        fn nest(depth: usize) -> ReportBand {
            let rows = vec![row! { "x" => 1i64 }];
            let mut band = ReportBand::new(
                format!("B{depth}").try_into().unwrap(),
                BandOrientation::Horizontal,
            )
            .with_data_set(DataSet::new("ds".try_into().unwrap(), STATIC_LOADER, "").with_rows(rows));
            if depth < 5 {
                band = band.with_child(nest(depth + 1));
            }
            band
        }

        let definition = ReportDefinition {
            name: "deep".to_owned(),
            parameters: Vec::new(),
            bands: vec![nest(1)],
        };

        let ok = DataExtractor::default().extract(&definition, Params::new());
        assert_eq!(ok.unwrap().len(), 6);

        let config = ExtractionConfig {
            max_depth: 3,
            ..Default::default()
        };
        let err = DataExtractor::new(config)
            .extract(&definition, Params::new())
            .unwrap_err();
        assert!(matches!(err, ExtractionError::TooDeep { ref band, limit: 3 } if band == "B4"));
    }

    #[test]
    fn crosstab_cells_count_towards_depth_limit() {
        let definition = ReportDefinition::from_yaml(Sample::Orders.into()).unwrap();
        let params = row! { "customers" => customers() };

        // Headers and master rows sit at depth 2, their cells at depth 3.
        let config = ExtractionConfig {
            max_depth: 2,
            ..Default::default()
        };
        let err = DataExtractor::new(config)
            .with_loaders(LoaderFactory::default().with_sql(Arc::new(Shop::default())))
            .extract(&definition, params.clone())
            .unwrap_err();
        assert!(matches!(err, ExtractionError::TooDeep { ref band, limit: 2 } if band == "Sales"));

        let config = ExtractionConfig {
            max_depth: 3,
            ..Default::default()
        };
        let tree = DataExtractor::new(config)
            .with_loaders(LoaderFactory::default().with_sql(Arc::new(Shop::default())))
            .extract(&definition, params)
            .unwrap();
        let mut deepest = 0;
        tree.visit(|_, depth| deepest = deepest.max(depth));
        assert_eq!(deepest, 3);
    }
}

//! Bandex extracts the data of a report from its definition: a tree of bands, each
//! band describing how to load its rows. The result is a tree of band data ready to be
//! handed to a formatter that renders the report template.
//!
//! # Report Definition
//! A report is described in a YAML file with its parameters and a tree of bands below
//! an implicit root band named `Root`. The root band data holds the parameters the
//! report was run with.
//!
//! ```yaml
//! name: Orders by customer
//! parameters:
//!   - name: customers
//!     required: true
//! bands:
//!   - name: Customer
//!     data_sets:
//!       - name: customers
//!         type: parameter
//!         query: customers
//!     bands:
//!       - name: Lines
//!         data_sets:
//!           - name: lines
//!             type: sql
//!             query: select * from lines where customer = ${Customer.id}
//! ```
//!
//! ## Bands & Data Sets
//! Every band has one or more data sets. A data set names a loader type (`sql`,
//! `parameter`, `static` or any registered one) and a query the loader understands.
//! Rows of several data sets are merged, either joined by a link field or appended.
//!
//! Every row of a band becomes one band data, and the child bands are extracted once
//! per such row. While doing so, the fields of the row are visible to the child
//! queries as `<Band>.<field>` parameters.
//!
//! ## Orientation
//! Horizontal and vertical bands only matter to the formatter. Crosstab bands are
//! extracted differently: their `<Band>_dynamic_header` and `<Band>_master_data`
//! children give the column and row headers, and the crosstab band itself is loaded
//! once per pair of them. Other orientations can get their own controller through
//! the [extraction::ExtractionControllerFactory].
//!
//! ## Queries
//! Queries go through a preprocessor picked by loader type before being loaded. SQL
//! queries have their `${name}` placeholders replaced by positional markers and may
//! contain `[[...]]` fragments that are dropped when a parameter inside is not set.
//! The SQL itself is run by an [loader::SqlExecutor] provided by the application.
//!
//! # Dynamic Attributes
//! Entities can carry attributes that are not part of their schema but described in
//! category files, see [dynattr]. The metadata gives attribute sets per category,
//! default values, the order in which dependent attributes are recalculated after a
//! change, and the layout of an attributes panel.

/// Report band definitions and the extracted band data tree.
pub mod band;

/// Engine configuration read from YAML.
pub mod config;

/// Immutable context passed down the band tree while extracting.
pub mod ctx;

/// Report definition files.
pub mod definition;

/// Dynamic attributes metadata.
pub mod dynattr;

/// Controllers that extract bands, and the factory picking one per orientation.
pub mod extraction;

/// Entry point of the extraction of a report.
pub mod extractor;

/// Loaders that fetch the rows of a data set.
pub mod loader;

/// Validated names of bands, parameters and attributes.
pub mod name;

/// Query preprocessing before loading.
pub mod preprocess;

/// Byte ranges in query text, for error reporting.
pub mod span;

/// Dynamically typed values of rows and parameters.
pub mod value;

pub use definition::ReportDefinition;
pub use extractor::DataExtractor;

#[cfg(test)]
pub fn init_log() {
    use log::*;

    static INIT: std::sync::Once = std::sync::Once::new();

    INIT.call_once(|| {
        flexi_logger::Logger::with(LevelFilter::Trace)
            .format(format)
            .start()
            .unwrap();
    });

    fn format(
        write: &mut dyn std::io::Write,
        _: &mut flexi_logger::DeferredNow,
        record: &Record,
    ) -> std::io::Result<()> {
        write.write_all(
            format!(
                "[{} {}:{}] {} - {}",
                record.level(),
                record.file().unwrap_or_default(),
                record.line().unwrap_or_default(),
                record.module_path().unwrap_or_default(),
                record.args()
            )
            .as_bytes(),
        )
    }
}

/// Sample files used by the tests.
#[cfg(test)]
pub enum Sample {
    Orders,
    Categories,
    Config,
}

#[cfg(test)]
impl From<Sample> for &'static str {
    fn from(sample: Sample) -> Self {
        use Sample::*;
        match sample {
            Orders => include_str!("../samples/orders.yaml"),
            Categories => include_str!("../samples/categories.yaml"),
            Config => include_str!("../samples/config.yaml"),
        }
    }
}

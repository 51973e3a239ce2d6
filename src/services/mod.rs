pub mod catalog;
pub mod connections;
pub mod exporter;
pub mod fx_updater;
pub mod importer;
pub mod normalizer;
pub mod table;

pub use exporter::CatalogExporter;
pub use fx_updater::FxUpdater;
pub use importer::SheetImporter;

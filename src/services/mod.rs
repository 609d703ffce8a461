pub mod batch;
pub mod catalog;
pub mod entity_store;
pub mod genres;
pub mod providers;

pub use batch::BatchFetcher;
pub use catalog::Catalog;
pub use entity_store::EntityStore;
pub use genres::{GenreCatalog, GenreReconciler};
pub use providers::{CatalogProvider, RetryPolicy, TmdbClient};

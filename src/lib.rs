pub mod differ;
pub mod error;
pub mod logging;
pub mod query;
pub mod reconcile;
pub mod run;
pub mod store;
pub mod upstream;

pub mod db;
pub mod document;
pub mod error;
pub mod integrity;
pub mod models;
pub mod reconcile;
pub mod schema;
pub mod store;
pub mod submission;
pub mod validation;

pub use document::Document;
pub use error::{CatalogError, Result};
pub use integrity::{DeleteOutcome, Dependent};
pub use reconcile::Candidate;
pub use schema::{CatalogSchema, EntityKind};
pub use store::{ListQuery, Store};
pub use submission::{Submission, WriteOutcome};
pub use validation::{Draft, FieldError, FormInput};

//! Resource services: CRUD, hydrate, dehydrate, filtering, validation, history.

mod crud;
pub mod dehydrate;
pub mod filtering;
pub mod history;
pub mod hydrate;
mod validation;

pub use crud::{Change, CrudService, RowMap};
pub use dehydrate::{dehydrate_one, dehydrate_rows};
pub use filtering::{parse_filters, parse_ordering};
pub use history::list_history;
pub use hydrate::{hydrate, parse_id, parse_reference, WriteMode};
pub use validation::{RequestValidator, ValidationMode};

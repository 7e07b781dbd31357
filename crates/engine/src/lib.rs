pub mod catalog;
pub mod costing;
pub mod dep_graph;
pub mod editor;
pub mod error;
pub mod events;
pub mod formula;
pub mod recalc;
pub mod suggest;
pub mod validation;

pub use catalog::{Catalog, ExtraRef, FormulaRef, ProductRef, VariableRef};
pub use editor::{FormulaEditor, VariableCreator};
pub use error::FormulaError;
pub use validation::ValidationVerdict;

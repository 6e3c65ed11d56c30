//! The sheet model: tables on a grid, what is visible of them, and how cells
//! are addressed.

pub mod bbox;
pub mod data;
pub mod document;
pub mod dtypes;
pub mod naming;
pub mod selection;
pub mod view;

pub use bbox::{BoundingBox, CellMetadata, Collision, Direction};
pub use data::{Block, SheetData};
pub use document::SheetDocument;
pub use dtypes::{DtypeClass, class_of, long_name, parse_dtype, short_name};
pub use selection::{CellRange, index_to_name, name_to_index};
pub use view::{Filter, FilterCondition, FilterJoin, SheetView, SortKey};

pub mod dialect;
pub mod operation;
pub mod translate;
pub mod value;

pub use dialect::{Dialect, RowLimit};
pub use operation::{LogicalOperation, NewBook, NewGrade, NewStudent, OperationKind};
pub use translate::{translate, Statement};
pub use value::SqlValue;

pub mod ledger;
pub mod runner;
pub mod unit;

pub use ledger::{Ledger, LedgerEntry, LedgerStatus};
pub use runner::apply;
pub use unit::{ColumnDef, ColumnType, MigrationUnit, SchemaOp};

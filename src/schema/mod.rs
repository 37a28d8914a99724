//! Table structure: constraint inspection and tracking-column provisioning.

mod inspector;
mod provisioner;

pub use inspector::{ColumnInfo, ConstraintInspector, TableSchema, UniqueIndex};
pub use provisioner::{ProvisionReport, SchemaProvisioner};

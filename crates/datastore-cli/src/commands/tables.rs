//! Table command handler

use anyhow::Result;

use datastore_core::builder;

use crate::output::Output;
use crate::schema::Schema;

/// Print the `CREATE TABLE` statement of every model
pub fn list(schema: &Schema, output: &Output) -> Result<()> {
    for model in schema.models() {
        output.print_statement(model.name(), &builder::create_table(model).sql);
    }
    Ok(())
}

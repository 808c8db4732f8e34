//! Find command handler

use std::sync::Arc;

use anyhow::Result;

use datastore_core::{Datastore, FindRequest, ModelDescriptor};

use crate::client;
use crate::output::Output;
use crate::schema::{parse_param, Schema};

/// Options of the `find` command
pub struct FindArgs {
    pub model: String,
    pub columns: Vec<String>,
    pub constraint: Option<String>,
    pub params: Vec<String>,
    pub order: Option<String>,
    pub limit: Option<u64>,
}

/// Print the records matching `args`
pub async fn find(datastore: &Datastore, schema: &Schema, args: FindArgs, output: &Output) -> Result<()> {
    let model = schema.model(&args.model)?;
    let request = build_request(model, args);
    let records = client::find(datastore, request).await?;
    output.print_records(model, &records);
    Ok(())
}

fn build_request(model: &Arc<ModelDescriptor>, args: FindArgs) -> FindRequest {
    let mut request = FindRequest::new(Arc::clone(model));
    if !args.columns.is_empty() {
        request = request.columns(args.columns);
    }
    if let Some(statement) = args.constraint {
        let params = args.params.iter().map(|p| parse_param(p)).collect();
        request = request.constraint(statement, params);
    }
    if let Some(order) = args.order {
        request = request.order(order);
    }
    if let Some(limit) = args.limit {
        request = request.limit(limit);
    }
    request
}

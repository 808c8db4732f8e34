//! Record command handlers

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use datastore_core::{Datastore, FindRequest, ModelDescriptor, RecordHandle, Value, ID_COLUMN};

use crate::client;
use crate::output::Output;
use crate::schema::{parse_assignment, parse_value, Schema};

/// Insert a new record
pub async fn put(
    datastore: &Datastore,
    schema: &Schema,
    model: String,
    assignments: Vec<String>,
    output: &Output,
) -> Result<()> {
    let model = schema.model(&model)?;
    // Client IDs must continue after those stored by earlier runs
    datastore
        .ensure_ready(model)
        .await
        .with_context(|| format!("Failed to prepare {}", model.name()))?;
    let record = model.create_record();
    assign(model, &record, &assignments)?;

    let record = client::save(datastore, record)
        .await
        .with_context(|| format!("Failed to insert {}", model.name()))?;

    let id = record
        .persisted_id()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "?".to_string());
    output.success(&format!("Created {} {}", model.name(), id));
    output.print_record(&record);
    Ok(())
}

/// Update fields of a stored record
pub async fn set(
    datastore: &Datastore,
    schema: &Schema,
    model: String,
    id: i64,
    assignments: Vec<String>,
    output: &Output,
) -> Result<()> {
    let model = schema.model(&model)?;
    let record = load(datastore, model, id).await?;
    assign(model, &record, &assignments)?;

    let record = client::save(datastore, record)
        .await
        .with_context(|| format!("Failed to update {} {}", model.name(), id))?;
    record.lock().mark_clean();

    output.success(&format!("Updated {} {}", model.name(), id));
    output.print_record(&record);
    Ok(())
}

/// Delete a stored record
pub async fn delete(
    datastore: &Datastore,
    schema: &Schema,
    model: String,
    id: i64,
    output: &Output,
) -> Result<()> {
    let model = schema.model(&model)?;
    let record = load(datastore, model, id).await?;

    client::delete(datastore, record)
        .await
        .with_context(|| format!("Failed to delete {} {}", model.name(), id))?;

    output.success(&format!("Deleted {} {}", model.name(), id));
    Ok(())
}

/// Fetch one record by its store ID
async fn load(datastore: &Datastore, model: &Arc<ModelDescriptor>, id: i64) -> Result<RecordHandle> {
    let request = FindRequest::new(Arc::clone(model))
        .constraint(format!("WHERE {} = ?", ID_COLUMN), vec![Value::Integer(id)]);
    client::find(datastore, request)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("{} not found: {}", model.name(), id))
}

/// Apply `field=value` assignments, parsing each value by its attribute kind
fn assign(model: &ModelDescriptor, record: &RecordHandle, assignments: &[String]) -> Result<()> {
    let mut record = record.lock();
    for text in assignments {
        let (field, raw) = parse_assignment(text)?;
        let attribute = model
            .attribute(field)
            .ok_or_else(|| anyhow!("{} has no attribute '{}'", model.name(), field))?;
        let value = parse_value(attribute.kind, raw)?;
        record.set(field, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::from_toml(
            r#"
            [[model]]
            name = "User"
            [[model.attribute]]
            name = "name"
            kind = "String"
            [[model.attribute]]
            name = "age"
            kind = "Integer"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_assign_parses_by_kind() {
        let schema = schema();
        let model = schema.model("User").unwrap();
        let record = model.create_record();

        assign(
            model,
            &record,
            &["name=Ann".to_string(), "age=30".to_string()],
        )
        .unwrap();
        assert_eq!(record.get("name"), Some(Value::from("Ann")));
        assert_eq!(record.get("age"), Some(Value::Integer(30)));
        assert!(record.lock().is_dirty("age"));
    }

    #[test]
    fn test_assign_rejects_unknown_field() {
        let schema = schema();
        let model = schema.model("User").unwrap();
        let record = model.create_record();
        assert!(assign(model, &record, &["height=2".to_string()]).is_err());
        assert!(assign(model, &record, &["age=old".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_put_set_delete() {
        let datastore = Datastore::configure(datastore_core::StoreConfig::in_memory("cli")).unwrap();
        let schema = schema();
        let output = Output::new(crate::output::OutputFormat::Json);

        put(
            &datastore,
            &schema,
            "User".to_string(),
            vec!["name=Ann".to_string(), "age=30".to_string()],
            &output,
        )
        .await
        .unwrap();

        set(
            &datastore,
            &schema,
            "user".to_string(),
            1,
            vec!["age=31".to_string()],
            &output,
        )
        .await
        .unwrap();

        let model = schema.model("User").unwrap();
        let stored = load(&datastore, model, 1).await.unwrap();
        assert_eq!(stored.get("age"), Some(Value::Integer(31)));
        assert_eq!(stored.get("name"), Some(Value::from("Ann")));

        delete(&datastore, &schema, "User".to_string(), 1, &output)
            .await
            .unwrap();
        assert!(load(&datastore, model, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_put_in_separate_runs_gets_distinct_client_ids() {
        let dir = tempfile::tempdir().unwrap();
        let config = datastore_core::StoreConfig::new("cli").with_data_dir(dir.path());
        let output = Output::new(crate::output::OutputFormat::Json);

        for name in ["Ann", "Bob"] {
            let datastore = Datastore::configure(config.clone()).unwrap();
            put(
                &datastore,
                &schema(),
                "User".to_string(),
                vec![format!("name={}", name)],
                &output,
            )
            .await
            .unwrap();
        }

        let datastore = Datastore::configure(config).unwrap();
        let schema = schema();
        let model = schema.model("User").unwrap();
        let first = load(&datastore, model, 1).await.unwrap();
        let second = load(&datastore, model, 2).await.unwrap();
        assert_ne!(first.client_id(), second.client_id());
    }
}

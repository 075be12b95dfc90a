//! Session scripts: table definitions, seed rows and replay steps.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use tracked_session_core::{
    DatabaseChangeSet, MemoryBackend, PrimaryKeyValue, Row, SessionConfig, TableMetadata,
    TrackedSession, Value,
};

/// A replayable session script.
#[derive(Debug, Deserialize)]
pub struct Script {
    pub tables: Vec<TableDef>,
    #[serde(default)]
    pub seed: Vec<RowDef>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
pub struct TableDef {
    #[serde(default)]
    pub schema: Option<String>,
    pub name: String,
    pub columns: Vec<String>,
    pub primary_key: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RowDef {
    pub table: String,
    pub values: Map<String, JsonValue>,
}

/// One session operation.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Fetch {
        table: String,
        key: Vec<JsonValue>,
    },
    Insert {
        table: String,
        values: Map<String, JsonValue>,
    },
    Update {
        table: String,
        values: Map<String, JsonValue>,
    },
    Delete {
        table: String,
        values: Map<String, JsonValue>,
    },
    DeleteById {
        table: String,
        key: Vec<JsonValue>,
    },
    Begin,
    Complete,
    Abort,
}

/// Reads and parses a script file.
pub fn load(path: &Path) -> anyhow::Result<Script> {
    let text = std::fs::read_to_string(path)?;
    parse(&text)
}

/// Parses a script from JSON text.
pub fn parse(text: &str) -> anyhow::Result<Script> {
    Ok(serde_json::from_str(text)?)
}

/// Converts a JSON scalar into a column value.
///
/// Byte sequences are written as `{"bytes": "<hex>"}`.
pub fn to_value(json: &JsonValue) -> anyhow::Result<Value> {
    match json {
        JsonValue::Null => Ok(Value::Null),
        JsonValue::Bool(b) => Ok(Value::Bool(*b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Int(i)),
            None => n
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| anyhow!("unsupported number {}", n)),
        },
        JsonValue::String(s) => Ok(Value::Text(s.clone())),
        JsonValue::Object(map) => match map.get("bytes") {
            Some(JsonValue::String(encoded)) if map.len() == 1 => {
                let bytes = hex::decode(encoded)
                    .with_context(|| format!("invalid hex byte string '{}'", encoded))?;
                Ok(Value::Bytes(bytes))
            }
            _ => bail!("unsupported object value {}", json),
        },
        JsonValue::Array(_) => bail!("unsupported array value {}", json),
    }
}

/// Script tables keyed by `[schema].[table]`.
///
/// Steps name a table either as `schema.name` or, when no other schema
/// declares the same name, as the bare `name`.
struct Tables {
    by_key: HashMap<String, Arc<TableMetadata>>,
}

impl Tables {
    fn build(defs: &[TableDef], default_schema: &str) -> anyhow::Result<Self> {
        let mut by_key = HashMap::with_capacity(defs.len());
        for def in defs {
            let mut metadata =
                TableMetadata::new(def.name.clone(), def.columns.iter().cloned(), &def.primary_key)?;
            if let Some(schema) = &def.schema {
                metadata = metadata.with_schema(schema.clone());
            }
            let table_key = metadata.table_key(default_schema);
            if by_key.insert(table_key.clone(), Arc::new(metadata)).is_some() {
                bail!("table {} defined twice", table_key);
            }
        }
        Ok(Self { by_key })
    }

    fn get(&self, name: &str) -> anyhow::Result<&Arc<TableMetadata>> {
        if let Some((schema, table)) = name.split_once('.') {
            let table_key = format!("[{}].[{}]", schema, table);
            return self
                .by_key
                .get(&table_key)
                .ok_or_else(|| anyhow!("unknown table '{}'", name));
        }

        let mut matches = self.by_key.values().filter(|m| m.name() == name);
        match (matches.next(), matches.next()) {
            (Some(metadata), None) => Ok(metadata),
            (Some(_), Some(_)) => bail!(
                "table '{}' exists in several schemas, qualify it as 'schema.{}'",
                name,
                name
            ),
            (None, _) => bail!("unknown table '{}'", name),
        }
    }

    fn row(&self, table: &str, values: &Map<String, JsonValue>) -> anyhow::Result<Row> {
        let metadata = Arc::clone(self.get(table)?);
        let pairs = values
            .iter()
            .map(|(column, json)| Ok((column.as_str(), to_value(json)?)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Row::from_pairs(metadata, pairs)?)
    }

    fn key(&self, table: &str, key: &[JsonValue]) -> anyhow::Result<PrimaryKeyValue> {
        let parts = key.iter().map(to_value).collect::<anyhow::Result<Vec<_>>>()?;
        Ok(self.get(table)?.key_from_parts(parts)?)
    }
}

/// Runs every step of `script` and returns the consolidated change set.
///
/// Without tracking the returned change set is empty.
pub fn run(script: &Script, config: SessionConfig) -> anyhow::Result<DatabaseChangeSet> {
    let tables = Tables::build(&script.tables, &config.default_schema)?;

    let mut backend = MemoryBackend::with_default_schema(config.default_schema.clone());
    for seed in &script.seed {
        backend.seed(&tables.row(&seed.table, &seed.values)?)?;
    }

    let captured = Rc::new(RefCell::new(DatabaseChangeSet::default()));
    let slot = Rc::clone(&captured);
    let mut session = TrackedSession::new(backend, config).on_complete(move |changes| {
        *slot.borrow_mut() = changes.clone();
        Ok(())
    });

    for (index, step) in script.steps.iter().enumerate() {
        tracing::debug!("Step {}: {:?}", index, step);
        apply(&mut session, &tables, step).with_context(|| format!("Step {} failed", index))?;
    }

    session.close()?;
    let changes = captured.take();
    Ok(changes)
}

fn apply(
    session: &mut TrackedSession<MemoryBackend>,
    tables: &Tables,
    step: &Step,
) -> anyhow::Result<()> {
    match step {
        Step::Fetch { table, key } => {
            let metadata = tables.get(table)?;
            if session.fetch(metadata, &tables.key(table, key)?)?.is_none() {
                tracing::warn!("Fetch of {:?} in '{}' found nothing", key, table);
            }
        }
        Step::Insert { table, values } => session.insert(&tables.row(table, values)?)?,
        Step::Update { table, values } => session.update(&tables.row(table, values)?)?,
        Step::Delete { table, values } => session.delete(&tables.row(table, values)?)?,
        Step::DeleteById { table, key } => {
            session.delete_by_id(tables.get(table)?, &tables.key(table, key)?)?
        }
        Step::Begin => session.begin_transaction()?,
        Step::Complete => session.complete_transaction()?,
        Step::Abort => session.abort_transaction()?,
    }
    Ok(())
}

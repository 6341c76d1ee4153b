//! Relation schema derivation and DDL.

use crate::destination::Destination;
use crate::error::SchemaError;
use crate::ident::{quote_ident, quote_relation};
use std::collections::HashMap;
use tracing::{debug, info};

/// A header column and the identifier it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub normalized_name: String,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let normalized_name = normalize_column_name(&name);
        Self {
            name,
            normalized_name,
        }
    }
}

/// Ordered columns of a load relation. Every column is `TEXT`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelationSchema {
    columns: Vec<Column>,
}

impl RelationSchema {
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Normalized names in column order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| c.normalized_name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Lowercase, with spaces and hyphens turned into underscores.
///
/// ```
/// use bulkcopy_postgresql::normalize_column_name;
///
/// assert_eq!(normalize_column_name("First Name"), "first_name");
/// assert_eq!(normalize_column_name("Last-Name"), "last_name");
/// ```
pub fn normalize_column_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            other => other,
        })
        .collect()
}

/// Lowercase a relation name, as PostgreSQL folds an unquoted one.
/// `Staging.People` becomes `staging.people`.
pub fn normalize_relation_name(name: &str) -> String {
    name.to_lowercase()
}

/// Build the relation schema from a header row.
///
/// Fails if a column normalizes to an empty name or if two columns
/// normalize to the same name.
pub fn derive_schema(header: &[String]) -> Result<RelationSchema, SchemaError> {
    let mut seen: HashMap<String, &str> = HashMap::with_capacity(header.len());
    let mut columns = Vec::with_capacity(header.len());

    for (i, name) in header.iter().enumerate() {
        let column = Column::new(name.as_str());

        if column.normalized_name.is_empty() {
            return Err(SchemaError::EmptyColumn {
                position: i + 1,
                name: name.clone(),
            });
        }

        if let Some(first) = seen.insert(column.normalized_name.clone(), name.as_str()) {
            return Err(SchemaError::DuplicateColumn {
                first: first.to_string(),
                second: name.clone(),
                normalized: column.normalized_name,
            });
        }

        columns.push(column);
    }

    Ok(RelationSchema { columns })
}

/// Generate DROP TABLE statement.
pub fn drop_relation_sql(relation: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_relation(relation))
}

/// Generate the CREATE UNLOGGED TABLE statement: all columns `TEXT`, no
/// constraints, no indexes.
pub fn create_relation_sql(relation: &str, schema: &RelationSchema) -> String {
    let columns = schema
        .columns()
        .iter()
        .map(|c| format!("{} TEXT", quote_ident(&c.normalized_name)))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "CREATE UNLOGGED TABLE {} ({columns})",
        quote_relation(relation)
    )
}

/// Drop any existing relation named `relation` and create it afresh.
///
/// Destructive: the old relation and its data are gone once this returns,
/// even if creation then fails.
pub async fn prepare_relation<D>(
    destination: &mut D,
    relation: &str,
    schema: &RelationSchema,
) -> Result<(), SchemaError>
where
    D: Destination + ?Sized,
{
    info!("Dropping table: {}", relation);
    destination
        .execute(&drop_relation_sql(relation))
        .await
        .map_err(|source| SchemaError::Drop {
            relation: relation.to_string(),
            source,
        })?;

    let sql = create_relation_sql(relation, schema);
    info!("Creating UNLOGGED table: {}", relation);
    debug!("DDL: {}", sql);
    destination
        .execute(&sql)
        .await
        .map_err(|source| SchemaError::Create {
            relation: relation.to_string(),
            source,
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryDestination;

    fn header(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_column_name() {
        assert_eq!(normalize_column_name("First Name"), "first_name");
        assert_eq!(normalize_column_name("Last-Name"), "last_name");
        assert_eq!(normalize_column_name("already_fine"), "already_fine");
        assert_eq!(normalize_column_name("Zip Code - US"), "zip_code___us");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for name in ["First Name", "Last-Name", "ÉCOLE-Nom", "a b-c", "", "x\"y"] {
            let once = normalize_column_name(name);
            assert_eq!(normalize_column_name(&once), once, "input: {name:?}");
        }
    }

    #[test]
    fn test_normalize_relation_name() {
        assert_eq!(normalize_relation_name("People"), "people");
        assert_eq!(normalize_relation_name("Staging.People"), "staging.people");
    }

    #[test]
    fn test_derive_schema_keeps_order() {
        let schema = derive_schema(&header(&["First Name", "Last-Name", "age"])).unwrap();
        assert_eq!(schema.column_names(), vec!["first_name", "last_name", "age"]);
        assert_eq!(schema.columns()[0].name, "First Name");
        assert_eq!(schema.len(), 3);
    }

    #[test]
    fn test_derive_schema_rejects_collisions() {
        let err = derive_schema(&header(&["First Name", "first-name"])).unwrap_err();
        match err {
            SchemaError::DuplicateColumn {
                first,
                second,
                normalized,
            } => {
                assert_eq!(first, "First Name");
                assert_eq!(second, "first-name");
                assert_eq!(normalized, "first_name");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_derive_schema_rejects_empty_names() {
        let err = derive_schema(&header(&["a", ""])).unwrap_err();
        assert!(matches!(err, SchemaError::EmptyColumn { position: 2, .. }));
    }

    #[test]
    fn test_create_relation_sql() {
        let schema = derive_schema(&header(&["name", "age"])).unwrap();
        assert_eq!(
            create_relation_sql("people", &schema),
            "CREATE UNLOGGED TABLE \"people\" (\"name\" TEXT, \"age\" TEXT)"
        );
    }

    #[test]
    fn test_drop_relation_sql() {
        assert_eq!(drop_relation_sql("people"), "DROP TABLE IF EXISTS \"people\"");
        assert_eq!(
            drop_relation_sql("staging.people"),
            "DROP TABLE IF EXISTS \"staging\".\"people\""
        );
    }

    #[tokio::test]
    async fn test_prepare_relation_recreates() {
        let mut destination = MemoryDestination::new();

        let first = derive_schema(&header(&["a", "b"])).unwrap();
        prepare_relation(&mut destination, "t", &first).await.unwrap();
        let second = derive_schema(&header(&["c"])).unwrap();
        prepare_relation(&mut destination, "t", &second).await.unwrap();

        let relation = destination.relation("t").unwrap();
        assert_eq!(relation.columns, vec!["c"]);
        assert!(relation.rows.is_empty());
    }

    #[tokio::test]
    async fn test_prepare_relation_reports_rejected_create() {
        let mut destination = MemoryDestination::new().reject_statements("CREATE");
        let schema = derive_schema(&header(&["a"])).unwrap();

        let err = prepare_relation(&mut destination, "t", &schema)
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaError::Create { ref relation, .. } if relation == "t"));
    }

    #[tokio::test]
    async fn test_prepare_relation_reports_rejected_drop() {
        let mut destination = MemoryDestination::new().reject_statements("DROP");
        let schema = derive_schema(&header(&["a"])).unwrap();

        let err = prepare_relation(&mut destination, "t", &schema)
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaError::Drop { .. }));
        assert!(destination.relation("t").is_none());
    }
}

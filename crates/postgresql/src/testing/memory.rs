//! In-memory [`Destination`] used by unit and integration tests.
//!
//! Understands exactly the statements this crate generates (`DROP TABLE IF
//! EXISTS`, `CREATE UNLOGGED TABLE`, `SET`, `RESET`) and mimics the
//! PostgreSQL behaviour the loader relies on: rows copied inside a
//! transaction only become visible on commit, and rows whose field count
//! does not match the relation are refused. With
//! [`MemoryDestination::buffer_rows`] that refusal happens on finish and
//! names the row, as it does once PostgreSQL has rows buffered.

use crate::destination::{CopyChannel, Destination, LoadTransaction};
use crate::error::DestinationError;
use crate::ident::{parse_quoted_ident, parse_quoted_relation};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};

/// A relation held by [`MemoryDestination`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryRelation {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Default)]
pub struct MemoryDestination {
    relations: BTreeMap<String, MemoryRelation>,
    settings: BTreeMap<String, String>,
    statements: Vec<String>,
    rejected_parameters: HashSet<String>,
    rejected_prefixes: Vec<String>,
    fail_on_row: Option<u64>,
    fail_on_finish: bool,
    fail_on_commit: bool,
    buffer_rows: bool,
    rows_submitted: u64,
    commits: usize,
    rollbacks: usize,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse `SET` / `RESET` of `parameter`.
    pub fn reject_parameter(mut self, parameter: &str) -> Self {
        self.rejected_parameters.insert(parameter.to_string());
        self
    }

    /// Refuse every statement starting with `prefix`.
    pub fn reject_statements(mut self, prefix: &str) -> Self {
        self.rejected_prefixes.push(prefix.to_string());
        self
    }

    /// Fail the `row`-th submission (1-based) of every `COPY`.
    pub fn fail_on_row(mut self, row: u64) -> Self {
        self.fail_on_row = Some(row);
        self
    }

    /// Fail when a `COPY` is finished.
    pub fn fail_on_finish(mut self) -> Self {
        self.fail_on_finish = true;
        self
    }

    /// Check field counts on finish instead of on submit.
    pub fn buffer_rows(mut self) -> Self {
        self.buffer_rows = true;
        self
    }

    /// Fail every commit.
    pub fn fail_on_commit(mut self) -> Self {
        self.fail_on_commit = true;
        self
    }

    /// Seed a relation directly, bypassing DDL.
    pub fn with_relation(mut self, name: &str, relation: MemoryRelation) -> Self {
        self.relations.insert(name.to_string(), relation);
        self
    }

    pub fn relation(&self, name: &str) -> Option<&MemoryRelation> {
        self.relations.get(name)
    }

    pub fn setting(&self, parameter: &str) -> Option<&str> {
        self.settings.get(parameter).map(String::as_str)
    }

    /// Every statement passed to [`Destination::execute`], accepted or not.
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Rows submitted across all `COPY` channels, including refused ones.
    pub fn rows_submitted(&self) -> u64 {
        self.rows_submitted
    }

    pub fn commits(&self) -> usize {
        self.commits
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks
    }

    fn drop_relation(&mut self, rest: &str) -> Result<(), DestinationError> {
        let (name, tail) = parse_quoted_relation(rest).ok_or_else(|| malformed(rest))?;
        if !tail.is_empty() {
            return Err(malformed(rest));
        }
        self.relations.remove(&name);
        Ok(())
    }

    fn create_relation(&mut self, rest: &str) -> Result<(), DestinationError> {
        let (name, tail) = parse_quoted_relation(rest).ok_or_else(|| malformed(rest))?;
        let mut definitions = tail
            .strip_prefix(" (")
            .and_then(|t| t.strip_suffix(')'))
            .ok_or_else(|| malformed(rest))?;

        let mut columns: Vec<String> = Vec::new();
        loop {
            let (column, remaining) =
                parse_quoted_ident(definitions).ok_or_else(|| malformed(rest))?;
            let remaining = remaining
                .strip_prefix(" TEXT")
                .ok_or_else(|| malformed(rest))?;
            if columns.contains(&column) {
                return Err(DestinationError::Rejected(format!(
                    "column \"{column}\" specified more than once"
                )));
            }
            columns.push(column);
            if remaining.is_empty() {
                break;
            }
            definitions = remaining
                .strip_prefix(", ")
                .ok_or_else(|| malformed(rest))?;
        }

        if self.relations.contains_key(&name) {
            return Err(DestinationError::Rejected(format!(
                "relation \"{name}\" already exists"
            )));
        }
        self.relations.insert(
            name,
            MemoryRelation {
                columns,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    fn check_parameter(&self, parameter: &str) -> Result<(), DestinationError> {
        if self.rejected_parameters.contains(parameter) {
            return Err(DestinationError::Rejected(format!(
                "parameter \"{parameter}\" cannot be changed now"
            )));
        }
        Ok(())
    }
}

fn malformed(statement: &str) -> DestinationError {
    DestinationError::Rejected(format!("syntax error in statement: {statement}"))
}

#[async_trait]
impl Destination for MemoryDestination {
    async fn execute(&mut self, statement: &str) -> Result<(), DestinationError> {
        self.statements.push(statement.to_string());

        if self
            .rejected_prefixes
            .iter()
            .any(|p| statement.starts_with(p.as_str()))
        {
            return Err(DestinationError::Rejected(format!(
                "statement refused: {statement}"
            )));
        }

        if let Some(rest) = statement.strip_prefix("DROP TABLE IF EXISTS ") {
            return self.drop_relation(rest);
        }
        if let Some(rest) = statement.strip_prefix("CREATE UNLOGGED TABLE ") {
            return self.create_relation(rest);
        }
        if let Some(rest) = statement.strip_prefix("SET ") {
            let (parameter, value) = rest.split_once(" = ").ok_or_else(|| malformed(rest))?;
            self.check_parameter(parameter)?;
            self.settings
                .insert(parameter.to_string(), value.to_string());
            return Ok(());
        }
        if let Some(parameter) = statement.strip_prefix("RESET ") {
            self.check_parameter(parameter)?;
            self.settings.remove(parameter);
            return Ok(());
        }

        Err(DestinationError::Rejected(format!(
            "unsupported statement: {statement}"
        )))
    }

    async fn begin(&mut self) -> Result<Box<dyn LoadTransaction + '_>, DestinationError> {
        Ok(Box::new(MemoryTransaction {
            destination: self,
            staged: Vec::new(),
        }))
    }
}

struct MemoryTransaction<'a> {
    destination: &'a mut MemoryDestination,
    staged: Vec<(String, Vec<Vec<String>>)>,
}

#[async_trait]
impl LoadTransaction for MemoryTransaction<'_> {
    async fn copy_in(
        &mut self,
        relation: &str,
        columns: &[String],
    ) -> Result<Box<dyn CopyChannel + '_>, DestinationError> {
        let target = self
            .destination
            .relations
            .get(relation)
            .ok_or_else(|| {
                DestinationError::Rejected(format!("relation \"{relation}\" does not exist"))
            })?;

        if target.columns != columns {
            return Err(DestinationError::Rejected(format!(
                "COPY columns {columns:?} do not match relation columns {:?}",
                target.columns
            )));
        }

        Ok(Box::new(MemoryCopyChannel {
            relation: relation.to_string(),
            columns: columns.to_vec(),
            rows: Vec::new(),
            submitted: 0,
            fail_on_row: self.destination.fail_on_row,
            fail_on_finish: self.destination.fail_on_finish,
            buffer_rows: self.destination.buffer_rows,
            rows_submitted: &mut self.destination.rows_submitted,
            staged: &mut self.staged,
        }))
    }

    async fn commit(self: Box<Self>) -> Result<(), DestinationError> {
        let transaction = *self;
        let destination = transaction.destination;

        if destination.fail_on_commit {
            return Err(DestinationError::Rejected(
                "could not commit transaction".to_string(),
            ));
        }

        for (relation, rows) in transaction.staged {
            if let Some(target) = destination.relations.get_mut(&relation) {
                target.rows.extend(rows);
            }
        }
        destination.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DestinationError> {
        let destination = self.destination;
        destination.rollbacks += 1;
        Ok(())
    }
}

struct MemoryCopyChannel<'a> {
    relation: String,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    submitted: u64,
    fail_on_row: Option<u64>,
    fail_on_finish: bool,
    buffer_rows: bool,
    rows_submitted: &'a mut u64,
    staged: &'a mut Vec<(String, Vec<Vec<String>>)>,
}

#[async_trait]
impl CopyChannel for MemoryCopyChannel<'_> {
    async fn submit(&mut self, fields: &[String]) -> Result<(), DestinationError> {
        self.submitted += 1;
        *self.rows_submitted += 1;

        if self.fail_on_row == Some(self.submitted) {
            return Err(DestinationError::Rejected(format!(
                "injected failure on row {}",
                self.submitted
            )));
        }
        if !self.buffer_rows {
            check_fields(&self.columns, fields)?;
        }

        self.rows.push(fields.to_vec());
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<u64, DestinationError> {
        let MemoryCopyChannel {
            relation,
            columns,
            rows,
            fail_on_finish,
            buffer_rows,
            staged,
            ..
        } = *self;
        if fail_on_finish {
            return Err(DestinationError::Rejected(
                "injected failure on COPY finish".to_string(),
            ));
        }
        if buffer_rows {
            for (i, fields) in rows.iter().enumerate() {
                check_fields(&columns, fields).map_err(|source| DestinationError::Row {
                    record: i as u64 + 1,
                    source: Box::new(source),
                })?;
            }
        }

        let count = rows.len() as u64;
        staged.push((relation, rows));
        Ok(count)
    }
}

fn check_fields(columns: &[String], fields: &[String]) -> Result<(), DestinationError> {
    if fields.len() > columns.len() {
        return Err(DestinationError::Rejected(
            "extra data after last expected column".to_string(),
        ));
    }
    if let Some(missing) = columns.get(fields.len()) {
        return Err(DestinationError::Rejected(format!(
            "missing data for column \"{missing}\""
        )));
    }
    Ok(())
}

//! SQL text for the document table of one collection.
//!
//! Every collection is one table:
//!
//! ```text
//! id          UUID PRIMARY KEY
//! version     BIGINT NOT NULL
//! deleted_at  TIMESTAMPTZ
//! data        JSONB NOT NULL      -- the serialized entity
//! ```
//!
//! Field names never reach the SQL text: filters compare `data->>$n::text = $m`
//! with both sides bound, matching the text rendering of [`FilterValue`].
//! Only the table name is interpolated, after validation.
//!
//! [`FilterValue`]: tessera_core::FilterValue

use serde_json::Value as JsonValue;
use tessera_core::{Direction, Predicate, Scope, Sort, SortKey, StoreError, StoreResult, Version};
use tokio_postgres::types::ToSql;
use uuid::Uuid;

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Uuid(Uuid),
    BigInt(i64),
    Text(String),
    Json(JsonValue),
}

impl SqlParam {
    fn as_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            SqlParam::Uuid(v) => v,
            SqlParam::BigInt(v) => v,
            SqlParam::Text(v) => v,
            SqlParam::Json(v) => v,
        }
    }
}

/// SQL text plus its parameters in `$n` order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl Statement {
    fn new() -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Bind a parameter and return its placeholder.
    fn bind(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }

    pub fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(SqlParam::as_sql).collect()
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && name.len() <= 63
}

/// Statement builder for one collection table.
#[derive(Debug, Clone)]
pub struct TableSql {
    table: String,
}

impl TableSql {
    /// Fails unless `collection` is a plain lowercase SQL identifier.
    pub fn new(collection: &str) -> StoreResult<Self> {
        if !is_identifier(collection) {
            return Err(StoreError::backend(format!(
                "collection name '{collection}' is not a valid table name"
            )));
        }
        Ok(Self {
            table: collection.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn create_table(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {t} (\
             id UUID PRIMARY KEY, \
             version BIGINT NOT NULL, \
             deleted_at TIMESTAMPTZ, \
             data JSONB NOT NULL)",
            t = self.table
        )
    }

    /// Unique expression index over one document field.
    pub fn unique_index(&self, field: &str) -> StoreResult<String> {
        if !is_identifier(field) {
            return Err(StoreError::backend(format!(
                "field name '{field}' cannot be indexed"
            )));
        }
        Ok(format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {t}_{f}_key ON {t} ((data->>'{f}'))",
            t = self.table,
            f = field
        ))
    }

    fn where_clause(&self, stmt: &mut Statement, predicate: &Predicate) -> String {
        let mut conditions = Vec::new();
        if let Some(id) = predicate.id {
            let p = stmt.bind(SqlParam::Uuid(id));
            conditions.push(format!("id = {p}"));
        }
        if let Some(version) = predicate.version {
            let p = stmt.bind(SqlParam::BigInt(version));
            conditions.push(format!("version = {p}"));
        }
        for (field, value) in predicate.filters.iter() {
            let f = stmt.bind(SqlParam::Text(field.to_string()));
            let v = stmt.bind(SqlParam::Text(value.as_text()));
            conditions.push(format!("data->>{f}::text = {v}"));
        }
        match predicate.scope {
            Scope::Active => conditions.push("deleted_at IS NULL".to_string()),
            Scope::OnlyDeleted => conditions.push("deleted_at IS NOT NULL".to_string()),
            Scope::WithDeleted => {}
        }

        if conditions.is_empty() {
            "TRUE".to_string()
        } else {
            conditions.join(" AND ")
        }
    }

    /// Multi-row insert of `(id, version, data)` triples.
    pub fn insert(&self, rows: &[(Uuid, Version, JsonValue)]) -> Statement {
        let mut stmt = Statement::new();
        let mut values = Vec::with_capacity(rows.len());
        for (id, version, data) in rows {
            let id = stmt.bind(SqlParam::Uuid(*id));
            let version = stmt.bind(SqlParam::BigInt(*version));
            let data = stmt.bind(SqlParam::Json(data.clone()));
            values.push(format!("({id}, {version}, {data})"));
        }
        stmt.sql = format!(
            "INSERT INTO {} (id, version, data) VALUES {}",
            self.table,
            values.join(", ")
        );
        stmt
    }

    pub fn select(
        &self,
        predicate: &Predicate,
        sort: &Sort,
        offset: i64,
        limit: Option<i64>,
    ) -> Statement {
        let mut stmt = Statement::new();
        let filter = self.where_clause(&mut stmt, predicate);
        let dir = match sort.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        let order = match &sort.key {
            SortKey::Id => format!("id {dir}"),
            SortKey::Field(field) => {
                let f = stmt.bind(SqlParam::Text(field.clone()));
                format!("data->{f}::text {dir}, id {dir}")
            }
        };
        let off = stmt.bind(SqlParam::BigInt(offset.max(0)));
        let mut sql = format!(
            "SELECT data FROM {} WHERE {} ORDER BY {} OFFSET {}",
            self.table, filter, order, off
        );
        if let Some(limit) = limit {
            let lim = stmt.bind(SqlParam::BigInt(limit.max(0)));
            sql.push_str(&format!(" LIMIT {lim}"));
        }
        stmt.sql = sql;
        stmt
    }

    pub fn select_one(&self, predicate: &Predicate) -> Statement {
        self.select(predicate, &Sort::by_id(), 0, Some(1))
    }

    pub fn count(&self, predicate: &Predicate) -> Statement {
        let mut stmt = Statement::new();
        let filter = self.where_clause(&mut stmt, predicate);
        stmt.sql = format!("SELECT COUNT(*) FROM {} WHERE {}", self.table, filter);
        stmt
    }

    /// Replace the document of the matching row, writing `version` to the column.
    pub fn conditional_update(
        &self,
        predicate: &Predicate,
        version: Version,
        data: JsonValue,
    ) -> Statement {
        let mut stmt = Statement::new();
        let v = stmt.bind(SqlParam::BigInt(version));
        let d = stmt.bind(SqlParam::Json(data));
        let filter = self.where_clause(&mut stmt, predicate);
        stmt.sql = format!(
            "UPDATE {} SET version = {v}, data = {d} WHERE {filter}",
            self.table
        );
        stmt
    }

    /// Merge `patch` into every matching document and bump each version.
    pub fn update_fields(&self, predicate: &Predicate, patch: JsonValue) -> Statement {
        let mut stmt = Statement::new();
        let p = stmt.bind(SqlParam::Json(patch));
        let filter = self.where_clause(&mut stmt, predicate);
        stmt.sql = format!(
            "UPDATE {} SET version = version + 1, \
             data = (data || {p}::jsonb) || jsonb_build_object('version', version + 1) \
             WHERE {filter}",
            self.table
        );
        stmt
    }

    pub fn delete(&self, predicate: &Predicate) -> Statement {
        let mut stmt = Statement::new();
        let filter = self.where_clause(&mut stmt, predicate);
        stmt.sql = format!("DELETE FROM {} WHERE {}", self.table, filter);
        stmt
    }

    /// Stamp (`deleted = true`) or clear the deletion time of matching rows.
    pub fn set_deleted(&self, predicate: &Predicate, deleted: bool) -> Statement {
        let mut stmt = Statement::new();
        let filter = self.where_clause(&mut stmt, predicate);
        let value = if deleted { "now()" } else { "NULL" };
        stmt.sql = format!(
            "UPDATE {} SET deleted_at = {} WHERE {}",
            self.table, value, filter
        );
        stmt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::FilterSet;

    fn payments() -> TableSql {
        TableSql::new("payments").expect("valid table name")
    }

    #[test]
    fn test_table_name_validation() {
        assert!(TableSql::new("payment_milestones").is_ok());
        assert!(TableSql::new("Payments").is_err());
        assert!(TableSql::new("payments; DROP TABLE x").is_err());
        assert!(TableSql::new("").is_err());
        assert!(TableSql::new("1payments").is_err());
    }

    #[test]
    fn test_unique_index() {
        let sql = payments().unique_index("reference").expect("valid field");
        assert_eq!(
            sql,
            "CREATE UNIQUE INDEX IF NOT EXISTS payments_reference_key ON payments ((data->>'reference'))"
        );
        assert!(payments().unique_index("a'b").is_err());
    }

    #[test]
    fn test_where_binds_everything() {
        let id = Uuid::new_v4();
        let mut filters = FilterSet::new();
        filters.insert("status", "paid");
        filters.insert("amount_cents", 100i64);
        let pred = Predicate {
            id: Some(id),
            version: Some(3),
            filters,
            scope: Scope::Active,
        };

        let stmt = payments().count(&pred);
        assert_eq!(
            stmt.sql,
            "SELECT COUNT(*) FROM payments WHERE id = $1 AND version = $2 \
             AND data->>$3::text = $4 AND data->>$5::text = $6 AND deleted_at IS NULL"
        );
        assert_eq!(
            stmt.params,
            vec![
                SqlParam::Uuid(id),
                SqlParam::BigInt(3),
                SqlParam::Text("amount_cents".into()),
                SqlParam::Text("100".into()),
                SqlParam::Text("status".into()),
                SqlParam::Text("paid".into()),
            ]
        );
        assert_eq!(stmt.params().len(), 6);
    }

    #[test]
    fn test_scopes() {
        let all = Predicate::all().with_scope(Scope::WithDeleted);
        assert_eq!(payments().delete(&all).sql, "DELETE FROM payments WHERE TRUE");

        let deleted = Predicate::all().with_scope(Scope::OnlyDeleted);
        assert_eq!(
            payments().set_deleted(&deleted, false).sql,
            "UPDATE payments SET deleted_at = NULL WHERE deleted_at IS NOT NULL"
        );
    }

    #[test]
    fn test_select_ordering_and_slice() {
        let stmt = payments().select(
            &Predicate::all(),
            &Sort::by_field("amount_cents").descending(),
            40,
            Some(20),
        );
        assert_eq!(
            stmt.sql,
            "SELECT data FROM payments WHERE deleted_at IS NULL \
             ORDER BY data->$1::text DESC, id DESC OFFSET $2 LIMIT $3"
        );
        assert_eq!(stmt.params[1], SqlParam::BigInt(40));

        let one = payments().select_one(&Predicate::all());
        assert!(one.sql.ends_with("ORDER BY id ASC OFFSET $1 LIMIT $2"));
    }

    #[test]
    fn test_insert_rows() {
        let rows = vec![
            (Uuid::new_v4(), 1, serde_json::json!({"a": 1})),
            (Uuid::new_v4(), 1, serde_json::json!({"a": 2})),
        ];
        let stmt = payments().insert(&rows);
        assert_eq!(
            stmt.sql,
            "INSERT INTO payments (id, version, data) VALUES ($1, $2, $3), ($4, $5, $6)"
        );
        assert_eq!(stmt.params.len(), 6);
    }

    #[test]
    fn test_update_statements_number_params_in_order() {
        let id = Uuid::new_v4();
        let pred = Predicate::by_id(id).with_version(4);
        let stmt = payments().conditional_update(&pred, 5, serde_json::json!({}));
        assert_eq!(
            stmt.sql,
            "UPDATE payments SET version = $1, data = $2 WHERE id = $3 AND version = $4 \
             AND deleted_at IS NULL"
        );

        let bulk = payments().update_fields(&Predicate::all(), serde_json::json!({"status": "paid"}));
        assert!(bulk.sql.contains("data = (data || $1::jsonb)"));
        assert!(bulk.sql.contains("jsonb_build_object('version', version + 1)"));
    }
}

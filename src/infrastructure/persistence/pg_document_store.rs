//! PostgreSQL implementation of the document store.

use async_trait::async_trait;
use serde_json::{Value, json};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::odm::filter::{Condition, Direction, Op, segments};
use crate::odm::{CollectionStats, DocumentId, DocumentStore, Filter, FindSpec, RawDocument, StoreError};

/// PostgreSQL-backed [`DocumentStore`].
///
/// Every collection lives in the `documents` table, keyed by
/// `(collection, id)`, with the whole document in a `JSONB` column.
/// Filters compile to `jsonb_path_exists` predicates; field paths and
/// values are always bound as parameters.
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Creates a new store over a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Renders a dotted path as a SQL/JSON path with quoted member names.
pub(crate) fn json_path(path: &str) -> String {
    let mut out = String::from("$");
    for segment in segments(path) {
        out.push_str(".\"");
        for c in segment.chars() {
            if c == '"' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('"');
    }
    out
}

fn comparison(op: Op) -> &'static str {
    match op {
        Op::Eq | Op::Ne | Op::In | Op::Exists => "==",
        Op::Gt => ">",
        Op::Gte => ">=",
        Op::Lt => "<",
        Op::Lte => "<=",
    }
}

fn push_path_exists(qb: &mut QueryBuilder<'_, Postgres>, path: String, vars: Value) {
    qb.push("jsonb_path_exists(doc, ");
    qb.push_bind(path);
    qb.push("::jsonpath, ");
    qb.push_bind(Json(vars));
    qb.push(")");
}

fn push_condition(qb: &mut QueryBuilder<'_, Postgres>, condition: &Condition) {
    let path = json_path(&condition.path);

    match condition.op {
        Op::Exists => {
            if !condition.value.as_bool().unwrap_or(true) {
                qb.push("NOT ");
            }
            push_path_exists(qb, path, json!({}));
        }
        Op::In => {
            let options = condition.value.as_array().cloned().unwrap_or_default();
            if options.is_empty() {
                qb.push("FALSE");
                return;
            }

            let mut vars = serde_json::Map::new();
            let mut tests = Vec::with_capacity(options.len());
            for (i, option) in options.into_iter().enumerate() {
                tests.push(format!("@ == $v{i}"));
                vars.insert(format!("v{i}"), option);
            }
            push_path_exists(
                qb,
                format!("{path} ? ({})", tests.join(" || ")),
                Value::Object(vars),
            );
        }
        op => {
            if op == Op::Ne {
                qb.push("NOT ");
            }
            push_path_exists(
                qb,
                format!("{path} ? (@ {} $v)", comparison(op)),
                json!({ "v": condition.value }),
            );
        }
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, collection: &str, filter: &Filter) {
    qb.push(" WHERE collection = ");
    qb.push_bind(collection.to_string());
    for condition in filter.conditions() {
        qb.push(" AND ");
        push_condition(qb, condition);
    }
}

/// Rank of each JSON type in the order `compare_values` uses; PostgreSQL's
/// own `jsonb` order ranks types differently.
const TYPE_RANK: &str = " WHEN 'null' THEN 0 WHEN 'number' THEN 1 WHEN 'string' THEN 2 \
                         WHEN 'object' THEN 3 WHEN 'array' THEN 4 WHEN 'boolean' THEN 5 END";

/// Orders by type rank, then strings by code point (`"C"` collation), then
/// by `jsonb` value. Missing paths yield `NULL`, which sorts last ascending
/// and first descending.
fn push_sort(qb: &mut QueryBuilder<'_, Postgres>, spec: &FindSpec) {
    qb.push(" ORDER BY ");
    for key in &spec.sort {
        let path: Vec<String> = segments(&key.path).into_iter().map(String::from).collect();
        let direction = match key.direction {
            Direction::Ascending => " ASC, ",
            Direction::Descending => " DESC, ",
        };

        qb.push("CASE jsonb_typeof(doc #> ");
        qb.push_bind(path.clone());
        qb.push("::text[])");
        qb.push(TYPE_RANK);
        qb.push(direction);

        qb.push("(CASE WHEN jsonb_typeof(doc #> ");
        qb.push_bind(path.clone());
        qb.push("::text[]) = 'string' THEN doc #>> ");
        qb.push_bind(path.clone());
        qb.push("::text[] END) COLLATE \"C\"");
        qb.push(direction);

        qb.push("doc #> ");
        qb.push_bind(path);
        qb.push("::text[]");
        qb.push(direction);
    }
    qb.push("id ASC");
}

/// Field behind a `documents_<collection>_<field>_key` unique index.
fn unique_index_field<'a>(collection: &str, constraint: &'a str) -> Option<&'a str> {
    constraint
        .strip_prefix("documents_")?
        .strip_prefix(collection)?
        .strip_prefix('_')?
        .strip_suffix("_key")
        .filter(|field| !field.is_empty())
}

fn write_error(error: sqlx::Error, collection: &str, id: DocumentId) -> StoreError {
    let Some(db) = error.as_database_error().filter(|db| db.is_unique_violation()) else {
        return error.into();
    };

    match db.constraint().and_then(|c| unique_index_field(collection, c)) {
        Some(field) => StoreError::UniqueViolation {
            collection: collection.to_string(),
            field: field.to_string(),
        },
        None => StoreError::DuplicateKey {
            collection: collection.to_string(),
            id,
        },
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    /// Unique fields are enforced by the partial indexes the migrations
    /// create, so `_unique` is not consulted here.
    async fn insert(
        &self,
        collection: &str,
        id: DocumentId,
        doc: RawDocument,
        _unique: &[&'static str],
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, doc)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(collection)
        .bind(id.to_hex())
        .bind(Json(doc))
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, collection, id))?;

        Ok(())
    }

    async fn replace(
        &self,
        collection: &str,
        id: DocumentId,
        expected_version: u64,
        doc: RawDocument,
        _unique: &[&'static str],
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE documents SET doc = $3, updated_at = NOW()
            WHERE collection = $1 AND id = $2
              AND COALESCE(doc -> '__v', '0'::jsonb) = $4
            "#,
        )
        .bind(collection)
        .bind(id.to_hex())
        .bind(Json(doc))
        .bind(Json(json!(expected_version)))
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, collection, id))?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM documents WHERE collection = $1 AND id = $2)",
        )
        .bind(collection)
        .bind(id.to_hex())
        .fetch_one(&self.pool)
        .await?;

        if exists {
            return Err(StoreError::VersionConflict {
                collection: collection.to_string(),
                id,
            });
        }
        Ok(false)
    }

    async fn find(
        &self,
        collection: &str,
        spec: &FindSpec,
    ) -> Result<Vec<RawDocument>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT doc FROM documents");
        push_filter(&mut qb, collection, &spec.filter);
        push_sort(&mut qb, spec);

        if let Some(limit) = spec.limit {
            qb.push(" LIMIT ");
            qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if spec.skip > 0 {
            qb.push(" OFFSET ");
            qb.push_bind(i64::try_from(spec.skip).unwrap_or(i64::MAX));
        }

        let rows = qb
            .build_query_scalar::<Json<RawDocument>>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|Json(doc)| doc).collect())
    }

    async fn find_by_ids(
        &self,
        collection: &str,
        ids: &[DocumentId],
    ) -> Result<Vec<RawDocument>, StoreError> {
        let ids: Vec<String> = ids.iter().map(DocumentId::to_hex).collect();

        let rows = sqlx::query_scalar::<_, Json<RawDocument>>(
            r#"
            SELECT doc FROM documents
            WHERE collection = $1 AND id = ANY($2)
            "#,
        )
        .bind(collection)
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|Json(doc)| doc).collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM documents");
        push_filter(&mut qb, collection, filter);

        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn delete(&self, collection: &str, id: DocumentId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id.to_hex())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn collections(&self) -> Result<Vec<CollectionStats>, StoreError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT collection, COUNT(*)
            FROM documents
            GROUP BY collection
            ORDER BY collection
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, documents)| CollectionStats {
                name,
                documents: documents.max(0) as u64,
            })
            .collect())
    }

    async fn drop_collection(&self, collection: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1")
            .bind(collection)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Database pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_path_quotes_members() {
        assert_eq!(json_path("title"), r#"$."title""#);
        assert_eq!(json_path("comments.author"), r#"$."comments"."author""#);
        assert_eq!(json_path(r#"we"ird\key"#), r#"$."we\"ird\\key""#);
    }

    #[test]
    fn test_filter_sql_binds_values() {
        let filter = Filter::new()
            .eq("status", "published")
            .ne("tags", "draft")
            .any_of("author", ["a", "b"])
            .exists("deleted", false)
            .gt("views", 10);

        let mut qb = QueryBuilder::<Postgres>::new("SELECT doc FROM documents");
        push_filter(&mut qb, "posts", &filter);
        let sql = qb.sql();

        assert_eq!(
            sql,
            "SELECT doc FROM documents WHERE collection = $1 \
             AND jsonb_path_exists(doc, $2::jsonpath, $3) \
             AND NOT jsonb_path_exists(doc, $4::jsonpath, $5) \
             AND jsonb_path_exists(doc, $6::jsonpath, $7) \
             AND NOT jsonb_path_exists(doc, $8::jsonpath, $9) \
             AND jsonb_path_exists(doc, $10::jsonpath, $11)"
        );
        assert!(!sql.contains("published"));
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let filter = Filter::new().any_of("author", Vec::<String>::new());
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM documents");
        push_filter(&mut qb, "posts", &filter);
        assert!(qb.sql().ends_with("AND FALSE"));
    }

    #[test]
    fn test_sort_sql_tie_breaks_on_id() {
        let spec = FindSpec {
            sort: vec![crate::odm::filter::SortKey {
                path: "createdAt".into(),
                direction: Direction::Descending,
            }],
            ..FindSpec::default()
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT doc FROM documents");
        push_sort(&mut qb, &spec);
        let sql = qb.sql();
        assert!(sql.starts_with("SELECT doc FROM documents ORDER BY CASE jsonb_typeof(doc #> $1::text[])"));
        assert!(sql.contains("WHEN 'boolean' THEN 5 END DESC, "));
        assert!(sql.contains("THEN doc #>> $3::text[] END) COLLATE \"C\" DESC, "));
        assert!(sql.ends_with("doc #> $4::text[] DESC, id ASC"));
    }

    #[test]
    fn test_unique_index_names_map_to_fields() {
        assert_eq!(
            unique_index_field("users", "documents_users_username_key"),
            Some("username")
        );
        assert_eq!(unique_index_field("users", "documents_users_email_key"), Some("email"));
        assert_eq!(unique_index_field("posts", "documents_users_email_key"), None);
        assert_eq!(unique_index_field("users", "documents_pkey"), None);
        assert_eq!(unique_index_field("users", "documents_users__key"), None);
    }
}

use sea_orm::sea_query::{
    self, MysqlQueryBuilder, PostgresQueryBuilder, QueryStatementWriter, SqliteQueryBuilder,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, QueryResult, Statement};

use folio_core::FolioResult;

pub(crate) fn col_name(column: impl sea_query::Iden) -> String {
    column.to_string()
}

pub(crate) fn build_stmt<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> (String, sea_query::Values) {
    match backend {
        DatabaseBackend::Sqlite => stmt.build(SqliteQueryBuilder),
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        DatabaseBackend::MySql => stmt.build(MysqlQueryBuilder),
        #[allow(unreachable_patterns)]
        _ => stmt.build(SqliteQueryBuilder),
    }
}

pub(crate) fn to_statement<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> Statement {
    let (sql, values) = build_stmt(backend, stmt);
    Statement::from_sql_and_values(backend, sql, values)
}

/// Runs a write statement and returns the number of affected rows.
pub(crate) async fn exec<C, S>(conn: &C, stmt: &S) -> FolioResult<u64>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let result = conn.execute(to_statement(backend, stmt)).await?;
    Ok(result.rows_affected())
}

pub(crate) async fn query_all<C, S>(conn: &C, stmt: &S) -> FolioResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let rows = conn.query_all(to_statement(backend, stmt)).await?;
    Ok(rows)
}

pub(crate) async fn query_one<C, S>(conn: &C, stmt: &S) -> FolioResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let row = conn.query_one(to_statement(backend, stmt)).await?;
    Ok(row)
}

pub(crate) fn read_i32(row: &QueryResult, column: impl sea_query::Iden) -> FolioResult<i32> {
    Ok(row.try_get("", &col_name(column))?)
}

pub(crate) fn read_i64(row: &QueryResult, column: impl sea_query::Iden) -> FolioResult<i64> {
    Ok(row.try_get("", &col_name(column))?)
}

pub(crate) fn read_string(row: &QueryResult, column: impl sea_query::Iden) -> FolioResult<String> {
    Ok(row.try_get("", &col_name(column))?)
}

pub(crate) fn read_opt_string(
    row: &QueryResult,
    column: impl sea_query::Iden,
) -> FolioResult<Option<String>> {
    Ok(row.try_get("", &col_name(column))?)
}

pub(crate) fn read_opt_i64(
    row: &QueryResult,
    column: impl sea_query::Iden,
) -> FolioResult<Option<i64>> {
    Ok(row.try_get("", &col_name(column))?)
}

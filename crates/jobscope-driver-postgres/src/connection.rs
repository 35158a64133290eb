//! PostgreSQL connection implementation

use async_trait::async_trait;
use bytes::BytesMut;
use jobscope_core::{
    ColumnMeta, Connection, ConnectionConfig, JobscopeError, QueryResult, Result, Row,
    SslMode, StatementResult, Transaction, Value,
};
use postgres_types::{FromSql, IsNull, ToSql, Type};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls, Row as PgRow, SimpleQueryMessage, Statement};

use crate::build_tls_connector;

type SharedClient = Arc<Mutex<Option<Client>>>;

/// Server message with its detail and hint, tagged with the SQLSTATE
fn describe_pg_error(error: &tokio_postgres::Error) -> String {
    let Some(db) = error.as_db_error() else {
        return error.to_string();
    };

    let mut text = db.message().to_string();
    for (label, extra) in [("detail", db.detail()), ("hint", db.hint())] {
        if let Some(extra) = extra.filter(|s| !s.trim().is_empty()) {
            text.push_str(&format!(" ({}: {})", label, extra));
        }
    }
    format!("{} [SQLSTATE {}]", text, db.code().code())
}

/// Whether a connect failure is the server or client refusing the credentials.
///
/// SQLSTATE class 28 covers wrong passwords and unknown roles; the client
/// reports "invalid configuration" when the server asks for a password the
/// config does not carry. Retrying either cannot succeed.
fn is_credential_rejection(sql_state: Option<&str>, text: &str) -> bool {
    sql_state.is_some_and(|state| state.starts_with("28"))
        || text.starts_with("invalid configuration")
}

/// Map a driver error raised while a session was in use.
///
/// A closed session becomes a connection error so callers know the handle is
/// stale; everything else keeps its SQLSTATE for the caller to inspect.
fn pg_error(context: &str, error: &tokio_postgres::Error) -> JobscopeError {
    if error.is_closed() {
        return JobscopeError::connection(format!("{}: connection closed", context));
    }
    JobscopeError::Query {
        message: format!("{}: {}", context, describe_pg_error(error)),
        sql_state: error.code().map(|state| state.code().to_string()),
    }
}

fn closed_error() -> JobscopeError {
    JobscopeError::connection("PostgreSQL connection is closed")
}

/// Drive the socket half of a tokio-postgres connection until it ends
fn spawn_connection_task<F>(connection: F, closed: Arc<AtomicBool>)
where
    F: Future<Output = std::result::Result<(), tokio_postgres::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "PostgreSQL connection error");
        }
        closed.store(true, Ordering::SeqCst);
    });
}

/// PostgreSQL connection wrapper
pub struct PostgresConnection {
    client: SharedClient,
    closed: Arc<AtomicBool>,
}

impl PostgresConnection {
    /// Connect to a PostgreSQL database
    #[tracing::instrument(skip(config), fields(target = %config))]
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        tracing::info!(ssl_mode = %config.ssl_mode(), "connecting to PostgreSQL database");

        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(config.host())
            .port(config.port())
            .user(config.username())
            .dbname(config.database())
            .application_name(config.application_name())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs()));

        if let Some(p) = config.password() {
            pg_config.password(p);
        }

        pg_config.ssl_mode(match config.ssl_mode() {
            SslMode::Disable => tokio_postgres::config::SslMode::Disable,
            SslMode::Prefer => tokio_postgres::config::SslMode::Prefer,
            SslMode::Require => tokio_postgres::config::SslMode::Require,
        });

        let connect_error = |e: tokio_postgres::Error| {
            let message = config.redact(&format!(
                "Failed to connect to PostgreSQL at {}:{}: {}",
                config.host(),
                config.port(),
                describe_pg_error(&e)
            ));
            let sql_state = e.code().map(|state| state.code());
            if is_credential_rejection(sql_state, &e.to_string()) {
                JobscopeError::Configuration(message)
            } else {
                JobscopeError::connection(message)
            }
        };

        let tls = build_tls_connector(config.ssl_mode())
            .map_err(|e| JobscopeError::Configuration(e.to_string()))?;

        let closed = Arc::new(AtomicBool::new(false));
        let client = match tls {
            Some(tls) => {
                let (client, connection) = pg_config.connect(tls).await.map_err(connect_error)?;
                spawn_connection_task(connection, Arc::clone(&closed));
                client
            }
            None => {
                let (client, connection) =
                    pg_config.connect(NoTls).await.map_err(connect_error)?;
                spawn_connection_task(connection, Arc::clone(&closed));
                client
            }
        };

        tracing::info!("PostgreSQL connection established");
        Ok(Self {
            client: Arc::new(Mutex::new(Some(client))),
            closed,
        })
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn driver_name(&self) -> &str {
        "postgresql"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql_preview(sql)))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(closed_error)?;
        let result = run_execute(client, sql, params).await?;
        tracing::debug!(affected_rows = result.affected_rows, "statement executed");
        Ok(result)
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql_preview(sql)))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(closed_error)?;
        let result = run_query(client, sql, params).await?;
        tracing::debug!(
            row_count = result.row_count(),
            execution_time_ms = result.execution_time_ms,
            "query executed successfully"
        );
        Ok(result)
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        tracing::debug!("beginning PostgreSQL transaction");

        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(closed_error)?;
        client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| pg_error("Failed to begin transaction", &e))?;
        drop(guard);

        Ok(Box::new(PostgresTransaction {
            client: Arc::clone(&self.client),
            committed: false,
            rolled_back: false,
        }))
    }

    async fn close(&self) -> Result<()> {
        let client = self.client.lock().await.take();
        self.closed.store(true, Ordering::SeqCst);
        if client.is_some() {
            tracing::info!("closing PostgreSQL connection");
        }
        // Dropping the client ends the spawned connection task.
        drop(client);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// PostgreSQL transaction wrapper
///
/// Shares the session's client with its connection. Every statement runs on
/// the same client, between the `BEGIN` issued by `begin_transaction` and the
/// closing `COMMIT` or `ROLLBACK`.
pub struct PostgresTransaction {
    client: SharedClient,
    committed: bool,
    rolled_back: bool,
}

impl PostgresTransaction {
    async fn finish(&mut self, command: &str) -> Result<()> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(closed_error)?;
        client
            .batch_execute(command)
            .await
            .map_err(|e| pg_error(&format!("Failed to {} transaction", command.to_lowercase()), &e))
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        if !self.committed && !self.rolled_back {
            tracing::warn!("PostgreSQL transaction dropped without commit or rollback");
        }
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        tracing::debug!("committing PostgreSQL transaction");
        self.finish("COMMIT").await?;
        self.committed = true;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        tracing::debug!("rolling back PostgreSQL transaction");
        let result = self.finish("ROLLBACK").await;
        // Even a failed ROLLBACK ends the transaction server-side once the
        // session goes away; don't warn again on drop.
        self.rolled_back = true;
        result
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        tracing::debug!(sql_preview = %sql_preview(sql), "executing query in transaction");
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(closed_error)?;
        run_query(client, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        tracing::debug!(sql_preview = %sql_preview(sql), "executing statement in transaction");
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(closed_error)?;
        run_execute(client, sql, params).await
    }
}

fn sql_preview(sql: &str) -> String {
    sql.chars().take(100).collect()
}

async fn prepare(client: &Client, sql: &str) -> Result<Statement> {
    client
        .prepare(sql)
        .await
        .map_err(|e| pg_error("Failed to prepare statement", &e))
}

fn bind_params(statement: &Statement, params: &[Value]) -> Vec<Param> {
    let types = statement.params();
    params
        .iter()
        .enumerate()
        .map(|(i, value)| Param::bind(value, types.get(i)))
        .collect()
}

async fn run_execute(client: &Client, sql: &str, params: &[Value]) -> Result<StatementResult> {
    // Parameterless statements go through the simple query protocol so that
    // utility commands (CREATE DATABASE, DDL) run exactly as written.
    if params.is_empty() {
        let messages = client
            .simple_query(sql)
            .await
            .map_err(|e| pg_error("Failed to execute statement", &e))?;
        let affected_rows = messages
            .iter()
            .filter_map(|message| match message {
                SimpleQueryMessage::CommandComplete(rows) => Some(*rows),
                _ => None,
            })
            .sum();
        return Ok(StatementResult { affected_rows });
    }

    let statement = prepare(client, sql).await?;
    let bound = bind_params(&statement, params);
    let args: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|p| p as _).collect();

    let affected_rows = client
        .execute(&statement, &args)
        .await
        .map_err(|e| pg_error("Failed to execute statement", &e))?;

    Ok(StatementResult { affected_rows })
}

async fn run_query(client: &Client, sql: &str, params: &[Value]) -> Result<QueryResult> {
    let start_time = Instant::now();

    let statement = prepare(client, sql).await?;
    let bound = bind_params(&statement, params);
    let args: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|p| p as _).collect();

    let pg_rows = client
        .query(&statement, &args)
        .await
        .map_err(|e| pg_error("Failed to execute query", &e))?;

    // Column metadata comes from the prepared statement so empty results keep their columns.
    let columns: Vec<ColumnMeta> = statement
        .columns()
        .iter()
        .enumerate()
        .map(|(ordinal, col)| ColumnMeta {
            name: col.name().to_string(),
            data_type: col.type_().name().to_string(),
            ordinal,
        })
        .collect();
    let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

    let rows = pg_rows
        .iter()
        .map(|pg_row| {
            let values = (0..columns.len())
                .map(|idx| decode_column(pg_row, idx))
                .collect();
            Row::new(column_names.clone(), values)
        })
        .collect();

    Ok(QueryResult {
        columns,
        rows,
        execution_time_ms: start_time.elapsed().as_millis() as u64,
    })
}

/// A parameter converted to the type its placeholder expects.
///
/// Integers are narrowed to the placeholder's width (INT2, INT4) when they
/// fit, and text is parsed for JSON and temporal placeholders; anything that
/// does not convert is sent as-is and the server reports the mismatch.
#[derive(Debug)]
enum Param {
    Null,
    Bool(bool),
    Small(i16),
    Int(i32),
    Big(i64),
    Real(f32),
    Double(f64),
    Text(String),
    Bytea(Vec<u8>),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    Timestamp(chrono::NaiveDateTime),
    Timestamptz(chrono::DateTime<chrono::Utc>),
}

impl Param {
    fn bind(value: &Value, target: Option<&Type>) -> Self {
        let wants = |ty: Type| target == Some(&ty);
        match value {
            Value::Null => Param::Null,
            Value::Bool(b) => Param::Bool(*b),
            Value::Int16(v) => Self::integer(i64::from(*v), target),
            Value::Int32(v) => Self::integer(i64::from(*v), target),
            Value::Int64(v) => Self::integer(*v, target),
            Value::Float32(v) if wants(Type::FLOAT8) => Param::Double(f64::from(*v)),
            Value::Float32(v) => Param::Real(*v),
            Value::Float64(v) if wants(Type::FLOAT4) => Param::Real(*v as f32),
            Value::Float64(v) => Param::Double(*v),
            Value::String(text) => match target {
                Some(ty) => Self::parse_text(text, ty),
                None => Param::Text(text.clone()),
            },
            Value::Decimal(text) => Param::Text(text.clone()),
            Value::Bytes(bytes) => Param::Bytea(bytes.clone()),
            Value::Uuid(id) => Param::Uuid(*id),
            Value::Json(json) => Param::Json(json.clone()),
            Value::Date(d) => Param::Date(*d),
            Value::Time(t) => Param::Time(*t),
            Value::DateTime(ts) => Param::Timestamp(*ts),
            Value::DateTimeUtc(ts) => Param::Timestamptz(*ts),
        }
    }

    fn integer(value: i64, target: Option<&Type>) -> Self {
        match target {
            Some(ty) if *ty == Type::INT2 => i16::try_from(value).map_or(Param::Big(value), Param::Small),
            Some(ty) if *ty == Type::INT4 => i32::try_from(value).map_or(Param::Big(value), Param::Int),
            _ => Param::Big(value),
        }
    }

    fn parse_text(text: &str, target: &Type) -> Self {
        let parsed = if *target == Type::JSON || *target == Type::JSONB {
            serde_json::from_str(text).ok().map(Param::Json)
        } else if *target == Type::DATE {
            chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d").ok().map(Param::Date)
        } else if *target == Type::TIMESTAMP {
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| chrono::NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(Param::Timestamp)
        } else if *target == Type::TIMESTAMPTZ {
            chrono::DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|ts| Param::Timestamptz(ts.with_timezone(&chrono::Utc)))
        } else {
            None
        };
        parsed.unwrap_or_else(|| Param::Text(text.to_string()))
    }
}

type BoxError = Box<dyn std::error::Error + Sync + Send>;

impl ToSql for Param {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        match self {
            Param::Null => Ok(IsNull::Yes),
            Param::Bool(v) => v.to_sql(ty, out),
            Param::Small(v) => v.to_sql(ty, out),
            Param::Int(v) => v.to_sql(ty, out),
            Param::Big(v) => v.to_sql(ty, out),
            Param::Real(v) => v.to_sql(ty, out),
            Param::Double(v) => v.to_sql(ty, out),
            Param::Text(v) => v.to_sql(ty, out),
            Param::Bytea(v) => v.to_sql(ty, out),
            Param::Uuid(v) => v.to_sql(ty, out),
            Param::Json(v) => v.to_sql(ty, out),
            Param::Date(v) => v.to_sql(ty, out),
            Param::Time(v) => v.to_sql(ty, out),
            Param::Timestamp(v) => v.to_sql(ty, out),
            Param::Timestamptz(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    postgres_types::to_sql_checked!();
}

/// `numeric` in PostgreSQL's own text rendering, decoded from the binary
/// format: a header of digit count, weight, sign and display scale, then
/// base-10000 digit groups, the first of which has the given weight.
#[derive(Debug)]
struct Numeric(String);

const NUMERIC_POSITIVE: u16 = 0x0000;
const NUMERIC_NEGATIVE: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

impl Numeric {
    fn decode(raw: &[u8]) -> std::result::Result<String, BoxError> {
        let word = |at: usize| u16::from_be_bytes([raw[at], raw[at + 1]]);
        if raw.len() < 8 {
            return Err("numeric payload shorter than its header".into());
        }

        let ndigits = usize::from(word(0));
        let weight = i32::from(word(2) as i16);
        let sign = word(4);
        let dscale = usize::from(word(6));

        match sign {
            NUMERIC_NAN => return Ok("NaN".into()),
            NUMERIC_PINF => return Ok("Infinity".into()),
            NUMERIC_NINF => return Ok("-Infinity".into()),
            NUMERIC_POSITIVE | NUMERIC_NEGATIVE => {}
            other => return Err(format!("unknown numeric sign 0x{:04X}", other).into()),
        }
        if raw.len() < 8 + ndigits * 2 {
            return Err("numeric payload is missing digit groups".into());
        }

        let groups: Vec<u16> = (0..ndigits).map(|i| word(8 + i * 2)).collect();
        if groups.iter().any(|g| *g > 9999) {
            return Err("numeric digit group out of range".into());
        }

        let integer_groups = usize::try_from(weight + 1).unwrap_or(0);
        let mut integer = String::new();
        for i in 0..integer_groups {
            let group = groups.get(i).copied().unwrap_or(0);
            if integer.is_empty() {
                if group != 0 {
                    integer = group.to_string();
                }
            } else {
                integer.push_str(&format!("{:04}", group));
            }
        }
        if integer.is_empty() {
            integer.push('0');
        }

        let leading_zero_groups = usize::try_from(-(weight + 1)).unwrap_or(0);
        let mut fraction = "0000".repeat(leading_zero_groups);
        for group in groups.iter().skip(integer_groups) {
            fraction.push_str(&format!("{:04}", group));
        }
        fraction.truncate(dscale);
        while fraction.len() < dscale {
            fraction.push('0');
        }

        let is_zero = integer == "0" && fraction.bytes().all(|b| b == b'0');
        let mut text = String::new();
        if sign == NUMERIC_NEGATIVE && !is_zero {
            text.push('-');
        }
        text.push_str(&integer);
        if !fraction.is_empty() {
            text.push('.');
            text.push_str(&fraction);
        }
        Ok(text)
    }
}

impl<'a> FromSql<'a> for Numeric {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Self::decode(raw).map(Self)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Binary payload read as UTF-8, for enums, domains and other text-like types
#[derive(Debug)]
struct Utf8Text(String);

impl<'a> FromSql<'a> for Utf8Text {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(Self(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

/// Read column `idx` as `T`, mapping SQL NULL and undecodable values to `Value::Null`
fn nullable<'a, T: FromSql<'a>>(row: &'a PgRow, idx: usize, wrap: impl FnOnce(T) -> Value) -> Value {
    match row.try_get::<_, Option<T>>(idx) {
        Ok(Some(v)) => wrap(v),
        Ok(None) => Value::Null,
        Err(e) => {
            tracing::warn!(column = idx, error = %e, "could not decode column, using NULL");
            Value::Null
        }
    }
}

fn decode_column(row: &PgRow, idx: usize) -> Value {
    let ty = row.columns()[idx].type_().clone();
    match ty.name() {
        "bool" => nullable(row, idx, Value::Bool),
        "int2" => nullable(row, idx, Value::Int16),
        "int4" => nullable(row, idx, Value::Int32),
        "int8" => nullable(row, idx, Value::Int64),
        "float4" => nullable(row, idx, Value::Float32),
        "float8" => nullable(row, idx, Value::Float64),
        "numeric" => nullable(row, idx, |n: Numeric| Value::Decimal(n.0)),
        "text" | "varchar" | "bpchar" | "name" => nullable(row, idx, Value::String),
        "bytea" => nullable(row, idx, Value::Bytes),
        "uuid" => nullable(row, idx, Value::Uuid),
        "json" | "jsonb" => nullable(row, idx, Value::Json),
        "date" => nullable(row, idx, Value::Date),
        "time" => nullable(row, idx, Value::Time),
        "timestamp" => nullable(row, idx, Value::DateTime),
        "timestamptz" => nullable(row, idx, Value::DateTimeUtc),
        _ => nullable(row, idx, |t: Utf8Text| Value::String(t.0)),
    }
}

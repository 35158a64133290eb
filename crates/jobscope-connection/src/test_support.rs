//! In-memory fakes of the driver traits for unit tests

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use jobscope_core::{
    Connection, ConnectionConfig, DatabaseDriver, JobscopeError, QueryResult, Result,
    SQLSTATE_DUPLICATE_DATABASE, StatementResult, TableColumnInfo, Transaction, Value,
};
use parking_lot::Mutex;

pub(crate) const PROBE: &str = "SELECT 1";
const VERSION_QUERY: &str = "FAKE VERSION";
const TABLE_COUNT_QUERY: &str = "FAKE TABLE COUNT";
const TABLE_INFO_QUERY: &str = "FAKE TABLE INFO";

/// Knobs and counters shared by every fake session of one driver
#[derive(Default)]
pub(crate) struct FakeState {
    pub connects: AtomicU32,
    /// Refuse this many connection attempts before accepting
    pub refuse_connects: AtomicU32,
    /// Reject the credentials of every connection attempt
    pub reject_credentials: AtomicBool,
    pub probes: AtomicU32,
    pub closes: AtomicU32,
    pub commits: AtomicU32,
    pub rollbacks: AtomicU32,
    /// Fail every probe
    pub fail_probe: AtomicBool,
    /// Fail the diagnostic and introspection queries
    pub fail_queries: AtomicBool,
    /// Statement text that fails inside a transaction
    pub failing_statement: Mutex<Option<String>>,
    /// Message for a CREATE DATABASE failure other than "already exists"
    pub admin_failure: Mutex<Option<String>>,
    pub databases: Mutex<BTreeSet<String>>,
    /// Statements attempted inside transactions, in order
    pub attempted: Mutex<Vec<String>>,
    /// Statements that were committed
    pub committed: Mutex<Vec<String>>,
    /// Database and password of each connection attempt
    pub connected_to: Mutex<Vec<(String, Option<String>)>>,
    pub tables: Mutex<Vec<TableColumnInfo>>,
}

impl FakeState {
    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

pub(crate) struct FakeDriver {
    pub state: Arc<FakeState>,
}

impl FakeDriver {
    pub fn new() -> (Arc<Self>, Arc<FakeState>) {
        let state = Arc::new(FakeState::default());
        state.databases.lock().insert("postgres".to_string());
        (
            Arc::new(Self {
                state: Arc::clone(&state),
            }),
            state,
        )
    }
}

#[async_trait]
impl DatabaseDriver for FakeDriver {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        config.validate()?;
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        self.state.connected_to.lock().push((
            config.database().to_string(),
            config.password().map(str::to_string),
        ));

        if self.state.reject_credentials.load(Ordering::SeqCst) {
            return Err(JobscopeError::Configuration(format!(
                "password authentication failed for user {} with password {} [SQLSTATE 28P01]",
                config.username(),
                config.password().unwrap_or_default()
            )));
        }

        let refuse = self.state.refuse_connects.load(Ordering::SeqCst);
        if refuse > 0 {
            self.state.refuse_connects.store(refuse - 1, Ordering::SeqCst);
            // Echo the password the way some client libraries do.
            return Err(JobscopeError::connection(format!(
                "connection refused for {} (password {})",
                config.masked_descriptor(),
                config.password().unwrap_or_default()
            )));
        }

        Ok(Arc::new(FakeConnection {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }

    fn create_database_sql(&self, name: &str) -> String {
        format!("CREATE DATABASE {name}")
    }

    fn server_version_query(&self) -> &'static str {
        VERSION_QUERY
    }

    fn table_count_query(&self) -> &'static str {
        TABLE_COUNT_QUERY
    }

    fn table_info_query(&self) -> &'static str {
        TABLE_INFO_QUERY
    }
}

pub(crate) struct FakeConnection {
    state: Arc<FakeState>,
    closed: AtomicBool,
}

#[async_trait]
impl Connection for FakeConnection {
    fn driver_name(&self) -> &str {
        "fake"
    }

    async fn execute(&self, sql: &str, _params: &[Value]) -> Result<StatementResult> {
        let Some(name) = sql.strip_prefix("CREATE DATABASE ") else {
            return Ok(StatementResult::default());
        };
        if let Some(message) = self.state.admin_failure.lock().clone() {
            return Err(JobscopeError::query(message));
        }
        if !self.state.databases.lock().insert(name.to_string()) {
            return Err(JobscopeError::Query {
                message: format!("database \"{name}\" already exists"),
                sql_state: Some(SQLSTATE_DUPLICATE_DATABASE.to_string()),
            });
        }
        Ok(StatementResult { affected_rows: 0 })
    }

    async fn query(&self, sql: &str, _params: &[Value]) -> Result<QueryResult> {
        if sql == PROBE {
            self.state.probes.fetch_add(1, Ordering::SeqCst);
            if self.state.fail_probe.load(Ordering::SeqCst) {
                return Err(JobscopeError::query("server closed the connection"));
            }
            return Ok(QueryResult::from_rows(&["?column?"], vec![vec![Value::Int32(1)]]));
        }

        if self.state.fail_queries.load(Ordering::SeqCst) {
            return Err(JobscopeError::query("permission denied for schema information_schema"));
        }

        match sql {
            VERSION_QUERY => Ok(QueryResult::from_rows(
                &["version"],
                vec![vec![Value::String("PostgreSQL 16.2 (fake)".into())]],
            )),
            TABLE_COUNT_QUERY => {
                let tables: BTreeSet<String> = self
                    .state
                    .tables
                    .lock()
                    .iter()
                    .map(|c| c.table_name.clone())
                    .collect();
                Ok(QueryResult::from_rows(
                    &["count"],
                    vec![vec![Value::Int64(tables.len() as i64)]],
                ))
            }
            TABLE_INFO_QUERY => {
                let rows = self
                    .state
                    .tables
                    .lock()
                    .iter()
                    .map(|c| {
                        vec![
                            Value::String(c.table_name.clone()),
                            Value::String(c.column_name.clone()),
                            Value::String(c.data_type.clone()),
                            Value::String(if c.nullable { "YES" } else { "NO" }.into()),
                            c.default_value.clone().map(Value::String).unwrap_or(Value::Null),
                            Value::Int32(c.ordinal as i32),
                        ]
                    })
                    .collect();
                Ok(QueryResult::from_rows(
                    &[
                        "table_name",
                        "column_name",
                        "data_type",
                        "is_nullable",
                        "column_default",
                        "ordinal_position",
                    ],
                    rows,
                ))
            }
            _ => Ok(QueryResult::empty()),
        }
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(FakeTransaction {
            state: Arc::clone(&self.state),
            pending: Mutex::new(Vec::new()),
        }))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub(crate) struct FakeTransaction {
    state: Arc<FakeState>,
    pending: Mutex<Vec<String>>,
}

#[async_trait]
impl Transaction for FakeTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        let pending = std::mem::take(&mut *self.pending.lock());
        self.state.committed.lock().extend(pending);
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.pending.lock().clear();
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
        Ok(QueryResult::empty())
    }

    async fn execute(&self, sql: &str, _params: &[Value]) -> Result<StatementResult> {
        self.state.attempted.lock().push(sql.to_string());
        if self.state.failing_statement.lock().as_deref() == Some(sql) {
            return Err(JobscopeError::Query {
                message: format!("syntax error at or near \"{sql}\""),
                sql_state: Some("42601".into()),
            });
        }
        self.pending.lock().push(sql.to_string());
        Ok(StatementResult { affected_rows: 1 })
    }
}

pub(crate) fn column(table: &str, name: &str, data_type: &str, nullable: bool, ordinal: i64) -> TableColumnInfo {
    TableColumnInfo {
        table_name: table.to_string(),
        column_name: name.to_string(),
        data_type: data_type.to_string(),
        nullable,
        default_value: None,
        ordinal,
    }
}

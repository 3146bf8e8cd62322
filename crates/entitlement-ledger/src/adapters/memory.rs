//! # In-Memory Database
//!
//! Test double for the Postgres executor. It evaluates the same statement AST
//! the stores build, so store logic runs unchanged against it.
//!
//! ## Semantics
//!
//! - Primary keys and the partial unique index on current segments are enforced.
//!   A failing statement leaves its table untouched.
//! - `InMemoryDatabase` is the autocommit pool. A pipelined batch sent to it is
//!   all-or-nothing, like an implicit transaction.
//! - `InMemoryTransaction` holds the database lock from `begin` until commit,
//!   rollback or drop. This serializes transactions, which is a coarser form of
//!   the `FOR NO KEY UPDATE` row locks the stores take. Autocommit calls made
//!   while a transaction is open wait for it.
//! - After a failed statement the transaction is aborted: later statements are
//!   refused and `commit` rolls back.
//! - `inject_failure_at(n)` makes the n-th following statement fail.
//! - Every executed statement is rendered into a journal.

use crate::config::LedgerConfig;
use crate::domain::errors::ExecError;
use crate::ports::outbound::{BatchResults, QueryExecutor, RequestContext};
use crate::sql::eval::{matches_all, sort_rows};
use crate::sql::tables::all_tables;
use crate::sql::{
    Batch, Delete, Insert, OnConflict, Predicate, Row, Select, SqlValue, Statement,
    TableDescriptor, Update,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

const ABORTED: &str = "current transaction is aborted, commands ignored until end of transaction block";

// =============================================================================
// Table engine
// =============================================================================

#[derive(Debug, Clone)]
struct Table {
    desc: &'static TableDescriptor,
    rows: Vec<Row>,
}

fn key_of(columns: &[&str], row: &Row) -> Vec<SqlValue> {
    columns.iter().map(|c| row.value_or_null(c)).collect()
}

impl Table {
    fn check_column(&self, column: &str) -> Result<(), ExecError> {
        if self.desc.has_column(column) {
            Ok(())
        } else {
            Err(ExecError::Database(format!(
                "column \"{}\" of relation \"{}\" does not exist",
                column, self.desc.name
            )))
        }
    }

    fn check_filter(&self, filter: &[Predicate]) -> Result<(), ExecError> {
        filter.iter().try_for_each(|p| self.check_column(p.column()))
    }

    fn select(&self, s: &Select) -> Result<Vec<Row>, ExecError> {
        s.columns.iter().try_for_each(|c| self.check_column(c))?;
        self.check_filter(&s.filter)?;

        let mut rows: Vec<Row> = self
            .rows
            .iter()
            .filter(|r| matches_all(&s.filter, r))
            .cloned()
            .collect();
        sort_rows(&mut rows, &s.order_by);
        if let Some(n) = s.limit {
            rows.truncate(n);
        }
        Ok(rows.iter().map(|r| r.project(&s.columns)).collect())
    }

    fn insert(&mut self, i: &Insert, ctx: &RequestContext) -> Result<u64, ExecError> {
        i.columns.iter().try_for_each(|c| self.check_column(c))?;

        let mut row = Row::new();
        for column in self.desc.columns {
            row.set(column, SqlValue::Null);
        }
        for (column, value) in i.columns.iter().zip(&i.values) {
            row.set(column, value.clone());
        }
        if let Some(scope) = self.desc.audit_scope {
            if !i.columns.contains(&scope) {
                row.set(scope, ctx.resource_path.clone());
            }
        }

        let pk = key_of(self.desc.primary_key, &row);
        let existing = self
            .rows
            .iter()
            .position(|r| key_of(self.desc.primary_key, r) == pk);

        match (existing, &i.on_conflict) {
            (None, _) => {
                self.rows.push(row);
                Ok(1)
            }
            (Some(_), None) => Err(ExecError::UniqueViolation {
                constraint: self.desc.primary_key_constraint(),
            }),
            (Some(_), Some(OnConflict::DoNothing)) => Ok(0),
            (Some(pos), Some(OnConflict::DoUpdate { target, set })) => {
                if target.as_slice() != self.desc.primary_key {
                    return Err(ExecError::Database(
                        "there is no unique or exclusion constraint matching the ON CONFLICT specification"
                            .to_string(),
                    ));
                }
                set.iter().try_for_each(|c| self.check_column(c))?;
                let target_row = &mut self.rows[pos];
                for column in set {
                    target_row.set(column, row.value_or_null(column));
                }
                Ok(1)
            }
        }
    }

    fn update(&mut self, u: &Update) -> Result<u64, ExecError> {
        u.set.iter().try_for_each(|(c, _)| self.check_column(c))?;
        self.check_filter(&u.filter)?;

        let mut affected = 0;
        for row in self.rows.iter_mut() {
            if matches_all(&u.filter, row) {
                for (column, value) in &u.set {
                    row.set(column, value.clone());
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    fn delete(&mut self, d: &Delete) -> Result<u64, ExecError> {
        self.check_filter(&d.filter)?;
        let before = self.rows.len();
        self.rows.retain(|r| !matches_all(&d.filter, r));
        Ok((before - self.rows.len()) as u64)
    }

    fn check_unique(&self, enforce_partial: bool) -> Result<(), ExecError> {
        let mut keys = BTreeSet::new();
        for row in &self.rows {
            if !keys.insert(format!("{:?}", key_of(self.desc.primary_key, row))) {
                return Err(ExecError::UniqueViolation {
                    constraint: self.desc.primary_key_constraint(),
                });
            }
        }

        if let (true, Some(index)) = (enforce_partial, self.desc.partial_unique) {
            let mut keys = BTreeSet::new();
            for row in self.rows.iter().filter(|r| index.covers(r)) {
                if !keys.insert(format!("{:?}", key_of(index.columns, row))) {
                    return Err(ExecError::UniqueViolation {
                        constraint: index.name.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

enum Outcome {
    Rows(Vec<Row>),
    Affected(u64),
}

impl Outcome {
    fn into_rows(self) -> Vec<Row> {
        match self {
            Outcome::Rows(rows) => rows,
            Outcome::Affected(_) => Vec::new(),
        }
    }

    fn rows_affected(&self) -> u64 {
        match self {
            Outcome::Rows(rows) => rows.len() as u64,
            Outcome::Affected(n) => *n,
        }
    }
}

/// Contents of every table.
#[derive(Debug, Clone, Default)]
struct Tables {
    tables: HashMap<&'static str, Table>,
}

impl Tables {
    fn new() -> Self {
        let tables = all_tables()
            .into_iter()
            .map(|desc| {
                (
                    desc.name,
                    Table {
                        desc,
                        rows: Vec::new(),
                    },
                )
            })
            .collect();
        Self { tables }
    }

    fn table(&self, name: &str) -> Result<&Table, ExecError> {
        self.tables
            .get(name)
            .ok_or_else(|| ExecError::Database(format!("relation \"{}\" does not exist", name)))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table, ExecError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| ExecError::Database(format!("relation \"{}\" does not exist", name)))
    }

    fn execute(
        &mut self,
        stmt: &Statement,
        ctx: &RequestContext,
        enforce_partial: bool,
    ) -> Result<Outcome, ExecError> {
        if let Statement::Select(s) = stmt {
            return self.table(s.table)?.select(s).map(Outcome::Rows);
        }

        let table = self.table_mut(stmt.table())?;
        let snapshot = table.rows.clone();
        let result = match stmt {
            Statement::Insert(i) => table.insert(i, ctx),
            Statement::Update(u) => table.update(u),
            Statement::Delete(d) => table.delete(d),
            Statement::Select(_) => Ok(0),
        };
        let result = match result {
            Ok(n) => table.check_unique(enforce_partial).map(|_| n),
            Err(e) => Err(e),
        };
        if result.is_err() {
            table.rows = snapshot;
        }
        result.map(Outcome::Affected)
    }
}

// =============================================================================
// Shared state
// =============================================================================

#[derive(Debug, Default)]
struct FaultPlan {
    remaining: Option<usize>,
    index: usize,
}

struct Shared {
    tables: Arc<AsyncMutex<Tables>>,
    journal: Mutex<Vec<String>>,
    fault: Mutex<FaultPlan>,
    enforce_partial_unique: bool,
    lock_timeout: Duration,
}

impl Shared {
    async fn acquire(&self, ctx: &RequestContext) -> Result<OwnedMutexGuard<Tables>, ExecError> {
        ctx.check_deadline()?;
        let wait = ctx
            .remaining()
            .map_or(self.lock_timeout, |r| r.min(self.lock_timeout));
        match tokio::time::timeout(wait, Arc::clone(&self.tables).lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                ctx.check_deadline()?;
                warn!(wait_ms = wait.as_millis() as u64, "in-memory lock wait timed out");
                Err(ExecError::LockTimeout)
            }
        }
    }

    /// Deadline, fault injection and journaling shared by every statement.
    fn admit(&self, ctx: &RequestContext, stmt: &Statement) -> Result<(), ExecError> {
        ctx.check_deadline()?;
        {
            let mut fault = self.fault.lock();
            if let Some(remaining) = fault.remaining.as_mut() {
                *remaining = remaining.saturating_sub(1);
                if *remaining == 0 {
                    let index = fault.index;
                    fault.remaining = None;
                    debug!(index, table = stmt.table(), "injecting statement failure");
                    return Err(ExecError::InjectedFault { index });
                }
            }
        }
        self.journal.lock().push(stmt.to_sql().0);
        Ok(())
    }

    fn run(
        &self,
        tables: &mut Tables,
        ctx: &RequestContext,
        stmt: &Statement,
    ) -> Result<Outcome, ExecError> {
        self.admit(ctx, stmt)?;
        tables.execute(stmt, ctx, self.enforce_partial_unique)
    }
}

// =============================================================================
// Autocommit database
// =============================================================================

/// In-memory database handle. Cloning shares the same tables.
#[derive(Clone)]
pub struct InMemoryDatabase {
    shared: Arc<Shared>,
}

impl Default for InMemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::with_config(&LedgerConfig::default())
    }

    pub fn with_config(config: &LedgerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: Arc::new(AsyncMutex::new(Tables::new())),
                journal: Mutex::new(Vec::new()),
                fault: Mutex::new(FaultPlan::default()),
                enforce_partial_unique: config.enforce_current_segment_index,
                lock_timeout: config.lock_timeout(),
            }),
        }
    }

    /// Open a transaction. Blocks other transactions until it ends.
    pub async fn begin(&self, ctx: &RequestContext) -> Result<InMemoryTransaction, ExecError> {
        let guard = self.shared.acquire(ctx).await?;
        let snapshot = guard.clone();
        debug!("in-memory transaction started");
        Ok(InMemoryTransaction {
            shared: Arc::clone(&self.shared),
            state: Mutex::new(Some(TxState {
                guard,
                snapshot,
                aborted: false,
            })),
        })
    }

    /// Fail the `n`-th statement executed from now on (1-based).
    pub fn inject_failure_at(&self, n: usize) {
        let mut fault = self.shared.fault.lock();
        fault.remaining = Some(n.max(1));
        fault.index = n.max(1);
    }

    pub fn clear_failure(&self) {
        *self.shared.fault.lock() = FaultPlan::default();
    }

    /// Rendered SQL of every statement executed so far.
    pub fn journal(&self) -> Vec<String> {
        self.shared.journal.lock().clone()
    }

    pub fn clear_journal(&self) {
        self.shared.journal.lock().clear();
    }

    /// Committed rows of `table`, in insertion order.
    pub async fn snapshot(&self, table: &str) -> Result<Vec<Row>, ExecError> {
        let guard = self.shared.acquire(&RequestContext::background()).await?;
        Ok(guard.table(table)?.rows.clone())
    }
}

#[async_trait]
impl QueryExecutor for InMemoryDatabase {
    async fn query(&self, ctx: &RequestContext, stmt: &Statement) -> Result<Vec<Row>, ExecError> {
        let mut guard = self.shared.acquire(ctx).await?;
        self.shared
            .run(&mut guard, ctx, stmt)
            .map(Outcome::into_rows)
    }

    async fn exec(&self, ctx: &RequestContext, stmt: &Statement) -> Result<u64, ExecError> {
        let mut guard = self.shared.acquire(ctx).await?;
        self.shared
            .run(&mut guard, ctx, stmt)
            .map(|o| o.rows_affected())
    }

    async fn send_batch(&self, ctx: &RequestContext, batch: &Batch) -> BatchResults {
        let mut results = BatchResults::new(batch.len());
        let mut guard = match self.shared.acquire(ctx).await {
            Ok(guard) => guard,
            Err(e) => {
                results.outcomes.push(Err(e));
                return results;
            }
        };

        let mut working = guard.clone();
        for stmt in batch.statements() {
            let outcome = self
                .shared
                .run(&mut working, ctx, stmt)
                .map(|o| o.rows_affected());
            let failed = outcome.is_err();
            results.outcomes.push(outcome);
            if failed {
                return results;
            }
        }
        *guard = working;
        results
    }
}

// =============================================================================
// Transaction
// =============================================================================

struct TxState {
    guard: OwnedMutexGuard<Tables>,
    snapshot: Tables,
    aborted: bool,
}

/// An open transaction. Dropping it without `commit` rolls back.
pub struct InMemoryTransaction {
    shared: Arc<Shared>,
    state: Mutex<Option<TxState>>,
}

impl InMemoryTransaction {
    fn run(&self, ctx: &RequestContext, stmt: &Statement) -> Result<Outcome, ExecError> {
        let mut state = self.state.lock();
        let tx = state
            .as_mut()
            .ok_or_else(|| ExecError::Database("transaction is closed".to_string()))?;
        if tx.aborted {
            return Err(ExecError::Database(ABORTED.to_string()));
        }
        let result = self.shared.run(&mut tx.guard, ctx, stmt);
        if result.is_err() {
            tx.aborted = true;
        }
        result
    }

    pub fn is_aborted(&self) -> bool {
        self.state.lock().as_ref().map_or(false, |tx| tx.aborted)
    }

    /// Publish the transaction's writes. An aborted transaction rolls back instead.
    pub fn commit(mut self) -> Result<(), ExecError> {
        match self.state.get_mut().take() {
            Some(mut tx) if tx.aborted => {
                *tx.guard = std::mem::take(&mut tx.snapshot);
                debug!("aborted in-memory transaction rolled back on commit");
                Err(ExecError::Database(ABORTED.to_string()))
            }
            Some(_) => {
                debug!("in-memory transaction committed");
                Ok(())
            }
            None => Err(ExecError::Database("transaction is closed".to_string())),
        }
    }

    pub fn rollback(mut self) {
        if let Some(mut tx) = self.state.get_mut().take() {
            *tx.guard = std::mem::take(&mut tx.snapshot);
            debug!("in-memory transaction rolled back");
        }
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if let Some(mut tx) = self.state.get_mut().take() {
            *tx.guard = std::mem::take(&mut tx.snapshot);
        }
    }
}

#[async_trait]
impl QueryExecutor for InMemoryTransaction {
    async fn query(&self, ctx: &RequestContext, stmt: &Statement) -> Result<Vec<Row>, ExecError> {
        self.run(ctx, stmt).map(Outcome::into_rows)
    }

    async fn exec(&self, ctx: &RequestContext, stmt: &Statement) -> Result<u64, ExecError> {
        self.run(ctx, stmt).map(|o| o.rows_affected())
    }

    async fn send_batch(&self, ctx: &RequestContext, batch: &Batch) -> BatchResults {
        let mut results = BatchResults::new(batch.len());
        for stmt in batch.statements() {
            let outcome = self.run(ctx, stmt).map(|o| o.rows_affected());
            let failed = outcome.is_err();
            results.outcomes.push(outcome);
            if failed {
                break;
            }
        }
        results
    }
}

//! Tracing wrapper around any executor.
//!
//! Opens one span per statement. The span never changes the result: an
//! executor works the same with or without it.

use crate::domain::errors::ExecError;
use crate::ports::outbound::{BatchResults, QueryExecutor, RequestContext};
use crate::sql::{Batch, Row, Statement};
use async_trait::async_trait;
use tracing::{debug, info_span, Instrument};

pub struct TracedExecutor<E> {
    inner: E,
}

impl<E: QueryExecutor> TracedExecutor<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> E {
        self.inner
    }
}

#[async_trait]
impl<E: QueryExecutor> QueryExecutor for TracedExecutor<E> {
    async fn query(&self, ctx: &RequestContext, stmt: &Statement) -> Result<Vec<Row>, ExecError> {
        let span = info_span!("ledger.query", table = stmt.table(), kind = stmt.kind());
        async {
            let result = self.inner.query(ctx, stmt).await;
            match &result {
                Ok(rows) => debug!(rows = rows.len(), "query done"),
                Err(e) => debug!(error = %e, "query failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn query_row(&self, ctx: &RequestContext, stmt: &Statement) -> Result<Row, ExecError> {
        let span = info_span!("ledger.query_row", table = stmt.table(), kind = stmt.kind());
        self.inner.query_row(ctx, stmt).instrument(span).await
    }

    async fn exec(&self, ctx: &RequestContext, stmt: &Statement) -> Result<u64, ExecError> {
        let span = info_span!("ledger.exec", table = stmt.table(), kind = stmt.kind());
        async {
            let result = self.inner.exec(ctx, stmt).await;
            match &result {
                Ok(n) => debug!(rows_affected = n, "exec done"),
                Err(e) => debug!(error = %e, "exec failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn send_batch(&self, ctx: &RequestContext, batch: &Batch) -> BatchResults {
        let span = info_span!("ledger.send_batch", statements = batch.len());
        async {
            let results = self.inner.send_batch(ctx, batch).await;
            if let Some((index, e)) = results.first_error() {
                debug!(index, error = %e, "batch aborted");
            }
            results
        }
        .instrument(span)
        .await
    }
}

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future;
use futures::{Stream, StreamExt};

use super::lazy::{map_rows, single_row};
use super::LazyQuery;
use crate::bus::{TableSet, TriggerBus, TriggerListener};
use crate::db::{DbError, Row};

/// A replayable source of lazy queries for one table set.
///
/// Every [`subscribe`](QueryObservable::subscribe) starts an independent
/// [`QuerySubscription`] with its own first delivery and its own queue.
#[derive(Clone)]
pub struct QueryObservable {
    tables: TableSet,
    query: LazyQuery,
    bus: Arc<TriggerBus>,
}

impl QueryObservable {
    pub(crate) fn new(tables: TableSet, query: LazyQuery, bus: Arc<TriggerBus>) -> Self {
        Self { tables, query, bus }
    }

    pub fn tables(&self) -> &TableSet {
        &self.tables
    }

    /// Attach a new listener. The first item is available immediately.
    pub fn subscribe(&self) -> QuerySubscription {
        QuerySubscription {
            query: self.query.clone(),
            listener: self.bus.subscribe(self.tables.clone()),
            initial_pending: true,
        }
    }
}

/// One listener's stream of lazy queries.
///
/// Yields the bound query once right away, then once per trigger event that
/// intersects the observed tables, in publish order. Dropping the
/// subscription or calling [`unsubscribe`](Self::unsubscribe) ends it.
pub struct QuerySubscription {
    query: LazyQuery,
    listener: TriggerListener,
    initial_pending: bool,
}

impl QuerySubscription {
    pub fn tables(&self) -> &TableSet {
        self.listener.tables()
    }

    /// Stop deliveries and drop anything queued. Safe to call repeatedly.
    pub fn unsubscribe(&mut self) {
        self.initial_pending = false;
        self.listener.unsubscribe();
    }

    pub fn is_unsubscribed(&self) -> bool {
        self.listener.is_closed()
    }

    /// The next delivery if one is ready, without waiting.
    pub fn try_next_now(&mut self) -> Option<LazyQuery> {
        if self.take_initial() {
            return Some(self.query.clone());
        }
        self.listener.try_recv().map(|_| self.query.clone())
    }

    /// Wait for the next delivery on the current thread.
    ///
    /// Panics if called from within an async runtime, like any tokio
    /// `blocking_*` receive.
    pub fn blocking_next(&mut self) -> Option<LazyQuery> {
        if self.take_initial() {
            return Some(self.query.clone());
        }
        self.listener.blocking_recv().map(|_| self.query.clone())
    }

    fn take_initial(&mut self) -> bool {
        if self.listener.is_closed() {
            return false;
        }
        std::mem::replace(&mut self.initial_pending, false)
    }
}

impl Stream for QuerySubscription {
    type Item = LazyQuery;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.take_initial() {
            return Poll::Ready(Some(this.query.clone()));
        }
        match this.listener.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                tracing::trace!(seq = event.seq, "delivering lazy query");
                Poll::Ready(Some(this.query.clone()))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Row-mapping adaptors for streams of lazy queries.
///
/// Each delivery is run through [`LazyQuery::run_async`], so a writer holding
/// the connection parks a blocking-pool thread instead of the polling task.
/// The stream must therefore be polled inside a tokio runtime.
pub trait QueryStreamExt: Stream<Item = LazyQuery> + Sized {
    fn map_to_list<T, F>(self, mut mapper: F) -> impl Stream<Item = Result<Vec<T>, DbError>>
    where
        F: FnMut(&Row) -> Result<T, DbError>,
    {
        fetch_rows(self).map(move |rows| rows.and_then(|rows| map_rows(&rows, &mut mapper)))
    }

    /// Skips deliveries whose result is empty.
    fn map_to_one<T, F>(self, mut mapper: F) -> impl Stream<Item = Result<T, DbError>>
    where
        F: FnMut(&Row) -> Result<T, DbError>,
    {
        fetch_rows(self).filter_map(move |rows| {
            future::ready(rows.and_then(|rows| single_row(&rows, &mut mapper)).transpose())
        })
    }

    fn map_to_one_or_default<T, F>(
        self,
        mut mapper: F,
        default: T,
    ) -> impl Stream<Item = Result<T, DbError>>
    where
        T: Clone,
        F: FnMut(&Row) -> Result<T, DbError>,
    {
        fetch_rows(self).map(move |rows| {
            rows.and_then(|rows| single_row(&rows, &mut mapper))
                .map(|one| one.unwrap_or_else(|| default.clone()))
        })
    }
}

impl<S: Stream<Item = LazyQuery>> QueryStreamExt for S {}

fn fetch_rows<S>(queries: S) -> impl Stream<Item = Result<Vec<Row>, DbError>>
where
    S: Stream<Item = LazyQuery>,
{
    queries.then(|query| async move { query.run_async().await })
}

//! `SQLite` stores for entity rows and the sync audit trail.
//!
//! Both stores follow the same connection model: a `Mutex<Connection>` with
//! WAL journaling and a busy timeout. `SQLite` serializes writers anyway;
//! the mutex keeps the `rusqlite` handle `Sync` and recovers from poisoning
//! instead of cascading a panic into every later operation.

mod entities;
mod sync_log;

pub use entities::{EntityStore, StatusCounts};
pub use sync_log::SyncLogStore;

use crate::Result;
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

/// Acquires a mutex lock with poison recovery.
///
/// If the mutex is poisoned by a panic in a previous critical section, the
/// inner value is recovered and a warning logged. The connection state is
/// still valid; refusing to use it would turn one panic into a permanent
/// outage of the store.
pub(crate) fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("vaultsync_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Configures a connection with WAL mode and a busy timeout.
///
/// WAL allows concurrent readers with a single writer; the 5 second busy
/// timeout rides out lock contention between the entity and sync-log
/// connections instead of surfacing `SQLITE_BUSY`.
pub(crate) fn configure_connection(conn: &Connection) -> Result<()> {
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_acquire_lock_concurrent() {
        let mutex = Arc::new(Mutex::new(0));
        let mut handles = vec![];

        for _ in 0..8 {
            let mutex = Arc::clone(&mutex);
            handles.push(thread::spawn(move || {
                let mut guard = acquire_lock(&mutex);
                *guard += 1;
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*acquire_lock(&mutex), 8);
    }

    #[test]
    fn test_configure_connection() {
        let conn = Connection::open_in_memory().unwrap();
        configure_connection(&conn).unwrap();

        let busy_timeout: i32 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .unwrap();
        assert_eq!(busy_timeout, 5000);
    }
}

//! Shared transactional handle over one SQLite connection.
//!
//! # Invariants
//! - All clones of a `Session` address the same connection and therefore the
//!   same transaction.
//! - Transaction state is read from SQLite (`is_autocommit`), never cached.
//! - A session is single-owner: it is neither `Send` nor `Sync`.

use super::DbResult;
use log::debug;
use rusqlite::Connection;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct Session {
    conn: Rc<Connection>,
}

impl Session {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Rc::new(conn),
        }
    }

    /// Borrowed connection for issuing queries.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Starts a deferred transaction. No-op when one is already open.
    pub fn begin(&self) -> DbResult<()> {
        if self.in_transaction() {
            return Ok(());
        }
        self.conn.execute_batch("BEGIN DEFERRED;")?;
        debug!("event=session_begin module=db status=ok");
        Ok(())
    }

    /// Commits the open transaction. No-op outside a transaction.
    pub fn commit(&self) -> DbResult<()> {
        if !self.in_transaction() {
            return Ok(());
        }
        self.conn.execute_batch("COMMIT;")?;
        debug!("event=session_commit module=db status=ok");
        Ok(())
    }

    /// Rolls back the open transaction. No-op outside a transaction.
    pub fn rollback(&self) -> DbResult<()> {
        if !self.in_transaction() {
            return Ok(());
        }
        self.conn.execute_batch("ROLLBACK;")?;
        debug!("event=session_rollback module=db status=ok");
        Ok(())
    }
}

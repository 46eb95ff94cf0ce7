//! Single writer for the cache database.
//!
//! SQLite allows one writer at a time; funnelling every write through one
//! thread keeps `SQLITE_BUSY` out of the async callers.

use diesel::sqlite::SqliteConnection;
use log::error;
use tokio::sync::{mpsc, oneshot};

use recordsync_core::Result;

use super::DbPool;
use crate::errors::StorageError;

type Job = Box<dyn FnOnce(&mut SqliteConnection) + Send>;

#[derive(Debug, Clone)]
pub struct WriteHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl WriteHandle {
    /// Run `job` on the writer connection and wait for its result.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let boxed: Job = Box::new(move |conn| {
            let _ = reply_tx.send(job(conn));
        });

        self.tx
            .send(boxed)
            .map_err(|_| StorageError::Writer("writer stopped".to_string()))?;
        reply_rx
            .await
            .map_err(|_| StorageError::Writer("write was dropped".to_string()))?
    }
}

/// Start the writer thread. It exits when every handle is dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

    std::thread::spawn(move || {
        while let Some(job) = rx.blocking_recv() {
            match pool.get() {
                Ok(mut conn) => job(&mut *conn),
                // Dropping the job closes its reply channel; the caller sees a writer error.
                Err(e) => error!("[Cache] Writer could not get a connection: {}", e),
            }
        }
    });

    WriteHandle { tx }
}

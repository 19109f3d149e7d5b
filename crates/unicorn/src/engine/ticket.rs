use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TicketPoolError {
    #[error("ticket pool init failed: total={0}")]
    ZeroCapacity(u32),
    #[error("ticket pool is closed")]
    Closed,
}

/// Fixed-capacity pool bounding how many workers run at once.
///
/// The spawning side calls [`TicketPool::take`]; the spawned worker returns
/// its ticket by dropping it. Waiters are served in FIFO order.
#[derive(Debug, Clone)]
pub struct TicketPool {
    tickets: Arc<Semaphore>,
    total: u32,
}

/// A ticket held by one worker. Dropping it returns it to the pool.
#[derive(Debug)]
pub struct Ticket {
    _permit: OwnedSemaphorePermit,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        crate::metrics::TICKETS_IN_USE.dec();
        trace!("Ticket returned");
    }
}

impl TicketPool {
    pub fn new(total: u32) -> Result<Self, TicketPoolError> {
        if total == 0 {
            return Err(TicketPoolError::ZeroCapacity(total));
        }
        debug!(total, "Ticket pool created");
        Ok(Self {
            tickets: Arc::new(Semaphore::new(total as usize)),
            total,
        })
    }

    /// Wait for a free ticket and take it.
    pub async fn take(&self) -> Result<Ticket, TicketPoolError> {
        let permit = Arc::clone(&self.tickets)
            .acquire_owned()
            .await
            .map_err(|_| TicketPoolError::Closed)?;
        Ok(Self::issue(permit))
    }

    fn issue(permit: OwnedSemaphorePermit) -> Ticket {
        crate::metrics::TICKETS_IN_USE.inc();
        Ticket { _permit: permit }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// Tickets currently free.
    pub fn remainder(&self) -> u32 {
        self.tickets.available_permits() as u32
    }

    /// Tickets currently held by workers.
    pub fn outstanding(&self) -> u32 {
        self.total - self.remainder()
    }

    /// True when every ticket is back in the pool.
    pub fn is_full(&self) -> bool {
        self.remainder() == self.total
    }
}

use std::cell::{Cell, RefCell, RefMut};
use std::rc::Rc;

use postgres::{Client, NoTls};
use tracing::trace;

use nestedset_core::{Error, Result};

/// A `postgres::Client` shared by every store (and the caller) on one connection.
///
/// The transaction flag lives here, next to the client, so a store opened on a second table
/// sees a transaction started through the first one and joins it. Transactions must be opened
/// through `begin` rather than raw `BEGIN` statements for that to hold.
pub struct PgConnection {
    client: RefCell<Client>,
    in_tx: Cell<bool>,
}

impl PgConnection {
    pub fn new(client: Client) -> Rc<Self> {
        Rc::new(Self {
            client: RefCell::new(client),
            in_tx: Cell::new(false),
        })
    }

    pub fn connect(url: &str) -> Result<Rc<Self>> {
        let client = Client::connect(url, NoTls).map_err(|e| Error::Storage(e.to_string()))?;
        Ok(Self::new(client))
    }

    /// Borrows the client. Panics if it is already borrowed, like `RefCell::borrow_mut`.
    pub fn client(&self) -> RefMut<'_, Client> {
        self.client.borrow_mut()
    }

    pub fn in_transaction(&self) -> bool {
        self.in_tx.get()
    }

    pub fn begin(&self) -> Result<()> {
        if self.in_tx.get() {
            return Err(Error::Storage("transaction already open on this connection".into()));
        }
        self.batch("BEGIN")?;
        self.in_tx.set(true);
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        self.in_tx.set(false);
        self.batch("COMMIT")
    }

    pub fn rollback(&self) -> Result<()> {
        self.in_tx.set(false);
        self.batch("ROLLBACK")
    }

    fn batch(&self, sql: &str) -> Result<()> {
        trace!(sql, "postgres transaction control");
        self.client()
            .batch_execute(sql)
            .map_err(|e| Error::Storage(e.to_string()))
    }
}

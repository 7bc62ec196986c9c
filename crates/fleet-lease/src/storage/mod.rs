//! Ledger storage backends.
//!
//! The machine-type ledger is the only mutable shared resource in this
//! crate, and it is only ever mutated through the transactional wrapper in
//! [`txn`].

pub mod memory;
pub mod traits;
pub mod txn;

pub use memory::InMemoryMachineTypeStore;
pub use traits::{MachineTypeStore, StoreError, Versioned};
pub use txn::{read_modify_write, Mutation};

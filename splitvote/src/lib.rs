#[macro_use]
extern crate serde;

mod bulletin;
mod challenge;
mod commitment;
mod coordinator;
mod election;
mod error;
mod mix;
mod modular;
mod node;
mod permutation;
mod proof;
mod publication;
mod race;
mod secret_share;
mod serde_hex;
mod server_array;
mod store;
mod tally;
mod transport;
mod util;
mod verifier;
mod vote;

pub use bulletin::*;
pub use challenge::*;
pub use commitment::*;
pub use coordinator::*;
pub use election::*;
pub use error::*;
pub use mix::*;
pub use modular::*;
pub use node::*;
pub use permutation::*;
pub use proof::*;
pub use publication::*;
pub use race::*;
pub use secret_share::*;
pub use serde_hex::*;
pub use server_array::*;
pub use store::*;
pub use tally::*;
pub use transport::*;
pub use util::*;
pub use verifier::*;
pub use vote::*;

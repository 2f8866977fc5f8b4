pub mod identities;
pub mod memory;
pub mod posts;
pub mod votes;

pub use identities::{IdentityDirectory, PgIdentityDirectory};
pub use memory::{InMemoryIdentityDirectory, InMemoryPostStore, InMemoryVoteLedger};
pub use posts::{PgPostStore, PostStore};
pub use votes::{PgVoteLedger, VoteLedger};

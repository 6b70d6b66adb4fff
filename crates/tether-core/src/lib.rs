pub mod applier;
pub mod approval;
pub mod config;
pub mod deriver;
pub mod diff;
pub mod events;
pub mod journal;
pub mod schema;
pub mod session;
pub mod state;
pub mod step_kind;
pub mod value;

pub use applier::*;
pub use approval::*;
pub use diff::*;
pub use events::*;
pub use schema::*;
pub use session::*;
pub use state::*;
pub use step_kind::*;
pub use value::*;

pub use config::*;
pub use deriver::*;
pub use journal::*;

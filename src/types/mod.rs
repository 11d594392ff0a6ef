mod clock;
mod keys;
mod models;
mod patch;

pub use clock::next_created;
pub use keys::{content_hash, generate_deployment_key};
pub use models::*;
pub use patch::*;

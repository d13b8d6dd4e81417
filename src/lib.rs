mod attribute_value;
mod bucketer;
mod cached;
mod client;
mod condition;
mod context;
mod error;
mod events;
mod flag;
mod item;
mod memory;
mod operator;
mod percentage;
mod store;
mod test_common;
mod util;

pub use attribute_value::*;
pub use bucketer::*;
pub use cached::*;
pub use client::*;
pub use condition::*;
pub use context::*;
pub use error::*;
pub use events::*;
pub use flag::*;
pub use item::*;
pub use memory::*;
pub use operator::*;
pub use percentage::*;
pub use store::*;

pub mod codec;
pub mod error;
pub mod master;
pub mod partition;
pub mod plugin;
pub mod rpc;
pub mod sink;
pub mod supervisor;
pub mod worker;

pub use codec::KeyValue;
pub use error::{MrError, Result};

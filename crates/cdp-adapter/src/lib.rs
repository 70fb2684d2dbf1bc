//! Page port for tubepace.
//!
//! The pipeline crates only ever see [`PagePort`]. [`CdpPage`] drives a real
//! tab over the DevTools protocol; [`MemoryPage`] is a simulated document for
//! tests and dry runs.

pub mod config;
pub mod error;
pub mod events;
pub mod memory;
pub mod page;
pub mod port;
pub mod scripts;
pub mod transport;
mod util;

pub use config::{find_browser, CdpConfig};
pub use error::{AdapterError, AdapterErrorKind};
pub use events::PageEvent;
pub use memory::{MediaSpec, MemoryPage};
pub use page::CdpPage;
pub use port::PagePort;
pub use transport::{CdpTransport, ChromiumTransport, CommandTarget, TransportEvent};

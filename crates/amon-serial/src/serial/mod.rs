pub mod line;
pub mod reader;
pub mod transport;
pub mod types;

pub use line::LineBuffer;
pub use reader::SerialReader;
pub use transport::{SerialTransport, SimulatedOpener, SimulatedTransport, SystemOpener, TransportOpener};
pub use types::*;

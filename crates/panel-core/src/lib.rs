pub mod actions;
pub mod error;
pub mod inventory;
pub mod io;
pub mod output;
pub mod remote;
pub mod runners;
pub mod secrets;
pub mod settings;
pub mod status;

pub use error::{PanelError, Result};

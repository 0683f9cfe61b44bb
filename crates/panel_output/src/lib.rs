pub mod session;

pub use session::{PanelError, PanelOverlay, PanelSession};

//! On-screen notification toasts.
//!
//! The presenter queues notifications and drains them one at a time onto a
//! [`ToastSurface`]; the default surface broadcasts to overlay pages.

pub mod queue;
pub mod surface;

pub use queue::{DEFAULT_DWELL, Presenter};
pub use surface::{BroadcastSurface, ToastSurface};

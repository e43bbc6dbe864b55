//! Reminder delivery channels and the router that chooses between them.
//!
//! - [`capability`]: channel traits, permission state, presentation options
//! - [`push`]: push relay worker surface
//! - [`desktop`]: desktop notifications with a stored permission
//! - [`toast`]: in-app toast queue and visibility flag
//! - [`router`]: fallback policy across the channels

pub mod capability;
pub mod desktop;
pub mod push;
pub mod router;
pub mod toast;

pub use capability::{
    NotificationCapability, NotificationOptions, NotifyError, PermissionState, WorkerSurface,
};
pub use desktop::{DesktopNotifier, PermissionPrompt};
pub use push::PushRelay;
pub use router::{Channel, DeliveryReport, DeliveryRouter};
pub use toast::{Toast, ToastQueue, Visibility, VisibilityFlag, DEFAULT_TOAST_LIFETIME};

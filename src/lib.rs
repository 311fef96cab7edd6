pub mod axis;
pub mod dialect;
pub mod error;
pub mod link;
pub mod motion_controller;
pub mod protocol;
pub mod queue;
pub mod route;
pub mod settings;
pub mod socket_server;

pub use axis::{AxisMap, AxisName};
pub use error::{MissingParameter, StageError};
pub use motion_controller::{ControllerConfig, MotionController, MoveReceipt, MoveRequest};
pub use queue::{QueueStatus, Submission, TaskCallbacks, TaskOutcome};

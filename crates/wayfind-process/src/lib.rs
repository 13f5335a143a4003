//! # wayfind-process
//!
//! Lifecycle control of an uninstrumented, externally launched application.
//!
//! This crate provides:
//! - The pure controller state machine
//! - The `ProcessController` trait and its value types
//! - `DesktopController`, driving X11 desktops through xdotool and ImageMagick
//! - `SimulatedController`, a deterministic in-memory application for tests
//!
//! Nothing here knows about navigation graphs or scenes beyond the opaque
//! screen names used by the simulator.

mod controller;
mod desktop;
pub mod keys;
pub mod sim;
pub mod state;
mod tool;

pub use controller::{CapturedImage, InputAction, ProcessController, ProcessHandle, WindowRef};
pub use desktop::{capture_desktop, DesktopController};
pub use sim::{CallLog, ControllerCall, SimulatedApp, SimulatedController, SimulatedFrame};
pub use state::{transition, ControllerEvent, ControllerState};
pub use tool::{CommandTool, DesktopTool, MockDesktopTool, ToolOutput};

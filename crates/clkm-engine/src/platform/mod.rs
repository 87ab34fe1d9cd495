//! Platform input capture and injection
//!
//! Hook and injection backends for the current OS. Platforms without an
//! injection backend fall back to the dry-run
//! [`TracingSink`](crate::inject::TracingSink); without a hook backend,
//! capture has to come from the host through [`HookSource`](crate::hook::HookSource).

#[cfg(target_os = "windows")]
pub mod windows;

use crate::hook::HookAdapter;
use crate::inject::InputSink;

/// Best available sink for the current platform
#[cfg(target_os = "windows")]
pub fn default_sink() -> Box<dyn InputSink> {
    Box::new(windows::SendInputSink::new())
}

#[cfg(not(target_os = "windows"))]
pub fn default_sink() -> Box<dyn InputSink> {
    tracing::warn!("no input injection backend for this platform, playback is a dry run");
    Box::new(crate::inject::TracingSink)
}

/// Whether [`default_sink`] really injects input
pub fn injects_input() -> bool {
    cfg!(target_os = "windows")
}

/// Adapter over the platform's global input hook, if there is one
#[cfg(target_os = "windows")]
pub fn default_hook() -> Option<HookAdapter> {
    Some(HookAdapter::new(windows::LowLevelHook::new()))
}

#[cfg(not(target_os = "windows"))]
pub fn default_hook() -> Option<HookAdapter> {
    None
}

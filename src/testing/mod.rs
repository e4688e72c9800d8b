//! Testing utilities for the booth.
//!
//! Provides synthetic frames, a scripted frame source, and a scripted
//! smile detector, enabling reliable offline testing without camera
//! hardware or a running detection backend.

pub mod synthetic;

pub use synthetic::{
    synthetic_raw_frame, ScriptedConfirm, ScriptedDetector, SyntheticSource,
};

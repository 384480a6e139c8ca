//! Core data structures and traits for keyreduce
//!
//! This crate provides the fundamental types shared by the reduction
//! algorithms and their hosts: samples, keyframes, curves, reduction
//! options, the host capability traits and the error taxonomy.

pub mod sample;
pub mod keyframe;
pub mod curve;
pub mod interpolate;
pub mod options;
pub mod traits;
pub mod error;

pub use sample::*;
pub use keyframe::*;
pub use curve::*;
pub use interpolate::*;
pub use options::*;
pub use traits::*;
pub use error::*;

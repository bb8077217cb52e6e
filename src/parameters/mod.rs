//! # Parameter System
//!
//! Named parameter sets, parameter definitions (bounds, change limits,
//! transforms) and the transform chain between model, control, active-control
//! and numeric space.
//!
//! ## Core Components
//!
//! - [`NamedVector`] (aliased as [`Parameters`] and [`Observations`]): ordered name → value sets
//! - [`ParameterRecord`] and [`ParameterInfo`]: per-parameter definitions
//! - [`Bounds`]: hard lower/upper bounds
//! - [`ParameterTransform`] and [`TransformSeq`]: the space transforms
//!
//! ## Example Usage
//!
//! ```rust
//! use svdopt_rs::parameters::{
//!     ParameterInfo, ParameterRecord, ParameterTransform, TransformKind, TransformSeq,
//! };
//!
//! let info = ParameterInfo::new()
//!     .with("k", ParameterRecord::new(10.0, 0.1, 100.0).unwrap().with_transform(TransformKind::Log))
//!     .unwrap();
//! let transform = TransformSeq::new(&info).unwrap();
//!
//! let numeric = transform.ctl_to_numeric(&info.initial_values());
//! assert!((numeric.get("k").unwrap() - 1.0).abs() < 1e-12);
//! ```

pub mod bounds;
pub mod info;
pub mod named;
pub mod transform;

// Re-export key types
pub use bounds::{Bounds, BoundsError};
pub use info::{ChangeLimit, ParameterInfo, ParameterRecord, TransformKind};
pub use named::{NamedVector, Observations, Parameters};
pub use transform::{ParameterTransform, TransformSeq};

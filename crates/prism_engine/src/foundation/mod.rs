//! Foundation layer: math types and per-frame memory
//!
//! Everything here is dependency-free with respect to the rest of the
//! engine; higher layers build on these primitives.

pub mod frame;
pub mod math;

pub use frame::{FrameArena, FrameData, FrameList, FrameSlice};
pub use math::{Aabb, Mat4, Mat4Ext, Plane, Quat, Ray, Vec2, Vec3, Vec4};

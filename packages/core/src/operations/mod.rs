//! Tree operation helpers that do not touch storage

pub mod position;

pub use position::{Allocation, AllocationError, PositionAllocator};

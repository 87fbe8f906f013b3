//! Simulator of contiguous-memory allocation over a fixed
//! address space. A [`pool::Pool`] hands out regions of bytes
//! under a chosen placement [`strategy::Strategy`], splitting
//! free regions on allocation and coalescing them back on
//! deallocation; [`simulation::Simulation`] drives a pool
//! from a parsed command [`command::Script`].

pub mod command;
pub mod pool;
pub mod region;
pub mod report;
pub mod simulation;
pub mod strategy;

//! Event payload encoding shared by event sources and the filter workers.

pub mod wire;

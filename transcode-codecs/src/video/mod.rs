//! Video bitstream parsing.

pub mod h264;

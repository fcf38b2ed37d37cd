//! Audio codec configuration.

pub mod aac;

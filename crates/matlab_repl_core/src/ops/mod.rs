pub mod breakpoints;
pub mod execution;
pub mod inspect;
pub mod raw;
pub mod setup;

pub mod convert;
pub mod local;
pub mod merge;
pub mod output;

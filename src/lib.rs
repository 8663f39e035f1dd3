pub mod check;
pub mod manifest;
pub mod rcfile;
pub mod runtime;
pub mod snapshot;
pub mod version;

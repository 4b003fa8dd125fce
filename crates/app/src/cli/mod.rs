pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Get, Init, Login, Logout, Ls, Put, Rm, Version, Whoami};

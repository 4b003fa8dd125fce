pub mod get;
pub mod init;
pub mod login;
pub mod logout;
pub mod ls;
pub mod put;
pub mod rm;
pub mod version;
pub mod whoami;

pub use get::Get;
pub use init::Init;
pub use login::Login;
pub use logout::Logout;
pub use ls::Ls;
pub use put::Put;
pub use rm::Rm;
pub use version::Version;
pub use whoami::Whoami;

pub mod assessment;
pub mod enums;
pub mod module;
pub mod notification;
pub mod user;

pub use assessment::*;
pub use module::*;
pub use notification::*;
pub use user::*;

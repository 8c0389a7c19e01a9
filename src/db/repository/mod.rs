mod assessment;
mod audit;
mod module;
mod notification;
mod user;

pub use assessment::*;
pub use audit::*;
pub use module::*;
pub use notification::*;
pub use user::*;

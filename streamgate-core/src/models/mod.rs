pub mod application;
pub mod name;
pub mod stream;

pub use application::{ApplicationId, ApplicationInfo};
pub use name::VHostAppName;
pub use stream::{StreamId, StreamInfo};

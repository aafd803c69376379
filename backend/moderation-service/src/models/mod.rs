pub mod appeal;
pub mod audit;
pub mod bulk;
pub mod content;
pub mod enforcement;
pub mod moderation;

pub use appeal::*;
pub use audit::*;
pub use bulk::*;
pub use content::*;
pub use enforcement::*;
pub use moderation::*;

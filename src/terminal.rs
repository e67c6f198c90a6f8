mod bullet_points;
mod prompt;

pub use bullet_points::BulletPointPrinter;
pub use prompt::{confirm, password, prompt_with_default, select, select_many};

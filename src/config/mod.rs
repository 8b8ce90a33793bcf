pub mod settings;

pub use settings::{PlannerSettings, Settings};

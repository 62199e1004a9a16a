pub mod scale;

pub use scale::ScaleHelper;

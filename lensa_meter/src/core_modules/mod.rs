pub mod ev;
pub mod exposure;
pub mod pixel;
pub mod spot;
pub mod stops;

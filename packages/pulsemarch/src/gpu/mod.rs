pub mod pipeline;
pub mod renderer;

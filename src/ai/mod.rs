//! Model clients

pub mod image;
pub mod text;

pub use image::{ImageModel, OpenAiImageModel};
pub use text::{OpenAiTextModel, StoryCompletion, TextModel};

//! Tool nodes
//!
//! - `Post`: HTTP POST with optional image upload
//! - `Code`: user-supplied Python `main` run over the node's inputs
//! - `ImageComposition`: stitches images into a titled grid

mod code;
mod image_composition;
mod post;

pub use code::{extract_result, render_program, CodeTool};
pub use image_composition::{stitch, GridLayout, ImageCompositionTool};
pub use post::{OutputType, PostTool};

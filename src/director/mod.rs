//! Visual consistency across independently generated clips.
//!
//! A full-video run first asks for one master style guide covering every
//! scene, then turns each scene into a cinematic prompt against that guide.

mod prompt;
mod style;

pub use prompt::ScenePromptDirector;
pub use style::{StyleGuide, StyleGuideSynthesizer};

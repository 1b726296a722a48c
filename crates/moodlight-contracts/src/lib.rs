//! Data contracts shared by the moodlight engine and CLI: the mood response
//! schema, prompt framing, lighting keyframes, audio references and the
//! training dataset rows.

pub mod audio;
pub mod chat;
pub mod dataset;
pub mod events;
pub mod lighting;
pub mod mood;
